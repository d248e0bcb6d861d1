//! # Call Orchestrator
//!
//! The top-level entry point wiring the engine together: compile the schema
//! (memoized per source), resolve the target method, build the secured
//! channel with its metadata layer, construct the outgoing message from JSON
//! and dispatch one of the four RPC shapes, aggregating the outcome into a
//! [`CallResult`].
//!
//! Structural problems (schema, TLS material, method resolution, request or
//! metadata parsing) fail fast as [`CallerError`]s before any network
//! activity. Genuine RPC outcomes such as deadline exceeded, unavailable, or
//! server status codes are captured inside the returned [`CallResult`]
//! instead, so per-call success can be inspected without exception-driven
//! control flow.
mod metadata;

pub use metadata::parse_metadata_text;

use crate::channel::{
    ChannelError, ChannelFactory, DEFAULT_MAX_INBOUND_MESSAGE_SIZE,
    DEFAULT_MAX_INBOUND_METADATA_SIZE, InterceptedChannel, SecurityConfig, probe_endpoint,
};
use crate::grpc::client::{GrpcClient, GrpcRequestError};
use crate::grpc::codec::message_from_json;
use crate::resolver::{self, ResolveError, ResolvedMethod, RpcShape};
use crate::response::{CallResult, ResponseCollector};
use crate::schema::{SchemaCompiler, SchemaError, SchemaStore};
use futures_util::{Stream, StreamExt};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CallerError {
    #[error(
        "Metadata entry must be valid JSON String or in key1:value1,key2:value2 format if not JsonString but found: {0}"
    )]
    Metadata(String),
    #[error("Caught exception while parsing deadline to long")]
    Deadline,
    #[error("Caught exception while parsing request for rpc")]
    RequestParse(#[source] serde_json::Error),
    #[error("Caught exception while waiting for rpc: '{0}'")]
    Wait(#[source] GrpcRequestError),
    #[error("request and metadata must be built before calling")]
    NotPrepared,
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Where the schema for a call comes from.
#[derive(Debug, Clone)]
pub enum ProtoConfig {
    /// A filesystem tree scanned for `*.proto` files (or a `.bin` descriptor
    /// set). Relative paths resolve against `base_dir`.
    Folder {
        root: String,
        lib_folders: Option<String>,
        base_dir: Option<PathBuf>,
    },
    /// Inline proto text plus an optional library bundle.
    Inline { proto: String, lib: Option<String> },
}

/// Everything needed to prepare one callable target.
#[derive(Debug, Clone)]
pub struct CallConfig {
    pub host_port: String,
    pub proto: ProtoConfig,
    /// `"package.Service/Method"`.
    pub full_method: String,
    pub security: SecurityConfig,
    pub max_inbound_message_size: usize,
    pub max_inbound_metadata_size: u32,
}

impl CallConfig {
    pub fn new(
        host_port: impl Into<String>,
        proto: ProtoConfig,
        full_method: impl Into<String>,
    ) -> Self {
        Self {
            host_port: host_port.into(),
            proto,
            full_method: full_method.into(),
            security: SecurityConfig::default(),
            max_inbound_message_size: DEFAULT_MAX_INBOUND_MESSAGE_SIZE,
            max_inbound_metadata_size: DEFAULT_MAX_INBOUND_METADATA_SIZE,
        }
    }
}

/// A prepared dynamic caller: schema compiled, method resolved.
///
/// The transport is built by [`DynamicCaller::build_request_and_metadata`]
/// and owned by this value; shutdown is explicit and idempotent.
pub struct DynamicCaller {
    config: CallConfig,
    resolved: ResolvedMethod,
    grpc: Option<GrpcClient<InterceptedChannel>>,
    request_json: Option<String>,
    metadata: Vec<(String, String)>,
    shutdown: bool,
}

impl DynamicCaller {
    /// Compiles the schema (through the store's cache) and resolves the
    /// target method. No network activity happens here.
    pub fn prepare(config: CallConfig, store: &SchemaStore) -> Result<Self, CallerError> {
        let compiler = match &config.proto {
            ProtoConfig::Folder {
                root,
                lib_folders,
                base_dir,
            } => SchemaCompiler::for_folder(root, lib_folders.as_deref(), base_dir.as_deref())?,
            ProtoConfig::Inline { proto, lib } => {
                SchemaCompiler::for_inline(proto, lib.as_deref(), store.registry())?
            }
        };
        let pool = store.load(&compiler)?;
        let resolved = resolver::resolve(&pool, &config.full_method)?;
        tracing::debug!(
            method = %config.full_method,
            shape = ?resolved.shape(),
            "resolved target method"
        );
        Ok(Self {
            config,
            resolved,
            grpc: None,
            request_json: None,
            metadata: Vec::new(),
            shutdown: false,
        })
    }

    pub fn resolved(&self) -> &ResolvedMethod {
        &self.resolved
    }

    /// Parses the metadata text, stores the raw request JSON and builds the
    /// transport channel with the metadata-injection layer attached.
    pub fn build_request_and_metadata(
        &mut self,
        request_json: &str,
        metadata_text: &str,
    ) -> Result<(), CallerError> {
        self.metadata = parse_metadata_text(metadata_text)?;
        self.request_json = Some(request_json.to_string());
        self.grpc = Some(ChannelFactory::create(
            &self.config.host_port,
            &self.config.security,
            &self.metadata,
            self.config.max_inbound_message_size,
            self.config.max_inbound_metadata_size,
        )?);
        self.shutdown = false;
        Ok(())
    }

    /// Executes the call, dispatching on the resolved RPC shape.
    ///
    /// `deadline_text` is a decimal string of milliseconds; a non-positive
    /// value means no deadline (unbounded wait). That permissive policy is
    /// deliberate and relied upon by callers.
    pub async fn call(&mut self, deadline_text: &str) -> Result<CallResult, CallerError> {
        let timeout = parse_deadline(deadline_text)?;
        let payload = self.parse_request()?;
        let method = self.resolved.descriptor().clone();
        let grpc = self.grpc.as_mut().ok_or(CallerError::NotPrepared)?;

        let mut collector = ResponseCollector::new();
        match self.resolved.shape() {
            RpcShape::Unary => {
                match grpc
                    .unary(method, payload, timeout)
                    .await
                    .map_err(CallerError::Wait)?
                {
                    Ok(message) => collector.on_message(&message),
                    Err(status) => collector.on_error(status),
                }
            }
            RpcShape::ClientStreaming => {
                // The single decoded request is the sole streamed message;
                // the stream half-closes once it is consumed.
                match grpc
                    .client_streaming(method, tokio_stream::once(payload), timeout)
                    .await
                    .map_err(CallerError::Wait)?
                {
                    Ok(message) => collector.on_message(&message),
                    Err(status) => collector.on_error(status),
                }
            }
            RpcShape::ServerStreaming => {
                match grpc
                    .server_streaming(method, payload, timeout)
                    .await
                    .map_err(CallerError::Wait)?
                {
                    Ok(stream) => drain_stream(stream, &mut collector).await,
                    Err(status) => collector.on_error(status),
                }
            }
            RpcShape::BidiStreaming => {
                match grpc
                    .bidirectional_streaming(method, tokio_stream::once(payload), timeout)
                    .await
                    .map_err(CallerError::Wait)?
                {
                    Ok(stream) => drain_stream(stream, &mut collector).await,
                    Err(status) => collector.on_error(status),
                }
            }
        }
        collector.on_completed();
        Ok(collector.into_result())
    }

    /// Tests endpoint reachability without performing an RPC.
    pub async fn probe(&self, timeout: Duration) -> bool {
        probe_endpoint(&self.config.host_port, timeout).await
    }

    /// Drops the transport. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        self.grpc = None;
        self.shutdown = true;
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Parses and validates the stored request JSON against the method's
    /// input descriptor, before any network activity.
    fn parse_request(&self) -> Result<serde_json::Value, CallerError> {
        let raw = self.request_json.as_deref().ok_or(CallerError::NotPrepared)?;
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(CallerError::RequestParse)?;
        message_from_json(self.resolved.descriptor().input(), value.clone())
            .map_err(CallerError::RequestParse)?;
        Ok(value)
    }
}

/// Drains a response stream into the collector, observing every message.
async fn drain_stream(
    stream: impl Stream<Item = Result<serde_json::Value, tonic::Status>>,
    collector: &mut ResponseCollector,
) {
    let mut stream = std::pin::pin!(stream);
    while let Some(item) = stream.next().await {
        match item {
            Ok(message) => collector.on_message(&message),
            Err(status) => {
                collector.on_error(status);
                break;
            }
        }
    }
}

fn parse_deadline(deadline_text: &str) -> Result<Option<Duration>, CallerError> {
    let millis: i64 = deadline_text
        .trim()
        .parse()
        .map_err(|_| CallerError::Deadline)?;
    if millis <= 0 {
        // Non-positive deadlines mean "wait forever", not "fail now".
        Ok(None)
    } else {
        Ok(Some(Duration::from_millis(millis as u64)))
    }
}
