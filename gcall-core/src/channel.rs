//! # Credential/Channel Builder
//!
//! Turns an endpoint plus a [`SecurityConfig`] into a ready transport for the
//! generic client: plaintext or TLS/mTLS, with inbound size ceilings applied
//! and a [`HeaderInterceptor`] that injects the caller's metadata into every
//! outgoing call.
//!
//! PEM material is read from disk here; the client key is normalized to
//! PKCS#8 via [`crate::tls::pem`] before it is handed to the TLS stack, so
//! PKCS#1/SEC1/encrypted keys work transparently.
use crate::grpc::client::GrpcClient;
use crate::tls::pem::{KeyError, normalize_private_key};
use base64::Engine;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tonic::metadata::errors::{InvalidMetadataKey, InvalidMetadataValue};
use tonic::metadata::{
    Ascii, Binary, KeyAndValueRef, MetadataKey, MetadataMap, MetadataValue,
};
use tonic::service::Interceptor;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity};

/// Default ceiling for inbound messages (4 MiB).
pub const DEFAULT_MAX_INBOUND_MESSAGE_SIZE: usize = 4 * 1024 * 1024;
/// Default ceiling for inbound metadata (8 KiB).
pub const DEFAULT_MAX_INBOUND_METADATA_SIZE: u32 = 8 * 1024;

/// Metadata keys with this suffix carry binary (base64) payloads.
pub const BINARY_HEADER_SUFFIX: &str = "-bin";

const PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// TLS/mTLS configuration using PEM files only.
#[derive(Debug, Clone, Default)]
pub struct SecurityConfig {
    /// Enable TLS. When false, plaintext is used.
    pub tls: bool,
    /// Trusted server certificate (PEM) or CA bundle (PEM). When absent the
    /// system trust store is used.
    pub ca_pem_path: Option<PathBuf>,
    /// Client certificate chain (PEM) for mutual TLS.
    pub client_cert_pem_path: Option<PathBuf>,
    /// Client private key (any supported PEM encoding) for mutual TLS.
    pub client_key_pem_path: Option<PathBuf>,
    /// Password for an encrypted client key.
    pub client_key_password: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("invalid endpoint '{endpoint}': '{source}'")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: tonic::transport::Error,
    },
    #[error("error creating secure channel: unable to read {path}: '{source}'")]
    CredentialIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("error creating secure channel: '{0}'")]
    Key(#[from] KeyError),
    #[error("error creating secure channel: '{0}'")]
    Tls(#[source] tonic::transport::Error),
    #[error("client certificate and client key must both be provided for mutual TLS")]
    IncompleteClientPair,
    #[error("Invalid metadata (header) key '{key}': '{source}'")]
    InvalidMetadataKey {
        key: String,
        #[source]
        source: InvalidMetadataKey,
    },
    #[error("Invalid metadata (header) value for key '{key}': '{source}'")]
    InvalidMetadataValue {
        key: String,
        #[source]
        source: InvalidMetadataValue,
    },
}

/// A transport channel with the metadata-injection layer attached.
pub type InterceptedChannel = InterceptedService<Channel, HeaderInterceptor>;

/// Injects a fixed set of headers into every outgoing call.
///
/// Keys ending in [`BINARY_HEADER_SUFFIX`] carry bytes: their value is
/// base64-decoded, falling back to the raw UTF-8 bytes when the value is not
/// valid base64. All other keys carry ASCII text.
#[derive(Debug, Clone)]
pub struct HeaderInterceptor {
    headers: MetadataMap,
}

impl Interceptor for HeaderInterceptor {
    fn call(&mut self, mut request: tonic::Request<()>) -> Result<tonic::Request<()>, tonic::Status> {
        for entry in self.headers.iter() {
            match entry {
                KeyAndValueRef::Ascii(key, value) => {
                    request.metadata_mut().insert(key.clone(), value.clone());
                }
                KeyAndValueRef::Binary(key, value) => {
                    request.metadata_mut().insert_bin(key.clone(), value.clone());
                }
            }
        }
        Ok(request)
    }
}

/// Knows how to construct transport channels from a security configuration.
pub struct ChannelFactory;

impl ChannelFactory {
    /// Builds a lazily-connecting client for `endpoint` ("host:port").
    ///
    /// The channel is exclusively owned by the caller, which is responsible
    /// for shutting it down (dropping it).
    pub fn create(
        endpoint: &str,
        security: &SecurityConfig,
        metadata: &[(String, String)],
        max_inbound_message_size: usize,
        max_inbound_metadata_size: u32,
    ) -> Result<GrpcClient<InterceptedChannel>, ChannelError> {
        let headers = build_metadata_map(metadata)?;
        let channel = Self::endpoint(endpoint, security, max_inbound_metadata_size)?.connect_lazy();
        let service = InterceptedService::new(channel, HeaderInterceptor { headers });
        Ok(GrpcClient::new(service).max_decoding_message_size(max_inbound_message_size))
    }

    fn endpoint(
        endpoint: &str,
        security: &SecurityConfig,
        max_inbound_metadata_size: u32,
    ) -> Result<Endpoint, ChannelError> {
        let scheme = if security.tls { "https" } else { "http" };
        let uri = format!("{scheme}://{endpoint}");
        let mut builder = Endpoint::from_shared(uri)
            .map_err(|source| ChannelError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                source,
            })?
            .http2_max_header_list_size(max_inbound_metadata_size);

        if security.tls {
            let tls = Self::tls_config(security)?;
            builder = builder.tls_config(tls).map_err(ChannelError::Tls)?;
            tracing::debug!(%endpoint, "TLS channel configured");
        } else {
            tracing::debug!(%endpoint, "plaintext channel configured");
        }
        Ok(builder)
    }

    fn tls_config(security: &SecurityConfig) -> Result<ClientTlsConfig, ChannelError> {
        let mut tls = ClientTlsConfig::new().with_enabled_roots();

        if let Some(ca_path) = &security.ca_pem_path {
            let ca_pem = read_credential(ca_path)?;
            tls = tls.ca_certificate(Certificate::from_pem(ca_pem));
        }

        match (
            &security.client_cert_pem_path,
            &security.client_key_pem_path,
        ) {
            (Some(cert_path), Some(key_path)) => {
                let cert_pem = read_credential(cert_path)?;
                let key_pem = read_credential(key_path)?;
                let key_pem =
                    normalize_private_key(&key_pem, security.client_key_password.as_deref())?;
                tls = tls.identity(Identity::from_pem(cert_pem, key_pem));
            }
            (None, None) => {}
            _ => return Err(ChannelError::IncompleteClientPair),
        }
        Ok(tls)
    }
}

fn read_credential(path: &Path) -> Result<Vec<u8>, ChannelError> {
    std::fs::read(path).map_err(|source| ChannelError::CredentialIo {
        path: path.to_path_buf(),
        source,
    })
}

/// Validates metadata entries and applies the binary/ASCII key rule.
pub fn build_metadata_map(entries: &[(String, String)]) -> Result<MetadataMap, ChannelError> {
    let mut headers = MetadataMap::new();
    for (key, value) in entries {
        if key.ends_with(BINARY_HEADER_SUFFIX) {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(value)
                .unwrap_or_else(|_| value.as_bytes().to_vec());
            let parsed_key = MetadataKey::<Binary>::from_bytes(key.as_bytes()).map_err(
                |source| ChannelError::InvalidMetadataKey {
                    key: key.clone(),
                    source,
                },
            )?;
            headers.insert_bin(parsed_key, MetadataValue::from_bytes(&bytes));
        } else {
            let parsed_key = MetadataKey::<Ascii>::from_bytes(key.as_bytes()).map_err(
                |source| ChannelError::InvalidMetadataKey {
                    key: key.clone(),
                    source,
                },
            )?;
            let parsed_value: MetadataValue<Ascii> =
                value
                    .parse()
                    .map_err(|source| ChannelError::InvalidMetadataValue {
                        key: key.clone(),
                        source,
                    })?;
            headers.insert(parsed_key, parsed_value);
        }
    }
    Ok(headers)
}

/// Polls TCP reachability of `endpoint` on a fixed interval until it connects
/// or `timeout` elapses. A reachability check only; no RPC is performed.
pub async fn probe_endpoint(endpoint: &str, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return false;
        }
        match tokio::time::timeout(remaining, tokio::net::TcpStream::connect(endpoint)).await {
            Ok(Ok(_)) => return true,
            Ok(Err(error)) => {
                tracing::debug!(%endpoint, %error, "connectivity probe attempt failed");
            }
            Err(_) => return false,
        }
        tokio::time::sleep(PROBE_INTERVAL.min(remaining)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_metadata_is_kept_verbatim() {
        let entries = vec![("x-trace".to_string(), "abc123".to_string())];
        let headers = build_metadata_map(&entries).unwrap();
        assert_eq!(headers.get("x-trace").unwrap(), "abc123");
    }

    #[test]
    fn binary_metadata_is_base64_decoded() {
        use base64::Engine;
        let payload = b"\x00\x01binary";
        let encoded = base64::engine::general_purpose::STANDARD.encode(payload);
        let entries = vec![("x-blob-bin".to_string(), encoded)];

        let headers = build_metadata_map(&entries).unwrap();
        let value = headers.get_bin("x-blob-bin").unwrap();
        assert_eq!(value.to_bytes().unwrap().as_ref(), payload);
    }

    #[test]
    fn non_base64_binary_metadata_falls_back_to_raw_bytes() {
        let entries = vec![("x-blob-bin".to_string(), "not base64!!".to_string())];
        let headers = build_metadata_map(&entries).unwrap();
        let value = headers.get_bin("x-blob-bin").unwrap();
        assert_eq!(value.to_bytes().unwrap().as_ref(), b"not base64!!");
    }

    #[test]
    fn invalid_header_key_is_rejected() {
        let entries = vec![("spaced key".to_string(), "v".to_string())];
        assert!(matches!(
            build_metadata_map(&entries),
            Err(ChannelError::InvalidMetadataKey { .. })
        ));
    }

    #[test]
    fn client_cert_without_key_is_rejected() {
        let security = SecurityConfig {
            tls: true,
            client_cert_pem_path: Some(PathBuf::from("/tmp/client.pem")),
            ..Default::default()
        };
        assert!(matches!(
            ChannelFactory::create("localhost:1", &security, &[], 1024, 1024),
            Err(ChannelError::IncompleteClientPair)
        ));
    }

    #[test]
    fn missing_ca_pem_is_a_credential_error() {
        let security = SecurityConfig {
            tls: true,
            ca_pem_path: Some(PathBuf::from("/path/not/found/ca.pem")),
            ..Default::default()
        };
        assert!(matches!(
            ChannelFactory::create("localhost:1", &security, &[], 1024, 1024),
            Err(ChannelError::CredentialIo { .. })
        ));
    }

    #[tokio::test]
    async fn probe_succeeds_against_listening_socket() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        assert!(probe_endpoint(&endpoint, Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn probe_times_out_against_dead_endpoint() {
        // Bind then drop to find a port with no listener.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        drop(listener);
        assert!(!probe_endpoint(&endpoint, Duration::from_millis(300)).await);
    }
}
