//! # Gcall Core
//!
//! `gcall-core` is a schema-driven dynamic gRPC invocation engine. Given a
//! set of `.proto` sources (a directory tree, inline text, or a pre-compiled
//! descriptor set) and a fully-qualified `"package.Service/Method"` name, it
//! compiles the schema with an external protoc, resolves the target method
//! without any generated stub code, builds the request message from JSON at
//! runtime, performs the call over a plaintext, TLS, or mutual-TLS channel,
//! and folds the response stream back into a single JSON result.
//!
//! ## Key Components
//!
//! * **[`caller::DynamicCaller`]:** The main entry point. It orchestrates
//!   schema compilation, method resolution, channel construction and call
//!   dispatch across the four RPC shapes.
//! * **[`schema::SchemaCompiler`] & [`schema::SchemaStore`]:** Proto source
//!   staging and compilation into `prost_reflect` descriptor pools, with
//!   explicit temp-path bookkeeping and per-source memoization.
//! * **[`channel::ChannelFactory`]:** Plaintext/TLS/mTLS channel
//!   construction from PEM material, including private-key normalization to
//!   PKCS#8 ([`tls::pem`]) and a metadata-injection layer.
//! * **[`response::CallResult`]:** The aggregated success flag, response
//!   JSON, and captured failure cause of one call.
//!
//! ## Internal building blocks
//!
//! The generic transport pieces are exposed for consumers that need more
//! than the orchestrated flow:
//!
//! * **[`grpc::client::GrpcClient`]:** A fully-featured dynamic gRPC client
//!   using a custom JSON codec, usable against any `GrpcService`.
//! * **[`grpc::codec::JsonCodec`]:** An implementation of
//!   `tonic::codec::Codec` that transcodes JSON to Protobuf bytes (and vice
//!   versa) on the fly, driven purely by message descriptors.
//!
//! ## Re-exports
//!
//! This crate re-exports `prost`, `prost-reflect`, and `tonic` to ensure that
//! consumers use compatible versions of these underlying dependencies.
pub mod caller;
pub mod channel;
pub mod grpc;
pub mod resolver;
pub mod response;
pub mod schema;
pub mod tls;

// Re-exports
pub use prost;
pub use prost_reflect;
pub use tonic;

/// Type alias for the standard boxed error used in generic bounds.
type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
