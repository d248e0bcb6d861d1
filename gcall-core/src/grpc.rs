//! # Generic gRPC Transport
//!
//! Low-level building blocks for performing gRPC calls using dynamic message
//! types.
//!
//! Unlike standard `tonic` clients which are strongly typed (e.g.,
//! `CreateShelfRequest`), the components here work with generic
//! `serde_json::Value` structures, transcoding them to Protobuf binary format
//! on the fly using only message descriptors.
pub mod client;
pub mod codec;
