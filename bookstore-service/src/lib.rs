//! # Bookstore Service
//!
//! **INTERNAL USE ONLY**: This crate exists solely to provide a gRPC server
//! implementation and descriptor set for integration testing the `gcall_core`
//! invocation engine. It is not intended for production use.

pub mod pb {
    include!(concat!(env!("OUT_DIR"), "/bookstore.rs"));
}

pub use pb::bookstore_server::{Bookstore, BookstoreServer};
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("descriptors");
