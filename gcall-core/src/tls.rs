//! TLS credential material handling.
//!
//! The transport layer consumes PEM files; this module makes sure whatever
//! key encoding the caller has on disk is turned into the canonical
//! unencrypted PKCS#8 form the TLS stack accepts.
pub mod pem;
