//! Embedded well-known-type `.proto` sources.
//!
//! Schemas routinely import the protobuf standard types without shipping
//! them; staging these embedded copies into a temporary include directory
//! lets those imports resolve without caller involvement. User-supplied
//! include paths are passed to the compiler first, so callers can override
//! any of these (or provide types this subset omits).
use super::{SchemaError, TempRegistry, io_error, keep_temp_dir};
use std::path::PathBuf;

const WELL_KNOWN_TYPES: &[(&str, &str)] = &[
    ("any.proto", include_str!("../../protos/google/protobuf/any.proto")),
    (
        "duration.proto",
        include_str!("../../protos/google/protobuf/duration.proto"),
    ),
    (
        "empty.proto",
        include_str!("../../protos/google/protobuf/empty.proto"),
    ),
    (
        "field_mask.proto",
        include_str!("../../protos/google/protobuf/field_mask.proto"),
    ),
    (
        "struct.proto",
        include_str!("../../protos/google/protobuf/struct.proto"),
    ),
    (
        "timestamp.proto",
        include_str!("../../protos/google/protobuf/timestamp.proto"),
    ),
    (
        "wrappers.proto",
        include_str!("../../protos/google/protobuf/wrappers.proto"),
    ),
];

/// Extracts the well-known-type protos into a `google/protobuf/` tree under
/// a fresh temporary directory and returns the include path pointing at it.
pub(super) fn stage(registry: &TempRegistry) -> Result<PathBuf, SchemaError> {
    let include_dir = keep_temp_dir("gcall-well-known-types", registry)?;
    let proto_dir = include_dir.join("google").join("protobuf");
    std::fs::create_dir_all(&proto_dir)
        .map_err(|e| io_error("creating well-known-types directory", e))?;
    for (name, content) in WELL_KNOWN_TYPES {
        std::fs::write(proto_dir.join(name), content)
            .map_err(|e| io_error(format!("staging well-known type {name}"), e))?;
    }
    Ok(include_dir)
}
