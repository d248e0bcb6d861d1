//! # Schema Compiler
//!
//! Turns `.proto` sources into a [`DescriptorPool`] by staging them on disk
//! and invoking an external `protoc` binary, or by loading a pre-compiled
//! binary descriptor set directly.
//!
//! Sources come in two flavours:
//!
//! * **Folder**: a discovery root scanned recursively for `*.proto` files,
//!   plus optional comma-separated library include paths.
//! * **Inline**: the text of a single proto file plus an optional library
//!   bundle (plain multi-file text, JSON, or a base64-encoded ZIP).
//!
//! Every temporary directory created while staging is recorded in a
//! caller-owned [`TempRegistry`] so it can be purged once the descriptors are
//! no longer needed. Compiled pools are memoized per source in a
//! [`SchemaStore`].
mod inline;
mod well_known;

use prost::Message;
use prost_reflect::DescriptorPool;
use prost_types::FileDescriptorSet;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Mutex, PoisonError};

/// File extension marking a pre-compiled binary descriptor set.
pub const DESCRIPTOR_EXTENSION: &str = ".bin";

/// Above this many proto files the file list is passed to the compiler via an
/// `@file` argument to stay clear of OS command-length limits.
const LARGE_BATCH_LIMIT: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("proto compiler exit code: {status}\n{stdout}\n{stderr}")]
    Compilation {
        status: i32,
        stdout: String,
        stderr: String,
    },
    #[error("schema I/O error while {context}: '{source}'")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse descriptor set: '{0}'")]
    Parse(#[from] prost::DecodeError),
    #[error("unable to build descriptor pool: '{0}'")]
    Decode(#[from] prost_reflect::DescriptorError),
    #[error("invalid proto include path: {0}")]
    InvalidIncludePath(PathBuf),
    #[error("unable to prepare inline proto content: {0}")]
    Inline(String),
}

fn io_error(context: impl Into<String>, source: std::io::Error) -> SchemaError {
    SchemaError::Io {
        context: context.into(),
        source,
    }
}

/// Registry of temporary paths created while staging proto sources.
///
/// Owned by the caller and passed by reference into every compile operation;
/// additions are synchronized so concurrent compiles cannot lose entries.
/// [`TempRegistry::cleanup`] is best-effort and never fails on paths that are
/// already gone.
#[derive(Debug, Default)]
pub struct TempRegistry {
    paths: Mutex<Vec<PathBuf>>,
}

impl TempRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a path for later removal.
    pub fn track(&self, path: impl Into<PathBuf>) {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.into());
    }

    /// Returns a snapshot of every tracked path.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Removes every tracked path from disk, draining the registry.
    pub fn cleanup(&self) {
        let drained: Vec<PathBuf> = self
            .paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for path in drained {
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            if let Err(error) = result {
                tracing::debug!(path = %path.display(), %error, "skipping temp path removal");
            }
        }
    }
}

/// A prepared compiler invocation for one proto source.
#[derive(Debug, Clone)]
pub struct SchemaCompiler {
    discovery_root: PathBuf,
    include_paths: Vec<PathBuf>,
    cache_key: String,
}

impl SchemaCompiler {
    /// Prepares a compiler for a filesystem discovery root.
    ///
    /// Relative paths (root and library includes) are resolved against
    /// `base_dir` when supplied. `lib_folders` is a comma-separated list of
    /// extra include paths; each must exist.
    pub fn for_folder(
        discovery_root: &str,
        lib_folders: Option<&str>,
        base_dir: Option<&Path>,
    ) -> Result<Self, SchemaError> {
        let mut root = PathBuf::from(discovery_root);
        if !root.is_absolute() {
            if let Some(base) = base_dir {
                root = base.join(root);
            }
        }

        let mut include_paths = Vec::new();
        if !is_descriptor_file(&root) {
            for entry in lib_folders
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
            {
                let mut path = PathBuf::from(entry);
                if !path.is_absolute() {
                    if let Some(base) = base_dir {
                        path = base.join(path);
                    }
                }
                if !path.exists() {
                    return Err(SchemaError::InvalidIncludePath(path));
                }
                include_paths.push(path);
            }
        }

        let cache_key = format!(
            "folder:{}|{}",
            root.display(),
            include_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(",")
        );
        Ok(Self {
            discovery_root: root,
            include_paths,
            cache_key,
        })
    }

    /// Prepares a compiler for inline proto content plus an optional library
    /// bundle, staging both into a temporary directory tracked by `registry`.
    pub fn for_inline(
        proto: &str,
        lib: Option<&str>,
        registry: &TempRegistry,
    ) -> Result<Self, SchemaError> {
        let staged = inline::stage(proto, lib)?;
        registry.track(&staged.root);

        let mut hasher = DefaultHasher::new();
        proto.hash(&mut hasher);
        lib.hash(&mut hasher);
        Ok(Self {
            discovery_root: staged.root,
            include_paths: staged.includes,
            cache_key: format!("inline:{:016x}", hasher.finish()),
        })
    }

    /// Key identifying this source for memoization.
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    /// Compiles the source into a descriptor pool.
    ///
    /// A discovery root ending in [`DESCRIPTOR_EXTENSION`] is read as a
    /// pre-compiled descriptor set and returned without invoking the
    /// compiler.
    pub fn compile(&self, registry: &TempRegistry) -> Result<DescriptorPool, SchemaError> {
        if is_descriptor_file(&self.discovery_root) {
            let bytes = std::fs::read(&self.discovery_root).map_err(|e| {
                io_error(
                    format!("reading descriptor set {}", self.discovery_root.display()),
                    e,
                )
            })?;
            return pool_from_descriptor_bytes(&bytes);
        }

        let well_known_include = well_known::stage(registry)?;
        let staging = keep_temp_dir("gcall-protoc", registry)?;
        let descriptor_path = staging.join("descriptor.pb.bin");

        let proto_files = self.scan_proto_files()?;
        let args = self.build_args(&proto_files, &descriptor_path, &well_known_include, &staging)?;
        self.run_compiler(&args)?;

        let bytes = std::fs::read(&descriptor_path)
            .map_err(|e| io_error("reading generated descriptors", e))?;
        pool_from_descriptor_bytes(&bytes)
    }

    /// Enumerates every `*.proto` file under the discovery root, sorted so
    /// compiler invocations are reproducible.
    fn scan_proto_files(&self) -> Result<Vec<String>, SchemaError> {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(&self.discovery_root) {
            let entry = entry.map_err(|e| io_error("scanning proto tree for files", e.into()))?;
            if entry.file_type().is_file()
                && entry.path().extension().is_some_and(|ext| ext == "proto")
            {
                files.push(entry.path().display().to_string());
            }
        }
        files.sort();
        Ok(files)
    }

    fn build_args(
        &self,
        proto_files: &[String],
        descriptor_path: &Path,
        well_known_include: &Path,
        staging: &Path,
    ) -> Result<Vec<String>, SchemaError> {
        let mut args = Vec::new();

        if proto_files.len() > LARGE_BATCH_LIMIT {
            let arg_file = staging.join("protoc-args.txt");
            std::fs::write(&arg_file, proto_files.join("\n"))
                .map_err(|e| io_error("writing compiler argument file", e))?;
            args.push(format!("@{}", arg_file.display()));
        } else {
            args.extend(proto_files.iter().cloned());
        }

        for path in &self.include_paths {
            args.push(format!("-I{}", path.display()));
        }
        // The well-known-types include goes after the user includes so users
        // can provide their own copies of the standard types.
        args.push(format!("-I{}", well_known_include.display()));
        // The compiler requires every input file to live under some include
        // path, so the discovery root itself is always the last include.
        args.push(format!("-I{}", self.discovery_root.display()));
        args.push(format!("--descriptor_set_out={}", descriptor_path.display()));
        args.push("--include_imports".to_string());
        Ok(args)
    }

    fn run_compiler(&self, args: &[String]) -> Result<(), SchemaError> {
        let compiler = std::env::var("PROTOC").unwrap_or_else(|_| "protoc".to_string());
        tracing::debug!(%compiler, args = args.len(), "invoking proto compiler");

        let output = Command::new(&compiler)
            .args(args)
            .output()
            .map_err(|e| io_error(format!("executing proto compiler '{compiler}'"), e))?;

        if !output.status.success() {
            let status = output.status.code().unwrap_or(-1);
            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            tracing::error!(status, "proto compiler invocation failed");
            for line in stdout.lines().chain(stderr.lines()) {
                tracing::error!("[protoc] {line}");
            }
            return Err(SchemaError::Compilation {
                status,
                stdout,
                stderr,
            });
        }
        Ok(())
    }
}

/// Caller-owned store combining the temp-path registry with a memoization
/// cache of compiled descriptor pools, keyed per proto root or inline
/// content.
#[derive(Debug, Default)]
pub struct SchemaStore {
    registry: TempRegistry,
    cache: Mutex<HashMap<String, DescriptorPool>>,
}

impl SchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &TempRegistry {
        &self.registry
    }

    /// Returns the cached pool for this source, compiling it on first use.
    pub fn load(&self, compiler: &SchemaCompiler) -> Result<DescriptorPool, SchemaError> {
        if let Some(pool) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(compiler.cache_key())
        {
            return Ok(pool.clone());
        }
        let pool = compiler.compile(&self.registry)?;
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(compiler.cache_key().to_string(), pool.clone());
        Ok(pool)
    }

    /// Purges every staged temporary path. Best-effort; cached pools stay
    /// valid because descriptors are fully parsed in memory.
    pub fn cleanup(&self) {
        self.registry.cleanup();
    }
}

fn pool_from_descriptor_bytes(bytes: &[u8]) -> Result<DescriptorPool, SchemaError> {
    let set = FileDescriptorSet::decode(bytes)?;
    Ok(DescriptorPool::from_file_descriptor_set(set)?)
}

fn is_descriptor_file(path: &Path) -> bool {
    path.to_string_lossy().ends_with(DESCRIPTOR_EXTENSION)
}

/// Creates a temporary directory that survives scope exit and is tracked for
/// explicit cleanup.
fn keep_temp_dir(prefix: &str, registry: &TempRegistry) -> Result<PathBuf, SchemaError> {
    let dir = tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .map_err(|e| io_error("creating temporary directory", e))?
        .keep();
    registry.track(&dir);
    Ok(dir)
}
