//! # Service Resolver
//!
//! Parses `"package.Service/Method"` references and binds them to a concrete
//! [`MethodDescriptor`] in a compiled descriptor pool.
//!
//! Each way a reference can be malformed or unresolvable produces its own
//! diagnostic, quoting the offending input, so callers can fix the reference
//! without guessing. The RPC shape is derived here, once, from the
//! descriptor's streaming flags; nothing downstream re-inspects the
//! descriptor to decide how to dispatch.
use prost_reflect::{DescriptorPool, MethodDescriptor};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Could not extract full service from {0}")]
    FullService(String),
    #[error("Could not extract service from {0}")]
    Service(String),
    #[error("Could not extract method name from {0}")]
    MethodName(String),
    #[error("Unable to find service with name: {0}")]
    ServiceNotFound(String),
    #[error("Unable to find method {0} in service {1}")]
    MethodNotFound(String, String),
}

/// A `"package.Service/Method"` string decomposed into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodReference {
    package: String,
    service: String,
    method: String,
}

impl MethodReference {
    /// Splits a full method reference, validating every segment.
    pub fn parse(full_method: &str) -> Result<Self, ResolveError> {
        if full_method.matches('/').count() != 1 {
            return Err(ResolveError::FullService(full_method.to_string()));
        }
        let Some((full_service, method)) = full_method.split_once('/') else {
            return Err(ResolveError::FullService(full_method.to_string()));
        };
        let Some((package, service)) = full_service
            .rsplit_once('.')
            .filter(|(package, service)| !package.is_empty() && !service.is_empty())
        else {
            return Err(ResolveError::Service(full_service.to_string()));
        };
        if method.is_empty() {
            return Err(ResolveError::MethodName(full_method.to_string()));
        }
        Ok(Self {
            package: package.to_string(),
            service: service.to_string(),
            method: method.to_string(),
        })
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// Simple service name, without the package.
    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// `package.Service`, the name services are registered under.
    pub fn full_service(&self) -> String {
        format!("{}.{}", self.package, self.service)
    }
}

/// The four gRPC call kinds, derived from a method descriptor's streaming
/// flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcShape {
    Unary,
    ClientStreaming,
    ServerStreaming,
    BidiStreaming,
}

impl RpcShape {
    fn from_descriptor(method: &MethodDescriptor) -> Self {
        match (method.is_client_streaming(), method.is_server_streaming()) {
            (false, false) => RpcShape::Unary,
            (true, false) => RpcShape::ClientStreaming,
            (false, true) => RpcShape::ServerStreaming,
            (true, true) => RpcShape::BidiStreaming,
        }
    }
}

/// A method reference bound to its descriptor and call shape.
#[derive(Debug, Clone)]
pub struct ResolvedMethod {
    descriptor: MethodDescriptor,
    shape: RpcShape,
    reference: MethodReference,
}

impl ResolvedMethod {
    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    pub fn shape(&self) -> RpcShape {
        self.shape
    }

    pub fn reference(&self) -> &MethodReference {
        &self.reference
    }
}

/// Resolves a full method reference against a descriptor pool.
pub fn resolve(pool: &DescriptorPool, full_method: &str) -> Result<ResolvedMethod, ResolveError> {
    let reference = MethodReference::parse(full_method)?;
    let service = pool
        .get_service_by_name(&reference.full_service())
        .ok_or_else(|| ResolveError::ServiceNotFound(reference.service().to_string()))?;
    let descriptor = service
        .methods()
        .find(|m| m.name() == reference.method())
        .ok_or_else(|| {
            ResolveError::MethodNotFound(
                reference.method().to_string(),
                reference.service().to_string(),
            )
        })?;
    let shape = RpcShape::from_descriptor(&descriptor);
    Ok(ResolvedMethod {
        descriptor,
        shape,
        reference,
    })
}
