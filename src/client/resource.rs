//! Resource descriptors: a cache key, the request that fills it, and the
//! session requirement gating it.

use serde::{Deserialize, Serialize};

use crate::key::CacheKey;
use crate::session::{Precondition, SessionContext};
use crate::transport::TransportRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub key: CacheKey,
    pub request: TransportRequest,
    pub precondition: Precondition,
}

impl Resource {
    pub fn new(key: CacheKey, request: TransportRequest, precondition: Precondition) -> Self {
        Self {
            key,
            request,
            precondition,
        }
    }

    /// Resource that requires a tenant and a credential.
    pub fn tenant_scoped(key: CacheKey, request: TransportRequest) -> Self {
        Self::new(key, request, Precondition::TenantScoped)
    }

    /// Resource that only requires a credential.
    pub fn global(key: CacheKey, request: TransportRequest) -> Self {
        Self::new(key, request, Precondition::Authenticated)
    }

    pub fn is_ready(&self, session: &SessionContext) -> bool {
        self.precondition.is_met(session)
    }

    /// Whether the key's tenant is the session's tenant.
    ///
    /// Resources that are not tenant scoped serve every session.
    pub fn serves_tenant(&self, session: &SessionContext) -> bool {
        match self.precondition {
            Precondition::TenantScoped => self.key.tenant() == Some(session.tenant()),
            Precondition::Always | Precondition::Authenticated => true,
        }
    }

    /// The request to send for `session`, carrying its headers.
    pub fn request_for(&self, session: &SessionContext) -> TransportRequest {
        self.request.clone().with_session(session.clone())
    }
}
