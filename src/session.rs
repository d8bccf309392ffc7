//! Session Context
//!
//! Tenant and credential state supplied by the console's login layer, and
//! the preconditions derived from it that gate fetches.

use serde::{Deserialize, Serialize};

// == Session Context ==
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub tenant_id: Option<String>,
    #[serde(skip_serializing)]
    pub credential: Option<String>,
}

impl SessionContext {
    pub fn new(tenant_id: Option<String>, credential: Option<String>) -> Self {
        Self {
            tenant_id,
            credential,
        }
    }

    /// Session with both tenant and credential set.
    pub fn authenticated(tenant_id: impl Into<String>, credential: impl Into<String>) -> Self {
        Self::new(Some(tenant_id.into()), Some(credential.into()))
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn tenant(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }
}

// == Precondition ==
/// Context a read needs before it may touch the network.
///
/// An unmet precondition is not an error: the read stays idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precondition {
    /// No requirement
    Always,
    /// Credential present (tenant-agnostic resources)
    Authenticated,
    /// Tenant and credential present
    TenantScoped,
}

impl Precondition {
    pub fn is_met(self, session: &SessionContext) -> bool {
        match self {
            Precondition::Always => true,
            Precondition::Authenticated => session.has_credential(),
            Precondition::TenantScoped => {
                session.tenant_id.is_some() && session.has_credential()
            }
        }
    }
}
