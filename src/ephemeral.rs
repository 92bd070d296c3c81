//! Ephemeral resource operations.
//!
//! An ephemeral resource lives for a single run of the host: it is opened,
//! optionally renewed before `renew_at`, and closed.

use std::time::SystemTime;

use crate::diagnostic::Diagnostic;
use crate::types::{ClientCapabilities, Deferred, DynamicValue};

/// An ephemeral resource listed by GetMetadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EphemeralResourceMetadata {
    /// Ephemeral resource type name.
    pub type_name: String,
}

/// ValidateEphemeralResourceConfig request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidateEphemeralResourceConfigRequest {
    /// Ephemeral resource type name.
    pub type_name: String,
    /// Configuration.
    pub config: Option<DynamicValue>,
}

/// ValidateEphemeralResourceConfig response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidateEphemeralResourceConfigResponse {
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// OpenEphemeralResource request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OpenEphemeralResourceRequest {
    /// Ephemeral resource type name.
    pub type_name: String,
    /// Configuration.
    pub config: Option<DynamicValue>,
    /// Features the host supports.
    pub client_capabilities: Option<ClientCapabilities>,
}

/// OpenEphemeralResource response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OpenEphemeralResourceResponse {
    /// The opened resource's data.
    pub result: Option<DynamicValue>,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
    /// Provider-private data passed to renew and close.
    pub private: Option<Vec<u8>>,
    /// When the host should call RenewEphemeralResource.
    pub renew_at: Option<SystemTime>,
    /// Set when opening could not be completed yet.
    pub deferred: Option<Deferred>,
}

/// RenewEphemeralResource request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenewEphemeralResourceRequest {
    /// Ephemeral resource type name.
    pub type_name: String,
    /// Result of open or the last renew.
    pub prior_state: Option<DynamicValue>,
    /// Provider-private data from open or the last renew.
    pub private: Option<Vec<u8>>,
}

/// RenewEphemeralResource response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenewEphemeralResourceResponse {
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
    /// Updated provider-private data.
    pub private: Option<Vec<u8>>,
    /// When the host should renew again.
    pub renew_at: Option<SystemTime>,
}

/// CloseEphemeralResource request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CloseEphemeralResourceRequest {
    /// Ephemeral resource type name.
    pub type_name: String,
    /// Result of open or the last renew.
    pub prior_state: Option<DynamicValue>,
    /// Provider-private data from open or the last renew.
    pub private: Option<Vec<u8>>,
}

/// CloseEphemeralResource response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CloseEphemeralResourceResponse {
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}
