//! Managed resource operations.

use crate::diagnostic::Diagnostic;
use crate::tftypes::AttributePath;
use crate::types::{ClientCapabilities, Deferred, DynamicValue, RawState, ResourceIdentityData};

/// A managed resource listed by GetMetadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceMetadata {
    /// Resource type name.
    pub type_name: String,
}

/// ValidateResourceConfig request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidateResourceConfigRequest {
    /// Resource type name.
    pub type_name: String,
    /// Resource configuration.
    pub config: Option<DynamicValue>,
    /// Features the host supports.
    pub client_capabilities: Option<ClientCapabilities>,
}

/// ValidateResourceConfig response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidateResourceConfigResponse {
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// UpgradeResourceState request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpgradeResourceStateRequest {
    /// Resource type name.
    pub type_name: String,
    /// Schema version the state was written with.
    pub version: i64,
    /// The stored state.
    pub raw_state: Option<RawState>,
}

/// UpgradeResourceState response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpgradeResourceStateResponse {
    /// State conforming to the current schema.
    pub upgraded_state: Option<DynamicValue>,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// UpgradeResourceIdentity request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpgradeResourceIdentityRequest {
    /// Resource type name.
    pub type_name: String,
    /// Identity schema version the identity was written with.
    pub version: i64,
    /// The stored identity.
    pub raw_identity: Option<RawState>,
}

/// UpgradeResourceIdentity response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpgradeResourceIdentityResponse {
    /// Identity conforming to the current identity schema.
    pub upgraded_identity: Option<ResourceIdentityData>,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// ReadResource request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadResourceRequest {
    /// Resource type name.
    pub type_name: String,
    /// Last known state.
    pub current_state: Option<DynamicValue>,
    /// Provider-private data from the last operation.
    pub private: Vec<u8>,
    /// Module `provider_meta` block.
    pub provider_meta: Option<DynamicValue>,
    /// Last known identity.
    pub current_identity: Option<ResourceIdentityData>,
    /// Features the host supports.
    pub client_capabilities: Option<ClientCapabilities>,
}

/// ReadResource response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadResourceResponse {
    /// Refreshed state; null when the resource no longer exists.
    pub new_state: Option<DynamicValue>,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
    /// Provider-private data to store.
    pub private: Vec<u8>,
    /// Set when the read could not be completed yet.
    pub deferred: Option<Deferred>,
    /// Refreshed identity.
    pub new_identity: Option<ResourceIdentityData>,
}

/// PlanResourceChange request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlanResourceChangeRequest {
    /// Resource type name.
    pub type_name: String,
    /// State before the change; null on create.
    pub prior_state: Option<DynamicValue>,
    /// The host's proposal merging config into prior state; null on destroy.
    pub proposed_new_state: Option<DynamicValue>,
    /// Resource configuration.
    pub config: Option<DynamicValue>,
    /// Provider-private data from the last operation.
    pub prior_private: Vec<u8>,
    /// Module `provider_meta` block.
    pub provider_meta: Option<DynamicValue>,
    /// Identity before the change.
    pub prior_identity: Option<ResourceIdentityData>,
    /// Features the host supports.
    pub client_capabilities: Option<ClientCapabilities>,
}

/// PlanResourceChange response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlanResourceChangeResponse {
    /// The state the provider expects after applying.
    pub planned_state: Option<DynamicValue>,
    /// Attributes whose change forces replacement.
    pub requires_replace: Vec<AttributePath>,
    /// Provider-private data passed to apply.
    pub planned_private: Vec<u8>,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
    /// Deprecated. Relaxes the host's plan consistency checks.
    pub legacy_type_system: bool,
    /// Set when planning could not be completed yet.
    pub deferred: Option<Deferred>,
    /// The identity the provider expects after applying.
    pub planned_identity: Option<ResourceIdentityData>,
}

/// ApplyResourceChange request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApplyResourceChangeRequest {
    /// Resource type name.
    pub type_name: String,
    /// State before the change; null on create.
    pub prior_state: Option<DynamicValue>,
    /// State from the plan; null on destroy.
    pub planned_state: Option<DynamicValue>,
    /// Resource configuration.
    pub config: Option<DynamicValue>,
    /// Provider-private data from the plan.
    pub planned_private: Vec<u8>,
    /// Module `provider_meta` block.
    pub provider_meta: Option<DynamicValue>,
    /// Identity from the plan.
    pub planned_identity: Option<ResourceIdentityData>,
}

/// ApplyResourceChange response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApplyResourceChangeResponse {
    /// State after applying; null after destroy.
    pub new_state: Option<DynamicValue>,
    /// Provider-private data to store.
    pub private: Vec<u8>,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
    /// Deprecated. Relaxes the host's apply consistency checks.
    pub legacy_type_system: bool,
    /// Identity after applying.
    pub new_identity: Option<ResourceIdentityData>,
}

/// ImportResourceState request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImportResourceStateRequest {
    /// Resource type name.
    pub type_name: String,
    /// Import ID supplied by the user.
    pub id: String,
    /// Identity supplied instead of an ID.
    pub identity: Option<ResourceIdentityData>,
    /// Features the host supports.
    pub client_capabilities: Option<ClientCapabilities>,
}

/// A resource produced by an import.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImportedResource {
    /// Resource type name.
    pub type_name: String,
    /// Imported state.
    pub state: Option<DynamicValue>,
    /// Provider-private data to store.
    pub private: Vec<u8>,
    /// Imported identity.
    pub identity: Option<ResourceIdentityData>,
}

/// ImportResourceState response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImportResourceStateResponse {
    /// Imported resources.
    pub imported_resources: Vec<ImportedResource>,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
    /// Set when the import could not be completed yet.
    pub deferred: Option<Deferred>,
}

/// MoveResourceState request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MoveResourceStateRequest {
    /// Address of the provider that owns the source resource.
    pub source_provider_address: String,
    /// Source resource type name.
    pub source_type_name: String,
    /// Schema version of the source state.
    pub source_schema_version: i64,
    /// Source state.
    pub source_state: Option<RawState>,
    /// Target resource type name.
    pub target_type_name: String,
    /// Source provider-private data.
    pub source_private: Vec<u8>,
    /// Source identity.
    pub source_identity: Option<RawState>,
}

/// MoveResourceState response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MoveResourceStateResponse {
    /// State for the target resource type.
    pub target_state: Option<DynamicValue>,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
    /// Provider-private data for the target.
    pub target_private: Vec<u8>,
    /// Identity for the target.
    pub target_identity: Option<ResourceIdentityData>,
}
