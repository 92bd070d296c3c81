//! Data source operations.

use crate::diagnostic::Diagnostic;
use crate::types::{ClientCapabilities, Deferred, DynamicValue};

/// A data source listed by GetMetadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataSourceMetadata {
    /// Data source type name.
    pub type_name: String,
}

/// ValidateDataResourceConfig request (ValidateDataSourceConfig in protocol version 5).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidateDataResourceConfigRequest {
    /// Data source type name.
    pub type_name: String,
    /// Data source configuration.
    pub config: Option<DynamicValue>,
}

/// ValidateDataResourceConfig response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidateDataResourceConfigResponse {
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// ReadDataSource request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadDataSourceRequest {
    /// Data source type name.
    pub type_name: String,
    /// Data source configuration.
    pub config: Option<DynamicValue>,
    /// Module `provider_meta` block.
    pub provider_meta: Option<DynamicValue>,
    /// Features the host supports.
    pub client_capabilities: Option<ClientCapabilities>,
}

/// ReadDataSource response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadDataSourceResponse {
    /// The data that was read.
    pub state: Option<DynamicValue>,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
    /// Set when the read could not be completed yet.
    pub deferred: Option<Deferred>,
}
