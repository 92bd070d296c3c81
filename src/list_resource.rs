//! List resource operations.
//!
//! ListResource streams the resources of a type found by a provider-side
//! query. Each result carries the resource identity and optionally the full
//! resource object.

use crate::diagnostic::Diagnostic;
use crate::stream::StreamSender;
use crate::types::{DynamicValue, ResourceIdentityData};

/// A list resource listed by GetMetadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListResourceMetadata {
    /// List resource type name.
    pub type_name: String,
}

/// ValidateListResourceConfig request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidateListResourceConfigRequest {
    /// List resource type name.
    pub type_name: String,
    /// List block configuration.
    pub config: Option<DynamicValue>,
    /// The `include_resource` argument, which may be unknown.
    pub include_resource_object: Option<DynamicValue>,
    /// The `limit` argument, which may be unknown.
    pub limit: Option<DynamicValue>,
}

/// ValidateListResourceConfig response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidateListResourceConfigResponse {
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// ListResource request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListResourceRequest {
    /// List resource type name.
    pub type_name: String,
    /// List block configuration.
    pub config: Option<DynamicValue>,
    /// Whether results should carry the full resource object.
    pub include_resource: bool,
    /// Maximum number of results the host wants.
    pub limit: i64,
}

/// One streamed ListResource result.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListResourceResult {
    /// Human-readable name of the resource.
    pub display_name: String,
    /// Identity of the resource.
    pub identity: Option<ResourceIdentityData>,
    /// Full resource object, when requested.
    pub resource: Option<DynamicValue>,
    /// Diagnostics about this result.
    pub diagnostics: Vec<Diagnostic>,
}

impl ListResourceResult {
    /// A result carrying only a diagnostic.
    pub fn diagnostic(diagnostic: Diagnostic) -> Self {
        Self {
            diagnostics: vec![diagnostic],
            ..Default::default()
        }
    }
}

/// Sender for ListResource results.
pub type ListResourceSender = StreamSender<ListResourceResult>;
