//! Provider-level operations: metadata, schemas, configuration, and stop.

use std::collections::HashMap;

use crate::action::{ActionMetadata, ActionSchema};
use crate::data_source::DataSourceMetadata;
use crate::diagnostic::Diagnostic;
use crate::ephemeral::EphemeralResourceMetadata;
use crate::function::{Function, FunctionMetadata};
use crate::list_resource::ListResourceMetadata;
use crate::resource::ResourceMetadata;
use crate::schema::{ResourceIdentitySchema, Schema};
use crate::state_store::StateStoreMetadata;
use crate::types::{ClientCapabilities, DynamicValue, ServerCapabilities};

/// GetMetadata request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GetMetadataRequest {}

/// GetMetadata response: the type names a provider supports, without schemas.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GetMetadataResponse {
    /// Optional features the provider supports.
    pub server_capabilities: Option<ServerCapabilities>,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
    /// Data sources.
    pub data_sources: Vec<DataSourceMetadata>,
    /// Managed resources.
    pub resources: Vec<ResourceMetadata>,
    /// Functions.
    pub functions: Vec<FunctionMetadata>,
    /// Ephemeral resources.
    pub ephemeral_resources: Vec<EphemeralResourceMetadata>,
    /// List resources.
    pub list_resources: Vec<ListResourceMetadata>,
    /// Actions. Protocol version 6 only.
    pub actions: Vec<ActionMetadata>,
    /// State stores. Protocol version 6 only.
    pub state_stores: Vec<StateStoreMetadata>,
}

/// GetProviderSchema request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GetProviderSchemaRequest {}

/// GetProviderSchema response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GetProviderSchemaResponse {
    /// Optional features the provider supports.
    pub server_capabilities: Option<ServerCapabilities>,
    /// Provider configuration schema.
    pub provider: Option<Schema>,
    /// Schema of the `provider_meta` block in modules.
    pub provider_meta: Option<Schema>,
    /// Managed resource schemas by type name.
    pub resource_schemas: HashMap<String, Schema>,
    /// Data source schemas by type name.
    pub data_source_schemas: HashMap<String, Schema>,
    /// Ephemeral resource schemas by type name.
    pub ephemeral_resource_schemas: HashMap<String, Schema>,
    /// Function definitions by name.
    pub functions: HashMap<String, Function>,
    /// List resource schemas by type name.
    pub list_resource_schemas: HashMap<String, Schema>,
    /// Action schemas by type name. Protocol version 6 only.
    pub action_schemas: HashMap<String, ActionSchema>,
    /// State store schemas by type name. Protocol version 6 only.
    pub state_store_schemas: HashMap<String, Schema>,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

impl GetProviderSchemaResponse {
    /// Create a response with a provider configuration schema.
    pub fn new(provider: Schema) -> Self {
        Self {
            provider: Some(provider),
            ..Default::default()
        }
    }

    /// Add a managed resource schema.
    pub fn with_resource(mut self, type_name: impl Into<String>, schema: Schema) -> Self {
        self.resource_schemas.insert(type_name.into(), schema);
        self
    }

    /// Add a data source schema.
    pub fn with_data_source(mut self, type_name: impl Into<String>, schema: Schema) -> Self {
        self.data_source_schemas.insert(type_name.into(), schema);
        self
    }

    /// Add an ephemeral resource schema.
    pub fn with_ephemeral_resource(mut self, type_name: impl Into<String>, schema: Schema) -> Self {
        self.ephemeral_resource_schemas
            .insert(type_name.into(), schema);
        self
    }

    /// Add a list resource schema.
    pub fn with_list_resource(mut self, type_name: impl Into<String>, schema: Schema) -> Self {
        self.list_resource_schemas.insert(type_name.into(), schema);
        self
    }

    /// Add a function.
    pub fn with_function(mut self, name: impl Into<String>, function: Function) -> Self {
        self.functions.insert(name.into(), function);
        self
    }

    /// Add an action schema.
    pub fn with_action(mut self, type_name: impl Into<String>, schema: ActionSchema) -> Self {
        self.action_schemas.insert(type_name.into(), schema);
        self
    }

    /// Add a state store schema.
    pub fn with_state_store(mut self, type_name: impl Into<String>, schema: Schema) -> Self {
        self.state_store_schemas.insert(type_name.into(), schema);
        self
    }

    /// Set the server capabilities.
    pub fn with_server_capabilities(mut self, capabilities: ServerCapabilities) -> Self {
        self.server_capabilities = Some(capabilities);
        self
    }

    /// Derive the GetMetadata response from the schemas.
    ///
    /// Type names are sorted so the listing is stable.
    pub fn metadata(&self) -> GetMetadataResponse {
        fn sorted<V>(map: &HashMap<String, V>) -> Vec<String> {
            let mut names: Vec<String> = map.keys().cloned().collect();
            names.sort();
            names
        }

        GetMetadataResponse {
            server_capabilities: self.server_capabilities,
            diagnostics: self.diagnostics.clone(),
            data_sources: sorted(&self.data_source_schemas)
                .into_iter()
                .map(|type_name| DataSourceMetadata { type_name })
                .collect(),
            resources: sorted(&self.resource_schemas)
                .into_iter()
                .map(|type_name| ResourceMetadata { type_name })
                .collect(),
            functions: sorted(&self.functions)
                .into_iter()
                .map(|name| FunctionMetadata { name })
                .collect(),
            ephemeral_resources: sorted(&self.ephemeral_resource_schemas)
                .into_iter()
                .map(|type_name| EphemeralResourceMetadata { type_name })
                .collect(),
            list_resources: sorted(&self.list_resource_schemas)
                .into_iter()
                .map(|type_name| ListResourceMetadata { type_name })
                .collect(),
            actions: sorted(&self.action_schemas)
                .into_iter()
                .map(|type_name| ActionMetadata { type_name })
                .collect(),
            state_stores: sorted(&self.state_store_schemas)
                .into_iter()
                .map(|type_name| StateStoreMetadata { type_name })
                .collect(),
        }
    }
}

/// GetResourceIdentitySchemas request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GetResourceIdentitySchemasRequest {}

/// GetResourceIdentitySchemas response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GetResourceIdentitySchemasResponse {
    /// Identity schemas by resource type name.
    pub identity_schemas: HashMap<String, ResourceIdentitySchema>,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// ValidateProviderConfig request (PrepareProviderConfig in protocol version 5).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidateProviderConfigRequest {
    /// Provider configuration.
    pub config: Option<DynamicValue>,
}

/// ValidateProviderConfig response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidateProviderConfigResponse {
    /// Configuration with defaults applied. Only sent by protocol version 5.
    pub prepared_config: Option<DynamicValue>,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// ConfigureProvider request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigureProviderRequest {
    /// Version of the host.
    pub terraform_version: String,
    /// Provider configuration.
    pub config: Option<DynamicValue>,
    /// Features the host supports.
    pub client_capabilities: Option<ClientCapabilities>,
}

/// ConfigureProvider response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigureProviderResponse {
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// StopProvider request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StopProviderRequest {}

/// StopProvider response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StopProviderResponse {
    /// Set when stopping failed.
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionSchema;
    use crate::schema::{SchemaAttribute, SchemaBlock};
    use crate::tftypes::Type;

    fn schema() -> Schema {
        Schema::new(
            0,
            SchemaBlock::new().with_attribute(SchemaAttribute::required("name", Type::String)),
        )
    }

    #[test]
    fn test_metadata_from_schema() {
        let response = GetProviderSchemaResponse::new(schema())
            .with_resource("example_b", schema())
            .with_resource("example_a", schema())
            .with_data_source("example_lookup", schema())
            .with_function("upper", Function::new(Type::String))
            .with_action("example_reboot", ActionSchema::new(schema()))
            .with_server_capabilities(ServerCapabilities {
                plan_destroy: true,
                ..Default::default()
            });

        let metadata = response.metadata();
        assert_eq!(
            metadata.resources,
            vec![
                ResourceMetadata {
                    type_name: "example_a".into()
                },
                ResourceMetadata {
                    type_name: "example_b".into()
                },
            ]
        );
        assert_eq!(metadata.data_sources.len(), 1);
        assert_eq!(metadata.functions[0].name, "upper");
        assert_eq!(metadata.actions[0].type_name, "example_reboot");
        assert!(metadata.ephemeral_resources.is_empty());
        assert!(metadata.server_capabilities.unwrap().plan_destroy);
    }
}
