//! Public model to wire conversions for protocol version 6.
//!
//! Responses and stream events leave through these. Type constraints are
//! written in their JSON form and absent types become empty bytes.

use std::time::SystemTime;

use super::generated as wire;
use crate::action::{
    ActionSchema, CancelActionResponse, InvokeActionEvent, PlanActionResponse,
    ValidateActionConfigResponse,
};
use crate::data_source::{ReadDataSourceResponse, ValidateDataResourceConfigResponse};
use crate::diagnostic::{Diagnostic, FunctionError};
use crate::ephemeral::{
    CloseEphemeralResourceResponse, OpenEphemeralResourceResponse,
    RenewEphemeralResourceResponse, ValidateEphemeralResourceConfigResponse,
};
use crate::function::{CallFunctionResponse, Function, FunctionParameter, GetFunctionsResponse};
use crate::list_resource::{ListResourceResult, ValidateListResourceConfigResponse};
use crate::provider::{
    ConfigureProviderResponse, GetMetadataResponse, GetProviderSchemaResponse,
    GetResourceIdentitySchemasResponse, StopProviderResponse, ValidateProviderConfigResponse,
};
use crate::resource::{
    ApplyResourceChangeResponse, ImportResourceStateResponse, ImportedResource,
    MoveResourceStateResponse, PlanResourceChangeResponse, ReadResourceResponse,
    UpgradeResourceIdentityResponse, UpgradeResourceStateResponse,
    ValidateResourceConfigResponse,
};
use crate::schema::{
    ResourceIdentitySchema, Schema, SchemaAttribute, SchemaBlock, SchemaNestedBlock,
    SchemaObject,
};
use crate::state_store::{
    ConfigureStateStoreResponse, DeleteStateResponse, GetStatesResponse, LockStateResponse,
    StateByteChunk, StateByteRange, StateStoreServerCapabilities, UnlockStateResponse,
    ValidateStateStoreConfigResponse, WriteStateBytesResponse,
};
use crate::tftypes::{AttributePath, AttributePathStep, Type};
use crate::types::{Deferred, DynamicValue, RawState, ResourceIdentityData, ServerCapabilities};

fn type_bytes(ty: &Option<Type>) -> Vec<u8> {
    ty.as_ref().map(Type::to_json_bytes).unwrap_or_default()
}

fn diagnostics(diags: Vec<Diagnostic>) -> Vec<wire::Diagnostic> {
    diags.into_iter().map(Into::into).collect()
}

fn timestamp(time: SystemTime) -> prost_types::Timestamp {
    prost_types::Timestamp::from(time)
}

// =============================================================================
// Shared Types
// =============================================================================

impl From<DynamicValue> for wire::DynamicValue {
    fn from(value: DynamicValue) -> Self {
        Self {
            msgpack: value.msgpack.unwrap_or_default(),
            json: value.json.unwrap_or_default(),
        }
    }
}

impl From<RawState> for wire::RawState {
    fn from(state: RawState) -> Self {
        Self {
            json: state.json.unwrap_or_default(),
            flatmap: state.flatmap,
        }
    }
}

impl From<ResourceIdentityData> for wire::ResourceIdentityData {
    fn from(data: ResourceIdentityData) -> Self {
        Self {
            identity_data: data.identity_data.map(Into::into),
        }
    }
}

impl From<ServerCapabilities> for wire::ServerCapabilities {
    fn from(caps: ServerCapabilities) -> Self {
        Self {
            plan_destroy: caps.plan_destroy,
            get_provider_schema_optional: caps.get_provider_schema_optional,
            move_resource_state: caps.move_resource_state,
        }
    }
}

impl From<Deferred> for wire::Deferred {
    fn from(deferred: Deferred) -> Self {
        Self {
            reason: deferred.reason.into(),
        }
    }
}

/// Set-element steps cannot be expressed on the wire, so the path is cut
/// at the first one.
impl From<AttributePath> for wire::AttributePath {
    fn from(path: AttributePath) -> Self {
        use wire::attribute_path::{step::Selector, Step};

        let steps = path
            .transmittable_steps()
            .iter()
            .filter_map(|step| {
                let selector = match step {
                    AttributePathStep::AttributeName(name) => Selector::AttributeName(name.clone()),
                    AttributePathStep::ElementKeyString(key) => {
                        Selector::ElementKeyString(key.clone())
                    },
                    AttributePathStep::ElementKeyInt(index) => Selector::ElementKeyInt(*index),
                    AttributePathStep::ElementKeyValue(_) => return None,
                };
                Some(Step {
                    selector: Some(selector),
                })
            })
            .collect();
        Self { steps }
    }
}

impl From<Diagnostic> for wire::Diagnostic {
    fn from(diag: Diagnostic) -> Self {
        Self {
            severity: diag.severity.into(),
            summary: diag.summary,
            detail: diag.detail,
            attribute: diag.attribute.map(Into::into),
        }
    }
}

impl From<FunctionError> for wire::FunctionError {
    fn from(err: FunctionError) -> Self {
        Self {
            text: err.text,
            function_argument: err.function_argument,
        }
    }
}

// =============================================================================
// Schemas
// =============================================================================

impl From<Schema> for wire::Schema {
    fn from(schema: Schema) -> Self {
        Self {
            version: schema.version,
            block: schema.block.map(Into::into),
        }
    }
}

impl From<SchemaBlock> for wire::schema::Block {
    fn from(block: SchemaBlock) -> Self {
        Self {
            version: block.version,
            attributes: block.attributes.into_iter().map(Into::into).collect(),
            block_types: block.block_types.into_iter().map(Into::into).collect(),
            description: block.description,
            description_kind: block.description_kind.into(),
            deprecated: block.deprecated,
        }
    }
}

impl From<SchemaAttribute> for wire::schema::Attribute {
    fn from(attr: SchemaAttribute) -> Self {
        Self {
            name: attr.name,
            r#type: type_bytes(&attr.ty),
            nested_type: attr.nested_type.map(Into::into),
            description: attr.description,
            required: attr.required,
            optional: attr.optional,
            computed: attr.computed,
            sensitive: attr.sensitive,
            description_kind: attr.description_kind.into(),
            deprecated: attr.deprecated,
            write_only: attr.write_only,
        }
    }
}

impl From<SchemaNestedBlock> for wire::schema::NestedBlock {
    fn from(block: SchemaNestedBlock) -> Self {
        Self {
            type_name: block.type_name,
            block: block.block.map(Into::into),
            nesting: block.nesting.into(),
            min_items: block.min_items,
            max_items: block.max_items,
        }
    }
}

impl From<SchemaObject> for wire::schema::Object {
    #[allow(deprecated)]
    fn from(object: SchemaObject) -> Self {
        Self {
            attributes: object.attributes.into_iter().map(Into::into).collect(),
            nesting: object.nesting.into(),
            min_items: object.min_items,
            max_items: object.max_items,
        }
    }
}

impl From<ResourceIdentitySchema> for wire::ResourceIdentitySchema {
    fn from(schema: ResourceIdentitySchema) -> Self {
        Self {
            version: schema.version,
            identity_attributes: schema
                .identity_attributes
                .into_iter()
                .map(|attr| wire::resource_identity_schema::IdentityAttribute {
                    r#type: type_bytes(&attr.ty),
                    name: attr.name,
                    required_for_import: attr.required_for_import,
                    optional_for_import: attr.optional_for_import,
                    description: attr.description,
                })
                .collect(),
        }
    }
}

impl From<ActionSchema> for wire::ActionSchema {
    fn from(schema: ActionSchema) -> Self {
        Self {
            schema: schema.schema.map(Into::into),
        }
    }
}

impl From<FunctionParameter> for wire::function::Parameter {
    fn from(param: FunctionParameter) -> Self {
        Self {
            r#type: type_bytes(&param.ty),
            name: param.name,
            allow_null_value: param.allow_null_value,
            allow_unknown_values: param.allow_unknown_values,
            description: param.description,
            description_kind: param.description_kind.into(),
        }
    }
}

impl From<Function> for wire::Function {
    fn from(function: Function) -> Self {
        Self {
            parameters: function.parameters.into_iter().map(Into::into).collect(),
            variadic_parameter: function.variadic_parameter.map(Into::into),
            r#return: function.returns.map(|ret| wire::function::Return {
                r#type: type_bytes(&ret.ty),
            }),
            summary: function.summary,
            description: function.description,
            description_kind: function.description_kind.into(),
            deprecation_message: function.deprecation_message,
        }
    }
}

// =============================================================================
// Provider
// =============================================================================

impl From<GetMetadataResponse> for wire::get_metadata::Response {
    fn from(resp: GetMetadataResponse) -> Self {
        use wire::get_metadata as meta;

        Self {
            server_capabilities: resp.server_capabilities.map(Into::into),
            diagnostics: diagnostics(resp.diagnostics),
            data_sources: resp
                .data_sources
                .into_iter()
                .map(|m| meta::DataSourceMetadata {
                    type_name: m.type_name,
                })
                .collect(),
            resources: resp
                .resources
                .into_iter()
                .map(|m| meta::ResourceMetadata {
                    type_name: m.type_name,
                })
                .collect(),
            functions: resp
                .functions
                .into_iter()
                .map(|m| meta::FunctionMetadata { name: m.name })
                .collect(),
            ephemeral_resources: resp
                .ephemeral_resources
                .into_iter()
                .map(|m| meta::EphemeralResourceMetadata {
                    type_name: m.type_name,
                })
                .collect(),
            list_resources: resp
                .list_resources
                .into_iter()
                .map(|m| meta::ListResourceMetadata {
                    type_name: m.type_name,
                })
                .collect(),
            state_stores: resp
                .state_stores
                .into_iter()
                .map(|m| meta::StateStoreMetadata {
                    type_name: m.type_name,
                })
                .collect(),
            actions: resp
                .actions
                .into_iter()
                .map(|m| meta::ActionMetadata {
                    type_name: m.type_name,
                })
                .collect(),
        }
    }
}

impl From<GetProviderSchemaResponse> for wire::get_provider_schema::Response {
    fn from(resp: GetProviderSchemaResponse) -> Self {
        fn schemas<M, W: From<M>>(
            map: std::collections::HashMap<String, M>,
        ) -> std::collections::HashMap<String, W> {
            map.into_iter().map(|(k, v)| (k, v.into())).collect()
        }

        Self {
            provider: resp.provider.map(Into::into),
            resource_schemas: schemas(resp.resource_schemas),
            data_source_schemas: schemas(resp.data_source_schemas),
            diagnostics: diagnostics(resp.diagnostics),
            provider_meta: resp.provider_meta.map(Into::into),
            server_capabilities: resp.server_capabilities.map(Into::into),
            functions: schemas(resp.functions),
            ephemeral_resource_schemas: schemas(resp.ephemeral_resource_schemas),
            list_resource_schemas: schemas(resp.list_resource_schemas),
            state_store_schemas: schemas(resp.state_store_schemas),
            action_schemas: schemas(resp.action_schemas),
        }
    }
}

impl From<GetResourceIdentitySchemasResponse> for wire::get_resource_identity_schemas::Response {
    fn from(resp: GetResourceIdentitySchemasResponse) -> Self {
        Self {
            identity_schemas: resp
                .identity_schemas
                .into_iter()
                .map(|(k, v)| (k, v.into()))
                .collect(),
            diagnostics: diagnostics(resp.diagnostics),
        }
    }
}

/// Version 6 has no prepared configuration; only diagnostics travel back.
impl From<ValidateProviderConfigResponse> for wire::validate_provider_config::Response {
    fn from(resp: ValidateProviderConfigResponse) -> Self {
        Self {
            diagnostics: diagnostics(resp.diagnostics),
        }
    }
}

impl From<ConfigureProviderResponse> for wire::configure_provider::Response {
    fn from(resp: ConfigureProviderResponse) -> Self {
        Self {
            diagnostics: diagnostics(resp.diagnostics),
        }
    }
}

impl From<StopProviderResponse> for wire::stop_provider::Response {
    fn from(resp: StopProviderResponse) -> Self {
        Self { error: resp.error }
    }
}

// =============================================================================
// Managed Resources
// =============================================================================

impl From<ValidateResourceConfigResponse> for wire::validate_resource_config::Response {
    fn from(resp: ValidateResourceConfigResponse) -> Self {
        Self {
            diagnostics: diagnostics(resp.diagnostics),
        }
    }
}

impl From<UpgradeResourceStateResponse> for wire::upgrade_resource_state::Response {
    fn from(resp: UpgradeResourceStateResponse) -> Self {
        Self {
            upgraded_state: resp.upgraded_state.map(Into::into),
            diagnostics: diagnostics(resp.diagnostics),
        }
    }
}

impl From<UpgradeResourceIdentityResponse> for wire::upgrade_resource_identity::Response {
    fn from(resp: UpgradeResourceIdentityResponse) -> Self {
        Self {
            upgraded_identity: resp.upgraded_identity.map(Into::into),
            diagnostics: diagnostics(resp.diagnostics),
        }
    }
}

impl From<ReadResourceResponse> for wire::read_resource::Response {
    fn from(resp: ReadResourceResponse) -> Self {
        Self {
            new_state: resp.new_state.map(Into::into),
            diagnostics: diagnostics(resp.diagnostics),
            private: resp.private,
            deferred: resp.deferred.map(Into::into),
            new_identity: resp.new_identity.map(Into::into),
        }
    }
}

impl From<PlanResourceChangeResponse> for wire::plan_resource_change::Response {
    fn from(resp: PlanResourceChangeResponse) -> Self {
        Self {
            planned_state: resp.planned_state.map(Into::into),
            requires_replace: resp.requires_replace.into_iter().map(Into::into).collect(),
            planned_private: resp.planned_private,
            diagnostics: diagnostics(resp.diagnostics),
            legacy_type_system: resp.legacy_type_system,
            deferred: resp.deferred.map(Into::into),
            planned_identity: resp.planned_identity.map(Into::into),
        }
    }
}

impl From<ApplyResourceChangeResponse> for wire::apply_resource_change::Response {
    fn from(resp: ApplyResourceChangeResponse) -> Self {
        Self {
            new_state: resp.new_state.map(Into::into),
            private: resp.private,
            diagnostics: diagnostics(resp.diagnostics),
            legacy_type_system: resp.legacy_type_system,
            new_identity: resp.new_identity.map(Into::into),
        }
    }
}

impl From<ImportedResource> for wire::import_resource_state::ImportedResource {
    fn from(imported: ImportedResource) -> Self {
        Self {
            type_name: imported.type_name,
            state: imported.state.map(Into::into),
            private: imported.private,
            identity: imported.identity.map(Into::into),
        }
    }
}

impl From<ImportResourceStateResponse> for wire::import_resource_state::Response {
    fn from(resp: ImportResourceStateResponse) -> Self {
        Self {
            imported_resources: resp
                .imported_resources
                .into_iter()
                .map(Into::into)
                .collect(),
            diagnostics: diagnostics(resp.diagnostics),
            deferred: resp.deferred.map(Into::into),
        }
    }
}

impl From<MoveResourceStateResponse> for wire::move_resource_state::Response {
    fn from(resp: MoveResourceStateResponse) -> Self {
        Self {
            target_state: resp.target_state.map(Into::into),
            diagnostics: diagnostics(resp.diagnostics),
            target_private: resp.target_private,
            target_identity: resp.target_identity.map(Into::into),
        }
    }
}

// =============================================================================
// Data Sources
// =============================================================================

impl From<ValidateDataResourceConfigResponse> for wire::validate_data_resource_config::Response {
    fn from(resp: ValidateDataResourceConfigResponse) -> Self {
        Self {
            diagnostics: diagnostics(resp.diagnostics),
        }
    }
}

impl From<ReadDataSourceResponse> for wire::read_data_source::Response {
    fn from(resp: ReadDataSourceResponse) -> Self {
        Self {
            state: resp.state.map(Into::into),
            diagnostics: diagnostics(resp.diagnostics),
            deferred: resp.deferred.map(Into::into),
        }
    }
}

// =============================================================================
// Ephemeral Resources
// =============================================================================

impl From<ValidateEphemeralResourceConfigResponse>
    for wire::validate_ephemeral_resource_config::Response
{
    fn from(resp: ValidateEphemeralResourceConfigResponse) -> Self {
        Self {
            diagnostics: diagnostics(resp.diagnostics),
        }
    }
}

impl From<OpenEphemeralResourceResponse> for wire::open_ephemeral_resource::Response {
    fn from(resp: OpenEphemeralResourceResponse) -> Self {
        Self {
            diagnostics: diagnostics(resp.diagnostics),
            renew_at: resp.renew_at.map(timestamp),
            result: resp.result.map(Into::into),
            private: resp.private,
            deferred: resp.deferred.map(Into::into),
        }
    }
}

impl From<RenewEphemeralResourceResponse> for wire::renew_ephemeral_resource::Response {
    fn from(resp: RenewEphemeralResourceResponse) -> Self {
        Self {
            diagnostics: diagnostics(resp.diagnostics),
            renew_at: resp.renew_at.map(timestamp),
            private: resp.private,
        }
    }
}

impl From<CloseEphemeralResourceResponse> for wire::close_ephemeral_resource::Response {
    fn from(resp: CloseEphemeralResourceResponse) -> Self {
        Self {
            diagnostics: diagnostics(resp.diagnostics),
        }
    }
}

// =============================================================================
// Functions
// =============================================================================

impl From<GetFunctionsResponse> for wire::get_functions::Response {
    fn from(resp: GetFunctionsResponse) -> Self {
        Self {
            functions: resp
                .functions
                .into_iter()
                .map(|(k, v)| (k, v.into()))
                .collect(),
            diagnostics: diagnostics(resp.diagnostics),
        }
    }
}

impl From<CallFunctionResponse> for wire::call_function::Response {
    fn from(resp: CallFunctionResponse) -> Self {
        Self {
            result: resp.result.map(Into::into),
            error: resp.error.map(Into::into),
        }
    }
}

// =============================================================================
// List Resources
// =============================================================================

impl From<ValidateListResourceConfigResponse> for wire::validate_list_resource_config::Response {
    fn from(resp: ValidateListResourceConfigResponse) -> Self {
        Self {
            diagnostics: diagnostics(resp.diagnostics),
        }
    }
}

/// Frame one ListResource result as a stream event.
pub(crate) fn list_resource_event(result: ListResourceResult) -> wire::list_resource::Event {
    wire::list_resource::Event {
        identity: result.identity.map(Into::into),
        display_name: result.display_name,
        resource_object: result.resource.map(Into::into),
        diagnostic: diagnostics(result.diagnostics),
    }
}

// =============================================================================
// Actions
// =============================================================================

impl From<ValidateActionConfigResponse> for wire::validate_action_config::Response {
    fn from(resp: ValidateActionConfigResponse) -> Self {
        Self {
            diagnostics: diagnostics(resp.diagnostics),
        }
    }
}

impl From<PlanActionResponse> for wire::plan_action::Response {
    fn from(resp: PlanActionResponse) -> Self {
        Self {
            new_config: resp.new_config.map(Into::into),
            diagnostics: diagnostics(resp.diagnostics),
            deferred: resp.deferred.map(Into::into),
        }
    }
}

/// Frame one action event.
pub(crate) fn action_event(event: InvokeActionEvent) -> wire::invoke_action::Event {
    use wire::invoke_action::event::{self, Type};

    let kind = match event {
        InvokeActionEvent::Started {
            cancellation_token,
            diagnostics: diags,
        } => Type::Started(event::Started {
            cancellation_token,
            diagnostics: diagnostics(diags),
        }),
        InvokeActionEvent::Progress {
            stdout,
            stderr,
            message,
            diagnostics: diags,
        } => Type::Progress(event::Progress {
            stdout,
            stderr,
            message,
            diagnostics: diagnostics(diags),
        }),
        InvokeActionEvent::Finished {
            outputs,
            new_config,
            diagnostics: diags,
        } => Type::Finished(event::Finished {
            outputs: outputs.into_iter().map(|(k, v)| (k, v.into())).collect(),
            new_config: new_config.map(Into::into),
            diagnostics: diagnostics(diags),
        }),
        InvokeActionEvent::Cancelled { diagnostics: diags } => Type::Cancelled(event::Cancelled {
            diagnostics: diagnostics(diags),
        }),
    };
    wire::invoke_action::Event { r#type: Some(kind) }
}

impl From<CancelActionResponse> for wire::cancel_action::Response {
    fn from(resp: CancelActionResponse) -> Self {
        Self {
            diagnostics: diagnostics(resp.diagnostics),
        }
    }
}

// =============================================================================
// State Stores
// =============================================================================

impl From<ValidateStateStoreConfigResponse> for wire::validate_state_store::Response {
    fn from(resp: ValidateStateStoreConfigResponse) -> Self {
        Self {
            diagnostics: diagnostics(resp.diagnostics),
        }
    }
}

impl From<StateStoreServerCapabilities> for wire::StateStoreServerCapabilities {
    fn from(caps: StateStoreServerCapabilities) -> Self {
        Self {
            chunk_size: caps.chunk_size,
        }
    }
}

impl From<ConfigureStateStoreResponse> for wire::configure_state_store::Response {
    fn from(resp: ConfigureStateStoreResponse) -> Self {
        Self {
            diagnostics: diagnostics(resp.diagnostics),
            capabilities: resp.capabilities.map(Into::into),
        }
    }
}

impl From<StateByteRange> for wire::StateRange {
    fn from(range: StateByteRange) -> Self {
        Self {
            start: range.start,
            end: range.end,
        }
    }
}

impl From<StateByteChunk> for wire::read_state_bytes::Response {
    fn from(chunk: StateByteChunk) -> Self {
        Self {
            bytes: chunk.bytes,
            total_length: chunk.total_length,
            range: chunk.range.map(Into::into),
            diagnostics: diagnostics(chunk.diagnostics),
        }
    }
}

impl From<WriteStateBytesResponse> for wire::write_state_bytes::Response {
    fn from(resp: WriteStateBytesResponse) -> Self {
        Self {
            diagnostics: diagnostics(resp.diagnostics),
        }
    }
}

impl From<GetStatesResponse> for wire::get_states::Response {
    fn from(resp: GetStatesResponse) -> Self {
        Self {
            state_id: resp.state_ids,
            diagnostics: diagnostics(resp.diagnostics),
        }
    }
}

impl From<DeleteStateResponse> for wire::delete_state::Response {
    fn from(resp: DeleteStateResponse) -> Self {
        Self {
            diagnostics: diagnostics(resp.diagnostics),
        }
    }
}

impl From<LockStateResponse> for wire::lock_state::Response {
    fn from(resp: LockStateResponse) -> Self {
        Self {
            lock_id: resp.lock_id,
            diagnostics: diagnostics(resp.diagnostics),
        }
    }
}

impl From<UnlockStateResponse> for wire::unlock_state::Response {
    fn from(resp: UnlockStateResponse) -> Self {
        Self {
            diagnostics: diagnostics(resp.diagnostics),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{NestedBlockNesting, ObjectNesting};
    use crate::tftypes::Value;
    use crate::types::DeferredReason;

    fn sample_schema() -> Schema {
        Schema::new(
            1,
            SchemaBlock::new()
                .with_attribute(SchemaAttribute::required("name", Type::String))
                .with_attribute(SchemaAttribute::computed("id", Type::String))
                .with_attribute(
                    SchemaAttribute::optional("ports", Type::list(Type::Number)).sensitive(),
                )
                .with_attribute(SchemaAttribute::nested(
                    "disk",
                    SchemaObject::list(vec![SchemaAttribute::required("size", Type::Number)]),
                ))
                .with_block(
                    SchemaNestedBlock::set(
                        "rule",
                        SchemaBlock::new()
                            .with_attribute(SchemaAttribute::optional("cidr", Type::String)),
                    )
                    .with_max_items(3),
                )
                .with_description("A compute instance"),
        )
    }

    #[test]
    fn test_schema_round_trip() {
        let schema = sample_schema();
        let proto: wire::Schema = schema.clone().into();
        assert_eq!(proto.block.as_ref().unwrap().attributes[0].r#type, br#""string""#);
        let back = Schema::try_from(proto).unwrap();
        assert_eq!(back, schema);
    }

    #[test]
    fn test_nested_type_nesting() {
        let proto: wire::schema::Attribute = SchemaAttribute::nested(
            "disk",
            SchemaObject::new(ObjectNesting::Map, Vec::new()),
        )
        .into();
        let nested = proto.nested_type.unwrap();
        assert_eq!(nested.nesting, wire::schema::object::NestingMode::Map as i32);
        assert!(proto.r#type.is_empty());
    }

    #[test]
    fn test_nested_block_nesting() {
        let proto: wire::schema::NestedBlock =
            SchemaNestedBlock::group("timeouts", SchemaBlock::new()).into();
        assert_eq!(
            proto.nesting,
            wire::schema::nested_block::NestingMode::Group as i32
        );
        assert_eq!(
            NestedBlockNesting::from(proto.nesting),
            NestedBlockNesting::Group
        );
    }

    #[test]
    fn test_attribute_path_encoding() {
        let path = AttributePath::root("rule")
            .with_element_key_int(0)
            .with_element_key_string("k");
        let proto: wire::AttributePath = path.clone().into();
        assert_eq!(proto.steps.len(), 3);
        assert_eq!(AttributePath::from(proto), path);
    }

    #[test]
    fn test_attribute_path_truncates_at_set_element() {
        let path = AttributePath::root("tags")
            .with_element_key_value(Value::string("a"))
            .with_attribute_name("after");
        let proto: wire::AttributePath = path.into();
        assert_eq!(proto.steps.len(), 1);
        assert_eq!(
            proto.steps[0].selector,
            Some(wire::attribute_path::step::Selector::AttributeName(
                "tags".to_string()
            ))
        );
    }

    #[test]
    fn test_diagnostic_encoding() {
        let diag = Diagnostic::error("Invalid name")
            .with_detail("must not be empty")
            .with_attribute(AttributePath::root("name"));
        let proto: wire::Diagnostic = diag.into();
        assert_eq!(proto.severity, wire::diagnostic::Severity::Error as i32);
        assert_eq!(proto.summary, "Invalid name");
        assert_eq!(proto.attribute.unwrap().steps.len(), 1);
    }

    #[test]
    fn test_zero_value_response() {
        let proto: wire::read_resource::Response = ReadResourceResponse::default().into();
        assert_eq!(proto, wire::read_resource::Response::default());
    }

    #[test]
    fn test_dynamic_value_encoding() {
        let proto: wire::DynamicValue = DynamicValue::from_json(b"{}".to_vec()).into();
        assert!(proto.msgpack.is_empty());
        assert_eq!(proto.json, b"{}");
    }

    #[test]
    fn test_deferred_and_capabilities() {
        let proto: wire::plan_resource_change::Response = PlanResourceChangeResponse {
            deferred: Some(Deferred::new(DeferredReason::ProviderConfigUnknown)),
            ..Default::default()
        }
        .into();
        assert_eq!(
            proto.deferred.unwrap().reason,
            wire::deferred::Reason::ProviderConfigUnknown as i32
        );

        let caps: wire::ServerCapabilities = ServerCapabilities {
            plan_destroy: true,
            ..Default::default()
        }
        .into();
        assert!(caps.plan_destroy);
        assert!(!caps.move_resource_state);
    }

    #[test]
    fn test_renew_at_timestamp() {
        let at = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(90);
        let proto: wire::renew_ephemeral_resource::Response = RenewEphemeralResourceResponse {
            renew_at: Some(at),
            ..Default::default()
        }
        .into();
        let ts = proto.renew_at.unwrap();
        assert_eq!(ts.seconds, 90);
        assert_eq!(SystemTime::try_from(ts).unwrap(), at);
    }

    #[test]
    fn test_function_round_trip() {
        let function = Function {
            parameters: vec![FunctionParameter {
                name: "input".to_string(),
                ty: Some(Type::String),
                ..Default::default()
            }],
            returns: Some(crate::function::FunctionReturn {
                ty: Some(Type::Number),
            }),
            summary: "Parse a number".to_string(),
            ..Default::default()
        };
        let proto: wire::Function = function.clone().into();
        assert_eq!(proto.r#return.as_ref().unwrap().r#type, br#""number""#);
        assert_eq!(Function::try_from(proto).unwrap(), function);
    }

    #[test]
    fn test_action_event_framing() {
        let event = action_event(InvokeActionEvent::started("tok-1"));
        match event.r#type {
            Some(wire::invoke_action::event::Type::Started(started)) => {
                assert_eq!(started.cancellation_token, "tok-1");
            },
            other => panic!("unexpected event: {:?}", other),
        }

        let event = action_event(InvokeActionEvent::progress("halfway"));
        match event.r#type {
            Some(wire::invoke_action::event::Type::Progress(progress)) => {
                assert_eq!(progress.message.as_deref(), Some("halfway"));
                assert!(progress.stdout.is_none());
            },
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_list_resource_event() {
        let event = list_resource_event(ListResourceResult {
            display_name: "web-1".to_string(),
            diagnostics: vec![Diagnostic::warning("stale")],
            ..Default::default()
        });
        assert_eq!(event.display_name, "web-1");
        assert!(event.resource_object.is_none());
        assert_eq!(event.diagnostic.len(), 1);
    }

    #[test]
    fn test_state_chunk_encoding() {
        let proto: wire::read_state_bytes::Response = StateByteChunk {
            bytes: b"abcd".to_vec(),
            total_length: 10,
            range: Some(StateByteRange::new(4, 8)),
            diagnostics: Vec::new(),
        }
        .into();
        assert_eq!(proto.range, Some(wire::StateRange { start: 4, end: 8 }));
        assert_eq!(proto.total_length, 10);
    }
}
