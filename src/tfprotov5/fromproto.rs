//! Wire to public model conversions for protocol version 5.
//!
//! Requests arrive through these. Protocol 5 names some RPCs differently
//! (`PrepareProviderConfig`, `ValidateResourceTypeConfig`,
//! `ValidateDataSourceConfig`, `Configure`, `Stop`); they map onto the same
//! request types as their protocol 6 counterparts. Schema attributes never
//! carry a nested type here.

use super::generated as wire;
use crate::data_source::{ReadDataSourceRequest, ValidateDataResourceConfigRequest};
use crate::diagnostic::{Diagnostic, FunctionError};
use crate::ephemeral::{
    CloseEphemeralResourceRequest, OpenEphemeralResourceRequest, RenewEphemeralResourceRequest,
    ValidateEphemeralResourceConfigRequest,
};
use crate::function::{CallFunctionRequest, Function, FunctionParameter, FunctionReturn, GetFunctionsRequest};
use crate::list_resource::{ListResourceRequest, ValidateListResourceConfigRequest};
use crate::provider::{
    ConfigureProviderRequest, GetMetadataRequest, GetProviderSchemaRequest,
    GetResourceIdentitySchemasRequest, StopProviderRequest, ValidateProviderConfigRequest,
};
use crate::resource::{
    ApplyResourceChangeRequest, ImportResourceStateRequest, MoveResourceStateRequest,
    PlanResourceChangeRequest, ReadResourceRequest, UpgradeResourceIdentityRequest,
    UpgradeResourceStateRequest, ValidateResourceConfigRequest,
};
use crate::schema::{
    ResourceIdentitySchema, ResourceIdentitySchemaAttribute, Schema, SchemaAttribute,
    SchemaBlock, SchemaNestedBlock,
};
use crate::tftypes::{self, AttributePath, AttributePathStep, Type};
use crate::types::{ClientCapabilities, Deferred, DynamicValue, RawState, ResourceIdentityData};

fn non_empty(bytes: Vec<u8>) -> Option<Vec<u8>> {
    if bytes.is_empty() {
        None
    } else {
        Some(bytes)
    }
}

fn type_json(bytes: &[u8]) -> Result<Option<Type>, tftypes::Error> {
    if bytes.is_empty() {
        Ok(None)
    } else {
        Type::parse_json(bytes).map(Some)
    }
}

// =============================================================================
// Shared Types
// =============================================================================

impl From<wire::DynamicValue> for DynamicValue {
    fn from(proto: wire::DynamicValue) -> Self {
        Self {
            msgpack: non_empty(proto.msgpack),
            json: non_empty(proto.json),
        }
    }
}

impl From<wire::RawState> for RawState {
    fn from(proto: wire::RawState) -> Self {
        Self {
            json: non_empty(proto.json),
            flatmap: proto.flatmap,
        }
    }
}

impl From<wire::ResourceIdentityData> for ResourceIdentityData {
    fn from(proto: wire::ResourceIdentityData) -> Self {
        Self {
            identity_data: proto.identity_data.map(Into::into),
        }
    }
}

impl From<wire::ClientCapabilities> for ClientCapabilities {
    fn from(proto: wire::ClientCapabilities) -> Self {
        Self {
            deferral_allowed: proto.deferral_allowed,
            write_only_attributes_allowed: proto.write_only_attributes_allowed,
        }
    }
}

impl From<wire::Deferred> for Deferred {
    fn from(proto: wire::Deferred) -> Self {
        Self::new(proto.reason.into())
    }
}

impl From<wire::AttributePath> for AttributePath {
    fn from(proto: wire::AttributePath) -> Self {
        use wire::attribute_path::step::Selector;

        // A step without a selector ends the path; later steps would be
        // attached to the wrong parent.
        AttributePath::from_steps(proto.steps.into_iter().map_while(|step| {
            step.selector.map(|selector| match selector {
                Selector::AttributeName(name) => AttributePathStep::AttributeName(name),
                Selector::ElementKeyString(key) => AttributePathStep::ElementKeyString(key),
                Selector::ElementKeyInt(index) => AttributePathStep::ElementKeyInt(index),
            })
        }))
    }
}

impl From<wire::Diagnostic> for Diagnostic {
    fn from(proto: wire::Diagnostic) -> Self {
        Self {
            severity: proto.severity.into(),
            summary: proto.summary,
            detail: proto.detail,
            attribute: proto.attribute.map(Into::into),
        }
    }
}

impl From<wire::FunctionError> for FunctionError {
    fn from(proto: wire::FunctionError) -> Self {
        Self {
            text: proto.text,
            function_argument: proto.function_argument,
        }
    }
}

// =============================================================================
// Schemas
// =============================================================================

impl TryFrom<wire::Schema> for Schema {
    type Error = tftypes::Error;

    fn try_from(proto: wire::Schema) -> Result<Self, Self::Error> {
        Ok(Self {
            version: proto.version,
            block: proto.block.map(TryInto::try_into).transpose()?,
        })
    }
}

impl TryFrom<wire::schema::Block> for SchemaBlock {
    type Error = tftypes::Error;

    fn try_from(proto: wire::schema::Block) -> Result<Self, Self::Error> {
        Ok(Self {
            version: proto.version,
            attributes: proto
                .attributes
                .into_iter()
                .map(TryInto::try_into)
                .collect::<Result<_, _>>()?,
            block_types: proto
                .block_types
                .into_iter()
                .map(TryInto::try_into)
                .collect::<Result<_, _>>()?,
            description: proto.description,
            description_kind: proto.description_kind.into(),
            deprecated: proto.deprecated,
        })
    }
}

impl TryFrom<wire::schema::Attribute> for SchemaAttribute {
    type Error = tftypes::Error;

    fn try_from(proto: wire::schema::Attribute) -> Result<Self, Self::Error> {
        Ok(Self {
            name: proto.name,
            ty: type_json(&proto.r#type)?,
            nested_type: None,
            description: proto.description,
            required: proto.required,
            optional: proto.optional,
            computed: proto.computed,
            sensitive: proto.sensitive,
            description_kind: proto.description_kind.into(),
            deprecated: proto.deprecated,
            write_only: proto.write_only,
        })
    }
}

impl TryFrom<wire::schema::NestedBlock> for SchemaNestedBlock {
    type Error = tftypes::Error;

    fn try_from(proto: wire::schema::NestedBlock) -> Result<Self, Self::Error> {
        Ok(Self {
            type_name: proto.type_name,
            block: proto.block.map(TryInto::try_into).transpose()?,
            nesting: proto.nesting.into(),
            min_items: proto.min_items,
            max_items: proto.max_items,
        })
    }
}

impl TryFrom<wire::ResourceIdentitySchema> for ResourceIdentitySchema {
    type Error = tftypes::Error;

    fn try_from(proto: wire::ResourceIdentitySchema) -> Result<Self, Self::Error> {
        let identity_attributes = proto
            .identity_attributes
            .into_iter()
            .map(|attr| {
                Ok(ResourceIdentitySchemaAttribute {
                    name: attr.name,
                    ty: type_json(&attr.r#type)?,
                    required_for_import: attr.required_for_import,
                    optional_for_import: attr.optional_for_import,
                    description: attr.description,
                })
            })
            .collect::<Result<_, tftypes::Error>>()?;
        Ok(Self {
            version: proto.version,
            identity_attributes,
        })
    }
}

impl TryFrom<wire::function::Parameter> for FunctionParameter {
    type Error = tftypes::Error;

    fn try_from(proto: wire::function::Parameter) -> Result<Self, Self::Error> {
        Ok(Self {
            name: proto.name,
            ty: type_json(&proto.r#type)?,
            allow_null_value: proto.allow_null_value,
            allow_unknown_values: proto.allow_unknown_values,
            description: proto.description,
            description_kind: proto.description_kind.into(),
        })
    }
}

impl TryFrom<wire::Function> for Function {
    type Error = tftypes::Error;

    fn try_from(proto: wire::Function) -> Result<Self, Self::Error> {
        Ok(Self {
            parameters: proto
                .parameters
                .into_iter()
                .map(TryInto::try_into)
                .collect::<Result<_, _>>()?,
            variadic_parameter: proto.variadic_parameter.map(TryInto::try_into).transpose()?,
            returns: proto
                .r#return
                .map(|ret| type_json(&ret.r#type).map(|ty| FunctionReturn { ty }))
                .transpose()?,
            summary: proto.summary,
            description: proto.description,
            description_kind: proto.description_kind.into(),
            deprecation_message: proto.deprecation_message,
        })
    }
}

// =============================================================================
// Provider
// =============================================================================

impl From<wire::get_metadata::Request> for GetMetadataRequest {
    fn from(_proto: wire::get_metadata::Request) -> Self {
        Self {}
    }
}

impl From<wire::get_provider_schema::Request> for GetProviderSchemaRequest {
    fn from(_proto: wire::get_provider_schema::Request) -> Self {
        Self {}
    }
}

impl From<wire::get_resource_identity_schemas::Request> for GetResourceIdentitySchemasRequest {
    fn from(_proto: wire::get_resource_identity_schemas::Request) -> Self {
        Self {}
    }
}

impl From<wire::prepare_provider_config::Request> for ValidateProviderConfigRequest {
    fn from(proto: wire::prepare_provider_config::Request) -> Self {
        Self {
            config: proto.config.map(Into::into),
        }
    }
}

impl From<wire::configure::Request> for ConfigureProviderRequest {
    fn from(proto: wire::configure::Request) -> Self {
        Self {
            terraform_version: proto.terraform_version,
            config: proto.config.map(Into::into),
            client_capabilities: proto.client_capabilities.map(Into::into),
        }
    }
}

impl From<wire::stop::Request> for StopProviderRequest {
    fn from(_proto: wire::stop::Request) -> Self {
        Self {}
    }
}

// =============================================================================
// Managed Resources
// =============================================================================

impl From<wire::validate_resource_type_config::Request> for ValidateResourceConfigRequest {
    fn from(proto: wire::validate_resource_type_config::Request) -> Self {
        Self {
            type_name: proto.type_name,
            config: proto.config.map(Into::into),
            client_capabilities: proto.client_capabilities.map(Into::into),
        }
    }
}

impl From<wire::upgrade_resource_state::Request> for UpgradeResourceStateRequest {
    fn from(proto: wire::upgrade_resource_state::Request) -> Self {
        Self {
            type_name: proto.type_name,
            version: proto.version,
            raw_state: proto.raw_state.map(Into::into),
        }
    }
}

impl From<wire::upgrade_resource_identity::Request> for UpgradeResourceIdentityRequest {
    fn from(proto: wire::upgrade_resource_identity::Request) -> Self {
        Self {
            type_name: proto.type_name,
            version: proto.version,
            raw_identity: proto.raw_identity.map(Into::into),
        }
    }
}

impl From<wire::read_resource::Request> for ReadResourceRequest {
    fn from(proto: wire::read_resource::Request) -> Self {
        Self {
            type_name: proto.type_name,
            current_state: proto.current_state.map(Into::into),
            private: proto.private,
            provider_meta: proto.provider_meta.map(Into::into),
            current_identity: proto.current_identity.map(Into::into),
            client_capabilities: proto.client_capabilities.map(Into::into),
        }
    }
}

impl From<wire::plan_resource_change::Request> for PlanResourceChangeRequest {
    fn from(proto: wire::plan_resource_change::Request) -> Self {
        Self {
            type_name: proto.type_name,
            prior_state: proto.prior_state.map(Into::into),
            proposed_new_state: proto.proposed_new_state.map(Into::into),
            config: proto.config.map(Into::into),
            prior_private: proto.prior_private,
            provider_meta: proto.provider_meta.map(Into::into),
            prior_identity: proto.prior_identity.map(Into::into),
            client_capabilities: proto.client_capabilities.map(Into::into),
        }
    }
}

impl From<wire::apply_resource_change::Request> for ApplyResourceChangeRequest {
    fn from(proto: wire::apply_resource_change::Request) -> Self {
        Self {
            type_name: proto.type_name,
            prior_state: proto.prior_state.map(Into::into),
            planned_state: proto.planned_state.map(Into::into),
            config: proto.config.map(Into::into),
            planned_private: proto.planned_private,
            provider_meta: proto.provider_meta.map(Into::into),
            planned_identity: proto.planned_identity.map(Into::into),
        }
    }
}

impl From<wire::import_resource_state::Request> for ImportResourceStateRequest {
    fn from(proto: wire::import_resource_state::Request) -> Self {
        Self {
            type_name: proto.type_name,
            id: proto.id,
            identity: proto.identity.map(Into::into),
            client_capabilities: proto.client_capabilities.map(Into::into),
        }
    }
}

impl From<wire::move_resource_state::Request> for MoveResourceStateRequest {
    fn from(proto: wire::move_resource_state::Request) -> Self {
        Self {
            source_provider_address: proto.source_provider_address,
            source_type_name: proto.source_type_name,
            source_schema_version: proto.source_schema_version,
            source_state: proto.source_state.map(Into::into),
            target_type_name: proto.target_type_name,
            source_private: proto.source_private,
            source_identity: proto.source_identity.map(Into::into),
        }
    }
}

// =============================================================================
// Data Sources
// =============================================================================

impl From<wire::validate_data_source_config::Request> for ValidateDataResourceConfigRequest {
    fn from(proto: wire::validate_data_source_config::Request) -> Self {
        Self {
            type_name: proto.type_name,
            config: proto.config.map(Into::into),
        }
    }
}

impl From<wire::read_data_source::Request> for ReadDataSourceRequest {
    fn from(proto: wire::read_data_source::Request) -> Self {
        Self {
            type_name: proto.type_name,
            config: proto.config.map(Into::into),
            provider_meta: proto.provider_meta.map(Into::into),
            client_capabilities: proto.client_capabilities.map(Into::into),
        }
    }
}

// =============================================================================
// Ephemeral Resources
// =============================================================================

impl From<wire::validate_ephemeral_resource_config::Request>
    for ValidateEphemeralResourceConfigRequest
{
    fn from(proto: wire::validate_ephemeral_resource_config::Request) -> Self {
        Self {
            type_name: proto.type_name,
            config: proto.config.map(Into::into),
        }
    }
}

impl From<wire::open_ephemeral_resource::Request> for OpenEphemeralResourceRequest {
    fn from(proto: wire::open_ephemeral_resource::Request) -> Self {
        Self {
            type_name: proto.type_name,
            config: proto.config.map(Into::into),
            client_capabilities: proto.client_capabilities.map(Into::into),
        }
    }
}

impl From<wire::renew_ephemeral_resource::Request> for RenewEphemeralResourceRequest {
    fn from(proto: wire::renew_ephemeral_resource::Request) -> Self {
        Self {
            type_name: proto.type_name,
            prior_state: proto.prior_state.map(Into::into),
            private: proto.private,
        }
    }
}

impl From<wire::close_ephemeral_resource::Request> for CloseEphemeralResourceRequest {
    fn from(proto: wire::close_ephemeral_resource::Request) -> Self {
        Self {
            type_name: proto.type_name,
            prior_state: proto.prior_state.map(Into::into),
            private: proto.private,
        }
    }
}

// =============================================================================
// Functions
// =============================================================================

impl From<wire::get_functions::Request> for GetFunctionsRequest {
    fn from(_proto: wire::get_functions::Request) -> Self {
        Self {}
    }
}

impl From<wire::call_function::Request> for CallFunctionRequest {
    fn from(proto: wire::call_function::Request) -> Self {
        Self {
            name: proto.name,
            arguments: proto.arguments.into_iter().map(Into::into).collect(),
        }
    }
}

// =============================================================================
// List Resources
// =============================================================================

impl From<wire::validate_list_resource_config::Request> for ValidateListResourceConfigRequest {
    fn from(proto: wire::validate_list_resource_config::Request) -> Self {
        Self {
            type_name: proto.type_name,
            config: proto.config.map(Into::into),
            include_resource_object: proto.include_resource_object.map(Into::into),
            limit: proto.limit.map(Into::into),
        }
    }
}

impl From<wire::list_resource::Request> for ListResourceRequest {
    fn from(proto: wire::list_resource::Request) -> Self {
        Self {
            type_name: proto.type_name,
            config: proto.config.map(Into::into),
            include_resource: proto.include_resource_object,
            limit: proto.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::diagnostic::DiagnosticSeverity;
    use crate::schema::{
        NestedBlockNesting, SchemaAttribute, SchemaBlock, SchemaNestedBlock, StringKind,
    };
    use crate::types::DeferredReason;

    #[test]
    fn test_dynamic_value_empty_fields() {
        let value: DynamicValue = wire::DynamicValue {
            msgpack: vec![0xc0],
            json: Vec::new(),
        }
        .into();
        assert_eq!(value.msgpack, Some(vec![0xc0]));
        assert_eq!(value.json, None);

        let value: DynamicValue = wire::DynamicValue::default().into();
        assert!(value.is_empty());
    }

    #[test]
    fn test_zero_value_request() {
        let req: ReadResourceRequest = wire::read_resource::Request::default().into();
        assert_eq!(req, ReadResourceRequest::default());
        assert!(req.client_capabilities.is_none());
        assert!(req.private.is_empty());
    }

    #[test]
    fn test_attribute_path_stops_at_empty_step() {
        use wire::attribute_path::{step::Selector, Step};

        let proto = wire::AttributePath {
            steps: vec![
                Step {
                    selector: Some(Selector::AttributeName("rule".to_string())),
                },
                Step {
                    selector: Some(Selector::ElementKeyInt(2)),
                },
                Step { selector: None },
                Step {
                    selector: Some(Selector::ElementKeyString("http".to_string())),
                },
            ],
        };
        let path: AttributePath = proto.into();
        assert_eq!(path, AttributePath::root("rule").with_element_key_int(2));
    }

    #[test]
    fn test_attribute_path_steps() {
        use wire::attribute_path::{step::Selector, Step};

        let proto = wire::AttributePath {
            steps: vec![
                Step {
                    selector: Some(Selector::AttributeName("rule".to_string())),
                },
                Step {
                    selector: Some(Selector::ElementKeyString("http".to_string())),
                },
                Step {
                    selector: Some(Selector::ElementKeyInt(-1)),
                },
            ],
        };
        let path: AttributePath = proto.into();
        assert_eq!(
            path,
            AttributePath::root("rule")
                .with_element_key_string("http")
                .with_element_key_int(-1)
        );
    }

    #[test]
    fn test_diagnostic_severity_unrecognized() {
        let diag: Diagnostic = wire::Diagnostic {
            severity: 7,
            summary: "odd".to_string(),
            ..Default::default()
        }
        .into();
        assert_eq!(diag.severity, DiagnosticSeverity::Unrecognized(7));
        assert!(diag.attribute.is_none());
    }

    #[test]
    fn test_deferred_reason() {
        let deferred: Deferred = wire::Deferred {
            reason: wire::deferred::Reason::AbsentPrereq as i32,
        }
        .into();
        assert_eq!(deferred.reason, DeferredReason::AbsentPrereq);
    }

    #[test]
    fn test_schema_parses_types() {
        let proto = wire::Schema {
            version: 2,
            block: Some(wire::schema::Block {
                attributes: vec![wire::schema::Attribute {
                    name: "tags".to_string(),
                    r#type: br#"["map","string"]"#.to_vec(),
                    optional: true,
                    ..Default::default()
                }],
                block_types: vec![wire::schema::NestedBlock {
                    type_name: "rule".to_string(),
                    block: Some(wire::schema::Block::default()),
                    nesting: wire::schema::nested_block::NestingMode::List as i32,
                    ..Default::default()
                }],
                ..Default::default()
            }),
        };
        let schema = Schema::try_from(proto).unwrap();
        assert_eq!(schema.version, 2);
        let block = schema.block.unwrap();
        assert_eq!(block.attributes[0].ty, Some(Type::map(Type::String)));
        assert_eq!(block.block_types[0].nesting, NestedBlockNesting::List);
    }

    #[test]
    fn test_schema_invalid_type_json() {
        let proto = wire::schema::Attribute {
            name: "broken".to_string(),
            r#type: b"not json".to_vec(),
            ..Default::default()
        };
        assert!(SchemaAttribute::try_from(proto).is_err());
    }

    #[test]
    fn test_list_resource_request() {
        let req: ListResourceRequest = wire::list_resource::Request {
            type_name: "examplecloud_instance".to_string(),
            include_resource_object: true,
            limit: 10,
            ..Default::default()
        }
        .into();
        assert!(req.include_resource);
        assert_eq!(req.limit, 10);
        assert!(req.config.is_none());
    }

    #[test]
    fn test_prepare_provider_config() {
        let req: ValidateProviderConfigRequest = wire::prepare_provider_config::Request {
            config: Some(wire::DynamicValue {
                msgpack: vec![0x80],
                json: Vec::new(),
            }),
        }
        .into();
        assert_eq!(req.config.unwrap().msgpack, Some(vec![0x80]));
    }

    #[test]
    fn test_legacy_rpc_names() {
        let req: ValidateResourceConfigRequest = wire::validate_resource_type_config::Request {
            type_name: "examplecloud_instance".to_string(),
            ..Default::default()
        }
        .into();
        assert_eq!(req.type_name, "examplecloud_instance");

        let req: ConfigureProviderRequest = wire::configure::Request {
            terraform_version: "1.14.0".to_string(),
            client_capabilities: Some(wire::ClientCapabilities {
                deferral_allowed: true,
                write_only_attributes_allowed: true,
            }),
            ..Default::default()
        }
        .into();
        assert_eq!(req.terraform_version, "1.14.0");
        assert!(req.client_capabilities.unwrap().write_only_attributes_allowed);
    }

    /// Sends a value out through the response conversion and reads it back
    /// through the request conversion.
    fn through_wire<T, W>(value: T) -> T
    where
        W: From<T>,
        T: From<W>,
    {
        T::from(W::from(value))
    }

    #[test]
    fn test_shared_types_survive_the_wire() {
        let path = AttributePath::root("rule")
            .with_element_key_int(0)
            .with_element_key_string("http");

        for diag in [
            Diagnostic::default(),
            Diagnostic::error("bad port").with_detail("must be below 65536"),
            Diagnostic::warning("deprecated").with_attribute(path.clone()),
            Diagnostic {
                severity: DiagnosticSeverity::Unrecognized(9),
                summary: "odd".to_string(),
                ..Default::default()
            },
        ] {
            assert_eq!(through_wire::<_, wire::Diagnostic>(diag.clone()), diag);
        }

        for path in [AttributePath::new(), AttributePath::root("id"), path] {
            assert_eq!(through_wire::<_, wire::AttributePath>(path.clone()), path);
        }

        for value in [
            DynamicValue::default(),
            DynamicValue::from_msgpack(vec![0x81, 0xa1, 0x61, 0x01]),
            DynamicValue::from_json(br#"{"a":1}"#.to_vec()),
        ] {
            assert_eq!(through_wire::<_, wire::DynamicValue>(value.clone()), value);
        }

        for state in [
            RawState::default(),
            RawState {
                json: Some(br#"{"id":"x"}"#.to_vec()),
                flatmap: HashMap::from([("id".to_string(), "x".to_string())]),
            },
        ] {
            assert_eq!(through_wire::<_, wire::RawState>(state.clone()), state);
        }

        for identity in [
            ResourceIdentityData::default(),
            ResourceIdentityData {
                identity_data: Some(DynamicValue::from_msgpack(vec![0xc0])),
            },
        ] {
            assert_eq!(
                through_wire::<_, wire::ResourceIdentityData>(identity.clone()),
                identity
            );
        }

        for reason in [
            DeferredReason::Unknown,
            DeferredReason::ResourceConfigUnknown,
            DeferredReason::ProviderConfigUnknown,
            DeferredReason::AbsentPrereq,
            DeferredReason::Unrecognized(40),
        ] {
            let deferred = Deferred::new(reason);
            assert_eq!(through_wire::<_, wire::Deferred>(deferred), deferred);
        }

        for err in [
            FunctionError::default(),
            FunctionError::new("division by zero"),
            FunctionError::new("bad index").with_argument(1),
        ] {
            assert_eq!(through_wire::<_, wire::FunctionError>(err.clone()), err);
        }
    }

    #[test]
    fn test_schemas_survive_the_wire() {
        let block = SchemaBlock::new()
            .with_attribute(SchemaAttribute::required("name", Type::String))
            .with_attribute(
                SchemaAttribute::optional("ports", Type::list(Type::Number)).sensitive(),
            )
            .with_attribute(
                SchemaAttribute::computed("tags", Type::map(Type::String))
                    .with_description("**tags**")
                    .with_description_kind(StringKind::Markdown),
            )
            .with_block(
                SchemaNestedBlock::list(
                    "rule",
                    SchemaBlock::new()
                        .with_attribute(SchemaAttribute::required("cidr", Type::String)),
                )
                .with_min_items(1)
                .with_max_items(4),
            )
            .deprecated();

        for schema in [Schema::default(), Schema::new(3, block)] {
            let back = Schema::try_from(wire::Schema::from(schema.clone())).unwrap();
            assert_eq!(back, schema);
        }

        let function = Function::new(Type::Number)
            .with_parameter(FunctionParameter::new("value", Type::String).allow_null())
            .with_variadic_parameter(FunctionParameter::new("rest", Type::DynamicPseudoType))
            .with_summary("parse")
            .with_deprecation_message("use decode");
        let back = Function::try_from(wire::Function::from(function.clone())).unwrap();
        assert_eq!(back, function);
    }
}
