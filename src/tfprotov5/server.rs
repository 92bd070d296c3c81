//! The protocol version 5 server.
//!
//! [`Server`] implements the generated `tfplugin5.Provider` service trait.
//! The trait carries the legacy RPC names (`get_schema`,
//! `prepare_provider_config`, `configure`, `stop`, ...) while the provider
//! implements the protocol 6 flavored [`ProviderService`] methods.

use std::sync::Arc;

use tonic::{Request, Response, Status};

use super::generated as wire;
use super::generated::provider_server::Provider;
use super::toproto;
use crate::data_source::{ReadDataSourceRequest, ValidateDataResourceConfigRequest};
use crate::ephemeral::{
    CloseEphemeralResourceRequest, OpenEphemeralResourceRequest, RenewEphemeralResourceRequest,
    ValidateEphemeralResourceConfigRequest,
};
use crate::function::{CallFunctionRequest, GetFunctionsRequest};
use crate::list_resource::{ListResourceRequest, ValidateListResourceConfigRequest};
use crate::logging::{
    KEY_DATA_SOURCE_TYPE, KEY_EPHEMERAL_RESOURCE_TYPE, KEY_FUNCTION_NAME, KEY_LIST_RESOURCE_TYPE,
    KEY_RESOURCE_TYPE,
};
use crate::provider::{
    ConfigureProviderRequest, GetMetadataRequest, GetProviderSchemaRequest,
    GetResourceIdentitySchemasRequest, StopProviderRequest, StopProviderResponse,
    ValidateProviderConfigRequest,
};
use crate::resource::{
    ApplyResourceChangeRequest, ImportResourceStateRequest, MoveResourceStateRequest,
    PlanResourceChangeRequest, ReadResourceRequest, UpgradeResourceIdentityRequest,
    UpgradeResourceStateRequest, ValidateResourceConfigRequest,
};
use crate::server::{Dispatcher, MapFramer, ProviderService, ResponseStream, ServeOptions};

const PROTO_VERSION: &str = super::PROTOCOL_VERSION;

/// Serves a [`ProviderService`] over protocol version 5.
pub struct Server<P> {
    dispatcher: Dispatcher<P>,
}

impl<P: ProviderService> Server<P> {
    /// Create a server for `provider`.
    pub fn new(provider: P, options: ServeOptions) -> Self {
        Self::from_arc(Arc::new(provider), options)
    }

    /// Create a server for a provider that is shared elsewhere.
    pub fn from_arc(provider: Arc<P>, options: ServeOptions) -> Self {
        Self {
            dispatcher: Dispatcher::new(provider, options),
        }
    }

    /// The provider being served.
    pub fn provider(&self) -> &Arc<P> {
        &self.dispatcher.provider
    }

    /// The options the server was created with.
    pub fn options(&self) -> &ServeOptions {
        &self.dispatcher.options
    }
}

#[tonic::async_trait]
impl<P: ProviderService> Provider for Server<P> {
    type ListResourceStream = ResponseStream<wire::list_resource::Event>;

    // =========================================================================
    // Provider
    // =========================================================================

    /// GetMetadata RPC.
    async fn get_metadata(
        &self,
        request: Request<wire::get_metadata::Request>,
    ) -> Result<Response<wire::get_metadata::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "GetMetadata");
        self.dispatcher
            .unary(span, request, |p: Arc<P>, req: GetMetadataRequest| async move {
                p.get_metadata(req).await
            })
            .await
    }

    /// GetSchema RPC. Action and state store schemas are not sent.
    async fn get_schema(
        &self,
        request: Request<wire::get_provider_schema::Request>,
    ) -> Result<Response<wire::get_provider_schema::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "GetSchema");
        self.dispatcher
            .unary(span, request, |p: Arc<P>, req: GetProviderSchemaRequest| async move {
                p.get_provider_schema(req).await
            })
            .await
    }

    /// GetResourceIdentitySchemas RPC.
    async fn get_resource_identity_schemas(
        &self,
        request: Request<wire::get_resource_identity_schemas::Request>,
    ) -> Result<Response<wire::get_resource_identity_schemas::Response>, Status> {
        let span = self
            .dispatcher
            .span(PROTO_VERSION, "GetResourceIdentitySchemas");
        self.dispatcher
            .unary(
                span,
                request,
                |p: Arc<P>, req: GetResourceIdentitySchemasRequest| async move {
                    p.get_resource_identity_schemas(req).await
                },
            )
            .await
    }

    /// PrepareProviderConfig RPC, served by the provider's config validation.
    async fn prepare_provider_config(
        &self,
        request: Request<wire::prepare_provider_config::Request>,
    ) -> Result<Response<wire::prepare_provider_config::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "PrepareProviderConfig");
        self.dispatcher
            .unary(span, request, |p: Arc<P>, req: ValidateProviderConfigRequest| async move {
                p.validate_provider_config(req).await
            })
            .await
    }

    /// Configure RPC.
    async fn configure(
        &self,
        request: Request<wire::configure::Request>,
    ) -> Result<Response<wire::configure::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "Configure");
        self.dispatcher
            .unary(span, request, |p: Arc<P>, req: ConfigureProviderRequest| async move {
                p.configure_provider(req).await
            })
            .await
    }

    /// Stop RPC. In-flight requests are cancelled once the handler returns.
    async fn stop(
        &self,
        request: Request<wire::stop::Request>,
    ) -> Result<Response<wire::stop::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "Stop");
        let result = self
            .dispatcher
            .unary(span, request, |p: Arc<P>, req: StopProviderRequest| async move {
                Ok(p.stop_provider(req)
                    .await
                    .unwrap_or_else(|err| StopProviderResponse {
                        error: err.to_string(),
                    }))
            })
            .await;
        self.dispatcher.cancel_in_flight();
        result
    }

    // =========================================================================
    // Managed Resources
    // =========================================================================

    /// ValidateResourceTypeConfig RPC.
    async fn validate_resource_type_config(
        &self,
        request: Request<wire::validate_resource_type_config::Request>,
    ) -> Result<Response<wire::validate_resource_type_config::Response>, Status> {
        let span = self
            .dispatcher
            .span(PROTO_VERSION, "ValidateResourceTypeConfig");
        span.record(KEY_RESOURCE_TYPE, request.get_ref().type_name.as_str());
        self.dispatcher
            .unary(span, request, |p: Arc<P>, req: ValidateResourceConfigRequest| async move {
                p.validate_resource_config(req).await
            })
            .await
    }

    /// UpgradeResourceState RPC.
    async fn upgrade_resource_state(
        &self,
        request: Request<wire::upgrade_resource_state::Request>,
    ) -> Result<Response<wire::upgrade_resource_state::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "UpgradeResourceState");
        span.record(KEY_RESOURCE_TYPE, request.get_ref().type_name.as_str());
        self.dispatcher
            .unary(span, request, |p: Arc<P>, req: UpgradeResourceStateRequest| async move {
                p.upgrade_resource_state(req).await
            })
            .await
    }

    /// UpgradeResourceIdentity RPC.
    async fn upgrade_resource_identity(
        &self,
        request: Request<wire::upgrade_resource_identity::Request>,
    ) -> Result<Response<wire::upgrade_resource_identity::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "UpgradeResourceIdentity");
        span.record(KEY_RESOURCE_TYPE, request.get_ref().type_name.as_str());
        self.dispatcher
            .unary(span, request, |p: Arc<P>, req: UpgradeResourceIdentityRequest| async move {
                p.upgrade_resource_identity(req).await
            })
            .await
    }

    /// ReadResource RPC.
    async fn read_resource(
        &self,
        request: Request<wire::read_resource::Request>,
    ) -> Result<Response<wire::read_resource::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "ReadResource");
        span.record(KEY_RESOURCE_TYPE, request.get_ref().type_name.as_str());
        self.dispatcher
            .unary(span, request, |p: Arc<P>, req: ReadResourceRequest| async move {
                p.read_resource(req).await
            })
            .await
    }

    /// PlanResourceChange RPC.
    async fn plan_resource_change(
        &self,
        request: Request<wire::plan_resource_change::Request>,
    ) -> Result<Response<wire::plan_resource_change::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "PlanResourceChange");
        span.record(KEY_RESOURCE_TYPE, request.get_ref().type_name.as_str());
        self.dispatcher
            .unary(span, request, |p: Arc<P>, req: PlanResourceChangeRequest| async move {
                p.plan_resource_change(req).await
            })
            .await
    }

    /// ApplyResourceChange RPC.
    async fn apply_resource_change(
        &self,
        request: Request<wire::apply_resource_change::Request>,
    ) -> Result<Response<wire::apply_resource_change::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "ApplyResourceChange");
        span.record(KEY_RESOURCE_TYPE, request.get_ref().type_name.as_str());
        self.dispatcher
            .unary(span, request, |p: Arc<P>, req: ApplyResourceChangeRequest| async move {
                p.apply_resource_change(req).await
            })
            .await
    }

    /// ImportResourceState RPC.
    async fn import_resource_state(
        &self,
        request: Request<wire::import_resource_state::Request>,
    ) -> Result<Response<wire::import_resource_state::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "ImportResourceState");
        span.record(KEY_RESOURCE_TYPE, request.get_ref().type_name.as_str());
        self.dispatcher
            .unary(span, request, |p: Arc<P>, req: ImportResourceStateRequest| async move {
                p.import_resource_state(req).await
            })
            .await
    }

    /// MoveResourceState RPC. The span carries the target type.
    async fn move_resource_state(
        &self,
        request: Request<wire::move_resource_state::Request>,
    ) -> Result<Response<wire::move_resource_state::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "MoveResourceState");
        span.record(
            KEY_RESOURCE_TYPE,
            request.get_ref().target_type_name.as_str(),
        );
        self.dispatcher
            .unary(span, request, |p: Arc<P>, req: MoveResourceStateRequest| async move {
                p.move_resource_state(req).await
            })
            .await
    }

    // =========================================================================
    // Data Sources
    // =========================================================================

    /// ValidateDataSourceConfig RPC.
    async fn validate_data_source_config(
        &self,
        request: Request<wire::validate_data_source_config::Request>,
    ) -> Result<Response<wire::validate_data_source_config::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "ValidateDataSourceConfig");
        span.record(KEY_DATA_SOURCE_TYPE, request.get_ref().type_name.as_str());
        self.dispatcher
            .unary(
                span,
                request,
                |p: Arc<P>, req: ValidateDataResourceConfigRequest| async move {
                    p.validate_data_resource_config(req).await
                },
            )
            .await
    }

    /// ReadDataSource RPC.
    async fn read_data_source(
        &self,
        request: Request<wire::read_data_source::Request>,
    ) -> Result<Response<wire::read_data_source::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "ReadDataSource");
        span.record(KEY_DATA_SOURCE_TYPE, request.get_ref().type_name.as_str());
        self.dispatcher
            .unary(span, request, |p: Arc<P>, req: ReadDataSourceRequest| async move {
                p.read_data_source(req).await
            })
            .await
    }

    // =========================================================================
    // Ephemeral Resources
    // =========================================================================

    /// ValidateEphemeralResourceConfig RPC.
    async fn validate_ephemeral_resource_config(
        &self,
        request: Request<wire::validate_ephemeral_resource_config::Request>,
    ) -> Result<Response<wire::validate_ephemeral_resource_config::Response>, Status> {
        let span = self
            .dispatcher
            .span(PROTO_VERSION, "ValidateEphemeralResourceConfig");
        span.record(
            KEY_EPHEMERAL_RESOURCE_TYPE,
            request.get_ref().type_name.as_str(),
        );
        self.dispatcher
            .unary(
                span,
                request,
                |p: Arc<P>, req: ValidateEphemeralResourceConfigRequest| async move {
                    p.validate_ephemeral_resource_config(req).await
                },
            )
            .await
    }

    /// OpenEphemeralResource RPC.
    async fn open_ephemeral_resource(
        &self,
        request: Request<wire::open_ephemeral_resource::Request>,
    ) -> Result<Response<wire::open_ephemeral_resource::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "OpenEphemeralResource");
        span.record(
            KEY_EPHEMERAL_RESOURCE_TYPE,
            request.get_ref().type_name.as_str(),
        );
        self.dispatcher
            .unary(span, request, |p: Arc<P>, req: OpenEphemeralResourceRequest| async move {
                p.open_ephemeral_resource(req).await
            })
            .await
    }

    /// RenewEphemeralResource RPC.
    async fn renew_ephemeral_resource(
        &self,
        request: Request<wire::renew_ephemeral_resource::Request>,
    ) -> Result<Response<wire::renew_ephemeral_resource::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "RenewEphemeralResource");
        span.record(
            KEY_EPHEMERAL_RESOURCE_TYPE,
            request.get_ref().type_name.as_str(),
        );
        self.dispatcher
            .unary(span, request, |p: Arc<P>, req: RenewEphemeralResourceRequest| async move {
                p.renew_ephemeral_resource(req).await
            })
            .await
    }

    /// CloseEphemeralResource RPC.
    async fn close_ephemeral_resource(
        &self,
        request: Request<wire::close_ephemeral_resource::Request>,
    ) -> Result<Response<wire::close_ephemeral_resource::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "CloseEphemeralResource");
        span.record(
            KEY_EPHEMERAL_RESOURCE_TYPE,
            request.get_ref().type_name.as_str(),
        );
        self.dispatcher
            .unary(span, request, |p: Arc<P>, req: CloseEphemeralResourceRequest| async move {
                p.close_ephemeral_resource(req).await
            })
            .await
    }

    // =========================================================================
    // Functions
    // =========================================================================

    /// GetFunctions RPC.
    async fn get_functions(
        &self,
        request: Request<wire::get_functions::Request>,
    ) -> Result<Response<wire::get_functions::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "GetFunctions");
        self.dispatcher
            .unary(span, request, |p: Arc<P>, req: GetFunctionsRequest| async move {
                p.get_functions(req).await
            })
            .await
    }

    /// CallFunction RPC.
    async fn call_function(
        &self,
        request: Request<wire::call_function::Request>,
    ) -> Result<Response<wire::call_function::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "CallFunction");
        span.record(KEY_FUNCTION_NAME, request.get_ref().name.as_str());
        self.dispatcher
            .unary(span, request, |p: Arc<P>, req: CallFunctionRequest| async move {
                p.call_function(req).await
            })
            .await
    }

    // =========================================================================
    // List Resources
    // =========================================================================

    /// ValidateListResourceConfig RPC.
    async fn validate_list_resource_config(
        &self,
        request: Request<wire::validate_list_resource_config::Request>,
    ) -> Result<Response<wire::validate_list_resource_config::Response>, Status> {
        let span = self
            .dispatcher
            .span(PROTO_VERSION, "ValidateListResourceConfig");
        span.record(KEY_LIST_RESOURCE_TYPE, request.get_ref().type_name.as_str());
        self.dispatcher
            .unary(
                span,
                request,
                |p: Arc<P>, req: ValidateListResourceConfigRequest| async move {
                    p.validate_list_resource_config(req).await
                },
            )
            .await
    }

    /// ListResource RPC, one event per result.
    async fn list_resource(
        &self,
        request: Request<wire::list_resource::Request>,
    ) -> Result<Response<Self::ListResourceStream>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "ListResource");
        span.record(KEY_LIST_RESOURCE_TYPE, request.get_ref().type_name.as_str());
        Ok(self.dispatcher.streaming(
            span,
            request,
            MapFramer(toproto::list_resource_event),
            |p: Arc<P>, req: ListResourceRequest, results| async move {
                p.list_resource(req, results).await
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio_stream::StreamExt;
    use tokio_test::{assert_err, assert_ok};

    use crate::error::ProviderError;
    use crate::list_resource::{ListResourceResult, ListResourceSender};
    use crate::provider::{
        ConfigureProviderResponse, GetProviderSchemaResponse, ValidateProviderConfigResponse,
    };
    use crate::resource::{
        ApplyResourceChangeResponse, PlanResourceChangeResponse, ReadResourceResponse,
    };
    use crate::schema::{Schema, SchemaAttribute, SchemaBlock, SchemaObject};
    use crate::testing::LogCapture;
    use crate::tftypes::Type;
    use crate::types::DynamicValue;

    #[derive(Default)]
    struct LegacyProvider {
        stops: AtomicUsize,
    }

    #[crate::async_trait]
    impl ProviderService for LegacyProvider {
        async fn get_provider_schema(
            &self,
            _req: GetProviderSchemaRequest,
        ) -> Result<GetProviderSchemaResponse, ProviderError> {
            let block = SchemaBlock::new()
                .with_attribute(SchemaAttribute::required("name", Type::String))
                .with_attribute(SchemaAttribute::nested(
                    "disk",
                    SchemaObject::single(vec![SchemaAttribute::required("size", Type::Number)]),
                ));
            Ok(GetProviderSchemaResponse::new(Schema::new(0, SchemaBlock::new()))
                .with_resource("examplecloud_instance", Schema::new(0, block))
                .with_state_store("examplecloud_store", Schema::new(0, SchemaBlock::new())))
        }

        async fn validate_provider_config(
            &self,
            req: ValidateProviderConfigRequest,
        ) -> Result<ValidateProviderConfigResponse, ProviderError> {
            Ok(ValidateProviderConfigResponse {
                prepared_config: req.config,
                diagnostics: Vec::new(),
            })
        }

        async fn configure_provider(
            &self,
            _req: ConfigureProviderRequest,
        ) -> Result<ConfigureProviderResponse, ProviderError> {
            Ok(ConfigureProviderResponse::default())
        }

        async fn stop_provider(
            &self,
            _req: StopProviderRequest,
        ) -> Result<StopProviderResponse, ProviderError> {
            if self.stops.fetch_add(1, Ordering::SeqCst) > 0 {
                return Err(ProviderError::FailedPrecondition(
                    "already stopped".to_string(),
                ));
            }
            Ok(StopProviderResponse::default())
        }

        async fn read_resource(
            &self,
            req: ReadResourceRequest,
        ) -> Result<ReadResourceResponse, ProviderError> {
            Ok(ReadResourceResponse {
                new_state: req.current_state,
                ..Default::default()
            })
        }

        async fn plan_resource_change(
            &self,
            req: PlanResourceChangeRequest,
        ) -> Result<PlanResourceChangeResponse, ProviderError> {
            Ok(PlanResourceChangeResponse {
                planned_state: req.proposed_new_state,
                ..Default::default()
            })
        }

        async fn apply_resource_change(
            &self,
            req: ApplyResourceChangeRequest,
        ) -> Result<ApplyResourceChangeResponse, ProviderError> {
            Ok(ApplyResourceChangeResponse {
                new_state: req.planned_state,
                ..Default::default()
            })
        }

        async fn list_resource(
            &self,
            req: ListResourceRequest,
            results: ListResourceSender,
        ) -> Result<(), ProviderError> {
            for n in 0..req.limit {
                let result = ListResourceResult {
                    display_name: format!("legacy-{}", n),
                    resource: req
                        .include_resource
                        .then(|| DynamicValue::from_msgpack(vec![0xc0])),
                    ..Default::default()
                };
                if !results.send(result).await {
                    break;
                }
            }
            Ok(())
        }
    }

    fn server() -> Server<LegacyProvider> {
        Server::new(
            LegacyProvider::default(),
            ServeOptions::new("registry.terraform.io/example/legacy"),
        )
    }

    #[tokio::test]
    async fn test_get_schema_drops_newer_features() {
        let server = server();
        let resp = assert_ok!(
            server
                .get_schema(Request::new(wire::get_provider_schema::Request {}))
                .await
        )
        .into_inner();

        let block = resp.resource_schemas["examplecloud_instance"]
            .block
            .clone()
            .unwrap();
        let disk = block
            .attributes
            .iter()
            .find(|attr| attr.name == "disk")
            .unwrap();
        let expected = Type::object([("size".to_string(), Type::Number)]);
        assert_eq!(Type::parse_json(&disk.r#type).unwrap(), expected);
        assert!(resp.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_get_metadata() {
        let server = server();
        let resp = assert_ok!(
            server
                .get_metadata(Request::new(wire::get_metadata::Request {}))
                .await
        )
        .into_inner();
        assert_eq!(resp.resources.len(), 1);
        assert!(resp.data_sources.is_empty());
    }

    #[tokio::test]
    async fn test_prepare_provider_config() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());
        let server = server();

        let request = wire::prepare_provider_config::Request {
            config: Some(wire::DynamicValue {
                msgpack: vec![0x80],
                json: Vec::new(),
            }),
        };
        let resp = assert_ok!(server.prepare_provider_config(Request::new(request)).await)
            .into_inner();
        assert_eq!(resp.prepared_config.unwrap().msgpack, vec![0x80]);

        let record = capture.find("Served request").unwrap();
        assert_eq!(record["tf_rpc"], "PrepareProviderConfig");
        assert_eq!(record["tf_proto_version"], "5.10");
    }

    #[tokio::test]
    async fn test_read_resource_span_fields() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());
        let server = server();

        let request = wire::read_resource::Request {
            type_name: "examplecloud_instance".to_string(),
            current_state: Some(wire::DynamicValue {
                msgpack: vec![0xc0],
                json: Vec::new(),
            }),
            ..Default::default()
        };
        let resp = assert_ok!(server.read_resource(Request::new(request)).await).into_inner();
        assert_eq!(resp.new_state.unwrap().msgpack, vec![0xc0]);

        let record = capture.find("No announced client capabilities").unwrap();
        assert_eq!(record["tf_resource_type"], "examplecloud_instance");
        assert_eq!(record["tf_rpc"], "ReadResource");
    }

    #[tokio::test]
    async fn test_stop_reports_handler_error() {
        let server = server();
        let first = assert_ok!(server.stop(Request::new(wire::stop::Request {})).await);
        assert!(first.into_inner().error.is_empty());

        let second = assert_ok!(server.stop(Request::new(wire::stop::Request {})).await);
        assert_eq!(
            second.into_inner().error,
            "Failed precondition: already stopped"
        );
    }

    #[tokio::test]
    async fn test_list_resource() {
        let server = server();
        let request = wire::list_resource::Request {
            type_name: "examplecloud_instance".to_string(),
            include_resource_object: true,
            limit: 2,
            ..Default::default()
        };
        let stream = assert_ok!(server.list_resource(Request::new(request)).await).into_inner();
        let events: Vec<_> = stream.map(Result::unwrap).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].display_name, "legacy-1");
        assert_eq!(events[0].resource_object.as_ref().unwrap().msgpack, vec![0xc0]);
    }

    #[tokio::test]
    async fn test_unsupported_function() {
        let server = server();
        let status = assert_err!(
            server
                .call_function(Request::new(wire::call_function::Request {
                    name: "parse".to_string(),
                    arguments: Vec::new(),
                }))
                .await
        );
        assert!(status.message().contains("parse"));
    }

    #[tokio::test]
    async fn test_generated_service_routes() {
        use tonic::codegen::{http, Service};
        use tonic::server::NamedService;

        use crate::tfprotov5::generated::provider_server::ProviderServer;

        assert_eq!(
            <ProviderServer<Server<LegacyProvider>> as NamedService>::NAME,
            "tfplugin5.Provider"
        );

        // Actions only exist in protocol 6.
        let mut service = ProviderServer::new(server());
        let request = http::Request::builder()
            .uri("/tfplugin5.Provider/InvokeAction")
            .body(tonic::body::Body::default())
            .unwrap();
        let resp = assert_ok!(service.call(request).await);
        assert_eq!(resp.headers()["grpc-status"], "12");
    }
}
