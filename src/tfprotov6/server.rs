//! The protocol version 6 server.
//!
//! [`Server`] implements the generated `tfplugin6.Provider` service trait, so
//! it can be mounted on a tonic router with
//! [`ProviderServer`](super::generated::provider_server::ProviderServer).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status};
use tracing::Instrument;

use super::generated as wire;
use super::generated::provider_server::Provider;
use super::toproto;
use crate::action::{
    CancelActionRequest, InvokeActionRequest, PlanActionRequest, ValidateActionConfigRequest,
};
use crate::data_source::{ReadDataSourceRequest, ValidateDataResourceConfigRequest};
use crate::diagnostic::Diagnostic;
use crate::ephemeral::{
    CloseEphemeralResourceRequest, OpenEphemeralResourceRequest, RenewEphemeralResourceRequest,
    ValidateEphemeralResourceConfigRequest,
};
use crate::error::ProviderError;
use crate::function::{CallFunctionRequest, GetFunctionsRequest};
use crate::list_resource::{ListResourceRequest, ValidateListResourceConfigRequest};
use crate::logging::{
    self, KEY_ACTION_TYPE, KEY_DATA_SOURCE_TYPE, KEY_EPHEMERAL_RESOURCE_TYPE, KEY_FUNCTION_NAME,
    KEY_LIST_RESOURCE_TYPE, KEY_RESOURCE_TYPE, KEY_STATE_STORE_TYPE,
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
use crate::server::{
    call_downstream, ActionFramer, Dispatcher, MapFramer, ProviderService, ResponseStream,
    ServeOptions,
};
use crate::state_store::{
    ConfigureStateStoreRequest, DeleteStateRequest, GetStatesRequest, LockStateRequest,
    ReadStateBytesRequest, StateChunks, UnlockStateRequest, ValidateStateStoreConfigRequest,
    WriteStateBytesStream, WriteStateChunk,
};

const PROTO_VERSION: &str = super::PROTOCOL_VERSION;

/// Serves a [`ProviderService`] over protocol version 6.
pub struct Server<P> {
    dispatcher: Dispatcher<P>,
    /// Negotiated chunk size per state store type.
    state_chunk_sizes: Mutex<HashMap<String, i64>>,
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
            state_chunk_sizes: Mutex::new(HashMap::new()),
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

    fn chunk_size(&self, type_name: &str) -> i64 {
        self.state_chunk_sizes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_name)
            .copied()
            .unwrap_or(0)
    }

    /// WriteStateBytes over any chunk stream.
    ///
    /// The handler reads validated chunks from a [`WriteStateBytesStream`].
    /// A transport error on the incoming stream reaches it as an error
    /// diagnostic. The span gets the store type from the first chunk's meta.
    pub async fn write_state_stream<S>(
        &self,
        request: Request<S>,
    ) -> Result<Response<wire::write_state_bytes::Response>, Status>
    where
        S: Stream<Item = Result<wire::write_state_bytes::RequestChunk, Status>> + Send + 'static,
    {
        let span = self.dispatcher.span(PROTO_VERSION, "WriteStateBytes");
        let cancel = self.dispatcher.token();
        let provider = Arc::clone(&self.dispatcher.provider);
        let current = span.clone();

        async move {
            logging::received_request();
            let mut incoming = Box::pin(request.into_inner());
            let first = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(ProviderError::Canceled(
                        "the provider server is stopping".to_string(),
                    )
                    .into());
                },
                first = incoming.next() => first,
            };
            if let Some(Ok(wire::write_state_bytes::RequestChunk {
                meta: Some(meta), ..
            })) = &first
            {
                current.record(KEY_STATE_STORE_TYPE, meta.type_name.as_str());
            }

            let chunks = tokio_stream::iter(first)
                .chain(incoming)
                .map(|item| match item {
                    Ok(chunk) => Ok(WriteStateChunk::from(chunk)),
                    Err(status) => Err(Diagnostic::error(
                        "Error receiving state chunk in WriteStateBytes",
                    )
                    .with_detail(status.message())),
                });
            let resp = call_downstream(
                provider.write_state_bytes(WriteStateBytesStream::new(chunks)),
                &cancel,
            )
            .await?;
            let wire = wire::write_state_bytes::Response::from(resp);
            logging::served_request();
            Ok(Response::new(wire))
        }
        .instrument(span)
        .await
    }
}

#[tonic::async_trait]
impl<P: ProviderService> Provider for Server<P> {
    type ListResourceStream = ResponseStream<wire::list_resource::Event>;
    type InvokeActionStream = ResponseStream<wire::invoke_action::Event>;
    type ReadStateBytesStream = ResponseStream<wire::read_state_bytes::Response>;

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

    /// GetProviderSchema RPC.
    async fn get_provider_schema(
        &self,
        request: Request<wire::get_provider_schema::Request>,
    ) -> Result<Response<wire::get_provider_schema::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "GetProviderSchema");
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

    /// ValidateProviderConfig RPC.
    async fn validate_provider_config(
        &self,
        request: Request<wire::validate_provider_config::Request>,
    ) -> Result<Response<wire::validate_provider_config::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "ValidateProviderConfig");
        self.dispatcher
            .unary(span, request, |p: Arc<P>, req: ValidateProviderConfigRequest| async move {
                p.validate_provider_config(req).await
            })
            .await
    }

    /// ConfigureProvider RPC.
    async fn configure_provider(
        &self,
        request: Request<wire::configure_provider::Request>,
    ) -> Result<Response<wire::configure_provider::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "ConfigureProvider");
        self.dispatcher
            .unary(span, request, |p: Arc<P>, req: ConfigureProviderRequest| async move {
                p.configure_provider(req).await
            })
            .await
    }

    /// StopProvider RPC.
    ///
    /// A handler error is reported in the response's `error` field. Once the
    /// handler has returned, every in-flight request of this server is
    /// cancelled.
    async fn stop_provider(
        &self,
        request: Request<wire::stop_provider::Request>,
    ) -> Result<Response<wire::stop_provider::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "StopProvider");
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

    /// ValidateResourceConfig RPC.
    async fn validate_resource_config(
        &self,
        request: Request<wire::validate_resource_config::Request>,
    ) -> Result<Response<wire::validate_resource_config::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "ValidateResourceConfig");
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

    /// ValidateDataResourceConfig RPC.
    async fn validate_data_resource_config(
        &self,
        request: Request<wire::validate_data_resource_config::Request>,
    ) -> Result<Response<wire::validate_data_resource_config::Response>, Status> {
        let span = self
            .dispatcher
            .span(PROTO_VERSION, "ValidateDataResourceConfig");
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

    // =========================================================================
    // Actions
    // =========================================================================

    /// ValidateActionConfig RPC.
    async fn validate_action_config(
        &self,
        request: Request<wire::validate_action_config::Request>,
    ) -> Result<Response<wire::validate_action_config::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "ValidateActionConfig");
        span.record(KEY_ACTION_TYPE, request.get_ref().action_type.as_str());
        self.dispatcher
            .unary(span, request, |p: Arc<P>, req: ValidateActionConfigRequest| async move {
                p.validate_action_config(req).await
            })
            .await
    }

    /// PlanAction RPC.
    async fn plan_action(
        &self,
        request: Request<wire::plan_action::Request>,
    ) -> Result<Response<wire::plan_action::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "PlanAction");
        span.record(KEY_ACTION_TYPE, request.get_ref().action_type.as_str());
        self.dispatcher
            .unary(span, request, |p: Arc<P>, req: PlanActionRequest| async move {
                p.plan_action(req).await
            })
            .await
    }

    /// InvokeAction RPC. Events pass through the action sequencer, so the
    /// stream always starts with Started and ends with one terminal event.
    async fn invoke_action(
        &self,
        request: Request<wire::invoke_action::Request>,
    ) -> Result<Response<Self::InvokeActionStream>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "InvokeAction");
        span.record(KEY_ACTION_TYPE, request.get_ref().action_type.as_str());
        Ok(self.dispatcher.streaming(
            span,
            request,
            ActionFramer::new(toproto::action_event),
            |p: Arc<P>, req: InvokeActionRequest, events| async move {
                p.invoke_action(req, events).await
            },
        ))
    }

    /// CancelAction RPC.
    async fn cancel_action(
        &self,
        request: Request<wire::cancel_action::Request>,
    ) -> Result<Response<wire::cancel_action::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "CancelAction");
        self.dispatcher
            .unary(span, request, |p: Arc<P>, req: CancelActionRequest| async move {
                p.cancel_action(req).await
            })
            .await
    }

    // =========================================================================
    // State Stores
    // =========================================================================

    /// ValidateStateStoreConfig RPC.
    async fn validate_state_store_config(
        &self,
        request: Request<wire::validate_state_store::Request>,
    ) -> Result<Response<wire::validate_state_store::Response>, Status> {
        let span = self
            .dispatcher
            .span(PROTO_VERSION, "ValidateStateStoreConfig");
        span.record(KEY_STATE_STORE_TYPE, request.get_ref().type_name.as_str());
        self.dispatcher
            .unary(
                span,
                request,
                |p: Arc<P>, req: ValidateStateStoreConfigRequest| async move {
                    p.validate_state_store_config(req).await
                },
            )
            .await
    }

    /// ConfigureStateStore RPC.
    ///
    /// The chunk size the provider answers with is used for later
    /// ReadStateBytes calls on the same store type. A provider that answers
    /// without one gets the client's.
    async fn configure_state_store(
        &self,
        request: Request<wire::configure_state_store::Request>,
    ) -> Result<Response<wire::configure_state_store::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "ConfigureStateStore");
        let type_name = request.get_ref().type_name.clone();
        span.record(KEY_STATE_STORE_TYPE, type_name.as_str());
        let client_chunk_size = request
            .get_ref()
            .capabilities
            .as_ref()
            .map_or(0, |caps| caps.chunk_size);

        let response: Response<wire::configure_state_store::Response> = self
            .dispatcher
            .unary(span, request, |p: Arc<P>, req: ConfigureStateStoreRequest| async move {
                p.configure_state_store(req).await
            })
            .await?;

        let chunk_size = response
            .get_ref()
            .capabilities
            .as_ref()
            .map(|caps| caps.chunk_size)
            .filter(|size| *size > 0)
            .unwrap_or(client_chunk_size);
        self.state_chunk_sizes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(type_name, chunk_size);
        Ok(response)
    }

    /// ReadStateBytes RPC.
    ///
    /// The handler returns the whole blob, which is sent in chunks of the
    /// negotiated size. The handler's diagnostics travel with the first chunk.
    async fn read_state_bytes(
        &self,
        request: Request<wire::read_state_bytes::Request>,
    ) -> Result<Response<Self::ReadStateBytesStream>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "ReadStateBytes");
        span.record(KEY_STATE_STORE_TYPE, request.get_ref().type_name.as_str());
        let chunk_size = self.chunk_size(&request.get_ref().type_name);
        let cancel = self.dispatcher.token();
        let provider = Arc::clone(&self.dispatcher.provider);

        async move {
            logging::received_request();
            let req = ReadStateBytesRequest::from(request.into_inner());
            let resp = call_downstream(provider.read_state_bytes(req), &cancel).await?;

            let mut frames: Vec<wire::read_state_bytes::Response> =
                StateChunks::new(&resp.bytes, chunk_size)
                    .map(Into::into)
                    .collect();
            if let Some(first) = frames.first_mut() {
                first.diagnostics = resp.diagnostics.into_iter().map(Into::into).collect();
            }
            logging::served_request();

            let stream: ResponseStream<wire::read_state_bytes::Response> =
                Box::pin(tokio_stream::iter(frames.into_iter().map(Ok::<_, Status>)));
            Ok(Response::new(stream))
        }
        .instrument(span)
        .await
    }

    /// WriteStateBytes RPC.
    async fn write_state_bytes(
        &self,
        request: Request<tonic::Streaming<wire::write_state_bytes::RequestChunk>>,
    ) -> Result<Response<wire::write_state_bytes::Response>, Status> {
        self.write_state_stream(request).await
    }

    /// GetStates RPC.
    async fn get_states(
        &self,
        request: Request<wire::get_states::Request>,
    ) -> Result<Response<wire::get_states::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "GetStates");
        span.record(KEY_STATE_STORE_TYPE, request.get_ref().type_name.as_str());
        self.dispatcher
            .unary(span, request, |p: Arc<P>, req: GetStatesRequest| async move {
                p.get_states(req).await
            })
            .await
    }

    /// DeleteState RPC.
    async fn delete_state(
        &self,
        request: Request<wire::delete_state::Request>,
    ) -> Result<Response<wire::delete_state::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "DeleteState");
        span.record(KEY_STATE_STORE_TYPE, request.get_ref().type_name.as_str());
        self.dispatcher
            .unary(span, request, |p: Arc<P>, req: DeleteStateRequest| async move {
                p.delete_state(req).await
            })
            .await
    }

    /// LockState RPC.
    async fn lock_state(
        &self,
        request: Request<wire::lock_state::Request>,
    ) -> Result<Response<wire::lock_state::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "LockState");
        span.record(KEY_STATE_STORE_TYPE, request.get_ref().type_name.as_str());
        self.dispatcher
            .unary(span, request, |p: Arc<P>, req: LockStateRequest| async move {
                p.lock_state(req).await
            })
            .await
    }

    /// UnlockState RPC.
    async fn unlock_state(
        &self,
        request: Request<wire::unlock_state::Request>,
    ) -> Result<Response<wire::unlock_state::Response>, Status> {
        let span = self.dispatcher.span(PROTO_VERSION, "UnlockState");
        span.record(KEY_STATE_STORE_TYPE, request.get_ref().type_name.as_str());
        self.dispatcher
            .unary(span, request, |p: Arc<P>, req: UnlockStateRequest| async move {
                p.unlock_state(req).await
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use tokio_test::{assert_err, assert_ok};

    use crate::action::{ActionEventSender, InvokeActionEvent};
    use crate::error::ProviderError;
    use crate::list_resource::{ListResourceResult, ListResourceSender};
    use crate::provider::{ConfigureProviderResponse, GetProviderSchemaResponse};
    use crate::resource::{
        ApplyResourceChangeResponse, PlanResourceChangeResponse, ReadResourceResponse,
    };
    use crate::schema::{Schema, SchemaAttribute, SchemaBlock};
    use crate::state_store::{
        ConfigureStateStoreResponse, GetStatesResponse, ReadStateBytesResponse, StateByteRange,
        StateChunkMeta, StateStoreServerCapabilities, WriteStateBytesResponse,
    };
    use crate::testing::LogCapture;
    use crate::tftypes::Type;

    const STORE: &str = "examplecloud_store";

    #[derive(Default)]
    struct ExampleProvider {
        stopped: AtomicBool,
        states: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[crate::async_trait]
    impl ProviderService for ExampleProvider {
        async fn get_provider_schema(
            &self,
            _req: GetProviderSchemaRequest,
        ) -> Result<GetProviderSchemaResponse, ProviderError> {
            let block = SchemaBlock::new()
                .with_attribute(SchemaAttribute::required("name", Type::String))
                .with_attribute(SchemaAttribute::computed("id", Type::String));
            Ok(GetProviderSchemaResponse::new(Schema::new(0, SchemaBlock::new()))
                .with_resource("examplecloud_instance", Schema::new(1, block))
                .with_list_resource("examplecloud_instance", Schema::new(0, SchemaBlock::new()))
                .with_state_store(STORE, Schema::new(0, SchemaBlock::new())))
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
            self.stopped.store(true, Ordering::SeqCst);
            Ok(StopProviderResponse::default())
        }

        async fn read_resource(
            &self,
            req: ReadResourceRequest,
        ) -> Result<ReadResourceResponse, ProviderError> {
            Ok(ReadResourceResponse {
                new_state: req.current_state,
                private: req.private,
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
            if req.limit < 0 {
                // Produce until the stream is closed.
                let mut n = 0;
                while results
                    .send(ListResourceResult {
                        display_name: format!("instance-{}", n),
                        ..Default::default()
                    })
                    .await
                {
                    n += 1;
                }
                return Ok(());
            }
            for n in 0..req.limit {
                let result = ListResourceResult {
                    display_name: format!("instance-{}", n),
                    ..Default::default()
                };
                if !results.send(result).await {
                    break;
                }
            }
            Ok(())
        }

        async fn invoke_action(
            &self,
            req: InvokeActionRequest,
            events: ActionEventSender,
        ) -> Result<(), ProviderError> {
            if req.action_type == "examplecloud_reboot" {
                events.send(InvokeActionEvent::started("reboot-1")).await;
            }
            events.send(InvokeActionEvent::progress("rebooting")).await;
            events.send(InvokeActionEvent::finished()).await;
            Ok(())
        }

        async fn configure_state_store(
            &self,
            _req: ConfigureStateStoreRequest,
        ) -> Result<ConfigureStateStoreResponse, ProviderError> {
            Ok(ConfigureStateStoreResponse {
                capabilities: Some(StateStoreServerCapabilities { chunk_size: 4 }),
                ..Default::default()
            })
        }

        async fn read_state_bytes(
            &self,
            req: ReadStateBytesRequest,
        ) -> Result<ReadStateBytesResponse, ProviderError> {
            let states = self.states.lock().unwrap();
            match states.get(&req.state_id) {
                Some(bytes) => Ok(ReadStateBytesResponse {
                    bytes: bytes.clone(),
                    diagnostics: Vec::new(),
                }),
                None => Err(ProviderError::NotFound(req.state_id)),
            }
        }

        async fn write_state_bytes(
            &self,
            chunks: WriteStateBytesStream,
        ) -> Result<WriteStateBytesResponse, ProviderError> {
            match chunks.collect_state().await {
                Ok(state) => {
                    let state_id = state.meta.map(|m| m.state_id).unwrap_or_default();
                    self.states.lock().unwrap().insert(state_id, state.bytes);
                    Ok(WriteStateBytesResponse::default())
                },
                Err(diag) => Ok(WriteStateBytesResponse {
                    diagnostics: vec![diag],
                }),
            }
        }

        async fn get_states(
            &self,
            _req: GetStatesRequest,
        ) -> Result<GetStatesResponse, ProviderError> {
            let mut state_ids: Vec<String> = self.states.lock().unwrap().keys().cloned().collect();
            state_ids.sort();
            Ok(GetStatesResponse {
                state_ids,
                diagnostics: Vec::new(),
            })
        }
    }

    fn server() -> Server<ExampleProvider> {
        Server::new(
            ExampleProvider::default(),
            ServeOptions::new("registry.terraform.io/example/examplecloud"),
        )
    }

    fn write_request(
        data: &[u8],
        chunk_size: i64,
        state_id: &str,
    ) -> Vec<Result<wire::write_state_bytes::RequestChunk, Status>> {
        StateChunks::new(data, chunk_size)
            .enumerate()
            .map(|(i, chunk)| {
                Ok(wire::write_state_bytes::RequestChunk {
                    meta: (i == 0).then(|| wire::RequestChunkMeta {
                        type_name: STORE.to_string(),
                        state_id: state_id.to_string(),
                    }),
                    bytes: chunk.bytes,
                    total_length: chunk.total_length,
                    range: chunk.range.map(Into::into),
                })
            })
            .collect()
    }

    #[tokio::test]
    async fn test_read_resource_logs() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());
        let server = server();

        let request = wire::read_resource::Request {
            type_name: "examplecloud_instance".to_string(),
            current_state: Some(wire::DynamicValue {
                msgpack: vec![0xc0],
                json: Vec::new(),
            }),
            client_capabilities: Some(wire::ClientCapabilities {
                deferral_allowed: true,
                write_only_attributes_allowed: false,
            }),
            ..Default::default()
        };
        let resp = assert_ok!(server.read_resource(Request::new(request)).await).into_inner();
        assert_eq!(resp.new_state.unwrap().msgpack, vec![0xc0]);

        let record = capture.find("Announced client capabilities").unwrap();
        assert_eq!(record["tf_client_capability_deferral_allowed"], true);
        assert_eq!(record["tf_client_capability_write_only_attributes_allowed"], false);
        assert_eq!(record["tf_rpc"], "ReadResource");
        assert_eq!(record["tf_proto_version"], "6.10");
        assert_eq!(record["tf_resource_type"], "examplecloud_instance");
        assert_eq!(
            record["tf_provider_addr"],
            "registry.terraform.io/example/examplecloud"
        );
        assert!(record["tf_req_id"].is_string());

        let messages = capture.messages();
        assert_eq!(messages.first().map(String::as_str), Some("Received request"));
        assert_eq!(messages.last().map(String::as_str), Some("Served request"));
    }

    #[tokio::test]
    async fn test_missing_client_capabilities() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());
        let server = server();

        let request = wire::plan_resource_change::Request {
            type_name: "examplecloud_instance".to_string(),
            ..Default::default()
        };
        assert_ok!(server.plan_resource_change(Request::new(request)).await);
        assert!(capture.find("No announced client capabilities").is_some());
    }

    #[tokio::test]
    async fn test_get_provider_schema() {
        let server = server();
        let resp = assert_ok!(
            server
                .get_provider_schema(Request::new(wire::get_provider_schema::Request {}))
                .await
        )
        .into_inner();

        let schema = &resp.resource_schemas["examplecloud_instance"];
        assert_eq!(schema.version, 1);
        let attrs = &schema.block.as_ref().unwrap().attributes;
        assert_eq!(attrs[0].name, "name");
        assert_eq!(attrs[0].r#type, br#""string""#);
        assert!(resp.state_store_schemas.contains_key(STORE));
    }

    #[tokio::test]
    async fn test_get_metadata_from_schema() {
        let server = server();
        let resp = assert_ok!(
            server
                .get_metadata(Request::new(wire::get_metadata::Request {}))
                .await
        )
        .into_inner();
        assert_eq!(resp.resources.len(), 1);
        assert_eq!(resp.resources[0].type_name, "examplecloud_instance");
        assert_eq!(resp.state_stores[0].type_name, STORE);
        assert!(resp.actions.is_empty());
    }

    #[tokio::test]
    async fn test_unimplemented_operation() {
        let server = server();
        let status = assert_err!(
            server
                .plan_action(Request::new(wire::plan_action::Request::default()))
                .await
        );
        assert_eq!(status.code(), tonic::Code::Unimplemented);
    }

    #[tokio::test]
    async fn test_unknown_data_source() {
        let server = server();
        let status = assert_err!(
            server
                .read_data_source(Request::new(wire::read_data_source::Request {
                    type_name: "examplecloud_missing".to_string(),
                    ..Default::default()
                }))
                .await
        );
        assert!(status.message().contains("examplecloud_missing"));
    }

    #[tokio::test]
    async fn test_list_resource_stream() {
        let server = server();
        let request = wire::list_resource::Request {
            type_name: "examplecloud_instance".to_string(),
            limit: 3,
            ..Default::default()
        };
        let stream = assert_ok!(server.list_resource(Request::new(request)).await).into_inner();
        let events: Vec<_> = stream.collect().await;
        let names: Vec<String> = events
            .into_iter()
            .map(|event| event.unwrap().display_name)
            .collect();
        assert_eq!(names, ["instance-0", "instance-1", "instance-2"]);
    }

    #[tokio::test]
    async fn test_invoke_action_stream() {
        use wire::invoke_action::event::Type;

        let server = server();
        let request = wire::invoke_action::Request {
            action_type: "examplecloud_reboot".to_string(),
            ..Default::default()
        };
        let stream = assert_ok!(server.invoke_action(Request::new(request)).await).into_inner();
        let events: Vec<_> = stream.map(|event| event.unwrap().r#type.unwrap()).collect().await;
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], Type::Started(started) if started.cancellation_token == "reboot-1"));
        assert!(matches!(&events[1], Type::Progress(_)));
        assert!(matches!(&events[2], Type::Finished(finished) if finished.diagnostics.is_empty()));
    }

    #[tokio::test]
    async fn test_invoke_action_without_started() {
        use wire::invoke_action::event::Type;

        let server = server();
        let request = wire::invoke_action::Request {
            action_type: "examplecloud_sloppy".to_string(),
            ..Default::default()
        };
        let stream = assert_ok!(server.invoke_action(Request::new(request)).await).into_inner();
        let events: Vec<_> = stream.map(|event| event.unwrap().r#type.unwrap()).collect().await;

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], Type::Started(_)));
        match &events[1] {
            Type::Finished(finished) => {
                assert_eq!(finished.diagnostics.len(), 1);
                assert_eq!(
                    finished.diagnostics[0].summary,
                    "Invalid InvokeAction event sequence"
                );
            },
            other => panic!("expected Finished, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stop_provider_cancels_streams() {
        let server = server();
        let request = wire::list_resource::Request {
            type_name: "examplecloud_instance".to_string(),
            limit: -1,
            ..Default::default()
        };
        let stream = assert_ok!(server.list_resource(Request::new(request)).await).into_inner();

        let resp = assert_ok!(
            server
                .stop_provider(Request::new(wire::stop_provider::Request {}))
                .await
        )
        .into_inner();
        assert!(resp.error.is_empty());
        assert!(server.provider().stopped.load(Ordering::SeqCst));

        let frames: Vec<_> = stream.collect().await;
        let last = frames.last().unwrap();
        assert_eq!(last.as_ref().unwrap_err().code(), tonic::Code::Cancelled);

        // Requests after the stop get a fresh token.
        let request = wire::read_resource::Request {
            type_name: "examplecloud_instance".to_string(),
            ..Default::default()
        };
        assert_ok!(server.read_resource(Request::new(request)).await);
    }

    #[tokio::test]
    async fn test_state_store_round_trip() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());
        let server = server();

        let configure = wire::configure_state_store::Request {
            type_name: STORE.to_string(),
            capabilities: Some(wire::StateStoreClientCapabilities { chunk_size: 2 }),
            ..Default::default()
        };
        let resp = assert_ok!(server.configure_state_store(Request::new(configure)).await)
            .into_inner();
        assert_eq!(resp.capabilities.unwrap().chunk_size, 4);
        let record = capture.find("Announced server capabilities").unwrap();
        assert_eq!(record["tf_server_capability_chunk_size"], "0MB");

        let data = b"0123456789";
        let chunks = write_request(data, 3, "default");
        let resp = assert_ok!(
            server
                .write_state_stream(Request::new(tokio_stream::iter(chunks)))
                .await
        )
        .into_inner();
        assert!(resp.diagnostics.is_empty());
        let record = capture.find("Served request").unwrap();
        assert_eq!(record["tf_state_store_type"], STORE);

        let read = wire::read_state_bytes::Request {
            type_name: STORE.to_string(),
            state_id: "default".to_string(),
        };
        let stream = assert_ok!(server.read_state_bytes(Request::new(read)).await).into_inner();
        let frames: Vec<_> = stream.map(Result::unwrap).collect().await;
        let ranges: Vec<_> = frames
            .iter()
            .map(|frame| {
                let range = frame.range.clone().unwrap();
                StateByteRange::new(range.start, range.end)
            })
            .collect();
        assert_eq!(
            ranges,
            [
                StateByteRange::new(0, 4),
                StateByteRange::new(4, 8),
                StateByteRange::new(8, 10)
            ]
        );
        assert!(frames.iter().all(|frame| frame.total_length == 10));
        let bytes: Vec<u8> = frames.into_iter().flat_map(|frame| frame.bytes).collect();
        assert_eq!(bytes, data);

        let resp = assert_ok!(
            server
                .get_states(Request::new(wire::get_states::Request {
                    type_name: STORE.to_string(),
                }))
                .await
        )
        .into_inner();
        assert_eq!(resp.state_id, ["default"]);
    }

    #[tokio::test]
    async fn test_read_empty_state() {
        let server = server();
        server
            .provider()
            .states
            .lock()
            .unwrap()
            .insert("empty".to_string(), Vec::new());

        let read = wire::read_state_bytes::Request {
            type_name: STORE.to_string(),
            state_id: "empty".to_string(),
        };
        let stream = assert_ok!(server.read_state_bytes(Request::new(read)).await).into_inner();
        let frames: Vec<_> = stream.map(Result::unwrap).collect().await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].range, Some(wire::StateRange { start: 0, end: 0 }));
    }

    #[tokio::test]
    async fn test_read_missing_state() {
        let server = server();
        let read = wire::read_state_bytes::Request {
            type_name: STORE.to_string(),
            state_id: "nope".to_string(),
        };
        let Err(status) = server.read_state_bytes(Request::new(read)).await else {
            panic!("expected ReadStateBytes to fail");
        };
        assert_eq!(status.code(), tonic::Code::NotFound);
    }

    #[tokio::test]
    async fn test_write_chunk_without_range() {
        let server = server();
        let chunk = wire::write_state_bytes::RequestChunk {
            meta: Some(wire::RequestChunkMeta {
                type_name: STORE.to_string(),
                state_id: "default".to_string(),
            }),
            bytes: b"abc".to_vec(),
            total_length: 3,
            range: None,
        };
        let resp = assert_ok!(
            server
                .write_state_stream(Request::new(tokio_stream::iter(vec![Ok(chunk)])))
                .await
        )
        .into_inner();
        assert_eq!(resp.diagnostics.len(), 1);
        assert_eq!(
            resp.diagnostics[0].summary,
            "Unexpected state chunk data received in WriteStateBytes"
        );
        assert!(resp.diagnostics[0]
            .detail
            .starts_with("An invalid state byte chunk was received with no range start/end information."));
        assert!(server.provider().states.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_without_chunks() {
        let server = server();
        let chunks: Vec<Result<wire::write_state_bytes::RequestChunk, Status>> = Vec::new();
        let resp = assert_ok!(
            server
                .write_state_stream(Request::new(tokio_stream::iter(chunks)))
                .await
        )
        .into_inner();
        assert_eq!(
            resp.diagnostics[0].summary,
            "Incomplete state data received in WriteStateBytes"
        );
    }

    #[tokio::test]
    async fn test_write_transport_error() {
        let server = server();
        let mut chunks = write_request(b"abcdef", 3, "default");
        chunks.truncate(1);
        chunks.push(Err(Status::aborted("connection reset")));
        let resp = assert_ok!(
            server
                .write_state_stream(Request::new(tokio_stream::iter(chunks)))
                .await
        )
        .into_inner();
        assert_eq!(
            resp.diagnostics[0].summary,
            "Error receiving state chunk in WriteStateBytes"
        );
        assert_eq!(resp.diagnostics[0].detail, "connection reset");
    }

    async fn metadata_via<T: Provider>(service: &T) -> wire::get_metadata::Response {
        assert_ok!(
            service
                .get_metadata(Request::new(wire::get_metadata::Request {}))
                .await
        )
        .into_inner()
    }

    #[tokio::test]
    async fn test_generated_service() {
        use tonic::codegen::{http, Service};
        use tonic::server::NamedService;

        use crate::tfprotov6::generated::provider_server::ProviderServer;

        let server = server();
        let resp = metadata_via(&server).await;
        assert_eq!(resp.resources[0].type_name, "examplecloud_instance");

        assert_eq!(
            <ProviderServer<Server<ExampleProvider>> as NamedService>::NAME,
            "tfplugin6.Provider"
        );
        let mut service = ProviderServer::new(server);
        let request = http::Request::builder()
            .uri("/tfplugin6.Provider/Teleport")
            .body(tonic::body::Body::default())
            .unwrap();
        let resp = assert_ok!(service.call(request).await);
        assert_eq!(resp.headers()["grpc-status"], "12");
    }

    #[tokio::test]
    async fn test_write_cancelled_before_first_chunk() {
        let server = server();
        server.dispatcher.token().cancel();

        let chunks = tokio_stream::pending::<Result<wire::write_state_bytes::RequestChunk, Status>>();
        let status = assert_err!(server.write_state_stream(Request::new(chunks)).await);
        assert_eq!(status.code(), tonic::Code::Cancelled);
    }

    #[test]
    fn test_chunk_meta_conversion() {
        let meta: StateChunkMeta = wire::RequestChunkMeta {
            type_name: STORE.to_string(),
            state_id: "default".to_string(),
        }
        .into();
        assert_eq!(meta.type_name, STORE);
    }
}
