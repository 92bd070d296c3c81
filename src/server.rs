//! The provider handler trait and the dispatcher core shared by both
//! protocol versions.
//!
//! Providers implement [`ProviderService`] against the public request and
//! response model. The version servers in [`crate::tfprotov5`] and
//! [`crate::tfprotov6`] translate wire messages into that model, call the
//! handler through the [`Dispatcher`], and translate the result back. The
//! dispatcher owns the request-scoped logging and the cancellation token that
//! StopProvider fires.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

use crate::action::{
    ActionEventSender, ActionEventSequencer, CancelActionRequest, CancelActionResponse,
    InvokeActionEvent, InvokeActionRequest, PlanActionRequest, PlanActionResponse,
    ValidateActionConfigRequest, ValidateActionConfigResponse,
};
use crate::data_source::{
    ReadDataSourceRequest, ReadDataSourceResponse, ValidateDataResourceConfigRequest,
    ValidateDataResourceConfigResponse,
};
use crate::diagnostic::{Diagnostic, DiagnosticsExt};
use crate::ephemeral::{
    CloseEphemeralResourceRequest, CloseEphemeralResourceResponse, OpenEphemeralResourceRequest,
    OpenEphemeralResourceResponse, RenewEphemeralResourceRequest, RenewEphemeralResourceResponse,
    ValidateEphemeralResourceConfigRequest, ValidateEphemeralResourceConfigResponse,
};
use crate::error::ProviderError;
use crate::function::{
    CallFunctionRequest, CallFunctionResponse, GetFunctionsRequest, GetFunctionsResponse,
};
use crate::list_resource::{
    ListResourceRequest, ListResourceResult, ListResourceSender,
    ValidateListResourceConfigRequest, ValidateListResourceConfigResponse,
};
use crate::logging::{self, LOG_TARGET};
use crate::provider::{
    ConfigureProviderRequest, ConfigureProviderResponse, GetMetadataRequest, GetMetadataResponse,
    GetProviderSchemaRequest, GetProviderSchemaResponse, GetResourceIdentitySchemasRequest,
    GetResourceIdentitySchemasResponse, StopProviderRequest, StopProviderResponse,
    ValidateProviderConfigRequest, ValidateProviderConfigResponse,
};
use crate::resource::{
    ApplyResourceChangeRequest, ApplyResourceChangeResponse, ImportResourceStateRequest,
    ImportResourceStateResponse, MoveResourceStateRequest, MoveResourceStateResponse,
    PlanResourceChangeRequest, PlanResourceChangeResponse, ReadResourceRequest,
    ReadResourceResponse, UpgradeResourceIdentityRequest, UpgradeResourceIdentityResponse,
    UpgradeResourceStateRequest, UpgradeResourceStateResponse, ValidateResourceConfigRequest,
    ValidateResourceConfigResponse,
};
use crate::state_store::{
    ConfigureStateStoreRequest, ConfigureStateStoreResponse, DeleteStateRequest,
    DeleteStateResponse, GetStatesRequest, GetStatesResponse, LockStateRequest,
    LockStateResponse, ReadStateBytesRequest, ReadStateBytesResponse, UnlockStateRequest,
    UnlockStateResponse, ValidateStateStoreConfigRequest, ValidateStateStoreConfigResponse,
    WriteStateBytesResponse, WriteStateBytesStream,
};
use crate::types::{
    ClientCapabilities, Deferred, DynamicValue, RawState, ResourceIdentityData,
    MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE, REATTACH_PROVIDERS_ENV,
};

/// Trait that provider implementations must implement.
///
/// Only the core resource lifecycle is required. Validation hooks default to
/// accepting everything, state and identity upgrades default to passing the
/// stored JSON through, and the remaining operations report
/// [`ProviderError::Unimplemented`].
///
/// # Example
///
/// ```
/// use tf_provider_protocol::provider::*;
/// use tf_provider_protocol::resource::*;
/// use tf_provider_protocol::schema::{Schema, SchemaAttribute, SchemaBlock};
/// use tf_provider_protocol::tftypes::Type;
/// use tf_provider_protocol::{async_trait, ProviderError, ProviderService};
///
/// struct ExampleProvider;
///
/// #[async_trait]
/// impl ProviderService for ExampleProvider {
///     async fn get_provider_schema(
///         &self,
///         _req: GetProviderSchemaRequest,
///     ) -> Result<GetProviderSchemaResponse, ProviderError> {
///         let block = SchemaBlock::new()
///             .with_attribute(SchemaAttribute::required("name", Type::String));
///         Ok(GetProviderSchemaResponse::new(Schema::new(0, SchemaBlock::new()))
///             .with_resource("example_thing", Schema::new(0, block)))
///     }
///
///     async fn configure_provider(
///         &self,
///         _req: ConfigureProviderRequest,
///     ) -> Result<ConfigureProviderResponse, ProviderError> {
///         Ok(ConfigureProviderResponse::default())
///     }
///
///     async fn read_resource(
///         &self,
///         req: ReadResourceRequest,
///     ) -> Result<ReadResourceResponse, ProviderError> {
///         Ok(ReadResourceResponse {
///             new_state: req.current_state,
///             private: req.private,
///             ..Default::default()
///         })
///     }
///
///     async fn plan_resource_change(
///         &self,
///         req: PlanResourceChangeRequest,
///     ) -> Result<PlanResourceChangeResponse, ProviderError> {
///         Ok(PlanResourceChangeResponse {
///             planned_state: req.proposed_new_state,
///             ..Default::default()
///         })
///     }
///
///     async fn apply_resource_change(
///         &self,
///         req: ApplyResourceChangeRequest,
///     ) -> Result<ApplyResourceChangeResponse, ProviderError> {
///         Ok(ApplyResourceChangeResponse {
///             new_state: req.planned_state,
///             ..Default::default()
///         })
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Return every schema the provider serves.
    async fn get_provider_schema(
        &self,
        req: GetProviderSchemaRequest,
    ) -> Result<GetProviderSchemaResponse, ProviderError>;

    /// List the provider's types without their schemas.
    /// By default, this is derived from the schema.
    async fn get_metadata(
        &self,
        req: GetMetadataRequest,
    ) -> Result<GetMetadataResponse, ProviderError> {
        let _ = req;
        Ok(self
            .get_provider_schema(GetProviderSchemaRequest::default())
            .await?
            .metadata())
    }

    /// Return the identity schemas of managed resources.
    async fn get_resource_identity_schemas(
        &self,
        req: GetResourceIdentitySchemasRequest,
    ) -> Result<GetResourceIdentitySchemasResponse, ProviderError> {
        let _ = req;
        Ok(GetResourceIdentitySchemasResponse::default())
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate the provider configuration before configuring.
    /// By default the configuration is accepted unchanged.
    async fn validate_provider_config(
        &self,
        req: ValidateProviderConfigRequest,
    ) -> Result<ValidateProviderConfigResponse, ProviderError> {
        Ok(ValidateProviderConfigResponse {
            prepared_config: req.config,
            diagnostics: Vec::new(),
        })
    }

    /// Configure the provider with credentials and settings.
    async fn configure_provider(
        &self,
        req: ConfigureProviderRequest,
    ) -> Result<ConfigureProviderResponse, ProviderError>;

    /// Stop in-flight work. Streams of the server are cancelled afterwards.
    async fn stop_provider(
        &self,
        req: StopProviderRequest,
    ) -> Result<StopProviderResponse, ProviderError> {
        let _ = req;
        Ok(StopProviderResponse::default())
    }

    // =========================================================================
    // Managed Resources
    // =========================================================================

    /// Validate a resource's configuration before planning.
    async fn validate_resource_config(
        &self,
        req: ValidateResourceConfigRequest,
    ) -> Result<ValidateResourceConfigResponse, ProviderError> {
        let _ = req;
        Ok(ValidateResourceConfigResponse::default())
    }

    /// Upgrade stored state to the current schema version.
    /// By default the stored JSON is returned as-is.
    async fn upgrade_resource_state(
        &self,
        req: UpgradeResourceStateRequest,
    ) -> Result<UpgradeResourceStateResponse, ProviderError> {
        let (upgraded_state, diagnostics) = pass_through_raw_state(req.raw_state);
        Ok(UpgradeResourceStateResponse {
            upgraded_state,
            diagnostics,
        })
    }

    /// Upgrade stored identity data to the current identity schema version.
    /// By default the stored JSON is returned as-is.
    async fn upgrade_resource_identity(
        &self,
        req: UpgradeResourceIdentityRequest,
    ) -> Result<UpgradeResourceIdentityResponse, ProviderError> {
        let (identity_data, diagnostics) = pass_through_raw_state(req.raw_identity);
        Ok(UpgradeResourceIdentityResponse {
            upgraded_identity: identity_data.map(|data| ResourceIdentityData {
                identity_data: Some(data),
            }),
            diagnostics,
        })
    }

    /// Refresh a resource's state from the remote system.
    async fn read_resource(
        &self,
        req: ReadResourceRequest,
    ) -> Result<ReadResourceResponse, ProviderError>;

    /// Plan changes for a resource.
    async fn plan_resource_change(
        &self,
        req: PlanResourceChangeRequest,
    ) -> Result<PlanResourceChangeResponse, ProviderError>;

    /// Apply a planned change: create, update, or destroy.
    async fn apply_resource_change(
        &self,
        req: ApplyResourceChangeRequest,
    ) -> Result<ApplyResourceChangeResponse, ProviderError>;

    /// Import existing infrastructure into management.
    async fn import_resource_state(
        &self,
        req: ImportResourceStateRequest,
    ) -> Result<ImportResourceStateResponse, ProviderError> {
        let _ = req;
        Err(ProviderError::unimplemented("ImportResourceState"))
    }

    /// Move state from another resource type into one of this provider's.
    async fn move_resource_state(
        &self,
        req: MoveResourceStateRequest,
    ) -> Result<MoveResourceStateResponse, ProviderError> {
        let _ = req;
        Err(ProviderError::unimplemented("MoveResourceState"))
    }

    // =========================================================================
    // Data Sources
    // =========================================================================

    /// Validate a data source's configuration.
    async fn validate_data_resource_config(
        &self,
        req: ValidateDataResourceConfigRequest,
    ) -> Result<ValidateDataResourceConfigResponse, ProviderError> {
        let _ = req;
        Ok(ValidateDataResourceConfigResponse::default())
    }

    /// Read data from an external source.
    async fn read_data_source(
        &self,
        req: ReadDataSourceRequest,
    ) -> Result<ReadDataSourceResponse, ProviderError> {
        Err(ProviderError::UnknownType(format!(
            "Unknown data source type: {}",
            req.type_name
        )))
    }

    // =========================================================================
    // Ephemeral Resources
    // =========================================================================

    /// Validate an ephemeral resource's configuration.
    async fn validate_ephemeral_resource_config(
        &self,
        req: ValidateEphemeralResourceConfigRequest,
    ) -> Result<ValidateEphemeralResourceConfigResponse, ProviderError> {
        let _ = req;
        Ok(ValidateEphemeralResourceConfigResponse::default())
    }

    /// Open an ephemeral resource.
    async fn open_ephemeral_resource(
        &self,
        req: OpenEphemeralResourceRequest,
    ) -> Result<OpenEphemeralResourceResponse, ProviderError> {
        let _ = req;
        Err(ProviderError::unimplemented("OpenEphemeralResource"))
    }

    /// Renew an ephemeral resource. By default there is nothing to renew.
    async fn renew_ephemeral_resource(
        &self,
        req: RenewEphemeralResourceRequest,
    ) -> Result<RenewEphemeralResourceResponse, ProviderError> {
        Ok(RenewEphemeralResourceResponse {
            private: req.private,
            ..Default::default()
        })
    }

    /// Close an ephemeral resource. By default there is nothing to release.
    async fn close_ephemeral_resource(
        &self,
        req: CloseEphemeralResourceRequest,
    ) -> Result<CloseEphemeralResourceResponse, ProviderError> {
        let _ = req;
        Ok(CloseEphemeralResourceResponse::default())
    }

    // =========================================================================
    // Functions
    // =========================================================================

    /// Return function signatures. By default, taken from the schema.
    async fn get_functions(
        &self,
        req: GetFunctionsRequest,
    ) -> Result<GetFunctionsResponse, ProviderError> {
        let _ = req;
        let schema = self
            .get_provider_schema(GetProviderSchemaRequest::default())
            .await?;
        Ok(GetFunctionsResponse {
            functions: schema.functions,
            diagnostics: schema.diagnostics,
        })
    }

    /// Call a provider-defined function.
    async fn call_function(
        &self,
        req: CallFunctionRequest,
    ) -> Result<CallFunctionResponse, ProviderError> {
        Err(ProviderError::UnknownType(format!(
            "Unknown function: {}",
            req.name
        )))
    }

    // =========================================================================
    // List Resources
    // =========================================================================

    /// Validate a list block's configuration.
    async fn validate_list_resource_config(
        &self,
        req: ValidateListResourceConfigRequest,
    ) -> Result<ValidateListResourceConfigResponse, ProviderError> {
        let _ = req;
        Ok(ValidateListResourceConfigResponse::default())
    }

    /// Stream the resources matched by a list query.
    ///
    /// Stop as soon as [`StreamSender::send`](crate::stream::StreamSender::send)
    /// returns `false`.
    async fn list_resource(
        &self,
        req: ListResourceRequest,
        results: ListResourceSender,
    ) -> Result<(), ProviderError> {
        let _ = (req, results);
        Err(ProviderError::unimplemented("ListResource"))
    }

    // =========================================================================
    // Actions
    // =========================================================================

    /// Validate an action's configuration.
    async fn validate_action_config(
        &self,
        req: ValidateActionConfigRequest,
    ) -> Result<ValidateActionConfigResponse, ProviderError> {
        let _ = req;
        Ok(ValidateActionConfigResponse::default())
    }

    /// Plan an action invocation.
    async fn plan_action(
        &self,
        req: PlanActionRequest,
    ) -> Result<PlanActionResponse, ProviderError> {
        let _ = req;
        Err(ProviderError::unimplemented("PlanAction"))
    }

    /// Run an action, streaming its events.
    ///
    /// The first event must be `Started` and the last one `Finished` or
    /// `Cancelled`. Out-of-order events end the stream with an error
    /// diagnostic.
    async fn invoke_action(
        &self,
        req: InvokeActionRequest,
        events: ActionEventSender,
    ) -> Result<(), ProviderError> {
        let _ = (req, events);
        Err(ProviderError::unimplemented("InvokeAction"))
    }

    /// Cancel an invocation identified by the token from its Started event.
    async fn cancel_action(
        &self,
        req: CancelActionRequest,
    ) -> Result<CancelActionResponse, ProviderError> {
        let _ = req;
        Ok(CancelActionResponse::default())
    }

    // =========================================================================
    // State Stores
    // =========================================================================

    /// Validate a state store's configuration.
    async fn validate_state_store_config(
        &self,
        req: ValidateStateStoreConfigRequest,
    ) -> Result<ValidateStateStoreConfigResponse, ProviderError> {
        let _ = req;
        Ok(ValidateStateStoreConfigResponse::default())
    }

    /// Configure a state store and settle the chunk size.
    async fn configure_state_store(
        &self,
        req: ConfigureStateStoreRequest,
    ) -> Result<ConfigureStateStoreResponse, ProviderError> {
        let _ = req;
        Err(ProviderError::unimplemented("ConfigureStateStore"))
    }

    /// Return a whole state blob. The server sends it in chunks.
    async fn read_state_bytes(
        &self,
        req: ReadStateBytesRequest,
    ) -> Result<ReadStateBytesResponse, ProviderError> {
        let _ = req;
        Err(ProviderError::unimplemented("ReadStateBytes"))
    }

    /// Store a state blob arriving in validated chunks.
    async fn write_state_bytes(
        &self,
        chunks: WriteStateBytesStream,
    ) -> Result<WriteStateBytesResponse, ProviderError> {
        let _ = chunks;
        Err(ProviderError::unimplemented("WriteStateBytes"))
    }

    /// List the stored states.
    async fn get_states(&self, req: GetStatesRequest) -> Result<GetStatesResponse, ProviderError> {
        let _ = req;
        Err(ProviderError::unimplemented("GetStates"))
    }

    /// Delete a stored state.
    async fn delete_state(
        &self,
        req: DeleteStateRequest,
    ) -> Result<DeleteStateResponse, ProviderError> {
        let _ = req;
        Err(ProviderError::unimplemented("DeleteState"))
    }

    /// Lock a stored state.
    async fn lock_state(&self, req: LockStateRequest) -> Result<LockStateResponse, ProviderError> {
        let _ = req;
        Err(ProviderError::unimplemented("LockState"))
    }

    /// Release a lock taken with LockState.
    async fn unlock_state(
        &self,
        req: UnlockStateRequest,
    ) -> Result<UnlockStateResponse, ProviderError> {
        let _ = req;
        Err(ProviderError::unimplemented("UnlockState"))
    }
}

fn pass_through_raw_state(raw: Option<RawState>) -> (Option<DynamicValue>, Vec<Diagnostic>) {
    match raw {
        Some(RawState {
            json: Some(json), ..
        }) => (Some(DynamicValue::from_json(json)), Vec::new()),
        Some(raw) if !raw.flatmap.is_empty() => (
            None,
            vec![Diagnostic::error("Unable to upgrade state").with_detail(
                "The stored state uses the flatmap format, which this provider cannot upgrade.",
            )],
        ),
        _ => (None, Vec::new()),
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Address the host connects to for a reattached provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReattachAddr {
    /// Network type, `unix` or `tcp`.
    pub network: String,
    /// Socket path or host:port.
    pub string: String,
}

/// One entry of the debug-reattach configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReattachConfig {
    /// RPC protocol, normally `grpc`.
    pub protocol: String,
    /// Plugin protocol major version.
    pub protocol_version: u32,
    /// Process id of the running provider.
    pub pid: u32,
    /// Whether the provider runs under a test harness.
    #[serde(default)]
    pub test: bool,
    /// Where to connect.
    pub addr: ReattachAddr,
}

/// Options for configuring the provider server.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Registry address of the provider, e.g. `registry.terraform.io/example/cloud`.
    pub provider_address: String,
    /// Capacity of each handler stream. Default: 16.
    pub stream_buffer: usize,
    /// Handshake cookie presented by the host.
    pub magic_cookie: Option<String>,
    /// Debug-reattach entries keyed by provider address.
    pub reattach_config: HashMap<String, ReattachConfig>,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            provider_address: String::new(),
            stream_buffer: 16,
            magic_cookie: None,
            reattach_config: HashMap::new(),
        }
    }
}

impl ServeOptions {
    /// Create new serve options for a provider address.
    pub fn new(provider_address: impl Into<String>) -> Self {
        Self {
            provider_address: provider_address.into(),
            ..Default::default()
        }
    }

    /// Read the handshake cookie and reattach configuration from the
    /// environment.
    pub fn from_env(provider_address: impl Into<String>) -> Result<Self, ProviderError> {
        let mut options = Self::new(provider_address);
        options.magic_cookie = std::env::var(MAGIC_COOKIE_KEY).ok();
        if let Ok(raw) = std::env::var(REATTACH_PROVIDERS_ENV) {
            options.reattach_config = serde_json::from_str(&raw)?;
        }
        Ok(options)
    }

    /// Set the stream buffer size.
    pub fn with_stream_buffer(mut self, stream_buffer: usize) -> Self {
        self.stream_buffer = stream_buffer;
        self
    }

    /// Set the handshake cookie.
    pub fn with_magic_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.magic_cookie = Some(cookie.into());
        self
    }

    /// Add a debug-reattach entry.
    pub fn with_reattach(mut self, provider_address: impl Into<String>, config: ReattachConfig) -> Self {
        self.reattach_config.insert(provider_address.into(), config);
        self
    }

    /// Reattach entry for this provider, if the host runs it in debug mode.
    pub fn reattach(&self) -> Option<&ReattachConfig> {
        self.reattach_config.get(&self.provider_address)
    }

    /// Check that the process was launched by the host.
    ///
    /// A reattached provider is started by hand and skips the cookie check.
    pub fn check_magic_cookie(&self) -> Result<(), ProviderError> {
        if self.reattach().is_some() || self.magic_cookie.as_deref() == Some(MAGIC_COOKIE_VALUE) {
            return Ok(());
        }
        Err(ProviderError::Configuration(
            "This binary is a plugin. These are not meant to be executed directly. \
             Please execute the program that consumes these plugins, which will \
             load any plugins automatically."
                .to_string(),
        ))
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// Log hooks for handler requests.
pub(crate) trait DownstreamRequest {
    /// Whether the request type has a client capabilities field.
    const CARRIES_CAPABILITIES: bool = false;

    fn client_capabilities(&self) -> Option<&ClientCapabilities> {
        None
    }
}

macro_rules! downstream_request {
    ($($ty:ty),* $(,)?) => {
        $(impl DownstreamRequest for $ty {})*
    };
}

macro_rules! downstream_request_with_capabilities {
    ($($ty:ty),* $(,)?) => {
        $(impl DownstreamRequest for $ty {
            const CARRIES_CAPABILITIES: bool = true;

            fn client_capabilities(&self) -> Option<&ClientCapabilities> {
                self.client_capabilities.as_ref()
            }
        })*
    };
}

downstream_request!(
    GetMetadataRequest,
    GetProviderSchemaRequest,
    GetResourceIdentitySchemasRequest,
    ValidateProviderConfigRequest,
    StopProviderRequest,
    UpgradeResourceStateRequest,
    UpgradeResourceIdentityRequest,
    ApplyResourceChangeRequest,
    MoveResourceStateRequest,
    ValidateDataResourceConfigRequest,
    ValidateEphemeralResourceConfigRequest,
    RenewEphemeralResourceRequest,
    CloseEphemeralResourceRequest,
    GetFunctionsRequest,
    CallFunctionRequest,
    ValidateListResourceConfigRequest,
    ListResourceRequest,
    ValidateActionConfigRequest,
    CancelActionRequest,
    ValidateStateStoreConfigRequest,
    ConfigureStateStoreRequest,
    ReadStateBytesRequest,
    GetStatesRequest,
    DeleteStateRequest,
    LockStateRequest,
    UnlockStateRequest,
);

downstream_request_with_capabilities!(
    ConfigureProviderRequest,
    ValidateResourceConfigRequest,
    ReadResourceRequest,
    PlanResourceChangeRequest,
    ImportResourceStateRequest,
    ReadDataSourceRequest,
    OpenEphemeralResourceRequest,
    PlanActionRequest,
    InvokeActionRequest,
);

/// Log hooks for handler responses and stream items.
pub(crate) trait DownstreamResponse {
    fn diagnostics(&self) -> &[Diagnostic];

    fn deferred(&self) -> Option<&Deferred> {
        None
    }

    fn log_server_capabilities(&self) {}
}

macro_rules! downstream_response {
    ($($ty:ty),* $(,)?) => {
        $(impl DownstreamResponse for $ty {
            fn diagnostics(&self) -> &[Diagnostic] {
                &self.diagnostics
            }
        })*
    };
}

macro_rules! downstream_response_with_deferred {
    ($($ty:ty),* $(,)?) => {
        $(impl DownstreamResponse for $ty {
            fn diagnostics(&self) -> &[Diagnostic] {
                &self.diagnostics
            }

            fn deferred(&self) -> Option<&Deferred> {
                self.deferred.as_ref()
            }
        })*
    };
}

downstream_response!(
    GetResourceIdentitySchemasResponse,
    ValidateProviderConfigResponse,
    ConfigureProviderResponse,
    ValidateResourceConfigResponse,
    UpgradeResourceStateResponse,
    UpgradeResourceIdentityResponse,
    ApplyResourceChangeResponse,
    MoveResourceStateResponse,
    ValidateDataResourceConfigResponse,
    ValidateEphemeralResourceConfigResponse,
    RenewEphemeralResourceResponse,
    CloseEphemeralResourceResponse,
    GetFunctionsResponse,
    ValidateListResourceConfigResponse,
    ListResourceResult,
    ValidateActionConfigResponse,
    CancelActionResponse,
    ValidateStateStoreConfigResponse,
    ReadStateBytesResponse,
    WriteStateBytesResponse,
    GetStatesResponse,
    DeleteStateResponse,
    LockStateResponse,
    UnlockStateResponse,
);

downstream_response_with_deferred!(
    ReadResourceResponse,
    PlanResourceChangeResponse,
    ImportResourceStateResponse,
    ReadDataSourceResponse,
    OpenEphemeralResourceResponse,
    PlanActionResponse,
);

impl DownstreamResponse for GetMetadataResponse {
    fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    fn log_server_capabilities(&self) {
        logging::server_capabilities(self.server_capabilities.as_ref());
    }
}

impl DownstreamResponse for GetProviderSchemaResponse {
    fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    fn log_server_capabilities(&self) {
        logging::server_capabilities(self.server_capabilities.as_ref());
    }
}

impl DownstreamResponse for ConfigureStateStoreResponse {
    fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    fn log_server_capabilities(&self) {
        logging::state_store_server_capabilities(self.capabilities.as_ref());
    }
}

impl DownstreamResponse for StopProviderResponse {
    fn diagnostics(&self) -> &[Diagnostic] {
        &[]
    }
}

impl DownstreamResponse for CallFunctionResponse {
    fn diagnostics(&self) -> &[Diagnostic] {
        &[]
    }
}

impl DownstreamResponse for InvokeActionEvent {
    fn diagnostics(&self) -> &[Diagnostic] {
        InvokeActionEvent::diagnostics(self)
    }
}

/// Stream of wire frames returned by a server-streaming RPC.
pub type ResponseStream<W> = Pin<Box<dyn Stream<Item = Result<W, tonic::Status>> + Send>>;

/// Turns handler stream items into wire frames.
pub(crate) trait StreamFramer<T>: Send + 'static {
    type Wire: Send + 'static;

    fn frame(&mut self, item: T) -> Vec<Self::Wire>;

    /// Whether the stream is complete and further items must be dropped.
    fn is_done(&self) -> bool {
        false
    }

    /// Frames to send once the handler has returned successfully.
    fn finish(&mut self) -> Vec<Self::Wire> {
        Vec::new()
    }
}

/// One wire frame per item.
pub(crate) struct MapFramer<T, W>(pub(crate) fn(T) -> W);

impl<T, W> StreamFramer<T> for MapFramer<T, W>
where
    T: 'static,
    W: Send + 'static,
{
    type Wire = W;

    fn frame(&mut self, item: T) -> Vec<W> {
        vec![(self.0)(item)]
    }
}

/// Action events, passed through an [`ActionEventSequencer`].
pub(crate) struct ActionFramer<W> {
    sequencer: ActionEventSequencer,
    to_wire: fn(InvokeActionEvent) -> W,
}

impl<W> ActionFramer<W> {
    pub(crate) fn new(to_wire: fn(InvokeActionEvent) -> W) -> Self {
        Self {
            sequencer: ActionEventSequencer::new(),
            to_wire,
        }
    }
}

impl<W: Send + 'static> StreamFramer<InvokeActionEvent> for ActionFramer<W> {
    type Wire = W;

    fn frame(&mut self, item: InvokeActionEvent) -> Vec<W> {
        self.sequencer
            .push(item)
            .into_iter()
            .map(self.to_wire)
            .collect()
    }

    fn is_done(&self) -> bool {
        self.sequencer.is_terminated()
    }

    fn finish(&mut self) -> Vec<W> {
        self.sequencer
            .finish()
            .into_iter()
            .map(self.to_wire)
            .collect()
    }
}

/// State shared by every RPC of a version server.
pub(crate) struct Dispatcher<P> {
    pub(crate) provider: Arc<P>,
    pub(crate) options: ServeOptions,
    cancel: Mutex<CancellationToken>,
}

impl<P: ProviderService> Dispatcher<P> {
    pub(crate) fn new(provider: Arc<P>, options: ServeOptions) -> Self {
        Self {
            provider,
            options,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Token observed by requests started from now on.
    pub(crate) fn token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cancel every in-flight request and arm a fresh token for new ones.
    pub(crate) fn cancel_in_flight(&self) {
        let mut token = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        token.cancel();
        *token = CancellationToken::new();
    }

    pub(crate) fn span(&self, proto_version: &'static str, rpc: &'static str) -> Span {
        logging::rpc_span(proto_version, rpc, &self.options.provider_address)
    }

    /// Handle a unary RPC: translate, log, call the handler, translate back.
    pub(crate) async fn unary<WReq, Req, Resp, WResp, F, Fut>(
        &self,
        span: Span,
        request: tonic::Request<WReq>,
        handler: F,
    ) -> Result<tonic::Response<WResp>, tonic::Status>
    where
        Req: From<WReq> + DownstreamRequest,
        Resp: DownstreamResponse,
        WResp: From<Resp>,
        F: FnOnce(Arc<P>, Req) -> Fut,
        Fut: Future<Output = Result<Resp, ProviderError>>,
    {
        let cancel = self.token();
        let provider = Arc::clone(&self.provider);
        async move {
            logging::received_request();
            let req = Req::from(request.into_inner());
            log_client_capabilities(&req);
            let resp = call_downstream(handler(provider, req), &cancel).await?;
            let wire = WResp::from(resp);
            logging::served_request();
            Ok(tonic::Response::new(wire))
        }
        .instrument(span)
        .await
    }

    /// Handle a server-streaming RPC.
    pub(crate) fn streaming<WReq, Req, T, Fr, F, Fut>(
        &self,
        span: Span,
        request: tonic::Request<WReq>,
        framer: Fr,
        handler: F,
    ) -> tonic::Response<ResponseStream<Fr::Wire>>
    where
        Req: From<WReq> + DownstreamRequest,
        T: DownstreamResponse + Send + 'static,
        Fr: StreamFramer<T>,
        F: FnOnce(Arc<P>, Req, crate::stream::StreamSender<T>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ProviderError>> + Send + 'static,
        Req: Send + 'static,
    {
        let provider = Arc::clone(&self.provider);
        let req = span.in_scope(|| {
            logging::received_request();
            let req = Req::from(request.into_inner());
            log_client_capabilities(&req);
            req
        });
        let stream = drive_stream(
            framer,
            self.options.stream_buffer,
            self.token(),
            span,
            move |sender| handler(provider, req, sender),
        );
        tonic::Response::new(stream)
    }
}

fn log_client_capabilities<R: DownstreamRequest>(req: &R) {
    if R::CARRIES_CAPABILITIES {
        logging::client_capabilities(req.client_capabilities());
    }
}

/// Call a handler, racing it against the server's cancellation token, and log
/// the outcome.
pub(crate) async fn call_downstream<R, Fut>(
    handler: Fut,
    cancel: &CancellationToken,
) -> Result<R, tonic::Status>
where
    R: DownstreamResponse,
    Fut: Future<Output = Result<R, ProviderError>>,
{
    tracing::trace!(target: LOG_TARGET, "Sending request downstream");
    let start = Instant::now();

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProviderError::Canceled(
            "the provider server is stopping".to_string(),
        )),
        result = handler => result,
    };

    match result {
        Ok(resp) => {
            log_downstream_response(resp.diagnostics(), start);
            logging::diagnostics(resp.diagnostics());
            logging::deferred(resp.deferred());
            resp.log_server_capabilities();
            Ok(resp)
        },
        Err(err) => {
            tracing::error!(target: LOG_TARGET, error = %err, "Error from downstream");
            Err(err.into())
        },
    }
}

fn log_downstream_response(diagnostics: &[Diagnostic], start: Instant) {
    tracing::trace!(
        target: LOG_TARGET,
        diagnostic_error_count = diagnostics.error_count(),
        diagnostic_warning_count = diagnostics.warning_count(),
        tf_req_duration_ms = start.elapsed().as_millis() as u64,
        "Received downstream response"
    );
}

/// Run a streaming handler on its own task and forward its items as frames.
///
/// Frames keep the handler's order. Once the framer reports completion the
/// handler's sender is closed, so its later sends return `false`. A handler
/// error ends the stream with the error's status; otherwise the framer's
/// closing frames are sent.
pub(crate) fn drive_stream<T, Fr, H, Fut>(
    mut framer: Fr,
    buffer: usize,
    cancel: CancellationToken,
    span: Span,
    handler: H,
) -> ResponseStream<Fr::Wire>
where
    T: DownstreamResponse + Send + 'static,
    Fr: StreamFramer<T>,
    H: FnOnce(crate::stream::StreamSender<T>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), ProviderError>> + Send + 'static,
{
    let (frames_tx, frames_rx) = mpsc::channel(buffer.max(1));
    let (sender, mut items) = crate::stream::StreamSender::channel(buffer, cancel.clone());

    let task = async move {
        tracing::trace!(target: LOG_TARGET, "Sending request downstream");
        let start = Instant::now();

        let run_handler = async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ProviderError::Canceled(
                    "the provider server is stopping".to_string(),
                )),
                result = handler(sender) => result,
            }
        };

        let forward = async {
            let mut collected = Vec::new();
            while let Some(item) = items.recv().await {
                logging::diagnostics(item.diagnostics());
                collected.extend(item.diagnostics().iter().cloned());
                for frame in framer.frame(item) {
                    if frames_tx.send(Ok(frame)).await.is_err() {
                        items.close();
                        return collected;
                    }
                }
                if framer.is_done() {
                    items.close();
                    break;
                }
            }
            collected
        };

        let (result, diagnostics) = tokio::join!(run_handler, forward);
        match result {
            Ok(()) => {
                log_downstream_response(&diagnostics, start);
                for frame in framer.finish() {
                    if frames_tx.send(Ok(frame)).await.is_err() {
                        break;
                    }
                }
                logging::served_request();
            },
            Err(err) => {
                tracing::error!(target: LOG_TARGET, error = %err, "Error from downstream");
                let _ = frames_tx.send(Err(err.into())).await;
            },
        }
    };

    tokio::spawn(task.instrument(span));
    Box::pin(ReceiverStream::new(frames_rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::LogCapture;
    use crate::types::{DeferredReason, MAGIC_COOKIE_VALUE};
    use tokio_stream::StreamExt;

    #[test]
    fn test_serve_options_default() {
        let opts = ServeOptions::default();
        assert_eq!(opts.stream_buffer, 16);
        assert!(opts.magic_cookie.is_none());
        assert!(opts.reattach_config.is_empty());
    }

    #[test]
    fn test_serve_options_builder() {
        let opts = ServeOptions::new("registry.terraform.io/example/cloud")
            .with_stream_buffer(4)
            .with_magic_cookie("cookie");
        assert_eq!(opts.provider_address, "registry.terraform.io/example/cloud");
        assert_eq!(opts.stream_buffer, 4);
        assert_eq!(opts.magic_cookie.as_deref(), Some("cookie"));
    }

    #[test]
    fn test_magic_cookie_check() {
        let opts = ServeOptions::new("registry.terraform.io/example/cloud");
        let err = opts.check_magic_cookie().unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
        assert!(err.message().starts_with("This binary is a plugin."));

        let opts = opts.with_magic_cookie("wrong");
        assert!(opts.check_magic_cookie().is_err());

        let opts = ServeOptions::new("x").with_magic_cookie(MAGIC_COOKIE_VALUE);
        assert!(opts.check_magic_cookie().is_ok());
    }

    #[test]
    fn test_reattach_skips_cookie() {
        let raw = r#"{
            "registry.terraform.io/example/cloud": {
                "Protocol": "grpc",
                "ProtocolVersion": 6,
                "Pid": 4242,
                "Test": true,
                "Addr": {"Network": "unix", "String": "/tmp/plugin123"}
            }
        }"#;
        let entries: HashMap<String, ReattachConfig> = serde_json::from_str(raw).unwrap();
        let config = entries["registry.terraform.io/example/cloud"].clone();
        assert_eq!(config.protocol_version, 6);
        assert_eq!(config.addr.network, "unix");

        let opts = ServeOptions::new("registry.terraform.io/example/cloud")
            .with_reattach("registry.terraform.io/example/cloud", config);
        assert!(opts.reattach().is_some());
        assert!(opts.check_magic_cookie().is_ok());
    }

    #[test]
    fn test_pass_through_raw_state() {
        let (value, diags) = pass_through_raw_state(Some(RawState {
            json: Some(b"{\"id\":\"a\"}".to_vec()),
            flatmap: HashMap::new(),
        }));
        assert_eq!(value, Some(DynamicValue::from_json(b"{\"id\":\"a\"}".to_vec())));
        assert!(diags.is_empty());

        let (value, diags) = pass_through_raw_state(Some(RawState {
            json: None,
            flatmap: HashMap::from([("id".to_string(), "a".to_string())]),
        }));
        assert!(value.is_none());
        assert!(diags.has_error());

        assert_eq!(pass_through_raw_state(None), (None, Vec::new()));
    }

    #[tokio::test]
    async fn test_call_downstream_logs() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let resp = ReadResourceResponse {
            diagnostics: vec![Diagnostic::error("bad"), Diagnostic::warning("hmm")],
            deferred: Some(Deferred::new(DeferredReason::AbsentPrereq)),
            ..Default::default()
        };
        let result = call_downstream(async { Ok(resp) }, &CancellationToken::new()).await;
        assert!(result.is_ok());

        assert_eq!(
            capture.messages(),
            [
                "Sending request downstream",
                "Received downstream response",
                "Response contains error diagnostic",
                "Response contains warning diagnostic",
                "Received downstream deferred response",
            ]
        );
        let received = capture.find("Received downstream response").unwrap();
        assert_eq!(received["diagnostic_error_count"], 1);
        assert_eq!(received["diagnostic_warning_count"], 1);
        assert!(received["tf_req_duration_ms"].is_u64());
        let deferred = capture.find("Received downstream deferred response").unwrap();
        assert_eq!(deferred["tf_deferred_reason"], "ABSENT_PREREQ");
    }

    #[tokio::test]
    async fn test_call_downstream_error() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let status = call_downstream::<ReadResourceResponse, _>(
            async { Err(ProviderError::NotFound("gone".to_string())) },
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(status.code(), tonic::Code::NotFound);

        let record = capture.find("Error from downstream").unwrap();
        assert_eq!(record["@level"], "error");
        assert_eq!(record["error"], "Not found: gone");
    }

    #[tokio::test]
    async fn test_call_downstream_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let status = call_downstream::<ReadResourceResponse, _>(
            std::future::pending(),
            &token,
        )
        .await
        .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Cancelled);
    }

    #[tokio::test]
    async fn test_drive_stream_list_results() {
        let stream = drive_stream(
            MapFramer(|r: ListResourceResult| r.display_name),
            2,
            CancellationToken::new(),
            Span::none(),
            |sender| async move {
                for name in ["a", "b", "c", "d"] {
                    let result = ListResourceResult {
                        display_name: name.to_string(),
                        ..Default::default()
                    };
                    if !sender.send(result).await {
                        break;
                    }
                }
                Ok(())
            },
        );
        let frames: Vec<_> = stream.collect().await;
        let names: Vec<String> = frames.into_iter().map(Result::unwrap).collect();
        assert_eq!(names, ["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_drive_stream_handler_error() {
        let stream = drive_stream(
            MapFramer(|r: ListResourceResult| r.display_name),
            4,
            CancellationToken::new(),
            Span::none(),
            |sender| async move {
                sender
                    .send(ListResourceResult {
                        display_name: "first".to_string(),
                        ..Default::default()
                    })
                    .await;
                Err(ProviderError::Unavailable("api down".to_string()))
            },
        );
        let frames: Vec<_> = stream.collect().await;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref().unwrap(), "first");
        assert_eq!(
            frames[1].as_ref().unwrap_err().code(),
            tonic::Code::Unavailable
        );
    }

    #[tokio::test]
    async fn test_drive_stream_action_sequencing() {
        let stream = drive_stream(
            ActionFramer::new(|e: InvokeActionEvent| e),
            4,
            CancellationToken::new(),
            Span::none(),
            |sender: ActionEventSender| async move {
                sender.send(InvokeActionEvent::started("tok")).await;
                sender.send(InvokeActionEvent::progress("half")).await;
                sender.send(InvokeActionEvent::finished()).await;
                sender.send(InvokeActionEvent::progress("late")).await;
                Ok(())
            },
        );
        let events: Vec<_> = stream.map(Result::unwrap).collect().await;
        let kinds: Vec<_> = events.iter().map(InvokeActionEvent::kind).collect();
        assert_eq!(kinds, ["Started", "Progress", "Finished"]);
    }

    #[tokio::test]
    async fn test_drive_stream_action_without_terminal() {
        let stream = drive_stream(
            ActionFramer::new(|e: InvokeActionEvent| e),
            4,
            CancellationToken::new(),
            Span::none(),
            |sender: ActionEventSender| async move {
                sender.send(InvokeActionEvent::started("tok")).await;
                Ok(())
            },
        );
        let events: Vec<_> = stream.map(Result::unwrap).collect().await;
        assert_eq!(events.len(), 2);
        assert!(events[1].is_terminal());
        assert!(events[1].diagnostics().has_error());
    }

    #[tokio::test]
    async fn test_drive_stream_cancelled() {
        let token = CancellationToken::new();
        let stream = drive_stream(
            MapFramer(|r: ListResourceResult| r.display_name),
            1,
            token.clone(),
            Span::none(),
            |sender| async move {
                let mut n = 0;
                while sender
                    .send(ListResourceResult {
                        display_name: n.to_string(),
                        ..Default::default()
                    })
                    .await
                {
                    n += 1;
                }
                Ok(())
            },
        );
        token.cancel();
        let frames: Vec<_> = stream.collect().await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref().unwrap_err().code(), tonic::Code::Cancelled);
    }
}
