//! Testing utilities for provider implementations.
//!
//! [`ProviderTester`] drives a `ProviderService` with typed values, without
//! a wire server in between. [`LogCapture`] records the JSON lines written by
//! the SDK log layer so tests can assert on them.
//!
//! # Example
//!
//! ```ignore
//! use tf_provider_protocol::testing::ProviderTester;
//! use tf_provider_protocol::tftypes::Value;
//!
//! #[tokio::test]
//! async fn test_create_instance() {
//!     let tester = ProviderTester::new(MyProvider::new());
//!     tester.configure(Value::from_attributes([("region", Value::string("eu"))])).await.unwrap();
//!
//!     let config = Value::from_attributes([("name", Value::string("web"))]);
//!     let planned = tester.plan_create("examplecloud_instance", config.clone()).await.unwrap();
//!     let state = tester.apply("examplecloud_instance", planned, config).await.unwrap();
//!     assert_eq!(state.attribute("name"), Some(&Value::string("web")));
//! }
//! ```

use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;

use crate::action::{ActionEventSequencer, InvokeActionEvent, InvokeActionRequest};
use crate::diagnostic::Diagnostic;
use crate::error::ProviderError;
use crate::list_resource::{ListResourceRequest, ListResourceResult};
use crate::logging::SdkJsonLayer;
use crate::provider::{ConfigureProviderRequest, GetProviderSchemaRequest, GetProviderSchemaResponse};
use crate::resource::{
    ApplyResourceChangeRequest, PlanResourceChangeRequest, ReadResourceRequest,
    ValidateResourceConfigRequest,
};
use crate::server::ProviderService;
use crate::stream::StreamSender;
use crate::tftypes::{Type, Value};
use crate::types::DynamicValue;

// =========================================================================
// Log Capture
// =========================================================================

/// Collects SDK log records in memory.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

/// Writer handed out by [`LogCapture`].
#[derive(Debug)]
pub struct CaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

impl LogCapture {
    /// Create an empty capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// A subscriber writing every event, at every level, into this capture.
    pub fn subscriber(&self) -> impl Subscriber + Send + Sync {
        tracing_subscriber::registry().with(SdkJsonLayer::new(self.clone()))
    }

    /// Every captured record, in order.
    pub fn records(&self) -> Vec<serde_json::Value> {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buffer)
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// The `@message` of every captured record, in order.
    pub fn messages(&self) -> Vec<String> {
        self.records()
            .iter()
            .filter_map(|r| r["@message"].as_str().map(str::to_string))
            .collect()
    }

    /// The first record with the given `@message`.
    pub fn find(&self, message: &str) -> Option<serde_json::Value> {
        self.records()
            .into_iter()
            .find(|r| r["@message"] == message)
    }
}

// =========================================================================
// Provider Tester
// =========================================================================

/// Drives a [`ProviderService`] directly, without a wire server.
///
/// Values go in and come out as [`Value`]s; the tester encodes them with the
/// types from the provider's own schema.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Wrap `provider`.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Call GetProviderSchema.
    pub async fn schema(&self) -> Result<GetProviderSchemaResponse, ProviderError> {
        self.provider
            .get_provider_schema(GetProviderSchemaRequest::default())
            .await
    }

    /// Managed resource type names from GetMetadata.
    pub async fn resource_types(&self) -> Result<Vec<String>, ProviderError> {
        let metadata = self.provider.get_metadata(Default::default()).await?;
        Ok(metadata.resources.into_iter().map(|r| r.type_name).collect())
    }

    async fn resource_type(&self, type_name: &str) -> Result<Type, TestError> {
        self.schema()
            .await?
            .resource_schemas
            .get(type_name)
            .map(|schema| schema.value_type())
            .ok_or_else(|| {
                TestError::Provider(ProviderError::UnknownType(type_name.to_string()))
            })
    }

    /// Call ConfigureProvider with `config` encoded against the provider schema.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let typ = self
            .schema()
            .await?
            .provider
            .map(|schema| schema.value_type())
            .unwrap_or_else(|| Type::object(Vec::<(String, Type)>::new()));
        let resp = self
            .provider
            .configure_provider(ConfigureProviderRequest {
                config: Some(DynamicValue::new(&config, &typ)?),
                ..Default::default()
            })
            .await?;
        check_diagnostics(resp.diagnostics)
    }

    /// Call ValidateResourceConfig and hand back every diagnostic.
    pub async fn validate_resource_config(
        &self,
        type_name: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let typ = self.resource_type(type_name).await?;
        let resp = self
            .provider
            .validate_resource_config(ValidateResourceConfigRequest {
                type_name: type_name.to_string(),
                config: Some(DynamicValue::new(&config, &typ)?),
                client_capabilities: None,
            })
            .await?;
        check_diagnostics(resp.diagnostics)
    }

    /// Plan a resource creation (null prior state).
    pub async fn plan_create(&self, type_name: &str, config: Value) -> Result<Value, TestError> {
        let typ = self.resource_type(type_name).await?;
        self.plan(type_name, Value::null(typ), config.clone(), config)
            .await
    }

    /// Full plan operation, returning the planned state.
    pub async fn plan(
        &self,
        type_name: &str,
        prior_state: Value,
        proposed_new_state: Value,
        config: Value,
    ) -> Result<Value, TestError> {
        let typ = self.resource_type(type_name).await?;
        let resp = self
            .provider
            .plan_resource_change(PlanResourceChangeRequest {
                type_name: type_name.to_string(),
                prior_state: Some(DynamicValue::new(&prior_state, &typ)?),
                proposed_new_state: Some(DynamicValue::new(&proposed_new_state, &typ)?),
                config: Some(DynamicValue::new(&config, &typ)?),
                ..Default::default()
            })
            .await?;
        check_diagnostics(resp.diagnostics)?;
        decode_or_null(resp.planned_state, &typ)
    }

    /// Apply a planned creation, returning the new state.
    pub async fn apply(
        &self,
        type_name: &str,
        planned_state: Value,
        config: Value,
    ) -> Result<Value, TestError> {
        let typ = self.resource_type(type_name).await?;
        let resp = self
            .provider
            .apply_resource_change(ApplyResourceChangeRequest {
                type_name: type_name.to_string(),
                prior_state: Some(DynamicValue::new(&Value::null(typ.clone()), &typ)?),
                planned_state: Some(DynamicValue::new(&planned_state, &typ)?),
                config: Some(DynamicValue::new(&config, &typ)?),
                ..Default::default()
            })
            .await?;
        check_diagnostics(resp.diagnostics)?;
        decode_or_null(resp.new_state, &typ)
    }

    /// Call ReadResource and decode the refreshed state.
    pub async fn read(&self, type_name: &str, current_state: Value) -> Result<Value, TestError> {
        let typ = self.resource_type(type_name).await?;
        let resp = self
            .provider
            .read_resource(ReadResourceRequest {
                type_name: type_name.to_string(),
                current_state: Some(DynamicValue::new(&current_state, &typ)?),
                ..Default::default()
            })
            .await?;
        check_diagnostics(resp.diagnostics)?;
        decode_or_null(resp.new_state, &typ)
    }

    /// Run a list query and collect every result.
    pub async fn list(
        &self,
        req: ListResourceRequest,
        buffer: usize,
    ) -> Result<Vec<ListResourceResult>, ProviderError> {
        let (sender, mut rx) = StreamSender::channel(buffer, Default::default());
        let collect = async {
            let mut results = Vec::new();
            while let Some(result) = rx.recv().await {
                results.push(result);
            }
            results
        };
        let (outcome, results) = tokio::join!(self.provider.list_resource(req, sender), collect);
        outcome.map(|()| results)
    }

    /// Invoke an action and collect the events the host would receive.
    pub async fn invoke_action(
        &self,
        req: InvokeActionRequest,
    ) -> Result<Vec<InvokeActionEvent>, ProviderError> {
        let (sender, mut rx) = StreamSender::channel(16, Default::default());
        let collect = async {
            let mut sequencer = ActionEventSequencer::new();
            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                events.extend(sequencer.push(event));
                if sequencer.is_terminated() {
                    rx.close();
                    break;
                }
            }
            events.extend(sequencer.finish());
            events
        };
        let (outcome, events) = tokio::join!(self.provider.invoke_action(req, sender), collect);
        outcome.map(|()| events)
    }
}

fn decode_or_null(value: Option<DynamicValue>, typ: &Type) -> Result<Value, TestError> {
    match value {
        Some(value) => Ok(value.unmarshal(typ)?),
        None => Ok(Value::null(typ.clone())),
    }
}

/// Failure of a [`ProviderTester`] step.
#[derive(Debug, Error)]
pub enum TestError {
    /// The handler answered with error diagnostics.
    #[error("{}", render_diagnostics(.0))]
    Diagnostics(Vec<Diagnostic>),
    /// The handler returned a [`ProviderError`].
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
    /// A value did not fit the schema type.
    #[error("Value error: {0}")]
    Value(#[from] crate::tftypes::Error),
}

fn render_diagnostics(diags: &[Diagnostic]) -> String {
    let mut out = format!("Operation failed with {} diagnostic(s):\n", diags.len());
    for diag in diags {
        out.push_str(&format!("  [{}] {}", diag.severity, diag.summary));
        if !diag.detail.is_empty() {
            out.push_str(&format!(": {}", diag.detail));
        }
        if let Some(attr) = &diag.attribute {
            out.push_str(&format!(" (at {})", attr));
        }
        out.push('\n');
    }
    out
}

/// Keep the error diagnostics; fail when there are any.
fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();
    if errors.is_empty() {
        return Ok(());
    }
    Err(TestError::Diagnostics(errors))
}

fn error_summaries(diagnostics: &[Diagnostic]) -> Vec<&str> {
    diagnostics
        .iter()
        .filter(|d| d.is_error())
        .map(|d| d.summary.as_str())
        .collect()
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Panics when any diagnostic has error severity.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors = error_summaries(diagnostics);
    assert!(
        errors.is_empty(),
        "Expected no errors, got {}: {:?}",
        errors.len(),
        errors
    );
}

/// Panics unless at least one diagnostic has error severity.
pub fn assert_has_errors(diagnostics: &[Diagnostic]) {
    assert!(
        diagnostics.iter().any(Diagnostic::is_error),
        "Expected at least one error, but got none"
    );
}

/// Panics unless an error diagnostic's summary contains `substring`.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let errors = error_summaries(diagnostics);
    assert!(
        errors.iter().any(|summary| summary.contains(substring)),
        "Expected an error containing '{}', got: {:?}",
        substring,
        errors
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionEventSender;
    use crate::list_resource::ListResourceSender;
    use crate::provider::ConfigureProviderResponse;
    use crate::resource::{
        ApplyResourceChangeResponse, PlanResourceChangeResponse, ReadResourceResponse,
    };
    use crate::schema::{Schema, SchemaAttribute, SchemaBlock};

    // Single resource type backed by nothing; apply echoes the plan.
    struct TestProvider;

    fn instance_type() -> Type {
        Type::object([("name", Type::String), ("id", Type::String)])
    }

    fn with_id(value: &Value, id: Value) -> Result<Value, ProviderError> {
        let mut entries = value.entries().cloned().unwrap_or_default();
        entries.insert("id".to_string(), id);
        Ok(Value::object(instance_type(), entries)?)
    }

    #[async_trait::async_trait]
    impl ProviderService for TestProvider {
        async fn get_provider_schema(
            &self,
            _req: GetProviderSchemaRequest,
        ) -> Result<GetProviderSchemaResponse, ProviderError> {
            let provider = SchemaBlock::new()
                .with_attribute(SchemaAttribute::optional("api_key", Type::String).sensitive());
            let instance = SchemaBlock::new()
                .with_attribute(SchemaAttribute::required("name", Type::String))
                .with_attribute(SchemaAttribute::computed("id", Type::String));
            Ok(GetProviderSchemaResponse::new(Schema::new(0, provider))
                .with_resource("test_instance", Schema::new(0, instance)))
        }

        async fn configure_provider(
            &self,
            req: ConfigureProviderRequest,
        ) -> Result<ConfigureProviderResponse, ProviderError> {
            let typ = Type::object([("api_key", Type::String)]);
            let config = req
                .config
                .ok_or_else(|| ProviderError::InvalidRequest("missing config".to_string()))?
                .unmarshal(&typ)?;
            let mut resp = ConfigureProviderResponse::default();
            if config.attribute("api_key").is_some_and(Value::is_null) {
                resp.diagnostics.push(Diagnostic::error("Missing API key"));
            }
            Ok(resp)
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
            let typ = instance_type();
            let proposed = req
                .proposed_new_state
                .ok_or_else(|| ProviderError::InvalidRequest("missing proposed state".into()))?
                .unmarshal(&typ)?;
            let planned = with_id(&proposed, Value::unknown(Type::String))?;
            Ok(PlanResourceChangeResponse {
                planned_state: Some(DynamicValue::new(&planned, &typ)?),
                ..Default::default()
            })
        }

        async fn apply_resource_change(
            &self,
            req: ApplyResourceChangeRequest,
        ) -> Result<ApplyResourceChangeResponse, ProviderError> {
            let typ = instance_type();
            let planned = req
                .planned_state
                .ok_or_else(|| ProviderError::InvalidRequest("missing planned state".into()))?
                .unmarshal(&typ)?;
            let applied = with_id(&planned, Value::string("i-0001"))?;
            Ok(ApplyResourceChangeResponse {
                new_state: Some(DynamicValue::new(&applied, &typ)?),
                ..Default::default()
            })
        }

        async fn list_resource(
            &self,
            _req: ListResourceRequest,
            results: ListResourceSender,
        ) -> Result<(), ProviderError> {
            for name in ["alpha", "beta"] {
                let result = ListResourceResult {
                    display_name: name.to_string(),
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
            _req: InvokeActionRequest,
            events: ActionEventSender,
        ) -> Result<(), ProviderError> {
            // Forgets the Started event.
            events.send(InvokeActionEvent::progress("rebooting")).await;
            Ok(())
        }
    }

    fn config(name: &str) -> Value {
        Value::object(
            instance_type(),
            [("name", Value::string(name)), ("id", Value::null(Type::String))],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_tester_configure() {
        let tester = ProviderTester::new(TestProvider);
        let ok = Value::from_attributes([("api_key", Value::string("secret"))]);
        assert!(tester.configure(ok).await.is_ok());

        let missing = Value::from_attributes([("api_key", Value::null(Type::String))]);
        match tester.configure(missing).await {
            Err(TestError::Diagnostics(diags)) => assert_eq!(diags[0].summary, "Missing API key"),
            other => panic!("expected diagnostics, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tester_resource_types() {
        let tester = ProviderTester::new(TestProvider);
        assert_eq!(tester.resource_types().await.unwrap(), ["test_instance"]);
    }

    #[tokio::test]
    async fn test_tester_unknown_type() {
        let tester = ProviderTester::new(TestProvider);
        let err = tester.plan_create("test_missing", config("web")).await.unwrap_err();
        assert!(matches!(err, TestError::Provider(ProviderError::UnknownType(_))));
    }

    #[tokio::test]
    async fn test_tester_plan_and_apply() {
        let tester = ProviderTester::new(TestProvider);
        let planned = tester.plan_create("test_instance", config("web")).await.unwrap();
        assert!(planned.attribute("id").is_some_and(Value::is_unknown));

        let state = tester
            .apply("test_instance", planned, config("web"))
            .await
            .unwrap();
        assert_eq!(state.attribute("id"), Some(&Value::string("i-0001")));
        assert_eq!(state.attribute("name"), Some(&Value::string("web")));

        let read = tester.read("test_instance", state.clone()).await.unwrap();
        assert_eq!(read, state);
    }

    #[tokio::test]
    async fn test_tester_list() {
        let tester = ProviderTester::new(TestProvider);
        let results = tester.list(ListResourceRequest::default(), 1).await.unwrap();
        let names: Vec<_> = results.iter().map(|r| r.display_name.as_str()).collect();
        assert_eq!(names, ["alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_tester_invoke_action_sequencing() {
        let tester = ProviderTester::new(TestProvider);
        let events = tester
            .invoke_action(InvokeActionRequest::default())
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind(), "Started");
        assert_error_contains(events[1].diagnostics(), "Invalid InvokeAction event sequence");
    }

    #[test]
    fn test_log_capture() {
        let capture = LogCapture::new();
        tracing::subscriber::with_default(capture.subscriber(), || {
            tracing::debug!(target: "sdk.proto", attempt = 2, "Retrying");
            tracing::info!("Done");
        });
        assert_eq!(capture.messages(), ["Retrying", "Done"]);
        let retry = capture.find("Retrying").unwrap();
        assert_eq!(retry["@level"], "debug");
        assert_eq!(retry["@module"], "sdk.proto");
        assert_eq!(retry["attempt"], 2);
        assert!(capture.find("Missing").is_none());
    }

    #[test]
    fn test_assert_no_errors() {
        assert_no_errors(&[Diagnostic::warning("careful")]);
    }

    #[test]
    #[should_panic(expected = "Expected no errors")]
    fn test_assert_no_errors_fails() {
        assert_no_errors(&[Diagnostic::error("boom")]);
    }

    #[test]
    fn test_assert_has_errors() {
        assert_has_errors(&[Diagnostic::warning("careful"), Diagnostic::error("boom")]);
    }

    #[test]
    fn test_test_error_display() {
        let err = TestError::Diagnostics(vec![Diagnostic::error("Invalid name")
            .with_detail("must be lowercase")]);
        let text = err.to_string();
        assert!(text.contains("Operation failed with 1 diagnostic(s):"));
        assert!(text.contains("[ERROR] Invalid name: must be lowercase"));

        let err = TestError::Provider(ProviderError::Internal("boom".to_string()));
        assert_eq!(err.to_string(), "Provider error: Internal error: boom");
    }
}
