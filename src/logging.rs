//! Structured protocol logging.
//!
//! Every RPC handled by the server runs inside an `sdk.proto` span carrying
//! the protocol version, RPC name, a request id, and the provider address.
//! Events inside the span record each step of the request: receipt, the
//! capabilities the host announced, the call into the provider, the
//! diagnostics it returned, and completion.
//!
//! [`SdkJsonLayer`] renders those events as one JSON object per line:
//!
//! ```text
//! {"@level":"trace","@message":"Received downstream response","@module":"sdk.proto",
//!  "diagnostic_error_count":0,"tf_proto_version":"6.10","tf_rpc":"ReadResource",...}
//! ```
//!
//! All logs are written to **stderr**; stdout is reserved for the plugin
//! handshake.
//!
//! # Environment Variables
//!
//! - `TF_LOG_SDK_PROTO`: filter directives for the protocol logs (e.g. `trace`)
//! - `RUST_LOG`: used when `TF_LOG_SDK_PROTO` is unset
//!
//! ```bash
//! TF_LOG_SDK_PROTO=trace ./terraform-provider-examplecloud
//! ```

use std::fmt;
use std::io::Write;

use serde_json::{Map, Value as JsonValue};
use tracing::field::{Empty, Field, Visit};
use tracing::{span, Event, Span, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{prelude::*, EnvFilter, Layer};

use crate::diagnostic::{Diagnostic, DiagnosticSeverity};
use crate::state_store::StateStoreServerCapabilities;
use crate::types::{ClientCapabilities, Deferred, ServerCapabilities};

/// Target of every protocol log record.
pub const LOG_TARGET: &str = "sdk.proto";

/// Environment variable holding the protocol log filter.
pub const SDK_LOG_LEVEL_ENV: &str = "TF_LOG_SDK_PROTO";

/// Span field holding a resource type name.
pub const KEY_RESOURCE_TYPE: &str = "tf_resource_type";
/// Span field holding a data source type name.
pub const KEY_DATA_SOURCE_TYPE: &str = "tf_data_source_type";
/// Span field holding an ephemeral resource type name.
pub const KEY_EPHEMERAL_RESOURCE_TYPE: &str = "tf_ephemeral_resource_type";
/// Span field holding a list resource type name.
pub const KEY_LIST_RESOURCE_TYPE: &str = "tf_list_resource_type";
/// Span field holding an action type name.
pub const KEY_ACTION_TYPE: &str = "tf_action_type";
/// Span field holding a state store type name.
pub const KEY_STATE_STORE_TYPE: &str = "tf_state_store_type";
/// Span field holding a function name.
pub const KEY_FUNCTION_NAME: &str = "tf_function_name";

/// Derive a provider's logger name from its registry address.
///
/// `registry.terraform.io/hashicorp/random-extra` becomes `random_extra`.
/// Addresses with fewer than two `/` separators have no name.
pub fn provider_logger_name(provider_address: &str) -> String {
    if provider_address.matches('/').count() < 2 {
        return String::new();
    }
    provider_address
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .replace('-', "_")
}

/// Render a chunk size in whole mebibytes, e.g. `8MB`.
pub fn chunk_size_mb(bytes: i64) -> String {
    format!("{}MB", bytes >> 20)
}

/// Fields attached to a span, stored in the span's extensions.
struct SpanFields(Map<String, JsonValue>);

#[derive(Default)]
struct JsonVisitor {
    fields: Map<String, JsonValue>,
    message: Option<String>,
}

impl JsonVisitor {
    fn insert(&mut self, field: &Field, value: JsonValue) {
        if field.name() == "message" {
            self.message = Some(match value {
                JsonValue::String(s) => s,
                other => other.to_string(),
            });
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for JsonVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, JsonValue::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, JsonValue::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, JsonValue::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, JsonValue::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, JsonValue::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, JsonValue::from(format!("{:?}", value)));
    }
}

/// A [`Layer`] writing each event as a single-line JSON object.
///
/// Records carry `@level` (lowercase), `@message`, `@module` (the event
/// target), the fields of every enclosing span from the root down, and the
/// event's own fields. Later values win on key collisions.
pub struct SdkJsonLayer<W> {
    make_writer: W,
}

impl<W> SdkJsonLayer<W>
where
    W: for<'w> MakeWriter<'w> + 'static,
{
    /// Create a layer writing through `make_writer`.
    pub fn new(make_writer: W) -> Self {
        Self { make_writer }
    }
}

impl<W> fmt::Debug for SdkJsonLayer<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkJsonLayer").finish_non_exhaustive()
    }
}

impl<S, W> Layer<S> for SdkJsonLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = JsonVisitor::default();
        attrs.record(&mut visitor);
        span.extensions_mut().insert(SpanFields(visitor.fields));
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut extensions = span.extensions_mut();
        if let Some(fields) = extensions.get_mut::<SpanFields>() {
            let mut visitor = JsonVisitor {
                fields: std::mem::take(&mut fields.0),
                message: None,
            };
            values.record(&mut visitor);
            fields.0 = visitor.fields;
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut record = Map::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(fields) = span.extensions().get::<SpanFields>() {
                    record.extend(fields.0.clone());
                }
            }
        }

        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);
        record.extend(visitor.fields);

        let metadata = event.metadata();
        record.insert(
            "@level".to_string(),
            JsonValue::from(metadata.level().as_str().to_ascii_lowercase()),
        );
        record.insert(
            "@message".to_string(),
            JsonValue::from(visitor.message.unwrap_or_default()),
        );
        record.insert("@module".to_string(), JsonValue::from(metadata.target()));

        if let Ok(mut line) = serde_json::to_vec(&record) {
            line.push(b'\n');
            let mut writer = self.make_writer.make_writer();
            let _ = writer.write_all(&line);
        }
    }
}

fn env_filter() -> EnvFilter {
    std::env::var(SDK_LOG_LEVEL_ENV)
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Install the JSON protocol logger on stderr as the global subscriber.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(SdkJsonLayer::new(std::io::stderr))
        .init();
}

/// Try to install the JSON protocol logger, returning false if a global
/// subscriber was already set.
pub fn try_init_logging() -> bool {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(SdkJsonLayer::new(std::io::stderr))
        .try_init()
        .is_ok()
}

/// Open the span an RPC is handled in.
///
/// Type-name fields start empty and are filled in with [`Span::record`] once
/// the request has been decoded.
pub(crate) fn rpc_span(proto_version: &'static str, rpc: &'static str, provider_addr: &str) -> Span {
    tracing::info_span!(
        target: LOG_TARGET,
        "rpc",
        tf_proto_version = proto_version,
        tf_rpc = rpc,
        tf_req_id = %uuid::Uuid::new_v4(),
        tf_provider_addr = provider_addr,
        tf_resource_type = Empty,
        tf_data_source_type = Empty,
        tf_ephemeral_resource_type = Empty,
        tf_list_resource_type = Empty,
        tf_action_type = Empty,
        tf_state_store_type = Empty,
        tf_function_name = Empty,
    )
}

pub(crate) fn received_request() {
    tracing::trace!(target: LOG_TARGET, "Received request");
}

pub(crate) fn served_request() {
    tracing::trace!(target: LOG_TARGET, "Served request");
}

pub(crate) fn client_capabilities(capabilities: Option<&ClientCapabilities>) {
    match capabilities {
        Some(caps) => tracing::trace!(
            target: LOG_TARGET,
            tf_client_capability_deferral_allowed = caps.deferral_allowed,
            tf_client_capability_write_only_attributes_allowed = caps.write_only_attributes_allowed,
            "Announced client capabilities"
        ),
        None => tracing::trace!(target: LOG_TARGET, "No announced client capabilities"),
    }
}

pub(crate) fn server_capabilities(capabilities: Option<&ServerCapabilities>) {
    if let Some(caps) = capabilities {
        tracing::trace!(
            target: LOG_TARGET,
            tf_server_capability_get_provider_schema_optional = caps.get_provider_schema_optional,
            tf_server_capability_move_resource_state = caps.move_resource_state,
            tf_server_capability_plan_destroy = caps.plan_destroy,
            "Announced server capabilities"
        );
    }
}

pub(crate) fn state_store_server_capabilities(capabilities: Option<&StateStoreServerCapabilities>) {
    if let Some(caps) = capabilities {
        tracing::trace!(
            target: LOG_TARGET,
            tf_server_capability_chunk_size = %chunk_size_mb(caps.chunk_size),
            "Announced server capabilities"
        );
    }
}

/// Log each diagnostic of a response at the level its severity maps to.
pub(crate) fn diagnostics(diagnostics: &[Diagnostic]) {
    for diag in diagnostics {
        let attribute = diag.attribute.as_ref().map(tracing::field::display);
        match diag.severity {
            DiagnosticSeverity::Error => tracing::error!(
                target: LOG_TARGET,
                diagnostic_severity = %diag.severity,
                diagnostic_summary = %diag.summary,
                diagnostic_detail = %diag.detail,
                diagnostic_attribute = attribute,
                "Response contains error diagnostic"
            ),
            DiagnosticSeverity::Warning => tracing::warn!(
                target: LOG_TARGET,
                diagnostic_severity = %diag.severity,
                diagnostic_summary = %diag.summary,
                diagnostic_detail = %diag.detail,
                diagnostic_attribute = attribute,
                "Response contains warning diagnostic"
            ),
            DiagnosticSeverity::Invalid | DiagnosticSeverity::Unrecognized(_) => tracing::warn!(
                target: LOG_TARGET,
                diagnostic_severity = %diag.severity,
                diagnostic_summary = %diag.summary,
                diagnostic_detail = %diag.detail,
                diagnostic_attribute = attribute,
                "Response contains unknown diagnostic"
            ),
        }
    }
}

pub(crate) fn deferred(deferred: Option<&Deferred>) {
    if let Some(deferred) = deferred {
        tracing::trace!(
            target: LOG_TARGET,
            tf_deferred_reason = %deferred.reason,
            "Received downstream deferred response"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::LogCapture;
    use crate::types::DeferredReason;
    use crate::tftypes::AttributePath;

    #[test]
    fn test_provider_logger_name() {
        assert_eq!(provider_logger_name("example.com/user/test"), "test");
        assert_eq!(provider_logger_name("example.com/user/test-test"), "test_test");
        assert_eq!(provider_logger_name("example.com/test"), "");
        assert_eq!(provider_logger_name(""), "");
    }

    #[test]
    fn test_chunk_size_mb() {
        assert_eq!(chunk_size_mb(8 << 20), "8MB");
        assert_eq!(chunk_size_mb(0), "0MB");
        assert_eq!(chunk_size_mb((1 << 20) - 1), "0MB");
    }

    #[test]
    fn test_deferred_trace() {
        let capture = LogCapture::new();
        tracing::subscriber::with_default(capture.subscriber(), || {
            deferred(Some(&Deferred::new(DeferredReason::ProviderConfigUnknown)));
            deferred(None);
        });

        let records = capture.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["@level"], "trace");
        assert_eq!(records[0]["@message"], "Received downstream deferred response");
        assert_eq!(records[0]["@module"], "sdk.proto");
        assert_eq!(records[0]["tf_deferred_reason"], "PROVIDER_CONFIG_UNKNOWN");
    }

    #[test]
    fn test_state_store_capability_rendering() {
        let capture = LogCapture::new();
        tracing::subscriber::with_default(capture.subscriber(), || {
            state_store_server_capabilities(Some(&StateStoreServerCapabilities {
                chunk_size: 8 << 20,
            }));
            state_store_server_capabilities(Some(&StateStoreServerCapabilities { chunk_size: 0 }));
        });

        let records = capture.records();
        assert_eq!(records[0]["tf_server_capability_chunk_size"], "8MB");
        assert_eq!(records[1]["tf_server_capability_chunk_size"], "0MB");
    }

    #[test]
    fn test_client_capabilities() {
        let capture = LogCapture::new();
        tracing::subscriber::with_default(capture.subscriber(), || {
            client_capabilities(Some(&ClientCapabilities {
                deferral_allowed: true,
                write_only_attributes_allowed: false,
            }));
            client_capabilities(None);
        });

        let records = capture.records();
        assert_eq!(records[0]["@message"], "Announced client capabilities");
        assert_eq!(records[0]["tf_client_capability_deferral_allowed"], true);
        assert_eq!(
            records[0]["tf_client_capability_write_only_attributes_allowed"],
            false
        );
        assert_eq!(records[1]["@message"], "No announced client capabilities");
    }

    #[test]
    fn test_diagnostic_levels() {
        let capture = LogCapture::new();
        tracing::subscriber::with_default(capture.subscriber(), || {
            diagnostics(&[
                Diagnostic::error("boom")
                    .with_detail("it broke")
                    .with_attribute(AttributePath::root("name")),
                Diagnostic::warning("careful"),
                Diagnostic::default(),
            ]);
        });

        let records = capture.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["@level"], "error");
        assert_eq!(records[0]["@message"], "Response contains error diagnostic");
        assert_eq!(records[0]["diagnostic_severity"], "ERROR");
        assert_eq!(records[0]["diagnostic_summary"], "boom");
        assert_eq!(records[0]["diagnostic_detail"], "it broke");
        assert_eq!(records[0]["diagnostic_attribute"], "AttributeName(\"name\")");
        assert_eq!(records[1]["@level"], "warn");
        assert_eq!(records[1]["@message"], "Response contains warning diagnostic");
        assert!(records[1].get("diagnostic_attribute").is_none());
        assert_eq!(records[2]["@level"], "warn");
        assert_eq!(records[2]["@message"], "Response contains unknown diagnostic");
    }

    #[test]
    fn test_span_fields_are_merged() {
        let capture = LogCapture::new();
        tracing::subscriber::with_default(capture.subscriber(), || {
            let span = rpc_span("6.10", "ReadResource", "registry.terraform.io/example/cloud");
            span.record(KEY_RESOURCE_TYPE, "examplecloud_instance");
            let _guard = span.enter();
            received_request();
        });

        let records = capture.records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record["@message"], "Received request");
        assert_eq!(record["tf_proto_version"], "6.10");
        assert_eq!(record["tf_rpc"], "ReadResource");
        assert_eq!(record["tf_provider_addr"], "registry.terraform.io/example/cloud");
        assert_eq!(record["tf_resource_type"], "examplecloud_instance");
        assert_eq!(record["tf_req_id"].as_str().map(str::len), Some(36));
        assert!(record.get("tf_data_source_type").is_none());
    }
}
