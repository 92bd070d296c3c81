//! Actions: provider-defined operations invoked outside the resource lifecycle.
//!
//! An invocation is streamed back to the host as events:
//!
//! ```text
//! Started -> Progress* -> Finished | Cancelled
//! ```
//!
//! Handlers push [`InvokeActionEvent`]s through an [`ActionEventSender`];
//! the [`ActionEventSequencer`] sits between the handler and the wire and
//! guarantees the host only ever sees a well-formed sequence.

use std::collections::HashMap;

use crate::diagnostic::Diagnostic;
use crate::schema::Schema;
use crate::stream::StreamSender;
use crate::types::{ClientCapabilities, Deferred, DynamicValue};

/// Summary of the diagnostic sent when a handler breaks the event order.
pub const INVALID_EVENT_SEQUENCE_SUMMARY: &str = "Invalid InvokeAction event sequence";

/// An action listed by GetMetadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionMetadata {
    /// Action type name.
    pub type_name: String,
}

/// Schema of an action.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActionSchema {
    /// Configuration schema.
    pub schema: Option<Schema>,
}

impl ActionSchema {
    /// Create an action schema.
    pub fn new(schema: Schema) -> Self {
        Self {
            schema: Some(schema),
        }
    }
}

/// ValidateActionConfig request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidateActionConfigRequest {
    /// Action type name.
    pub action_type: String,
    /// Action configuration.
    pub config: Option<DynamicValue>,
}

/// ValidateActionConfig response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidateActionConfigResponse {
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// PlanAction request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlanActionRequest {
    /// Action type name.
    pub action_type: String,
    /// Action configuration.
    pub config: Option<DynamicValue>,
    /// Features the host supports.
    pub client_capabilities: Option<ClientCapabilities>,
}

/// PlanAction response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlanActionResponse {
    /// Configuration with computed values filled in.
    pub new_config: Option<DynamicValue>,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
    /// Set when planning could not be completed yet.
    pub deferred: Option<Deferred>,
}

/// InvokeAction request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InvokeActionRequest {
    /// Action type name.
    pub action_type: String,
    /// Action configuration.
    pub config: Option<DynamicValue>,
    /// Features the host supports.
    pub client_capabilities: Option<ClientCapabilities>,
}

/// An event in an action invocation stream.
#[derive(Debug, Clone, PartialEq)]
pub enum InvokeActionEvent {
    /// The invocation began. Must be the first event.
    Started {
        /// Token the host passes to CancelAction for this invocation.
        cancellation_token: String,
        /// Diagnostics.
        diagnostics: Vec<Diagnostic>,
    },
    /// Intermediate output.
    Progress {
        /// Captured standard output.
        stdout: Option<String>,
        /// Captured standard error.
        stderr: Option<String>,
        /// Free-form status message.
        message: Option<String>,
        /// Diagnostics.
        diagnostics: Vec<Diagnostic>,
    },
    /// The invocation completed.
    Finished {
        /// Action outputs by name.
        outputs: HashMap<String, DynamicValue>,
        /// Configuration as updated by the action.
        new_config: Option<DynamicValue>,
        /// Diagnostics.
        diagnostics: Vec<Diagnostic>,
    },
    /// The invocation was cancelled.
    Cancelled {
        /// Diagnostics.
        diagnostics: Vec<Diagnostic>,
    },
}

impl InvokeActionEvent {
    /// A Started event with a cancellation token.
    pub fn started(cancellation_token: impl Into<String>) -> Self {
        Self::Started {
            cancellation_token: cancellation_token.into(),
            diagnostics: Vec::new(),
        }
    }

    /// A Progress event carrying a status message.
    pub fn progress(message: impl Into<String>) -> Self {
        Self::Progress {
            stdout: None,
            stderr: None,
            message: Some(message.into()),
            diagnostics: Vec::new(),
        }
    }

    /// A Finished event with no outputs.
    pub fn finished() -> Self {
        Self::Finished {
            outputs: HashMap::new(),
            new_config: None,
            diagnostics: Vec::new(),
        }
    }

    /// A Cancelled event.
    pub fn cancelled() -> Self {
        Self::Cancelled {
            diagnostics: Vec::new(),
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished { .. } | Self::Cancelled { .. })
    }

    /// The event's diagnostics.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Self::Started { diagnostics, .. }
            | Self::Progress { diagnostics, .. }
            | Self::Finished { diagnostics, .. }
            | Self::Cancelled { diagnostics } => diagnostics,
        }
    }

    /// Event kind name, as used in messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Started { .. } => "Started",
            Self::Progress { .. } => "Progress",
            Self::Finished { .. } => "Finished",
            Self::Cancelled { .. } => "Cancelled",
        }
    }
}

/// Sender for InvokeAction events.
pub type ActionEventSender = StreamSender<InvokeActionEvent>;

/// How forcefully an invocation should be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CancellationType {
    /// Stop gracefully.
    #[default]
    Soft,
    /// Stop immediately.
    Hard,
    /// A type this library does not know, kept by its wire value.
    Unrecognized(i32),
}

impl From<i32> for CancellationType {
    fn from(value: i32) -> Self {
        match value {
            0 => Self::Soft,
            1 => Self::Hard,
            other => Self::Unrecognized(other),
        }
    }
}

impl From<CancellationType> for i32 {
    fn from(value: CancellationType) -> Self {
        match value {
            CancellationType::Soft => 0,
            CancellationType::Hard => 1,
            CancellationType::Unrecognized(other) => other,
        }
    }
}

/// CancelAction request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CancelActionRequest {
    /// Token from the invocation's Started event.
    pub cancellation_token: String,
    /// How forcefully to cancel.
    pub cancellation_type: CancellationType,
}

/// CancelAction response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CancelActionResponse {
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingStart,
    Running,
    Terminated,
}

/// Enforces the order of InvokeAction events.
///
/// Every handler event goes through [`push`](Self::push), and the end of the
/// handler's stream through [`finish`](Self::finish). Both return the frames
/// to transmit. Out-of-order events are replaced by a terminal `Finished`
/// frame carrying a single error diagnostic, preceded by a synthesized
/// `Started` if none was sent yet. Nothing is emitted after a terminal frame.
#[derive(Debug)]
pub struct ActionEventSequencer {
    phase: Phase,
}

impl Default for ActionEventSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionEventSequencer {
    /// Create a sequencer awaiting the Started event.
    pub fn new() -> Self {
        Self {
            phase: Phase::AwaitingStart,
        }
    }

    /// Whether a terminal frame has been emitted.
    pub fn is_terminated(&self) -> bool {
        self.phase == Phase::Terminated
    }

    /// Frames to transmit for the next handler event.
    pub fn push(&mut self, event: InvokeActionEvent) -> Vec<InvokeActionEvent> {
        match (self.phase, &event) {
            (Phase::Terminated, _) => Vec::new(),
            (Phase::AwaitingStart, InvokeActionEvent::Started { .. }) => {
                self.phase = Phase::Running;
                vec![event]
            },
            (Phase::AwaitingStart, _) => self.violation(format!(
                "The provider sent a {} event before the Started event.",
                event.kind()
            )),
            (Phase::Running, InvokeActionEvent::Started { .. }) => {
                self.violation("The provider sent a second Started event.".to_string())
            },
            (Phase::Running, _) => {
                if event.is_terminal() {
                    self.phase = Phase::Terminated;
                }
                vec![event]
            },
        }
    }

    /// Frames to transmit once the handler stops producing events.
    pub fn finish(&mut self) -> Vec<InvokeActionEvent> {
        match self.phase {
            Phase::Terminated => Vec::new(),
            _ => self.violation(
                "The provider stopped sending events without a Finished or Cancelled event."
                    .to_string(),
            ),
        }
    }

    fn violation(&mut self, detail: String) -> Vec<InvokeActionEvent> {
        let mut frames = Vec::with_capacity(2);
        if self.phase == Phase::AwaitingStart {
            frames.push(InvokeActionEvent::started(""));
        }
        frames.push(InvokeActionEvent::Finished {
            outputs: HashMap::new(),
            new_config: None,
            diagnostics: vec![Diagnostic::error(INVALID_EVENT_SEQUENCE_SUMMARY).with_detail(
                format!(
                    "{} This is always an issue in the provider and should be reported to the provider developers.",
                    detail
                ),
            )],
        });
        self.phase = Phase::Terminated;
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::DiagnosticsExt;

    fn kinds(frames: &[InvokeActionEvent]) -> Vec<&'static str> {
        frames.iter().map(InvokeActionEvent::kind).collect()
    }

    #[test]
    fn test_well_formed_sequence() {
        let mut seq = ActionEventSequencer::new();
        let mut sent = Vec::new();
        sent.extend(seq.push(InvokeActionEvent::started("tok")));
        sent.extend(seq.push(InvokeActionEvent::progress("working")));
        sent.extend(seq.push(InvokeActionEvent::progress("still working")));
        sent.extend(seq.push(InvokeActionEvent::finished()));
        sent.extend(seq.finish());

        assert_eq!(kinds(&sent), ["Started", "Progress", "Progress", "Finished"]);
        assert!(seq.is_terminated());
        assert!(!sent.iter().any(|e| e.diagnostics().has_error()));
    }

    #[test]
    fn test_cancelled_is_terminal() {
        let mut seq = ActionEventSequencer::new();
        seq.push(InvokeActionEvent::started("tok"));
        assert_eq!(kinds(&seq.push(InvokeActionEvent::cancelled())), ["Cancelled"]);
        assert!(seq.push(InvokeActionEvent::progress("late")).is_empty());
        assert!(seq.finish().is_empty());
    }

    #[test]
    fn test_event_before_started() {
        let mut seq = ActionEventSequencer::new();
        let frames = seq.push(InvokeActionEvent::progress("too early"));

        assert_eq!(kinds(&frames), ["Started", "Finished"]);
        let diags = frames[1].diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].summary, INVALID_EVENT_SEQUENCE_SUMMARY);
        assert!(diags[0].detail.contains("Progress event before the Started event"));
        assert!(seq.is_terminated());
    }

    #[test]
    fn test_second_started() {
        let mut seq = ActionEventSequencer::new();
        seq.push(InvokeActionEvent::started("tok"));
        let frames = seq.push(InvokeActionEvent::started("again"));
        assert_eq!(kinds(&frames), ["Finished"]);
        assert!(frames[0].diagnostics().has_error());
    }

    #[test]
    fn test_events_after_terminal_dropped() {
        let mut seq = ActionEventSequencer::new();
        seq.push(InvokeActionEvent::started("tok"));
        seq.push(InvokeActionEvent::finished());
        assert!(seq.push(InvokeActionEvent::finished()).is_empty());
        assert!(seq.push(InvokeActionEvent::cancelled()).is_empty());
    }

    #[test]
    fn test_missing_terminal() {
        let mut seq = ActionEventSequencer::new();
        seq.push(InvokeActionEvent::started("tok"));
        seq.push(InvokeActionEvent::progress("working"));
        let frames = seq.finish();
        assert_eq!(kinds(&frames), ["Finished"]);
        assert_eq!(frames[0].diagnostics().error_count(), 1);
    }

    #[test]
    fn test_no_events_at_all() {
        let mut seq = ActionEventSequencer::new();
        let frames = seq.finish();
        assert_eq!(kinds(&frames), ["Started", "Finished"]);
    }

    #[test]
    fn test_cancellation_type_wire_values() {
        assert_eq!(CancellationType::from(0), CancellationType::Soft);
        assert_eq!(CancellationType::from(1), CancellationType::Hard);
        assert_eq!(CancellationType::from(5), CancellationType::Unrecognized(5));
        assert_eq!(i32::from(CancellationType::Hard), 1);
    }
}
