use std::sync::Arc;

use super::error::PayloadError;
use super::root::SliceKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Warn,
    Error,
}

impl DiagnosticLevel {
    pub fn label(self) -> &'static str {
        match self {
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// The payload did not fit the slice; the slice was left unchanged.
    InvalidPayload,
    /// Two incoming entities claimed one identity; the last one won.
    MergeConflict,
    /// A pending entity was discarded because its dataset went away.
    PendingDropped,
    /// An entity failed validation against its loaded dataset.
    ValidationDropped,
    /// A combined updater rolled back.
    StepFailed,
}

impl DiagnosticKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::InvalidPayload => "invalid-payload",
            Self::MergeConflict => "merge-conflict",
            Self::PendingDropped => "pending-dropped",
            Self::ValidationDropped => "validation-dropped",
            Self::StepFailed => "step-failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub slice: SliceKey,
    pub level: DiagnosticLevel,
    pub kind: DiagnosticKind,
    pub message: Arc<str>,
}

/// Conditions reported by reducers instead of failing the dispatch.
///
/// Every entry is logged through `tracing` when it is recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, slice: SliceKey, kind: DiagnosticKind, message: impl Into<Arc<str>>) {
        let message = message.into();
        tracing::warn!(slice = %slice, kind = kind.label(), "{message}");
        self.entries.push(Diagnostic {
            slice,
            level: DiagnosticLevel::Warn,
            kind,
            message,
        });
    }

    pub fn error(&mut self, slice: SliceKey, kind: DiagnosticKind, message: impl Into<Arc<str>>) {
        let message = message.into();
        tracing::error!(slice = %slice, kind = kind.label(), "{message}");
        self.entries.push(Diagnostic {
            slice,
            level: DiagnosticLevel::Error,
            kind,
            message,
        });
    }

    pub fn reject(&mut self, slice: SliceKey, err: &PayloadError) {
        self.warn(slice, DiagnosticKind::InvalidPayload, err.to_string());
    }

    pub fn append(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_kind(&self, kind: DiagnosticKind) -> bool {
        self.entries.iter().any(|entry| entry.kind == kind)
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}
