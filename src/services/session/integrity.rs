use std::collections::VecDeque;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Client-reported signals that the student left the exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum IntegritySignal {
    VisibilityHidden,
    FocusLost,
}

impl IntegritySignal {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::VisibilityHidden => "visibility_hidden",
            Self::FocusLost => "focus_lost",
        }
    }
}

/// Stream of integrity signals delivered to one live attempt.
#[async_trait]
pub(crate) trait IntegrityEventSource: Send {
    /// Next signal, or `None` once the source is drained.
    async fn next_signal(&mut self) -> Option<IntegritySignal>;
}

/// Signals the browser buffered and posted together, replayed in the order they happened.
#[derive(Debug, Default)]
pub(crate) struct SignalBatch {
    pending: VecDeque<IntegritySignal>,
}

impl SignalBatch {
    pub(crate) fn new(signals: impl IntoIterator<Item = IntegritySignal>) -> Self {
        Self { pending: signals.into_iter().collect() }
    }
}

#[async_trait]
impl IntegrityEventSource for SignalBatch {
    async fn next_signal(&mut self) -> Option<IntegritySignal> {
        self.pending.pop_front()
    }
}
