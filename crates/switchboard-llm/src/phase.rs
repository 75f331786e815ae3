//! Per-call lifecycle tracking

/// Stage of a single provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum CallPhase {
    Idle,
    Formatting,
    Sending,
    Waiting,
    Retrying,
    Completed,
    Failed,
    Cancelled,
}

impl CallPhase {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `next` may follow `self`
    ///
    /// Formatting happens once per call and is never re-entered after the
    /// first send. Terminal phases admit nothing.
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Formatting | Self::Cancelled)
                | (Self::Formatting, Self::Sending | Self::Failed | Self::Cancelled)
                | (Self::Sending, Self::Waiting | Self::Failed | Self::Cancelled)
                | (
                    Self::Waiting,
                    Self::Completed | Self::Failed | Self::Cancelled | Self::Retrying
                )
                | (Self::Retrying, Self::Sending | Self::Cancelled)
        )
    }
}

/// Phase of one call, tagged with the provider that serves it
#[derive(Debug, Clone)]
pub struct CallTracker {
    provider: String,
    phase: CallPhase,
}

impl CallTracker {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            phase: CallPhase::Idle,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub const fn phase(&self) -> CallPhase {
        self.phase
    }

    /// Move to `next`, returning false and keeping the current phase if the
    /// transition is not allowed
    pub fn advance(&mut self, next: CallPhase) -> bool {
        if !self.phase.can_advance_to(next) {
            tracing::warn!(provider = %self.provider, from = %self.phase, to = %next, "invalid call phase transition");
            return false;
        }

        tracing::trace!(provider = %self.provider, from = %self.phase, to = %next, "call phase");
        self.phase = next;
        true
    }
}
