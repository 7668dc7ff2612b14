//! Channel lifecycle phases.

/// Lifecycle phase of a supervised channel.
///
/// ```text
/// ┌──────┐ connect  ┌────────────┐ first message ┌────────┐
/// │ Idle │─────────>│ Connecting │──────────────>│ Active │
/// └──────┘          └────────────┘               └────────┘
///                         │                         │
///                         │ step failure            │ reset / timeout /
///                         ↓                         ↓ threshold trip
///                    ┌─────────┐  retry        ┌─────────┐
///                    │ Faulted │──────────────>│ Faulted │──> Connecting
///                    └─────────┘  configured   └─────────┘    (with retry)
///                         │                         │
///                         ↓ no retry / cancel       ↓
///                    ┌────────────┐            ┌────────────┐
///                    │ Terminated │            │ Terminated │
///                    └────────────┘            └────────────┘
/// ```
///
/// A reset tears the current cycle down and, when retry is configured,
/// rebuilds a fresh cycle; handles from the torn-down cycle stay dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelPhase {
    /// No cycle has been started.
    #[default]
    Idle,
    /// A cycle is being built: session created, transport dialing, helper
    /// starting. No message has been delivered yet.
    Connecting,
    /// At least one message has been delivered this cycle.
    Active,
    /// The cycle was torn down by a reset or a failed build step.
    Faulted,
    /// The channel is stopped and will not restart on its own.
    Terminated,
}

impl ChannelPhase {
    /// Whether the channel can still make progress without outside help.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Active)
    }

    /// Whether this phase ends the channel until the owner intervenes.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated)
    }
}
