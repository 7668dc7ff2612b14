//! Application envelope carried inside sealed messages.

use serde::{Deserialize, Serialize};

/// A typed application message.
///
/// The envelope is deliberately minimal: a type discriminator for routing, a
/// correlation id, and a free-form data field. Both halves of a channel
/// agree on discriminator values out of band; this crate does not interpret
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Routing discriminator (e.g. `"addItem"`).
    #[serde(rename = "type")]
    pub kind: String,

    /// Correlation id chosen by the sender.
    pub id: String,

    /// Free-form payload, interpreted by the receiver per `kind`.
    pub data: String,
}

impl Envelope {
    /// Build an envelope from its three parts.
    pub fn new(
        kind: impl Into<String>,
        id: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self { kind: kind.into(), id: id.into(), data: data.into() }
    }
}
