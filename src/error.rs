// ============================================================================
// Relay Errors
// ============================================================================
//
// One taxonomy for every failure the relay can observe:
// - Decode / UnsupportedEnvelope: inbound message is dropped after logging
// - Transport: surfaced to the immediate caller, logged at listener boundary
// - Serialization: surfaced to the caller of accept_order (HTTP 500)
// - Config: startup only, process refuses to start
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("cannot decode message on channel '{channel}': {reason}")]
    Decode { channel: String, reason: String },

    #[error("unsupported envelope on channel '{channel}': {kind}")]
    UnsupportedEnvelope { channel: String, kind: String },

    #[error("{transport} transport failure: {message}")]
    Transport {
        transport: &'static str,
        message: String,
    },

    #[error("cannot serialize {entity}: {source}")]
    Serialization {
        entity: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RelayError {
    pub fn decode(channel: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        RelayError::Decode {
            channel: channel.into(),
            reason: reason.to_string(),
        }
    }

    pub fn transport(transport: &'static str, message: impl std::fmt::Display) -> Self {
        RelayError::Transport {
            transport,
            message: message.to_string(),
        }
    }

    /// Short label used for the `reason` metric dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Decode { .. } => "decode",
            RelayError::UnsupportedEnvelope { .. } => "unsupported_envelope",
            RelayError::Transport { .. } => "transport",
            RelayError::Serialization { .. } => "serialization",
            RelayError::Config(_) => "config",
        }
    }
}
