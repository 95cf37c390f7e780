//! Error types for channel transports

/// Failure to hand an event to a transport
///
/// Transport errors are never surfaced to the emitting call site; the
/// [`Channel`](crate::Channel) logs them and moves on to the next transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The remote end is gone (e.g. the target window was closed)
    #[error("transport '{transport}' is closed")]
    Closed {
        /// Transport identifier
        transport: String,
    },

    /// The event could not be encoded for the wire
    #[error("failed to encode event '{event_type}': {source}")]
    Encode {
        /// Event being sent
        event_type: String,
        /// Underlying serializer error
        #[source]
        source: serde_json::Error,
    },

    /// The transport refused the event for another reason
    #[error("transport '{transport}' rejected event: {message}")]
    Rejected {
        /// Transport identifier
        transport: String,
        /// Human-readable reason
        message: String,
    },
}

impl TransportError {
    /// Create closed error for transport
    #[inline]
    pub fn closed(transport: impl Into<String>) -> Self {
        Self::Closed {
            transport: transport.into(),
        }
    }

    /// Create rejected error for transport
    #[inline]
    pub fn rejected(transport: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            transport: transport.into(),
            message: message.into(),
        }
    }
}
