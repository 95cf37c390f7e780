//! Channel transports
//!
//! - [`PostMessageTransport`]: a two-ended, JSON-encoded pipe standing in for
//!   `postMessage` between the manager and the preview frame
//! - [`BufferedTransport`]: records outbound events and lets callers inject
//!   inbound ones (server connections, tests)

use crate::error::TransportError;
use crate::event::{ChannelEvent, WireEnvelope};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Callback installed by the [`Channel`](crate::Channel) to receive events
pub type IncomingHandler = Arc<dyn Fn(ChannelEvent) + Send + Sync>;

/// Delivery mechanism for channel events
pub trait ChannelTransport: Send + Sync {
    /// Transport identifier (for logs)
    fn id(&self) -> &str;

    /// Hand an event to the remote side
    ///
    /// # Errors
    /// Returns [`TransportError`] when the event cannot be delivered; the
    /// channel logs it and continues.
    fn send(&self, event: &ChannelEvent) -> Result<(), TransportError>;

    /// Install the callback for events arriving from the remote side
    fn set_handler(&self, handler: IncomingHandler);
}

/// One end of an in-process message pipe
///
/// Events are encoded as [`WireEnvelope`] JSON strings, so nothing but a copy
/// ever crosses the boundary. Delivery is FIFO per direction. The receiving
/// loop starts when the owning channel installs its handler; messages sent
/// before that are buffered.
pub struct PostMessageTransport {
    id: String,
    outbound: mpsc::UnboundedSender<String>,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    closed: Arc<AtomicBool>,
    peer_closed: Arc<AtomicBool>,
}

impl PostMessageTransport {
    /// Create both ends of a pipe, named after the context owning each end
    #[must_use]
    pub fn pair(left: &str, right: &str) -> (Self, Self) {
        let (to_right, from_left) = mpsc::unbounded_channel();
        let (to_left, from_right) = mpsc::unbounded_channel();
        let left_closed = Arc::new(AtomicBool::new(false));
        let right_closed = Arc::new(AtomicBool::new(false));

        let left_end = Self {
            id: format!("postmessage:{left}"),
            outbound: to_right,
            inbound: Mutex::new(Some(from_right)),
            reader: Mutex::new(None),
            closed: Arc::clone(&left_closed),
            peer_closed: Arc::clone(&right_closed),
        };
        let right_end = Self {
            id: format!("postmessage:{right}"),
            outbound: to_left,
            inbound: Mutex::new(Some(from_left)),
            reader: Mutex::new(None),
            closed: right_closed,
            peer_closed: left_closed,
        };
        (left_end, right_end)
    }

    /// Close this end, like closing the window that owns it
    ///
    /// Subsequent sends from either end fail with [`TransportError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
    }

    /// Whether either end has been closed
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.peer_closed.load(Ordering::SeqCst)
    }
}

impl ChannelTransport for PostMessageTransport {
    fn id(&self) -> &str {
        &self.id
    }

    fn send(&self, event: &ChannelEvent) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::closed(&self.id));
        }

        let encoded = serde_json::to_string(&WireEnvelope::new(event.clone())).map_err(|source| {
            TransportError::Encode {
                event_type: event.event_type.clone(),
                source,
            }
        })?;

        self.outbound
            .send(encoded)
            .map_err(|_| TransportError::closed(&self.id))
    }

    fn set_handler(&self, handler: IncomingHandler) {
        let Some(mut inbound) = self.inbound.lock().take() else {
            tracing::warn!(transport = %self.id, "handler already installed");
            return;
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!(transport = %self.id, error = %e, "no runtime to receive messages");
                return;
            }
        };

        let id = self.id.clone();
        let closed = Arc::clone(&self.closed);
        let reader = runtime.spawn(async move {
            while let Some(raw) = inbound.recv().await {
                if closed.load(Ordering::SeqCst) {
                    break;
                }
                match serde_json::from_str::<WireEnvelope>(&raw) {
                    Ok(envelope) if envelope.is_vitrine() => handler(envelope.event),
                    Ok(envelope) => {
                        tracing::trace!(transport = %id, key = %envelope.key, "foreign message ignored");
                    }
                    Err(e) => {
                        tracing::warn!(transport = %id, error = %e, "undecodable message dropped");
                    }
                }
            }
        });
        *self.reader.lock() = Some(reader);
    }
}

impl Drop for PostMessageTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.get_mut().take() {
            reader.abort();
        }
    }
}

impl std::fmt::Debug for PostMessageTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostMessageTransport")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Transport that keeps outbound events in memory
#[derive(Default)]
pub struct BufferedTransport {
    id: String,
    sent: Mutex<Vec<ChannelEvent>>,
    handler: RwLock<Option<IncomingHandler>>,
    failing: AtomicBool,
}

impl BufferedTransport {
    /// Create transport
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Events sent so far
    #[must_use]
    pub fn sent(&self) -> Vec<ChannelEvent> {
        self.sent.lock().clone()
    }

    /// Drain events sent so far
    pub fn take_sent(&self) -> Vec<ChannelEvent> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Make every subsequent send fail (or succeed again)
    pub fn fail_sends(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Deliver an event as if it arrived from the remote side
    pub fn inject(&self, event: ChannelEvent) {
        let handler = self.handler.read().clone();
        match handler {
            Some(handler) => handler(event),
            None => tracing::warn!(transport = %self.id, "event injected before handler installed"),
        }
    }
}

impl ChannelTransport for BufferedTransport {
    fn id(&self) -> &str {
        &self.id
    }

    fn send(&self, event: &ChannelEvent) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::rejected(&self.id, "sends disabled"));
        }
        self.sent.lock().push(event.clone());
        Ok(())
    }

    fn set_handler(&self, handler: IncomingHandler) {
        *self.handler.write() = Some(handler);
    }
}

impl<T: ChannelTransport + ?Sized> ChannelTransport for Arc<T> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn send(&self, event: &ChannelEvent) -> Result<(), TransportError> {
        (**self).send(event)
    }

    fn set_handler(&self, handler: IncomingHandler) {
        (**self).set_handler(handler);
    }
}
