//! Channel: local listeners plus attached transports
//!
//! Delivery rules:
//! - `emit` runs local listeners synchronously, then hands the event to every
//!   transport
//! - an event arriving from a transport reaches local listeners and every
//!   other transport, never the transport it came from
//! - a failing transport is logged and skipped

use crate::event::{structured_clone, ChannelEvent};
use crate::transport::{ChannelTransport, IncomingHandler};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

type Handler = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

/// Listener ids are unique across every channel in the process
static NEXT_LISTENER: AtomicU64 = AtomicU64::new(1);

/// Subscription handle returned by [`Channel::on`]
///
/// Pass it back to [`Channel::off`] to unsubscribe.
#[derive(Clone)]
pub struct Listener {
    id: u64,
    once: bool,
    handler: Handler,
}

impl Listener {
    /// Listener identifier (unique per process)
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("once", &self.once)
            .finish_non_exhaustive()
    }
}

struct TransportSlot {
    slot: usize,
    transport: Arc<dyn ChannelTransport>,
}

struct ChannelInner {
    /// Name stamped into `from` of emitted events
    source: Option<String>,
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
    transports: RwLock<Vec<TransportSlot>>,
    next_slot: AtomicUsize,
}

/// Bidirectional event bus
///
/// Cheap to clone; clones share listeners and transports.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    /// Create channel for a named context (`"preview"`, `"manager"`, ...)
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self::build(Some(source.into()))
    }

    /// Create anonymous channel, used as a plain in-process emitter
    #[must_use]
    pub fn local() -> Self {
        Self::build(None)
    }

    fn build(source: Option<String>) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                source,
                listeners: RwLock::new(HashMap::new()),
                transports: RwLock::new(Vec::new()),
                next_slot: AtomicUsize::new(0),
            }),
        }
    }

    /// Name of the owning context
    #[inline]
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.inner.source.as_deref()
    }

    /// Attach a transport
    ///
    /// Incoming events from the transport are routed through this channel.
    pub fn add_transport<T: ChannelTransport + 'static>(&self, transport: T) {
        self.add_shared_transport(Arc::new(transport));
    }

    /// Attach a transport that is also held elsewhere
    pub fn add_shared_transport(&self, transport: Arc<dyn ChannelTransport>) {
        let slot = self.inner.next_slot.fetch_add(1, Ordering::Relaxed);
        let weak: Weak<ChannelInner> = Arc::downgrade(&self.inner);

        let handler: IncomingHandler = Arc::new(move |event: ChannelEvent| {
            if let Some(inner) = weak.upgrade() {
                Channel { inner }.handle_incoming(slot, &event);
            }
        });
        transport.set_handler(handler);

        tracing::debug!(transport = transport.id(), slot, "transport attached");
        self.inner
            .transports
            .write()
            .push(TransportSlot { slot, transport });
    }

    /// Number of attached transports
    #[inline]
    #[must_use]
    pub fn transport_count(&self) -> usize {
        self.inner.transports.read().len()
    }

    /// Emit event to local listeners and all transports
    pub fn emit(&self, event_type: &str, args: Vec<Value>) {
        let args = args.iter().map(structured_clone).collect();
        let event = ChannelEvent::new(event_type, args).with_from(self.inner.source.clone());

        self.dispatch_local(&event);
        self.broadcast(&event, None);
    }

    /// Subscribe to an event type
    pub fn on<F>(&self, event_type: &str, handler: F) -> Listener
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        self.subscribe(event_type, Arc::new(handler), false)
    }

    /// Subscribe for a single delivery
    pub fn once<F>(&self, event_type: &str, handler: F) -> Listener
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        self.subscribe(event_type, Arc::new(handler), true)
    }

    /// Unsubscribe; unknown listeners are ignored
    pub fn off(&self, event_type: &str, listener: &Listener) {
        let mut listeners = self.inner.listeners.write();
        if let Some(list) = listeners.get_mut(event_type) {
            list.retain(|l| l.id != listener.id);
            if list.is_empty() {
                listeners.remove(event_type);
            }
        }
    }

    /// Remove every listener for an event type
    pub fn remove_all_listeners(&self, event_type: &str) {
        self.inner.listeners.write().remove(event_type);
    }

    /// Number of listeners for an event type
    #[must_use]
    pub fn listener_count(&self, event_type: &str) -> usize {
        self.inner
            .listeners
            .read()
            .get(event_type)
            .map_or(0, Vec::len)
    }

    fn subscribe(&self, event_type: &str, handler: Handler, once: bool) -> Listener {
        let listener = Listener {
            id: NEXT_LISTENER.fetch_add(1, Ordering::Relaxed),
            once,
            handler,
        };
        self.inner
            .listeners
            .write()
            .entry(event_type.to_string())
            .or_default()
            .push(listener.clone());
        listener
    }

    fn handle_incoming(&self, from_slot: usize, event: &ChannelEvent) {
        tracing::trace!(event_type = %event.event_type, from_slot, "incoming event");
        self.dispatch_local(event);
        self.broadcast(event, Some(from_slot));
    }

    /// Run listeners from a snapshot so handlers may subscribe, unsubscribe
    /// or emit re-entrantly.
    fn dispatch_local(&self, event: &ChannelEvent) {
        let snapshot: Vec<Listener> = {
            let mut listeners = self.inner.listeners.write();
            let Some(list) = listeners.get_mut(&event.event_type) else {
                return;
            };
            let snapshot = list.clone();
            list.retain(|l| !l.once);
            if list.is_empty() {
                listeners.remove(&event.event_type);
            }
            snapshot
        };

        for listener in snapshot {
            (listener.handler)(event);
        }
    }

    fn broadcast(&self, event: &ChannelEvent, skip_slot: Option<usize>) {
        let transports: Vec<(usize, Arc<dyn ChannelTransport>)> = self
            .inner
            .transports
            .read()
            .iter()
            .filter(|t| Some(t.slot) != skip_slot)
            .map(|t| (t.slot, Arc::clone(&t.transport)))
            .collect();

        for (slot, transport) in transports {
            if let Err(e) = transport.send(event) {
                tracing::warn!(
                    transport = transport.id(),
                    slot,
                    event_type = %event.event_type,
                    error = %e,
                    "transport send failed"
                );
            }
        }
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::local()
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("source", &self.inner.source)
            .field("transports", &self.transport_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::BufferedTransport;
    use parking_lot::Mutex;
    use serde_json::json;

    fn recorder(channel: &Channel, event_type: &str) -> (Listener, Arc<Mutex<Vec<Vec<Value>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener = channel.on(event_type, move |event| sink.lock().push(event.args.clone()));
        (listener, seen)
    }

    #[test]
    fn emit_triggers_local_listener_synchronously() {
        let channel = Channel::local();
        let (_listener, seen) = recorder(&channel, "x");

        channel.emit("x", vec![json!(1), json!(2)]);

        assert_eq!(*seen.lock(), vec![vec![json!(1), json!(2)]]);
    }

    #[test]
    fn off_removes_listener() {
        let channel = Channel::local();
        let (listener, seen) = recorder(&channel, "x");

        channel.off("x", &listener);
        channel.emit("x", vec![]);

        assert!(seen.lock().is_empty());
        assert_eq!(channel.listener_count("x"), 0);
    }

    #[test]
    fn off_unknown_listener_is_noop() {
        let channel = Channel::local();
        let other = Channel::local();
        let (stranger, _) = recorder(&other, "x");
        let (_listener, seen) = recorder(&channel, "x");

        channel.off("x", &stranger);
        channel.off("never-subscribed", &stranger);
        channel.emit("x", vec![]);

        assert_eq!(seen.lock().len(), 1);
        assert_eq!(channel.listener_count("x"), 1);
    }

    #[test]
    fn listener_ids_do_not_repeat_across_channels() {
        let first = Channel::local();
        let second = Channel::local();
        let (a, _) = recorder(&first, "x");
        let (b, seen) = recorder(&second, "x");
        assert_ne!(a.id(), b.id());

        second.off("x", &a);
        second.emit("x", vec![]);
        assert_eq!(seen.lock().len(), 1);

        second.off("x", &b);
        assert_eq!(second.listener_count("x"), 0);
    }

    #[test]
    fn once_fires_a_single_time() {
        let channel = Channel::local();
        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        channel.once("x", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        channel.emit("x", vec![]);
        channel.emit("x", vec![]);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listeners_may_emit_reentrantly() {
        let channel = Channel::local();
        let inner = channel.clone();
        channel.on("ping", move |_| inner.emit("pong", vec![]));
        let (_listener, seen) = recorder(&channel, "pong");

        channel.emit("ping", vec![]);

        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn emit_stamps_source() {
        let channel = Channel::new("preview");
        let from = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&from);
        channel.on("x", move |event| *sink.lock() = event.from.clone());

        channel.emit("x", vec![]);

        assert_eq!(from.lock().as_deref(), Some("preview"));
    }

    #[test]
    fn emit_reaches_every_transport() {
        let channel = Channel::local();
        let a = Arc::new(BufferedTransport::new("a"));
        let b = Arc::new(BufferedTransport::new("b"));
        channel.add_shared_transport(a.clone());
        channel.add_shared_transport(b.clone());

        channel.emit("x", vec![json!("payload")]);

        assert_eq!(a.sent().len(), 1);
        assert_eq!(b.sent().len(), 1);
    }

    #[test]
    fn incoming_event_is_not_echoed_to_its_transport() {
        let channel = Channel::local();
        let a = Arc::new(BufferedTransport::new("a"));
        let b = Arc::new(BufferedTransport::new("b"));
        channel.add_shared_transport(a.clone());
        channel.add_shared_transport(b.clone());
        let (_listener, seen) = recorder(&channel, "x");

        a.inject(ChannelEvent::new("x", vec![json!(7)]));

        assert_eq!(seen.lock().len(), 1);
        assert!(a.sent().is_empty());
        assert_eq!(b.sent().len(), 1);
    }

    #[test]
    fn failing_transport_does_not_block_others() {
        let channel = Channel::local();
        let broken = Arc::new(BufferedTransport::new("broken"));
        broken.fail_sends(true);
        let healthy = Arc::new(BufferedTransport::new("healthy"));
        channel.add_shared_transport(broken.clone());
        channel.add_shared_transport(healthy.clone());
        let (_listener, seen) = recorder(&channel, "x");

        channel.emit("x", vec![]);

        assert!(broken.sent().is_empty());
        assert_eq!(healthy.sent().len(), 1);
        assert_eq!(seen.lock().len(), 1);
    }
}
