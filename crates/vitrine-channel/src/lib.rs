//! Vitrine Channel
//!
//! Bidirectional, transport-agnostic event bus connecting the isolated preview
//! context and the manager UI context.
//!
//! # Core Concepts
//!
//! - [`Channel`]: local listener registry plus any number of attached transports
//! - [`ChannelEvent`]: `{ type, args, from }` envelope, always a JSON copy
//! - [`ChannelTransport`]: pluggable delivery (e.g. [`PostMessageTransport`])
//! - [`events`]: process-wide event name constants shared by both contexts
//!
//! # Example
//!
//! ```rust,ignore
//! use vitrine_channel::{Channel, PostMessageTransport};
//! use serde_json::json;
//!
//! let (manager_end, preview_end) = PostMessageTransport::pair("manager", "preview");
//! let manager = Channel::new("manager");
//! let preview = Channel::new("preview");
//! manager.add_transport(manager_end);
//! preview.add_transport(preview_end);
//!
//! manager.on("x", |event| println!("{:?}", event.args));
//! preview.emit("x", vec![json!(1), json!(2)]);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod channel;
mod error;
mod event;
pub mod events;
mod transport;

pub use channel::{Channel, Listener};
pub use error::TransportError;
pub use event::{structured_clone, to_payload, ChannelEvent, WireEnvelope, CHANNEL_KEY, MAX_PAYLOAD_DEPTH};
pub use transport::{BufferedTransport, ChannelTransport, IncomingHandler, PostMessageTransport};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
