//! Vitrine instrumenter
//!
//! Intercepts the calls a play function makes so the manager can show them as
//! a live, steppable log.
//!
//! # Key types
//!
//! - [`Instrumenter`]: wraps functions and follows render phases on a channel
//! - [`Instrumented`]: the wrapped functions, invoked by name
//! - [`Call`]: one intercepted call with its status and ancestors
//! - [`AssertionError`]: failed expectation, classified apart from other errors
//!
//! # Events
//!
//! Publishes `instrumenter/call` on every call status change and
//! `instrumenter/sync` with the call log and usable controls. Listens for
//! `instrumenter/pause-on-exception`, `continue`, `rerun`, `start`, `next`,
//! `end`, `back` and `goto`.

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod call;
pub mod error;
pub mod instrumenter;

pub use call::{call_id, Call, CallException, CallStatus, ControlStates, LogItem, SyncPayload};
pub use error::{expect_equal, AssertionError, ExceptionKind, InstrumentError};
pub use instrumenter::{target, ExceptionAction, InstrumentOptions, Instrumented, Instrumenter, TargetFn};

/// Instrumenter version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
