//! Bot core — routing inbound messages and running the event loop.

pub mod keyed_lock;
pub mod router;
pub mod runtime;

pub use keyed_lock::KeyedLock;
pub use router::{DEFAULT_FIRST_CONTACT_WINDOW, MessageRouter, RouteOutcome, RoutedReply};
pub use runtime::{BotRuntime, RuntimeConfig};
