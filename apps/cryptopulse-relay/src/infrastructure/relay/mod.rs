//! Relay side: wire format, ticker transform, subscriber registry, and the
//! HTTP/WebSocket server.

pub mod registry;
pub mod server;
pub mod transform;
pub mod wire;

pub use registry::{DeliveryReport, RegistryStats, SharedRegistry, SubscriberId, SubscriberRegistry};
pub use server::{RelayServer, RelayServerConfig, RelayServerError, forward_feed_events};
pub use transform::{TickerTransformer, TransformError};
pub use wire::{TickerPayload, WireMessage};
