//! Relay subscriber client with bounded reconnect.

mod reconnector;

pub use reconnector::{ClientError, ClientEvent, ClientReconnector, ClientReconnectorConfig};
