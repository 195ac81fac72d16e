//! Exchange stream adapter: wire types, codec, and the upstream feed client.

pub mod codec;
pub mod feed;
pub mod messages;

pub use codec::{CodecError, JsonCodec};
pub use feed::{FeedClientConfig, FeedError, FeedEvent, UpstreamFeedClient};
pub use messages::{SubscribeRequest, TickerEvent, UpstreamMessage};
