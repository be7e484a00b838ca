pub mod channel;
pub mod protocol;

pub use channel::{ChannelEvent, SignalingChannel, SignalingHandle};
pub use protocol::{ClientMessage, InboundSignal, OutboundSignal, RelayMessage};

use crate::error::Result;

/// Fire-and-forget outbound path to the relay.
pub trait SignalSink: Send + Sync {
    fn send(&self, msg: ClientMessage) -> Result<()>;
}
