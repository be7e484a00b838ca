pub mod connection;
pub mod ice;
pub mod media;
pub mod negotiator;
pub mod state;
pub mod transport;
pub mod types;

pub use connection::{RtcTransport, RtcTransportFactory};
pub use ice::CandidateBuffer;
pub use media::{LocalTrack, MediaSource, NoMedia, StaticMedia};
pub use negotiator::Negotiator;
pub use state::NegotiationState;
pub use transport::{PeerTransport, TransportEvent, TransportEventKind, TransportFactory};
pub use types::{ConnectionState, IceCandidate, SdpKind, SessionDescription, SignalMessage, SignalPayload};
