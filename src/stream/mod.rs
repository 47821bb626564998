//! Entertainment streaming: frame codec, secure transport and the session
//! that ties them together.

pub mod dtls;
pub mod frame;
pub(crate) mod session;
pub(crate) mod transport;

pub use dtls::DtlsTransport;
pub use frame::StreamFrame;
pub use session::{
    LightStates, SessionOutcome, SessionState, StopSignal, StreamHandle, StreamSession,
};
pub use transport::{HandshakeWindow, SecureChannel, SecureTransport, WriteError};
