//! Streaming session state machine.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::{debug, error, info, warn};
use parking_lot::{Mutex, MutexGuard};
use strum_macros::Display;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::frame;
use super::transport::{HandshakeWindow, SecureChannel, SecureTransport, WriteError};
use crate::config::StreamConfig;
use crate::light::Light;
use crate::types::Point;

/// Lights shared between the writer and the streaming task.
///
/// Writers lock once per light update. The streaming task only holds the lock
/// long enough to copy out a [`snapshot`](LightStates::snapshot).
#[derive(Clone, Default)]
pub struct LightStates(Arc<Mutex<Vec<Light>>>);

impl LightStates {
    pub fn new(lights: Vec<Light>) -> Self {
        Self(Arc::new(Mutex::new(lights)))
    }

    pub fn lock(&self) -> MutexGuard<'_, Vec<Light>> {
        self.0.lock()
    }

    /// Current `(id, colour)` of every light, in order.
    pub fn snapshot(&self) -> Vec<(u16, Point)> {
        self.0.lock().iter().map(|l| (l.id(), l.color())).collect()
    }

    /// Swap in a new light set, returning the old one. The caller decides
    /// when the old lights are dropped (and restored).
    pub fn replace(&self, lights: Vec<Light>) -> Vec<Light> {
        std::mem::replace(&mut *self.0.lock(), lights)
    }

    pub fn ids(&self) -> Vec<u16> {
        self.0.lock().iter().map(Light::id).collect()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

/// Observable phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionState {
    Idle,
    Connecting,
    Handshaking,
    Streaming,
    Closing,
    Closed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Stopped on request.
    Stopped,
    /// The bridge closed the stream.
    PeerClosed,
    ConnectFailed(String),
    /// Number of attempts made.
    HandshakeFailed(u32),
    WriteFailed(String),
    /// The session task itself died.
    Aborted(String),
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionOutcome::Stopped => write!(f, "stopped"),
            SessionOutcome::PeerClosed => write!(f, "closed by peer"),
            SessionOutcome::ConnectFailed(e) => write!(f, "connect failed: {e}"),
            SessionOutcome::HandshakeFailed(n) => write!(f, "handshake failed after {n} attempt(s)"),
            SessionOutcome::WriteFailed(e) => write!(f, "write failed: {e}"),
            SessionOutcome::Aborted(e) => write!(f, "aborted: {e}"),
        }
    }
}

impl SessionOutcome {
    pub fn is_failure(&self) -> bool {
        !matches!(self, SessionOutcome::Stopped | SessionOutcome::PeerClosed)
    }
}

/// Cloneable stop flag of a session.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handle to a running session. Dropping it asks the session to stop.
pub struct StreamHandle {
    stop: StopSignal,
    state: watch::Receiver<SessionState>,
    task: Option<JoinHandle<SessionOutcome>>,
}

impl StreamHandle {
    /// Ask the session to stop. It notices at the next tick, or between
    /// handshake attempts.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Wait for the session to end.
    pub async fn join(mut self) -> SessionOutcome {
        let Some(task) = self.task.take() else {
            return SessionOutcome::Stopped;
        };
        task.await
            .unwrap_or_else(|e| SessionOutcome::Aborted(e.to_string()))
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.stop.stop();
    }
}

/// Each phase owns exactly the resources that are live in it; leaving a phase
/// drops them.
enum Phase<T: SecureTransport> {
    Idle,
    Connecting,
    Handshaking {
        socket: T::Socket,
    },
    Streaming {
        socket: T::Socket,
        channel: T::Channel,
    },
    Closing {
        socket: T::Socket,
        channel: Option<T::Channel>,
        outcome: SessionOutcome,
    },
    Done(SessionOutcome),
}

impl<T: SecureTransport> Phase<T> {
    fn state(&self) -> SessionState {
        match self {
            Phase::Idle => SessionState::Idle,
            Phase::Connecting => SessionState::Connecting,
            Phase::Handshaking { .. } => SessionState::Handshaking,
            Phase::Streaming { .. } => SessionState::Streaming,
            Phase::Closing { .. } => SessionState::Closing,
            Phase::Done(outcome) if outcome.is_failure() => SessionState::Failed,
            Phase::Done(_) => SessionState::Closed,
        }
    }
}

/// Pushes the colours of a light set to the bridge at a fixed cadence.
pub struct StreamSession<T: SecureTransport> {
    transport: T,
    addr: String,
    config: StreamConfig,
    lights: LightStates,
    stop: StopSignal,
    state: watch::Sender<SessionState>,
    seq: u8,
}

impl<T: SecureTransport> StreamSession<T> {
    /// Spawn a session streaming `lights` to `host` on the configured port.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(transport: T, host: &str, config: StreamConfig, lights: LightStates) -> StreamHandle {
        let (state, state_rx) = watch::channel(SessionState::Idle);
        let stop = StopSignal::default();
        let session = StreamSession {
            transport,
            addr: format!("{host}:{}", config.port),
            config,
            lights,
            stop: stop.clone(),
            state,
            seq: 0,
        };

        StreamHandle {
            stop,
            state: state_rx,
            task: Some(tokio::spawn(session.run())),
        }
    }

    async fn run(mut self) -> SessionOutcome {
        let mut phase = Phase::Idle;
        loop {
            phase = match phase {
                Phase::Done(outcome) => {
                    debug!("Stream to {} ended: {outcome}", self.addr);
                    return outcome;
                }
                phase => self.step(phase).await,
            };
            self.state.send_replace(phase.state());
        }
    }

    async fn step(&mut self, phase: Phase<T>) -> Phase<T> {
        match phase {
            Phase::Idle => Phase::Connecting,
            Phase::Connecting => match self.transport.open(&self.addr).await {
                Ok(socket) => Phase::Handshaking { socket },
                Err(e) => {
                    error!("Failed to open stream socket to {}: {e}", self.addr);
                    Phase::Done(SessionOutcome::ConnectFailed(e.to_string()))
                }
            },
            Phase::Handshaking { socket } => self.handshake(socket).await,
            Phase::Streaming { socket, channel } => {
                let outcome = self.stream(&channel).await;
                Phase::Closing {
                    socket,
                    channel: Some(channel),
                    outcome,
                }
            }
            Phase::Closing {
                socket,
                channel,
                outcome,
            } => {
                if let Some(channel) = channel {
                    channel.close_notify().await;
                }
                drop(socket);
                Phase::Done(outcome)
            }
            Phase::Done(outcome) => Phase::Done(outcome),
        }
    }

    async fn handshake(&mut self, socket: T::Socket) -> Phase<T> {
        let window = HandshakeWindow {
            min: self.config.handshake_timeout_min(),
            max: self.config.handshake_timeout_max(),
        };
        let attempts = self.config.handshake_attempts.max(1);

        for attempt in 1..=attempts {
            if self.stop.is_stopped() {
                return Phase::Closing {
                    socket,
                    channel: None,
                    outcome: SessionOutcome::Stopped,
                };
            }

            match self.transport.handshake(&socket, &window).await {
                Ok(channel) => {
                    info!("Handshake with {} done after {attempt} attempt(s)", self.addr);
                    return Phase::Streaming { socket, channel };
                }
                Err(e) => {
                    warn!("Handshake attempt {attempt}/{attempts} with {} failed: {e}", self.addr);
                    if attempt < attempts {
                        tokio::time::sleep(self.config.handshake_retry_delay()).await;
                    }
                }
            }
        }

        error!("Handshake with {} failed, giving up", self.addr);
        Phase::Done(SessionOutcome::HandshakeFailed(attempts))
    }

    async fn stream(&mut self, channel: &T::Channel) -> SessionOutcome {
        let tick = self.config.tick();
        let mut retries_left = self.config.write_retries;

        loop {
            if self.stop.is_stopped() {
                return SessionOutcome::Stopped;
            }

            let started = Instant::now();
            let bytes = frame::encode(self.seq, self.lights.snapshot());
            self.seq = self.seq.wrapping_add(1);

            match channel.send(&bytes).await {
                Ok(()) => {}
                Err(WriteError::Timeout) if retries_left > 0 => {
                    retries_left -= 1;
                    warn!("Stream write timed out, {retries_left} retries left");
                }
                Err(WriteError::Timeout) => {
                    error!("Stream write timed out, no retries left");
                    return SessionOutcome::WriteFailed("timed out".to_string());
                }
                Err(WriteError::PeerClosed) => {
                    info!("Bridge closed the stream");
                    return SessionOutcome::PeerClosed;
                }
                Err(WriteError::Other(e)) => {
                    error!("Stream write failed: {e}");
                    return SessionOutcome::WriteFailed(e);
                }
            }

            tokio::time::sleep(tick.saturating_sub(started.elapsed())).await;
        }
    }
}
