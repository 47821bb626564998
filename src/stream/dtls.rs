//! DTLS-PSK transport over UDP.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::net::UdpSocket;
use webrtc::dtls::cipher_suite::CipherSuiteId;
use webrtc::dtls::config::Config;
use webrtc::dtls::conn::DTLSConn;
use webrtc::util::Conn;

use super::transport::{HandshakeWindow, SecureChannel, SecureTransport, WriteError};
use crate::config::BridgeEndpoint;
use crate::errors::Error;

type Result<T> = std::result::Result<T, Error>;

/// Production transport: a connected UDP socket with a PSK-authenticated
/// DTLS 1.2 session on top, restricted to `TLS_PSK_WITH_AES_128_GCM_SHA256`.
#[derive(Clone)]
pub struct DtlsTransport {
    identity: Vec<u8>,
    psk: Vec<u8>,
    write_timeout: Duration,
}

impl DtlsTransport {
    pub fn new(identity: Vec<u8>, psk: Vec<u8>, write_timeout: Duration) -> Self {
        Self {
            identity,
            psk,
            write_timeout,
        }
    }

    /// Key material from a bridge endpoint: the username is the identity, the
    /// hex decoded client key is the PSK.
    pub fn from_endpoint(endpoint: &BridgeEndpoint, write_timeout: Duration) -> Result<Self> {
        Ok(Self::new(endpoint.psk_identity(), endpoint.psk()?, write_timeout))
    }

    fn config(&self, window: &HandshakeWindow) -> Config {
        let psk = self.psk.clone();
        Config {
            psk: Some(Arc::new(move |_hint: &[u8]| -> std::result::Result<Vec<u8>, webrtc::dtls::Error> {
                Ok(psk.clone())
            })),
            psk_identity_hint: Some(self.identity.clone()),
            cipher_suites: vec![CipherSuiteId::Tls_Psk_With_Aes_128_Gcm_Sha256],
            insecure_skip_verify: true,
            flight_interval: window.min,
            ..Default::default()
        }
    }
}

impl SecureTransport for DtlsTransport {
    type Socket = Arc<UdpSocket>;
    type Channel = DtlsChannel;

    async fn open(&self, addr: &str) -> Result<Self::Socket> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| Error::stream("bind", e))?;
        socket
            .connect(addr)
            .await
            .map_err(|e| Error::stream("connect", e))?;
        debug!("UDP socket connected to {addr}");
        Ok(Arc::new(socket))
    }

    async fn handshake(&self, socket: &Self::Socket, window: &HandshakeWindow) -> Result<Self::Channel> {
        let conn: Arc<dyn Conn + Send + Sync> = socket.clone();
        let handshake = DTLSConn::new(conn, self.config(window), true, None);

        match tokio::time::timeout(window.max, handshake).await {
            Ok(Ok(conn)) => Ok(DtlsChannel {
                conn,
                write_timeout: self.write_timeout,
            }),
            Ok(Err(e)) => Err(Error::stream("handshake", e)),
            Err(_) => Err(Error::stream("handshake", "timed out")),
        }
    }
}

/// An established DTLS session.
pub struct DtlsChannel {
    conn: DTLSConn,
    write_timeout: Duration,
}

impl SecureChannel for DtlsChannel {
    async fn send(&self, frame: &[u8]) -> std::result::Result<(), WriteError> {
        match self.conn.write(frame, Some(self.write_timeout)).await {
            Ok(_) => Ok(()),
            Err(webrtc::dtls::Error::ErrDeadlineExceeded) => Err(WriteError::Timeout),
            Err(webrtc::dtls::Error::ErrConnClosed) => Err(WriteError::PeerClosed),
            Err(e) => Err(WriteError::Other(e.to_string())),
        }
    }

    async fn close_notify(&self) {
        if let Err(e) = self.conn.close().await {
            debug!("close-notify failed: {e}");
        }
    }
}
