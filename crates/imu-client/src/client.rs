//! TCP session manager for the IMU sensor (§4.2).
//!
//! One [`ImuClient`] is a singleton relative to the orchestrator: `connect`
//! and `disconnect` are mutually exclusive over an internal session mutex,
//! and the receive loop that decodes the wire protocol runs as a detached
//! task per connected session.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use imu_protocol::{
    decode_message, encode_set_state, FrameHeader, IncomingMessage, HEADER_LEN,
};
use notification_hub::Hub;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ImuClientError;

struct Session {
    write_half: Arc<AsyncMutex<OwnedWriteHalf>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns a single TCP connection to an IMU endpoint, translating its framed
/// binary protocol into [`Hub`] events and issuing re-arm requests.
pub struct ImuClient {
    hub: Arc<Hub>,
    root_cancel: CancellationToken,
    session: AsyncMutex<Option<Session>>,
    connected: AtomicBool,
}

impl ImuClient {
    /// `root_cancel` is the orchestrator's root cancellation scope (§5,
    /// §9); the receive loop's token is a child of it so an orchestrator
    /// `stop()` tears down an in-flight session even if `disconnect` is
    /// never called explicitly.
    pub fn new(hub: Arc<Hub>, root_cancel: CancellationToken) -> Self {
        Self {
            hub,
            root_cancel,
            session: AsyncMutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    /// Atomic observable accessor (§4.2).
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Connect to `address:port`. Tears down any prior session first (§4.2
    /// "connect must be callable while a prior session is still winding
    /// down"). On success, publishes `ImuConnected` and spawns the receive
    /// loop. On failure, logs and leaves the client disconnected — no event
    /// is published.
    pub async fn connect(self: &Arc<Self>, address: &str, port: u16) -> Result<(), ImuClientError> {
        self.disconnect().await;

        let stream = TcpStream::connect((address, port))
            .await
            .map_err(|source| ImuClientError::Connect {
                address: address.to_string(),
                port,
                source,
            })?;
        let remote: Option<SocketAddr> = stream.peer_addr().ok();
        let (read_half, write_half) = stream.into_split();
        let write_half = Arc::new(AsyncMutex::new(write_half));
        let cancel = self.root_cancel.child_token();

        let task = tokio::spawn(receive_loop(
            Arc::clone(self),
            read_half,
            Arc::clone(&write_half),
            cancel.clone(),
        ));

        *self.session.lock().await = Some(Session {
            write_half,
            cancel,
            task,
        });
        self.connected.store(true, Ordering::SeqCst);

        let remote_endpoint = remote
            .map(|a| a.to_string())
            .unwrap_or_else(|| format!("{address}:{port}"));
        info!(%remote_endpoint, "connected to IMU");
        self.hub.notify_imu_connected(Some(remote_endpoint));
        Ok(())
    }

    /// Idempotent: a no-op if already disconnected. Cancels the receive
    /// loop, closes the socket, publishes `ImuDisconnected`, and clears
    /// internal state.
    pub async fn disconnect(&self) {
        let taken = self.session.lock().await.take();
        if let Some(session) = taken {
            session.cancel.cancel();
            self.connected.store(false, Ordering::SeqCst);
            self.hub.notify_imu_disconnected();
            // The loop observes cancellation on its own and will find no
            // session left to tear down a second time when it wakes up.
            let _ = session.task.await;
        }
    }

    /// Send a `SET_IMU_STATE` re-arm frame over the active session, if any.
    /// Used by the receive loop; guarded by the same write mutex the loop
    /// itself holds, so concurrent re-arms never interleave on the wire.
    async fn send_set_state(write_half: &AsyncMutex<OwnedWriteHalf>, on: bool) -> std::io::Result<()> {
        let frame = encode_set_state(on);
        write_half.lock().await.write_all(&frame).await
    }

    /// Called by the receive loop when it terminates on its own (EOF,
    /// protocol violation, or I/O error) rather than via an explicit
    /// `disconnect()`. Takes the session if it is still the current one
    /// and performs the same teardown `disconnect()` would — exactly once,
    /// since only one caller ever observes `Some` from the take.
    async fn teardown_from_loop(&self) {
        let taken = self.session.lock().await.take();
        if taken.is_some() {
            self.connected.store(false, Ordering::SeqCst);
            self.hub.notify_imu_disconnected();
        }
    }
}

async fn read_header(read_half: &mut OwnedReadHalf) -> Result<FrameHeader, imu_protocol::ProtocolError> {
    let mut buf = [0u8; HEADER_LEN];
    read_half.read_exact(&mut buf).await?;
    FrameHeader::decode(buf)
}

/// Receive loop (§4.2 steps 1-5): block-read a frame, dispatch by message
/// id, repeat until cancellation, EOF, or a protocol/I/O error.
async fn receive_loop(
    client: Arc<ImuClient>,
    mut read_half: OwnedReadHalf,
    write_half: Arc<AsyncMutex<OwnedWriteHalf>>,
    cancel: CancellationToken,
) {
    loop {
        let header = tokio::select! {
            _ = cancel.cancelled() => break,
            result = read_header(&mut read_half) => result,
        };

        let header = match header {
            Ok(header) => header,
            Err(err) => {
                debug!(%err, "IMU receive loop terminating on header read");
                break;
            }
        };

        let mut payload = vec![0u8; header.payload_length as usize];
        if let Err(err) = read_half.read_exact(&mut payload).await {
            debug!(%err, "IMU receive loop terminating on payload read");
            break;
        }

        match decode_message(header.message_id, &payload) {
            Ok(IncomingMessage::State { is_on }) => {
                client.hub.notify_imu_state(is_on);
                if !is_on {
                    if let Err(err) = ImuClient::send_set_state(&write_half, true).await {
                        warn!(%err, "failed to send re-arm frame");
                        break;
                    }
                }
            }
            Ok(IncomingMessage::Sample(sample)) => {
                client.hub.notify_imu_sample(sample);
            }
            Ok(IncomingMessage::Unknown { message_id }) => {
                debug!(message_id, "ignoring unrecognized IMU message id");
            }
            Err(err) => {
                warn!(%err, "IMU protocol violation, terminating session");
                break;
            }
        }
    }

    client.teardown_from_loop().await;
}
