use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use siren_store::{Settings, TrackingState};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{UnixListener, UnixStream},
    sync::{broadcast, mpsc, oneshot},
};

/// Upper bound on a single frame; settings and state records are tiny.
const MAX_FRAME_BYTES: u32 = 1024 * 1024;

/// A user command relayed to the state machine.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum Command {
    Start { tab_url: Option<String> },
    Pause,
    Resume,
    Reset,
    StopAlarm,
    GetState,
    UpdateSettings(Settings),
}

/// A host event from the tab/window event source (the browser bridge).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum BrowserEvent {
    TabActivated { url: String },
    TabUpdated { url: String },
    FocusChanged { focused: bool },
}

/// Reply to a [`Command`].
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CommandResponse {
    pub success: bool,
    pub error: Option<String>,
    pub state: Option<TrackingState>,
}

impl CommandResponse {
    #[must_use]
    pub fn ok(state: TrackingState) -> Self {
        Self {
            success: true,
            error: None,
            state: Some(state),
        }
    }

    #[must_use]
    pub fn fail(error: impl Into<String>, state: TrackingState) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            state: Some(state),
        }
    }
}

/// IPC request from a client (CLI or browser bridge) to the daemon.
#[derive(Serialize, Deserialize, Debug)]
pub enum IpcRequest {
    Command(Command),
    Event(BrowserEvent),
    /// Keep the connection open and receive `StateUpdate` frames.
    Subscribe,
    Shutdown,
}

/// IPC response from the daemon.
#[derive(Serialize, Deserialize, Debug)]
pub enum IpcResponse {
    Command(CommandResponse),
    EventAck,
    StateUpdate(TrackingState),
    Shutdown,
}

/// A request forwarded from the IPC listener into the daemon loop, which
/// owns all state. Commands carry a reply channel; events and shutdown
/// are fire-and-forget.
#[derive(Debug)]
pub enum DaemonRequest {
    Command {
        command: Command,
        reply: oneshot::Sender<CommandResponse>,
    },
    Event(BrowserEvent),
    Shutdown,
}

/// Write one length-prefixed bincode frame.
///
/// # Errors
///
/// Returns an error if serialization or the socket write fails.
pub async fn write_frame<T, W>(writer: &mut W, message: &T) -> Result<()>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let encoded = bincode::serialize(message)?;
    #[allow(clippy::cast_possible_truncation)]
    let len = encoded.len() as u32;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed bincode frame. Returns `None` on clean EOF.
///
/// # Errors
///
/// Returns an error on a malformed frame or a socket read failure.
pub async fn read_frame<T, R>(reader: &mut R) -> Result<Option<T>>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_le_bytes(len_buf);
    anyhow::ensure!(len <= MAX_FRAME_BYTES, "frame too large: {len} bytes");

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(Some(bincode::deserialize(&buf)?))
}

/// Incremental frame decoder for long-lived connections.
///
/// [`read_frame`] holds partially read bytes inside its future, so
/// dropping it mid-frame (as `select!` does with the losing branch)
/// desynchronizes the stream. This reader instead keeps everything it
/// has pulled off the socket in its own buffer; each await point is a
/// single `read` call, which either completes or leaves the stream
/// untouched, so a cancelled `next_frame` loses nothing.
#[derive(Debug)]
struct FrameReader<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// Decode the next frame, reading more bytes as needed. Returns
    /// `None` on clean EOF; EOF inside a frame is an error.
    async fn next_frame<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        loop {
            if self.buf.len() >= 4 {
                let len =
                    u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
                anyhow::ensure!(len <= MAX_FRAME_BYTES, "frame too large: {len} bytes");
                let end = 4 + len as usize;
                if self.buf.len() >= end {
                    let frame = bincode::deserialize(&self.buf[4..end])?;
                    self.buf.drain(..end);
                    return Ok(Some(frame));
                }
            }
            let mut chunk = [0u8; 4096];
            let read = self.reader.read(&mut chunk).await?;
            if read == 0 {
                anyhow::ensure!(self.buf.is_empty(), "connection closed mid-frame");
                return Ok(None);
            }
            self.buf.extend_from_slice(&chunk[..read]);
        }
    }
}

/// Client side of the daemon socket.
#[derive(Debug)]
pub struct IpcClient {
    sock_path: PathBuf,
}

impl IpcClient {
    #[must_use]
    pub fn new(sock_path: &Path) -> Self {
        Self {
            sock_path: sock_path.to_path_buf(),
        }
    }

    async fn exchange(&self, request: IpcRequest) -> Result<IpcResponse> {
        let mut stream = UnixStream::connect(&self.sock_path).await?;
        write_frame(&mut stream, &request).await?;
        read_frame(&mut stream)
            .await?
            .ok_or_else(|| anyhow::anyhow!("daemon closed the connection without replying"))
    }

    /// Send a command and wait for its response.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon is unreachable or replies with an
    /// unexpected message kind.
    pub async fn send_command(&self, command: Command) -> Result<CommandResponse> {
        match self.exchange(IpcRequest::Command(command)).await? {
            IpcResponse::Command(response) => Ok(response),
            other => anyhow::bail!("unexpected response from daemon: {other:?}"),
        }
    }

    /// Deliver a browser event. Fire-and-forget beyond the transport ack.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon is unreachable.
    pub async fn send_event(&self, event: BrowserEvent) -> Result<()> {
        match self.exchange(IpcRequest::Event(event)).await? {
            IpcResponse::EventAck => Ok(()),
            other => anyhow::bail!("unexpected response from daemon: {other:?}"),
        }
    }

    /// Ask the daemon to shut down.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon is unreachable.
    pub async fn send_shutdown(&self) -> Result<()> {
        match self.exchange(IpcRequest::Shutdown).await? {
            IpcResponse::Shutdown => Ok(()),
            other => anyhow::bail!("unexpected response from daemon: {other:?}"),
        }
    }

    /// Open a subscription: the daemon pushes a `StateUpdate` frame on
    /// every state change until either side drops the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon is unreachable.
    pub async fn subscribe(&self) -> Result<Subscription> {
        let mut stream = UnixStream::connect(&self.sock_path).await?;
        write_frame(&mut stream, &IpcRequest::Subscribe).await?;
        Ok(Subscription {
            frames: FrameReader::new(stream),
        })
    }
}

/// An open push-notification connection. Reads are buffered, so racing
/// `next_update` inside `select!` (as `siren watch` does against its
/// poll timer) cannot desynchronize the stream.
#[derive(Debug)]
pub struct Subscription {
    frames: FrameReader<UnixStream>,
}

impl Subscription {
    /// Wait for the next state update. Returns `None` when the daemon
    /// goes away.
    ///
    /// # Errors
    ///
    /// Returns an error on a malformed frame.
    pub async fn next_update(&mut self) -> Result<Option<TrackingState>> {
        loop {
            match self.frames.next_frame::<IpcResponse>().await? {
                Some(IpcResponse::StateUpdate(state)) => return Ok(Some(state)),
                Some(_) => {} // Not ours; skip.
                None => return Ok(None),
            }
        }
    }
}

/// Accept loop for the daemon socket. Commands and events are forwarded
/// into the daemon loop over `requests`; subscribe connections are fed
/// from the `updates` broadcast channel, best-effort -- a failed write or
/// a lagged receiver just drops that subscriber.
///
/// # Errors
///
/// Returns an error if the socket cannot be bound.
pub async fn listen(
    sock_path: &Path,
    requests: mpsc::Sender<DaemonRequest>,
    updates: broadcast::Sender<TrackingState>,
) -> io::Result<()> {
    if sock_path.exists() {
        fs::remove_file(sock_path)?;
    }
    let listener = UnixListener::bind(sock_path)?;

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let requests = requests.clone();
                let updates = updates.subscribe();
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(stream, requests, updates).await {
                        log::debug!("IPC connection ended: {e}");
                    }
                });
            }
            Err(e) => {
                log::error!("IPC accept error: {e}");
            }
        }
    }
}

async fn serve_connection(
    mut stream: UnixStream,
    requests: mpsc::Sender<DaemonRequest>,
    mut updates: broadcast::Receiver<TrackingState>,
) -> Result<()> {
    let Some(request) = read_frame::<IpcRequest, _>(&mut stream).await? else {
        return Ok(());
    };

    match request {
        IpcRequest::Command(command) => {
            let (reply_tx, reply_rx) = oneshot::channel();
            requests
                .send(DaemonRequest::Command {
                    command,
                    reply: reply_tx,
                })
                .await?;
            let response = reply_rx.await?;
            write_frame(&mut stream, &IpcResponse::Command(response)).await?;
        }
        IpcRequest::Event(event) => {
            requests.send(DaemonRequest::Event(event)).await?;
            write_frame(&mut stream, &IpcResponse::EventAck).await?;
        }
        IpcRequest::Subscribe => loop {
            match updates.recv().await {
                Ok(state) => {
                    if write_frame(&mut stream, &IpcResponse::StateUpdate(state))
                        .await
                        .is_err()
                    {
                        break; // Subscriber went away.
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    log::debug!("Subscriber lagged, skipped {missed} updates");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        },
        IpcRequest::Shutdown => {
            requests.send(DaemonRequest::Shutdown).await?;
            write_frame(&mut stream, &IpcResponse::Shutdown).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn frames_round_trip_over_a_duplex_pipe() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let request = IpcRequest::Command(Command::Start {
            tab_url: Some("https://netflix.com".to_string()),
        });
        write_frame(&mut a, &request).await.unwrap();

        let decoded: IpcRequest = read_frame(&mut b).await.unwrap().unwrap();
        match decoded {
            IpcRequest::Command(Command::Start { tab_url }) => {
                assert_eq!(tab_url.as_deref(), Some("https://netflix.com"));
            }
            other => panic!("wrong frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn clean_eof_reads_as_none() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);
        let decoded: Option<IpcResponse> = read_frame(&mut b).await.unwrap();
        assert!(decoded.is_none());
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&(MAX_FRAME_BYTES + 1).to_le_bytes())
            .await
            .unwrap();
        let result: Result<Option<IpcResponse>> = read_frame(&mut b).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn subscription_read_survives_cancellation_mid_frame() {
        let (mut a, b) = tokio::io::duplex(4096);
        let mut frames = FrameReader::new(b);

        // Deliver only the length prefix, then drop the in-flight read
        // the way a select! race does.
        let encoded = bincode::serialize(&IpcResponse::EventAck).unwrap();
        #[allow(clippy::cast_possible_truncation)]
        let len = encoded.len() as u32;
        a.write_all(&len.to_le_bytes()).await.unwrap();
        tokio::select! {
            biased;
            frame = frames.next_frame::<IpcResponse>() => {
                panic!("incomplete frame decoded: {frame:?}")
            }
            () = tokio::task::yield_now() => {}
        }

        // The body arrives, followed by a complete second frame. Both
        // must still decode; losing the prefix would misread the body
        // bytes as a length.
        a.write_all(&encoded).await.unwrap();
        let mut state = TrackingState::idle();
        state.elapsed_seconds = 7;
        write_frame(&mut a, &IpcResponse::StateUpdate(state))
            .await
            .unwrap();

        let first: IpcResponse = frames.next_frame().await.unwrap().unwrap();
        assert!(matches!(first, IpcResponse::EventAck));
        match frames.next_frame::<IpcResponse>().await.unwrap().unwrap() {
            IpcResponse::StateUpdate(state) => assert_eq!(state.elapsed_seconds, 7),
            other => panic!("wrong frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn eof_inside_a_frame_is_an_error() {
        let (mut a, b) = tokio::io::duplex(64);
        let mut frames = FrameReader::new(b);
        a.write_all(&8u32.to_le_bytes()).await.unwrap();
        a.write_all(&[1, 2, 3]).await.unwrap();
        drop(a);
        let result = frames.next_frame::<IpcResponse>().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn subscribe_pushes_updates_until_the_client_drops() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("siren.sock");
        let (requests, _requests_rx) = mpsc::channel(8);
        let (updates, _) = broadcast::channel::<TrackingState>(8);

        let server_sock = sock.clone();
        let server_updates = updates.clone();
        tokio::spawn(async move {
            let _ = listen(&server_sock, requests, server_updates).await;
        });

        // The bind happens in the spawned task; retry until it is up.
        let client = IpcClient::new(&sock);
        let mut subscription = loop {
            match client.subscribe().await {
                Ok(subscription) => break subscription,
                Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        };

        let mut state = TrackingState::idle();
        state.elapsed_seconds = 42;
        // The accept side only joins the broadcast channel once the
        // connection is served; resend until the frame comes through.
        let received = loop {
            let _ = updates.send(state.clone());
            tokio::select! {
                update = subscription.next_update() => break update.unwrap().unwrap(),
                () = tokio::time::sleep(Duration::from_millis(20)) => {}
            }
        };
        assert_eq!(received.elapsed_seconds, 42);

        // Dropping the client makes the next push fail; the server then
        // drops its subscriber and releases the broadcast receiver.
        drop(subscription);
        let mut tries = 0;
        while updates.receiver_count() > 0 {
            let _ = updates.send(state.clone());
            tokio::time::sleep(Duration::from_millis(10)).await;
            tries += 1;
            assert!(tries < 200, "server never dropped the subscriber");
        }
    }
}
