//! Thin native client: a raw-mode terminal bridged onto the wire protocol.
//!
//! The client does no rendering of its own. It forwards stdin bytes to
//! the server as `Input` frames, paints whatever `Output` frames come
//! back, and translates SIGWINCH into `Resize` frames. The server owns
//! the screen.

use std::io::Write as _;
use std::path::PathBuf;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::protocol::{AuthMsg, ErrorMsg, Frame, FrameType, OpenShellMsg, ResizeMsg};
use crate::terminal::{self, RawModeGuard};
use crate::tls;

pub struct ConnectOptions {
    /// Server address, `host:port`.
    pub addr: String,
    pub username: String,
    /// PEM bundle to trust for the server's certificate.
    pub ca: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid address (expected host:port): {0}")]
    BadAddr(String),
    #[error(transparent)]
    Tls(#[from] tls::TlsError),
    #[error("server rejected connection: {0}")]
    Rejected(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Connect, handshake, and bridge the local terminal until the server
/// closes the connection (e.g. after `/quit`) or stdin ends.
pub async fn run(opts: ConnectOptions) -> Result<(), ClientError> {
    let (host, _) = opts
        .addr
        .rsplit_once(':')
        .ok_or_else(|| ClientError::BadAddr(opts.addr.clone()))?;

    let connector = tls::client_connector(&opts.ca)?;
    let tcp = TcpStream::connect(&opts.addr).await?;
    let mut stream = connector.connect(tls::server_name(host)?, tcp).await?;

    // ── Handshake ──────────────────────────────────────────────────
    let auth = AuthMsg {
        username: opts.username.clone(),
    };
    Frame::control(FrameType::Auth, &auth)
        .map_err(std::io::Error::other)?
        .write_to(&mut stream)
        .await?;

    let reply = Frame::read_from(&mut stream).await?;
    match reply.frame_type {
        FrameType::AuthOk => {}
        FrameType::Error => {
            let msg: ErrorMsg = reply
                .parse_json()
                .map_err(|e| ClientError::Protocol(e.to_string()))?;
            return Err(ClientError::Rejected(msg.message));
        }
        other => {
            return Err(ClientError::Protocol(format!(
                "unexpected handshake reply: {other:?}"
            )));
        }
    }

    let (rows, cols) = terminal::terminal_size().unwrap_or((24, 80));
    Frame::control(FrameType::OpenShell, &OpenShellMsg { rows, cols })
        .map_err(std::io::Error::other)?
        .write_to(&mut stream)
        .await?;

    // Raw mode only once the server said yes, so rejections print
    // normally. Restored on drop, even if the bridge errors.
    let raw_guard = RawModeGuard::new()?;
    let result = bridge(stream).await;
    drop(raw_guard);

    println!("\ntermchat: disconnected");
    result
}

/// Pump stdin → Input frames and Output frames → stdout.
async fn bridge<S>(stream: S) -> Result<(), ClientError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    // Server → stdout. Only this task touches stdout.
    let mut output_task = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        loop {
            match Frame::read_from(&mut reader).await {
                Ok(frame) if frame.frame_type == FrameType::Output => {
                    if stdout.write_all(&frame.payload).is_err() {
                        break;
                    }
                    let _ = stdout.flush();
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });

    // stdin → channel. The blocking read lives in its own task.
    let (input_tx, mut input_rx) = mpsc::channel::<Bytes>(16);
    let stdin_task = tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let mut buf = [0u8; 1024];
        loop {
            match stdin.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if input_tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut winch = Winch::new()?;

    let result = loop {
        tokio::select! {
            _ = &mut output_task => break Ok(()),
            data = input_rx.recv() => {
                match data {
                    Some(bytes) => {
                        let frame = Frame::data(FrameType::Input, bytes);
                        if let Err(e) = frame.write_to(&mut writer).await {
                            break Err(e.into());
                        }
                    }
                    None => break Ok(()),
                }
            }
            _ = winch.changed() => {
                let (rows, cols) = terminal::terminal_size().unwrap_or((24, 80));
                match Frame::control(FrameType::Resize, &ResizeMsg { rows, cols }) {
                    Ok(frame) => {
                        if let Err(e) = frame.write_to(&mut writer).await {
                            break Err(e.into());
                        }
                    }
                    Err(e) => break Err(ClientError::Protocol(e.to_string())),
                }
            }
        }
    };

    output_task.abort();
    stdin_task.abort();
    result
}

/// SIGWINCH as an awaitable, pending forever where the signal does not
/// exist.
#[cfg(unix)]
struct Winch(tokio::signal::unix::Signal);

#[cfg(unix)]
impl Winch {
    fn new() -> std::io::Result<Self> {
        Ok(Self(tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::window_change(),
        )?))
    }

    async fn changed(&mut self) {
        self.0.recv().await;
    }
}

#[cfg(not(unix))]
struct Winch;

#[cfg(not(unix))]
impl Winch {
    fn new() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn changed(&mut self) {
        std::future::pending::<()>().await
    }
}
