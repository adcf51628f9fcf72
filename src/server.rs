//! TLS accept loop and the per-connection session driver.
//!
//! Each accepted connection runs in its own task and owns its session
//! exclusively. The handshake is strict — `Auth`, then `OpenShell` — and
//! anything that fails before registration leaves no trace in the room
//! (no ghost leave notices). After registration the driver `select!`s
//! over inbound frames and the session's own peer-event queue; it is the
//! only writer to this connection's transport.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

use crate::chat::{ChatError, ChatRoom, PeerEvent};
use crate::font::FontCatalog;
use crate::input::validate_username;
use crate::protocol::{AuthMsg, AuthOkMsg, ErrorMsg, Frame, FrameType, OpenShellMsg, ResizeMsg};
use crate::render::BELL;
use crate::session::{Action, Geometry, Session};

/// How long a connection may idle before completing each handshake step.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared server context handed to every connection task.
#[derive(Clone)]
pub struct ServerContext {
    pub room: ChatRoom,
    pub fonts: Arc<FontCatalog>,
    pub identity: String,
}

/// Accept connections until `cancel` fires.
///
/// TLS handshakes and session driving happen in per-connection tasks;
/// accept errors log and back off instead of killing the listener.
pub async fn serve(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    ctx: ServerContext,
    cancel: CancellationToken,
) -> io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "listening");
    }
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("accept loop received cancel signal");
                break;
            }
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        let acceptor = acceptor.clone();
                        let ctx = ctx.clone();
                        tokio::spawn(async move {
                            match acceptor.accept(stream).await {
                                Ok(tls) => {
                                    if let Err(e) = handle_client(tls, ctx).await {
                                        tracing::debug!(%addr, ?e, "connection ended");
                                    }
                                }
                                Err(e) => {
                                    tracing::debug!(%addr, ?e, "TLS handshake failed");
                                }
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(?e, "failed to accept connection");
                        // Backoff to prevent a tight loop under sustained
                        // accept errors (fd exhaustion and the like).
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Drive one connection from handshake to close.
///
/// Generic over the stream so tests can drive it with an in-memory
/// duplex pipe instead of TLS.
pub async fn handle_client<S: AsyncRead + AsyncWrite + Unpin + Send + 'static>(
    mut stream: S,
    ctx: ServerContext,
) -> io::Result<()> {
    // ── Authentication ─────────────────────────────────────────────
    let frame = read_handshake_frame(&mut stream).await?;
    if frame.frame_type != FrameType::Auth {
        reject(&mut stream, "bad_handshake", "expected Auth frame").await?;
        return Err(io::Error::new(io::ErrorKind::InvalidData, "expected Auth"));
    }
    let auth: AuthMsg = frame
        .parse_json()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let username = auth.username;

    if let Err(reason) = validate_username(&username) {
        tracing::info!(%username, %reason, "rejected authentication");
        return reject(&mut stream, "invalid_username", &reason).await;
    }
    // Advisory pre-check; the authoritative uniqueness check is the
    // `join` below, under the room lock. Losing the race costs one error
    // frame after the shell request, nothing more.
    if let Err(err) = ctx.room.available(&username) {
        tracing::info!(%username, %err, "rejected authentication");
        return reject(&mut stream, chat_error_code(&err), &err.to_string()).await;
    }

    let ok = AuthOkMsg {
        username: username.clone(),
        server: ctx.identity.clone(),
    };
    Frame::control(FrameType::AuthOk, &ok)
        .map_err(io::Error::other)?
        .write_to(&mut stream)
        .await?;

    // ── Shell + pseudo-terminal geometry ───────────────────────────
    let frame = read_handshake_frame(&mut stream).await?;
    if frame.frame_type != FrameType::OpenShell {
        reject(&mut stream, "bad_handshake", "expected OpenShell frame").await?;
        return Err(io::Error::new(io::ErrorKind::InvalidData, "expected OpenShell"));
    }
    let open: OpenShellMsg = frame
        .parse_json()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let geometry = Geometry::clamped(open.rows, open.cols);

    // ── Registration (authoritative) ───────────────────────────────
    let (events_tx, events_rx) = ChatRoom::event_queue();
    if let Err(err) = ctx.room.join(&username, events_tx) {
        tracing::info!(%username, %err, "rejected at registration");
        return reject(&mut stream, chat_error_code(&err), &err.to_string()).await;
    }

    let mut session = Session::new(
        username.clone(),
        geometry,
        ctx.room.clone(),
        ctx.fonts.clone(),
        ctx.identity.clone(),
    );

    let result = drive_session(stream, &mut session, events_rx).await;

    // The session was registered, so the close path — and only the close
    // path — emits the leave notice, for every way the session can end.
    ctx.room.leave(&username);
    result
}

/// Read one handshake frame, bounded by [`HANDSHAKE_TIMEOUT`].
async fn read_handshake_frame<S: AsyncRead + Unpin>(stream: &mut S) -> io::Result<Frame> {
    timeout(HANDSHAKE_TIMEOUT, Frame::read_from(stream))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "handshake timeout"))?
}

/// Send a typed rejection frame. The connection closes right after.
async fn reject<S: AsyncWrite + Unpin>(stream: &mut S, code: &str, message: &str) -> io::Result<()> {
    let msg = ErrorMsg {
        code: code.to_string(),
        message: message.to_string(),
    };
    Frame::control(FrameType::Error, &msg)
        .map_err(io::Error::other)?
        .write_to(stream)
        .await
}

fn chat_error_code(err: &ChatError) -> &'static str {
    match err {
        ChatError::NameTaken(_) => "username_taken",
        ChatError::AtCapacity(_) => "at_capacity",
    }
}

/// The steady state: pump frames and peer events until the connection
/// ends or the user quits.
///
/// Frames are not read inline in the `select!` — a cancelled mid-frame
/// read would desync the protocol. Instead a reader task forwards whole
/// frames into a queue, so the session task drains exactly two queues
/// (transport frames, peer events) and owns every write to its transport.
async fn drive_session<S: AsyncRead + AsyncWrite + Unpin + Send + 'static>(
    stream: S,
    session: &mut Session,
    events: mpsc::Receiver<PeerEvent>,
) -> io::Result<()> {
    let (mut reader, mut writer) = tokio::io::split(stream);

    let (frame_tx, frames) = mpsc::channel::<io::Result<Frame>>(16);
    let reader_task = tokio::spawn(async move {
        loop {
            let frame = Frame::read_from(&mut reader).await;
            let failed = frame.is_err();
            if frame_tx.send(frame).await.is_err() || failed {
                break;
            }
        }
    });

    let result = pump(session, &mut writer, frames, events).await;
    reader_task.abort();
    result
}

async fn pump<W: AsyncWrite + Unpin>(
    session: &mut Session,
    writer: &mut W,
    mut frames: mpsc::Receiver<io::Result<Frame>>,
    mut events: mpsc::Receiver<PeerEvent>,
) -> io::Result<()> {
    // Initial full paint. The join broadcast also queued a redraw for
    // this session; painting again is harmless.
    let mut out = BytesMut::new();
    session.redraw(&mut out);
    write_output(writer, out.freeze()).await?;

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    // Close and error are treated identically: stop
                    // delivering events, let the caller unregister.
                    Some(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                    Some(Err(e)) => return Err(e),
                    None => return Ok(()),
                };
                match frame.frame_type {
                    FrameType::Input => {
                        let mut out = BytesMut::new();
                        let action = session.handle_input(&frame.payload, &mut out);
                        if action == Action::Quit {
                            return Ok(());
                        }
                        write_output(writer, out.freeze()).await?;
                    }
                    FrameType::Resize => match frame.parse_json::<ResizeMsg>() {
                        Ok(resize) => {
                            let mut out = BytesMut::new();
                            session.handle_resize(resize.rows, resize.cols, &mut out);
                            write_output(writer, out.freeze()).await?;
                        }
                        Err(e) => {
                            tracing::debug!(?e, "ignoring malformed resize frame");
                        }
                    },
                    other => {
                        tracing::debug!(?other, "ignoring unexpected frame");
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Some(PeerEvent::Redraw) => {
                        let mut out = BytesMut::new();
                        session.redraw(&mut out);
                        write_output(writer, out.freeze()).await?;
                    }
                    Some(PeerEvent::Notify) => {
                        write_output(writer, Bytes::from_static(&[BELL])).await?;
                    }
                    None => return Ok(()),
                }
            }
        }
    }
}

async fn write_output<W: AsyncWrite + Unpin>(writer: &mut W, data: Bytes) -> io::Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    Frame::data(FrameType::Output, data).write_to(writer).await
}
