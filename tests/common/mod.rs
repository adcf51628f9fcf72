#![allow(dead_code)]

//! Shared fixtures for the integration suites: a synthetic sfnt font
//! builder (the font equivalent of generating TLS certs with rcgen at
//! test time), handshake helpers, and a TLS test server.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use termchat::chat::ChatRoom;
use termchat::font::FontCatalog;
use termchat::protocol::{AuthMsg, Frame, FrameType, OpenShellMsg};
use termchat::server::{self, ServerContext};

// ── Synthetic fonts ────────────────────────────────────────────────

/// Size of one glyph summary record in glyf.
const GLYF_RECORD_SIZE: usize = 10;

/// Enough glyph slots to cover the BMP ideographs used in tests.
pub const FULL_COVERAGE_GLYPHS: usize = 0x10000;

/// Build a minimal sfnt binary with the four tables the parser consumes.
///
/// The cmap's platform-0/encoding-3 record stores `gid_base` as its raw
/// subtable offset, which the parser adds to each code point — so code
/// point `c` resolves to `advances[gid_base + c]`.
pub fn build_font(gid_base: u32, units_per_em: u16, advances: &[u16]) -> Vec<u8> {
    let num_tables: u16 = 4;
    let dir_len = 12 + usize::from(num_tables) * 16;

    let mut cmap = Vec::new();
    cmap.extend_from_slice(&0u16.to_be_bytes()); // version
    cmap.extend_from_slice(&1u16.to_be_bytes()); // one encoding record
    cmap.extend_from_slice(&0u16.to_be_bytes()); // platform 0
    cmap.extend_from_slice(&3u16.to_be_bytes()); // encoding 3
    cmap.extend_from_slice(&gid_base.to_be_bytes());

    let mut head = vec![0u8; 18]; // version..flags
    head.extend_from_slice(&units_per_em.to_be_bytes());

    let glyf = vec![0u8; advances.len() * GLYF_RECORD_SIZE];

    let mut hmtx = Vec::with_capacity(advances.len() * 4);
    for advance in advances {
        hmtx.extend_from_slice(&advance.to_be_bytes());
        hmtx.extend_from_slice(&0i16.to_be_bytes());
    }

    let mut out = Vec::new();
    out.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    out.extend_from_slice(&num_tables.to_be_bytes());
    out.extend_from_slice(&[0u8; 6]);

    let mut offset = dir_len;
    for (tag, body) in [
        (b"cmap", &cmap),
        (b"head", &head),
        (b"glyf", &glyf),
        (b"hmtx", &hmtx),
    ] {
        out.extend_from_slice(tag);
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&(offset as u32).to_be_bytes());
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        offset += body.len();
    }
    for body in [&cmap, &head, &glyf, &hmtx] {
        out.extend_from_slice(body);
    }
    out
}

/// Font where every covered glyph has the same advance width.
pub fn uniform_font(units_per_em: u16, advance: u16, glyph_count: usize) -> Vec<u8> {
    build_font(0, units_per_em, &vec![advance; glyph_count])
}

/// Write font files into a fresh temp dir and load them as a catalog.
pub fn catalog_from(fonts: &[(&str, Vec<u8>)]) -> (tempfile::TempDir, FontCatalog) {
    let dir = tempfile::tempdir().expect("tempdir");
    write_fonts(dir.path(), fonts);
    let catalog = FontCatalog::load_dir(dir.path()).expect("load fonts");
    (dir, catalog)
}

pub fn write_fonts(dir: &Path, fonts: &[(&str, Vec<u8>)]) {
    for (name, data) in fonts {
        std::fs::write(dir.join(name), data).expect("write font");
    }
}

/// A catalog where every BMP character below [`FULL_COVERAGE_GLYPHS`] is
/// two columns wide (advance == unitsPerEm) and ASCII is one.
pub fn wide_catalog() -> (tempfile::TempDir, FontCatalog) {
    catalog_from(&[("cjk.ttf", uniform_font(1000, 1000, FULL_COVERAGE_GLYPHS))])
}

// ── Handshake helpers ──────────────────────────────────────────────

pub async fn send_auth<S: AsyncWrite + Unpin>(stream: &mut S, username: &str) {
    Frame::control(
        FrameType::Auth,
        &AuthMsg {
            username: username.to_string(),
        },
    )
    .unwrap()
    .write_to(stream)
    .await
    .expect("send auth");
}

pub async fn send_open_shell<S: AsyncWrite + Unpin>(stream: &mut S, rows: u16, cols: u16) {
    Frame::control(FrameType::OpenShell, &OpenShellMsg { rows, cols })
        .unwrap()
        .write_to(stream)
        .await
        .expect("send open shell");
}

pub async fn send_input<S: AsyncWrite + Unpin>(stream: &mut S, data: &[u8]) {
    Frame::data(FrameType::Input, bytes::Bytes::copy_from_slice(data))
        .write_to(stream)
        .await
        .expect("send input");
}

/// Accumulated server output for one client.
#[derive(Default)]
pub struct Collected {
    pub raw: Vec<u8>,
}

impl Collected {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.raw).into_owned()
    }

    pub fn bell_count(&self) -> usize {
        self.raw.iter().filter(|&&b| b == 0x07).count()
    }
}

/// Read Output frames (accumulating payloads) until `pred` passes on the
/// text so far. Panics after five seconds of silence.
pub async fn read_output_until<S, F>(stream: &mut S, collected: &mut Collected, pred: F)
where
    S: AsyncRead + Unpin,
    F: Fn(&str) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !pred(&collected.text()) {
        let frame = tokio::time::timeout_at(deadline, Frame::read_from(stream))
            .await
            .expect("timed out waiting for output")
            .expect("read output frame");
        if frame.frame_type == FrameType::Output {
            collected.raw.extend_from_slice(&frame.payload);
        }
    }
}

// ── Servers ────────────────────────────────────────────────────────

pub fn test_context(fonts: FontCatalog) -> ServerContext {
    ServerContext {
        room: ChatRoom::new(),
        fonts: Arc::new(fonts),
        identity: "termchat@test".to_string(),
    }
}

/// A live TLS server on an ephemeral port, torn down on drop.
pub struct TlsTestServer {
    pub addr: std::net::SocketAddr,
    pub ca_path: PathBuf,
    pub ctx: ServerContext,
    cancel: CancellationToken,
    _dir: tempfile::TempDir,
}

impl Drop for TlsTestServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub async fn start_tls_server(fonts: FontCatalog) -> TlsTestServer {
    let dir = tempfile::tempdir().expect("tempdir");
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert_path = dir.path().join("cert.pem");
    let key_path = dir.path().join("key.pem");
    std::fs::write(&cert_path, cert.cert.pem()).unwrap();
    std::fs::write(&key_path, cert.key_pair.serialize_pem()).unwrap();

    let acceptor = termchat::tls::load_host_credential(&cert_path, &key_path).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let ctx = test_context(fonts);
    let cancel = CancellationToken::new();
    let serve_ctx = ctx.clone();
    let serve_cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = server::serve(listener, acceptor, serve_ctx, serve_cancel).await;
    });

    TlsTestServer {
        addr,
        ca_path: cert_path,
        ctx,
        cancel,
        _dir: dir,
    }
}

/// Open a TLS client connection to a [`TlsTestServer`].
pub async fn tls_connect(
    server: &TlsTestServer,
) -> tokio_rustls::client::TlsStream<tokio::net::TcpStream> {
    let connector = termchat::tls::client_connector(&server.ca_path).unwrap();
    let tcp = tokio::net::TcpStream::connect(server.addr).await.unwrap();
    connector
        .connect(termchat::tls::server_name("localhost").unwrap(), tcp)
        .await
        .expect("TLS connect")
}
