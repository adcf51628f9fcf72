//! termchat - multi-user chat over a secure terminal transport.
//!
//! ## Modes
//!
//! **Server mode** (`termchat server`): loads the host credential and the
//! font directory, then accepts TLS connections and drives one chat
//! session per connection until Ctrl+C.
//!
//! **Connect mode** (`termchat connect`): thin client — raw local
//! terminal bridged onto the wire protocol; all rendering comes from the
//! server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use termchat::{
    chat::ChatRoom,
    client,
    config::{ServerSettings, ServiceConfig},
    font::FontCatalog,
    server::{self, ServerContext},
    tls,
};

/// termchat - multi-user chat over a secure terminal transport.
#[derive(Parser, Debug)]
#[command(name = "termchat", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the chat server.
    Server {
        /// Address to listen on
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// PEM certificate chain (host credential)
        #[arg(long)]
        cert: Option<PathBuf>,

        /// PEM private key (host credential)
        #[arg(long)]
        key: Option<PathBuf>,

        /// Directory of *.ttf fonts for width estimation
        #[arg(long)]
        fonts: Option<PathBuf>,

        /// Optional TOML config file; CLI flags override it
        #[arg(long, env = "TERMCHAT_CONFIG")]
        config: Option<PathBuf>,

        /// Maximum concurrent sessions
        #[arg(long)]
        max_sessions: Option<usize>,

        /// Service identity shown in every status line
        #[arg(long)]
        identity: Option<String>,
    },

    /// Connect to a chat server as a thin terminal client.
    Connect {
        /// Server address, host:port
        addr: String,

        /// Username to authenticate as
        #[arg(long, short = 'u', env = "TERMCHAT_USER")]
        user: String,

        /// PEM bundle to trust for the server certificate
        #[arg(long)]
        ca: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Server {
            bind,
            cert,
            key,
            fonts,
            config,
            max_sessions,
            identity,
        } => {
            let file = match config {
                Some(path) => ServiceConfig::load(&path)?,
                None => None,
            };
            let settings =
                ServerSettings::resolve(file, bind, cert, key, fonts, max_sessions, identity)?;
            run_server(settings).await
        }
        Commands::Connect { addr, user, ca } => {
            let opts = client::ConnectOptions {
                addr,
                username: user,
                ca,
            };
            client::run(opts).await.map_err(Into::into)
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "termchat=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run_server(settings: ServerSettings) -> anyhow::Result<()> {
    tracing::info!(identity = %settings.identity, "termchat server starting");

    // Fonts load before the first connection is accepted; the catalog is
    // immutable and shared read-only from here on.
    let fonts = Arc::new(
        FontCatalog::load_dir(&settings.fonts)
            .with_context(|| format!("loading fonts from {}", settings.fonts.display()))?,
    );
    tracing::info!(fonts = fonts.len(), "font catalog ready");

    let acceptor = tls::load_host_credential(&settings.cert, &settings.key)
        .context("loading host credential")?;

    let listener = tokio::net::TcpListener::bind(settings.bind)
        .await
        .with_context(|| format!("binding {}", settings.bind))?;

    let room = match settings.max_sessions {
        Some(n) => ChatRoom::with_max_sessions(Some(n)),
        None => ChatRoom::new(),
    };
    let ctx = ServerContext {
        room,
        fonts,
        identity: settings.identity.clone(),
    };

    let cancel = tokio_util::sync::CancellationToken::new();
    let serve_cancel = cancel.clone();
    let serve_handle =
        tokio::spawn(async move { server::serve(listener, acceptor, ctx, serve_cancel).await });

    tokio::signal::ctrl_c().await.context("waiting for Ctrl+C")?;
    tracing::info!("received Ctrl+C");
    cancel.cancel();

    if let Err(e) = serve_handle.await {
        tracing::warn!(?e, "accept loop task panicked");
    }

    tracing::info!("termchat server exiting");
    Ok(())
}
