//! termchat - a multi-user chat service over a secure terminal transport.
//!
//! Every connecting user gets a full-screen boxed terminal UI (message log
//! above, single-line input below) shared live with all other users. The
//! server draws each user's screen itself and streams the rendering bytes
//! over TLS; clients only forward keystrokes and paint what they receive.
//!
//! Display-width math (CJK ideographs occupy two terminal columns) is
//! estimated from the advance widths of the TrueType fonts shipped next to
//! the service, not from a Unicode table — see [`font`] for the deliberate
//! approximations involved.

pub mod chat;
pub mod client;
pub mod config;
pub mod font;
pub mod input;
pub mod layout;
pub mod protocol;
pub mod render;
pub mod server;
pub mod session;
pub mod terminal;
pub mod tls;
