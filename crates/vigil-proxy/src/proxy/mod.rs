//! The forwarding path: request capture, redirection rewrite, upstream
//! dispatch with cookie capture, and the pipeline root.

pub mod client;
pub mod context;
pub mod handler;
pub mod rewrite;
pub mod server;
pub mod tls;
pub mod transport;

pub use handler::ProxyService;
pub use server::ProxyServer;
