//! The ACP Dispatcher: a fixed tool surface over newline-delimited JSON on
//! stdio, translating each tool call into one or more HTTP calls against the
//! co-hosted HTTP Surface. Holds no Store state of its own.

pub mod client;
pub mod error;
pub mod tools;
pub mod transport;

pub use client::HttpClient;
pub use error::AcpError;
pub use tools::Dispatcher;

/// Runs the dispatcher over real stdin/stdout until the transport closes.
pub async fn serve_stdio(dispatcher: Dispatcher) {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    transport::run(&dispatcher, stdin, stdout).await;
}
