//! WebSocket RPC client for the hyperclaw agent gateway (OpenClaw protocol
//! v3): challenge-response handshake, correlated request/response dispatch,
//! and interleaved server-push event delivery on a single connection.
//!
//! ```no_run
//! use futures::StreamExt;
//! use hypercli_gateway::{ChatEvent, GatewayClient, GatewayOptions};
//!
//! # async fn run() -> hypercli_gateway::Result<()> {
//! let mut gw = GatewayClient::new(GatewayOptions::new(
//!     "wss://openclaw-myagent.hyperclaw.app",
//!     "jwt...",
//! ));
//! gw.connect().await?;
//!
//! let config = gw.config_get().await?;
//! let models = gw.models_list().await?;
//!
//! {
//!     let stream = gw.chat_send("Hello, agent!", None, None);
//!     futures::pin_mut!(stream);
//!     while let Some(event) = stream.next().await {
//!         if let ChatEvent::Content { text } = event? {
//!             print!("{text}");
//!         }
//!     }
//! }
//!
//! gw.close().await;
//! # Ok(())
//! # }
//! ```

mod chat;
mod client;
mod error;
mod ops;

pub use hypercli_protocol as protocol;

pub use crate::{
    chat::ChatEvent,
    client::{CHAT_TIMEOUT, DEFAULT_TIMEOUT, GatewayClient, GatewayOptions, WsStream},
    error::{Error, GatewayError, Result},
};
