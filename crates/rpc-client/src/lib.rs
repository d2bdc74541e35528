//! # RPC Client
//!
//! Caller side of the correlated request/reply protocol.
//!
//! ```text
//! call(payload) ──register──→ PendingRequestStore ←──complete── ResponseListener
//!      │                             ↑                                 ↑
//!      └──publish(work queue)──→ Broker ──→ Worker ──publish(reply_to)─┘
//! ```
//!
//! ## Guarantees
//!
//! - A call resolves exactly once: reply, timeout, transport failure or close.
//! - Replies are matched by correlation id only; arrival order is irrelevant.
//! - A reply arriving after its call timed out is discarded without error.
//! - No retries. Resubmitting means a new call with a new correlation id.

pub mod client;
pub mod config;
pub mod error;
pub mod expired;
pub mod listener;
pub mod pending;

pub use client::RpcClient;
pub use config::ClientConfig;
pub use error::ClientError;
pub use expired::ExpiredCalls;
pub use listener::ResponseListener;
pub use pending::{CallResult, Completion, PendingRequestStore, PendingStats};
