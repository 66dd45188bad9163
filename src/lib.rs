//! fjage-gw — client-side gateway for participating as a pseudo-agent
//! in a running fjage-style agent container.
//!
//! Connects over a newline-delimited JSON line protocol (TCP or
//! serial), and exposes a blocking, single-thread-owned API: send,
//! receive with class/correlation filtering, request/response, topic
//! subscription, and service discovery. [`Gateway::interrupter`] is the
//! one handle safe to use from another thread.

// Error documentation is deferred - the errors are self-explanatory from types
#![allow(clippy::missing_errors_doc)]

mod aid;
mod codec;
mod error;
mod gateway;
mod message;
pub mod param;
mod perf;
mod queue;
mod subscription;
mod transport;
mod wait;

pub use aid::AgentId;
pub use error::GatewayError;
pub use gateway::Gateway;
pub use message::{Message, MessageBuilder};
pub use perf::Performative;
pub use wait::Interrupter;
