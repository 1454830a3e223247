//! Outbound webhook forwarding
//!
//! Re-delivers a received webhook body to a user-configured downstream URL.
//! Exactly one attempt per delivery; there is no retry queue. The engine is
//! invoked from two call sites with different blocking behavior:
//!
//! - after intake, detached via [`spawn_forward`] so the provider gets its
//!   acknowledgment before the downstream responds
//! - from replay, awaited directly, because the operator wants the outcome
//!   in the replay response

pub mod dispatch;
pub mod engine;

pub use dispatch::spawn_forward;
pub use engine::{ForwardRequest, Forwarder};
