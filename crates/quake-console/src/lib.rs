//! # quake-console
//!
//! The control loop for a supervised Quake dedicated server.
//!
//! This crate provides:
//! - `ConsoleSession`: command issuance, history recall, status polling,
//!   snapshot capture, and the bounded console transcript
//! - `CommandTransport` trait for the two command paths (UDP remote
//!   console vs direct injection into an embedded engine)
//! - `SnapshotStore` trait for locating written save content

pub mod session;
pub mod transport;

pub use session::{ConsoleSession, PollHandle, SessionConfig};
pub use transport::{CommandTransport, SnapshotStore};
