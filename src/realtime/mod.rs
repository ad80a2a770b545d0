//! Realtime publish/subscribe subsystem.
//!
//! # Data Flow
//! ```text
//! caller ──subscribe/send──▶ SessionManager ──▶ session task
//!                                                 │
//!                           candidates[i] ◀───────┤ dial (WebSocket + STOMP CONNECT)
//!                                                 │
//!        handler(Payload) ◀── MESSAGE frames ◀────┘
//! ```
//!
//! # Design Decisions
//! - STOMP 1.2 framing lives in `frame.rs`, independent of the transport
//! - Attempt accounting is a plain state value in `state.rs` so it can be
//!   tested without sockets

pub mod correlation;
pub mod destinations;
pub mod frame;
pub mod session;
pub mod state;

pub use correlation::CorrelationId;
pub use session::{Delivery, Payload, ProtocolError, SessionError, SessionManager};
pub use state::{ConnectionState, Phase};
