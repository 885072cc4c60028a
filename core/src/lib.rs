//! Synchronous HTTP exchange core over a wasi-http-style host interface.
//!
//! # Overview
//! Two roles share this crate. The inbound [`Adapter`] receives an opaque
//! incoming-request handle plus a response outparam, runs a user [`Handler`]
//! over a simplified request/reply pair, and serializes the result back
//! through the host's response resources. The outbound [`Client`] builds a
//! request from plain data, hands it to the host, blocks for the response,
//! and drains the body into a bounded buffer.
//!
//! # Design
//! - The host runtime that owns HTTP parsing, polling, and resource
//!   lifetimes sits behind the [`OutboundHost`] / [`InboundHost`] traits;
//!   the core never performs I/O itself and is fully deterministic under a
//!   scripted host.
//! - Control flow is single-shot and synchronous: one call in, one call
//!   out, no retained state between invocations, no retries, no timeouts.
//! - Resource handles are owned values, so every exit path — including
//!   early error returns — releases what it acquired.
//! - Body buffers are bounded; overflow is reported as truncation, never as
//!   an error and never as a silent byte drop.

pub mod error;
pub mod host;
pub mod inbound;
pub mod outbound;
pub mod types;

pub use error::{ExchangeError, HostError};
pub use host::{InboundHost, OutboundHost, ReadOutcome};
pub use inbound::{Adapter, Handler};
pub use outbound::Client;
pub use types::{
    InboundRequest, Method, OutboundRequest, Reply, Response, Scheme, DEFAULT_BODY_CAPACITY,
};
