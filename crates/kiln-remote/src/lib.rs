//! Client for a remote sourced service.
//!
//! One dedicated worker thread owns the outbound TCP connection; callers
//! hand it requests through a channel mailbox and block for the reply.
//! Exactly one request is on the wire at a time. A lost connection fails
//! the in-flight request and schedules a reconnect with exponential
//! backoff, during which requests fail fast instead of queueing up
//! behind a dead socket.

pub mod client;
mod worker;

pub use client::RemoteSourcedClient;
