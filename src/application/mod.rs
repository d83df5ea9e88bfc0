//! Application layer coordinating the domain and its ports.
//!
//! `PaymentOrchestrator` is the entry point for signing requests, processing
//! gateway callbacks and reconciling with the gateway API. Outcomes are
//! reported through a `PaymentObserver`, optionally as `PaymentEvent`s over a
//! `tokio` channel.

pub mod events;
pub mod orchestrator;
