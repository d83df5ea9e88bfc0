//! Protocol rules and the ports the orchestrator talks to.

pub mod config;
pub mod hash;
pub mod payment;
pub mod ports;
