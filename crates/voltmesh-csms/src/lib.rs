//! voltmesh CSMS library entry.
//!
//! This crate wires the websocket transport, admission policy, dispatch
//! registry, adapters, and collaborator handlers into a running CSMS node. It
//! is intended to be consumed by the binary (`main.rs`) and by integration
//! tests.

pub mod adapters;
pub mod admission;
pub mod app_state;
pub mod config;
pub mod dispatch;
pub mod handlers;
pub mod obs;
pub mod ops;
pub mod relay;
pub mod router;
pub mod session;
pub mod session_registry;
pub mod transport;
