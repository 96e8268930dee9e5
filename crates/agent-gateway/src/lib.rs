//! Agent registry front-end and reverse proxy gateway.
//!
//! Agents announce themselves with periodic keepalives; clients list them and
//! reach them through an authenticated proxy that checks liveness, version
//! compatibility and a host allow-list before forwarding.

pub mod agent;
pub mod allowlist;
pub mod api;
pub mod context;
pub mod gate;
