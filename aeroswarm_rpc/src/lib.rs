//! Aeroswarm RPC surface.
//!
//! Two TCP endpoints over the simulation kernel:
//! - [`server::RpcServer`]: the client surface (flight stacks, research
//!   code, visualizers) speaking newline-delimited JSON-RPC 2.0 on port
//!   41451 by default.
//! - [`bridge::EngineBridge`]: an optional ingress for a 3D-engine consumer
//!   mirroring robots and debug drawings.
//!
//! [`wire`] holds the adaptor types; every wire/core pair converts exactly
//! in both directions.

pub mod bridge;
pub mod server;
pub mod wire;

pub use bridge::EngineBridge;
pub use server::{dispatch, RpcServer};
