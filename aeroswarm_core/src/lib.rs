//! Aeroswarm simulation kernel.
//!
//! This crate is the deterministic heart of the simulator:
//! - **Clock**: virtual time that either steps by a fixed period or tracks
//!   scaled wall time; every subsystem reads time through it.
//! - **Physics**: fixed-step rigid-body integration for all registered
//!   vehicles, with optional wind and one external force field.
//! - **Sensors**: periodic, noise-injected synthesis of IMU, GPS, barometer,
//!   magnetometer, lidar and distance readings from ground-truth kinematics,
//!   including delay-line modeling.
//! - **Firmware**: cascaded PID loops (position -> velocity -> angle ->
//!   angle-rate -> mixer) driving actuators from goals, with an
//!   arm/fly/land state machine.
//! - **APIs**: a stable per-vehicle command/query surface and a registry
//!   mapping vehicle names to it, consumed by the RPC layer and the
//!   coordination fabric.
//!
//! All entropy is derived from a single configured seed, so a run driven by
//! the steppable clock is reproducible bit-for-bit.

pub mod api;
pub mod clock;
pub mod control;
pub mod environment;
pub mod error;
pub mod factory;
pub mod geom;
pub mod physics;
pub mod recording;
pub mod sensors;
pub mod settings;
pub mod updatable;
pub mod vehicle;
pub mod world;

pub use clock::{ScalableClock, SimClock, SteppableClock, TimeDelta, TimePoint};
pub use error::SimError;
pub use geom::{GeoPoint, Kinematics, Pose, Quaternionr, Real, Twist, Vector3r};
pub use settings::Settings;
pub use world::SimWorld;
