//! Fixed-step rigid-body physics for all registered vehicles.

mod body;
mod engine;

pub use body::RigidBody;
pub use engine::{BodyHandle, PhysicsEngine, PhysicsMode};
