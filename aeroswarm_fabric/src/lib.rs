//! Aeroswarm coordination fabric.
//!
//! Everything above the per-vehicle firmware that lets many vehicles act as
//! one swarm:
//!
//! - [`context::ContextStore`]: per-agent context snapshots with TTL
//!   eviction, plus tool and resource registries.
//! - [`messaging::PeerMessenger`]: direct peer messaging, proposals with
//!   expiry, and consensus voting.
//! - [`coordinator::SwarmCoordinator`]: role assignment, capability-fit task
//!   allocation, decision processing and emergent-behavior detection.
//! - [`formation::FormationController`]: desired pose/velocity per vehicle
//!   from a formation type and neighbor states.
//! - [`swarm::SwarmController`]: owns the four subsystems and runs the
//!   mission lifecycle.
//!
//! All timestamps come from the kernel clock, so a swarm driven by the
//! steppable clock is as reproducible as the physics under it.

pub mod context;
pub mod coordinator;
pub mod formation;
pub mod messaging;
pub mod swarm;

pub use context::{ContextSnapshot, ContextStore, ContextStoreConfig, Resource, Tool};
pub use coordinator::{
    AgentRole, AgentState, BehaviorType, CoordinatorConfig, Decision, DecisionMode,
    EmergentBehavior, SwarmCoordinator, Task, TaskStatus,
};
pub use formation::{
    FormationCommand, FormationController, FormationParams, FormationType, VehicleState,
};
pub use messaging::{
    Consensus, Message, MessagePriority, MessageType, MessengerConfig, PeerMessenger, Proposal,
};
pub use swarm::{
    Mission, MissionType, SwarmAgent, SwarmConfig, SwarmController, SwarmState,
};
