//! Orchestrates the coordination fabric and the mission lifecycle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::{info, warn};

use aeroswarm_core::clock::SimClock;
use aeroswarm_core::error::SimError;
use aeroswarm_core::geom::{Real, Vector3r};
use aeroswarm_core::sensors::SharedClock;

use crate::context::{ContextSnapshot, ContextStore, ContextStoreConfig};
use crate::coordinator::{AgentState, CoordinatorConfig, SwarmCoordinator, Task};
use crate::formation::{
    FormationCommand, FormationController, FormationParams, FormationType, VehicleState,
};
use crate::messaging::{Message, MessengerConfig, PeerMessenger};

/// What a mission is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum MissionType {
    Exploration = 0,
    SearchAndRescue = 1,
    Surveillance = 2,
    Transport = 3,
    Reconnaissance = 4,
    Patrol = 5,
    #[default]
    Custom = 6,
}

/// Swarm / mission lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SwarmState {
    #[default]
    Initializing = 0,
    Idle = 1,
    Planning = 2,
    Executing = 3,
    Adapting = 4,
    Emergency = 5,
    Completed = 6,
    Failed = 7,
}

/// Controller-level view of one agent: the coordinator state plus fabric
/// connectivity.
#[derive(Debug, Clone)]
pub struct SwarmAgent {
    pub id: String,
    pub state: AgentState,
    pub context: ContextSnapshot,
    pub connected: bool,
    /// Milliseconds of virtual time.
    pub last_update: u64,
}

impl SwarmAgent {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            state: AgentState::new(id.clone()),
            context: ContextSnapshot::new(id.clone(), 1),
            connected: true,
            last_update: 0,
            id,
        }
    }
}

/// A mission: a goal plus the tasks that accomplish it.
///
/// Invariant: mission completion equals the mean of its tasks' completions.
#[derive(Debug, Clone)]
pub struct Mission {
    pub id: String,
    pub mission_type: MissionType,
    pub description: String,
    pub target_location: Vector3r,
    pub priority: Real,
    pub assigned_agents: Vec<String>,
    pub task_ids: Vec<String>,
    pub state: SwarmState,
    pub completion: Real,
    /// Milliseconds of virtual time.
    pub start_timestamp: u64,
    pub deadline: u64,
}

impl Mission {
    pub fn new(mission_type: MissionType, description: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            mission_type,
            description: description.into(),
            target_location: Vector3r::zeros(),
            priority: 0.5,
            assigned_agents: Vec::new(),
            task_ids: Vec::new(),
            state: SwarmState::Initializing,
            completion: 0.0,
            start_timestamp: 0,
            deadline: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SwarmConfig {
    pub context: ContextStoreConfig,
    pub messenger: MessengerConfig,
    pub coordinator: CoordinatorConfig,
    pub formation: FormationParams,
    /// Below this many agents the swarm enters Emergency.
    pub min_agents: usize,
    pub max_agents: usize,
    /// Agents silent longer than this are marked disconnected, seconds.
    pub agent_timeout_sec: f64,
    pub enable_adaptive_formation: bool,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            context: ContextStoreConfig::default(),
            messenger: MessengerConfig::default(),
            coordinator: CoordinatorConfig::default(),
            formation: FormationParams::default(),
            min_agents: 2,
            max_agents: 100,
            agent_timeout_sec: 5.0,
            enable_adaptive_formation: true,
        }
    }
}

/// Owns the context store, the messenger, the coordinator and the formation
/// controller, and runs the mission lifecycle over them.
///
/// Lock order is `agents` then `missions` then `state`; no other order is
/// taken anywhere in this module.
pub struct SwarmController {
    config: SwarmConfig,
    clock: SharedClock,
    context_store: ContextStore,
    messenger: PeerMessenger,
    coordinator: SwarmCoordinator,
    formation: Mutex<FormationController>,
    agents: Mutex<HashMap<String, SwarmAgent>>,
    missions: Mutex<HashMap<String, Mission>>,
    state: Mutex<SwarmState>,
    formation_leader: Mutex<String>,
    latched_commands: Mutex<Vec<(String, FormationCommand)>>,
    mission_counter: AtomicU64,
}

impl SwarmController {
    pub fn new(config: SwarmConfig, clock: SharedClock) -> Self {
        Self {
            context_store: ContextStore::new(config.context.clone(), clock.clone()),
            messenger: PeerMessenger::new(config.messenger.clone(), clock.clone()),
            coordinator: SwarmCoordinator::new(config.coordinator.clone(), clock.clone()),
            formation: Mutex::new(FormationController::new(config.formation.clone())),
            agents: Mutex::new(HashMap::new()),
            missions: Mutex::new(HashMap::new()),
            state: Mutex::new(SwarmState::Idle),
            formation_leader: Mutex::new(String::new()),
            latched_commands: Mutex::new(Vec::new()),
            mission_counter: AtomicU64::new(0),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    fn now_ms(&self) -> u64 {
        self.clock.now() / 1_000_000
    }

    pub fn swarm_state(&self) -> SwarmState {
        *self.state.lock().unwrap()
    }

    // ---- subsystem access ----

    pub fn context_store(&self) -> &ContextStore {
        &self.context_store
    }

    pub fn messenger(&self) -> &PeerMessenger {
        &self.messenger
    }

    pub fn coordinator(&self) -> &SwarmCoordinator {
        &self.coordinator
    }

    // ---- agents ----

    pub fn add_agent(&self, agent: SwarmAgent) -> Result<(), SimError> {
        if agent.id.is_empty() {
            return Err(SimError::invalid("agent without id"));
        }
        let mut agents = self.agents.lock().unwrap();
        if agents.len() >= self.config.max_agents {
            return Err(SimError::invalid("agent limit reached"));
        }
        self.coordinator.register_agent(agent.state.clone())?;
        self.messenger.register_peer(&agent.id);
        let mut agent = agent;
        agent.last_update = self.now_ms();
        agents.insert(agent.id.clone(), agent);
        Ok(())
    }

    pub fn remove_agent(&self, agent_id: &str) -> bool {
        let mut agents = self.agents.lock().unwrap();
        self.coordinator.unregister_agent(agent_id);
        self.messenger.unregister_peer(agent_id);
        agents.remove(agent_id).is_some()
    }

    /// Updates an agent's state from the vehicle side and feeds it through
    /// to the coordinator.
    pub fn update_agent(&self, state: AgentState) -> Result<(), SimError> {
        let mut agents = self.agents.lock().unwrap();
        let Some(agent) = agents.get_mut(&state.id) else {
            return Err(SimError::invalid(format!("unknown agent '{}'", state.id)));
        };
        agent.state = state.clone();
        agent.last_update = self.now_ms();
        agent.connected = true;
        drop(agents);
        self.coordinator.update_agent_state(state)?;
        Ok(())
    }

    pub fn agent(&self, agent_id: &str) -> Option<SwarmAgent> {
        self.agents.lock().unwrap().get(agent_id).cloned()
    }

    pub fn agents(&self) -> Vec<SwarmAgent> {
        let mut agents: Vec<SwarmAgent> =
            self.agents.lock().unwrap().values().cloned().collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }

    pub fn agent_count(&self) -> usize {
        self.agents.lock().unwrap().len()
    }

    // ---- missions ----

    pub fn create_mission(&self, mut mission: Mission) -> String {
        if mission.id.is_empty() {
            let n = self.mission_counter.fetch_add(1, Ordering::SeqCst);
            mission.id = format!("mission_{n}");
        }
        mission.start_timestamp = self.now_ms();
        mission.state = SwarmState::Planning;
        let id = mission.id.clone();
        self.missions
            .lock()
            .unwrap()
            .insert(id.clone(), mission);
        info!(mission = %id, "mission created");
        id
    }

    /// Attaches a task to a mission and registers it with the coordinator.
    pub fn add_mission_task(&self, mission_id: &str, task: Task) -> Result<String, SimError> {
        let mut missions = self.missions.lock().unwrap();
        let mission = missions
            .get_mut(mission_id)
            .ok_or_else(|| SimError::invalid(format!("unknown mission '{mission_id}'")))?;
        let task_id = self.coordinator.create_task(task);
        mission.task_ids.push(task_id.clone());
        Ok(task_id)
    }

    pub fn start_mission(&self, mission_id: &str) -> Result<(), SimError> {
        let mut missions = self.missions.lock().unwrap();
        let mission = missions
            .get_mut(mission_id)
            .ok_or_else(|| SimError::invalid(format!("unknown mission '{mission_id}'")))?;
        mission.state = SwarmState::Executing;
        *self.state.lock().unwrap() = SwarmState::Executing;
        info!(mission = %mission_id, "mission started");
        Ok(())
    }

    pub fn pause_mission(&self, mission_id: &str) -> Result<(), SimError> {
        let mut missions = self.missions.lock().unwrap();
        let mission = missions
            .get_mut(mission_id)
            .ok_or_else(|| SimError::invalid(format!("unknown mission '{mission_id}'")))?;
        mission.state = SwarmState::Idle;
        Ok(())
    }

    pub fn resume_mission(&self, mission_id: &str) -> Result<(), SimError> {
        let mut missions = self.missions.lock().unwrap();
        let mission = missions
            .get_mut(mission_id)
            .ok_or_else(|| SimError::invalid(format!("unknown mission '{mission_id}'")))?;
        if mission.state != SwarmState::Idle {
            return Err(SimError::invalid("mission is not paused"));
        }
        mission.state = SwarmState::Executing;
        Ok(())
    }

    pub fn abort_mission(&self, mission_id: &str) -> Result<(), SimError> {
        let mut missions = self.missions.lock().unwrap();
        let mission = missions
            .get_mut(mission_id)
            .ok_or_else(|| SimError::invalid(format!("unknown mission '{mission_id}'")))?;
        mission.state = SwarmState::Failed;
        warn!(mission = %mission_id, "mission aborted");
        Ok(())
    }

    pub fn mission(&self, mission_id: &str) -> Option<Mission> {
        self.missions.lock().unwrap().get(mission_id).cloned()
    }

    pub fn active_missions(&self) -> Vec<Mission> {
        let mut missions: Vec<Mission> = self
            .missions
            .lock()
            .unwrap()
            .values()
            .filter(|m| matches!(m.state, SwarmState::Planning | SwarmState::Executing))
            .cloned()
            .collect();
        missions.sort_by(|a, b| a.id.cmp(&b.id));
        missions
    }

    // ---- formation ----

    pub fn set_formation(&self, formation_type: FormationType) {
        self.formation
            .lock()
            .unwrap()
            .set_formation_type(formation_type);
    }

    pub fn formation_type(&self) -> FormationType {
        self.formation.lock().unwrap().formation_type()
    }

    pub fn set_formation_leader(&self, agent_id: &str) -> Result<(), SimError> {
        if !self.agents.lock().unwrap().contains_key(agent_id) {
            return Err(SimError::invalid(format!("unknown agent '{agent_id}'")));
        }
        *self.formation_leader.lock().unwrap() = agent_id.to_string();
        Ok(())
    }

    /// Formation commands for every agent, keyed by agent id, computed from
    /// the current leader. Empty when no leader has been designated.
    pub fn formation_commands(&self) -> Vec<(String, FormationCommand)> {
        let leader_id = self.formation_leader.lock().unwrap().clone();
        if leader_id.is_empty() {
            return Vec::new();
        }
        let agents = self.agents.lock().unwrap();
        let Some(leader) = agents.get(&leader_id) else {
            return Vec::new();
        };

        let mut ordered: Vec<&SwarmAgent> = agents.values().collect();
        ordered.sort_by(|a, b| a.id.cmp(&b.id));

        let states: Vec<VehicleState> = ordered
            .iter()
            .enumerate()
            .map(|(index, agent)| VehicleState {
                id: index,
                position: agent.state.position,
                velocity: agent.state.velocity,
                orientation: agent.state.orientation,
            })
            .collect();
        let leader_state = VehicleState {
            id: usize::MAX,
            position: leader.state.position,
            velocity: leader.state.velocity,
            orientation: leader.state.orientation,
        };

        let formation = self.formation.lock().unwrap();
        ordered
            .iter()
            .enumerate()
            .map(|(index, agent)| {
                (
                    agent.id.clone(),
                    formation.compute_command(index, &states[index], &states, &leader_state),
                )
            })
            .collect()
    }

    // ---- communication ----

    pub fn broadcast_message(&self, sender: &str, content: &str) -> Result<(), SimError> {
        let mut message = Message::new(sender, "");
        message.content = content.to_string();
        self.messenger.broadcast(message)
    }

    pub fn send_agent_message(
        &self,
        sender: &str,
        receiver: &str,
        content: &str,
    ) -> Result<(), SimError> {
        let mut message = Message::new(sender, receiver);
        message.content = content.to_string();
        self.messenger.send(message)
    }

    pub fn publish_context(&self, snapshot: ContextSnapshot) -> Result<(), SimError> {
        self.context_store.publish(snapshot)
    }

    pub fn query_swarm_context(&self) -> Vec<ContextSnapshot> {
        self.context_store.query("")
    }

    // ---- the tick ----

    /// One coordination tick. Synchronizes agent state with the coordinator
    /// and the context store, processes decisions and allocations, refreshes
    /// missions, and runs health and emergency checks.
    pub fn update(&self) {
        self.synchronize_agents();
        self.coordinator.update();
        self.messenger.update();
        if self.config.enable_adaptive_formation {
            let commands = self.formation_commands();
            *self.latched_commands.lock().unwrap() = commands;
        }
        self.update_missions();
        self.check_agent_health();
        self.handle_emergencies();
    }

    /// The formation commands computed on the last tick, for consumers that
    /// poll rather than recompute.
    pub fn latest_formation_commands(&self) -> Vec<(String, FormationCommand)> {
        self.latched_commands.lock().unwrap().clone()
    }

    /// Pulls coordinator state back into the agent table and publishes each
    /// connected agent's context snapshot.
    fn synchronize_agents(&self) {
        let mut agents = self.agents.lock().unwrap();
        let now = self.clock.now().max(1);
        for agent in agents.values_mut() {
            if let Some(state) = self.coordinator.agent(&agent.id) {
                agent.state = state;
            }
            if agent.connected {
                agent.context.position = agent.state.position;
                agent.context.velocity = agent.state.velocity;
                agent.context.orientation = agent.state.orientation;
                agent.context.timestamp = now;
                let _ = self.context_store.publish(agent.context.clone());
            }
        }
    }

    /// Mission completion is the mean of its tasks' completions; reaching
    /// 1.0 completes the mission.
    fn update_missions(&self) {
        let mut missions = self.missions.lock().unwrap();
        for mission in missions.values_mut() {
            if mission.state != SwarmState::Executing {
                continue;
            }
            if mission.task_ids.is_empty() {
                continue;
            }
            let mut total = 0.0;
            for task_id in &mission.task_ids {
                if let Some(task) = self.coordinator.task(task_id) {
                    total += task.completion;
                }
            }
            mission.completion = total / mission.task_ids.len() as Real;
            if mission.completion >= 1.0 {
                mission.state = SwarmState::Completed;
                info!(mission = %mission.id, "mission completed");
            }
        }
    }

    /// Marks agents disconnected when their last update is older than the
    /// timeout.
    fn check_agent_health(&self) {
        let now = self.now_ms();
        let timeout_ms = (self.config.agent_timeout_sec * 1000.0) as u64;
        let mut agents = self.agents.lock().unwrap();
        for agent in agents.values_mut() {
            if now.saturating_sub(agent.last_update) > timeout_ms {
                if agent.connected {
                    warn!(agent = %agent.id, "agent timed out");
                }
                agent.connected = false;
            }
        }
    }

    /// Enters Emergency when the swarm is too small or over half the agents
    /// are low on energy.
    fn handle_emergencies(&self) {
        let agents = self.agents.lock().unwrap();
        let mut state = self.state.lock().unwrap();

        if agents.len() < self.config.min_agents {
            *state = SwarmState::Emergency;
            return;
        }
        let low_energy = agents
            .values()
            .filter(|a| a.state.energy < 0.2)
            .count();
        if low_energy > agents.len() / 2 {
            *state = SwarmState::Emergency;
        }
    }

    pub fn reset(&self) {
        let mut agents = self.agents.lock().unwrap();
        let mut missions = self.missions.lock().unwrap();
        let mut state = self.state.lock().unwrap();
        self.context_store.reset();
        self.messenger.reset();
        self.coordinator.reset();
        self.formation.lock().unwrap().reset();
        agents.clear();
        missions.clear();
        *state = SwarmState::Idle;
        *self.formation_leader.lock().unwrap() = String::new();
        self.latched_commands.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeroswarm_core::clock::SteppableClock;
    use std::sync::Arc;

    fn controller() -> (Arc<SteppableClock>, SwarmController) {
        let clock = Arc::new(SteppableClock::new(1_000_000, 1.0));
        let shared: SharedClock = clock.clone();
        (clock, SwarmController::new(SwarmConfig::default(), shared))
    }

    fn agent_with_energy(id: &str, energy: Real) -> SwarmAgent {
        let mut agent = SwarmAgent::new(id);
        agent.state.energy = energy;
        agent
    }

    #[test]
    fn test_add_agent_registers_everywhere() {
        let (_clock, controller) = controller();
        controller.add_agent(SwarmAgent::new("a")).unwrap();
        assert_eq!(controller.agent_count(), 1);
        assert!(controller.coordinator().agent("a").is_some());
        assert!(controller.messenger().peers().contains(&"a".to_string()));
    }

    #[test]
    fn test_mission_completion_is_mean_of_tasks() {
        let (_clock, controller) = controller();
        let mission_id =
            controller.create_mission(Mission::new(MissionType::Surveillance, "watch"));
        let t1 = controller
            .add_mission_task(&mission_id, Task::new("", "north"))
            .unwrap();
        let t2 = controller
            .add_mission_task(&mission_id, Task::new("", "south"))
            .unwrap();
        controller.start_mission(&mission_id).unwrap();

        controller.coordinator().update_task_progress(&t1, 0.5).unwrap();
        controller.coordinator().update_task_progress(&t2, 0.25).unwrap();
        controller.update();

        let mission = controller.mission(&mission_id).unwrap();
        assert!((mission.completion - 0.375).abs() < 1e-5);
        assert_eq!(mission.state, SwarmState::Executing);
    }

    #[test]
    fn test_mission_auto_completes_at_full_progress() {
        let (_clock, controller) = controller();
        let mission_id = controller.create_mission(Mission::new(MissionType::Transport, "haul"));
        let t1 = controller
            .add_mission_task(&mission_id, Task::new("", "leg"))
            .unwrap();
        controller.start_mission(&mission_id).unwrap();
        controller.coordinator().complete_task(&t1).unwrap();
        controller.update();
        assert_eq!(
            controller.mission(&mission_id).unwrap().state,
            SwarmState::Completed
        );
    }

    #[test]
    fn test_mission_pause_resume_abort() {
        let (_clock, controller) = controller();
        let id = controller.create_mission(Mission::new(MissionType::Patrol, "loop"));
        controller.start_mission(&id).unwrap();
        controller.pause_mission(&id).unwrap();
        assert_eq!(controller.mission(&id).unwrap().state, SwarmState::Idle);
        controller.resume_mission(&id).unwrap();
        assert_eq!(controller.mission(&id).unwrap().state, SwarmState::Executing);
        controller.abort_mission(&id).unwrap();
        assert_eq!(controller.mission(&id).unwrap().state, SwarmState::Failed);
        // A failed mission cannot be resumed.
        assert!(controller.resume_mission(&id).is_err());
    }

    #[test]
    fn test_emergency_when_below_min_agents() {
        let (_clock, controller) = controller();
        controller.add_agent(SwarmAgent::new("only")).unwrap();
        controller.update();
        assert_eq!(controller.swarm_state(), SwarmState::Emergency);
    }

    #[test]
    fn test_emergency_when_half_the_swarm_is_drained() {
        let (_clock, controller) = controller();
        controller.add_agent(agent_with_energy("a", 0.1)).unwrap();
        controller.add_agent(agent_with_energy("b", 0.1)).unwrap();
        controller.add_agent(agent_with_energy("c", 0.9)).unwrap();
        controller.update();
        assert_eq!(controller.swarm_state(), SwarmState::Emergency);
    }

    #[test]
    fn test_healthy_swarm_stays_out_of_emergency() {
        let (_clock, controller) = controller();
        controller.add_agent(agent_with_energy("a", 0.9)).unwrap();
        controller.add_agent(agent_with_energy("b", 0.8)).unwrap();
        controller.update();
        assert_ne!(controller.swarm_state(), SwarmState::Emergency);
    }

    #[test]
    fn test_agent_timeout_marks_disconnected() {
        let (clock, controller) = controller();
        controller.add_agent(SwarmAgent::new("a")).unwrap();
        controller.add_agent(SwarmAgent::new("b")).unwrap();
        // 6 simulated seconds of silence, beyond the 5 s timeout.
        for _ in 0..6_000 {
            clock.step();
        }
        controller.update();
        assert!(!controller.agent("a").unwrap().connected);
    }

    #[test]
    fn test_update_publishes_contexts_to_store() {
        let (clock, controller) = controller();
        controller.add_agent(SwarmAgent::new("a")).unwrap();
        controller.add_agent(SwarmAgent::new("b")).unwrap();
        clock.step();
        controller.update();
        let contexts = controller.query_swarm_context();
        assert_eq!(contexts.len(), 2);
    }

    #[test]
    fn test_formation_commands_need_a_leader() {
        let (_clock, controller) = controller();
        controller.add_agent(SwarmAgent::new("a")).unwrap();
        controller.add_agent(SwarmAgent::new("b")).unwrap();
        assert!(controller.formation_commands().is_empty());
        controller.set_formation_leader("a").unwrap();
        let commands = controller.formation_commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].0, "a");
    }

    #[test]
    fn test_update_latches_formation_commands() {
        let (_clock, controller) = controller();
        controller.add_agent(SwarmAgent::new("a")).unwrap();
        controller.add_agent(SwarmAgent::new("b")).unwrap();
        controller.set_formation_leader("a").unwrap();
        controller.update();
        assert_eq!(controller.latest_formation_commands().len(), 2);
    }

    #[test]
    fn test_formation_type_switches() {
        let (_clock, controller) = controller();
        assert_eq!(controller.formation_type(), FormationType::Line);
        controller.set_formation(FormationType::Circle);
        assert_eq!(controller.formation_type(), FormationType::Circle);
    }

    #[test]
    fn test_reset_clears_everything() {
        let (_clock, controller) = controller();
        controller.add_agent(SwarmAgent::new("a")).unwrap();
        controller.create_mission(Mission::new(MissionType::Exploration, "map"));
        controller.reset();
        assert_eq!(controller.agent_count(), 0);
        assert!(controller.active_missions().is_empty());
        assert_eq!(controller.swarm_state(), SwarmState::Idle);
    }
}
