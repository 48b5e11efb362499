//! Distributed decision/role/task substrate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::debug;

use aeroswarm_core::clock::SimClock;
use aeroswarm_core::error::SimError;
use aeroswarm_core::geom::{Quaternionr, Real, Vector3r};
use aeroswarm_core::sensors::SharedClock;

/// Role an agent plays in the swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum AgentRole {
    Leader = 0,
    Scout = 1,
    #[default]
    Worker = 2,
    Guardian = 3,
    Relay = 4,
    Specialist = 5,
    Adaptive = 6,
}

/// How a decision is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DecisionMode {
    Centralized = 0,
    Distributed = 1,
    #[default]
    Consensus = 2,
    Hierarchical = 3,
    Democratic = 4,
}

/// Collective behavior patterns the coordinator can detect or command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BehaviorType {
    Exploration = 0,
    Exploitation = 1,
    #[default]
    Formation = 2,
    Dispersion = 3,
    Aggregation = 4,
    Migration = 5,
    Defense = 6,
    Search = 7,
    Rescue = 8,
}

/// Coordinator's view of one agent.
#[derive(Debug, Clone)]
pub struct AgentState {
    pub id: String,
    pub role: AgentRole,
    pub position: Vector3r,
    pub velocity: Vector3r,
    pub orientation: Quaternionr,
    /// Remaining energy in [0, 1].
    pub energy: Real,
    pub capabilities: HashMap<String, Real>,
    pub assigned_tasks: Vec<String>,
    pub behavior: BehaviorType,
    /// Milliseconds of virtual time.
    pub timestamp: u64,
}

impl AgentState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: AgentRole::Worker,
            position: Vector3r::zeros(),
            velocity: Vector3r::zeros(),
            orientation: Quaternionr::identity(),
            energy: 1.0,
            capabilities: HashMap::new(),
            assigned_tasks: Vec::new(),
            behavior: BehaviorType::Formation,
            timestamp: 0,
        }
    }
}

/// Task progress lattice. Transitions are monotonic except into `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TaskStatus {
    #[default]
    Pending = 0,
    Assigned = 1,
    InProgress = 2,
    Completed = 3,
    Failed = 4,
}

/// A unit of swarm work.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub location: Vector3r,
    /// Priority in [0, 1].
    pub priority: Real,
    pub estimated_duration_sec: Real,
    pub required_capabilities: Vec<String>,
    pub assigned: Vec<String>,
    pub status: TaskStatus,
    /// Completion in [0, 1]; `Completed` implies 1.
    pub completion: Real,
    /// Milliseconds of virtual time; zero means no deadline.
    pub deadline: u64,
}

impl Task {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            location: Vector3r::zeros(),
            priority: 0.5,
            estimated_duration_sec: 0.0,
            required_capabilities: Vec::new(),
            assigned: Vec::new(),
            status: TaskStatus::Pending,
            completion: 0.0,
            deadline: 0,
        }
    }
}

/// A swarm-level decision being voted on.
#[derive(Debug, Clone)]
pub struct Decision {
    pub id: String,
    pub description: String,
    pub mode: DecisionMode,
    pub participants: Vec<String>,
    /// agent id -> confidence.
    pub votes: HashMap<String, Real>,
    pub threshold: Real,
    pub finalized: bool,
    pub outcome: String,
    pub timestamp: u64,
}

impl Decision {
    pub fn new(id: impl Into<String>, mode: DecisionMode) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            mode,
            participants: Vec::new(),
            votes: HashMap::new(),
            threshold: 0.7,
            finalized: false,
            outcome: String::new(),
            timestamp: 0,
        }
    }

    pub fn mean_confidence(&self) -> Real {
        if self.votes.is_empty() {
            return 0.0;
        }
        self.votes.values().sum::<Real>() / self.votes.len() as Real
    }
}

/// A detected collective pattern.
#[derive(Debug, Clone)]
pub struct EmergentBehavior {
    pub id: String,
    pub behavior_type: BehaviorType,
    /// Pattern strength in [0, 1].
    pub strength: Real,
    pub start_timestamp: u64,
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub default_decision_mode: DecisionMode,
    pub consensus_threshold: Real,
    pub max_agents: usize,
    pub enable_emergent_behavior: bool,
    pub enable_dynamic_roles: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_decision_mode: DecisionMode::Distributed,
            consensus_threshold: 0.7,
            max_agents: 100,
            enable_emergent_behavior: true,
            enable_dynamic_roles: true,
        }
    }
}

/// Role assignment, task allocation and decision processing for the swarm.
pub struct SwarmCoordinator {
    config: CoordinatorConfig,
    clock: SharedClock,
    id_counter: AtomicU64,
    agents: Mutex<HashMap<String, AgentState>>,
    decisions: Mutex<HashMap<String, Decision>>,
    tasks: Mutex<HashMap<String, Task>>,
    behaviors: Mutex<Vec<EmergentBehavior>>,
}

impl SwarmCoordinator {
    pub fn new(config: CoordinatorConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            id_counter: AtomicU64::new(0),
            agents: Mutex::new(HashMap::new()),
            decisions: Mutex::new(HashMap::new()),
            tasks: Mutex::new(HashMap::new()),
            behaviors: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    fn now_ms(&self) -> u64 {
        self.clock.now() / 1_000_000
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.id_counter.fetch_add(1, Ordering::SeqCst);
        format!("{prefix}_{n}")
    }

    /// One coordination tick: process decisions, reassign roles, detect
    /// behaviors, allocate pending tasks.
    pub fn update(&self) {
        self.process_decisions();
        if self.config.enable_dynamic_roles {
            self.reassign_roles();
        }
        if self.config.enable_emergent_behavior {
            let detected = self.detect_emergent_behaviors();
            if !detected.is_empty() {
                self.behaviors.lock().unwrap().extend(detected);
            }
        }
        self.allocate_tasks();
    }

    pub fn reset(&self) {
        self.agents.lock().unwrap().clear();
        self.decisions.lock().unwrap().clear();
        self.tasks.lock().unwrap().clear();
        self.behaviors.lock().unwrap().clear();
    }

    // ---- agents ----

    pub fn register_agent(&self, mut agent: AgentState) -> Result<(), SimError> {
        if agent.id.is_empty() {
            return Err(SimError::invalid("agent without id"));
        }
        let mut agents = self.agents.lock().unwrap();
        if !agents.contains_key(&agent.id) && agents.len() >= self.config.max_agents {
            return Err(SimError::invalid("agent limit reached"));
        }
        agent.timestamp = self.now_ms();
        agents.insert(agent.id.clone(), agent);
        Ok(())
    }

    pub fn unregister_agent(&self, agent_id: &str) -> bool {
        self.agents.lock().unwrap().remove(agent_id).is_some()
    }

    pub fn update_agent_state(&self, mut agent: AgentState) -> Result<(), SimError> {
        let mut agents = self.agents.lock().unwrap();
        let Some(slot) = agents.get_mut(&agent.id) else {
            return Err(SimError::invalid(format!("unknown agent '{}'", agent.id)));
        };
        agent.timestamp = self.now_ms();
        *slot = agent;
        Ok(())
    }

    pub fn agent(&self, agent_id: &str) -> Option<AgentState> {
        self.agents.lock().unwrap().get(agent_id).cloned()
    }

    /// All agents, sorted by id for stable iteration.
    pub fn agents(&self) -> Vec<AgentState> {
        let mut agents: Vec<AgentState> = self.agents.lock().unwrap().values().cloned().collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }

    pub fn agent_count(&self) -> usize {
        self.agents.lock().unwrap().len()
    }

    // ---- roles ----

    pub fn assign_role(&self, agent_id: &str, role: AgentRole) -> bool {
        let mut agents = self.agents.lock().unwrap();
        match agents.get_mut(agent_id) {
            Some(agent) => {
                agent.role = role;
                true
            }
            None => false,
        }
    }

    pub fn role(&self, agent_id: &str) -> Option<AgentRole> {
        self.agents.lock().unwrap().get(agent_id).map(|a| a.role)
    }

    pub fn agents_by_role(&self, role: AgentRole) -> Vec<String> {
        let mut ids: Vec<String> = self
            .agents
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.role == role)
            .map(|a| a.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Reassigns roles by descending energy, ties broken by id: the top
    /// ceil(n/10) become Leaders, the next n/5 Scouts, then n/10 Guardians,
    /// n/10 Relays, and the rest Workers.
    pub fn reassign_roles(&self) {
        let mut agents = self.agents.lock().unwrap();
        let n = agents.len();
        if n == 0 {
            return;
        }

        let mut order: Vec<(String, Real)> = agents
            .values()
            .map(|a| (a.id.clone(), a.energy))
            .collect();
        order.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let leaders = n.div_ceil(10);
        let scouts = n / 5;
        let guardians = n / 10;
        let relays = n / 10;

        for (rank, (id, _)) in order.iter().enumerate() {
            let role = if rank < leaders {
                AgentRole::Leader
            } else if rank < leaders + scouts {
                AgentRole::Scout
            } else if rank < leaders + scouts + guardians {
                AgentRole::Guardian
            } else if rank < leaders + scouts + guardians + relays {
                AgentRole::Relay
            } else {
                AgentRole::Worker
            };
            if let Some(agent) = agents.get_mut(id) {
                agent.role = role;
            }
        }
    }

    // ---- decisions ----

    /// A decision pre-filled with the configured mode and threshold.
    pub fn default_decision(&self, description: impl Into<String>) -> Decision {
        let mut decision = Decision::new("", self.config.default_decision_mode);
        decision.description = description.into();
        decision.threshold = self.config.consensus_threshold;
        decision
    }

    /// Registers a decision for processing; assigns an id when missing and
    /// falls back to the configured threshold when none was set.
    pub fn propose_decision(&self, mut decision: Decision) -> String {
        if decision.id.is_empty() {
            decision.id = self.next_id("decision");
        }
        if decision.threshold <= 0.0 {
            decision.threshold = self.config.consensus_threshold;
        }
        decision.timestamp = self.now_ms();
        decision.finalized = false;
        let id = decision.id.clone();
        self.decisions.lock().unwrap().insert(id.clone(), decision);
        id
    }

    /// Records a vote. Finalized decisions are immutable.
    pub fn vote_on_decision(
        &self,
        decision_id: &str,
        agent_id: &str,
        confidence: Real,
    ) -> Result<(), SimError> {
        let mut decisions = self.decisions.lock().unwrap();
        let decision = decisions
            .get_mut(decision_id)
            .ok_or_else(|| SimError::invalid(format!("unknown decision '{decision_id}'")))?;
        if decision.finalized {
            return Err(SimError::invalid("decision already finalized"));
        }
        decision.votes.insert(agent_id.to_string(), confidence);
        Ok(())
    }

    pub fn decision(&self, decision_id: &str) -> Option<Decision> {
        self.decisions.lock().unwrap().get(decision_id).cloned()
    }

    pub fn pending_decisions(&self) -> Vec<Decision> {
        let mut pending: Vec<Decision> = self
            .decisions
            .lock()
            .unwrap()
            .values()
            .filter(|d| !d.finalized)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.id.cmp(&b.id));
        pending
    }

    /// Per-tick decision processing, by mode: Centralized finalizes as
    /// approved on any vote; Distributed finalizes immediately; Consensus
    /// waits for every participant, then applies the mean-vs-threshold rule.
    fn process_decisions(&self) {
        let mut decisions = self.decisions.lock().unwrap();
        for decision in decisions.values_mut() {
            if decision.finalized {
                continue;
            }
            match decision.mode {
                DecisionMode::Centralized => {
                    if !decision.votes.is_empty() {
                        decision.finalized = true;
                        decision.outcome = "approved".to_string();
                    }
                }
                DecisionMode::Distributed => {
                    decision.finalized = true;
                    decision.outcome = "distributed".to_string();
                }
                DecisionMode::Consensus => {
                    if !decision.participants.is_empty()
                        && decision.votes.len() >= decision.participants.len()
                    {
                        decision.finalized = true;
                        decision.outcome = if decision.mean_confidence() >= decision.threshold {
                            "approved".to_string()
                        } else {
                            "rejected".to_string()
                        };
                    }
                }
                DecisionMode::Hierarchical | DecisionMode::Democratic => {}
            }
        }
    }

    // ---- tasks ----

    pub fn create_task(&self, mut task: Task) -> String {
        if task.id.is_empty() {
            task.id = self.next_id("task");
        }
        let id = task.id.clone();
        self.tasks.lock().unwrap().insert(id.clone(), task);
        id
    }

    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.tasks.lock().unwrap().get(task_id).cloned()
    }

    pub fn tasks_by_agent(&self, agent_id: &str) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.assigned.iter().any(|a| a == agent_id))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        tasks
    }

    pub fn pending_tasks(&self) -> Vec<Task> {
        let mut pending: Vec<Task> = self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.id.cmp(&b.id));
        pending
    }

    /// Records progress. Completion is clamped to [0, 1]; reaching 1 marks
    /// the task completed.
    pub fn update_task_progress(&self, task_id: &str, completion: Real) -> Result<(), SimError> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| SimError::invalid(format!("unknown task '{task_id}'")))?;
        if matches!(task.status, TaskStatus::Completed | TaskStatus::Failed) {
            return Err(SimError::invalid("task already finished"));
        }
        task.completion = completion.clamp(0.0, 1.0);
        task.status = if task.completion >= 1.0 {
            TaskStatus::Completed
        } else {
            TaskStatus::InProgress
        };
        Ok(())
    }

    pub fn complete_task(&self, task_id: &str) -> Result<(), SimError> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| SimError::invalid(format!("unknown task '{task_id}'")))?;
        task.completion = 1.0;
        task.status = TaskStatus::Completed;
        Ok(())
    }

    pub fn fail_task(&self, task_id: &str) -> Result<(), SimError> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| SimError::invalid(format!("unknown task '{task_id}'")))?;
        task.status = TaskStatus::Failed;
        Ok(())
    }

    /// Fitness of an agent for a task:
    /// sum of its required-capability scores, discounted by distance
    /// (1/(1+0.01 d)), scaled by energy and by 1/(1+assigned). An agent
    /// missing any required capability scores zero.
    fn task_fitness(task: &Task, agent: &AgentState) -> Real {
        let mut fitness = 0.0;
        for capability in &task.required_capabilities {
            match agent.capabilities.get(capability) {
                Some(score) => fitness += score,
                None => return 0.0,
            }
        }
        let distance = (agent.position - task.location).norm();
        fitness *= 1.0 / (1.0 + 0.01 * distance);
        fitness *= agent.energy;
        fitness *= 1.0 / (1.0 + agent.assigned_tasks.len() as Real);
        fitness
    }

    /// Assigns every pending task to its single best-fit agent; ties go to
    /// the smallest agent id.
    pub fn allocate_tasks(&self) {
        let mut tasks = self.tasks.lock().unwrap();
        let mut agents = self.agents.lock().unwrap();

        let mut pending_ids: Vec<String> = tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .map(|t| t.id.clone())
            .collect();
        pending_ids.sort();

        for task_id in pending_ids {
            let task = tasks.get(&task_id).cloned().expect("pending id just listed");
            let mut best: Option<(String, Real)> = None;
            let mut ids: Vec<&String> = agents.keys().collect();
            ids.sort();
            for id in ids {
                let agent = &agents[id];
                let fitness = Self::task_fitness(&task, agent);
                if fitness <= 0.0 {
                    continue;
                }
                let better = match &best {
                    None => true,
                    Some((_, best_fitness)) => fitness > *best_fitness,
                };
                if better {
                    best = Some((id.clone(), fitness));
                }
            }
            if let Some((winner, fitness)) = best {
                let task = tasks.get_mut(&task_id).expect("pending id just listed");
                task.assigned = vec![winner.clone()];
                task.status = TaskStatus::Assigned;
                if let Some(agent) = agents.get_mut(&winner) {
                    agent.assigned_tasks.push(task_id.clone());
                }
                debug!(task = %task_id, agent = %winner, fitness, "task allocated");
            }
        }
    }

    // ---- collective intelligence ----

    /// Arithmetic mean of agent positions.
    pub fn swarm_centroid(&self) -> Vector3r {
        let agents = self.agents.lock().unwrap();
        if agents.is_empty() {
            return Vector3r::zeros();
        }
        let sum: Vector3r = agents.values().map(|a| a.position).sum();
        sum / agents.len() as Real
    }

    /// 1/(1 + 0.1 * mean distance to centroid), in (0, 1].
    pub fn swarm_cohesion(&self) -> Real {
        let agents = self.agents.lock().unwrap();
        if agents.len() < 2 {
            return 0.0;
        }
        let centroid = {
            let sum: Vector3r = agents.values().map(|a| a.position).sum();
            sum / agents.len() as Real
        };
        let mean_distance: Real = agents
            .values()
            .map(|a| (a.position - centroid).norm())
            .sum::<Real>()
            / agents.len() as Real;
        1.0 / (1.0 + 0.1 * mean_distance)
    }

    /// Root-mean-square distance to the centroid.
    pub fn swarm_dispersion(&self) -> Real {
        let agents = self.agents.lock().unwrap();
        if agents.len() < 2 {
            return 0.0;
        }
        let centroid = {
            let sum: Vector3r = agents.values().map(|a| a.position).sum();
            sum / agents.len() as Real
        };
        let sum_sq: Real = agents
            .values()
            .map(|a| (a.position - centroid).norm_squared())
            .sum();
        (sum_sq / agents.len() as Real).sqrt()
    }

    /// Mean agent velocity.
    pub fn swarm_velocity(&self) -> Vector3r {
        let agents = self.agents.lock().unwrap();
        if agents.is_empty() {
            return Vector3r::zeros();
        }
        let sum: Vector3r = agents.values().map(|a| a.velocity).sum();
        sum / agents.len() as Real
    }

    /// Sum of capability scores across the swarm.
    pub fn assess_capabilities(&self) -> HashMap<String, Real> {
        let agents = self.agents.lock().unwrap();
        let mut capabilities: HashMap<String, Real> = HashMap::new();
        for agent in agents.values() {
            for (name, score) in &agent.capabilities {
                *capabilities.entry(name.clone()).or_insert(0.0) += score;
            }
        }
        capabilities
    }

    /// Detects collective patterns: Aggregation when dispersion drops below
    /// 10 m (strength 1 - dispersion/10), Formation when cohesion exceeds
    /// 0.7 (strength = cohesion). Needs at least three agents.
    pub fn detect_emergent_behaviors(&self) -> Vec<EmergentBehavior> {
        if self.agent_count() < 3 {
            return Vec::new();
        }
        let mut detected = Vec::new();
        let now = self.now_ms();

        let dispersion = self.swarm_dispersion();
        if dispersion < 10.0 {
            detected.push(EmergentBehavior {
                id: self.next_id("aggregation"),
                behavior_type: BehaviorType::Aggregation,
                strength: 1.0 - dispersion / 10.0,
                start_timestamp: now,
            });
        }

        let cohesion = self.swarm_cohesion();
        if cohesion > 0.7 {
            detected.push(EmergentBehavior {
                id: self.next_id("formation"),
                behavior_type: BehaviorType::Formation,
                strength: cohesion,
                start_timestamp: now,
            });
        }

        detected
    }

    pub fn active_behaviors(&self) -> Vec<EmergentBehavior> {
        self.behaviors.lock().unwrap().clone()
    }
}
