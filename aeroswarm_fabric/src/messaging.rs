//! Peer messaging, proposals and consensus votes.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::debug;

use aeroswarm_core::clock::{SimClock, TimePoint};
use aeroswarm_core::error::SimError;
use aeroswarm_core::geom::Real;
use aeroswarm_core::sensors::SharedClock;

/// Kind of a peer message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Proposal = 0,
    Accept = 1,
    Reject = 2,
    Counter = 3,
    Request = 4,
    Response = 5,
    Broadcast = 6,
    Heartbeat = 7,
    Emergency = 8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum MessagePriority {
    Low = 0,
    #[default]
    Medium = 1,
    High = 2,
    Critical = 3,
}

/// A peer-to-peer message. An empty receiver means broadcast.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub receiver: String,
    pub message_type: MessageType,
    pub content: String,
    pub data: HashMap<String, String>,
    pub priority: MessagePriority,
    /// Milliseconds of virtual time.
    pub timestamp: u64,
    /// Seconds to live from `timestamp`.
    pub ttl_sec: u32,
}

impl Message {
    pub fn new(sender: impl Into<String>, receiver: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            sender: sender.into(),
            receiver: receiver.into(),
            message_type: MessageType::Request,
            content: String::new(),
            data: HashMap::new(),
            priority: MessagePriority::Medium,
            timestamp: 0,
            ttl_sec: 60,
        }
    }
}

/// A task proposal peers vote on. Expired proposals are dropped on tick.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub id: String,
    pub proposer: String,
    pub description: String,
    pub required_agents: Vec<String>,
    pub estimated_duration_sec: Real,
    pub priority: MessagePriority,
    /// Agent ids that accepted.
    pub votes: Vec<String>,
    /// Milliseconds of virtual time.
    pub expiry_timestamp: u64,
}

/// A consensus round over a topic.
///
/// A round finalizes only once `votes.len() >= required_votes`; the outcome
/// is then `approved` when the mean confidence reaches the threshold and
/// `rejected` otherwise. A finalized round is immutable.
#[derive(Debug, Clone)]
pub struct Consensus {
    pub id: String,
    pub topic: String,
    pub votes: HashMap<String, Real>,
    pub required_votes: u32,
    pub threshold: Real,
    pub finalized: bool,
    pub outcome: String,
    pub timestamp: u64,
}

impl Consensus {
    pub fn mean_confidence(&self) -> Real {
        if self.votes.is_empty() {
            return 0.0;
        }
        self.votes.values().sum::<Real>() / self.votes.len() as Real
    }
}

#[derive(Debug, Clone)]
pub struct MessengerConfig {
    /// Messages retained per peer inbox.
    pub message_buffer_size: usize,
    /// Default consensus threshold.
    pub consensus_threshold: Real,
    /// Peers silent longer than this are dropped, seconds.
    pub peer_timeout_sec: f64,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            message_buffer_size: 1000,
            consensus_threshold: 0.7,
            peer_timeout_sec: 10.0,
        }
    }
}

/// The swarm's message fabric: per-peer FIFO inboxes, proposal book and
/// consensus rounds.
///
/// Ordering: FIFO within a sender/receiver pair, no guarantee across
/// senders. A broadcast is delivered to every registered peer exactly once.
pub struct PeerMessenger {
    config: MessengerConfig,
    clock: SharedClock,
    id_counter: AtomicU64,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    inboxes: HashMap<String, VecDeque<Message>>,
    proposals: HashMap<String, Proposal>,
    consensus: HashMap<String, Consensus>,
    /// peer id -> last heartbeat, ms.
    peers: HashMap<String, u64>,
}

impl PeerMessenger {
    pub fn new(config: MessengerConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            id_counter: AtomicU64::new(0),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn now_ms(&self) -> u64 {
        self.clock.now() / 1_000_000
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.id_counter.fetch_add(1, Ordering::SeqCst);
        format!("{prefix}_{n}")
    }

    /// Adds a peer inbox. Idempotent.
    pub fn register_peer(&self, agent_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.inboxes.entry(agent_id.to_string()).or_default();
        let now = self.now_ms();
        inner.peers.insert(agent_id.to_string(), now);
    }

    pub fn unregister_peer(&self, agent_id: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.inboxes.remove(agent_id);
        inner.peers.remove(agent_id).is_some()
    }

    pub fn peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.inner.lock().unwrap().peers.keys().cloned().collect();
        peers.sort();
        peers
    }

    pub fn record_heartbeat(&self, agent_id: &str) {
        let now = self.now_ms();
        if let Some(last) = self.inner.lock().unwrap().peers.get_mut(agent_id) {
            *last = now;
        }
    }

    /// Drops peers whose last heartbeat is older than the timeout.
    pub fn check_peer_timeouts(&self) -> Vec<String> {
        let now = self.now_ms();
        let timeout_ms = (self.config.peer_timeout_sec * 1000.0) as u64;
        let mut inner = self.inner.lock().unwrap();
        let stale: Vec<String> = inner
            .peers
            .iter()
            .filter(|(_, &last)| now.saturating_sub(last) > timeout_ms)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            inner.peers.remove(id);
            inner.inboxes.remove(id);
            debug!(peer = %id, "peer timed out");
        }
        stale
    }

    // ---- messages ----

    /// Sends a message to its receiver, or to every peer when the receiver
    /// is empty. A message already past its ttl is dropped here rather than
    /// enqueued.
    pub fn send(&self, mut message: Message) -> Result<(), SimError> {
        if message.sender.is_empty() {
            return Err(SimError::invalid("message without sender"));
        }
        if message.id.is_empty() {
            message.id = self.next_id("msg");
        }
        if message.timestamp == 0 {
            message.timestamp = self.now_ms();
        }
        let expiry = message.timestamp + message.ttl_sec as u64 * 1000;
        if self.now_ms() >= expiry {
            debug!(id = %message.id, "message expired before send");
            return Ok(());
        }

        let mut inner = self.inner.lock().unwrap();
        if message.receiver.is_empty() {
            // Broadcast: exactly one copy per peer, sender excluded.
            let peers: Vec<String> = inner
                .inboxes
                .keys()
                .filter(|peer| **peer != message.sender)
                .cloned()
                .collect();
            for peer in peers {
                Self::enqueue(&mut inner, &peer, message.clone(), self.config.message_buffer_size);
            }
        } else {
            let receiver = message.receiver.clone();
            if !inner.inboxes.contains_key(&receiver) {
                return Err(SimError::invalid(format!("unknown peer '{receiver}'")));
            }
            Self::enqueue(&mut inner, &receiver, message, self.config.message_buffer_size);
        }
        Ok(())
    }

    /// Marks a message as broadcast and sends it to every peer.
    pub fn broadcast(&self, mut message: Message) -> Result<(), SimError> {
        message.receiver = String::new();
        message.message_type = MessageType::Broadcast;
        self.send(message)
    }

    fn enqueue(inner: &mut Inner, receiver: &str, message: Message, cap: usize) {
        let inbox = inner.inboxes.entry(receiver.to_string()).or_default();
        inbox.push_back(message);
        while inbox.len() > cap {
            inbox.pop_front();
        }
    }

    /// Drains every unexpired message waiting for an agent, FIFO.
    pub fn receive(&self, agent_id: &str) -> Vec<Message> {
        let now = self.now_ms();
        let mut inner = self.inner.lock().unwrap();
        let Some(inbox) = inner.inboxes.get_mut(agent_id) else {
            return Vec::new();
        };
        inbox
            .drain(..)
            .filter(|m| now < m.timestamp + m.ttl_sec as u64 * 1000)
            .collect()
    }

    /// Takes the oldest waiting message from one sender, if any.
    pub fn receive_from(&self, agent_id: &str, sender: &str) -> Option<Message> {
        let now = self.now_ms();
        let mut inner = self.inner.lock().unwrap();
        let inbox = inner.inboxes.get_mut(agent_id)?;
        let index = inbox.iter().position(|m| {
            m.sender == sender && now < m.timestamp + m.ttl_sec as u64 * 1000
        })?;
        inbox.remove(index)
    }

    pub fn pending_count(&self, agent_id: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .inboxes
            .get(agent_id)
            .map(|inbox| inbox.len())
            .unwrap_or(0)
    }

    // ---- proposals ----

    /// Registers a proposal and broadcasts it to the swarm.
    pub fn propose(&self, mut proposal: Proposal) -> Result<String, SimError> {
        if proposal.proposer.is_empty() {
            return Err(SimError::invalid("proposal without proposer"));
        }
        if proposal.id.is_empty() {
            proposal.id = self.next_id("proposal");
        }
        let id = proposal.id.clone();

        let mut message = Message::new(proposal.proposer.clone(), "");
        message.message_type = MessageType::Proposal;
        message.content = proposal.description.clone();
        message.data.insert("proposal_id".to_string(), id.clone());
        message.priority = proposal.priority;

        self.inner
            .lock()
            .unwrap()
            .proposals
            .insert(id.clone(), proposal);
        self.broadcast(message)?;
        Ok(id)
    }

    /// Records an acceptance vote and notifies the proposer.
    pub fn accept(&self, proposal_id: &str, agent_id: &str) -> Result<(), SimError> {
        let proposer = {
            let mut inner = self.inner.lock().unwrap();
            let proposal = inner
                .proposals
                .get_mut(proposal_id)
                .ok_or_else(|| SimError::invalid(format!("unknown proposal '{proposal_id}'")))?;
            if !proposal.votes.iter().any(|v| v == agent_id) {
                proposal.votes.push(agent_id.to_string());
            }
            proposal.proposer.clone()
        };
        let mut message = Message::new(agent_id, proposer);
        message.message_type = MessageType::Accept;
        message
            .data
            .insert("proposal_id".to_string(), proposal_id.to_string());
        // The proposer may already be gone; the vote still counts.
        let _ = self.send(message);
        Ok(())
    }

    /// Notifies the proposer of a rejection with a reason.
    pub fn reject(&self, proposal_id: &str, agent_id: &str, reason: &str) -> Result<(), SimError> {
        let proposer = {
            let inner = self.inner.lock().unwrap();
            inner
                .proposals
                .get(proposal_id)
                .ok_or_else(|| SimError::invalid(format!("unknown proposal '{proposal_id}'")))?
                .proposer
                .clone()
        };
        let mut message = Message::new(agent_id, proposer);
        message.message_type = MessageType::Reject;
        message.content = reason.to_string();
        message
            .data
            .insert("proposal_id".to_string(), proposal_id.to_string());
        let _ = self.send(message);
        Ok(())
    }

    pub fn get_proposal(&self, proposal_id: &str) -> Option<Proposal> {
        self.inner.lock().unwrap().proposals.get(proposal_id).cloned()
    }

    /// Proposals that have not yet expired.
    pub fn active_proposals(&self) -> Vec<Proposal> {
        let now = self.now_ms();
        let mut active: Vec<Proposal> = self
            .inner
            .lock()
            .unwrap()
            .proposals
            .values()
            .filter(|p| p.expiry_timestamp > now)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        active
    }

    pub fn cancel_proposal(&self, proposal_id: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .proposals
            .remove(proposal_id)
            .is_some()
    }

    // ---- consensus ----

    /// Opens a consensus round with the configured threshold.
    pub fn start_consensus(&self, topic: &str, required_votes: u32) -> Result<String, SimError> {
        if topic.is_empty() {
            return Err(SimError::invalid("consensus without topic"));
        }
        let id = self.next_id("consensus");
        let consensus = Consensus {
            id: id.clone(),
            topic: topic.to_string(),
            votes: HashMap::new(),
            required_votes,
            threshold: self.config.consensus_threshold,
            finalized: false,
            outcome: String::new(),
            timestamp: self.now_ms(),
        };
        self.inner
            .lock()
            .unwrap()
            .consensus
            .insert(id.clone(), consensus);
        Ok(id)
    }

    /// Casts a confidence vote. The round finalizes only when the required
    /// vote count is reached; the mean confidence then decides the outcome.
    pub fn vote(&self, consensus_id: &str, agent_id: &str, confidence: Real) -> Result<(), SimError> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(SimError::invalid("confidence must be in [0, 1]"));
        }
        let mut inner = self.inner.lock().unwrap();
        let consensus = inner
            .consensus
            .get_mut(consensus_id)
            .ok_or_else(|| SimError::invalid(format!("unknown consensus '{consensus_id}'")))?;
        if consensus.finalized {
            return Err(SimError::invalid("consensus already finalized"));
        }
        consensus.votes.insert(agent_id.to_string(), confidence);
        if consensus.votes.len() as u32 >= consensus.required_votes {
            consensus.finalized = true;
            consensus.outcome = if consensus.mean_confidence() >= consensus.threshold {
                "approved".to_string()
            } else {
                "rejected".to_string()
            };
        }
        Ok(())
    }

    pub fn consensus_status(&self, consensus_id: &str) -> Option<Consensus> {
        self.inner.lock().unwrap().consensus.get(consensus_id).cloned()
    }

    /// Rounds still collecting votes.
    pub fn active_consensus(&self) -> Vec<Consensus> {
        let mut active: Vec<Consensus> = self
            .inner
            .lock()
            .unwrap()
            .consensus
            .values()
            .filter(|c| !c.finalized)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        active
    }

    // ---- maintenance ----

    /// Per-tick housekeeping: expired proposals vanish silently.
    pub fn update(&self) {
        let now = self.now_ms();
        let mut inner = self.inner.lock().unwrap();
        inner.proposals.retain(|_, p| p.expiry_timestamp > now);
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.inboxes.clear();
        inner.proposals.clear();
        inner.consensus.clear();
        inner.peers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeroswarm_core::clock::SteppableClock;
    use std::sync::Arc;

    fn messenger() -> (Arc<SteppableClock>, PeerMessenger) {
        let clock = Arc::new(SteppableClock::new(1_000_000, 1.0));
        let shared: SharedClock = clock.clone();
        let messenger = PeerMessenger::new(MessengerConfig::default(), shared);
        for peer in ["a", "b", "c"] {
            messenger.register_peer(peer);
        }
        (clock, messenger)
    }

    #[test]
    fn test_per_sender_fifo_order() {
        let (_clock, messenger) = messenger();
        for i in 0..5 {
            let mut m = Message::new("a", "b");
            m.content = format!("m{i}");
            messenger.send(m).unwrap();
        }
        let received = messenger.receive("b");
        let contents: Vec<&str> = received.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m0", "m1", "m2", "m3", "m4"]);
    }

    #[test]
    fn test_broadcast_delivered_exactly_once_per_peer() {
        let (_clock, messenger) = messenger();
        let mut m = Message::new("a", "");
        m.content = "hello".into();
        messenger.broadcast(m).unwrap();
        assert_eq!(messenger.receive("b").len(), 1);
        assert_eq!(messenger.receive("c").len(), 1);
        // The sender does not hear its own broadcast.
        assert!(messenger.receive("a").is_empty());
    }

    #[test]
    fn test_expired_message_dropped_on_send() {
        let (clock, messenger) = messenger();
        let mut m = Message::new("a", "b");
        m.ttl_sec = 1;
        m.timestamp = 1; // already stamped long ago
        for _ in 0..2_000 {
            clock.step();
        }
        messenger.send(m).unwrap();
        assert_eq!(messenger.pending_count("b"), 0);
    }

    #[test]
    fn test_receive_from_takes_only_that_sender() {
        let (_clock, messenger) = messenger();
        messenger.send(Message::new("a", "c")).unwrap();
        messenger.send(Message::new("b", "c")).unwrap();
        let from_b = messenger.receive_from("c", "b").unwrap();
        assert_eq!(from_b.sender, "b");
        assert_eq!(messenger.pending_count("c"), 1);
    }

    #[test]
    fn test_proposal_expiry_cleanup_on_tick() {
        let (clock, messenger) = messenger();
        let id = messenger
            .propose(Proposal {
                id: String::new(),
                proposer: "a".into(),
                description: "survey the ridge".into(),
                required_agents: vec!["b".into()],
                estimated_duration_sec: 60.0,
                priority: MessagePriority::Medium,
                votes: vec![],
                expiry_timestamp: 500,
            })
            .unwrap();
        assert_eq!(messenger.active_proposals().len(), 1);
        for _ in 0..1_000 {
            clock.step();
        }
        messenger.update();
        assert!(messenger.get_proposal(&id).is_none());
    }

    #[test]
    fn test_accept_records_vote_once() {
        let (_clock, messenger) = messenger();
        let id = messenger
            .propose(Proposal {
                id: String::new(),
                proposer: "a".into(),
                description: "x".into(),
                required_agents: vec![],
                estimated_duration_sec: 1.0,
                priority: MessagePriority::Medium,
                votes: vec![],
                expiry_timestamp: u64::MAX,
            })
            .unwrap();
        messenger.accept(&id, "b").unwrap();
        messenger.accept(&id, "b").unwrap();
        assert_eq!(messenger.get_proposal(&id).unwrap().votes, vec!["b"]);
        // The proposer got the accept notification.
        let inbox = messenger.receive("a");
        assert!(inbox
            .iter()
            .any(|m| m.message_type == MessageType::Accept));
    }

    #[test]
    fn test_consensus_requires_votes_then_threshold() {
        let (_clock, messenger) = messenger();
        let id = messenger.start_consensus("land at base", 3).unwrap();

        messenger.vote(&id, "a", 0.8).unwrap();
        messenger.vote(&id, "b", 0.9).unwrap();
        // Two of three votes: still open even though the mean is high.
        assert!(!messenger.consensus_status(&id).unwrap().finalized);

        messenger.vote(&id, "c", 0.6).unwrap();
        let done = messenger.consensus_status(&id).unwrap();
        assert!(done.finalized);
        // Mean 0.766... >= 0.7.
        assert_eq!(done.outcome, "approved");
    }

    #[test]
    fn test_consensus_rejects_below_threshold() {
        let (_clock, messenger) = messenger();
        let id = messenger.start_consensus("abort mission", 2).unwrap();
        messenger.vote(&id, "a", 0.2).unwrap();
        messenger.vote(&id, "b", 0.5).unwrap();
        let done = messenger.consensus_status(&id).unwrap();
        assert!(done.finalized);
        assert_eq!(done.outcome, "rejected");
    }

    #[test]
    fn test_finalized_consensus_is_immutable() {
        let (_clock, messenger) = messenger();
        let id = messenger.start_consensus("topic", 1).unwrap();
        messenger.vote(&id, "a", 1.0).unwrap();
        assert!(messenger.vote(&id, "b", 0.0).is_err());
        assert_eq!(messenger.consensus_status(&id).unwrap().outcome, "approved");
    }

    #[test]
    fn test_peer_timeouts_drop_silent_peers() {
        let (clock, messenger) = messenger();
        messenger.record_heartbeat("a");
        // 20 simulated seconds of silence, beyond the 10 s timeout.
        for _ in 0..20_000 {
            clock.step();
        }
        messenger.record_heartbeat("b");
        let stale = messenger.check_peer_timeouts();
        assert!(stale.contains(&"a".to_string()));
        assert!(!stale.contains(&"b".to_string()));
    }
}
