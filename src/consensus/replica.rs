use std::collections::{HashMap, HashSet};

use log::{debug, info};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::consensus::{LeaderScheduler, Pacemaker, SafetyRules, VoteCollector};
use crate::message::{Message, MessageKind, Payload};
use crate::network::SimulatedNetwork;
use crate::simulation::SimulationEvent;
use crate::storage::BlockStore;
use crate::types::{Block, FaultKind, Hash, PartialSignature, Phase, QuorumCert};

/// Serializable snapshot of a replica for hosts and experiment exports.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplicaStateView {
    pub replica_id: u64,
    pub current_view: u64,
    pub current_phase: Phase,
    pub is_leader: bool,
    pub fault_type: FaultKind,
    pub locked_view: Option<u64>,
    pub prepare_qc_view: Option<u64>,
    pub pending_block_hash: Option<Hash>,
    pub last_voted_view: Option<u64>,
    pub committed_count: usize,
    pub last_committed_hash: Option<Hash>,
}

/// One Basic HotStuff replica.
///
/// Owns its block store, vote collector, safety rules, and pacemaker. All
/// outbound traffic goes through the engine-owned network; all inbound
/// traffic arrives through `handle_message`. Handlers are total: anything
/// invalid is dropped locally and the replica keeps running.
pub struct Replica {
    id: u64,
    quorum: usize,
    current_view: u64,
    current_phase: Phase,
    locked_qc: Option<QuorumCert>,
    prepare_qc: Option<QuorumCert>,
    pending_block: Option<Block>,
    last_voted_view: Option<u64>,
    committed_blocks: Vec<Block>,
    committed_hashes: HashSet<Hash>,
    fault: FaultKind,
    store: BlockStore,
    collector: VoteCollector,
    safety: SafetyRules,
    leader_scheduler: LeaderScheduler,
    pacemaker: Pacemaker,
    // new-view messages keyed by view; senders deduplicated
    new_views: HashMap<u64, Vec<(u64, Option<QuorumCert>)>>,
    command_counter: u64,
    last_proposed_view: u64,
    message_counter: u64,
    fault_rng: ChaCha8Rng,
    view_start_times: HashMap<u64, u64>,
}

impl Replica {
    pub fn new(id: u64, settings: &Settings) -> Self {
        let fault_rng = match settings.random_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed.wrapping_add(id)),
            None => ChaCha8Rng::from_os_rng(),
        };
        Self {
            id,
            quorum: settings.quorum_size(),
            current_view: 0,
            current_phase: Phase::NewView,
            locked_qc: None,
            prepare_qc: None,
            pending_block: None,
            last_voted_view: None,
            committed_blocks: Vec::new(),
            committed_hashes: HashSet::new(),
            fault: FaultKind::None,
            store: BlockStore::new(),
            collector: VoteCollector::new(settings.quorum_size()),
            safety: SafetyRules::new(),
            leader_scheduler: LeaderScheduler::new(settings.num_replicas),
            pacemaker: Pacemaker::from_settings(settings),
            new_views: HashMap::new(),
            command_counter: 0,
            last_proposed_view: 0,
            message_counter: 0,
            fault_rng,
            view_start_times: HashMap::new(),
        }
    }

    pub fn current_view(&self) -> u64 {
        self.current_view
    }

    pub fn current_phase(&self) -> Phase {
        self.current_phase
    }

    pub fn fault(&self) -> FaultKind {
        self.fault
    }

    pub fn set_fault(&mut self, fault: FaultKind) {
        self.fault = fault;
    }

    pub fn locked_qc(&self) -> Option<&QuorumCert> {
        self.locked_qc.as_ref()
    }

    pub fn prepare_qc(&self) -> Option<&QuorumCert> {
        self.prepare_qc.as_ref()
    }

    pub fn committed_blocks(&self) -> &[Block] {
        &self.committed_blocks
    }

    pub fn view_start_time(&self, view: u64) -> Option<u64> {
        self.view_start_times.get(&view).copied()
    }

    pub fn state_view(&self) -> ReplicaStateView {
        ReplicaStateView {
            replica_id: self.id,
            current_view: self.current_view,
            current_phase: self.current_phase,
            is_leader: self.leader_scheduler.is_leader(self.id, self.current_view),
            fault_type: self.fault,
            locked_view: self.locked_qc.as_ref().map(|qc| qc.view),
            prepare_qc_view: self.prepare_qc.as_ref().map(|qc| qc.view),
            pending_block_hash: self.pending_block.as_ref().map(|b| b.hash),
            last_voted_view: self.last_voted_view,
            committed_count: self.committed_blocks.len(),
            last_committed_hash: self.committed_blocks.last().map(|b| b.hash),
        }
    }

    // pacemaker surface used by the engine

    pub fn start_timer(&mut self, view: u64, now: u64) -> u64 {
        self.pacemaker.start_timer(view, now)
    }

    pub fn stop_timer(&mut self) {
        self.pacemaker.stop_timer();
    }

    pub fn pacemaker_on_timeout(&mut self, now: u64) -> u64 {
        self.pacemaker.on_timeout(now)
    }

    pub fn pacemaker_on_view_success(&mut self, view: u64, duration_ms: u64) {
        self.pacemaker.on_view_success(view, duration_ms);
    }

    /// Enter view `v`: send new-view to its leader and report the change.
    pub fn start_view(
        &mut self,
        view: u64,
        now: u64,
        network: &mut SimulatedNetwork,
    ) -> Vec<SimulationEvent> {
        match self.fault {
            FaultKind::Crash => return Vec::new(),
            FaultKind::Silent => {
                self.enter_view(view, now);
                return vec![SimulationEvent::ByzantineAction {
                    replica_id: self.id,
                    action: "withheld_new_view".to_string(),
                    view,
                    timestamp: now,
                }];
            }
            FaultKind::RandomDrop => {
                if self.fault_rng.random_bool(0.5) {
                    self.enter_view(view, now);
                    return vec![SimulationEvent::ByzantineAction {
                        replica_id: self.id,
                        action: "dropped_start_view".to_string(),
                        view,
                        timestamp: now,
                    }];
                }
            }
            FaultKind::None | FaultKind::DoubleVote => {}
        }

        self.enter_view(view, now);
        let leader = self.leader_scheduler.leader(view);
        let justify_qc = self.prepare_qc.clone();

        let message = self.make_message(
            Payload::NewView {
                justify_qc: justify_qc.clone(),
            },
            Some(leader),
            now,
        );
        network.send(message, leader, now);

        let mut events = vec![SimulationEvent::ViewChange {
            replica_id: self.id,
            new_view: view,
            timestamp: now,
        }];

        if leader == self.id {
            // self-send: the leader counts as one new-view participant
            self.append_new_view(view, self.id, justify_qc);
            events.extend(self.try_propose(now, network));
        }

        events
    }

    /// Route an incoming message. Total: invalid input is dropped, never
    /// propagated.
    pub fn handle_message(
        &mut self,
        message: &Message,
        now: u64,
        network: &mut SimulatedNetwork,
    ) -> Vec<SimulationEvent> {
        match self.fault {
            FaultKind::Crash => return Vec::new(),
            FaultKind::Silent => {
                return vec![SimulationEvent::ByzantineAction {
                    replica_id: self.id,
                    action: "ignored_message".to_string(),
                    view: self.current_view,
                    timestamp: now,
                }];
            }
            FaultKind::RandomDrop => {
                if self.fault_rng.random_bool(0.5) {
                    return vec![SimulationEvent::ByzantineAction {
                        replica_id: self.id,
                        action: "dropped_message".to_string(),
                        view: self.current_view,
                        timestamp: now,
                    }];
                }
            }
            FaultKind::None | FaultKind::DoubleVote => {}
        }

        if message.view < self.current_view {
            debug!(
                "replica {} ignoring {} from view {} (now in view {})",
                self.id,
                message.kind(),
                message.view,
                self.current_view
            );
            return Vec::new();
        }

        if let Err(error) = message.validate(self.quorum) {
            debug!("replica {} dropping message: {}", self.id, error);
            return Vec::new();
        }

        match message.payload.clone() {
            Payload::NewView { justify_qc } => {
                self.handle_new_view(message.sender, message.view, justify_qc, now, network)
            }
            Payload::Prepare { block, high_qc } => self.handle_prepare(block, high_qc, now, network),
            Payload::PrepareVote { signature, .. } => self.handle_vote(signature, now, network),
            Payload::PreCommit { prepare_qc } => self.handle_precommit(prepare_qc, now, network),
            Payload::PreCommitVote { signature, .. } => self.handle_vote(signature, now, network),
            Payload::Commit { precommit_qc } => self.handle_commit(precommit_qc, now, network),
            Payload::CommitVote { signature, .. } => self.handle_vote(signature, now, network),
            Payload::Decide { commit_qc } => self.handle_decide(commit_qc, now),
        }
    }

    fn enter_view(&mut self, view: u64, now: u64) {
        let old_view = self.current_view;
        self.current_view = view;
        self.current_phase = Phase::NewView;
        self.view_start_times.insert(view, now);
        self.new_views.retain(|&v, _| v >= view);
        if old_view < view {
            self.collector.clear_view(old_view);
        }
    }

    fn append_new_view(&mut self, view: u64, sender: u64, justify_qc: Option<QuorumCert>) {
        let entry = self.new_views.entry(view).or_default();
        if entry.iter().any(|(id, _)| *id == sender) {
            return;
        }
        entry.push((sender, justify_qc));
    }

    fn handle_new_view(
        &mut self,
        sender: u64,
        view: u64,
        justify_qc: Option<QuorumCert>,
        now: u64,
        network: &mut SimulatedNetwork,
    ) -> Vec<SimulationEvent> {
        if !self.leader_scheduler.is_leader(self.id, view) {
            return Vec::new();
        }

        self.append_new_view(view, sender, justify_qc);
        debug!(
            "leader {} collected {}/{} new-view messages for view {}",
            self.id,
            self.new_views.get(&view).map_or(0, Vec::len),
            self.quorum,
            view
        );

        if view == self.current_view {
            self.try_propose(now, network)
        } else {
            Vec::new()
        }
    }

    fn try_propose(&mut self, now: u64, network: &mut SimulatedNetwork) -> Vec<SimulationEvent> {
        let view = self.current_view;
        if self.last_proposed_view >= view {
            return Vec::new();
        }
        let collected = match self.new_views.get(&view) {
            Some(collected) if collected.len() >= self.quorum => collected,
            _ => return Vec::new(),
        };

        // highQC: the justify QC with the highest view; first one wins ties
        let mut high_qc: Option<QuorumCert> = None;
        for (_, justify) in collected {
            if let Some(qc) = justify {
                if high_qc.as_ref().is_none_or(|best| qc.view > best.view) {
                    high_qc = Some(qc.clone());
                }
            }
        }

        let parent = high_qc
            .as_ref()
            .and_then(|qc| self.store.get(&qc.block_hash))
            .cloned()
            .unwrap_or_else(|| self.store.genesis().clone());

        self.command_counter += 1;
        let command = format!("cmd_{}_{}", view, self.command_counter);
        let block = Block::create_leaf(&parent, command, self.id, view);
        self.store.insert(block.clone());
        self.safety.register_block(&block);
        self.last_proposed_view = view;

        info!(
            "leader {} proposed block {} at height {} in view {}",
            self.id,
            block.hash.short(),
            block.height,
            view
        );

        let message = self.make_message(
            Payload::Prepare {
                block: block.clone(),
                high_qc,
            },
            None,
            now,
        );
        network.broadcast(message, self.id, now, false);

        self.pending_block = Some(block.clone());
        self.current_phase = Phase::Prepare;
        self.last_voted_view = Some(view);

        let mut events = vec![SimulationEvent::Proposal {
            replica_id: self.id,
            block_hash: block.hash,
            view,
            timestamp: now,
        }];

        // the leader's own prepare vote
        let signature = PartialSignature::new(self.id, Phase::Prepare, view, block.hash);
        if let Some(qc) = self.collector.add_vote(signature) {
            events.extend(self.on_prepare_qc(qc, now, network));
        }
        events
    }

    fn handle_prepare(
        &mut self,
        block: Block,
        high_qc: Option<QuorumCert>,
        now: u64,
        network: &mut SimulatedNetwork,
    ) -> Vec<SimulationEvent> {
        self.store.insert(block.clone());
        self.safety.register_block(&block);
        self.pending_block = Some(block.clone());
        self.current_phase = Phase::Prepare;

        if !self
            .safety
            .is_safe_node(&block, high_qc.as_ref(), self.locked_qc.as_ref())
        {
            debug!(
                "replica {} refuses to vote: block {} fails safeNode",
                self.id,
                block.hash.short()
            );
            return Vec::new();
        }
        if self
            .last_voted_view
            .is_some_and(|last| self.current_view <= last)
        {
            debug!(
                "replica {} already voted in view {}",
                self.id,
                self.last_voted_view.unwrap()
            );
            return Vec::new();
        }

        let view = self.current_view;
        let leader = self.leader_scheduler.leader(view);
        let signature = PartialSignature::new(self.id, Phase::Prepare, view, block.hash);
        let vote = self.make_message(
            Payload::PrepareVote {
                block_hash: block.hash,
                signature,
            },
            Some(leader),
            now,
        );
        network.send(vote, leader, now);
        self.last_voted_view = Some(view);

        let mut events = vec![SimulationEvent::VoteSend {
            replica_id: self.id,
            vote_type: MessageKind::PrepareVote,
            block_hash: block.hash,
            timestamp: now,
        }];

        if self.fault == FaultKind::DoubleVote {
            events.extend(self.send_conflicting_vote(&block, leader, now, network));
        }
        events
    }

    /// DoubleVote fault: also vote for a conflicting block in the same
    /// (view, phase), fabricated from the same parent with a different
    /// command so its hash differs.
    fn send_conflicting_vote(
        &mut self,
        block: &Block,
        leader: u64,
        now: u64,
        network: &mut SimulatedNetwork,
    ) -> Vec<SimulationEvent> {
        let view = self.current_view;
        let parent = match block.parent_hash.and_then(|hash| self.store.get(&hash)) {
            Some(parent) => parent.clone(),
            None => return Vec::new(),
        };

        let conflicting = Block::create_leaf(
            &parent,
            format!("conflict_{}_{}", view, self.id),
            self.id,
            view,
        );
        self.store.insert(conflicting.clone());
        let signature = PartialSignature::new(self.id, Phase::Prepare, view, conflicting.hash);
        let vote = self.make_message(
            Payload::PrepareVote {
                block_hash: conflicting.hash,
                signature,
            },
            Some(leader),
            now,
        );
        network.send(vote, leader, now);

        vec![SimulationEvent::ByzantineAction {
            replica_id: self.id,
            action: "double_vote".to_string(),
            view,
            timestamp: now,
        }]
    }

    /// Vote handling is leader-only; the phase is carried by the signature.
    fn handle_vote(
        &mut self,
        signature: PartialSignature,
        now: u64,
        network: &mut SimulatedNetwork,
    ) -> Vec<SimulationEvent> {
        if !self.leader_scheduler.is_leader(self.id, self.current_view) {
            return Vec::new();
        }
        if signature.view != self.current_view {
            debug!(
                "leader {} ignoring {} vote for view {} (now in view {})",
                self.id, signature.phase, signature.view, self.current_view
            );
            return Vec::new();
        }

        let qc = match self.collector.add_vote(signature) {
            Some(qc) => qc,
            None => return Vec::new(),
        };

        match qc.phase {
            Phase::Prepare => self.on_prepare_qc(qc, now, network),
            Phase::PreCommit => self.on_precommit_qc(qc, now, network),
            Phase::Commit => self.on_commit_qc(qc, now, network),
            _ => Vec::new(),
        }
    }

    fn on_prepare_qc(
        &mut self,
        qc: QuorumCert,
        now: u64,
        network: &mut SimulatedNetwork,
    ) -> Vec<SimulationEvent> {
        let view = self.current_view;
        self.update_prepare_qc(qc.clone());
        info!("leader {} formed prepareQC in view {}", self.id, view);

        let message = self.make_message(Payload::PreCommit { prepare_qc: qc.clone() }, None, now);
        network.broadcast(message, self.id, now, false);
        self.current_phase = Phase::PreCommit;

        let mut events = vec![SimulationEvent::QcFormation {
            replica_id: self.id,
            qc_type: Phase::Prepare,
            view,
            timestamp: now,
        }];

        let signature = PartialSignature::new(self.id, Phase::PreCommit, view, qc.block_hash);
        if let Some(next_qc) = self.collector.add_vote(signature) {
            events.extend(self.on_precommit_qc(next_qc, now, network));
        }
        events
    }

    fn on_precommit_qc(
        &mut self,
        qc: QuorumCert,
        now: u64,
        network: &mut SimulatedNetwork,
    ) -> Vec<SimulationEvent> {
        let view = self.current_view;
        let mut events = vec![SimulationEvent::QcFormation {
            replica_id: self.id,
            qc_type: Phase::PreCommit,
            view,
            timestamp: now,
        }];

        if self.update_locked_qc(qc.clone()) {
            info!("leader {} locked on block {} in view {}", self.id, qc.block_hash.short(), view);
            events.push(SimulationEvent::LockUpdate {
                replica_id: self.id,
                locked_view: qc.view,
                timestamp: now,
            });
        }

        let message = self.make_message(
            Payload::Commit {
                precommit_qc: qc.clone(),
            },
            None,
            now,
        );
        network.broadcast(message, self.id, now, false);
        self.current_phase = Phase::Commit;

        let signature = PartialSignature::new(self.id, Phase::Commit, view, qc.block_hash);
        if let Some(next_qc) = self.collector.add_vote(signature) {
            events.extend(self.on_commit_qc(next_qc, now, network));
        }
        events
    }

    fn on_commit_qc(
        &mut self,
        qc: QuorumCert,
        now: u64,
        network: &mut SimulatedNetwork,
    ) -> Vec<SimulationEvent> {
        let view = self.current_view;
        info!("leader {} formed commitQC, broadcasting DECIDE", self.id);

        let message = self.make_message(Payload::Decide { commit_qc: qc.clone() }, None, now);
        network.broadcast(message, self.id, now, false);
        self.current_phase = Phase::Decide;

        let mut events = vec![SimulationEvent::QcFormation {
            replica_id: self.id,
            qc_type: Phase::Commit,
            view,
            timestamp: now,
        }];
        events.extend(self.execute_branch(qc.block_hash, now));
        events
    }

    fn handle_precommit(
        &mut self,
        prepare_qc: QuorumCert,
        now: u64,
        network: &mut SimulatedNetwork,
    ) -> Vec<SimulationEvent> {
        let view = self.current_view;
        let block_hash = prepare_qc.block_hash;
        self.update_prepare_qc(prepare_qc);
        self.current_phase = Phase::PreCommit;

        let leader = self.leader_scheduler.leader(view);
        let signature = PartialSignature::new(self.id, Phase::PreCommit, view, block_hash);
        let vote = self.make_message(
            Payload::PreCommitVote {
                block_hash,
                signature,
            },
            Some(leader),
            now,
        );
        network.send(vote, leader, now);

        vec![SimulationEvent::VoteSend {
            replica_id: self.id,
            vote_type: MessageKind::PreCommitVote,
            block_hash,
            timestamp: now,
        }]
    }

    fn handle_commit(
        &mut self,
        precommit_qc: QuorumCert,
        now: u64,
        network: &mut SimulatedNetwork,
    ) -> Vec<SimulationEvent> {
        let view = self.current_view;
        let block_hash = precommit_qc.block_hash;
        let locked_view = precommit_qc.view;
        let locked = self.update_locked_qc(precommit_qc);
        self.current_phase = Phase::Commit;

        let leader = self.leader_scheduler.leader(view);
        let signature = PartialSignature::new(self.id, Phase::Commit, view, block_hash);
        let vote = self.make_message(
            Payload::CommitVote {
                block_hash,
                signature,
            },
            Some(leader),
            now,
        );
        network.send(vote, leader, now);

        let mut events = Vec::new();
        if locked {
            events.push(SimulationEvent::LockUpdate {
                replica_id: self.id,
                locked_view,
                timestamp: now,
            });
        }
        events.push(SimulationEvent::VoteSend {
            replica_id: self.id,
            vote_type: MessageKind::CommitVote,
            block_hash,
            timestamp: now,
        });
        events
    }

    fn handle_decide(&mut self, commit_qc: QuorumCert, now: u64) -> Vec<SimulationEvent> {
        self.current_phase = Phase::Decide;
        self.execute_branch(commit_qc.block_hash, now)
    }

    /// Commit the certified block and its uncommitted ancestors, lowest
    /// height first. The branch must be anchored: the walk has to reach
    /// genesis or an already committed block, otherwise committing would
    /// leave a height gap, so nothing is committed.
    fn execute_branch(&mut self, block_hash: Hash, now: u64) -> Vec<SimulationEvent> {
        let mut to_commit: Vec<Block> = Vec::new();
        let mut cursor = Some(block_hash);
        let mut anchored = false;
        while let Some(hash) = cursor {
            if self.committed_hashes.contains(&hash) {
                anchored = true;
                break;
            }
            match self.store.get(&hash) {
                Some(block) => {
                    if block.is_genesis() {
                        anchored = true;
                        break;
                    }
                    to_commit.push(block.clone());
                    cursor = block.parent_hash;
                }
                None => break,
            }
        }
        if !anchored {
            debug!(
                "replica {} cannot execute branch from {}: unknown ancestor",
                self.id,
                block_hash.short()
            );
            return Vec::new();
        }
        to_commit.reverse();

        let mut events = Vec::new();
        for block in to_commit {
            info!(
                "replica {} executed block {} at height {}",
                self.id,
                block.hash.short(),
                block.height
            );
            self.committed_hashes.insert(block.hash);
            events.push(SimulationEvent::Commit {
                replica_id: self.id,
                block_hash: block.hash,
                height: block.height,
                timestamp: now,
            });
            self.committed_blocks.push(block);
        }
        events
    }

    /// Keep the highest known QC; lower views never replace it.
    fn update_prepare_qc(&mut self, qc: QuorumCert) {
        if self
            .prepare_qc
            .as_ref()
            .is_none_or(|current| qc.view >= current.view)
        {
            self.prepare_qc = Some(qc);
        }
    }

    /// Locks are monotone in view; returns whether the lock moved.
    fn update_locked_qc(&mut self, qc: QuorumCert) -> bool {
        if self
            .locked_qc
            .as_ref()
            .is_none_or(|current| qc.view >= current.view)
        {
            self.locked_qc = Some(qc);
            return true;
        }
        false
    }

    fn make_message(&mut self, payload: Payload, target: Option<u64>, now: u64) -> Message {
        self.message_counter += 1;
        Message {
            id: (self.id << 32) | self.message_counter,
            sender: self.id,
            view: self.current_view,
            timestamp: now,
            target,
            payload,
        }
    }
}
