use log::{debug, info};

use crate::config::Settings;
use crate::consensus::{Replica, ReplicaStateView};
use crate::error::SimError;
use crate::network::{InFlightMessage, SimulatedNetwork};
use crate::simulation::clock::SimulationClock;
use crate::simulation::scheduler::{EventScheduler, TimerEvent};
use crate::simulation::SimulationEvent;
use crate::types::FaultKind;

/// The simulation engine: wires clock, scheduler, network, and replicas,
/// and advances the world one logical event per `step`.
///
/// Single writer to every component; determinism comes from the network's
/// seeded PRNG, ascending-id iteration, and insertion-order tie-breaks.
pub struct SimulationEngine {
    settings: Settings,
    clock: SimulationClock,
    scheduler: EventScheduler,
    network: SimulatedNetwork,
    replicas: Vec<Replica>,
    history: Vec<SimulationEvent>,
    // high-water mark across replicas, for reporting only
    current_view: u64,
    is_running: bool,
    is_paused: bool,
}

impl SimulationEngine {
    pub fn new(settings: Settings) -> Result<Self, SimError> {
        settings.validate()?;

        let mut engine = Self {
            network: SimulatedNetwork::new(
                settings.network_delay_min_ms,
                settings.network_delay_max_ms,
                settings.random_seed,
            ),
            clock: SimulationClock::new(),
            scheduler: EventScheduler::new(),
            replicas: Vec::new(),
            history: Vec::new(),
            current_view: 0,
            is_running: false,
            is_paused: false,
            settings,
        };
        engine.build_world();
        Ok(engine)
    }

    fn build_world(&mut self) {
        self.replicas = (0..self.settings.num_replicas)
            .map(|id| Replica::new(id, &self.settings))
            .collect();
        for id in 0..self.settings.num_replicas {
            self.network.register_replica(id);
        }
        // ids [n - f, n) carry the configured fault
        let first_faulty = self.settings.num_replicas - self.settings.num_faulty;
        for id in first_faulty..self.settings.num_replicas {
            self.apply_fault(id, self.settings.fault_type);
        }
    }

    fn apply_fault(&mut self, replica_id: u64, fault: FaultKind) {
        let was_crashed = self.replicas[replica_id as usize].fault() == FaultKind::Crash;
        self.replicas[replica_id as usize].set_fault(fault);
        if fault == FaultKind::Crash {
            self.network.block_replica(replica_id);
        } else if was_crashed {
            self.network.unblock_replica(replica_id);
        }
        if fault.is_faulty() {
            info!("replica {} marked faulty: {}", replica_id, fault);
        }
    }

    /// Boot every replica into view 1 and arm its view timer.
    pub fn start(&mut self) -> Vec<SimulationEvent> {
        if self.is_running {
            return Vec::new();
        }
        self.is_running = true;
        let now = self.clock.current_time();

        let mut events = Vec::new();
        for id in 0..self.replicas.len() {
            let replica = &mut self.replicas[id];
            events.extend(replica.start_view(1, now, &mut self.network));
            if replica.fault() != FaultKind::Crash {
                let deadline = replica.start_timer(1, now);
                self.scheduler.push(
                    deadline,
                    TimerEvent {
                        replica_id: id as u64,
                        view: 1,
                    },
                );
            }
        }

        self.history.extend(events.iter().cloned());
        self.update_view_high_water();
        events
    }

    /// Process the next logical event: the earlier of the next network
    /// delivery and the next timer, ties going to the network. Returns the
    /// first event of the step, or None when the simulation is quiescent.
    pub fn step(&mut self) -> Option<SimulationEvent> {
        loop {
            let next_delivery = self.network.next_delivery_time();
            let next_timer = self.scheduler.peek_time();

            match (next_delivery, next_timer) {
                (None, None) => return None,
                (Some(delivery), timer) if timer.is_none_or(|t| delivery <= t) => {
                    return Some(self.process_deliveries(delivery));
                }
                _ => {
                    if let Some(event) = self.process_next_timer() {
                        return Some(event);
                    }
                    // stale or crashed-replica timer: keep popping
                }
            }
        }
    }

    fn process_deliveries(&mut self, delivery_time: u64) -> SimulationEvent {
        self.clock.advance_to(delivery_time);
        let now = self.clock.current_time();
        let mut first_event: Option<SimulationEvent> = None;

        for id in 0..self.replicas.len() {
            let messages = self.network.pending(id as u64, now);
            for message in messages {
                let receive = SimulationEvent::MessageReceive {
                    recipient_id: id as u64,
                    sender_id: message.sender,
                    message_type: message.kind(),
                    message_id: message.id,
                    timestamp: now,
                };
                first_event.get_or_insert_with(|| receive.clone());
                self.history.push(receive);

                let events =
                    self.replicas[id].handle_message(&message, now, &mut self.network);
                let committed = events
                    .iter()
                    .any(|event| matches!(event, SimulationEvent::Commit { .. }));
                self.history.extend(events);

                if committed {
                    self.advance_after_commit(id, now);
                }
            }
        }

        self.update_view_high_water();
        first_event.expect("next_delivery_time guaranteed a due message")
    }

    /// A replica that just committed completes its view: credit the
    /// pacemaker, move to the next view, and re-arm the timer. Other
    /// replicas advance on their own commit or timeout.
    fn advance_after_commit(&mut self, index: usize, now: u64) {
        let replica = &mut self.replicas[index];
        let view = replica.current_view();
        let started = replica.view_start_time(view).unwrap_or(now);
        replica.pacemaker_on_view_success(view, now - started);
        replica.stop_timer();

        let next_view = view + 1;
        debug!(
            "replica {} completed view {} in {}ms, advancing to view {}",
            index,
            view,
            now - started,
            next_view
        );

        let events = replica.start_view(next_view, now, &mut self.network);
        self.history.extend(events);

        let replica = &mut self.replicas[index];
        let deadline = replica.start_timer(next_view, now);
        self.scheduler.push(
            deadline,
            TimerEvent {
                replica_id: index as u64,
                view: next_view,
            },
        );
    }

    /// Pop one timer event; returns None when it was stale (view already
    /// left) or belonged to a crashed replica.
    fn process_next_timer(&mut self) -> Option<SimulationEvent> {
        let (time, timer) = self.scheduler.pop()?;
        let index = timer.replica_id as usize;

        if self.replicas[index].fault() == FaultKind::Crash {
            return None;
        }
        if self.replicas[index].current_view() != timer.view {
            debug!(
                "skipping stale timer for replica {} view {}",
                timer.replica_id, timer.view
            );
            return None;
        }

        self.clock.advance_to(time);
        let now = self.clock.current_time();

        let next_view = self.replicas[index].pacemaker_on_timeout(now);
        let timeout_event = SimulationEvent::Timeout {
            replica_id: timer.replica_id,
            view: timer.view,
            next_view,
            timestamp: now,
        };
        self.history.push(timeout_event.clone());

        let events = self.replicas[index].start_view(next_view, now, &mut self.network);
        self.history.extend(events);

        let deadline = self.replicas[index].start_timer(next_view, now);
        self.scheduler.push(
            deadline,
            TimerEvent {
                replica_id: timer.replica_id,
                view: next_view,
            },
        );

        self.update_view_high_water();
        Some(timeout_event)
    }

    pub fn pause(&mut self) {
        self.is_paused = true;
    }

    pub fn resume(&mut self) {
        self.is_paused = false;
    }

    /// Rebuild the world from the configured settings: fresh network,
    /// replicas, clock, and history, with configured faults re-applied.
    pub fn reset(&mut self) {
        self.network = SimulatedNetwork::new(
            self.settings.network_delay_min_ms,
            self.settings.network_delay_max_ms,
            self.settings.random_seed,
        );
        self.scheduler.clear();
        self.clock.reset();
        self.history.clear();
        self.current_view = 0;
        self.is_running = false;
        self.is_paused = false;
        self.build_world();
        info!("simulation reset");
    }

    pub fn inject_fault(&mut self, replica_id: u64, fault: FaultKind) -> Result<(), SimError> {
        if replica_id >= self.replicas.len() as u64 {
            return Err(SimError::UnknownReplica(replica_id));
        }
        self.apply_fault(replica_id, fault);
        Ok(())
    }

    pub fn clear_fault(&mut self, replica_id: u64) -> Result<(), SimError> {
        self.inject_fault(replica_id, FaultKind::None)
    }

    fn update_view_high_water(&mut self) {
        let max_view = self
            .replicas
            .iter()
            .map(Replica::current_view)
            .max()
            .unwrap_or(0);
        self.current_view = self.current_view.max(max_view);
    }

    // query surface

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn replica_states(&self) -> Vec<ReplicaStateView> {
        self.replicas.iter().map(Replica::state_view).collect()
    }

    pub fn replica(&self, replica_id: u64) -> Option<&Replica> {
        self.replicas.get(replica_id as usize)
    }

    pub fn event_history(&self) -> &[SimulationEvent] {
        &self.history
    }

    pub fn recent_events(&self, count: usize) -> &[SimulationEvent] {
        let start = self.history.len().saturating_sub(count);
        &self.history[start..]
    }

    pub fn in_flight_messages(&self) -> &[InFlightMessage] {
        self.network.in_flight_messages()
    }

    pub fn current_time(&self) -> u64 {
        self.clock.current_time()
    }

    pub fn current_view(&self) -> u64 {
        self.current_view
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }
}
