use crate::core::types::{SimulatorId, Time, INFINITY};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy)]
pub struct ScheduledEntry {
    pub time: Time,
    pub simulator: SimulatorId,
    generation: u64,
}

impl PartialEq for ScheduledEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScheduledEntry {}

impl PartialOrd for ScheduledEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (BinaryHeap is max-heap by default)
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.simulator.cmp(&self.simulator))
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

/// Orders simulators by their next internal event time.
///
/// Each simulator has at most one live entry. Rescheduling bumps the
/// simulator's generation; older entries stay in the heap and are discarded
/// when they reach the top. Passive simulators (`INFINITY`) are not stored.
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: BinaryHeap<ScheduledEntry>,
    generations: Vec<u64>,
    times: Vec<Time>,
}

impl Scheduler {
    /// Create a scheduler for `simulators` simulators, all passive
    pub fn new(simulators: usize) -> Self {
        Self {
            queue: BinaryHeap::new(),
            generations: vec![0; simulators],
            times: vec![INFINITY; simulators],
        }
    }

    fn ensure(&mut self, simulator: SimulatorId) {
        if simulator.0 >= self.times.len() {
            self.generations.resize(simulator.0 + 1, 0);
            self.times.resize(simulator.0 + 1, INFINITY);
        }
    }

    /// Set the next internal event time of a simulator, replacing any previous one
    pub fn schedule(&mut self, simulator: SimulatorId, time: Time) {
        self.ensure(simulator);
        let generation = self.generations[simulator.0] + 1;
        self.generations[simulator.0] = generation;
        self.times[simulator.0] = time;
        if time < INFINITY {
            self.queue.push(ScheduledEntry {
                time,
                simulator,
                generation,
            });
        }
        self.purge();
    }

    /// Drop stale entries sitting on top of the heap
    fn purge(&mut self) {
        while let Some(top) = self.queue.peek() {
            if self.generations[top.simulator.0] == top.generation {
                break;
            }
            self.queue.pop();
        }
    }

    /// Minimal next internal time, `INFINITY` when every simulator is passive
    pub fn next_time(&self) -> Time {
        self.queue.peek().map_or(INFINITY, |entry| entry.time)
    }

    /// Scheduled time of one simulator
    pub fn time_of(&self, simulator: SimulatorId) -> Time {
        self.times.get(simulator.0).copied().unwrap_or(INFINITY)
    }

    /// Remove and return every simulator due at `time`, in ascending id order.
    ///
    /// Returned simulators are left passive until rescheduled.
    pub fn pop_imminent(&mut self, time: Time) -> Vec<SimulatorId> {
        let mut imminent = Vec::new();
        while let Some(top) = self.queue.peek() {
            if top.time != time {
                break;
            }
            if let Some(entry) = self.queue.pop() {
                self.generations[entry.simulator.0] += 1;
                self.times[entry.simulator.0] = INFINITY;
                imminent.push(entry.simulator);
            }
            self.purge();
        }
        imminent
    }

    /// Number of simulators with a finite next time
    pub fn active(&self) -> usize {
        self.times.iter().filter(|t| **t < INFINITY).count()
    }

    pub fn is_empty(&self) -> bool {
        self.next_time() == INFINITY
    }
}
