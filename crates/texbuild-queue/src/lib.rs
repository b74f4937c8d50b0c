use std::collections::VecDeque;

use texbuild_core::{RunnerDescriptor, RunnerId};

/// Where a newly scheduled runner goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Ahead of everything already waiting (output of an auxiliary tool).
    Front,
    /// Behind everything already waiting, still before the next core pass.
    Back,
}

/// Runners waiting to be started, each id at most once.
#[derive(Clone, Debug, Default)]
pub struct PendingQueue {
    runners: VecDeque<RunnerDescriptor>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &RunnerId) -> bool {
        self.runners.iter().any(|r| &r.id == id)
    }

    /// Schedules `runner` unless its id is already waiting; an existing entry keeps its position.
    /// Returns whether the runner was added.
    pub fn enqueue(&mut self, runner: RunnerDescriptor, placement: Placement) -> bool {
        if self.contains(&runner.id) {
            return false;
        }
        match placement {
            Placement::Front => self.runners.push_front(runner),
            Placement::Back => self.runners.push_back(runner),
        }
        true
    }

    pub fn dequeue(&mut self) -> Option<RunnerDescriptor> {
        self.runners.pop_front()
    }

    pub fn ids(&self) -> impl Iterator<Item = &RunnerId> {
        self.runners.iter().map(|r| &r.id)
    }

    pub fn len(&self) -> usize {
        self.runners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }
}
