//! In-memory worker factory that records every call, for pool and dispatcher
//! tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use nix::sys::signal::Signal;

use super::{SpawnSpec, Worker, WorkerFactory, WorkerId};
use crate::error::WorkerError;

const FIRST_PID: u32 = 1000;

#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub spawned: Vec<(WorkerId, SpawnSpec)>,
    pub stopped: Vec<WorkerId>,
    pub signals: Vec<(WorkerId, Signal)>,
    pub child_signals: Vec<(WorkerId, u32, Signal)>,
    pub children: BTreeMap<WorkerId, Vec<u32>>,
    /// Workers whose liveness poll reports "exited".
    pub exited: BTreeSet<WorkerId>,
    /// Workers whose stop/signal calls report the process as gone.
    pub gone: BTreeSet<WorkerId>,
    /// Workers whose stop call fails with an OS error.
    pub stop_fails: BTreeSet<WorkerId>,
    /// Remaining successful spawns before the factory starts failing.
    pub spawn_budget: Option<usize>,
}

impl MockState {
    pub fn pid_of(id: WorkerId) -> u32 {
        FIRST_PID + u32::try_from(id).unwrap()
    }

    pub fn spawned_ids(&self) -> Vec<WorkerId> {
        self.spawned.iter().map(|(id, _)| *id).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockFactory {
    pub state: Rc<RefCell<MockState>>,
}

impl MockFactory {
    pub fn new() -> (Self, Rc<RefCell<MockState>>) {
        let factory = Self::default();
        let state = Rc::clone(&factory.state);
        (factory, state)
    }
}

impl WorkerFactory for MockFactory {
    type Worker = MockWorker;

    fn spawn(&mut self, id: WorkerId, spec: &SpawnSpec) -> Result<MockWorker, WorkerError> {
        let mut state = self.state.borrow_mut();
        if let Some(budget) = state.spawn_budget.as_mut() {
            if *budget == 0 {
                return Err(WorkerError::Spawn("mock spawn budget exhausted".to_string()));
            }
            *budget -= 1;
        }
        state.spawned.push((id, spec.clone()));
        Ok(MockWorker {
            id,
            pid: MockState::pid_of(id),
            state: Rc::clone(&self.state),
        })
    }
}

#[derive(Debug)]
pub(crate) struct MockWorker {
    id: WorkerId,
    pid: u32,
    state: Rc<RefCell<MockState>>,
}

impl MockWorker {
    fn check_present(&self) -> Result<(), WorkerError> {
        if self.state.borrow().gone.contains(&self.id) {
            return Err(WorkerError::ProcessGone { pid: self.pid });
        }
        Ok(())
    }
}

impl Worker for MockWorker {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn has_exited(&mut self) -> Result<bool, WorkerError> {
        Ok(self.state.borrow().exited.contains(&self.id))
    }

    fn stop(&mut self) -> Result<(), WorkerError> {
        self.check_present()?;
        let mut state = self.state.borrow_mut();
        if state.stop_fails.contains(&self.id) {
            return Err(WorkerError::Os {
                pid: self.pid,
                source: std::io::Error::from(nix::errno::Errno::EPERM),
            });
        }
        state.stopped.push(self.id);
        Ok(())
    }

    fn send_signal(&mut self, signal: Signal) -> Result<(), WorkerError> {
        self.check_present()?;
        self.state.borrow_mut().signals.push((self.id, signal));
        Ok(())
    }

    fn send_signal_child(&mut self, pid: u32, signal: Signal) -> Result<(), WorkerError> {
        self.check_present()?;
        self.state
            .borrow_mut()
            .child_signals
            .push((self.id, pid, signal));
        Ok(())
    }

    fn send_signal_children(&mut self, signal: Signal) -> Result<(), WorkerError> {
        for pid in self.children()? {
            self.send_signal_child(pid, signal)?;
        }
        Ok(())
    }

    fn children(&self) -> Result<Vec<u32>, WorkerError> {
        Ok(self
            .state
            .borrow()
            .children
            .get(&self.id)
            .cloned()
            .unwrap_or_default())
    }

    fn info(&self) -> String {
        format!("{}: pid={} mock", self.id, self.pid)
    }
}
