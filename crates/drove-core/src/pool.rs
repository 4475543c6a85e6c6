//! Worker pool: convergence, lifecycle and signal relay.
//!
//! A [`WorkerPool`] keeps `num_flies` workers running. Each convergence pass
//! ([`WorkerPool::reap_and_manage`]) first drops workers whose process has
//! exited, then either spawns the deficit or culls the surplus, oldest worker
//! id first. All operations run on the caller's thread; the pool does no
//! locking and schedules nothing on its own.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use nix::sys::signal::Signal;
use tracing::{debug, info, warn};

use crate::error::{PoolError, WorkerError};
use crate::util::default_working_dir;
use crate::worker::{SpawnSpec, Worker, WorkerFactory, WorkerId};

/// Construction parameters for a [`WorkerPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    /// Pool name, used in log events.
    pub name: String,
    /// Command each worker runs.
    pub command: String,
    /// Target number of workers.
    pub num_flies: usize,
    /// Pause after each spawn within one pass.
    pub warmup_delay: Duration,
    /// Working directory; the supervisor's own when `None`.
    pub working_dir: Option<PathBuf>,
    /// Run the command through the shell.
    pub shell: bool,
    /// User id for workers.
    pub uid: Option<u32>,
    /// Group id for workers.
    pub gid: Option<u32>,
    /// Reload by sending SIGHUP instead of replacing workers.
    pub send_hup: bool,
    /// Extra environment for workers.
    pub env: BTreeMap<String, String>,
    /// Create the pool in the stopped state.
    pub stopped: bool,
}

impl PoolSettings {
    /// Settings for one worker running `command`, everything else defaulted.
    #[must_use]
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            num_flies: 1,
            warmup_delay: Duration::ZERO,
            working_dir: None,
            shell: false,
            uid: None,
            gid: None,
            send_hup: false,
            env: BTreeMap::new(),
            stopped: false,
        }
    }

    /// Set the target worker count.
    #[must_use]
    pub const fn with_num_flies(mut self, num_flies: usize) -> Self {
        self.num_flies = num_flies;
        self
    }

    /// Set the pause between spawns.
    #[must_use]
    pub const fn with_warmup_delay(mut self, delay: Duration) -> Self {
        self.warmup_delay = delay;
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set shell mode.
    #[must_use]
    pub const fn with_shell(mut self, shell: bool) -> Self {
        self.shell = shell;
        self
    }

    /// Set the reload policy.
    #[must_use]
    pub const fn with_send_hup(mut self, send_hup: bool) -> Self {
        self.send_hup = send_hup;
        self
    }

    /// Set the worker environment.
    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Create the pool stopped.
    #[must_use]
    pub const fn with_stopped(mut self, stopped: bool) -> Self {
        self.stopped = stopped;
        self
    }
}

/// Outcome of relaying a signal on behalf of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDelivery {
    /// The signal was sent.
    Sent,
    /// No worker with the requested id is tracked.
    WorkerNotFound,
    /// The worker has no child with the requested pid.
    ChildNotFound,
    /// The target process no longer exists.
    ProcessGone,
}

/// A target-sized set of workers for one service.
pub struct WorkerPool<F: WorkerFactory> {
    pub(crate) name: String,
    pub(crate) command: String,
    pub(crate) num_flies: usize,
    pub(crate) warmup_delay: Duration,
    pub(crate) working_dir: PathBuf,
    pub(crate) shell: bool,
    pub(crate) uid: Option<u32>,
    pub(crate) gid: Option<u32>,
    pub(crate) send_hup: bool,
    pub(crate) env: BTreeMap<String, String>,
    stopped: bool,
    next_id: WorkerId,
    workers: BTreeMap<WorkerId, F::Worker>,
    factory: F,
}

impl<F: WorkerFactory> WorkerPool<F> {
    /// Create a pool. No worker is started until the first convergence pass.
    #[must_use]
    pub fn new(settings: PoolSettings, factory: F) -> Self {
        Self {
            name: settings.name,
            command: settings.command,
            num_flies: settings.num_flies,
            warmup_delay: settings.warmup_delay,
            working_dir: settings.working_dir.unwrap_or_else(default_working_dir),
            shell: settings.shell,
            uid: settings.uid,
            gid: settings.gid,
            send_hup: settings.send_hup,
            env: settings.env,
            stopped: settings.stopped,
            next_id: 0,
            workers: BTreeMap::new(),
            factory,
        }
    }

    /// Pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Command run by each worker.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Target worker count.
    #[must_use]
    pub const fn num_flies(&self) -> usize {
        self.num_flies
    }

    /// Whether convergence is suspended.
    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Number of tracked workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether no worker is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Tracked worker ids in ascending order.
    #[must_use]
    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.workers.keys().copied().collect()
    }

    /// Look up a tracked worker.
    #[must_use]
    pub fn worker(&self, id: WorkerId) -> Option<&F::Worker> {
        self.workers.get(&id)
    }

    /// Process-creation parameters for the next spawn.
    #[must_use]
    pub fn spawn_spec(&self) -> SpawnSpec {
        SpawnSpec {
            command: self.command.clone(),
            working_dir: self.working_dir.clone(),
            shell: self.shell,
            uid: self.uid,
            gid: self.gid,
            env: self.env.clone(),
        }
    }

    /// Drop every worker whose process has exited. No-op when stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if a liveness poll fails.
    pub fn reap(&mut self) -> Result<(), PoolError> {
        if self.stopped {
            return Ok(());
        }

        let mut exited = Vec::new();
        for (&id, worker) in &mut self.workers {
            match worker.has_exited() {
                Ok(true) | Err(WorkerError::ProcessGone { .. }) => exited.push(id),
                Ok(false) => {},
                Err(e) => return Err(e.into()),
            }
        }

        for id in exited {
            if let Some(worker) = self.workers.remove(&id) {
                debug!(pool = %self.name, worker_id = id, pid = worker.pid(), "reaped worker");
            }
        }
        Ok(())
    }

    /// Converge the worker count on `num_flies`. No-op when stopped.
    ///
    /// Spawns the deficit, pausing `warmup_delay` after each spawn, or
    /// terminates the surplus starting from the lowest worker id.
    ///
    /// # Errors
    ///
    /// Returns an error if a spawn fails or a termination fails for a reason
    /// other than the process being gone.
    pub fn manage(&mut self) -> Result<(), PoolError> {
        if self.stopped {
            return Ok(());
        }

        if self.workers.len() < self.num_flies {
            self.spawn_workers()?;
        }

        while self.workers.len() > self.num_flies {
            let Some(&oldest) = self.workers.keys().next() else {
                break;
            };
            self.terminate(oldest)?;
        }
        Ok(())
    }

    /// One standard convergence cycle: [`reap`](Self::reap) then
    /// [`manage`](Self::manage).
    ///
    /// # Errors
    ///
    /// Propagates errors from either step.
    pub fn reap_and_manage(&mut self) -> Result<(), PoolError> {
        self.reap()?;
        self.manage()
    }

    fn spawn_workers(&mut self) -> Result<(), PoolError> {
        let deficit = self.num_flies.saturating_sub(self.workers.len());
        self.spawn_batch(deficit)
    }

    fn spawn_batch(&mut self, count: usize) -> Result<(), PoolError> {
        for _ in 0..count {
            self.spawn()?;
            if !self.warmup_delay.is_zero() {
                std::thread::sleep(self.warmup_delay);
            }
        }
        Ok(())
    }

    /// Start one new worker and track it under the next worker id.
    ///
    /// # Errors
    ///
    /// Returns an error if the factory fails to create the worker. The id is
    /// consumed either way.
    pub fn spawn(&mut self) -> Result<WorkerId, PoolError> {
        self.next_id += 1;
        let id = self.next_id;
        let worker = self.factory.spawn(id, &self.spawn_spec())?;
        info!(pool = %self.name, worker_id = id, pid = worker.pid(), "running worker");
        self.workers.insert(id, worker);
        Ok(id)
    }

    /// Stop one worker and stop tracking it.
    ///
    /// The worker is removed from the pool before it is stopped, so it is gone
    /// from the pool even when stopping fails. Returns `false` if no worker
    /// with this id is tracked.
    ///
    /// # Errors
    ///
    /// Returns an error if stopping fails for a reason other than the process
    /// being gone.
    pub fn terminate(&mut self, id: WorkerId) -> Result<bool, PoolError> {
        let Some(mut worker) = self.workers.remove(&id) else {
            return Ok(false);
        };

        info!(pool = %self.name, worker_id = id, pid = worker.pid(), "stopping worker");
        match worker.stop() {
            Ok(()) => Ok(true),
            Err(WorkerError::ProcessGone { pid }) => {
                warn!(pool = %self.name, worker_id = id, pid, "worker was already gone");
                Ok(true)
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Suspend convergence and stop every worker. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker fails to stop for a reason other than the
    /// process being gone.
    pub fn stop(&mut self) -> Result<(), PoolError> {
        if self.stopped {
            return Ok(());
        }

        self.stopped = true;
        for id in self.worker_ids() {
            self.terminate(id)?;
        }
        info!(pool = %self.name, "pool stopped");
        Ok(())
    }

    /// Suspend convergence and terminate every tracked worker, continuing
    /// past failures.
    ///
    /// Unlike [`stop`](Self::stop) this also runs when the pool is already
    /// stopped, so workers left behind by a failed `stop` are still
    /// terminated. Returns the workers that failed to stop.
    #[must_use]
    pub fn shutdown(&mut self) -> Vec<(WorkerId, PoolError)> {
        self.stopped = true;
        let mut failures = Vec::new();
        for id in self.worker_ids() {
            if let Err(e) = self.terminate(id) {
                failures.push((id, e));
            }
        }
        info!(pool = %self.name, failures = failures.len(), "pool shut down");
        failures
    }

    /// Resume convergence and run one pass. Idempotent.
    ///
    /// # Errors
    ///
    /// Propagates errors from the convergence pass.
    pub fn start(&mut self) -> Result<(), PoolError> {
        if !self.stopped {
            return Ok(());
        }

        self.stopped = false;
        self.reap_and_manage()?;
        info!(pool = %self.name, workers = self.workers.len(), "pool started");
        Ok(())
    }

    /// [`stop`](Self::stop) then [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Propagates errors from either step.
    pub fn restart(&mut self) -> Result<(), PoolError> {
        self.stop()?;
        self.start()?;
        info!(pool = %self.name, "pool restarted");
        Ok(())
    }

    /// Spawn a full set of fresh workers, then converge.
    ///
    /// The pool is briefly over-provisioned; the following cull retires the
    /// oldest workers, which are the ones started before this call. Skipped
    /// while the pool is stopped.
    ///
    /// # Errors
    ///
    /// Propagates spawn and termination errors.
    pub fn replace_all(&mut self) -> Result<(), PoolError> {
        if self.stopped {
            debug!(pool = %self.name, "pool stopped, not replacing workers");
            return Ok(());
        }

        self.spawn_batch(self.num_flies)?;
        self.manage()
    }

    /// Reload workers: SIGHUP each one when `send_hup` is set, otherwise
    /// replace them all. Returns without waiting for workers to come back.
    ///
    /// # Errors
    ///
    /// Propagates signal, spawn and termination errors.
    pub fn reload(&mut self) -> Result<(), PoolError> {
        if !self.send_hup {
            info!(pool = %self.name, "reloading by replacing workers");
            return self.replace_all();
        }

        for (&id, worker) in &mut self.workers {
            info!(pool = %self.name, worker_id = id, pid = worker.pid(), "sending SIGHUP");
            match worker.send_signal(Signal::SIGHUP) {
                Ok(()) => {},
                Err(WorkerError::ProcessGone { pid }) => {
                    debug!(pool = %self.name, worker_id = id, pid, "worker gone before SIGHUP");
                },
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Raise the target by one and converge. Returns the new target.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`manage`](Self::manage).
    pub fn increment(&mut self) -> Result<usize, PoolError> {
        self.num_flies = self.num_flies.saturating_add(1);
        self.manage()?;
        Ok(self.num_flies)
    }

    /// Lower the target by one, never below zero, and converge. Returns the
    /// new target.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`manage`](Self::manage).
    pub fn decrement(&mut self) -> Result<usize, PoolError> {
        self.num_flies = self.num_flies.saturating_sub(1);
        self.manage()?;
        Ok(self.num_flies)
    }

    /// Diagnostic line for one worker.
    #[must_use]
    pub fn worker_info(&self, id: WorkerId) -> Option<String> {
        self.workers.get(&id).map(Worker::info)
    }

    /// Diagnostic lines for every worker, in id order.
    #[must_use]
    pub fn workers_info(&self) -> Vec<String> {
        self.workers.values().map(Worker::info).collect()
    }

    /// Child pids of one worker, or `None` if the id is not tracked.
    ///
    /// # Errors
    ///
    /// Returns an error if the process table cannot be read.
    pub fn children(&self, id: WorkerId) -> Result<Option<Vec<u32>>, PoolError> {
        match self.workers.get(&id) {
            Some(worker) => Ok(Some(worker.children()?)),
            None => Ok(None),
        }
    }

    /// Send `signal` to one worker.
    ///
    /// # Errors
    ///
    /// Returns an error for OS failures other than the process being gone.
    pub fn signal_worker(
        &mut self,
        id: WorkerId,
        signal: Signal,
    ) -> Result<SignalDelivery, PoolError> {
        let Some(worker) = self.workers.get_mut(&id) else {
            return Ok(SignalDelivery::WorkerNotFound);
        };
        info!(pool = %self.name, worker_id = id, pid = worker.pid(), %signal, "signaling worker");
        delivered(worker.send_signal(signal))
    }

    /// Send `signal` to one child process of one worker.
    ///
    /// # Errors
    ///
    /// Returns an error for OS failures other than the process being gone.
    pub fn signal_child(
        &mut self,
        id: WorkerId,
        child: u32,
        signal: Signal,
    ) -> Result<SignalDelivery, PoolError> {
        let Some(worker) = self.workers.get_mut(&id) else {
            return Ok(SignalDelivery::WorkerNotFound);
        };
        if !worker.children()?.contains(&child) {
            return Ok(SignalDelivery::ChildNotFound);
        }
        info!(pool = %self.name, worker_id = id, pid = child, %signal, "signaling worker child");
        delivered(worker.send_signal_child(child, signal))
    }

    /// Send `signal` to every child process of one worker.
    ///
    /// # Errors
    ///
    /// Returns an error for OS failures other than a process being gone.
    pub fn signal_children(
        &mut self,
        id: WorkerId,
        signal: Signal,
    ) -> Result<SignalDelivery, PoolError> {
        let Some(worker) = self.workers.get_mut(&id) else {
            return Ok(SignalDelivery::WorkerNotFound);
        };
        info!(pool = %self.name, worker_id = id, pid = worker.pid(), %signal, "signaling worker children");
        delivered(worker.send_signal_children(signal))
    }
}

fn delivered(result: Result<(), WorkerError>) -> Result<SignalDelivery, PoolError> {
    match result {
        Ok(()) => Ok(SignalDelivery::Sent),
        Err(WorkerError::ProcessGone { .. }) => Ok(SignalDelivery::ProcessGone),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::worker::mock::{MockFactory, MockState};

    fn pool(num_flies: usize) -> (WorkerPool<MockFactory>, std::rc::Rc<std::cell::RefCell<MockState>>) {
        let (factory, state) = MockFactory::new();
        let settings = PoolSettings::new("test", "sleep 30")
            .with_num_flies(num_flies)
            .with_working_dir("/tmp");
        (WorkerPool::new(settings, factory), state)
    }

    #[test]
    fn test_scale_up_spawns_exact_deficit() {
        let (mut pool, state) = pool(3);
        assert!(pool.is_empty());

        pool.manage().unwrap();

        assert_eq!(pool.worker_ids(), vec![1, 2, 3]);
        assert_eq!(state.borrow().spawned_ids(), vec![1, 2, 3]);
    }

    #[test]
    fn test_spawn_uses_pool_parameters() {
        let (factory, state) = MockFactory::new();
        let mut env = BTreeMap::new();
        env.insert("PORT".to_string(), "8080".to_string());
        let settings = PoolSettings::new("web", "python3 -m http.server")
            .with_working_dir("/srv")
            .with_shell(true)
            .with_env(env.clone());
        let mut pool = WorkerPool::new(settings, factory);

        pool.spawn().unwrap();

        let state = state.borrow();
        let (_, spec) = &state.spawned[0];
        assert_eq!(spec.command, "python3 -m http.server");
        assert_eq!(spec.working_dir, PathBuf::from("/srv"));
        assert!(spec.shell);
        assert_eq!(spec.env, env);
    }

    #[test]
    fn test_convergence_is_idempotent() {
        let (mut pool, state) = pool(2);
        pool.reap_and_manage().unwrap();
        pool.reap_and_manage().unwrap();
        pool.manage().unwrap();

        assert_eq!(pool.len(), 2);
        assert_eq!(state.borrow().spawned.len(), 2);
        assert!(state.borrow().stopped.is_empty());
    }

    #[test]
    fn test_cull_oldest_first() {
        let (mut pool, state) = pool(5);
        pool.manage().unwrap();
        assert_eq!(pool.worker_ids(), vec![1, 2, 3, 4, 5]);

        pool.num_flies = 2;
        pool.manage().unwrap();

        assert_eq!(pool.worker_ids(), vec![4, 5]);
        assert_eq!(state.borrow().stopped, vec![1, 2, 3]);
    }

    #[test]
    fn test_warmup_delay_between_spawns() {
        let delay = Duration::from_millis(50);
        let (factory, state) = MockFactory::new();
        let settings = PoolSettings::new("test", "sleep 30")
            .with_num_flies(3)
            .with_warmup_delay(delay);
        let mut pool = WorkerPool::new(settings, factory);

        let started = std::time::Instant::now();
        pool.manage().unwrap();
        let elapsed = started.elapsed();

        assert_eq!(state.borrow().spawned_ids(), vec![1, 2, 3]);
        // The pause follows every spawn, including the last one.
        assert!(elapsed >= delay * 3, "manage took {elapsed:?}");
    }

    #[test]
    fn test_zero_warmup_delay_does_not_sleep() {
        let (mut pool, _state) = pool(50);

        let started = std::time::Instant::now();
        pool.manage().unwrap();

        assert_eq!(pool.len(), 50);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_warmup_delay_applies_to_replace() {
        let delay = Duration::from_millis(40);
        let (mut pool, _state) = pool(2);
        pool.manage().unwrap();
        pool.warmup_delay = delay;

        let started = std::time::Instant::now();
        pool.replace_all().unwrap();

        assert_eq!(pool.worker_ids(), vec![3, 4]);
        assert!(started.elapsed() >= delay * 2);
    }

    #[test]
    fn test_reap_replaces_dead_workers_with_new_ids() {
        let (mut pool, state) = pool(3);
        pool.manage().unwrap();

        state.borrow_mut().exited.insert(2);
        pool.reap_and_manage().unwrap();

        assert_eq!(pool.worker_ids(), vec![1, 3, 4]);
        // Reaped workers are not stopped, only forgotten.
        assert!(state.borrow().stopped.is_empty());
    }

    #[test]
    fn test_stopped_pool_does_not_converge() {
        let (factory, state) = MockFactory::new();
        let settings = PoolSettings::new("test", "sleep 30")
            .with_num_flies(3)
            .with_stopped(true);
        let mut pool = WorkerPool::new(settings, factory);

        pool.reap_and_manage().unwrap();
        assert!(pool.is_empty());
        assert!(state.borrow().spawned.is_empty());
    }

    #[test]
    fn test_stopped_pool_does_not_reap() {
        let (mut pool, state) = pool(2);
        pool.manage().unwrap();
        pool.stopped = true;

        state.borrow_mut().exited.insert(1);
        pool.reap_and_manage().unwrap();
        assert_eq!(pool.worker_ids(), vec![1, 2]);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut pool, state) = pool(2);
        pool.manage().unwrap();

        pool.stop().unwrap();
        assert!(pool.is_stopped());
        assert!(pool.is_empty());
        assert_eq!(state.borrow().stopped, vec![1, 2]);

        pool.stop().unwrap();
        assert!(pool.is_stopped());
        assert_eq!(state.borrow().stopped, vec![1, 2]);
    }

    #[test]
    fn test_start_is_idempotent() {
        let (mut pool, state) = pool(2);
        pool.stopped = true;

        pool.start().unwrap();
        assert!(!pool.is_stopped());
        assert_eq!(pool.worker_ids(), vec![1, 2]);

        pool.start().unwrap();
        assert_eq!(state.borrow().spawned.len(), 2);
    }

    #[test]
    fn test_restart_replaces_workers() {
        let (mut pool, _state) = pool(2);
        pool.manage().unwrap();

        pool.restart().unwrap();
        assert!(!pool.is_stopped());
        assert_eq!(pool.worker_ids(), vec![3, 4]);
    }

    #[test]
    fn test_stop_tolerates_gone_processes() {
        let (mut pool, state) = pool(3);
        pool.manage().unwrap();
        state.borrow_mut().gone.insert(2);

        pool.stop().unwrap();
        assert!(pool.is_empty());
        assert_eq!(state.borrow().stopped, vec![1, 3]);
    }

    #[test]
    fn test_terminate_propagates_os_errors_but_forgets_worker() {
        let (mut pool, state) = pool(2);
        pool.manage().unwrap();
        state.borrow_mut().stop_fails.insert(1);

        let err = pool.terminate(1).unwrap_err();
        assert!(matches!(err, PoolError::Worker(WorkerError::Os { .. })));
        assert_eq!(pool.worker_ids(), vec![2]);
    }

    #[test]
    fn test_shutdown_terminates_workers_left_by_failed_stop() {
        let (mut pool, state) = pool(3);
        pool.manage().unwrap();
        state.borrow_mut().stop_fails.insert(1);

        assert!(pool.stop().is_err());
        assert!(pool.is_stopped());
        assert_eq!(pool.worker_ids(), vec![2, 3]);

        // A second stop is a no-op once the pool is marked stopped.
        pool.stop().unwrap();
        assert_eq!(pool.worker_ids(), vec![2, 3]);

        assert!(pool.shutdown().is_empty());
        assert!(pool.is_empty());
        assert_eq!(state.borrow().stopped, vec![2, 3]);
    }

    #[test]
    fn test_shutdown_continues_past_failures() {
        let (mut pool, state) = pool(3);
        pool.manage().unwrap();
        state.borrow_mut().stop_fails.insert(2);

        let failures = pool.shutdown();

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, 2);
        assert!(pool.is_empty());
        assert!(pool.is_stopped());
        assert_eq!(state.borrow().stopped, vec![1, 3]);
    }

    #[test]
    fn test_terminate_unknown_worker() {
        let (mut pool, _state) = pool(1);
        assert!(!pool.terminate(99).unwrap());
    }

    #[test]
    fn test_spawn_failure_propagates() {
        let (mut pool, state) = pool(3);
        state.borrow_mut().spawn_budget = Some(1);

        let err = pool.manage().unwrap_err();
        assert!(matches!(err, PoolError::Worker(WorkerError::Spawn(_))));
        assert_eq!(pool.worker_ids(), vec![1]);

        // The failed id is never reissued.
        state.borrow_mut().spawn_budget = None;
        pool.manage().unwrap();
        assert_eq!(pool.worker_ids(), vec![1, 3, 4]);
    }

    #[test]
    fn test_replace_all_retires_old_workers() {
        let (mut pool, state) = pool(2);
        pool.manage().unwrap();

        pool.replace_all().unwrap();
        assert_eq!(pool.worker_ids(), vec![3, 4]);
        assert_eq!(state.borrow().stopped, vec![1, 2]);
    }

    #[test]
    fn test_replace_all_skipped_when_stopped() {
        let (mut pool, state) = pool(2);
        pool.stopped = true;
        pool.replace_all().unwrap();
        assert!(pool.is_empty());
        assert!(state.borrow().spawned.is_empty());
    }

    #[test]
    fn test_reload_with_send_hup_signals_workers() {
        let (mut pool, state) = pool(2);
        pool.send_hup = true;
        pool.manage().unwrap();
        state.borrow_mut().gone.insert(1);

        pool.reload().unwrap();

        assert_eq!(pool.worker_ids(), vec![1, 2]);
        assert_eq!(state.borrow().signals, vec![(2, Signal::SIGHUP)]);
    }

    #[test]
    fn test_reload_without_send_hup_replaces_workers() {
        let (mut pool, state) = pool(2);
        pool.manage().unwrap();

        pool.reload().unwrap();

        assert_eq!(pool.worker_ids(), vec![3, 4]);
        assert!(state.borrow().signals.is_empty());
    }

    #[test]
    fn test_increment_then_decrement_round_trip() {
        let (mut pool, _state) = pool(2);
        pool.manage().unwrap();

        assert_eq!(pool.increment().unwrap(), 3);
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.decrement().unwrap(), 2);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.num_flies(), 2);
    }

    #[test]
    fn test_decrement_saturates_at_zero() {
        let (mut pool, _state) = pool(1);
        pool.manage().unwrap();

        assert_eq!(pool.decrement().unwrap(), 0);
        assert!(pool.is_empty());
        assert_eq!(pool.decrement().unwrap(), 0);
        assert_eq!(pool.num_flies(), 0);
    }

    #[test]
    fn test_signal_relay() {
        let (mut pool, state) = pool(1);
        pool.manage().unwrap();
        state.borrow_mut().children.insert(1, vec![2001, 2002]);

        assert_eq!(
            pool.signal_worker(1, Signal::SIGUSR1).unwrap(),
            SignalDelivery::Sent
        );
        assert_eq!(
            pool.signal_worker(9, Signal::SIGUSR1).unwrap(),
            SignalDelivery::WorkerNotFound
        );
        assert_eq!(
            pool.signal_child(1, 2002, Signal::SIGQUIT).unwrap(),
            SignalDelivery::Sent
        );
        assert_eq!(
            pool.signal_child(1, 3000, Signal::SIGQUIT).unwrap(),
            SignalDelivery::ChildNotFound
        );
        assert_eq!(
            pool.signal_children(1, Signal::SIGKILL).unwrap(),
            SignalDelivery::Sent
        );

        let state = state.borrow();
        assert_eq!(state.signals, vec![(1, Signal::SIGUSR1)]);
        assert_eq!(
            state.child_signals,
            vec![
                (1, 2002, Signal::SIGQUIT),
                (1, 2001, Signal::SIGKILL),
                (1, 2002, Signal::SIGKILL),
            ]
        );
    }

    #[test]
    fn test_signal_gone_worker() {
        let (mut pool, state) = pool(1);
        pool.manage().unwrap();
        state.borrow_mut().gone.insert(1);

        assert_eq!(
            pool.signal_worker(1, Signal::SIGHUP).unwrap(),
            SignalDelivery::ProcessGone
        );
    }

    #[test]
    fn test_worker_info() {
        let (mut pool, _state) = pool(2);
        pool.manage().unwrap();

        assert_eq!(
            pool.worker_info(2).as_deref(),
            Some(format!("2: pid={} mock", MockState::pid_of(2)).as_str())
        );
        assert_eq!(pool.worker_info(3), None);
        assert_eq!(pool.workers_info().len(), 2);
    }

    proptest! {
        /// Property: ids only grow and culling always keeps the newest workers.
        #[test]
        fn prop_ids_monotonic_and_newest_survive(
            targets in prop::collection::vec(0usize..8, 1..12),
            deaths in prop::collection::vec(any::<bool>(), 1..12),
        ) {
            let (mut pool, state) = pool(0);
            let mut highest = 0;

            for (step, target) in targets.iter().enumerate() {
                if deaths.get(step).copied().unwrap_or(false) {
                    if let Some(&id) = pool.worker_ids().first() {
                        state.borrow_mut().exited.insert(id);
                    }
                }
                let before = pool.worker_ids();
                pool.num_flies = *target;
                pool.reap_and_manage().unwrap();
                let after = pool.worker_ids();

                prop_assert_eq!(after.len(), *target);
                for id in after.iter().filter(|id| !before.contains(id)) {
                    prop_assert!(*id > highest);
                    highest = *id;
                }
                // Survivors from before are the newest of the surviving set.
                let kept: Vec<_> = before.iter().filter(|id| after.contains(id)).collect();
                let dropped_live: Vec<_> = before
                    .iter()
                    .filter(|id| !after.contains(id) && !state.borrow().exited.contains(id))
                    .collect();
                if let (Some(min_kept), Some(max_dropped)) = (kept.first(), dropped_live.last()) {
                    prop_assert!(max_dropped < min_kept);
                }
            }

            let spawned = state.borrow().spawned_ids();
            prop_assert!(spawned.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
