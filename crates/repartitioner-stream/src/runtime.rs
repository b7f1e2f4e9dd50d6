//! In-process stream runtime.
//!
//! A `StreamRuntime` owns a set of worker threads, each draining its own
//! bounded channel. Records are routed to a worker by a hash of their
//! normalized key, so all records for one key are processed in order by
//! the same thread. Keyless records are spread round-robin.
//!
//! # Lifecycle
//!
//! ```text
//! CREATED ──start()──▶ REBALANCING ──▶ RUNNING
//! RUNNING ──resize()─▶ REBALANCING ──▶ RUNNING
//! any ──close()──▶ PENDING_SHUTDOWN ──▶ NOT_RUNNING
//! worker panic ──▶ ERROR
//! ```
//!
//! While rebalancing, the old workers drain their queues before the new
//! set is spawned. `send` keeps accepting through a rebalance and waits for
//! the new set instead of failing.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::JoinHandle;

use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

use repartitioner_core::{InstanceProvider, LifecycleState, RuntimeHandle, StreamRecord};

use crate::error::{StreamError, StreamResult};
use crate::rekey::normalize_key;
use crate::topology::Topology;

struct Worker {
    tx: mpsc::Sender<StreamRecord>,
    handle: JoinHandle<()>,
}

/// One runtime instance running the topology on a pool of worker threads.
pub struct StreamRuntime {
    id: String,
    topology: Arc<Topology>,
    /// Queue depth per worker.
    capacity: usize,
    state: Arc<RwLock<LifecycleState>>,
    live_threads: Arc<AtomicUsize>,
    workers: Mutex<Vec<Worker>>,
    /// Wakes senders parked in the gap between worker sets.
    state_changed: Notify,
    round_robin: AtomicUsize,
}

impl StreamRuntime {
    pub fn new(id: impl Into<String>, topology: Arc<Topology>, capacity: usize) -> Self {
        Self {
            id: id.into(),
            topology,
            capacity: capacity.max(1),
            state: Arc::new(RwLock::new(LifecycleState::Created)),
            live_threads: Arc::new(AtomicUsize::new(0)),
            workers: Mutex::new(Vec::new()),
            state_changed: Notify::new(),
            round_robin: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    /// Spawn `threads` workers and move to RUNNING.
    pub fn start(&self, threads: usize) -> StreamResult<()> {
        let current = self.current_state();
        if current != LifecycleState::Created {
            return Err(StreamError::NotAccepting {
                id: self.id.clone(),
                state: current,
            });
        }
        self.rebalance(threads)
    }

    /// Replace the worker set with `threads` new workers.
    ///
    /// Queued records are processed by the old workers before they exit.
    pub fn resize(&self, threads: usize) -> StreamResult<()> {
        let current = self.current_state();
        if current != LifecycleState::Running {
            return Err(StreamError::NotAccepting {
                id: self.id.clone(),
                state: current,
            });
        }
        self.rebalance(threads)
    }

    fn rebalance(&self, threads: usize) -> StreamResult<()> {
        self.set_state(LifecycleState::Rebalancing);
        self.drain_workers();

        let mut spawned = Vec::with_capacity(threads);
        for index in 0..threads.max(1) {
            match self.spawn_worker(index) {
                Ok(worker) => spawned.push(worker),
                Err(e) => {
                    error!(runtime = %self.id, error = %e, "failed to spawn worker");
                    *self.workers.lock().unwrap_or_else(PoisonError::into_inner) = spawned;
                    self.set_state(LifecycleState::Error);
                    return Err(e);
                }
            }
        }

        let count = spawned.len();
        *self.workers.lock().unwrap_or_else(PoisonError::into_inner) = spawned;
        self.set_state(LifecycleState::Running);
        info!(runtime = %self.id, threads = count, "stream runtime running");
        Ok(())
    }

    /// Stop accepting records, drain the queues, and join every worker.
    pub fn close(&self) {
        if self.current_state() == LifecycleState::NotRunning {
            return;
        }
        self.set_state(LifecycleState::PendingShutdown);
        self.drain_workers();
        self.set_state(LifecycleState::NotRunning);
        info!(runtime = %self.id, "stream runtime closed");
    }

    /// Route a record to its worker, waiting for queue space if necessary.
    ///
    /// During a rebalance the record waits for the new worker set.
    pub async fn send(&self, mut record: StreamRecord) -> StreamResult<()> {
        loop {
            let changed = self.state_changed.notified();
            let mut changed = std::pin::pin!(changed);
            changed.as_mut().enable();

            let state = self.current_state();
            if !matches!(state, LifecycleState::Running | LifecycleState::Rebalancing) {
                return Err(StreamError::NotAccepting {
                    id: self.id.clone(),
                    state,
                });
            }
            match self.route(&record) {
                Some(tx) => match tx.send(record).await {
                    Ok(()) => return Ok(()),
                    // Worker exited; the next pass sees the new state.
                    Err(mpsc::error::SendError(returned)) => record = returned,
                },
                // Old workers drained, new set not installed yet.
                None => changed.await,
            }
        }
    }

    fn route(&self, record: &StreamRecord) -> Option<mpsc::Sender<StreamRecord>> {
        let workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        if workers.is_empty() {
            return None;
        }
        let index = match normalize_key(record.key.as_deref()) {
            Some(key) => partition_for(&key, workers.len()),
            None => self.round_robin.fetch_add(1, Ordering::Relaxed) % workers.len(),
        };
        Some(workers[index].tx.clone())
    }

    fn spawn_worker(&self, index: usize) -> StreamResult<Worker> {
        let (tx, mut rx) = mpsc::channel::<StreamRecord>(self.capacity);
        let topology = self.topology.clone();
        let state = self.state.clone();
        let live = self.live_threads.clone();
        let id = self.id.clone();

        self.live_threads.fetch_add(1, Ordering::SeqCst);
        let spawned = std::thread::Builder::new()
            .name(format!("{}-worker-{index}", self.id))
            .spawn(move || {
                debug!(runtime = %id, worker = index, "worker started");
                while let Some(record) = rx.blocking_recv() {
                    let result =
                        std::panic::catch_unwind(AssertUnwindSafe(|| topology.process(record)));
                    if result.is_err() {
                        error!(runtime = %id, worker = index, "worker panicked");
                        transition(&state, &id, LifecycleState::Error);
                        break;
                    }
                }
                live.fetch_sub(1, Ordering::SeqCst);
                debug!(runtime = %id, worker = index, "worker stopped");
            });

        match spawned {
            Ok(handle) => Ok(Worker { tx, handle }),
            Err(e) => {
                self.live_threads.fetch_sub(1, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    fn drain_workers(&self) {
        let workers =
            std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        for (index, worker) in workers.into_iter().enumerate() {
            // Dropping the sender lets the worker finish its queue and exit.
            drop(worker.tx);
            if worker.handle.join().is_err() {
                warn!(runtime = %self.id, worker = index, "worker thread panicked during join");
            }
        }
    }

    fn current_state(&self) -> LifecycleState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: LifecycleState) {
        transition(&self.state, &self.id, next);
        self.state_changed.notify_waiters();
    }
}

fn transition(state: &RwLock<LifecycleState>, id: &str, next: LifecycleState) {
    let mut guard = state.write().unwrap_or_else(PoisonError::into_inner);
    // ERROR is sticky until shutdown.
    if *guard == LifecycleState::Error
        && !matches!(next, LifecycleState::PendingShutdown | LifecycleState::NotRunning)
    {
        return;
    }
    let previous = *guard;
    if previous != next {
        info!(runtime = %id, from = %previous, to = %next, "stream runtime state change");
        *guard = next;
    }
}

impl RuntimeHandle for StreamRuntime {
    fn instance_id(&self) -> Option<String> {
        Some(self.id.clone())
    }

    fn state(&self) -> LifecycleState {
        self.current_state()
    }

    fn thread_count(&self) -> usize {
        self.live_threads.load(Ordering::SeqCst)
    }
}

/// Stable partition index for a normalized key.
pub fn partition_for(key: &str, partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % partitions.max(1) as u64) as usize
}

/// The runtime instances serving one input topic in this process.
///
/// Slots are reserved before their runtime exists, so an instance that is
/// still being built shows up as a `None` slot.
pub struct RuntimeRegistry {
    input_topic: String,
    slots: RwLock<Vec<Option<Arc<StreamRuntime>>>>,
}

impl RuntimeRegistry {
    pub fn new(input_topic: impl Into<String>) -> Self {
        Self {
            input_topic: input_topic.into(),
            slots: RwLock::new(Vec::new()),
        }
    }

    pub fn input_topic(&self) -> &str {
        &self.input_topic
    }

    /// Reserve an empty slot and return its index.
    pub fn reserve(&self) -> usize {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots.push(None);
        slots.len() - 1
    }

    /// Put a runtime into a previously reserved slot.
    pub fn install(&self, slot: usize, runtime: Arc<StreamRuntime>) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if slot >= slots.len() {
            slots.resize(slot + 1, None);
        }
        slots[slot] = Some(runtime);
    }

    /// Append a runtime in a new slot.
    pub fn register(&self, runtime: Arc<StreamRuntime>) -> usize {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots.push(Some(runtime));
        slots.len() - 1
    }

    pub fn runtimes(&self) -> Vec<Arc<StreamRuntime>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .flatten()
            .cloned()
            .collect()
    }

    /// Feed a record into `topic`. Records are spread over the installed
    /// runtimes by normalized key.
    pub async fn send(&self, topic: &str, record: StreamRecord) -> StreamResult<()> {
        if topic != self.input_topic {
            return Err(StreamError::UnknownTopic(topic.to_string()));
        }
        let runtimes = self.runtimes();
        if runtimes.is_empty() {
            return Err(StreamError::NoRuntime(topic.to_string()));
        }
        let index = match normalize_key(record.key.as_deref()) {
            Some(key) => partition_for(&key, runtimes.len()),
            None => 0,
        };
        runtimes[index].send(record).await
    }

    /// Close every installed runtime.
    pub fn close_all(&self) {
        for runtime in self.runtimes() {
            runtime.close();
        }
    }
}

impl InstanceProvider for RuntimeRegistry {
    fn instances(&self) -> Vec<Option<Arc<dyn RuntimeHandle>>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|slot| {
                slot.as_ref()
                    .map(|rt| rt.clone() as Arc<dyn RuntimeHandle>)
            })
            .collect()
    }
}
