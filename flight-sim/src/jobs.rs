use chrono::NaiveDateTime;
use logger::Logger;
use persistence::{Membership, Store};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use threadpool::ThreadPool;
use uuid::Uuid;

use crate::clock::registry::WorldRegistry;
use crate::types::config::JobIntervals;
use crate::types::sim_error::SimError;

/// The periodic background jobs. At most one run of each kind is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    CreditDeduction,
    FlightRevenue,
    Maintenance,
    ListingResolution,
    RecallResolution,
    LeaseExpiry,
    AiDecisions,
}

impl JobKind {
    pub const ALL: [JobKind; 7] = [
        JobKind::CreditDeduction,
        JobKind::FlightRevenue,
        JobKind::Maintenance,
        JobKind::ListingResolution,
        JobKind::RecallResolution,
        JobKind::LeaseExpiry,
        JobKind::AiDecisions,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            JobKind::CreditDeduction => "credit-deduction",
            JobKind::FlightRevenue => "flight-revenue",
            JobKind::Maintenance => "maintenance",
            JobKind::ListingResolution => "listing-resolution",
            JobKind::RecallResolution => "recall-resolution",
            JobKind::LeaseExpiry => "lease-expiry",
            JobKind::AiDecisions => "ai-decisions",
        }
    }

    pub fn interval(&self, intervals: &JobIntervals) -> Duration {
        match self {
            JobKind::CreditDeduction => intervals.credit_deduction,
            JobKind::FlightRevenue => intervals.flight_revenue,
            JobKind::Maintenance => intervals.maintenance,
            JobKind::ListingResolution => intervals.listing_resolution,
            JobKind::RecallResolution => intervals.recall_resolution,
            JobKind::LeaseExpiry => intervals.lease_expiry,
            JobKind::AiDecisions => intervals.ai_decisions,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
}

/// Run state and counters of one job kind.
pub struct JobSlot {
    kind: JobKind,
    state: Mutex<JobState>,
    runs: AtomicUsize,
    skipped: AtomicUsize,
}

impl JobSlot {
    pub fn new(kind: JobKind) -> Arc<Self> {
        Arc::new(JobSlot {
            kind,
            state: Mutex::new(JobState::Idle),
            runs: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
        })
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn state(&self) -> JobState {
        match self.state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Marks the slot running, or returns `None` if it already is.
    /// Never blocks.
    pub fn try_acquire(self: &Arc<Self>) -> Option<JobGuard> {
        let mut state = match self.state.try_lock() {
            Ok(state) => state,
            Err(_) => {
                self.skipped.fetch_add(1, Ordering::SeqCst);
                return None;
            }
        };
        if *state == JobState::Running {
            self.skipped.fetch_add(1, Ordering::SeqCst);
            return None;
        }
        *state = JobState::Running;
        self.runs.fetch_add(1, Ordering::SeqCst);
        Some(JobGuard {
            slot: Arc::clone(self),
        })
    }

    fn release(&self) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        *state = JobState::Idle;
    }
}

/// Holds a slot in `Running`; dropping it (even while unwinding) frees it.
pub struct JobGuard {
    slot: Arc<JobSlot>,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.slot.release();
    }
}

pub trait BackgroundJob: Send + Sync {
    fn kind(&self) -> JobKind;
    fn run(&self) -> Result<(), SimError>;
}

/// Decisions made on behalf of computer-controlled airlines. Plugged in by
/// whoever embeds the simulator.
pub trait AiDecisionMaker: Send + Sync {
    /// `airlines` are the computer-controlled airlines of the world.
    fn decide(
        &self,
        world_id: Uuid,
        airlines: &[Membership],
        now: NaiveDateTime,
    ) -> Result<(), SimError>;
}

/// The default: computer airlines do nothing.
pub struct NoAi;

impl AiDecisionMaker for NoAi {
    fn decide(
        &self,
        _world_id: Uuid,
        _airlines: &[Membership],
        _now: NaiveDateTime,
    ) -> Result<(), SimError> {
        Ok(())
    }
}

/// Hands the computer-controlled airlines of a world to `ai`, skipping
/// worlds that have none. Returns how many airlines were handed over.
pub fn run_ai_pass(
    store: &dyn Store,
    ai: &dyn AiDecisionMaker,
    world_id: Uuid,
    now: NaiveDateTime,
) -> Result<usize, SimError> {
    let airlines: Vec<Membership> = store
        .list_memberships(world_id)?
        .into_iter()
        .filter(|m| m.is_ai)
        .collect();
    if airlines.is_empty() {
        return Ok(0);
    }
    ai.decide(world_id, &airlines, now)?;
    Ok(airlines.len())
}

type WorldPass = dyn Fn(Uuid, NaiveDateTime) -> Result<(), SimError> + Send + Sync;

/// Runs one pass per running world. A failing world is logged and the
/// others still run.
pub struct WorldPassJob {
    kind: JobKind,
    registry: Arc<WorldRegistry>,
    logger: Logger,
    pass: Box<WorldPass>,
}

impl WorldPassJob {
    pub fn new<F>(kind: JobKind, registry: Arc<WorldRegistry>, logger: Logger, pass: F) -> Self
    where
        F: Fn(Uuid, NaiveDateTime) -> Result<(), SimError> + Send + Sync + 'static,
    {
        WorldPassJob {
            kind,
            registry,
            logger,
            pass: Box::new(pass),
        }
    }
}

impl BackgroundJob for WorldPassJob {
    fn kind(&self) -> JobKind {
        self.kind
    }

    fn run(&self) -> Result<(), SimError> {
        for (world_id, now) in self.registry.running_worlds() {
            if let Err(e) = (self.pass)(world_id, now) {
                self.logger.error(
                    self.kind.as_str(),
                    &format!("Pass failed for world {}: {}", world_id, e),
                );
            }
        }
        Ok(())
    }
}

struct Registered {
    job: Arc<dyn BackgroundJob>,
    slot: Arc<JobSlot>,
    interval: Duration,
    last_fired: Mutex<Option<Instant>>,
}

/// Fires every registered job on its own interval, on a shared thread pool.
///
/// A job whose previous run has not finished is skipped for that interval,
/// never queued.
pub struct JobScheduler {
    jobs: Vec<Registered>,
    pool: Mutex<ThreadPool>,
    poll_interval: Duration,
    running: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
    logger: Logger,
}

impl JobScheduler {
    pub fn new(workers: usize, poll_interval: Duration, logger: Logger) -> Self {
        JobScheduler {
            jobs: Vec::new(),
            pool: Mutex::new(ThreadPool::new(workers.max(1))),
            poll_interval,
            running: AtomicBool::new(false),
            handle: Mutex::new(None),
            logger,
        }
    }

    pub fn register(&mut self, job: Arc<dyn BackgroundJob>, interval: Duration) {
        let slot = JobSlot::new(job.kind());
        self.jobs.push(Registered {
            job,
            slot,
            interval,
            last_fired: Mutex::new(None),
        });
    }

    pub fn slot(&self, kind: JobKind) -> Option<Arc<JobSlot>> {
        self.jobs
            .iter()
            .find(|r| r.slot.kind() == kind)
            .map(|r| Arc::clone(&r.slot))
    }

    /// Dispatches every job whose interval has elapsed at `now`. Returns the
    /// kinds handed to the pool; busy ones are skipped.
    pub fn poll_at(&self, now: Instant) -> Result<Vec<JobKind>, SimError> {
        let mut dispatched = Vec::new();
        for registered in &self.jobs {
            {
                let mut last = registered.last_fired.lock()?;
                let due = match *last {
                    None => true,
                    Some(fired) => now.saturating_duration_since(fired) >= registered.interval,
                };
                if !due {
                    continue;
                }
                *last = Some(now);
            }

            let kind = registered.slot.kind();
            let guard = match registered.slot.try_acquire() {
                Some(guard) => guard,
                None => {
                    self.logger.debug(
                        kind.as_str(),
                        "Previous run still in progress, skipping",
                    );
                    continue;
                }
            };

            let job = Arc::clone(&registered.job);
            let logger = self.logger.clone();
            self.pool.lock()?.execute(move || {
                let _guard = guard;
                let started = Instant::now();
                match job.run() {
                    Ok(()) => logger.debug(
                        kind.as_str(),
                        &format!("Finished in {} ms", started.elapsed().as_millis()),
                    ),
                    Err(e) => logger.error(kind.as_str(), &format!("Job failed: {}", e)),
                }
            });
            dispatched.push(kind);
        }
        Ok(dispatched)
    }

    /// Starts the polling thread.
    pub fn start(self: &Arc<Self>) -> Result<(), SimError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let scheduler = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("job-scheduler".to_string())
            .spawn(move || {
                while scheduler.running.load(Ordering::SeqCst) {
                    if let Err(e) = scheduler.poll_at(Instant::now()) {
                        scheduler.logger.error("jobs", &format!("Poll failed: {}", e));
                    }
                    thread::sleep(scheduler.poll_interval);
                }
            })
            .map_err(|_| {
                self.running.store(false, Ordering::SeqCst);
                SimError::TimerStartError("could not start the job scheduler".to_string())
            })?;
        *self.handle.lock()? = Some(handle);
        self.logger.info("jobs", &format!("Scheduler started with {} jobs", self.jobs.len()));
        Ok(())
    }

    /// Stops polling and waits for runs already in flight. Nothing is
    /// cancelled mid-run.
    pub fn stop(&self) -> Result<(), SimError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock()?.take() {
            if handle.join().is_err() {
                self.logger.error("jobs", "Scheduler thread panicked");
            }
        }
        self.wait_idle()
    }

    pub fn wait_idle(&self) -> Result<(), SimError> {
        let pool = self.pool.lock()?.clone();
        pool.join();
        Ok(())
    }
}
