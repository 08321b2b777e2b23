//! Single-flight job orchestration.
//!
//! At most one job runs at a time. A job loads and verifies the input tables,
//! encodes the model, then runs the solver on a blocking thread while an async
//! task publishes every improvement it reports: checked, persisted and made
//! available to stream subscribers, in that order.

use crate::checks::{ensure_acceptable, record_issues};
use crate::config::{Config, GroupSizeBounds};
use crate::encoder::{OptimizationModel, encode};
use crate::error::{Error, Result, ValidationError};
use crate::loaders::Loader;
use crate::publisher::{RecordBuilder, ResultStore, SolveResult};
use crate::solver::{BranchAndBound, CancelToken, Solution, Solver, TerminalStatus};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Cancelled | JobState::Failed
        )
    }

    fn after(status: &TerminalStatus) -> JobState {
        match status {
            TerminalStatus::Optimal | TerminalStatus::Feasible => JobState::Completed,
            TerminalStatus::Cancelled => JobState::Cancelled,
            TerminalStatus::Infeasible | TerminalStatus::Error(_) => JobState::Failed,
        }
    }
}

/// One run of the solver over one snapshot of the inputs.
#[derive(Debug)]
pub struct Job {
    pub id: u64,
    model: Arc<OptimizationModel>,
    cancel: CancelToken,
    state: watch::Sender<JobState>,
    outcome: Mutex<Option<TerminalStatus>>,
    records: RwLock<Vec<Arc<SolveResult>>>,
    best: Mutex<Option<Solution>>,
    /// Woken after every publication and at the end of the job.
    events: broadcast::Sender<()>,
    /// Set once the job is cancelled; held while an improvement is published.
    publish_gate: tokio::sync::Mutex<bool>,
}

impl Job {
    fn new(id: u64, model: Arc<OptimizationModel>, cancel: CancelToken) -> Self {
        Self {
            id,
            model,
            cancel,
            state: watch::channel(JobState::Running).0,
            outcome: Mutex::new(None),
            records: RwLock::new(Vec::new()),
            best: Mutex::new(None),
            events: broadcast::channel(64).0,
            publish_gate: tokio::sync::Mutex::new(false),
        }
    }

    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    pub fn model(&self) -> &OptimizationModel {
        &self.model
    }

    /// Terminal solver status, once the job is over.
    pub fn outcome(&self) -> Option<TerminalStatus> {
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Best solution published so far.
    pub fn best_solution(&self) -> Option<Solution> {
        self.best
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_record(&self) -> Option<Arc<SolveResult>> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    fn record(&self, index: usize) -> Option<Arc<SolveResult>> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .cloned()
    }

    fn push(&self, record: Arc<SolveResult>) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        let _ = self.events.send(());
    }

    fn finish(&self, status: TerminalStatus) -> JobState {
        let state = JobState::after(&status);
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(status);
        self.state.send_replace(state);
        let _ = self.events.send(());
        state
    }

    /// Wait until the job leaves the running state.
    pub async fn finished(&self) -> JobState {
        let mut state = self.state.subscribe();
        state
            .wait_for(|s| s.is_terminal())
            .await
            .map_or(JobState::Failed, |s| *s)
    }
}

/// Records delivered to one stream client.
pub struct Subscription {
    inner: Source,
}

enum Source {
    Snapshot(Option<Arc<SolveResult>>),
    Live {
        job: Arc<Job>,
        next: usize,
        events: broadcast::Receiver<()>,
    },
}

impl Subscription {
    fn snapshot(record: SolveResult) -> Self {
        Self {
            inner: Source::Snapshot(Some(Arc::new(record))),
        }
    }

    fn live(job: Arc<Job>) -> Self {
        // Subscribe before anything is read, so no wake-up can be missed.
        let events = job.events.subscribe();
        Self {
            inner: Source::Live {
                job,
                next: 0,
                events,
            },
        }
    }

    /// Next record, or `None` once the stream is over.
    pub async fn next(&mut self) -> Option<Arc<SolveResult>> {
        match &mut self.inner {
            Source::Snapshot(record) => record.take(),
            Source::Live { job, next, events } => loop {
                if let Some(record) = job.record(*next) {
                    *next += 1;
                    return Some(record);
                }
                if job.state().is_terminal() {
                    let record = job.record(*next)?;
                    *next += 1;
                    return Some(record);
                }
                match events.recv().await {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    pub state: JobState,
    pub job: Option<u64>,
    pub sequence: Option<u64>,
    pub objective: Option<i64>,
}

pub struct Orchestrator {
    config: Arc<Config>,
    loader: Loader,
    store: Arc<ResultStore>,
    solver: Arc<dyn Solver>,
    time_limit: Option<Duration>,
    submit_gate: tokio::sync::Mutex<()>,
    current: RwLock<Option<Arc<Job>>>,
    next_id: AtomicU64,
}

impl Orchestrator {
    pub fn new(config: Config, loader: Loader, store: ResultStore) -> Self {
        Self {
            config: Arc::new(config),
            loader,
            store: Arc::new(store),
            solver: Arc::new(BranchAndBound),
            time_limit: None,
            submit_gate: tokio::sync::Mutex::new(()),
            current: RwLock::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_solver(mut self, solver: Arc<dyn Solver>) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_time_limit(mut self, limit: Option<Duration>) -> Self {
        self.time_limit = limit;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    pub fn current(&self) -> Option<Arc<Job>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn running(&self) -> Option<Arc<Job>> {
        self.current().filter(|job| job.state() == JobState::Running)
    }

    /// Start a new job, returning as soon as the solver is launched.
    pub async fn submit(&self) -> Result<Arc<Job>> {
        let _gate = self.submit_gate.lock().await;
        if let Some(job) = self.running() {
            debug!(job = job.id, "rejecting submission while a job runs");
            return Err(Error::Conflict);
        }
        let loader = self.loader.clone();
        let config = Arc::clone(&self.config);
        let data = tokio::task::spawn_blocking(move || loader.load(&config))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))??;
        let model = encode(&data, &self.config)
            .map_err(|e| Error::Validation(ValidationError::single(e.to_string())))?;
        let builder = RecordBuilder::new(&data, &self.config);

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let job = Arc::new(Job::new(
            id,
            Arc::new(model),
            CancelToken::with_time_limit(self.time_limit),
        ));
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&job));
        info!(
            job = id,
            students = job.model.students(),
            teams = job.model.teams(),
            time_limit = ?self.time_limit,
            "job started"
        );
        self.launch(Arc::clone(&job), builder);
        Ok(job)
    }

    fn launch(&self, job: Arc<Job>, builder: RecordBuilder) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let solver = Arc::clone(&self.solver);
        let (model, cancel) = (Arc::clone(&job.model), job.cancel.clone());
        let solve = tokio::task::spawn_blocking(move || {
            let mut on_improve = |solution: Solution| {
                let _ = tx.send(solution);
            };
            solver.solve(&model, &mut on_improve, &cancel)
        });
        let mut publisher = Publisher {
            job,
            builder,
            store: Arc::clone(&self.store),
            bounds: self.config.group_size,
            sequence: 0,
        };
        tokio::spawn(async move {
            while let Some(solution) = rx.recv().await {
                publisher.publish(solution).await;
            }
            let status = solve
                .await
                .unwrap_or_else(|e| TerminalStatus::Error(e.to_string()));
            let job = &publisher.job;
            if status.is_failure() {
                error!(job = job.id, %status, "{}", Error::Solver(status.to_string()));
            }
            let state = job.finish(status);
            info!(job = job.id, ?state, published = publisher.sequence, "job finished");
        });
    }

    /// Stream of the current job's records, or of the persisted result.
    pub async fn attach_stream(&self) -> Result<Subscription> {
        match self.running() {
            Some(job) => Ok(Subscription::live(job)),
            None => Ok(Subscription::snapshot(self.get_result().await?)),
        }
    }

    /// Ask the running job to stop. Nothing is published after this returns.
    pub async fn cancel(&self) {
        let Some(job) = self.running() else {
            return;
        };
        let mut cancelled = job.publish_gate.lock().await;
        *cancelled = true;
        job.cancel.cancel();
        info!(job = job.id, "cancellation requested");
    }

    pub async fn get_result(&self) -> Result<SolveResult> {
        Ok(self.store.load().await?.unwrap_or_default())
    }

    pub async fn put_result(&self, record: &SolveResult) -> Result<()> {
        self.store.save(record).await?;
        info!(sequence = ?record.sequence, "result replaced externally");
        Ok(())
    }

    pub fn status(&self) -> JobStatus {
        match self.current() {
            None => JobStatus {
                state: JobState::Idle,
                job: None,
                sequence: None,
                objective: None,
            },
            Some(job) => {
                let last = job.last_record();
                JobStatus {
                    state: job.state(),
                    job: Some(job.id),
                    sequence: last.as_ref().and_then(|r| r.sequence),
                    objective: last.as_ref().and_then(|r| r.objective),
                }
            }
        }
    }
}

struct Publisher {
    job: Arc<Job>,
    builder: RecordBuilder,
    store: Arc<ResultStore>,
    bounds: GroupSizeBounds,
    sequence: u64,
}

impl Publisher {
    async fn publish(&mut self, solution: Solution) {
        let id = self.job.id;
        let objective = match ensure_acceptable(&self.job.model, &solution) {
            Ok(objective) => objective,
            Err(e) => {
                warn!(job = id, "dropping solution: {e}");
                return;
            }
        };
        let best = self.job.best_solution().map(|s| s.objective);
        if best.is_some_and(|best| objective <= best) {
            debug!(job = id, objective, ?best, "dropping non-improving solution");
            return;
        }
        let record = self.builder.build(&solution, self.sequence + 1);
        let issues = record_issues(&record, self.bounds);
        if !issues.is_empty() {
            warn!(job = id, ?issues, "dropping inconsistent record");
            return;
        }

        let cancelled = self.job.publish_gate.lock().await;
        if *cancelled {
            debug!(job = id, objective, "dropping improvement received after cancellation");
            return;
        }
        self.sequence += 1;
        if let Err(e) = self.store.save(&record).await {
            error!(job = id, sequence = self.sequence, "{e}");
        }
        *self.job.best.lock().unwrap_or_else(PoisonError::into_inner) = Some(solution);
        self.job.push(Arc::new(record));
        info!(job = id, sequence = self.sequence, objective, "published improvement");
    }
}
