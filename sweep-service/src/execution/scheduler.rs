// Submission Scheduler
// Works through the parameter queue: prepare inputs, build, submit, then pace

use crate::error::{ServiceError, ServiceResult};
use crate::execution::clock::{Sleeper, ShutdownSignal, TokioSleeper};
use crate::execution::events::{EventSender, ProgressSender, SweepEvent};
use crate::execution::throttle::{PacingState, ThrottlePolicy};
use crate::params::ParameterSet;
use crate::runners::{InputPreparer, PreparationRequest, SubmitOptions, WorkflowBackend, WorkflowHandle};
use crate::workflow::{GraphBuilder, InputCatalog, JobGraph, DEFAULT_MERGE_LIMIT};

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Observable scheduler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    PreparingInputs,
    Submitting,
    Waiting,
    Done,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchedulerState::Idle => "idle",
            SchedulerState::PreparingInputs => "preparing inputs",
            SchedulerState::Submitting => "submitting",
            SchedulerState::Waiting => "waiting",
            SchedulerState::Done => "done",
        };
        f.write_str(name)
    }
}

/// What a submission failure does to the rest of the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the run on the first submission failure
    #[default]
    FailFast,
    /// Record the failure and move to the next parameter set
    Continue,
}

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Root holding `inputs/`; per-set input directories live under it
    pub project_root: PathBuf,
    pub merge_limit: usize,
    pub throttle: ThrottlePolicy,
    pub failure_policy: FailurePolicy,
    pub submit: SubmitOptions,
}

impl SchedulerConfig {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            merge_limit: DEFAULT_MERGE_LIMIT,
            throttle: ThrottlePolicy::default(),
            failure_policy: FailurePolicy::default(),
            submit: SubmitOptions::default(),
        }
    }
}

/// A workflow the backend accepted
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionRecord {
    pub sequence_number: usize,
    pub iteration: u32,
    pub handle: WorkflowHandle,
}

/// A parameter set whose remaining iterations were abandoned
#[derive(Debug, Clone, Serialize)]
pub struct SkippedSet {
    pub sequence_number: usize,
    pub iteration: u32,
    pub reason: String,
}

/// A submission failure recorded under [`FailurePolicy::Continue`]
#[derive(Debug, Clone, Serialize)]
pub struct FailedSubmission {
    pub sequence_number: usize,
    pub iteration: u32,
    pub workflow: String,
    pub message: String,
}

/// Outcome of a scheduler run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub submitted: Vec<SubmissionRecord>,
    pub skipped: Vec<SkippedSet>,
    pub failures: Vec<FailedSubmission>,
    /// Pacing waits that ran to completion
    pub waits: usize,
    pub cancelled: bool,
    #[serde(skip)]
    pub duration: Duration,
}

impl SweepReport {
    /// True when every queued submission went through
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failures.is_empty() && self.skipped.is_empty()
    }
}

enum Step {
    Next,
    SkipSet,
    Cancelled,
}

/// Sequential submission scheduler
pub struct SubmissionScheduler {
    config: SchedulerConfig,
    queue: VecDeque<ParameterSet>,
    builder: GraphBuilder,
    preparer: Box<dyn InputPreparer>,
    backend: Box<dyn WorkflowBackend>,
    sleeper: Box<dyn Sleeper>,
    shutdown: ShutdownSignal,
    event_tx: Option<ProgressSender>,
    state: SchedulerState,
}

impl SubmissionScheduler {
    pub fn new(
        config: SchedulerConfig,
        queue: impl IntoIterator<Item = ParameterSet>,
        preparer: impl InputPreparer + 'static,
        backend: impl WorkflowBackend + 'static,
    ) -> Self {
        Self {
            builder: GraphBuilder::new(config.merge_limit),
            config,
            queue: queue.into_iter().collect(),
            preparer: Box::new(preparer),
            backend: Box::new(backend),
            sleeper: Box::new(TokioSleeper),
            shutdown: ShutdownSignal::never(),
            event_tx: None,
            state: SchedulerState::Idle,
        }
    }

    /// Set progress event sender
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Replace the real-time sleeper
    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// Stop at the next wait tick or iteration boundary once the signal fires
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Parameter sets not yet started
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// Process the whole queue.
    ///
    /// Returns `Err` only for fatal errors: IO failures while preparing
    /// inputs, graph invariant violations, or a submission failure under
    /// [`FailurePolicy::FailFast`]. Skips, tolerated failures and
    /// cancellation are reported in the [`SweepReport`].
    ///
    /// A pacing wait runs only once the next graph is built and ready to
    /// submit, so no wait follows the last workflow actually submitted.
    pub async fn run(&mut self) -> ServiceResult<SweepReport> {
        let start = Instant::now();
        let mut report = SweepReport::default();
        let mut pacing = PacingState::new();

        self.event_tx.send_event(SweepEvent::SweepStarted {
            total_sets: self.queue.len(),
            total_submissions: self.queue.iter().map(|p| p.iterations as usize).sum(),
        });

        // A wait owed to the previous submission; dropped if nothing follows
        let mut pending_wait = false;

        'sets: while let Some(params) = self.queue.pop_front() {
            let remaining_sets = self.queue.len() + 1;
            pacing.start_set();

            for iteration in 0..params.iterations {
                if self.shutdown.is_triggered() {
                    report.cancelled = true;
                    break 'sets;
                }

                let graph = match self.prepare_graph(&params, iteration).await {
                    Ok(graph) => graph,
                    Err(e) => {
                        self.record(&params, iteration, Err(e), &mut report)?;
                        continue 'sets;
                    }
                };

                if std::mem::take(&mut pending_wait) {
                    match self.wait().await {
                        Step::Cancelled => {
                            report.cancelled = true;
                            break 'sets;
                        }
                        _ => report.waits += 1,
                    }
                }

                self.set_state(SchedulerState::Submitting);
                let outcome = self
                    .backend
                    .submit(&graph, &self.config.submit)
                    .await
                    .map_err(ServiceError::from);
                let step = self.record(&params, iteration, outcome, &mut report)?;
                if matches!(step, Step::SkipSet) {
                    continue 'sets;
                }

                let final_submission = self.queue.is_empty() && iteration + 1 == params.iterations;
                pending_wait =
                    pacing.record_submission(&self.config.throttle, remaining_sets, final_submission);
            }
        }

        if pending_wait {
            debug!("No further submissions, dropping pending wait");
        }

        if report.cancelled {
            warn!(remaining = self.queue.len(), "Sweep cancelled");
            self.event_tx.send_event(SweepEvent::Cancelled);
        }

        self.set_state(SchedulerState::Done);
        report.duration = start.elapsed();
        self.event_tx.send_event(SweepEvent::SweepCompleted {
            submitted: report.submitted.len(),
            skipped: report.skipped.len(),
            failed: report.failures.len(),
            duration: report.duration,
        });

        Ok(report)
    }

    /// Prepare inputs and build the graph for one iteration of a parameter set
    async fn prepare_graph(&mut self, params: &ParameterSet, iteration: u32) -> ServiceResult<JobGraph> {
        let data_dir = params.data_dir(&self.config.project_root);

        self.set_state(SchedulerState::PreparingInputs);
        let request = PreparationRequest::from_parameters(params, &data_dir);
        let data_dir = self.preparer.prepare(&request).await?;
        self.event_tx.send_event(SweepEvent::InputsPrepared {
            sequence_number: params.sequence_number,
            iteration,
            dir: data_dir.clone(),
        });

        let catalog = InputCatalog::scan(&data_dir)?;
        let graph = self.builder.build(params, iteration, &catalog)?;
        self.event_tx.send_event(SweepEvent::GraphBuilt {
            workflow: graph.name.clone(),
            jobs: graph.job_total(),
            merges: graph.merges.len(),
        });
        Ok(graph)
    }

    /// Fold one iteration's outcome into the report and decide how to continue
    fn record(
        &mut self,
        params: &ParameterSet,
        iteration: u32,
        outcome: ServiceResult<WorkflowHandle>,
        report: &mut SweepReport,
    ) -> ServiceResult<Step> {
        let sequence_number = params.sequence_number;
        match outcome {
            Ok(handle) => {
                info!(
                    workflow = %handle.workflow,
                    total_events = params.total_events,
                    "Submitted simulation for {} {}-{}",
                    params.label(),
                    params.gamma1,
                    params.gamma2
                );
                self.event_tx.send_event(SweepEvent::Submitted {
                    sequence_number,
                    iteration,
                    handle: handle.clone(),
                });
                report.submitted.push(SubmissionRecord {
                    sequence_number,
                    iteration,
                    handle,
                });
                Ok(Step::Next)
            }
            Err(e) if e.is_recoverable() => {
                warn!(sequence_number, iteration, error = %e, "Skipping parameter set");
                let reason = e.to_string();
                self.event_tx
                    .send_event(SweepEvent::skipped(sequence_number, iteration, reason.clone()));
                report.skipped.push(SkippedSet {
                    sequence_number,
                    iteration,
                    reason,
                });
                Ok(Step::SkipSet)
            }
            Err(ServiceError::Submission(err)) => {
                let workflow = params.workflow_name(iteration);
                error!(workflow = %workflow, error = %err, "Submission failed");
                self.event_tx.send_event(SweepEvent::SubmissionFailed {
                    sequence_number,
                    iteration,
                    workflow: workflow.clone(),
                    message: err.to_string(),
                });
                match self.config.failure_policy {
                    FailurePolicy::FailFast => {
                        self.set_state(SchedulerState::Done);
                        Err(ServiceError::Submission(err))
                    }
                    FailurePolicy::Continue => {
                        report.failures.push(FailedSubmission {
                            sequence_number,
                            iteration,
                            workflow,
                            message: err.to_string(),
                        });
                        Ok(Step::SkipSet)
                    }
                }
            }
            Err(e) => {
                error!(sequence_number, iteration, error = %e, "Fatal error");
                self.set_state(SchedulerState::Done);
                Err(e)
            }
        }
    }

    /// Count down the pacing wait one second at a time
    async fn wait(&mut self) -> Step {
        let total = self.config.throttle.wait;
        self.set_state(SchedulerState::Waiting);
        info!(wait_secs = total.as_secs(), "Waiting before next submission");
        self.event_tx.send_event(SweepEvent::WaitStarted { total });

        let mut shutdown = self.shutdown.clone();
        let tick = Duration::from_secs(1);
        let mut remaining = total.as_secs();
        while remaining > 0 {
            self.event_tx.send_event(SweepEvent::countdown(remaining));
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Step::Cancelled,
                _ = self.sleeper.sleep(tick) => {}
            }
            remaining -= 1;
        }

        self.event_tx.send_event(SweepEvent::WaitFinished);
        Step::Next
    }

    fn set_state(&mut self, state: SchedulerState) {
        if self.state != state {
            self.state = state;
            self.event_tx.send_event(SweepEvent::state(state));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::clock::{shutdown_channel, ShutdownTrigger};
    use crate::execution::events::{progress_channel, ProgressReceiver};
    use crate::params::DecayMode;
    use crate::runners::SubmissionError;
    use crate::workflow::{Variant, PROCESSING_SUPPORT_FILES};

    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Writes the files the graph builder requires, optionally omitting one
    struct StubPreparer {
        omit: Option<String>,
    }

    #[async_trait::async_trait]
    impl InputPreparer for StubPreparer {
        async fn prepare(&self, request: &PreparationRequest) -> ServiceResult<PathBuf> {
            std::fs::create_dir_all(&request.data_dir)?;
            let names = Variant::ALL
                .iter()
                .map(|v| v.run_macro())
                .chain(PROCESSING_SUPPORT_FILES.iter().map(|s| s.to_string()));
            for name in names {
                if self.omit.as_deref() != Some(name.as_str()) {
                    std::fs::write(request.data_dir.join(&name), "")?;
                }
            }
            Ok(request.data_dir.clone())
        }
    }

    /// Records workflow names; fails the listed call numbers (1-based)
    #[derive(Clone, Default)]
    struct RecordingBackend {
        submitted: Arc<Mutex<Vec<String>>>,
        calls: Arc<AtomicUsize>,
        fail_on: Vec<usize>,
    }

    #[async_trait::async_trait]
    impl WorkflowBackend for RecordingBackend {
        async fn submit(
            &self,
            graph: &JobGraph,
            options: &SubmitOptions,
        ) -> Result<WorkflowHandle, SubmissionError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on.contains(&call) {
                return Err(SubmissionError::PlannerFailed {
                    code: Some(1),
                    stderr: "planner exploded".to_string(),
                });
            }
            self.submitted.lock().unwrap().push(graph.name.clone());
            Ok(WorkflowHandle {
                workflow: graph.name.clone(),
                submit_dir: None,
                submitted: options.submit,
            })
        }
    }

    /// Returns immediately and counts ticks
    #[derive(Clone, Default)]
    struct InstantSleeper {
        ticks: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Sleeper for InstantSleeper {
        async fn sleep(&self, _duration: Duration) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn params(sequence_number: usize, iterations: u32) -> ParameterSet {
        ParameterSet {
            sequence_number,
            element: "50".to_string(),
            isotope: "132".to_string(),
            decay_mode: DecayMode::BetaMinus,
            gamma1: format!("{}", 100 + sequence_number),
            gamma2: "200".to_string(),
            radius: "70".to_string(),
            total_events: 3000,
            batch_events: 1000,
            iterations,
        }
    }

    fn config(root: &Path, throttle: ThrottlePolicy) -> SchedulerConfig {
        SchedulerConfig {
            throttle,
            ..SchedulerConfig::new(root)
        }
    }

    fn drain(rx: &mut ProgressReceiver) -> Vec<SweepEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Submission numbers (1-based) followed by a wait
    fn waits_after(events: &[SweepEvent]) -> Vec<usize> {
        let mut submitted = 0;
        let mut waits = Vec::new();
        for event in events {
            match event {
                SweepEvent::Submitted { .. } => submitted += 1,
                SweepEvent::WaitStarted { .. } => waits.push(submitted),
                _ => {}
            }
        }
        waits
    }

    #[tokio::test]
    async fn test_batch_limited_pacing() {
        let temp = tempfile::tempdir().unwrap();
        let backend = RecordingBackend::default();
        let sleeper = InstantSleeper::default();
        let (tx, mut rx) = progress_channel();

        let mut scheduler = SubmissionScheduler::new(
            config(temp.path(), ThrottlePolicy::batch_limited(2, Duration::from_secs(3))),
            vec![params(0, 5)],
            StubPreparer { omit: None },
            backend.clone(),
        )
        .with_sleeper(sleeper.clone())
        .with_progress(tx);

        let report = scheduler.run().await.unwrap();

        assert_eq!(report.submitted.len(), 5);
        assert_eq!(report.waits, 2);
        assert!(report.is_success());
        assert_eq!(scheduler.state(), SchedulerState::Done);
        assert_eq!(sleeper.ticks.load(Ordering::SeqCst), 6);
        assert_eq!(waits_after(&drain(&mut rx)), vec![2, 4]);

        let names = backend.submitted.lock().unwrap().clone();
        assert_eq!(names[0], "ggac-z50.a132-100_200-i0");
        assert_eq!(names[4], "ggac-z50.a132-100_200-i4");
    }

    #[tokio::test]
    async fn test_simple_pacing_skips_final_wait() {
        let temp = tempfile::tempdir().unwrap();
        let (tx, mut rx) = progress_channel();

        let mut scheduler = SubmissionScheduler::new(
            config(temp.path(), ThrottlePolicy::simple(Duration::from_secs(2))),
            vec![params(0, 1), params(1, 1), params(2, 1)],
            StubPreparer { omit: None },
            RecordingBackend::default(),
        )
        .with_sleeper(InstantSleeper::default())
        .with_progress(tx);

        let report = scheduler.run().await.unwrap();
        assert_eq!(report.submitted.len(), 3);

        let events = drain(&mut rx);
        assert_eq!(waits_after(&events), vec![1, 2]);

        let ticks: Vec<Duration> = events
            .iter()
            .filter_map(|e| match e {
                SweepEvent::Countdown { remaining } => Some(*remaining),
                _ => None,
            })
            .collect();
        assert_eq!(
            ticks,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(1)
            ]
        );
    }

    #[tokio::test]
    async fn test_state_sequence() {
        let temp = tempfile::tempdir().unwrap();
        let (tx, mut rx) = progress_channel();

        let mut scheduler = SubmissionScheduler::new(
            config(temp.path(), ThrottlePolicy::simple(Duration::from_secs(1))),
            vec![params(0, 1), params(1, 1)],
            StubPreparer { omit: None },
            RecordingBackend::default(),
        )
        .with_sleeper(InstantSleeper::default())
        .with_progress(tx);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.remaining(), 2);

        scheduler.run().await.unwrap();

        let states: Vec<SchedulerState> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                SweepEvent::StateChanged { state } => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                SchedulerState::PreparingInputs,
                SchedulerState::Submitting,
                SchedulerState::PreparingInputs,
                SchedulerState::Waiting,
                SchedulerState::Submitting,
                SchedulerState::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_fail_fast_stops_queue() {
        let temp = tempfile::tempdir().unwrap();
        let backend = RecordingBackend {
            fail_on: vec![2],
            ..Default::default()
        };

        let mut scheduler = SubmissionScheduler::new(
            config(temp.path(), ThrottlePolicy::simple(Duration::ZERO)),
            vec![params(0, 1), params(1, 1), params(2, 1)],
            StubPreparer { omit: None },
            backend.clone(),
        )
        .with_sleeper(InstantSleeper::default());

        let result = scheduler.run().await;
        assert!(matches!(result, Err(ServiceError::Submission(_))));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.remaining(), 1);
        assert_eq!(scheduler.state(), SchedulerState::Done);
    }

    #[tokio::test]
    async fn test_continue_policy_records_failure() {
        let temp = tempfile::tempdir().unwrap();
        let backend = RecordingBackend {
            fail_on: vec![1],
            ..Default::default()
        };
        let mut cfg = config(temp.path(), ThrottlePolicy::simple(Duration::ZERO));
        cfg.failure_policy = FailurePolicy::Continue;

        let mut scheduler = SubmissionScheduler::new(
            cfg,
            vec![params(0, 3), params(1, 1)],
            StubPreparer { omit: None },
            backend.clone(),
        )
        .with_sleeper(InstantSleeper::default());

        let report = scheduler.run().await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].workflow, "ggac-z50.a132-100_200-i0");
        // Remaining iterations of the failed set are abandoned
        assert_eq!(report.submitted.len(), 1);
        assert_eq!(report.submitted[0].sequence_number, 1);
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_missing_input_skips_set() {
        let temp = tempfile::tempdir().unwrap();
        let backend = RecordingBackend::default();

        let mut scheduler = SubmissionScheduler::new(
            config(temp.path(), ThrottlePolicy::simple(Duration::ZERO)),
            vec![params(0, 2), params(1, 1)],
            StubPreparer {
                omit: Some("run_macro.z2.mac".to_string()),
            },
            backend.clone(),
        )
        .with_sleeper(InstantSleeper::default());

        let report = scheduler.run().await.unwrap();
        assert_eq!(report.skipped.len(), 2);
        assert!(report.skipped[0].reason.contains("run_macro.z2.mac"));
        assert!(report.submitted.is_empty());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_workflow_skips_set() {
        let temp = tempfile::tempdir().unwrap();
        let mut empty = params(0, 1);
        empty.total_events = 400;

        let mut scheduler = SubmissionScheduler::new(
            config(temp.path(), ThrottlePolicy::simple(Duration::ZERO)),
            vec![empty, params(1, 1)],
            StubPreparer { omit: None },
            RecordingBackend::default(),
        )
        .with_sleeper(InstantSleeper::default());

        let report = scheduler.run().await.unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].sequence_number, 0);
        assert_eq!(report.submitted.len(), 1);
    }

    #[tokio::test]
    async fn test_no_wait_when_remaining_sets_are_skipped() {
        let temp = tempfile::tempdir().unwrap();
        let sleeper = InstantSleeper::default();
        let mut empty = params(1, 1);
        empty.total_events = 400;

        let mut scheduler = SubmissionScheduler::new(
            config(temp.path(), ThrottlePolicy::simple(Duration::from_secs(3))),
            vec![params(0, 1), empty],
            StubPreparer { omit: None },
            RecordingBackend::default(),
        )
        .with_sleeper(sleeper.clone());

        let report = scheduler.run().await.unwrap();
        assert_eq!(report.submitted.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.waits, 0);
        assert_eq!(sleeper.ticks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wait_carries_over_skipped_set() {
        let temp = tempfile::tempdir().unwrap();
        let (tx, mut rx) = progress_channel();
        let mut empty = params(1, 1);
        empty.total_events = 400;

        let mut scheduler = SubmissionScheduler::new(
            config(temp.path(), ThrottlePolicy::simple(Duration::from_secs(3))),
            vec![params(0, 1), empty, params(2, 1)],
            StubPreparer { omit: None },
            RecordingBackend::default(),
        )
        .with_sleeper(InstantSleeper::default())
        .with_progress(tx);

        let report = scheduler.run().await.unwrap();
        assert_eq!(report.submitted.len(), 2);
        assert_eq!(report.waits, 1);
        assert_eq!(waits_after(&drain(&mut rx)), vec![1]);
    }

    #[tokio::test]
    async fn test_no_wait_after_tolerated_final_failure() {
        let temp = tempfile::tempdir().unwrap();
        let backend = RecordingBackend {
            fail_on: vec![2],
            ..Default::default()
        };
        let mut cfg = config(temp.path(), ThrottlePolicy::simple(Duration::from_secs(3)));
        cfg.failure_policy = FailurePolicy::Continue;

        let mut scheduler = SubmissionScheduler::new(
            cfg,
            vec![params(0, 1), params(1, 1)],
            StubPreparer { omit: None },
            backend.clone(),
        )
        .with_sleeper(InstantSleeper::default());

        let report = scheduler.run().await.unwrap();
        assert_eq!(report.submitted.len(), 1);
        assert_eq!(report.failures.len(), 1);
        // Only the wait ahead of the failed attempt runs
        assert_eq!(report.waits, 1);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancel_during_wait() {
        let temp = tempfile::tempdir().unwrap();
        let (trigger, signal) = shutdown_channel();
        let backend = RecordingBackend::default();

        /// Fires the shutdown on the first tick
        struct CancellingSleeper(ShutdownTrigger);

        #[async_trait::async_trait]
        impl Sleeper for CancellingSleeper {
            async fn sleep(&self, _duration: Duration) {
                self.0.trigger();
                std::future::pending::<()>().await;
            }
        }

        let mut scheduler = SubmissionScheduler::new(
            config(temp.path(), ThrottlePolicy::simple(Duration::from_secs(3600))),
            vec![params(0, 1), params(1, 1)],
            StubPreparer { omit: None },
            backend.clone(),
        )
        .with_sleeper(CancellingSleeper(trigger))
        .with_shutdown(signal);

        let report = scheduler.run().await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.waits, 0);
        assert_eq!(report.submitted.len(), 1);
        // The second set was prepared ahead of the wait but never submitted
        assert_eq!(scheduler.remaining(), 0);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let temp = tempfile::tempdir().unwrap();
        let (trigger, signal) = shutdown_channel();
        trigger.trigger();

        let mut scheduler = SubmissionScheduler::new(
            config(temp.path(), ThrottlePolicy::default()),
            vec![params(0, 1)],
            StubPreparer { omit: None },
            RecordingBackend::default(),
        )
        .with_shutdown(signal);

        let report = scheduler.run().await.unwrap();
        assert!(report.cancelled);
        assert!(report.submitted.is_empty());
    }
}
