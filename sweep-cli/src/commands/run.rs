use crate::commands::{exit_with, Context};
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use sweep_service::error::{EXIT_CANCELLED, EXIT_FAILURE};
use sweep_service::execution::{format_countdown, progress_channel, shutdown_channel};
use sweep_service::{
    FailurePolicy, FilePreparer, ParameterExpander, PegasusBackend, SubmissionScheduler,
    SweepEvent, ThrottleMode, ThrottlePolicy,
};

/// Submit every parameter set in the queue
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Parameter file (default: parameter_file from the settings)
    pub file: Option<PathBuf>,

    /// Record submission failures and move on instead of stopping
    #[arg(long)]
    pub continue_on_error: bool,

    /// Plan workflows without submitting them
    #[arg(long)]
    pub no_submit: bool,

    /// Override the wait between submissions, in hours
    #[arg(long, value_name = "HOURS")]
    pub wait_hours: Option<f64>,

    /// Override the merge fan-in limit
    #[arg(long, value_name = "N")]
    pub merge_limit: Option<usize>,
}

pub async fn execute(context: Context, args: RunArgs) -> Result<()> {
    let mut settings = context.settings;
    if args.continue_on_error {
        settings.failure_policy = FailurePolicy::Continue;
    }
    if args.no_submit {
        settings.submit = false;
    }
    if let Some(hours) = args.wait_hours {
        settings.throttle.wait_hours = Some(hours);
    }
    if let Some(limit) = args.merge_limit {
        settings.merge_limit = limit;
    }
    if settings.submit {
        settings.validate_for_submission()?;
    } else {
        settings.validate()?;
    }

    let path = args
        .file
        .unwrap_or_else(|| settings.parameter_path(&context.project_root));
    if !path.exists() {
        color_eyre::eyre::bail!("Parameter file not found: {}", path.display());
    }

    // Every row is parsed before the first submission
    let queue = ParameterExpander::load_file(&path).unwrap_or_else(|e| exit_with(&e));
    let config = settings.scheduler_config(&context.project_root);
    describe_pacing(&config.throttle);

    let (tx, mut rx) = progress_channel();
    let (trigger, shutdown) = shutdown_channel();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.trigger();
        }
    });

    let mut scheduler = SubmissionScheduler::new(
        config,
        queue,
        FilePreparer::for_project(&context.project_root),
        PegasusBackend::new(settings.backend.clone(), &context.project_root),
    )
    .with_progress(tx)
    .with_shutdown(shutdown);

    // Spawn the scheduler in background
    let run_handle = tokio::spawn(async move { scheduler.run().await });

    // Process events in the foreground
    let mut counting_down = false;
    while let Some(event) = rx.recv().await {
        if counting_down && !matches!(event, SweepEvent::Countdown { .. }) {
            output::end_countdown();
            counting_down = false;
        }

        match event {
            SweepEvent::SweepStarted {
                total_sets,
                total_submissions,
            } => {
                output::header(&format!(
                    "Sweep: {} parameter set(s), {} submission(s)",
                    total_sets, total_submissions
                ));
            }

            SweepEvent::InputsPrepared { dir, .. } => {
                output::status("Prepared", &format!("{}", dir.display()));
            }

            SweepEvent::GraphBuilt {
                workflow,
                jobs,
                merges,
            } => {
                output::status(
                    "Planning",
                    &format!("{} ({} jobs, {} merges)", workflow, jobs, merges),
                );
            }

            SweepEvent::Submitted { handle, .. } => {
                let verb = if handle.submitted { "Submitted" } else { "Planned" };
                output::success(&format!("{} {}", verb, handle.workflow));
                if let Some(dir) = &handle.submit_dir {
                    output::dim(&format!("    {}", dir.display()));
                }
            }

            SweepEvent::SetSkipped {
                sequence_number,
                reason,
                ..
            } => {
                output::warning(&format!(
                    "Parameter set #{} skipped: {}",
                    sequence_number, reason
                ));
            }

            SweepEvent::SubmissionFailed {
                workflow, message, ..
            } => {
                output::failure(&format!("{}: {}", workflow, message));
            }

            SweepEvent::WaitStarted { total } => {
                output::info(&format!("Waiting {} before the next submission", format_countdown(total)));
            }

            SweepEvent::Countdown { remaining } => {
                output::countdown(&format_countdown(remaining));
                counting_down = true;
            }

            SweepEvent::Cancelled => {
                output::warning("Cancelled, no further submissions");
            }

            SweepEvent::SweepCompleted {
                submitted,
                skipped,
                failed,
                duration,
            } => {
                println!();
                let summary = format!(
                    "{} submitted, {} skipped, {} failed in {}",
                    submitted,
                    skipped,
                    failed,
                    format_countdown(duration)
                );
                if failed == 0 && skipped == 0 {
                    output::success(&summary);
                } else {
                    output::failure(&summary);
                }
            }

            SweepEvent::StateChanged { .. } | SweepEvent::WaitFinished => {}
        }
    }

    let report = match run_handle.await? {
        Ok(report) => report,
        Err(e) => exit_with(&e),
    };

    if report.cancelled {
        std::process::exit(EXIT_CANCELLED);
    }
    if !report.failures.is_empty() {
        std::process::exit(EXIT_FAILURE);
    }

    Ok(())
}

fn describe_pacing(policy: &ThrottlePolicy) {
    let wait = format_countdown(policy.wait);
    match policy.mode {
        ThrottleMode::Simple => {
            output::info(&format!("Pacing: wait {} after every submission", wait));
        }
        ThrottleMode::BatchLimited { batch_limit } => {
            output::info(&format!(
                "Pacing: wait {} after each submission while other sets remain, then after every {} submission(s) of the last set",
                wait, batch_limit
            ));
        }
    }
}
