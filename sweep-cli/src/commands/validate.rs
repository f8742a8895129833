use crate::commands::{exit_with, Context};
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;
use serde::Serialize;

use sweep_service::workflow::PROCESSING_SUPPORT_FILES;
use sweep_service::{GraphBuilder, InputCatalog, ParameterExpander, ParameterSet, Variant};

/// Validate the parameter file and show the jobs each set expands to
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Parameter file (default: parameter_file from the settings)
    pub file: Option<PathBuf>,

    /// Print the summary as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct SetSummary {
    sequence_number: usize,
    label: String,
    decay_mode: String,
    iterations: u32,
    jobs_per_variant: u64,
    merges_per_variant: u64,
    /// Job count per graph level; empty when the set expands to no jobs
    levels: Vec<usize>,
}

#[derive(Debug, Serialize)]
struct ValidationSummary {
    parameter_file: PathBuf,
    merge_limit: usize,
    total_submissions: u64,
    sets: Vec<SetSummary>,
}

pub fn execute(context: Context, args: ValidateArgs) -> Result<()> {
    let path = args
        .file
        .unwrap_or_else(|| context.settings.parameter_path(&context.project_root));

    if !path.exists() {
        color_eyre::eyre::bail!("Parameter file not found: {}", path.display());
    }

    if !args.json {
        output::status("Validating", &format!("{}", path.display()));
    }

    let sets = ParameterExpander::load_file(&path).unwrap_or_else(|e| exit_with(&e));
    let merge_limit = context.settings.merge_limit;

    let summaries: Vec<SetSummary> = sets
        .iter()
        .map(|params| summarize(params, merge_limit))
        .collect();

    if args.json {
        let summary = ValidationSummary {
            parameter_file: path,
            merge_limit,
            total_submissions: sets.iter().map(|p| u64::from(p.iterations)).sum(),
            sets: summaries,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    output::check(&format!("{} parameter set(s) parsed", summaries.len()));
    for summary in &summaries {
        if summary.levels.is_empty() {
            output::warning(&format!(
                "#{} {}: event counts round to zero jobs, set will be skipped",
                summary.sequence_number, summary.label
            ));
            continue;
        }
        let levels: Vec<String> = summary.levels.iter().map(|n| n.to_string()).collect();
        output::check(&format!(
            "#{} {} ({}): {} jobs and {} merge(s) per variant, {} iteration(s), levels {}",
            summary.sequence_number,
            summary.label,
            summary.decay_mode,
            summary.jobs_per_variant,
            summary.merges_per_variant,
            summary.iterations,
            levels.join("/")
        ));
    }

    println!();
    output::success("Parameter file is valid");

    Ok(())
}

/// Expand a set against a synthetic catalog holding every required input
fn summarize(params: &ParameterSet, merge_limit: usize) -> SetSummary {
    let jobs = params.job_count();
    let limit = merge_limit.max(1) as u64;

    let required = Variant::ALL
        .iter()
        .map(|v| v.run_macro())
        .chain(PROCESSING_SUPPORT_FILES.iter().map(|s| s.to_string()));
    let catalog = InputCatalog::from_files(params.label(), required);

    let levels = GraphBuilder::new(merge_limit)
        .build(params, 0, &catalog)
        .ok()
        .and_then(|graph| {
            let levels = graph.levels().ok()?;
            Some(levels.iter().map(|level| level.len()).collect())
        })
        .unwrap_or_default();

    SetSummary {
        sequence_number: params.sequence_number,
        label: params.label(),
        decay_mode: params.decay_mode.to_string(),
        iterations: params.iterations,
        jobs_per_variant: jobs,
        merges_per_variant: jobs.div_ceil(limit),
        levels,
    }
}
