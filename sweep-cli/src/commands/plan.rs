use crate::commands::{exit_with, Context, NuclideArgs};
use crate::output;

use clap::builder::BoolishValueParser;
use clap::Args;
use color_eyre::Result;

use sweep_service::{
    prepare_row, FilePreparer, GraphBuilder, InputCatalog, PegasusBackend, ServiceError,
    WorkflowBackend,
};

/// Prepare inputs, build the job graph and hand it to the planner
#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub nuclide: NuclideArgs,

    /// Total number of simulated events
    #[arg(short = 'e', long = "total-events", value_name = "N")]
    pub total_events: String,

    /// Events per simulation job
    #[arg(short = 'b', long = "batch-events", value_name = "N")]
    pub batch_events: String,

    /// Submit the planned workflow (true) or only plan it (false)
    #[arg(long, value_name = "BOOL", required = true, action = clap::ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub submit: bool,

    /// Iteration index used in the workflow name
    #[arg(long, default_value_t = 0)]
    pub iteration: u32,

    /// Build and validate the graph without invoking the planner
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn execute(context: Context, args: PlanArgs) -> Result<()> {
    let row = args.nuclide.to_row(&args.total_events, &args.batch_events);
    let settings = &context.settings;

    let preparer = FilePreparer::for_project(&context.project_root);
    let (params, data_dir) = prepare_row(&preparer, &row, &context.project_root, None)
        .await
        .unwrap_or_else(|e| exit_with(&e));
    output::status("Prepared", &format!("{}", data_dir.display()));

    let catalog = InputCatalog::scan(&data_dir)?;
    let graph = match GraphBuilder::new(settings.merge_limit).build(&params, args.iteration, &catalog) {
        Ok(graph) => graph,
        Err(e) => exit_with(&e),
    };

    output::check(&format!(
        "Graph '{}': {} simulation, {} processing, {} merge jobs",
        graph.name,
        graph.simulations.len(),
        graph.processing.len(),
        graph.merges.len()
    ));
    for (depth, level) in graph.levels()?.iter().enumerate() {
        output::dim(&format!("  level {}: {} jobs", depth, level.len()));
    }

    if args.dry_run {
        println!();
        output::success("Dry run complete, planner not invoked");
        return Ok(());
    }

    let mut options = settings.submit_options();
    options.submit = args.submit;

    let backend = PegasusBackend::new(settings.backend.clone(), &context.project_root);
    output::status("Planning", &graph.name);
    let handle = match backend.submit(&graph, &options).await {
        Ok(handle) => handle,
        Err(e) => exit_with(&ServiceError::from(e)),
    };

    if let Some(dir) = &handle.submit_dir {
        output::info(&format!("Submit directory: {}", dir.display()));
    }
    println!();
    if handle.submitted {
        output::success(&format!("Submitted workflow '{}'", handle.workflow));
    } else {
        output::success(&format!("Planned workflow '{}'", handle.workflow));
    }

    Ok(())
}
