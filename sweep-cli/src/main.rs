mod commands;
mod logging;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::Result;

use commands::plan::PlanArgs;
use commands::prepare::PrepareArgs;
use commands::run::RunArgs;
use commands::validate::ValidateArgs;

/// Prepare, plan and pace GGAC simulation workflow submissions
#[derive(Parser, Debug)]
#[command(name = "ggac-sweep", version, about)]
struct Cli {
    /// Settings file (default: sweep.yml in the project root)
    #[arg(long, global = true, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Project root holding inputs/ (default: detected from the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    project_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit every parameter set in the queue, pacing between submissions
    Run(RunArgs),

    /// Prepare inputs and plan a single workflow
    Plan(PlanArgs),

    /// Write the input files for a single parameter set
    Prepare(PrepareArgs),

    /// Check the parameter file and show job counts
    Validate(ValidateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    logging::init_logging();

    let cli = Cli::parse();
    let context = commands::Context::load(cli.settings.as_deref(), cli.project_root.as_deref())?;

    match cli.command {
        Command::Run(args) => commands::run::execute(context, args).await,
        Command::Plan(args) => commands::plan::execute(context, args).await,
        Command::Prepare(args) => commands::prepare::execute(context, args).await,
        Command::Validate(args) => commands::validate::execute(context, args),
    }
}
