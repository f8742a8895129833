use crate::commands::{exit_with, Context, NuclideArgs};
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use sweep_service::{prepare_row, FilePreparer, InputCatalog};

/// Write decay, evaporation, multipole and run-macro files for one parameter set
#[derive(Args, Debug)]
pub struct PrepareArgs {
    #[command(flatten)]
    pub nuclide: NuclideArgs,

    /// Events per simulation job
    #[arg(short = 'b', long = "batch-events", value_name = "N")]
    pub batch_events: String,

    /// Target directory (default: inputs/user-data/<label> under the project root)
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,
}

pub async fn execute(context: Context, args: PrepareArgs) -> Result<()> {
    let row = args.nuclide.to_row(&args.batch_events, &args.batch_events);
    let preparer = FilePreparer::for_project(&context.project_root);
    let (params, written) = prepare_row(&preparer, &row, &context.project_root, args.data_dir)
        .await
        .unwrap_or_else(|e| exit_with(&e));
    output::status("Prepared", &format!("{} ({})", written.display(), params.label()));

    let catalog = InputCatalog::scan(&written)?;
    for file in catalog.files() {
        output::dim(&format!("  {}", file));
    }
    println!();
    output::success(&format!("{} input files in {}", catalog.len(), written.display()));

    Ok(())
}
