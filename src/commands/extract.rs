use anyhow::Result;
use tracing::info;

use tds_eval::dataset::annotate_sections;

use crate::cli::ExtractArgs;

pub fn run(args: ExtractArgs) -> Result<()> {
    let output = args.resolved_output();
    info!(
        input = %args.input.display(),
        column = %args.column,
        "extracting ground-truth sections"
    );

    let summary = annotate_sections(&args.input, &output, &args.column)?;

    info!(
        path = %output.display(),
        rows = summary.rows,
        rows_with_sections = summary.rows_with_sections,
        "wrote annotated dataset"
    );
    Ok(())
}
