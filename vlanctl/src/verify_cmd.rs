use anyhow::{bail, Result};
use vlanctl::compile::compile;
use vlanctl::findings::warning_count;
use vlanctl::report::render_findings;
use vlanctl::settings::load_network_file;

use crate::cli::{OutputFormat, VerifyArgs};

pub fn run_verify(args: VerifyArgs) -> Result<()> {
    let file = load_network_file(&args.file)?;
    let plan = compile(&file.store, &file.settings);
    let warnings = warning_count(&plan.findings);

    match args.format {
        OutputFormat::Text => {
            println!("{}", render_findings(&plan.findings));
            println!("result warnings={warnings}");
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan.findings)?),
    }

    if args.strict && warnings > 0 {
        bail!("verify failed in strict mode: {warnings} warnings");
    }
    Ok(())
}
