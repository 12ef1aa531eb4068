use std::time::Duration;

use anyhow::{bail, Result};
use vlanctl::apply::{apply_plan, write_plan_to_dir, SystemRunner};
use vlanctl::compile::compile;
use vlanctl::report::render_apply_text;
use vlanctl::settings::load_network_file;

use crate::cli::{ApplyArgs, OutputFormat};
use crate::path_guard::ensure_out_dir_safe;

pub fn run_apply(args: ApplyArgs) -> Result<()> {
    let file = load_network_file(&args.file)?;
    let plan = compile(&file.store, &file.settings);

    if let Some(dir) = &args.dry_run {
        ensure_out_dir_safe(dir, &args.file)?;
        let written = write_plan_to_dir(&plan, &file.settings, dir)?;
        for path in written {
            println!("wrote {}", path.display());
        }
        return Ok(());
    }

    let runner = SystemRunner::new(Duration::from_secs(file.settings.command_timeout_secs));
    let report = crate::runtime()?.block_on(apply_plan(&plan, &file.settings, &runner))?;

    match args.format {
        OutputFormat::Text => println!("{}", render_apply_text(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if report.failures() > 0 {
        bail!("apply finished with {} failed steps", report.failures());
    }
    Ok(())
}
