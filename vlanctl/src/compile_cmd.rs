use anyhow::Result;
use vlanctl::apply::write_plan_to_dir;
use vlanctl::compile::compile;
use vlanctl::report::{render_plan_text, PlanSummary};
use vlanctl::settings::load_network_file;

use crate::cli::{CompileArgs, OutputFormat};
use crate::path_guard::ensure_out_dir_safe;

pub fn run_compile(args: CompileArgs) -> Result<()> {
    let file = load_network_file(&args.file)?;
    let plan = compile(&file.store, &file.settings);
    let summary = PlanSummary::from_plan(&plan);

    if let Some(out_dir) = &args.out_dir {
        ensure_out_dir_safe(out_dir, &args.file)?;
        let written = write_plan_to_dir(&plan, &file.settings, out_dir)?;
        match args.format {
            OutputFormat::Text => {
                println!("{}", render_plan_text(&summary));
                for path in &written {
                    println!("wrote {}", path.display());
                }
            }
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        }
        return Ok(());
    }

    match args.format {
        OutputFormat::Text => {
            println!("{}", render_plan_text(&summary));
            println!("# netplan");
            print!("{}", plan.netplan.to_yaml()?);
            println!("# nftables");
            print!("{}", plan.firewall.render());
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }
    Ok(())
}
