use anyhow::{Context, Result};
use vlanctl::interfaces::{parent_choices, read_interface_names};
use vlanctl::report::render_interface_choices;
use vlanctl::settings::{load_network_file, NetworkFile};
use vlanctl::store::NetworkRepository;

use crate::cli::{InterfacesArgs, OutputFormat};

pub fn run_interfaces(args: InterfacesArgs) -> Result<()> {
    let names = read_interface_names(&args.sys_class_net)
        .with_context(|| format!("failed to list {}", args.sys_class_net.display()))?;
    let file = match &args.file {
        Some(path) => load_network_file(path)?,
        None => NetworkFile::default(),
    };
    let choices = parent_choices(&names, &file.store.networks());

    match args.format {
        OutputFormat::Text => println!("{}", render_interface_choices(&choices)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&choices)?),
    }
    Ok(())
}
