use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "vlanctl")]
#[command(about = "Compile logical VLAN networks into host network configuration")]
pub struct Cli {
    /// Enable debug logging (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Compile a network file and print or write the artifacts.
    Compile(CompileArgs),
    /// Compile a network file and report findings only.
    Verify(VerifyArgs),
    /// Compile, write the artifacts and activate them.
    Apply(ApplyArgs),
    /// Re-apply whenever the network file changes.
    Watch(WatchArgs),
    /// Manage logical networks.
    #[command(subcommand)]
    Network(NetworkCommand),
    /// Manage port forwards on internet networks.
    #[command(subcommand)]
    Forward(ForwardCommand),
    /// Manage DHCP address reservations.
    #[command(subcommand)]
    Reservation(ReservationCommand),
    /// List host interfaces usable as VLAN parents.
    Interfaces(InterfacesArgs),
}

#[derive(Parser, Debug)]
pub struct CompileArgs {
    pub file: PathBuf,
    /// Write every artifact into this directory instead of printing.
    #[arg(long)]
    pub out_dir: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct VerifyArgs {
    pub file: PathBuf,
    /// Fail when any warning is reported.
    #[arg(long)]
    pub strict: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct ApplyArgs {
    pub file: PathBuf,
    /// Render into this directory and run nothing.
    #[arg(long, value_name = "DIR")]
    pub dry_run: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct WatchArgs {
    pub file: PathBuf,
    /// Seconds between modification checks.
    #[arg(long, default_value_t = 2)]
    pub interval: u64,
}

#[derive(Parser, Debug)]
pub struct InterfacesArgs {
    /// Network file whose networks mark interfaces as used.
    #[arg(long)]
    pub file: Option<PathBuf>,
    #[arg(long, default_value = "/sys/class/net")]
    pub sys_class_net: PathBuf,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(clap::Subcommand, Debug)]
pub enum NetworkCommand {
    /// List networks with their forwards and reservations.
    List(FileArg),
    /// Add a network.
    Add(NetworkAddArgs),
    /// Remove a network and everything it owns.
    Remove(RemoveArgs),
}

#[derive(clap::Subcommand, Debug)]
pub enum ForwardCommand {
    Add(ForwardAddArgs),
    Remove(RemoveArgs),
}

#[derive(clap::Subcommand, Debug)]
pub enum ReservationCommand {
    Add(ReservationAddArgs),
    Remove(RemoveArgs),
}

#[derive(Parser, Debug)]
pub struct FileArg {
    pub file: PathBuf,
}

#[derive(Parser, Debug)]
pub struct RemoveArgs {
    pub file: PathBuf,
    pub id: String,
}

#[derive(Parser, Debug)]
pub struct NetworkAddArgs {
    pub file: PathBuf,
    #[arg(long)]
    pub id: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub parent: Option<String>,
    #[arg(long)]
    pub vlan_id: Option<u16>,
    #[arg(long, value_enum, default_value_t = RoleArg::Network)]
    pub role: RoleArg,
    /// Static address in CIDR form; repeat for more. Without any the network uses DHCP.
    #[arg(long = "address")]
    pub addresses: Vec<String>,
    /// Route through this network (id or interface name).
    #[arg(long)]
    pub via: Option<String>,
    #[arg(long)]
    pub gateway4: Option<String>,
    #[arg(long)]
    pub gateway6: Option<String>,
    /// Serve DHCP on the network.
    #[arg(long)]
    pub dhcp_server: bool,
    /// DHCP range as `start-end`; repeat for more.
    #[arg(long = "range")]
    pub ranges: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct ForwardAddArgs {
    pub file: PathBuf,
    /// Internet network receiving the forward.
    #[arg(long)]
    pub network: String,
    #[arg(long)]
    pub id: String,
    #[arg(long, value_enum)]
    pub protocol: ProtocolArg,
    #[arg(long, default_value = "")]
    pub src_port: String,
    #[arg(long, default_value = "")]
    pub dst_ip: String,
    #[arg(long)]
    pub dst_port: Option<String>,
    /// Upstream origin for `https` forwards.
    #[arg(long)]
    pub origin: Option<String>,
    /// Public domain for `https` forwards.
    #[arg(long)]
    pub domain: Option<String>,
}

#[derive(Parser, Debug)]
pub struct ReservationAddArgs {
    pub file: PathBuf,
    #[arg(long)]
    pub network: String,
    #[arg(long)]
    pub id: String,
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub mac: String,
    #[arg(long)]
    pub ip: String,
    #[arg(long)]
    pub hostname: Option<String>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum RoleArg {
    Network,
    Bridge,
    Internet,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum ProtocolArg {
    Tcp,
    Udp,
    #[value(name = "tcp+udp")]
    TcpUdp,
    Https,
}
