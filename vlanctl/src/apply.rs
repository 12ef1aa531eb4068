//! External apply step.
//!
//! Writes a [`CompiledPlan`]'s artifacts and runs the commands that activate
//! them, then brings up each network's services and stops those of networks
//! that are gone. Only rendering and writing the shared artifacts can fail
//! the pass; every command failure is recorded in the [`ApplyReport`] and the
//! remaining steps still run. Nothing is rolled back.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use netcfg_core::{write_artifact, RenderError, WriteError};
use serde::Serialize;
use thiserror::Error;

use crate::compile::{BringUp, CompiledPlan};
use crate::dhcp_hook::{render_watch_unit, DISPATCHER_UNIT, WATCH_UNIT};
use crate::settings::{HookStrategy, Settings};
use crate::{dhcp_server, reverse_proxy};

/// Errors that abort an apply pass.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Errors from launching a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("empty command line")]
    Empty,
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Runs external commands for the apply step.
pub trait CommandRunner {
    fn run(&self, argv: &[String]) -> impl Future<Output = Result<CommandOutput, CommandError>> + Send;
}

/// Runs commands with `tokio::process`, bounded by a timeout.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for SystemRunner {
    async fn run(&self, argv: &[String]) -> Result<CommandOutput, CommandError> {
        let (program, args) = argv.split_first().ok_or(CommandError::Empty)?;
        let mut command = tokio::process::Command::new(program);
        command.args(args).kill_on_drop(true);
        tracing::debug!(command = %argv.join(" "), "running command");
        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(result) => result.map_err(|source| CommandError::Spawn {
                program: program.clone(),
                source,
            })?,
            Err(_) => {
                return Err(CommandError::Timeout {
                    program: program.clone(),
                    secs: self.timeout.as_secs(),
                })
            }
        };
        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Outcome of one apply step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    /// Network id, or `plan` for shared artifacts.
    pub entity: String,
    pub step: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub steps: Vec<StepOutcome>,
}

impl ApplyReport {
    pub fn failures(&self) -> usize {
        self.steps.iter().filter(|s| !s.ok).count()
    }

    fn record(&mut self, entity: &str, step: &str, result: Result<(), String>) -> bool {
        let ok = result.is_ok();
        let detail = result.err();
        if let Some(detail) = &detail {
            tracing::warn!(entity, step, "{detail}");
        }
        self.steps.push(StepOutcome {
            entity: entity.to_string(),
            step: step.to_string(),
            ok,
            detail,
        });
        ok
    }
}

const PLAN_ENTITY: &str = "plan";

/// Write the plan's artifacts and activate them.
pub async fn apply_plan<R: CommandRunner>(
    plan: &CompiledPlan,
    settings: &Settings,
    runner: &R,
) -> Result<ApplyReport, ApplyError> {
    let mut report = ApplyReport::default();
    let paths = &settings.paths;
    let commands = &settings.commands;

    tracing::info!(path = %paths.netplan.display(), "writing netplan document");
    write_artifact(&paths.netplan, &plan.netplan.to_yaml()?, Some(0o600))?;
    run_step(runner, &mut report, PLAN_ENTITY, "netplan apply", commands.netplan_apply.clone()).await;

    write_artifact(&paths.dhcp_hook, &plan.dhcp_hook, Some(0o755))?;
    let systemctl = |args: &[&str]| -> Vec<String> {
        std::iter::once(commands.systemctl.clone())
            .chain(args.iter().map(|a| a.to_string()))
            .collect()
    };
    match plan.hook_strategy {
        HookStrategy::Event => {
            run_step(runner, &mut report, PLAN_ENTITY, "restart dhcp hook", systemctl(&["restart", DISPATCHER_UNIT])).await;
        }
        HookStrategy::Polling => {
            let script = paths.dhcp_hook.display().to_string();
            write_artifact(&paths.watch_unit, &render_watch_unit(&script), Some(0o644))?;
            run_step(runner, &mut report, PLAN_ENTITY, "daemon-reload", systemctl(&["daemon-reload"])).await;
            run_step(runner, &mut report, PLAN_ENTITY, "enable dhcp watcher", systemctl(&["enable", WATCH_UNIT])).await;
            run_step(runner, &mut report, PLAN_ENTITY, "restart dhcp watcher", systemctl(&["restart", WATCH_UNIT])).await;
        }
    }

    write_artifact(&paths.nftables, &plan.firewall.render(), Some(0o644))?;
    let mut nft = commands.nft_load.clone();
    nft.push(paths.nftables.display().to_string());
    run_step(runner, &mut report, PLAN_ENTITY, "load firewall", nft).await;

    for entry in &plan.bring_up {
        bring_up(entry, settings, runner, &mut report).await;
    }
    retire_stale_units(plan, settings, runner, &mut report).await;

    tracing::info!(
        steps = report.steps.len(),
        failures = report.failures(),
        "apply pass finished"
    );
    Ok(report)
}

/// Sync one network's DHCP server and reverse-proxy units.
async fn bring_up<R: CommandRunner>(
    entry: &BringUp,
    settings: &Settings,
    runner: &R,
    report: &mut ApplyReport,
) {
    let systemctl = &settings.commands.systemctl;
    let entity = entry.network.as_str();

    let unit = dhcp_server::unit_name(&entry.interface);
    let config = dnsmasq_path(&settings.paths.dnsmasq_dir, &entry.interface);
    sync_unit(runner, report, entity, systemctl, &unit, &config, entry.dhcp_server.as_deref()).await;

    let unit = reverse_proxy::unit_name(&entry.network);
    let config = caddyfile_path(&settings.paths.caddy_dir, &entry.network);
    let caddyfile = entry.proxy.as_ref().map(|proxy| proxy.caddyfile.as_str());
    sync_unit(runner, report, entity, systemctl, &unit, &config, caddyfile).await;
}

/// Write `contents` to `path` and restart `unit`, or stop and disable it when there is none.
async fn sync_unit<R: CommandRunner>(
    runner: &R,
    report: &mut ApplyReport,
    entity: &str,
    systemctl: &str,
    unit: &str,
    path: &Path,
    contents: Option<&str>,
) {
    let argv = |args: &[&str]| -> Vec<String> {
        std::iter::once(systemctl.to_string())
            .chain(args.iter().map(|a| a.to_string()))
            .chain(std::iter::once(unit.to_string()))
            .collect()
    };
    let Some(contents) = contents else {
        run_step(runner, report, entity, &format!("disable {unit}"), argv(&["disable", "--now"])).await;
        if path.exists() {
            let removed = std::fs::remove_file(path).map_err(|err| err.to_string());
            report.record(entity, &format!("remove {}", path.display()), removed);
        }
        return;
    };
    let written = write_artifact(path, contents, Some(0o644)).map_err(|err| err.to_string());
    if !report.record(entity, &format!("write {}", path.display()), written) {
        return;
    }
    if run_step(runner, report, entity, &format!("enable {unit}"), argv(&["enable"])).await {
        run_step(runner, report, entity, &format!("restart {unit}"), argv(&["restart"])).await;
    }
}

/// Stop the services of networks that left the plan.
///
/// Every config file under the dnsmasq and Caddy directories belongs to a unit
/// an earlier pass started. Those without a counterpart in `plan` are disabled
/// and their config removed.
async fn retire_stale_units<R: CommandRunner>(
    plan: &CompiledPlan,
    settings: &Settings,
    runner: &R,
    report: &mut ApplyReport,
) {
    let systemctl = &settings.commands.systemctl;

    let interfaces: HashSet<&str> = plan.bring_up.iter().map(|b| b.interface.as_str()).collect();
    let dnsmasq_configs = config_names(&settings.paths.dnsmasq_dir, |path| {
        let interface = file_name(path)?.strip_suffix(".conf")?;
        path.is_file().then(|| interface.to_string())
    });
    for interface in dnsmasq_configs {
        if interfaces.contains(interface.as_str()) {
            continue;
        }
        tracing::info!(interface = %interface, "retiring dhcp server of removed network");
        let unit = dhcp_server::unit_name(&interface);
        let config = dnsmasq_path(&settings.paths.dnsmasq_dir, &interface);
        sync_unit(runner, report, &interface, systemctl, &unit, &config, None).await;
    }

    let networks: HashSet<&str> = plan.bring_up.iter().map(|b| b.network.as_str()).collect();
    let caddy_configs = config_names(&settings.paths.caddy_dir, |path| {
        let network = file_name(path)?;
        path.join("Caddyfile").is_file().then(|| network.to_string())
    });
    for network in caddy_configs {
        if networks.contains(network.as_str()) {
            continue;
        }
        tracing::info!(network = %network, "retiring reverse proxy of removed network");
        let unit = reverse_proxy::unit_name(&network);
        let config = caddyfile_path(&settings.paths.caddy_dir, &network);
        sync_unit(runner, report, &network, systemctl, &unit, &config, None).await;
    }
}

/// Sorted names picked by `name_of` from the entries of `dir`; empty when `dir` is unreadable.
fn config_names(dir: &Path, name_of: impl Fn(&Path) -> Option<String>) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| name_of(&entry.path()))
        .collect();
    names.sort();
    names
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

async fn run_step<R: CommandRunner>(
    runner: &R,
    report: &mut ApplyReport,
    entity: &str,
    step: &str,
    argv: Vec<String>,
) -> bool {
    let result = match runner.run(&argv).await {
        Ok(output) if output.success() => Ok(()),
        Ok(output) => Err(format!(
            "`{}` failed with {}: {}",
            argv.join(" "),
            output
                .status
                .map_or_else(|| "signal".to_string(), |code| format!("exit code {code}")),
            output.stderr.trim()
        )),
        Err(err) => Err(err.to_string()),
    };
    report.record(entity, step, result)
}

pub fn dnsmasq_path(dir: &Path, interface: &str) -> PathBuf {
    dir.join(format!("{interface}.conf"))
}

pub fn caddyfile_path(dir: &Path, network: &str) -> PathBuf {
    dir.join(network).join("Caddyfile")
}

/// Render every artifact of `plan` under `dir` without running anything.
///
/// Returns the written paths in order.
pub fn write_plan_to_dir(plan: &CompiledPlan, settings: &Settings, dir: &Path) -> Result<Vec<PathBuf>, ApplyError> {
    let mut files: Vec<(PathBuf, String)> = vec![
        (dir.join("netplan.yaml"), plan.netplan.to_yaml()?),
        (dir.join("vlanctl.nft"), plan.firewall.render()),
        (dir.join("dhcp-hook.sh"), plan.dhcp_hook.clone()),
    ];
    if plan.hook_strategy == HookStrategy::Polling {
        let script = settings.paths.dhcp_hook.display().to_string();
        files.push((dir.join(WATCH_UNIT), render_watch_unit(&script)));
    }
    for entry in &plan.bring_up {
        if let Some(conf) = &entry.dhcp_server {
            files.push((dnsmasq_path(&dir.join("dnsmasq"), &entry.interface), conf.clone()));
        }
        if let Some(proxy) = &entry.proxy {
            files.push((caddyfile_path(&dir.join("caddy"), &entry.network), proxy.caddyfile.clone()));
        }
    }
    let mut written = Vec::with_capacity(files.len());
    for (path, contents) in files {
        write_artifact(&path, &contents, None)?;
        written.push(path);
    }
    Ok(written)
}
