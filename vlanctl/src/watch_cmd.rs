use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::Result;
use vlanctl::apply::{apply_plan, SystemRunner};
use vlanctl::apply_queue::{apply_queue, ApplyTrigger};
use vlanctl::compile::compile;
use vlanctl::findings::warning_count;
use vlanctl::settings::load_network_file;

use crate::cli::WatchArgs;

pub fn run_watch(args: WatchArgs) -> Result<()> {
    let interval = Duration::from_secs(args.interval.max(1));
    crate::runtime()?.block_on(watch(args.file, interval));
    Ok(())
}

async fn watch(path: PathBuf, interval: Duration) {
    let (trigger, worker) = apply_queue();
    trigger.request();
    tokio::spawn(poll_changes(path.clone(), interval, trigger));
    let passes = worker.run(|| apply_once(path.clone())).await;
    tracing::info!(passes, "watch stopped");
}

async fn poll_changes(path: PathBuf, interval: Duration, trigger: ApplyTrigger) {
    let mut last = modified(&path);
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let current = modified(&path);
        if current != last {
            tracing::info!(path = %path.display(), "network file changed");
            last = current;
            trigger.request();
        }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

async fn apply_once(path: PathBuf) {
    let file = match load_network_file(&path) {
        Ok(file) => file,
        Err(err) => {
            tracing::error!("{err}");
            return;
        }
    };
    let plan = compile(&file.store, &file.settings);
    let runner = SystemRunner::new(Duration::from_secs(file.settings.command_timeout_secs));
    match apply_plan(&plan, &file.settings, &runner).await {
        Ok(report) => tracing::info!(
            warnings = warning_count(&plan.findings),
            steps = report.steps.len(),
            failures = report.failures(),
            "apply pass finished"
        ),
        Err(err) => tracing::error!("apply pass aborted: {err}"),
    }
}
