//! `dbload load` – submit a URL to a running service and show progress.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use dbload_core::config::DbloadConfig;
use dbload_core::poller::{self, CurlLoadApi, FailureReason, PollerState, ProgressView};
use indicatif::{ProgressBar, ProgressStyle};

pub async fn run_load(
    cfg: &DbloadConfig,
    server: &str,
    url: &str,
    name: &str,
    token: Option<String>,
) -> Result<()> {
    let api = CurlLoadApi::new(server)
        .with_context(|| format!("invalid server URL: {}", server))?
        .with_token(token);

    let bar_style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({percent}%) {msg}")?
        .progress_chars("=> ");
    let spinner_style = ProgressStyle::default_spinner().template("{spinner:.green} {bytes} {msg}")?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style);
    pb.enable_steady_tick(Duration::from_millis(120));

    let mut sized = false;
    let end = poller::drive(&api, url, name, cfg.poll_interval(), |p| match p.progress() {
        Some(ProgressView::Determinate { done, todo, .. }) => {
            if !sized {
                pb.set_style(bar_style.clone());
                pb.set_length(todo);
                sized = true;
            }
            pb.set_position(done);
            pb.set_message("downloading");
        }
        Some(ProgressView::Indeterminate { done }) => {
            pb.set_position(done);
            pb.set_message("downloading (size unknown)");
        }
        None => pb.set_message("submitting"),
    })
    .await;

    match end {
        PollerState::Done { status } => {
            pb.finish_with_message("done");
            println!(
                "Loaded {} ({} bytes) as database '{}'",
                status.url, status.done_bytes, status.name
            );
            Ok(())
        }
        PollerState::Failed { reason } => {
            pb.abandon_with_message("failed");
            match reason {
                FailureReason::Rejected(msg) => bail!("request rejected: {}", msg),
                FailureReason::JobFailed(msg) => bail!("load failed: {}", msg),
                FailureReason::Transport(msg) => bail!("lost contact with {}: {}", server, msg),
            }
        }
        other => bail!("load ended in unexpected state: {:?}", other),
    }
}
