//! Implementation of the `colloquy worker` command.
//!
//! Runs the job queue worker until interrupted. On ctrl-c the
//! cancellation token stops the loop and the broadcast bus announces
//! shutdown to observers.

use std::sync::Arc;
use std::time::Duration;

use colloquy_core::config::Config;
use colloquy_core::jobs::worker::JobWorker;
use colloquy_core::startup::AppContext;
use tokio_util::sync::CancellationToken;

use super::WorkerArgs;

/// Execute the `colloquy worker` command.
pub async fn execute(config: Config, args: WorkerArgs) -> anyhow::Result<()> {
    let poll_interval = Duration::from_millis(config.queue.poll_interval_ms);
    let ctx = AppContext::init(config).await?;

    let cancel = CancellationToken::new();
    let worker = JobWorker::new(
        ctx.pool.clone(),
        Arc::clone(&ctx.service),
        poll_interval,
        cancel.clone(),
    );

    if args.once {
        while worker.run_once().await? {}
        ctx.shutdown().await;
        return Ok(());
    }

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping worker");
            signal_cancel.cancel();
        }
    });

    worker.run().await;

    ctx.shutdown().await;
    Ok(())
}
