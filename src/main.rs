mod cli;
mod logging;
mod ui;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use job_coordinator::Coordinator;
use job_coordinator::config::{CoordinatorConfig, PollConfig};
use job_coordinator::handler::SimulatedServices;
use job_coordinator::job::Component;
use job_coordinator::message::TokioChannel;
use job_coordinator::store::Repositories;
use job_coordinator::store::memory::InMemoryStore;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, info};
use ui::PreparationProgress;

/// Upper bound on how long the demo waits for a single delivery.
const RECEIVE_TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = CoordinatorConfig::load().context("failed to load configuration")?;
    if let Some(max_retries) = cli.max_retries {
        config.max_retries = max_retries;
    }
    logging::init(&config.log_filter, cli.verbose);

    match cli.command {
        Command::Demo {
            fail,
            poll_delay_ms,
            suite,
        } => {
            config.poll = PollConfig::uniform(poll_delay_ms);
            run_demo(&config, fail.map(Component::from), &suite).await
        }
        Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

/// Prepares one job against the simulated services and prints its status.
async fn run_demo(config: &CoordinatorConfig, fail: Option<Component>, suite: &str) -> Result<()> {
    let services = SimulatedServices::new();
    if let Some(component) = fail {
        info!(%component, "injecting permanent failure");
        services.fail_component(component);
    }

    let (channel, mut receiver) = TokioChannel::new("remote-requests");
    let coordinator = Coordinator::new(
        Repositories::from_store(Arc::new(InMemoryStore::new())),
        services,
        Arc::new(channel.clone()),
        config,
    );

    let job = coordinator.create_job("demo-user", suite, 3600)?;
    let progress = PreparationProgress::start(&job.id);

    loop {
        // Checked before try_recv: a timer decrements only after it forwarded.
        let idle = channel.delayed() == 0;
        let envelope = match receiver.try_recv() {
            Ok(envelope) => envelope,
            Err(TryRecvError::Empty) if idle => break,
            Err(TryRecvError::Empty) => tokio::time::timeout(RECEIVE_TIMEOUT, receiver.recv())
                .await
                .context("timed out waiting for a delayed message")?
                .context("message channel closed")?,
            Err(TryRecvError::Disconnected) => break,
        };

        debug!(message = %envelope.message.key(), "delivering");
        let outcome = coordinator.handle(envelope.clone()).await?;
        progress.outcome(&envelope, &outcome);
        if let Some(status) = coordinator.job_preparation(&job.id)? {
            progress.update(&job.id, &status);
        }
    }

    let status = coordinator
        .job_preparation(&job.id)?
        .context("demo job disappeared")?;
    progress.complete(&status);
    progress.print_status(&status);
    Ok(())
}
