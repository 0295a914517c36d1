// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use vault_fleet::client::{EnvOverrides, VaultClientFactory};
use vault_fleet::configuration::{FileConfig, FleetOptions, Settings};
use vault_fleet::decrypt::GpgDecrypter;
use vault_fleet::orchestrator::Fleet;

fn init_tracing(json: bool) {
    let filter = EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            // this needs to be set to remove duplicated information in the log.
            .with_current_span(false)
            .with_ansi(false)
            // remove the name of the function from every log entry
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let options = FleetOptions::parse();

    init_tracing(options.json);

    tracing::debug!("[fleet] {:?}", &options);

    // Flag validation happens before anything touches the network.
    let operation = options
        .command
        .operation()
        .context("invalid command line")?;

    let overrides = EnvOverrides::from_env();
    overrides.warn();

    let file = FileConfig::load(options.config.as_deref()).context("unable to load configuration")?;
    let settings = Settings::resolve(&options, file, overrides);

    if settings.topology.is_empty() {
        tracing::warn!("[fleet] no datacenters configured");
    }

    let factory =
        VaultClientFactory::new(settings.client).context("unable to load CA certificates")?;

    let fleet = Fleet::new(
        Arc::new(factory),
        Arc::new(GpgDecrypter::new()),
        settings.sweep,
    );

    let report = fleet.sweep(&settings.topology, operation).await;
    report.log_summary(operation);

    Ok(())
}
