// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use qstat_exporter::{
    cli::{Cli, Commands},
    collector::{run_pass, run_periodic, SharedRegistry},
    config::Config,
    metrics::GaugeRegistry,
    utils::init_logging,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load_with_priority(cli.config.as_deref())
        .await
        .context("Failed to load configuration")?;
    cli.apply_to(&mut config)?;

    let target = config.collect_target(cli.password.as_deref())?;
    let settings = config.pass_settings();

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    match cli.command {
        Commands::Collect => {
            let mut registry = GaugeRegistry::new();
            let report = run_pass(&target, &settings, &mut registry, &cancel).await;
            print_exposition(&registry)?;
            if let Some(e) = report.error {
                return Err(e).context(format!("Collection from {} failed", target.host));
            }
        }
        Commands::Watch { .. } => {
            let registry: SharedRegistry = Arc::new(RwLock::new(GaugeRegistry::new()));
            tracing::info!(
                "Collecting from {} every {}s",
                target.host,
                config.interval().as_secs()
            );
            run_periodic(
                &target,
                &settings,
                registry,
                config.interval(),
                cancel,
                |_report, registry| {
                    if let Err(e) = print_exposition(registry) {
                        tracing::error!("Failed to write samples: {e}");
                    }
                },
            )
            .await;
        }
    }

    Ok(())
}

/// Cancel in-flight work on Ctrl-C.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupted, stopping");
                cancel.cancel();
            }
            Err(e) => tracing::warn!("Cannot listen for Ctrl-C: {e}"),
        }
    });
}

fn print_exposition(registry: &GaugeRegistry) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(registry.render().as_bytes())
        .context("Failed to write to stdout")?;
    stdout.flush().context("Failed to flush stdout")
}
