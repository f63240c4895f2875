// Copyright 2026 Daniel Pelikan
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

//! Attendance beacon command-line front end.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use attendance_beacon::bluetooth::BeaconServer;
use attendance_beacon::events::{BeaconSummary, EventProcessor};
use attendance_beacon::session::ControllerParts;
use attendance_beacon::{
    ChannelDisplay, Config, HttpRegistry, OfflineRegistry, OtpStore, Registry, RegistrySync,
    RequestHandler, SessionController, SessionMetadata, SessionState,
};

#[derive(Parser)]
#[command(name = "attendance-beacon", version, about = "BLE classroom attendance beacon")]
struct Cli {
    /// Path to config.toml (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Advertise a session until interrupted
    Start {
        /// Class name, e.g. "Computer Science 101"
        #[arg(long = "class")]
        class_name: String,
        #[arg(long)]
        period: String,
        #[arg(long)]
        room: String,
        #[arg(long = "teacher")]
        teacher_id: String,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("attendance_beacon=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Start {
            class_name,
            period,
            room,
            teacher_id,
        } => {
            let metadata = SessionMetadata::new(class_name, period, room, teacher_id);
            run_session(config, metadata).await
        }
    }
}

async fn run_session(config: Config, metadata: SessionMetadata) -> Result<()> {
    let registry: Arc<dyn Registry> = match &config.registry.base_url {
        Some(url) => {
            info!("Using attendance backend at {}", url);
            Arc::new(HttpRegistry::new(url, config.registry.timeout())?)
        }
        None => {
            warn!("No backend configured, sessions will run in demo mode");
            Arc::new(OfflineRegistry)
        }
    };

    let (display, display_rx) = ChannelDisplay::channel();
    let display = Arc::new(display);
    let display_task = tokio::spawn(EventProcessor::new().run(display_rx));

    let registry = RegistrySync::spawn(registry, &config.registry);
    let store = Arc::new(OtpStore::new());
    let handler = Arc::new(RequestHandler::new(
        store.clone(),
        registry.clone(),
        display.clone(),
    ));

    let server = BeaconServer::new(handler.clone(), &config.beacon.resolved_local_name())
        .await
        .context("Failed to initialize Bluetooth")?;

    let controller = SessionController::spawn(ControllerParts {
        advertiser: Arc::new(server),
        registry,
        display,
        store,
        handler,
        sweep_interval: config.beacon.sweep_interval(),
    });

    controller.start(metadata).await?;

    let mut status = controller.subscribe();
    let ended_early = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping session");
            false
        }
        _ = status.wait_for(|s| s.state == SessionState::Idle) => {
            warn!("Session ended before interrupt");
            true
        }
    };

    controller.shutdown().await?;
    drop(controller);

    let summary = display_task.await?.summary().clone();
    info!("{} OTP(s) issued this session", summary.issued);
    session_outcome(ended_early, &summary)
}

/// A session that ended without an interrupt never ran to completion.
fn session_outcome(ended_early: bool, summary: &BeaconSummary) -> Result<()> {
    if !ended_early {
        return Ok(());
    }
    let reason = summary
        .last_error
        .as_deref()
        .unwrap_or("session ended unexpectedly");
    Err(anyhow!("Beacon failed: {}", reason))
}
