//! aeroswarmd - the simulation server.
//!
//! Loads settings, builds the world, starts the physics thread, the
//! coordination loop and the RPC endpoints. Exit codes: 0 success, 1
//! configuration error, 2 runtime error.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use aeroswarm_core::error::SimError;
use aeroswarm_core::settings::Settings;
use aeroswarm_core::world::SimWorld;
use aeroswarm_fabric::coordinator::AgentState;
use aeroswarm_fabric::swarm::{SwarmAgent, SwarmConfig, SwarmController};
use aeroswarm_rpc::{EngineBridge, RpcServer};

#[derive(Parser, Debug)]
#[command(name = "aeroswarmd", about = "Autonomous vehicle swarm simulation server")]
struct Args {
    /// Path to the JSON settings file; defaults apply when omitted.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Override the RPC port from settings.
    #[arg(long)]
    port: Option<u16>,

    /// Also serve the engine bridge on this port.
    #[arg(long)]
    bridge_port: Option<u16>,

    /// Coordination loop rate, Hz.
    #[arg(long, default_value_t = 10.0)]
    coordination_hz: f64,
}

fn load_settings(args: &Args) -> Result<Settings, SimError> {
    let mut settings = match &args.settings {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|err| SimError::config(format!("cannot read {}: {err}", path.display())))?;
            Settings::from_json_str(&text)?
        }
        None => Settings::default(),
    };
    if let Some(port) = args.port {
        settings.rpc.port = port;
    }
    Ok(settings)
}

/// Feeds vehicle ground truth into the swarm controller at the coordination
/// cadence.
fn spawn_coordination_loop(
    world: Arc<SimWorld>,
    controller: Arc<SwarmController>,
    rate_hz: f64,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("coordination".to_string())
        .spawn(move || {
            let period = Duration::from_secs_f64(1.0 / rate_hz.max(1.0));
            loop {
                for name in world.provider().vehicle_names() {
                    let Some(sim_api) = world.provider().get_vehicle_sim_api(&name) else {
                        continue;
                    };
                    let kinematics = sim_api.get_ground_truth_kinematics();
                    if controller.agent(&name).is_none() {
                        let _ = controller.add_agent(SwarmAgent::new(name.clone()));
                    }
                    let mut state = AgentState::new(name.clone());
                    if let Some(existing) = controller.agent(&name) {
                        state = existing.state;
                    }
                    state.position = kinematics.pose.position;
                    state.velocity = kinematics.twist.linear;
                    state.orientation = kinematics.pose.orientation;
                    let _ = controller.update_agent(state);
                }
                controller.update();
                std::thread::sleep(period);
            }
        })
        .expect("failed to spawn coordination thread")
}

async fn run(args: Args) -> Result<(), anyhow::Error> {
    let settings = load_settings(&args).map_err(|err| anyhow::anyhow!(err))?;
    let rpc = settings.rpc.clone();

    let world = SimWorld::from_settings(settings, None).context("building world")?;
    let _physics = world.start();

    let swarm = Arc::new(SwarmController::new(
        SwarmConfig::default(),
        world.clock().clone(),
    ));
    let _coordination = spawn_coordination_loop(
        Arc::clone(&world),
        Arc::clone(&swarm),
        args.coordination_hz,
    );

    if let Some(bridge_port) = args.bridge_port {
        let bridge = EngineBridge::new(Arc::clone(&world));
        let address = rpc.address.clone();
        tokio::spawn(async move {
            if let Err(err) = bridge.serve(&address, bridge_port).await {
                error!(error = %err, "engine bridge stopped");
            }
        });
    }

    let server = RpcServer::bind(Arc::clone(&world), &rpc.address, rpc.port)
        .await
        .context("binding rpc server")?;
    info!(port = rpc.port, "aeroswarmd up");
    server.serve().await;
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    // Configuration problems exit 1 before any thread starts.
    if let Err(err) = load_settings(&args) {
        error!(error = %err, "invalid configuration");
        return ExitCode::from(1);
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "runtime startup failed");
            return ExitCode::from(2);
        }
    };
    match runtime.block_on(run(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "runtime error");
            ExitCode::from(2)
        }
    }
}
