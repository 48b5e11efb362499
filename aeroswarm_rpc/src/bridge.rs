//! Engine-bridge ingress: a second, optional JSON-RPC endpoint a 3D-engine
//! consumer drives to mirror the simulation.
//!
//! Same newline-delimited JSON-RPC 2.0 framing as the client server, but a
//! different vocabulary: robot mirroring, debug drawing and stepping. The
//! bridge keeps its own registry of mirrored robots and debug primitives;
//! pause/resume/step/reset forward to the world.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use aeroswarm_core::error::SimError;
use aeroswarm_core::geom::Real;
use aeroswarm_core::world::SimWorld;

/// A robot mirrored by the engine consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeRobot {
    pub id: String,
    #[serde(default)]
    pub robot_type: String,
    #[serde(default)]
    pub position: [Real; 3],
    #[serde(default)]
    pub orientation: [Real; 4],
    #[serde(default)]
    pub telemetry: HashMap<String, Real>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugLine {
    pub start: [Real; 3],
    pub end: [Real; 3],
    #[serde(default)]
    pub color: [Real; 3],
    #[serde(default)]
    pub thickness: Real,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugSphere {
    pub center: [Real; 3],
    pub radius: Real,
    #[serde(default)]
    pub color: [Real; 3],
}

#[derive(Default)]
struct BridgeState {
    robots: HashMap<String, BridgeRobot>,
    lines: Vec<DebugLine>,
    spheres: Vec<DebugSphere>,
    visualization_mode: String,
}

/// The bridge endpoint.
pub struct EngineBridge {
    world: Arc<SimWorld>,
    state: Mutex<BridgeState>,
}

impl EngineBridge {
    pub fn new(world: Arc<SimWorld>) -> Arc<Self> {
        Arc::new(Self {
            world,
            state: Mutex::new(BridgeState::default()),
        })
    }

    pub fn robot_count(&self) -> usize {
        self.state.lock().unwrap().robots.len()
    }

    pub fn robot(&self, id: &str) -> Option<BridgeRobot> {
        self.state.lock().unwrap().robots.get(id).cloned()
    }

    pub fn debug_primitive_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.lines.len() + state.spheres.len()
    }

    pub fn visualization_mode(&self) -> String {
        self.state.lock().unwrap().visualization_mode.clone()
    }

    /// Routes one bridge request.
    pub fn dispatch(&self, method: &str, params: &Value) -> Result<Value, SimError> {
        match method {
            "spawn_robots" => {
                let robots: Vec<BridgeRobot> = serde_json::from_value(
                    params.get(0).cloned().unwrap_or_else(|| json!([])),
                )
                .map_err(|err| SimError::invalid(format!("bad robot list: {err}")))?;
                let mut state = self.state.lock().unwrap();
                let count = robots.len();
                for robot in robots {
                    if robot.id.is_empty() {
                        return Err(SimError::invalid("robot without id"));
                    }
                    state.robots.insert(robot.id.clone(), robot);
                }
                info!(count, "robots spawned on bridge");
                Ok(json!(state.robots.len()))
            }
            "update_positions" => {
                let updates: Vec<BridgeRobot> = serde_json::from_value(
                    params.get(0).cloned().unwrap_or_else(|| json!([])),
                )
                .map_err(|err| SimError::invalid(format!("bad update list: {err}")))?;
                let mut state = self.state.lock().unwrap();
                let mut applied = 0;
                for update in updates {
                    if let Some(robot) = state.robots.get_mut(&update.id) {
                        robot.position = update.position;
                        robot.orientation = update.orientation;
                        applied += 1;
                    }
                }
                Ok(json!(applied))
            }
            "update_telemetry" => {
                let updates: Vec<BridgeRobot> = serde_json::from_value(
                    params.get(0).cloned().unwrap_or_else(|| json!([])),
                )
                .map_err(|err| SimError::invalid(format!("bad telemetry list: {err}")))?;
                let mut state = self.state.lock().unwrap();
                let mut applied = 0;
                for update in updates {
                    if let Some(robot) = state.robots.get_mut(&update.id) {
                        robot.telemetry = update.telemetry;
                        applied += 1;
                    }
                }
                Ok(json!(applied))
            }
            "simulation_step" => {
                self.world.tick()?;
                Ok(json!(self.world.tick_count()))
            }
            "clear_all_robots" => {
                let mut state = self.state.lock().unwrap();
                let removed = state.robots.len();
                state.robots.clear();
                Ok(json!(removed))
            }
            "draw_debug_lines" => {
                let lines: Vec<DebugLine> = serde_json::from_value(
                    params.get(0).cloned().unwrap_or_else(|| json!([])),
                )
                .map_err(|err| SimError::invalid(format!("bad line list: {err}")))?;
                self.state.lock().unwrap().lines.extend(lines);
                Ok(json!(true))
            }
            "draw_debug_spheres" => {
                let spheres: Vec<DebugSphere> = serde_json::from_value(
                    params.get(0).cloned().unwrap_or_else(|| json!([])),
                )
                .map_err(|err| SimError::invalid(format!("bad sphere list: {err}")))?;
                self.state.lock().unwrap().spheres.extend(spheres);
                Ok(json!(true))
            }
            "clear_debug" => {
                let mut state = self.state.lock().unwrap();
                state.lines.clear();
                state.spheres.clear();
                Ok(json!(true))
            }
            "set_visualization_mode" => {
                let mode: String = serde_json::from_value(
                    params.get(0).cloned().unwrap_or_else(|| json!("")),
                )
                .map_err(|err| SimError::invalid(format!("bad mode: {err}")))?;
                self.state.lock().unwrap().visualization_mode = mode;
                Ok(json!(true))
            }
            "pause" => {
                self.world.pause(true);
                Ok(json!(true))
            }
            "resume" => {
                self.world.pause(false);
                Ok(json!(true))
            }
            "reset" => {
                self.world.reset()?;
                let mut state = self.state.lock().unwrap();
                state.lines.clear();
                state.spheres.clear();
                Ok(json!(true))
            }
            _ => Err(SimError::invalid(format!("unknown bridge method '{method}'"))),
        }
    }

    /// Accept loop on the given address.
    pub async fn serve(self: Arc<Self>, address: &str, port: u16) -> Result<(), SimError> {
        let listener = TcpListener::bind((address, port))
            .await
            .map_err(|err| SimError::TransportError(format!("bridge bind failed: {err}")))?;
        info!(addr = %listener.local_addr().unwrap(), "engine bridge listening");
        loop {
            let (stream, peer) = listener
                .accept()
                .await
                .map_err(|err| SimError::TransportError(format!("bridge accept failed: {err}")))?;
            debug!(%peer, "engine consumer connected");
            let bridge = Arc::clone(&self);
            tokio::spawn(async move {
                let _ = bridge.handle_connection(stream).await;
            });
        }
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream) -> std::io::Result<()> {
        #[derive(Deserialize)]
        struct Request {
            method: String,
            #[serde(default)]
            params: Value,
            #[serde(default)]
            id: Value,
        }

        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let response = match serde_json::from_str::<Request>(&line) {
                Ok(request) => match self.dispatch(&request.method, &request.params) {
                    Ok(result) => {
                        json!({"jsonrpc": "2.0", "id": request.id, "result": result})
                    }
                    Err(err) => json!({
                        "jsonrpc": "2.0",
                        "id": request.id,
                        "error": {"code": -32000 - err.code(), "message": err.to_string()},
                    }),
                },
                Err(err) => json!({
                    "jsonrpc": "2.0",
                    "id": Value::Null,
                    "error": {"code": -32700, "message": format!("parse error: {err}")},
                }),
            };
            let mut payload = serde_json::to_vec(&response)?;
            payload.push(b'\n');
            write_half.write_all(&payload).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeroswarm_core::settings::Settings;

    fn bridge() -> Arc<EngineBridge> {
        let settings = Settings::from_json_str(
            r#"{"clock_type": "steppable",
                "vehicles": {"drone0": {"vehicle_type": "simple_flight"}}}"#,
        )
        .unwrap();
        EngineBridge::new(SimWorld::from_settings(settings, None).unwrap())
    }

    #[test]
    fn test_spawn_and_update_robots() {
        let bridge = bridge();
        bridge
            .dispatch(
                "spawn_robots",
                &json!([[{"id": "r1", "robot_type": "quad", "position": [0.0, 0.0, 0.0],
                          "orientation": [1.0, 0.0, 0.0, 0.0]}]]),
            )
            .unwrap();
        assert_eq!(bridge.robot_count(), 1);

        let applied = bridge
            .dispatch(
                "update_positions",
                &json!([[{"id": "r1", "position": [5.0, 1.0, -2.0],
                          "orientation": [1.0, 0.0, 0.0, 0.0]}]]),
            )
            .unwrap();
        assert_eq!(applied, json!(1));
        assert_eq!(bridge.robot("r1").unwrap().position, [5.0, 1.0, -2.0]);
    }

    #[test]
    fn test_update_unknown_robot_applies_nothing() {
        let bridge = bridge();
        let applied = bridge
            .dispatch("update_positions", &json!([[{"id": "ghost"}]]))
            .unwrap();
        assert_eq!(applied, json!(0));
    }

    #[test]
    fn test_simulation_step_ticks_the_world() {
        let bridge = bridge();
        let ticks = bridge.dispatch("simulation_step", &json!([])).unwrap();
        assert_eq!(ticks, json!(1));
    }

    #[test]
    fn test_debug_primitives_and_clear() {
        let bridge = bridge();
        bridge
            .dispatch(
                "draw_debug_lines",
                &json!([[{"start": [0.0, 0.0, 0.0], "end": [1.0, 0.0, 0.0],
                          "color": [1.0, 0.0, 0.0], "thickness": 2.0}]]),
            )
            .unwrap();
        bridge
            .dispatch(
                "draw_debug_spheres",
                &json!([[{"center": [0.0, 0.0, -5.0], "radius": 1.0, "color": [0.0, 1.0, 0.0]}]]),
            )
            .unwrap();
        assert_eq!(bridge.debug_primitive_count(), 2);
        bridge.dispatch("clear_debug", &json!([])).unwrap();
        assert_eq!(bridge.debug_primitive_count(), 0);
    }

    #[test]
    fn test_pause_resume_reset_forward_to_world() {
        let bridge = bridge();
        bridge.dispatch("pause", &json!([])).unwrap();
        assert!(bridge.world.is_paused());
        bridge.dispatch("resume", &json!([])).unwrap();
        assert!(!bridge.world.is_paused());
        bridge.dispatch("simulation_step", &json!([])).unwrap();
        bridge.dispatch("reset", &json!([])).unwrap();
        assert_eq!(bridge.world.tick_count(), 0);
    }

    #[test]
    fn test_visualization_mode_and_clear_all() {
        let bridge = bridge();
        bridge
            .dispatch("set_visualization_mode", &json!(["wireframe"]))
            .unwrap();
        assert_eq!(bridge.visualization_mode(), "wireframe");
        bridge
            .dispatch("spawn_robots", &json!([[{"id": "a"}, {"id": "b"}]]))
            .unwrap();
        let removed = bridge.dispatch("clear_all_robots", &json!([])).unwrap();
        assert_eq!(removed, json!(2));
        assert_eq!(bridge.robot_count(), 0);
    }
}
