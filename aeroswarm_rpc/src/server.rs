//! JSON-RPC 2.0 server over TCP.
//!
//! Framing is newline-delimited JSON. Every per-vehicle method takes a
//! trailing `vehicle_name` parameter; the empty string addresses the default
//! vehicle. Requests are dispatched on blocking worker threads so one
//! client's long-running command never stalls another client; the registry
//! lock is held only for the lookup itself.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use aeroswarm_core::api::VehicleApi;
use aeroswarm_core::control::CommandHandle;
use aeroswarm_core::error::SimError;
use aeroswarm_core::geom::Real;
use aeroswarm_core::settings::VehicleSettings;
use aeroswarm_core::world::{SimWorld, SERVER_VERSION};

use crate::wire::{
    drivetrain_from_wire, BarometerWire, CarControlsWire, CarStateWire, DistanceSensorWire,
    GeoPointWire, GpsWire, ImuWire, LidarWire, MagnetometerWire, MultirotorStateWire, PoseWire,
    RcDataWire, Vector3Wire, YawModeWire,
};

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[serde(default)]
    jsonrpc: String,
    method: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    id: Value,
}

/// The external client surface.
pub struct RpcServer {
    world: Arc<SimWorld>,
    listener: TcpListener,
}

impl RpcServer {
    /// Binds the listener; `port` 0 picks an ephemeral port.
    pub async fn bind(world: Arc<SimWorld>, address: &str, port: u16) -> Result<Self, SimError> {
        let listener = TcpListener::bind((address, port))
            .await
            .map_err(|err| SimError::TransportError(format!("bind failed: {err}")))?;
        info!(addr = %listener.local_addr().unwrap(), "rpc server listening");
        Ok(Self { world, listener })
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.listener.local_addr().expect("listener is bound")
    }

    /// Accept loop; runs until the task is dropped.
    pub async fn serve(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let world = Arc::clone(&self.world);
                    let connection_id = Uuid::new_v4();
                    debug!(%peer, %connection_id, "client connected");
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(world, stream).await {
                            debug!(%connection_id, error = %err, "client connection closed");
                        }
                    });
                }
                Err(err) => {
                    warn!(error = %err, "accept failed");
                }
            }
        }
    }
}

async fn handle_connection(world: Arc<SimWorld>, stream: TcpStream) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) if !request.jsonrpc.is_empty() && request.jsonrpc != "2.0" => json!({
                "jsonrpc": "2.0",
                "id": request.id,
                "error": {"code": -32600, "message": "unsupported jsonrpc version"},
            }),
            Ok(request) => {
                let id = request.id.clone();
                let world = Arc::clone(&world);
                // Commands may block on their futures; keep the async
                // executor free.
                let result = tokio::task::spawn_blocking(move || {
                    dispatch(&world, &request.method, &request.params)
                })
                .await
                .unwrap_or_else(|_| Err(SimError::internal("dispatch task panicked")));
                match result {
                    Ok(value) => json!({"jsonrpc": "2.0", "id": id, "result": value}),
                    Err(err) => json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": {"code": -32000 - err.code(), "message": err.to_string()},
                    }),
                }
            }
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

/// Positional parameter accessor.
struct Params<'a>(&'a Value);

impl<'a> Params<'a> {
    fn get<T: serde::de::DeserializeOwned>(&self, index: usize) -> Result<T, SimError> {
        let value = self
            .0
            .get(index)
            .ok_or_else(|| SimError::invalid(format!("missing parameter {index}")))?;
        serde_json::from_value(value.clone())
            .map_err(|err| SimError::invalid(format!("bad parameter {index}: {err}")))
    }

    fn opt<T: serde::de::DeserializeOwned>(&self, index: usize, default: T) -> Result<T, SimError> {
        match self.0.get(index) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|err| SimError::invalid(format!("bad parameter {index}: {err}"))),
        }
    }
}

fn vehicle(world: &SimWorld, name: &str) -> Result<VehicleApi, SimError> {
    world
        .provider()
        .get_vehicle_api(name)
        .ok_or_else(|| SimError::VehicleNotFound(name.to_string()))
}

/// Blocks on a command future. A zero timeout returns immediately; timeout
/// and cancellation surface as their error kinds.
fn wait_command(handle: CommandHandle, timeout_sec: f64) -> Result<Value, SimError> {
    if timeout_sec <= 0.0 {
        return Ok(json!(true));
    }
    handle.wait(Duration::from_secs_f64(timeout_sec))?;
    Ok(json!(true))
}

/// Routes one request to the world or a vehicle API.
pub fn dispatch(world: &Arc<SimWorld>, method: &str, params: &Value) -> Result<Value, SimError> {
    let p = Params(params);
    match method {
        // -- introspection --
        "ping" => Ok(json!(true)),
        "get_server_version" => Ok(json!(SERVER_VERSION)),
        "get_settings_string" => Ok(json!(world.settings_string())),

        // -- world simulation --
        "pause" => {
            world.pause(p.opt(0, true)?);
            Ok(json!(true))
        }
        "is_paused" => Ok(json!(world.is_paused())),
        "continue_for_time" => {
            world.continue_for_time(p.get::<f64>(0)?);
            Ok(json!(true))
        }
        "continue_for_frames" => {
            world.continue_for_frames(p.get::<u64>(0)?);
            Ok(json!(true))
        }
        "reset" => {
            world.reset()?;
            Ok(json!(true))
        }
        "set_wind" => {
            world.set_wind(p.get::<Vector3Wire>(0)?.to_core());
            Ok(json!(true))
        }
        "set_ext_force" => {
            world.set_ext_force(p.get::<Vector3Wire>(0)?.to_core());
            Ok(json!(true))
        }
        "set_time_of_day" => {
            world.set_time_of_day(&p.get::<String>(0)?);
            Ok(json!(true))
        }
        "set_weather" => {
            world.set_weather(p.get::<i32>(0)?, p.get::<Real>(1)?);
            Ok(json!(true))
        }
        "enable_weather" => {
            world.enable_weather(p.get::<bool>(0)?);
            Ok(json!(true))
        }
        "set_segmentation_object_id" => Ok(json!(
            world.set_segmentation_object_id(&p.get::<String>(0)?, p.get::<i32>(1)?)
        )),
        "get_segmentation_object_id" => {
            Ok(json!(world.get_segmentation_object_id(&p.get::<String>(0)?)))
        }
        "set_object_pose" => Ok(json!(
            world.set_object_pose(&p.get::<String>(0)?, p.get::<PoseWire>(1)?.to_core())
        )),
        "get_object_pose" => {
            let pose = world
                .get_object_pose(&p.get::<String>(0)?)
                .ok_or_else(|| SimError::invalid("unknown object"))?;
            Ok(serde_json::to_value(PoseWire::to_wire(&pose)).unwrap())
        }
        "add_vehicle" => {
            let name = p.get::<String>(0)?;
            let settings = p.opt::<VehicleSettings>(1, VehicleSettings::default())?;
            world.create_vehicle_at_runtime(&name, &settings)?;
            Ok(json!(true))
        }

        // -- vehicle lifecycle --
        "enable_api_control" => {
            let enable = p.get::<bool>(0)?;
            vehicle(world, &p.opt(1, String::new())?)?.enable_api_control(enable);
            Ok(json!(true))
        }
        "is_api_control_enabled" => Ok(json!(
            vehicle(world, &p.opt(0, String::new())?)?.is_api_control_enabled()
        )),
        "arm" => {
            vehicle(world, &p.opt(0, String::new())?)?.arm()?;
            Ok(json!(true))
        }
        "disarm" => {
            vehicle(world, &p.opt(0, String::new())?)?.disarm()?;
            Ok(json!(true))
        }
        "cancel_last_task" => {
            vehicle(world, &p.opt(0, String::new())?)?
                .as_multirotor()?
                .cancel_last_task();
            Ok(json!(true))
        }

        // -- multirotor commands --
        "takeoff" => {
            let altitude = p.get::<Real>(0)?;
            let timeout_sec = p.opt(1, 0.0)?;
            let api = vehicle(world, &p.opt(2, String::new())?)?;
            let handle = api.as_multirotor()?.takeoff(altitude)?;
            wait_command(handle, timeout_sec)
        }
        "land" => {
            let timeout_sec = p.opt(0, 0.0)?;
            let api = vehicle(world, &p.opt(1, String::new())?)?;
            let handle = api.as_multirotor()?.land()?;
            wait_command(handle, timeout_sec)
        }
        "hover" => {
            let api = vehicle(world, &p.opt(0, String::new())?)?;
            let handle = api.as_multirotor()?.hover()?;
            wait_command(handle, 0.0)
        }
        "move_to_position" => {
            let target = Vector3Wire {
                x: p.get(0)?,
                y: p.get(1)?,
                z: p.get(2)?,
            };
            let speed = p.get::<Real>(3)?;
            let drivetrain = drivetrain_from_wire(p.opt(4, 0)?);
            let yaw_mode = p.opt(5, YawModeWire::default())?.to_core();
            let lookahead = p.opt(6, -1.0)?;
            let adaptive_lookahead = p.opt(7, 0.0)?;
            let timeout_sec = p.opt(8, 0.0)?;
            let api = vehicle(world, &p.opt(9, String::new())?)?;
            let handle = api.as_multirotor()?.move_to_position(
                target.to_core(),
                speed,
                drivetrain,
                yaw_mode,
                lookahead,
                adaptive_lookahead,
            )?;
            wait_command(handle, timeout_sec)
        }
        "move_by_velocity" => {
            let velocity = Vector3Wire {
                x: p.get(0)?,
                y: p.get(1)?,
                z: p.get(2)?,
            };
            let duration = p.get::<Real>(3)?;
            let drivetrain = drivetrain_from_wire(p.opt(4, 0)?);
            let yaw_mode = p.opt(5, YawModeWire::default())?.to_core();
            let api = vehicle(world, &p.opt(6, String::new())?)?;
            let handle = api.as_multirotor()?.move_by_velocity(
                velocity.to_core(),
                duration,
                drivetrain,
                yaw_mode,
            )?;
            wait_command(handle, 0.0)
        }
        "move_by_angle_rates" => {
            let rates = Vector3Wire {
                x: p.get(0)?,
                y: p.get(1)?,
                z: p.get(2)?,
            };
            let z = p.get::<Real>(3)?;
            let duration = p.get::<Real>(4)?;
            let api = vehicle(world, &p.opt(5, String::new())?)?;
            let handle = api
                .as_multirotor()?
                .move_by_angle_rates(rates.to_core(), z, duration)?;
            wait_command(handle, 0.0)
        }
        "set_rc_data" => {
            let rc = p.get::<RcDataWire>(0)?.to_core();
            vehicle(world, &p.opt(1, String::new())?)?
                .as_multirotor()?
                .set_rc_data(rc);
            Ok(json!(true))
        }

        // -- car commands --
        "set_car_controls" => {
            let controls = p.get::<CarControlsWire>(0)?.to_core();
            vehicle(world, &p.opt(1, String::new())?)?
                .as_car()?
                .set_controls(controls)?;
            Ok(json!(true))
        }
        "get_car_state" => {
            let state = vehicle(world, &p.opt(0, String::new())?)?
                .as_car()?
                .get_car_state();
            Ok(serde_json::to_value(CarStateWire::to_wire(&state)).unwrap())
        }

        // -- queries --
        "get_state" => {
            let state = vehicle(world, &p.opt(0, String::new())?)?
                .as_multirotor()?
                .get_state();
            Ok(serde_json::to_value(MultirotorStateWire::to_wire(&state)).unwrap())
        }
        "get_home_geo_point" => {
            let home = vehicle(world, &p.opt(0, String::new())?)?.get_home_geo_point();
            Ok(serde_json::to_value(GeoPointWire::to_wire(&home)).unwrap())
        }
        "get_imu" => {
            let sensor = p.opt(0, String::new())?;
            let data = vehicle(world, &p.opt(1, String::new())?)?
                .as_multirotor()?
                .get_imu(&sensor)?;
            Ok(serde_json::to_value(ImuWire::to_wire(&data)).unwrap())
        }
        "get_barometer" => {
            let sensor = p.opt(0, String::new())?;
            let data = vehicle(world, &p.opt(1, String::new())?)?
                .as_multirotor()?
                .get_barometer(&sensor)?;
            Ok(serde_json::to_value(BarometerWire::to_wire(&data)).unwrap())
        }
        "get_magnetometer" => {
            let sensor = p.opt(0, String::new())?;
            let data = vehicle(world, &p.opt(1, String::new())?)?
                .as_multirotor()?
                .get_magnetometer(&sensor)?;
            Ok(serde_json::to_value(MagnetometerWire::to_wire(&data)).unwrap())
        }
        "get_gps" => {
            let sensor = p.opt(0, String::new())?;
            let data = vehicle(world, &p.opt(1, String::new())?)?
                .as_multirotor()?
                .get_gps(&sensor)?;
            Ok(serde_json::to_value(GpsWire::to_wire(&data)).unwrap())
        }
        "get_distance" => {
            let sensor = p.opt(0, String::new())?;
            let data = vehicle(world, &p.opt(1, String::new())?)?
                .as_multirotor()?
                .get_distance(&sensor)?;
            Ok(serde_json::to_value(DistanceSensorWire::to_wire(&data)).unwrap())
        }
        "get_lidar" => {
            let sensor = p.opt(0, String::new())?;
            let data = vehicle(world, &p.opt(1, String::new())?)?
                .as_multirotor()?
                .get_lidar(&sensor)?;
            Ok(serde_json::to_value(LidarWire::to_wire(&data)).unwrap())
        }

        _ => Err(SimError::invalid(format!("unknown method '{method}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeroswarm_core::settings::Settings;

    fn world() -> Arc<SimWorld> {
        let settings = Settings::from_json_str(
            r#"{
                "clock_type": "steppable",
                "vehicles": {
                    "drone0": {"vehicle_type": "simple_flight", "is_default": true},
                    "car0": {"vehicle_type": "physx_car"}
                }
            }"#,
        )
        .unwrap();
        SimWorld::from_settings(settings, None).unwrap()
    }

    #[test]
    fn test_ping_and_version() {
        let world = world();
        assert_eq!(dispatch(&world, "ping", &json!([])).unwrap(), json!(true));
        let version = dispatch(&world, "get_server_version", &json!([])).unwrap();
        assert_eq!(version, json!(SERVER_VERSION));
    }

    #[test]
    fn test_unknown_method_and_unknown_vehicle() {
        let world = world();
        assert!(matches!(
            dispatch(&world, "warp", &json!([])),
            Err(SimError::InvalidArgument(_))
        ));
        assert!(matches!(
            dispatch(&world, "arm", &json!(["ghost"])),
            Err(SimError::VehicleNotFound(_))
        ));
    }

    #[test]
    fn test_empty_vehicle_name_uses_default() {
        let world = world();
        dispatch(&world, "enable_api_control", &json!([true, ""])).unwrap();
        let enabled = dispatch(&world, "is_api_control_enabled", &json!(["drone0"])).unwrap();
        assert_eq!(enabled, json!(true));
    }

    #[test]
    fn test_command_flow_over_dispatch() {
        let world = world();
        dispatch(&world, "enable_api_control", &json!([true, ""])).unwrap();
        dispatch(&world, "arm", &json!([""])).unwrap();
        // Non-blocking issue (timeout 0), then drive the world.
        dispatch(&world, "takeoff", &json!([5.0, 0.0, ""])).unwrap();
        for _ in 0..1200 {
            world.tick().unwrap();
        }
        let state = dispatch(&world, "get_state", &json!([""])).unwrap();
        let z = state["kinematics"]["pose"]["position"]["z"].as_f64().unwrap();
        assert!((z - (-5.0)).abs() < 0.5, "altitude was {z}");
    }

    #[test]
    fn test_arm_before_enable_is_not_ready() {
        let world = world();
        assert!(matches!(
            dispatch(&world, "arm", &json!([""])),
            Err(SimError::NotReady(_))
        ));
    }

    #[test]
    fn test_car_controls_via_dispatch() {
        let world = world();
        dispatch(&world, "enable_api_control", &json!([true, "car0"])).unwrap();
        dispatch(
            &world,
            "set_car_controls",
            &json!([{"throttle": 0.6, "steering": 0.0, "brake": 0.0,
                     "handbrake": false, "is_manual_gear": false, "manual_gear": 0}, "car0"]),
        )
        .unwrap();
        for _ in 0..400 {
            world.tick().unwrap();
        }
        let state = dispatch(&world, "get_car_state", &json!(["car0"])).unwrap();
        assert!(state["speed"].as_f64().unwrap() > 0.5);
    }

    #[test]
    fn test_sensor_queries_return_wire_shapes() {
        let world = world();
        for _ in 0..50 {
            world.tick().unwrap();
        }
        let imu = dispatch(&world, "get_imu", &json!(["", ""])).unwrap();
        assert!(imu["orientation"]["w"].is_number());
        let gps = dispatch(&world, "get_gps", &json!(["", ""])).unwrap();
        assert!(gps["geo_point"]["latitude"].is_number());
        assert!(gps["fix_type"].is_number());
    }

    #[test]
    fn test_world_methods() {
        let world = world();
        dispatch(&world, "pause", &json!([true])).unwrap();
        assert_eq!(dispatch(&world, "is_paused", &json!([])).unwrap(), json!(true));
        dispatch(&world, "continue_for_frames", &json!([3])).unwrap();
        assert_eq!(dispatch(&world, "is_paused", &json!([])).unwrap(), json!(false));
        dispatch(&world, "set_wind", &json!([{"x": 2.0, "y": 0.0, "z": 0.0}])).unwrap();
        dispatch(&world, "set_weather", &json!([1, 0.75])).unwrap();
        dispatch(&world, "reset", &json!([])).unwrap();
        assert_eq!(world.tick_count(), 0);
    }

    #[test]
    fn test_add_vehicle_at_runtime() {
        let world = world();
        dispatch(&world, "add_vehicle", &json!(["drone9"])).unwrap();
        assert!(world.provider().get_vehicle_api("drone9").is_some());
    }

    #[tokio::test]
    async fn test_tcp_roundtrip() {
        let world = world();
        let server = RpcServer::bind(world, "127.0.0.1", 0).await.unwrap();
        let addr = server.local_addr();
        let server_task = tokio::spawn(server.serve());

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        write_half
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\",\"params\":[]}\n")
            .await
            .unwrap();
        let mut lines = BufReader::new(read_half).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let response: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(response["result"], json!(true));
        assert_eq!(response["id"], json!(1));

        server_task.abort();
    }

    #[tokio::test]
    async fn test_malformed_request_gets_parse_error() {
        let world = world();
        let server = RpcServer::bind(world, "127.0.0.1", 0).await.unwrap();
        let addr = server.local_addr();
        let server_task = tokio::spawn(server.serve());

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        write_half.write_all(b"this is not json\n").await.unwrap();
        let mut lines = BufReader::new(read_half).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let response: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(response["error"]["code"], json!(-32700));

        server_task.abort();
    }
}
