//! The simulation world: clock + physics + vehicles + API registry.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;

use tracing::{debug, info};

use crate::api::ApiProvider;
use crate::clock::{nanos_to_sec, ScalableClock, SimClock, SteppableClock};
use crate::error::SimError;
use crate::factory::build_vehicle;
use crate::geom::{Pose, Real, Vector3r};
use crate::physics::{PhysicsEngine, PhysicsMode};
use crate::recording::Recorder;
use crate::sensors::{FlatGroundCaster, RayCaster, SharedClock};
use crate::settings::{ClockType, Settings, SimMode, VehicleSettings};
use crate::updatable::Updatable;
use crate::vehicle::Vehicle;

/// Version string reported over RPC.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine-facing world state: weather, time of day, segmentation ids and
/// object poses. The 3D engine consumes these; headless runs just store them.
#[derive(Debug, Default)]
struct WorldState {
    weather_enabled: bool,
    weather: HashMap<i32, Real>,
    time_of_day: String,
    segmentation: HashMap<String, i32>,
    object_poses: HashMap<String, Pose>,
}

/// The assembled simulation.
///
/// A single physics thread drives `tick` at the configured period; RPC
/// workers and the coordination fabric reach vehicles only through the
/// [`ApiProvider`]. The physics loop holds no external locks during
/// integration.
pub struct SimWorld {
    settings: Settings,
    clock: SharedClock,
    steppable: Option<Arc<SteppableClock>>,
    engine: Mutex<PhysicsEngine>,
    vehicles: Mutex<Vec<Vehicle>>,
    provider: Arc<ApiProvider>,
    ray_caster: Arc<dyn RayCaster>,
    paused: AtomicBool,
    /// Frames still to run while paused; -1 while free-running.
    pending_frames: AtomicI64,
    shutdown: AtomicBool,
    tick_count: AtomicU64,
    recorder: Mutex<Option<Recorder>>,
    world_state: Mutex<WorldState>,
}

impl SimWorld {
    /// Builds the whole component tree from settings.
    pub fn from_settings(
        settings: Settings,
        ray_caster: Option<Arc<dyn RayCaster>>,
    ) -> Result<Arc<Self>, SimError> {
        settings.validate()?;
        let ray_caster = ray_caster.unwrap_or_else(|| Arc::new(FlatGroundCaster::default()));

        let (clock, steppable): (SharedClock, Option<Arc<SteppableClock>>) =
            match settings.clock_type {
                ClockType::Steppable => {
                    let clock =
                        Arc::new(SteppableClock::new(settings.physics_period_ns, settings.clock_speed));
                    (clock.clone(), Some(clock))
                }
                ClockType::Scalable => (Arc::new(ScalableClock::new(settings.clock_speed)), None),
            };

        let mode = match settings.sim_mode {
            SimMode::ComputerVision => PhysicsMode::External,
            _ => PhysicsMode::Internal,
        };
        let mut engine = PhysicsEngine::new(mode);
        let provider = Arc::new(ApiProvider::new());
        let mut vehicles = Vec::new();

        for (index, (name, vehicle_settings)) in settings.vehicles.iter().enumerate() {
            let built = build_vehicle(
                name,
                vehicle_settings,
                &settings,
                clock.clone(),
                Arc::clone(&ray_caster),
                index as u64,
            )?;
            engine.add_body(built.body_handle);
            provider.insert_or_assign(name, built.api, built.sim_api);
            vehicles.push(built.vehicle);
        }
        if let Some(default_name) = settings.default_vehicle() {
            provider.make_default(default_name);
        }
        engine.reset();

        let recorder = if settings.recording.enabled {
            Some(Recorder::create(
                Path::new(&settings.recording.folder),
                settings.recording.record_interval_sec,
            )?)
        } else {
            None
        };

        info!(
            vehicles = vehicles.len(),
            clock = ?settings.clock_type,
            "simulation world ready"
        );

        let world = Arc::new_cyclic(|weak: &Weak<SimWorld>| {
            provider.set_world_sim_api(weak.clone());
            Self {
                settings,
                clock,
                steppable,
                engine: Mutex::new(engine),
                vehicles: Mutex::new(vehicles),
                provider: Arc::clone(&provider),
                ray_caster,
                paused: AtomicBool::new(false),
                pending_frames: AtomicI64::new(-1),
                shutdown: AtomicBool::new(false),
                tick_count: AtomicU64::new(0),
                recorder: Mutex::new(recorder),
                world_state: Mutex::new(WorldState::default()),
            }
        });
        Ok(world)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_string(&self) -> String {
        self.settings.to_json_string()
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn provider(&self) -> &Arc<ApiProvider> {
        &self.provider
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count.load(Ordering::SeqCst)
    }

    pub fn period_sec(&self) -> f64 {
        nanos_to_sec(self.settings.physics_period_ns as i64)
    }

    /// Inserts a vehicle while the simulation is running.
    pub fn create_vehicle_at_runtime(
        &self,
        name: &str,
        vehicle_settings: &VehicleSettings,
    ) -> Result<(), SimError> {
        if name.is_empty() {
            return Err(SimError::invalid("vehicle name must not be empty"));
        }
        if self.provider.get_vehicle_api(name).is_some() {
            return Err(SimError::invalid(format!("vehicle '{name}' already exists")));
        }
        let mut vehicles = self.vehicles.lock().unwrap();
        let built = build_vehicle(
            name,
            vehicle_settings,
            &self.settings,
            self.clock.clone(),
            Arc::clone(&self.ray_caster),
            vehicles.len() as u64,
        )?;
        self.engine.lock().unwrap().add_body(built.body_handle);
        self.provider.insert_or_assign(name, built.api, built.sim_api);
        vehicles.push(built.vehicle);
        info!(vehicle = name, "vehicle inserted at runtime");
        Ok(())
    }

    // ---- stepping ----

    /// Runs one physics tick: clock, integration, sensors, controllers.
    pub fn tick(&self) -> Result<(), SimError> {
        if let Some(steppable) = &self.steppable {
            steppable.step();
        }
        let dt = (self.settings.physics_period_ns as f64 / 1e9) as Real;

        {
            let mut engine = self.engine.lock().unwrap();
            engine.step(dt)?;
        }
        {
            let mut vehicles = self.vehicles.lock().unwrap();
            for vehicle in vehicles.iter_mut() {
                vehicle.update()?;
            }
        }
        self.tick_count.fetch_add(1, Ordering::SeqCst);
        self.record_if_due()?;
        Ok(())
    }

    fn record_if_due(&self) -> Result<(), SimError> {
        let mut recorder_slot = self.recorder.lock().unwrap();
        let Some(recorder) = recorder_slot.as_mut() else {
            return Ok(());
        };
        let now = self.clock.now();
        if !recorder.is_due(now) {
            return Ok(());
        }
        let vehicles = self.vehicles.lock().unwrap();
        let rows: Vec<_> = vehicles
            .iter()
            .map(|v| (v.name().to_string(), v.body().read().unwrap().kinematics, None))
            .collect();
        recorder.record_tick(now, &rows)
    }

    /// Spawns the dedicated physics thread.
    pub fn start(self: &Arc<Self>) -> thread::JoinHandle<()> {
        let world = Arc::clone(self);
        thread::Builder::new()
            .name("physics".to_string())
            .spawn(move || {
                let period = world.period_sec();
                while !world.shutdown.load(Ordering::SeqCst) {
                    if world.is_effectively_paused() {
                        thread::sleep(std::time::Duration::from_millis(1));
                        continue;
                    }
                    if let Err(err) = world.tick() {
                        tracing::error!(error = %err, "physics tick failed");
                        break;
                    }
                    world.consume_pending_frame();
                    // Pace wall time only for the scalable clock; a steppable
                    // run goes as fast as it can.
                    if world.steppable.is_none() {
                        world.clock.sleep_for(period);
                    }
                }
                debug!("physics thread exited");
            })
            .expect("failed to spawn physics thread")
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    // ---- world simulation API ----

    pub fn pause(&self, pause: bool) {
        self.paused.store(pause, Ordering::SeqCst);
        if pause {
            self.pending_frames.store(0, Ordering::SeqCst);
        } else {
            self.pending_frames.store(-1, Ordering::SeqCst);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.is_effectively_paused()
    }

    fn is_effectively_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst) && self.pending_frames.load(Ordering::SeqCst) == 0
    }

    fn consume_pending_frame(&self) {
        let _ = self
            .pending_frames
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |frames| {
                if frames > 0 {
                    Some(frames - 1)
                } else {
                    None
                }
            });
    }

    /// Runs `frames` ticks, then pauses again.
    pub fn continue_for_frames(&self, frames: u64) {
        self.paused.store(true, Ordering::SeqCst);
        self.pending_frames.store(frames as i64, Ordering::SeqCst);
    }

    /// Runs for a simulated duration, then pauses again.
    pub fn continue_for_time(&self, seconds: f64) {
        let frames = (seconds / self.period_sec()).ceil() as u64;
        self.continue_for_frames(frames);
    }

    /// Resets the whole world: clock to zero, bodies to spawn state, sensors
    /// and firmware to fresh state. Every outstanding command is cancelled.
    pub fn reset(&self) -> Result<(), SimError> {
        let mut vehicles = self.vehicles.lock().unwrap();
        self.engine.lock().unwrap().reset();
        for vehicle in vehicles.iter_mut() {
            vehicle.reset();
        }
        self.clock.reset_time();
        self.tick_count.store(0, Ordering::SeqCst);
        info!("world reset");
        Ok(())
    }

    pub fn set_wind(&self, wind: Vector3r) {
        self.engine.lock().unwrap().set_wind(wind);
    }

    pub fn set_ext_force(&self, force: Vector3r) {
        self.engine.lock().unwrap().set_ext_force(force);
    }

    pub fn set_weather(&self, kind: i32, value: Real) {
        self.world_state.lock().unwrap().weather.insert(kind, value);
    }

    pub fn get_weather(&self, kind: i32) -> Real {
        *self
            .world_state
            .lock()
            .unwrap()
            .weather
            .get(&kind)
            .unwrap_or(&0.0)
    }

    pub fn enable_weather(&self, enable: bool) {
        self.world_state.lock().unwrap().weather_enabled = enable;
    }

    pub fn is_weather_enabled(&self) -> bool {
        self.world_state.lock().unwrap().weather_enabled
    }

    pub fn set_time_of_day(&self, value: &str) {
        self.world_state.lock().unwrap().time_of_day = value.to_string();
    }

    pub fn time_of_day(&self) -> String {
        self.world_state.lock().unwrap().time_of_day.clone()
    }

    pub fn set_segmentation_object_id(&self, object_name: &str, id: i32) -> bool {
        self.world_state
            .lock()
            .unwrap()
            .segmentation
            .insert(object_name.to_string(), id);
        true
    }

    pub fn get_segmentation_object_id(&self, object_name: &str) -> i32 {
        *self
            .world_state
            .lock()
            .unwrap()
            .segmentation
            .get(object_name)
            .unwrap_or(&-1)
    }

    pub fn set_object_pose(&self, object_name: &str, pose: Pose) -> bool {
        self.world_state
            .lock()
            .unwrap()
            .object_poses
            .insert(object_name.to_string(), pose);
        true
    }

    pub fn get_object_pose(&self, object_name: &str) -> Option<Pose> {
        self.world_state
            .lock()
            .unwrap()
            .object_poses
            .get(object_name)
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::CommandOutcome;

    fn steppable_settings(json_vehicles: &str) -> Settings {
        let json = format!(
            r#"{{"clock_type": "steppable", "vehicles": {json_vehicles}}}"#
        );
        Settings::from_json_str(&json).unwrap()
    }

    fn two_drone_world() -> Arc<SimWorld> {
        let settings = steppable_settings(
            r#"{
                "drone0": {"vehicle_type": "simple_flight", "is_default": true},
                "drone1": {"vehicle_type": "simple_flight",
                           "initial_pose": {"x": 0.0, "y": 5.0, "z": 0.0}}
            }"#,
        );
        SimWorld::from_settings(settings, None).unwrap()
    }

    #[test]
    fn test_world_builds_and_registers_vehicles() {
        let world = two_drone_world();
        assert_eq!(world.provider().vehicle_count(), 2);
        assert!(world.provider().has_default());
        assert!(world.provider().get_vehicle_api("drone0").is_some());
        assert!(world.provider().get_vehicle_api("").is_some());
    }

    #[test]
    fn test_tick_advances_clock_and_counter() {
        let world = two_drone_world();
        let t0 = world.clock().now();
        world.tick().unwrap();
        world.tick().unwrap();
        assert_eq!(world.tick_count(), 2);
        assert!(world.clock().now() > t0);
    }

    #[test]
    fn test_takeoff_through_api_over_ticks() {
        let world = two_drone_world();
        let api = world.provider().get_vehicle_api("").unwrap();
        api.enable_api_control(true);
        api.arm().unwrap();
        let handle = api.as_multirotor().unwrap().takeoff(10.0).unwrap();

        // 5 simulated seconds at the default 3 ms period.
        for _ in 0..1667 {
            world.tick().unwrap();
        }

        let sim_api = world.provider().get_vehicle_sim_api("drone0").unwrap();
        let kinematics = sim_api.get_ground_truth_kinematics();
        assert!(
            (kinematics.pose.position.z - (-10.0)).abs() < 0.5,
            "altitude was {}",
            kinematics.pose.position.z
        );
        assert!(kinematics.twist.linear.norm() < 0.5);
        assert_eq!(handle.status(), CommandOutcome::Completed);

        // Orientation stayed normalized throughout.
        let norm = kinematics.pose.orientation.into_inner().norm();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_pause_and_continue_for_frames() {
        let world = two_drone_world();
        world.pause(true);
        assert!(world.is_paused());
        world.continue_for_frames(5);
        assert!(!world.is_paused());
        for _ in 0..5 {
            world.tick().unwrap();
            world.consume_pending_frame();
        }
        assert!(world.is_paused());
    }

    #[test]
    fn test_reset_rewinds_everything() {
        let world = two_drone_world();
        let api = world.provider().get_vehicle_api("drone0").unwrap();
        api.enable_api_control(true);
        api.arm().unwrap();
        let handle = api.as_multirotor().unwrap().takeoff(5.0).unwrap();
        for _ in 0..600 {
            world.tick().unwrap();
        }
        world.reset().unwrap();

        assert_eq!(world.clock().now(), 0);
        assert_eq!(world.tick_count(), 0);
        let kinematics = world
            .provider()
            .get_vehicle_sim_api("drone0")
            .unwrap()
            .get_ground_truth_kinematics();
        assert_eq!(kinematics.pose.position.z, 0.0);
        // The outstanding command was cancelled by the reset.
        assert_eq!(handle.status(), CommandOutcome::Cancelled);
    }

    #[test]
    fn test_runtime_vehicle_insertion() {
        let world = two_drone_world();
        world
            .create_vehicle_at_runtime("drone2", &VehicleSettings::default())
            .unwrap();
        assert_eq!(world.provider().vehicle_count(), 3);
        assert!(world.provider().get_vehicle_api("drone2").is_some());

        let duplicate = world.create_vehicle_at_runtime("drone2", &VehicleSettings::default());
        assert!(matches!(duplicate, Err(SimError::InvalidArgument(_))));
    }

    #[test]
    fn test_world_sim_state_holders() {
        let world = two_drone_world();
        world.set_weather(1, 0.5);
        assert_eq!(world.get_weather(1), 0.5);
        world.set_segmentation_object_id("tree_01", 42);
        assert_eq!(world.get_segmentation_object_id("tree_01"), 42);
        assert_eq!(world.get_segmentation_object_id("missing"), -1);
        world.set_wind(Vector3r::new(1.0, 0.0, 0.0));
        world.set_ext_force(Vector3r::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn test_provider_world_api_roundtrip() {
        let world = two_drone_world();
        let from_provider = world.provider().get_world_sim_api().unwrap();
        from_provider.set_weather(2, 0.25);
        assert_eq!(world.get_weather(2), 0.25);
    }
}
