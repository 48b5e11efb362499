//! Registry mapping vehicle names to their APIs.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use crate::api::{VehicleApi, VehicleSimApi};
use crate::world::SimWorld;

/// Thread-safe name -> API registry with a distinguished default vehicle.
///
/// The default is an alias, not a copy: `make_default(name)` stores the same
/// handle under the empty key, so mutations through either name observe the
/// same vehicle. Reads are concurrent; writes are serialized by the same
/// lock. This is the only mutable data shared between the RPC workers and
/// the physics thread.
#[derive(Default)]
pub struct ApiProvider {
    inner: RwLock<Maps>,
    world_sim_api: RwLock<Option<Weak<SimWorld>>>,
}

#[derive(Default)]
struct Maps {
    vehicle_apis: HashMap<String, VehicleApi>,
    vehicle_sim_apis: HashMap<String, VehicleSimApi>,
}

impl ApiProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a vehicle's APIs. The first vehicle inserted
    /// becomes the default.
    pub fn insert_or_assign(
        &self,
        vehicle_name: &str,
        vehicle_api: VehicleApi,
        vehicle_sim_api: VehicleSimApi,
    ) {
        let mut maps = self.inner.write().unwrap();
        let first = maps.vehicle_apis.is_empty();
        maps.vehicle_apis
            .insert(vehicle_name.to_string(), vehicle_api.clone());
        maps.vehicle_sim_apis
            .insert(vehicle_name.to_string(), vehicle_sim_api.clone());
        if first && !vehicle_name.is_empty() {
            maps.vehicle_apis.insert(String::new(), vehicle_api);
            maps.vehicle_sim_apis.insert(String::new(), vehicle_sim_api);
        }
    }

    /// Control API for a vehicle; the empty name resolves the default.
    pub fn get_vehicle_api(&self, vehicle_name: &str) -> Option<VehicleApi> {
        self.inner
            .read()
            .unwrap()
            .vehicle_apis
            .get(vehicle_name)
            .cloned()
    }

    /// Sim API for a vehicle; the empty name resolves the default.
    pub fn get_vehicle_sim_api(&self, vehicle_name: &str) -> Option<VehicleSimApi> {
        self.inner
            .read()
            .unwrap()
            .vehicle_sim_apis
            .get(vehicle_name)
            .cloned()
    }

    /// Aliases the empty name onto `vehicle_name`.
    pub fn make_default(&self, vehicle_name: &str) -> bool {
        let mut maps = self.inner.write().unwrap();
        let (Some(api), Some(sim_api)) = (
            maps.vehicle_apis.get(vehicle_name).cloned(),
            maps.vehicle_sim_apis.get(vehicle_name).cloned(),
        ) else {
            return false;
        };
        maps.vehicle_apis.insert(String::new(), api);
        maps.vehicle_sim_apis.insert(String::new(), sim_api);
        true
    }

    pub fn has_default(&self) -> bool {
        self.inner.read().unwrap().vehicle_apis.contains_key("")
    }

    /// Number of registered vehicles, not counting the default alias.
    pub fn vehicle_count(&self) -> usize {
        self.inner
            .read()
            .unwrap()
            .vehicle_apis
            .keys()
            .filter(|name| !name.is_empty())
            .count()
    }

    /// Names of all registered vehicles, sorted, without the default alias.
    pub fn vehicle_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .read()
            .unwrap()
            .vehicle_apis
            .keys()
            .filter(|name| !name.is_empty())
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Registers the world-simulation API. Held weakly because the world
    /// owns the provider.
    pub fn set_world_sim_api(&self, world: Weak<SimWorld>) {
        *self.world_sim_api.write().unwrap() = Some(world);
    }

    /// The world-simulation API, if a world has been attached.
    pub fn get_world_sim_api(&self) -> Option<Arc<SimWorld>> {
        self.world_sim_api
            .read()
            .unwrap()
            .as_ref()
            .and_then(Weak::upgrade)
    }

    pub fn remove(&self, vehicle_name: &str) -> bool {
        let mut maps = self.inner.write().unwrap();
        let removed = maps.vehicle_apis.remove(vehicle_name).is_some();
        maps.vehicle_sim_apis.remove(vehicle_name);
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{FlightFirmware, FlightParams};
    use crate::environment::Environment;
    use crate::geom::{Pose, Vector3r};
    use crate::physics::RigidBody;
    use crate::sensors::SensorSuite;
    use crate::updatable::Updatable;
    use std::sync::{Arc, Mutex, RwLock as StdRwLock};

    fn make_apis(name: &str) -> (VehicleApi, VehicleSimApi) {
        let clock = Arc::new(crate::clock::SteppableClock::default());
        let body = Arc::new(StdRwLock::new(RigidBody::new(
            name,
            1.0,
            Vector3r::new(0.005, 0.005, 0.009),
            Pose::zero(),
        )));
        let env = Arc::new(StdRwLock::new(Environment::new(Default::default())));
        let mut firmware = FlightFirmware::new(
            FlightParams::default(),
            clock,
            Arc::clone(&body),
        );
        firmware.reset();
        let firmware = Arc::new(Mutex::new(firmware));
        let sensors = Arc::new(StdRwLock::new(SensorSuite::new()));
        (
            VehicleApi::Multirotor(crate::api::MultirotorApi::new(
                Arc::clone(&firmware),
                sensors,
                env,
            )),
            VehicleSimApi::new(body, Some(firmware)),
        )
    }

    #[test]
    fn test_first_insert_becomes_default() {
        let provider = ApiProvider::new();
        let (api, sim) = make_apis("drone0");
        provider.insert_or_assign("drone0", api, sim);
        assert!(provider.has_default());
        assert!(provider.get_vehicle_api("").is_some());
        assert_eq!(provider.vehicle_count(), 1);
    }

    #[test]
    fn test_default_is_an_alias_not_a_copy() {
        let provider = ApiProvider::new();
        let (api0, sim0) = make_apis("a");
        let (api1, sim1) = make_apis("b");
        provider.insert_or_assign("a", api0, sim0);
        provider.insert_or_assign("b", api1, sim1);
        provider.make_default("b");

        // Mutating through the alias is observed under the original name.
        provider
            .get_vehicle_api("")
            .unwrap()
            .enable_api_control(true);
        assert!(provider
            .get_vehicle_api("b")
            .unwrap()
            .is_api_control_enabled());
        assert!(!provider
            .get_vehicle_api("a")
            .unwrap()
            .is_api_control_enabled());
    }

    #[test]
    fn test_unknown_vehicle_is_absent() {
        let provider = ApiProvider::new();
        assert!(provider.get_vehicle_api("ghost").is_none());
        assert!(!provider.has_default());
        assert!(!provider.make_default("ghost"));
    }

    #[test]
    fn test_vehicle_names_skip_alias() {
        let provider = ApiProvider::new();
        let (api, sim) = make_apis("x");
        provider.insert_or_assign("x", api, sim);
        assert_eq!(provider.vehicle_names(), vec!["x".to_string()]);
    }
}
