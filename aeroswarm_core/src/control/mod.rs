//! Per-vehicle control firmware.

mod cascade;
mod firmware;
mod pid;

pub use cascade::{
    accel_to_attitude, mix_quad_x, motors_to_wrench, wrap_pi, AngleController,
    AngleRateController, ConstantOutputController, GoalMode, PassthroughController,
    PositionController, RotorParams, VelocityController,
};
pub use firmware::{
    CommandHandle, CommandOutcome, DrivetrainType, FlightFirmware, FlightGoal, FlightParams,
    FlightState, GeoFence, MultirotorState, RcData, YawMode,
};
pub use pid::{PidConfig, PidController};
