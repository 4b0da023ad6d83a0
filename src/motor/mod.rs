// Motor control module for the differential drive base
//
// Provides:
// - Twist to motor power mapping
// - Motor controller capability trait and a locked, time-bounded handle
// - An in-process simulated controller

mod driver;
pub mod kinematics;
pub mod sim;

pub use driver::{
    DriverError, DriverHandle, EncoderReading, Motor, MotorController, TemperatureSensor,
};
pub use kinematics::{CommandMapper, Direction, MotorCommand, MotorPower};
pub use sim::SimulatedRoboclaw;
