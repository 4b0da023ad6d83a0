// Control core for a differential drive base on a two-channel motor controller
//
// - `odometry`: encoder ticks -> pose and velocity
// - `motor`: twist -> motor power, controller capability trait, simulated controller
// - `watchdog`: command timeout
// - `diagnostics`: status word and telemetry -> report
// - `runtime`: the control loop and the Zenoh plumbing around it

pub mod config;
pub mod diagnostics;
pub mod messages;
pub mod motor;
pub mod odometry;
pub mod runtime;
pub mod watchdog;
