// Timeouts, topics, drive geometry and the command-line surface
use std::time::Duration;

use clap::Parser;

// Runtime loop frequency
pub const LOOP_HZ: f64 = 10.0;

// Command timeout for watchdog (seconds)
pub const CMD_TIMEOUT_SECS: f64 = 2.0;

// Upper bound for a single driver call before it is reported as a transport timeout
pub const DRIVER_TIMEOUT_MS: u64 = 100;

// Zenoh topics
pub const TOPIC_CMD_VEL: &str = "roboclaw/cmd_vel"; // commands
pub const TOPIC_ODOM: &str = "roboclaw/odom"; // pose + velocity
pub const TOPIC_TF: &str = "roboclaw/tf"; // odom -> base_link
pub const TOPIC_DIAGNOSTICS: &str = "roboclaw/diagnostics"; // vitals
pub const TOPIC_HEALTH: &str = "roboclaw/state/health"; // health status

// Frames
pub const ODOM_FRAME: &str = "odom";
pub const BASE_FRAME: &str = "base_link";

// Controller defaults
pub const DEFAULT_DEV: &str = "/dev/ttyACM0";
pub const DEFAULT_BAUD: u32 = 115_200;
pub const DEFAULT_ADDRESS: u8 = 0x80;

/// Valid packet-serial addresses for the controller
pub const ADDRESS_RANGE: std::ops::RangeInclusive<u8> = 0x80..=0x87;

// Drive defaults
pub const TICKS_PER_METER: f64 = 10.0;
pub const BASE_WIDTH: f64 = 0.315; // meters
pub const LINEAR_MAX_SPEED: f64 = 2.0; // m/s
pub const ANGULAR_MAX_SPEED: f64 = 2.0; // rad/s

/// Rejected configuration, fatal at startup
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Address out of range: 0x{0:02X} (expected 0x80..=0x87)")]
    AddressOutOfRange(u8),

    #[error("{name} must be a positive, finite number (got {value})")]
    NotPositive { name: &'static str, value: f64 },

    #[error("{name} gives a period of {seconds} s, outside the representable nonzero range")]
    PeriodOutOfRange { name: &'static str, seconds: f64 },
}

/// Command-line arguments, one flag per recognized option
#[derive(Debug, Clone, Parser)]
#[command(name = "roboclaw-zenoh-runtime", about = "Differential drive control core")]
pub struct Args {
    /// Serial device of the motor controller
    #[arg(long, default_value = DEFAULT_DEV)]
    pub dev: String,

    /// Serial baud rate
    #[arg(long, default_value_t = DEFAULT_BAUD)]
    pub baud: u32,

    /// Packet-serial address (128..=135)
    #[arg(long, default_value_t = DEFAULT_ADDRESS)]
    pub address: u8,

    #[arg(long, default_value_t = TICKS_PER_METER)]
    pub ticks_per_meter: f64,

    /// Distance between the wheels in meters
    #[arg(long, default_value_t = BASE_WIDTH)]
    pub base_width: f64,

    /// Max linear velocity in m/s
    #[arg(long, default_value_t = LINEAR_MAX_SPEED)]
    pub linear_max: f64,

    /// Max angular velocity in rad/s
    #[arg(long, default_value_t = ANGULAR_MAX_SPEED)]
    pub angular_max: f64,

    /// Seconds without a command before the motors are stopped
    #[arg(long, default_value_t = CMD_TIMEOUT_SECS)]
    pub timeout: f64,

    #[arg(long, default_value_t = LOOP_HZ)]
    pub loop_hz: f64,

    #[arg(long, default_value_t = DRIVER_TIMEOUT_MS)]
    pub driver_timeout_ms: u64,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            dev: DEFAULT_DEV.to_string(),
            baud: DEFAULT_BAUD,
            address: DEFAULT_ADDRESS,
            ticks_per_meter: TICKS_PER_METER,
            base_width: BASE_WIDTH,
            linear_max: LINEAR_MAX_SPEED,
            angular_max: ANGULAR_MAX_SPEED,
            timeout: CMD_TIMEOUT_SECS,
            loop_hz: LOOP_HZ,
            driver_timeout_ms: DRIVER_TIMEOUT_MS,
        }
    }
}

/// Validated runtime configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub dev: String,
    pub baud: u32,
    pub address: u8,
    pub ticks_per_meter: f64,
    pub base_width: f64,
    pub linear_max: f64,
    pub angular_max: f64,
    pub cmd_timeout: Duration,
    pub loop_period: Duration,
    pub driver_timeout: Duration,
}

impl RuntimeConfig {
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        if !ADDRESS_RANGE.contains(&args.address) {
            return Err(ConfigError::AddressOutOfRange(args.address));
        }

        let ticks_per_meter = positive("ticks_per_meter", args.ticks_per_meter)?;
        let base_width = positive("base_width", args.base_width)?;
        let linear_max = positive("linear_max", args.linear_max)?;
        let angular_max = positive("angular_max", args.angular_max)?;
        let timeout = positive("timeout", args.timeout)?;
        let loop_hz = positive("loop_hz", args.loop_hz)?;
        let driver_timeout_ms = positive("driver_timeout_ms", args.driver_timeout_ms as f64)?;

        Ok(Self {
            dev: args.dev,
            baud: args.baud,
            address: args.address,
            ticks_per_meter,
            base_width,
            linear_max,
            angular_max,
            cmd_timeout: period("timeout", timeout)?,
            loop_period: period("loop_hz", 1.0 / loop_hz)?,
            driver_timeout: Duration::from_millis(driver_timeout_ms as u64),
        })
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            dev: DEFAULT_DEV.to_string(),
            baud: DEFAULT_BAUD,
            address: DEFAULT_ADDRESS,
            ticks_per_meter: TICKS_PER_METER,
            base_width: BASE_WIDTH,
            linear_max: LINEAR_MAX_SPEED,
            angular_max: ANGULAR_MAX_SPEED,
            cmd_timeout: Duration::from_secs_f64(CMD_TIMEOUT_SECS),
            loop_period: Duration::from_secs_f64(1.0 / LOOP_HZ),
            driver_timeout: Duration::from_millis(DRIVER_TIMEOUT_MS),
        }
    }
}

/// Reject zero, negative and NaN values
pub(crate) fn positive(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

/// Convert seconds to a nonzero `Duration`, rejecting values it cannot hold
fn period(name: &'static str, seconds: f64) -> Result<Duration, ConfigError> {
    match Duration::try_from_secs_f64(seconds) {
        Ok(d) if !d.is_zero() => Ok(d),
        _ => Err(ConfigError::PeriodOutOfRange { name, seconds }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RuntimeConfig::from_args(Args::default()).unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.loop_period, Duration::from_millis(100));
        assert_eq!(config.cmd_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_address_range() {
        for address in [0x80, 0x84, 0x87] {
            let args = Args { address, ..Args::default() };
            assert!(RuntimeConfig::from_args(args).is_ok());
        }
        for address in [0x00, 0x7F, 0x88, 0xFF] {
            let args = Args { address, ..Args::default() };
            assert_eq!(
                RuntimeConfig::from_args(args),
                Err(ConfigError::AddressOutOfRange(address))
            );
        }
    }

    #[test]
    fn test_zero_max_speed_rejected() {
        let args = Args { linear_max: 0.0, ..Args::default() };
        assert!(matches!(
            RuntimeConfig::from_args(args),
            Err(ConfigError::NotPositive { name: "linear_max", .. })
        ));

        let args = Args { angular_max: f64::NAN, ..Args::default() };
        assert!(RuntimeConfig::from_args(args).is_err());
    }

    #[test]
    fn test_cli_flags_parse() {
        let args = Args::try_parse_from([
            "roboclaw-zenoh-runtime",
            "--address",
            "130",
            "--base-width",
            "0.4",
            "--loop-hz",
            "20",
        ])
        .unwrap();
        let config = RuntimeConfig::from_args(args).unwrap();
        assert_eq!(config.address, 0x82);
        assert_eq!(config.base_width, 0.4);
        assert_eq!(config.loop_period, Duration::from_millis(50));
    }

    #[test]
    fn test_unrepresentable_periods_rejected() {
        let args = Args { timeout: 1e300, ..Args::default() };
        assert!(matches!(
            RuntimeConfig::from_args(args),
            Err(ConfigError::PeriodOutOfRange { name: "timeout", .. })
        ));

        let args = Args { loop_hz: 1e-300, ..Args::default() };
        assert!(matches!(
            RuntimeConfig::from_args(args),
            Err(ConfigError::PeriodOutOfRange { name: "loop_hz", .. })
        ));
    }

    #[test]
    fn test_zero_loop_period_rejected() {
        // 1e12 Hz rounds down to a 0 ns period, which the interval timer cannot use
        let args = Args { loop_hz: 1e12, ..Args::default() };
        assert!(matches!(
            RuntimeConfig::from_args(args),
            Err(ConfigError::PeriodOutOfRange { name: "loop_hz", .. })
        ));
    }
}
