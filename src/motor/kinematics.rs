// Differential drive command mapping
// Converts a body twist (linear m/s, angular rad/s) into per-motor power levels.

use crate::config::{positive, ConfigError};
use crate::messages::TwistCommand;

/// Full-scale motor power in either direction
pub const MAX_MAGNITUDE: i32 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Power for one motor: direction plus magnitude in 0..=127
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorPower {
    pub direction: Direction,
    pub magnitude: u8,
}

impl MotorPower {
    pub fn stop() -> Self {
        Self {
            direction: Direction::Forward,
            magnitude: 0,
        }
    }

    /// Clamp a signed power level to [-127, 127] and split off its sign
    pub fn from_signed(value: i32) -> Self {
        let value = value.clamp(-MAX_MAGNITUDE, MAX_MAGNITUDE);
        let direction = if value >= 0 {
            Direction::Forward
        } else {
            Direction::Backward
        };
        Self {
            direction,
            magnitude: value.unsigned_abs() as u8,
        }
    }

    /// Signed power level, negative when running backward
    pub fn signed(&self) -> i32 {
        match self.direction {
            Direction::Forward => self.magnitude as i32,
            Direction::Backward => -(self.magnitude as i32),
        }
    }
}

/// Power levels for both motors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorCommand {
    pub left: MotorPower,  // M1
    pub right: MotorPower, // M2
}

impl MotorCommand {
    pub fn stop() -> Self {
        Self {
            left: MotorPower::stop(),
            right: MotorPower::stop(),
        }
    }

    pub fn is_stop(&self) -> bool {
        self.left.magnitude == 0 && self.right.magnitude == 0
    }
}

/// Maps twists to motor power using the configured max speeds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandMapper {
    linear_max: f64,
    angular_max: f64,
}

impl CommandMapper {
    /// Both limits must be positive and finite
    pub fn new(linear_max: f64, angular_max: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            linear_max: positive("linear_max", linear_max)?,
            angular_max: positive("angular_max", angular_max)?,
        })
    }

    /// Convert a twist into motor power
    ///
    /// Linear velocity is clamped to the max before mixing. The mixed values are
    /// scaled to the motor range, truncated toward zero and clamped.
    pub fn map(&self, twist: &TwistCommand) -> MotorCommand {
        let linear = nan_to_zero(twist.linear).clamp(-self.linear_max, self.linear_max);
        let angular = nan_to_zero(twist.angular);

        let m1 = linear / self.linear_max + angular / self.angular_max;
        let m2 = linear / self.linear_max - angular / self.angular_max;

        // `as` truncates toward zero and saturates at the i32 bounds
        MotorCommand {
            left: MotorPower::from_signed((m1 * MAX_MAGNITUDE as f64) as i32),
            right: MotorPower::from_signed((m2 * MAX_MAGNITUDE as f64) as i32),
        }
    }
}

fn nan_to_zero(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> CommandMapper {
        CommandMapper::new(2.0, 2.0).unwrap()
    }

    #[test]
    fn test_zero_twist_is_stop() {
        let cmd = mapper().map(&TwistCommand::new(0.0, 0.0));
        assert_eq!(cmd, MotorCommand::stop());
        assert!(cmd.is_stop());
        assert_eq!(cmd.left.direction, Direction::Forward);
    }

    #[test]
    fn test_linear_clamped_to_max() {
        let m = mapper();
        assert_eq!(
            m.map(&TwistCommand::new(4.0, 0.0)),
            m.map(&TwistCommand::new(2.0, 0.0))
        );
        assert_eq!(
            m.map(&TwistCommand::new(-4.0, 0.0)),
            m.map(&TwistCommand::new(-2.0, 0.0))
        );
        assert_eq!(m.map(&TwistCommand::new(2.0, 0.0)).left.magnitude, 127);
    }

    #[test]
    fn test_forward_half_speed() {
        let cmd = mapper().map(&TwistCommand::new(1.0, 0.0));
        // 0.5 * 127 = 63.5, truncated
        assert_eq!(cmd.left, MotorPower { direction: Direction::Forward, magnitude: 63 });
        assert_eq!(cmd.right, cmd.left);
    }

    #[test]
    fn test_rotation_splits_directions() {
        let cmd = mapper().map(&TwistCommand::new(0.0, 1.0));
        assert_eq!(cmd.left.signed(), 63);
        assert_eq!(cmd.right.signed(), -63);
        assert_eq!(cmd.right.direction, Direction::Backward);
    }

    #[test]
    fn test_mixed_output_clamped() {
        // Full forward plus full rotation saturates M1, cancels M2
        let cmd = mapper().map(&TwistCommand::new(2.0, 2.0));
        assert_eq!(cmd.left.signed(), 127);
        assert_eq!(cmd.right.signed(), 0);

        // Angular is not clamped before mixing, only the output is
        let cmd = mapper().map(&TwistCommand::new(0.0, -50.0));
        assert_eq!(cmd.left.signed(), -127);
        assert_eq!(cmd.right.signed(), 127);
    }

    #[test]
    fn test_truncates_toward_zero() {
        // -0.01 / 2.0 * 127 = -0.635 -> 0
        let cmd = mapper().map(&TwistCommand::new(-0.01, 0.0));
        assert_eq!(cmd.left.signed(), 0);
        assert_eq!(cmd.left.direction, Direction::Forward);
    }

    #[test]
    fn test_nan_twist_is_stop() {
        let cmd = mapper().map(&TwistCommand::new(f64::NAN, f64::NAN));
        assert!(cmd.is_stop());
    }

    #[test]
    fn test_from_signed_clamps() {
        assert_eq!(MotorPower::from_signed(500).magnitude, 127);
        assert_eq!(MotorPower::from_signed(-500).signed(), -127);
        assert_eq!(MotorPower::from_signed(i32::MIN).signed(), -127);
    }

    #[test]
    fn test_invalid_limits_rejected() {
        assert!(CommandMapper::new(0.0, 2.0).is_err());
        assert!(CommandMapper::new(2.0, f64::NAN).is_err());
        assert!(CommandMapper::new(-1.0, 2.0).is_err());
    }
}
