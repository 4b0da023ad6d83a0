// In-process two-channel motor controller
//
// Integrates commanded power into encoder ticks over wall-clock time and reports
// steady battery/temperature telemetry. Lets the whole runtime run headless, with
// no controller attached.

use std::time::Instant;

use tracing::debug;

use super::driver::{DriverError, EncoderReading, Motor, MotorController, Result, TemperatureSensor};
use super::kinematics::{MotorPower, MAX_MAGNITUDE};

const SIM_VERSION: &str = "Simulated 2x7A v4.1.34";

#[derive(Debug, Clone, Copy)]
struct SimMotor {
    power: i32,
    ticks: f64,
}

impl SimMotor {
    fn new() -> Self {
        Self { power: 0, ticks: 0.0 }
    }
}

/// Simulated controller
///
/// Full power (127) spins a wheel at `full_speed` m/s, which advances the encoder
/// by `full_speed * ticks_per_meter` ticks per second.
#[derive(Debug, Clone)]
pub struct SimulatedRoboclaw {
    address: u8,
    ticks_per_second_at_full: f64,
    m1: SimMotor,
    m2: SimMotor,
    last_step: Instant,
    error_bits: u16,
    main_battery_dv: u16,
    logic_battery_dv: u16,
    temperatures_dc: [i16; 2],
}

impl SimulatedRoboclaw {
    pub fn new(address: u8, ticks_per_meter: f64, full_speed: f64) -> Self {
        Self {
            address,
            ticks_per_second_at_full: ticks_per_meter * full_speed,
            m1: SimMotor::new(),
            m2: SimMotor::new(),
            last_step: Instant::now(),
            error_bits: 0,
            main_battery_dv: 124,
            logic_battery_dv: 51,
            temperatures_dc: [283, 291],
        }
    }

    /// Force a status word, e.g. 0x0004 for an emergency stop
    pub fn set_error_bits(&mut self, bits: u16) {
        self.error_bits = bits;
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Current signed power of (M1, M2)
    pub fn powers(&self) -> (i32, i32) {
        (self.m1.power, self.m2.power)
    }

    fn step(&mut self) {
        let now = Instant::now();
        let dt = now.saturating_duration_since(self.last_step).as_secs_f64();
        self.last_step = now;

        let rate = self.ticks_per_second_at_full;
        for motor in [&mut self.m1, &mut self.m2] {
            let fraction = motor.power as f64 / MAX_MAGNITUDE as f64;
            motor.ticks += fraction * rate * dt;
        }
    }

    fn reading(motor: &SimMotor) -> EncoderReading {
        EncoderReading {
            status: 0,
            ticks: motor.ticks.trunc() as i64,
        }
    }
}

impl MotorController for SimulatedRoboclaw {
    fn read_version(&mut self) -> Result<String> {
        Ok(SIM_VERSION.to_string())
    }

    fn read_encoder_left(&mut self) -> Result<EncoderReading> {
        self.step();
        Ok(Self::reading(&self.m1))
    }

    fn read_encoder_right(&mut self) -> Result<EncoderReading> {
        self.step();
        Ok(Self::reading(&self.m2))
    }

    fn set_motor_power(&mut self, motor: Motor, power: MotorPower) -> Result<()> {
        if power.magnitude as i32 > MAX_MAGNITUDE {
            return Err(DriverError::Malformed {
                command: "set_motor_power",
                reason: format!("magnitude {} above {}", power.magnitude, MAX_MAGNITUDE),
            });
        }

        // Apply motion accumulated under the previous power first
        self.step();
        debug!("sim 0x{:02X}: {:?} -> {}", self.address, motor, power.signed());
        match motor {
            Motor::M1 => self.m1.power = power.signed(),
            Motor::M2 => self.m2.power = power.signed(),
        }
        Ok(())
    }

    fn read_error_bitmask(&mut self) -> Result<u16> {
        Ok(self.error_bits)
    }

    fn read_main_battery_voltage(&mut self) -> Result<u16> {
        Ok(self.main_battery_dv)
    }

    fn read_logic_battery_voltage(&mut self) -> Result<u16> {
        Ok(self.logic_battery_dv)
    }

    fn read_temperature(&mut self, sensor: TemperatureSensor) -> Result<i16> {
        Ok(match sensor {
            TemperatureSensor::Temp1 => self.temperatures_dc[0],
            TemperatureSensor::Temp2 => self.temperatures_dc[1],
        })
    }
}
