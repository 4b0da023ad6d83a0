// Motor controller capability interface
//
// The runtime never speaks the controller's wire protocol itself. It talks to a
// `MotorController` through a `DriverHandle`, which serializes every call behind a
// mutex and bounds it with a timeout so a stuck transport cannot stall the loop.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::kinematics::{MotorCommand, MotorPower};

/// Motor channel on the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motor {
    M1, // left
    M2, // right
}

/// On-board temperature sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureSensor {
    Temp1,
    Temp2,
}

/// Raw encoder register read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderReading {
    pub status: u8,
    pub ticks: i64,
}

/// Error types for controller communication
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DriverError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No response from controller within {0:?}")]
    Timeout(Duration),

    #[error("Malformed response to {command}: {reason}")]
    Malformed {
        command: &'static str,
        reason: String,
    },

    #[error("Driver lock poisoned by a panicking call")]
    Poisoned,

    #[error("Driver task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, DriverError>;

/// Operations the runtime needs from a two-channel motor controller.
///
/// Implementations own the transport and are expected to bound their own I/O;
/// [`DriverHandle`] adds an outer timeout on top.
pub trait MotorController: Send + 'static {
    fn read_version(&mut self) -> Result<String>;

    fn read_encoder_left(&mut self) -> Result<EncoderReading>;

    fn read_encoder_right(&mut self) -> Result<EncoderReading>;

    fn set_motor_power(&mut self, motor: Motor, power: MotorPower) -> Result<()>;

    /// Status word, see [`crate::diagnostics::DeviceStatus`]
    fn read_error_bitmask(&mut self) -> Result<u16>;

    /// Decivolts
    fn read_main_battery_voltage(&mut self) -> Result<u16>;

    /// Decivolts
    fn read_logic_battery_voltage(&mut self) -> Result<u16>;

    /// Tenths of a degree Celsius
    fn read_temperature(&mut self, sensor: TemperatureSensor) -> Result<i16>;
}

/// Shared, single-writer access to a motor controller
pub struct DriverHandle<D> {
    inner: Arc<Mutex<D>>,
    call_timeout: Duration,
}

impl<D> Clone for DriverHandle<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            call_timeout: self.call_timeout,
        }
    }
}

impl<D: MotorController> DriverHandle<D> {
    pub fn new(driver: D, call_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(driver)),
            call_timeout,
        }
    }

    /// Run one transaction against the controller
    ///
    /// The closure holds the driver lock for its whole duration, so multi-step
    /// transactions are never interleaved with the other task. A call that only
    /// gets the lock after its caller has given up is dropped without touching
    /// the controller.
    pub async fn call<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut D) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let call_timeout = self.call_timeout;
        let deadline = Instant::now() + call_timeout;
        let task = tokio::task::spawn_blocking(move || {
            let mut driver = inner.lock().map_err(|_| DriverError::Poisoned)?;
            if Instant::now() > deadline {
                debug!("{} expired while waiting for the driver, dropped", op);
                return Err(DriverError::Timeout(call_timeout));
            }
            f(&mut *driver)
        });

        match tokio::time::timeout(self.call_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(DriverError::Task(join_err.to_string())),
            Err(_) => {
                warn!("{} did not complete within {:?}", op, self.call_timeout);
                Err(DriverError::Timeout(self.call_timeout))
            }
        }
    }

    /// Send both motor powers in a single locked transaction
    pub async fn set_motor_command(&self, command: MotorCommand) -> Result<()> {
        debug!(
            "Setting motor power: m1={}, m2={}",
            command.left.signed(),
            command.right.signed()
        );
        self.call("set_motor_power", move |d| {
            d.set_motor_power(Motor::M1, command.left)?;
            d.set_motor_power(Motor::M2, command.right)
        })
        .await
    }

    /// Stop both motors
    pub async fn stop(&self) -> Result<()> {
        self.set_motor_command(MotorCommand::stop()).await
    }

    /// Stop both motors if `still_needed` holds once the driver lock is taken
    ///
    /// Returns `false` when the stop was skipped. Lets a command accepted while
    /// the stop was queued win over it.
    pub async fn stop_if<P>(&self, still_needed: P) -> Result<bool>
    where
        P: FnOnce() -> bool + Send + 'static,
    {
        self.call("stop", move |d| {
            if !still_needed() {
                return Ok(false);
            }
            let stop = MotorCommand::stop();
            d.set_motor_power(Motor::M1, stop.left)?;
            d.set_motor_power(Motor::M2, stop.right)?;
            Ok(true)
        })
        .await
    }

    /// Read (left, right) encoders back to back under one lock
    pub async fn read_encoders(&self) -> Result<(EncoderReading, EncoderReading)> {
        self.call("read_encoders", |d| {
            let left = d.read_encoder_left()?;
            let right = d.read_encoder_right()?;
            Ok((left, right))
        })
        .await
    }
}
