// Controller health reporting
//
// The controller exposes a 16-bit status word. Each known value maps to a
// `DeviceStatus` with a fixed severity and message. Values outside the table
// (for example two fault bits set at once) are not decomposed; they become
// `DeviceStatus::Unknown`. `check_vitals` reads the status word and the auxiliary
// telemetry through the driver handle and builds one report per cycle.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::motor::{DriverError, DriverHandle, MotorController, TemperatureSensor};

/// Diagnostic level, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Ok,
    Warn,
    Error,
}

/// Decoded controller status word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceStatus {
    Normal,
    M1OverCurrent,
    M2OverCurrent,
    EmergencyStop,
    Temperature1Error,
    Temperature2Error,
    MainBatteryHighError,
    LogicBatteryHigh,
    LogicBatteryLow,
    M1DriverFault,
    M2DriverFault,
    MainBatteryHighWarning,
    MainBatteryLow,
    Temperature1Warning,
    Temperature2Warning,
    M1Home,
    M2Home,
    /// Any value not in the table, kept verbatim
    Unknown(u16),
}

impl DeviceStatus {
    /// Look the raw status word up verbatim
    pub fn from_bits(bits: u16) -> Self {
        match bits {
            0x0000 => Self::Normal,
            0x0001 => Self::M1OverCurrent,
            0x0002 => Self::M2OverCurrent,
            0x0004 => Self::EmergencyStop,
            0x0008 => Self::Temperature1Error,
            0x0010 => Self::Temperature2Error,
            0x0020 => Self::MainBatteryHighError,
            0x0040 => Self::LogicBatteryHigh,
            0x0080 => Self::LogicBatteryLow,
            0x0100 => Self::M1DriverFault,
            0x0200 => Self::M2DriverFault,
            0x0400 => Self::MainBatteryHighWarning,
            0x0800 => Self::MainBatteryLow,
            0x1000 => Self::Temperature1Warning,
            0x2000 => Self::Temperature2Warning,
            0x4000 => Self::M1Home,
            0x8000 => Self::M2Home,
            other => Self::Unknown(other),
        }
    }

    pub fn bits(&self) -> u16 {
        match self {
            Self::Normal => 0x0000,
            Self::M1OverCurrent => 0x0001,
            Self::M2OverCurrent => 0x0002,
            Self::EmergencyStop => 0x0004,
            Self::Temperature1Error => 0x0008,
            Self::Temperature2Error => 0x0010,
            Self::MainBatteryHighError => 0x0020,
            Self::LogicBatteryHigh => 0x0040,
            Self::LogicBatteryLow => 0x0080,
            Self::M1DriverFault => 0x0100,
            Self::M2DriverFault => 0x0200,
            Self::MainBatteryHighWarning => 0x0400,
            Self::MainBatteryLow => 0x0800,
            Self::Temperature1Warning => 0x1000,
            Self::Temperature2Warning => 0x2000,
            Self::M1Home => 0x4000,
            Self::M2Home => 0x8000,
            Self::Unknown(bits) => *bits,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::Normal | Self::M1Home | Self::M2Home => Severity::Ok,
            Self::M1OverCurrent
            | Self::M2OverCurrent
            | Self::M1DriverFault
            | Self::M2DriverFault
            | Self::MainBatteryHighWarning
            | Self::MainBatteryLow
            | Self::Temperature1Warning
            | Self::Temperature2Warning => Severity::Warn,
            Self::EmergencyStop
            | Self::Temperature1Error
            | Self::Temperature2Error
            | Self::MainBatteryHighError
            | Self::LogicBatteryHigh
            | Self::LogicBatteryLow
            | Self::Unknown(_) => Severity::Error,
        }
    }

    pub fn message(&self) -> String {
        let text = match self {
            Self::Normal => "Normal",
            Self::M1OverCurrent => "M1 over current",
            Self::M2OverCurrent => "M2 over current",
            Self::EmergencyStop => "Emergency Stop",
            Self::Temperature1Error | Self::Temperature1Warning => "Temperature1",
            Self::Temperature2Error | Self::Temperature2Warning => "Temperature2",
            Self::MainBatteryHighError | Self::MainBatteryHighWarning => "Main batt voltage high",
            Self::LogicBatteryHigh => "Logic batt voltage high",
            Self::LogicBatteryLow => "Logic batt voltage low",
            Self::M1DriverFault => "M1 driver fault",
            Self::M2DriverFault => "M2 driver fault",
            Self::MainBatteryLow => "Main batt voltage low",
            Self::M1Home => "M1 home",
            Self::M2Home => "M2 home",
            Self::Unknown(bits) => return format!("Unknown status 0x{:04X}", bits),
        };
        text.to_string()
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

/// Map a raw status word to its severity and message
pub fn summarize(bits: u16) -> (Severity, String) {
    let status = DeviceStatus::from_bits(bits);
    (status.severity(), status.message())
}

/// Auxiliary readings; a field is `None` when its read failed
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Telemetry {
    pub battery_main_v: Option<f64>,
    pub battery_logic_v: Option<f64>,
    pub temp1_c: Option<f64>,
    pub temp2_c: Option<f64>,
}

/// One diagnostics cycle
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticsReport {
    pub severity: Severity,
    pub message: String,
    pub battery_main_v: Option<f64>,
    pub battery_logic_v: Option<f64>,
    pub temp1_c: Option<f64>,
    pub temp2_c: Option<f64>,
}

impl DiagnosticsReport {
    pub fn new(status: DeviceStatus, telemetry: Telemetry) -> Self {
        Self {
            severity: status.severity(),
            message: status.message(),
            battery_main_v: telemetry.battery_main_v,
            battery_logic_v: telemetry.battery_logic_v,
            temp1_c: telemetry.temp1_c,
            temp2_c: telemetry.temp2_c,
        }
    }
}

/// Read each telemetry field on its own; one failure does not abort the rest
pub async fn collect_telemetry<D: MotorController>(driver: &DriverHandle<D>) -> Telemetry {
    let battery_main_v = driver
        .call("read_main_battery_voltage", |d| d.read_main_battery_voltage())
        .await;
    let battery_logic_v = driver
        .call("read_logic_battery_voltage", |d| d.read_logic_battery_voltage())
        .await;
    let temp1_c = driver
        .call("read_temperature", |d| d.read_temperature(TemperatureSensor::Temp1))
        .await;
    let temp2_c = driver
        .call("read_temperature", |d| d.read_temperature(TemperatureSensor::Temp2))
        .await;

    Telemetry {
        battery_main_v: tenths("main battery voltage", battery_main_v.map(f64::from)),
        battery_logic_v: tenths("logic battery voltage", battery_logic_v.map(f64::from)),
        temp1_c: tenths("temperature 1", temp1_c.map(f64::from)),
        temp2_c: tenths("temperature 2", temp2_c.map(f64::from)),
    }
}

fn tenths(what: &str, raw: Result<f64, DriverError>) -> Option<f64> {
    match raw {
        Ok(value) => Some(value / 10.0),
        Err(e) => {
            warn!("Diagnostics: failed to read {}: {}", what, e);
            None
        }
    }
}

/// Build this cycle's report
///
/// Returns `None` (report withheld) when the status word cannot be read.
pub async fn check_vitals<D: MotorController>(driver: &DriverHandle<D>) -> Option<DiagnosticsReport> {
    let bits = match driver.call("read_error_bitmask", |d| d.read_error_bitmask()).await {
        Ok(bits) => bits,
        Err(e) => {
            warn!("Diagnostics: failed to read status: {}", e);
            return None;
        }
    };

    let status = DeviceStatus::from_bits(bits);
    if status.is_known() {
        debug!("Controller status: {:?}", status);
    } else {
        warn!("Unhandled controller status 0x{:04X}", bits);
    }

    let telemetry = collect_telemetry(driver).await;
    Some(DiagnosticsReport::new(status, telemetry))
}
