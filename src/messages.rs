// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::config::{BASE_FRAME, ODOM_FRAME};
use crate::diagnostics::{DiagnosticsReport, Severity};
use crate::odometry::{Pose2D, VelocityEstimate};

// Velocity command from teleop/planners -> runtime
// Missing fields deserialize to zero so `{"linear": 0.2}` is a valid command
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TwistCommand {
    #[serde(default)]
    pub linear: f64,
    #[serde(default)]
    pub angular: f64,
}

impl TwistCommand {
    pub fn new(linear: f64, angular: f64) -> Self {
        Self { linear, angular }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    /// Unit quaternion for a rotation of `yaw` radians about z (roll = pitch = 0)
    pub fn from_yaw(yaw: f64) -> Self {
        let half = yaw / 2.0;
        Self {
            x: 0.0,
            y: 0.0,
            z: half.sin(),
            w: half.cos(),
        }
    }
}

/// Row-major 6x6 covariance over (x, y, z, roll, pitch, yaw).
/// Planar axes are trusted, z/roll/pitch are effectively unknown.
pub const ODOM_COVARIANCE: [f64; 36] = {
    let mut cov = [0.0; 36];
    cov[0] = 0.01;
    cov[7] = 0.01;
    cov[14] = 99999.0;
    cov[21] = 99999.0;
    cov[28] = 99999.0;
    cov[35] = 0.01;
    cov
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseWithCovariance {
    pub position: Vector3,
    pub orientation: Quaternion,
    pub covariance: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwistWithCovariance {
    pub linear: Vector3,
    pub angular: Vector3,
    pub covariance: Vec<f64>,
}

// Pose + velocity published every tick with a fresh encoder sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Odometry {
    pub frame_id: String,
    pub child_frame_id: String,
    pub pose: PoseWithCovariance,
    pub twist: TwistWithCovariance,
}

impl Odometry {
    pub fn new(pose: Pose2D, velocity: VelocityEstimate) -> Self {
        Self {
            frame_id: ODOM_FRAME.to_string(),
            child_frame_id: BASE_FRAME.to_string(),
            pose: PoseWithCovariance {
                position: Vector3 {
                    x: pose.x,
                    y: pose.y,
                    z: 0.0,
                },
                orientation: Quaternion::from_yaw(pose.theta),
                covariance: ODOM_COVARIANCE.to_vec(),
            },
            twist: TwistWithCovariance {
                linear: Vector3 {
                    x: velocity.linear,
                    ..Vector3::default()
                },
                angular: Vector3 {
                    z: velocity.angular,
                    ..Vector3::default()
                },
                covariance: ODOM_COVARIANCE.to_vec(),
            },
        }
    }
}

// odom -> base_link transform broadcast alongside the odometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub parent_frame_id: String,
    pub child_frame_id: String,
    pub translation: Vector3,
    pub rotation: Quaternion,
}

impl Transform {
    /// The rotation is built from -theta, unlike the odometry orientation.
    /// Downstream consumers depend on this convention.
    pub fn from_pose(pose: Pose2D) -> Self {
        Self {
            parent_frame_id: ODOM_FRAME.to_string(),
            child_frame_id: BASE_FRAME.to_string(),
            translation: Vector3 {
                x: pose.x,
                y: pose.y,
                z: 0.0,
            },
            rotation: Quaternion::from_yaw(-pose.theta),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

// Diagnostics published by runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticStatus {
    pub name: String,
    pub hardware_id: String,
    pub level: Severity,
    pub message: String,
    pub values: Vec<KeyValue>,
}

impl From<&DiagnosticsReport> for DiagnosticStatus {
    fn from(report: &DiagnosticsReport) -> Self {
        let fields = [
            ("Main Batt V:", report.battery_main_v),
            ("Logic Batt V:", report.battery_logic_v),
            ("Temp1 C:", report.temp1_c),
            ("Temp2 C:", report.temp2_c),
        ];

        // Telemetry that could not be read is left out entirely
        let values = fields
            .into_iter()
            .filter_map(|(key, value)| {
                value.map(|v| KeyValue {
                    key: key.to_string(),
                    value: v.to_string(),
                })
            })
            .collect();

        Self {
            name: "Vitals".to_string(),
            hardware_id: "Roboclaw".to_string(),
            level: report.severity,
            message: report.message.clone(),
            values,
        }
    }
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_twist_partial_json() {
        let cmd: TwistCommand = serde_json::from_str(r#"{"linear": 0.25}"#).unwrap();
        assert_eq!(cmd, TwistCommand::new(0.25, 0.0));
    }

    #[test]
    fn test_quaternion_from_yaw() {
        let q = Quaternion::from_yaw(PI / 2.0);
        assert!((q.z - (PI / 4.0).sin()).abs() < 1e-12);
        assert!((q.w - (PI / 4.0).cos()).abs() < 1e-12);
        let norm = (q.x * q.x + q.y * q.y + q.z * q.z + q.w * q.w).sqrt();
        assert!((norm - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_transform_uses_negated_yaw() {
        let pose = Pose2D::new(1.0, 2.0, 0.5);
        let odom = Odometry::new(pose, VelocityEstimate::default());
        let tf = Transform::from_pose(pose);

        assert_eq!(tf.translation, odom.pose.position);
        assert_eq!(tf.rotation.z, -odom.pose.orientation.z);
        assert_eq!(tf.rotation.w, odom.pose.orientation.w);
        assert_eq!(tf.parent_frame_id, "odom");
        assert_eq!(tf.child_frame_id, "base_link");
    }

    #[test]
    fn test_covariance_table() {
        let odom = Odometry::new(Pose2D::default(), VelocityEstimate::default());
        let cov = &odom.pose.covariance;
        assert_eq!(cov.len(), 36);
        assert_eq!((cov[0], cov[7], cov[35]), (0.01, 0.01, 0.01));
        assert_eq!((cov[14], cov[21], cov[28]), (99999.0, 99999.0, 99999.0));
        assert_eq!(cov.iter().filter(|&&c| c != 0.0).count(), 6);
        assert_eq!(odom.twist.covariance, odom.pose.covariance);
    }

    #[test]
    fn test_diagnostic_status_omits_missing_telemetry() {
        let report = DiagnosticsReport {
            severity: Severity::Ok,
            message: "Normal".to_string(),
            battery_main_v: Some(12.4),
            battery_logic_v: None,
            temp1_c: Some(31.5),
            temp2_c: None,
        };
        let status = DiagnosticStatus::from(&report);
        let keys: Vec<_> = status.values.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, ["Main Batt V:", "Temp1 C:"]);
        assert_eq!(status.values[0].value, "12.4");
        assert_eq!(status.name, "Vitals");
    }

    #[test]
    fn test_health_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&RuntimeHealth::CmdStale).unwrap(),
            "\"cmd_stale\""
        );
    }
}
