// Dead-reckoning odometry for the differential drive base
// Integrates cumulative encoder ticks into a planar pose and a velocity estimate.

use std::f64::consts::PI;
use std::fmt;
use std::time::Instant;

use crate::config::ConfigError;

/// Below this interval (seconds) velocities are reported as zero
const MIN_DT: f64 = 1e-6;

/// Wrap an angle into (-PI, PI]
pub fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a <= -PI {
        a += 2.0 * PI;
    }
    a
}

/// Planar pose in the odom frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose2D {
    pub x: f64,     // meters
    pub y: f64,     // meters
    pub theta: f64, // radians, (-PI, PI]
}

impl Pose2D {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }
}

impl fmt::Display for Pose2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(x: {:.3}, y: {:.3}, θ: {:.3} rad)", self.x, self.y, self.theta)
    }
}

/// Instantaneous body velocity derived from one encoder interval
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VelocityEstimate {
    pub linear: f64,  // m/s
    pub angular: f64, // rad/s
}

/// One pair of cumulative encoder counts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderSample {
    pub left_ticks: i64,
    pub right_ticks: i64,
    pub timestamp: Instant,
}

/// Encoder odometry integrator
///
/// Owns the pose and the previous sample; each call to [`update`](Self::update)
/// consumes exactly one new sample.
#[derive(Debug, Clone)]
pub struct OdometryIntegrator {
    ticks_per_meter: f64,
    base_width: f64,
    pose: Pose2D,
    last: EncoderSample,
}

impl OdometryIntegrator {
    /// Create an integrator at the origin, with `now` as the first sample time
    /// and zero as the baseline tick count.
    pub fn new(ticks_per_meter: f64, base_width: f64, now: Instant) -> Result<Self, ConfigError> {
        let ticks_per_meter = crate::config::positive("ticks_per_meter", ticks_per_meter)?;
        let base_width = crate::config::positive("base_width", base_width)?;

        Ok(Self {
            ticks_per_meter,
            base_width,
            pose: Pose2D::default(),
            last: EncoderSample {
                left_ticks: 0,
                right_ticks: 0,
                timestamp: now,
            },
        })
    }

    pub fn pose(&self) -> Pose2D {
        self.pose
    }

    pub fn last_sample(&self) -> EncoderSample {
        self.last
    }

    /// Re-baseline the tick counters without moving the pose
    pub fn reset(&mut self, left_ticks: i64, right_ticks: i64, now: Instant) {
        self.last = EncoderSample {
            left_ticks,
            right_ticks,
            timestamp: now,
        };
    }

    /// Integrate a new sample into the pose and return the velocity over the interval
    ///
    /// `now` must not be earlier than the previous sample.
    pub fn update(&mut self, left_ticks: i64, right_ticks: i64, now: Instant) -> VelocityEstimate {
        let left_delta = left_ticks - self.last.left_ticks;
        let right_delta = right_ticks - self.last.right_ticks;

        let dist_left = left_delta as f64 / self.ticks_per_meter;
        let dist_right = right_delta as f64 / self.ticks_per_meter;
        let dist = (dist_left + dist_right) / 2.0;

        let dt = now.saturating_duration_since(self.last.timestamp).as_secs_f64();
        self.last = EncoderSample {
            left_ticks,
            right_ticks,
            timestamp: now,
        };

        // Exact tick equality selects the straight-line model; any difference takes the arc
        let d_theta = if left_delta == right_delta {
            self.pose.x += dist * self.pose.theta.cos();
            self.pose.y += dist * self.pose.theta.sin();
            0.0
        } else {
            let d_theta = (dist_right - dist_left) / self.base_width;
            let r = dist / d_theta;
            let theta = self.pose.theta;
            self.pose.x += r * ((theta + d_theta).sin() - theta.sin());
            self.pose.y -= r * ((theta + d_theta).cos() - theta.cos());
            self.pose.theta = normalize_angle(theta + d_theta);
            d_theta
        };

        if dt.abs() < MIN_DT {
            VelocityEstimate::default()
        } else {
            VelocityEstimate {
                linear: dist / dt,
                angular: d_theta / dt,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const EPS: f64 = 1e-6;

    fn integrator(start: Instant) -> OdometryIntegrator {
        OdometryIntegrator::new(10.0, 0.315, start).unwrap()
    }

    #[test]
    fn test_normalize_angle_range() {
        assert_eq!(normalize_angle(0.0), 0.0);
        assert!((normalize_angle(PI) - PI).abs() < EPS);
        assert!((normalize_angle(-PI) - PI).abs() < EPS);
        assert!((normalize_angle(3.0 * PI / 2.0) + PI / 2.0).abs() < EPS);
        assert!((normalize_angle(-5.0 * PI / 2.0) + PI / 2.0).abs() < EPS);
        assert!((normalize_angle(2.0 * PI + 0.25) - 0.25).abs() < EPS);
    }

    #[test]
    fn test_straight_line_scenario() {
        let t0 = Instant::now();
        let mut odom = integrator(t0);

        let vel = odom.update(10, 10, t0 + Duration::from_secs(1));

        let pose = odom.pose();
        assert!((pose.x - 1.0).abs() < EPS);
        assert!(pose.y.abs() < EPS);
        assert_eq!(pose.theta, 0.0);
        assert!((vel.linear - 1.0).abs() < EPS);
        assert_eq!(vel.angular, 0.0);
    }

    #[test]
    fn test_right_wheel_only_arc() {
        let t0 = Instant::now();
        let mut odom = integrator(t0);

        let vel = odom.update(0, 10, t0 + Duration::from_secs(1));

        let dist = 0.5;
        let d_theta: f64 = 1.0 / 0.315;
        let r = dist / d_theta;
        let pose = odom.pose();
        assert!((pose.x - r * d_theta.sin()).abs() < EPS);
        assert!((pose.y - (-r * (d_theta.cos() - 1.0))).abs() < EPS);
        assert!((pose.theta - normalize_angle(d_theta)).abs() < EPS);
        assert!((vel.linear - dist).abs() < EPS);
        assert!((vel.angular - d_theta).abs() < EPS);
    }

    #[test]
    fn test_half_metre_right_wheel_turn() {
        // Right wheel moves 5 ticks (0.5 m over ticks_per_meter = 10), left stays
        let t0 = Instant::now();
        let mut odom = integrator(t0);

        odom.update(0, 5, t0 + Duration::from_secs(1));

        let d_theta: f64 = 0.5 / 0.315;
        let r = 0.25 / d_theta;
        let pose = odom.pose();
        assert!((d_theta - 1.587).abs() < 1e-3);
        assert!((pose.x - r * d_theta.sin()).abs() < EPS);
        assert!((pose.y - r * (1.0 - d_theta.cos())).abs() < EPS);
        assert!((pose.theta - d_theta).abs() < EPS);
    }

    #[test]
    fn test_equal_deltas_keep_heading() {
        let t0 = Instant::now();
        let mut odom = integrator(t0);
        odom.update(3, 7, t0 + Duration::from_millis(100));
        let heading = odom.pose().theta;

        for (i, delta) in [-40i64, 0, 1, 25, 1000].into_iter().enumerate() {
            let last = odom.last_sample();
            odom.update(
                last.left_ticks + delta,
                last.right_ticks + delta,
                t0 + Duration::from_millis(200 + i as u64 * 100),
            );
            assert_eq!(odom.pose().theta, heading);
        }
    }

    #[test]
    fn test_heading_always_normalized() {
        let t0 = Instant::now();
        let mut odom = integrator(t0);
        let mut left = 0i64;
        let mut right = 0i64;

        for i in 1..200u64 {
            left += (i as i64 * 7) % 23 - 11;
            right += (i as i64 * 13) % 31 - 9;
            odom.update(left, right, t0 + Duration::from_millis(i * 100));
            let theta = odom.pose().theta;
            assert!(theta > -PI && theta <= PI, "theta {} out of range", theta);
        }
    }

    #[test]
    fn test_repeated_sample_zero_dt() {
        let t0 = Instant::now();
        let mut odom = integrator(t0);
        let t1 = t0 + Duration::from_secs(1);
        odom.update(12, 20, t1);
        let pose = odom.pose();

        let vel = odom.update(12, 20, t1);
        assert_eq!(vel, VelocityEstimate::default());
        assert_eq!(odom.pose(), pose);
    }

    #[test]
    fn test_zero_dt_still_integrates_pose() {
        let t0 = Instant::now();
        let mut odom = integrator(t0);

        let vel = odom.update(10, 10, t0);
        assert_eq!(vel, VelocityEstimate::default());
        assert!((odom.pose().x - 1.0).abs() < EPS);
    }

    #[test]
    fn test_reset_rebaselines_without_moving() {
        let t0 = Instant::now();
        let mut odom = integrator(t0);
        odom.reset(50_000, 49_000, t0);

        let vel = odom.update(50_010, 49_010, t0 + Duration::from_secs(1));
        assert!((odom.pose().x - 1.0).abs() < EPS);
        assert!((vel.linear - 1.0).abs() < EPS);
    }

    #[test]
    fn test_invalid_geometry_rejected() {
        let now = Instant::now();
        assert!(OdometryIntegrator::new(0.0, 0.315, now).is_err());
        assert!(OdometryIntegrator::new(10.0, -1.0, now).is_err());
    }
}
