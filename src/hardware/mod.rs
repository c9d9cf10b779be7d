//! Hardware boundary: narrow traits for everything the drivetrain touches.
//! Each component owns its handle exclusively; nothing above this module ever
//! sees a raw motor controller or gyro.

use thiserror::Error;

pub mod sim;

/// A failed sensor/actuator transaction. These are absorbed by the caller
/// (hold last value, report to diagnostics) so one faulty module can never
/// stall a control cycle.
#[derive(Debug, Error)]
pub enum IoFault {
    #[error("sensor read unavailable: {0}")]
    SensorUnavailable(&'static str),
    #[error("actuator command rejected: {0}")]
    CommandRejected(&'static str),
}

/// One swerve module's drive motor, steer motor, and absolute steer encoder.
/// All quantities are raw SI: meters, meters per second, radians.
pub trait ModuleIo {
    /// Open-loop drive command, -1.0 to 1.0 duty.
    fn set_drive_duty(&mut self, duty: f64) -> Result<(), IoFault>;
    /// Closed-loop drive velocity command, m/s.
    fn set_drive_velocity(&mut self, velocity: f64) -> Result<(), IoFault>;
    /// Closed-loop steer position command, radians on the relative encoder.
    fn set_steer_angle(&mut self, angle: f64) -> Result<(), IoFault>;

    /// Cumulative drive distance, meters. Never reset while running.
    fn drive_distance(&mut self) -> Result<f64, IoFault>;
    /// Current drive velocity, m/s.
    fn drive_velocity(&mut self) -> Result<f64, IoFault>;
    /// Relative steer encoder angle, radians.
    fn steer_angle(&mut self) -> Result<f64, IoFault>;
    /// Absolute steer encoder angle, radians, valid across power cycles.
    fn absolute_angle(&mut self) -> Result<f64, IoFault>;

    /// Seed the relative steer encoder to the given angle.
    fn seed_steer_angle(&mut self, angle: f64) -> Result<(), IoFault>;

    /// Zero output on both motors. Leaves encoders alone.
    fn stop(&mut self) -> Result<(), IoFault>;

    /// Advance any internal simulation model by dt seconds. No-op on real
    /// hardware.
    fn update(&mut self, _dt: f64) {}
}

/// The heading sensor. Yaw is continuous (unbounded), CCW positive.
pub trait HeadingSensor {
    /// Current yaw, radians. May exceed +-pi after multiple turns.
    fn yaw(&mut self) -> Result<f64, IoFault>;
    /// Raw angular rate about the yaw axis, rad/s.
    fn angular_rate(&mut self) -> Result<f64, IoFault>;
    /// Re-zero the yaw to the given value.
    fn set_yaw(&mut self, yaw: f64) -> Result<(), IoFault>;
    /// Advance the simulated heading by delta radians. No-op on real hardware,
    /// where the gyro turns because the robot does.
    fn add_sim_heading(&mut self, _delta: f64) {}
}

/// Where faults go. Must never block and never panic; a report is
/// fire-and-forget.
pub trait DiagnosticsSink {
    fn report(&self, message: &str, context: &str);
}

/// Receives one pose snapshot per cycle for display. Fire-and-forget.
pub trait TelemetrySink {
    fn post_pose(&self, x_meters: f64, y_meters: f64, heading_radians: f64);
}

/// Diagnostics sink backed by the tracing subscriber.
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn report(&self, message: &str, context: &str) {
        tracing::warn!(target: "swerve::diagnostics", context, "{message}");
    }
}

/// Telemetry sink backed by the tracing subscriber.
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn post_pose(&self, x_meters: f64, y_meters: f64, heading_radians: f64) {
        tracing::debug!(
            target: "swerve::telemetry",
            x_meters,
            y_meters,
            heading_radians,
            "pose"
        );
    }
}
