use nalgebra::{Vector2, vector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{config, drivetrain, gains};

/// Everything the drivetrain needs to know about the robot it is running on.
/// This is an explicit value threaded through the constructor; nothing in the
/// crate discovers robot identity through global state.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DrivetrainConfig {
    pub wheelbase_length_meters: f64,
    pub wheelbase_width_meters: f64,
    pub max_speed_meters_per_second: f64,

    /// Speeds below this hold the last steer angle (see Module::set_desired_state).
    pub state_deadband_meters_per_second: f64,

    /// Delay between powering the steer motors and seeding them from the
    /// absolute encoders. Zero is fine for simulation and tests.
    pub settle_delay_seconds: f64,

    /// Absolute-encoder readings with the wheels physically zeroed,
    /// radians, in FL, FR, BL, BR order.
    pub steer_offsets_radians: [f64; 4],

    pub starting_heading_radians: f64,

    /// Selects the simulation heading behavior: commanded omega is integrated
    /// into the sim gyro each cycle, the way the real gyro would turn.
    pub simulation: bool,

    pub loop_time_seconds: f64,

    pub translation_kp: f64,
    pub translation_kd: f64,
    pub heading_kp: f64,
    pub heading_kd: f64,
    pub heading_tolerance_radians: f64,
    pub heading_velocity_tolerance_radians_per_second: f64,
}

impl Default for DrivetrainConfig {
    fn default() -> Self {
        DrivetrainConfig {
            wheelbase_length_meters: drivetrain::WHEELBASE_LENGTH_METERS,
            wheelbase_width_meters: drivetrain::WHEELBASE_WIDTH_METERS,
            max_speed_meters_per_second: drivetrain::MAX_SPEED_METERS_PER_SECOND,
            state_deadband_meters_per_second: drivetrain::STATE_DEADBAND_METERS_PER_SECOND,
            settle_delay_seconds: drivetrain::MODULE_SETTLE_DELAY_SECONDS,
            steer_offsets_radians: drivetrain::STEER_OFFSETS_RADIANS,
            starting_heading_radians: drivetrain::STARTING_HEADING_RADIANS,
            simulation: false,
            loop_time_seconds: config::LOOP_TIME_SECONDS,
            translation_kp: gains::TRANSLATION_KP,
            translation_kd: gains::TRANSLATION_KD,
            heading_kp: gains::HEADING_KP,
            heading_kd: gains::HEADING_KD,
            heading_tolerance_radians: gains::HEADING_TOLERANCE_RADIANS,
            heading_velocity_tolerance_radians_per_second:
                gains::HEADING_VELOCITY_TOLERANCE_RADIANS_PER_SECOND,
        }
    }
}

/// Invalid geometry or gains. Fatal: the drivetrain never reaches an operative
/// state with a config that fails validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("wheelbase dimensions must be positive, got {length} x {width} meters")]
    InvalidGeometry { length: f64, width: f64 },
    #[error("max speed must be positive and finite, got {0} m/s")]
    InvalidMaxSpeed(f64),
    #[error("state deadband must be non-negative and finite, got {0} m/s")]
    InvalidDeadband(f64),
    #[error("loop time must be positive, got {0} s")]
    InvalidLoopTime(f64),
    #[error("settle delay must be non-negative, got {0} s")]
    InvalidSettleDelay(f64),
    #[error("{name} gain must be finite and non-negative, got {value}")]
    InvalidGain { name: &'static str, value: f64 },
    #[error("module offsets are degenerate, forward kinematics is not solvable")]
    DegenerateGeometry,
    #[error("failed to parse drivetrain config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl DrivetrainConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: DrivetrainConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.wheelbase_length_meters > 0.0) || !(self.wheelbase_width_meters > 0.0) {
            return Err(ConfigError::InvalidGeometry {
                length: self.wheelbase_length_meters,
                width: self.wheelbase_width_meters,
            });
        }
        if !(self.max_speed_meters_per_second > 0.0)
            || !self.max_speed_meters_per_second.is_finite()
        {
            return Err(ConfigError::InvalidMaxSpeed(self.max_speed_meters_per_second));
        }
        if !(self.state_deadband_meters_per_second >= 0.0)
            || !self.state_deadband_meters_per_second.is_finite()
        {
            return Err(ConfigError::InvalidDeadband(
                self.state_deadband_meters_per_second,
            ));
        }
        if !(self.loop_time_seconds > 0.0) {
            return Err(ConfigError::InvalidLoopTime(self.loop_time_seconds));
        }
        if !(self.settle_delay_seconds >= 0.0) {
            return Err(ConfigError::InvalidSettleDelay(self.settle_delay_seconds));
        }
        for (name, value) in [
            ("translation_kp", self.translation_kp),
            ("translation_kd", self.translation_kd),
            ("heading_kp", self.heading_kp),
            ("heading_kd", self.heading_kd),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidGain { name, value });
            }
        }
        Ok(())
    }

    /// Module mounting offsets from the center of rotation, meters,
    /// x forward and y left, in FL, FR, BL, BR order.
    pub fn module_offsets(&self) -> [Vector2<f64>; 4] {
        let half_length = self.wheelbase_length_meters / 2.0;
        let half_width = self.wheelbase_width_meters / 2.0;

        [
            vector![half_length, half_width],   // FL
            vector![half_length, -half_width],  // FR
            vector![-half_length, half_width],  // BL
            vector![-half_length, -half_width], // BR
        ]
    }
}
