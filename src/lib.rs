pub mod config;
pub mod constants;
pub mod hardware;
pub mod subsystems;

pub use config::{ConfigError, DrivetrainConfig};
pub use subsystems::swerve::drivetrain::Drivetrain;
pub use subsystems::swerve::kinematics::{ChassisMotion, ModulePosition, ModuleState};
pub use subsystems::swerve::odometry::Pose;
