use std::f64::consts::PI;
use std::sync::Arc;
use std::time::{Duration, Instant};

use uom::si::angle::radian;
use uom::si::angular_velocity::radian_per_second;
use uom::si::f64::{Angle, AngularVelocity, Length, Velocity};
use uom::si::length::meter;
use uom::si::velocity::meter_per_second;

use crate::config::{ConfigError, DrivetrainConfig};
use crate::constants::config::DEADLINE_MISS_THRESHOLD_SECONDS;
use crate::hardware::{DiagnosticsSink, HeadingSensor, ModuleIo, TelemetrySink};
use crate::subsystems::swerve::control::PidController;
use crate::subsystems::swerve::kinematics::{
    ChassisMotion, Kinematics, ModulePosition, ModuleState,
};
use crate::subsystems::swerve::module::Module;
use crate::subsystems::swerve::odometry::{Pose, PoseEstimator};

/// Module slot order used by every array in this crate.
pub const MODULE_LABELS: [&str; 4] = ["front_left", "front_right", "back_left", "back_right"];

/// The drivetrain facade: owns the four module control units, the heading
/// sensor, the pose estimator, and the three chassis PID controllers, and
/// orchestrates them once per control cycle.
///
/// The public command methods never return errors; anything short of a bad
/// config at construction is absorbed and reported through the diagnostics
/// sink so the loop always produces some valid output.
pub struct Drivetrain {
    config: DrivetrainConfig,
    kinematics: Kinematics,
    pose_estimator: PoseEstimator,
    modules: [Module; 4],
    gyro: Box<dyn HeadingSensor>,

    x_controller: PidController,
    y_controller: PidController,
    rotation_controller: PidController,

    diagnostics: Arc<dyn DiagnosticsSink>,
    telemetry: Box<dyn TelemetrySink>,

    last_yaw: f64,
    last_angular_rate: f64,
    last_periodic: Option<Instant>,
}

impl Drivetrain {
    /// Builds the drivetrain against explicit hardware. Module IO arrives in
    /// FL, FR, BL, BR order and must stay that way; the kinematics offsets
    /// are generated in the same order from the config.
    pub fn new(
        config: DrivetrainConfig,
        mut gyro: Box<dyn HeadingSensor>,
        module_ios: [Box<dyn ModuleIo>; 4],
        diagnostics: Arc<dyn DiagnosticsSink>,
        telemetry: Box<dyn TelemetrySink>,
    ) -> Result<Drivetrain, ConfigError> {
        config.validate()?;

        let kinematics =
            Kinematics::new(config.module_offsets()).ok_or(ConfigError::DegenerateGeometry)?;

        let [fl, fr, bl, br] = module_ios;
        let mut modules = [
            Module::new(
                MODULE_LABELS[0],
                fl,
                config.steer_offsets_radians[0],
                config.max_speed_meters_per_second,
                config.state_deadband_meters_per_second,
                diagnostics.clone(),
            ),
            Module::new(
                MODULE_LABELS[1],
                fr,
                config.steer_offsets_radians[1],
                config.max_speed_meters_per_second,
                config.state_deadband_meters_per_second,
                diagnostics.clone(),
            ),
            Module::new(
                MODULE_LABELS[2],
                bl,
                config.steer_offsets_radians[2],
                config.max_speed_meters_per_second,
                config.state_deadband_meters_per_second,
                diagnostics.clone(),
            ),
            Module::new(
                MODULE_LABELS[3],
                br,
                config.steer_offsets_radians[3],
                config.max_speed_meters_per_second,
                config.state_deadband_meters_per_second,
                diagnostics.clone(),
            ),
        ];

        // Give the motor controllers time to finish configuring before the
        // steer encoders are seeded; seeding during init races the inversion
        // setting and zeroes wheels against the wrong sign.
        if config.settle_delay_seconds > 0.0 {
            std::thread::sleep(Duration::from_secs_f64(config.settle_delay_seconds));
        }
        for module in modules.iter_mut() {
            module.reset_to_absolute();
        }

        if let Err(fault) = gyro.set_yaw(config.starting_heading_radians) {
            diagnostics.report(&fault.to_string(), "gyro set_yaw at startup");
        }
        let yaw = match gyro.yaw() {
            Ok(yaw) => yaw,
            Err(fault) => {
                diagnostics.report(&fault.to_string(), "gyro read at startup");
                config.starting_heading_radians
            }
        };

        let mut positions = [ModulePosition::zero(); 4];
        for (position, module) in positions.iter_mut().zip(modules.iter_mut()) {
            *position = module.position();
        }

        let pose_estimator = PoseEstimator::new(
            kinematics.clone(),
            Angle::new::<radian>(yaw),
            positions,
            Pose::zero(),
        );

        let x_controller = PidController::new(
            config.translation_kp,
            0.0,
            config.translation_kd,
            config.loop_time_seconds,
        );
        let y_controller = PidController::new(
            config.translation_kp,
            0.0,
            config.translation_kd,
            config.loop_time_seconds,
        );
        let mut rotation_controller = PidController::new(
            config.heading_kp,
            0.0,
            config.heading_kd,
            config.loop_time_seconds,
        );
        rotation_controller.enable_continuous_input(-PI, PI);
        rotation_controller.set_tolerance(
            config.heading_tolerance_radians,
            config.heading_velocity_tolerance_radians_per_second,
        );

        let mut drivetrain = Drivetrain {
            config,
            kinematics,
            pose_estimator,
            modules,
            gyro,
            x_controller,
            y_controller,
            rotation_controller,
            diagnostics,
            telemetry,
            last_yaw: yaw,
            last_angular_rate: 0.0,
            last_periodic: None,
        };
        drivetrain.post_pose();
        Ok(drivetrain)
    }

    /// The unconditional periodic step, called exactly once per control cycle
    /// by the external scheduler: deadline accounting, sim model advance,
    /// odometry refresh, telemetry pose snapshot.
    pub fn periodic(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_periodic {
            let gap = (now - last).as_secs_f64();
            if gap > DEADLINE_MISS_THRESHOLD_SECONDS {
                // Recorded, never thrown. The delta-based odometry below
                // already treats the skipped interval as one larger delta.
                self.diagnostics.report(
                    &format!("control cycle overran: {:.1} ms since last periodic", gap * 1e3),
                    "drivetrain periodic",
                );
            }
        }
        self.last_periodic = Some(now);

        if self.config.simulation {
            for module in self.modules.iter_mut() {
                module.update_sim(self.config.loop_time_seconds);
            }
        }

        self.update_odometry();
        self.post_pose();
    }

    /// Open- or closed-loop velocity drive, robot- or field-relative.
    pub fn drive(
        &mut self,
        vx: Velocity,
        vy: Velocity,
        omega: AngularVelocity,
        field_relative: bool,
        open_loop: bool,
    ) {
        let motion = if field_relative {
            ChassisMotion::from_field_relative(vx, vy, omega, self.yaw())
        } else {
            ChassisMotion::new(vx, vy, omega)
        };
        self.set_chassis_motion(&motion, open_loop);
    }

    /// Velocity pass-through on x/y with the rotation axis PID-closed on a
    /// heading target.
    pub fn drive_to_heading(
        &mut self,
        vx: Velocity,
        vy: Velocity,
        target_heading: Angle,
        field_relative: bool,
    ) {
        let yaw = self.yaw().get::<radian>();
        let rotation = self
            .rotation_controller
            .calculate(yaw, target_heading.get::<radian>());

        self.drive(
            vx,
            vy,
            AngularVelocity::new::<radian_per_second>(rotation),
            field_relative,
            false,
        );
    }

    /// All three axes PID-closed on a field pose target.
    pub fn drive_to_pose(&mut self, x: Length, y: Length, heading: Angle) {
        let pose = self.pose();

        let vx = self
            .x_controller
            .calculate(pose.x.get::<meter>(), x.get::<meter>());
        let vy = self
            .y_controller
            .calculate(pose.y.get::<meter>(), y.get::<meter>());
        let rotation = self
            .rotation_controller
            .calculate(pose.heading.get::<radian>(), heading.get::<radian>());

        self.drive(
            Velocity::new::<meter_per_second>(vx),
            Velocity::new::<meter_per_second>(vy),
            AngularVelocity::new::<radian_per_second>(rotation),
            true,
            false,
        );
    }

    /// Stops all four modules.
    pub fn stop(&mut self) {
        for module in self.modules.iter_mut() {
            module.stop();
        }
    }

    /// Converts a chassis motion into per-module states, desaturates the
    /// whole set atomically, and dispatches it. Last write wins: each call
    /// fully determines the next cycle's module commands.
    pub fn set_chassis_motion(&mut self, motion: &ChassisMotion, open_loop: bool) {
        if self.config.simulation {
            // the sim gyro only turns if someone tells it the chassis turned
            self.gyro.add_sim_heading(
                motion.omega.get::<radian_per_second>() * self.config.loop_time_seconds,
            );
        }

        let mut states = self.kinematics.to_module_states(motion);
        Kinematics::desaturate(
            &mut states,
            Velocity::new::<meter_per_second>(self.config.max_speed_meters_per_second),
        );

        for (module, state) in self.modules.iter_mut().zip(states) {
            module.set_desired_state(state, open_loop);
        }
    }

    /// Refreshes the pose estimate from the gyro and module positions.
    /// NOTE: must use yaw directly from the sensor, not the accumulated pose.
    fn update_odometry(&mut self) {
        let yaw = self.read_yaw();
        let positions = self.module_positions();
        self.pose_estimator
            .update(Angle::new::<radian>(yaw), &positions);
    }

    pub fn pose(&self) -> Pose {
        self.pose_estimator.pose()
    }

    /// Re-seeds the pose estimate, e.g. at match start or with a one-shot
    /// corrected pose from outside.
    pub fn reset_pose(&mut self, pose: Pose) {
        let yaw = self.read_yaw();
        let positions = self.module_positions();
        self.pose_estimator
            .reset(Angle::new::<radian>(yaw), &positions, pose);
    }

    /// The robot's heading as estimated by odometry.
    pub fn yaw(&self) -> Angle {
        self.pose_estimator.pose().heading
    }

    /// Re-zeroes the heading while keeping the translation estimate.
    pub fn set_yaw(&mut self, rotation: Angle) {
        let pose = self.pose();
        self.reset_pose(Pose::new(pose.x, pose.y, rotation));
    }

    /// Robot-relative chassis motion realized by the modules, from feedback.
    pub fn chassis_motion(&mut self) -> ChassisMotion {
        let states = self.module_states();
        self.kinematics.to_chassis_motion(&states)
    }

    pub fn field_relative_chassis_motion(&mut self) -> ChassisMotion {
        let motion = self.chassis_motion();
        ChassisMotion::from_field_relative(motion.vx, motion.vy, motion.omega, self.yaw())
    }

    pub fn chassis_speed_magnitude(&mut self) -> Velocity {
        let motion = self.field_relative_chassis_motion();
        Velocity::new::<meter_per_second>(
            motion
                .vx
                .get::<meter_per_second>()
                .hypot(motion.vy.get::<meter_per_second>()),
        )
    }

    /// Direction of travel in the field frame.
    // Note the argument order: heading is measured from the y axis with this
    // gyro mount. Keep it this way unless the mount changes.
    pub fn field_relative_heading(&mut self) -> Angle {
        let motion = self.field_relative_chassis_motion();
        Angle::new::<radian>(
            motion
                .vx
                .get::<meter_per_second>()
                .atan2(motion.vy.get::<meter_per_second>()),
        )
    }

    /// Raw angular rate from the heading sensor, rad/s.
    pub fn angular_rate(&mut self) -> AngularVelocity {
        match self.gyro.angular_rate() {
            Ok(rate) => self.last_angular_rate = rate,
            Err(fault) => self
                .diagnostics
                .report(&fault.to_string(), "gyro rate read"),
        }
        AngularVelocity::new::<radian_per_second>(self.last_angular_rate)
    }

    /// Enables or disables the state deadband on every module. Keep it
    /// enabled for regular driving so releasing the sticks does not snap the
    /// wheel angles.
    pub fn set_state_deadband_enabled(&mut self, enabled: bool) {
        for module in self.modules.iter_mut() {
            module.set_state_deadband_enabled(enabled);
        }
    }

    pub fn reset_modules_to_absolute(&mut self) {
        for module in self.modules.iter_mut() {
            module.reset_to_absolute();
        }
    }

    pub fn module_positions(&mut self) -> [ModulePosition; 4] {
        let mut positions = [ModulePosition::zero(); 4];
        for (position, module) in positions.iter_mut().zip(self.modules.iter_mut()) {
            *position = module.position();
        }
        positions
    }

    pub fn module_states(&mut self) -> [ModuleState; 4] {
        let mut states = [ModuleState::zero(); 4];
        for (state, module) in states.iter_mut().zip(self.modules.iter_mut()) {
            *state = module.state();
        }
        states
    }

    pub fn modules(&self) -> &[Module; 4] {
        &self.modules
    }

    pub fn x_controller(&mut self) -> &mut PidController {
        &mut self.x_controller
    }

    pub fn y_controller(&mut self) -> &mut PidController {
        &mut self.y_controller
    }

    pub fn rotation_controller(&mut self) -> &mut PidController {
        &mut self.rotation_controller
    }

    /// Clears all three chassis controllers. Call when a new multi-axis
    /// setpoint sequence begins so windup from the previous goal cannot leak
    /// into the first cycles of the next one.
    pub fn reset_controllers(&mut self) {
        self.x_controller.reset();
        self.y_controller.reset();
        self.rotation_controller.reset();
    }

    fn read_yaw(&mut self) -> f64 {
        match self.gyro.yaw() {
            Ok(yaw) => self.last_yaw = yaw,
            Err(fault) => self.diagnostics.report(&fault.to_string(), "gyro read"),
        }
        self.last_yaw
    }

    fn post_pose(&mut self) {
        let pose = self.pose_estimator.pose();
        self.telemetry.post_pose(
            pose.x.get::<meter>(),
            pose.y.get::<meter>(),
            pose.heading.get::<radian>(),
        );
    }
}
