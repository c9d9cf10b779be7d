use std::sync::Arc;

use uom::si::angle::radian;
use uom::si::f64::{Angle, Length, Velocity};
use uom::si::length::meter;
use uom::si::velocity::meter_per_second;

use crate::hardware::{DiagnosticsSink, IoFault, ModuleIo};
use crate::subsystems::swerve::kinematics::{ModulePosition, ModuleState};

/// One wheel's control unit: owns the drive and steer actuators plus the
/// absolute steer sensor behind a [`ModuleIo`], and converts desired
/// (speed, angle) states into actuator commands.
///
/// Every hardware fault is absorbed here: reads fall back to the last-known
/// value and commands are dropped, with the fault reported to the diagnostics
/// sink either way. A single flaky module stalls itself, never the loop.
pub struct Module {
    label: &'static str,
    io: Box<dyn ModuleIo>,
    diagnostics: Arc<dyn DiagnosticsSink>,

    /// Calibrated absolute-encoder reading with the wheel at zero, radians.
    angle_offset: f64,
    max_speed: f64,
    state_deadband: f64,
    state_deadband_enabled: bool,

    desired_state: ModuleState,
    last_state: ModuleState,
    last_position: ModulePosition,
}

impl Module {
    pub fn new(
        label: &'static str,
        io: Box<dyn ModuleIo>,
        angle_offset: f64,
        max_speed: f64,
        state_deadband: f64,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Module {
        Module {
            label,
            io,
            diagnostics,
            angle_offset,
            max_speed,
            state_deadband,
            state_deadband_enabled: true,
            desired_state: ModuleState::zero(),
            last_state: ModuleState::zero(),
            last_position: ModulePosition::zero(),
        }
    }

    /// Commands the module toward `state`. With the deadband enabled, a
    /// near-zero speed holds the last target angle instead of snapping the
    /// wheel to the angle of a vanishing velocity vector; any speed at or
    /// above the deadband takes the normal path for that call.
    pub fn set_desired_state(&mut self, state: ModuleState, open_loop: bool) {
        if self.state_deadband_enabled
            && state.speed.get::<meter_per_second>().abs() < self.state_deadband
        {
            self.desired_state = ModuleState::new(
                Velocity::new::<meter_per_second>(0.0),
                self.desired_state.angle,
            );
            let stopped = self.io.stop();
            self.report_if_failed(stopped, "stop");
            return;
        }

        let current_angle = self.steer_angle();
        let optimized = state.optimize(current_angle);
        self.desired_state = optimized;

        let speed = optimized.speed.get::<meter_per_second>();
        let drive_result = if open_loop {
            self.io.set_drive_duty(speed / self.max_speed)
        } else {
            self.io.set_drive_velocity(speed)
        };
        self.report_if_failed(drive_result, "drive command");

        let steer_result = self.io.set_steer_angle(optimized.angle.get::<radian>());
        self.report_if_failed(steer_result, "steer command");
    }

    /// Current measured (speed, angle). Faults hold the previous reading.
    pub fn state(&mut self) -> ModuleState {
        let velocity = self.io.drive_velocity();
        let angle = self.io.steer_angle();

        match (velocity, angle) {
            (Ok(velocity), Ok(angle)) => {
                self.last_state = ModuleState::new(
                    Velocity::new::<meter_per_second>(velocity),
                    Angle::new::<radian>(angle),
                );
            }
            (velocity, angle) => {
                self.report_if_failed(velocity.map(|_| ()), "velocity read");
                self.report_if_failed(angle.map(|_| ()), "steer angle read");
            }
        }

        self.last_state
    }

    /// Current measured (distance, angle). Distance is cumulative and never
    /// reset mid-operation; odometry differences it against its own baseline.
    pub fn position(&mut self) -> ModulePosition {
        let distance = self.io.drive_distance();
        let angle = self.io.steer_angle();

        match (distance, angle) {
            (Ok(distance), Ok(angle)) => {
                self.last_position = ModulePosition::new(
                    Length::new::<meter>(distance),
                    Angle::new::<radian>(angle),
                );
            }
            (distance, angle) => {
                self.report_if_failed(distance.map(|_| ()), "distance read");
                self.report_if_failed(angle.map(|_| ()), "steer angle read");
            }
        }

        self.last_position
    }

    /// Seeds the relative steer encoder from the absolute sensor minus the
    /// calibrated offset. Only call once the motor controllers have settled;
    /// seeding during init races the inversion configuration.
    pub fn reset_to_absolute(&mut self) {
        match self.io.absolute_angle() {
            Ok(absolute) => {
                let seed = self.io.seed_steer_angle(absolute - self.angle_offset);
                self.report_if_failed(seed, "steer seed");
            }
            Err(fault) => self.report(&fault, "absolute angle read"),
        }
    }

    /// Zero output on both actuators. Calibration is untouched.
    pub fn stop(&mut self) {
        let stopped = self.io.stop();
        self.report_if_failed(stopped, "stop");
    }

    pub fn set_state_deadband_enabled(&mut self, enabled: bool) {
        self.state_deadband_enabled = enabled;
    }

    /// The last commanded target, post-optimization.
    pub fn desired_state(&self) -> ModuleState {
        self.desired_state
    }

    /// Advances the simulation model, if any, by dt seconds.
    pub fn update_sim(&mut self, dt: f64) {
        self.io.update(dt);
    }

    fn steer_angle(&mut self) -> Angle {
        match self.io.steer_angle() {
            Ok(angle) => {
                self.last_state.angle = Angle::new::<radian>(angle);
                self.last_state.angle
            }
            Err(fault) => {
                self.report(&fault, "steer angle read");
                self.last_state.angle
            }
        }
    }

    fn report_if_failed(&self, result: Result<(), IoFault>, what: &str) {
        if let Err(fault) = result {
            self.report(&fault, what);
        }
    }

    fn report(&self, fault: &IoFault, what: &str) {
        self.diagnostics
            .report(&fault.to_string(), &format!("{} {}", self.label, what));
    }
}

#[cfg(test)]
mod module_tests {
    use super::*;
    use crate::hardware::sim::SimModuleIo;
    use float_cmp::assert_approx_eq;
    use std::f64::consts::{FRAC_PI_4, PI};
    use std::sync::Mutex;

    struct RecordingSink {
        reports: Mutex<Vec<(String, String)>>,
    }

    impl RecordingSink {
        fn new() -> Arc<RecordingSink> {
            Arc::new(RecordingSink {
                reports: Mutex::new(Vec::new()),
            })
        }

        fn count(&self) -> usize {
            self.reports.lock().unwrap().len()
        }
    }

    impl DiagnosticsSink for RecordingSink {
        fn report(&self, message: &str, context: &str) {
            self.reports
                .lock()
                .unwrap()
                .push((message.to_owned(), context.to_owned()));
        }
    }

    /// Hardware that rejects everything, for fault-path tests.
    struct DeadIo;

    impl ModuleIo for DeadIo {
        fn set_drive_duty(&mut self, _: f64) -> Result<(), IoFault> {
            Err(IoFault::CommandRejected("dead"))
        }
        fn set_drive_velocity(&mut self, _: f64) -> Result<(), IoFault> {
            Err(IoFault::CommandRejected("dead"))
        }
        fn set_steer_angle(&mut self, _: f64) -> Result<(), IoFault> {
            Err(IoFault::CommandRejected("dead"))
        }
        fn drive_distance(&mut self) -> Result<f64, IoFault> {
            Err(IoFault::SensorUnavailable("dead"))
        }
        fn drive_velocity(&mut self) -> Result<f64, IoFault> {
            Err(IoFault::SensorUnavailable("dead"))
        }
        fn steer_angle(&mut self) -> Result<f64, IoFault> {
            Err(IoFault::SensorUnavailable("dead"))
        }
        fn absolute_angle(&mut self) -> Result<f64, IoFault> {
            Err(IoFault::SensorUnavailable("dead"))
        }
        fn seed_steer_angle(&mut self, _: f64) -> Result<(), IoFault> {
            Err(IoFault::CommandRejected("dead"))
        }
        fn stop(&mut self) -> Result<(), IoFault> {
            Err(IoFault::CommandRejected("dead"))
        }
    }

    fn sim_module(sink: Arc<dyn DiagnosticsSink>) -> Module {
        Module::new(
            "test",
            Box::new(SimModuleIo::new(4.5, 0.0)),
            0.0,
            4.5,
            0.001,
            sink,
        )
    }

    fn state(speed: f64, angle: f64) -> ModuleState {
        ModuleState::new(
            Velocity::new::<meter_per_second>(speed),
            Angle::new::<radian>(angle),
        )
    }

    #[test]
    fn deadband_holds_the_previous_angle() {
        let sink = RecordingSink::new();
        let mut module = sim_module(sink);

        module.set_desired_state(state(1.0, FRAC_PI_4), true);
        assert_approx_eq!(
            f64,
            module.desired_state().angle.get::<radian>(),
            FRAC_PI_4,
            epsilon = 1e-12
        );

        // zero speed with the deadband enabled: angle stays at 45 degrees
        module.set_desired_state(state(0.0, 0.0), true);
        assert_approx_eq!(
            f64,
            module.desired_state().angle.get::<radian>(),
            FRAC_PI_4,
            epsilon = 1e-12
        );
        assert_eq!(module.desired_state().speed.get::<meter_per_second>(), 0.0);
    }

    #[test]
    fn deadband_disabled_snaps_to_the_raw_angle() {
        let sink = RecordingSink::new();
        let mut module = sim_module(sink);
        module.set_state_deadband_enabled(false);

        module.set_desired_state(state(1.0, FRAC_PI_4), true);
        module.set_desired_state(state(0.0, 0.0), true);

        assert_approx_eq!(
            f64,
            module.desired_state().angle.get::<radian>(),
            0.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn long_steer_moves_flip_the_drive_direction() {
        let sink = RecordingSink::new();
        let mut module = sim_module(sink);

        // wheel at 0, asked for 135 degrees: expect -45 degrees, speed negated
        module.set_desired_state(state(1.0, 3.0 * FRAC_PI_4), true);

        let desired = module.desired_state();
        assert_approx_eq!(
            f64,
            desired.angle.get::<radian>(),
            -FRAC_PI_4,
            epsilon = 1e-12
        );
        assert_approx_eq!(
            f64,
            desired.speed.get::<meter_per_second>(),
            -1.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn distance_is_cumulative_across_commands() {
        let sink = RecordingSink::new();
        let mut module = sim_module(sink);

        module.set_desired_state(state(2.0, 0.0), false);
        module.update_sim(1.0);
        let first = module.position().distance.get::<meter>();

        module.set_desired_state(state(-1.0, 0.0), false);
        module.update_sim(1.0);
        let second = module.position().distance.get::<meter>();

        assert_approx_eq!(f64, first, 2.0, epsilon = 1e-9);
        assert_approx_eq!(f64, second, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn reset_to_absolute_applies_the_offset() {
        let sink = RecordingSink::new();
        let mut module = Module::new(
            "test",
            Box::new(SimModuleIo::new(4.5, PI / 3.0)),
            PI / 6.0,
            4.5,
            0.001,
            sink.clone(),
        );

        module.reset_to_absolute();

        // seeded angle = absolute - offset = pi/3 - pi/6 = pi/6
        let position = module.position();
        assert_approx_eq!(
            f64,
            position.angle.get::<radian>(),
            PI / 6.0,
            epsilon = 1e-12
        );
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn faults_hold_last_values_and_report() {
        let sink = RecordingSink::new();
        let mut module = Module::new("fl", Box::new(DeadIo), 0.0, 4.5, 0.001, sink.clone());

        let state_before = module.state();
        let position_before = module.position();
        module.set_desired_state(state(1.0, 0.5), false);
        let reports_after_command = sink.count();

        // reads failed: last-known (zero) values come back, nothing panics
        assert_eq!(state_before, ModuleState::zero());
        assert_eq!(position_before, ModulePosition::zero());
        assert!(reports_after_command > 0);

        // and the loop keeps going on later cycles too
        module.set_desired_state(state(1.0, 0.5), true);
        module.stop();
        assert!(sink.count() > reports_after_command);
    }
}
