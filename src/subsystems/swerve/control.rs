use crate::subsystems::swerve::kinematics::wrap_angle;

/// One axis of the position/heading loop. Stateful across calls (integral and
/// last-sample bookkeeping live here), owned exclusively by the drivetrain,
/// and fully resettable between command sequences.
pub struct PidController {
    kp: f64,
    ki: f64,
    kd: f64,
    period: f64,

    /// When set, error is wrapped to the shortest signed path across this
    /// input range before the proportional term. Used by the rotation axis
    /// with (-pi, pi].
    continuous_range: Option<f64>,

    position_tolerance: f64,
    velocity_tolerance: f64,

    setpoint: f64,
    error: f64,
    error_derivative: f64,
    total_error: f64,
    previous_error: f64,
    have_measurement: bool,
}

impl PidController {
    pub fn new(kp: f64, ki: f64, kd: f64, period: f64) -> PidController {
        PidController {
            kp,
            ki,
            kd,
            period,
            continuous_range: None,
            position_tolerance: f64::INFINITY,
            velocity_tolerance: f64::INFINITY,
            setpoint: 0.0,
            error: 0.0,
            error_derivative: 0.0,
            total_error: 0.0,
            previous_error: 0.0,
            have_measurement: false,
        }
    }

    /// Treats the input as periodic over [minimum, maximum), e.g. (-pi, pi]
    /// for a heading: the error becomes the shortest signed path around the
    /// circle.
    pub fn enable_continuous_input(&mut self, minimum: f64, maximum: f64) {
        self.continuous_range = Some(maximum - minimum);
    }

    pub fn set_tolerance(&mut self, position: f64, velocity: f64) {
        self.position_tolerance = position;
        self.velocity_tolerance = velocity;
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    /// One controller step. Pure in its inputs plus the persistent
    /// accumulators; call once per control cycle.
    pub fn calculate(&mut self, measurement: f64, setpoint: f64) -> f64 {
        self.setpoint = setpoint;

        self.error = match self.continuous_range {
            // full turns in either direction are equivalent, shortest path wins
            Some(range) => wrap_angle((setpoint - measurement) * std::f64::consts::TAU / range)
                * range
                / std::f64::consts::TAU,
            None => setpoint - measurement,
        };

        if self.have_measurement {
            self.error_derivative = (self.error - self.previous_error) / self.period;
        } else {
            self.error_derivative = 0.0;
            self.have_measurement = true;
        }

        if self.ki != 0.0 {
            self.total_error += self.error * self.period;
        }

        self.previous_error = self.error;

        self.kp * self.error + self.ki * self.total_error + self.kd * self.error_derivative
    }

    /// True once the last measured error sits inside the position and
    /// velocity tolerance band.
    pub fn at_setpoint(&self) -> bool {
        self.have_measurement
            && self.error.abs() < self.position_tolerance
            && self.error_derivative.abs() < self.velocity_tolerance
    }

    /// Clears accumulated error and last-sample bookkeeping. Call at the
    /// start of every new command sequence, otherwise integral windup from
    /// the stale goal carries over.
    pub fn reset(&mut self) {
        self.error = 0.0;
        self.error_derivative = 0.0;
        self.total_error = 0.0;
        self.previous_error = 0.0;
        self.have_measurement = false;
    }
}

#[cfg(test)]
mod control_tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use std::f64::consts::{PI, TAU};

    #[test]
    fn proportional_only() {
        let mut controller = PidController::new(2.0, 0.0, 0.0, 0.02);
        assert_approx_eq!(f64, controller.calculate(1.0, 3.0), 4.0, epsilon = 1e-12);
    }

    #[test]
    fn continuous_input_takes_the_short_way_around() {
        let mut controller = PidController::new(1.0, 0.0, 0.0, 0.02);
        controller.enable_continuous_input(-PI, PI);

        // measurement 3.0 rad, setpoint -3.0 rad: the short way is 2pi - 6.0
        // forward, not 6.0 backward
        let output = controller.calculate(3.0, -3.0);
        assert_approx_eq!(f64, output.abs(), TAU - 6.0, epsilon = 1e-12);
        assert!(output > 0.0);
    }

    #[test]
    fn integral_accumulates_and_reset_clears_it() {
        let mut controller = PidController::new(0.0, 1.0, 0.0, 0.5);

        controller.calculate(0.0, 1.0);
        let second = controller.calculate(0.0, 1.0);
        assert_approx_eq!(f64, second, 1.0, epsilon = 1e-12);

        controller.reset();
        let after_reset = controller.calculate(0.0, 1.0);
        assert_approx_eq!(f64, after_reset, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn derivative_ignores_the_first_sample() {
        let mut controller = PidController::new(0.0, 0.0, 1.0, 0.1);

        // no previous sample: derivative must be zero, not a spike
        assert_approx_eq!(f64, controller.calculate(0.0, 1.0), 0.0, epsilon = 1e-12);
        // error shrank by 0.5 over one 0.1 s period
        assert_approx_eq!(f64, controller.calculate(0.5, 1.0), -5.0, epsilon = 1e-12);
    }

    #[test]
    fn at_setpoint_uses_the_tolerance_band() {
        let mut controller = PidController::new(1.0, 0.0, 0.0, 0.02);
        controller.set_tolerance(0.1, f64::INFINITY);

        assert!(!controller.at_setpoint()); // no measurement yet

        controller.calculate(0.5, 1.0);
        assert!(!controller.at_setpoint());

        controller.calculate(0.95, 1.0);
        assert!(controller.at_setpoint());
    }

    #[test]
    fn continuous_wrap_near_the_seam() {
        let mut controller = PidController::new(1.0, 0.0, 0.0, 0.02);
        controller.enable_continuous_input(-PI, PI);

        // just across the seam: tiny positive correction, not a full turn
        let output = controller.calculate(PI - 0.01, -PI + 0.01);
        assert_approx_eq!(f64, output, 0.02, epsilon = 1e-9);
    }
}
