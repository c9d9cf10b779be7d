use nalgebra::{Rotation2, SMatrix, SVector, Vector2, vector};
use std::f64::consts::{FRAC_PI_2, PI, TAU};
use uom::si::angle::radian;
use uom::si::angular_velocity::radian_per_second;
use uom::si::f64::{Angle, AngularVelocity, Length, Velocity};
use uom::si::length::meter;
use uom::si::velocity::meter_per_second;

/// Chassis-level motion: forward speed, strafe speed, angular rate.
/// x is forward, y is left, rotation is counterclockwise positive.
/// Whether the components are field- or robot-relative is a property of the
/// call site, not of the value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChassisMotion {
    pub vx: Velocity,
    pub vy: Velocity,
    pub omega: AngularVelocity,
}

impl ChassisMotion {
    pub fn new(vx: Velocity, vy: Velocity, omega: AngularVelocity) -> ChassisMotion {
        ChassisMotion { vx, vy, omega }
    }

    pub fn zero() -> ChassisMotion {
        ChassisMotion {
            vx: Velocity::new::<meter_per_second>(0.0),
            vy: Velocity::new::<meter_per_second>(0.0),
            omega: AngularVelocity::new::<radian_per_second>(0.0),
        }
    }

    /// Rotates field-relative velocity components into the robot frame given
    /// the current heading. Pure 2D rotation; omega is frame-independent.
    pub fn from_field_relative(
        vx: Velocity,
        vy: Velocity,
        omega: AngularVelocity,
        heading: Angle,
    ) -> ChassisMotion {
        let rotated = Rotation2::new(-heading.get::<radian>())
            * vector![
                vx.get::<meter_per_second>(),
                vy.get::<meter_per_second>()
            ];

        ChassisMotion {
            vx: Velocity::new::<meter_per_second>(rotated.x),
            vy: Velocity::new::<meter_per_second>(rotated.y),
            omega,
        }
    }
}

/// One module's velocity state: linear wheel speed and steer angle.
/// The angle is periodic and range-free; compare with
/// [`shortest_angular_distance`], never by subtraction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModuleState {
    pub speed: Velocity,
    pub angle: Angle,
}

impl ModuleState {
    pub fn new(speed: Velocity, angle: Angle) -> ModuleState {
        ModuleState { speed, angle }
    }

    pub fn zero() -> ModuleState {
        ModuleState {
            speed: Velocity::new::<meter_per_second>(0.0),
            angle: Angle::new::<radian>(0.0),
        }
    }

    /// Picks the shorter steer travel from the current angle: past 90 degrees
    /// it is cheaper to flip the target by 180 and drive the wheel backwards.
    /// The returned angle is continuous with `current_angle`, so the steer
    /// motor never takes the long way around.
    pub fn optimize(&self, current_angle: Angle) -> ModuleState {
        let current = current_angle.get::<radian>();
        let mut delta = shortest_angular_distance(current, self.angle.get::<radian>());
        let mut speed = self.speed;

        if delta.abs() > FRAC_PI_2 {
            speed = -speed;
            delta = wrap_angle(delta + PI);
        }

        ModuleState {
            speed,
            angle: Angle::new::<radian>(current + delta),
        }
    }
}

/// One module's position state: cumulative driven distance and steer angle.
/// Distance is monotonic in magnitude for the life of the module; odometry
/// depends on differencing it, never on resetting it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModulePosition {
    pub distance: Length,
    pub angle: Angle,
}

impl ModulePosition {
    pub fn new(distance: Length, angle: Angle) -> ModulePosition {
        ModulePosition { distance, angle }
    }

    pub fn zero() -> ModulePosition {
        ModulePosition {
            distance: Length::new::<meter>(0.0),
            angle: Angle::new::<radian>(0.0),
        }
    }
}

/// A small chassis displacement: dx/dy in meters, dtheta in radians.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Twist {
    pub dx: f64,
    pub dy: f64,
    pub dtheta: f64,
}

/// Wraps an angle in radians into (-pi, pi].
pub fn wrap_angle(theta: f64) -> f64 {
    let wrapped = theta.rem_euclid(TAU);
    if wrapped > PI { wrapped - TAU } else { wrapped }
}

/// Signed shortest rotation from one angle to another, radians in (-pi, pi].
pub fn shortest_angular_distance(from: f64, to: f64) -> f64 {
    wrap_angle(to - from)
}

/// Stateless transform between chassis motion and the four per-module states,
/// fixed by the module mounting offsets. Offsets (and therefore every array
/// this struct consumes or produces) are in FL, FR, BL, BR order.
#[derive(Clone)]
pub struct Kinematics {
    module_offsets: [Vector2<f64>; 4],
    // Least-squares solver for the forward transform: (A^T A)^-1 A^T where A
    // stacks the two velocity-component rows per module.
    forward_solver: SMatrix<f64, 3, 8>,
}

impl Kinematics {
    /// Returns None if the offsets are degenerate and the forward transform
    /// has no solution (all four modules on one point, for instance).
    pub fn new(module_offsets: [Vector2<f64>; 4]) -> Option<Kinematics> {
        let mut inverse_matrix = SMatrix::<f64, 8, 3>::zeros();
        for (i, offset) in module_offsets.iter().enumerate() {
            inverse_matrix[(2 * i, 0)] = 1.0;
            inverse_matrix[(2 * i, 2)] = -offset.y;
            inverse_matrix[(2 * i + 1, 1)] = 1.0;
            inverse_matrix[(2 * i + 1, 2)] = offset.x;
        }

        let normal = inverse_matrix.transpose() * inverse_matrix;
        let forward_solver = normal.try_inverse()? * inverse_matrix.transpose();

        Some(Kinematics {
            module_offsets,
            forward_solver,
        })
    }

    /// Inverse transform: each wheel's velocity is the chassis translational
    /// velocity plus the tangential velocity induced by omega at that module's
    /// offset.
    pub fn to_module_states(&self, motion: &ChassisMotion) -> [ModuleState; 4] {
        let vx = motion.vx.get::<meter_per_second>();
        let vy = motion.vy.get::<meter_per_second>();
        let omega = motion.omega.get::<radian_per_second>();

        self.module_offsets.map(|offset| {
            let wheel = vector![vx - omega * offset.y, vy + omega * offset.x];
            ModuleState {
                speed: Velocity::new::<meter_per_second>(wheel.norm()),
                angle: Angle::new::<radian>(wheel.y.atan2(wheel.x)),
            }
        })
    }

    /// Uniformly rescales the whole array so no speed exceeds max_speed.
    /// The scale factor is shared, preserving the direction and shape of the
    /// commanded motion; scaling modules independently would bend the path.
    pub fn desaturate(states: &mut [ModuleState; 4], max_speed: Velocity) {
        let max_observed = states
            .iter()
            .map(|state| state.speed.get::<meter_per_second>().abs())
            .fold(0.0, f64::max);

        let max = max_speed.get::<meter_per_second>();
        if max_observed > max {
            let scale = max / max_observed;
            for state in states.iter_mut() {
                state.speed = state.speed * scale;
            }
        }
    }

    /// Forward transform: least-squares chassis motion realized by the given
    /// module states. Exact inverse of [`Self::to_module_states`] when no
    /// desaturation occurred.
    pub fn to_chassis_motion(&self, states: &[ModuleState; 4]) -> ChassisMotion {
        let solution = self.solve_forward(states.map(|state| {
            (
                state.speed.get::<meter_per_second>(),
                state.angle.get::<radian>(),
            )
        }));

        ChassisMotion {
            vx: Velocity::new::<meter_per_second>(solution.x),
            vy: Velocity::new::<meter_per_second>(solution.y),
            omega: AngularVelocity::new::<radian_per_second>(solution.z),
        }
    }

    /// Differential form of the forward transform: per-module distance deltas
    /// in, robot-frame displacement twist out. Used by odometry each cycle.
    pub fn to_twist(&self, deltas: &[ModulePosition; 4]) -> Twist {
        let solution = self.solve_forward(
            deltas.map(|delta| (delta.distance.get::<meter>(), delta.angle.get::<radian>())),
        );

        Twist {
            dx: solution.x,
            dy: solution.y,
            dtheta: solution.z,
        }
    }

    fn solve_forward(&self, magnitudes_and_angles: [(f64, f64); 4]) -> nalgebra::Vector3<f64> {
        let mut components = SVector::<f64, 8>::zeros();
        for (i, (magnitude, angle)) in magnitudes_and_angles.iter().enumerate() {
            components[2 * i] = magnitude * angle.cos();
            components[2 * i + 1] = magnitude * angle.sin();
        }

        self.forward_solver * components
    }
}

#[cfg(test)]
mod kinematics_tests {
    use super::*;
    use crate::config::DrivetrainConfig;
    use float_cmp::assert_approx_eq;

    fn kinematics() -> Kinematics {
        Kinematics::new(DrivetrainConfig::default().module_offsets()).unwrap()
    }

    fn motion(vx: f64, vy: f64, omega: f64) -> ChassisMotion {
        ChassisMotion::new(
            Velocity::new::<meter_per_second>(vx),
            Velocity::new::<meter_per_second>(vy),
            AngularVelocity::new::<radian_per_second>(omega),
        )
    }

    #[test]
    fn pure_translation_gives_equal_states() {
        let states = kinematics().to_module_states(&motion(1.0, 1.0, 0.0));

        for state in &states {
            assert_approx_eq!(
                f64,
                state.speed.get::<meter_per_second>(),
                2.0_f64.sqrt(),
                epsilon = 1e-12
            );
            assert_approx_eq!(
                f64,
                state.angle.get::<radian>(),
                PI / 4.0,
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn pure_rotation_gives_tangential_states() {
        let offsets = DrivetrainConfig::default().module_offsets();
        let states = kinematics().to_module_states(&motion(0.0, 0.0, 1.0));

        let expected_speed = offsets[0].norm();
        for (state, offset) in states.iter().zip(offsets.iter()) {
            assert_approx_eq!(
                f64,
                state.speed.get::<meter_per_second>(),
                expected_speed,
                epsilon = 1e-12
            );
            // tangential: the wheel vector is the offset rotated +90 degrees
            let expected_angle = offset.x.atan2(-offset.y);
            assert_approx_eq!(
                f64,
                wrap_angle(state.angle.get::<radian>() - expected_angle),
                0.0,
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn forward_round_trips_inverse() {
        let kinematics = kinematics();
        let input = motion(1.3, -0.4, 2.1);

        let states = kinematics.to_module_states(&input);
        let output = kinematics.to_chassis_motion(&states);

        assert_approx_eq!(
            f64,
            output.vx.get::<meter_per_second>(),
            input.vx.get::<meter_per_second>(),
            epsilon = 1e-9
        );
        assert_approx_eq!(
            f64,
            output.vy.get::<meter_per_second>(),
            input.vy.get::<meter_per_second>(),
            epsilon = 1e-9
        );
        assert_approx_eq!(
            f64,
            output.omega.get::<radian_per_second>(),
            input.omega.get::<radian_per_second>(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn desaturate_caps_speeds_and_preserves_ratios() {
        let kinematics = kinematics();
        let mut states = kinematics.to_module_states(&motion(6.0, 2.0, 4.0));
        let before = states;

        let max_speed = Velocity::new::<meter_per_second>(4.5);
        Kinematics::desaturate(&mut states, max_speed);

        let max_observed = states
            .iter()
            .map(|s| s.speed.get::<meter_per_second>().abs())
            .fold(0.0, f64::max);
        assert!(max_observed <= 4.5 + 1e-9);

        // every pairwise ratio is unchanged
        for i in 0..4 {
            for j in 0..4 {
                let before_ratio = before[i].speed.get::<meter_per_second>()
                    / before[j].speed.get::<meter_per_second>();
                let after_ratio = states[i].speed.get::<meter_per_second>()
                    / states[j].speed.get::<meter_per_second>();
                assert_approx_eq!(f64, before_ratio, after_ratio, epsilon = 1e-9);
            }
        }

        // angles are untouched
        for (before, after) in before.iter().zip(states.iter()) {
            assert_eq!(before.angle, after.angle);
        }
    }

    #[test]
    fn desaturate_leaves_slow_states_alone() {
        let mut states = [ModuleState::new(
            Velocity::new::<meter_per_second>(1.0),
            Angle::new::<radian>(0.0),
        ); 4];
        let before = states;

        Kinematics::desaturate(&mut states, Velocity::new::<meter_per_second>(4.5));
        assert_eq!(before, states);
    }

    #[test]
    fn field_relative_rotates_into_robot_frame() {
        // driving field-forward with the robot turned 90 degrees left means
        // driving robot-right
        let motion = ChassisMotion::from_field_relative(
            Velocity::new::<meter_per_second>(1.0),
            Velocity::new::<meter_per_second>(0.0),
            AngularVelocity::new::<radian_per_second>(0.0),
            Angle::new::<radian>(FRAC_PI_2),
        );

        assert_approx_eq!(f64, motion.vx.get::<meter_per_second>(), 0.0, epsilon = 1e-12);
        assert_approx_eq!(
            f64,
            motion.vy.get::<meter_per_second>(),
            -1.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn optimize_flips_past_ninety_degrees() {
        let state = ModuleState::new(
            Velocity::new::<meter_per_second>(1.0),
            Angle::new::<radian>(3.0 * PI / 4.0),
        );

        let optimized = state.optimize(Angle::new::<radian>(0.0));

        assert_approx_eq!(
            f64,
            optimized.speed.get::<meter_per_second>(),
            -1.0,
            epsilon = 1e-12
        );
        assert_approx_eq!(
            f64,
            optimized.angle.get::<radian>(),
            -PI / 4.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn optimize_keeps_short_moves() {
        let state = ModuleState::new(
            Velocity::new::<meter_per_second>(1.0),
            Angle::new::<radian>(0.5),
        );

        let optimized = state.optimize(Angle::new::<radian>(0.2));
        assert_eq!(
            optimized.speed.get::<meter_per_second>(),
            1.0
        );
        assert_approx_eq!(f64, optimized.angle.get::<radian>(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn optimize_stays_continuous_across_the_wrap() {
        // current angle far outside (-pi, pi]: the target must stay nearby
        let state = ModuleState::new(
            Velocity::new::<meter_per_second>(1.0),
            Angle::new::<radian>(0.1),
        );

        let optimized = state.optimize(Angle::new::<radian>(10.0 * PI + 0.2));
        assert!((optimized.angle.get::<radian>() - (10.0 * PI + 0.2)).abs() <= PI / 2.0 + 1e-9);
    }

    #[test]
    fn wrap_angle_covers_the_boundaries() {
        assert_approx_eq!(f64, wrap_angle(PI + 0.1), -PI + 0.1, epsilon = 1e-12);
        assert_approx_eq!(f64, wrap_angle(-PI - 0.1), PI - 0.1, epsilon = 1e-12);
        assert_approx_eq!(f64, wrap_angle(PI), PI, epsilon = 1e-12);
        assert_approx_eq!(f64, wrap_angle(5.0 * TAU + 0.3), 0.3, epsilon = 1e-9);
    }

    #[test]
    fn shortest_distance_takes_the_short_way() {
        assert_approx_eq!(
            f64,
            shortest_angular_distance(3.0, -3.0),
            TAU - 6.0,
            epsilon = 1e-12
        );
        assert_approx_eq!(
            f64,
            shortest_angular_distance(-3.0, 3.0),
            -(TAU - 6.0),
            epsilon = 1e-12
        );
    }
}
