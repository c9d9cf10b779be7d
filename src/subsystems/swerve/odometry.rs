use nalgebra::{Rotation2, vector};
use uom::si::angle::radian;
use uom::si::f64::{Angle, Length};
use uom::si::length::meter;

use crate::subsystems::swerve::kinematics::{
    Kinematics, ModulePosition, Twist, shortest_angular_distance,
};

/// Where the robot thinks it is on the field: x forward, y left from the
/// field origin, heading counterclockwise positive. Only the pose estimator
/// mutates this.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub x: Length,
    pub y: Length,
    pub heading: Angle,
}

impl Pose {
    pub fn new(x: Length, y: Length, heading: Angle) -> Pose {
        Pose { x, y, heading }
    }

    pub fn zero() -> Pose {
        Pose {
            x: Length::new::<meter>(0.0),
            y: Length::new::<meter>(0.0),
            heading: Angle::new::<radian>(0.0),
        }
    }

    /// Applies a robot-frame displacement twist to this pose: the constant
    /// curvature exponential, so a cycle's worth of simultaneous translation
    /// and rotation lands where the real arc does instead of where a
    /// straight-line step would.
    pub fn exp(&self, twist: &Twist) -> Pose {
        let heading = self.heading.get::<radian>();
        let dtheta = twist.dtheta;

        // Near zero rotation the closed form divides 0/0; second-order series
        // keeps the step smooth through dtheta = 0.
        let (s, c) = if dtheta.abs() < 1e-9 {
            (1.0 - dtheta * dtheta / 6.0, dtheta / 2.0)
        } else {
            (dtheta.sin() / dtheta, (1.0 - dtheta.cos()) / dtheta)
        };

        let chord = vector![twist.dx * s - twist.dy * c, twist.dx * c + twist.dy * s];
        let field_chord = Rotation2::new(heading) * chord;

        Pose {
            x: self.x + Length::new::<meter>(field_chord.x),
            y: self.y + Length::new::<meter>(field_chord.y),
            heading: Angle::new::<radian>(heading + dtheta),
        }
    }
}

/// Fuses heading-sensor yaw with incremental wheel odometry into a running
/// field pose. The gyro is authoritative for rotation; the wheels are
/// authoritative only for translation.
pub struct PoseEstimator {
    kinematics: Kinematics,
    pose: Pose,
    /// Field heading minus raw gyro yaw, so resets never require re-zeroing
    /// the sensor itself.
    gyro_offset: Angle,
    previous_heading: Angle,
    previous_positions: [ModulePosition; 4],
}

impl PoseEstimator {
    pub fn new(
        kinematics: Kinematics,
        gyro_angle: Angle,
        positions: [ModulePosition; 4],
        initial_pose: Pose,
    ) -> PoseEstimator {
        PoseEstimator {
            kinematics,
            pose: initial_pose,
            gyro_offset: initial_pose.heading - gyro_angle,
            previous_heading: initial_pose.heading,
            previous_positions: positions,
        }
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Periodic update: wheel deltas since the previous call become a
    /// robot-frame twist, the twist's rotation is replaced by the gyro's
    /// shortest-path delta, and the result is accumulated into the estimate.
    /// A skipped cycle simply shows up as one larger delta here; differencing
    /// against the stored baseline never double-counts.
    pub fn update(&mut self, gyro_angle: Angle, positions: &[ModulePosition; 4]) -> Pose {
        let heading = gyro_angle + self.gyro_offset;

        let mut deltas = [ModulePosition::zero(); 4];
        for (delta, (current, previous)) in deltas
            .iter_mut()
            .zip(positions.iter().zip(self.previous_positions.iter()))
        {
            *delta = ModulePosition {
                distance: current.distance - previous.distance,
                angle: current.angle,
            };
        }

        let mut twist = self.kinematics.to_twist(&deltas);
        // Gyro is authoritative for rotation; shortest-path differencing keeps
        // the accumulation free of wrap discontinuities even when the public
        // reading is unbounded.
        twist.dtheta = shortest_angular_distance(
            self.previous_heading.get::<radian>(),
            heading.get::<radian>(),
        );

        let mut pose = self.pose.exp(&twist);
        pose.heading = heading;

        self.pose = pose;
        self.previous_heading = heading;
        self.previous_positions = *positions;

        self.pose
    }

    /// Discards the delta baselines and pins the estimate to `pose`. Used at
    /// match start, after a gyro re-zero, and for one-shot external pose
    /// corrections; carrying the old baselines across any of those would
    /// compound error.
    pub fn reset(&mut self, gyro_angle: Angle, positions: &[ModulePosition; 4], pose: Pose) {
        self.pose = pose;
        self.gyro_offset = pose.heading - gyro_angle;
        self.previous_heading = pose.heading;
        self.previous_positions = *positions;
    }
}
