pub mod config {
    /// Control loop period, seconds. The external scheduler is expected to call
    /// Drivetrain::periodic at this rate.
    pub const LOOP_TIME_SECONDS: f64 = 0.02;

    /// A periodic gap longer than this is recorded as a deadline miss.
    pub const DEADLINE_MISS_THRESHOLD_SECONDS: f64 = 2.0 * LOOP_TIME_SECONDS;
}

pub mod drivetrain {
    /// Wheel-wheel distance between the left and right modules, meters.
    pub const WHEELBASE_WIDTH_METERS: f64 = 0.57785;
    /// Wheel-wheel distance between the front and back modules, meters.
    pub const WHEELBASE_LENGTH_METERS: f64 = 0.57785;

    /// Maximum attainable linear wheel speed, meters per second.
    pub const MAX_SPEED_METERS_PER_SECOND: f64 = 4.5;

    /// Commanded speeds below this hold the last steer angle instead of
    /// snapping the wheels to the angle of a near-zero vector.
    pub const STATE_DEADBAND_METERS_PER_SECOND: f64 = 0.001;

    /// How long to wait after powering the steer motors before seeding them
    /// from the absolute encoders. Seeding too early races motor inversion
    /// during controller init and zeroes the wheels against the wrong sign.
    pub const MODULE_SETTLE_DELAY_SECONDS: f64 = 1.0;

    /// Calibrated absolute-encoder readings with the wheels at zero, radians.
    /// Order is FL, FR, BL, BR everywhere in this crate.
    pub const STEER_OFFSETS_RADIANS: [f64; 4] = [0.0, 0.0, 0.0, 0.0];

    pub const STARTING_HEADING_RADIANS: f64 = 0.0;
}

pub mod gains {
    pub const TRANSLATION_KP: f64 = 3.0;
    pub const TRANSLATION_KD: f64 = 0.05;

    pub const HEADING_KP: f64 = 4.0;
    pub const HEADING_KD: f64 = 0.1;

    /// Heading controller tolerance band, radians and radians per second.
    /// 0.25 degrees, matching how tight we need to hold a shot heading.
    pub const HEADING_TOLERANCE_RADIANS: f64 = 0.004363323129985824;
    pub const HEADING_VELOCITY_TOLERANCE_RADIANS_PER_SECOND: f64 = 0.004363323129985824;
}
