//! Simulation variants of the hardware traits, selected by explicit
//! configuration at startup. The models are deliberately simple: steer
//! position tracks its target instantly, drive velocity tracks its target
//! instantly, and distance integrates velocity on each update.

use crate::hardware::{HeadingSensor, IoFault, ModuleIo};

pub struct SimModuleIo {
    max_speed: f64,
    distance: f64,
    velocity: f64,
    steer_angle: f64,
    absolute_angle: f64,
}

impl SimModuleIo {
    /// max_speed converts open-loop duty back into a velocity for the model.
    /// absolute_angle is the pretend mechanical position at power-on.
    pub fn new(max_speed: f64, absolute_angle: f64) -> SimModuleIo {
        SimModuleIo {
            max_speed,
            distance: 0.0,
            velocity: 0.0,
            steer_angle: 0.0,
            absolute_angle,
        }
    }
}

impl ModuleIo for SimModuleIo {
    fn set_drive_duty(&mut self, duty: f64) -> Result<(), IoFault> {
        self.velocity = duty.clamp(-1.0, 1.0) * self.max_speed;
        Ok(())
    }

    fn set_drive_velocity(&mut self, velocity: f64) -> Result<(), IoFault> {
        self.velocity = velocity.clamp(-self.max_speed, self.max_speed);
        Ok(())
    }

    fn set_steer_angle(&mut self, angle: f64) -> Result<(), IoFault> {
        self.steer_angle = angle;
        Ok(())
    }

    fn drive_distance(&mut self) -> Result<f64, IoFault> {
        Ok(self.distance)
    }

    fn drive_velocity(&mut self) -> Result<f64, IoFault> {
        Ok(self.velocity)
    }

    fn steer_angle(&mut self) -> Result<f64, IoFault> {
        Ok(self.steer_angle)
    }

    fn absolute_angle(&mut self) -> Result<f64, IoFault> {
        Ok(self.absolute_angle)
    }

    fn seed_steer_angle(&mut self, angle: f64) -> Result<(), IoFault> {
        self.steer_angle = angle;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), IoFault> {
        self.velocity = 0.0;
        Ok(())
    }

    fn update(&mut self, dt: f64) {
        self.distance += self.velocity * dt;
    }
}

pub struct SimHeadingSensor {
    yaw: f64,
}

impl SimHeadingSensor {
    pub fn new() -> SimHeadingSensor {
        SimHeadingSensor { yaw: 0.0 }
    }
}

impl Default for SimHeadingSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadingSensor for SimHeadingSensor {
    fn yaw(&mut self) -> Result<f64, IoFault> {
        Ok(self.yaw)
    }

    fn angular_rate(&mut self) -> Result<f64, IoFault> {
        Ok(0.0)
    }

    fn set_yaw(&mut self, yaw: f64) -> Result<(), IoFault> {
        self.yaw = yaw;
        Ok(())
    }

    fn add_sim_heading(&mut self, delta: f64) {
        self.yaw += delta;
    }
}
