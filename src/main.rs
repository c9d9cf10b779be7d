use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use swerve_core::hardware::sim::{SimHeadingSensor, SimModuleIo};
use swerve_core::hardware::{TracingDiagnostics, TracingTelemetry};
use swerve_core::{Drivetrain, DrivetrainConfig};
use tokio::task;
use tokio::task::spawn_local;
use tokio::time::sleep;
use tokio::time::{Duration, Instant};
use tracing::{error, info, warn};
use uom::si::angle::radian;
use uom::si::angular_velocity::radian_per_second;
use uom::si::f64::{Angle, AngularVelocity, Length, Velocity};
use uom::si::length::meter;
use uom::si::velocity::meter_per_second;

/// Simulated control loop: drives the chassis through a short scripted
/// sequence at the real cycle rate so the whole stack (kinematics, odometry,
/// module control, PID) runs end to end without hardware.
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let runtime = tokio::runtime::Runtime::new().expect("failed to build tokio runtime");
    let local = task::LocalSet::new();

    let config = DrivetrainConfig {
        settle_delay_seconds: 0.0,
        simulation: true,
        ..Default::default()
    };
    let loop_time = config.loop_time_seconds;
    let max_speed = config.max_speed_meters_per_second;

    let drivetrain = Drivetrain::new(
        config,
        Box::new(SimHeadingSensor::new()),
        [
            Box::new(SimModuleIo::new(max_speed, 0.0)),
            Box::new(SimModuleIo::new(max_speed, 0.0)),
            Box::new(SimModuleIo::new(max_speed, 0.0)),
            Box::new(SimModuleIo::new(max_speed, 0.0)),
        ],
        Arc::new(TracingDiagnostics),
        Box::new(TracingTelemetry),
    );
    let drivetrain = match drivetrain {
        Ok(drivetrain) => Rc::new(RefCell::new(drivetrain)),
        Err(error) => {
            error!("drivetrain configuration rejected: {error}");
            std::process::exit(1);
        }
    };

    runtime.block_on(local.run_until(async {
        // Watchdog: if the control loop stops making progress, stop the
        // motors rather than let the last command run away.
        let last_loop_time = Arc::new(AtomicU64::new(0));
        let watchdog_last_loop = Arc::clone(&last_loop_time);
        let watchdog_drivetrain = drivetrain.clone();

        spawn_local(async move {
            loop {
                sleep(Duration::from_millis(20)).await;
                let last = watchdog_last_loop.load(Ordering::Relaxed);
                let now = SystemTime::now()
                    .duration_since(SystemTime::UNIX_EPOCH)
                    .expect("system clock before unix epoch")
                    .as_millis() as u64;

                if last != 0 && now - last > 150 {
                    warn!("loop overrun: {}ms", now - last);
                    if let Ok(mut drivetrain) = watchdog_drivetrain.try_borrow_mut() {
                        drivetrain.stop();
                        warn!("watchdog triggered: motors stopped");
                    } else {
                        warn!("watchdog could not borrow the drivetrain");
                    }
                }
            }
        });

        let mps = |value: f64| Velocity::new::<meter_per_second>(value);
        let rps = |value: f64| AngularVelocity::new::<radian_per_second>(value);

        let mut last_loop = Instant::now();
        let mut cycle: u64 = 0;

        loop {
            let dt = last_loop.elapsed();

            if let Ok(mut drivetrain) = drivetrain.try_borrow_mut() {
                let elapsed = cycle as f64 * loop_time;

                // scripted sequence: forward, arc, hold a heading, then park
                // at a field pose
                if elapsed < 2.0 {
                    drivetrain.drive(mps(1.0), mps(0.0), rps(0.0), false, true);
                } else if elapsed < 4.0 {
                    drivetrain.drive(mps(1.0), mps(0.5), rps(0.5), true, false);
                } else if elapsed < 6.0 {
                    if elapsed - 4.0 < loop_time {
                        drivetrain.reset_controllers();
                    }
                    drivetrain.drive_to_heading(
                        mps(0.5),
                        mps(0.0),
                        Angle::new::<radian>(std::f64::consts::FRAC_PI_2),
                        true,
                    );
                } else if elapsed < 10.0 {
                    if elapsed - 6.0 < loop_time {
                        drivetrain.reset_controllers();
                    }
                    drivetrain.drive_to_pose(
                        Length::new::<meter>(2.0),
                        Length::new::<meter>(1.0),
                        Angle::new::<radian>(0.0),
                    );
                } else {
                    drivetrain.stop();
                }

                drivetrain.periodic();

                if cycle % 50 == 0 {
                    let pose = drivetrain.pose();
                    info!(
                        "t={elapsed:5.1}s pose=({:.2}m, {:.2}m, {:.2}rad)",
                        pose.x.get::<meter>(),
                        pose.y.get::<meter>(),
                        pose.heading.get::<radian>(),
                    );
                }

                if elapsed > 12.0 {
                    info!("scripted run complete");
                    break;
                }
            }

            let now_millis = SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .expect("system clock before unix epoch")
                .as_millis() as u64;
            last_loop_time.store(now_millis, Ordering::Relaxed);

            // hold the fixed cycle period
            let left = (loop_time - dt.as_secs_f64()).max(0.0);
            sleep(Duration::from_secs_f64(left)).await;

            last_loop = Instant::now();
            cycle += 1;
        }
    }));
}
