#![warn(missing_docs)]

//! # Chassis PID Motion Control Library
//!
//! This library closes position loops around the motors of a wheeled robot, so that a caller can
//! ask the robot to drive a distance or turn an angle and carry on with other work while the
//! motion runs on a background thread.
//!
//! ## Features
//!
//! - An iterative position PID engine:
//!   - Configurable and fully validated gains, output limits and integral limits.
//!   - Sample-time gating: _It's a no-op if the engine is stepped before one sampling period elapsed_.
//!   - Optional low-pass filtering of the derivative term and derivative-on-measurement.
//!   - A configurable settling criterion (error band, derivative band, dwell time).
//!
//! - Asynchronous controllers:
//!   - A single-axis position controller stepping its engine on a dedicated thread.
//!   - A chassis controller multiplexing distance, angle and turn loops onto one thread, where a
//!     new movement always replaces the one in progress, even while a caller waits on it.
//!   - Variants delegating to the motors' own position control when no gains are available.
//!
//! - Kinematic mixers for skid-steer and x-drive drivetrains, with deadbands and
//!   ratio-preserving saturation.
//!
//! Hardware is reached only through the [`device::Motor`] and [`device::RotarySensor`] traits.
//! The library logs through the [`log`] facade and never installs a logger itself.
//!
//! ## Usage
//!
//! ### Iterative PID engine
//!
//! The engine holds its own history and is stepped with a process reading and a timestamp.
//!
//! ```rust
//! use core::time::Duration;
//!
//! use chassis_pid::pid::{IterativePid, PidConfigBuilder};
//! use chassis_pid::time::Millis;
//!
//! let config = PidConfigBuilder::default()
//!     .kp(0.01)
//!     .ki(0.001)
//!     .sample_time(Duration::from_millis(10))
//!     .build()
//!     .expect("Invalid PID config");
//! let mut pid = IterativePid::<Millis, f64>::new(config);
//!
//! pid.set_target(90.0);
//! let output = pid.step(0.0, Millis(0));
//! assert!(output > 0.0);
//!
//! // Disabled engines never hold anybody up
//! pid.flip_disable(true);
//! assert_eq!(pid.step(0.0, Millis(10)), 0.0);
//! assert!(pid.is_settled());
//! ```
//!
//! ### Chassis controller
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use chassis_pid::builder::ChassisControllerBuilder;
//! use chassis_pid::chassis::{ChassisController, ChassisScales};
//! use chassis_pid::device::{Gearset, Motor};
//! use chassis_pid::pid::PidGains;
//! use chassis_pid::units::{QAngle, QLength};
//!
//! fn autonomous(left: Arc<dyn Motor>, right: Arc<dyn Motor>) {
//!     let chassis = ChassisControllerBuilder::default()
//!         .with_motors(left, right)
//!         .with_gains(PidGains::new(0.002, 0.0, 0.0001), PidGains::new(0.004, 0.0, 0.0001))
//!         .with_gearset(Gearset::Green.into())
//!         .with_dimensions(
//!             ChassisScales::from_dimensions(QLength::inches(4.0), QLength::inches(11.5))
//!                 .expect("Invalid dimensions"),
//!         )
//!         .build()
//!         .expect("Invalid chassis");
//!
//!     chassis.move_distance(QLength::feet(2.0));
//!     chassis.turn_angle(QAngle::degrees(90.0));
//! }
//! ```
//!
//! ### Plugging in your Instant type
//!
//! ``` rust
//! use core::ops::Add;
//! use core::time::Duration;
//! use chassis_pid::pid::{IterativePid, PidConfig};
//! use chassis_pid::time::InstantLike;
//!
//! #[derive(Copy, Clone, Debug, PartialEq)]
//! struct Time {
//!     sec: i32,
//!     nsec: i32,
//! }
//!
//! impl Add<Duration> for Time {
//!     type Output = Time;
//!
//!     fn add(self, rhs: Duration) -> Time {
//!         let nsec = self.nsec as u64 + u64::from(rhs.subsec_nanos());
//!         Time {
//!             sec: self.sec + rhs.as_secs() as i32 + (nsec / 1_000_000_000) as i32,
//!             nsec: (nsec % 1_000_000_000) as i32,
//!         }
//!     }
//! }
//!
//! impl InstantLike for Time {
//!     fn duration_since(&self, other: Self) -> Duration {
//!         let sec = self.sec - other.sec;
//!         let nsec = self.nsec - other.nsec;
//!         Duration::new(sec as u64, nsec as u32)
//!     }
//! }
//!
//! let mut pid = IterativePid::new(PidConfig::default());
//! pid.set_target(1.0);
//!
//! let timestamp = Time { sec: 1, nsec: 0 };
//! let output = pid.step(0.0, timestamp);
//! ```
//!
//! ## License
//!
//! MIT

/// The iterative PID engine, its configuration and its settling criterion.
pub mod pid;

/// The module containing time-related utilities to support sampling time handling
pub mod time;

/// Physical quantities accepted by the chassis controllers.
pub mod units;

/// Motor and sensor capabilities.
pub mod device;

/// Pure kinematic mixing functions.
pub mod mixer;

/// Chassis models dispatching drive commands to motors.
pub mod model;

/// Single-axis asynchronous position controllers.
pub mod async_pos;

/// Coordinated chassis controllers.
pub mod chassis;

/// Builders assembling controllers.
pub mod builder;

mod sync;

/// Simulated motors for closed-loop testing.
#[cfg(feature = "simulation")]
pub mod sim;

#[doc = include_str!("../README.md")]
#[cfg(doctest)]
pub struct ReadmeDoctests;
