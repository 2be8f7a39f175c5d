// Assembly of controllers from motors, sensors and tuning
// Copyright © 2025 Hs293Go
//
// Permission is hereby granted, free of charge, to any person obtaining
// a copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included
// in all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND,
// EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES
// OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT.
// IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
// DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT,
// TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE
// OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

use std::sync::Arc;

use log::{error, info, warn};

use crate::async_pos::{AsyncPosIntegratedController, AsyncPosPidController, AsyncPositionController};
use crate::chassis::{
    ChassisController, ChassisControllerIntegrated, ChassisControllerPid, ChassisError,
    ChassisScales,
};
use crate::device::{DeviceError, Gearset, GearsetRatioPair, Motor, MotorGroup, RotarySensor};
use crate::model::{ChassisModel, SkidSteerModel, XDriveModel};
use crate::pid::{IterativePid, PidConfigBuilder, PidConfigError, PidGains, SettleConfig};

/// Voltage commanded at full scale unless configured otherwise, in millivolts.
pub const DEFAULT_MAX_VOLTAGE: f64 = 12000.0;

/// Errors raised while assembling a controller.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum BuildError {
    /// `build` was called before any motors were given.
    #[error("no motors given")]
    NoMotors,
    /// A PID controller was requested without gains.
    #[error("no gains given")]
    MissingGains,
    /// The chassis controller rejected its configuration.
    #[error(transparent)]
    Chassis(#[from] ChassisError),
    /// The PID configuration was invalid.
    #[error(transparent)]
    Config(#[from] PidConfigError),
    /// A device could not be set up.
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Gains of the three chassis loops.
#[derive(Copy, Clone, Debug)]
struct ChassisGains {
    distance: PidGains<f64>,
    turn: PidGains<f64>,
    angle: PidGains<f64>,
}

enum DriveMotors {
    SkidSteer {
        left: Arc<dyn Motor>,
        right: Arc<dyn Motor>,
    },
    XDrive([Arc<dyn Motor>; 4]),
}

type SensorPair = (Arc<dyn RotarySensor>, Arc<dyn RotarySensor>);

fn pid_from(
    gains: PidGains<f64>,
    settle: Option<SettleConfig<f64>>,
    filter_tc: Option<f64>,
) -> Result<IterativePid<crate::time::StdInstant, f64>, PidConfigError> {
    let mut builder = PidConfigBuilder::default().gains(gains);
    if let Some(settle) = settle {
        builder = builder.settle(settle);
    }
    if let Some(filter_tc) = filter_tc {
        builder = builder.filter_tc(filter_tc);
    }
    Ok(IterativePid::new(builder.build()?))
}

/// Builds a chassis controller.
///
/// Without gains the motors' own position control is used. Anything not configured falls back
/// to a default: a red cartridge with a 1:1 ratio, a maximum velocity equal to the cartridge's
/// free speed, [`DEFAULT_MAX_VOLTAGE`], unit scales and the motors' integrated encoders.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use chassis_pid::device::{Gearset, Motor};
/// # use chassis_pid::builder::ChassisControllerBuilder;
/// # use chassis_pid::chassis::{ChassisController, ChassisScales};
/// # use chassis_pid::pid::PidGains;
/// # use chassis_pid::units::QLength;
/// # fn run(left: Arc<dyn Motor>, right: Arc<dyn Motor>) -> Result<(), Box<dyn std::error::Error>> {
/// let chassis = ChassisControllerBuilder::default()
///     .with_motors(left, right)
///     .with_gains(PidGains::new(0.002, 0.0, 0.0001), PidGains::new(0.004, 0.0, 0.0001))
///     .with_gearset(Gearset::Green.into())
///     .with_dimensions(ChassisScales::new(1127.0, 2.875)?)
///     .build()?;
///
/// chassis.move_distance(QLength::feet(2.0));
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ChassisControllerBuilder {
    motors: Option<DriveMotors>,
    sensors: Option<SensorPair>,
    gains: Option<ChassisGains>,
    gearset: Option<GearsetRatioPair>,
    scales: Option<ChassisScales>,
    max_velocity: Option<f64>,
    max_voltage: Option<f64>,
    settle: Option<SettleConfig<f64>>,
    derivative_filter: Option<f64>,
}

impl ChassisControllerBuilder {
    /// Uses a skid-steer drivetrain with one motor, or one [`MotorGroup`], per side.
    pub fn with_motors(mut self, left: Arc<dyn Motor>, right: Arc<dyn Motor>) -> Self {
        self.motors = Some(DriveMotors::SkidSteer { left, right });
        self
    }

    /// Uses an x-drive drivetrain.
    pub fn with_x_drive_motors(
        mut self,
        top_left: Arc<dyn Motor>,
        top_right: Arc<dyn Motor>,
        bottom_right: Arc<dyn Motor>,
        bottom_left: Arc<dyn Motor>,
    ) -> Self {
        self.motors = Some(DriveMotors::XDrive([
            top_left,
            top_right,
            bottom_right,
            bottom_left,
        ]));
        self
    }

    /// Reads external sensors instead of the motors' encoders.
    pub fn with_sensors(mut self, left: Arc<dyn RotarySensor>, right: Arc<dyn RotarySensor>) -> Self {
        self.sensors = Some((left, right));
        self
    }

    /// Closes the loop with PID, using the turn gains for the angle loop as well.
    pub fn with_gains(self, distance: PidGains<f64>, turn: PidGains<f64>) -> Self {
        self.with_all_gains(distance, turn, turn)
    }

    /// Closes the loop with PID, with separate gains for the loop keeping distance movements
    /// straight.
    pub fn with_all_gains(
        mut self,
        distance: PidGains<f64>,
        turn: PidGains<f64>,
        angle: PidGains<f64>,
    ) -> Self {
        self.gains = Some(ChassisGains {
            distance,
            turn,
            angle,
        });
        self
    }

    /// Sets the motor cartridge and external gear ratio.
    pub fn with_gearset(mut self, gearset: GearsetRatioPair) -> Self {
        self.gearset = Some(gearset);
        self
    }

    /// Sets the scales converting robot motion into motor degrees.
    pub fn with_dimensions(mut self, scales: ChassisScales) -> Self {
        self.scales = Some(scales);
        self
    }

    /// Sets the velocity commanded at full scale, overriding the cartridge's free speed.
    pub fn with_max_velocity(mut self, max_velocity: f64) -> Self {
        self.max_velocity = Some(max_velocity);
        self
    }

    /// Sets the voltage commanded at full scale.
    pub fn with_max_voltage(mut self, max_voltage: f64) -> Self {
        self.max_voltage = Some(max_voltage);
        self
    }

    /// Sets the settling criterion of every loop.
    pub fn with_settle_config(mut self, settle: SettleConfig<f64>) -> Self {
        self.settle = Some(settle);
        self
    }

    /// Low-pass filters the derivative term of every PID loop with time constant `filter_tc`.
    pub fn with_derivative_filter(mut self, filter_tc: f64) -> Self {
        self.derivative_filter = Some(filter_tc);
        self
    }

    fn gearset_pair(&self) -> GearsetRatioPair {
        self.gearset.unwrap_or_else(|| Gearset::default().into())
    }

    /// Builds the model and the motors driving each side.
    fn make_model(
        &mut self,
    ) -> Result<(Arc<dyn ChassisModel>, Arc<dyn Motor>, Arc<dyn Motor>), BuildError> {
        let Some(motors) = self.motors.take() else {
            error!("ChassisControllerBuilder: {}", BuildError::NoMotors);
            return Err(BuildError::NoMotors);
        };

        let max_velocity = self
            .max_velocity
            .unwrap_or_else(|| self.gearset_pair().internal_gearset.max_rpm());
        let max_voltage = self.max_voltage.unwrap_or(DEFAULT_MAX_VOLTAGE);
        let sensors = self.sensors.take();

        match motors {
            DriveMotors::SkidSteer { left, right } => {
                let (left_sensor, right_sensor) =
                    sensors.unwrap_or_else(|| (left.encoder(), right.encoder()));
                let model = SkidSteerModel::with_sensors(
                    Arc::clone(&left),
                    Arc::clone(&right),
                    left_sensor,
                    right_sensor,
                    max_velocity,
                    max_voltage,
                );
                Ok((Arc::new(model), left, right))
            }
            DriveMotors::XDrive(motors) => {
                let [top_left, top_right, bottom_right, bottom_left] = &motors;
                let (left_sensor, right_sensor) =
                    sensors.unwrap_or_else(|| (top_left.encoder(), top_right.encoder()));
                let left: Arc<dyn Motor> = Arc::new(MotorGroup::new(vec![
                    Arc::clone(top_left),
                    Arc::clone(bottom_left),
                ])?);
                let right: Arc<dyn Motor> = Arc::new(MotorGroup::new(vec![
                    Arc::clone(top_right),
                    Arc::clone(bottom_right),
                ])?);
                let model = XDriveModel::with_sensors(
                    motors,
                    left_sensor,
                    right_sensor,
                    max_velocity,
                    max_voltage,
                );
                Ok((Arc::new(model), left, right))
            }
        }
    }

    /// Builds the controller, using PID when gains were given and the motors' own position
    /// control otherwise. A PID controller is returned with its worker already running.
    ///
    /// # Errors
    /// - `NoMotors` if no motors were given.
    /// - `Chassis` if the gear ratio is zero or the scales are unusable.
    /// - `Config` if a loop configuration is invalid.
    pub fn build(self) -> Result<Box<dyn ChassisController>, BuildError> {
        if self.gains.is_some() {
            Ok(Box::new(self.build_pid()?))
        } else {
            Ok(Box::new(self.build_integrated()?))
        }
    }

    /// Builds a PID chassis controller and starts its worker.
    ///
    /// # Errors
    /// - `MissingGains` if no gains were given.
    /// - Otherwise the same as [`ChassisControllerBuilder::build`].
    pub fn build_pid(mut self) -> Result<ChassisControllerPid, BuildError> {
        let Some(gains) = self.gains else {
            error!("ChassisControllerBuilder: {}", BuildError::MissingGains);
            return Err(BuildError::MissingGains);
        };
        let (model, _, _) = self.make_model()?;

        let make = |gains| pid_from(gains, self.settle, self.derivative_filter);
        let mut controller = ChassisControllerPid::new(
            model,
            make(gains.distance)?,
            make(gains.angle)?,
            make(gains.turn)?,
            self.gearset_pair(),
            self.scales.unwrap_or(ChassisScales {
                straight: 1.0,
                turn: 1.0,
            }),
        )?;
        controller.start_thread();
        info!("ChassisControllerBuilder: built a PID chassis controller");
        Ok(controller)
    }

    /// Builds a chassis controller driven by the motors' own position control.
    ///
    /// # Errors
    /// The same as [`ChassisControllerBuilder::build`].
    pub fn build_integrated(mut self) -> Result<ChassisControllerIntegrated, BuildError> {
        let (model, left, right) = self.make_model()?;
        let controller = ChassisControllerIntegrated::new(
            model,
            left,
            right,
            self.gearset_pair(),
            self.scales.unwrap_or(ChassisScales {
                straight: 1.0,
                turn: 1.0,
            }),
            self.settle.unwrap_or_default(),
        )?;
        info!("ChassisControllerBuilder: built an integrated chassis controller");
        Ok(controller)
    }
}

/// Builds a single-axis position controller, for example for a lift or an arm.
///
/// Without gains the motor's own position control is used. The cartridge defaults to the one
/// reported by the motor and the sensor to the motor's encoder.
#[derive(Default)]
pub struct AsyncPosControllerBuilder {
    motor: Option<Arc<dyn Motor>>,
    sensor: Option<Arc<dyn RotarySensor>>,
    gains: Option<PidGains<f64>>,
    gearset: Option<GearsetRatioPair>,
    max_velocity: Option<f64>,
    settle: Option<SettleConfig<f64>>,
    derivative_filter: Option<f64>,
}

impl AsyncPosControllerBuilder {
    /// Sets the motor, or [`MotorGroup`], to control.
    pub fn with_motor(mut self, motor: Arc<dyn Motor>) -> Self {
        self.motor = Some(motor);
        self
    }

    /// Reads an external sensor instead of the motor's encoder.
    pub fn with_sensor(mut self, sensor: Arc<dyn RotarySensor>) -> Self {
        self.sensor = Some(sensor);
        self
    }

    /// Closes the loop with PID.
    pub fn with_gains(mut self, gains: PidGains<f64>) -> Self {
        self.gains = Some(gains);
        self
    }

    /// Sets the motor cartridge and external gear ratio.
    pub fn with_gearset(mut self, gearset: GearsetRatioPair) -> Self {
        self.gearset = Some(gearset);
        self
    }

    /// Sets the velocity commanded at full scale, overriding the cartridge's free speed.
    pub fn with_max_velocity(mut self, max_velocity: f64) -> Self {
        self.max_velocity = Some(max_velocity);
        self
    }

    /// Sets the settling criterion.
    pub fn with_settle_config(mut self, settle: SettleConfig<f64>) -> Self {
        self.settle = Some(settle);
        self
    }

    /// Low-pass filters the derivative term with time constant `filter_tc`.
    pub fn with_derivative_filter(mut self, filter_tc: f64) -> Self {
        self.derivative_filter = Some(filter_tc);
        self
    }

    /// Builds the controller. A PID controller is returned with its worker already running.
    ///
    /// # Errors
    /// - `NoMotors` if no motor was given.
    /// - `Config` if the loop configuration is invalid.
    pub fn build(self) -> Result<Box<dyn AsyncPositionController>, BuildError> {
        let Some(motor) = self.motor else {
            error!("AsyncPosControllerBuilder: {}", BuildError::NoMotors);
            return Err(BuildError::NoMotors);
        };

        let pair = self.gearset.unwrap_or_else(|| motor.gearing().into());
        let max_velocity = self
            .max_velocity
            .unwrap_or_else(|| pair.internal_gearset.max_rpm());

        match self.gains {
            Some(gains) => {
                if let Err(err) = motor.set_gearing(pair.internal_gearset) {
                    warn!("AsyncPosControllerBuilder: could not set gearing: {err}");
                }
                let sensor = self.sensor.unwrap_or_else(|| motor.encoder());
                let pid = pid_from(gains, self.settle, self.derivative_filter)?;
                let mut controller =
                    AsyncPosPidController::new(motor, sensor, pid, pair.ratio, max_velocity);
                controller.start_thread();
                Ok(Box::new(controller))
            }
            None => Ok(Box::new(AsyncPosIntegratedController::new(
                motor,
                pair,
                max_velocity,
                self.settle.unwrap_or_default(),
            ))),
        }
    }
}
