// Chassis models dispatching mixed drive commands to the motors
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

use core::ops::Sub;
use std::sync::Arc;

use crate::device::{BrakeMode, DeviceError, EncoderUnits, Gearset, Motor, RotarySensor};
use crate::mixer;

/// Raw encoder counts of the left and right side, sampled together.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EncoderSnapshot {
    /// Left side count.
    pub left: i32,
    /// Right side count.
    pub right: i32,
}

impl EncoderSnapshot {
    /// Mean travel of both sides.
    pub fn distance(self) -> f64 {
        (f64::from(self.left) + f64::from(self.right)) / 2.0
    }

    /// Difference in travel between the sides, positive when turning right.
    pub fn angle(self) -> f64 {
        f64::from(self.left) - f64::from(self.right)
    }
}

impl Sub for EncoderSnapshot {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        EncoderSnapshot {
            left: self.left.wrapping_sub(rhs.left),
            right: self.right.wrapping_sub(rhs.right),
        }
    }
}

/// The drivetrain as seen by a chassis controller.
///
/// Every speed argument is normalized to [-1, 1]; models clamp their inputs and scale them by
/// their maximum velocity (RPM) or maximum voltage (millivolts).
pub trait ChassisModel: Send + Sync {
    /// Drives both sides forward at `speed`.
    fn forward(&self, speed: f64) -> Result<(), DeviceError>;

    /// Drives with a forward speed and a yaw rate using velocity control.
    fn drive_vector(&self, forward_speed: f64, yaw: f64) -> Result<(), DeviceError>;

    /// Drives with a forward speed and a yaw rate using voltage control.
    fn drive_vector_voltage(&self, forward_speed: f64, yaw: f64) -> Result<(), DeviceError>;

    /// Turns in place, positive speeds turn right.
    fn rotate(&self, speed: f64) -> Result<(), DeviceError>;

    /// Commands zero velocity to every motor.
    fn stop(&self) -> Result<(), DeviceError>;

    /// Tank drive with a deadband, using voltage control.
    fn tank(&self, left_speed: f64, right_speed: f64, threshold: f64) -> Result<(), DeviceError>;

    /// Arcade drive with a deadband, using voltage control.
    fn arcade(&self, forward_speed: f64, yaw: f64, threshold: f64) -> Result<(), DeviceError>;

    /// Drives the left side alone.
    fn left(&self, speed: f64) -> Result<(), DeviceError>;

    /// Drives the right side alone.
    fn right(&self, speed: f64) -> Result<(), DeviceError>;

    /// Reads both side sensors.
    fn sensor_vals(&self) -> Result<EncoderSnapshot, DeviceError>;

    /// Zeroes both side sensors.
    fn reset_sensors(&self) -> Result<(), DeviceError>;

    /// Sets the brake mode of every motor.
    fn set_brake_mode(&self, mode: BrakeMode) -> Result<(), DeviceError>;

    /// Sets the encoder units of every motor.
    fn set_encoder_units(&self, units: EncoderUnits) -> Result<(), DeviceError>;

    /// Sets the cartridge of every motor.
    fn set_gearing(&self, gearset: Gearset) -> Result<(), DeviceError>;

    /// Velocity commanded at full scale.
    fn max_velocity(&self) -> f64;

    /// Voltage commanded at full scale.
    fn max_voltage(&self) -> f64;
}

fn scaled(speed: f64, max: f64) -> i16 {
    (mixer::normalize(speed) * max) as i16
}

fn read_pair(
    left: &dyn RotarySensor,
    right: &dyn RotarySensor,
) -> Result<EncoderSnapshot, DeviceError> {
    Ok(EncoderSnapshot {
        left: left.get()? as i32,
        right: right.get()? as i32,
    })
}

/// A differential drivetrain with one motor (or motor group) per side.
pub struct SkidSteerModel {
    left_motor: Arc<dyn Motor>,
    right_motor: Arc<dyn Motor>,
    left_sensor: Arc<dyn RotarySensor>,
    right_sensor: Arc<dyn RotarySensor>,
    max_velocity: f64,
    max_voltage: f64,
}

impl SkidSteerModel {
    /// A model reading the motors' integrated encoders.
    pub fn new(
        left_motor: Arc<dyn Motor>,
        right_motor: Arc<dyn Motor>,
        max_velocity: f64,
        max_voltage: f64,
    ) -> Self {
        let left_sensor = left_motor.encoder();
        let right_sensor = right_motor.encoder();
        Self::with_sensors(
            left_motor,
            right_motor,
            left_sensor,
            right_sensor,
            max_velocity,
            max_voltage,
        )
    }

    /// A model reading external sensors.
    pub fn with_sensors(
        left_motor: Arc<dyn Motor>,
        right_motor: Arc<dyn Motor>,
        left_sensor: Arc<dyn RotarySensor>,
        right_sensor: Arc<dyn RotarySensor>,
        max_velocity: f64,
        max_voltage: f64,
    ) -> Self {
        Self {
            left_motor,
            right_motor,
            left_sensor,
            right_sensor,
            max_velocity,
            max_voltage,
        }
    }

    /// The left side motor.
    pub fn left_side_motor(&self) -> &Arc<dyn Motor> {
        &self.left_motor
    }

    /// The right side motor.
    pub fn right_side_motor(&self) -> &Arc<dyn Motor> {
        &self.right_motor
    }

    fn velocities(&self, left: f64, right: f64) -> Result<(), DeviceError> {
        let l = self
            .left_motor
            .move_velocity(scaled(left, self.max_velocity));
        let r = self
            .right_motor
            .move_velocity(scaled(right, self.max_velocity));
        l.and(r)
    }

    fn voltages(&self, left: f64, right: f64) -> Result<(), DeviceError> {
        let l = self.left_motor.move_voltage(scaled(left, self.max_voltage));
        let r = self.right_motor.move_voltage(scaled(right, self.max_voltage));
        l.and(r)
    }

    fn both<C>(&self, command: C) -> Result<(), DeviceError>
    where
        C: Fn(&dyn Motor) -> Result<(), DeviceError>,
    {
        let l = command(self.left_motor.as_ref());
        let r = command(self.right_motor.as_ref());
        l.and(r)
    }
}

impl ChassisModel for SkidSteerModel {
    fn forward(&self, speed: f64) -> Result<(), DeviceError> {
        self.velocities(speed, speed)
    }

    fn drive_vector(&self, forward_speed: f64, yaw: f64) -> Result<(), DeviceError> {
        let (left, right) = mixer::drive_vector(forward_speed, yaw);
        self.velocities(left, right)
    }

    fn drive_vector_voltage(&self, forward_speed: f64, yaw: f64) -> Result<(), DeviceError> {
        let (left, right) = mixer::drive_vector(forward_speed, yaw);
        self.voltages(left, right)
    }

    fn rotate(&self, speed: f64) -> Result<(), DeviceError> {
        let speed = mixer::normalize(speed);
        self.velocities(speed, -speed)
    }

    fn stop(&self) -> Result<(), DeviceError> {
        self.both(|motor| motor.move_velocity(0))
    }

    fn tank(&self, left_speed: f64, right_speed: f64, threshold: f64) -> Result<(), DeviceError> {
        let (left, right) = mixer::tank(left_speed, right_speed, threshold);
        self.voltages(left, right)
    }

    fn arcade(&self, forward_speed: f64, yaw: f64, threshold: f64) -> Result<(), DeviceError> {
        let (left, right) = mixer::arcade(forward_speed, yaw, threshold);
        self.voltages(left, right)
    }

    fn left(&self, speed: f64) -> Result<(), DeviceError> {
        self.left_motor
            .move_velocity(scaled(speed, self.max_velocity))
    }

    fn right(&self, speed: f64) -> Result<(), DeviceError> {
        self.right_motor
            .move_velocity(scaled(speed, self.max_velocity))
    }

    fn sensor_vals(&self) -> Result<EncoderSnapshot, DeviceError> {
        read_pair(self.left_sensor.as_ref(), self.right_sensor.as_ref())
    }

    fn reset_sensors(&self) -> Result<(), DeviceError> {
        let l = self.left_sensor.reset();
        let r = self.right_sensor.reset();
        l.and(r)
    }

    fn set_brake_mode(&self, mode: BrakeMode) -> Result<(), DeviceError> {
        self.both(|motor| motor.set_brake_mode(mode))
    }

    fn set_encoder_units(&self, units: EncoderUnits) -> Result<(), DeviceError> {
        self.both(|motor| motor.set_encoder_units(units))
    }

    fn set_gearing(&self, gearset: Gearset) -> Result<(), DeviceError> {
        self.both(|motor| motor.set_gearing(gearset))
    }

    fn max_velocity(&self) -> f64 {
        self.max_velocity
    }

    fn max_voltage(&self) -> f64 {
        self.max_voltage
    }
}

/// A holonomic drivetrain with four omni wheels mounted at 45 degrees.
///
/// For differential commands the bottom motors mirror the top motor on the same side. The left
/// and right sensors default to the top left and top right motors' encoders.
pub struct XDriveModel {
    top_left: Arc<dyn Motor>,
    top_right: Arc<dyn Motor>,
    bottom_right: Arc<dyn Motor>,
    bottom_left: Arc<dyn Motor>,
    left_sensor: Arc<dyn RotarySensor>,
    right_sensor: Arc<dyn RotarySensor>,
    max_velocity: f64,
    max_voltage: f64,
}

impl XDriveModel {
    /// A model reading the top motors' integrated encoders.
    pub fn new(
        top_left: Arc<dyn Motor>,
        top_right: Arc<dyn Motor>,
        bottom_right: Arc<dyn Motor>,
        bottom_left: Arc<dyn Motor>,
        max_velocity: f64,
        max_voltage: f64,
    ) -> Self {
        let left_sensor = top_left.encoder();
        let right_sensor = top_right.encoder();
        Self::with_sensors(
            [top_left, top_right, bottom_right, bottom_left],
            left_sensor,
            right_sensor,
            max_velocity,
            max_voltage,
        )
    }

    /// A model reading external sensors. Motors are given as
    /// `[top_left, top_right, bottom_right, bottom_left]`.
    pub fn with_sensors(
        motors: [Arc<dyn Motor>; 4],
        left_sensor: Arc<dyn RotarySensor>,
        right_sensor: Arc<dyn RotarySensor>,
        max_velocity: f64,
        max_voltage: f64,
    ) -> Self {
        let [top_left, top_right, bottom_right, bottom_left] = motors;
        Self {
            top_left,
            top_right,
            bottom_right,
            bottom_left,
            left_sensor,
            right_sensor,
            max_velocity,
            max_voltage,
        }
    }

    /// Slides sideways, positive speeds move right.
    pub fn strafe(&self, speed: f64) -> Result<(), DeviceError> {
        let speed = mixer::normalize(speed);
        self.wheel_velocities((speed, -speed, speed, -speed))
    }

    /// Holonomic joystick drive with a deadband, using voltage control.
    pub fn x_arcade(
        &self,
        right_speed: f64,
        forward_speed: f64,
        yaw: f64,
        threshold: f64,
    ) -> Result<(), DeviceError> {
        let (tl, tr, br, bl) = mixer::x_arcade(right_speed, forward_speed, yaw, threshold);
        let v = |speed| scaled(speed, self.max_voltage);
        let results = [
            self.top_left.move_voltage(v(tl)),
            self.top_right.move_voltage(v(tr)),
            self.bottom_right.move_voltage(v(br)),
            self.bottom_left.move_voltage(v(bl)),
        ];
        results.into_iter().collect()
    }

    fn wheel_velocities(&self, speeds: mixer::XDriveOutputs) -> Result<(), DeviceError> {
        let (tl, tr, br, bl) = speeds;
        let v = |speed| scaled(speed, self.max_velocity);
        let results = [
            self.top_left.move_velocity(v(tl)),
            self.top_right.move_velocity(v(tr)),
            self.bottom_right.move_velocity(v(br)),
            self.bottom_left.move_velocity(v(bl)),
        ];
        results.into_iter().collect()
    }

    fn sides(&self, left: f64, right: f64, voltage: bool) -> Result<(), DeviceError> {
        if voltage {
            let v = |speed| scaled(speed, self.max_voltage);
            let results = [
                self.top_left.move_voltage(v(left)),
                self.top_right.move_voltage(v(right)),
                self.bottom_right.move_voltage(v(right)),
                self.bottom_left.move_voltage(v(left)),
            ];
            results.into_iter().collect()
        } else {
            self.wheel_velocities((left, right, right, left))
        }
    }

    fn all<C>(&self, command: C) -> Result<(), DeviceError>
    where
        C: Fn(&dyn Motor) -> Result<(), DeviceError>,
    {
        [
            &self.top_left,
            &self.top_right,
            &self.bottom_right,
            &self.bottom_left,
        ]
        .into_iter()
        .map(|motor| command(motor.as_ref()))
        .fold(Ok(()), |acc, result| acc.and(result))
    }
}

impl ChassisModel for XDriveModel {
    fn forward(&self, speed: f64) -> Result<(), DeviceError> {
        self.sides(speed, speed, false)
    }

    fn drive_vector(&self, forward_speed: f64, yaw: f64) -> Result<(), DeviceError> {
        let (left, right) = mixer::drive_vector(forward_speed, yaw);
        self.sides(left, right, false)
    }

    fn drive_vector_voltage(&self, forward_speed: f64, yaw: f64) -> Result<(), DeviceError> {
        let (left, right) = mixer::drive_vector(forward_speed, yaw);
        self.sides(left, right, true)
    }

    fn rotate(&self, speed: f64) -> Result<(), DeviceError> {
        let speed = mixer::normalize(speed);
        self.sides(speed, -speed, false)
    }

    fn stop(&self) -> Result<(), DeviceError> {
        self.all(|motor| motor.move_velocity(0))
    }

    fn tank(&self, left_speed: f64, right_speed: f64, threshold: f64) -> Result<(), DeviceError> {
        let (left, right) = mixer::tank(left_speed, right_speed, threshold);
        self.sides(left, right, true)
    }

    fn arcade(&self, forward_speed: f64, yaw: f64, threshold: f64) -> Result<(), DeviceError> {
        let (left, right) = mixer::arcade(forward_speed, yaw, threshold);
        self.sides(left, right, true)
    }

    fn left(&self, speed: f64) -> Result<(), DeviceError> {
        let velocity = scaled(speed, self.max_velocity);
        let top = self.top_left.move_velocity(velocity);
        let bottom = self.bottom_left.move_velocity(velocity);
        top.and(bottom)
    }

    fn right(&self, speed: f64) -> Result<(), DeviceError> {
        let velocity = scaled(speed, self.max_velocity);
        let top = self.top_right.move_velocity(velocity);
        let bottom = self.bottom_right.move_velocity(velocity);
        top.and(bottom)
    }

    fn sensor_vals(&self) -> Result<EncoderSnapshot, DeviceError> {
        read_pair(self.left_sensor.as_ref(), self.right_sensor.as_ref())
    }

    fn reset_sensors(&self) -> Result<(), DeviceError> {
        let l = self.left_sensor.reset();
        let r = self.right_sensor.reset();
        l.and(r)
    }

    fn set_brake_mode(&self, mode: BrakeMode) -> Result<(), DeviceError> {
        self.all(|motor| motor.set_brake_mode(mode))
    }

    fn set_encoder_units(&self, units: EncoderUnits) -> Result<(), DeviceError> {
        self.all(|motor| motor.set_encoder_units(units))
    }

    fn set_gearing(&self, gearset: Gearset) -> Result<(), DeviceError> {
        self.all(|motor| motor.set_gearing(gearset))
    }

    fn max_velocity(&self) -> f64 {
        self.max_velocity
    }

    fn max_voltage(&self) -> f64 {
        self.max_voltage
    }
}
