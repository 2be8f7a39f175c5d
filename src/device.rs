// Actuator and sensor capabilities the controllers are written against
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

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Failure reported by a motor or sensor.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// The device did not answer.
    #[error("device is disconnected")]
    Disconnected,
    /// A motor group was built without any motors.
    #[error("a motor group needs at least one motor")]
    EmptyGroup,
    /// Any other device-specific failure.
    #[error("device fault: {0}")]
    Fault(String),
}

/// Internal cartridge of a smart motor, identified by its free speed in RPM.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Gearset {
    /// 100 RPM.
    #[default]
    Red,
    /// 200 RPM.
    Green,
    /// 600 RPM.
    Blue,
}

impl Gearset {
    /// Free speed of the cartridge in RPM, also the largest meaningful velocity command.
    pub fn max_rpm(self) -> f64 {
        match self {
            Gearset::Red => 100.0,
            Gearset::Green => 200.0,
            Gearset::Blue => 600.0,
        }
    }
}

/// A motor cartridge together with the external gear ratio between the motor and the wheel.
///
/// The ratio multiplies every wheel-space target into motor-shaft degrees, so it must not be
/// zero; controllers refuse to be constructed with a zero ratio.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GearsetRatioPair {
    /// The cartridge inside the motor.
    pub internal_gearset: Gearset,
    /// Motor turns per wheel turn.
    pub ratio: f64,
}

impl GearsetRatioPair {
    /// Pairs a cartridge with an external ratio.
    pub fn new(internal_gearset: Gearset, ratio: f64) -> Self {
        Self {
            internal_gearset,
            ratio,
        }
    }
}

impl From<Gearset> for GearsetRatioPair {
    fn from(gearset: Gearset) -> Self {
        Self::new(gearset, 1.0)
    }
}

/// Behaviour of a motor when commanded to zero.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BrakeMode {
    /// Let the motor spin down freely.
    Coast,
    /// Short the windings.
    Brake,
    /// Actively hold position.
    Hold,
}

/// Units the motor reports its position in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EncoderUnits {
    /// Degrees of the motor shaft.
    Degrees,
    /// Full rotations of the motor shaft.
    Rotations,
    /// Raw encoder ticks.
    Counts,
}

/// A continuous position sensor, such as a motor's integrated encoder or a quadrature encoder.
pub trait RotarySensor: Send + Sync {
    /// Current position.
    fn get(&self) -> Result<f64, DeviceError>;

    /// Zeroes the position.
    fn reset(&self) -> Result<(), DeviceError>;
}

/// A velocity/voltage-controlled motor with position feedback.
///
/// Implementations are handles to hardware and use interior mutability, so every command
/// takes `&self`.
pub trait Motor: Send + Sync {
    /// Runs the motor at `velocity` RPM.
    fn move_velocity(&self, velocity: i16) -> Result<(), DeviceError>;

    /// Applies `voltage` millivolts.
    fn move_voltage(&self, voltage: i16) -> Result<(), DeviceError>;

    /// Drives to `position` encoder units using the motor's own position loop, at up to
    /// `velocity` RPM.
    fn move_absolute(&self, position: f64, velocity: i16) -> Result<(), DeviceError>;

    /// Target of the motor's own position loop.
    fn target_position(&self) -> Result<f64, DeviceError>;

    /// Current position in the configured encoder units.
    fn position(&self) -> Result<f64, DeviceError>;

    /// Zeroes the position and the position target.
    fn tare_position(&self) -> Result<(), DeviceError>;

    /// Sets the behaviour when stopped.
    fn set_brake_mode(&self, mode: BrakeMode) -> Result<(), DeviceError>;

    /// Sets the units positions are reported in.
    fn set_encoder_units(&self, units: EncoderUnits) -> Result<(), DeviceError>;

    /// Sets the cartridge the motor is fitted with.
    fn set_gearing(&self, gearset: Gearset) -> Result<(), DeviceError>;

    /// Returns the cartridge the motor is fitted with.
    fn gearing(&self) -> Gearset;

    /// Returns a sensor reading this motor's integrated encoder.
    fn encoder(&self) -> Arc<dyn RotarySensor>;
}

/// Several motors driven as one, such as all motors on one side of a drivetrain.
///
/// Commands go to every motor, even if an earlier one fails, and the first failure is reported.
/// Readings come from the first motor.
pub struct MotorGroup {
    motors: Vec<Arc<dyn Motor>>,
}

impl MotorGroup {
    /// Groups `motors`.
    ///
    /// # Errors
    /// - `EmptyGroup` if `motors` is empty.
    pub fn new(motors: Vec<Arc<dyn Motor>>) -> Result<Self, DeviceError> {
        if motors.is_empty() {
            return Err(DeviceError::EmptyGroup);
        }
        Ok(Self { motors })
    }

    fn lead(&self) -> &Arc<dyn Motor> {
        // Non-empty by construction
        &self.motors[0]
    }

    fn for_each<C>(&self, command: C) -> Result<(), DeviceError>
    where
        C: Fn(&dyn Motor) -> Result<(), DeviceError>,
    {
        self.motors
            .iter()
            .map(|motor| command(motor.as_ref()))
            .fold(Ok(()), |acc, result| acc.and(result))
    }
}

impl Motor for MotorGroup {
    fn move_velocity(&self, velocity: i16) -> Result<(), DeviceError> {
        self.for_each(|motor| motor.move_velocity(velocity))
    }

    fn move_voltage(&self, voltage: i16) -> Result<(), DeviceError> {
        self.for_each(|motor| motor.move_voltage(voltage))
    }

    fn move_absolute(&self, position: f64, velocity: i16) -> Result<(), DeviceError> {
        self.for_each(|motor| motor.move_absolute(position, velocity))
    }

    fn target_position(&self) -> Result<f64, DeviceError> {
        self.lead().target_position()
    }

    fn position(&self) -> Result<f64, DeviceError> {
        self.lead().position()
    }

    fn tare_position(&self) -> Result<(), DeviceError> {
        self.for_each(|motor| motor.tare_position())
    }

    fn set_brake_mode(&self, mode: BrakeMode) -> Result<(), DeviceError> {
        self.for_each(|motor| motor.set_brake_mode(mode))
    }

    fn set_encoder_units(&self, units: EncoderUnits) -> Result<(), DeviceError> {
        self.for_each(|motor| motor.set_encoder_units(units))
    }

    fn set_gearing(&self, gearset: Gearset) -> Result<(), DeviceError> {
        self.for_each(|motor| motor.set_gearing(gearset))
    }

    fn gearing(&self) -> Gearset {
        self.lead().gearing()
    }

    fn encoder(&self) -> Arc<dyn RotarySensor> {
        self.lead().encoder()
    }
}
