// Simulated smart motors for closing loops without hardware
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

use core::time::Duration;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use nalgebra as na;

use crate::device::{BrakeMode, DeviceError, EncoderUnits, Gearset, Motor, RotarySensor};
use crate::sync::lock;

/// Integration step of the plant.
const SUBSTEP: f64 = 1e-3;

/// Proportional gain of the simulated on-board position loop, in 1/s.
const POSITION_GAIN: f64 = 10.0;

/// Full-scale voltage of a smart motor, in millivolts.
const MAX_VOLTAGE: f64 = 12000.0;

#[derive(Copy, Clone, Debug, PartialEq)]
enum Command {
    /// Velocity setpoint in degrees per second.
    Velocity(f64),
    /// Absolute target in degrees, approached at up to the given degrees per second.
    Absolute { target: f64, velocity: f64 },
}

/// A DC motor with an ideal inner velocity loop, behaving as a first-order lag from velocity
/// setpoint to shaft velocity.
///
/// ```text
/// ┌     ┐   ┌           ┐┌    ┐   ┌     ┐
/// │ p'  │ = │  0   1    ││ p  │ + │ 0   │ u
/// │ p'' │   │  0   -1/τ ││ p' │   │ 1/τ │
/// └     ┘   └           ┘└    ┘   └     ┘
/// ```
#[derive(Clone, Debug)]
pub struct DcMotorPlant {
    /// Time constant τ of the velocity response, in seconds.
    pub time_constant: f64,
    state: na::Vector2<f64>,
}

impl DcMotorPlant {
    /// A plant at rest at position zero.
    pub fn new(time_constant: f64) -> Self {
        Self {
            time_constant,
            state: na::Vector2::zeros(),
        }
    }

    /// State derivative under velocity setpoint `u`.
    pub fn f(&self, x: na::Vector2<f64>, u: f64) -> na::Vector2<f64> {
        let inv_tau = self.time_constant.recip();
        let mat_a = na::Matrix2::new(0.0, 1.0, 0.0, -inv_tau);
        let mat_b = na::Vector2::new(0.0, inv_tau);
        mat_a * x + mat_b * u
    }

    /// Advances the plant by `dt` seconds with a forward Euler step.
    pub fn integrate(&mut self, u: f64, dt: f64) {
        self.state += self.f(self.state, u) * dt;
    }

    /// Shaft position in degrees.
    pub fn position(&self) -> f64 {
        self.state[0]
    }

    /// Shaft velocity in degrees per second.
    pub fn velocity(&self) -> f64 {
        self.state[1]
    }
}

struct SimState {
    plant: DcMotorPlant,
    command: Command,
    last_update: Instant,
    zero: f64,
    gearset: Gearset,
    units: EncoderUnits,
    brake_mode: BrakeMode,
    connected: bool,
}

impl SimState {
    fn setpoint(&self) -> f64 {
        match self.command {
            Command::Velocity(velocity) => velocity,
            Command::Absolute { target, velocity } => {
                let error = target - (self.plant.position() - self.zero);
                num_traits::clamp(POSITION_GAIN * error, -velocity, velocity)
            }
        }
    }

    /// Catches the plant up to `now` in fixed substeps.
    fn advance(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        let steps = (elapsed / SUBSTEP).floor() as u64;
        for _ in 0..steps {
            let u = self.setpoint();
            self.plant.integrate(u, SUBSTEP);
        }
        self.last_update += Duration::from_secs_f64(steps as f64 * SUBSTEP);
    }

    fn check(&mut self) -> Result<(), DeviceError> {
        if !self.connected {
            return Err(DeviceError::Disconnected);
        }
        self.advance(Instant::now());
        Ok(())
    }

    fn degrees_per_unit(&self) -> f64 {
        match self.units {
            EncoderUnits::Degrees => 1.0,
            EncoderUnits::Rotations => 360.0,
            EncoderUnits::Counts => {
                let counts_per_rev = match self.gearset {
                    Gearset::Red => 1800.0,
                    Gearset::Green => 900.0,
                    Gearset::Blue => 300.0,
                };
                360.0 / counts_per_rev
            }
        }
    }

    fn max_speed(&self) -> f64 {
        // RPM to degrees per second
        self.gearset.max_rpm() * 6.0
    }

    fn rpm_to_setpoint(&self, rpm: i16) -> f64 {
        num_traits::clamp(f64::from(rpm) * 6.0, -self.max_speed(), self.max_speed())
    }
}

/// A simulated smart motor with an integrated encoder, evolving in real time.
///
/// The plant is integrated lazily up to the current instant whenever the motor or its encoder
/// is accessed. Clones share the same plant.
#[derive(Clone)]
pub struct SimMotor {
    state: Arc<Mutex<SimState>>,
}

impl SimMotor {
    /// A motor at rest at position zero, reporting degrees.
    pub fn new(gearset: Gearset, time_constant: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                plant: DcMotorPlant::new(time_constant),
                command: Command::Velocity(0.0),
                last_update: Instant::now(),
                zero: 0.0,
                gearset,
                units: EncoderUnits::Degrees,
                brake_mode: BrakeMode::Coast,
                connected: true,
            })),
        }
    }

    /// Simulates unplugging (`false`) or replugging (`true`) the motor.
    pub fn set_connected(&self, connected: bool) {
        lock(&self.state).connected = connected;
    }

    /// Current shaft velocity in RPM.
    pub fn actual_velocity(&self) -> f64 {
        let mut state = lock(&self.state);
        state.advance(Instant::now());
        state.plant.velocity() / 6.0
    }

    /// The configured brake mode.
    pub fn brake_mode(&self) -> BrakeMode {
        lock(&self.state).brake_mode
    }
}

impl Motor for SimMotor {
    fn move_velocity(&self, velocity: i16) -> Result<(), DeviceError> {
        let mut state = lock(&self.state);
        state.check()?;
        state.command = Command::Velocity(state.rpm_to_setpoint(velocity));
        Ok(())
    }

    fn move_voltage(&self, voltage: i16) -> Result<(), DeviceError> {
        let mut state = lock(&self.state);
        state.check()?;
        let fraction = num_traits::clamp(f64::from(voltage) / MAX_VOLTAGE, -1.0, 1.0);
        state.command = Command::Velocity(fraction * state.max_speed());
        Ok(())
    }

    fn move_absolute(&self, position: f64, velocity: i16) -> Result<(), DeviceError> {
        let mut state = lock(&self.state);
        state.check()?;
        let target = position * state.degrees_per_unit();
        let velocity = state.rpm_to_setpoint(velocity).abs();
        state.command = Command::Absolute { target, velocity };
        Ok(())
    }

    fn target_position(&self) -> Result<f64, DeviceError> {
        let mut state = lock(&self.state);
        state.check()?;
        let target = match state.command {
            Command::Absolute { target, .. } => target,
            Command::Velocity(_) => state.plant.position() - state.zero,
        };
        Ok(target / state.degrees_per_unit())
    }

    fn position(&self) -> Result<f64, DeviceError> {
        let mut state = lock(&self.state);
        state.check()?;
        Ok((state.plant.position() - state.zero) / state.degrees_per_unit())
    }

    fn tare_position(&self) -> Result<(), DeviceError> {
        let mut state = lock(&self.state);
        state.check()?;
        state.zero = state.plant.position();
        if let Command::Absolute { velocity, .. } = state.command {
            state.command = Command::Absolute {
                target: 0.0,
                velocity,
            };
        }
        Ok(())
    }

    fn set_brake_mode(&self, mode: BrakeMode) -> Result<(), DeviceError> {
        let mut state = lock(&self.state);
        state.check()?;
        state.brake_mode = mode;
        Ok(())
    }

    fn set_encoder_units(&self, units: EncoderUnits) -> Result<(), DeviceError> {
        let mut state = lock(&self.state);
        state.check()?;
        state.units = units;
        Ok(())
    }

    fn set_gearing(&self, gearset: Gearset) -> Result<(), DeviceError> {
        let mut state = lock(&self.state);
        state.check()?;
        state.gearset = gearset;
        Ok(())
    }

    fn gearing(&self) -> Gearset {
        lock(&self.state).gearset
    }

    fn encoder(&self) -> Arc<dyn RotarySensor> {
        Arc::new(self.clone())
    }
}

impl RotarySensor for SimMotor {
    fn get(&self) -> Result<f64, DeviceError> {
        self.position()
    }

    fn reset(&self) -> Result<(), DeviceError> {
        self.tare_position()
    }
}
