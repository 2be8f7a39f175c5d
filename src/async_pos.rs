// Single-axis position controllers running on their own background thread
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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use log::{debug, error, info, warn};

use crate::device::{GearsetRatioPair, Motor, RotarySensor};
use crate::pid::{IterativePid, SettleConfig, SettledUtil};
use crate::sync::lock;
use crate::time::{Rate, StdInstant};

/// Period of the settle polling loops.
pub(crate) const POLL_PERIOD: Duration = Duration::from_millis(10);

/// A position controller that drives its actuator autonomously once given a target.
pub trait AsyncPositionController: Send + Sync {
    /// Starts a new movement to `target`, in output-shaft units.
    fn set_target(&self, target: f64);

    /// The target of the current movement, in motor units.
    fn target(&self) -> f64;

    /// The last error, in motor units.
    fn error(&self) -> f64;

    /// Whether the movement is complete.
    fn is_settled(&self) -> bool;

    /// Blocks the calling thread until `is_settled` holds.
    fn wait_until_settled(&self) {
        let mut rate = Rate::new();
        while !self.is_settled() {
            rate.delay_until(POLL_PERIOD);
        }
    }

    /// Clears the control history, keeping the configuration.
    fn reset(&self);

    /// Disables (`true`) or enables (`false`) the controller. Disabling stops the actuator.
    fn flip_disable(&self, disabled: bool);

    /// Whether the controller is disabled.
    fn is_disabled(&self) -> bool;

    /// Disables the controller and stops the actuator.
    fn stop(&self) {
        self.flip_disable(true);
    }

    /// Zeroes the actuator position.
    fn tare_position(&self);
}

type Pid = IterativePid<StdInstant, f64>;

struct PidShared {
    pid: Mutex<Pid>,
    motor: Arc<dyn Motor>,
    sensor: Arc<dyn RotarySensor>,
    max_velocity: f64,
    // Written by the caller when a movement is armed, cleared by the worker once it re-zeroed.
    new_movement: AtomicBool,
    // Written once by the owner on drop, read by the worker.
    dtor_called: AtomicBool,
}

impl PidShared {
    fn run(&self) {
        info!("AsyncPosPidController: worker started");
        let sample_time = lock(&self.pid).config().sample_time();
        let mut rate = Rate::new();
        let mut reference = 0.0;
        let mut now = StdInstant::now();

        while !self.dtor_called.load(Ordering::Acquire) {
            self.tick(&mut reference, now);
            now = StdInstant(rate.delay_until(sample_time));
        }
        info!("AsyncPosPidController: worker stopped");
    }

    fn tick(&self, reference: &mut f64, now: StdInstant) {
        let mut pid = lock(&self.pid);

        if self.new_movement.load(Ordering::Acquire) {
            match self.sensor.get() {
                Ok(position) => {
                    *reference = position;
                    self.new_movement.store(false, Ordering::Release);
                    debug!("AsyncPosPidController: new reference {position}");
                }
                Err(err) => {
                    warn!("AsyncPosPidController: could not sample reference: {err}");
                    return;
                }
            }
        }

        if pid.is_disabled() {
            return;
        }

        let reading = match self.sensor.get() {
            Ok(position) => position - *reference,
            Err(err) => {
                warn!("AsyncPosPidController: sensor read failed: {err}");
                return;
            }
        };
        let output = pid.step(reading, now);
        let velocity = (output * self.max_velocity) as i16;
        if let Err(err) = self.motor.move_velocity(velocity) {
            warn!("AsyncPosPidController: motor command failed: {err}");
        }
    }
}

/// Closes a position loop around a motor with an [`IterativePid`] stepped on a background thread.
///
/// Targets are relative to the sensor reading at the moment the target is set. The PID output,
/// normalized to [-1, 1] by the default output limits, is scaled by the maximum velocity and
/// sent to the motor as a velocity command.
pub struct AsyncPosPidController {
    shared: Arc<PidShared>,
    ratio: f64,
    task: Option<JoinHandle<()>>,
}

impl AsyncPosPidController {
    /// Creates a stopped controller. Call `start_thread` to begin closing the loop; until then
    /// the motor is never commanded and `wait_until_settled` returns immediately.
    ///
    /// `ratio` multiplies every target, converting output-shaft units into sensor units.
    pub fn new(
        motor: Arc<dyn Motor>,
        sensor: Arc<dyn RotarySensor>,
        pid: Pid,
        ratio: f64,
        max_velocity: f64,
    ) -> Self {
        Self {
            shared: Arc::new(PidShared {
                pid: Mutex::new(pid),
                motor,
                sensor,
                max_velocity,
                new_movement: AtomicBool::new(true),
                dtor_called: AtomicBool::new(false),
            }),
            ratio,
            task: None,
        }
    }

    /// Spawns the background worker. Calling this again while the worker runs does nothing.
    pub fn start_thread(&mut self) {
        if self.task.is_none() {
            let shared = Arc::clone(&self.shared);
            self.task = Some(std::thread::spawn(move || shared.run()));
        }
    }

    /// Whether the background worker has been started.
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// The last output of the loop.
    pub fn output(&self) -> f64 {
        lock(&self.shared.pid).output()
    }

    /// Sets the output limits of the loop.
    pub fn set_output_limits(
        &self,
        output_min: f64,
        output_max: f64,
    ) -> Result<(), crate::pid::PidConfigError> {
        lock(&self.shared.pid).set_output_limits(output_min, output_max)
    }

    /// A copy of the loop as it is right now.
    pub fn pid(&self) -> Pid {
        lock(&self.shared.pid).clone()
    }
}

impl AsyncPositionController for AsyncPosPidController {
    fn set_target(&self, target: f64) {
        let target = target * self.ratio;
        info!("AsyncPosPidController: set target to {target}");

        let mut pid = lock(&self.shared.pid);
        pid.reset();
        pid.flip_disable(false);
        pid.set_target(target);
        self.shared.new_movement.store(true, Ordering::Release);
    }

    fn target(&self) -> f64 {
        lock(&self.shared.pid).target()
    }

    fn error(&self) -> f64 {
        lock(&self.shared.pid).error()
    }

    fn is_settled(&self) -> bool {
        lock(&self.shared.pid).is_settled()
    }

    /// Blocks until the loop settles. Returns at once if the worker was never started, since
    /// nothing would ever step the loop.
    fn wait_until_settled(&self) {
        if !self.is_running() {
            warn!("AsyncPosPidController: waited on a controller whose worker is not running");
            return;
        }
        let mut rate = Rate::new();
        while !self.is_settled() {
            rate.delay_until(POLL_PERIOD);
        }
    }

    fn reset(&self) {
        lock(&self.shared.pid).reset();
    }

    fn flip_disable(&self, disabled: bool) {
        let mut pid = lock(&self.shared.pid);
        pid.flip_disable(disabled);
        if disabled {
            if let Err(err) = self.shared.motor.move_velocity(0) {
                warn!("AsyncPosPidController: could not stop motor: {err}");
            }
        }
    }

    fn is_disabled(&self) -> bool {
        lock(&self.shared.pid).is_disabled()
    }

    fn tare_position(&self) {
        let _pid = lock(&self.shared.pid);
        if let Err(err) = self.shared.sensor.reset() {
            warn!("AsyncPosPidController: could not tare sensor: {err}");
        }
        self.shared.new_movement.store(true, Ordering::Release);
    }
}

impl Drop for AsyncPosPidController {
    fn drop(&mut self) {
        self.shared.dtor_called.store(true, Ordering::Release);
        if let Some(task) = self.task.take() {
            if task.join().is_err() {
                error!("AsyncPosPidController: worker panicked");
            }
        }
    }
}

struct IntegratedState {
    target: f64,
    disabled: bool,
    settled_util: SettledUtil<StdInstant, f64>,
}

/// Delegates position control to the motor's own closed loop.
///
/// Targets are absolute positions since the last `reset`, which tares the motor. Settling is
/// judged on the motor's reported distance to its target.
pub struct AsyncPosIntegratedController {
    motor: Arc<dyn Motor>,
    pair: GearsetRatioPair,
    max_velocity: f64,
    state: Mutex<IntegratedState>,
}

impl AsyncPosIntegratedController {
    /// Creates an enabled controller with a zero target.
    pub fn new(
        motor: Arc<dyn Motor>,
        pair: GearsetRatioPair,
        max_velocity: f64,
        settle: SettleConfig<f64>,
    ) -> Self {
        if let Err(err) = motor.set_gearing(pair.internal_gearset) {
            warn!("AsyncPosIntegratedController: could not set gearing: {err}");
        }
        Self {
            motor,
            pair,
            max_velocity,
            state: Mutex::new(IntegratedState {
                target: 0.0,
                disabled: false,
                settled_util: SettledUtil::new(settle),
            }),
        }
    }

    fn command(&self, target: f64) {
        if let Err(err) = self
            .motor
            .move_absolute(target, self.max_velocity as i16)
        {
            warn!("AsyncPosIntegratedController: motor command failed: {err}");
        }
    }
}

impl AsyncPositionController for AsyncPosIntegratedController {
    fn set_target(&self, target: f64) {
        let target = target * self.pair.ratio;
        info!("AsyncPosIntegratedController: set target to {target}");

        let mut state = lock(&self.state);
        state.target = target;
        state.settled_util.reset();
        if !state.disabled {
            self.command(target);
        }
    }

    fn target(&self) -> f64 {
        lock(&self.state).target
    }

    fn error(&self) -> f64 {
        match (self.motor.target_position(), self.motor.position()) {
            (Ok(target), Ok(position)) => target - position,
            (Err(err), _) | (_, Err(err)) => {
                warn!("AsyncPosIntegratedController: could not read position: {err}");
                0.0
            }
        }
    }

    fn is_settled(&self) -> bool {
        let error = self.error();
        let mut state = lock(&self.state);
        state.disabled || state.settled_util.is_settled(error, StdInstant::now())
    }

    fn reset(&self) {
        let mut state = lock(&self.state);
        state.target = 0.0;
        state.settled_util.reset();
        if let Err(err) = self.motor.tare_position() {
            warn!("AsyncPosIntegratedController: could not tare motor: {err}");
        }
    }

    fn flip_disable(&self, disabled: bool) {
        let mut state = lock(&self.state);
        state.disabled = disabled;
        if disabled {
            if let Err(err) = self.motor.move_velocity(0) {
                warn!("AsyncPosIntegratedController: could not stop motor: {err}");
            }
        } else {
            // Resume the interrupted movement
            self.command(state.target);
        }
    }

    fn is_disabled(&self) -> bool {
        lock(&self.state).disabled
    }

    fn tare_position(&self) {
        if let Err(err) = self.motor.tare_position() {
            warn!("AsyncPosIntegratedController: could not tare motor: {err}");
        }
    }
}
