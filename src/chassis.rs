// Coordinated chassis controllers turning distance and angle commands into wheel motion
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

use core::f64::consts::PI;
use core::time::Duration;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use log::{debug, error, info, warn};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::async_pos::{AsyncPosIntegratedController, AsyncPositionController, POLL_PERIOD};
use crate::device::{DeviceError, EncoderUnits, GearsetRatioPair, Motor};
use crate::model::{ChassisModel, EncoderSnapshot};
use crate::pid::{IterativePid, SettleConfig};
use crate::sync::lock;
use crate::time::{Rate, StdInstant};
use crate::units::{QAngle, QLength};

/// Period of the chassis worker loop.
pub const LOOP_PERIOD: Duration = Duration::from_millis(10);

type Pid = IterativePid<StdInstant, f64>;

/// Errors raised while constructing a chassis controller.
#[derive(Copy, Clone, Debug, PartialEq, thiserror::Error)]
pub enum ChassisError {
    /// Every target is multiplied by the gear ratio, so a zero ratio would make every movement
    /// a no-op. This is usually caused by an integer division when computing the ratio.
    #[error("the gear ratio cannot be zero, check for integer division")]
    ZeroGearRatio,
    /// Both scales must be finite and non-zero.
    #[error("chassis scales must be finite and non-zero, got straight {straight} and turn {turn}")]
    InvalidScales {
        /// Motor degrees per meter.
        straight: f64,
        /// Motor degrees per degree of robot rotation.
        turn: f64,
    },
}

/// Conversion factors from robot motion to motor-shaft degrees.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChassisScales {
    /// Motor degrees per meter driven.
    pub straight: f64,
    /// Motor degrees of left-right difference per degree the robot turns.
    pub turn: f64,
}

impl ChassisScales {
    /// Creates validated scales.
    ///
    /// # Errors
    /// - `InvalidScales` if either scale is zero or not finite.
    pub fn new(straight: f64, turn: f64) -> Result<Self, ChassisError> {
        let scales = Self { straight, turn };
        scales.validate()?;
        Ok(scales)
    }

    /// Derives the scales of a drivetrain from its wheel diameter and wheelbase width.
    ///
    /// # Errors
    /// - `InvalidScales` if the dimensions do not produce usable scales, e.g. a zero diameter.
    pub fn from_dimensions(wheel_diameter: QLength, wheelbase: QLength) -> Result<Self, ChassisError> {
        let diameter = wheel_diameter.as_meters();
        Self::new(360.0 / (PI * diameter), wheelbase.as_meters() / diameter)
    }

    fn validate(&self) -> Result<(), ChassisError> {
        let usable = |scale: f64| scale.is_finite() && scale != 0.0;
        if usable(self.straight) && usable(self.turn) {
            Ok(())
        } else {
            Err(ChassisError::InvalidScales {
                straight: self.straight,
                turn: self.turn,
            })
        }
    }
}

/// Which engines drive the chassis worker.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum MovementMode {
    /// Idle, the worker sends no commands.
    #[default]
    None = 0,
    /// The distance and angle engines drive the chassis straight.
    Distance = 1,
    /// The turn engine rotates the chassis in place.
    Angle = 2,
}

impl MovementMode {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => MovementMode::Distance,
            2 => MovementMode::Angle,
            _ => MovementMode::None,
        }
    }
}

/// A movement mode that can be shared between threads.
#[derive(Debug, Default)]
struct AtomicMode(AtomicU8);

impl AtomicMode {
    fn load(&self) -> MovementMode {
        MovementMode::from_u8(self.0.load(Ordering::Acquire))
    }

    fn store(&self, mode: MovementMode) {
        self.0.store(mode as u8, Ordering::Release);
    }
}

/// A controller that moves a chassis by physical distances and angles.
pub trait ChassisController: Send + Sync {
    /// Starts driving `target` straight ahead (backwards if negative) and returns immediately.
    fn move_distance_async(&self, target: QLength);

    /// Drives `target` straight ahead and blocks until settled.
    fn move_distance(&self, target: QLength) {
        self.move_distance_async(target);
        self.wait_until_settled();
    }

    /// Like `move_distance_async` with the target given in motor degrees.
    fn move_distance_raw_async(&self, target: f64) {
        // Divide by the scale so the target turns back into motor degrees
        self.move_distance_async(QLength::meters(target / self.chassis_scales().straight));
    }

    /// Like `move_distance` with the target given in motor degrees.
    fn move_distance_raw(&self, target: f64) {
        self.move_distance_raw_async(target);
        self.wait_until_settled();
    }

    /// Starts turning in place by `target` (clockwise if positive) and returns immediately.
    fn turn_angle_async(&self, target: QAngle);

    /// Turns in place by `target` and blocks until settled.
    fn turn_angle(&self, target: QAngle) {
        self.turn_angle_async(target);
        self.wait_until_settled();
    }

    /// Like `turn_angle_async` with the target given in motor degrees.
    fn turn_angle_raw_async(&self, target: f64) {
        self.turn_angle_async(QAngle::degrees(target / self.chassis_scales().turn));
    }

    /// Like `turn_angle` with the target given in motor degrees.
    fn turn_angle_raw(&self, target: f64) {
        self.turn_angle_raw_async(target);
        self.wait_until_settled();
    }

    /// Blocks until the current movement is complete, then stops the chassis. Returns
    /// immediately when no movement is in progress.
    fn wait_until_settled(&self);

    /// Abandons the current movement and stops every motor.
    fn stop(&self);

    /// Swaps the turn direction, for robots whose sensors are mounted mirrored.
    fn set_turns_mirrored(&self, mirrored: bool);

    /// The chassis being controlled, for open-loop commands.
    fn model(&self) -> &dyn ChassisModel;

    /// Returns the scales targets are converted with.
    fn chassis_scales(&self) -> ChassisScales;

    /// Returns the gearing targets are converted with.
    fn gearset_ratio_pair(&self) -> GearsetRatioPair;
}

fn configure_model(model: &dyn ChassisModel, pair: GearsetRatioPair) {
    if let Err(err) = model
        .set_gearing(pair.internal_gearset)
        .and(model.set_encoder_units(EncoderUnits::Degrees))
    {
        warn!("could not configure chassis motors: {err}");
    }
}

fn check_construction(pair: GearsetRatioPair, scales: ChassisScales) -> Result<(), ChassisError> {
    if pair.ratio == 0.0 {
        error!("{}", ChassisError::ZeroGearRatio);
        return Err(ChassisError::ZeroGearRatio);
    }
    scales.validate().map_err(|err| {
        error!("{err}");
        err
    })
}

fn turn_sign(mirrored: &AtomicBool) -> f64 {
    if mirrored.load(Ordering::Relaxed) {
        -1.0
    } else {
        1.0
    }
}

/// The three engines, always locked together so that a movement is armed, stepped and judged
/// atomically.
struct Loops {
    distance: Pid,
    angle: Pid,
    turn: Pid,
}

impl Loops {
    fn disable_all(&mut self) {
        self.distance.flip_disable(true);
        self.angle.flip_disable(true);
        self.turn.flip_disable(true);
    }
}

struct Shared {
    model: Arc<dyn ChassisModel>,
    loops: Mutex<Loops>,
    // Only written with `loops` held, read lock-free by `mode()`
    mode: AtomicMode,
    // Set once a movement settled so the worker stops commanding the model
    done_looping: AtomicBool,
    // Pulsed when a movement is armed so the worker re-zeroes its snapshot
    new_movement: AtomicBool,
    dtor_called: AtomicBool,
}

/// Worker-private state carried between ticks.
#[derive(Default)]
struct Tracking {
    past_mode: MovementMode,
    start: EncoderSnapshot,
}

impl Shared {
    fn run(&self) {
        info!("ChassisControllerPid: worker started");
        let mut rate = Rate::new();
        let mut tracking = Tracking::default();
        let mut now = StdInstant::now();

        while !self.dtor_called.load(Ordering::Acquire) {
            self.tick(&mut tracking, now);
            now = StdInstant(rate.delay_until(LOOP_PERIOD));
        }
        info!("ChassisControllerPid: worker stopped");
    }

    fn tick(&self, tracking: &mut Tracking, now: StdInstant) {
        let mut loops = lock(&self.loops);
        if self.done_looping.load(Ordering::Acquire) {
            return;
        }

        let mode = self.mode.load();
        if mode != tracking.past_mode || self.new_movement.load(Ordering::Acquire) {
            match self.model.sensor_vals() {
                Ok(start) => {
                    debug!("ChassisControllerPid: {mode:?} movement starts from {start:?}");
                    tracking.start = start;
                    tracking.past_mode = mode;
                    self.new_movement.store(false, Ordering::Release);
                }
                Err(err) => {
                    warn!("ChassisControllerPid: could not sample start position: {err}");
                    return;
                }
            }
        }

        if let Err(err) = self.actuate(&mut loops, mode, tracking.start, now) {
            warn!("ChassisControllerPid: {mode:?} tick failed: {err}");
        }
    }

    fn actuate(
        &self,
        loops: &mut Loops,
        mode: MovementMode,
        start: EncoderSnapshot,
        now: StdInstant,
    ) -> Result<(), DeviceError> {
        match mode {
            MovementMode::Distance => {
                let delta = self.model.sensor_vals()? - start;
                let forward = loops.distance.step(delta.distance(), now);
                let yaw = loops.angle.step(delta.angle(), now);
                self.model.drive_vector(forward, yaw)
            }
            MovementMode::Angle => {
                let delta = self.model.sensor_vals()? - start;
                let speed = loops.turn.step(delta.angle(), now);
                self.model.rotate(speed)
            }
            MovementMode::None => Ok(()),
        }
    }

    /// Disables every engine, stops the chassis and idles the worker. Requires `loops` held.
    fn finish(&self, loops: &mut Loops) {
        loops.disable_all();
        if let Err(err) = self.model.stop() {
            warn!("ChassisControllerPid: could not stop chassis: {err}");
        }
        self.mode.store(MovementMode::None);
        self.done_looping.store(true, Ordering::Release);
    }

    /// Polls until the engines of `mode` settle. Returns `false` if the mode changed first, so
    /// the caller can re-dispatch on the new mode.
    fn wait_for_settled(&self, mode: MovementMode) -> bool {
        info!("ChassisControllerPid: waiting to settle in {mode:?} mode");
        let mut rate = Rate::new();
        loop {
            {
                let mut loops = lock(&self.loops);
                let current = self.mode.load();
                if current != mode {
                    warn!("ChassisControllerPid: mode changed to {current:?} while waiting in {mode:?}");
                    return false;
                }
                let settled = match mode {
                    MovementMode::Distance => loops.distance.is_settled() && loops.angle.is_settled(),
                    MovementMode::Angle => loops.turn.is_settled(),
                    MovementMode::None => true,
                };
                if settled {
                    self.finish(&mut loops);
                    return true;
                }
            }
            rate.delay_until(POLL_PERIOD);
        }
    }
}

/// Drives a chassis with three PID loops sharing one background worker.
///
/// Distance movements step a distance loop on the mean travel of both sides and an angle loop
/// holding the left-right difference at zero, and mix the two with `drive_vector`. Turns step a
/// turn loop on the left-right difference and `rotate` in place. Movements are relative to the
/// sensor readings when the worker first observes them.
///
/// Issuing a new movement while another is in progress replaces it. A caller blocked in
/// `wait_until_settled` follows the new movement instead of returning early.
pub struct ChassisControllerPid {
    shared: Arc<Shared>,
    scales: ChassisScales,
    pair: GearsetRatioPair,
    turns_mirrored: AtomicBool,
    task: Option<JoinHandle<()>>,
}

impl ChassisControllerPid {
    /// Creates a controller with a stopped worker. Call `start_thread` before moving.
    ///
    /// Sets the gearing of the model and switches its encoders to degrees.
    ///
    /// # Errors
    /// - `ZeroGearRatio` if `pair.ratio` is zero.
    /// - `InvalidScales` if either scale is zero or not finite.
    pub fn new(
        model: Arc<dyn ChassisModel>,
        distance: Pid,
        angle: Pid,
        turn: Pid,
        pair: GearsetRatioPair,
        scales: ChassisScales,
    ) -> Result<Self, ChassisError> {
        check_construction(pair, scales)?;
        configure_model(model.as_ref(), pair);

        Ok(Self {
            shared: Arc::new(Shared {
                model,
                loops: Mutex::new(Loops {
                    distance,
                    angle,
                    turn,
                }),
                mode: AtomicMode::default(),
                done_looping: AtomicBool::new(true),
                new_movement: AtomicBool::new(false),
                dtor_called: AtomicBool::new(false),
            }),
            scales,
            pair,
            turns_mirrored: AtomicBool::new(false),
            task: None,
        })
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

    /// The current movement mode.
    pub fn mode(&self) -> MovementMode {
        self.shared.mode.load()
    }

    /// A copy of the distance loop as it is right now.
    pub fn distance_pid(&self) -> Pid {
        lock(&self.shared.loops).distance.clone()
    }

    /// A copy of the angle loop as it is right now.
    pub fn angle_pid(&self) -> Pid {
        lock(&self.shared.loops).angle.clone()
    }

    /// A copy of the turn loop as it is right now.
    pub fn turn_pid(&self) -> Pid {
        lock(&self.shared.loops).turn.clone()
    }

    fn arm(&self, loops: MutexGuard<'_, Loops>, mode: MovementMode) {
        self.shared.mode.store(mode);
        self.shared.done_looping.store(false, Ordering::Release);
        self.shared.new_movement.store(true, Ordering::Release);
        drop(loops);
    }
}

impl ChassisController for ChassisControllerPid {
    fn move_distance_async(&self, target: QLength) {
        info!("ChassisControllerPid: moving {} meters", target.as_meters());
        let new_target = target.as_meters() * self.scales.straight * self.pair.ratio;
        info!("ChassisControllerPid: moving {new_target} motor degrees");

        let mut loops = lock(&self.shared.loops);
        loops.distance.reset();
        loops.angle.reset();
        loops.distance.flip_disable(false);
        loops.angle.flip_disable(false);
        loops.turn.flip_disable(true);
        loops.distance.set_target(new_target);
        loops.angle.set_target(0.0);
        self.arm(loops, MovementMode::Distance);
    }

    fn turn_angle_async(&self, target: QAngle) {
        info!("ChassisControllerPid: turning {} degrees", target.as_degrees());
        let new_target = target.as_degrees()
            * self.scales.turn
            * self.pair.ratio
            * turn_sign(&self.turns_mirrored);
        info!("ChassisControllerPid: turning {new_target} motor degrees");

        let mut loops = lock(&self.shared.loops);
        loops.turn.reset();
        loops.turn.flip_disable(false);
        loops.distance.flip_disable(true);
        loops.angle.flip_disable(true);
        loops.turn.set_target(new_target);
        self.arm(loops, MovementMode::Angle);
    }

    fn wait_until_settled(&self) {
        if self.shared.mode.load() == MovementMode::None {
            return;
        }

        info!("ChassisControllerPid: waiting to settle");
        loop {
            let mode = self.shared.mode.load();
            if mode == MovementMode::None || self.shared.wait_for_settled(mode) {
                break;
            }
        }
        info!("ChassisControllerPid: done waiting to settle");
    }

    fn stop(&self) {
        info!("ChassisControllerPid: stopping");
        let mut loops = lock(&self.shared.loops);
        loops.disable_all();
        if let Err(err) = self.shared.model.stop() {
            warn!("ChassisControllerPid: could not stop chassis: {err}");
        }
    }

    fn set_turns_mirrored(&self, mirrored: bool) {
        self.turns_mirrored.store(mirrored, Ordering::Relaxed);
    }

    fn model(&self) -> &dyn ChassisModel {
        self.shared.model.as_ref()
    }

    fn chassis_scales(&self) -> ChassisScales {
        self.scales
    }

    fn gearset_ratio_pair(&self) -> GearsetRatioPair {
        self.pair
    }
}

impl Drop for ChassisControllerPid {
    fn drop(&mut self) {
        self.shared.dtor_called.store(true, Ordering::Release);
        if let Some(task) = self.task.take() {
            if task.join().is_err() {
                error!("ChassisControllerPid: worker panicked");
            }
        }
    }
}

/// Drives a chassis with the motors' own position control, one controller per side.
///
/// Used when no gains are available. Each movement tares the motors and sends both sides an
/// absolute target.
pub struct ChassisControllerIntegrated {
    model: Arc<dyn ChassisModel>,
    left: AsyncPosIntegratedController,
    right: AsyncPosIntegratedController,
    scales: ChassisScales,
    pair: GearsetRatioPair,
    turns_mirrored: AtomicBool,
    // Set when a movement is armed, cleared once it settled
    moving: AtomicBool,
}

impl ChassisControllerIntegrated {
    /// Creates a controller commanding `left_motor` and `right_motor`, which should drive the
    /// same wheels as `model`. The gear ratio is applied here, not by the side controllers.
    ///
    /// # Errors
    /// - `ZeroGearRatio` if `pair.ratio` is zero.
    /// - `InvalidScales` if either scale is zero or not finite.
    pub fn new(
        model: Arc<dyn ChassisModel>,
        left_motor: Arc<dyn Motor>,
        right_motor: Arc<dyn Motor>,
        pair: GearsetRatioPair,
        scales: ChassisScales,
        settle: SettleConfig<f64>,
    ) -> Result<Self, ChassisError> {
        check_construction(pair, scales)?;
        configure_model(model.as_ref(), pair);

        let side_pair = GearsetRatioPair::new(pair.internal_gearset, 1.0);
        let max_velocity = model.max_velocity();
        Ok(Self {
            left: AsyncPosIntegratedController::new(left_motor, side_pair, max_velocity, settle),
            right: AsyncPosIntegratedController::new(right_motor, side_pair, max_velocity, settle),
            model,
            scales,
            pair,
            turns_mirrored: AtomicBool::new(false),
            moving: AtomicBool::new(false),
        })
    }

    fn sides(&self) -> [&AsyncPosIntegratedController; 2] {
        [&self.left, &self.right]
    }

    fn arm(&self, left_target: f64, right_target: f64) {
        for side in self.sides() {
            side.reset();
            side.flip_disable(false);
        }
        self.left.set_target(left_target);
        self.right.set_target(right_target);
        self.moving.store(true, Ordering::Release);
    }
}

impl ChassisController for ChassisControllerIntegrated {
    fn move_distance_async(&self, target: QLength) {
        info!("ChassisControllerIntegrated: moving {} meters", target.as_meters());
        let new_target = target.as_meters() * self.scales.straight * self.pair.ratio;
        info!("ChassisControllerIntegrated: moving {new_target} motor degrees");
        self.arm(new_target, new_target);
    }

    fn turn_angle_async(&self, target: QAngle) {
        info!("ChassisControllerIntegrated: turning {} degrees", target.as_degrees());
        let new_target = target.as_degrees()
            * self.scales.turn
            * self.pair.ratio
            * turn_sign(&self.turns_mirrored);
        info!("ChassisControllerIntegrated: turning {new_target} motor degrees");
        self.arm(new_target, -new_target);
    }

    fn wait_until_settled(&self) {
        if !self.moving.load(Ordering::Acquire) {
            debug!("ChassisControllerIntegrated: no movement to wait for");
            return;
        }
        info!("ChassisControllerIntegrated: waiting to settle");
        let mut rate = Rate::new();
        while !(self.left.is_settled() && self.right.is_settled()) {
            rate.delay_until(POLL_PERIOD);
        }
        self.stop();
        self.moving.store(false, Ordering::Release);
        info!("ChassisControllerIntegrated: done waiting to settle");
    }

    fn stop(&self) {
        for side in self.sides() {
            side.flip_disable(true);
        }
        if let Err(err) = self.model.stop() {
            warn!("ChassisControllerIntegrated: could not stop chassis: {err}");
        }
    }

    fn set_turns_mirrored(&self, mirrored: bool) {
        self.turns_mirrored.store(mirrored, Ordering::Relaxed);
    }

    fn model(&self) -> &dyn ChassisModel {
        self.model.as_ref()
    }

    fn chassis_scales(&self) -> ChassisScales {
        self.scales
    }

    fn gearset_ratio_pair(&self) -> GearsetRatioPair {
        self.pair
    }
}
