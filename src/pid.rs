// Iterative PID engine with sample-time gating and a settling criterion
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

use num_traits::Float;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::time::InstantLike;

/// Errors raised when a PID configuration value is rejected.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PidConfigError {
    /// The proportional gain was not finite.
    #[error("proportional gain must be finite")]
    InvalidProportionalGain,
    /// The integral gain was negative or not finite.
    #[error("integral gain must be finite and non-negative")]
    InvalidIntegralGain,
    /// The derivative gain was negative or not finite.
    #[error("derivative gain must be finite and non-negative")]
    InvalidDerivativeGain,
    /// The output bias was not finite.
    #[error("output bias must be finite")]
    InvalidBias,
    /// The output limits were NaN or the minimum was not below the maximum.
    #[error("output limits must satisfy min < max")]
    InvalidOutputLimits,
    /// The integral limits were NaN or the minimum was not below the maximum.
    #[error("integral limits must satisfy min < max")]
    InvalidIntegralLimits,
    /// The sample time was zero.
    #[error("sample time must be greater than zero")]
    InvalidSampleTime,
    /// The derivative filter time constant was non-positive or not finite.
    #[error("derivative filter time constant must be finite and positive")]
    InvalidFilterTimeConstant,
    /// A settle tolerance was negative or NaN.
    #[error("settle tolerances must be non-negative")]
    InvalidSettleTolerance,
}

/// Tuning constants of a PID loop.
///
/// `kbias` is a constant offset added to the output regardless of the error. `ki` and `kd` are
/// "total" gains, i.e. per second and second respectively; the engine folds the sample time into
/// them internally.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PidGains<F = f64> {
    /// Proportional gain.
    pub kp: F,
    /// Integral gain.
    pub ki: F,
    /// Derivative gain.
    pub kd: F,
    /// Constant output offset.
    #[cfg_attr(feature = "serde", serde(default))]
    pub kbias: F,
}

impl<F: Float> PidGains<F> {
    /// Gains with a zero bias.
    pub fn new(kp: F, ki: F, kd: F) -> Self {
        Self {
            kp,
            ki,
            kd,
            kbias: F::zero(),
        }
    }

    /// Gains with an explicit bias.
    pub fn with_bias(kp: F, ki: F, kd: F, kbias: F) -> Self {
        Self { kp, ki, kd, kbias }
    }
}

impl<F: Float> Default for PidGains<F> {
    fn default() -> Self {
        Self::new(F::one(), F::zero(), F::zero())
    }
}

/// The settling criterion of a PID loop.
///
/// A loop is settled once the magnitude of its error has stayed within `error_tolerance`, and the
/// magnitude of the sample-to-sample change in error has stayed within `derivative_tolerance`,
/// for at least `dwell_time`.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SettleConfig<F = f64> {
    /// Largest error magnitude considered on target.
    pub error_tolerance: F,
    /// Largest change in error between two samples considered on target.
    pub derivative_tolerance: F,
    /// How long the error must stay on target.
    pub dwell_time: Duration,
}

impl<F: Float> SettleConfig<F> {
    /// Creates a settle configuration, rejecting negative or NaN tolerances.
    pub fn new(
        error_tolerance: F,
        derivative_tolerance: F,
        dwell_time: Duration,
    ) -> Result<Self, PidConfigError> {
        let invalid = |tol: F| tol.is_nan() || tol < F::zero();
        if invalid(error_tolerance) || invalid(derivative_tolerance) {
            return Err(PidConfigError::InvalidSettleTolerance);
        }
        Ok(Self {
            error_tolerance,
            derivative_tolerance,
            dwell_time,
        })
    }
}

impl<F: Float> Default for SettleConfig<F> {
    /// 50 units of error, 5 units per sample of error change, held for 250ms.
    fn default() -> Self {
        Self {
            error_tolerance: to_float(50.0),
            derivative_tolerance: to_float(5.0),
            dwell_time: Duration::from_millis(250),
        }
    }
}

fn to_float<F: Float>(value: f64) -> F {
    F::from(value).unwrap_or_else(F::nan)
}

fn secs<F: Float>(duration: Duration) -> F {
    to_float(duration.as_secs_f64())
}

/// Validated configuration of an [`IterativePid`].
#[derive(Copy, Clone, Debug)]
pub struct PidConfig<F = f64> {
    /// Proportional gain coefficient.
    /// Defaults to 1.0.
    kp: F,

    /// Integral gain coefficient, pre-multiplied by the sample time.
    /// Defaults to 0.0.
    ki: F,

    /// Derivative gain coefficient, pre-divided by the sample time.
    /// Defaults to 0.0.
    kd: F,

    /// Constant output bias.
    /// Defaults to 0.0.
    kbias: F,

    /// Time constant for the low-pass filter applied to the derivative term.
    /// Defaults to None, i.e. the derivative passes through unfiltered.
    filter_tc: Option<F>,

    /// Smoothing factor of the derivative filter, derived from `filter_tc` and the sample time.
    alpha: F,

    /// Sampling time for the PID engine.
    /// Defaults to 10ms.
    sample_time: Duration,

    /// Output limits. Default to [-1, 1], the normalized range the chassis mixers expect.
    output_min: F,
    output_max: F,

    /// Integral term limits. Default to [-1, 1].
    integral_min: F,
    integral_max: F,

    /// Whether to apply the derivative on the measurement.
    /// If true, the derivative term is computed using the NEGATIVE backward difference between
    /// the current and previous reading, so changing the target does not kick the output.
    /// Defaults to false.
    use_derivative_on_measurement: bool,

    /// Whether to clear the integral term when the error changes sign.
    /// Defaults to true.
    reset_integral_on_zero_crossing: bool,

    settle: SettleConfig<F>,
}

impl<F: Float> Default for PidConfig<F> {
    fn default() -> Self {
        PidConfig {
            kp: F::one(),
            ki: F::zero(),
            kd: F::zero(),
            kbias: F::zero(),
            filter_tc: None,
            alpha: F::one(),
            sample_time: Duration::from_millis(10),
            output_min: -F::one(),
            output_max: F::one(),
            integral_min: -F::one(),
            integral_max: F::one(),
            use_derivative_on_measurement: false,
            reset_integral_on_zero_crossing: true,
            settle: SettleConfig::default(),
        }
    }
}

impl<F: Float> PidConfig<F> {
    /// Returns the proportional gain.
    pub fn kp(&self) -> F {
        self.kp
    }

    /// Returns the total integral gain.
    /// This gain is the internal ki value, inversely scaled by the sample time to produce the value that the
    /// user passes into set_ki
    pub fn ki(&self) -> F {
        self.ki / secs(self.sample_time)
    }

    /// Returns the total derivative gain.
    /// This gain is the internal kd value, scaled by the sample time to produce the value that the
    /// user passes into set_kd
    pub fn kd(&self) -> F {
        self.kd * secs(self.sample_time)
    }

    /// Returns the output bias.
    pub fn kbias(&self) -> F {
        self.kbias
    }

    /// Returns all gains at once.
    pub fn gains(&self) -> PidGains<F> {
        PidGains::with_bias(self.kp(), self.ki(), self.kd(), self.kbias)
    }

    /// Returns the time constant for the low-pass filter applied to the derivative term.
    pub fn filter_tc(&self) -> Option<F> {
        self.filter_tc
    }

    /// Returns the sampling time for the PID engine.
    pub fn sample_time(&self) -> Duration {
        self.sample_time
    }

    /// Returns the minimum output limit.
    pub fn output_min(&self) -> F {
        self.output_min
    }

    /// Returns the maximum output limit.
    pub fn output_max(&self) -> F {
        self.output_max
    }

    /// Returns the integral limits as `(min, max)`.
    pub fn integral_limits(&self) -> (F, F) {
        (self.integral_min, self.integral_max)
    }

    /// Returns the flag indicating whether to apply the derivative on the measurement.
    pub fn use_derivative_on_measurement(&self) -> bool {
        self.use_derivative_on_measurement
    }

    /// Returns the flag indicating whether the integral is cleared on error sign changes.
    pub fn reset_integral_on_zero_crossing(&self) -> bool {
        self.reset_integral_on_zero_crossing
    }

    /// Returns the settling criterion.
    pub fn settle(&self) -> SettleConfig<F> {
        self.settle
    }

    /// Sets the proportional gain.
    ///
    /// # Errors
    /// - `InvalidProportionalGain` if the gain is not finite. A negative gain reverses the
    ///   direction of action.
    pub fn set_kp(&mut self, kp: F) -> Result<(), PidConfigError> {
        if !kp.is_finite() {
            return Err(PidConfigError::InvalidProportionalGain);
        }
        self.kp = kp;
        Ok(())
    }

    /// Sets the integral gain.
    ///
    /// The user passes in a 'total' integral gain, which is scaled by the sample time to produce
    /// the actual ki value used in the PID algorithm.
    ///
    /// # Errors
    /// - `InvalidIntegralGain` if the gain is negative or not finite.
    pub fn set_ki(&mut self, ki: F) -> Result<(), PidConfigError> {
        if ki < F::zero() || !ki.is_finite() {
            return Err(PidConfigError::InvalidIntegralGain);
        }
        self.ki = ki * secs(self.sample_time);
        Ok(())
    }

    /// Sets the derivative gain.
    ///
    /// The user passes in a 'total' derivative gain, which is scaled inversely by the sample time
    /// to produce the actual kd value used in the PID algorithm.
    ///
    /// # Errors
    /// - `InvalidDerivativeGain` if the gain is negative or not finite.
    pub fn set_kd(&mut self, kd: F) -> Result<(), PidConfigError> {
        if kd < F::zero() || !kd.is_finite() {
            return Err(PidConfigError::InvalidDerivativeGain);
        }
        self.kd = kd / secs(self.sample_time);
        Ok(())
    }

    /// Sets the constant output bias.
    pub fn set_kbias(&mut self, kbias: F) -> Result<(), PidConfigError> {
        if !kbias.is_finite() {
            return Err(PidConfigError::InvalidBias);
        }
        self.kbias = kbias;
        Ok(())
    }

    /// Sets all four gains. Either every gain is accepted or none is changed.
    pub fn set_gains(&mut self, gains: PidGains<F>) -> Result<(), PidConfigError> {
        let mut staged = *self;
        staged.set_kp(gains.kp)?;
        staged.set_ki(gains.ki)?;
        staged.set_kd(gains.kd)?;
        staged.set_kbias(gains.kbias)?;
        *self = staged;
        Ok(())
    }

    /// Sets the time constant for the low-pass filter applied to the derivative term.
    ///
    /// Passing `None` removes the filter.
    ///
    /// # Errors
    /// - `InvalidFilterTimeConstant` if the time constant is less than or equal to zero or non
    ///   finite.
    pub fn set_filter_tc(&mut self, filter_tc: Option<F>) -> Result<(), PidConfigError> {
        match filter_tc {
            Some(tc) if tc <= F::zero() || !tc.is_finite() => {
                Err(PidConfigError::InvalidFilterTimeConstant)
            }
            _ => {
                self.filter_tc = filter_tc;
                self.alpha = self.compute_alpha(self.sample_time);
                Ok(())
            }
        }
    }

    fn compute_alpha(&self, sample_time: Duration) -> F {
        match self.filter_tc {
            Some(tc) => {
                let delta_t = secs::<F>(sample_time);
                delta_t / (delta_t + tc)
            }
            None => F::one(),
        }
    }

    /// Sets the sample time for the PID engine. Rescales the integral and derivative gains and
    /// the filter for the derivative term to maintain consistent behavior.
    ///
    /// # Errors
    /// - `InvalidSampleTime` if the sample time is zero.
    pub fn set_sample_time(&mut self, sample_time: Duration) -> Result<(), PidConfigError> {
        if sample_time.is_zero() {
            return Err(PidConfigError::InvalidSampleTime);
        }

        let ratio = secs::<F>(sample_time) / secs(self.sample_time);

        self.ki = self.ki * ratio;
        self.kd = self.kd / ratio;
        self.alpha = self.compute_alpha(sample_time);

        self.sample_time = sample_time;
        Ok(())
    }

    /// Sets the minimum and maximum output limits.
    ///
    /// These limits may be set to infinity to disable clamping.
    ///
    /// # Errors
    /// - `InvalidOutputLimits` if the minimum limit is greater than or equal to the maximum
    ///   limit, or either limit is NaN.
    pub fn set_output_limits(&mut self, output_min: F, output_max: F) -> Result<(), PidConfigError> {
        if output_min >= output_max || output_max.is_nan() || output_min.is_nan() {
            return Err(PidConfigError::InvalidOutputLimits);
        }

        self.output_min = output_min;
        self.output_max = output_max;
        Ok(())
    }

    /// Sets the limits the integral term is clamped to.
    ///
    /// # Errors
    /// - `InvalidIntegralLimits` under the same conditions as `set_output_limits`.
    pub fn set_integral_limits(
        &mut self,
        integral_min: F,
        integral_max: F,
    ) -> Result<(), PidConfigError> {
        if integral_min >= integral_max || integral_max.is_nan() || integral_min.is_nan() {
            return Err(PidConfigError::InvalidIntegralLimits);
        }

        self.integral_min = integral_min;
        self.integral_max = integral_max;
        Ok(())
    }

    /// Sets whether to apply the derivative on the measurement.
    pub fn set_use_derivative_on_measurement(&mut self, use_derivative_on_measurement: bool) {
        self.use_derivative_on_measurement = use_derivative_on_measurement;
    }

    /// Sets whether to clear the integral term when the error changes sign.
    pub fn set_reset_integral_on_zero_crossing(&mut self, reset: bool) {
        self.reset_integral_on_zero_crossing = reset;
    }

    /// Sets the settling criterion.
    pub fn set_settle(&mut self, settle: SettleConfig<F>) -> Result<(), PidConfigError> {
        let validated =
            SettleConfig::new(settle.error_tolerance, settle.derivative_tolerance, settle.dwell_time)?;
        self.settle = validated;
        Ok(())
    }
}

/// Builds a validated [`PidConfig`], applying defaults to every field left unset.
#[derive(Copy, Clone, Debug)]
pub struct PidConfigBuilder<F = f64> {
    gains: Option<PidGains<F>>,
    kp: Option<F>,
    ki: Option<F>,
    kd: Option<F>,
    kbias: Option<F>,
    filter_tc: Option<F>,
    sample_time: Option<Duration>,
    output_limits: Option<(F, F)>,
    integral_limits: Option<(F, F)>,
    use_derivative_on_measurement: Option<bool>,
    reset_integral_on_zero_crossing: Option<bool>,
    settle: Option<SettleConfig<F>>,
}

impl<F> Default for PidConfigBuilder<F> {
    fn default() -> Self {
        Self {
            gains: None,
            kp: None,
            ki: None,
            kd: None,
            kbias: None,
            filter_tc: None,
            sample_time: None,
            output_limits: None,
            integral_limits: None,
            use_derivative_on_measurement: None,
            reset_integral_on_zero_crossing: None,
            settle: None,
        }
    }
}

impl<F: Float> PidConfigBuilder<F> {
    /// Sets all gains at once. Individually set gains take precedence.
    pub fn gains(mut self, gains: PidGains<F>) -> Self {
        self.gains = Some(gains);
        self
    }

    /// Sets the proportional gain.
    pub fn kp(mut self, kp: F) -> Self {
        self.kp = Some(kp);
        self
    }

    /// Sets the total integral gain.
    pub fn ki(mut self, ki: F) -> Self {
        self.ki = Some(ki);
        self
    }

    /// Sets the total derivative gain.
    pub fn kd(mut self, kd: F) -> Self {
        self.kd = Some(kd);
        self
    }

    /// Sets the output bias.
    pub fn kbias(mut self, kbias: F) -> Self {
        self.kbias = Some(kbias);
        self
    }

    /// Sets the derivative filter time constant.
    pub fn filter_tc(mut self, filter_tc: F) -> Self {
        self.filter_tc = Some(filter_tc);
        self
    }

    /// Sets the sample time.
    pub fn sample_time(mut self, sample_time: Duration) -> Self {
        self.sample_time = Some(sample_time);
        self
    }

    /// Sets the output limits.
    pub fn output_limits(mut self, output_min: F, output_max: F) -> Self {
        self.output_limits = Some((output_min, output_max));
        self
    }

    /// Sets the integral limits.
    pub fn integral_limits(mut self, integral_min: F, integral_max: F) -> Self {
        self.integral_limits = Some((integral_min, integral_max));
        self
    }

    /// Sets whether the derivative is taken on the measurement.
    pub fn use_derivative_on_measurement(mut self, flag: bool) -> Self {
        self.use_derivative_on_measurement = Some(flag);
        self
    }

    /// Sets whether the integral is cleared when the error changes sign.
    pub fn reset_integral_on_zero_crossing(mut self, flag: bool) -> Self {
        self.reset_integral_on_zero_crossing = Some(flag);
        self
    }

    /// Sets the settling criterion.
    pub fn settle(mut self, settle: SettleConfig<F>) -> Self {
        self.settle = Some(settle);
        self
    }

    /// Validates every field and produces the configuration.
    pub fn build(self) -> Result<PidConfig<F>, PidConfigError> {
        let mut config = PidConfig::default();

        // Sample time goes first so the gains are scaled by the final value
        if let Some(sample_time) = self.sample_time {
            config.set_sample_time(sample_time)?;
        }

        let base = self.gains.unwrap_or_default();
        config.set_gains(PidGains::with_bias(
            self.kp.unwrap_or(base.kp),
            self.ki.unwrap_or(base.ki),
            self.kd.unwrap_or(base.kd),
            self.kbias.unwrap_or(base.kbias),
        ))?;

        if let Some(tc) = self.filter_tc {
            config.set_filter_tc(Some(tc))?;
        }
        if let Some((min, max)) = self.output_limits {
            config.set_output_limits(min, max)?;
        }
        if let Some((min, max)) = self.integral_limits {
            config.set_integral_limits(min, max)?;
        }
        if let Some(flag) = self.use_derivative_on_measurement {
            config.set_use_derivative_on_measurement(flag);
        }
        if let Some(flag) = self.reset_integral_on_zero_crossing {
            config.set_reset_integral_on_zero_crossing(flag);
        }
        if let Some(settle) = self.settle {
            config.set_settle(settle)?;
        }
        Ok(config)
    }
}

/// Tracks how long an error has stayed on target.
#[derive(Copy, Clone, Debug)]
pub struct SettledUtil<I, F = f64> {
    config: SettleConfig<F>,
    last_error: F,
    on_target_since: Option<I>,
}

impl<I: InstantLike, F: Float> SettledUtil<I, F> {
    /// Creates a tracker with no history.
    pub fn new(config: SettleConfig<F>) -> Self {
        Self {
            config,
            last_error: F::zero(),
            on_target_since: None,
        }
    }

    /// Feeds one error sample taken at `now` and reports whether the error has been on target
    /// for the configured dwell time.
    pub fn is_settled(&mut self, error: F, now: I) -> bool {
        let change = error - self.last_error;
        self.last_error = error;

        let on_target = error.abs() <= self.config.error_tolerance
            && change.abs() <= self.config.derivative_tolerance;
        if !on_target {
            self.on_target_since = None;
            return false;
        }

        let since = *self.on_target_since.get_or_insert(now);
        now.duration_since(since) >= self.config.dwell_time
    }

    /// Forgets all history.
    pub fn reset(&mut self) {
        self.last_error = F::zero();
        self.on_target_since = None;
    }

    /// Returns the settling criterion.
    pub fn config(&self) -> &SettleConfig<F> {
        &self.config
    }

    pub(crate) fn set_config(&mut self, config: SettleConfig<F>) {
        self.config = config;
        self.reset();
    }
}

/// A stateful position PID loop.
///
/// Each call to `step` takes the latest process reading, measures the error against the target
/// set by `set_target`, and produces a bounded output. The engine keeps its own integrator,
/// derivative history and settling state; it is not synchronized and is meant to be owned by a
/// single controller.
///
/// Disabling the engine with `flip_disable(true)` makes `step` return zero without touching any
/// history and makes `is_settled` report true, so nothing ever waits on a disabled loop.
#[derive(Clone, Debug)]
pub struct IterativePid<I, F = f64> {
    config: PidConfig<F>,
    target: F,
    i_term: F,
    last_err: F,
    last_reading: F,
    last_derivative: F,
    last_output: F,
    last_time: Option<I>,
    disabled: bool,
    settled: bool,
    settled_util: SettledUtil<I, F>,
}

impl<I: InstantLike, F: Float> IterativePid<I, F> {
    /// Creates an enabled engine with a zero target.
    pub fn new(config: PidConfig<F>) -> Self {
        Self {
            config,
            target: F::zero(),
            i_term: F::zero(),
            last_err: F::zero(),
            last_reading: F::zero(),
            last_derivative: F::zero(),
            last_output: F::zero(),
            last_time: None,
            disabled: false,
            settled: false,
            settled_util: SettledUtil::new(config.settle()),
        }
    }

    /// Creates an engine with the given gains and otherwise default configuration.
    pub fn with_gains(gains: PidGains<F>) -> Result<Self, PidConfigError> {
        Ok(Self::new(PidConfigBuilder::default().gains(gains).build()?))
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PidConfig<F> {
        &self.config
    }

    /// Gives mutable access to the configuration. A changed settle criterion only takes effect
    /// after `set_settle`, use that instead for settle changes.
    pub fn config_mut(&mut self) -> &mut PidConfig<F> {
        &mut self.config
    }

    /// Replaces the settling criterion and clears the settle history.
    pub fn set_settle(&mut self, settle: SettleConfig<F>) -> Result<(), PidConfigError> {
        self.config.set_settle(settle)?;
        self.settled_util.set_config(self.config.settle());
        self.settled = false;
        Ok(())
    }

    /// Sets the output limits. See [`PidConfig::set_output_limits`].
    pub fn set_output_limits(&mut self, output_min: F, output_max: F) -> Result<(), PidConfigError> {
        self.config.set_output_limits(output_min, output_max)
    }

    /// Runs one iteration of the control law against a new process `reading` taken at
    /// `timestamp`.
    ///
    /// Calling this before one sample period has elapsed since the last computation is a no-op
    /// that returns the previous output.
    pub fn step(&mut self, reading: F, timestamp: I) -> F {
        if self.disabled {
            return F::zero();
        }

        let first_sample = match self.last_time {
            Some(last_time) => {
                // Do not compute if the time delta is less than the sample time
                if timestamp.duration_since(last_time) < self.config.sample_time {
                    return self.last_output;
                }
                false
            }
            None => true,
        };

        let error = self.target - reading;
        if first_sample {
            self.last_err = error;
            self.last_reading = reading;
        }

        if self.config.reset_integral_on_zero_crossing
            && error.is_sign_negative() != self.last_err.is_sign_negative()
        {
            self.i_term = F::zero();
        }

        // Fold gain into i-term calculation for bumpless parameter change
        self.i_term = (self.i_term + self.config.ki * error)
            .max(self.config.integral_min)
            .min(self.config.integral_max);

        // Optional derivative on measurement to mitigate derivative kick
        let raw_derivative = if self.config.use_derivative_on_measurement {
            self.last_reading - reading // Note reversed order of operands
        } else {
            error - self.last_err
        };

        let alpha = self.config.alpha;
        let derivative = alpha * raw_derivative + (F::one() - alpha) * self.last_derivative;
        self.last_derivative = derivative;

        let output = (self.config.kp * error
            + self.i_term
            + self.config.kd * derivative
            + self.config.kbias)
            .max(self.config.output_min)
            .min(self.config.output_max);

        self.last_reading = reading;
        self.last_err = error;
        self.last_time = Some(timestamp);
        self.last_output = output;
        self.settled = self.settled_util.is_settled(error, timestamp);
        output
    }

    /// Sets the target the next `step` measures the error against.
    pub fn set_target(&mut self, target: F) {
        self.target = target;
    }

    /// Returns the target.
    pub fn target(&self) -> F {
        self.target
    }

    /// Returns the output of the last computation.
    pub fn output(&self) -> F {
        self.last_output
    }

    /// Returns the error of the last computation.
    pub fn error(&self) -> F {
        self.last_err
    }

    /// Whether the error has met the settling criterion, always true while disabled.
    pub fn is_settled(&self) -> bool {
        self.disabled || self.settled
    }

    /// Clears the integrator, derivative history and settling state. Gains, limits, target and
    /// the disabled flag are kept.
    pub fn reset(&mut self) {
        self.i_term = F::zero();
        self.last_err = F::zero();
        self.last_reading = F::zero();
        self.last_derivative = F::zero();
        self.last_output = F::zero();
        self.last_time = None;
        self.settled = false;
        self.settled_util.reset();
    }

    /// Disables (`true`) or enables (`false`) the engine.
    pub fn flip_disable(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    /// Whether the engine is disabled.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }
}
