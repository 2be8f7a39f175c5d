// Defines a trait for time-like objects and the periodic delay used by the control loops
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

use core::any::Any;
use core::fmt::Debug;
use core::ops::Add;
use core::time::Duration;
use std::time::Instant;

/// A trait for time-like objects that can be used to measure elapsed time.
///
/// The PID engine uses this trait to measure elapsed time and compare it to the sample time,
/// stepping only if the elapsed time is at least the sample time. It also times the dwell period
/// of the settling criterion.
pub trait InstantLike:
    Sized
    + Add<Duration, Output = Self>
    + Clone
    + Copy
    + Debug
    + PartialEq<Self>
    + Send
    + Sync
    + Unpin
    + Any
{
    /// Returns the amount of time elapsed from another instant to this one
    #[must_use]
    fn duration_since(&self, earlier: Self) -> Duration;
}

/// A wrapper around an unsigned 64-bit integer representing milliseconds.
///
/// Handy for driving a PID engine with a fully deterministic clock.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Millis(pub u64);

impl InstantLike for Millis {
    fn duration_since(&self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Millis {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Millis(self.0 + rhs.as_millis() as u64)
    }
}

/// A convenient wrapper around `std::time::Instant` satisfying the `InstantLike` trait.
///
/// This is the clock the background controllers step their engines with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StdInstant(pub Instant);

impl StdInstant {
    /// Samples the monotonic clock.
    pub fn now() -> Self {
        StdInstant(Instant::now())
    }
}

impl InstantLike for StdInstant {
    fn duration_since(&self, other: Self) -> Duration {
        self.0.saturating_duration_since(other.0)
    }
}

impl Add<Duration> for StdInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        StdInstant(self.0 + rhs)
    }
}

/// Periodic delay anchored to absolute wake-up times.
///
/// `delay_until` sleeps until one period after the previous wake-up rather than for a fixed
/// duration, so the time spent doing work inside a loop does not stretch the loop period. If the
/// deadline has already passed, it returns immediately and re-anchors on the current time.
#[derive(Debug, Default)]
pub struct Rate {
    last_wake: Option<Instant>,
}

impl Rate {
    /// Creates a rate whose first deadline is one period after the first call to `delay_until`.
    pub fn new() -> Self {
        Self { last_wake: None }
    }

    /// Blocks the calling thread until one `period` has elapsed since the previous wake-up.
    ///
    /// Returns the scheduled wake-up time. Loops should timestamp their samples with it rather
    /// than with a fresh reading of the clock, so consecutive samples are exactly one period apart
    /// no matter how late the thread was woken.
    pub fn delay_until(&mut self, period: Duration) -> Instant {
        let now = Instant::now();
        let deadline = self.last_wake.unwrap_or(now) + period;

        let wake = if deadline > now {
            std::thread::sleep(deadline - now);
            deadline
        } else {
            // Overran the period, start counting again from here
            now
        };
        self.last_wake = Some(wake);
        wake
    }
}
