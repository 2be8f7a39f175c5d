// Kinematic mixers from abstract drive commands to per-side wheel commands
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

//! All inputs and outputs are normalized to [-1, 1]. The chassis models scale the outputs by
//! their maximum velocity or voltage before commanding the motors.

use num_traits::clamp;

/// Clamps a command into the normalized range.
pub fn normalize(value: f64) -> f64 {
    clamp(value, -1.0, 1.0)
}

/// Clamps a command into the normalized range and zeroes it if its magnitude is strictly below
/// `threshold`.
pub fn deadband(value: f64, threshold: f64) -> f64 {
    let value = normalize(value);
    if value.abs() < threshold {
        0.0
    } else {
        value
    }
}

/// Mixes a forward speed and a yaw rate into `(left, right)` side speeds.
///
/// Both sides are scaled down together when either would exceed full scale, so their ratio, and
/// therefore the path curvature, is preserved.
pub fn drive_vector(forward_speed: f64, yaw: f64) -> (f64, f64) {
    let forward_speed = normalize(forward_speed);
    let yaw = normalize(yaw);

    let mut left = forward_speed + yaw;
    let mut right = forward_speed - yaw;
    let max_input_mag = left.abs().max(right.abs());
    if max_input_mag > 1.0 {
        left /= max_input_mag;
        right /= max_input_mag;
    }
    (left, right)
}

/// Independent `(left, right)` side speeds with a deadband.
pub fn tank(left_speed: f64, right_speed: f64, threshold: f64) -> (f64, f64) {
    (
        deadband(left_speed, threshold),
        deadband(right_speed, threshold),
    )
}

/// Mixes a forward speed and a yaw rate into `(left, right)` side speeds for joystick driving.
///
/// The side that turns towards the outside of the curve receives the larger of the two input
/// magnitudes and the other side receives the sum or difference, which keeps full-stick inputs at
/// full scale on one side instead of clipping both. Inputs with a magnitude at or below
/// `threshold` are zeroed.
pub fn arcade(forward_speed: f64, yaw: f64, threshold: f64) -> (f64, f64) {
    let mut forward_speed = normalize(forward_speed);
    if forward_speed.abs() <= threshold {
        forward_speed = 0.0;
    }

    let mut yaw = normalize(yaw);
    if yaw.abs() <= threshold {
        yaw = 0.0;
    }

    let max_input = forward_speed.abs().max(yaw.abs()).copysign(forward_speed);

    let (left, right) = if forward_speed >= 0.0 {
        if yaw >= 0.0 {
            (max_input, forward_speed - yaw)
        } else {
            (forward_speed + yaw, max_input)
        }
    } else if yaw >= 0.0 {
        (forward_speed + yaw, max_input)
    } else {
        (max_input, forward_speed - yaw)
    };

    (normalize(left), normalize(right))
}

/// Wheel commands of a four-motor x-drive, in the order
/// `(top_left, top_right, bottom_right, bottom_left)`.
pub type XDriveOutputs = (f64, f64, f64, f64);

/// Mixes a strafe speed, a forward speed and a yaw rate for an x-drive.
///
/// Inputs with a magnitude at or below `threshold` are zeroed. Each wheel is clamped on its own.
pub fn x_arcade(right_speed: f64, forward_speed: f64, yaw: f64, threshold: f64) -> XDriveOutputs {
    let zero_small = |value: f64| {
        let value = normalize(value);
        if value.abs() <= threshold {
            0.0
        } else {
            value
        }
    };
    let right_speed = zero_small(right_speed);
    let forward_speed = zero_small(forward_speed);
    let yaw = zero_small(yaw);

    (
        normalize(forward_speed + yaw + right_speed),
        normalize(forward_speed - yaw - right_speed),
        normalize(forward_speed - yaw + right_speed),
        normalize(forward_speed + yaw - right_speed),
    )
}
