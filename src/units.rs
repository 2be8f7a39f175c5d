// Physical quantities accepted at the chassis command boundary
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

use core::ops::{Mul, Neg};

const METERS_PER_INCH: f64 = 0.0254;
const METERS_PER_FOOT: f64 = 0.3048;

/// A length, stored in meters.
#[derive(Copy, Clone, Debug, Default, PartialEq, PartialOrd)]
pub struct QLength(f64);

impl QLength {
    /// A length of `value` meters.
    pub const fn meters(value: f64) -> Self {
        QLength(value)
    }

    /// A length of `value` centimeters.
    pub fn centimeters(value: f64) -> Self {
        QLength(value / 100.0)
    }

    /// A length of `value` inches.
    pub fn inches(value: f64) -> Self {
        QLength(value * METERS_PER_INCH)
    }

    /// A length of `value` feet.
    pub fn feet(value: f64) -> Self {
        QLength(value * METERS_PER_FOOT)
    }

    /// The length in meters.
    pub fn as_meters(self) -> f64 {
        self.0
    }

    /// The length in inches.
    pub fn as_inches(self) -> f64 {
        self.0 / METERS_PER_INCH
    }
}

/// A planar angle, stored in degrees.
#[derive(Copy, Clone, Debug, Default, PartialEq, PartialOrd)]
pub struct QAngle(f64);

impl QAngle {
    /// An angle of `value` degrees.
    pub const fn degrees(value: f64) -> Self {
        QAngle(value)
    }

    /// An angle of `value` radians.
    pub fn radians(value: f64) -> Self {
        QAngle(value.to_degrees())
    }

    /// The angle in degrees.
    pub fn as_degrees(self) -> f64 {
        self.0
    }

    /// The angle in radians.
    pub fn as_radians(self) -> f64 {
        self.0.to_radians()
    }
}

impl Mul<f64> for QLength {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        QLength(self.0 * rhs)
    }
}

impl Neg for QLength {
    type Output = Self;

    fn neg(self) -> Self {
        QLength(-self.0)
    }
}

impl Mul<f64> for QAngle {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        QAngle(self.0 * rhs)
    }
}

impl Neg for QAngle {
    type Output = Self;

    fn neg(self) -> Self {
        QAngle(-self.0)
    }
}
