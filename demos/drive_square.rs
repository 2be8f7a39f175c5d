//! Drives a simulated skid-steer robot around a square and reports the encoder readings.
//! This example requires the `--features simulation` flag to be enabled.
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

#[cfg(feature = "simulation")]
pub fn main() {
    use std::sync::Arc;
    use std::time::Instant;

    use chassis_pid::builder::ChassisControllerBuilder;
    use chassis_pid::chassis::ChassisScales;
    use chassis_pid::device::{Gearset, Motor};
    use chassis_pid::pid::PidGains;
    use chassis_pid::sim::SimMotor;
    use chassis_pid::units::{QAngle, QLength};

    // RUST_LOG=info shows every movement the controller arms
    env_logger::init();

    const TIME_CONSTANT: f64 = 0.05;

    let left = SimMotor::new(Gearset::Green, TIME_CONSTANT);
    let right = SimMotor::new(Gearset::Green, TIME_CONSTANT);

    let scales = ChassisScales::from_dimensions(QLength::inches(4.0), QLength::inches(11.5))
        .expect("Invalid dimensions");
    let chassis = ChassisControllerBuilder::default()
        .with_motors(Arc::new(left.clone()), Arc::new(right.clone()))
        .with_gains(
            PidGains::new(0.005, 0.0, 0.0001),
            PidGains::new(0.004, 0.0, 0.0001),
        )
        .with_gearset(Gearset::Green.into())
        .with_dimensions(scales)
        .build()
        .expect("Invalid chassis");

    let start = Instant::now();
    for side in 1..=4 {
        chassis.move_distance(QLength::feet(2.0));
        chassis.turn_angle(QAngle::degrees(90.0));
        println!(
            "side {side} done after {:.2}s: left {:.1} deg, right {:.1} deg",
            start.elapsed().as_secs_f64(),
            left.position().unwrap_or(f64::NAN),
            right.position().unwrap_or(f64::NAN),
        );
    }
}

#[cfg(not(feature = "simulation"))]
fn main() {
    eprintln!("This example requires the `simulation` feature to be enabled.");
}
