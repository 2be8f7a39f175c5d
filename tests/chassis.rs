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

use fixtures::mock::*;
use fixtures::threads::finishes_within;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chassis_pid::chassis::{ChassisController, ChassisScales};
use chassis_pid::device::{Gearset, GearsetRatioPair, Motor};
use chassis_pid::model::{ChassisModel, SkidSteerModel};
use chassis_pid::pid::{IterativePid, PidConfigBuilder};
use chassis_pid::time::StdInstant;
use chassis_pid::units::{QAngle, QLength};

const TIMEOUT: Duration = Duration::from_secs(5);

fn make_pid(kp: f64) -> IterativePid<StdInstant, f64> {
    IterativePid::new(
        PidConfigBuilder::default()
            .kp(kp)
            .settle(quick_settle())
            .build()
            .unwrap(),
    )
}

fn skid_steer(left: &Arc<MockMotor>, right: &Arc<MockMotor>) -> Arc<dyn ChassisModel> {
    Arc::new(SkidSteerModel::new(
        Arc::clone(left) as Arc<dyn Motor>,
        Arc::clone(right) as Arc<dyn Motor>,
        100.0,
        12000.0,
    ))
}

fn doubled() -> ChassisScales {
    ChassisScales::new(2.0, 2.0).unwrap()
}

mod test_chassis_pid {
    use super::*;
    use chassis_pid::chassis::{ChassisControllerPid, ChassisError, MovementMode};
    use chassis_pid::device::EncoderUnits;

    struct Rig {
        left: Arc<MockMotor>,
        right: Arc<MockMotor>,
        chassis: Arc<ChassisControllerPid>,
    }

    fn make_rig(pair: GearsetRatioPair, scales: ChassisScales, running: bool) -> Rig {
        let left = MockMotor::new();
        let right = MockMotor::new();
        let mut chassis = ChassisControllerPid::new(
            skid_steer(&left, &right),
            make_pid(0.1),
            make_pid(0.1),
            make_pid(0.1),
            pair,
            scales,
        )
        .unwrap();
        if running {
            chassis.start_thread();
        }
        Rig {
            left,
            right,
            chassis: Arc::new(chassis),
        }
    }

    fn idle_rig() -> Rig {
        make_rig(Gearset::Red.into(), doubled(), false)
    }

    fn running_rig() -> Rig {
        make_rig(Gearset::Red.into(), doubled(), true)
    }

    #[test]
    fn test_zero_gear_ratio_is_rejected() {
        let left = MockMotor::new();
        let right = MockMotor::new();

        // Once per loop, as a sanity check that nothing is shared between attempts
        for _ in 0..3 {
            let result = ChassisControllerPid::new(
                skid_steer(&left, &right),
                make_pid(0.1),
                make_pid(0.1),
                make_pid(0.1),
                GearsetRatioPair::new(Gearset::Red, 0.0),
                doubled(),
            );
            assert_eq!(result.err(), Some(ChassisError::ZeroGearRatio));
        }
    }

    #[test]
    fn test_invalid_scales_are_rejected() {
        let left = MockMotor::new();
        let right = MockMotor::new();
        let result = ChassisControllerPid::new(
            skid_steer(&left, &right),
            make_pid(0.1),
            make_pid(0.1),
            make_pid(0.1),
            Gearset::Red.into(),
            ChassisScales {
                straight: f64::NAN,
                turn: 1.0,
            },
        );
        assert!(matches!(
            result.err(),
            Some(ChassisError::InvalidScales { turn, .. }) if turn == 1.0
        ));
    }

    #[test]
    fn test_construction_configures_motors() {
        let rig = make_rig(Gearset::Green.into(), doubled(), false);
        for motor in [&rig.left, &rig.right] {
            let state = motor.state();
            assert_eq!(state.gearset, Gearset::Green);
            assert_eq!(state.encoder_units, Some(EncoderUnits::Degrees));
        }
        assert!(!rig.chassis.is_running());
        assert_eq!(rig.chassis.mode(), MovementMode::None);
    }

    #[test]
    fn test_move_distance_arms_distance_and_angle_loops() {
        let rig = idle_rig();
        rig.chassis.move_distance_async(QLength::meters(4.0));

        assert_eq!(rig.chassis.mode(), MovementMode::Distance);
        assert_eq!(rig.chassis.distance_pid().target(), 8.0);
        assert_eq!(rig.chassis.angle_pid().target(), 0.0);
        assert!(!rig.chassis.distance_pid().is_disabled());
        assert!(!rig.chassis.angle_pid().is_disabled());
        assert!(rig.chassis.turn_pid().is_disabled());
    }

    #[test]
    fn test_gear_ratio_scales_targets() {
        let rig = make_rig(GearsetRatioPair::new(Gearset::Red, 2.0), doubled(), false);
        rig.chassis.move_distance_async(QLength::meters(4.0));
        assert_eq!(rig.chassis.distance_pid().target(), 16.0);

        rig.chassis.turn_angle_async(QAngle::degrees(6.0));
        assert_eq!(rig.chassis.turn_pid().target(), 24.0);
    }

    #[test]
    fn test_turn_angle_arms_turn_loop() {
        let rig = idle_rig();
        rig.chassis.turn_angle_async(QAngle::degrees(6.0));

        assert_eq!(rig.chassis.mode(), MovementMode::Angle);
        assert_eq!(rig.chassis.turn_pid().target(), 12.0);
        assert!(!rig.chassis.turn_pid().is_disabled());
        assert!(rig.chassis.distance_pid().is_disabled());
        assert!(rig.chassis.angle_pid().is_disabled());
    }

    #[test]
    fn test_mirrored_turns() {
        let rig = idle_rig();
        rig.chassis.set_turns_mirrored(true);
        rig.chassis.turn_angle_async(QAngle::degrees(6.0));
        assert_eq!(rig.chassis.turn_pid().target(), -12.0);

        // Distance movements are unaffected
        rig.chassis.move_distance_async(QLength::meters(4.0));
        assert_eq!(rig.chassis.distance_pid().target(), 8.0);
    }

    #[test]
    fn test_raw_targets_are_motor_degrees() {
        let rig = idle_rig();
        rig.chassis.move_distance_raw_async(10.0);
        assert!((rig.chassis.distance_pid().target() - 10.0).abs() < 1e-9);

        rig.chassis.turn_angle_raw_async(30.0);
        assert!((rig.chassis.turn_pid().target() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_wait_on_idle_controller_returns_immediately() {
        let rig = running_rig();
        let chassis = Arc::clone(&rig.chassis);
        assert!(finishes_within(Duration::from_millis(500), move || {
            chassis.wait_until_settled();
            chassis.wait_until_settled();
        }));
        assert_eq!(rig.left.state().velocity_commands, 0);
        assert_eq!(rig.right.state().velocity_commands, 0);
    }

    #[test]
    fn test_move_distance_settles_and_stops() {
        let rig = running_rig();
        let chassis = Arc::clone(&rig.chassis);
        assert!(finishes_within(TIMEOUT, move || {
            chassis.move_distance(QLength::meters(4.0))
        }));

        assert_eq!(rig.chassis.mode(), MovementMode::None);
        assert!(rig.chassis.distance_pid().is_disabled());
        assert!(rig.chassis.angle_pid().is_disabled());
        assert!(rig.chassis.turn_pid().is_disabled());

        for motor in [&rig.left, &rig.right] {
            let state = motor.state();
            assert_eq!(state.last_velocity, 0);
            assert!(state.stops >= 1);
            assert!((state.position - 8.0).abs() <= 1.5, "ended at {}", state.position);
        }
    }

    #[test]
    fn test_turn_angle_settles_and_stops() {
        let rig = running_rig();
        let chassis = Arc::clone(&rig.chassis);
        assert!(finishes_within(TIMEOUT, move || {
            chassis.turn_angle(QAngle::degrees(6.0))
        }));

        assert_eq!(rig.chassis.mode(), MovementMode::None);
        let left = rig.left.state().position;
        let right = rig.right.state().position;
        assert!(left > 0.0 && right < 0.0);
        assert!((left - right - 12.0).abs() <= 2.0, "turned {}", left - right);
        assert_eq!(rig.left.state().last_velocity, 0);
    }

    #[test]
    fn test_new_movement_interrupts_wait() {
        let rig = running_rig();

        // Far enough that it cannot settle before being replaced
        rig.chassis.move_distance_async(QLength::meters(1000.0));
        let waiter = Arc::clone(&rig.chassis);
        let handle = thread::spawn(move || waiter.wait_until_settled());

        thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());
        rig.chassis.turn_angle_async(QAngle::degrees(6.0));

        // The waiter follows the turn and returns once the turn settles
        let deadline = Instant::now() + TIMEOUT;
        while !handle.is_finished() {
            assert!(Instant::now() < deadline, "waiter did not return");
            thread::sleep(Duration::from_millis(5));
        }
        assert!(handle.join().is_ok());

        assert_eq!(rig.chassis.mode(), MovementMode::None);
        assert_eq!(rig.chassis.turn_pid().target(), 12.0);
        assert!(rig.chassis.distance_pid().is_disabled());
        assert!(rig.chassis.turn_pid().is_disabled());
    }

    #[test]
    fn test_stop_abandons_movement() {
        let rig = running_rig();
        rig.chassis.move_distance_async(QLength::meters(1000.0));
        thread::sleep(Duration::from_millis(30));

        rig.chassis.stop();
        assert!(rig.chassis.distance_pid().is_disabled());
        assert!(rig.chassis.angle_pid().is_disabled());
        assert_eq!(rig.left.state().last_velocity, 0);

        // Disabled loops count as settled, so waiting returns right away
        let chassis = Arc::clone(&rig.chassis);
        assert!(finishes_within(Duration::from_millis(500), move || {
            chassis.wait_until_settled()
        }));
        assert_eq!(rig.chassis.mode(), MovementMode::None);
    }

    #[test]
    fn test_worker_survives_device_errors() {
        let rig = running_rig();
        rig.left.set_failing(true);
        rig.chassis.move_distance_async(QLength::meters(4.0));

        thread::sleep(Duration::from_millis(50));
        assert_eq!(rig.left.state().velocity_commands, 0);

        rig.left.set_failing(false);
        let chassis = Arc::clone(&rig.chassis);
        assert!(finishes_within(TIMEOUT, move || chassis.wait_until_settled()));
        assert!(rig.left.state().velocity_commands > 0);
    }

    #[test]
    fn test_drop_joins_worker() {
        let rig = running_rig();
        rig.chassis.move_distance_async(QLength::meters(1000.0));
        let Rig { chassis, .. } = rig;
        assert!(finishes_within(Duration::from_secs(1), move || drop(chassis)));
    }
}

mod test_chassis_integrated {
    use super::*;
    use chassis_pid::chassis::{ChassisControllerIntegrated, ChassisError};
    use chassis_pid::pid::SettleConfig;

    struct Rig {
        left: Arc<MockMotor>,
        right: Arc<MockMotor>,
        chassis: Arc<ChassisControllerIntegrated>,
    }

    fn make_rig(pair: GearsetRatioPair) -> Rig {
        make_rig_with(pair, quick_settle())
    }

    fn make_rig_with(pair: GearsetRatioPair, settle: SettleConfig<f64>) -> Rig {
        let left = MockMotor::new();
        let right = MockMotor::new();
        let chassis = ChassisControllerIntegrated::new(
            skid_steer(&left, &right),
            Arc::clone(&left) as Arc<dyn Motor>,
            Arc::clone(&right) as Arc<dyn Motor>,
            pair,
            doubled(),
            settle,
        )
        .unwrap();
        Rig {
            left,
            right,
            chassis: Arc::new(chassis),
        }
    }

    #[test]
    fn test_zero_gear_ratio_is_rejected() {
        let left = MockMotor::new();
        let right = MockMotor::new();
        let result = ChassisControllerIntegrated::new(
            skid_steer(&left, &right),
            Arc::clone(&left) as Arc<dyn Motor>,
            Arc::clone(&right) as Arc<dyn Motor>,
            GearsetRatioPair::new(Gearset::Blue, 0.0),
            doubled(),
            quick_settle(),
        );
        assert_eq!(result.err(), Some(ChassisError::ZeroGearRatio));
    }

    #[test]
    fn test_wait_on_idle_controller_returns_immediately() {
        // The default dwell time is 250ms
        let rig = make_rig_with(Gearset::Red.into(), SettleConfig::default());
        let chassis = Arc::clone(&rig.chassis);
        assert!(finishes_within(Duration::from_millis(100), move || {
            chassis.wait_until_settled();
            chassis.wait_until_settled();
        }));
        for motor in [&rig.left, &rig.right] {
            let state = motor.state();
            assert_eq!(state.velocity_commands, 0);
            assert_eq!(state.stops, 0);
        }

        // Once a movement settled the controller is idle again
        let chassis = Arc::clone(&rig.chassis);
        assert!(finishes_within(TIMEOUT, move || {
            chassis.move_distance(QLength::meters(1.0))
        }));
        let stops = rig.left.state().stops;
        let chassis = Arc::clone(&rig.chassis);
        assert!(finishes_within(Duration::from_millis(100), move || {
            chassis.wait_until_settled()
        }));
        assert_eq!(rig.left.state().stops, stops);
    }

    #[test]
    fn test_move_distance_commands_both_sides() {
        let rig = make_rig(Gearset::Red.into());
        let chassis = Arc::clone(&rig.chassis);
        assert!(finishes_within(TIMEOUT, move || {
            chassis.move_distance(QLength::meters(4.0))
        }));

        for motor in [&rig.left, &rig.right] {
            let state = motor.state();
            assert_eq!(state.target_position, 8.0);
            assert_eq!(state.last_velocity, 0);
            assert!(state.stops >= 1);
        }
    }

    #[test]
    fn test_turn_angle_commands_opposite_targets() {
        let rig = make_rig(Gearset::Red.into());
        rig.chassis.turn_angle_async(QAngle::degrees(6.0));
        assert_eq!(rig.left.state().target_position, 12.0);
        assert_eq!(rig.right.state().target_position, -12.0);

        rig.chassis.set_turns_mirrored(true);
        rig.chassis.turn_angle_async(QAngle::degrees(6.0));
        assert_eq!(rig.left.state().target_position, -12.0);
        assert_eq!(rig.right.state().target_position, 12.0);
    }

    #[test]
    fn test_gear_ratio_is_applied_once() {
        let rig = make_rig(GearsetRatioPair::new(Gearset::Green, 2.0));
        rig.chassis.move_distance_async(QLength::meters(4.0));
        assert_eq!(rig.left.state().target_position, 16.0);
        assert_eq!(rig.left.state().gearset, Gearset::Green);
    }

    #[test]
    fn test_stop_disables_sides() {
        let rig = make_rig(Gearset::Red.into());
        rig.chassis.move_distance_async(QLength::meters(4.0));
        rig.chassis.stop();
        assert_eq!(rig.left.state().last_velocity, 0);
        assert_eq!(rig.right.state().last_velocity, 0);

        let chassis = Arc::clone(&rig.chassis);
        assert!(finishes_within(Duration::from_millis(500), move || {
            chassis.wait_until_settled()
        }));
    }
}

mod test_models {
    use super::*;
    use chassis_pid::device::{DeviceError, MotorGroup, RotarySensor};
    use chassis_pid::model::{EncoderSnapshot, XDriveModel};

    fn pair() -> (Arc<MockMotor>, Arc<MockMotor>, Arc<dyn ChassisModel>) {
        let left = MockMotor::new();
        let right = MockMotor::new();
        let model = skid_steer(&left, &right);
        (left, right, model)
    }

    #[test]
    fn test_skid_steer_velocity_commands() {
        let (left, right, model) = pair();

        assert!(model.drive_vector(0.5, 0.25).is_ok());
        assert_eq!(left.state().last_velocity, 75);
        assert_eq!(right.state().last_velocity, 25);

        // Saturation keeps the ratio between the sides
        assert!(model.drive_vector(1.0, 0.5).is_ok());
        assert_eq!(left.state().last_velocity, 100);
        assert_eq!(right.state().last_velocity, 33);

        assert!(model.rotate(2.0).is_ok());
        assert_eq!(left.state().last_velocity, 100);
        assert_eq!(right.state().last_velocity, -100);

        assert!(model.forward(-0.5).is_ok());
        assert_eq!(left.state().last_velocity, -50);
        assert_eq!(right.state().last_velocity, -50);

        assert!(model.stop().is_ok());
        assert_eq!(left.state().stops, 1);
        assert_eq!(right.state().stops, 1);
    }

    #[test]
    fn test_skid_steer_single_side() {
        let (left, right, model) = pair();
        assert!(model.left(0.5).is_ok());
        assert_eq!(left.state().last_velocity, 50);
        assert_eq!(right.state().velocity_commands, 0);

        assert!(model.right(-0.25).is_ok());
        assert_eq!(right.state().last_velocity, -25);
    }

    #[test]
    fn test_skid_steer_voltage_commands() {
        let (left, right, model) = pair();

        assert!(model.tank(0.5, 0.05, 0.1).is_ok());
        assert_eq!(left.state().last_voltage, 6000);
        assert_eq!(right.state().last_voltage, 0);

        assert!(model.arcade(0.5, 0.25, 0.0).is_ok());
        assert_eq!(left.state().last_voltage, 6000);
        assert_eq!(right.state().last_voltage, 3000);

        assert!(model.drive_vector_voltage(0.5, -0.25).is_ok());
        assert_eq!(left.state().last_voltage, 3000);
        assert_eq!(right.state().last_voltage, 9000);
    }

    #[test]
    fn test_skid_steer_sensors() {
        let (left, right, model) = pair();
        left.set_position(10.7);
        right.set_position(-3.2);

        let snapshot = model.sensor_vals().unwrap();
        assert_eq!(snapshot, EncoderSnapshot { left: 10, right: -3 });
        assert_eq!(snapshot.distance(), 3.5);
        assert_eq!(snapshot.angle(), 13.0);

        assert!(model.reset_sensors().is_ok());
        assert_eq!(model.sensor_vals().unwrap(), EncoderSnapshot::default());
    }

    #[test]
    fn test_skid_steer_reports_first_error() {
        let (left, right, model) = pair();
        left.set_failing(true);
        assert_eq!(model.forward(0.5), Err(DeviceError::Disconnected));

        // The healthy side was still commanded
        assert_eq!(right.state().last_velocity, 50);
    }

    #[test]
    fn test_encoder_snapshot_difference() {
        let now = EncoderSnapshot { left: 10, right: 4 };
        let start = EncoderSnapshot { left: 4, right: 1 };
        let delta = now - start;
        assert_eq!(delta, EncoderSnapshot { left: 6, right: 3 });
        assert_eq!(delta.distance(), 4.5);
        assert_eq!(delta.angle(), 3.0);
    }

    fn x_drive() -> ([Arc<MockMotor>; 4], XDriveModel) {
        let motors = [
            MockMotor::new(),
            MockMotor::new(),
            MockMotor::new(),
            MockMotor::new(),
        ];
        let model = XDriveModel::new(
            Arc::clone(&motors[0]) as Arc<dyn Motor>,
            Arc::clone(&motors[1]) as Arc<dyn Motor>,
            Arc::clone(&motors[2]) as Arc<dyn Motor>,
            Arc::clone(&motors[3]) as Arc<dyn Motor>,
            100.0,
            12000.0,
        );
        (motors, model)
    }

    fn velocities(motors: &[Arc<MockMotor>; 4]) -> [i16; 4] {
        [0, 1, 2, 3].map(|i| motors[i].state().last_velocity)
    }

    fn voltages(motors: &[Arc<MockMotor>; 4]) -> [i16; 4] {
        [0, 1, 2, 3].map(|i| motors[i].state().last_voltage)
    }

    #[test]
    fn test_x_drive_commands() {
        let (motors, model) = x_drive();

        // Order is top left, top right, bottom right, bottom left
        assert!(model.forward(1.0).is_ok());
        assert_eq!(velocities(&motors), [100, 100, 100, 100]);

        assert!(model.rotate(0.5).is_ok());
        assert_eq!(velocities(&motors), [50, -50, -50, 50]);

        assert!(model.strafe(0.5).is_ok());
        assert_eq!(velocities(&motors), [50, -50, 50, -50]);

        assert!(model.x_arcade(0.0, 0.5, 0.25, 0.0).is_ok());
        assert_eq!(voltages(&motors), [9000, 3000, 3000, 9000]);

        assert!(model.tank(0.5, -0.5, 0.0).is_ok());
        assert_eq!(voltages(&motors), [6000, -6000, -6000, 6000]);

        assert!(model.stop().is_ok());
        assert_eq!(velocities(&motors), [0, 0, 0, 0]);
    }

    #[test]
    fn test_x_drive_reads_top_motors() {
        let (motors, model) = x_drive();
        motors[0].set_position(20.0);
        motors[1].set_position(10.0);
        motors[3].set_position(-100.0);
        assert_eq!(
            model.sensor_vals().unwrap(),
            EncoderSnapshot {
                left: 20,
                right: 10
            }
        );
    }

    #[test]
    fn test_motor_group() {
        let first = MockMotor::new();
        let second = MockMotor::new();
        first.set_position(42.0);
        let group = MotorGroup::new(vec![
            Arc::clone(&first) as Arc<dyn Motor>,
            Arc::clone(&second) as Arc<dyn Motor>,
        ])
        .unwrap();

        assert!(group.move_velocity(20).is_ok());
        assert_eq!(first.state().last_velocity, 20);
        assert_eq!(second.state().last_velocity, 20);

        // Readings come from the first motor
        assert_eq!(group.position(), Ok(43.0));
        assert_eq!(group.encoder().get(), Ok(43.0));

        first.set_failing(true);
        assert_eq!(group.move_velocity(-20), Err(DeviceError::Disconnected));
        assert_eq!(second.state().last_velocity, -20);

        assert!(matches!(
            MotorGroup::new(Vec::new()).err(),
            Some(DeviceError::EmptyGroup)
        ));
    }
}

mod test_async_pos {
    use super::*;
    use chassis_pid::async_pos::{
        AsyncPosIntegratedController, AsyncPosPidController, AsyncPositionController,
    };

    fn make_controller(motor: &Arc<MockMotor>, ratio: f64) -> Arc<AsyncPosPidController> {
        let mut controller = AsyncPosPidController::new(
            Arc::clone(motor) as Arc<dyn Motor>,
            motor.encoder(),
            make_pid(0.1),
            ratio,
            100.0,
        );
        controller.start_thread();
        Arc::new(controller)
    }

    #[test]
    fn test_pid_controller_applies_ratio_and_settles() {
        let motor = MockMotor::new();
        let controller = make_controller(&motor, 2.0);
        assert!(controller.is_running());

        controller.set_target(10.0);
        assert_eq!(controller.target(), 20.0);

        let waiter = Arc::clone(&controller);
        assert!(finishes_within(TIMEOUT, move || waiter.wait_until_settled()));
        assert!(controller.error().abs() <= 1.0);
        assert!((motor.state().position - 20.0).abs() <= 1.0);
    }

    #[test]
    fn test_wait_without_worker_returns() {
        let motor = MockMotor::new();
        let controller = Arc::new(AsyncPosPidController::new(
            Arc::clone(&motor) as Arc<dyn Motor>,
            motor.encoder(),
            make_pid(0.1),
            1.0,
            100.0,
        ));
        assert!(!controller.is_running());

        controller.set_target(10.0);
        let waiter = Arc::clone(&controller);
        assert!(finishes_within(TIMEOUT, move || waiter.wait_until_settled()));
        assert!(!controller.is_settled());
        assert_eq!(motor.state().velocity_commands, 0);
    }

    #[test]
    fn test_pid_controller_targets_are_relative() {
        let motor = MockMotor::new();
        motor.set_position(100.0);
        let controller = make_controller(&motor, 1.0);

        controller.set_target(10.0);
        let waiter = Arc::clone(&controller);
        assert!(finishes_within(TIMEOUT, move || waiter.wait_until_settled()));
        assert!((motor.state().position - 110.0).abs() <= 1.0);
    }

    #[test]
    fn test_pid_controller_disable() {
        let motor = MockMotor::new();
        let controller = make_controller(&motor, 1.0);
        controller.set_target(1000.0);
        thread::sleep(Duration::from_millis(30));

        controller.stop();
        assert!(controller.is_disabled());
        assert!(controller.is_settled());
        assert_eq!(motor.state().last_velocity, 0);

        // No commands while disabled
        let commands = motor.state().velocity_commands;
        thread::sleep(Duration::from_millis(50));
        assert_eq!(motor.state().velocity_commands, commands);

        // A new target re-enables the loop
        controller.set_target(5.0);
        assert!(!controller.is_disabled());
    }

    #[test]
    fn test_pid_controller_output_limits() {
        let motor = MockMotor::new();
        let controller = make_controller(&motor, 1.0);
        assert!(controller.set_output_limits(-0.2, 0.2).is_ok());
        assert!(controller.set_output_limits(0.2, -0.2).is_err());

        controller.set_target(1000.0);
        thread::sleep(Duration::from_millis(50));
        assert!(controller.output() <= 0.2);
        assert!(motor.state().last_velocity <= 20);
        assert_eq!(controller.pid().config().output_max(), 0.2);
    }

    #[test]
    fn test_pid_controller_tare() {
        let motor = MockMotor::new();
        motor.set_position(55.0);
        let controller = make_controller(&motor, 1.0);
        controller.tare_position();
        assert_eq!(motor.state().position, 0.0);
    }

    #[test]
    fn test_integrated_controller() {
        let motor = MockMotor::new();
        let controller = Arc::new(AsyncPosIntegratedController::new(
            Arc::clone(&motor) as Arc<dyn Motor>,
            GearsetRatioPair::new(Gearset::Blue, 2.0),
            600.0,
            quick_settle(),
        ));
        assert_eq!(motor.state().gearset, Gearset::Blue);

        controller.set_target(10.0);
        assert_eq!(controller.target(), 20.0);
        assert_eq!(motor.state().target_position, 20.0);
        assert_eq!(controller.error(), 0.0);

        let waiter = Arc::clone(&controller);
        assert!(finishes_within(TIMEOUT, move || waiter.wait_until_settled()));

        controller.reset();
        assert_eq!(controller.target(), 0.0);
        assert_eq!(motor.state().position, 0.0);
    }

    #[test]
    fn test_integrated_controller_disable_holds_target() {
        let motor = MockMotor::new();
        let controller = AsyncPosIntegratedController::new(
            Arc::clone(&motor) as Arc<dyn Motor>,
            Gearset::Red.into(),
            100.0,
            quick_settle(),
        );

        controller.flip_disable(true);
        assert!(controller.is_settled());
        assert_eq!(motor.state().last_velocity, 0);

        // The target is remembered but not commanded until re-enabled
        controller.set_target(30.0);
        assert_eq!(motor.state().target_position, 0.0);
        controller.flip_disable(false);
        assert_eq!(motor.state().target_position, 30.0);
    }
}

mod test_builders {
    use super::*;
    use chassis_pid::async_pos::AsyncPositionController;
    use chassis_pid::builder::{AsyncPosControllerBuilder, BuildError, ChassisControllerBuilder};
    use chassis_pid::chassis::ChassisError;
    use chassis_pid::pid::{PidConfigError, PidGains, SettleConfig};

    fn gains() -> PidGains<f64> {
        PidGains::new(0.1, 0.0, 0.0)
    }

    fn motors() -> (Arc<MockMotor>, Arc<MockMotor>) {
        (MockMotor::new(), MockMotor::new())
    }

    fn with_pair(left: &Arc<MockMotor>, right: &Arc<MockMotor>) -> ChassisControllerBuilder {
        ChassisControllerBuilder::default().with_motors(
            Arc::clone(left) as Arc<dyn Motor>,
            Arc::clone(right) as Arc<dyn Motor>,
        )
    }

    #[test]
    fn test_no_motors() {
        assert_eq!(
            ChassisControllerBuilder::default().build().err(),
            Some(BuildError::NoMotors)
        );
        assert_eq!(
            ChassisControllerBuilder::default()
                .with_gains(gains(), gains())
                .build_pid()
                .err(),
            Some(BuildError::NoMotors)
        );
        assert_eq!(
            AsyncPosControllerBuilder::default().build().err(),
            Some(BuildError::NoMotors)
        );
    }

    #[test]
    fn test_pid_requires_gains() {
        let (left, right) = motors();
        assert_eq!(
            with_pair(&left, &right).build_pid().err(),
            Some(BuildError::MissingGains)
        );
    }

    #[test]
    fn test_zero_ratio_is_wrapped() {
        let (left, right) = motors();
        let result = with_pair(&left, &right)
            .with_gearset(GearsetRatioPair::new(Gearset::Green, 0.0))
            .build();
        assert_eq!(
            result.err(),
            Some(BuildError::Chassis(ChassisError::ZeroGearRatio))
        );
    }

    #[test]
    fn test_invalid_settle_config_is_wrapped() {
        let (left, right) = motors();
        let settle = SettleConfig {
            error_tolerance: -1.0,
            ..quick_settle()
        };
        let result = with_pair(&left, &right)
            .with_gains(gains(), gains())
            .with_settle_config(settle)
            .build_pid();
        assert_eq!(
            result.err(),
            Some(BuildError::Config(PidConfigError::InvalidSettleTolerance))
        );
    }

    #[test]
    fn test_defaults() {
        let (left, right) = motors();
        let chassis = with_pair(&left, &right)
            .with_gains(gains(), gains())
            .build_pid()
            .unwrap();

        assert!(chassis.is_running());
        assert_eq!(chassis.gearset_ratio_pair(), Gearset::Red.into());
        assert_eq!(
            chassis.chassis_scales(),
            ChassisScales {
                straight: 1.0,
                turn: 1.0
            }
        );
        assert_eq!(chassis.model().max_velocity(), 100.0);
        assert_eq!(chassis.model().max_voltage(), 12000.0);

        // The angle loop shares the turn gains unless given its own
        assert_eq!(chassis.angle_pid().config().kp(), 0.1);
    }

    #[test]
    fn test_max_velocity_follows_gearset_unless_given() {
        let (left, right) = motors();
        let chassis = with_pair(&left, &right)
            .with_gains(gains(), gains())
            .with_gearset(Gearset::Green.into())
            .build_pid()
            .unwrap();
        assert_eq!(chassis.model().max_velocity(), 200.0);

        let chassis = with_pair(&left, &right)
            .with_gains(gains(), gains())
            .with_gearset(Gearset::Green.into())
            .with_max_velocity(150.0)
            .with_max_voltage(6000.0)
            .build_pid()
            .unwrap();
        assert_eq!(chassis.model().max_velocity(), 150.0);
        assert_eq!(chassis.model().max_voltage(), 6000.0);
    }

    #[test]
    fn test_separate_angle_gains_and_filter() {
        let (left, right) = motors();
        let chassis = with_pair(&left, &right)
            .with_all_gains(gains(), gains(), PidGains::new(0.3, 0.0, 0.0))
            .with_derivative_filter(0.05)
            .build_pid()
            .unwrap();
        assert_eq!(chassis.angle_pid().config().kp(), 0.3);
        assert_eq!(chassis.turn_pid().config().kp(), 0.1);
        assert_eq!(chassis.distance_pid().config().filter_tc(), Some(0.05));
    }

    #[test]
    fn test_external_sensors() {
        let (left, right) = motors();
        let left_sensor = MockSensor::new(7.0);
        let right_sensor = MockSensor::new(-7.0);
        let chassis = with_pair(&left, &right)
            .with_sensors(left_sensor, right_sensor)
            .with_gains(gains(), gains())
            .build_pid()
            .unwrap();

        let snapshot = chassis.model().sensor_vals().unwrap();
        assert_eq!((snapshot.left, snapshot.right), (7, -7));
    }

    #[test]
    fn test_without_gains_builds_integrated() {
        let (left, right) = motors();
        let chassis = with_pair(&left, &right)
            .with_dimensions(doubled())
            .build()
            .unwrap();

        chassis.move_distance_async(QLength::meters(1.0));
        assert_eq!(left.state().target_position, 2.0);
        assert_eq!(right.state().target_position, 2.0);
        assert_eq!(left.state().velocity_commands, 0);
    }

    #[test]
    fn test_x_drive_integrated_commands_all_wheels() {
        let motors = [
            MockMotor::new(),
            MockMotor::new(),
            MockMotor::new(),
            MockMotor::new(),
        ];
        let chassis = ChassisControllerBuilder::default()
            .with_x_drive_motors(
                Arc::clone(&motors[0]) as Arc<dyn Motor>,
                Arc::clone(&motors[1]) as Arc<dyn Motor>,
                Arc::clone(&motors[2]) as Arc<dyn Motor>,
                Arc::clone(&motors[3]) as Arc<dyn Motor>,
            )
            .build_integrated()
            .unwrap();

        chassis.turn_angle_async(QAngle::degrees(10.0));
        let targets = [0, 1, 2, 3].map(|i| motors[i].state().target_position);
        // Top left, top right, bottom right, bottom left
        assert_eq!(targets, [10.0, -10.0, -10.0, 10.0]);
    }

    #[test]
    fn test_async_builder_pid() {
        let motor = MockMotor::new();
        let controller = AsyncPosControllerBuilder::default()
            .with_motor(Arc::clone(&motor) as Arc<dyn Motor>)
            .with_gains(gains())
            .with_gearset(GearsetRatioPair::new(Gearset::Blue, 3.0))
            .with_max_velocity(100.0)
            .with_settle_config(quick_settle())
            .build()
            .unwrap();
        assert_eq!(motor.state().gearset, Gearset::Blue);

        controller.set_target(4.0);
        assert_eq!(controller.target(), 12.0);

        let controller: Arc<dyn AsyncPositionController> = Arc::from(controller);
        let waiter = Arc::clone(&controller);
        assert!(finishes_within(TIMEOUT, move || waiter.wait_until_settled()));
        assert!((motor.state().position - 12.0).abs() <= 1.0);
    }

    #[test]
    fn test_async_builder_integrated_uses_motor_gearing() {
        let motor = MockMotor::new();
        assert!(motor.set_gearing(Gearset::Green).is_ok());
        let controller = AsyncPosControllerBuilder::default()
            .with_motor(Arc::clone(&motor) as Arc<dyn Motor>)
            .build()
            .unwrap();

        controller.set_target(5.0);
        assert_eq!(motor.state().target_position, 5.0);
        assert_eq!(motor.state().gearset, Gearset::Green);
    }
}
