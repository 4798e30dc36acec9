use proptest::prelude::*;
use racer_core::drive::{DriveDemand, DriveMixer};
use racer_core::{DriveCfg, Pid, ServoCfg, ServoLoop, SteerCfg};

prop_compose! {
    fn demand_strategy()(
        throttle in prop::num::f32::ANY,
        diff_drive in prop::num::f32::ANY,
        bias in prop::num::f32::ANY,
        advance in prop::num::f32::ANY,
    ) -> DriveDemand {
        DriveDemand { throttle, diff_drive, bias, advance }
    }
}

prop_compose! {
    fn sane_demand_strategy()(
        throttle in 0.0f32..=1.0,
        diff_drive in 0.0f32..=1.0,
        bias in -1.0f32..=1.0,
        advance in -1.0f32..=1.0,
    ) -> DriveDemand {
        DriveDemand { throttle, diff_drive, bias, advance }
    }
}

proptest! {
    // Any input, including NaN and infinities, must produce wheel commands
    // inside the saturation bound and outside the deadband (or exactly 0).
    #[test]
    fn mixer_output_is_always_safe(demand in demand_strategy()) {
        let cfg = DriveCfg::default();
        let mixer = DriveMixer::new(cfg);
        let cmd = mixer.mix(demand);
        for side in [cmd.left, cmd.right] {
            let side = i32::from(side);
            prop_assert!(side.abs() <= cfg.max_speed, "saturation violated: {side}");
            prop_assert!(
                side == 0 || side.abs() > cfg.deadband,
                "deadband violated: {side}"
            );
        }
    }

    #[test]
    fn zero_bias_drives_both_wheels_equally(
        throttle in 0.0f32..=1.0,
        diff_drive in 0.0f32..=1.0,
        advance in -1.0f32..=1.0,
    ) {
        let mixer = DriveMixer::new(DriveCfg::default());
        let cmd = mixer.mix(DriveDemand { throttle, diff_drive, bias: 0.0, advance });
        prop_assert_eq!(cmd.left, cmd.right);
    }

    #[test]
    fn negated_bias_swaps_wheels(demand in sane_demand_strategy()) {
        let mixer = DriveMixer::new(DriveCfg::default());
        let cmd = mixer.mix(demand);
        let mirrored = mixer.mix(DriveDemand { bias: -demand.bias, ..demand });
        prop_assert_eq!(cmd.left, mirrored.right);
        prop_assert_eq!(cmd.right, mirrored.left);
    }

    // The pan position must stay inside the travel range no matter what
    // pixel errors arrive.
    #[test]
    fn servo_position_never_leaves_travel_range(
        errors in prop::collection::vec(-320i32..=320, 1..200),
    ) {
        let cfg = ServoCfg::default();
        let mut servo = ServoLoop::new(cfg);
        for e in errors {
            let pos = servo.update(e);
            prop_assert!((cfg.min_pos..=cfg.max_pos).contains(&pos), "position escaped: {pos}");
        }
    }

    // The integrator clamp must hold under arbitrary measurement streams.
    #[test]
    fn pid_integrator_stays_clamped(
        measurements in prop::collection::vec(-10.0f32..=10.0, 1..200),
    ) {
        let cfg = SteerCfg { ki: 0.2, integrator_min: -50.0, integrator_max: 50.0, ..SteerCfg::default() };
        let mut pid = Pid::new(cfg);
        pid.set_point(1.0);
        for m in measurements {
            let _ = pid.update(m);
            prop_assert!(pid.integrator() >= cfg.integrator_min);
            prop_assert!(pid.integrator() <= cfg.integrator_max);
        }
    }
}
