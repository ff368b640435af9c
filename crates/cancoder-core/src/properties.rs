#[cfg(test)]
mod proptest_timing {
    use crate::cadence::ReportCadence;
    use crate::device::Cancoder;
    use crate::hal_sim::SimulatedCancoder;
    use crate::motor_sim::{DcMotor, DcMotorSim};
    use crate::signal::{SignalKind, SignalStatus};
    use crate::sim_feed::{ConstantAxis, SimulationFeed, WRIST_LIGAMENT};
    use crate::timebase::{Clock, SimClock};
    use proptest::prelude::*;
    use std::time::Duration;

    const REPORT_PERIOD_US: u64 = 500_000;
    const TICK_US: u64 = 20_000;

    fn device_at(clock: &SimClock, hz: f64) -> Cancoder<SimulatedCancoder, SimClock> {
        let mut device = Cancoder::new(1, "rio", SimulatedCancoder::new(), clock.clone());
        for kind in SignalKind::ALL {
            device.signal(kind).set_update_frequency(hz).unwrap();
        }
        device
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(2000))]

        // Report count tracks elapsed time no matter how ticks jitter.
        #[test]
        fn report_count_matches_elapsed(
            jitter in proptest::collection::vec(1u64..=15_000, 25..400),
        ) {
            let mut cadence = ReportCadence::new(0, Duration::from_micros(REPORT_PERIOD_US));
            let mut reports = 0u64;
            let mut last_tick = 0u64;
            for (i, j) in jitter.iter().enumerate() {
                last_tick = (i as u64 + 1) * TICK_US + j;
                if cadence.poll(last_tick) {
                    reports += 1;
                }
            }
            prop_assert_eq!(reports, last_tick / REPORT_PERIOD_US);
        }

        // A fresh read never reports more latency than a cached read of the
        // same signal taken at the same instant.
        #[test]
        fn fresh_latency_not_above_cached(
            hz in 4.0f64..=1000.0,
            start_us in 0u64..2_000_000,
        ) {
            let clock = SimClock::new();
            let mut device = device_at(&clock, hz);
            clock.advance_us(start_us);
            let cached = device.velocity().refresh();
            let period = device.backend().update_period_us(SignalKind::Velocity).unwrap();
            let fresh = device.velocity().wait_for_update(Duration::from_micros(period));
            prop_assert_eq!(fresh.status, SignalStatus::Ok);
            prop_assert!(fresh.latency_s <= cached.latency_s);
        }

        // A fresh read returns no later than its timeout.
        #[test]
        fn fresh_read_respects_timeout(
            hz in prop_oneof![Just(0.0f64), 4.0f64..=1000.0],
            start_us in 0u64..2_000_000,
            timeout_us in 0u64..=1_000_000,
        ) {
            let clock = SimClock::new();
            let mut device = device_at(&clock, hz);
            clock.advance_us(start_us);
            let before = clock.now_us();
            let sample = device.position().wait_for_update(Duration::from_micros(timeout_us));
            let waited = clock.now_us() - before;
            prop_assert!(waited <= timeout_us);
            if sample.status == SignalStatus::RxTimeout {
                prop_assert_eq!(waited, timeout_us);
            }
        }

        // Setting then confirming with a generous timeout reads back the target.
        #[test]
        fn set_then_confirm(
            raw in -50.0f64..50.0,
            target in -100.0f64..100.0,
            start_us in 0u64..2_000_000,
        ) {
            let clock = SimClock::new();
            let mut device = device_at(&clock, 100.0);
            device.sim_state().set_raw_position(raw);
            clock.advance_us(start_us);
            let confirmed = device.set_position(target, Duration::from_millis(100)).unwrap();
            prop_assert!(confirmed.status.is_ok());
            prop_assert!((confirmed.value - target).abs() < 1e-9);
        }

        // Constant voltage from rest moves the shaft monotonically and never
        // overshoots the steady-state speed.
        #[test]
        fn constant_voltage_is_monotonic(
            volts in -12.0f64..=12.0,
            steps in 1usize..200,
        ) {
            let mut sim = DcMotorSim::new(DcMotor::falcon500(1), 100.0, 0.001);
            sim.set_input_voltage(volts);
            let steady = sim.steady_state_velocity_rad_s();
            let mut previous = sim.angular_position_rad();
            for _ in 0..steps {
                sim.update(0.02);
                let position = sim.angular_position_rad();
                if volts >= 0.0 {
                    prop_assert!(position >= previous);
                    prop_assert!(sim.angular_velocity_rad_s() <= steady + 1e-9);
                } else {
                    prop_assert!(position <= previous);
                    prop_assert!(sim.angular_velocity_rad_s() >= steady - 1e-9);
                }
                previous = position;
            }
        }

        // The displayed wrist angle is exactly position * 360.
        #[test]
        fn wrist_angle_is_position_times_360(
            axis in -1.0f64..=1.0,
            steps in 1usize..100,
        ) {
            let clock = SimClock::new();
            let mut device = device_at(&clock, 100.0);
            let mut feed = SimulationFeed::falcon_wrist();
            let mut input = ConstantAxis(axis);
            for _ in 0..steps {
                clock.advance_us(TICK_US);
                let frame = feed.step(&mut device, &mut input);
                let wrist = feed.mechanism().ligament(WRIST_LIGAMENT).unwrap();
                prop_assert_eq!(wrist.angle_deg, frame.position_rot * 360.0);
            }
        }
    }
}
