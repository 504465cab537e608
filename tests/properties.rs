//! Invariants that must hold for any input, checked over seeded random data.

mod common;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};

use energy_ledger::config::{EngineConfig, ReconciliationConfig};
use energy_ledger::engine::aggregate::BucketAggregator;
use energy_ledger::engine::clock::{BucketWidth, WallClock};
use energy_ledger::engine::pipeline::Window;
use energy_ledger::engine::reconcile::{FlowReconciler, InstantReading};
use energy_ledger::engine::series::{PowerSample, TimeSeries};
use energy_ledger::engine::tariff::TariffMatcher;
use energy_ledger::engine::types::{Channel, FlowComponent, SeriesKey};
use energy_ledger::error::ReconciliationFailure;
use energy_ledger::synthetic::Scenario;

use common::t;

fn stockholm() -> WallClock {
    WallClock::new(chrono_tz::Europe::Stockholm)
}

#[test]
fn every_instant_balances_or_is_flagged() {
    let reconciler = FlowReconciler::new(ReconciliationConfig::default());
    let tolerance = reconciler.config().balance_tolerance_w;
    let mut rng = StdRng::seed_from_u64(11);

    for _ in 0..5000 {
        let reading = InstantReading {
            timestamp: t(12, 0),
            solar_w: rng.random_range(-50.0..6000.0),
            load_w: rng.random_range(0.0..5000.0),
            grid_w: rng.random_range(-6000.0..6000.0),
            battery_w: rng.random_range(-3000.0..3000.0),
        };
        let d = reconciler.reconcile_instant(&reading);
        for c in FlowComponent::ALL {
            assert!(d.component(c) >= 0.0, "{c} negative in {d}");
        }
        let balanced = d.balance_residual_w().abs() <= tolerance;
        let flagged = d
            .failures
            .iter()
            .any(|f| matches!(f, ReconciliationFailure::Unbalanced { .. }));
        assert!(balanced != flagged, "{reading:?} -> {d}");
    }
}

fn assert_complete_buckets_match_integral(series: &TimeSeries, now: DateTime<Utc>, label: &str) {
    let agg = BucketAggregator::new(BucketWidth::Hour, WallClock::utc());
    let key = SeriesKey::Measured(Channel::Load);
    let buckets = agg.aggregate(series, key, now).unwrap();
    let complete: f64 = buckets
        .iter()
        .filter(|b| !b.is_partial)
        .map(|b| b.energy_wh)
        .sum();
    let integral = series.integrate_wh().unwrap();
    assert!(
        (complete - integral).abs() < 1e-6,
        "{label}: {complete} vs {integral}"
    );
}

#[test]
fn complete_buckets_sum_to_trapezoidal_integral() {
    for seed in 0..20 {
        let mut rng = StdRng::seed_from_u64(seed);
        // per-minute readings 00:00..=03:00
        let values: Vec<f64> = (0..=180).map(|_| rng.random_range(0.0..4000.0)).collect();
        let series = TimeSeries::from_values(t(0, 0), Duration::minutes(1), &values);
        assert_complete_buckets_match_integral(&series, t(3, 30), &format!("seed {seed}"));
    }
}

#[test]
fn uneven_sampling_keeps_the_bucket_total() {
    for seed in 0..20 {
        let mut rng = StdRng::seed_from_u64(100 + seed);
        let mut at = t(0, 0);
        let mut samples = Vec::new();
        while at < t(3, 0) {
            samples.push(PowerSample::new(at, rng.random_range(0.0..4000.0)));
            // bursts of one-second readings mixed with silences of up to 40 minutes
            let gap = if rng.random_bool(0.5) {
                1
            } else {
                rng.random_range(1..2400)
            };
            at += Duration::seconds(gap);
        }
        samples.push(PowerSample::new(t(3, 0), rng.random_range(0.0..4000.0)));
        let series = TimeSeries::from_unsorted(samples);
        assert_complete_buckets_match_integral(&series, t(3, 30), &format!("seed {seed}"));
    }
}

#[test]
fn ramp_keeps_the_bucket_total() {
    let values: Vec<f64> = (0..=180).map(f64::from).collect();
    let series = TimeSeries::from_values(t(0, 0), Duration::minutes(1), &values);
    assert_complete_buckets_match_integral(&series, t(3, 30), "ramp");
    assert!((series.integrate_wh().unwrap() - 270.0).abs() < 1e-9);
}

#[test]
fn partial_bucket_energy_never_decreases() {
    let agg = BucketAggregator::new(BucketWidth::Hour, WallClock::utc());
    let key = SeriesKey::Flow(FlowComponent::GridImport);
    let values = vec![1500.0; 60];
    let series = TimeSeries::from_values(t(5, 0), Duration::minutes(1), &values);

    let mut previous = 0.0;
    for minute in 0..60 {
        let now = t(5, minute);
        let buckets = agg.aggregate(&series, key, now).unwrap();
        let partial = buckets.last().unwrap();
        assert!(partial.is_partial);
        assert!(
            partial.energy_wh >= previous,
            "{now}: {} < {previous}",
            partial.energy_wh
        );
        previous = partial.energy_wh;
    }
    // 59 minutes elapsed at the last step
    assert!((previous - 1500.0 * 59.0 / 60.0).abs() < 1e-9);
}

#[test]
fn every_covered_hour_has_exactly_one_price() {
    let clock = stockholm();
    // spring-forward, an ordinary day, and fall-back
    let evenings = [
        Utc.with_ymd_and_hms(2024, 3, 31, 20, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 6, 1, 20, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 10, 27, 20, 0, 0).unwrap(),
    ];
    for until in evenings {
        let table = Scenario::sunny().prices(&clock, until);
        let matcher = TariffMatcher::new(table.clone(), clock);
        let day_start = clock.floor(until, BucketWidth::Day);
        let day_end = clock.next_boundary(
            clock.next_boundary(day_start, BucketWidth::Day),
            BucketWidth::Day,
        );
        let hours = clock.periods(day_start, day_end - Duration::seconds(1), BucketWidth::Hour);
        assert_eq!(hours.len(), table.today.len() + table.tomorrow.len());

        for (start, end) in hours {
            let node = matcher.lookup(start).unwrap();
            assert_eq!(node.starts_at, start);
            // any instant inside the hour resolves to the same node
            let later = matcher.lookup(end - Duration::seconds(1)).unwrap();
            assert_eq!(node, later);
        }
    }
}

#[test]
fn refresh_is_idempotent() {
    let config = EngineConfig::default();
    let clock = stockholm();
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 15, 17, 0).unwrap();
    let day = Scenario::flaky_load_sensor().generate(&clock, now);
    let e = common::engine(config, day.channels, day.prices);

    let window = Window::today(now, e.clock());
    let first = e.refresh(window, e.default_policy()).unwrap();
    let second = e.refresh(window, e.default_policy()).unwrap();
    assert_eq!(first, second);
}
