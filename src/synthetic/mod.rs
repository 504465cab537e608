//! Seeded synthetic household days: solar, load, battery, grid, and spot prices.
//!
//! Every device draws from its own `StdRng` seeded from the scenario seed, so a given
//! `(scenario, seed, until)` always yields the same telemetry.

pub mod battery;
pub mod profiles;

use chrono::{DateTime, Duration, Timelike, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::debug;

use crate::config::ConfigError;
use crate::engine::clock::{BucketWidth, WallClock};
use crate::engine::reconcile::ChannelSet;
use crate::engine::series::{PowerSample, TimeSeries};
use crate::engine::tariff::PriceTable;
use crate::engine::types::{Channel, PriceNode};

use battery::SelfUseBattery;
use profiles::{LoadProfile, PriceProfile, SolarProfile, gaussian_noise};

/// Parameters of one synthetic day.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub name: String,
    pub seed: u64,
    /// Sampling interval of every channel.
    pub step: Duration,
    pub solar_peak_w: f64,
    pub sunrise_h: f64,
    pub sunset_h: f64,
    pub load_base_w: f64,
    pub load_amp_w: f64,
    pub load_noise_w: f64,
    pub battery_capacity_wh: f64,
    pub battery_power_w: f64,
    pub battery_initial_soc: f64,
    pub battery_efficiency: f64,
    /// Meter noise on the grid reading (W).
    pub grid_noise_w: f64,
    pub price_base: f64,
    pub price_swing: f64,
    /// Probability that a load reading comes back at a third of the true value.
    pub flaky_load_probability: f64,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            name: "sunny".to_string(),
            seed: 42,
            step: Duration::seconds(30),
            solar_peak_w: 6000.0,
            sunrise_h: 5.0,
            sunset_h: 21.0,
            load_base_w: 600.0,
            load_amp_w: 400.0,
            load_noise_w: 50.0,
            battery_capacity_wh: 10_000.0,
            battery_power_w: 3000.0,
            battery_initial_soc: 0.3,
            battery_efficiency: 0.95,
            grid_noise_w: 5.0,
            price_base: 0.6,
            price_swing: 0.5,
            flaky_load_probability: 0.0,
        }
    }
}

/// Telemetry and prices generated for one scenario.
#[derive(Debug, Clone)]
pub struct SyntheticDay {
    pub channels: ChannelSet,
    pub prices: PriceTable,
}

impl Scenario {
    /// Built-in preset names.
    pub const PRESETS: [&str; 3] = ["sunny", "winter", "flaky_load_sensor"];

    /// Long summer day with a large surplus exported at midday.
    pub fn sunny() -> Self {
        Self::default()
    }

    /// Short, weak solar day with heating load and expensive evenings.
    pub fn winter() -> Self {
        Self {
            name: "winter".to_string(),
            solar_peak_w: 1200.0,
            sunrise_h: 9.0,
            sunset_h: 15.0,
            load_base_w: 1500.0,
            load_amp_w: 800.0,
            load_noise_w: 80.0,
            battery_initial_soc: 0.6,
            price_base: 1.4,
            price_swing: 1.0,
            ..Self::default()
        }
    }

    /// Sunny day whose load sensor intermittently under-reads.
    pub fn flaky_load_sensor() -> Self {
        Self {
            name: "flaky_load_sensor".to_string(),
            flaky_load_probability: 0.3,
            ..Self::default()
        }
    }

    /// Looks up a built-in scenario.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "sunny" => Ok(Self::sunny()),
            "winter" => Ok(Self::winter()),
            "flaky_load_sensor" => Ok(Self::flaky_load_sensor()),
            _ => Err(ConfigError {
                field: "scenario".to_string(),
                message: format!(
                    "unknown scenario \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            }),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Generates telemetry from local midnight up to and including `until`, and hourly
    /// prices for the whole of today and tomorrow.
    ///
    /// Channels use canonical signs: grid positive importing, battery positive
    /// discharging. The grid reading is derived from the true balance, so an honest load
    /// reading always agrees with the estimate up to meter noise.
    pub fn generate(&self, clock: &WallClock, until: DateTime<Utc>) -> SyntheticDay {
        let day_start = clock.floor(until, BucketWidth::Day);

        let mut solar = SolarProfile::new(
            self.solar_peak_w,
            self.sunrise_h,
            self.sunset_h,
            0.05,
            self.seed,
        );
        let mut load = LoadProfile::new(
            self.load_base_w,
            self.load_amp_w,
            self.load_noise_w,
            self.seed.wrapping_add(1),
        );
        let mut battery = SelfUseBattery::new(
            self.battery_capacity_wh,
            self.battery_initial_soc,
            self.battery_power_w,
            self.battery_efficiency,
        );
        let mut meter_rng = StdRng::seed_from_u64(self.seed.wrapping_add(2));
        let mut sensor_rng = StdRng::seed_from_u64(self.seed.wrapping_add(3));

        let dt_hours = self.step.num_milliseconds() as f64 / 3_600_000.0;
        let mut samples: [Vec<PowerSample>; 4] = Default::default();

        let mut t = day_start;
        while t <= until && dt_hours > 0.0 {
            let h = local_hour(clock, t);
            let solar_w = solar.power_w(h);
            let load_w = load.power_w(h);
            let step = battery.step(solar_w - load_w, dt_hours);

            let delivered_w = step.discharge_w * self.battery_efficiency;
            let grid_w = load_w - solar_w - delivered_w + step.charge_w
                + gaussian_noise(&mut meter_rng, self.grid_noise_w);
            let measured_load_w = if sensor_rng.random::<f64>() < self.flaky_load_probability {
                load_w / 3.0
            } else {
                load_w
            };

            samples[0].push(PowerSample::new(t, solar_w));
            samples[1].push(PowerSample::new(t, measured_load_w));
            samples[2].push(PowerSample::new(t, grid_w));
            samples[3].push(PowerSample::new(t, step.net_w()));
            t += self.step;
        }

        let mut channels = ChannelSet::new();
        let order = [Channel::Solar, Channel::Load, Channel::GridNet, Channel::BatteryNet];
        for (channel, values) in order.into_iter().zip(samples) {
            channels.insert(channel, TimeSeries::from_unsorted(values));
        }
        debug!(
            scenario = %self.name,
            seed = self.seed,
            samples = channels.get(Channel::Solar).len(),
            soc = battery.soc(),
            "generated synthetic telemetry"
        );

        SyntheticDay {
            channels,
            prices: self.prices(clock, until),
        }
    }

    /// Hourly prices for the local day holding `until` and the day after, with the
    /// node holding `until` as the live price.
    pub fn prices(&self, clock: &WallClock, until: DateTime<Utc>) -> PriceTable {
        let day_start = clock.floor(until, BucketWidth::Day);
        let mut profile =
            PriceProfile::new(self.price_base, self.price_swing, 0.25, self.seed.wrapping_add(4));
        let tomorrow_start = clock.next_boundary(day_start, BucketWidth::Day);
        let tomorrow_end = clock.next_boundary(tomorrow_start, BucketWidth::Day);

        let mut day = |from: DateTime<Utc>, to: DateTime<Utc>| -> Vec<PriceNode> {
            clock
                .periods(from, to - Duration::seconds(1), BucketWidth::Hour)
                .into_iter()
                .map(|(start, _)| {
                    let (energy, tax) = profile.price(local_hour(clock, start));
                    PriceNode {
                        starts_at: start,
                        total_per_kwh: energy + tax,
                        energy_per_kwh: energy,
                        tax_per_kwh: tax,
                    }
                })
                .collect()
        };
        let today = day(day_start, tomorrow_start);
        let tomorrow = day(tomorrow_start, tomorrow_end);
        let current = today
            .iter()
            .rev()
            .find(|n| n.starts_at <= until)
            .cloned();

        PriceTable {
            recent: Vec::new(),
            today,
            tomorrow,
            current,
        }
    }
}

fn local_hour(clock: &WallClock, t: DateTime<Utc>) -> f64 {
    let local = clock.local(t);
    f64::from(local.hour()) + f64::from(local.minute()) / 60.0 + f64::from(local.second()) / 3600.0
}
