use rand::{Rng, SeedableRng, rngs::StdRng};

/// Gaussian noise via the Box-Muller transform.
///
/// # Arguments
///
/// * `rng` - Random number generator
/// * `std_dev` - Standard deviation of the noise
///
/// # Returns
///
/// Random value from a Gaussian distribution with mean 0 and the given standard deviation
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-9, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}

/// Solar production with a half-sine daylight shape and multiplicative cloud noise.
#[derive(Debug, Clone)]
pub struct SolarProfile {
    /// Clear-sky peak output (W).
    pub peak_w: f64,
    /// Local hour of sunrise.
    pub sunrise_h: f64,
    /// Local hour of sunset.
    pub sunset_h: f64,
    /// Noise standard deviation as a fraction of output.
    pub noise_std: f64,
    rng: StdRng,
}

impl SolarProfile {
    pub fn new(peak_w: f64, sunrise_h: f64, sunset_h: f64, noise_std: f64, seed: u64) -> Self {
        Self {
            peak_w: peak_w.max(0.0),
            sunrise_h,
            sunset_h,
            noise_std: noise_std.max(0.0),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Fraction of peak at local hour `h`; 0 outside daylight.
    pub fn daylight_frac(&self, h: f64) -> f64 {
        if h <= self.sunrise_h || h >= self.sunset_h {
            return 0.0;
        }
        let pos = (h - self.sunrise_h) / (self.sunset_h - self.sunrise_h);
        (std::f64::consts::PI * pos).sin()
    }

    /// Production at local hour `h` (W, never negative).
    pub fn power_w(&mut self, h: f64) -> f64 {
        let frac = self.daylight_frac(h);
        if frac <= 0.0 {
            return 0.0;
        }
        let noise_mult = 1.0 + gaussian_noise(&mut self.rng, self.noise_std);
        (self.peak_w * frac * noise_mult).max(0.0)
    }
}

/// Household consumption: a baseline with a daily sinusoid and additive noise.
#[derive(Debug, Clone)]
pub struct LoadProfile {
    /// Mean consumption (W).
    pub base_w: f64,
    /// Amplitude of the daily variation (W).
    pub amp_w: f64,
    /// Noise standard deviation (W).
    pub noise_std: f64,
    rng: StdRng,
}

impl LoadProfile {
    pub fn new(base_w: f64, amp_w: f64, noise_std: f64, seed: u64) -> Self {
        Self {
            base_w,
            amp_w,
            noise_std: noise_std.max(0.0),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Demand at local hour `h`, peaking in the early evening (W, never negative).
    pub fn power_w(&mut self, h: f64) -> f64 {
        // minimum around 04:00, maximum around 16:00
        let angle = 2.0 * std::f64::consts::PI * (h - 10.0) / 24.0;
        let noise = gaussian_noise(&mut self.rng, self.noise_std);
        (self.base_w + self.amp_w * angle.sin() + noise).max(0.0)
    }
}

/// Spot price shape with morning and evening peaks (currency per kWh).
#[derive(Debug, Clone)]
pub struct PriceProfile {
    /// Price floor of the energy component.
    pub base: f64,
    /// Height of the daily peaks above the floor.
    pub swing: f64,
    /// Supplier tax as a fraction of the energy component.
    pub tax_rate: f64,
    rng: StdRng,
}

impl PriceProfile {
    pub fn new(base: f64, swing: f64, tax_rate: f64, seed: u64) -> Self {
        Self {
            base,
            swing,
            tax_rate,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// `(energy, tax)` for local hour `h`.
    pub fn price(&mut self, h: f64) -> (f64, f64) {
        let bump = |centre: f64, width: f64| (-((h - centre) / width).powi(2)).exp();
        let shape = 0.6 * bump(8.0, 1.5) + bump(18.5, 2.0);
        let jitter = gaussian_noise(&mut self.rng, 0.03 * self.swing);
        let energy = (self.base + self.swing * shape + jitter).max(0.0);
        (energy, energy * self.tax_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_is_zero_without_spread() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(gaussian_noise(&mut rng, 0.0), 0.0);
    }

    #[test]
    fn noise_is_roughly_centred() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 10_000;
        let mean: f64 = (0..n).map(|_| gaussian_noise(&mut rng, 1.0)).sum::<f64>() / f64::from(n);
        assert!(mean.abs() < 0.05, "mean {mean}");
    }

    #[test]
    fn solar_is_dark_outside_daylight() {
        let mut pv = SolarProfile::new(5000.0, 6.0, 20.0, 0.05, 1);
        assert_eq!(pv.power_w(3.0), 0.0);
        assert_eq!(pv.power_w(22.0), 0.0);
        assert!(pv.power_w(13.0) > 3000.0);
    }

    #[test]
    fn load_never_negative() {
        let mut load = LoadProfile::new(100.0, 400.0, 200.0, 3);
        for i in 0..1440 {
            assert!(load.power_w(f64::from(i) / 60.0) >= 0.0);
        }
    }

    #[test]
    fn evening_price_above_night_price() {
        let mut prices = PriceProfile::new(0.5, 1.0, 0.25, 9);
        let (night, _) = prices.price(3.0);
        let (evening, tax) = prices.price(18.5);
        assert!(evening > night);
        assert!((tax - evening * 0.25).abs() < 1e-12);
    }

    #[test]
    fn same_seed_same_profile() {
        let mut a = SolarProfile::new(5000.0, 6.0, 20.0, 0.1, 42);
        let mut b = SolarProfile::new(5000.0, 6.0, 20.0, 0.1, 42);
        for i in 0..100 {
            let h = 6.0 + f64::from(i) * 0.1;
            assert_eq!(a.power_w(h), b.power_w(h));
        }
    }
}
