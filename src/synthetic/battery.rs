/// Home battery running a self-consumption strategy: it charges from solar surplus and
/// discharges to cover deficits, within power and state-of-charge limits.
#[derive(Debug, Clone)]
pub struct SelfUseBattery {
    /// Usable capacity (Wh).
    pub capacity_wh: f64,
    /// Stored energy (Wh).
    pub stored_wh: f64,
    /// Charge/discharge power limit (W).
    pub max_power_w: f64,
    /// Fraction of charge power that ends up stored.
    pub eta_charge: f64,
    /// Fraction of discharge power that reaches the household bus.
    pub eta_discharge: f64,
}

/// Battery-side powers for one step (W, both non-negative).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BatteryStep {
    pub charge_w: f64,
    pub discharge_w: f64,
}

impl BatteryStep {
    /// Canonical battery reading: positive discharging, negative charging.
    pub fn net_w(&self) -> f64 {
        self.discharge_w - self.charge_w
    }
}

impl SelfUseBattery {
    pub fn new(capacity_wh: f64, initial_soc: f64, max_power_w: f64, eta: f64) -> Self {
        let capacity_wh = capacity_wh.max(0.0);
        Self {
            capacity_wh,
            stored_wh: capacity_wh * initial_soc.clamp(0.0, 1.0),
            max_power_w: max_power_w.max(0.0),
            eta_charge: eta,
            eta_discharge: eta,
        }
    }

    pub fn soc(&self) -> f64 {
        if self.capacity_wh > 0.0 {
            self.stored_wh / self.capacity_wh
        } else {
            0.0
        }
    }

    /// Dispatches for one step of `dt_hours` given the household balance.
    ///
    /// `surplus_w` is solar minus load: positive charges, negative discharges.
    pub fn step(&mut self, surplus_w: f64, dt_hours: f64) -> BatteryStep {
        if dt_hours <= 0.0 {
            return BatteryStep::default();
        }
        let mut step = BatteryStep::default();
        if surplus_w > 0.0 {
            let room_w = (self.capacity_wh - self.stored_wh).max(0.0) / (self.eta_charge * dt_hours);
            step.charge_w = surplus_w.min(self.max_power_w).min(room_w);
            self.stored_wh += step.charge_w * self.eta_charge * dt_hours;
        } else if surplus_w < 0.0 {
            let wanted_w = -surplus_w / self.eta_discharge;
            let available_w = self.stored_wh.max(0.0) / dt_hours;
            step.discharge_w = wanted_w.min(self.max_power_w).min(available_w);
            self.stored_wh -= step.discharge_w * dt_hours;
        }
        self.stored_wh = self.stored_wh.clamp(0.0, self.capacity_wh);
        step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charges_from_surplus_up_to_power_limit() {
        let mut bat = SelfUseBattery::new(10_000.0, 0.5, 3000.0, 0.95);
        let step = bat.step(5000.0, 1.0 / 60.0);
        assert_eq!(step.charge_w, 3000.0);
        assert_eq!(step.net_w(), -3000.0);
        assert!(bat.soc() > 0.5);
    }

    #[test]
    fn discharge_covers_deficit_after_losses() {
        let mut bat = SelfUseBattery::new(10_000.0, 0.5, 3000.0, 0.95);
        let step = bat.step(-950.0, 1.0 / 60.0);
        assert!((step.discharge_w - 1000.0).abs() < 1e-9);
        assert!(step.net_w() > 0.0);
    }

    #[test]
    fn empty_battery_does_not_discharge() {
        let mut bat = SelfUseBattery::new(10_000.0, 0.0, 3000.0, 0.95);
        let step = bat.step(-500.0, 1.0 / 60.0);
        assert_eq!(step.discharge_w, 0.0);
    }

    #[test]
    fn full_battery_does_not_charge() {
        let mut bat = SelfUseBattery::new(10_000.0, 1.0, 3000.0, 0.95);
        let step = bat.step(2000.0, 1.0 / 60.0);
        assert_eq!(step.charge_w, 0.0);
        assert_eq!(bat.soc(), 1.0);
    }
}
