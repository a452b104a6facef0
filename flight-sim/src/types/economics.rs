use std::collections::HashMap;

/// Era-dependent economics, as pure functions of the game year.
pub trait EconomicsProvider: Send + Sync {
    /// Fuel price relative to a 2000s baseline of 1.0.
    fn fuel_multiplier(&self, year: i32) -> f64;
    /// Typical system-wide load factor of the era, in `0..=1`.
    fn load_factor_baseline(&self, year: i32) -> f64;
}

/// Passenger demand between two airports, on a 0-100 scale.
pub trait DemandProvider: Send + Sync {
    fn demand(&self, origin: &str, destination: &str, year: i32) -> f64;
}

struct Era {
    from_year: i32,
    fuel_multiplier: f64,
    load_factor: f64,
}

const ERAS: [Era; 9] = [
    Era { from_year: i32::MIN, fuel_multiplier: 0.40, load_factor: 0.58 },
    Era { from_year: 1970, fuel_multiplier: 0.90, load_factor: 0.62 },
    Era { from_year: 1980, fuel_multiplier: 0.80, load_factor: 0.65 },
    Era { from_year: 1990, fuel_multiplier: 0.70, load_factor: 0.69 },
    Era { from_year: 2000, fuel_multiplier: 1.00, load_factor: 0.73 },
    Era { from_year: 2008, fuel_multiplier: 1.40, load_factor: 0.78 },
    Era { from_year: 2015, fuel_multiplier: 1.10, load_factor: 0.82 },
    Era { from_year: 2020, fuel_multiplier: 0.90, load_factor: 0.55 },
    Era { from_year: 2022, fuel_multiplier: 1.30, load_factor: 0.83 },
];

/// Step table of fuel prices and load factors by decade-ish eras.
#[derive(Debug, Clone, Copy, Default)]
pub struct EraTable;

impl EraTable {
    fn era(year: i32) -> &'static Era {
        ERAS.iter()
            .rev()
            .find(|era| year >= era.from_year)
            .unwrap_or(&ERAS[0])
    }
}

impl EconomicsProvider for EraTable {
    fn fuel_multiplier(&self, year: i32) -> f64 {
        Self::era(year).fuel_multiplier
    }

    fn load_factor_baseline(&self, year: i32) -> f64 {
        Self::era(year).load_factor
    }
}

/// Fixed demand per airport pair (either direction), with a default for
/// pairs nobody configured.
#[derive(Debug, Clone)]
pub struct StaticDemand {
    pairs: HashMap<(String, String), f64>,
    default_demand: f64,
}

impl StaticDemand {
    pub fn new(default_demand: f64) -> Self {
        StaticDemand {
            pairs: HashMap::new(),
            default_demand: default_demand.clamp(0.0, 100.0),
        }
    }

    pub fn with_pair(mut self, a: &str, b: &str, demand: f64) -> Self {
        self.pairs.insert(Self::key(a, b), demand.clamp(0.0, 100.0));
        self
    }

    fn key(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }
}

impl Default for StaticDemand {
    fn default() -> Self {
        StaticDemand::new(50.0)
    }
}

impl DemandProvider for StaticDemand {
    fn demand(&self, origin: &str, destination: &str, _year: i32) -> f64 {
        self.pairs
            .get(&Self::key(origin, destination))
            .copied()
            .unwrap_or(self.default_demand)
    }
}

/// Unit costs and rates used when a trip is settled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RevenueRates {
    /// Fuel cost per kilometre at a fuel multiplier of 1.0.
    pub fuel_per_km: f64,
    pub crew_per_km: f64,
    pub cargo_per_km: f64,
    pub maintenance_per_km: f64,
    pub airport_fee_fixed: f64,
    pub airport_fee_per_seat: f64,
}

impl Default for RevenueRates {
    fn default() -> Self {
        RevenueRates {
            fuel_per_km: 6.0,
            crew_per_km: 2.2,
            cargo_per_km: 0.9,
            maintenance_per_km: 1.2,
            airport_fee_fixed: 400.0,
            airport_fee_per_seat: 4.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_era_lookup() {
        let table = EraTable;
        assert_eq!(table.fuel_multiplier(1965), 0.40);
        assert_eq!(table.fuel_multiplier(2000), 1.00);
        assert_eq!(table.fuel_multiplier(2009), 1.40);
        assert_eq!(table.load_factor_baseline(2020), 0.55);
        assert_eq!(table.load_factor_baseline(2050), 0.83);
    }

    #[test]
    fn test_static_demand_is_symmetric() {
        let demand = StaticDemand::new(40.0).with_pair("AEP", "COR", 85.0);
        assert_eq!(demand.demand("COR", "AEP", 2024), 85.0);
        assert_eq!(demand.demand("AEP", "MDZ", 2024), 40.0);
        assert_eq!(StaticDemand::new(140.0).demand("X", "Y", 2024), 100.0);
    }
}
