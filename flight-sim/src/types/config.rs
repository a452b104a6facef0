use logger::Level;
use std::path::PathBuf;
use std::time::Duration;

use super::sim_error::SimError;

/// How often each background job fires, in real time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobIntervals {
    pub credit_deduction: Duration,
    pub flight_revenue: Duration,
    pub maintenance: Duration,
    pub listing_resolution: Duration,
    pub recall_resolution: Duration,
    pub lease_expiry: Duration,
    pub ai_decisions: Duration,
}

impl Default for JobIntervals {
    fn default() -> Self {
        JobIntervals {
            credit_deduction: Duration::from_secs(60),
            flight_revenue: Duration::from_secs(5),
            maintenance: Duration::from_secs(30),
            listing_resolution: Duration::from_secs(60),
            recall_resolution: Duration::from_secs(10),
            lease_expiry: Duration::from_secs(60),
            ai_decisions: Duration::from_secs(30),
        }
    }
}

/// Durations and thresholds of the maintenance programme.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaintenancePolicy {
    pub daily_check_minutes: i64,
    pub weekly_check_minutes: i64,
    pub a_check_minutes: i64,
    pub c_check_days: i64,
    pub d_check_days: i64,
    /// A C or D check starts once its expiry is this close.
    pub heavy_check_lead_days: i64,
    /// Pause between aircraft in a fleet-wide refresh.
    pub fleet_refresh_delay: Duration,
}

impl Default for MaintenancePolicy {
    fn default() -> Self {
        MaintenancePolicy {
            daily_check_minutes: 60,
            weekly_check_minutes: 240,
            a_check_minutes: 600,
            c_check_days: 14,
            d_check_days: 60,
            heavy_check_lead_days: 1,
            fleet_refresh_delay: Duration::from_millis(100),
        }
    }
}

/// Process-wide settings. Built from defaults, then overridden by `TYCOON_*`
/// environment variables.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub tick_interval: Duration,
    /// World clocks write to the store every this many ticks.
    pub persist_every: u64,
    pub log_dir: PathBuf,
    pub log_level: Level,
    pub storage_airports: Vec<String>,
    pub job_poll_interval: Duration,
    pub jobs: JobIntervals,
    pub maintenance: MaintenancePolicy,
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
    pub storage_cost_per_month: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            tick_interval: Duration::from_millis(1000),
            persist_every: 10,
            log_dir: PathBuf::from("logs"),
            log_level: Level::Info,
            storage_airports: vec![
                "VCV".to_string(),
                "MZJ".to_string(),
                "TEV".to_string(),
                "ASP".to_string(),
            ],
            job_poll_interval: Duration::from_millis(1000),
            jobs: JobIntervals::default(),
            maintenance: MaintenancePolicy::default(),
            retry_attempts: 3,
            retry_backoff: Duration::from_millis(250),
            storage_cost_per_month: 15_000.0,
        }
    }
}

impl SimConfig {
    pub fn from_env() -> Result<Self, SimError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup` (a stand-in for the environment).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SimError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = SimConfig::default();

        if let Some(ms) = parse_u64(&lookup, "TYCOON_TICK_MILLIS")? {
            if ms == 0 {
                return Err(SimError::Config("TYCOON_TICK_MILLIS must be positive".to_string()));
            }
            config.tick_interval = Duration::from_millis(ms);
        }
        if let Some(n) = parse_u64(&lookup, "TYCOON_PERSIST_EVERY")? {
            config.persist_every = n.max(1);
        }
        if let Some(dir) = lookup("TYCOON_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup("TYCOON_LOG_LEVEL") {
            config.log_level = Level::from_name(&level)
                .ok_or_else(|| SimError::Config(format!("unknown log level '{}'", level)))?;
        }
        if let Some(list) = lookup("TYCOON_STORAGE_AIRPORTS") {
            config.storage_airports = list
                .split(',')
                .map(|code| code.trim().to_uppercase())
                .filter(|code| !code.is_empty())
                .collect();
        }
        if let Some(ms) = parse_u64(&lookup, "TYCOON_JOB_POLL_MILLIS")? {
            config.job_poll_interval = Duration::from_millis(ms.max(1));
        }

        let jobs = &mut config.jobs;
        for (key, slot) in [
            ("TYCOON_JOB_CREDIT_SECS", &mut jobs.credit_deduction),
            ("TYCOON_JOB_REVENUE_SECS", &mut jobs.flight_revenue),
            ("TYCOON_JOB_MAINTENANCE_SECS", &mut jobs.maintenance),
            ("TYCOON_JOB_LISTING_SECS", &mut jobs.listing_resolution),
            ("TYCOON_JOB_RECALL_SECS", &mut jobs.recall_resolution),
            ("TYCOON_JOB_LEASE_SECS", &mut jobs.lease_expiry),
            ("TYCOON_JOB_AI_SECS", &mut jobs.ai_decisions),
        ] {
            if let Some(secs) = parse_u64(&lookup, key)? {
                *slot = Duration::from_secs(secs);
            }
        }

        Ok(config)
    }

    pub fn is_storage_airport(&self, iata_code: &str) -> bool {
        self.storage_airports
            .iter()
            .any(|code| code.eq_ignore_ascii_case(iata_code))
    }
}

fn parse_u64<F>(lookup: &F, key: &str) -> Result<Option<u64>, SimError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| SimError::Config(format!("{} is not a number: '{}'", key, raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_overrides() {
        let config = SimConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.persist_every, 10);
        assert_eq!(config.retry_attempts, 3);
        assert!(config.is_storage_airport("vcv"));
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = SimConfig::from_lookup(lookup_from(&[
            ("TYCOON_TICK_MILLIS", "250"),
            ("TYCOON_PERSIST_EVERY", "4"),
            ("TYCOON_LOG_LEVEL", "debug"),
            ("TYCOON_STORAGE_AIRPORTS", "row, mhv"),
            ("TYCOON_JOB_REVENUE_SECS", "2"),
        ]))
        .unwrap();
        assert_eq!(config.tick_interval, Duration::from_millis(250));
        assert_eq!(config.persist_every, 4);
        assert_eq!(config.log_level, Level::Debug);
        assert_eq!(config.storage_airports, vec!["ROW", "MHV"]);
        assert_eq!(config.jobs.flight_revenue, Duration::from_secs(2));
        assert!(!config.is_storage_airport("VCV"));
    }

    #[test]
    fn test_bad_numbers_are_rejected() {
        let result = SimConfig::from_lookup(lookup_from(&[("TYCOON_PERSIST_EVERY", "often")]));
        assert!(matches!(result, Err(SimError::Config(_))));
        let zero_tick = SimConfig::from_lookup(lookup_from(&[("TYCOON_TICK_MILLIS", "0")]));
        assert!(zero_tick.is_err());
    }
}
