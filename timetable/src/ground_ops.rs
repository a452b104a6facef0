//! Ground-services durations around a flight.
//!
//! Pre-flight: catering and boarding run back to back while fuelling runs in
//! parallel, so the longer of the two chains governs. Post-flight: deboarding
//! then cleaning, never shorter than the type's minimum turnaround.

use std::fmt;

/// Size class of an airframe; drives cleaning and fuelling tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeCategory {
    Regional,
    NarrowBody,
    WideBody,
}

impl SizeCategory {
    pub fn as_str(&self) -> &str {
        match self {
            SizeCategory::Regional => "regional",
            SizeCategory::NarrowBody => "narrow_body",
            SizeCategory::WideBody => "wide_body",
        }
    }

    pub fn from_name(name: &str) -> Option<SizeCategory> {
        match name.to_lowercase().as_str() {
            "regional" => Some(SizeCategory::Regional),
            "narrow_body" | "narrowbody" => Some(SizeCategory::NarrowBody),
            "wide_body" | "widebody" => Some(SizeCategory::WideBody),
            _ => None,
        }
    }

    /// Best guess from seat count, for aircraft imported without a category.
    pub fn from_seats(seats: u32) -> SizeCategory {
        match seats {
            0..=100 => SizeCategory::Regional,
            101..=240 => SizeCategory::NarrowBody,
            _ => SizeCategory::WideBody,
        }
    }
}

impl fmt::Display for SizeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the ground-ops tables are keyed on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundOpsProfile {
    pub category: SizeCategory,
    pub seats: u32,
    pub distance_km: f64,
}

/// Minutes the aircraft is held at the gate before departure and after arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GroundOps {
    pub pre_flight: i64,
    pub post_flight: i64,
}

impl GroundOps {
    pub fn for_profile(profile: &GroundOpsProfile) -> GroundOps {
        let pre_flight = (catering_minutes(profile.distance_km) + boarding_minutes(profile.seats))
            .max(fuelling_minutes(profile.category, profile.distance_km));
        let post_flight = (deboarding_minutes(profile.seats)
            + cleaning_minutes(profile.category, profile.distance_km))
        .max(minimum_turnaround(profile.category));

        GroundOps {
            pre_flight,
            post_flight,
        }
    }
}

fn catering_minutes(distance_km: f64) -> i64 {
    if distance_km < 500.0 {
        5
    } else if distance_km < 1500.0 {
        10
    } else if distance_km < 4000.0 {
        20
    } else {
        35
    }
}

fn boarding_minutes(seats: u32) -> i64 {
    match seats {
        0..=50 => 15,
        51..=100 => 20,
        101..=200 => 30,
        201..=300 => 40,
        _ => 50,
    }
}

fn fuelling_minutes(category: SizeCategory, distance_km: f64) -> i64 {
    let base = if distance_km < 1000.0 {
        15
    } else if distance_km < 3000.0 {
        25
    } else if distance_km < 6000.0 {
        35
    } else {
        45
    };
    match category {
        SizeCategory::WideBody => base + 10,
        _ => base,
    }
}

fn deboarding_minutes(seats: u32) -> i64 {
    match seats {
        0..=50 => 10,
        51..=100 => 15,
        101..=200 => 20,
        201..=300 => 25,
        _ => 30,
    }
}

fn cleaning_minutes(category: SizeCategory, distance_km: f64) -> i64 {
    let base = match category {
        SizeCategory::Regional => 10,
        SizeCategory::NarrowBody => 15,
        SizeCategory::WideBody => 25,
    };
    // Long-haul cabins get a deep clean.
    if distance_km >= 6000.0 {
        base + 15
    } else {
        base
    }
}

fn minimum_turnaround(category: SizeCategory) -> i64 {
    match category {
        SizeCategory::Regional => 25,
        SizeCategory::NarrowBody => 35,
        SizeCategory::WideBody => 60,
    }
}
