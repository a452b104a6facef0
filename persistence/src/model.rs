use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use timetable::{CheckType, SizeCategory};
use uuid::Uuid;

use crate::errors::StoreError;

pub type WorldId = Uuid;
pub type MembershipId = Uuid;
pub type AircraftId = Uuid;
pub type RouteId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldStatus {
    Active,
    Completed,
}

impl WorldStatus {
    pub fn as_str(&self) -> &str {
        match self {
            WorldStatus::Active => "active",
            WorldStatus::Completed => "completed",
        }
    }
}

/// A persistent game world and its accelerated clock.
#[derive(Debug, Clone, PartialEq)]
pub struct World {
    pub id: WorldId,
    pub name: String,
    /// Game seconds per real second.
    pub acceleration_factor: f64,
    pub current_time: NaiveDateTime,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub is_paused: bool,
    pub end_date: Option<NaiveDateTime>,
    pub status: WorldStatus,
    /// Game date the daily maintenance pass last ran.
    pub last_maintenance_day: Option<NaiveDate>,
    /// `YYYY-MM` of the last monthly settlement.
    pub last_processed_month: Option<String>,
}

impl World {
    pub fn new(name: &str, acceleration_factor: f64, start: NaiveDateTime) -> Self {
        World {
            id: Uuid::new_v4(),
            name: name.to_string(),
            acceleration_factor,
            current_time: start,
            last_tick_at: None,
            is_paused: false,
            end_date: None,
            status: WorldStatus::Active,
            last_maintenance_day: None,
            last_processed_month: None,
        }
    }

    pub fn with_end_date(mut self, end_date: NaiveDateTime) -> Self {
        self.end_date = Some(end_date);
        self
    }
}

/// An airline playing in one world.
#[derive(Debug, Clone, PartialEq)]
pub struct Membership {
    pub id: MembershipId,
    pub world_id: WorldId,
    pub airline_name: String,
    pub balance: f64,
    pub is_ai: bool,
}

impl Membership {
    pub fn new(world_id: WorldId, airline_name: &str, balance: f64) -> Self {
        Membership {
            id: Uuid::new_v4(),
            world_id,
            airline_name: airline_name.to_string(),
            balance,
            is_ai: false,
        }
    }

    /// Hands the airline to the computer.
    pub fn computer_controlled(mut self) -> Self {
        self.is_ai = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AircraftStatus {
    Active,
    Maintenance,
    Storage,
    Recalling,
    LeasedOut,
    ListedSale,
    ListedLease,
    Sold,
}

impl AircraftStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AircraftStatus::Active => "active",
            AircraftStatus::Maintenance => "maintenance",
            AircraftStatus::Storage => "storage",
            AircraftStatus::Recalling => "recalling",
            AircraftStatus::LeasedOut => "leased_out",
            AircraftStatus::ListedSale => "listed_sale",
            AircraftStatus::ListedLease => "listed_lease",
            AircraftStatus::Sold => "sold",
        }
    }

    pub fn from_name(name: &str) -> Option<AircraftStatus> {
        match name {
            "active" => Some(AircraftStatus::Active),
            "maintenance" => Some(AircraftStatus::Maintenance),
            "storage" => Some(AircraftStatus::Storage),
            "recalling" => Some(AircraftStatus::Recalling),
            "leased_out" => Some(AircraftStatus::LeasedOut),
            "listed_sale" => Some(AircraftStatus::ListedSale),
            "listed_lease" => Some(AircraftStatus::ListedLease),
            "sold" => Some(AircraftStatus::Sold),
            _ => None,
        }
    }
}

/// Last time each tier was performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CheckLog {
    pub daily: Option<NaiveDateTime>,
    pub weekly: Option<NaiveDateTime>,
    pub a: Option<NaiveDateTime>,
    pub c: Option<NaiveDateTime>,
    pub d: Option<NaiveDateTime>,
}

impl CheckLog {
    pub fn last(&self, tier: CheckType) -> Option<NaiveDateTime> {
        match tier {
            CheckType::Daily => self.daily,
            CheckType::Weekly => self.weekly,
            CheckType::A => self.a,
            CheckType::C => self.c,
            CheckType::D => self.d,
        }
    }

    pub fn stamp(&mut self, tier: CheckType, at: NaiveDateTime) {
        let slot = match tier {
            CheckType::Daily => &mut self.daily,
            CheckType::Weekly => &mut self.weekly,
            CheckType::A => &mut self.a,
            CheckType::C => &mut self.c,
            CheckType::D => &mut self.d,
        };
        *slot = Some(at);
    }
}

/// Validity interval of each tier, in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckIntervals {
    pub daily: i64,
    pub weekly: i64,
    pub a: i64,
    pub c: i64,
    pub d: i64,
}

impl CheckIntervals {
    pub fn days(&self, tier: CheckType) -> i64 {
        match tier {
            CheckType::Daily => self.daily,
            CheckType::Weekly => self.weekly,
            CheckType::A => self.a,
            CheckType::C => self.c,
            CheckType::D => self.d,
        }
    }
}

impl Default for CheckIntervals {
    fn default() -> Self {
        CheckIntervals {
            daily: 1,
            weekly: 7,
            a: 90,
            c: 730,
            d: 2190,
        }
    }
}

/// A C or D check in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeavyCheck {
    pub check_type: CheckType,
    pub started_at: NaiveDateTime,
}

/// A ferry flight under way.
#[derive(Debug, Clone, PartialEq)]
pub struct RecallInfo {
    pub destination: String,
    pub to_storage: bool,
    pub available_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ListingKind {
    Sale { asking_price: f64 },
    Lease { monthly_rate: f64, term_months: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Listing {
    pub listed_at: NaiveDateTime,
    pub kind: ListingKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeaseOut {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub monthly_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aircraft {
    pub id: AircraftId,
    pub membership_id: MembershipId,
    pub world_id: WorldId,
    pub registration: String,
    pub category: SizeCategory,
    pub seats: u32,
    pub cruise_speed_kmh: f64,
    pub home_base: String,
    pub current_airport: String,
    pub status: AircraftStatus,
    pub checks: CheckLog,
    pub intervals: CheckIntervals,
    pub flight_hours: f64,
    pub a_check_hours: f64,
    pub heavy_check: Option<HeavyCheck>,
    pub recall: Option<RecallInfo>,
    pub listing: Option<Listing>,
    pub lease_out: Option<LeaseOut>,
}

impl Aircraft {
    /// A fresh active aircraft parked at its home base with no checks on record.
    pub fn new(
        membership: &Membership,
        registration: &str,
        category: SizeCategory,
        seats: u32,
        cruise_speed_kmh: f64,
        home_base: &str,
    ) -> Self {
        Aircraft {
            id: Uuid::new_v4(),
            membership_id: membership.id,
            world_id: membership.world_id,
            registration: registration.to_string(),
            category,
            seats,
            cruise_speed_kmh,
            home_base: home_base.to_string(),
            current_airport: home_base.to_string(),
            status: AircraftStatus::Active,
            checks: CheckLog::default(),
            intervals: CheckIntervals::default(),
            flight_hours: 0.0,
            a_check_hours: 0.0,
            heavy_check: None,
            recall: None,
            listing: None,
            lease_out: None,
        }
    }

    /// Records every tier as performed at `at`.
    pub fn with_checks_at(mut self, at: NaiveDateTime) -> Self {
        for tier in CheckType::ALL.iter().copied() {
            self.checks.stamp(tier, at);
        }
        self
    }

    /// Fails with `StatusMismatch` unless the aircraft is in one of `allowed`.
    pub fn require_status(&self, allowed: &[AircraftStatus]) -> Result<(), StoreError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(StoreError::StatusMismatch {
                aircraft_id: self.id,
                found: self.status,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CabinPrices {
    pub economy: f64,
    pub premium: f64,
    pub business: f64,
    pub first: f64,
}

/// Running aggregates of a route. `last_revenue_game_day` is the marker
/// that keeps revenue from posting twice on the same game day.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RouteStats {
    pub total_flights: u64,
    pub total_revenue: f64,
    pub total_costs: f64,
    pub total_passengers: u64,
    pub average_load_factor: f64,
    pub last_revenue_game_day: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub id: RouteId,
    pub membership_id: MembershipId,
    pub world_id: WorldId,
    pub origin: String,
    pub destination: String,
    pub distance_km: f64,
    pub prices: CabinPrices,
    pub stats: RouteStats,
}

impl Route {
    pub fn new(
        membership: &Membership,
        origin: &str,
        destination: &str,
        distance_km: f64,
        prices: CabinPrices,
    ) -> Self {
        Route {
            id: Uuid::new_v4(),
            membership_id: membership.id,
            world_id: membership.world_id,
            origin: origin.to_string(),
            destination: destination.to_string(),
            distance_km,
            prices,
            stats: RouteStats::default(),
        }
    }
}
