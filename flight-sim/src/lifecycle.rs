use chrono::{Duration, Months, NaiveDateTime};
use logger::Logger;
use persistence::{
    Aircraft, AircraftId, AircraftStatus, LeaseOut, Listing, ListingKind, MembershipId,
    RecallInfo, Store, StoreError, WorldId,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::types::config::SimConfig;
use crate::types::notification::{Notification, NotificationSink};
use crate::types::sim_error::SimError;

/// Game days a listing sits before anyone shows interest.
pub const LISTING_GRACE_DAYS: i64 = 7;
/// Minutes added to every ferry flight for taxi, climb and descent.
const FERRY_OVERHEAD_MINUTES: f64 = 60.0;

/// Chance per pass that a listing finds a buyer or lessee.
pub fn listing_probability(days_listed: i64) -> f64 {
    if days_listed < LISTING_GRACE_DAYS {
        return 0.0;
    }
    (0.05 + 0.01 * (days_listed - LISTING_GRACE_DAYS) as f64).min(0.30)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ListingResolution {
    Sold { price: f64 },
    LeasedOut { monthly_rate: f64, until: NaiveDateTime },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthlySettlement {
    pub month: String,
    /// Net change per airline: lease income minus storage costs.
    pub net_by_membership: BTreeMap<MembershipId, f64>,
}

/// Status machine of an aircraft outside its flying and maintenance life:
/// ferry recalls, storage, sale and lease listings, leases out, and the
/// monthly money those produce.
pub struct AircraftLifecycle {
    store: Arc<dyn Store>,
    sink: Arc<dyn NotificationSink>,
    config: SimConfig,
    rng: Mutex<StdRng>,
    logger: Logger,
}

impl AircraftLifecycle {
    pub fn new(
        store: Arc<dyn Store>,
        sink: Arc<dyn NotificationSink>,
        config: SimConfig,
        logger: Logger,
    ) -> Self {
        AircraftLifecycle {
            store,
            sink,
            config,
            rng: Mutex::new(StdRng::from_entropy()),
            logger,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Sends the aircraft on a ferry flight to `destination`. It lands in
    /// storage when the destination is a storage airport and back in active
    /// service otherwise.
    pub fn recall(
        &self,
        aircraft_id: AircraftId,
        destination: &str,
        now: NaiveDateTime,
    ) -> Result<Aircraft, SimError> {
        let aircraft = self.store.get_aircraft(aircraft_id)?;
        require(&aircraft, &[AircraftStatus::Active, AircraftStatus::Storage], "recall")?;
        if aircraft.cruise_speed_kmh <= 0.0 {
            return Err(SimError::InvalidInput(format!(
                "{} has no cruise speed",
                aircraft.registration
            )));
        }

        let from = self.store.get_airport(&aircraft.current_airport)?;
        let to = self.store.get_airport(destination)?;
        let ferry_minutes =
            from.distance_km(&to) / aircraft.cruise_speed_kmh * 60.0 + FERRY_OVERHEAD_MINUTES;
        let available_at = now + Duration::minutes(ferry_minutes.round() as i64);

        let recall = RecallInfo {
            destination: to.iata_code.clone(),
            to_storage: self.config.is_storage_airport(&to.iata_code),
            available_at,
        };
        let aircraft = self.transition(
            aircraft_id,
            &[AircraftStatus::Active, AircraftStatus::Storage],
            "recall",
            &mut |a| {
                a.status = AircraftStatus::Recalling;
                a.recall = Some(recall.clone());
            },
        )?;
        self.logger.info(
            "lifecycle",
            &format!(
                "{} ferrying {} -> {}, available at {}",
                aircraft.registration, from.iata_code, to.iata_code, available_at
            ),
        );
        self.changed(aircraft.membership_id);
        Ok(aircraft)
    }

    /// Lands every ferry flight of the world that has arrived by `now`.
    pub fn resolve_recalls(&self, world: WorldId, now: NaiveDateTime) -> Result<Vec<AircraftId>, SimError> {
        let mut landed = Vec::new();
        for listed in self.store.list_aircraft(world, Some(AircraftStatus::Recalling))? {
            if listed.recall.as_ref().map_or(true, |recall| recall.available_at > now) {
                continue;
            }
            let mut arrived: Option<RecallInfo> = None;
            let landing = self.transition(listed.id, &[AircraftStatus::Recalling], "land", &mut |a| {
                let Some(recall) = a.recall.take() else {
                    return;
                };
                a.current_airport = recall.destination.clone();
                a.status = if recall.to_storage {
                    AircraftStatus::Storage
                } else {
                    AircraftStatus::Active
                };
                arrived = Some(recall);
            });
            let aircraft = match landing {
                Ok(aircraft) => aircraft,
                Err(SimError::InvalidTransition { .. }) => continue,
                Err(e) => return Err(e),
            };
            let Some(recall) = arrived else {
                continue;
            };

            let notification = if recall.to_storage {
                Notification::AircraftStored {
                    membership_id: aircraft.membership_id,
                    aircraft_id: aircraft.id,
                    airport: recall.destination,
                }
            } else {
                Notification::AircraftRecalled {
                    membership_id: aircraft.membership_id,
                    aircraft_id: aircraft.id,
                    airport: recall.destination,
                }
            };
            self.sink.push(notification);
            self.changed(aircraft.membership_id);
            landed.push(aircraft.id);
        }
        Ok(landed)
    }

    pub fn list_for_sale(
        &self,
        aircraft_id: AircraftId,
        asking_price: f64,
        now: NaiveDateTime,
    ) -> Result<Aircraft, SimError> {
        if asking_price <= 0.0 {
            return Err(SimError::InvalidInput("asking price must be positive".to_string()));
        }
        self.list(
            aircraft_id,
            now,
            AircraftStatus::ListedSale,
            ListingKind::Sale { asking_price },
        )
    }

    pub fn list_for_lease(
        &self,
        aircraft_id: AircraftId,
        monthly_rate: f64,
        term_months: u32,
        now: NaiveDateTime,
    ) -> Result<Aircraft, SimError> {
        if monthly_rate <= 0.0 || term_months == 0 {
            return Err(SimError::InvalidInput(
                "a lease needs a positive rate and term".to_string(),
            ));
        }
        self.list(
            aircraft_id,
            now,
            AircraftStatus::ListedLease,
            ListingKind::Lease {
                monthly_rate,
                term_months,
            },
        )
    }

    pub fn cancel_listing(&self, aircraft_id: AircraftId) -> Result<Aircraft, SimError> {
        let aircraft = self.transition(
            aircraft_id,
            &[AircraftStatus::ListedSale, AircraftStatus::ListedLease],
            "cancel a listing",
            &mut |a| {
                a.status = AircraftStatus::Active;
                a.listing = None;
            },
        )?;
        self.changed(aircraft.membership_id);
        Ok(aircraft)
    }

    /// Rolls once for every listed aircraft of the world.
    pub fn resolve_listings(
        &self,
        world: WorldId,
        now: NaiveDateTime,
    ) -> Result<Vec<(AircraftId, ListingResolution)>, SimError> {
        let mut listed = self.store.list_aircraft(world, Some(AircraftStatus::ListedSale))?;
        listed.extend(self.store.list_aircraft(world, Some(AircraftStatus::ListedLease))?);

        let mut resolved = Vec::new();
        for aircraft in listed {
            let roll: f64 = self.rng.lock()?.gen();
            let id = aircraft.id;
            match self.resolve_listing(aircraft, now, roll) {
                Ok(Some(resolution)) => resolved.push((id, resolution)),
                Ok(None) => {}
                Err(e) => self
                    .logger
                    .error("lifecycle", &format!("Listing of {} failed: {}", id, e)),
            }
        }
        Ok(resolved)
    }

    /// Completes the listing when `roll` (uniform in `0..1`) falls under the
    /// listing's current probability. A sale first marks the aircraft sold,
    /// so no other pass can recall or relist it while its record is removed.
    pub fn resolve_listing(
        &self,
        aircraft: Aircraft,
        now: NaiveDateTime,
        roll: f64,
    ) -> Result<Option<ListingResolution>, SimError> {
        let Some(listing) = aircraft.listing else {
            return Ok(None);
        };
        let days_listed = (now - listing.listed_at).num_days();
        if roll >= listing_probability(days_listed) {
            return Ok(None);
        }

        match listing.kind {
            ListingKind::Sale { asking_price } => {
                self.transition(aircraft.id, &[AircraftStatus::ListedSale], "be sold", &mut |a| {
                    a.status = AircraftStatus::Sold;
                    a.listing = None;
                })?;
                for mut template in self.store.list_templates_for_aircraft(aircraft.id)? {
                    if template.is_active {
                        template.is_active = false;
                        self.store.save_template(&template)?;
                    }
                }
                self.store.delete_patterns(aircraft.id)?;
                self.store.delete_aircraft(aircraft.id)?;
                self.store.adjust_balance(aircraft.membership_id, asking_price)?;
                self.logger.info(
                    "lifecycle",
                    &format!("{} sold for {:.2}", aircraft.registration, asking_price),
                );
                self.sink.push(Notification::AircraftSold {
                    membership_id: aircraft.membership_id,
                    aircraft_id: aircraft.id,
                    price: asking_price,
                });
                self.changed(aircraft.membership_id);
                Ok(Some(ListingResolution::Sold {
                    price: asking_price,
                }))
            }
            ListingKind::Lease {
                monthly_rate,
                term_months,
            } => {
                let until = now
                    .checked_add_months(Months::new(term_months))
                    .ok_or_else(|| SimError::InvalidInput(format!("lease term of {} months", term_months)))?;
                let lease = LeaseOut {
                    start: now,
                    end: until,
                    monthly_rate,
                };
                self.transition(
                    aircraft.id,
                    &[AircraftStatus::ListedLease],
                    "be leased out",
                    &mut |a| {
                        a.status = AircraftStatus::LeasedOut;
                        a.listing = None;
                        a.lease_out = Some(lease);
                    },
                )?;
                self.logger.info(
                    "lifecycle",
                    &format!("{} leased out until {}", aircraft.registration, until),
                );
                self.sink.push(Notification::AircraftLeasedOut {
                    membership_id: aircraft.membership_id,
                    aircraft_id: aircraft.id,
                    monthly_rate,
                    until,
                });
                self.changed(aircraft.membership_id);
                Ok(Some(ListingResolution::LeasedOut {
                    monthly_rate,
                    until,
                }))
            }
        }
    }

    /// Returns leased-out aircraft whose lease has ended.
    pub fn expire_leases(&self, world: WorldId, now: NaiveDateTime) -> Result<Vec<AircraftId>, SimError> {
        let mut returned = Vec::new();
        for listed in self.store.list_aircraft(world, Some(AircraftStatus::LeasedOut))? {
            if listed.lease_out.map_or(false, |lease| lease.end > now) {
                continue;
            }
            let returning = self.transition(
                listed.id,
                &[AircraftStatus::LeasedOut],
                "return from lease",
                &mut |a| {
                    a.status = AircraftStatus::Active;
                    a.lease_out = None;
                },
            );
            let aircraft = match returning {
                Ok(aircraft) => aircraft,
                Err(SimError::InvalidTransition { .. }) => continue,
                Err(e) => return Err(e),
            };
            self.sink.push(Notification::LeaseExpired {
                membership_id: aircraft.membership_id,
                aircraft_id: aircraft.id,
            });
            self.changed(aircraft.membership_id);
            returned.push(aircraft.id);
        }
        Ok(returned)
    }

    /// Credits lease income and debits storage costs once per game month.
    ///
    /// The month marker is written before any balance moves, so a failure
    /// part-way loses that month's settlement instead of repeating it.
    pub fn monthly_settlement(
        &self,
        world: WorldId,
        now: NaiveDateTime,
    ) -> Result<Option<MonthlySettlement>, SimError> {
        let month = now.format("%Y-%m").to_string();
        let stored_world = self.store.get_world(world)?;
        if stored_world.last_processed_month.as_deref() == Some(month.as_str()) {
            return Ok(None);
        }
        self.store.set_month_marker(world, &month)?;

        let mut settlement = MonthlySettlement {
            month,
            ..Default::default()
        };
        for aircraft in self.store.list_aircraft(world, None)? {
            let delta = match (aircraft.status, aircraft.lease_out) {
                (AircraftStatus::LeasedOut, Some(lease)) => lease.monthly_rate,
                (AircraftStatus::Storage, _) => -self.config.storage_cost_per_month,
                _ => continue,
            };
            *settlement
                .net_by_membership
                .entry(aircraft.membership_id)
                .or_insert(0.0) += delta;
        }

        for (membership, net) in &settlement.net_by_membership {
            if let Err(e) = self.store.adjust_balance(*membership, *net) {
                self.logger.error(
                    "lifecycle",
                    &format!("Settlement of {} for {} failed: {}", settlement.month, membership, e),
                );
                continue;
            }
            self.changed(*membership);
        }
        self.logger.info(
            "lifecycle",
            &format!(
                "Monthly settlement {} for {} airline(s)",
                settlement.month,
                settlement.net_by_membership.len()
            ),
        );
        Ok(Some(settlement))
    }

    fn list(
        &self,
        aircraft_id: AircraftId,
        now: NaiveDateTime,
        status: AircraftStatus,
        kind: ListingKind,
    ) -> Result<Aircraft, SimError> {
        let aircraft = self.transition(aircraft_id, &[AircraftStatus::Active], "be listed", &mut |a| {
            a.status = status;
            a.listing = Some(Listing {
                listed_at: now,
                kind,
            });
        })?;
        self.changed(aircraft.membership_id);
        Ok(aircraft)
    }

    /// Applies `change` in one store update, provided the stored aircraft is
    /// still in one of the `allowed` statuses at that moment.
    fn transition(
        &self,
        aircraft_id: AircraftId,
        allowed: &[AircraftStatus],
        action: &'static str,
        change: &mut dyn FnMut(&mut Aircraft),
    ) -> Result<Aircraft, SimError> {
        self.store
            .update_aircraft(aircraft_id, &mut |a| {
                a.require_status(allowed)?;
                change(a);
                Ok(())
            })
            .map_err(|e| match e {
                StoreError::StatusMismatch { aircraft_id, found } => SimError::InvalidTransition {
                    aircraft: aircraft_id,
                    from: found,
                    action,
                },
                other => other.into(),
            })
    }

    fn changed(&self, membership_id: MembershipId) {
        self.sink
            .push(Notification::NotificationsChanged { membership_id });
    }
}

fn require(aircraft: &Aircraft, allowed: &[AircraftStatus], action: &'static str) -> Result<(), SimError> {
    if allowed.contains(&aircraft.status) {
        Ok(())
    } else {
        Err(SimError::InvalidTransition {
            aircraft: aircraft.id,
            from: aircraft.status,
            action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;
    use crate::types::notification::ChannelSink;
    use std::sync::mpsc::Receiver;

    fn lifecycle(fx: &Fixture) -> (AircraftLifecycle, Receiver<Notification>) {
        let (sink, receiver) = ChannelSink::new();
        let lifecycle = AircraftLifecycle::new(
            fx.store.clone(),
            Arc::new(sink),
            SimConfig::default(),
            Logger::silent(),
        )
        .with_seed(3);
        (lifecycle, receiver)
    }

    fn kinds(receiver: &Receiver<Notification>) -> Vec<&'static str> {
        receiver.try_iter().map(|n| n.kind()).collect()
    }

    #[test]
    fn test_listing_probability_curve() {
        assert_eq!(listing_probability(0), 0.0);
        assert_eq!(listing_probability(6), 0.0);
        assert!((listing_probability(7) - 0.05).abs() < 1e-12);
        assert!((listing_probability(17) - 0.15).abs() < 1e-12);
        assert_eq!(listing_probability(32), 0.30);
        assert_eq!(listing_probability(400), 0.30);
    }

    #[test]
    fn test_recall_to_storage_and_back() {
        let fx = Fixture::new();
        let (lifecycle, receiver) = lifecycle(&fx);
        let now = Fixture::game_time("2024-01-01 08:00");

        let recalling = lifecycle.recall(fx.aircraft.id, "COR", now).unwrap();
        assert_eq!(recalling.status, AircraftStatus::Recalling);
        let recall = recalling.recall.clone().unwrap();
        assert!(!recall.to_storage);
        // About 650 km at 830 km/h plus an hour.
        assert!(recall.available_at > now + Duration::minutes(100));
        assert!(recall.available_at < now + Duration::minutes(115));

        assert!(lifecycle.resolve_recalls(fx.world.id, now + Duration::minutes(30)).unwrap().is_empty());
        let landed = lifecycle.resolve_recalls(fx.world.id, recall.available_at).unwrap();
        assert_eq!(landed, vec![fx.aircraft.id]);
        let aircraft = fx.store.get_aircraft(fx.aircraft.id).unwrap();
        assert_eq!(aircraft.status, AircraftStatus::Active);
        assert_eq!(aircraft.current_airport, "COR");
        assert_eq!(
            kinds(&receiver),
            vec!["notifications_changed", "aircraft_recalled", "notifications_changed"]
        );

        let later = recall.available_at + Duration::hours(1);
        let stored = lifecycle.recall(fx.aircraft.id, "VCV", later).unwrap();
        assert!(stored.recall.as_ref().unwrap().to_storage);
        let arrival = stored.recall.unwrap().available_at;
        lifecycle.resolve_recalls(fx.world.id, arrival).unwrap();
        assert_eq!(fx.store.get_aircraft(fx.aircraft.id).unwrap().status, AircraftStatus::Storage);
        assert!(kinds(&receiver).contains(&"aircraft_stored"));
    }

    #[test]
    fn test_wrong_source_state_is_rejected() {
        let fx = Fixture::new();
        let (lifecycle, _receiver) = lifecycle(&fx);
        let now = Fixture::game_time("2024-01-01 08:00");
        lifecycle.list_for_sale(fx.aircraft.id, 1_000_000.0, now).unwrap();

        let result = lifecycle.recall(fx.aircraft.id, "COR", now);
        assert!(matches!(
            result,
            Err(SimError::InvalidTransition {
                from: AircraftStatus::ListedSale,
                ..
            })
        ));
        assert!(lifecycle.list_for_lease(fx.aircraft.id, 50_000.0, 12, now).is_err());

        let active = lifecycle.cancel_listing(fx.aircraft.id).unwrap();
        assert_eq!(active.status, AircraftStatus::Active);
        assert!(active.listing.is_none());
        assert!(lifecycle.cancel_listing(fx.aircraft.id).is_err());
    }

    #[test]
    fn test_sale_removes_aircraft_and_credits_price() {
        let fx = Fixture::new();
        let (lifecycle, receiver) = lifecycle(&fx);
        let listed_at = Fixture::game_time("2024-01-01 08:00");
        let aircraft = lifecycle.list_for_sale(fx.aircraft.id, 2_500_000.0, listed_at).unwrap();

        // Too early for any interest, whatever the roll.
        let early = lifecycle
            .resolve_listing(aircraft.clone(), listed_at + Duration::days(3), 0.0)
            .unwrap();
        assert_eq!(early, None);

        let sold = lifecycle
            .resolve_listing(aircraft, listed_at + Duration::days(10), 0.01)
            .unwrap();
        assert_eq!(sold, Some(ListingResolution::Sold { price: 2_500_000.0 }));
        assert!(fx.store.get_aircraft(fx.aircraft.id).is_err());
        assert!(fx.store.list_patterns(fx.aircraft.id).unwrap().is_empty());
        let balance = fx.store.get_membership(fx.membership.id).unwrap().balance;
        assert_eq!(balance, 12_500_000.0);
        assert!(kinds(&receiver).contains(&"aircraft_sold"));
    }

    #[test]
    fn test_withdrawn_listing_cannot_be_sold() {
        let fx = Fixture::new();
        let (lifecycle, _receiver) = lifecycle(&fx);
        let listed_at = Fixture::game_time("2024-01-01 08:00");
        let stale = lifecycle.list_for_sale(fx.aircraft.id, 2_500_000.0, listed_at).unwrap();
        lifecycle.cancel_listing(fx.aircraft.id).unwrap();

        let result = lifecycle.resolve_listing(stale, listed_at + Duration::days(10), 0.0);
        assert!(matches!(
            result,
            Err(SimError::InvalidTransition {
                from: AircraftStatus::Active,
                ..
            })
        ));
        assert_eq!(fx.store.get_aircraft(fx.aircraft.id).unwrap().status, AircraftStatus::Active);
        assert_eq!(fx.store.get_membership(fx.membership.id).unwrap().balance, 10_000_000.0);
    }

    #[test]
    fn test_lease_out_and_expiry() {
        let fx = Fixture::new();
        let (lifecycle, receiver) = lifecycle(&fx);
        let listed_at = Fixture::game_time("2024-01-01 08:00");
        let aircraft = lifecycle
            .list_for_lease(fx.aircraft.id, 80_000.0, 6, listed_at)
            .unwrap();

        let now = listed_at + Duration::days(8);
        let resolution = lifecycle.resolve_listing(aircraft, now, 0.0).unwrap();
        let until = Fixture::game_time("2024-07-09 08:00");
        assert_eq!(
            resolution,
            Some(ListingResolution::LeasedOut {
                monthly_rate: 80_000.0,
                until,
            })
        );
        assert_eq!(fx.store.get_aircraft(fx.aircraft.id).unwrap().status, AircraftStatus::LeasedOut);

        assert!(lifecycle.expire_leases(fx.world.id, until - Duration::minutes(1)).unwrap().is_empty());
        assert_eq!(lifecycle.expire_leases(fx.world.id, until).unwrap(), vec![fx.aircraft.id]);
        assert_eq!(fx.store.get_aircraft(fx.aircraft.id).unwrap().status, AircraftStatus::Active);
        assert!(kinds(&receiver).contains(&"lease_expired"));
    }

    #[test]
    fn test_monthly_settlement_runs_once_per_month() {
        let fx = Fixture::new();
        let (lifecycle, _receiver) = lifecycle(&fx);
        let mut leased = fx.store.get_aircraft(fx.aircraft.id).unwrap();
        leased.status = AircraftStatus::LeasedOut;
        leased.lease_out = Some(LeaseOut {
            start: Fixture::game_time("2024-01-01 00:00"),
            end: Fixture::game_time("2025-01-01 00:00"),
            monthly_rate: 40_000.0,
        });
        fx.store.save_aircraft(&leased).unwrap();
        let mut stored = Aircraft::new(&fx.membership, "LV-XYZ", timetable::SizeCategory::Regional, 70, 500.0, "VCV");
        stored.status = AircraftStatus::Storage;
        fx.store.insert_aircraft(&stored).unwrap();

        let january = Fixture::game_time("2024-01-15 00:00");
        let settlement = lifecycle.monthly_settlement(fx.world.id, january).unwrap().unwrap();
        assert_eq!(settlement.month, "2024-01");
        assert_eq!(settlement.net_by_membership[&fx.membership.id], 25_000.0);
        assert_eq!(lifecycle.monthly_settlement(fx.world.id, january + Duration::days(10)).unwrap(), None);

        let february = Fixture::game_time("2024-02-01 00:00");
        assert!(lifecycle.monthly_settlement(fx.world.id, february).unwrap().is_some());
        let balance = fx.store.get_membership(fx.membership.id).unwrap().balance;
        assert_eq!(balance, 10_050_000.0);
    }
}
