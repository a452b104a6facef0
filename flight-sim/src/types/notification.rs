use chrono::NaiveDateTime;
use logger::Logger;
use std::sync::{mpsc, Mutex};
use uuid::Uuid;

/// Events pushed to players and listeners. Delivery is fire-and-forget.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    WorldTick {
        world_id: Uuid,
        game_time: NaiveDateTime,
    },
    WorldCompleted {
        world_id: Uuid,
        game_time: NaiveDateTime,
    },
    AircraftRecalled {
        membership_id: Uuid,
        aircraft_id: Uuid,
        airport: String,
    },
    AircraftStored {
        membership_id: Uuid,
        aircraft_id: Uuid,
        airport: String,
    },
    AircraftSold {
        membership_id: Uuid,
        aircraft_id: Uuid,
        price: f64,
    },
    AircraftLeasedOut {
        membership_id: Uuid,
        aircraft_id: Uuid,
        monthly_rate: f64,
        until: NaiveDateTime,
    },
    LeaseExpired {
        membership_id: Uuid,
        aircraft_id: Uuid,
    },
    NotificationsChanged {
        membership_id: Uuid,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::WorldTick { .. } => "world_tick",
            Notification::WorldCompleted { .. } => "world_completed",
            Notification::AircraftRecalled { .. } => "aircraft_recalled",
            Notification::AircraftStored { .. } => "aircraft_stored",
            Notification::AircraftSold { .. } => "aircraft_sold",
            Notification::AircraftLeasedOut { .. } => "aircraft_leased_out",
            Notification::LeaseExpired { .. } => "lease_expired",
            Notification::NotificationsChanged { .. } => "notifications_changed",
        }
    }
}

pub trait NotificationSink: Send + Sync {
    fn push(&self, notification: Notification);
}

/// Forwards every notification into an mpsc channel. A dropped receiver
/// is ignored.
pub struct ChannelSink {
    sender: Mutex<mpsc::Sender<Notification>>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::Receiver<Notification>) {
        let (sender, receiver) = mpsc::channel();
        (
            ChannelSink {
                sender: Mutex::new(sender),
            },
            receiver,
        )
    }
}

impl NotificationSink for ChannelSink {
    fn push(&self, notification: Notification) {
        if let Ok(sender) = self.sender.lock() {
            let _ = sender.send(notification);
        }
    }
}

/// Writes notifications to the log. Ticks go out at debug level.
pub struct LogSink {
    logger: Logger,
}

impl LogSink {
    pub fn new(logger: Logger) -> Self {
        LogSink { logger }
    }
}

impl NotificationSink for LogSink {
    fn push(&self, notification: Notification) {
        let line = format!("{}: {:?}", notification.kind(), notification);
        match notification {
            Notification::WorldTick { .. } | Notification::NotificationsChanged { .. } => {
                self.logger.debug("notify", &line)
            }
            _ => self.logger.info("notify", &line),
        }
    }
}

pub struct NullSink;

impl NotificationSink for NullSink {
    fn push(&self, _notification: Notification) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_sink_delivers_in_order() {
        let (sink, receiver) = ChannelSink::new();
        let membership_id = Uuid::new_v4();
        sink.push(Notification::NotificationsChanged { membership_id });
        sink.push(Notification::LeaseExpired {
            membership_id,
            aircraft_id: Uuid::new_v4(),
        });
        let kinds: Vec<&str> = receiver.try_iter().map(|n| n.kind()).collect();
        assert_eq!(kinds, vec!["notifications_changed", "lease_expired"]);
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, receiver) = ChannelSink::new();
        drop(receiver);
        sink.push(Notification::NotificationsChanged {
            membership_id: Uuid::new_v4(),
        });
    }
}
