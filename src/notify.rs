use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub: subscribers follow every applied event of one date.
pub struct NotifyHub {
    channels: DashMap<NaiveDate, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a date. Creates the channel if needed.
    pub fn subscribe(&self, date: NaiveDate) -> broadcast::Receiver<Event> {
        self.channels
            .entry(date)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Send to the event's date. No-op if nobody is listening.
    pub fn send(&self, date: NaiveDate, event: &Event) {
        if let Some(sender) = self.channels.get(&date) {
            let _ = sender.send(event.clone());
        }
    }

    /// Send to every open channel (bulk operations touching all dates).
    pub fn broadcast(&self, event: &Event) {
        for entry in self.channels.iter() {
            let _ = entry.value().send(event.clone());
        }
    }

    /// Drop channels nobody listens to anymore.
    pub fn prune(&self) {
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe(date(1));
        let event = Event::DayCreated { date: date(1) };
        hub.send(date(1), &event);
        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn other_dates_are_not_delivered() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe(date(1));
        hub.send(date(2), &Event::DayCreated { date: date(2) });
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_reaches_every_date() {
        let hub = NotifyHub::new();
        let mut a = hub.subscribe(date(1));
        let mut b = hub.subscribe(date(2));
        let event = Event::Reset { staff_ids: vec![1] };
        hub.broadcast(&event);
        assert_eq!(a.recv().await.unwrap(), event);
        assert_eq!(b.recv().await.unwrap(), event);
    }

    #[test]
    fn prune_drops_unobserved_channels() {
        let hub = NotifyHub::new();
        let rx = hub.subscribe(date(1));
        drop(rx);
        hub.prune();
        assert!(hub.channels.is_empty());
        // No subscriber: sending must not panic.
        hub.send(date(1), &Event::DayCreated { date: date(1) });
    }
}
