use chrono::{DateTime, Duration, Utc};
use deploybar_core::types::{FeedItem, NotificationIntent};

/// Items of `current` whose link does not appear in `previous`.
pub fn find_new_items<'a>(previous: &[FeedItem], current: &'a [FeedItem]) -> Vec<&'a FeedItem> {
    current
        .iter()
        .filter(|item| !previous.iter().any(|prev| prev.link == item.link))
        .collect()
}

/// Items of `current` that were already in `previous` but whose content changed.
pub fn find_updated_items<'a>(previous: &[FeedItem], current: &'a [FeedItem]) -> Vec<&'a FeedItem> {
    current
        .iter()
        .filter(|item| {
            previous
                .iter()
                .any(|prev| prev.link == item.link && prev.content != item.content)
        })
        .collect()
}

/// Items published on the UTC day of `now` or the day before.
///
/// Used on the first fetch instead of diffing, so a fresh start announces
/// what is current without replaying the whole history.
pub fn recent_items(feed: &[FeedItem], now: DateTime<Utc>) -> Vec<&FeedItem> {
    let today = now.date_naive();
    let yesterday = today - Duration::days(1);
    feed.iter()
        .filter(|item| {
            let day = item.publication_date.date_naive();
            day == today || day == yesterday
        })
        .collect()
}

/// The previous and current snapshot of the incident feed.
#[derive(Debug, Clone, Default)]
pub struct IncidentFeed {
    previous: Vec<FeedItem>,
    current: Vec<FeedItem>,
}

impl IncidentFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a freshly fetched feed; the old current feed becomes previous.
    pub fn update(&mut self, fetched: Vec<FeedItem>) {
        self.previous = std::mem::replace(&mut self.current, fetched);
    }

    /// Items added since the last update. Empty until two fetches happened.
    pub fn new_incidents(&self) -> Vec<&FeedItem> {
        if self.previous.is_empty() {
            return Vec::new();
        }
        find_new_items(&self.previous, &self.current)
    }

    pub fn updated_incidents(&self) -> Vec<&FeedItem> {
        find_updated_items(&self.previous, &self.current)
    }

    pub fn feed(&self) -> &[FeedItem] {
        &self.current
    }
}

/// Notifications for incident changes. Activating one opens the incident page.
pub fn incident_notifications(new: &[&FeedItem], updated: &[&FeedItem]) -> Vec<NotificationIntent> {
    let announce = |title: &str, item: &FeedItem| {
        NotificationIntent::new(title, item.title.clone()).opening(item.link.clone())
    };
    new.iter()
        .map(|item| announce("New incident reported", item))
        .chain(updated.iter().map(|item| announce("Incident updated", item)))
        .collect()
}
