use deploybar_core::types::{Deploy, DeployState, NotificationIntent};
use tracing::debug;

/// Deploys split at the first settled deploy of a newest-first listing.
///
/// `pending ++ ready` is always the classified input, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeployBuckets {
    /// In-flight or queued deploys, newest first.
    pub pending: Vec<Deploy>,
    /// The first settled deploy and everything older.
    pub ready: Vec<Deploy>,
}

impl DeployBuckets {
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.ready.is_empty()
    }

    /// Pending deploys followed by ready deploys.
    pub fn iter(&self) -> impl Iterator<Item = &Deploy> {
        self.pending.iter().chain(self.ready.iter())
    }
}

fn is_boundary(deploy: &Deploy) -> bool {
    deploy.state == DeployState::Ready || deploy.is_skipped_error()
}

/// Split a newest-first deploy listing into pending and ready buckets.
///
/// A single left-to-right pass with a one-way latch: the first `ready`
/// deploy, or `error` deploy with message `"Skipped"`, and everything after
/// it is ready. Skipped errors are normalized to [`DeployState::Skipped`] on
/// the deploy itself.
pub fn classify_deploys(deploys: Vec<Deploy>) -> DeployBuckets {
    let mut buckets = DeployBuckets::default();
    let mut settled = false;

    for mut deploy in deploys {
        if !settled && is_boundary(&deploy) {
            settled = true;
        }
        if deploy.is_skipped_error() {
            deploy.state = DeployState::Skipped;
        }
        if settled {
            buckets.ready.push(deploy);
        } else {
            buckets.pending.push(deploy);
        }
    }

    buckets
}

/// The deploy worth watching: the oldest pending one (next to finish), or
/// the newest settled one when nothing is in flight.
pub fn current_deploy(buckets: &DeployBuckets) -> Option<&Deploy> {
    buckets.pending.last().or_else(|| buckets.ready.first())
}

/// Decide whether moving from `previous` to `current` deserves a notification.
///
/// No notification on the first observation or when nothing changed; a
/// different id means a new deploy took the slot, the same id with a
/// different state means the deploy progressed.
pub fn notification_for_deploy_transition(
    previous: Option<&Deploy>,
    current: &Deploy,
) -> Option<NotificationIntent> {
    let previous = previous?;

    if previous.id != current.id {
        Some(NotificationIntent::new(
            "New deploy started",
            format!("New deploy state: {}", current.state),
        ))
    } else if previous.state != current.state {
        Some(NotificationIntent::new(
            "Deploy progressed",
            format!("Deploy state: {}", current.state),
        ))
    } else {
        None
    }
}

/// Remembers the last observed current deploy between polls.
#[derive(Debug, Clone, Default)]
pub struct DeployTracker {
    previous: Option<Deploy>,
}

impl DeployTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous(&self) -> Option<&Deploy> {
        self.previous.as_ref()
    }

    /// Evaluate a fresh classification and store its current deploy.
    ///
    /// An empty classification leaves the stored snapshot untouched.
    pub fn observe(&mut self, buckets: &DeployBuckets) -> Option<NotificationIntent> {
        let current = current_deploy(buckets)?;
        let intent = notification_for_deploy_transition(self.previous.as_ref(), current);
        if let Some(ref intent) = intent {
            debug!(deploy_id = %current.id, state = %current.state, title = %intent.title, "deploy transition");
        }
        self.previous = Some(current.clone());
        intent
    }

    /// Forget the snapshot, e.g. after switching to another site.
    pub fn reset(&mut self) {
        self.previous = None;
    }
}

/// Tray title for `count` pending deploys: subscript digits, capped at `₉₊`.
pub fn pending_badge(count: usize) -> String {
    const SUBSCRIPT_ZERO: u32 = 0x2080;
    match count {
        0 => String::new(),
        1..=9 => char::from_u32(SUBSCRIPT_ZERO + count as u32)
            .map(String::from)
            .unwrap_or_default(),
        _ => "₉₊".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn deploy(id: &str, state: &str, error_message: Option<&str>) -> Deploy {
        Deploy {
            id: id.to_string(),
            state: DeployState::from(state),
            error_message: error_message.map(String::from),
            branch: "main".to_string(),
            context: "production".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            deploy_time: None,
        }
    }

    fn ids(deploys: &[Deploy]) -> Vec<&str> {
        deploys.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn groups_deploys_at_first_settled_deploy() {
        let buckets = classify_deploys(vec![
            deploy("1", "new", None),
            deploy("2", "building", None),
            deploy("3", "error", Some("Skipped")),
            deploy("4", "ready", None),
            deploy("5", "ready", None),
        ]);

        assert_eq!(buckets.pending.len(), 2);
        assert_eq!(buckets.ready.len(), 3);
        assert_eq!(buckets.ready[0].state, DeployState::Skipped);
        assert_eq!(ids(&buckets.ready), vec!["3", "4", "5"]);
    }

    #[test]
    fn buckets_partition_input_in_order() {
        let cases = vec![
            vec![],
            vec![deploy("a", "building", None)],
            vec![deploy("a", "ready", None), deploy("b", "building", None)],
            vec![
                deploy("a", "new", None),
                deploy("b", "error", Some("Build script returned non-zero exit code")),
                deploy("c", "enqueued", None),
                deploy("d", "ready", None),
                deploy("e", "error", None),
            ],
        ];

        for input in cases {
            let expected: Vec<String> = input.iter().map(|d| d.id.clone()).collect();
            let buckets = classify_deploys(input);
            let actual: Vec<String> = buckets.iter().map(|d| d.id.clone()).collect();
            assert_eq!(actual, expected);
        }
    }

    #[test]
    fn without_boundary_everything_is_pending() {
        let buckets = classify_deploys(vec![
            deploy("1", "building", None),
            deploy("2", "error", Some("Failed")),
        ]);
        assert_eq!(buckets.pending.len(), 2);
        assert!(buckets.ready.is_empty());
        assert_eq!(buckets.pending[1].state, DeployState::Error);
    }

    #[test]
    fn skipped_after_boundary_is_still_normalized() {
        let buckets = classify_deploys(vec![
            deploy("1", "ready", None),
            deploy("2", "error", Some("Skipped")),
        ]);
        assert_eq!(buckets.ready[1].state, DeployState::Skipped);
    }

    #[test]
    fn current_deploy_prefers_last_pending_then_first_ready() {
        let buckets = classify_deploys(vec![
            deploy("1", "new", None),
            deploy("2", "building", None),
            deploy("3", "ready", None),
        ]);
        assert_eq!(current_deploy(&buckets).map(|d| d.id.as_str()), Some("2"));

        let buckets = classify_deploys(vec![deploy("3", "ready", None), deploy("4", "ready", None)]);
        assert_eq!(current_deploy(&buckets).map(|d| d.id.as_str()), Some("3"));

        assert!(current_deploy(&DeployBuckets::default()).is_none());
    }

    #[test]
    fn first_observation_never_notifies() {
        for state in ["new", "building", "ready", "error", "anything"] {
            assert!(notification_for_deploy_transition(None, &deploy("1", state, None)).is_none());
        }
    }

    #[test]
    fn different_id_is_a_new_deploy() {
        let intent = notification_for_deploy_transition(
            Some(&deploy("1", "pending", None)),
            &deploy("2", "skipped", None),
        )
        .unwrap();
        assert_eq!(intent.title, "New deploy started");
        assert_eq!(intent.body, "New deploy state: skipped");
        assert!(intent.activation.is_none());
    }

    #[test]
    fn same_id_with_new_state_progressed() {
        let intent = notification_for_deploy_transition(
            Some(&deploy("1", "pending", None)),
            &deploy("1", "ready", None),
        )
        .unwrap();
        assert_eq!(intent.title, "Deploy progressed");
        assert_eq!(intent.body, "Deploy state: ready");
    }

    #[test]
    fn unchanged_deploy_is_silent() {
        assert!(notification_for_deploy_transition(
            Some(&deploy("1", "same", None)),
            &deploy("1", "same", None),
        )
        .is_none());
    }

    #[test]
    fn tracker_fires_only_on_transitions() {
        let mut tracker = DeployTracker::new();

        assert!(tracker.observe(&classify_deploys(vec![deploy("1", "building", None)])).is_none());
        assert!(tracker.observe(&classify_deploys(vec![deploy("1", "building", None)])).is_none());

        let intent = tracker.observe(&classify_deploys(vec![deploy("1", "ready", None)])).unwrap();
        assert_eq!(intent.title, "Deploy progressed");

        let intent = tracker
            .observe(&classify_deploys(vec![deploy("2", "new", None), deploy("1", "ready", None)]))
            .unwrap();
        assert_eq!(intent.title, "New deploy started");
        assert_eq!(tracker.previous().map(|d| d.id.as_str()), Some("2"));
    }

    #[test]
    fn tracker_keeps_snapshot_on_empty_listing_and_resets() {
        let mut tracker = DeployTracker::new();
        tracker.observe(&classify_deploys(vec![deploy("1", "ready", None)]));
        assert!(tracker.observe(&DeployBuckets::default()).is_none());
        assert!(tracker.previous().is_some());

        tracker.reset();
        assert!(tracker
            .observe(&classify_deploys(vec![deploy("9", "ready", None)]))
            .is_none());
    }

    #[test]
    fn pending_badge_uses_subscripts() {
        assert_eq!(pending_badge(0), "");
        assert_eq!(pending_badge(1), "₁");
        assert_eq!(pending_badge(5), "₅");
        assert_eq!(pending_badge(9), "₉");
        assert_eq!(pending_badge(11), "₉₊");
    }
}
