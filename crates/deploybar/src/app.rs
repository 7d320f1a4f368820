use std::sync::Arc;

use chrono::Utc;
use deploybar_api::{ApiError, DeployApi, IncidentSource, Transport};
use deploybar_channels::NotificationSink;
use deploybar_core::config::AppSettings;
use deploybar_core::types::{Deploy, Site, User};
use deploybar_core::{DeploybarError, Result};
use deploybar_reconcile::{
    classify_deploys, current_deploy, incident_notifications, pending_badge, recent_items,
    DeployBuckets, DeployTracker, IncidentFeed,
};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::status::{TrayPublisher, TrayStatus, TrayView};

/// Who we are and what we watch. Replaced wholesale by `setup`.
#[derive(Default)]
struct Session {
    user: Option<User>,
    sites: Vec<Site>,
    site_id: Option<String>,
    buckets: DeployBuckets,
    tracker: DeployTracker,
}

/// Point-in-time view for the console and the `sites` command.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub email: Option<String>,
    pub site: Option<Site>,
    pub current: Option<Deploy>,
    pub pending: usize,
    pub view: TrayView,
}

/// Central state shared by the scheduled tasks and the console.
pub struct App<T: Transport> {
    pub api: DeployApi<T>,
    pub tray: TrayPublisher,
    incidents: Option<Arc<dyn IncidentSource>>,
    sink: Arc<dyn NotificationSink>,
    show_pending_builds: bool,
    session: Mutex<Session>,
    /// Held from fetch to apply so deploy listings land in request order.
    refresh: Mutex<()>,
    feed: Mutex<IncidentFeed>,
    reauth_tx: mpsc::Sender<()>,
}

impl<T: Transport> App<T> {
    pub fn new(
        api: DeployApi<T>,
        sink: Arc<dyn NotificationSink>,
        incidents: Option<Arc<dyn IncidentSource>>,
        settings: &AppSettings,
        reauth_tx: mpsc::Sender<()>,
    ) -> Self {
        Self {
            api,
            tray: TrayPublisher::new(),
            incidents,
            sink,
            show_pending_builds: settings.show_pending_builds,
            session: Mutex::new(Session {
                site_id: settings.current_site_id.clone(),
                ..Session::default()
            }),
            refresh: Mutex::new(()),
            feed: Mutex::new(IncidentFeed::new()),
            reauth_tx,
        }
    }

    /// Map a failed fetch: tray goes offline, a 401 asks for re-authorization.
    fn check<R>(&self, result: std::result::Result<R, ApiError>) -> Result<R> {
        result.map_err(|e| {
            self.tray.offline();
            if e.is_unauthorized() {
                self.request_reauth();
                DeploybarError::Unauthorized
            } else {
                DeploybarError::Transport(e.to_string())
            }
        })
    }

    fn request_reauth(&self) {
        // Capacity 1: repeated 401s collapse into one pending request.
        if self.reauth_tx.try_send(()).is_ok() {
            info!("re-authorization requested");
        }
    }

    /// True once a `setup` has completed.
    pub async fn is_set_up(&self) -> bool {
        self.session.lock().await.user.is_some()
    }

    /// First run of the deploy task: user, sites and deploys in one go.
    pub async fn setup(&self) -> Result<()> {
        let _refresh = self.refresh.lock().await;
        self.tray.publish(TrayView::loading());
        let preferred = self.session.lock().await.site_id.clone();

        let (user, sites, prefetched) = match preferred.as_deref() {
            Some(id) => {
                let (user, sites, deploys) = tokio::join!(
                    self.api.current_user(),
                    self.api.sites(),
                    self.api.site_deploys(id)
                );
                (user, sites, Some(deploys))
            }
            None => {
                let (user, sites) = tokio::join!(self.api.current_user(), self.api.sites());
                (user, sites, None)
            }
        };
        let user = self.check(user)?;
        let sites = self.check(sites)?;

        let site = preferred
            .as_deref()
            .and_then(|id| sites.iter().find(|s| s.id == id))
            .or_else(|| sites.first())
            .cloned()
            .ok_or(DeploybarError::NoSites)?;
        if preferred.is_some() && preferred.as_deref() != Some(site.id.as_str()) {
            warn!(configured = ?preferred, fallback = %site.id, "configured site not found");
        }

        let deploys = match prefetched {
            Some(deploys) if preferred.as_deref() == Some(site.id.as_str()) => self.check(deploys)?,
            _ => self.check(self.api.site_deploys(&site.id).await)?,
        };

        info!(email = %user.email, site = %site.name, sites = sites.len(), "setup complete");
        {
            let mut session = self.session.lock().await;
            if session.site_id.as_deref() != Some(site.id.as_str()) {
                session.tracker.reset();
            }
            session.user = Some(user);
            session.sites = sites;
            session.site_id = Some(site.id.clone());
        }
        self.apply_deploys(&site.id, deploys).await;
        Ok(())
    }

    /// Later runs of the deploy task.
    pub async fn update_deploys(&self) -> Result<()> {
        let _refresh = self.refresh.lock().await;
        let site_id = self
            .session
            .lock()
            .await
            .site_id
            .clone()
            .ok_or(DeploybarError::NoSites)?;
        let deploys = self.check(self.api.site_deploys(&site_id).await)?;
        self.apply_deploys(&site_id, deploys).await;
        Ok(())
    }

    async fn apply_deploys(&self, site_id: &str, deploys: Vec<Deploy>) {
        let buckets = classify_deploys(deploys);
        let mut session = self.session.lock().await;
        if session.site_id.as_deref() != Some(site_id) {
            debug!(%site_id, "site switched during fetch, discarding deploys");
            return;
        }

        let intent = session.tracker.observe(&buckets);
        let current = current_deploy(&buckets).cloned();
        let admin_url = session
            .sites
            .iter()
            .find(|s| s.id == site_id)
            .map(|s| s.admin_url.clone());
        let badge = if self.show_pending_builds {
            pending_badge(buckets.pending.len())
        } else {
            String::new()
        };
        debug!(%site_id, pending = buckets.pending.len(), ready = buckets.ready.len(), "deploys refreshed");
        session.buckets = buckets;
        drop(session);

        match &current {
            Some(deploy) => self.tray.publish(TrayView {
                status: TrayStatus::Deploy(deploy.state.clone()),
                badge,
            }),
            // Nothing to show, but the fetch worked.
            None if self.tray.current().status == TrayStatus::Offline => {
                self.tray.publish(TrayView::loading())
            }
            None => {}
        }

        if let Some(mut intent) = intent {
            if let (Some(admin_url), Some(deploy)) = (admin_url, &current) {
                intent = intent.opening(format!("{admin_url}/deploys/{}", deploy.id));
            }
            self.sink.notify(&intent);
        }
    }

    /// Watch another site; the next transition is measured from scratch.
    pub async fn switch_site(&self, site_id: &str) -> Result<()> {
        {
            let mut session = self.session.lock().await;
            if !session.sites.iter().any(|s| s.id == site_id) {
                return Err(DeploybarError::SiteNotFound {
                    id: site_id.to_string(),
                });
            }
            session.site_id = Some(site_id.to_string());
            session.tracker.reset();
            session.buckets = DeployBuckets::default();
        }
        info!(%site_id, "switched site");
        self.tray.publish(TrayView::loading());
        self.update_deploys().await
    }

    /// Start a build of the current site and refresh right away.
    pub async fn trigger_deploy(&self) -> Result<()> {
        let site_id = self
            .session
            .lock()
            .await
            .site_id
            .clone()
            .ok_or(DeploybarError::NoSites)?;
        self.check(self.api.create_site_build(&site_id).await)?;
        info!(%site_id, "build triggered");
        self.update_deploys().await
    }

    pub async fn sites(&self) -> Vec<Site> {
        self.session.lock().await.sites.clone()
    }

    pub async fn deploys(&self) -> DeployBuckets {
        self.session.lock().await.buckets.clone()
    }

    pub async fn status(&self) -> StatusReport {
        let session = self.session.lock().await;
        StatusReport {
            email: session.user.as_ref().map(|u| u.email.clone()),
            site: session
                .site_id
                .as_deref()
                .and_then(|id| session.sites.iter().find(|s| s.id == id))
                .cloned(),
            current: current_deploy(&session.buckets).cloned(),
            pending: session.buckets.pending.len(),
            view: self.tray.current(),
        }
    }

    /// Fetch the status feed and announce what changed.
    ///
    /// Until a feed has been seen there is nothing to diff against, so items
    /// published today or yesterday are announced instead.
    pub async fn update_incidents(&self) -> Result<()> {
        let Some(source) = &self.incidents else {
            return Ok(());
        };
        let items = self.check(source.fetch_incidents().await)?;

        let intents = {
            let mut feed = self.feed.lock().await;
            let initial = feed.feed().is_empty();
            feed.update(items);
            if initial {
                incident_notifications(&recent_items(feed.feed(), Utc::now()), &[])
            } else {
                incident_notifications(&feed.new_incidents(), &feed.updated_incidents())
            }
        };
        debug!(count = intents.len(), "incident notifications");
        for intent in &intents {
            self.sink.notify(intent);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{deploy_json, deploys_path, FakeIncidents, FakeTransport};
    use deploybar_api::Method;
    use deploybar_channels::ChannelSink;
    use deploybar_core::types::{Activation, DeployState, FeedItem, NotificationIntent};
    use serde_json::json;
    use std::time::Duration;

    struct Harness {
        app: App<FakeTransport>,
        notes: mpsc::Receiver<NotificationIntent>,
        reauth: mpsc::Receiver<()>,
        incidents: Arc<FakeIncidents>,
    }

    fn harness(transport: FakeTransport, site: Option<&str>) -> Harness {
        let (sink, notes) = ChannelSink::new(16);
        let (reauth_tx, reauth) = mpsc::channel(1);
        let incidents = Arc::new(FakeIncidents::default());
        let settings = AppSettings {
            current_site_id: site.map(String::from),
            ..AppSettings::default()
        };
        let app = App::new(
            DeployApi::new(transport),
            Arc::new(sink),
            Some(incidents.clone() as Arc<dyn IncidentSource>),
            &settings,
            reauth_tx,
        );
        Harness {
            app,
            notes,
            reauth,
            incidents,
        }
    }

    fn transport(h: &Harness) -> &FakeTransport {
        h.app.api.transport()
    }

    #[tokio::test]
    async fn setup_falls_back_to_first_site() {
        let h = harness(FakeTransport::with_account(), None);
        h.app.setup().await.unwrap();

        let status = h.app.status().await;
        assert_eq!(status.email.as_deref(), Some("me@example.com"));
        assert_eq!(status.site.map(|s| s.id), Some("s1".to_string()));
        assert_eq!(status.current.map(|d| d.id), Some("d2".to_string()));
        assert_eq!(status.pending, 1);
        assert_eq!(
            h.app.tray.current(),
            TrayView {
                status: TrayStatus::Deploy(DeployState::Building),
                badge: "₁".to_string()
            }
        );
    }

    #[tokio::test]
    async fn setup_prefetches_configured_site() {
        let h = harness(FakeTransport::with_account(), Some("s2"));
        h.app.setup().await.unwrap();

        assert_eq!(transport(&h).count(&deploys_path("s2")), 1);
        assert_eq!(transport(&h).count(&deploys_path("s1")), 0);
        assert_eq!(h.app.status().await.site.map(|s| s.name), Some("docs".to_string()));
    }

    #[tokio::test]
    async fn setup_with_unknown_configured_site_uses_first() {
        let h = harness(FakeTransport::with_account(), Some("gone"));
        h.app.setup().await.unwrap();
        assert_eq!(h.app.status().await.site.map(|s| s.id), Some("s1".to_string()));
    }

    #[tokio::test]
    async fn setup_without_sites_fails() {
        let t = FakeTransport::with_account();
        t.respond("/sites", json!([]));
        let h = harness(t, None);
        assert!(matches!(h.app.setup().await, Err(DeploybarError::NoSites)));
    }

    #[tokio::test]
    async fn transition_notifies_with_deploy_page() {
        let mut h = harness(FakeTransport::with_account(), None);
        h.app.setup().await.unwrap();
        assert!(h.notes.try_recv().is_err());

        transport(&h).respond(
            &deploys_path("s1"),
            json!([deploy_json("d2", "ready"), deploy_json("d1", "ready")]),
        );
        h.app.update_deploys().await.unwrap();

        let intent = h.notes.try_recv().unwrap();
        assert_eq!(intent.title, "Deploy progressed");
        assert_eq!(intent.body, "Deploy state: ready");
        assert_eq!(
            intent.activation,
            Some(Activation::OpenUrl {
                url: "https://app.example.com/sites/blog/deploys/d2".to_string()
            })
        );
        assert_eq!(h.app.tray.current().badge, "");
    }

    #[tokio::test]
    async fn unauthorized_goes_offline_and_requests_reauth() {
        let mut h = harness(FakeTransport::with_account(), None);
        h.app.setup().await.unwrap();

        transport(&h).fail(&deploys_path("s1"), 401);
        assert!(matches!(
            h.app.update_deploys().await,
            Err(DeploybarError::Unauthorized)
        ));
        assert!(matches!(
            h.app.update_deploys().await,
            Err(DeploybarError::Unauthorized)
        ));

        assert_eq!(h.app.tray.current().status, TrayStatus::Offline);
        assert!(h.reauth.try_recv().is_ok());
        assert!(h.reauth.try_recv().is_err());
    }

    #[tokio::test]
    async fn other_failures_go_offline_without_reauth() {
        let mut h = harness(FakeTransport::with_account(), None);
        h.app.setup().await.unwrap();

        transport(&h).fail(&deploys_path("s1"), 500);
        assert!(matches!(
            h.app.update_deploys().await,
            Err(DeploybarError::Transport(_))
        ));
        assert_eq!(h.app.tray.current().status, TrayStatus::Offline);
        assert!(h.reauth.try_recv().is_err());
    }

    #[tokio::test]
    async fn switch_site_resets_tracking() {
        let mut h = harness(FakeTransport::with_account(), None);
        h.app.setup().await.unwrap();

        let err = h.app.switch_site("nope").await.unwrap_err();
        assert_eq!(err.code(), "SITE_NOT_FOUND");

        h.app.switch_site("s2").await.unwrap();
        assert!(h.notes.try_recv().is_err());
        assert_eq!(h.app.status().await.current.map(|d| d.id), Some("x1".to_string()));
        assert_eq!(
            h.app.tray.current().status,
            TrayStatus::Deploy(DeployState::Ready)
        );
    }

    #[tokio::test]
    async fn trigger_deploy_posts_then_refreshes() {
        let h = harness(FakeTransport::with_account(), None);
        h.app.setup().await.unwrap();
        transport(&h).respond("/sites/s1/builds", json!({"id": "b1"}));

        h.app.trigger_deploy().await.unwrap();

        let calls = transport(&h).calls();
        let post = calls
            .iter()
            .position(|c| *c == (Method::Post, "/sites/s1/builds".to_string()))
            .unwrap();
        assert_eq!(calls[post + 1], (Method::Get, deploys_path("s1")));
    }

    #[tokio::test]
    async fn operations_before_setup_report_no_site() {
        let h = harness(FakeTransport::with_account(), None);
        assert!(matches!(h.app.update_deploys().await, Err(DeploybarError::NoSites)));
        assert!(matches!(h.app.trigger_deploy().await, Err(DeploybarError::NoSites)));
        assert!(h.app.sites().await.is_empty());
    }

    fn incident(link: &str, content: &str, age_days: i64) -> FeedItem {
        FeedItem {
            link: link.to_string(),
            title: format!("Incident {link}"),
            publication_date: Utc::now() - chrono::Duration::days(age_days),
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn incidents_first_run_announces_recent_then_diffs() {
        let mut h = harness(FakeTransport::with_account(), None);
        h.incidents
            .set(vec![incident("a", "investigating", 0), incident("old", "resolved", 30)]);

        h.app.update_incidents().await.unwrap();
        let first = h.notes.try_recv().unwrap();
        assert_eq!(first.title, "New incident reported");
        assert_eq!(first.body, "Incident a");
        assert!(h.notes.try_recv().is_err());

        h.incidents.set(vec![
            incident("b", "investigating", 0),
            incident("a", "resolved", 0),
            incident("old", "resolved", 30),
        ]);
        h.app.update_incidents().await.unwrap();
        let titles: Vec<String> = std::iter::from_fn(|| h.notes.try_recv().ok())
            .map(|i| format!("{}: {}", i.title, i.body))
            .collect();
        assert_eq!(
            titles,
            vec!["New incident reported: Incident b", "Incident updated: Incident a"]
        );
    }

    #[tokio::test]
    async fn incidents_are_not_reannounced_after_a_restart() {
        let mut h = harness(FakeTransport::with_account(), None);
        h.incidents.set(vec![incident("a", "investigating", 0)]);

        // First run, a regular tick, then the first run after a resume.
        for _ in 0..3 {
            h.app.update_incidents().await.unwrap();
        }
        let titles: Vec<String> = std::iter::from_fn(|| h.notes.try_recv().ok())
            .map(|i| i.title)
            .collect();
        assert_eq!(titles, vec!["New incident reported"]);

        h.incidents.set(vec![incident("a", "resolved", 0)]);
        h.app.update_incidents().await.unwrap();
        assert_eq!(h.notes.try_recv().unwrap().title, "Incident updated");
    }

    #[tokio::test]
    async fn empty_listing_after_failure_leaves_offline() {
        let h = harness(FakeTransport::with_account(), None);
        h.app.setup().await.unwrap();

        transport(&h).fail(&deploys_path("s1"), 500);
        assert!(h.app.update_deploys().await.is_err());
        assert_eq!(h.app.tray.current().status, TrayStatus::Offline);

        transport(&h).respond(&deploys_path("s1"), json!([]));
        h.app.update_deploys().await.unwrap();
        assert_eq!(h.app.tray.current(), TrayView::loading());
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_apply_in_request_order() {
        let Harness { app, mut notes, .. } = harness(FakeTransport::with_account(), None);
        let app = Arc::new(app);
        app.setup().await.unwrap();
        let t = app.api.transport();
        t.respond("/sites/s1/builds", json!({"id": "d3"}));

        // A slow scheduled refresh still carrying the old listing.
        t.delay(&deploys_path("s1"), Duration::from_secs(5));
        let tick = {
            let app = Arc::clone(&app);
            tokio::spawn(async move { app.update_deploys().await })
        };
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        t.delay(&deploys_path("s1"), Duration::ZERO);
        t.respond(
            &deploys_path("s1"),
            json!([deploy_json("d3", "building"), deploy_json("d2", "ready")]),
        );
        let trigger = {
            let app = Arc::clone(&app);
            tokio::spawn(async move { app.trigger_deploy().await })
        };

        tokio::time::advance(Duration::from_secs(5)).await;
        tick.await.unwrap().unwrap();
        trigger.await.unwrap().unwrap();

        assert_eq!(app.status().await.current.map(|d| d.id), Some("d3".to_string()));
        let titles: Vec<String> = std::iter::from_fn(|| notes.try_recv().ok())
            .map(|i| i.title)
            .collect();
        assert_eq!(titles, vec!["New deploy started"]);
    }
}
