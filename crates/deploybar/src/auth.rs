use std::sync::Arc;

use deploybar_api::{authorize, AuthOptions, Transport};
use deploybar_scheduler::Scheduler;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::App;

/// Tell the user where to approve the authorization ticket.
pub fn announce_authorize_url(url: &str) {
    eprintln!("Open this URL in your browser to authorize deploybar:\n  {url}");
}

/// Run the ticket flow whenever a task reports a rejected token.
///
/// Polling is paused while the flow runs and resumed afterwards, whatever
/// the outcome; a still-invalid token simply triggers the next request.
pub fn spawn_reauth<T: Transport + 'static>(
    app: Arc<App<T>>,
    scheduler: Scheduler,
    opts: AuthOptions,
    mut requests: mpsc::Receiver<()>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                req = requests.recv() => if req.is_none() { break },
            }

            scheduler.stop();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                r = authorize(&app.api, &opts, announce_authorize_url) => r,
            };
            match outcome {
                Ok(_) => info!("re-authorized"),
                Err(e) => warn!(error = %e, code = e.code(), "re-authorization failed"),
            }

            // Drop requests raised by ticks that ran with the old token.
            while requests.try_recv().is_ok() {}
            if let Err(e) = scheduler.resume() {
                warn!(error = %e, "cannot resume polling");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTransport;
    use deploybar_api::DeployApi;
    use deploybar_channels::LogSink;
    use deploybar_core::config::AppSettings;
    use deploybar_scheduler::{ActionResult, RepeatTask, RunContext};
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn request_runs_ticket_flow_and_resumes() {
        let transport = FakeTransport::with_account();
        transport.set_token(Some("old".into()));
        transport.fail("/user", 401);
        transport.respond("/oauth/tickets?client_id=cid", json!({"id": "t1"}));
        transport.respond("/oauth/tickets/t1", json!({"id": "t1", "authorized": true}));
        transport.respond("/oauth/tickets/t1/exchange", json!({"access_token": "new"}));

        let (reauth_tx, reauth_rx) = mpsc::channel(1);
        let app = Arc::new(App::new(
            DeployApi::new(transport),
            Arc::new(LogSink),
            None,
            &AppSettings::default(),
            reauth_tx.clone(),
        ));
        let scheduler = Scheduler::new();
        scheduler
            .repeat(vec![RepeatTask::new(
                "noop",
                Duration::from_secs(60),
                |_: RunContext| async { ActionResult::Ok(()) },
            )])
            .unwrap();

        let opts = AuthOptions {
            client_id: Some("cid".into()),
            ui_url: "https://ui.example.com".into(),
            retry_delay: Duration::from_millis(10),
        };
        let cancel = CancellationToken::new();
        let handle = spawn_reauth(app.clone(), scheduler.clone(), opts, reauth_rx, cancel.clone());

        reauth_tx.send(()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(app.api.transport().token().as_deref(), Some("new"));
        assert!(scheduler.is_running());
        assert_eq!(app.api.transport().count("/oauth/tickets/t1/exchange"), 1);

        cancel.cancel();
        handle.await.unwrap();
    }
}
