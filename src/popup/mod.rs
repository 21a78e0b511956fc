//! Popup transport coordinator.
//!
//! Drives a user through an out-of-process authorization flow hosted in a
//! secondary browser window and reduces it to a single in-process outcome:
//! `Idle → Opening → AwaitingUser → Reconciling → {Succeeded | Failed |
//! Cancelled}`. There is no reliable cross-window message channel (the popup
//! is on the provider's origin for most of its lifetime), so the coordinator
//! polls the window and reconciles ambiguous signals against the record
//! store instead of trusting any one of them.

pub mod driver;

pub use driver::{CallbackParams, PopupDriver, PopupHandle, PopupProbe};

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ConnectError;
use crate::oauth::{ConnectionService, ConnectionStatus};
use crate::store::ConnectionProfile;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Terminal result of one authorization attempt. Exactly one outcome is
/// produced per attempt.
#[derive(Debug)]
pub enum FlowOutcome {
    Succeeded(ConnectionProfile),
    Failed(ConnectError),
    /// The popup closed without completing. Not an error: the caller returns
    /// to the disconnected state with no alert.
    Cancelled,
}

pub struct PopupCoordinator {
    service: Arc<ConnectionService>,
    driver: Arc<dyn PopupDriver>,
    poll_interval: Duration,
    timeout: Duration,
}

impl PopupCoordinator {
    pub fn new(service: Arc<ConnectionService>, driver: Arc<dyn PopupDriver>) -> Self {
        Self {
            service,
            driver,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run one authorization attempt end to end. The caller awaits a single
    /// future; the poll timer and timeout are dropped with it on the first
    /// terminal transition.
    pub async fn run(&self, user_id: &str) -> FlowOutcome {
        let attempt = Uuid::new_v4();

        // Opening.
        let request = match self.service.initiate(user_id).await {
            Ok(request) => request,
            Err(e) => {
                warn!(target: "connectflow", %attempt, user = %user_id, error = %e,
                    "initiation failed");
                return FlowOutcome::Failed(e);
            }
        };
        let mut popup = match self.driver.open(&request.auth_url) {
            Ok(popup) => popup,
            Err(e) => return FlowOutcome::Failed(e),
        };
        if popup.is_closed() {
            // A closed handle straight out of `open` means the browser
            // refused the window.
            return FlowOutcome::Failed(ConnectError::PopupBlocked);
        }
        debug!(target: "connectflow", %attempt, user = %user_id, "awaiting user authorization");

        // AwaitingUser: poll until the popup closes, reaches the callback
        // path, or the timeout fires.
        let extracted = {
            let mut ticker = tokio::time::interval(self.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let deadline = tokio::time::sleep(self.timeout);
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    _ = &mut deadline => {
                        popup.close();
                        warn!(target: "connectflow", %attempt, user = %user_id,
                            "authorization attempt timed out");
                        return FlowOutcome::Failed(ConnectError::Timeout {
                            timeout_secs: self.timeout.as_secs(),
                        });
                    }
                    _ = ticker.tick() => {
                        if popup.is_closed() {
                            break None;
                        }
                        match popup.probe() {
                            PopupProbe::Callback(params) => {
                                popup.close();
                                break Some(params);
                            }
                            // Cross-origin reads fail silently while the
                            // popup is on the provider's site; keep polling.
                            PopupProbe::CrossOrigin | PopupProbe::SameOriginOther => {}
                        }
                    }
                }
            }
        };

        // Reconciling.
        debug!(target: "connectflow", %attempt, user = %user_id,
            extracted = extracted.is_some(), "reconciling authorization outcome");
        match extracted {
            Some(params) => {
                if let Some(error) = params.error {
                    debug!(target: "connectflow", %attempt, user = %user_id, %error,
                        "provider reported an authorization error");
                    return FlowOutcome::Failed(ConnectError::ProviderDenied(error));
                }
                match (params.code, params.state) {
                    (Some(code), Some(state)) => {
                        match self.service.complete(user_id, &code, &state).await {
                            Ok(profile) => FlowOutcome::Succeeded(profile),
                            Err(e) => FlowOutcome::Failed(e),
                        }
                    }
                    // Callback reached with neither code nor error; treat
                    // like a bare close.
                    _ => self.reconcile_bare_close(user_id).await,
                }
            }
            None => self.reconcile_bare_close(user_id).await,
        }
    }

    /// A closed popup is ambiguous: the user may have cancelled, or the flow
    /// may have completed out of band (e.g. via the callback route) one tick
    /// before the close was observed. Re-query the store rather than trust
    /// the close signal alone.
    async fn reconcile_bare_close(&self, user_id: &str) -> FlowOutcome {
        match self.service.status(user_id).await {
            Ok(ConnectionStatus::Connected(profile)) => FlowOutcome::Succeeded(profile),
            Ok(_) => FlowOutcome::Cancelled,
            Err(e) => FlowOutcome::Failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::error::Result;
    use crate::store::{MemoryRecordStore, RecordStore};
    use httpmock::prelude::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use url::Url;

    /// Popup whose observable state is controlled by the test.
    #[derive(Clone, Default)]
    struct FakePopup {
        closed: Arc<AtomicBool>,
        location: Arc<Mutex<Option<PopupProbe>>>,
    }

    impl FakePopup {
        fn mark_closed(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn navigate_to_callback(&self, url: &str) {
            let params = CallbackParams::from_url(&Url::parse(url).unwrap());
            *self.location.lock().unwrap() = Some(PopupProbe::Callback(params));
        }
    }

    impl PopupHandle for FakePopup {
        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        fn probe(&self) -> PopupProbe {
            self.location
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(PopupProbe::CrossOrigin)
        }

        fn close(&mut self) {
            self.mark_closed();
        }
    }

    struct FakeDriver {
        popup: FakePopup,
        blocked: bool,
    }

    impl PopupDriver for FakeDriver {
        fn open(&self, _url: &str) -> Result<Box<dyn PopupHandle>> {
            if self.blocked {
                return Err(ConnectError::PopupBlocked);
            }
            Ok(Box::new(self.popup.clone()))
        }
    }

    struct Rig {
        coordinator: PopupCoordinator,
        service: Arc<ConnectionService>,
        store: Arc<MemoryRecordStore>,
        popup: FakePopup,
        server: MockServer,
    }

    fn rig(blocked: bool) -> Rig {
        let server = MockServer::start();
        let store = Arc::new(MemoryRecordStore::new());
        store.insert_user("u1");
        let config = ProviderConfig::new("id", "secret", "https://app.example.com/cb")
            .with_token_url(format!("{}/token", server.base_url()))
            .with_profile_url(format!("{}/userinfo", server.base_url()));
        let service = Arc::new(ConnectionService::new(store.clone(), config));
        let popup = FakePopup::default();
        let coordinator = PopupCoordinator::new(
            service.clone(),
            Arc::new(FakeDriver { popup: popup.clone(), blocked }),
        )
        .with_poll_interval(Duration::from_millis(10));
        Rig { coordinator, service, store, popup, server }
    }

    fn mock_success(server: &MockServer) {
        server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({"access_token": "T", "expires_in": 3600}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/userinfo");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({"sub": "p1", "name": "Ada"}));
        });
    }

    async fn in_flight_state(store: &MemoryRecordStore) -> String {
        loop {
            if let Some(record) = store.get("u1").await.unwrap() {
                if let Some(state) = record.oauth_state {
                    return state;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn blocked_popup_fails_without_polling() {
        let r = rig(true);
        match r.coordinator.run("u1").await {
            FlowOutcome::Failed(ConnectError::PopupBlocked) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn same_origin_callback_completes_the_flow() {
        let r = rig(false);
        mock_success(&r.server);

        let run = tokio::spawn({
            let coordinator = r.coordinator;
            async move { coordinator.run("u1").await }
        });

        let state = in_flight_state(&r.store).await;
        r.popup.navigate_to_callback(&format!(
            "https://app.example.com/connections/provider/callback?code=codeXYZ&state={state}"
        ));

        match run.await.unwrap() {
            FlowOutcome::Succeeded(profile) => {
                assert_eq!(profile.provider_member_id, "p1");
                assert_eq!(profile.name, "Ada");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        // The coordinator closed the popup after extraction.
        assert!(r.popup.is_closed());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn provider_error_parameter_is_denied() {
        let r = rig(false);
        r.popup.navigate_to_callback(
            "https://app.example.com/connections/provider/callback?error=access_denied",
        );

        match r.coordinator.run("u1").await {
            FlowOutcome::Failed(ConnectError::ProviderDenied(reason)) => {
                assert_eq!(reason, "access_denied");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn bare_close_while_disconnected_is_cancelled() {
        let r = rig(false);

        let run = tokio::spawn({
            let coordinator = r.coordinator;
            async move { coordinator.run("u1").await }
        });

        in_flight_state(&r.store).await;
        r.popup.mark_closed();

        match run.await.unwrap() {
            FlowOutcome::Cancelled => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn close_after_out_of_band_completion_is_succeeded_not_cancelled() {
        let r = rig(false);
        mock_success(&r.server);

        let run = tokio::spawn({
            let coordinator = r.coordinator;
            async move { coordinator.run("u1").await }
        });

        // Complete the exchange out of band (as the callback route would),
        // then close the popup; the poll missed the same-origin redirect.
        let state = in_flight_state(&r.store).await;
        r.service.complete("u1", "codeXYZ", &state).await.unwrap();
        r.popup.mark_closed();

        match run.await.unwrap() {
            FlowOutcome::Succeeded(profile) => assert_eq!(profile.provider_member_id, "p1"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_closes_popup_and_fails() {
        // No provider endpoints involved; the popup never leaves the
        // provider origin and the deadline fires under the paused clock.
        let store = Arc::new(MemoryRecordStore::new());
        store.insert_user("u1");
        let config = ProviderConfig::new("id", "secret", "https://app.example.com/cb");
        let service = Arc::new(ConnectionService::new(store, config));
        let popup = FakePopup::default();
        let coordinator = PopupCoordinator::new(
            service,
            Arc::new(FakeDriver { popup: popup.clone(), blocked: false }),
        )
        .with_timeout(Duration::from_secs(300));

        match coordinator.run("u1").await {
            FlowOutcome::Failed(ConnectError::Timeout { timeout_secs }) => {
                assert_eq!(timeout_secs, 300);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(popup.is_closed());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn initiation_failure_skips_the_popup() {
        let r = rig(false);
        match r.coordinator.run("ghost").await {
            FlowOutcome::Failed(ConnectError::UserNotFound(_)) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!r.popup.is_closed());
    }
}
