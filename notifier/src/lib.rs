// notifier/src/lib.rs
//! C5 — Notification Dispatcher. Drains the `AlertEvent` inbox C4 feeds,
//! applies per-`(user, code, direction)` rate limiting against
//! `ledger::Store`'s alert delivery records, renders the one email
//! template spec.md §4.5 names, and hands it to a pluggable [`Mailer`].
//!
//! The dispatcher never shares the C3 mutation lock and never blocks C4:
//! the two communicate only through the channel spec.md §5 describes.

mod error;
mod smtp;
mod template;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ledger::Store;
use shared_models::{AlertEvent, User};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

pub use error::Error;
pub use smtp::SmtpMailer;

/// Two alerts for the same `(user, code, direction)` closer together than
/// this are coalesced into one email — spec.md §4.5 step 2, invariant 8.
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(10);

/// The edge owns the `users` table; the notifier only needs to resolve an
/// id to the handful of fields it cares about. Kept as a trait so `ledger`
/// never has to grow a dependency on user/auth storage.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find(&self, user_id: i64) -> Option<User>;
}

/// The only contract the SMTP transport has to satisfy (spec.md §4.5).
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), Error>;
}

pub struct Dispatcher {
    store: Arc<Store>,
    users: Arc<dyn UserDirectory>,
    mailer: Arc<dyn Mailer>,
}

impl Dispatcher {
    pub fn new(store: Arc<Store>, users: Arc<dyn UserDirectory>, mailer: Arc<dyn Mailer>) -> Self {
        Self { store, users, mailer }
    }

    /// Drains `inbox` until it closes or `shutdown` fires. One event at a
    /// time, in arrival order — per-event failures are logged and never
    /// retried automatically (spec.md §4.5 step 4, §7).
    pub async fn run(self, mut inbox: mpsc::Receiver<AlertEvent>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!("starting notification dispatcher");
        loop {
            tokio::select! {
                event = inbox.recv() => {
                    match event {
                        Some(event) => {
                            if let Err(err) = self.handle(event).await {
                                warn!(%err, "failed to deliver alert");
                            }
                        }
                        None => {
                            info!("alert inbox closed, notifier exiting");
                            return;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("notifier received shutdown signal, exiting");
                        return;
                    }
                }
            }
        }
    }

    #[instrument(skip(self, event), fields(user_id = event.user_id, code = %event.instrument_code, direction = %event.direction))]
    pub async fn handle(&self, event: AlertEvent) -> Result<(), Error> {
        let Some(user) = self.users.find(event.user_id).await else {
            warn!("alert event for unknown user, dropping");
            return Ok(());
        };

        if !user.email_alerts_enabled {
            info!("email alerts disabled for user, dropping");
            return Ok(());
        }
        if user.email.trim().is_empty() {
            warn!("user has no email on file, dropping");
            return Ok(());
        }

        let last_sent = self
            .store
            .last_alert_sent(event.user_id, &event.instrument_code, event.direction)?;
        let now = Utc::now();
        if let Some(last_sent) = last_sent {
            if (now - last_sent).to_std().map(|age| age < RATE_LIMIT_WINDOW).unwrap_or(false) {
                info!("within coalescing window, dropping");
                return Ok(());
            }
        }

        let subject = template::subject(&event);
        let body = template::html_body(&event);
        match self.mailer.send(&user.email, &subject, &body).await {
            Ok(()) => {
                self.store.record_alert_sent(event.user_id, &event.instrument_code, event.direction, now)?;
                info!("alert email sent");
                Ok(())
            }
            Err(err) => {
                // spec.md §7: dependency failure, not fatal — no retry here,
                // next qualifying tick re-emits if the condition still holds.
                warn!(%err, "smtp send failed");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Asia::Shanghai;
    use rusqlite::Connection;
    use shared_models::{AlertDirection, Billing};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct FixedDirectory(Option<User>);

    #[async_trait]
    impl UserDirectory for FixedDirectory {
        async fn find(&self, _user_id: i64) -> Option<User> {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct CountingMailer {
        sent: AtomicUsize,
        last_body: StdMutex<String>,
        fail: bool,
    }

    #[async_trait]
    impl Mailer for CountingMailer {
        async fn send(&self, _to: &str, _subject: &str, html: &str) -> Result<(), Error> {
            if self.fail {
                return Err(Error::Mail("boom".into()));
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
            *self.last_body.lock().unwrap() = html.to_string();
            Ok(())
        }
    }

    fn user(email_alerts_enabled: bool, email: &str) -> User {
        User {
            id: 1,
            username: "trader".into(),
            email: email.to_string(),
            created_at: Utc::now(),
            email_alerts_enabled,
            billing: Billing {
                is_paid: true,
                paid_until: None,
                plan: None,
            },
        }
    }

    fn event() -> AlertEvent {
        AlertEvent {
            user_id: 1,
            strategy_id: 1,
            trade_id: 1,
            instrument_code: "600000".into(),
            instrument_name: None,
            direction: AlertDirection::StopLoss,
            price: 9.5,
            target: 10.0,
            occurred_at: Utc::now(),
        }
    }

    fn store() -> Arc<Store> {
        Arc::new(Store::new(Connection::open_in_memory().unwrap(), Shanghai).unwrap())
    }

    #[tokio::test]
    async fn sends_and_records_delivery() {
        let store = store();
        let mailer = Arc::new(CountingMailer::default());
        let dispatcher = Dispatcher::new(
            store.clone(),
            Arc::new(FixedDirectory(Some(user(true, "trader@example.com")))),
            mailer.clone(),
        );

        dispatcher.handle(event()).await.unwrap();
        assert_eq!(mailer.sent.load(Ordering::SeqCst), 1);
        assert!(store.last_alert_sent(1, "600000", AlertDirection::StopLoss).unwrap().is_some());
    }

    #[tokio::test]
    async fn drops_when_alerts_disabled() {
        let store = store();
        let mailer = Arc::new(CountingMailer::default());
        let dispatcher = Dispatcher::new(
            store,
            Arc::new(FixedDirectory(Some(user(false, "trader@example.com")))),
            mailer.clone(),
        );
        dispatcher.handle(event()).await.unwrap();
        assert_eq!(mailer.sent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn drops_when_no_email_on_file() {
        let store = store();
        let mailer = Arc::new(CountingMailer::default());
        let dispatcher = Dispatcher::new(
            store,
            Arc::new(FixedDirectory(Some(user(true, "")))),
            mailer.clone(),
        );
        dispatcher.handle(event()).await.unwrap();
        assert_eq!(mailer.sent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invariant_8_second_alert_within_window_is_coalesced() {
        let store = store();
        let mailer = Arc::new(CountingMailer::default());
        let dispatcher = Dispatcher::new(
            store,
            Arc::new(FixedDirectory(Some(user(true, "trader@example.com")))),
            mailer.clone(),
        );
        dispatcher.handle(event()).await.unwrap();
        dispatcher.handle(event()).await.unwrap();
        assert_eq!(mailer.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_user_is_dropped_without_error() {
        let store = store();
        let mailer = Arc::new(CountingMailer::default());
        let dispatcher = Dispatcher::new(store, Arc::new(FixedDirectory(None)), mailer.clone());
        dispatcher.handle(event()).await.unwrap();
        assert_eq!(mailer.sent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn mailer_failure_does_not_record_delivery() {
        let store = store();
        let mailer = Arc::new(CountingMailer { fail: true, ..Default::default() });
        let dispatcher = Dispatcher::new(
            store.clone(),
            Arc::new(FixedDirectory(Some(user(true, "trader@example.com")))),
            mailer,
        );
        dispatcher.handle(event()).await.unwrap();
        assert!(store.last_alert_sent(1, "600000", AlertDirection::StopLoss).unwrap().is_none());
    }
}
