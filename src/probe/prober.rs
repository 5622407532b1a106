//! Transactional read-write-read probe.

use chrono::{SecondsFormat, Utc};

use crate::error::{ProbeError, Result};

use super::backend::{ProbeRecord, ProbeStore, ProbeTransaction, StoreError, TxState};

/// Result of a committed probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    /// Most recent row before the insert, if the table had any
    pub before: Option<ProbeRecord>,
    /// The inserted row as read back inside the transaction
    pub record: ProbeRecord,
}

type LatestHook<'a> = Box<dyn Fn(Option<&ProbeRecord>) + Send + Sync + 'a>;

/// Runs one read, insert, confirming read and commit against a store.
///
/// On any failure after the transaction has begun it is rolled back, so a
/// failed probe leaves the table unchanged. The transaction handle owns the
/// pooled connection and returns it when dropped.
pub struct TransactionalProber<'a, S: ProbeStore> {
    store: &'a S,
    prefix: String,
    on_latest: Option<LatestHook<'a>>,
}

impl<'a, S: ProbeStore> TransactionalProber<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            prefix: "probe".to_string(),
            on_latest: None,
        }
    }

    /// Prefix of the inserted value; a timestamp is appended to keep it unique.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Called with the result of the initial read as soon as it returns,
    /// whether or not the later steps succeed.
    pub fn on_latest<F>(mut self, hook: F) -> Self
    where
        F: Fn(Option<&ProbeRecord>) + Send + Sync + 'a,
    {
        self.on_latest = Some(Box::new(hook));
        self
    }

    pub async fn run(&self) -> Result<ProbeOutcome> {
        let mut tx = self
            .store
            .begin()
            .await
            .map_err(|e| transaction_error(TxState::Idle, e))?;

        let mut state = TxState::Began;
        tracing::debug!(state = %state, "Probe transaction started");

        match self.execute(&mut tx, &mut state).await {
            Ok(outcome) => {
                tx.commit()
                    .await
                    .map_err(|e| transaction_error(state, e))?;
                tracing::info!(
                    id = outcome.record.id,
                    state = %TxState::Committed,
                    "Probe transaction committed"
                );
                Ok(outcome)
            }
            Err(err) => {
                match tx.rollback().await {
                    Ok(()) => {
                        tracing::warn!(state = %TxState::RolledBack, "Probe transaction rolled back")
                    }
                    Err(e) => tracing::warn!(
                        code = %e.code(),
                        error = %e,
                        "Rollback failed, connection released"
                    ),
                }
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        tx: &mut S::Transaction,
        state: &mut TxState,
    ) -> Result<ProbeOutcome> {
        let before = tx
            .latest()
            .await
            .map_err(|e| transaction_error(*state, e))?;
        *state = TxState::Read;
        match &before {
            Some(record) => tracing::info!(
                id = record.id,
                value = %record.value,
                created_at = %record.created_at.to_rfc3339(),
                "Latest record before probe"
            ),
            None => tracing::info!("Probe table is empty"),
        }
        if let Some(hook) = &self.on_latest {
            hook(before.as_ref());
        }

        let value = format!(
            "{}@{}",
            self.prefix,
            Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
        );
        let id = tx
            .insert(&value)
            .await
            .map_err(|e| transaction_error(*state, e))?;
        *state = TxState::Inserted;
        tracing::info!(id, value = %value, "Probe record inserted");

        let rows = tx
            .fetch(id)
            .await
            .map_err(|e| transaction_error(*state, e))?;
        let record = confirm(rows, id, &value).map_err(|message| {
            tracing::error!(stage = %state, message = %message, "Probe confirmation failed");
            ProbeError::Transaction {
                stage: *state,
                message,
            }
        })?;
        *state = TxState::Confirmed;
        tracing::info!(id, "Probe record confirmed");

        Ok(ProbeOutcome { before, record })
    }
}

/// The confirming read must return exactly the row that was inserted.
fn confirm(
    mut rows: Vec<ProbeRecord>,
    id: i64,
    value: &str,
) -> std::result::Result<ProbeRecord, String> {
    if rows.len() != 1 {
        return Err(format!(
            "expected 1 row for id {id} on confirming read, found {}",
            rows.len()
        ));
    }
    let record = rows.remove(0);
    if record.value != value {
        return Err(format!(
            "row {id} holds {:?}, expected {value:?}",
            record.value
        ));
    }
    Ok(record)
}

fn transaction_error(stage: TxState, err: StoreError) -> ProbeError {
    tracing::error!(stage = %stage, code = %err.code(), error = %err, "Probe step failed");
    ProbeError::Transaction {
        stage,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    use crate::probe::{FailPoint, MemoryProbeStore};

    /// Counts events logged at error level.
    struct ErrorCounter(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for ErrorCounter {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::ERROR {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn test_probe_commits_one_row() {
        let store = MemoryProbeStore::new();
        let seeded = store.seed("existing");

        let outcome = TransactionalProber::new(&store).run().await.unwrap();

        assert_eq!(outcome.before, Some(seeded));
        assert!(outcome.record.value.starts_with("probe@"));
        assert_eq!(store.row_count(), 2);
        assert_eq!(store.rows()[1], outcome.record);
    }

    #[tokio::test]
    async fn test_probe_on_empty_table() {
        let store = MemoryProbeStore::new();

        let outcome = TransactionalProber::new(&store)
            .with_prefix("smoke")
            .run()
            .await
            .unwrap();

        assert!(outcome.before.is_none());
        assert!(outcome.record.value.starts_with("smoke@"));
    }

    #[tokio::test]
    async fn test_failure_reports_last_state() {
        let cases = [
            (FailPoint::Begin, TxState::Idle),
            (FailPoint::Latest, TxState::Began),
            (FailPoint::Insert, TxState::Read),
            (FailPoint::Fetch, TxState::Inserted),
            (FailPoint::FetchEmpty, TxState::Inserted),
            (FailPoint::Commit, TxState::Confirmed),
        ];

        for (point, expected) in cases {
            let store = MemoryProbeStore::new();
            store.fail_at(Some(point));

            match TransactionalProber::new(&store).run().await {
                Err(ProbeError::Transaction { stage, .. }) => {
                    assert_eq!(stage, expected, "fail point {point:?}")
                }
                other => panic!("expected transaction error at {point:?}, got {other:?}"),
            }
            assert_eq!(store.row_count(), 0, "fail point {point:?}");
        }
    }

    #[test]
    fn test_confirm_rejects_mismatch() {
        let row = ProbeRecord {
            id: 7,
            value: "other".to_string(),
            created_at: Utc::now(),
        };
        assert!(confirm(vec![], 7, "probe").is_err());
        assert!(confirm(vec![row.clone(), row.clone()], 7, "other").is_err());
        assert!(confirm(vec![row.clone()], 7, "probe").is_err());
        assert_eq!(confirm(vec![row.clone()], 7, "other"), Ok(row));
    }

    #[tokio::test]
    async fn test_each_failure_logged_once_at_error() {
        let errors = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(ErrorCounter(errors.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        for (point, failing_rollback) in [
            (FailPoint::Begin, false),
            (FailPoint::Insert, false),
            (FailPoint::Insert, true),
            (FailPoint::FetchEmpty, false),
            (FailPoint::Commit, false),
        ] {
            errors.store(0, Ordering::SeqCst);
            let store = MemoryProbeStore::new();
            store.fail_at(Some(point));
            store.fail_rollback(failing_rollback);

            assert!(TransactionalProber::new(&store).run().await.is_err());
            assert_eq!(
                errors.load(Ordering::SeqCst),
                1,
                "fail point {point:?}, failing rollback {failing_rollback}"
            );
        }
    }

    #[tokio::test]
    async fn test_initial_read_reported_when_insert_fails() {
        let store = MemoryProbeStore::new();
        let seeded = store.seed("existing");
        store.fail_at(Some(FailPoint::Insert));
        let seen = Mutex::new(Vec::new());

        let result = TransactionalProber::new(&store)
            .on_latest(|record| seen.lock().unwrap().push(record.cloned()))
            .run()
            .await;

        assert!(matches!(
            result,
            Err(ProbeError::Transaction { stage: TxState::Read, .. })
        ));
        assert_eq!(seen.into_inner().unwrap(), vec![Some(seeded)]);
        assert_eq!(store.row_count(), 1);
    }

    #[tokio::test]
    async fn test_initial_read_not_reported_when_read_fails() {
        let store = MemoryProbeStore::new();
        store.fail_at(Some(FailPoint::Latest));
        let calls = AtomicUsize::new(0);

        let result = TransactionalProber::new(&store)
            .on_latest(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .run()
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
