use metrics_exporter_prometheus::PrometheusHandle;
use p2p_lending::loans::{
    LoanId, LoanNotification, LoanRecord, LoanRepository, NotificationError, NotificationSink,
    RepositoryError,
};
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Process-local loan store. Writes are compare-and-swap on `LoanRecord::version`.
#[derive(Default, Clone)]
pub(crate) struct InMemoryLoanRepository {
    records: Arc<Mutex<BTreeMap<LoanId, LoanRecord>>>,
}

impl InMemoryLoanRepository {
    fn guard(&self) -> Result<MutexGuard<'_, BTreeMap<LoanId, LoanRecord>>, RepositoryError> {
        self.records
            .lock()
            .map_err(|_| RepositoryError::Unavailable("loan store mutex poisoned".to_string()))
    }
}

impl LoanRepository for InMemoryLoanRepository {
    fn insert(&self, record: LoanRecord) -> Result<LoanRecord, RepositoryError> {
        let mut guard = self.guard()?;
        if guard.contains_key(&record.loan_id) {
            return Err(RepositoryError::Conflict(record.loan_id));
        }
        guard.insert(record.loan_id, record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &LoanId) -> Result<Option<LoanRecord>, RepositoryError> {
        Ok(self.guard()?.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<LoanRecord>, RepositoryError> {
        Ok(self.guard()?.values().cloned().collect())
    }

    fn update(&self, mut record: LoanRecord) -> Result<LoanRecord, RepositoryError> {
        let mut guard = self.guard()?;
        let actual = guard
            .get(&record.loan_id)
            .map(|current| current.version)
            .ok_or(RepositoryError::NotFound(record.loan_id))?;
        if actual != record.version {
            return Err(RepositoryError::StaleVersion {
                loan_id: record.loan_id,
                expected: record.version,
                actual,
            });
        }
        record.version += 1;
        guard.insert(record.loan_id, record.clone());
        Ok(record)
    }
}

/// Stand-in for the message queue producer: logs each message. Only a sink built
/// with [`LoggingNotificationSink::with_outbox`] keeps copies for later reading.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotificationSink {
    outbox: Option<Arc<Mutex<Vec<LoanNotification>>>>,
}

impl NotificationSink for LoggingNotificationSink {
    fn send(&self, notification: LoanNotification) -> Result<(), NotificationError> {
        let payload = serde_json::to_string(&notification.payload())
            .map_err(|err| NotificationError::Transport(err.to_string()))?;
        info!(
            channel = notification.channel(),
            loan_id = %notification.loan_id(),
            %payload,
            "message sent"
        );
        if let Some(outbox) = &self.outbox {
            outbox
                .lock()
                .map_err(|_| NotificationError::Transport("outbox mutex poisoned".to_string()))?
                .push(notification);
        }
        Ok(())
    }
}

impl LoggingNotificationSink {
    pub(crate) fn with_outbox() -> Self {
        Self {
            outbox: Some(Arc::default()),
        }
    }

    pub(crate) fn sent(&self) -> Vec<LoanNotification> {
        self.outbox
            .as_ref()
            .and_then(|outbox| outbox.lock().ok().map(|sent| sent.clone()))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use p2p_lending::loans::{BorrowerId, LoanProposal, LoanState};
    use rust_decimal::Decimal;

    fn record(id: u64) -> LoanRecord {
        LoanRecord::proposed(
            LoanId(id),
            LoanProposal {
                borrower_id: BorrowerId(3),
                principal_amount: Decimal::new(1000, 0),
                rate: Decimal::ZERO,
                roi: Decimal::ZERO,
            },
            Utc::now(),
        )
    }

    #[test]
    fn repository_lists_in_id_order_and_rejects_duplicates() {
        let repository = InMemoryLoanRepository::default();
        repository.insert(record(2)).expect("insert");
        repository.insert(record(1)).expect("insert");

        assert!(matches!(
            repository.insert(record(1)),
            Err(RepositoryError::Conflict(LoanId(1)))
        ));
        let ids: Vec<_> = repository
            .list()
            .expect("list")
            .into_iter()
            .map(|loan| loan.loan_id)
            .collect();
        assert_eq!(ids, vec![LoanId(1), LoanId(2)]);
    }

    #[test]
    fn repository_update_bumps_version_and_rejects_stale_writes() {
        let repository = InMemoryLoanRepository::default();
        let original = repository.insert(record(1)).expect("insert");

        let mut approved = original.clone();
        approved.state = LoanState::Approved;
        let stored = repository.update(approved).expect("update");
        assert_eq!(stored.version, 1);

        assert!(matches!(
            repository.update(original),
            Err(RepositoryError::StaleVersion {
                expected: 0,
                actual: 1,
                ..
            })
        ));
        assert!(matches!(
            repository.update(record(9)),
            Err(RepositoryError::NotFound(LoanId(9)))
        ));
    }

    #[test]
    fn sink_with_outbox_records_sent_messages() {
        let sink = LoggingNotificationSink::with_outbox();
        sink.send(LoanNotification::GenerateAgreementLetter { loan_id: LoanId(4) })
            .expect("sent");

        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel(), "generate_agreement_letter");
    }

    #[test]
    fn default_sink_only_logs() {
        let sink = LoggingNotificationSink::default();
        for id in 1..=3 {
            sink.send(LoanNotification::GenerateAgreementLetter { loan_id: LoanId(id) })
                .expect("sent");
        }

        assert!(sink.outbox.is_none());
        assert!(sink.sent().is_empty());
    }
}
