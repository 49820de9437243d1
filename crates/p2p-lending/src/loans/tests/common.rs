use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;

use crate::loans::domain::{
    ApprovalRequest, BorrowerId, EmployeeId, Investment, InvestorId, LoanId, LoanProposal,
    LoanRecord,
};
use crate::loans::repository::{
    LoanNotification, LoanRepository, NotificationError, NotificationSink, RepositoryError,
};
use crate::loans::{loan_router, LoanService, LoanServiceConfig};

pub(super) fn proposal(principal: Decimal) -> LoanProposal {
    LoanProposal {
        borrower_id: BorrowerId(42),
        principal_amount: principal,
        rate: dec!(0.12),
        roi: dec!(0.08),
    }
}

pub(super) fn approval() -> ApprovalRequest {
    ApprovalRequest {
        picture_proof_url: "p.jpg".to_string(),
        field_validator_id: EmployeeId(7),
    }
}

pub(super) fn investment(investor: u64, amount: Decimal) -> Investment {
    Investment {
        investor_id: InvestorId(investor),
        invested_amount: amount,
    }
}

pub(super) fn service_config() -> LoanServiceConfig {
    LoanServiceConfig {
        agreement_letter_base_url: "https://letters.test".to_string(),
    }
}

pub(super) fn build_service() -> (
    LoanService<MemoryRepository, MemoryNotifications>,
    Arc<MemoryRepository>,
    Arc<MemoryNotifications>,
) {
    let repository = Arc::new(MemoryRepository::default());
    let notifications = Arc::new(MemoryNotifications::default());
    let service = LoanService::new(repository.clone(), notifications.clone(), service_config());
    (service, repository, notifications)
}

/// Create and approve a loan, returning its id.
pub(super) fn approved_loan<R, N>(service: &LoanService<R, N>, principal: Decimal) -> LoanId
where
    R: LoanRepository + 'static,
    N: NotificationSink + 'static,
{
    let record = service
        .create_loan(proposal(principal))
        .expect("loan is created");
    service
        .approve(record.loan_id, approval())
        .expect("loan is approved");
    record.loan_id
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) records: Arc<Mutex<BTreeMap<LoanId, LoanRecord>>>,
}

impl MemoryRepository {
    pub(super) fn stored(&self, id: LoanId) -> LoanRecord {
        self.fetch(&id)
            .expect("fetch succeeds")
            .expect("record present")
    }
}

impl LoanRepository for MemoryRepository {
    fn insert(&self, record: LoanRecord) -> Result<LoanRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&record.loan_id) {
            return Err(RepositoryError::Conflict(record.loan_id));
        }
        guard.insert(record.loan_id, record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &LoanId) -> Result<Option<LoanRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<LoanRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.values().cloned().collect())
    }

    fn update(&self, mut record: LoanRecord) -> Result<LoanRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let current = guard
            .get(&record.loan_id)
            .ok_or(RepositoryError::NotFound(record.loan_id))?;
        if current.version != record.version {
            return Err(RepositoryError::StaleVersion {
                loan_id: record.loan_id,
                expected: record.version,
                actual: current.version,
            });
        }
        record.version += 1;
        guard.insert(record.loan_id, record.clone());
        Ok(record)
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryNotifications {
    events: Arc<Mutex<Vec<LoanNotification>>>,
}

impl MemoryNotifications {
    pub(super) fn events(&self) -> Vec<LoanNotification> {
        self.events.lock().expect("notification mutex poisoned").clone()
    }

    pub(super) fn on_channel(&self, channel: &str) -> Vec<LoanNotification> {
        self.events()
            .into_iter()
            .filter(|event| event.channel() == channel)
            .collect()
    }
}

impl NotificationSink for MemoryNotifications {
    fn send(&self, notification: LoanNotification) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .push(notification);
        Ok(())
    }
}

/// Accepts a fixed number of messages, then reports the transport as down.
pub(super) struct FlakyNotifications {
    remaining: AtomicUsize,
    pub(super) delivered: MemoryNotifications,
}

impl FlakyNotifications {
    pub(super) fn failing_after(successes: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(successes),
            delivered: MemoryNotifications::default(),
        }
    }
}

impl NotificationSink for FlakyNotifications {
    fn send(&self, notification: LoanNotification) -> Result<(), NotificationError> {
        let allowed = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if allowed {
            self.delivered.send(notification)
        } else {
            Err(NotificationError::Transport("nsqd unreachable".to_string()))
        }
    }
}

/// Lets another writer bump the stored version right before the next update,
/// so that update loses the compare-and-swap.
#[derive(Default)]
pub(super) struct ContendedRepository {
    pub(super) inner: MemoryRepository,
    armed: AtomicBool,
}

impl ContendedRepository {
    pub(super) fn interfere_with_next_update(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

impl LoanRepository for ContendedRepository {
    fn insert(&self, record: LoanRecord) -> Result<LoanRecord, RepositoryError> {
        self.inner.insert(record)
    }

    fn fetch(&self, id: &LoanId) -> Result<Option<LoanRecord>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn list(&self) -> Result<Vec<LoanRecord>, RepositoryError> {
        self.inner.list()
    }

    fn update(&self, record: LoanRecord) -> Result<LoanRecord, RepositoryError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            let current = self.inner.stored(record.loan_id);
            self.inner.update(current)?;
        }
        self.inner.update(record)
    }
}

pub(super) struct UnavailableRepository;

impl LoanRepository for UnavailableRepository {
    fn insert(&self, _record: LoanRecord) -> Result<LoanRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("cache offline".to_string()))
    }

    fn fetch(&self, _id: &LoanId) -> Result<Option<LoanRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("cache offline".to_string()))
    }

    fn list(&self) -> Result<Vec<LoanRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("cache offline".to_string()))
    }

    fn update(&self, _record: LoanRecord) -> Result<LoanRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("cache offline".to_string()))
    }
}

pub(super) fn router_with_service(
    service: LoanService<MemoryRepository, MemoryNotifications>,
) -> axum::Router {
    loan_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) async fn read_text_body(response: Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    String::from_utf8(body.to_vec()).expect("utf-8 body")
}
