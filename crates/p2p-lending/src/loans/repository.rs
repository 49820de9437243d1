use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::domain::{InvestorId, LoanId, LoanRecord};

/// Storage abstraction so the service module can be exercised in isolation.
///
/// `update` is a compare-and-swap: it must reject the write when the stored
/// record's `version` differs from the one carried by `record`, and bump the
/// version when it accepts it.
pub trait LoanRepository: Send + Sync {
    fn insert(&self, record: LoanRecord) -> Result<LoanRecord, RepositoryError>;
    fn fetch(&self, id: &LoanId) -> Result<Option<LoanRecord>, RepositoryError>;
    /// All stored loans in ascending id order.
    fn list(&self) -> Result<Vec<LoanRecord>, RepositoryError>;
    fn update(&self, record: LoanRecord) -> Result<LoanRecord, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("loan {0} already exists")]
    Conflict(LoanId),
    #[error("loan {0} not found in store")]
    NotFound(LoanId),
    #[error("loan {loan_id} was modified concurrently (expected version {expected}, found {actual})")]
    StaleVersion {
        loan_id: LoanId,
        expected: u64,
        actual: u64,
    },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

pub const GENERATE_AGREEMENT_LETTER_CHANNEL: &str = "generate_agreement_letter";
pub const EMAIL_AGREEMENT_LETTER_CHANNEL: &str = "email_agreement_letter";

/// Outbound hook towards document generation and investor e-mail workers.
pub trait NotificationSink: Send + Sync {
    fn send(&self, notification: LoanNotification) -> Result<(), NotificationError>;
}

/// Events emitted by the loan engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanNotification {
    GenerateAgreementLetter {
        loan_id: LoanId,
    },
    EmailAgreementLetter {
        loan_id: LoanId,
        investor_id: InvestorId,
        invested_amount: Decimal,
    },
}

impl LoanNotification {
    pub const fn channel(&self) -> &'static str {
        match self {
            LoanNotification::GenerateAgreementLetter { .. } => GENERATE_AGREEMENT_LETTER_CHANNEL,
            LoanNotification::EmailAgreementLetter { .. } => EMAIL_AGREEMENT_LETTER_CHANNEL,
        }
    }

    pub const fn loan_id(&self) -> LoanId {
        match self {
            LoanNotification::GenerateAgreementLetter { loan_id }
            | LoanNotification::EmailAgreementLetter { loan_id, .. } => *loan_id,
        }
    }

    /// Message body published on [`Self::channel`].
    pub fn payload(&self) -> Value {
        match self {
            LoanNotification::GenerateAgreementLetter { loan_id } => json!({
                "loan_id": loan_id,
            }),
            LoanNotification::EmailAgreementLetter {
                loan_id,
                investor_id,
                invested_amount,
            } => json!({
                "loan_id": loan_id,
                "investor_id": investor_id,
                "invested_amount": invested_amount.to_f64(),
            }),
        }
    }
}

/// Notification dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
