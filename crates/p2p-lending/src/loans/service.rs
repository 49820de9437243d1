use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::domain::{
    ApprovalInfo, ApprovalRequest, DisbursementInfo, DisbursementRequest, Investment, LoanAction,
    LoanId, LoanInformation, LoanProposal, LoanRecord, LoanState,
};
use super::repository::{
    LoanNotification, LoanRepository, NotificationError, NotificationSink, RepositoryError,
};

pub const DEFAULT_AGREEMENT_LETTER_BASE_URL: &str = "https://example.com/agreement_letters";

/// Settings the engine needs beyond its collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanServiceConfig {
    pub agreement_letter_base_url: String,
}

impl Default for LoanServiceConfig {
    fn default() -> Self {
        Self {
            agreement_letter_base_url: DEFAULT_AGREEMENT_LETTER_BASE_URL.to_string(),
        }
    }
}

impl LoanServiceConfig {
    pub fn agreement_letter_url(&self, loan_id: LoanId) -> String {
        format!(
            "{}/{}.pdf",
            self.agreement_letter_base_url.trim_end_matches('/'),
            loan_id
        )
    }
}

/// Result of a successful investment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvestmentOutcome {
    pub loan: LoanRecord,
    pub fully_funded: bool,
    pub remaining: Decimal,
}

/// Loan engine: owns every lifecycle rule and talks to the store and the
/// notification sink through their traits.
pub struct LoanService<R, N> {
    repository: Arc<R>,
    notifications: Arc<N>,
    config: LoanServiceConfig,
    sequence: AtomicU64,
}

impl<R, N> LoanService<R, N>
where
    R: LoanRepository + 'static,
    N: NotificationSink + 'static,
{
    pub fn new(repository: Arc<R>, notifications: Arc<N>, config: LoanServiceConfig) -> Self {
        Self {
            repository,
            notifications,
            config,
            sequence: AtomicU64::new(1),
        }
    }

    fn next_loan_id(&self) -> LoanId {
        LoanId(self.sequence.fetch_add(1, Ordering::Relaxed))
    }

    /// Persist a new proposed loan and request its agreement letter.
    ///
    /// The record stays stored even if the letter request fails.
    pub fn create_loan(&self, proposal: LoanProposal) -> Result<LoanRecord, LoanServiceError> {
        validate_proposal(&proposal)?;

        let record = LoanRecord::proposed(self.next_loan_id(), proposal, Utc::now());
        let stored = self.repository.insert(record)?;
        info!(loan_id = %stored.loan_id, principal = %stored.principal_amount, "loan proposed");

        self.notifications
            .send(LoanNotification::GenerateAgreementLetter {
                loan_id: stored.loan_id,
            })
            .inspect_err(|error| {
                warn!(loan_id = %stored.loan_id, %error, "agreement letter request failed");
            })?;

        Ok(stored)
    }

    pub fn loans(&self) -> Result<Vec<LoanInformation>, LoanServiceError> {
        let records = self.repository.list()?;
        Ok(records.iter().map(LoanRecord::information).collect())
    }

    pub fn loan(&self, loan_id: LoanId) -> Result<LoanInformation, LoanServiceError> {
        Ok(self.load(loan_id)?.information())
    }

    /// Full records including approval, investment and disbursement detail.
    pub fn admin_loans(&self) -> Result<Vec<LoanRecord>, LoanServiceError> {
        Ok(self.repository.list()?)
    }

    pub fn approve(
        &self,
        loan_id: LoanId,
        request: ApprovalRequest,
    ) -> Result<LoanRecord, LoanServiceError> {
        if request.picture_proof_url.trim().is_empty() || request.field_validator_id.is_unset() {
            return Err(LoanServiceError::Validation(
                "approval requires picture_proof_url and field_validator_id".to_string(),
            ));
        }

        let mut loan = self.load(loan_id)?;
        ensure_state(&loan, LoanAction::Approve)?;

        loan.approval_info = Some(ApprovalInfo {
            picture_proof_url: request.picture_proof_url,
            field_validator_id: request.field_validator_id,
            approval_date: Utc::now(),
        });
        transition(&mut loan, LoanAction::Approve);

        let stored = self.repository.update(loan)?;
        info!(%loan_id, state = %stored.state, "loan approved");
        Ok(stored)
    }

    /// Add an investment to an approved loan.
    ///
    /// When the running total reaches the principal exactly the loan becomes
    /// `Invested`. Investors are e-mailed only after that write succeeds, so a
    /// rejected write never notifies anyone. A failed e-mail leaves the loan
    /// funded and is reported after every investor has been attempted.
    pub fn invest(
        &self,
        loan_id: LoanId,
        investment: Investment,
    ) -> Result<InvestmentOutcome, LoanServiceError> {
        if investment.investor_id.is_unset() || investment.invested_amount <= Decimal::ZERO {
            return Err(LoanServiceError::Validation(
                "investment requires investor_id and a positive invested_amount".to_string(),
            ));
        }

        let mut loan = self.load(loan_id)?;
        ensure_state(&loan, LoanAction::Invest)?;

        let running_total = match loan
            .total_invested()
            .checked_add(investment.invested_amount)
        {
            Some(total) if total <= loan.principal_amount => total,
            total => {
                return Err(LoanServiceError::LimitExceeded {
                    loan_id,
                    principal: loan.principal_amount,
                    attempted: total.unwrap_or(Decimal::MAX),
                });
            }
        };

        debug!(
            %loan_id,
            investor_id = investment.investor_id.0,
            amount = %investment.invested_amount,
            "recording investment"
        );
        loan.investments.push(investment);

        let fully_funded = running_total == loan.principal_amount;
        if fully_funded {
            transition(&mut loan, LoanAction::Invest);
            loan.agreement_letter_url = Some(self.config.agreement_letter_url(loan_id));
        }

        let stored = self.repository.update(loan)?;
        let remaining = stored.remaining_principal();
        info!(%loan_id, state = %stored.state, %remaining, "investment recorded");

        if fully_funded {
            self.notify_investors(&stored)?;
        }

        Ok(InvestmentOutcome {
            loan: stored,
            fully_funded,
            remaining,
        })
    }

    pub fn disburse(
        &self,
        loan_id: LoanId,
        request: DisbursementRequest,
    ) -> Result<LoanRecord, LoanServiceError> {
        if request.signed_agreement_letter_url.trim().is_empty()
            || request.field_officer_id.is_unset()
        {
            return Err(LoanServiceError::Validation(
                "disbursement requires signed_agreement_letter_url and field_officer_id"
                    .to_string(),
            ));
        }

        let mut loan = self.load(loan_id)?;
        ensure_state(&loan, LoanAction::Disburse)?;

        loan.disbursement_info = Some(DisbursementInfo {
            signed_agreement_letter_url: request.signed_agreement_letter_url,
            field_officer_id: request.field_officer_id,
            disbursement_date: Utc::now(),
        });
        transition(&mut loan, LoanAction::Disburse);

        let stored = self.repository.update(loan)?;
        info!(%loan_id, state = %stored.state, "loan disbursed");
        Ok(stored)
    }

    fn load(&self, loan_id: LoanId) -> Result<LoanRecord, LoanServiceError> {
        self.repository
            .fetch(&loan_id)?
            .ok_or(LoanServiceError::NotFound(loan_id))
    }

    fn notify_investors(&self, loan: &LoanRecord) -> Result<(), LoanServiceError> {
        let mut first_failure = None;
        for investment in &loan.investments {
            let notification = LoanNotification::EmailAgreementLetter {
                loan_id: loan.loan_id,
                investor_id: investment.investor_id,
                invested_amount: investment.invested_amount,
            };
            if let Err(error) = self.notifications.send(notification) {
                warn!(
                    loan_id = %loan.loan_id,
                    investor_id = investment.investor_id.0,
                    %error,
                    "agreement letter e-mail failed"
                );
                first_failure.get_or_insert(error);
            }
        }
        match first_failure {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }
}

fn validate_proposal(proposal: &LoanProposal) -> Result<(), LoanServiceError> {
    if proposal.borrower_id.is_unset() {
        return Err(LoanServiceError::Validation("borrower_id is required".to_string()));
    }
    if proposal.principal_amount <= Decimal::ZERO {
        return Err(LoanServiceError::Validation(
            "principal_amount must be positive".to_string(),
        ));
    }
    if proposal.rate < Decimal::ZERO || proposal.roi < Decimal::ZERO {
        return Err(LoanServiceError::Validation(
            "rate and roi must not be negative".to_string(),
        ));
    }
    Ok(())
}

fn ensure_state(loan: &LoanRecord, action: LoanAction) -> Result<(), LoanServiceError> {
    if loan.state == action.required_state() {
        Ok(())
    } else {
        Err(LoanServiceError::InvalidStateTransition {
            loan_id: loan.loan_id,
            state: loan.state,
            action,
        })
    }
}

fn transition(loan: &mut LoanRecord, action: LoanAction) {
    let target = action.resulting_state();
    debug_assert!(loan.state.can_transition_to(target));
    loan.state = target;
}

/// Error raised by the loan service.
#[derive(Debug, thiserror::Error)]
pub enum LoanServiceError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("loan {0} not found")]
    NotFound(LoanId),
    #[error("loan {loan_id} is {state}; cannot {action} (requires {})", .action.required_state())]
    InvalidStateTransition {
        loan_id: LoanId,
        state: LoanState,
        action: LoanAction,
    },
    #[error("investment would raise loan {loan_id} to {attempted}, above its principal of {principal}")]
    LimitExceeded {
        loan_id: LoanId,
        principal: Decimal,
        attempted: Decimal,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Notification(#[from] NotificationError),
}
