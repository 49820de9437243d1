use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Identifier wrapper for stored loans.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LoanId(pub u64);

impl fmt::Display for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Borrower requesting the principal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BorrowerId(pub u64);

/// Investor funding part of a loan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvestorId(pub u64);

/// Staff member acting as field validator or field officer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmployeeId(pub u64);

impl BorrowerId {
    pub const fn is_unset(self) -> bool {
        self.0 == 0
    }
}

impl InvestorId {
    pub const fn is_unset(self) -> bool {
        self.0 == 0
    }
}

impl EmployeeId {
    pub const fn is_unset(self) -> bool {
        self.0 == 0
    }
}

/// Lifecycle stage of a loan. Variants are declared in lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanState {
    Proposed,
    Approved,
    Invested,
    Disbursed,
}

impl LoanState {
    pub const fn label(self) -> &'static str {
        match self {
            LoanState::Proposed => "proposed",
            LoanState::Approved => "approved",
            LoanState::Invested => "invested",
            LoanState::Disbursed => "disbursed",
        }
    }

    /// The only state reachable from `self`, if any.
    pub const fn next(self) -> Option<LoanState> {
        match self {
            LoanState::Proposed => Some(LoanState::Approved),
            LoanState::Approved => Some(LoanState::Invested),
            LoanState::Invested => Some(LoanState::Disbursed),
            LoanState::Disbursed => None,
        }
    }

    pub fn can_transition_to(self, target: LoanState) -> bool {
        self.next() == Some(target)
    }
}

impl fmt::Display for LoanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Externally triggered operations that move a loan along its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanAction {
    Approve,
    Invest,
    Disburse,
}

impl LoanAction {
    pub const fn label(self) -> &'static str {
        match self {
            LoanAction::Approve => "approve",
            LoanAction::Invest => "invest",
            LoanAction::Disburse => "disburse",
        }
    }

    /// State the loan must be in for the action to be accepted.
    pub const fn required_state(self) -> LoanState {
        match self {
            LoanAction::Approve => LoanState::Proposed,
            LoanAction::Invest => LoanState::Approved,
            LoanAction::Disburse => LoanState::Invested,
        }
    }

    /// State the loan ends up in once the action completes its transition.
    /// Investments below the principal keep the loan in `Approved`.
    pub const fn resulting_state(self) -> LoanState {
        match self {
            LoanAction::Approve => LoanState::Approved,
            LoanAction::Invest => LoanState::Invested,
            LoanAction::Disburse => LoanState::Disbursed,
        }
    }
}

impl fmt::Display for LoanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Borrower request that opens a new loan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanProposal {
    #[serde(default)]
    pub borrower_id: BorrowerId,
    pub principal_amount: Decimal,
    #[serde(default)]
    pub rate: Decimal,
    #[serde(default)]
    pub roi: Decimal,
}

/// Field validator input captured when a proposed loan is approved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalRequest {
    pub picture_proof_url: String,
    pub field_validator_id: EmployeeId,
}

/// Field officer input captured when the funds are handed over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisbursementRequest {
    pub signed_agreement_letter_url: String,
    pub field_officer_id: EmployeeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalInfo {
    pub picture_proof_url: String,
    pub field_validator_id: EmployeeId,
    pub approval_date: DateTime<Utc>,
}

/// A single investor contribution. Also used as the request body for investing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Investment {
    pub investor_id: InvestorId,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub invested_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisbursementInfo {
    pub signed_agreement_letter_url: String,
    pub field_officer_id: EmployeeId,
    pub disbursement_date: DateTime<Utc>,
}

/// Full loan record as held by the repository and shown on the admin view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRecord {
    pub loan_id: LoanId,
    pub borrower_id: BorrowerId,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub principal_amount: Decimal,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub rate: Decimal,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub roi: Decimal,
    pub state: LoanState,
    pub approval_info: Option<ApprovalInfo>,
    pub investments: Vec<Investment>,
    pub disbursement_info: Option<DisbursementInfo>,
    pub agreement_letter_url: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Bumped by the repository on every successful update.
    pub version: u64,
}

impl LoanRecord {
    pub fn proposed(loan_id: LoanId, proposal: LoanProposal, created_at: DateTime<Utc>) -> Self {
        Self {
            loan_id,
            borrower_id: proposal.borrower_id,
            principal_amount: proposal.principal_amount,
            rate: proposal.rate,
            roi: proposal.roi,
            state: LoanState::Proposed,
            approval_info: None,
            investments: Vec::new(),
            disbursement_info: None,
            agreement_letter_url: None,
            created_at,
            version: 0,
        }
    }

    pub fn total_invested(&self) -> Decimal {
        self.investments
            .iter()
            .map(|investment| investment.invested_amount)
            .sum()
    }

    pub fn remaining_principal(&self) -> Decimal {
        self.principal_amount - self.total_invested()
    }

    pub fn is_fully_funded(&self) -> bool {
        self.total_invested() == self.principal_amount
    }

    pub fn information(&self) -> LoanInformation {
        LoanInformation {
            loan_id: self.loan_id,
            borrower_id: self.borrower_id,
            principal_amount: self.principal_amount,
            rate: self.rate,
            roi: self.roi,
            agreement_letter_url: self.agreement_letter_url.clone(),
        }
    }
}

/// Public projection of a loan; approval, investment and disbursement detail stay internal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanInformation {
    pub loan_id: LoanId,
    pub borrower_id: BorrowerId,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub principal_amount: Decimal,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub rate: Decimal,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub roi: Decimal,
    pub agreement_letter_url: Option<String>,
}
