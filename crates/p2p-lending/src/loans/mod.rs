//! Peer-to-peer loan lifecycle: proposal, approval, investment and disbursement.
//!
//! [`LoanService`] holds the lifecycle rules and reaches storage and outbound
//! messaging only through [`LoanRepository`] and [`NotificationSink`], so the
//! HTTP layer and the adapters can be swapped without touching the rules.

pub mod domain;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    ApprovalInfo, ApprovalRequest, BorrowerId, DisbursementInfo, DisbursementRequest, EmployeeId,
    Investment, InvestorId, LoanAction, LoanId, LoanInformation, LoanProposal, LoanRecord,
    LoanState,
};
pub use repository::{
    LoanNotification, LoanRepository, NotificationError, NotificationSink, RepositoryError,
    EMAIL_AGREEMENT_LETTER_CHANNEL, GENERATE_AGREEMENT_LETTER_CHANNEL,
};
pub use router::loan_router;
pub use service::{
    InvestmentOutcome, LoanService, LoanServiceConfig, LoanServiceError,
    DEFAULT_AGREEMENT_LETTER_BASE_URL,
};
