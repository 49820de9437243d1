use crate::infra::{InMemoryLoanRepository, LoggingNotificationSink};
use clap::Args;
use p2p_lending::error::AppError;
use p2p_lending::loans::{
    ApprovalRequest, BorrowerId, DisbursementRequest, EmployeeId, Investment, InvestorId,
    LoanProposal, LoanRecord, LoanService, LoanServiceConfig, LoanServiceError,
};
use rust_decimal::Decimal;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Principal requested by the borrower.
    #[arg(long, default_value = "1000")]
    pub(crate) principal: Decimal,
    /// Comma separated investment tranches. Defaults to a 60/40 split of the principal.
    #[arg(long, value_delimiter = ',')]
    pub(crate) tranches: Vec<Decimal>,
    /// Print the full admin record as JSON after each step.
    #[arg(long)]
    pub(crate) verbose: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        principal,
        tranches,
        verbose,
    } = args;

    let tranches = if tranches.is_empty() {
        let first = (principal * Decimal::new(6, 1)).round_dp(2);
        vec![first, principal - first]
    } else {
        tranches
    };

    let notifications = Arc::new(LoggingNotificationSink::with_outbox());
    let service = LoanService::new(
        Arc::new(InMemoryLoanRepository::default()),
        notifications.clone(),
        LoanServiceConfig::default(),
    );

    println!("P2P loan lifecycle demo");
    let loan = service.create_loan(LoanProposal {
        borrower_id: BorrowerId(1),
        principal_amount: principal,
        rate: Decimal::new(12, 2),
        roi: Decimal::new(8, 2),
    })?;
    report_step("proposed", &loan, verbose)?;

    let loan = service.approve(
        loan.loan_id,
        ApprovalRequest {
            picture_proof_url: "https://example.com/proofs/visit.jpg".to_string(),
            field_validator_id: EmployeeId(7),
        },
    )?;
    report_step("approved", &loan, verbose)?;

    let mut current = loan;
    for (index, amount) in tranches.into_iter().enumerate() {
        let investment = Investment {
            investor_id: InvestorId(index as u64 + 1),
            invested_amount: amount,
        };
        match service.invest(current.loan_id, investment) {
            Ok(outcome) => {
                println!(
                    "  investor {} put in {} ({} remaining)",
                    index + 1,
                    amount,
                    outcome.remaining
                );
                current = outcome.loan;
            }
            Err(err @ LoanServiceError::LimitExceeded { .. })
            | Err(err @ LoanServiceError::InvalidStateTransition { .. }) => {
                println!("  investor {} rejected: {}", index + 1, err);
            }
            Err(err) => return Err(err.into()),
        }
    }
    report_step("funding round closed", &current, verbose)?;

    if current.is_fully_funded() {
        let loan = service.disburse(
            current.loan_id,
            DisbursementRequest {
                signed_agreement_letter_url: "https://example.com/signed/letter.pdf".to_string(),
                field_officer_id: EmployeeId(9),
            },
        )?;
        report_step("disbursed", &loan, verbose)?;
    } else {
        println!(
            "  loan is not fully funded; {} still open, skipping disbursement",
            current.remaining_principal()
        );
    }

    println!("\nMessages sent:");
    for notification in notifications.sent() {
        println!("  {:<26} {}", notification.channel(), notification.payload());
    }

    Ok(())
}

fn report_step(label: &str, loan: &LoanRecord, verbose: bool) -> Result<(), AppError> {
    println!(
        "- loan {} {} (state: {}, invested {} of {})",
        loan.loan_id,
        label,
        loan.state,
        loan.total_invested(),
        loan.principal_amount
    );
    if verbose {
        println!("{}", serde_json::to_string_pretty(loan)?);
    }
    Ok(())
}
