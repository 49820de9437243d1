use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::error;

use super::domain::{ApprovalRequest, DisbursementRequest, Investment, LoanId, LoanProposal};
use super::repository::{LoanRepository, NotificationSink, RepositoryError};
use super::service::{LoanService, LoanServiceError};

type SharedService<R, N> = Arc<LoanService<R, N>>;

/// Router builder exposing the loan lifecycle endpoints.
pub fn loan_router<R, N>(service: SharedService<R, N>) -> Router
where
    R: LoanRepository + 'static,
    N: NotificationSink + 'static,
{
    Router::new()
        .route(
            "/loans",
            post(create_handler::<R, N>).get(list_handler::<R, N>),
        )
        .route("/loans/:loan_id", get(loan_handler::<R, N>))
        .route("/loans/:loan_id/approve", post(approve_handler::<R, N>))
        .route("/loans/:loan_id/invest", post(invest_handler::<R, N>))
        .route("/loans/:loan_id/disburse", post(disburse_handler::<R, N>))
        .route("/admin/view/loans", get(admin_handler::<R, N>))
        .with_state(service)
}

pub(crate) fn status_for(error: &LoanServiceError) -> StatusCode {
    match error {
        LoanServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        LoanServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        LoanServiceError::InvalidStateTransition { .. }
        | LoanServiceError::Repository(RepositoryError::StaleVersion { .. }) => {
            StatusCode::CONFLICT
        }
        LoanServiceError::LimitExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        LoanServiceError::Repository(_) | LoanServiceError::Notification(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(err: LoanServiceError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        error!(error = %err, "loan request failed");
    }
    (status, err.to_string()).into_response()
}

fn parse_loan_id(raw: &str) -> Result<LoanId, Response> {
    raw.trim()
        .parse::<u64>()
        .map(LoanId)
        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid loan ID").into_response())
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| {
            let message = format!("Invalid request body: {}", rejection.body_text());
            (StatusCode::BAD_REQUEST, message).into_response()
        })
}

pub(crate) async fn create_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    payload: Result<Json<LoanProposal>, JsonRejection>,
) -> Response
where
    R: LoanRepository + 'static,
    N: NotificationSink + 'static,
{
    let proposal = match body(payload) {
        Ok(proposal) => proposal,
        Err(response) => return response,
    };

    match service.create_loan(proposal) {
        Ok(record) => {
            let payload = json!({
                "loan_id": record.loan_id,
                "message": "Loan created successfully",
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn list_handler<R, N>(State(service): State<SharedService<R, N>>) -> Response
where
    R: LoanRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.loans() {
        Ok(loans) => (StatusCode::OK, Json(loans)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn loan_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(loan_id): Path<String>,
) -> Response
where
    R: LoanRepository + 'static,
    N: NotificationSink + 'static,
{
    let loan_id = match parse_loan_id(&loan_id) {
        Ok(loan_id) => loan_id,
        Err(response) => return response,
    };

    match service.loan(loan_id) {
        Ok(loan) => (StatusCode::OK, Json(loan)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn approve_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(loan_id): Path<String>,
    payload: Result<Json<ApprovalRequest>, JsonRejection>,
) -> Response
where
    R: LoanRepository + 'static,
    N: NotificationSink + 'static,
{
    let (loan_id, request) = match parse_loan_id(&loan_id).and_then(|id| Ok((id, body(payload)?)))
    {
        Ok(parsed) => parsed,
        Err(response) => return response,
    };

    match service.approve(loan_id, request) {
        Ok(_) => (StatusCode::OK, "Loan approved successfully").into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn invest_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(loan_id): Path<String>,
    payload: Result<Json<Investment>, JsonRejection>,
) -> Response
where
    R: LoanRepository + 'static,
    N: NotificationSink + 'static,
{
    let (loan_id, investment) =
        match parse_loan_id(&loan_id).and_then(|id| Ok((id, body(payload)?))) {
            Ok(parsed) => parsed,
            Err(response) => return response,
        };

    match service.invest(loan_id, investment) {
        Ok(outcome) if outcome.fully_funded => (
            StatusCode::OK,
            "Investment successful; loan is fully funded",
        )
            .into_response(),
        Ok(_) => (StatusCode::OK, "Investment successful").into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn disburse_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(loan_id): Path<String>,
    payload: Result<Json<DisbursementRequest>, JsonRejection>,
) -> Response
where
    R: LoanRepository + 'static,
    N: NotificationSink + 'static,
{
    let (loan_id, request) = match parse_loan_id(&loan_id).and_then(|id| Ok((id, body(payload)?)))
    {
        Ok(parsed) => parsed,
        Err(response) => return response,
    };

    match service.disburse(loan_id, request) {
        Ok(_) => (StatusCode::OK, "Loan disbursed successfully").into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn admin_handler<R, N>(State(service): State<SharedService<R, N>>) -> Response
where
    R: LoanRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.admin_loans() {
        Ok(loans) => (StatusCode::OK, Json(loans)).into_response(),
        Err(err) => error_response(err),
    }
}
