use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use uuid::Uuid;

use crate::dto::attempt_dto::{
    ApiResponse, AttemptListItem, AttemptListResponse, CompleteAttemptResponse,
    ListAttemptsQuery, Pagination, ReviewAttemptRequest, StartAttemptResponse,
    SubmitAnswerRequest,
};
use crate::error::Result;
use crate::middleware::auth::Claims;
use crate::models::test_attempt::AttemptStatus;
use crate::routes::extract::{JsonBody, QueryParams};
use crate::store::AttemptFilter;
use crate::AppState;

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;

#[axum::debug_handler]
pub async fn start_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let caller = claims.caller()?;
    let outcome = state.attempt_service.start_attempt(caller, test_id).await?;

    let (status, message) = if outcome.resumed {
        (StatusCode::OK, "Resumed existing test attempt")
    } else {
        (StatusCode::CREATED, "Test started successfully")
    };
    let body = ApiResponse::with_message(
        message,
        StartAttemptResponse {
            test_attempt: outcome.attempt,
            test: outcome.test,
        },
    );
    Ok((status, Json(body)))
}

#[axum::debug_handler]
pub async fn submit_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
    JsonBody(req): JsonBody<SubmitAnswerRequest>,
) -> Result<impl IntoResponse> {
    let caller = claims.caller()?;
    let answer = state
        .attempt_service
        .submit_answer(attempt_id, caller.user_id, req)
        .await?;
    Ok(Json(ApiResponse::with_message(
        "Answer submitted successfully",
        answer,
    )))
}

#[axum::debug_handler]
pub async fn complete_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let caller = claims.caller()?;
    let outcome = state
        .attempt_service
        .complete_attempt(attempt_id, caller.user_id)
        .await?;

    let pending_review = outcome.attempt.status == AttemptStatus::Submitted;
    let message = if pending_review {
        "Test submitted successfully and is pending review"
    } else {
        "Test completed successfully"
    };
    let body = CompleteAttemptResponse {
        answered_questions: outcome.summary.answered_questions,
        total_questions: outcome.summary.total_questions,
        percentage_score: (!pending_review).then(|| outcome.summary.percentage_score()),
        attempt: outcome.attempt,
    };
    Ok(Json(ApiResponse::with_message(message, body)))
}

#[axum::debug_handler]
pub async fn review_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
    JsonBody(req): JsonBody<ReviewAttemptRequest>,
) -> Result<impl IntoResponse> {
    let reviewer = claims.caller()?;
    let attempt = state
        .attempt_service
        .review_attempt(attempt_id, reviewer.user_id, req)
        .await?;
    Ok(Json(ApiResponse::with_message(
        "Test attempt reviewed successfully",
        attempt,
    )))
}

#[axum::debug_handler]
pub async fn list_attempts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    QueryParams(query): QueryParams<ListAttemptsQuery>,
) -> Result<impl IntoResponse> {
    let caller = claims.caller()?;
    let filter = AttemptFilter {
        status: query.status,
        test_type: query.test_type,
        page: query.page.unwrap_or(1).max(1),
        limit: query
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE),
    };

    let page = state
        .attempt_service
        .list_attempts(caller.user_id, &filter)
        .await?;
    let pages = (page.total + filter.limit - 1) / filter.limit;

    Ok(Json(AttemptListResponse {
        success: true,
        data: page
            .items
            .into_iter()
            .map(|(attempt, test)| AttemptListItem { attempt, test })
            .collect(),
        pagination: Pagination {
            total: page.total,
            page: filter.page,
            pages,
            limit: filter.limit,
        },
    }))
}

#[axum::debug_handler]
pub async fn get_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let caller = claims.caller()?;
    let detail = state.attempt_service.get_attempt(attempt_id, caller).await?;
    Ok(Json(ApiResponse::ok(detail)))
}
