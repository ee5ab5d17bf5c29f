//! Request logging and JSON error helpers for the API.

use gradeview_common::collector::CollectError;
use gradeview_common::file_store::StoreError;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Status;
use rocket::request::Request;
use rocket::response::Response;
use rocket::response::status as rocket_status;
use rocket::serde::json::Json;
use rocket::serde::{Deserialize, Serialize};
use std::time::Instant;

pub const MSG_MISSING_STUNO: &str = "학번을 입력해주세요";
pub const MSG_INVALID_STUNO: &str = "올바르지 않은 학번입니다";
pub const MSG_STUDENT_NOT_FOUND: &str = "학생 데이터를 로드할 수 없습니다";
pub const MSG_COURSE_NOT_FOUND: &str = "과목을 찾을 수 없습니다";
pub const MSG_RANKS_NOT_FOUND: &str = "석차 데이터를 찾을 수 없습니다";
pub const MSG_RANKS_UNREADABLE: &str = "석차 데이터 읽기 실패";
pub const MSG_ANALYSIS_UNAVAILABLE: &str = "분석 데이터를 로드할 수 없습니다";
pub const MSG_ANALYSIS_UNREADABLE: &str = "분석 데이터 읽기 실패";

#[derive(Clone, Copy)]
pub struct RequestTimingFairing;

#[rocket::async_trait]
impl Fairing for RequestTimingFairing {
    fn info(&self) -> Info {
        Info {
            name: "Request timing",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _data: &mut rocket::Data<'_>) {
        request.local_cache(Instant::now);
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let started_at = request.local_cache(Instant::now);
        let elapsed = started_at.elapsed();
        let status = response.status().code;

        tracing::info!(
            method = %request.method(),
            path = %request.uri(),
            status = status,
            elapsed_ms = elapsed.as_millis(),
            "Request Completed"
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "rocket::serde")]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    NotFound,
    BadRequest,
    Internal,
}

/// Error payload. `error` is the message the dashboard shows to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct ApiErrorBody {
    pub error: String,
    pub kind: ApiErrorKind,
}

impl ApiErrorBody {
    fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            kind,
        }
    }
}

pub type ApiError = rocket_status::Custom<Json<ApiErrorBody>>;
pub type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn api_error(status: Status, kind: ApiErrorKind, message: impl Into<String>) -> ApiError {
    rocket_status::Custom(status, Json(ApiErrorBody::new(kind, message)))
}

pub fn not_found_error(message: impl Into<String>) -> ApiError {
    api_error(Status::NotFound, ApiErrorKind::NotFound, message)
}

pub fn bad_request_error(message: impl Into<String>) -> ApiError {
    api_error(Status::BadRequest, ApiErrorKind::BadRequest, message)
}

pub fn internal_error(message: impl Into<String>) -> ApiError {
    api_error(Status::InternalServerError, ApiErrorKind::Internal, message)
}

/// Log a file store failure and turn it into a 500 with the given message.
pub fn store_error(err: &StoreError, message: &str) -> ApiError {
    tracing::error!(error = %err, "Failed to read student data");
    internal_error(message)
}

/// Map a collection failure to a 500 that names the failing step.
pub fn collect_error(err: &CollectError) -> ApiError {
    tracing::error!(error = %err, "Collection failed");
    match err {
        CollectError::Pipeline(e) => internal_error(format!("{} 실행 실패: {e}", e.stage())),
        CollectError::Store(_) => internal_error(MSG_ANALYSIS_UNREADABLE),
        CollectError::DataUnavailable { .. } => internal_error(MSG_ANALYSIS_UNAVAILABLE),
    }
}
