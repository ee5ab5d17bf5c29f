//! A small dashboard server for browsing a student's analysed course grades.

#[macro_use]
extern crate rocket;

mod config;
mod helpers;
mod page;

use clap::Parser;
use config::Cli;
use gradeview_common::cache::CachedRecords;
use gradeview_common::collector::Collector;
use gradeview_common::{CourseRecord, CourseSummary, SemesterRank, summarize_courses, validate_stuno};
use helpers::*;
use page::Dashboard;
use rocket::fs::{FileServer, Options};
use rocket::http::Status;
use rocket::response::content::RawHtml;
use rocket::serde::json::{Json, Value, json};
use rocket::{Build, Request, Rocket, State};
use tracing_subscriber::EnvFilter;

/// Student used when a course request does not name one.
struct DefaultStudent(Option<String>);

fn resolve_stuno<'a>(
    stuno: Option<&'a str>,
    default: &'a DefaultStudent,
) -> Result<&'a str, ApiError> {
    let stuno = stuno
        .filter(|s| !s.is_empty())
        .or(default.0.as_deref())
        .ok_or_else(|| bad_request_error(MSG_MISSING_STUNO))?;
    validate_stuno(stuno).map_err(|_| bad_request_error(MSG_INVALID_STUNO))
}

async fn load_records(collector: &Collector, stuno: &str) -> Result<CachedRecords, ApiError> {
    match collector.analysis(stuno).await {
        Ok(Some(records)) => Ok(records),
        Ok(None) => Err(not_found_error(MSG_STUDENT_NOT_FOUND)),
        Err(e) => Err(store_error(&e, MSG_ANALYSIS_UNREADABLE)),
    }
}

#[get("/")]
fn index(page: &State<Dashboard>) -> RawHtml<String> {
    RawHtml(page.html().to_string())
}

#[get("/api/collect/<stuno>")]
async fn collect(stuno: &str, collector: &State<Collector>) -> ApiResult<Value> {
    let stuno = validate_stuno(stuno).map_err(|_| bad_request_error(MSG_INVALID_STUNO))?;
    let outcome = collector
        .collect(stuno)
        .await
        .map_err(|e| collect_error(&e))?;
    Ok(Json(json!({
        "success": true,
        "cached": outcome.cached,
        "count": outcome.count,
    })))
}

#[get("/api/courses?<stuno>")]
async fn courses(
    stuno: Option<&str>,
    default: &State<DefaultStudent>,
    collector: &State<Collector>,
) -> ApiResult<Vec<CourseSummary>> {
    let stuno = resolve_stuno(stuno, default)?;
    let records = load_records(collector, stuno).await?;
    Ok(Json(summarize_courses(&records)))
}

#[get("/api/courses/<id>?<stuno>")]
async fn course_detail(
    id: &str,
    stuno: Option<&str>,
    default: &State<DefaultStudent>,
    collector: &State<Collector>,
) -> ApiResult<CourseRecord> {
    // a malformed index is "not found" whatever the student
    let index: usize = id
        .parse()
        .map_err(|_| not_found_error(MSG_COURSE_NOT_FOUND))?;
    let stuno = resolve_stuno(stuno, default)?;
    let records = load_records(collector, stuno).await?;
    records
        .get(index)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found_error(MSG_COURSE_NOT_FOUND))
}

#[get("/api/grades/<stuno>")]
async fn grades(stuno: &str, collector: &State<Collector>) -> ApiResult<Vec<SemesterRank>> {
    let stuno = validate_stuno(stuno).map_err(|_| bad_request_error(MSG_INVALID_STUNO))?;
    match collector.ranks(stuno).await {
        Ok(Some(ranks)) => Ok(Json(ranks)),
        Ok(None) => Err(not_found_error(MSG_RANKS_NOT_FOUND)),
        Err(e) => Err(store_error(&e, MSG_RANKS_UNREADABLE)),
    }
}

#[catch(404)]
fn not_found() -> ApiError {
    not_found_error("The requested resource could not be found.")
}

#[catch(default)]
fn default_catcher(status: Status, request: &Request) -> ApiError {
    tracing::warn!(status = status.code, path = %request.uri(), "Unhandled error");
    let kind = match status.code {
        404 => ApiErrorKind::NotFound,
        code if code < 500 => ApiErrorKind::BadRequest,
        _ => ApiErrorKind::Internal,
    };
    api_error(status, kind, status.reason_lossy())
}

fn build(cli: &Cli) -> Result<Rocket<Build>, String> {
    if let Some(stuno) = &cli.default_stuno {
        validate_stuno(stuno).map_err(|e| format!("default student: {e}"))?;
    }
    let collector = cli.collector()?;
    let figment = rocket::Config::figment()
        .merge(("address", cli.address))
        .merge(("port", cli.port));

    Ok(rocket::custom(figment)
        .manage(collector)
        .manage(DefaultStudent(cli.default_stuno.clone()))
        .manage(Dashboard::render(!cli.hide_ranks, cli.default_stuno.as_deref()))
        .attach(RequestTimingFairing)
        .mount("/", routes![index, collect, courses, course_detail, grades])
        .mount(
            "/",
            FileServer::new(&cli.static_dir, Options::Missing | Options::Index).rank(20),
        )
        .register("/", catchers![not_found, default_catcher]))
}

#[launch]
fn rocket() -> _ {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!(
        address = %cli.address,
        port = cli.port,
        data_dir = %cli.data_dir.display(),
        "Starting gradeview"
    );
    match build(&cli) {
        Ok(rocket) => rocket,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(2);
        }
    }
}
