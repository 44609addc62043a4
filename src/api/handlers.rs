use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::NaiveDate;
use serde::Deserialize;

use super::dto::*;
use super::error::ApiError;
use super::AppState;
use crate::auth::{refresh_cookie_max_age, TokenPair};
use crate::model::*;
use crate::observability;
use crate::reservation::Role;

pub const REFRESH_COOKIE: &str = "slotbook-refresh_token";
const REFRESH_COOKIE_PATH: &str = "/api/admin/token";

/// The caller's role, derived from the `Authorization` header.
pub struct Caller(pub Role);

impl FromRequestParts<AppState> for Caller {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        Ok(Caller(state.tokens.role_for(header)))
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid id: {raw:?}")))
}

#[derive(Debug, Deserialize)]
pub struct WeekQuery {
    start: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    #[serde(default)]
    email: String,
}

#[derive(Debug, Deserialize)]
pub struct ScrubQuery {
    #[serde(default)]
    firstname: String,
    #[serde(default)]
    lastname: String,
    #[serde(default)]
    email: String,
}

pub async fn health() -> &'static str {
    "OK"
}

pub async fn list_entries(
    State(state): State<AppState>,
    Caller(role): Caller,
    Query(q): Query<WeekQuery>,
) -> Result<Json<WeekDto>, ApiError> {
    let raw = q.start.unwrap_or_default();
    let week_start = NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("invalid start date: {raw:?}")))?;
    let listing = state.service.list_week(week_start, role).await;
    Ok(Json(WeekDto::from(&listing)))
}

pub async fn create_entry(
    State(state): State<AppState>,
    payload: Result<Json<EntryBody>, JsonRejection>,
) -> Result<(StatusCode, Json<PublicEntryDto>), ApiError> {
    let entry = state.service.reserve(body(payload)?.into()).await?;
    Ok((StatusCode::CREATED, Json(PublicEntryDto::from(&entry))))
}

pub async fn delete_entry(
    State(state): State<AppState>,
    Caller(role): Caller,
    Path(id): Path<String>,
    Query(q): Query<EmailQuery>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    state.service.cancel_entry(id, role, &q.email).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_series(
    State(state): State<AppState>,
    payload: Result<Json<SeriesBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Vec<PublicEntryDto>>), ApiError> {
    let (_, entries) = state.service.reserve_series(body(payload)?.into()).await?;
    let created = entries.iter().map(PublicEntryDto::from).collect();
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn delete_series(
    State(state): State<AppState>,
    Caller(role): Caller,
    Path(id): Path<String>,
    Query(q): Query<EmailQuery>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    state.service.cancel_series(id, role, &q.email).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn scrub_user(
    State(state): State<AppState>,
    Caller(role): Caller,
    Query(q): Query<ScrubQuery>,
) -> Result<StatusCode, ApiError> {
    let owner = Owner::new(q.firstname, q.lastname, q.email);
    state.service.scrub_user(role, owner).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn auth_outcome<T, E>(endpoint: &'static str, result: &Result<T, E>) {
    let outcome = if result.is_ok() { "ok" } else { "rejected" };
    metrics::counter!(observability::AUTH_ATTEMPTS_TOTAL, "endpoint" => endpoint, "outcome" => outcome)
        .increment(1);
}

fn refresh_cookie(token: String) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Strict)
        .path(REFRESH_COOKIE_PATH)
        .max_age(time::Duration::seconds(refresh_cookie_max_age()))
        .build()
}

/// Access token in the body, refresh token in an HttpOnly cookie scoped to
/// the refresh endpoint.
fn token_response(jar: CookieJar, pair: TokenPair) -> Response {
    (jar.add(refresh_cookie(pair.refresh)), Json(pair.access)).into_response()
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let creds = body(payload)?;
    let result = state.tokens.login(&creds.username, &creds.password);
    auth_outcome("login", &result);
    if result.is_err() {
        tracing::warn!("failed admin login for {:?}", creds.username);
    }
    Ok(token_response(jar, result?))
}

pub async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_owned())
        .ok_or_else(|| ApiError::BadRequest("missing refresh token cookie".into()))?;
    let result = state.tokens.refresh(&token);
    auth_outcome("refresh", &result);
    Ok(token_response(jar, result?))
}
