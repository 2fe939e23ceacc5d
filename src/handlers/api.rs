use std::convert::Infallible;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, warn};
use warp::{Filter, Rejection};
use warp::http::StatusCode;
use warp::reply::{Reply, Response};

use crate::error::{AppError, Result};
use crate::models::event::EventView;
use crate::models::user::{User, UserProfile};
use crate::runtime::AppState;
use crate::service::account_service::{LoginRequest, RegisterRequest};
use crate::service::event_service::{EventPatch, NewEvent};
use crate::service::rate_limit::RateGovernor;

#[derive(Debug, Serialize)]
pub struct ErrorMessage {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub input: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TimezoneRequest {
    #[serde(default)]
    pub timezone: Option<String>,
}

/// Extracts the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let (scheme, token) = header?.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn json_reply<T: Serialize>(status: StatusCode, body: &T) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

fn error_reply(err: &AppError, fallback: &str) -> Response {
    if err.is_system() {
        error!(error = %err, "{}", fallback);
    }
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    json_reply(
        status,
        &ErrorMessage {
            error: err.public_message(fallback),
        },
    )
}

fn finish(result: Result<Response>, fallback: &str) -> std::result::Result<Response, Infallible> {
    Ok(result.unwrap_or_else(|err| error_reply(&err, fallback)))
}

fn governed(governor: &RateGovernor, user: &User) -> Result<()> {
    if governor.check(&user.id.to_string()) {
        Ok(())
    } else {
        warn!(user_id = user.id, "rate limit exceeded");
        Err(AppError::RateLimited)
    }
}

/// Carries an [`AppError`] raised inside a filter (before the handler runs)
/// to [`handle_rejection`].
#[derive(Debug)]
struct ApiRejection(AppError);

impl warp::reject::Reject for ApiRejection {}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Resolves the bearer token to a user. Runs ahead of body parsing, so an
/// anonymous caller gets 401 whatever it sent.
fn authenticated(state: AppState) -> impl Filter<Extract = (User,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(with_state(state))
        .and_then(|auth: Option<String>, state: AppState| async move {
            state
                .accounts
                .authenticate(bearer_token(auth.as_deref()))
                .await
                .map_err(|err| warp::reject::custom(ApiRejection(err)))
        })
}

pub fn routes(state: AppState) -> impl Filter<Extract = (Response,), Error = Infallible> + Clone {
    let index = warp::path::end().and(warp::get()).map(|| {
        json_reply(
            StatusCode::OK,
            &json!({ "message": "Drvyn API is running", "status": "ok" }),
        )
    });
    let health = warp::path!("health")
        .and(warp::get())
        .and(with_state(state.clone()))
        .map(|state: AppState| {
            json_reply(
                StatusCode::OK,
                &json!({ "status": "ok", "provider": state.chat.provider_name() }),
            )
        });

    let register = warp::path!("register")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(register);
    let login = warp::path!("login")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(login);
    let logout = warp::path!("logout")
        .and(warp::post())
        .and(warp::header::optional::<String>("authorization"))
        .and(with_state(state.clone()))
        .and_then(logout);

    let profile = warp::path!("api" / "user")
        .and(warp::get())
        .and(authenticated(state.clone()))
        .and_then(get_user);
    let timezone = warp::path!("api" / "user" / "timezone")
        .and(warp::put())
        .and(authenticated(state.clone()))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(update_timezone);

    let list = warp::path!("api" / "events")
        .and(warp::get())
        .and(authenticated(state.clone()))
        .and(with_state(state.clone()))
        .and_then(list_events);
    let create = warp::path!("api" / "events")
        .and(warp::post())
        .and(authenticated(state.clone()))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(create_event);
    let update = warp::path!("api" / "events" / u64)
        .and(warp::put())
        .and(authenticated(state.clone()))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(update_event);
    let delete = warp::path!("api" / "events" / u64)
        .and(warp::delete())
        .and(authenticated(state.clone()))
        .and(with_state(state.clone()))
        .and_then(delete_event);

    let chat = warp::path!("ai")
        .and(warp::post())
        .and(authenticated(state.clone()))
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(chat);

    index
        .or(health)
        .unify()
        .or(register)
        .unify()
        .or(login)
        .unify()
        .or(logout)
        .unify()
        .or(profile)
        .unify()
        .or(timezone)
        .unify()
        .or(list)
        .unify()
        .or(create)
        .unify()
        .or(update)
        .unify()
        .or(delete)
        .unify()
        .or(chat)
        .unify()
        .recover(handle_rejection)
        .unify()
}

async fn register(body: RegisterRequest, state: AppState) -> std::result::Result<Response, Infallible> {
    let result = async {
        let (user, token) = state.accounts.register(&body).await?;
        Ok::<_, AppError>(json_reply(
            StatusCode::OK,
            &json!({ "success": true, "token": token, "user": UserProfile::from(&user) }),
        ))
    }
    .await;
    finish(result, "Registration failed")
}

async fn login(body: LoginRequest, state: AppState) -> std::result::Result<Response, Infallible> {
    let result = async {
        let (user, token) = state.accounts.login(&body).await?;
        Ok::<_, AppError>(json_reply(
            StatusCode::OK,
            &json!({ "success": true, "token": token, "user": UserProfile::from(&user) }),
        ))
    }
    .await;
    finish(result, "Login failed")
}

async fn logout(auth: Option<String>, state: AppState) -> std::result::Result<Response, Infallible> {
    if let Some(token) = bearer_token(auth.as_deref()) {
        state.accounts.logout(token).await;
    }
    Ok(json_reply(StatusCode::OK, &json!({ "success": true })))
}

async fn get_user(user: User) -> std::result::Result<Response, Infallible> {
    Ok(json_reply(StatusCode::OK, &UserProfile::from(&user)))
}

async fn update_timezone(
    user: User,
    body: TimezoneRequest,
    state: AppState,
) -> std::result::Result<Response, Infallible> {
    let result = async {
        governed(&state.limits.timezone, &user)?;
        let updated = state
            .accounts
            .update_timezone(user.id, body.timezone.as_deref())
            .await?;
        Ok::<_, AppError>(json_reply(
            StatusCode::OK,
            &json!({ "success": true, "timezone": updated.timezone }),
        ))
    }
    .await;
    finish(result, "Failed to update timezone")
}

// Reads are not rate limited; only writes share the events ceiling.
async fn list_events(user: User, state: AppState) -> std::result::Result<Response, Infallible> {
    let events: Vec<EventView> = state.events.list(user.id).await.iter().map(EventView::from).collect();
    Ok(json_reply(StatusCode::OK, &json!({ "events": events })))
}

async fn create_event(
    user: User,
    body: NewEvent,
    state: AppState,
) -> std::result::Result<Response, Infallible> {
    let result = async {
        governed(&state.limits.events, &user)?;
        let created = state.events.create(user.id, &body).await?;
        Ok::<_, AppError>(json_reply(
            StatusCode::OK,
            &json!({ "success": true, "event": EventView::from(&created) }),
        ))
    }
    .await;
    finish(result, "Failed to add event")
}

async fn update_event(
    id: u64,
    user: User,
    body: EventPatch,
    state: AppState,
) -> std::result::Result<Response, Infallible> {
    let result = async {
        governed(&state.limits.events, &user)?;
        let updated = state.events.update(user.id, id, &body).await?;
        Ok::<_, AppError>(json_reply(
            StatusCode::OK,
            &json!({ "success": true, "event": EventView::from(&updated) }),
        ))
    }
    .await;
    finish(result, "Failed to update event")
}

async fn delete_event(id: u64, user: User, state: AppState) -> std::result::Result<Response, Infallible> {
    let result = async {
        governed(&state.limits.events, &user)?;
        state.events.delete(user.id, id).await?;
        Ok::<_, AppError>(json_reply(StatusCode::OK, &json!({ "success": true })))
    }
    .await;
    finish(result, "Failed to delete event")
}

async fn chat(user: User, body: ChatRequest, state: AppState) -> std::result::Result<Response, Infallible> {
    let result = async {
        governed(&state.limits.chat, &user)?;
        let reply = state
            .chat
            .submit(&user, body.input.as_deref().unwrap_or_default())
            .await?;
        Ok::<_, AppError>(json_reply(StatusCode::OK, &json!({ "commands": reply.commands })))
    }
    .await;
    finish(result, "Failed to process request")
}

async fn handle_rejection(err: Rejection) -> std::result::Result<Response, Infallible> {
    // Checked first: combined rejections from sibling routes may also carry
    // a MethodNotAllowed.
    if let Some(ApiRejection(app_err)) = err.find::<ApiRejection>() {
        return Ok(error_reply(app_err, "Failed to process request"));
    }
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid request body")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else {
        warn!(?err, "request rejected");
        (StatusCode::BAD_REQUEST, "Invalid request")
    };
    Ok(json_reply(
        status,
        &ErrorMessage {
            error: message.to_string(),
        },
    ))
}
