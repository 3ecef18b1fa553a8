//! JSON API over the bot's storage, used by the dashboard.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

use crate::error::BotError;
use crate::logging::{LogEntry, SharedLogBuffer};
use crate::state::{
    ApprovalRequest, ApprovalStatus, BotStats, LinkedAccount, NewApprovalRequest, NewServer,
    Server, SharedStorage,
};

const ADMIN_HEADER: &str = "x-user-id";
const DEFAULT_LOG_COUNT: usize = 200;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub storage: SharedStorage,
    pub admin_user_id: Option<String>,
    pub log_buffer: SharedLogBuffer,
}

/// Error response rendered as `{"error": "..."}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Storage failure; details go to the log only
    fn storage(context: &str, err: BotError) -> Self {
        if let BotError::Duplicate { .. } = err {
            return Self::new(StatusCode::CONFLICT, err.to_string());
        }
        error!("{}: {}", context, err);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, context)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;
type Created<T> = Result<(StatusCode, Json<T>), ApiError>;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

fn require_field(name: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("{} is required", name)));
    }
    Ok(())
}

/// The `x-user-id` header must name the configured admin
fn require_admin(state: &ApiState, headers: &HeaderMap, action: &str) -> Result<String, ApiError> {
    let Some(admin) = &state.admin_user_id else {
        error!("ADMIN_USER_ID is not set, admin API endpoints are disabled");
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Admin ID not configured",
        ));
    };
    let requester = headers
        .get(ADMIN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if requester != admin {
        warn!("Unauthorized {} attempt from user ID '{}'", action, requester);
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "Unauthorized: Admin permission required",
        ));
    }
    Ok(requester.to_string())
}

pub fn api_router(state: ApiState) -> Router {
    Router::new()
        .route("/servers", get(list_servers).post(create_server))
        .route("/servers/approved", get(list_approved_servers))
        .route("/servers/:server_id/approve", patch(approve_server))
        .route("/users/verified", post(create_linked_account))
        .route(
            "/users/verified/:discord_id",
            get(get_linked_account).patch(update_linked_account),
        )
        .route(
            "/approval-requests",
            get(list_approval_requests).post(create_approval_request),
        )
        .route(
            "/approval-requests/pending",
            get(list_pending_approval_requests),
        )
        .route(
            "/approval-requests/:server_id/status",
            patch(update_approval_status),
        )
        .route("/bot/stats", get(bot_stats))
        .route("/logs", get(recent_logs))
        .route("/logs/stream", get(logs_stream))
        .with_state(state)
}

// Servers

async fn list_servers(State(state): State<ApiState>) -> ApiResult<Vec<Server>> {
    state
        .storage
        .list_servers()
        .await
        .map(Json)
        .map_err(|e| ApiError::storage("Failed to fetch servers", e))
}

async fn list_approved_servers(State(state): State<ApiState>) -> ApiResult<Vec<Server>> {
    state
        .storage
        .list_approved_servers()
        .await
        .map(Json)
        .map_err(|e| ApiError::storage("Failed to fetch approved servers", e))
}

async fn create_server(
    State(state): State<ApiState>,
    payload: Result<Json<NewServer>, JsonRejection>,
) -> Created<Server> {
    let server = body(payload)?;
    require_field("server_id", &server.server_id)?;
    require_field("server_name", &server.server_name)?;
    require_field("owner_discord_id", &server.owner_discord_id)?;

    let created = state
        .storage
        .create_server(server)
        .await
        .map_err(|e| ApiError::storage("Failed to create server", e))?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Deserialize)]
struct ApproveBody {
    #[serde(default)]
    is_approved: bool,
}

async fn approve_server(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(server_id): Path<String>,
    payload: Result<Json<ApproveBody>, JsonRejection>,
) -> ApiResult<Server> {
    let admin = require_admin(&state, &headers, "server approval")?;
    let approve = body(payload)?.is_approved;

    let server = state
        .storage
        .update_server_approval(&server_id, approve)
        .await
        .map_err(|e| ApiError::storage("Failed to update server approval", e))?
        .ok_or_else(|| ApiError::not_found("Server not found"))?;

    if approve {
        state
            .storage
            .update_approval_status(&server_id, ApprovalStatus::Approved)
            .await
            .map_err(|e| ApiError::storage("Failed to update server approval", e))?;
        info!("Server {} approved by admin {}", server_id, admin);
    }
    Ok(Json(server))
}

// Linked accounts

#[derive(Debug, Deserialize)]
struct NewLinkedAccount {
    discord_id: String,
    roblox_id: String,
    roblox_username: String,
}

#[derive(Debug, Deserialize)]
struct RelinkBody {
    roblox_id: Option<String>,
    roblox_username: Option<String>,
}

async fn get_linked_account(
    State(state): State<ApiState>,
    Path(discord_id): Path<String>,
) -> ApiResult<LinkedAccount> {
    state
        .storage
        .get_linked_account(&discord_id)
        .await
        .map_err(|e| ApiError::storage("Failed to fetch verified user", e))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Verified user not found"))
}

async fn create_linked_account(
    State(state): State<ApiState>,
    payload: Result<Json<NewLinkedAccount>, JsonRejection>,
) -> Created<LinkedAccount> {
    let account = body(payload)?;
    require_field("discord_id", &account.discord_id)?;
    require_field("roblox_id", &account.roblox_id)?;
    require_field("roblox_username", &account.roblox_username)?;

    let created = state
        .storage
        .create_linked_account(
            &account.discord_id,
            &account.roblox_id,
            &account.roblox_username,
        )
        .await
        .map_err(|e| ApiError::storage("Failed to create verified user", e))?;

    if let Err(e) = state.storage.increment_verifications().await {
        warn!("Failed to bump verification counter: {}", e);
    }
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_linked_account(
    State(state): State<ApiState>,
    Path(discord_id): Path<String>,
    payload: Result<Json<RelinkBody>, JsonRejection>,
) -> ApiResult<LinkedAccount> {
    let relink = body(payload)?;
    let (Some(roblox_id), Some(roblox_username)) = (
        relink.roblox_id.filter(|v| !v.trim().is_empty()),
        relink.roblox_username.filter(|v| !v.trim().is_empty()),
    ) else {
        return Err(ApiError::bad_request(
            "roblox_id and roblox_username are required",
        ));
    };

    state
        .storage
        .update_linked_account(&discord_id, &roblox_id, &roblox_username)
        .await
        .map_err(|e| ApiError::storage("Failed to update verified user", e))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Verified user not found"))
}

// Approval requests

async fn list_approval_requests(State(state): State<ApiState>) -> ApiResult<Vec<ApprovalRequest>> {
    state
        .storage
        .list_approval_requests()
        .await
        .map(Json)
        .map_err(|e| ApiError::storage("Failed to fetch approval requests", e))
}

async fn list_pending_approval_requests(
    State(state): State<ApiState>,
) -> ApiResult<Vec<ApprovalRequest>> {
    state
        .storage
        .list_pending_approval_requests()
        .await
        .map(Json)
        .map_err(|e| ApiError::storage("Failed to fetch pending approval requests", e))
}

async fn create_approval_request(
    State(state): State<ApiState>,
    payload: Result<Json<NewApprovalRequest>, JsonRejection>,
) -> Created<ApprovalRequest> {
    let request = body(payload)?;
    require_field("server_id", &request.server_id)?;
    require_field("server_name", &request.server_name)?;
    require_field("requested_by", &request.requested_by)?;

    let created = state
        .storage
        .create_approval_request(request)
        .await
        .map_err(|e| ApiError::storage("Failed to create approval request", e))?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: Option<String>,
}

async fn update_approval_status(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(server_id): Path<String>,
    payload: Result<Json<StatusBody>, JsonRejection>,
) -> ApiResult<ApprovalRequest> {
    let admin = require_admin(&state, &headers, "approval status update")?;
    let status: ApprovalStatus = body(payload)?
        .status
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ApiError::bad_request("Valid status is required"))?;

    let request = state
        .storage
        .update_approval_status(&server_id, status)
        .await
        .map_err(|e| ApiError::storage("Failed to update approval request status", e))?
        .ok_or_else(|| ApiError::not_found("Approval request not found"))?;

    match status {
        ApprovalStatus::Approved => {
            state
                .storage
                .update_server_approval(&server_id, true)
                .await
                .map_err(|e| {
                    ApiError::storage("Failed to update approval request status", e)
                })?;
            info!(
                "Server {} approved through request update by admin {}",
                server_id, admin
            );
        }
        ApprovalStatus::Denied => {
            info!("Server {} approval request denied by admin {}", server_id, admin)
        }
        ApprovalStatus::Pending => {}
    }
    Ok(Json(request))
}

// Stats and logs

async fn bot_stats(State(state): State<ApiState>) -> ApiResult<BotStats> {
    state
        .storage
        .get_stats()
        .await
        .map(Json)
        .map_err(|e| ApiError::storage("Failed to fetch bot stats", e))
}

#[derive(Debug, Deserialize)]
struct LogQuery {
    count: Option<usize>,
}

async fn recent_logs(
    State(state): State<ApiState>,
    Query(query): Query<LogQuery>,
) -> Json<Vec<LogEntry>> {
    Json(
        state
            .log_buffer
            .get_recent(query.count.unwrap_or(DEFAULT_LOG_COUNT)),
    )
}

/// Live log feed as server-sent events (admin only)
async fn logs_stream(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    if let Err(e) = require_admin(&state, &headers, "log stream") {
        return e.into_response();
    }

    let stream = BroadcastStream::new(state.log_buffer.subscribe()).filter_map(|result| {
        // Lagged receivers skip what they missed
        result
            .ok()
            .map(|entry| Ok::<_, Infallible>(Event::default().data(entry.to_json())))
    });

    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("ping"),
        )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::create_log_buffer;
    use crate::state::{create_shared_storage, FileStore};
    use axum::http::HeaderValue;

    const ADMIN: &str = "111";

    fn state(admin: Option<&str>) -> ApiState {
        ApiState {
            storage: create_shared_storage(FileStore::in_memory()),
            admin_user_id: admin.map(str::to_string),
            log_buffer: create_log_buffer(10),
        }
    }

    fn headers(user_id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ADMIN_HEADER, HeaderValue::from_str(user_id).unwrap());
        headers
    }

    fn new_server(id: &str) -> NewServer {
        NewServer {
            server_id: id.to_string(),
            server_name: "Guild".to_string(),
            owner_discord_id: "9".to_string(),
            is_approved: false,
            member_count: 12,
        }
    }

    #[tokio::test]
    async fn test_create_then_list_servers() {
        let state = state(Some(ADMIN));
        let (status, Json(created)) =
            create_server(State(state.clone()), Ok(Json(new_server("42"))))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert!(!created.is_approved);

        let Json(all) = list_servers(State(state.clone())).await.unwrap();
        assert_eq!(all.len(), 1);
        let Json(approved) = list_approved_servers(State(state)).await.unwrap();
        assert!(approved.is_empty());
    }

    #[tokio::test]
    async fn test_create_server_rejects_blank_fields() {
        let mut server = new_server("42");
        server.server_name = "  ".to_string();
        let err = create_server(State(state(None)), Ok(Json(server)))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_approve_requires_admin() {
        let state = state(Some(ADMIN));
        let err = approve_server(
            State(state.clone()),
            headers("222"),
            Path("42".to_string()),
            Ok(Json(ApproveBody { is_approved: true })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        let err = approve_server(
            State(state),
            HeaderMap::new(),
            Path("42".to_string()),
            Ok(Json(ApproveBody { is_approved: true })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_admin_endpoints_disabled_without_admin() {
        let err = approve_server(
            State(state(None)),
            headers(ADMIN),
            Path("42".to_string()),
            Ok(Json(ApproveBody { is_approved: true })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_approve_server_updates_request() {
        let state = state(Some(ADMIN));
        state.storage.create_server(new_server("42")).await.unwrap();
        state
            .storage
            .create_approval_request(NewApprovalRequest {
                server_id: "42".to_string(),
                server_name: "Guild".to_string(),
                requested_by: "9".to_string(),
                member_count: 12,
            })
            .await
            .unwrap();

        let Json(server) = approve_server(
            State(state.clone()),
            headers(ADMIN),
            Path("42".to_string()),
            Ok(Json(ApproveBody { is_approved: true })),
        )
        .await
        .unwrap();
        assert!(server.is_approved);

        let request = state.storage.get_approval_request("42").await.unwrap().unwrap();
        assert_eq!(request.status, ApprovalStatus::Approved);

        let err = approve_server(
            State(state),
            headers(ADMIN),
            Path("missing".to_string()),
            Ok(Json(ApproveBody { is_approved: true })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_linked_account_lifecycle() {
        let state = state(None);
        let err = get_linked_account(State(state.clone()), Path("7".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let (status, _) = create_linked_account(
            State(state.clone()),
            Ok(Json(NewLinkedAccount {
                discord_id: "7".to_string(),
                roblox_id: "156".to_string(),
                roblox_username: "builderman".to_string(),
            })),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(state.storage.get_stats().await.unwrap().verifications, 1);

        let err = update_linked_account(
            State(state.clone()),
            Path("7".to_string()),
            Ok(Json(RelinkBody {
                roblox_id: Some("1".to_string()),
                roblox_username: None,
            })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let Json(updated) = update_linked_account(
            State(state),
            Path("7".to_string()),
            Ok(Json(RelinkBody {
                roblox_id: Some("1".to_string()),
                roblox_username: Some("Roblox".to_string()),
            })),
        )
        .await
        .unwrap();
        assert_eq!(updated.roblox_username, "Roblox");
    }

    #[tokio::test]
    async fn test_status_update_validates_and_approves_server() {
        let state = state(Some(ADMIN));
        state.storage.create_server(new_server("42")).await.unwrap();

        let err = update_approval_status(
            State(state.clone()),
            headers(ADMIN),
            Path("42".to_string()),
            Ok(Json(StatusBody {
                status: Some("maybe".to_string()),
            })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err = update_approval_status(
            State(state.clone()),
            headers(ADMIN),
            Path("42".to_string()),
            Ok(Json(StatusBody {
                status: Some("approved".to_string()),
            })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        create_approval_request(
            State(state.clone()),
            Ok(Json(NewApprovalRequest {
                server_id: "42".to_string(),
                server_name: "Guild".to_string(),
                requested_by: "9".to_string(),
                member_count: 12,
            })),
        )
        .await
        .unwrap();
        let Json(pending) = list_pending_approval_requests(State(state.clone()))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);

        let Json(request) = update_approval_status(
            State(state.clone()),
            headers(ADMIN),
            Path("42".to_string()),
            Ok(Json(StatusBody {
                status: Some("approved".to_string()),
            })),
        )
        .await
        .unwrap();
        assert_eq!(request.status, ApprovalStatus::Approved);
        assert!(state.storage.is_server_approved("42").await.unwrap());
    }

    #[tokio::test]
    async fn test_recent_logs_honours_count() {
        let state = state(None);
        for i in 0..5 {
            state.log_buffer.push(LogEntry {
                timestamp: chrono::Utc::now(),
                level: "INFO".to_string(),
                target: "test".to_string(),
                message: format!("line {}", i),
            });
        }
        let Json(logs) = recent_logs(State(state), Query(LogQuery { count: Some(2) })).await;
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].message, "line 4");
    }
}
