use application::{HistoryRequest, RegistryStats, SendMessageRequest, DEFAULT_PAGE_LIMIT};
use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use domain::{
    AdminEventKind, BusinessEventKind, BusinessId, ChatRoom, ChatRoomId, ChatRoomOverview,
    Message, ReviewEventKind, UserId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::trace::TraceLayer;
use validator::{Validate, ValidationErrors};

use crate::{
    auth::{bearer_token, AdminUser, CurrentUser},
    error::ApiError,
    state::AppState,
    ws_connection::WebSocketConnection,
};

#[derive(Debug, Deserialize, Validate)]
struct HistoryQuery {
    #[validate(range(min = 1))]
    page: Option<u32>,
    #[validate(range(min = 1))]
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessagePayload {
    content: String,
    receiver_id: UserId,
}

#[derive(Debug, Deserialize, Validate)]
struct EventPayload {
    #[validate(length(min = 1))]
    kind: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Serialize)]
struct ReadReceipt {
    updated: u64,
}

#[derive(Debug, Serialize)]
struct Delivered {
    delivered: usize,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket_upgrade))
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/chat/business/{business_id}", post(initiate_chat))
        .route("/chat/rooms", get(list_rooms))
        .route(
            "/chat/rooms/{chat_room_id}/messages",
            get(list_messages).post(send_message),
        )
        .route("/chat/rooms/{chat_room_id}/read", post(mark_read))
        .route("/events/admin", post(emit_admin_event))
        .route("/events/business/{business_id}", post(emit_business_event))
        .route("/events/review/{business_id}", post(emit_review_event))
        .route("/admin/relay/stats", get(relay_stats))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

fn validation_error(errors: ValidationErrors) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", errors.to_string())
}

fn parse_kind<K>(kind: &str) -> Result<K, ApiError>
where
    K: std::str::FromStr<Err = domain::DomainError>,
{
    kind.parse::<K>()
        .map_err(|err| ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", err.to_string()))
}

async fn initiate_chat(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(business_id): Path<BusinessId>,
) -> Result<(StatusCode, Json<ChatRoom>), ApiError> {
    let room = state
        .hub
        .chat()
        .initiate_chat(business_id, user.user_id)
        .await?;

    Ok((StatusCode::CREATED, Json(room)))
}

async fn list_rooms(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<ChatRoomOverview>>, ApiError> {
    let rooms = state.hub.chat().list_rooms(user.user_id).await?;
    Ok(Json(rooms))
}

async fn list_messages(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(chat_room_id): Path<ChatRoomId>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    query.validate().map_err(validation_error)?;

    let messages = state
        .hub
        .chat()
        .list_messages(HistoryRequest {
            chat_room_id,
            user_id: user.user_id,
            page: query.page.unwrap_or(1),
            limit: query.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        })
        .await?;

    Ok(Json(messages))
}

async fn send_message(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(chat_room_id): Path<ChatRoomId>,
    Json(payload): Json<SendMessagePayload>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let message = state
        .hub
        .chat()
        .send_message(SendMessageRequest {
            chat_room_id,
            sender_id: user.user_id,
            receiver_id: payload.receiver_id,
            content: payload.content,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(chat_room_id): Path<ChatRoomId>,
) -> Result<Json<ReadReceipt>, ApiError> {
    let updated = state
        .hub
        .chat()
        .mark_read(chat_room_id, user.user_id)
        .await?;

    Ok(Json(ReadReceipt { updated }))
}

async fn emit_admin_event(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Json(body): Json<EventPayload>,
) -> Result<(StatusCode, Json<Delivered>), ApiError> {
    body.validate().map_err(validation_error)?;
    let kind: AdminEventKind = parse_kind(&body.kind)?;

    let delivered = state.hub.events().emit_admin_event(kind, body.payload);
    Ok((StatusCode::ACCEPTED, Json(Delivered { delivered })))
}

async fn emit_business_event(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Path(business_id): Path<BusinessId>,
    Json(body): Json<EventPayload>,
) -> Result<(StatusCode, Json<Delivered>), ApiError> {
    body.validate().map_err(validation_error)?;
    let kind: BusinessEventKind = parse_kind(&body.kind)?;

    let delivered = state
        .hub
        .events()
        .emit_business_event(business_id, kind, body.payload);
    Ok((StatusCode::ACCEPTED, Json(Delivered { delivered })))
}

async fn emit_review_event(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Path(business_id): Path<BusinessId>,
    Json(body): Json<EventPayload>,
) -> Result<(StatusCode, Json<Delivered>), ApiError> {
    body.validate().map_err(validation_error)?;
    let kind: ReviewEventKind = parse_kind(&body.kind)?;

    let delivered = state
        .hub
        .events()
        .emit_review_event(business_id, kind, body.payload);
    Ok((StatusCode::ACCEPTED, Json(Delivered { delivered })))
}

async fn relay_stats(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
) -> Json<RegistryStats> {
    Json(state.hub.registry().stats())
}

/// 升级前完成认证：失败直接返回 401，不会创建 socket
async fn websocket_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let token = bearer_token(&headers).or(query.token.as_deref());

    let session = tokio::time::timeout(state.connect_timeout, state.hub.connect(token))
        .await
        .map_err(|_| {
            tracing::warn!("websocket authentication timed out");
            ApiError::unauthorized("authentication timed out")
        })??;

    Ok(ws.on_upgrade(move |socket| WebSocketConnection::new(socket, session).run()))
}
