use axum::{
    extract::{rejection::JsonRejection, ws::WebSocketUpgrade, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use application::{
    AssignRoleRequest, CreateDialogRequest, DialogDto, EditMessageRequest, GetMessagesRequest,
    ListDialogsRequest, MessageDto, MessagePageDto, ReadReceiptDto, SendMessageRequest,
    UnreadCountDto,
};
use domain::{Attachment, MessageMetadata, MessageType};

use crate::{
    auth::{user_from_headers, CurrentUser},
    error::ApiError,
    state::AppState,
    ws_connection::WebSocketConnection,
};

#[derive(Debug, Deserialize)]
struct CreateDialogPayload {
    #[serde(rename = "type")]
    dialog_type: String,
    #[serde(default)]
    participants: Vec<Uuid>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListDialogsQuery {
    #[serde(rename = "type")]
    dialog_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssignRolePayload {
    role: String,
}

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    #[serde(rename = "type", default)]
    message_type: MessageType,
    content: String,
    metadata: Option<MessageMetadata>,
    #[serde(default)]
    attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
struct EditMessagePayload {
    content: Option<String>,
    metadata: Option<MessageMetadata>,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<usize>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    user_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    connections: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/dialogs", post(create_dialog).get(list_dialogs))
        .route("/dialogs/{dialog_id}", get(get_dialog))
        .route("/dialogs/{dialog_id}/roles/{user_id}", put(assign_role))
        .route(
            "/dialogs/{dialog_id}/messages",
            post(send_message).get(get_messages),
        )
        .route("/dialogs/{dialog_id}/unread", get(unread_count))
        .route(
            "/messages/{message_id}",
            get(get_message).patch(edit_message).delete(delete_message),
        )
        .route("/messages/{message_id}/read", post(mark_read))
        .route("/ws", get(websocket_upgrade))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        connections: state.connections.connection_count().await,
    })
}

async fn create_dialog(
    State(state): State<AppState>,
    user: CurrentUser,
    payload: Result<Json<CreateDialogPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<DialogDto>), ApiError> {
    let Json(payload) = payload?;
    let dialog = state
        .chat_service
        .create_dialog(CreateDialogRequest {
            creator_id: user.id(),
            dialog_type: payload.dialog_type,
            participants: payload.participants,
            title: payload.title,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(DialogDto::from(&dialog))))
}

async fn list_dialogs(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListDialogsQuery>,
) -> Result<Json<Vec<DialogDto>>, ApiError> {
    let dialogs = state
        .chat_service
        .list_dialogs(ListDialogsRequest {
            requester_id: user.id(),
            dialog_type: query.dialog_type,
        })
        .await?;

    Ok(Json(dialogs.iter().map(DialogDto::from).collect()))
}

async fn get_dialog(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(dialog_id): Path<Uuid>,
) -> Result<Json<DialogDto>, ApiError> {
    let dialog = state.chat_service.get_dialog(dialog_id, user.id()).await?;
    Ok(Json(DialogDto::from(&dialog)))
}

async fn assign_role(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((dialog_id, target_user_id)): Path<(Uuid, Uuid)>,
    payload: Result<Json<AssignRolePayload>, JsonRejection>,
) -> Result<Json<DialogDto>, ApiError> {
    let Json(payload) = payload?;
    let dialog = state
        .chat_service
        .assign_role(AssignRoleRequest {
            dialog_id,
            operator_id: user.id(),
            target_user_id,
            role: payload.role,
        })
        .await?;

    Ok(Json(DialogDto::from(&dialog)))
}

async fn send_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(dialog_id): Path<Uuid>,
    payload: Result<Json<SendMessagePayload>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageDto>), ApiError> {
    let Json(payload) = payload?;
    let message = state
        .chat_service
        .send_message(SendMessageRequest {
            dialog_id,
            sender_id: user.id(),
            message_type: payload.message_type,
            content: payload.content,
            metadata: payload.metadata,
            attachments: payload.attachments,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(MessageDto::from(&message))))
}

async fn get_messages(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(dialog_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<MessagePageDto>, ApiError> {
    let page = state
        .chat_service
        .get_messages_with_default_deadline(GetMessagesRequest {
            dialog_id,
            requester_id: user.id(),
            page: query.page,
            limit: query.limit,
        })
        .await?;

    Ok(Json(MessagePageDto::from(&page)))
}

async fn unread_count(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(dialog_id): Path<Uuid>,
) -> Result<Json<UnreadCountDto>, ApiError> {
    let unread = state
        .chat_service
        .unread_count(dialog_id, user.id())
        .await?;
    Ok(Json(UnreadCountDto { dialog_id, unread }))
}

async fn get_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(message_id): Path<Uuid>,
) -> Result<Json<MessageDto>, ApiError> {
    let message = state.chat_service.get_message(message_id, user.id()).await?;
    Ok(Json(MessageDto::from(&message)))
}

async fn edit_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(message_id): Path<Uuid>,
    payload: Result<Json<EditMessagePayload>, JsonRejection>,
) -> Result<Json<MessageDto>, ApiError> {
    let Json(payload) = payload?;
    let message = state
        .chat_service
        .edit_message(EditMessageRequest {
            message_id,
            editor_id: user.id(),
            content: payload.content,
            metadata: payload.metadata,
        })
        .await?;

    Ok(Json(MessageDto::from(&message)))
}

async fn delete_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(message_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .chat_service
        .delete_message(message_id, user.id())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn mark_read(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(message_id): Path<Uuid>,
) -> Result<Json<ReadReceiptDto>, ApiError> {
    let message = state.chat_service.mark_read(message_id, user.id()).await?;
    Ok(Json(ReadReceiptDto::from(&message)))
}

/// 握手前确认身份，未识别的请求直接 401
async fn websocket_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let user_id = user_from_headers(&headers)
        .or(query.user_id)
        .ok_or_else(|| ApiError::unauthenticated("missing user identity"))?;

    Ok(ws.on_upgrade(move |socket| async move {
        WebSocketConnection::new(state, user_id).run(socket).await;
    }))
}
