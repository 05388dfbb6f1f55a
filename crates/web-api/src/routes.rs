use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderValue, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use config::ServerConfig;
use domain::{Message, MessageId, User, UserId};
use serde::Deserialize;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use uuid::Uuid;
use validator::Validate;

use application::{
    LoginRequest, SendMessageRequest, Sidebar, SignupRequest, UpdateProfileRequest,
};

use crate::{
    auth::{AuthResponse, AuthUser},
    error::ApiError,
    state::AppState,
    websocket,
};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct SignupPayload {
    #[validate(email)]
    email: String,
    #[validate(length(min = 1, max = 100))]
    full_name: String,
    #[validate(length(min = 8))]
    password: String,
    #[validate(length(min = 1, max = 500))]
    bio: String,
}

#[derive(Debug, Deserialize, Validate)]
struct LoginPayload {
    #[validate(length(min = 1))]
    email: String,
    #[validate(length(min = 1))]
    password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct UpdateProfilePayload {
    #[validate(length(min = 1, max = 100))]
    full_name: Option<String>,
    #[validate(length(min = 1, max = 500))]
    bio: Option<String>,
    profile_pic: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    text: Option<String>,
    image: Option<String>,
}

pub fn router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .route("/ws", get(websocket::upgrade))
        .layer(DefaultBodyLimit::max(server.body_limit_bytes))
        .layer(cors_layer(&server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(status))
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/check-auth", get(check_auth))
        .route("/auth/update-profile", put(update_profile))
        .route("/messages/users", get(sidebar))
        .route("/messages/send/{recipient_id}", post(send_message))
        .route("/messages/mark/{message_id}", put(mark_seen))
        .route("/messages/{user_id}", get(conversation))
        .route("/presence/online", get(online_users))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "忽略无效的 CORS 来源");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

async fn status() -> &'static str {
    "Server is running"
}

async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupPayload>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    payload.validate()?;
    let user = state
        .user_service
        .signup(SignupRequest {
            email: payload.email,
            full_name: payload.full_name,
            password: payload.password,
            bio: payload.bio,
        })
        .await?;
    let token = state.jwt_service.generate_token(user.id)?;

    Ok((StatusCode::CREATED, Json(AuthResponse { user, token })))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<AuthResponse>, ApiError> {
    payload.validate()?;
    let user = state
        .user_service
        .login(LoginRequest {
            email: payload.email,
            password: payload.password,
        })
        .await?;
    let token = state.jwt_service.generate_token(user.id)?;

    Ok(Json(AuthResponse { user, token }))
}

async fn check_auth(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<UpdateProfilePayload>,
) -> Result<Json<User>, ApiError> {
    payload.validate()?;
    let updated = state
        .user_service
        .update_profile(
            user.id,
            UpdateProfileRequest {
                full_name: payload.full_name,
                bio: payload.bio,
                profile_pic: payload.profile_pic,
            },
        )
        .await?;

    Ok(Json(updated))
}

async fn sidebar(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Sidebar>, ApiError> {
    let sidebar = state.message_service.sidebar(user.id).await?;
    Ok(Json(sidebar))
}

async fn conversation(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(peer_id): Path<Uuid>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let messages = state
        .message_service
        .conversation(user.id, UserId::from(peer_id))
        .await?;
    Ok(Json(messages))
}

async fn send_message(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(recipient_id): Path<Uuid>,
    Json(payload): Json<SendMessagePayload>,
) -> Result<Json<Message>, ApiError> {
    let message = state
        .message_service
        .send(
            user.id,
            SendMessageRequest {
                recipient_id: UserId::from(recipient_id),
                text: payload.text,
                image: payload.image,
            },
        )
        .await?;
    Ok(Json(message))
}

async fn mark_seen(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(message_id): Path<Uuid>,
) -> Result<Json<Message>, ApiError> {
    let message = state
        .message_service
        .mark_seen(user.id, MessageId::from(message_id))
        .await?;
    Ok(Json(message))
}

async fn online_users(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<Vec<UserId>>, ApiError> {
    let users = state.message_service.online_users().await?;
    Ok(Json(users))
}
