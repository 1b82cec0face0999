use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use super::common::{created_response, message_response, success_response, validate_input, PHONE};
use crate::{
    auth::{AuthRouterExt, AuthUser, NewUser},
    errors::ServiceError,
    AppState,
};

pub fn auth_routes() -> Router<Arc<AppState>> {
    let public = Router::new()
        .route("/register", post(register))
        .route("/login", post(login));

    let private = Router::new().route("/me", get(me)).with_auth();

    public.merge(private)
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterBody {
    #[validate(length(min = 2, max = 50, message = "Name must be between 2 and 50 characters"))]
    pub name: String,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters long"))]
    pub password: String,
    #[validate(regex(path = "PHONE", message = "Please provide a valid phone number"))]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginBody {
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterBody>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let session = state
        .auth
        .register(NewUser {
            name: payload.name,
            email: payload.email,
            password: payload.password,
            phone: payload.phone,
        })
        .await?;
    Ok(created_response("User registered successfully", session))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginBody>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let session = state.auth.login(&payload.email, &payload.password).await?;
    Ok(message_response("Login successful", session))
}

async fn me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let profile = state.auth.profile(user.user_id).await?;
    Ok(success_response(json!({ "user": profile })))
}
