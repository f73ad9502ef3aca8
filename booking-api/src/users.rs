use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use booking_domain::user::{CreateUserRequest, UpdateUserRequest};
use booking_domain::User;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::response::{ok, trace_id, ApiResponse, PaginatedResponse, Pagination};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/users", get(list_users).post(create_user))
        .route(
            "/api/v1/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
}

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<User>>), AppError> {
    let Json(req) = payload?;
    let user = state.users.create_user(req, trace_id(&headers)).await?;
    Ok((StatusCode::CREATED, ok(user)))
}

async fn get_user(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<User>>, AppError> {
    let Path(id) = id?;
    Ok(ok(state.users.get_user(id).await?))
}

async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<User>>, AppError> {
    let Path(id) = id?;
    let Json(req) = payload?;
    let user = state.users.update_user(id, req, trace_id(&headers)).await?;
    Ok(ok(user))
}

async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, AppError> {
    let Path(id) = id?;
    state.users.delete_user(id, trace_id(&headers)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_users(
    State(state): State<AppState>,
    params: Result<Query<PageParams>, QueryRejection>,
) -> Result<Json<PaginatedResponse<User>>, AppError> {
    let Query(params) = params?;
    let page = state
        .users
        .list_users(params.page.unwrap_or(1), params.page_size.unwrap_or(0))
        .await?;

    Ok(Json(PaginatedResponse {
        success: true,
        pagination: Pagination::new(page.page, page.page_size, page.total),
        data: page.users,
    }))
}
