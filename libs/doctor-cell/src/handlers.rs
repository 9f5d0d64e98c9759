use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_models::pagination::{PageQuery, Pagination};
use shared_utils::extractor::ensure_role;

use crate::models::{CreateDoctorRequest, DoctorListQuery, UpdateDoctorRequest};
use crate::services::DoctorService;

#[axum::debug_handler]
pub async fn create_doctor(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateDoctorRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    ensure_role(&user, &[Role::Doctor, Role::Admin])?;

    let doctor = DoctorService::new(&state).create_doctor(&user, request).await?;
    Ok((StatusCode::CREATED, Json(json!(doctor))))
}

#[axum::debug_handler]
pub async fn list_doctors(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<DoctorListQuery>,
) -> Result<Json<Value>, AppError> {
    let pagination = Pagination::from_query(&PageQuery {
        page: query.page,
        page_size: query.page_size,
    });

    let page = DoctorService::new(&state)
        .list_doctors(query.specialty.as_deref(), pagination)
        .await?;

    Ok(Json(json!(page)))
}

pub async fn get_doctor(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let doctor = DoctorService::new(&state).get_doctor(doctor_id).await?;
    Ok(Json(json!(doctor)))
}

pub async fn get_doctor_by_user(
    State(state): State<Arc<AppConfig>>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let doctor = DoctorService::new(&state).get_doctor_by_user(user_id).await?;
    Ok(Json(json!(doctor)))
}

pub async fn update_doctor(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
    Json(request): Json<UpdateDoctorRequest>,
) -> Result<Json<Value>, AppError> {
    let doctor = DoctorService::new(&state)
        .update_doctor(&user, doctor_id, request)
        .await?;

    Ok(Json(json!(doctor)))
}

pub async fn delete_doctor(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    ensure_role(&user, &[Role::Admin])?;

    DoctorService::new(&state).delete_doctor(doctor_id).await?;
    Ok(Json(json!({ "message": "Doctor deleted successfully" })))
}
