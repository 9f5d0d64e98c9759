use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::pagination::{PageQuery, Pagination};

use crate::models::{
    CompleteAppointmentRequest, ConflictCheckQuery, CreateAppointmentRequest, ScheduleQuery,
    UpdateAppointmentRequest,
};
use crate::services::{Actor, AppointmentBookingService};

async fn resolve(config: &AppConfig, user: &User) -> Result<(AppointmentBookingService, Actor), AppError> {
    let service = AppointmentBookingService::new(config);
    let actor = service.actor_for(user).await?;
    Ok((service, actor))
}

// ==============================================================================
// BOOKING & EDITING
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(config): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let (service, actor) = resolve(&config, &user).await?;
    let appointment = service.book(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(json!(appointment))))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(config): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let (service, actor) = resolve(&config, &user).await?;
    let appointment = service.get(&actor, appointment_id).await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(config): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let (service, actor) = resolve(&config, &user).await?;
    let appointment = service.update(&actor, appointment_id, request).await?;
    Ok(Json(json!(appointment)))
}

// ==============================================================================
// STATUS TRANSITIONS
// ==============================================================================

pub async fn confirm_appointment(
    State(config): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let (service, actor) = resolve(&config, &user).await?;
    let appointment = service.confirm(&actor, appointment_id).await?;
    Ok(Json(json!(appointment)))
}

pub async fn cancel_appointment(
    State(config): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let (service, actor) = resolve(&config, &user).await?;
    let appointment = service.cancel(&actor, appointment_id).await?;
    Ok(Json(json!(appointment)))
}

/// Body is optional; `{"notes": "..."}` attaches visit notes.
pub async fn complete_appointment(
    State(config): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    request: Option<Json<CompleteAppointmentRequest>>,
) -> Result<Json<Value>, AppError> {
    let notes = request.and_then(|Json(body)| body.notes);
    let (service, actor) = resolve(&config, &user).await?;
    let appointment = service.complete(&actor, appointment_id, notes).await?;
    Ok(Json(json!(appointment)))
}

pub async fn mark_no_show(
    State(config): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let (service, actor) = resolve(&config, &user).await?;
    let appointment = service.mark_no_show(&actor, appointment_id).await?;
    Ok(Json(json!(appointment)))
}

// ==============================================================================
// LISTINGS & QUERIES
// ==============================================================================

pub async fn get_patient_appointments(
    State(config): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    let (service, actor) = resolve(&config, &user).await?;
    let appointments = service
        .list_for_patient(&actor, patient_id, Pagination::from_query(&page))
        .await?;
    Ok(Json(json!(appointments)))
}

pub async fn get_doctor_appointments(
    State(config): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    let (service, actor) = resolve(&config, &user).await?;
    let appointments = service
        .list_for_doctor(&actor, doctor_id, Pagination::from_query(&page))
        .await?;
    Ok(Json(json!(appointments)))
}

pub async fn get_doctor_schedule(
    State(config): State<Arc<AppConfig>>,
    Extension(_user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<ScheduleQuery>,
) -> Result<Json<Value>, AppError> {
    let slots = AppointmentBookingService::new(&config)
        .doctor_schedule(doctor_id, query)
        .await?;
    Ok(Json(json!(slots)))
}

pub async fn check_appointment_conflicts(
    State(config): State<Arc<AppConfig>>,
    Extension(_user): Extension<User>,
    Query(query): Query<ConflictCheckQuery>,
) -> Result<Json<Value>, AppError> {
    let response = AppointmentBookingService::new(&config)
        .check_conflicts(query)
        .await?;
    Ok(Json(json!(response)))
}
