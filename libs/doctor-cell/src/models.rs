use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::SupabaseError;
use shared_models::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub user_id: Uuid,
    pub specialty: String,
    pub designation: Option<String>,
    pub education: Option<String>,
    #[serde(default)]
    pub experience_years: i32,
    pub license_number: Option<String>,
    pub bio: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDoctorRequest {
    /// Only admins may create a profile on behalf of another user.
    pub user_id: Option<Uuid>,
    pub specialty: String,
    pub designation: Option<String>,
    pub education: Option<String>,
    pub experience_years: Option<i32>,
    pub license_number: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDoctorRequest {
    pub specialty: Option<String>,
    pub designation: Option<String>,
    pub education: Option<String>,
    pub experience_years: Option<i32>,
    pub license_number: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DoctorListQuery {
    pub specialty: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Error, Debug)]
pub enum DoctorError {
    #[error("Doctor not found")]
    NotFound,

    #[error("Doctor profile already exists for this user")]
    AlreadyExists,

    #[error("User not found")]
    UserNotFound,

    #[error("{0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl From<SupabaseError> for DoctorError {
    fn from(err: SupabaseError) -> Self {
        match err {
            SupabaseError::Conflict(_) => DoctorError::AlreadyExists,
            other => DoctorError::Store(other.to_string()),
        }
    }
}

impl From<DoctorError> for AppError {
    fn from(err: DoctorError) -> Self {
        match err {
            DoctorError::NotFound | DoctorError::UserNotFound => AppError::NotFound(err.to_string()),
            DoctorError::AlreadyExists => AppError::BadRequest(err.to_string()),
            DoctorError::Forbidden(msg) => AppError::Forbidden(msg),
            DoctorError::Validation(msg) => AppError::ValidationError(msg),
            DoctorError::Store(msg) => AppError::Database(msg),
        }
    }
}
