use chrono::Utc;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::auth::{Role, User};
use shared_models::pagination::{PaginatedResponse, Pagination};

use crate::models::{CreateDoctorRequest, Doctor, DoctorError, UpdateDoctorRequest};

#[derive(Deserialize)]
struct UserRole {
    role: Role,
}

pub struct DoctorService {
    supabase: SupabaseClient,
}

impl DoctorService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Doctors create their own profile; admins may target any doctor account via `user_id`.
    pub async fn create_doctor(&self, actor: &User, request: CreateDoctorRequest) -> Result<Doctor, DoctorError> {
        let user_id = match (actor.role, request.user_id) {
            (Role::Admin, Some(target)) => target,
            (_, Some(target)) if target != actor.id => {
                return Err(DoctorError::Forbidden(
                    "Cannot create a doctor profile for another user".to_string(),
                ))
            }
            _ => actor.id,
        };
        debug!("Creating doctor profile for user {}", user_id);

        let specialty = request.specialty.trim();
        if specialty.is_empty() {
            return Err(DoctorError::Validation("Specialty is required".to_string()));
        }
        let experience_years = request.experience_years.unwrap_or(0);
        if experience_years < 0 {
            return Err(DoctorError::Validation("Experience years cannot be negative".to_string()));
        }

        if user_id != actor.id {
            let path = format!("/rest/v1/users?id=eq.{}&select=role", user_id);
            let rows: Vec<UserRole> = self.supabase.request(Method::GET, &path, None).await?;
            let target = rows.into_iter().next().ok_or(DoctorError::UserNotFound)?;
            if target.role != Role::Doctor {
                return Err(DoctorError::Validation("Target user is not a doctor".to_string()));
            }
        }

        if self.find_by_user(user_id).await?.is_some() {
            return Err(DoctorError::AlreadyExists);
        }

        let now = Utc::now().to_rfc3339();
        let row = json!({
            "user_id": user_id,
            "specialty": specialty,
            "designation": request.designation,
            "education": request.education,
            "experience_years": experience_years,
            "license_number": request.license_number,
            "bio": request.bio,
            "created_at": now,
            "updated_at": now
        });

        let created: Vec<Doctor> = self
            .supabase
            .request_returning(Method::POST, "/rest/v1/doctors", row)
            .await?;
        let doctor = created
            .into_iter()
            .next()
            .ok_or_else(|| DoctorError::Store("Insert returned no rows".to_string()))?;

        info!("Doctor profile {} created for user {}", doctor.id, user_id);
        Ok(doctor)
    }

    pub async fn get_doctor(&self, doctor_id: Uuid) -> Result<Doctor, DoctorError> {
        debug!("Fetching doctor profile: {}", doctor_id);

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let rows: Vec<Doctor> = self.supabase.request(Method::GET, &path, None).await?;
        rows.into_iter().next().ok_or(DoctorError::NotFound)
    }

    pub async fn get_doctor_by_user(&self, user_id: Uuid) -> Result<Doctor, DoctorError> {
        self.find_by_user(user_id).await?.ok_or(DoctorError::NotFound)
    }

    pub async fn list_doctors(
        &self,
        specialty: Option<&str>,
        pagination: Pagination,
    ) -> Result<PaginatedResponse<Doctor>, DoctorError> {
        let mut path = format!(
            "/rest/v1/doctors?order=created_at.desc&limit={}&offset={}",
            pagination.limit(),
            pagination.offset()
        );
        if let Some(specialty) = specialty.map(str::trim).filter(|s| !s.is_empty()) {
            path.push_str(&format!("&specialty=eq.{}", urlencoding::encode(specialty)));
        }

        let (doctors, total) = self.supabase.request_with_count::<Doctor>(&path).await?;
        Ok(PaginatedResponse::new(doctors, total, pagination))
    }

    pub async fn update_doctor(
        &self,
        actor: &User,
        doctor_id: Uuid,
        request: UpdateDoctorRequest,
    ) -> Result<Doctor, DoctorError> {
        debug!("Updating doctor profile: {}", doctor_id);

        let existing = self.get_doctor(doctor_id).await?;
        if !actor.is_admin() && existing.user_id != actor.id {
            return Err(DoctorError::Forbidden("Only the profile owner can update it".to_string()));
        }

        let mut update = Map::new();
        if let Some(specialty) = request.specialty {
            let specialty = specialty.trim().to_string();
            if specialty.is_empty() {
                return Err(DoctorError::Validation("Specialty cannot be empty".to_string()));
            }
            update.insert("specialty".to_string(), json!(specialty));
        }
        if let Some(years) = request.experience_years {
            if years < 0 {
                return Err(DoctorError::Validation("Experience years cannot be negative".to_string()));
            }
            update.insert("experience_years".to_string(), json!(years));
        }
        if let Some(designation) = request.designation {
            update.insert("designation".to_string(), json!(designation));
        }
        if let Some(education) = request.education {
            update.insert("education".to_string(), json!(education));
        }
        if let Some(license) = request.license_number {
            update.insert("license_number".to_string(), json!(license));
        }
        if let Some(bio) = request.bio {
            update.insert("bio".to_string(), json!(bio));
        }

        if update.is_empty() {
            return Ok(existing);
        }
        update.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let rows: Vec<Doctor> = self
            .supabase
            .request_returning(Method::PATCH, &path, Value::Object(update))
            .await?;

        rows.into_iter().next().ok_or(DoctorError::NotFound)
    }

    pub async fn delete_doctor(&self, doctor_id: Uuid) -> Result<(), DoctorError> {
        self.get_doctor(doctor_id).await?;

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        self.supabase.execute(Method::DELETE, &path, None).await?;

        info!("Doctor profile {} deleted", doctor_id);
        Ok(())
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Doctor>, DoctorError> {
        let path = format!("/rest/v1/doctors?user_id=eq.{}", user_id);
        let rows: Vec<Doctor> = self.supabase.request(Method::GET, &path, None).await?;
        Ok(rows.into_iter().next())
    }
}
