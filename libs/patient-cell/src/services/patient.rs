use chrono::Utc;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::auth::{Role, User};

use crate::models::{CreatePatientRequest, Patient, PatientError, UpdatePatientRequest};

#[derive(Deserialize)]
struct UserRole {
    role: Role,
}

pub struct PatientService {
    supabase: SupabaseClient,
}

impl PatientService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Owners, any doctor, and admins may read a patient profile.
    pub fn can_read(actor: &User, patient: &Patient) -> bool {
        match actor.role {
            Role::Admin | Role::Doctor => true,
            Role::Patient => patient.user_id == actor.id,
        }
    }

    pub fn can_write(actor: &User, patient: &Patient) -> bool {
        actor.is_admin() || patient.user_id == actor.id
    }

    /// Patients create their own profile; admins may target any patient account via `user_id`.
    pub async fn create_patient(&self, actor: &User, request: CreatePatientRequest) -> Result<Patient, PatientError> {
        let user_id = match request.user_id {
            Some(target) if target != actor.id && !actor.is_admin() => {
                return Err(PatientError::Forbidden(
                    "Cannot create a patient profile for another user".to_string(),
                ))
            }
            Some(target) => target,
            None => actor.id,
        };
        debug!("Creating patient profile for user {}", user_id);

        if let Some(dob) = request.date_of_birth {
            if dob > Utc::now().date_naive() {
                return Err(PatientError::Validation("Date of birth cannot be in the future".to_string()));
            }
        }

        if user_id != actor.id || actor.role != Role::Patient {
            let path = format!("/rest/v1/users?id=eq.{}&select=role", user_id);
            let rows: Vec<UserRole> = self.supabase.request(Method::GET, &path, None).await?;
            let target = rows.into_iter().next().ok_or(PatientError::UserNotFound)?;
            if target.role != Role::Patient {
                return Err(PatientError::Validation("Target user is not a patient".to_string()));
            }
        }

        if self.find_by_user(user_id).await?.is_some() {
            return Err(PatientError::AlreadyExists);
        }

        let now = Utc::now().to_rfc3339();
        let row = json!({
            "user_id": user_id,
            "date_of_birth": request.date_of_birth,
            "gender": request.gender,
            "blood_group": request.blood_group,
            "emergency_contact": request.emergency_contact,
            "medical_history": request.medical_history,
            "allergies": request.allergies,
            "current_medication": request.current_medication,
            "created_at": now,
            "updated_at": now
        });

        let created: Vec<Patient> = self
            .supabase
            .request_returning(Method::POST, "/rest/v1/patients", row)
            .await?;
        let patient = created
            .into_iter()
            .next()
            .ok_or_else(|| PatientError::Store("Insert returned no rows".to_string()))?;

        info!("Patient profile {} created for user {}", patient.id, user_id);
        Ok(patient)
    }

    pub async fn get_patient(&self, actor: &User, patient_id: Uuid) -> Result<Patient, PatientError> {
        debug!("Fetching patient profile: {}", patient_id);

        let patient = self.fetch(patient_id).await?;
        if !Self::can_read(actor, &patient) {
            return Err(PatientError::Forbidden("Not allowed to view this patient".to_string()));
        }
        Ok(patient)
    }

    pub async fn get_patient_by_user(&self, actor: &User, user_id: Uuid) -> Result<Patient, PatientError> {
        let patient = self.find_by_user(user_id).await?.ok_or(PatientError::NotFound)?;
        if !Self::can_read(actor, &patient) {
            return Err(PatientError::Forbidden("Not allowed to view this patient".to_string()));
        }
        Ok(patient)
    }

    pub async fn update_patient(
        &self,
        actor: &User,
        patient_id: Uuid,
        request: UpdatePatientRequest,
    ) -> Result<Patient, PatientError> {
        let existing = self.fetch(patient_id).await?;
        if !Self::can_write(actor, &existing) {
            return Err(PatientError::Forbidden("Only the profile owner can update it".to_string()));
        }

        let mut update = Map::new();
        if let Some(dob) = request.date_of_birth {
            if dob > Utc::now().date_naive() {
                return Err(PatientError::Validation("Date of birth cannot be in the future".to_string()));
            }
            update.insert("date_of_birth".to_string(), json!(dob));
        }
        let text_fields = [
            ("gender", request.gender),
            ("blood_group", request.blood_group),
            ("emergency_contact", request.emergency_contact),
            ("medical_history", request.medical_history),
            ("allergies", request.allergies),
            ("current_medication", request.current_medication),
        ];
        for (column, value) in text_fields {
            if let Some(value) = value {
                update.insert(column.to_string(), json!(value));
            }
        }

        if update.is_empty() {
            return Ok(existing);
        }
        update.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let rows: Vec<Patient> = self
            .supabase
            .request_returning(Method::PATCH, &path, Value::Object(update))
            .await?;

        rows.into_iter().next().ok_or(PatientError::NotFound)
    }

    pub async fn delete_patient(&self, patient_id: Uuid) -> Result<(), PatientError> {
        self.fetch(patient_id).await?;

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        self.supabase.execute(Method::DELETE, &path, None).await?;

        info!("Patient profile {} deleted", patient_id);
        Ok(())
    }

    async fn fetch(&self, patient_id: Uuid) -> Result<Patient, PatientError> {
        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let rows: Vec<Patient> = self.supabase.request(Method::GET, &path, None).await?;
        rows.into_iter().next().ok_or(PatientError::NotFound)
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Patient>, PatientError> {
        let path = format!("/rest/v1/patients?user_id=eq.{}", user_id);
        let rows: Vec<Patient> = self.supabase.request(Method::GET, &path, None).await?;
        Ok(rows.into_iter().next())
    }
}
