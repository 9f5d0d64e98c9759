use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{SupabaseClient, SupabaseError};
use shared_models::pagination::Pagination;

use crate::models::{Appointment, AppointmentError, NewAppointment};

/// Persistence boundary of the scheduling engine.
#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    async fn insert(&self, appointment: NewAppointment) -> Result<Appointment, AppointmentError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>, AppointmentError>;

    /// Persists the mutable fields (window, status, type, reason, notes).
    async fn update(&self, appointment: &Appointment) -> Result<Appointment, AppointmentError>;

    /// Non-cancelled appointments of `doctor_id` that overlap `[start, end)` or begin exactly at `start`.
    async fn find_for_doctor_in_range(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    async fn list_for_patient(
        &self,
        patient_id: Uuid,
        pagination: Pagination,
    ) -> Result<(Vec<Appointment>, i64), AppointmentError>;

    async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        pagination: Pagination,
    ) -> Result<(Vec<Appointment>, i64), AppointmentError>;

    /// Non-cancelled appointments starting in `[from, to)`, ordered by start.
    async fn doctor_schedule(
        &self,
        doctor_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    async fn doctor_exists(&self, doctor_id: Uuid) -> Result<bool, AppointmentError>;

    async fn patient_exists(&self, patient_id: Uuid) -> Result<bool, AppointmentError>;

    async fn patient_id_for_user(&self, user_id: Uuid) -> Result<Option<Uuid>, AppointmentError>;

    async fn doctor_id_for_user(&self, user_id: Uuid) -> Result<Option<Uuid>, AppointmentError>;
}

#[derive(Deserialize)]
struct IdRow {
    id: Uuid,
}

/// Formats an instant for a PostgREST filter value, keeping any sub-second part.
pub fn filter_timestamp(at: DateTime<Utc>) -> String {
    urlencoding::encode(&at.to_rfc3339_opts(SecondsFormat::AutoSi, true)).into_owned()
}

fn store_error(err: SupabaseError) -> AppointmentError {
    match err {
        // Raised by the overlap exclusion constraint.
        SupabaseError::Conflict(_) => AppointmentError::ConflictDetected,
        other => {
            error!("Appointment store failure: {}", other);
            AppointmentError::DatabaseError(other.to_string())
        }
    }
}

pub struct SupabaseAppointmentRepository {
    supabase: SupabaseClient,
}

impl SupabaseAppointmentRepository {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    async fn first_id(&self, path: &str) -> Result<Option<Uuid>, AppointmentError> {
        let rows: Vec<IdRow> = self
            .supabase
            .request(Method::GET, path, None)
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().next().map(|row| row.id))
    }

    async fn paged(&self, filter: &str, pagination: Pagination) -> Result<(Vec<Appointment>, i64), AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?{}&order=scheduled_start.desc&limit={}&offset={}",
            filter,
            pagination.limit(),
            pagination.offset()
        );
        self.supabase
            .request_with_count::<Appointment>(&path)
            .await
            .map_err(store_error)
    }
}

#[async_trait]
impl AppointmentRepository for SupabaseAppointmentRepository {
    async fn insert(&self, appointment: NewAppointment) -> Result<Appointment, AppointmentError> {
        let now = Utc::now();
        let body = json!({
            "patient_id": appointment.patient_id,
            "doctor_id": appointment.doctor_id,
            "scheduled_start": appointment.scheduled_start,
            "scheduled_end": appointment.scheduled_end,
            "status": appointment.status,
            "appointment_type": appointment.appointment_type,
            "reason": appointment.reason,
            "created_at": now,
            "updated_at": now
        });

        let rows: Vec<Appointment> = self
            .supabase
            .request_returning(Method::POST, "/rest/v1/appointments", body)
            .await
            .map_err(store_error)?;

        rows.into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError("Insert returned no rows".to_string()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", id);
        let rows: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().next())
    }

    async fn update(&self, appointment: &Appointment) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment.id);
        let body = json!({
            "scheduled_start": appointment.scheduled_start,
            "scheduled_end": appointment.scheduled_end,
            "status": appointment.status,
            "appointment_type": appointment.appointment_type,
            "reason": appointment.reason,
            "notes": appointment.notes,
            "updated_at": appointment.updated_at
        });

        let rows: Vec<Appointment> = self
            .supabase
            .request_returning(Method::PATCH, &path, body)
            .await
            .map_err(store_error)?;

        rows.into_iter().next().ok_or(AppointmentError::NotFound)
    }

    async fn find_for_doctor_in_range(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let start = filter_timestamp(start);
        let end = filter_timestamp(end);
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&status=neq.cancelled\
             &or=(and(scheduled_start.lt.{end},scheduled_end.gt.{start}),scheduled_start.eq.{start})\
             &order=scheduled_start.asc",
            doctor_id,
            start = start,
            end = end,
        );
        debug!("Loading candidate conflicts for doctor {}", doctor_id);

        self.supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(store_error)
    }

    async fn list_for_patient(
        &self,
        patient_id: Uuid,
        pagination: Pagination,
    ) -> Result<(Vec<Appointment>, i64), AppointmentError> {
        self.paged(&format!("patient_id=eq.{}", patient_id), pagination).await
    }

    async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        pagination: Pagination,
    ) -> Result<(Vec<Appointment>, i64), AppointmentError> {
        self.paged(&format!("doctor_id=eq.{}", doctor_id), pagination).await
    }

    async fn doctor_schedule(
        &self,
        doctor_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&status=neq.cancelled&order=scheduled_start.asc",
            doctor_id
        );
        if let Some(from) = from {
            path.push_str(&format!("&scheduled_start=gte.{}", filter_timestamp(from)));
        }
        if let Some(to) = to {
            path.push_str(&format!("&scheduled_start=lt.{}", filter_timestamp(to)));
        }

        self.supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(store_error)
    }

    async fn doctor_exists(&self, doctor_id: Uuid) -> Result<bool, AppointmentError> {
        let path = format!("/rest/v1/doctors?id=eq.{}&select=id", doctor_id);
        Ok(self.first_id(&path).await?.is_some())
    }

    async fn patient_exists(&self, patient_id: Uuid) -> Result<bool, AppointmentError> {
        let path = format!("/rest/v1/patients?id=eq.{}&select=id", patient_id);
        Ok(self.first_id(&path).await?.is_some())
    }

    async fn patient_id_for_user(&self, user_id: Uuid) -> Result<Option<Uuid>, AppointmentError> {
        let path = format!("/rest/v1/patients?user_id=eq.{}&select=id", user_id);
        self.first_id(&path).await
    }

    async fn doctor_id_for_user(&self, user_id: Uuid) -> Result<Option<Uuid>, AppointmentError> {
        let path = format!("/rest/v1/doctors?user_id=eq.{}&select=id", user_id);
        self.first_id(&path).await
    }
}
