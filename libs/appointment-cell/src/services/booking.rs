use std::sync::Arc;

use chrono::{Duration, NaiveTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{Role, User};
use shared_models::pagination::{PaginatedResponse, Pagination};

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, ConflictCheckQuery, ConflictCheckResponse,
    CreateAppointmentRequest, NewAppointment, ScheduleQuery, ScheduleSlot, UpdateAppointmentRequest,
};
use crate::services::clock::{Clock, SystemClock};
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::notifier::{AppointmentEvent, AppointmentEventKind, AppointmentNotifier, LoggingNotifier};
use crate::services::repository::{AppointmentRepository, SupabaseAppointmentRepository};

/// Caller identity resolved to the profile it acts through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Admin,
    Patient(Uuid),
    Doctor(Uuid),
}

impl Actor {
    /// Participants and admins may see and edit an appointment.
    pub fn can_access(&self, appointment: &Appointment) -> bool {
        match self {
            Actor::Admin => true,
            Actor::Patient(patient_id) => appointment.patient_id == *patient_id,
            Actor::Doctor(doctor_id) => appointment.doctor_id == *doctor_id,
        }
    }

    fn is_clinical(&self) -> bool {
        matches!(self, Actor::Admin | Actor::Doctor(_))
    }
}

pub struct AppointmentBookingService {
    repository: Arc<dyn AppointmentRepository>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn AppointmentNotifier>,
    lifecycle: AppointmentLifecycleService,
    conflicts: ConflictDetectionService,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_components(
            Arc::new(SupabaseAppointmentRepository::new(config)),
            Arc::new(SystemClock),
            Arc::new(LoggingNotifier),
        )
    }

    pub fn with_components(
        repository: Arc<dyn AppointmentRepository>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn AppointmentNotifier>,
    ) -> Self {
        Self {
            conflicts: ConflictDetectionService::new(Arc::clone(&repository)),
            lifecycle: AppointmentLifecycleService::new(),
            repository,
            clock,
            notifier,
        }
    }

    pub async fn actor_for(&self, user: &User) -> Result<Actor, AppointmentError> {
        match user.role {
            Role::Admin => Ok(Actor::Admin),
            Role::Patient => self
                .repository
                .patient_id_for_user(user.id)
                .await?
                .map(Actor::Patient)
                .ok_or_else(|| AppointmentError::Unauthorized("Patient profile required".to_string())),
            Role::Doctor => self
                .repository
                .doctor_id_for_user(user.id)
                .await?
                .map(Actor::Doctor)
                .ok_or_else(|| AppointmentError::Unauthorized("Doctor profile required".to_string())),
        }
    }

    pub async fn book(
        &self,
        actor: &Actor,
        request: CreateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let patient_id = match (actor, request.patient_id) {
            (Actor::Patient(own), Some(requested)) if requested != *own => {
                return Err(AppointmentError::Unauthorized(
                    "Patients can only book appointments for themselves".to_string(),
                ))
            }
            (Actor::Patient(own), _) => *own,
            (Actor::Doctor(own), _) if request.doctor_id != *own => {
                return Err(AppointmentError::Unauthorized(
                    "Doctors can only book appointments on their own schedule".to_string(),
                ))
            }
            (_, Some(requested)) => requested,
            (_, None) => return Err(AppointmentError::ValidationError("patient_id is required".to_string())),
        };

        let now = self.clock.now();
        let start = request.scheduled_start;
        let end = request
            .scheduled_end
            .unwrap_or(start + self.lifecycle.rules().default_duration);

        debug!("Booking doctor {} for patient {} from {} to {}", request.doctor_id, patient_id, start, end);
        self.lifecycle.validate_window(start, end, now)?;

        if !self.repository.doctor_exists(request.doctor_id).await? {
            return Err(AppointmentError::DoctorNotFound);
        }
        if !self.repository.patient_exists(patient_id).await? {
            return Err(AppointmentError::PatientNotFound);
        }

        self.conflicts
            .ensure_slot_free(request.doctor_id, start, end, None)
            .await?;

        let appointment = self
            .repository
            .insert(NewAppointment {
                patient_id,
                doctor_id: request.doctor_id,
                scheduled_start: start,
                scheduled_end: end,
                status: AppointmentStatus::Pending,
                appointment_type: request.appointment_type.unwrap_or_default(),
                reason: request.reason,
            })
            .await?;

        info!("Appointment {} booked with doctor {}", appointment.id, appointment.doctor_id);
        self.emit(AppointmentEventKind::Booked, &appointment).await;
        Ok(appointment)
    }

    pub async fn get(&self, actor: &Actor, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = self
            .repository
            .find_by_id(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound)?;

        if !actor.can_access(&appointment) {
            return Err(AppointmentError::Unauthorized(
                "Not allowed to access this appointment".to_string(),
            ));
        }
        Ok(appointment)
    }

    /// Generic edit: reschedule, change type/reason/notes, or move status.
    pub async fn update(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get(actor, appointment_id).await?;
        self.lifecycle.ensure_modifiable(&current)?;

        if request.status.is_some() && matches!(actor, Actor::Patient(_)) {
            return Err(AppointmentError::Unauthorized(
                "Patients cannot change appointment status".to_string(),
            ));
        }

        let now = self.clock.now();
        let mut updated = current.clone();

        if request.changes_window() {
            let start = request.scheduled_start.unwrap_or(current.scheduled_start);
            let end = match (request.scheduled_end, request.scheduled_start) {
                (Some(end), _) => end,
                (None, Some(start)) => start + current.duration(),
                (None, None) => current.scheduled_end,
            };

            self.lifecycle.validate_window(start, end, now)?;
            self.conflicts
                .ensure_slot_free(current.doctor_id, start, end, Some(current.id))
                .await?;

            updated.scheduled_start = start;
            updated.scheduled_end = end;
        }

        let status_change = request.status.filter(|status| *status != current.status);
        if let Some(status) = status_change {
            self.lifecycle.validate_status_change(&current, status, now)?;
            updated.status = status;
        }

        if let Some(appointment_type) = request.appointment_type {
            updated.appointment_type = appointment_type;
        }
        if request.reason.is_some() {
            updated.reason = request.reason;
        }
        if request.notes.is_some() {
            updated.notes = request.notes;
        }
        updated.updated_at = now;

        let saved = self.repository.update(&updated).await?;

        let kind = match status_change {
            Some(status) => AppointmentEventKind::for_status(status),
            None if saved.scheduled_start != current.scheduled_start
                || saved.scheduled_end != current.scheduled_end =>
            {
                AppointmentEventKind::Rescheduled
            }
            None => AppointmentEventKind::Updated,
        };
        info!("Appointment {} updated ({:?})", saved.id, kind);
        self.emit(kind, &saved).await;
        Ok(saved)
    }

    pub async fn confirm(&self, actor: &Actor, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.ensure_clinical(actor, "confirm")?;
        let appointment = self.get(actor, appointment_id).await?;
        self.lifecycle.validate_confirmation(&appointment)?;
        self.transition(appointment, AppointmentStatus::Confirmed, None).await
    }

    pub async fn cancel(&self, actor: &Actor, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = self.get(actor, appointment_id).await?;
        self.lifecycle.validate_cancellation(&appointment, self.clock.now())?;
        self.transition(appointment, AppointmentStatus::Cancelled, None).await
    }

    pub async fn complete(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        notes: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        self.ensure_clinical(actor, "complete")?;
        let appointment = self.get(actor, appointment_id).await?;
        self.lifecycle.validate_completion(&appointment, self.clock.now())?;
        self.transition(appointment, AppointmentStatus::Completed, notes).await
    }

    pub async fn mark_no_show(&self, actor: &Actor, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.ensure_clinical(actor, "mark a no-show for")?;
        let appointment = self.get(actor, appointment_id).await?;
        self.lifecycle.validate_no_show(&appointment, self.clock.now())?;
        self.transition(appointment, AppointmentStatus::NoShow, None).await
    }

    pub async fn list_for_patient(
        &self,
        actor: &Actor,
        patient_id: Uuid,
        pagination: Pagination,
    ) -> Result<PaginatedResponse<Appointment>, AppointmentError> {
        match actor {
            Actor::Admin => {}
            Actor::Patient(own) if *own == patient_id => {}
            _ => {
                return Err(AppointmentError::Unauthorized(
                    "Not allowed to list this patient's appointments".to_string(),
                ))
            }
        }

        let (items, total) = self.repository.list_for_patient(patient_id, pagination).await?;
        Ok(PaginatedResponse::new(items, total, pagination))
    }

    pub async fn list_for_doctor(
        &self,
        actor: &Actor,
        doctor_id: Uuid,
        pagination: Pagination,
    ) -> Result<PaginatedResponse<Appointment>, AppointmentError> {
        match actor {
            Actor::Admin => {}
            Actor::Doctor(own) if *own == doctor_id => {}
            _ => {
                return Err(AppointmentError::Unauthorized(
                    "Not allowed to list this doctor's appointments".to_string(),
                ))
            }
        }

        let (items, total) = self.repository.list_for_doctor(doctor_id, pagination).await?;
        Ok(PaginatedResponse::new(items, total, pagination))
    }

    /// Busy windows for `doctor_id`; dates are inclusive calendar days in UTC.
    pub async fn doctor_schedule(
        &self,
        doctor_id: Uuid,
        query: ScheduleQuery,
    ) -> Result<Vec<ScheduleSlot>, AppointmentError> {
        if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
            if end < start {
                return Err(AppointmentError::ValidationError(
                    "end_date must not be before start_date".to_string(),
                ));
            }
        }

        if !self.repository.doctor_exists(doctor_id).await? {
            return Err(AppointmentError::DoctorNotFound);
        }

        let from = query.start_date.map(|day| day.and_time(NaiveTime::MIN).and_utc());
        let to = query
            .end_date
            .map(|day| day.and_time(NaiveTime::MIN).and_utc() + Duration::days(1));

        let appointments = self.repository.doctor_schedule(doctor_id, from, to).await?;
        Ok(appointments
            .iter()
            .filter(|appointment| appointment.status != AppointmentStatus::Cancelled)
            .map(ScheduleSlot::from)
            .collect())
    }

    pub async fn check_conflicts(&self, query: ConflictCheckQuery) -> Result<ConflictCheckResponse, AppointmentError> {
        let end = query
            .end_time
            .unwrap_or(query.start_time + self.lifecycle.rules().default_duration);
        if end <= query.start_time {
            return Err(AppointmentError::InvalidTime(
                "end time must be after start time".to_string(),
            ));
        }

        self.conflicts
            .check_conflicts(query.doctor_id, query.start_time, end, query.exclude_appointment_id)
            .await
    }

    fn ensure_clinical(&self, actor: &Actor, action: &str) -> Result<(), AppointmentError> {
        if actor.is_clinical() {
            Ok(())
        } else {
            Err(AppointmentError::Unauthorized(format!(
                "Only doctors and admins can {} appointments",
                action
            )))
        }
    }

    async fn transition(
        &self,
        mut appointment: Appointment,
        status: AppointmentStatus,
        notes: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let from = appointment.status;
        appointment.status = status;
        if notes.is_some() {
            appointment.notes = notes;
        }
        appointment.updated_at = self.clock.now();

        let saved = self.repository.update(&appointment).await?;
        info!("Appointment {} moved from {} to {}", saved.id, from, saved.status);
        self.emit(AppointmentEventKind::for_status(status), &saved).await;
        Ok(saved)
    }

    async fn emit(&self, kind: AppointmentEventKind, appointment: &Appointment) {
        let event = AppointmentEvent::new(kind, appointment, self.clock.now());
        if let Err(e) = self.notifier.notify(&event).await {
            warn!("Failed to deliver {:?} event for appointment {}: {}", kind, appointment.id, e);
        }
    }
}
