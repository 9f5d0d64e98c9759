#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use appointment_cell::models::{Appointment, AppointmentError, AppointmentStatus, NewAppointment};
use appointment_cell::services::{
    AppointmentBookingService, AppointmentEvent, AppointmentEventKind, AppointmentNotifier, AppointmentRepository,
    FixedClock,
};
use shared_models::pagination::Pagination;

/// Repository backed by a vector, filtering the same way the store queries do.
#[derive(Default)]
pub struct InMemoryAppointmentRepository {
    appointments: Mutex<Vec<Appointment>>,
    patients: Mutex<HashMap<Uuid, Uuid>>,
    doctors: Mutex<HashMap<Uuid, Uuid>>,
}

impl InMemoryAppointmentRepository {
    /// Registers a patient profile and returns its id.
    pub fn add_patient(&self, user_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        self.patients.lock().unwrap().insert(id, user_id);
        id
    }

    pub fn add_doctor(&self, user_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        self.doctors.lock().unwrap().insert(id, user_id);
        id
    }

    pub fn all(&self) -> Vec<Appointment> {
        self.appointments.lock().unwrap().clone()
    }

    fn page(mut rows: Vec<Appointment>, pagination: Pagination) -> (Vec<Appointment>, i64) {
        rows.sort_by(|a, b| b.scheduled_start.cmp(&a.scheduled_start));
        let total = rows.len() as i64;
        let items = rows
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.limit() as usize)
            .collect();
        (items, total)
    }
}

#[async_trait]
impl AppointmentRepository for InMemoryAppointmentRepository {
    async fn insert(&self, appointment: NewAppointment) -> Result<Appointment, AppointmentError> {
        let now = Utc::now();
        let row = Appointment {
            id: Uuid::new_v4(),
            patient_id: appointment.patient_id,
            doctor_id: appointment.doctor_id,
            scheduled_start: appointment.scheduled_start,
            scheduled_end: appointment.scheduled_end,
            status: appointment.status,
            appointment_type: appointment.appointment_type,
            reason: appointment.reason,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        self.appointments.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self.appointments.lock().unwrap().iter().find(|a| a.id == id).cloned())
    }

    async fn update(&self, appointment: &Appointment) -> Result<Appointment, AppointmentError> {
        let mut rows = self.appointments.lock().unwrap();
        let slot = rows
            .iter_mut()
            .find(|a| a.id == appointment.id)
            .ok_or(AppointmentError::NotFound)?;
        *slot = appointment.clone();
        Ok(slot.clone())
    }

    async fn find_for_doctor_in_range(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        Ok(self
            .appointments
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.doctor_id == doctor_id && a.status != AppointmentStatus::Cancelled)
            .filter(|a| (a.scheduled_start < end && a.scheduled_end > start) || a.scheduled_start == start)
            .cloned()
            .collect())
    }

    async fn list_for_patient(
        &self,
        patient_id: Uuid,
        pagination: Pagination,
    ) -> Result<(Vec<Appointment>, i64), AppointmentError> {
        let rows = self.all().into_iter().filter(|a| a.patient_id == patient_id).collect();
        Ok(Self::page(rows, pagination))
    }

    async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        pagination: Pagination,
    ) -> Result<(Vec<Appointment>, i64), AppointmentError> {
        let rows = self.all().into_iter().filter(|a| a.doctor_id == doctor_id).collect();
        Ok(Self::page(rows, pagination))
    }

    async fn doctor_schedule(
        &self,
        doctor_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut rows: Vec<Appointment> = self
            .all()
            .into_iter()
            .filter(|a| a.doctor_id == doctor_id && a.status != AppointmentStatus::Cancelled)
            .filter(|a| from.map_or(true, |from| a.scheduled_start >= from))
            .filter(|a| to.map_or(true, |to| a.scheduled_start < to))
            .collect();
        rows.sort_by_key(|a| a.scheduled_start);
        Ok(rows)
    }

    async fn doctor_exists(&self, doctor_id: Uuid) -> Result<bool, AppointmentError> {
        Ok(self.doctors.lock().unwrap().contains_key(&doctor_id))
    }

    async fn patient_exists(&self, patient_id: Uuid) -> Result<bool, AppointmentError> {
        Ok(self.patients.lock().unwrap().contains_key(&patient_id))
    }

    async fn patient_id_for_user(&self, user_id: Uuid) -> Result<Option<Uuid>, AppointmentError> {
        Ok(self
            .patients
            .lock()
            .unwrap()
            .iter()
            .find(|(_, owner)| **owner == user_id)
            .map(|(id, _)| *id))
    }

    async fn doctor_id_for_user(&self, user_id: Uuid) -> Result<Option<Uuid>, AppointmentError> {
        Ok(self
            .doctors
            .lock()
            .unwrap()
            .iter()
            .find(|(_, owner)| **owner == user_id)
            .map(|(id, _)| *id))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<AppointmentEvent>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn kinds(&self) -> Vec<AppointmentEventKind> {
        self.events.lock().unwrap().iter().map(|e| e.kind).collect()
    }
}

#[async_trait]
impl AppointmentNotifier for RecordingNotifier {
    async fn notify(&self, event: &AppointmentEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event.clone());
        if self.fail {
            anyhow::bail!("mail relay unavailable");
        }
        Ok(())
    }
}

pub fn monday_9am() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap()
}

/// Booking service wired to in-memory parts, with the clock at Monday 08:00 UTC.
pub struct Harness {
    pub repository: Arc<InMemoryAppointmentRepository>,
    pub clock: Arc<FixedClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub service: AppointmentBookingService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_notifier(RecordingNotifier::default())
    }

    pub fn with_notifier(notifier: RecordingNotifier) -> Self {
        let repository = Arc::new(InMemoryAppointmentRepository::default());
        let clock = Arc::new(FixedClock::new(monday_9am() - chrono::Duration::hours(1)));
        let notifier = Arc::new(notifier);
        let service = AppointmentBookingService::with_components(
            repository.clone(),
            clock.clone(),
            notifier.clone(),
        );
        Self {
            repository,
            clock,
            notifier,
            service,
        }
    }
}
