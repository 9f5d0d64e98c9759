use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::models::{Appointment, AppointmentStatus};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentEventKind {
    Booked,
    Rescheduled,
    Updated,
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl AppointmentEventKind {
    /// Event emitted when an appointment enters `status`.
    pub fn for_status(status: AppointmentStatus) -> Self {
        match status {
            AppointmentStatus::Pending => AppointmentEventKind::Updated,
            AppointmentStatus::Confirmed => AppointmentEventKind::Confirmed,
            AppointmentStatus::Cancelled => AppointmentEventKind::Cancelled,
            AppointmentStatus::Completed => AppointmentEventKind::Completed,
            AppointmentStatus::NoShow => AppointmentEventKind::NoShow,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AppointmentEvent {
    pub kind: AppointmentEventKind,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub occurred_at: DateTime<Utc>,
}

impl AppointmentEvent {
    pub fn new(kind: AppointmentEventKind, appointment: &Appointment, occurred_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            appointment_id: appointment.id,
            patient_id: appointment.patient_id,
            doctor_id: appointment.doctor_id,
            scheduled_start: appointment.scheduled_start,
            scheduled_end: appointment.scheduled_end,
            status: appointment.status,
            occurred_at,
        }
    }
}

/// Outbound channel for appointment events (e-mail, SMS, webhooks).
#[async_trait]
pub trait AppointmentNotifier: Send + Sync {
    async fn notify(&self, event: &AppointmentEvent) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl AppointmentNotifier for LoggingNotifier {
    async fn notify(&self, event: &AppointmentEvent) -> anyhow::Result<()> {
        info!(
            kind = ?event.kind,
            appointment_id = %event.appointment_id,
            patient_id = %event.patient_id,
            doctor_id = %event.doctor_id,
            scheduled_start = %event.scheduled_start,
            "Appointment event"
        );
        Ok(())
    }
}
