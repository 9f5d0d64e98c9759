use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, ConflictCheckResponse};
use crate::services::repository::AppointmentRepository;

/// Half-open `[start, end)` intersection test.
pub fn windows_overlap(
    start1: DateTime<Utc>,
    end1: DateTime<Utc>,
    start2: DateTime<Utc>,
    end2: DateTime<Utc>,
) -> bool {
    start1 < end2 && start2 < end1
}

/// Whether `existing` blocks a proposed `[start, end)` window on the same doctor.
/// Identical start times always collide, whatever the durations.
pub fn blocks_window(existing: &Appointment, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    if existing.status == AppointmentStatus::Cancelled {
        return false;
    }

    windows_overlap(existing.scheduled_start, existing.scheduled_end, start, end)
        || existing.scheduled_start == start
}

pub struct ConflictDetectionService {
    repository: Arc<dyn AppointmentRepository>,
}

impl ConflictDetectionService {
    pub fn new(repository: Arc<dyn AppointmentRepository>) -> Self {
        Self { repository }
    }

    /// Filters `candidates` down to the appointments that block `[start, end)`.
    pub fn find_conflicts(
        candidates: Vec<Appointment>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Vec<Appointment> {
        candidates
            .into_iter()
            .filter(|existing| Some(existing.id) != exclude_appointment_id)
            .filter(|existing| blocks_window(existing, start, end))
            .collect()
    }

    pub async fn check_conflicts(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        debug!("Checking conflicts for doctor {} from {} to {}", doctor_id, start, end);

        let candidates = self
            .repository
            .find_for_doctor_in_range(doctor_id, start, end)
            .await?;
        let conflicting_appointments = Self::find_conflicts(candidates, start, end, exclude_appointment_id);

        let has_conflict = !conflicting_appointments.is_empty();
        if has_conflict {
            warn!(
                "Conflict detected for doctor {} - {} conflicting appointments",
                doctor_id,
                conflicting_appointments.len()
            );
        }

        Ok(ConflictCheckResponse {
            has_conflict,
            conflicting_appointments,
        })
    }

    pub async fn ensure_slot_free(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<(), AppointmentError> {
        let response = self
            .check_conflicts(doctor_id, start, end, exclude_appointment_id)
            .await?;

        if response.has_conflict {
            Err(AppointmentError::ConflictDetected)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, hour, minute, 0).unwrap()
    }

    fn appointment(start: DateTime<Utc>, minutes: i64, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            scheduled_start: start,
            scheduled_end: start + Duration::minutes(minutes),
            status,
            appointment_type: Default::default(),
            reason: None,
            notes: None,
            created_at: at(0, 0),
            updated_at: at(0, 0),
        }
    }

    #[test]
    fn adjacent_windows_do_not_overlap() {
        assert!(!windows_overlap(at(9, 0), at(9, 30), at(9, 30), at(10, 0)));
        assert!(!windows_overlap(at(9, 30), at(10, 0), at(9, 0), at(9, 30)));
    }

    #[test]
    fn partial_and_nested_windows_overlap() {
        assert!(windows_overlap(at(9, 0), at(9, 30), at(9, 15), at(9, 45)));
        assert!(windows_overlap(at(9, 0), at(10, 0), at(9, 15), at(9, 30)));
        assert!(windows_overlap(at(9, 15), at(9, 30), at(9, 0), at(10, 0)));
    }

    #[test]
    fn cancelled_appointments_never_block() {
        let cancelled = appointment(at(9, 0), 30, AppointmentStatus::Cancelled);
        assert!(!blocks_window(&cancelled, at(9, 0), at(9, 30)));
    }

    #[test]
    fn every_other_status_blocks() {
        for status in [
            AppointmentStatus::Pending,
            AppointmentStatus::Confirmed,
            AppointmentStatus::Completed,
            AppointmentStatus::NoShow,
        ] {
            let existing = appointment(at(9, 0), 30, status);
            assert!(blocks_window(&existing, at(9, 10), at(9, 40)), "{} should block", status);
        }
    }

    #[test]
    fn same_start_blocks_even_for_degenerate_rows() {
        let mut existing = appointment(at(9, 0), 30, AppointmentStatus::Pending);
        existing.scheduled_end = existing.scheduled_start;
        assert!(blocks_window(&existing, at(9, 0), at(9, 15)));
    }

    #[test]
    fn find_conflicts_skips_the_excluded_appointment() {
        let own = appointment(at(9, 0), 30, AppointmentStatus::Confirmed);
        let other = appointment(at(9, 20), 30, AppointmentStatus::Pending);
        let far = appointment(at(11, 0), 30, AppointmentStatus::Pending);
        let own_id = own.id;
        let other_id = other.id;

        let conflicts = ConflictDetectionService::find_conflicts(
            vec![own, other, far],
            at(9, 0),
            at(9, 30),
            Some(own_id),
        );

        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].id, other_id);
    }
}
