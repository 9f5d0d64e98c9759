use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::models::{Appointment, AppointmentError, AppointmentStatus};

/// Time-based scheduling rules.
#[derive(Debug, Clone)]
pub struct SchedulingRules {
    /// Cancelling needs at least this much notice; exactly this much is allowed.
    pub min_cancellation_notice: Duration,
    /// Slot length when a booking omits its end time.
    pub default_duration: Duration,
}

impl Default for SchedulingRules {
    fn default() -> Self {
        Self {
            min_cancellation_notice: Duration::hours(1),
            default_duration: Duration::minutes(30),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppointmentLifecycleService {
    rules: SchedulingRules,
}

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: SchedulingRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &SchedulingRules {
        &self.rules
    }

    /// All statuses reachable in one step from `current_status`.
    pub fn get_valid_transitions(&self, current_status: &AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Pending => vec![AppointmentStatus::Confirmed, AppointmentStatus::Cancelled],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow => vec![],
        }
    }

    pub fn validate_status_transition(
        &self,
        current_status: &AppointmentStatus,
        new_status: &AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.get_valid_transitions(current_status).contains(new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: *current_status,
                to: *new_status,
            });
        }

        Ok(())
    }

    /// Completed, cancelled and no-show appointments are frozen.
    pub fn ensure_modifiable(&self, appointment: &Appointment) -> Result<(), AppointmentError> {
        if appointment.status.is_terminal() {
            return Err(AppointmentError::NotModifiable(appointment.status));
        }
        Ok(())
    }

    /// A window must be non-empty and must not start in the past; starting exactly now is allowed.
    pub fn validate_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        if end <= start {
            return Err(AppointmentError::InvalidTime(
                "end time must be after start time".to_string(),
            ));
        }
        if start < now {
            return Err(AppointmentError::InvalidTime(
                "appointment cannot be scheduled in the past".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_cancellation(&self, appointment: &Appointment, now: DateTime<Utc>) -> Result<(), AppointmentError> {
        self.ensure_modifiable(appointment)?;
        self.validate_status_transition(&appointment.status, &AppointmentStatus::Cancelled)?;

        if appointment.scheduled_start - now < self.rules.min_cancellation_notice {
            return Err(AppointmentError::CancellationTooLate);
        }
        Ok(())
    }

    pub fn validate_confirmation(&self, appointment: &Appointment) -> Result<(), AppointmentError> {
        self.ensure_modifiable(appointment)?;
        self.validate_status_transition(&appointment.status, &AppointmentStatus::Confirmed)
    }

    pub fn validate_completion(&self, appointment: &Appointment, now: DateTime<Utc>) -> Result<(), AppointmentError> {
        self.ensure_modifiable(appointment)?;
        self.validate_status_transition(&appointment.status, &AppointmentStatus::Completed)?;

        if now < appointment.scheduled_start {
            return Err(AppointmentError::CompletionTooEarly);
        }
        Ok(())
    }

    pub fn validate_no_show(&self, appointment: &Appointment, now: DateTime<Utc>) -> Result<(), AppointmentError> {
        self.ensure_modifiable(appointment)?;
        self.validate_status_transition(&appointment.status, &AppointmentStatus::NoShow)?;

        if now < appointment.scheduled_start {
            return Err(AppointmentError::NoShowTooEarly);
        }
        Ok(())
    }

    /// Dispatches a requested status change to the guard for that target status.
    pub fn validate_status_change(
        &self,
        appointment: &Appointment,
        new_status: AppointmentStatus,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        match new_status {
            AppointmentStatus::Cancelled => self.validate_cancellation(appointment, now),
            AppointmentStatus::Confirmed => self.validate_confirmation(appointment),
            AppointmentStatus::Completed => self.validate_completion(appointment, now),
            AppointmentStatus::NoShow => self.validate_no_show(appointment, now),
            AppointmentStatus::Pending => {
                self.ensure_modifiable(appointment)?;
                self.validate_status_transition(&appointment.status, &new_status)
            }
        }
    }
}
