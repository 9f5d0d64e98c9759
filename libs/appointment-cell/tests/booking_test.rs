mod common;

use assert_matches::assert_matches;
use chrono::{Duration, NaiveDate};
use uuid::Uuid;

use appointment_cell::models::{
    AppointmentError, AppointmentStatus, ConflictCheckQuery, CreateAppointmentRequest, ScheduleQuery,
    UpdateAppointmentRequest,
};
use appointment_cell::services::conflict::windows_overlap;
use appointment_cell::services::{Actor, AppointmentEventKind};
use common::{monday_9am, Harness, RecordingNotifier};
use shared_models::auth::{Role, User};
use shared_models::pagination::Pagination;

struct Clinic {
    harness: Harness,
    patient: Uuid,
    doctor: Uuid,
}

impl Clinic {
    fn new() -> Self {
        Self::with_harness(Harness::new())
    }

    fn with_harness(harness: Harness) -> Self {
        let patient = harness.repository.add_patient(Uuid::new_v4());
        let doctor = harness.repository.add_doctor(Uuid::new_v4());
        Self { harness, patient, doctor }
    }

    fn request(&self, offset_minutes: i64, length_minutes: Option<i64>) -> CreateAppointmentRequest {
        let start = monday_9am() + Duration::minutes(offset_minutes);
        CreateAppointmentRequest {
            patient_id: None,
            doctor_id: self.doctor,
            scheduled_start: start,
            scheduled_end: length_minutes.map(|m| start + Duration::minutes(m)),
            appointment_type: None,
            reason: Some("Follow-up".to_string()),
        }
    }

    fn as_patient(&self) -> Actor {
        Actor::Patient(self.patient)
    }

    fn as_doctor(&self) -> Actor {
        Actor::Doctor(self.doctor)
    }
}

#[tokio::test]
async fn booking_defaults_to_a_pending_half_hour_slot() {
    let clinic = Clinic::new();

    let appointment = clinic
        .harness
        .service
        .book(&clinic.as_patient(), clinic.request(0, None))
        .await
        .unwrap();

    assert_eq!(appointment.status, AppointmentStatus::Pending);
    assert_eq!(appointment.patient_id, clinic.patient);
    assert_eq!(appointment.duration(), Duration::minutes(30));
    assert_eq!(clinic.harness.notifier.kinds(), vec![AppointmentEventKind::Booked]);
}

#[tokio::test]
async fn overlapping_and_same_start_bookings_are_rejected() {
    let clinic = Clinic::new();
    let service = &clinic.harness.service;
    let actor = clinic.as_patient();

    service.book(&actor, clinic.request(0, Some(30))).await.unwrap();

    assert_matches!(
        service.book(&actor, clinic.request(15, Some(30))).await,
        Err(AppointmentError::ConflictDetected)
    );
    assert_matches!(
        service.book(&actor, clinic.request(0, Some(10))).await,
        Err(AppointmentError::ConflictDetected)
    );
    assert_matches!(
        service.book(&actor, clinic.request(-15, Some(60))).await,
        Err(AppointmentError::ConflictDetected)
    );

    // Back-to-back slots share only an endpoint.
    service.book(&actor, clinic.request(30, Some(30))).await.unwrap();
    service.book(&actor, clinic.request(-30, Some(30))).await.unwrap();
}

#[tokio::test]
async fn other_doctors_are_independent() {
    let clinic = Clinic::new();
    let other_doctor = clinic.harness.repository.add_doctor(Uuid::new_v4());
    let service = &clinic.harness.service;

    service.book(&clinic.as_patient(), clinic.request(0, Some(30))).await.unwrap();

    let mut request = clinic.request(0, Some(30));
    request.doctor_id = other_doctor;
    service.book(&clinic.as_patient(), request).await.unwrap();
}

#[tokio::test]
async fn cancelled_slots_can_be_rebooked() {
    let clinic = Clinic::new();
    let service = &clinic.harness.service;

    let first = service.book(&clinic.as_patient(), clinic.request(0, Some(30))).await.unwrap();
    service.cancel(&clinic.as_patient(), first.id).await.unwrap();

    let second = service.book(&clinic.as_patient(), clinic.request(0, Some(30))).await.unwrap();
    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn booked_appointments_never_overlap() {
    let clinic = Clinic::new();
    let service = &clinic.harness.service;
    let actor = clinic.as_doctor();

    for (offset, length) in [(0, 30), (10, 20), (25, 45), (30, 15), (45, 30), (44, 2), (75, 60), (100, 5), (135, 30)] {
        let mut request = clinic.request(offset, Some(length));
        request.patient_id = Some(clinic.patient);
        let _ = service.book(&actor, request).await;
    }

    let booked: Vec<_> = clinic
        .harness
        .repository
        .all()
        .into_iter()
        .filter(|a| a.status != AppointmentStatus::Cancelled)
        .collect();
    assert!(booked.len() >= 4);

    for (i, a) in booked.iter().enumerate() {
        for b in booked.iter().skip(i + 1) {
            assert!(
                !windows_overlap(a.scheduled_start, a.scheduled_end, b.scheduled_start, b.scheduled_end),
                "{} overlaps {}",
                a.id,
                b.id
            );
        }
    }
}

#[tokio::test]
async fn invalid_windows_are_rejected() {
    let clinic = Clinic::new();
    let service = &clinic.harness.service;

    assert_matches!(
        service.book(&clinic.as_patient(), clinic.request(-120, Some(30))).await,
        Err(AppointmentError::InvalidTime(_))
    );
    assert_matches!(
        service.book(&clinic.as_patient(), clinic.request(0, Some(0))).await,
        Err(AppointmentError::InvalidTime(_))
    );
    assert_matches!(
        service.book(&clinic.as_patient(), clinic.request(0, Some(-15))).await,
        Err(AppointmentError::InvalidTime(_))
    );
    assert!(clinic.harness.repository.all().is_empty());
}

#[tokio::test]
async fn unknown_doctor_or_patient_is_not_found() {
    let clinic = Clinic::new();
    let service = &clinic.harness.service;

    let mut request = clinic.request(0, None);
    request.doctor_id = Uuid::new_v4();
    assert_matches!(
        service.book(&clinic.as_patient(), request).await,
        Err(AppointmentError::DoctorNotFound)
    );

    let mut request = clinic.request(0, None);
    request.patient_id = Some(Uuid::new_v4());
    assert_matches!(
        service.book(&Actor::Admin, request).await,
        Err(AppointmentError::PatientNotFound)
    );
}

#[tokio::test]
async fn booking_on_behalf_of_others() {
    let clinic = Clinic::new();
    let service = &clinic.harness.service;

    assert_matches!(
        service.book(&Actor::Admin, clinic.request(0, None)).await,
        Err(AppointmentError::ValidationError(_))
    );

    let mut for_someone_else = clinic.request(0, None);
    for_someone_else.patient_id = Some(Uuid::new_v4());
    assert_matches!(
        service.book(&clinic.as_patient(), for_someone_else).await,
        Err(AppointmentError::Unauthorized(_))
    );

    let mut other_schedule = clinic.request(0, None);
    other_schedule.patient_id = Some(clinic.patient);
    assert_matches!(
        service.book(&Actor::Doctor(Uuid::new_v4()), other_schedule).await,
        Err(AppointmentError::Unauthorized(_))
    );

    let mut by_admin = clinic.request(0, None);
    by_admin.patient_id = Some(clinic.patient);
    let booked = service.book(&Actor::Admin, by_admin).await.unwrap();
    assert_eq!(booked.patient_id, clinic.patient);
}

#[tokio::test]
async fn cancellation_needs_an_hour_of_notice() {
    let clinic = Clinic::new();
    let service = &clinic.harness.service;

    // Clock sits at 08:00, so a 09:00 slot has exactly one hour left.
    let on_the_hour = service.book(&clinic.as_patient(), clinic.request(0, None)).await.unwrap();
    let later = service.book(&clinic.as_patient(), clinic.request(60, None)).await.unwrap();

    let cancelled = service.cancel(&clinic.as_patient(), on_the_hour.id).await.unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);

    clinic.harness.clock.advance(Duration::minutes(61));
    assert_matches!(
        service.cancel(&clinic.as_patient(), later.id).await,
        Err(AppointmentError::CancellationTooLate)
    );
}

#[tokio::test]
async fn completion_waits_for_the_scheduled_start() {
    let clinic = Clinic::new();
    let service = &clinic.harness.service;

    let appointment = service.book(&clinic.as_patient(), clinic.request(0, None)).await.unwrap();
    service.confirm(&clinic.as_doctor(), appointment.id).await.unwrap();

    assert_matches!(
        service.complete(&clinic.as_doctor(), appointment.id, None).await,
        Err(AppointmentError::CompletionTooEarly)
    );
    assert_matches!(
        service.mark_no_show(&clinic.as_doctor(), appointment.id).await,
        Err(AppointmentError::NoShowTooEarly)
    );

    clinic.harness.clock.set(monday_9am());
    let completed = service
        .complete(&clinic.as_doctor(), appointment.id, Some("Blood pressure normal".to_string()))
        .await
        .unwrap();

    assert_eq!(completed.status, AppointmentStatus::Completed);
    assert_eq!(completed.notes.as_deref(), Some("Blood pressure normal"));
    assert_eq!(
        clinic.harness.notifier.kinds(),
        vec![
            AppointmentEventKind::Booked,
            AppointmentEventKind::Confirmed,
            AppointmentEventKind::Completed
        ]
    );
}

#[tokio::test]
async fn terminal_appointments_reject_changes() {
    let clinic = Clinic::new();
    let service = &clinic.harness.service;

    let appointment = service.book(&clinic.as_patient(), clinic.request(0, None)).await.unwrap();
    service.confirm(&clinic.as_doctor(), appointment.id).await.unwrap();
    clinic.harness.clock.set(monday_9am() + Duration::minutes(5));
    service.mark_no_show(&clinic.as_doctor(), appointment.id).await.unwrap();

    assert_matches!(
        service
            .update(
                &clinic.as_doctor(),
                appointment.id,
                UpdateAppointmentRequest {
                    status: Some(AppointmentStatus::Completed),
                    ..Default::default()
                },
            )
            .await,
        Err(AppointmentError::NotModifiable(AppointmentStatus::NoShow))
    );
    assert_matches!(
        service.cancel(&Actor::Admin, appointment.id).await,
        Err(AppointmentError::NotModifiable(_))
    );
    assert_matches!(
        service
            .update(
                &Actor::Admin,
                appointment.id,
                UpdateAppointmentRequest {
                    notes: Some("late edit".to_string()),
                    ..Default::default()
                },
            )
            .await,
        Err(AppointmentError::NotModifiable(_))
    );
}

#[tokio::test]
async fn pending_cannot_jump_to_completed() {
    let clinic = Clinic::new();
    let service = &clinic.harness.service;

    let appointment = service.book(&clinic.as_patient(), clinic.request(0, None)).await.unwrap();
    clinic.harness.clock.set(monday_9am() + Duration::minutes(10));

    assert_matches!(
        service.complete(&clinic.as_doctor(), appointment.id, None).await,
        Err(AppointmentError::InvalidStatusTransition {
            from: AppointmentStatus::Pending,
            to: AppointmentStatus::Completed
        })
    );
}

#[tokio::test]
async fn rescheduling_ignores_the_appointment_itself() {
    let clinic = Clinic::new();
    let service = &clinic.harness.service;

    let appointment = service.book(&clinic.as_patient(), clinic.request(0, Some(45))).await.unwrap();

    let moved = service
        .update(
            &clinic.as_patient(),
            appointment.id,
            UpdateAppointmentRequest {
                scheduled_start: Some(monday_9am() + Duration::minutes(15)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(moved.scheduled_start, monday_9am() + Duration::minutes(15));
    assert_eq!(moved.duration(), Duration::minutes(45));
    assert_eq!(
        clinic.harness.notifier.kinds().last(),
        Some(&AppointmentEventKind::Rescheduled)
    );
}

#[tokio::test]
async fn rescheduling_into_another_booking_conflicts() {
    let clinic = Clinic::new();
    let service = &clinic.harness.service;

    let first = service.book(&clinic.as_patient(), clinic.request(0, None)).await.unwrap();
    service.book(&clinic.as_patient(), clinic.request(60, None)).await.unwrap();

    assert_matches!(
        service
            .update(
                &clinic.as_patient(),
                first.id,
                UpdateAppointmentRequest {
                    scheduled_start: Some(monday_9am() + Duration::minutes(45)),
                    ..Default::default()
                },
            )
            .await,
        Err(AppointmentError::ConflictDetected)
    );
}

#[tokio::test]
async fn patients_cannot_set_status_or_touch_other_appointments() {
    let clinic = Clinic::new();
    let service = &clinic.harness.service;
    let stranger = Actor::Patient(clinic.harness.repository.add_patient(Uuid::new_v4()));

    let appointment = service.book(&clinic.as_patient(), clinic.request(0, None)).await.unwrap();

    assert_matches!(
        service
            .update(
                &clinic.as_patient(),
                appointment.id,
                UpdateAppointmentRequest {
                    status: Some(AppointmentStatus::Confirmed),
                    ..Default::default()
                },
            )
            .await,
        Err(AppointmentError::Unauthorized(_))
    );
    assert_matches!(
        service.get(&stranger, appointment.id).await,
        Err(AppointmentError::Unauthorized(_))
    );
    assert_matches!(
        service.confirm(&clinic.as_patient(), appointment.id).await,
        Err(AppointmentError::Unauthorized(_))
    );
    assert_matches!(
        service.confirm(&Actor::Doctor(Uuid::new_v4()), appointment.id).await,
        Err(AppointmentError::Unauthorized(_))
    );
}

#[tokio::test]
async fn doctors_move_status_through_the_generic_update() {
    let clinic = Clinic::new();
    let service = &clinic.harness.service;

    let appointment = service.book(&clinic.as_patient(), clinic.request(0, None)).await.unwrap();
    let confirmed = service
        .update(
            &clinic.as_doctor(),
            appointment.id,
            UpdateAppointmentRequest {
                status: Some(AppointmentStatus::Confirmed),
                reason: Some("Annual review".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
    assert_eq!(confirmed.reason.as_deref(), Some("Annual review"));
    assert_eq!(clinic.harness.notifier.kinds().last(), Some(&AppointmentEventKind::Confirmed));
}

#[tokio::test]
async fn notifier_failures_do_not_fail_requests() {
    let clinic = Clinic::with_harness(Harness::with_notifier(RecordingNotifier::failing()));

    let appointment = clinic
        .harness
        .service
        .book(&clinic.as_patient(), clinic.request(0, None))
        .await
        .unwrap();

    assert_eq!(clinic.harness.repository.all().len(), 1);
    assert_eq!(appointment.status, AppointmentStatus::Pending);
    assert_eq!(clinic.harness.notifier.kinds(), vec![AppointmentEventKind::Booked]);
}

#[tokio::test]
async fn schedule_covers_inclusive_days() {
    let clinic = Clinic::new();
    let service = &clinic.harness.service;

    service.book(&clinic.as_patient(), clinic.request(0, None)).await.unwrap();
    service.book(&clinic.as_patient(), clinic.request(14 * 60, None)).await.unwrap();
    let cancelled = service.book(&clinic.as_patient(), clinic.request(120, None)).await.unwrap();
    service.cancel(&clinic.as_patient(), cancelled.id).await.unwrap();
    service.book(&clinic.as_patient(), clinic.request(2 * 24 * 60, None)).await.unwrap();

    let monday = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
    let slots = service
        .doctor_schedule(
            clinic.doctor,
            ScheduleQuery {
                start_date: Some(monday),
                end_date: Some(monday),
            },
        )
        .await
        .unwrap();
    assert_eq!(slots.len(), 2);
    assert!(slots[0].scheduled_start < slots[1].scheduled_start);

    let everything = service.doctor_schedule(clinic.doctor, ScheduleQuery::default()).await.unwrap();
    assert_eq!(everything.len(), 3);

    assert_matches!(
        service
            .doctor_schedule(
                clinic.doctor,
                ScheduleQuery {
                    start_date: Some(monday),
                    end_date: monday.pred_opt(),
                },
            )
            .await,
        Err(AppointmentError::ValidationError(_))
    );
    assert_matches!(
        service.doctor_schedule(Uuid::new_v4(), ScheduleQuery::default()).await,
        Err(AppointmentError::DoctorNotFound)
    );
}

#[tokio::test]
async fn conflict_check_reports_blocking_appointments() {
    let clinic = Clinic::new();
    let service = &clinic.harness.service;

    let existing = service.book(&clinic.as_patient(), clinic.request(0, Some(60))).await.unwrap();

    let report = service
        .check_conflicts(ConflictCheckQuery {
            doctor_id: clinic.doctor,
            start_time: monday_9am() + Duration::minutes(30),
            end_time: None,
            exclude_appointment_id: None,
        })
        .await
        .unwrap();
    assert!(report.has_conflict);
    assert_eq!(report.conflicting_appointments[0].id, existing.id);

    let own = service
        .check_conflicts(ConflictCheckQuery {
            doctor_id: clinic.doctor,
            start_time: monday_9am(),
            end_time: Some(monday_9am() + Duration::minutes(60)),
            exclude_appointment_id: Some(existing.id),
        })
        .await
        .unwrap();
    assert!(!own.has_conflict);

    assert_matches!(
        service
            .check_conflicts(ConflictCheckQuery {
                doctor_id: clinic.doctor,
                start_time: monday_9am(),
                end_time: Some(monday_9am()),
                exclude_appointment_id: None,
            })
            .await,
        Err(AppointmentError::InvalidTime(_))
    );
}

#[tokio::test]
async fn listings_are_paged_and_restricted_to_owners() {
    let clinic = Clinic::new();
    let service = &clinic.harness.service;

    for hour in 0..3 {
        service
            .book(&clinic.as_patient(), clinic.request(hour * 60, None))
            .await
            .unwrap();
    }

    let page = service
        .list_for_patient(&clinic.as_patient(), clinic.patient, Pagination::new(1, 2))
        .await
        .unwrap();
    assert_eq!(page.total_count, 3);
    assert_eq!(page.items.len(), 2);
    assert!(page.items[0].scheduled_start > page.items[1].scheduled_start);

    let doctor_page = service
        .list_for_doctor(&clinic.as_doctor(), clinic.doctor, Pagination::new(2, 2))
        .await
        .unwrap();
    assert_eq!(doctor_page.items.len(), 1);

    assert_matches!(
        service
            .list_for_patient(&clinic.as_doctor(), clinic.patient, Pagination::default())
            .await,
        Err(AppointmentError::Unauthorized(_))
    );
    assert_matches!(
        service
            .list_for_doctor(&clinic.as_patient(), clinic.doctor, Pagination::default())
            .await,
        Err(AppointmentError::Unauthorized(_))
    );
    assert!(service
        .list_for_doctor(&Actor::Admin, clinic.doctor, Pagination::default())
        .await
        .is_ok());
}

#[tokio::test]
async fn actors_resolve_through_profiles() {
    let harness = Harness::new();
    let patient_user = Uuid::new_v4();
    let patient_id = harness.repository.add_patient(patient_user);

    let user = |id: Uuid, role: Role| User {
        id,
        email: None,
        role,
        created_at: None,
    };

    assert_eq!(
        harness.service.actor_for(&user(patient_user, Role::Patient)).await.unwrap(),
        Actor::Patient(patient_id)
    );
    assert_eq!(
        harness.service.actor_for(&user(Uuid::new_v4(), Role::Admin)).await.unwrap(),
        Actor::Admin
    );
    assert_matches!(
        harness.service.actor_for(&user(Uuid::new_v4(), Role::Doctor)).await,
        Err(AppointmentError::Unauthorized(_))
    );
}
