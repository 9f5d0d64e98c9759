pub mod booking;
pub mod clock;
pub mod conflict;
pub mod lifecycle;
pub mod notifier;
pub mod repository;

pub use booking::{Actor, AppointmentBookingService};
pub use clock::{Clock, FixedClock, SystemClock};
pub use conflict::ConflictDetectionService;
pub use lifecycle::{AppointmentLifecycleService, SchedulingRules};
pub use notifier::{AppointmentEvent, AppointmentEventKind, AppointmentNotifier, LoggingNotifier};
pub use repository::{AppointmentRepository, SupabaseAppointmentRepository};
