pub mod account;
pub mod mailer;
pub mod password;
pub mod totp;

pub use account::AccountService;
pub use mailer::{AccountMailer, LoggingMailer};
pub use password::PasswordService;
