pub mod email;
pub mod sms;

pub use email::{EmailService, WorkflowFailureNotice};
pub use sms::SmsService;
