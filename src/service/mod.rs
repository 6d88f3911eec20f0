//! In-process services sitting directly on top of the State Store: the
//! Submission API and Callback Intake. Neither is an
//! HTTP surface — request routing and institution auth are out of scope
//! and are expected to call straight into these types.

pub mod callback_intake;
pub mod notify;
pub mod submission;

pub use callback_intake::CallbackIntake;
pub use submission::SubmissionApi;
