pub mod message;
pub mod status;
pub mod submission;
