pub mod checkin;
pub mod claude;
pub mod plan;
pub mod twilio;
