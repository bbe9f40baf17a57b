pub mod attendance;
pub mod auth;
pub mod core;
pub mod courses;
pub mod dashboard;
pub mod events;
pub mod grades;
pub mod materials;
pub mod notifications;
pub mod reports;
pub mod students;
