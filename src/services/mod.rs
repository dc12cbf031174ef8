pub mod assistant;
pub mod auth;
pub mod google_calendar;
pub mod http_retry;
pub mod identity;
pub mod init;
pub mod reconciler;
pub mod schedule;
