pub mod assistant;
pub mod auth;
pub mod calendar;
pub mod coordination;
pub mod events;
pub mod health;
pub mod todos;
