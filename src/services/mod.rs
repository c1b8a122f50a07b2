pub mod auth;
pub mod reservation;
