pub mod booking;
pub mod movie;
pub mod show;
pub mod user;

pub use booking::{Booking, BookingStatus};
pub use movie::Movie;
pub use show::Show;
pub use user::{NewUser, User};
