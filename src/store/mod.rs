//! Persistence for registered users.

pub mod users;

pub use users::{UserProfile, UserStore, UsersDatabase, format_registration_date};
