//! Services driving state transitions across the stores.

pub mod account;
pub mod auth;

pub use account::{AccountService, Profile, SignupOutcome};
pub use auth::AuthService;
