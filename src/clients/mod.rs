//! Typed HTTP clients for remote services.

pub mod user_service;

pub use user_service::{ClientError, UserDto, UserId, UserServiceClient};
