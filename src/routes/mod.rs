pub mod admin;
pub mod deployment;
mod error;
pub mod health;
pub mod login;

pub use error::{ErrorInfo, ErrorResponse};
