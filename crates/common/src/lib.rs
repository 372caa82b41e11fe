//! Common types, protocol definitions, and errors shared across `account-generator` crates.

pub mod error;
pub mod protocol;

pub use error::ServiceError;
