pub mod error;
pub mod format;
pub mod query;
pub mod requests;
pub mod result;
pub mod wire;
