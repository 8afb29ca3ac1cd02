//! # cirrus-core
//! Foundation types and collaborator traits for the Cirrus wallet engine.

pub mod address;
pub mod amount;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod record;
pub mod traits;
pub mod types;
