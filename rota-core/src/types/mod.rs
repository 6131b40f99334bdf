//! Rota Types

pub mod common;
pub mod records;

pub use common::*;
pub use records::*;
