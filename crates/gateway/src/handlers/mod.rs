//! API handlers module

pub mod embedding;
pub mod health;
pub mod qa;
