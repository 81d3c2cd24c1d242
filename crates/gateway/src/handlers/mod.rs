//! API handlers module

pub mod ask;
pub mod documents;
pub mod health;
pub mod sessions;
