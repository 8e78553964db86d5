//! API Route Handlers

pub mod control;
pub mod health;
