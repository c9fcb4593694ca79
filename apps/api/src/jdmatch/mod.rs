//! The resume-to-JD matching pipeline.

pub mod acquire;
pub mod classify;
pub mod convert;
pub mod handlers;
pub mod identity;
pub mod models;
pub mod orchestrator;
pub mod repo;
pub mod service;
pub mod status;
pub mod status_store;
