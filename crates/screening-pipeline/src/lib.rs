//! Candidate screening campaign pipeline.
//!
//! Pulls open recruitment leads, gates and ranks them, and drives outbound screening calls
//! with follow-up messaging, CRM sync and analytics. See [`workflows::screening`] for the
//! pipeline core and [`integrations`] for the HTTP adapters of the external providers.

pub mod config;
pub mod error;
pub mod integrations;
pub mod telemetry;
pub mod workflows;
