//! # accountability-rs
//!
//! Hierarchy-aware accountability cases backed by SQLite.
//!
//! Provides hierarchy level derivation, per-viewer case and message
//! visibility, the case lifecycle with one-step escalation, and read-side
//! statistics, with OpenTelemetry observability.

pub mod config;
pub mod db;
pub mod directory;
pub mod engine;
pub mod error;
pub mod event;
pub mod model;
pub mod notify;
pub mod telemetry;
