//! Lead Ops Enrichment API Library
//!
//! This library provides the core functionality for the Lead Ops Enrichment
//! API: idempotent lead qualification with an external classification
//! gateway, persistent claim-based deduplication, and a full audit trail of
//! every processing attempt.
//!
//! # Modules
//!
//! - `claim_store`: Atomic claim set guarding concurrent enrichment.
//! - `classifier`: Classification gateway client and output validation.
//! - `config`: Configuration management.
//! - `coordinator`: The idempotent enrichment request coordinator.
//! - `db`: Database connection, pool, and schema bootstrap.
//! - `errors`: Error handling types.
//! - `fingerprint`: Lead identity fingerprinting.
//! - `handlers`: HTTP request handlers.
//! - `models`: Core data models and API schemas.
//! - `reaper`: Orphaned-claim reconciliation task.
//! - `run_ledger`: Audit ledger of processing attempts.

pub mod claim_store;
pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod errors;
pub mod fingerprint;
pub mod handlers;
pub mod models;
pub mod reaper;
pub mod run_ledger;
