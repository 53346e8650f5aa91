/*!
 * Database module for persistent storage of translation jobs.
 *
 * This module provides SQLite-based persistence for:
 * - Translation jobs keyed by their canonical content key
 * - Subtitle batches with source and translated cues
 * - The conditional transitions the pipeline relies on
 */

pub mod schema;
pub mod connection;
pub mod repository;
pub mod models;

// Re-export main types
pub use connection::{DatabaseConnection, DatabaseStats};
pub use models::{
    BatchClaim, BatchProgress, BatchRecord, BatchStatus, CascadeOutcome, JobRecord, JobStatus,
    NewBatch, NewJob,
};
pub use repository::Repository;
