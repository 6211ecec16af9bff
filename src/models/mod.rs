//! Value objects exchanged between the backup store, its gateway, and callers.
//!
//! Everything here is constructed fresh per call and never mutated behind the
//! caller's back. Types that cross the collaborator boundary serialize via
//! `serde`.

pub mod backup_file;
pub mod bucket;
pub mod metadata;
pub mod multipart;
pub mod object;
