//! Core governance logic for Steerco.
//!
//! This crate contains pure business logic with ZERO web or database dependencies.
//! Persistence, delivery and transport sit behind the port traits in
//! [`governance`]; the db and api crates provide the adapters.
//!
//! # Modules
//!
//! - `governance` - Change request decisions, lanes and approval chains

pub mod governance;
