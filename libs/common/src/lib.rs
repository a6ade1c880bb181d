//! Common library for the auth workspace
//!
//! This crate provides the infrastructure shared by the services: the
//! PostgreSQL connection pool, the Redis cache client and the error types
//! they report.

pub mod cache;
pub mod database;
pub mod error;
