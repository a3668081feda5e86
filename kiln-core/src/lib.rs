//! Kiln Core
//!
//! Core types and abstractions for the Kiln environment builder.
//!
//! This crate contains:
//! - Domain types: Core business entities (Build, EnvironmentEntry, etc.)
//! - DTOs: Data transfer objects for the HTTP API

pub mod domain;
pub mod dto;
