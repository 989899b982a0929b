//! # tether-core
//!
//! Core types shared across all Tether crates.
//!
//! This crate provides:
//! - Entity structs for remote agents, conversation messages, accounts and
//!   repositories
//! - The agent lifecycle enum with terminal-state classification
//! - Request bodies and response envelopes for every remote endpoint
//! - Cross-cutting error types

pub mod entities;
pub mod enums;
pub mod errors;
pub mod requests;
pub mod responses;
