//! Tern Core
//!
//! Core types for the tern review-to-CI bridge.
//!
//! This crate contains:
//! - Domain types: review-system models, job templates, refs, feedback reports
//! - DTOs: payloads exchanged with the job scheduler

pub mod domain;
pub mod dto;
