//! Stageline Core
//!
//! Core types shared by the Stageline services.
//!
//! This crate contains:
//! - Domain types: pipeline runs, pipelines and their actions
//! - DTOs: the stage event carried on the broker
//! - Template rendering for action metadata

pub mod domain;
pub mod dto;
pub mod template;
