//! Workflow orchestration engine for Weave.
//!
//! This crate defines the engine and the "ports" (agent and storage traits)
//! that callers and the infrastructure layer implement. It depends only on
//! `weave-types` -- never on `weave-infra` or any database crate.

pub mod agent;
pub mod event;
pub mod repository;
pub mod workflow;
