//! dbseed-lib: Core types and logic for dbseed
//!
//! This crate provides the pieces of the SQL seeding mechanism:
//! - `SeederConfig`: validated construct input for one seeder
//! - `Stack`: declared resources and their dependency graph
//! - `Platform`: the contract the deploy engine materializes against
//! - `DeployState`: persisted record of the last successful deploy

pub mod config;
pub mod consts;
pub mod deploy;
pub mod graph;
pub mod lifecycle;
pub mod platform;
pub mod resource;
pub mod seeder;
pub mod stage;
pub mod state;
pub mod util;
