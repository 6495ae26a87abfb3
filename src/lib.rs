//! Distributed particle ingestion and redistribution on block structured AMR hierarchies
#![cfg_attr(feature = "strict", deny(warnings), deny(unused_crate_dependencies))]
#![warn(missing_docs)]

pub mod comm;
pub mod config;
pub mod constants;
pub mod container;
pub mod error;
pub mod geometry;
pub mod hierarchy;
pub mod ids;
pub mod layout;
pub mod particle;
pub mod pipeline;
pub mod random;
pub mod redistribute;
pub mod store;
pub mod tools;
pub mod traits;
