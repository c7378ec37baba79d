//! Core types, configuration, and error handling for csmap.
//!
//! This crate provides the shared foundation used by the map generator and
//! the command-line binary:
//! - [`CsmapError`]: unified error type using `thiserror`
//! - [`RepomapConfig`]: configuration loaded from `.repomap/config.toml`
//! - Shared types: [`TokenizerKind`], [`Tier`]

mod config;
mod error;
mod types;

pub use config::{
    BoostConfig, BoostRule, CategoryRule, OutputConfig, OutputFiles, PageRankConfig,
    RepomapConfig, SourceConfig, TokenConfig,
};
pub use error::CsmapError;
pub use types::{Tier, TokenizerKind};

/// A convenience `Result` type for csmap operations.
pub type Result<T> = std::result::Result<T, CsmapError>;
