//! Core library for keeping Archipelago worlds in sync with their GitHub sources.
//!
//! - `config`: tracked worlds and the YAML configuration store
//! - `paths`: install path resolution and scratch directories
//! - `source`: remote repository/release metadata (GitHub)
//! - `download`: HTTP downloads with retries
//! - `vcs`: git working copies and install symlinks
//! - `archive`: packaged-file extraction from zip releases
//! - `update`: the per-world update engine

pub mod archive;
pub mod config;
pub mod download;
pub mod paths;
pub mod source;
pub mod update;
pub mod vcs;
