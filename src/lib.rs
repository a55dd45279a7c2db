//! pkglink installs Python-packaged resources (through `uvx` or
//! `uv pip install --target`) into a local cache and links their resource
//! directories into a project.

pub mod batch;
pub mod commands;
pub mod config;
pub mod error;
pub mod install;
pub mod link;
pub mod locate;
pub mod runtime;
pub mod setup;
pub mod source;
pub mod tool;
