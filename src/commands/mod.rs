//! Command entry points used by the `pkglink` binary.

pub mod config;
mod link;
mod list;
mod report;
mod sync;
mod tool;

pub use config::Config;
pub use link::{LinkArgs, link, plan};
pub use list::list;
pub use sync::sync;
pub use tool::{ToolArgs, tool};
