//! wsctl: run cloud tools inside a workspace
//!
//! A directory tree is bound to a workspace (a cloud project plus a catalog
//! of resources). Tools launched through wsctl see that project, the
//! workspace's credentials and one environment variable per resource.

pub mod app;
pub mod config;
pub mod context;
pub mod error;
pub mod gcp;
pub mod resource;
pub mod shell;

pub use error::{Error, Result};
