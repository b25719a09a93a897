//! Resource layer
//!
//! # Architecture
//!
//! - [`model`] - the closed set of resource kinds and their attributes
//! - [`catalog`] - name-keyed records of one workspace
//! - [`resolve`] - kind-specific resolution to cloud identifiers
//! - [`fetcher`] - workspace service calls backing the catalog
//!
//! # Example
//!
//! ```ignore
//! use wsctl::resource::{Resolver, ResolveOptions};
//!
//! async fn bucket_uri(ctx: &wsctl::context::Context, fetcher: &dyn wsctl::resource::ResourceFetcher) -> wsctl::Result<()> {
//!     let paths = Resolver::new(fetcher)
//!         .resolve_path(ctx, "reads", &ResolveOptions::default())
//!         .await?;
//!     println!("{}", paths["reads"]);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod fetcher;
pub mod model;
pub mod resolve;

pub use catalog::ResourceCatalog;
pub use fetcher::{
    ResourceFetcher, SasToken, UnconfiguredFetcher, WorkspaceDescription, WorkspaceManagerClient,
};
pub use model::{
    validate_resource_name, CloningInstructions, Resource, ResourceAttributes, ResourceKind,
    Stewardship,
};
pub use resolve::{
    parse_resource_path, resolve_local, BqPathFormat, Resolution, ResolveOptions, Resolver,
    GCS_PREFIX,
};
