//! GCP interaction module
//!
//! # Module Structure
//!
//! - [`auth`] - access tokens and credential identity from Application Default Credentials
//! - [`http`] - authenticated JSON transport with typed backend errors

pub mod auth;
pub mod http;
