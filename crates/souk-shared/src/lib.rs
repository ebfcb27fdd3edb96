//! # souk-shared
//!
//! Types, constants and pure helpers shared by every `souk` crate: entity
//! identifiers, asset references, the error taxonomy, deterministic thread
//! ids and the asset-URL convention.

pub mod asset_id;
pub mod constants;
pub mod error;
pub mod thread_id;
pub mod types;

pub use asset_id::public_id_from_url;
pub use error::ErrorKind;
pub use thread_id::{resolve, validate_party};
pub use types::{AssetReference, ListingId, ThreadId, UserId};
