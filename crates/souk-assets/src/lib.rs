//! # souk-assets
//!
//! Binary asset hosting for the Souk marketplace: images attached to
//! listings, chat messages and profiles.
//!
//! [`AssetStore`] is the contract (upload into a folder, signed delete by
//! opaque id). [`HostedAssetClient`] talks to the hosted image service over
//! HTTP; [`LocalAssetStore`] keeps files in a local directory for development
//! and tests.

pub mod client;
pub mod config;
pub mod hosted;
pub mod local;
pub mod signing;

mod error;

pub use client::{AssetStore, DeleteCredentials, UploadFile};
pub use config::{AssetConfig, UploadPresets};
pub use error::{AssetError, Result};
pub use hosted::HostedAssetClient;
pub use local::LocalAssetStore;
