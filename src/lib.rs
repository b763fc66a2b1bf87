//! Strongbox: versioned credential store with envelope encryption, key rotation,
//! path-scoped ACLs and credential generation.
//!
//! Every stored value is encrypted under one of several configured master keys and
//! tagged with that key's identity, so keys can be rotated without losing access to
//! older data. Credentials are append-only version histories; every read and write
//! is gated by a per-path, per-actor permission check.
//!
//! The CLI is gated behind the `cli` feature and is private to the binary.
//!
//! # Quick start
//!
//! ```no_run
//! use strongbox::api::Strongbox;
//! use strongbox::auth::UserContext;
//! use strongbox::config::Config;
//! use strongbox::credential::{CredentialValue, WriteMode};
//!
//! let config = Config::load(&Config::default_path())?;
//! let strongbox = Strongbox::open(config)?;
//! let operator = UserContext::new("uaa-user:operator");
//!
//! strongbox.set(&operator, "/db/password", CredentialValue::Password("hunter2".into()), WriteMode::Overwrite)?;
//! let current = strongbox.find_active_by_name(&operator, "/db/password")?;
//! # Ok::<(), strongbox::error::StrongboxError>(())
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod credential;
pub mod datastore;
pub mod encryption;
pub mod error;
pub mod generator;
pub mod logging;
pub mod permission;
pub mod regeneration;
pub mod rotation;
pub mod types;
