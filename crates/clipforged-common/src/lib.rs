//! Clipforged-Common: Shared error type and path confinement.
//!
//! This crate provides functionality used by every other clipforged crate:
//!
//! - **Error Handling**: one error enum whose variants map onto HTTP statuses
//! - **Path Sandbox**: the single gate that confines request-supplied paths
//!   to a configured root directory
//! - **Path Utilities**: lexical normalization, relative paths, and content
//!   types by extension
//!
//! # Examples
//!
//! ```
//! use clipforged_common::{Error, PathSandbox};
//!
//! let sandbox = PathSandbox::new("/srv/datasets").unwrap();
//! assert!(sandbox.resolve("/srv/datasets/clips/a.mp4").is_ok());
//! assert!(matches!(
//!     sandbox.resolve("/etc/passwd"),
//!     Err(Error::OutsideRoot { .. })
//! ));
//! ```

pub mod error;
pub mod paths;
pub mod sandbox;

pub use error::{Error, Result};
pub use sandbox::PathSandbox;
