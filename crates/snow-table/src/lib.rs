//! ServiceNow table record operations
//!
//! Record CRUD, multi-condition lookup, attachment upload and check-mode
//! simulation over an
//! authenticated session from `snow-auth`. This crate consumes a ready
//! [`snow_auth::Session`] and never authenticates on its own; the session
//! and the credential bundle behind it stay immutable here.
//!
//! Typical use:
//! 1. Establish a session via `snow_auth::Authenticator`
//! 2. Build a [`RecordRequest`] for the target table
//! 3. Run [`apply`] and shape the [`RecordOutcome`] for the caller

pub mod client;
pub mod error;
pub mod find;
pub mod ops;

pub use client::TableClient;
pub use error::{Error, Result};
pub use find::{FindQuery, FindRequest, Operator};
pub use ops::{RecordOutcome, RecordRequest, RecordState, apply};
