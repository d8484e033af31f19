//! Common types shared by the ServiceNow client crates

mod secret;

pub use secret::Secret;
