//! Reference data for checks.
//!
//! Contains the controller/switch version comparator.

pub mod version;
