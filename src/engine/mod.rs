//! The excess-mortality estimation engine.
//!
//! Consumes already-loaded weekly death records, population counts, and
//! configuration; produces per-jurisdiction, per-age-group excess totals and
//! per-million rates. File formats, caching, and rendering live in the
//! collaborator modules at the crate root.

pub mod age_adjust;
pub mod aggregate;
pub mod baseline;
pub mod death_age;
pub mod reconcile;
pub mod series;
pub mod types;
pub mod utility;
