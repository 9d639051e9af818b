//! Core library for deriving elevation profiles from survey points.
//!
//! A profile run projects each point of a point layer onto a reference
//! line — either built by sorting the points on a field or taken from a
//! line layer — and yields station/elevation/id triples ready for
//! plotting or export.

pub mod crs;
pub mod export;
pub mod geometry;
pub mod gis;
pub mod io;
pub mod profile;
