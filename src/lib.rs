//! Classroom resolver for a published timetable spreadsheet.
//!
//! The crate ingests the sheet's CSV export, normalizes its text into
//! comparable keys, infers (or falls back on) a column layout, and
//! answers "where is this class happening right now" queries over a
//! short-lived cached snapshot of the whole feed.

pub mod columns;
pub mod feed;
pub mod normalize;
pub mod parse;
pub mod resolve;
pub mod server;
