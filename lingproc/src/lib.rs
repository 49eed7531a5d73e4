//! Linguistic processing utilities.
//!
//! This crate splits text into bounded segments suitable for feeding a
//! speech synthesizer one piece at a time.

pub mod segment;

pub use crate::segment::*;
