// src/scoring/mod.rs

//! The scoring pipeline: raw submission values are normalized to option
//! indices, evaluated against each question's answer key, rolled up into
//! subject and exam percentages, and finally folded into the student's
//! achievement profile.
//!
//! Everything here is pure arithmetic over in-memory data; persistence and
//! transaction handling live in the handlers. Re-evaluating the same
//! inputs always produces the same scores.

pub mod aggregate;
pub mod evaluate;
pub mod normalize;
pub mod profile;
