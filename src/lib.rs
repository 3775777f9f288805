//! judgebox: trusted evaluation utilities for automated contest grading.
//!
//! The crate ships four binaries built on one utility layer:
//! `minibox` (a resource-guard process supervisor), the comparators
//! `judge-token` and `judge-shuffle`, and the `text-preproc` stream
//! normalizer.

pub mod compare;
pub mod exit;
pub mod io;
pub mod preproc;
pub mod random;
pub mod shuffle;
pub mod supervisor;
pub mod token;
pub mod verdict;
