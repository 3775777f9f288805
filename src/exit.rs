//! Exit-code protocol shared with the grading pipeline.
//!
//! These values are an external ABI; the pipeline matches on them exactly.

/// Judge verdict: the contestant's output is correct.
pub const EXIT_ACCEPT: i32 = 42;
/// Judge verdict: the contestant's output is wrong.
pub const EXIT_REJECT: i32 = 43;
/// The judge itself failed (I/O error on a trusted file, bad invocation).
pub const EXIT_JUDGE_FAILURE: i32 = 44;

/// Supervisor: the boxed program finished cleanly within its limits.
pub const BOX_EXIT_OK: i32 = 0;
/// Supervisor: the boxed program misbehaved (`status:` is set in the meta-file).
pub const BOX_EXIT_VIOLATION: i32 = 1;
/// Supervisor: internal failure (`status:XX`).
pub const BOX_EXIT_INTERNAL: i32 = 2;
