//! Token-pair comparison rules for `judge-token`.

use crate::token::parse_f64;

/// How two tokens are considered equal.
#[derive(Clone, Copy)]
pub struct MatchRules {
    /// Compare tokens that parse as reals within a tolerance.
    pub real_mode: bool,
    /// Maximum allowed relative error in real mode.
    pub rel_eps: f64,
    /// Maximum allowed absolute error in real mode.
    pub abs_eps: f64,
    /// ASCII case-insensitive string comparison.
    pub ignore_case: bool,
}

impl Default for MatchRules {
    fn default() -> Self {
        MatchRules {
            real_mode: false,
            rel_eps: 1e-5,
            abs_eps: 1e-30,
            ignore_case: false,
        }
    }
}

impl MatchRules {
    pub fn tokens_equal(&self, a: &[u8], b: &[u8]) -> bool {
        if self.real_mode {
            if let (Some(x1), Some(x2)) = (parse_f64(a), parse_f64(b)) {
                // Once both sides parse, the verdict is numeric; no string
                // fallback for values that merely print differently.
                if x1 == x2 {
                    return true;
                }
                let eps = (x2 * self.rel_eps).abs().max(self.abs_eps);
                return (x1 - x2).abs() <= eps;
            }
            // Conversion failed on either side: compare as strings.
        }
        if self.ignore_case {
            a.eq_ignore_ascii_case(b)
        } else {
            a == b
        }
    }
}
