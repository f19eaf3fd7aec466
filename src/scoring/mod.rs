// Scoring: rule-based effectiveness verdicts over classified comments.

pub mod effectiveness;

pub use effectiveness::{score, RoleTagged};
