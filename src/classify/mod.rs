// Role classification: zero-shot labelling of comments as Claim,
// Counterclaim, Rebuttal or Evidence.

pub mod traits;
pub mod onnx;
pub mod roles;

pub use roles::RoleClassifier;
