// Text normalization: shared cleanup for topics and opinions.

pub mod normalize;

pub use normalize::TextNormalizer;
