// Opinion analyzer: topic assignment, argument-role classification and
// per-topic conclusions for comment corpora.
//
// This is the library root. Each module corresponds to one stage of the
// analysis pipeline or to the plumbing around it.

pub mod classify;
pub mod config;
pub mod download;
pub mod error;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod resources;
pub mod scoring;
pub mod status;
pub mod summarize;
pub mod text;
pub mod topics;

#[cfg(feature = "web")]
pub mod web;
