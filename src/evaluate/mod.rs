pub mod scoring;

pub use scoring::{normalize_values, Rank, Ranker, Score};
