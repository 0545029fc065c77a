//! Vector primitives for the storyline clustering engine.
//!
//! Two embedding widths may be in flight at once (a legacy model and a
//! current one at twice the width). Every binary operation here accepts
//! that case by stride-2 decimating the longer vector; any other width
//! mismatch is a [`VecMathError::DimensionMismatch`].

mod centroid;
mod cosine;
mod error;
mod parse;
mod reconcile;

pub use centroid::{is_zero, mean, weighted_mean};
pub use cosine::cosine_similarity;
pub use error::VecMathError;
pub use parse::{format_embedding, parse_embedding};
pub use reconcile::{WidthFix, decimate, normalize_width, reconcile_dimensions};
