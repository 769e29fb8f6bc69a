//! Support utilities for the Tarkib composition engine.
//!
//! Currently houses the text-rendering helpers used to build the
//! human-readable error messages of `tarkib-engine`.

pub mod rendering;

pub use rendering::{render_origin_list, render_required_by_chain, shorten_type_name};
