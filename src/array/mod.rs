//! Multidimensional array layout
//!
//! [`ArrayLayout`] turns a [`Domain`] into per-dimension offsets and blocks;
//! [`ArrayDescriptor`] adds storage obtained from the instrumented facade.

mod descriptor;
mod domain;

pub use descriptor::{ArrayDescriptor, ArrayLayout, DimLayout};
pub use domain::{DimRange, Domain};
