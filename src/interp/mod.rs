//! Two-stage map interpolation: fill NaN cells, then optionally densify.

mod delaunay;
pub mod densify;
pub mod fill;

pub use densify::{blank_set, densified_shape, densify};
pub use fill::{fill, fill_with, EdgeFill, FillMethod, FillOptions};
