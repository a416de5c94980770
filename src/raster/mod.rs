pub mod f64;
pub mod io;
pub mod traits;

pub use self::f64::Raster;
pub use self::traits::{RasterView, RasterViewMut, Rows};
