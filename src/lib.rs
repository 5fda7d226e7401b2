pub mod buffer;
pub mod catalog;
pub mod cli;
pub mod constants;
pub mod dims;
pub mod error;
pub mod fetch;
pub mod grid;
pub mod metadata;
pub mod mosaic;
pub mod polygonize;
pub mod progress;
pub mod split;
pub mod wms;

pub use dims::{GeoBounds, Padding, resolve_dims};
pub use error::GeomError;
pub use split::split_geometry;
