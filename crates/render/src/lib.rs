//! 栅格图片脱敏
//!
//! 在图片上直接合成不透明矩形，输出新的图片字节。

mod error;
mod raster;

pub use error::RenderError;
pub use raster::{content_type_for, frame_count, sniff_dimensions, RasterOutput, RasterTarget};
