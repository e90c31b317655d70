//! 几何模型与坐标映射
//!
//! OCR 引擎上报的边界框有两种结构（`{x,y,width,height}` 与
//! `{Left,Top,Width,Height}`），这里统一为页面相对坐标 (0-1) 的 [`BoundingBox`]，
//! 并提供到渲染表面（像素 / PDF 点）的投影。

mod bbox;
mod error;
mod surface;

pub use bbox::{BoundingBox, RawBoundingBox, EPSILON};
pub use error::GeometryError;
pub use surface::{map_to_surface, DeviceRect, FillRegion, Rotation, Surface};
