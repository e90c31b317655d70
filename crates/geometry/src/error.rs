//! 几何错误类型

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("invalid geometry: {field} = {value}")]
    InvalidGeometry { field: &'static str, value: f64 },
}
