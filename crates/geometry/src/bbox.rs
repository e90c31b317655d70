//! 边界框模型

use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

/// OCR 坐标误差容忍度
pub const EPSILON: f64 = 1e-6;

/// OCR 上报的原始边界框
///
/// 两种结构只在此处区分，进入系统后统一为 [`BoundingBox`]。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawBoundingBox {
    /// 大写键结构 `{Left, Top, Width, Height}`
    Capitalized {
        #[serde(rename = "Left")]
        left: f64,
        #[serde(rename = "Top")]
        top: f64,
        #[serde(rename = "Width")]
        width: f64,
        #[serde(rename = "Height")]
        height: f64,
    },
    /// 小写键结构 `{x, y, width, height}`
    Relative {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
}

impl RawBoundingBox {
    fn parts(&self) -> (f64, f64, f64, f64) {
        match *self {
            RawBoundingBox::Capitalized {
                left,
                top,
                width,
                height,
            } => (left, top, width, height),
            RawBoundingBox::Relative {
                x,
                y,
                width,
                height,
            } => (x, y, width, height),
        }
    }
}

/// 边界框（相对坐标 0-1，原点左上）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// 创建边界框，校验四个分量均为非负有限值
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Result<Self, GeometryError> {
        for (field, value) in [
            ("left", left),
            ("top", top),
            ("width", width),
            ("height", height),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(GeometryError::InvalidGeometry { field, value });
            }
        }
        Ok(Self {
            left,
            top,
            width,
            height,
        })
    }

    /// 将任意一种原始结构转换为统一的边界框
    pub fn normalize(raw: &RawBoundingBox) -> Result<Self, GeometryError> {
        let (left, top, width, height) = raw.parts();
        Self::new(left, top, width, height)
    }

    /// 限制到页面范围内
    ///
    /// 起点钳制到 [0,1]，越界部分通过收缩宽高处理，矩形不会从页面外开始。
    pub fn clamp(&self) -> Self {
        let left = clamp_unit(self.left);
        let top = clamp_unit(self.top);
        let width = clamp_unit(self.width).min(1.0 - left);
        let height = clamp_unit(self.height).min(1.0 - top);
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// 是否已在页面范围内（允许 OCR 误差）
    pub fn is_within_page(&self) -> bool {
        self.left >= 0.0
            && self.top >= 0.0
            && self.left + self.width <= 1.0 + EPSILON
            && self.top + self.height <= 1.0 + EPSILON
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// 乘以表面尺寸得到设备坐标
    ///
    /// `flip_y` 为 PDF 坐标系（原点左下），栅格坐标系原点在左上，无需翻转。
    pub fn to_device_rect(
        &self,
        surface_width: f64,
        surface_height: f64,
        flip_y: bool,
    ) -> crate::DeviceRect {
        let x = self.left * surface_width;
        let width = self.width * surface_width;
        let height = self.height * surface_height;
        let y = if flip_y {
            surface_height - self.top * surface_height - height
        } else {
            self.top * surface_height
        };
        crate::DeviceRect {
            x,
            y,
            width,
            height,
        }
    }
}

impl TryFrom<RawBoundingBox> for BoundingBox {
    type Error = GeometryError;

    fn try_from(raw: RawBoundingBox) -> Result<Self, Self::Error> {
        Self::normalize(&raw)
    }
}

fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
