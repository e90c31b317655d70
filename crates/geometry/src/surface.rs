//! 渲染表面与设备坐标

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;

/// 页面旋转（PDF `/Rotate` 语义，顺时针）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// 从角度构造，支持负角度；非 90 倍数返回 `None`
    pub fn from_degrees(degrees: i64) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::None),
            90 => Some(Rotation::Cw90),
            180 => Some(Rotation::Cw180),
            270 => Some(Rotation::Cw270),
            _ => None,
        }
    }

    pub fn degrees(&self) -> i64 {
        match self {
            Rotation::None => 0,
            Rotation::Cw90 => 90,
            Rotation::Cw180 => 180,
            Rotation::Cw270 => 270,
        }
    }

    pub fn swaps_axes(&self) -> bool {
        matches!(self, Rotation::Cw90 | Rotation::Cw270)
    }

    /// 将显示页面（已旋转）上的相对框还原到未旋转页面
    fn unrotate(&self, b: &BoundingBox) -> BoundingBox {
        match self {
            Rotation::None => *b,
            Rotation::Cw90 => BoundingBox {
                left: b.top,
                top: 1.0 - b.left - b.width,
                width: b.height,
                height: b.width,
            },
            Rotation::Cw180 => BoundingBox {
                left: 1.0 - b.left - b.width,
                top: 1.0 - b.top - b.height,
                width: b.width,
                height: b.height,
            },
            Rotation::Cw270 => BoundingBox {
                left: 1.0 - b.top - b.height,
                top: b.left,
                width: b.height,
                height: b.width,
            },
        }
    }
}

/// 渲染表面
///
/// `width`/`height` 为未旋转页面在缩放 1.0 下的尺寸（像素或 PDF 点）。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Surface {
    pub width: f64,
    pub height: f64,
    #[serde(default = "default_zoom")]
    pub zoom: f64,
    #[serde(default)]
    pub rotation: Rotation,
    #[serde(default)]
    pub flip_y: bool,
}

fn default_zoom() -> f64 {
    1.0
}

impl Surface {
    /// 栅格表面（原点左上）
    pub fn raster(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            zoom: 1.0,
            rotation: Rotation::None,
            flip_y: false,
        }
    }

    /// PDF 页面表面（原点左下）
    pub fn pdf(width: f64, height: f64, rotation: Rotation) -> Self {
        Self {
            width,
            height,
            zoom: 1.0,
            rotation,
            flip_y: true,
        }
    }

    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = zoom;
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// 缩放后的设备尺寸（未旋转）
    pub fn device_size(&self) -> (f64, f64) {
        (self.width * self.zoom, self.height * self.zoom)
    }

    /// 用户看到的尺寸（旋转 90/270 时宽高互换）
    pub fn displayed_size(&self) -> (f64, f64) {
        let (w, h) = self.device_size();
        if self.rotation.swaps_axes() {
            (h, w)
        } else {
            (w, h)
        }
    }
}

/// 设备坐标矩形
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl DeviceRect {
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// 四周外扩 `padding`，保证字形完全覆盖
    pub fn pad(&self, padding: f64) -> Self {
        Self {
            x: self.x - padding,
            y: self.y - padding,
            width: self.width + padding * 2.0,
            height: self.height + padding * 2.0,
        }
    }

    /// 裁剪到 `[0, width] x [0, height]`
    pub fn clamp_to(&self, width: f64, height: f64) -> Self {
        let x0 = self.x.clamp(0.0, width);
        let y0 = self.y.clamp(0.0, height);
        let x1 = self.right().clamp(0.0, width);
        let y1 = self.bottom().clamp(0.0, height);
        Self {
            x: x0,
            y: y0,
            width: (x1 - x0).max(0.0),
            height: (y1 - y0).max(0.0),
        }
    }
}

/// 待填充区域
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillRegion {
    pub rect: DeviceRect,
    /// 需要标注在填充块上的文字（用于无坐标字段的兜底布局）
    pub label: Option<String>,
}

impl FillRegion {
    pub fn new(rect: DeviceRect) -> Self {
        Self { rect, label: None }
    }

    pub fn labeled(rect: DeviceRect, label: impl Into<String>) -> Self {
        Self {
            rect,
            label: Some(label.into()),
        }
    }
}

/// 将相对坐标框投影到渲染表面
///
/// 输入框相对于用户看到的（已旋转）页面，先钳制到页面内，再还原旋转、缩放，
/// 最后按表面坐标系决定是否翻转 Y 轴。
pub fn map_to_surface(bbox: &BoundingBox, surface: &Surface) -> DeviceRect {
    let unrotated = surface.rotation.unrotate(&bbox.clamp());
    let (width, height) = surface.device_size();
    unrotated.to_device_rect(width, height, surface.flip_y)
}
