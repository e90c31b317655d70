//! 脱敏合成
//!
//! 选中字段的坐标映射到目标表面后绘制不透明填充块：图片走栅格渲染，PDF 走矢量渲染。
//! 源文档字节不会被修改，每次调用都输出新的产物。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use veil_geometry::{map_to_surface, BoundingBox, DeviceRect, FillRegion, Rotation, Surface};
use veil_pdf::{PdfTarget, PDF_CONTENT_TYPE};
use veil_render::RasterTarget;
use veil_verify::{verify_output, ArtifactKind};

use crate::config::RedactionConfig;
use crate::document::Field;
use crate::error::{CoreError, Result};
use crate::orchestrator::mime_essence;

/// 兜底网格的页面边距（相对坐标）
const GRID_MARGIN: f64 = 0.02;
/// 兜底网格单元之间的间隔
const GRID_GAP: f64 = 0.01;
/// 兜底网格单元高度
const GRID_ROW_HEIGHT: f64 = 0.03;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    Raster,
    Vector,
}

/// 脱敏请求
#[derive(Debug, Clone)]
pub struct RedactionRequest<'a> {
    pub source: &'a [u8],
    pub content_type: &'a str,
    /// 按选择顺序排列的字段 id
    pub selected_ids: Vec<String>,
    /// 不指定时按 `content_type` 选择：`application/pdf` 走矢量，其余走栅格
    pub renderer: Option<RendererKind>,
    pub fill_color: Option<[u8; 4]>,
    /// 图片显示时的旋转（仅栅格）
    pub rotation: Option<Rotation>,
}

impl<'a> RedactionRequest<'a> {
    pub fn new(source: &'a [u8], content_type: &'a str, selected_ids: Vec<String>) -> Self {
        Self {
            source,
            content_type,
            selected_ids,
            renderer: None,
            fill_color: None,
            rotation: None,
        }
    }

    /// 选中所有动作为脱敏的字段
    pub fn for_redactable(source: &'a [u8], content_type: &'a str, fields: &[Field]) -> Self {
        let selected_ids = fields
            .iter()
            .filter(|f| f.action.redacts())
            .map(|f| f.id.clone())
            .collect();
        Self::new(source, content_type, selected_ids)
    }
}

/// 位置未知、以兜底网格放置的字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackPlacement {
    pub field_id: String,
    pub label: String,
    pub page_ordinal: usize,
    pub rect: DeviceRect,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactionResult {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub renderer: RendererKind,
    pub filled_regions: usize,
    pub fallback_placements: Vec<FallbackPlacement>,
    pub warnings: Vec<String>,
}

enum Target {
    Vector {
        target: PdfTarget,
        surfaces: Vec<Surface>,
    },
    Raster {
        target: RasterTarget,
        surface: Surface,
    },
}

impl Target {
    fn page_count(&self) -> usize {
        match self {
            Target::Vector { surfaces, .. } => surfaces.len(),
            Target::Raster { .. } => 1,
        }
    }

    fn surface(&self, page: usize) -> Option<Surface> {
        match self {
            Target::Vector { surfaces, .. } => surfaces.get(page).copied(),
            Target::Raster { surface, .. } if page == 0 => Some(*surface),
            Target::Raster { .. } => None,
        }
    }
}

/// 脱敏合成器
#[derive(Debug, Clone)]
pub struct RedactionCompositor {
    config: RedactionConfig,
}

impl Default for RedactionCompositor {
    fn default() -> Self {
        Self::new(&RedactionConfig::default())
    }
}

impl RedactionCompositor {
    pub fn new(config: &RedactionConfig) -> Self {
        let mut config = config.clone();
        config.grid_columns = config.grid_columns.max(1);
        Self { config }
    }

    fn load(&self, request: &RedactionRequest<'_>) -> Result<(RendererKind, Target)> {
        let declared_pdf = mime_essence(request.content_type) == PDF_CONTENT_TYPE;
        let kind = request.renderer.unwrap_or(if declared_pdf {
            RendererKind::Vector
        } else {
            RendererKind::Raster
        });
        let is_pdf = veil_pdf::is_pdf(request.source);

        let target = match kind {
            RendererKind::Vector => {
                if !is_pdf {
                    return Err(CoreError::UnsupportedFormat(format!(
                        "vector renderer requires a PDF, got {}",
                        request.content_type
                    )));
                }
                let target = PdfTarget::load(request.source)?;
                let surfaces = target.geometries()?.iter().map(|g| g.surface()).collect();
                Target::Vector { target, surfaces }
            }
            RendererKind::Raster => {
                if is_pdf {
                    return Err(CoreError::UnsupportedFormat(format!(
                        "raster renderer cannot draw on a PDF (declared {})",
                        request.content_type
                    )));
                }
                let frames = veil_render::frame_count(request.source)?;
                if frames > 1 {
                    return Err(CoreError::UnsupportedFormat(format!(
                        "{} has {} frames; split it into single-page images before redacting",
                        request.content_type, frames
                    )));
                }
                let target = RasterTarget::load(request.source)?;
                let mut surface = target.surface();
                if let Some(rotation) = request.rotation {
                    surface = surface.with_rotation(rotation);
                }
                Target::Raster { target, surface }
            }
        };
        Ok((kind, target))
    }

    /// 按字段坐标计算填充块：逐词框优先，其次整字段框
    fn precise_regions(&self, field: &Field, surface: &Surface) -> Vec<FillRegion> {
        let boxes: Vec<&BoundingBox> = if field.word_boxes.is_empty() {
            field.bounding_box.iter().collect()
        } else {
            field.word_boxes.iter().collect()
        };
        let (width, height) = surface.device_size();
        boxes
            .into_iter()
            .map(|b| {
                map_to_surface(b, surface)
                    .pad(self.config.padding)
                    .clamp_to(width, height)
            })
            .filter(|r| !r.is_empty())
            .map(FillRegion::new)
            .collect()
    }

    /// 第 `slot` 个兜底网格单元（页面顶部，先填满一行再换行）
    fn grid_rect(&self, slot: usize, surface: &Surface) -> DeviceRect {
        let columns = self.config.grid_columns;
        let usable = 1.0 - 2.0 * GRID_MARGIN;
        let cell_width = (usable - (columns - 1) as f64 * GRID_GAP) / columns as f64;
        let rows = ((usable + GRID_GAP) / (GRID_ROW_HEIGHT + GRID_GAP)).floor() as usize;
        let max_rows = rows.max(1);
        let column = slot % columns;
        let row = (slot / columns) % max_rows;
        let cell = BoundingBox {
            left: GRID_MARGIN + column as f64 * (cell_width + GRID_GAP),
            top: GRID_MARGIN + row as f64 * (GRID_ROW_HEIGHT + GRID_GAP),
            width: cell_width.max(0.0),
            height: GRID_ROW_HEIGHT,
        };
        map_to_surface(&cell, surface)
    }

    /// 合成脱敏产物
    ///
    /// 引用超出页数的选择与未知 id 只记录警告。
    pub fn composite(
        &self,
        request: &RedactionRequest<'_>,
        fields: &[Field],
    ) -> Result<RedactionResult> {
        let (kind, target) = self.load(request)?;
        let page_count = target.page_count();
        let color = request.fill_color.unwrap_or(self.config.fill_color);

        let mut warnings = Vec::new();
        let mut regions: BTreeMap<usize, Vec<FillRegion>> = BTreeMap::new();
        let mut fallback_placements = Vec::new();
        let mut grid_slots: BTreeMap<usize, usize> = BTreeMap::new();

        for id in &request.selected_ids {
            let Some(field) = fields.iter().find(|f| &f.id == id) else {
                log::warn!("[Compositor] 未知字段 {}", id);
                warnings.push(format!("unknown field id: {}", id));
                continue;
            };
            let Some(surface) = target.surface(field.page_ordinal) else {
                let stale = CoreError::StaleSelection {
                    field_id: field.id.clone(),
                    page_ordinal: field.page_ordinal,
                    page_count,
                };
                log::warn!("[Compositor] 跳过: {}", stale);
                warnings.push(stale.to_string());
                continue;
            };

            let mut page_regions = self.precise_regions(field, &surface);
            if page_regions.is_empty() {
                let slot = grid_slots.entry(field.page_ordinal).or_insert(0);
                let rect = self.grid_rect(*slot, &surface);
                *slot += 1;
                log::info!(
                    "[Compositor] 字段 {} 无坐标，放入第 {} 页兜底网格",
                    field.id,
                    field.page_ordinal + 1
                );
                fallback_placements.push(FallbackPlacement {
                    field_id: field.id.clone(),
                    label: field.label.clone(),
                    page_ordinal: field.page_ordinal,
                    rect,
                });
                page_regions.push(if self.config.label_fallbacks {
                    FillRegion::labeled(rect, field.label.clone())
                } else {
                    FillRegion::new(rect)
                });
            }
            regions
                .entry(field.page_ordinal)
                .or_default()
                .extend(page_regions);
        }

        let filled_regions = regions.values().map(Vec::len).sum();
        let (bytes, content_type, artifact_kind) = match target {
            Target::Vector { target, .. } => (
                target.fill_regions(&regions, color)?,
                PDF_CONTENT_TYPE.to_string(),
                ArtifactKind::Pdf,
            ),
            Target::Raster { target, .. } => {
                let page_regions = regions.remove(&0).unwrap_or_default();
                let output = target.fill_regions(&page_regions, color)?;
                (output.bytes, output.content_type, ArtifactKind::Raster)
            }
        };

        let verification = verify_output(request.source, &bytes, artifact_kind);
        if !verification.ok {
            return Err(CoreError::VerificationFailed(verification.warnings.join("; ")));
        }

        log::info!(
            "[Compositor] 完成: {} 个填充块 ({} 个兜底), 警告 {} 条",
            filled_regions,
            fallback_placements.len(),
            warnings.len()
        );

        Ok(RedactionResult {
            bytes,
            content_type,
            renderer: kind,
            filled_regions,
            fallback_placements,
            warnings,
        })
    }
}
