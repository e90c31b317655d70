//! 矢量填充
//!
//! 原内容流保持不动，前后各追加一个内容流：
//! 前置 `q`，后置 `Q` + 填充块。这样原内容中的 `cm` 不会影响填充块的位置。

use std::collections::BTreeMap;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Object, ObjectId, Stream};
use veil_geometry::FillRegion;

use crate::error::PdfError;
use crate::page::{inherited, PageGeometry, PdfTarget};

/// 标注文字使用的字体资源名
pub const LABEL_FONT_NAME: &str = "VeilLabel";

const LABEL_MAX_FONT_SIZE: f64 = 10.0;
const LABEL_MIN_FONT_SIZE: f64 = 4.0;
const LABEL_INSET: f64 = 2.0;

impl PdfTarget {
    /// 在指定页面上绘制不透明填充块并输出新文档
    ///
    /// `regions` 以页序（0 起）为键，坐标为 [`PageGeometry::surface`] 下的设备坐标。
    /// 没有填充块的页面保持原样，页数与页序不变。
    pub fn fill_regions(
        mut self,
        regions: &BTreeMap<usize, Vec<FillRegion>>,
        color: [u8; 4],
    ) -> Result<Vec<u8>, PdfError> {
        for (&index, page_regions) in regions {
            if page_regions.is_empty() {
                continue;
            }
            let page_id = *self
                .page_ids
                .get(index)
                .ok_or(PdfError::PageNotFound(index))?;
            let geometry = self.geometry(index)?;

            let labeled = page_regions.iter().any(|r| r.label.is_some());
            if labeled {
                self.install_label_font(page_id)?;
            }

            let overlay = overlay_operations(&geometry, page_regions, color, labeled);
            let encoded = Content {
                operations: overlay,
            }
            .encode()
            .map_err(|e| PdfError::Content(e.to_string()))?;
            self.wrap_contents(page_id, encoded)?;

            log::info!(
                "[Pdf] 第 {} 页绘制 {} 个填充块",
                index + 1,
                page_regions.len()
            );
        }

        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| PdfError::Save(e.to_string()))?;
        Ok(buffer)
    }

    fn wrap_contents(&mut self, page_id: ObjectId, overlay: Vec<u8>) -> Result<(), PdfError> {
        let contents = self
            .doc
            .get_dictionary(page_id)
            .map_err(|e| PdfError::Content(e.to_string()))?
            .get(b"Contents")
            .ok()
            .cloned();

        let existing = match contents {
            Some(Object::Reference(id)) => match self.doc.get_object(id) {
                Ok(Object::Array(arr)) => arr.clone(),
                _ => vec![Object::Reference(id)],
            },
            Some(Object::Array(arr)) => arr,
            Some(Object::Stream(stream)) => vec![Object::Reference(self.doc.add_object(stream))],
            _ => Vec::new(),
        };

        let pre_id = self
            .doc
            .add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        let mut post = b"\nQ\n".to_vec();
        post.extend(overlay);
        let post_id = self.doc.add_object(Stream::new(Dictionary::new(), post));

        let mut parts = Vec::with_capacity(existing.len() + 2);
        parts.push(Object::Reference(pre_id));
        parts.extend(existing);
        parts.push(Object::Reference(post_id));

        match self.doc.get_object_mut(page_id) {
            Ok(Object::Dictionary(dict)) => {
                dict.set("Contents", Object::Array(parts));
                Ok(())
            }
            _ => Err(PdfError::Content(format!("页面对象 {:?} 不是字典", page_id))),
        }
    }

    /// 在页面资源中注册 Helvetica 标注字体
    ///
    /// 继承来的资源字典会被复制到页面上，原内容引用的资源保持可用。
    fn install_label_font(&mut self, page_id: ObjectId) -> Result<(), PdfError> {
        let mut resources = match inherited(&self.doc, page_id, b"Resources") {
            Some(Object::Dictionary(dict)) => dict.clone(),
            _ => Dictionary::new(),
        };
        let mut fonts = match resources.get(b"Font") {
            Ok(Object::Reference(id)) => self
                .doc
                .get_dictionary(*id)
                .ok()
                .cloned()
                .unwrap_or_else(Dictionary::new),
            Ok(Object::Dictionary(dict)) => dict.clone(),
            _ => Dictionary::new(),
        };
        if fonts.has(LABEL_FONT_NAME.as_bytes()) {
            return Ok(());
        }

        let font_id = self.doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"Type1".to_vec())),
            ("BaseFont", Object::Name(b"Helvetica".to_vec())),
            ("Encoding", Object::Name(b"WinAnsiEncoding".to_vec())),
        ]));
        fonts.set(LABEL_FONT_NAME, Object::Reference(font_id));
        resources.set("Font", Object::Dictionary(fonts));

        match self.doc.get_object_mut(page_id) {
            Ok(Object::Dictionary(dict)) => {
                dict.set("Resources", Object::Dictionary(resources));
                Ok(())
            }
            _ => Err(PdfError::Content(format!("页面对象 {:?} 不是字典", page_id))),
        }
    }
}

fn rgb(color: [u8; 4]) -> Vec<Object> {
    color[..3]
        .iter()
        .map(|c| Object::Real(*c as f32 / 255.0))
        .collect()
}

/// 深色填充配白字，浅色填充配黑字
fn label_color(color: [u8; 4]) -> [u8; 4] {
    let luminance = 0.299 * color[0] as f64 + 0.587 * color[1] as f64 + 0.114 * color[2] as f64;
    if luminance < 128.0 {
        [255, 255, 255, 255]
    } else {
        [0, 0, 0, 255]
    }
}

/// Helvetica 只覆盖 WinAnsi，非 ASCII 字符替换为 `?`
fn sanitize_label(label: &str, max_chars: usize) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '?' })
        .take(max_chars)
        .collect()
}

fn overlay_operations(
    geometry: &PageGeometry,
    regions: &[FillRegion],
    color: [u8; 4],
    labeled: bool,
) -> Vec<Operation> {
    let mut ops = vec![Operation::new("q", vec![]), Operation::new("rg", rgb(color))];

    for region in regions {
        let rect = region.rect;
        log::debug!(
            "[Pdf] 填充: x={:.2}, y={:.2}, w={:.2}, h={:.2}",
            rect.x,
            rect.y,
            rect.width,
            rect.height
        );
        ops.push(Operation::new(
            "re",
            vec![
                Object::Real((rect.x + geometry.origin_x) as f32),
                Object::Real((rect.y + geometry.origin_y) as f32),
                Object::Real(rect.width as f32),
                Object::Real(rect.height as f32),
            ],
        ));
        ops.push(Operation::new("f", vec![]));
    }

    if labeled {
        ops.push(Operation::new("rg", rgb(label_color(color))));
        for region in regions {
            let Some(label) = &region.label else {
                continue;
            };
            let rect = region.rect;
            let size = (rect.height * 0.6).clamp(LABEL_MIN_FONT_SIZE, LABEL_MAX_FONT_SIZE);
            // Helvetica 平均字宽约为字号的一半
            let max_chars =
                ((rect.width - LABEL_INSET * 2.0) / (size * 0.5)).floor().max(0.0) as usize;
            let text = sanitize_label(label, max_chars);
            if text.is_empty() {
                continue;
            }
            let x = rect.x + geometry.origin_x + LABEL_INSET;
            let y = rect.y + geometry.origin_y + (rect.height - size) / 2.0 + size * 0.2;
            ops.push(Operation::new("BT", vec![]));
            ops.push(Operation::new(
                "Tf",
                vec![
                    Object::Name(LABEL_FONT_NAME.as_bytes().to_vec()),
                    Object::Real(size as f32),
                ],
            ));
            ops.push(Operation::new(
                "Td",
                vec![Object::Real(x as f32), Object::Real(y as f32)],
            ));
            ops.push(Operation::new("Tj", vec![Object::string_literal(text)]));
            ops.push(Operation::new("ET", vec![]));
        }
    }

    ops.push(Operation::new("Q", vec![]));
    ops
}
