//! 页面几何信息

use lopdf::{Document, Object, ObjectId};
use serde::{Deserialize, Serialize};
use veil_geometry::{Rotation, Surface};

use crate::error::PdfError;

/// 页面树继承查找的最大深度
const MAX_INHERIT_DEPTH: usize = 32;

/// 默认 Letter 尺寸
const LETTER: (f32, f32, f32, f32) = (0.0, 0.0, 612.0, 792.0);

/// 页面几何信息（PDF 点）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageGeometry {
    pub index: usize,
    /// 可见区域左下角
    pub origin_x: f64,
    pub origin_y: f64,
    /// 未旋转的页面尺寸
    pub width: f64,
    pub height: f64,
    pub rotation: Rotation,
}

impl PageGeometry {
    /// 页面对应的矢量绘制表面
    pub fn surface(&self) -> Surface {
        Surface::pdf(self.width, self.height, self.rotation)
    }
}

/// 待脱敏的 PDF 文档
///
/// 由源字节加载出独立副本，所有修改只作用于副本。
pub struct PdfTarget {
    pub(crate) doc: Document,
    pub(crate) page_ids: Vec<ObjectId>,
}

impl PdfTarget {
    pub fn load(bytes: &[u8]) -> Result<Self, PdfError> {
        let doc = Document::load_mem(bytes).map_err(PdfError::Load)?;
        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        Ok(Self { doc, page_ids })
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    pub fn geometry(&self, index: usize) -> Result<PageGeometry, PdfError> {
        let page_id = *self
            .page_ids
            .get(index)
            .ok_or(PdfError::PageNotFound(index))?;

        let (llx, lly, urx, ury) = page_box(&self.doc, page_id);
        let rotation = page_rotation(&self.doc, page_id);

        Ok(PageGeometry {
            index,
            origin_x: llx.min(urx) as f64,
            origin_y: lly.min(ury) as f64,
            width: (urx - llx).abs() as f64,
            height: (ury - lly).abs() as f64,
            rotation,
        })
    }

    pub fn geometries(&self) -> Result<Vec<PageGeometry>, PdfError> {
        (0..self.page_count()).map(|i| self.geometry(i)).collect()
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// 沿页面树向上查找可继承属性
pub(crate) fn inherited<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_INHERIT_DEPTH {
        if let Ok(value) = current.get(key) {
            return resolve(doc, value);
        }
        let parent = match current.get(b"Parent") {
            Ok(Object::Reference(id)) => *id,
            _ => return None,
        };
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

fn box_values(obj: &Object) -> Option<(f32, f32, f32, f32)> {
    let arr = obj.as_array().ok()?;
    let values: Vec<f32> = arr.iter().filter_map(number).collect();
    if values.len() == 4 {
        Some((values[0], values[1], values[2], values[3]))
    } else {
        None
    }
}

/// 页面有效区域（优先 CropBox，其次 MediaBox）
fn page_box(doc: &Document, page_id: ObjectId) -> (f32, f32, f32, f32) {
    for key in [b"CropBox".as_slice(), b"MediaBox".as_slice()] {
        if let Some(values) = inherited(doc, page_id, key).and_then(box_values) {
            log::debug!("[Pdf] 使用 {}: {:?}", String::from_utf8_lossy(key), values);
            return values;
        }
    }
    log::warn!("[Pdf] 页面 {:?} 缺少 MediaBox，使用默认 Letter 尺寸", page_id);
    LETTER
}

fn page_rotation(doc: &Document, page_id: ObjectId) -> Rotation {
    let degrees = match inherited(doc, page_id, b"Rotate") {
        Some(Object::Integer(d)) => *d,
        _ => 0,
    };
    Rotation::from_degrees(degrees).unwrap_or_else(|| {
        log::warn!("[Pdf] 非法旋转角度 {}，按 0 处理", degrees);
        Rotation::None
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::build_pdf;

    #[test]
    fn test_geometry_inherits_media_box() {
        let target = PdfTarget::load(&build_pdf(2, None)).unwrap();
        assert_eq!(target.page_count(), 2);

        let geometry = target.geometry(1).unwrap();
        assert_eq!(geometry.width, 600.0);
        assert_eq!(geometry.height, 800.0);
        assert_eq!(geometry.rotation, Rotation::None);
        assert!(geometry.surface().flip_y);
    }

    #[test]
    fn test_geometry_reads_rotation() {
        let target = PdfTarget::load(&build_pdf(1, Some(-90))).unwrap();
        let geometry = target.geometry(0).unwrap();
        assert_eq!(geometry.rotation, Rotation::Cw270);
        assert_eq!(geometry.surface().displayed_size(), (800.0, 600.0));
    }

    #[test]
    fn test_geometry_out_of_range() {
        let target = PdfTarget::load(&build_pdf(1, None)).unwrap();
        assert!(matches!(target.geometry(3), Err(PdfError::PageNotFound(3))));
        assert_eq!(target.geometries().unwrap().len(), 1);
    }
}
