//! 测试用样例文档与协作者

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use image::{ImageFormat, Rgba, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream};
use tokio::sync::Notify;
use veil_geometry::RawBoundingBox;

use crate::classification::ClassificationResult;
use crate::collaborators::{
    ArtifactLocator, ArtifactStore, ClassificationEngine, ExtractionEngine, PageRenderer,
};
use crate::document::{ExtractedField, PageExtraction};

/// 600x800 的多页 PDF，MediaBox 与资源字典放在页面树父节点上
pub fn build_pdf(num_pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let mut page_ids = Vec::new();
    for i in 0..num_pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
                Operation::new("Td", vec![Object::Integer(72), Object::Integer(720)]),
                Operation::new("Tj", vec![Object::string_literal(format!("Page {}", i + 1))]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
        page_ids.push(doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            ("Contents", Object::Reference(content_id)),
        ])));
    }

    let font_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Courier".to_vec())),
    ]));
    let pages = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(num_pages as i64)),
        (
            "Kids",
            Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
        ),
        (
            "MediaBox",
            Object::Array(vec![0.into(), 0.into(), 600.into(), 800.into()]),
        ),
        (
            "Resources",
            Object::Dictionary(Dictionary::from_iter(vec![(
                "Font",
                Object::Dictionary(Dictionary::from_iter(vec![("F1", Object::Reference(font_id))])),
            )])),
        ),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// 纯白 PNG
pub fn build_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .unwrap();
    buffer
}

/// 每帧 8x8 的灰度多帧 TIFF
pub fn build_tiff(frames: usize) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    let mut encoder = tiff::encoder::TiffEncoder::new(&mut bytes).unwrap();
    let pixels = vec![255u8; 8 * 8];
    for _ in 0..frames {
        encoder
            .write_image::<tiff::encoder::colortype::Gray8>(8, 8, &pixels)
            .unwrap();
    }
    bytes.into_inner()
}

pub fn boxed(left: f64, top: f64, width: f64, height: f64) -> RawBoundingBox {
    RawBoundingBox::Capitalized {
        left,
        top,
        width,
        height,
    }
}

/// 每页输出一段 `[ordinal]` 字节，不关心源内容
pub struct FixedRenderer(pub usize);

#[async_trait]
impl PageRenderer for FixedRenderer {
    async fn render_pages(&self, _source: &[u8], _mime_type: &str) -> Result<Vec<Vec<u8>>> {
        Ok((0..self.0).map(|i| vec![i as u8]).collect())
    }
}

pub struct FailingRenderer;

#[async_trait]
impl PageRenderer for FailingRenderer {
    async fn render_pages(&self, _source: &[u8], _mime_type: &str) -> Result<Vec<Vec<u8>>> {
        bail!("renderer offline")
    }
}

/// 按页序返回预设结果的提取引擎
///
/// 每页输出一个 "Name" 字段；`failing` 中的页返回错误，`rejected` 中的页返回 success=false，
/// `delays` 控制每页完成的先后。
#[derive(Default)]
pub struct ScriptedExtractor {
    pub failing: HashSet<usize>,
    pub rejected: HashSet<usize>,
    pub delays: HashMap<usize, u64>,
    pub overrides: HashMap<usize, PageExtraction>,
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: Mutex<Vec<(usize, Option<String>)>>,
}

impl ScriptedExtractor {
    pub fn failing(pages: &[usize]) -> Self {
        Self {
            failing: pages.iter().copied().collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl ExtractionEngine for ScriptedExtractor {
    async fn extract(
        &self,
        _page: &[u8],
        page_ordinal: usize,
        document_type: Option<&str>,
    ) -> Result<PageExtraction> {
        self.calls
            .lock()
            .unwrap()
            .push((page_ordinal, document_type.map(String::from)));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if let Some(ms) = self.delays.get(&page_ordinal) {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&page_ordinal) {
            bail!("timeout on page {}", page_ordinal);
        }
        if self.rejected.contains(&page_ordinal) {
            return Ok(PageExtraction::failed("unreadable scan"));
        }
        if let Some(extraction) = self.overrides.get(&page_ordinal) {
            return Ok(extraction.clone());
        }
        Ok(PageExtraction::ok(
            format!("text of page {}", page_ordinal),
            vec![ExtractedField {
                label: "Name".into(),
                value: format!("value {}", page_ordinal),
                confidence: 0.9,
                bounding_box: Some(boxed(0.1, 0.1, 0.2, 0.05)),
                ..ExtractedField::default()
            }],
        ))
    }
}

pub struct FixedClassifier(pub ClassificationResult);

impl FixedClassifier {
    pub fn new(document_type: &str, confidence: f32) -> Self {
        Self(ClassificationResult::new(document_type, confidence))
    }
}

#[async_trait]
impl ClassificationEngine for FixedClassifier {
    async fn classify(&self, _document: &[u8], _mime_type: &str) -> Result<ClassificationResult> {
        Ok(self.0.clone())
    }
}

pub struct FailingClassifier;

#[async_trait]
impl ClassificationEngine for FailingClassifier {
    async fn classify(&self, _document: &[u8], _mime_type: &str) -> Result<ClassificationResult> {
        bail!("model unavailable")
    }
}

/// 调用开始时通知 `started`，收到 `release` 后才返回
pub struct GatedClassifier {
    pub result: ClassificationResult,
    pub started: Notify,
    pub release: Notify,
}

impl GatedClassifier {
    pub fn new(document_type: &str, confidence: f32) -> Self {
        Self {
            result: ClassificationResult::new(document_type, confidence),
            started: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl ClassificationEngine for GatedClassifier {
    async fn classify(&self, _document: &[u8], _mime_type: &str) -> Result<ClassificationResult> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(self.result.clone())
    }
}

pub struct BrokenStore;

#[async_trait]
impl ArtifactStore for BrokenStore {
    async fn put(&self, _bytes: Vec<u8>, _content_type: &str) -> Result<ArtifactLocator> {
        bail!("quota exceeded")
    }

    async fn get(&self, locator: &str) -> Result<Vec<u8>> {
        bail!("missing {}", locator)
    }
}
