//! 多页文档提取编排
//!
//! 拆分源文档为页面，按并发上限分发给提取引擎，按页序汇总。
//! 单页失败只记录在结果里，不中断其余页面。

use std::borrow::Cow;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use veil_geometry::BoundingBox;
use veil_pdf::PdfTarget;

use crate::collaborators::{ExtractionEngine, PageRenderer};
use crate::config::OrchestratorConfig;
use crate::document::{Field, Page, PageExtraction, PageStatus, PipelineResult, DEFAULT_CATEGORY};
use crate::error::{CoreError, Result};

/// 处理进度（仅供展示）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ProgressEvent {
    #[serde(rename_all = "camelCase")]
    Started { total_pages: usize },
    #[serde(rename_all = "camelCase")]
    PageResolved {
        ordinal: usize,
        success: bool,
        completed: usize,
        total_pages: usize,
    },
    #[serde(rename_all = "camelCase")]
    Finished { succeeded: usize, failed: usize },
}

pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn report(&self, event: ProgressEvent) {
        self(event)
    }
}

/// 不关心进度时使用
pub fn ignore_progress(_event: ProgressEvent) {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    /// 单页图片，不拆分
    Image,
    /// 需要渲染器拆分的分页文档
    Paginated { pdf: bool },
}

/// 去掉参数并转小写："Image/PNG; q=1" -> "image/png"
pub(crate) fn mime_essence(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn source_kind(mime_type: &str) -> Result<SourceKind> {
    match mime_essence(mime_type).as_str() {
        "image/png" | "image/jpeg" | "image/jpg" | "image/gif" | "image/bmp" | "image/webp" => {
            Ok(SourceKind::Image)
        }
        "application/pdf" => Ok(SourceKind::Paginated { pdf: true }),
        "image/tiff" | "image/tif" => Ok(SourceKind::Paginated { pdf: false }),
        _ => Err(CoreError::UnsupportedFormat(mime_type.to_string())),
    }
}

/// 页面渲染尺寸：优先读图片头，单页 PDF 取 MediaBox
fn rendered_size(page: &[u8]) -> (u32, u32) {
    if let Some(size) = veil_render::sniff_dimensions(page) {
        return size;
    }
    if veil_pdf::is_pdf(page) {
        if let Ok(geometry) = PdfTarget::load(page).and_then(|t| t.geometry(0)) {
            let (w, h) = geometry.surface().displayed_size();
            return (w.round() as u32, h.round() as u32);
        }
    }
    (0, 0)
}

/// 校验提取引擎的响应并转换为字段
///
/// 字段 id 由页序与字段序号决定，相同输入得到相同 id。
fn interpret(
    ordinal: usize,
    outcome: anyhow::Result<PageExtraction>,
) -> std::result::Result<(String, Vec<Field>), String> {
    let extraction = outcome.map_err(|e| format!("{:#}", e))?;
    if !extraction.success {
        return Err(extraction
            .error
            .unwrap_or_else(|| "extraction engine reported failure".to_string()));
    }

    let mut fields = Vec::with_capacity(extraction.fields.len());
    for (idx, raw) in extraction.fields.into_iter().enumerate() {
        let malformed = |detail: String| format!("malformed payload: field {}: {}", idx, detail);
        if !raw.confidence.is_finite() {
            return Err(malformed(format!("confidence {}", raw.confidence)));
        }
        let bounding_box = raw
            .bounding_box
            .as_ref()
            .map(BoundingBox::normalize)
            .transpose()
            .map_err(|e| malformed(e.to_string()))?
            .map(|b| b.clamp());
        let word_boxes = raw
            .word_boxes
            .iter()
            .map(|b| BoundingBox::normalize(b).map(|b| b.clamp()))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| malformed(e.to_string()))?;

        fields.push(Field {
            id: format!("p{}-f{}", ordinal, idx),
            label: raw.label,
            value: raw.value,
            confidence: raw.confidence.clamp(0.0, 1.0),
            page_ordinal: ordinal,
            bounding_box,
            word_boxes,
            action: Default::default(),
            category: raw
                .category
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        });
    }
    Ok((extraction.text, fields))
}

/// 页面编排器
#[derive(Debug, Clone)]
pub struct PageOrchestrator {
    worker_limit: usize,
}

impl Default for PageOrchestrator {
    fn default() -> Self {
        Self::new(&OrchestratorConfig::default())
    }
}

impl PageOrchestrator {
    pub fn new(config: &OrchestratorConfig) -> Self {
        Self {
            worker_limit: config.worker_limit.max(1),
        }
    }

    pub fn worker_limit(&self) -> usize {
        self.worker_limit
    }

    async fn split<'a>(
        &self,
        source: &'a [u8],
        mime_type: &str,
        renderer: &dyn PageRenderer,
    ) -> Result<Vec<Cow<'a, [u8]>>> {
        let kind = source_kind(mime_type)?;
        let SourceKind::Paginated { pdf } = kind else {
            return Ok(vec![Cow::Borrowed(source)]);
        };

        let pages = renderer
            .render_pages(source, mime_type)
            .await
            .map_err(|e| CoreError::PageSplitFailure(format!("{:#}", e)))?;
        if pages.is_empty() {
            return Err(CoreError::PageSplitFailure("document has no pages".into()));
        }
        if pdf {
            match veil_pdf::page_count(source) {
                Ok(expected) if expected != pages.len() => {
                    return Err(CoreError::PageSplitFailure(format!(
                        "renderer produced {} pages but the document has {}",
                        pages.len(),
                        expected
                    )));
                }
                Ok(_) => {}
                Err(e) => log::warn!("[Orchestrator] 无法读取页数，跳过页数校验: {}", e),
            }
        }
        Ok(pages.into_iter().map(Cow::Owned).collect())
    }

    /// 处理一份文档
    ///
    /// 渲染器错误与全部页面失败是致命错误，其余单页错误记录在 `pages` 中。
    pub async fn process_document(
        &self,
        source: &[u8],
        mime_type: &str,
        document_type: Option<&str>,
        renderer: &dyn PageRenderer,
        extractor: &dyn ExtractionEngine,
        progress: &dyn ProgressSink,
    ) -> Result<PipelineResult> {
        let page_bytes = self.split(source, mime_type, renderer).await?;
        let total = page_bytes.len();

        let mut pages: Vec<Page> = page_bytes
            .iter()
            .enumerate()
            .map(|(ordinal, bytes)| {
                let (w, h) = rendered_size(bytes);
                Page::pending(ordinal, w, h)
            })
            .collect();

        log::info!(
            "[Orchestrator] 开始处理 {} 页, 并发上限 {}",
            total,
            self.worker_limit
        );
        progress.report(ProgressEvent::Started { total_pages: total });

        let tasks: Vec<BoxFuture<'_, (usize, anyhow::Result<PageExtraction>)>> = page_bytes
            .iter()
            .enumerate()
            .map(|(ordinal, bytes)| {
                async move {
                    let outcome = extractor.extract(bytes, ordinal, document_type).await;
                    (ordinal, outcome)
                }
                .boxed()
            })
            .collect();
        let mut outcomes = stream::iter(tasks).buffer_unordered(self.worker_limit);

        let mut completed = 0;
        while let Some((ordinal, outcome)) = outcomes.next().await {
            let resolved = interpret(ordinal, outcome);
            if let Err(reason) = &resolved {
                let failure = CoreError::PageExtractionFailure {
                    ordinal,
                    reason: reason.clone(),
                };
                log::warn!("[Orchestrator] {}", failure);
            }
            let success = resolved.is_ok();
            pages[ordinal].resolve(resolved);
            completed += 1;
            progress.report(ProgressEvent::PageResolved {
                ordinal,
                success,
                completed,
                total_pages: total,
            });
        }

        let reports: Vec<_> = pages.iter().map(Page::report).collect();
        let succeeded = reports.iter().filter(|r| r.success).count();
        progress.report(ProgressEvent::Finished {
            succeeded,
            failed: total - succeeded,
        });

        if succeeded == 0 {
            return Err(CoreError::NoPagesProcessed {
                total,
                pages: reports,
            });
        }

        let extracted_text = pages
            .iter()
            .filter(|p| p.status() == PageStatus::Succeeded)
            .map(|p| format!("[Page {}]\n{}", p.ordinal + 1, p.extracted_text()))
            .collect::<Vec<_>>()
            .join("\n\n");
        let fields: Vec<Field> = pages.iter().flat_map(|p| p.fields().iter().cloned()).collect();

        log::info!(
            "[Orchestrator] 完成: 成功 {} 页, 失败 {} 页, 字段 {} 个",
            succeeded,
            total - succeeded,
            fields.len()
        );

        Ok(PipelineResult {
            success: true,
            document_type: document_type.map(String::from),
            pages: reports,
            extracted_text,
            fields,
        })
    }
}
