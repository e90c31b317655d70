//! 外部协作者接口
//!
//! 传输方式（HTTP、SDK）不在此定义。所有接口返回 `anyhow::Result`，
//! 由调用方在边界处转换为 [`crate::CoreError`]。

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::classification::{ClassificationFeedback, ClassificationResult};
use crate::document::{Field, PageExtraction};
use crate::taxonomy::{FieldMatch, TaxonomyElement};

/// 存储定位符
pub type ArtifactLocator = String;

/// 页面渲染器：将分页文档拆分为按页序排列的页面字节
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render_pages(&self, source: &[u8], mime_type: &str) -> Result<Vec<Vec<u8>>>;
}

/// 提取引擎（OCR）
#[async_trait]
pub trait ExtractionEngine: Send + Sync {
    async fn extract(
        &self,
        page: &[u8],
        page_ordinal: usize,
        document_type: Option<&str>,
    ) -> Result<PageExtraction>;
}

/// 分类引擎
#[async_trait]
pub trait ClassificationEngine: Send + Sync {
    async fn classify(&self, document: &[u8], mime_type: &str) -> Result<ClassificationResult>;
}

/// 语义字段匹配（LLM），仅作为提取后的可选增强
#[async_trait]
pub trait SemanticFieldMatcher: Send + Sync {
    async fn match_fields(
        &self,
        fields: &[Field],
        elements: &[TaxonomyElement],
    ) -> Result<Vec<FieldMatch>>;
}

/// 源文档与脱敏产物的存储
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, bytes: Vec<u8>, content_type: &str) -> Result<ArtifactLocator>;
    async fn get(&self, locator: &str) -> Result<Vec<u8>>;
}

/// 分类反馈存储
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    async fn append(&self, feedback: ClassificationFeedback) -> Result<String>;
    /// 标记为已用于训练，不可撤销
    async fn mark_used_for_training(&self, id: &str) -> Result<()>;
}

/// 分类体系配置服务
#[async_trait]
pub trait TaxonomyService: Send + Sync {
    async fn expected_elements(&self, document_type: &str) -> Result<Vec<TaxonomyElement>>;
}

/// 基于 lopdf 的默认页面渲染器，每页输出一个单页 PDF
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfPageSplitter;

#[async_trait]
impl PageRenderer for PdfPageSplitter {
    async fn render_pages(&self, source: &[u8], mime_type: &str) -> Result<Vec<Vec<u8>>> {
        if !veil_pdf::is_pdf(source) {
            bail!("PdfPageSplitter 不支持 {}", mime_type);
        }
        Ok(veil_pdf::split_pages(source)?)
    }
}
