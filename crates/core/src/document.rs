//! 文档与页面数据模型
//!
//! 页面由编排器在拆分时创建，提取结果返回时恰好被写入一次，之后不再变化。

use serde::{Deserialize, Serialize};
use veil_geometry::{BoundingBox, RawBoundingBox};

/// 未匹配到分类体系元素的字段类别
pub const DEFAULT_CATEGORY: &str = "uncategorized";

/// 页面状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    #[default]
    Pending,
    Succeeded,
    Failed,
}

/// 字段处理动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FieldAction {
    #[default]
    Extract,
    Redact,
    ExtractAndRedact,
    Ignore,
}

impl FieldAction {
    pub fn redacts(&self) -> bool {
        matches!(self, FieldAction::Redact | FieldAction::ExtractAndRedact)
    }
}

/// 提取出的字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: String,
    pub label: String,
    pub value: String,
    pub confidence: f32,
    pub page_ordinal: usize,
    pub bounding_box: Option<BoundingBox>,
    #[serde(default)]
    pub word_boxes: Vec<BoundingBox>,
    #[serde(default)]
    pub action: FieldAction,
    pub category: String,
}

impl Field {
    pub fn has_geometry(&self) -> bool {
        self.bounding_box.is_some() || !self.word_boxes.is_empty()
    }
}

/// 提取引擎返回的单个字段（原始结构）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedField {
    pub label: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub bounding_box: Option<RawBoundingBox>,
    #[serde(default)]
    pub word_boxes: Vec<RawBoundingBox>,
    #[serde(default)]
    pub category: Option<String>,
}

/// 提取引擎对单页的响应
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageExtraction {
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub fields: Vec<ExtractedField>,
}

fn default_true() -> bool {
    true
}

impl PageExtraction {
    pub fn ok(text: impl Into<String>, fields: Vec<ExtractedField>) -> Self {
        Self {
            success: true,
            error: None,
            text: text.into(),
            fields,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            text: String::new(),
            fields: Vec::new(),
        }
    }
}

/// 多页文档中的一页
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub ordinal: usize,
    pub rendered_width: u32,
    pub rendered_height: u32,
    status: PageStatus,
    error: Option<String>,
    extracted_text: String,
    fields: Vec<Field>,
}

impl Page {
    pub(crate) fn pending(ordinal: usize, rendered_width: u32, rendered_height: u32) -> Self {
        Self {
            ordinal,
            rendered_width,
            rendered_height,
            status: PageStatus::Pending,
            error: None,
            extracted_text: String::new(),
            fields: Vec::new(),
        }
    }

    pub fn status(&self) -> PageStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn extracted_text(&self) -> &str {
        &self.extracted_text
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// 写入提取结果，页面只接受一次结果
    pub(crate) fn resolve(&mut self, outcome: std::result::Result<(String, Vec<Field>), String>) {
        if self.status != PageStatus::Pending {
            log::warn!("[Orchestrator] 第 {} 页已有结果，忽略重复写入", self.ordinal + 1);
            return;
        }
        match outcome {
            Ok((text, fields)) => {
                self.status = PageStatus::Succeeded;
                self.extracted_text = text;
                self.fields = fields;
            }
            Err(error) => {
                self.status = PageStatus::Failed;
                self.error = Some(error);
            }
        }
    }

    pub fn report(&self) -> PageReport {
        PageReport {
            ordinal: self.ordinal,
            success: self.status == PageStatus::Succeeded,
            error: self.error.clone(),
            rendered_width: self.rendered_width,
            rendered_height: self.rendered_height,
            field_count: self.fields.len(),
        }
    }
}

/// 单页处理结果摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageReport {
    pub ordinal: usize,
    pub success: bool,
    pub error: Option<String>,
    pub rendered_width: u32,
    pub rendered_height: u32,
    pub field_count: usize,
}

/// 一次文档处理的汇总结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub success: bool,
    pub document_type: Option<String>,
    pub pages: Vec<PageReport>,
    pub extracted_text: String,
    pub fields: Vec<Field>,
}

impl PipelineResult {
    pub fn succeeded_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.success).count()
    }

    pub fn failed_pages(&self) -> usize {
        self.pages.len() - self.succeeded_pages()
    }

    pub fn field(&self, id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_resolves_once() {
        let mut page = Page::pending(2, 100, 200);
        page.resolve(Err("timeout".to_string()));
        page.resolve(Ok(("late".to_string(), Vec::new())));

        assert_eq!(page.status(), PageStatus::Failed);
        assert_eq!(page.error(), Some("timeout"));
        assert_eq!(page.extracted_text(), "");

        let report = page.report();
        assert_eq!(report.ordinal, 2);
        assert!(!report.success);
    }

    #[test]
    fn test_page_extraction_wire_defaults() {
        let extraction: PageExtraction = serde_json::from_str(
            r#"{"text":"hello","fields":[{"label":"Name","value":"Ann","confidence":0.9,
                "boundingBox":{"Left":0.1,"Top":0.1,"Width":0.2,"Height":0.05},
                "wordBoxes":[{"x":0.1,"y":0.1,"width":0.1,"height":0.05}]}]}"#,
        )
        .unwrap();
        assert!(extraction.success);
        assert_eq!(extraction.fields.len(), 1);
        assert!(matches!(
            extraction.fields[0].bounding_box,
            Some(RawBoundingBox::Capitalized { .. })
        ));
        assert_eq!(extraction.fields[0].word_boxes.len(), 1);
    }

    #[test]
    fn test_field_action_redacts() {
        assert!(FieldAction::Redact.redacts());
        assert!(FieldAction::ExtractAndRedact.redacts());
        assert!(!FieldAction::Extract.redacts());
        assert!(!FieldAction::Ignore.redacts());
    }
}
