//! 分类体系元素与字段匹配

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::collaborators::TaxonomyService;
use crate::document::{Field, FieldAction, DEFAULT_CATEGORY};

/// 语义匹配建议的最低采纳置信度
pub const SEMANTIC_MATCH_FLOOR: f32 = 0.5;

/// 文档类型下预期出现的元素
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonomyElement {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub action: FieldAction,
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

impl TaxonomyElement {
    fn matches_label(&self, label: &str) -> bool {
        let wanted = normalize_label(label);
        !wanted.is_empty()
            && std::iter::once(&self.label)
                .chain(self.aliases.iter())
                .any(|candidate| normalize_label(candidate) == wanted)
    }
}

/// 语义匹配建议
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMatch {
    pub extracted_id: String,
    pub configured_id: String,
    pub confidence: f32,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// 只保留字母数字并转小写，"Date of Birth:" 与 "date_of_birth" 视为相同
fn normalize_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn assign(field: &mut Field, element: &TaxonomyElement) {
    field.action = element.action;
    field.category = element.category.clone();
}

/// 按标签匹配分类体系元素，返回命中的字段 id
pub fn apply_taxonomy(fields: &mut [Field], elements: &[TaxonomyElement]) -> HashSet<String> {
    let mut matched = HashSet::new();
    for field in fields.iter_mut() {
        if let Some(element) = elements.iter().find(|e| e.matches_label(&field.label)) {
            assign(field, element);
            matched.insert(field.id.clone());
        }
    }
    matched
}

/// 采纳语义匹配建议
///
/// 只作用于 `label_matched` 之外的字段，每个字段最多采纳一条建议。置信度低于
/// [`SEMANTIC_MATCH_FLOOR`] 的建议忽略；建议不能取消字段已有的脱敏动作。
pub fn apply_semantic_matches(
    fields: &mut [Field],
    elements: &[TaxonomyElement],
    matches: &[FieldMatch],
    label_matched: &HashSet<String>,
) -> usize {
    let mut applied = HashSet::new();
    for suggestion in matches {
        if suggestion.confidence < SEMANTIC_MATCH_FLOOR
            || label_matched.contains(&suggestion.extracted_id)
            || applied.contains(&suggestion.extracted_id)
        {
            continue;
        }
        let Some(element) = elements.iter().find(|e| e.id == suggestion.configured_id) else {
            log::debug!("[Taxonomy] 未知元素 {}", suggestion.configured_id);
            continue;
        };
        let Some(field) = fields.iter_mut().find(|f| f.id == suggestion.extracted_id) else {
            continue;
        };
        if field.action.redacts() && !element.action.redacts() {
            log::info!(
                "[Taxonomy] 保留字段 {} 的脱敏动作，忽略建议 {}",
                field.id,
                element.id
            );
            continue;
        }
        assign(field, element);
        applied.insert(field.id.clone());
    }
    applied.len()
}

/// 内存中的分类体系配置
#[derive(Debug, Clone, Default)]
pub struct StaticTaxonomy {
    types: HashMap<String, Vec<TaxonomyElement>>,
}

impl StaticTaxonomy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(
        mut self,
        document_type: impl Into<String>,
        elements: Vec<TaxonomyElement>,
    ) -> Self {
        self.types.insert(document_type.into(), elements);
        self
    }
}

#[async_trait]
impl TaxonomyService for StaticTaxonomy {
    async fn expected_elements(&self, document_type: &str) -> Result<Vec<TaxonomyElement>> {
        Ok(self.types.get(document_type).cloned().unwrap_or_default())
    }
}
