use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

pub const DEFAULT_WORKER_LIMIT: usize = 4;
pub const DEFAULT_AUTO_ACCEPT_THRESHOLD: f32 = 0.8;
pub const DEFAULT_PADDING: f64 = 2.0;
pub const DEFAULT_GRID_COLUMNS: usize = 3;

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    pub orchestrator: OrchestratorConfig,
    pub redaction: RedactionConfig,
    pub gate: GateConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct OrchestratorConfig {
    /// 同时进行的页面提取调用上限
    pub worker_limit: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            worker_limit: DEFAULT_WORKER_LIMIT,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RedactionConfig {
    /// 每个填充块四周外扩的设备单位
    pub padding: f64,
    /// 无坐标字段兜底网格的列数
    pub grid_columns: usize,
    /// 填充颜色 RGBA
    pub fill_color: [u8; 4],
    /// 兜底填充块上是否标注字段名
    pub label_fallbacks: bool,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            padding: DEFAULT_PADDING,
            grid_columns: DEFAULT_GRID_COLUMNS,
            fill_color: [0, 0, 0, 255],
            label_fallbacks: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct GateConfig {
    /// 自动接受的默认置信度阈值
    pub default_threshold: f32,
    /// 按文档类型覆盖的阈值
    pub thresholds: HashMap<String, f32>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            default_threshold: DEFAULT_AUTO_ACCEPT_THRESHOLD,
            thresholds: HashMap::new(),
        }
    }
}

impl GateConfig {
    pub fn threshold_for(&self, document_type: &str) -> f32 {
        self.thresholds
            .get(document_type)
            .copied()
            .unwrap_or(self.default_threshold)
    }
}

impl PipelineConfig {
    /// 环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        if let Some(limit) = env_parse::<usize>("VEIL_WORKER_LIMIT") {
            self.orchestrator.worker_limit = limit;
        }
        if let Some(threshold) = env_parse::<f32>("VEIL_AUTO_ACCEPT_THRESHOLD") {
            self.gate.default_threshold = threshold;
        }
        if let Some(padding) = env_parse::<f64>("VEIL_REDACTION_PADDING") {
            self.redaction.padding = padding;
        }
        if let Some(columns) = env_parse::<usize>("VEIL_GRID_COLUMNS") {
            self.redaction.grid_columns = columns;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.orchestrator.worker_limit == 0 {
            return Err(CoreError::Config("workerLimit must be at least 1".into()));
        }
        if self.redaction.grid_columns == 0 {
            return Err(CoreError::Config("gridColumns must be at least 1".into()));
        }
        if !self.redaction.padding.is_finite() || self.redaction.padding < 0.0 {
            return Err(CoreError::Config(format!(
                "padding must be a non-negative number, got {}",
                self.redaction.padding
            )));
        }
        let thresholds = std::iter::once(("default", self.gate.default_threshold)).chain(
            self.gate
                .thresholds
                .iter()
                .map(|(name, value)| (name.as_str(), *value)),
        );
        for (name, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(CoreError::Config(format!(
                    "threshold for {} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

/// 读取配置文件，文件不存在时使用默认值，然后应用环境变量覆盖
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let mut config = if path.exists() {
        let raw = fs::read_to_string(path).map_err(|e| CoreError::Config(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| CoreError::Config(e.to_string()))?
    } else {
        log::info!("[Config] {} 不存在，使用默认配置", path.display());
        PipelineConfig::default()
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

pub fn save_config(path: &Path, config: &PipelineConfig) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| CoreError::Config(e.to_string()))?;
    }
    let raw = serde_json::to_string_pretty(config).map_err(|e| CoreError::Config(e.to_string()))?;
    fs::write(path, raw).map_err(|e| CoreError::Config(e.to_string()))?;
    Ok(())
}
