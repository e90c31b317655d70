//! 流水线上下文：一次运行用到的协作者与配置
//!
//! 存储回退策略在构建时确定，运行过程中不再变化。

use std::sync::Arc;

use crate::collaborators::{
    ArtifactStore, ClassificationEngine, ExtractionEngine, FeedbackStore, PageRenderer,
    PdfPageSplitter, SemanticFieldMatcher, TaxonomyService,
};
use crate::config::PipelineConfig;
use crate::storage::{FallbackArtifactStore, InMemoryArtifactStore, InMemoryFeedbackStore};
use crate::taxonomy::StaticTaxonomy;

#[derive(Clone)]
pub struct PipelineContext {
    pub renderer: Arc<dyn PageRenderer>,
    pub extractor: Arc<dyn ExtractionEngine>,
    pub classifier: Arc<dyn ClassificationEngine>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub feedback: Arc<dyn FeedbackStore>,
    pub taxonomy: Arc<dyn TaxonomyService>,
    pub matcher: Option<Arc<dyn SemanticFieldMatcher>>,
    pub config: PipelineConfig,
}

impl PipelineContext {
    /// 提取与分类引擎没有默认实现，其余协作者默认使用本地实现
    pub fn builder(
        extractor: Arc<dyn ExtractionEngine>,
        classifier: Arc<dyn ClassificationEngine>,
    ) -> PipelineContextBuilder {
        PipelineContextBuilder {
            renderer: None,
            extractor,
            classifier,
            artifacts: None,
            fallback: None,
            feedback: None,
            taxonomy: None,
            matcher: None,
            config: PipelineConfig::default(),
        }
    }
}

pub struct PipelineContextBuilder {
    renderer: Option<Arc<dyn PageRenderer>>,
    extractor: Arc<dyn ExtractionEngine>,
    classifier: Arc<dyn ClassificationEngine>,
    artifacts: Option<Arc<dyn ArtifactStore>>,
    fallback: Option<Arc<dyn ArtifactStore>>,
    feedback: Option<Arc<dyn FeedbackStore>>,
    taxonomy: Option<Arc<dyn TaxonomyService>>,
    matcher: Option<Arc<dyn SemanticFieldMatcher>>,
    config: PipelineConfig,
}

impl PipelineContextBuilder {
    pub fn renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn artifacts(mut self, artifacts: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    /// 主存储写入失败时改用 `fallback`
    pub fn with_fallback_storage(mut self, fallback: Arc<dyn ArtifactStore>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn feedback(mut self, feedback: Arc<dyn FeedbackStore>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    pub fn taxonomy(mut self, taxonomy: Arc<dyn TaxonomyService>) -> Self {
        self.taxonomy = Some(taxonomy);
        self
    }

    pub fn matcher(mut self, matcher: Arc<dyn SemanticFieldMatcher>) -> Self {
        self.matcher = Some(matcher);
        self
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> PipelineContext {
        let primary = self
            .artifacts
            .unwrap_or_else(|| Arc::new(InMemoryArtifactStore::new()));
        let artifacts: Arc<dyn ArtifactStore> = match self.fallback {
            Some(fallback) => Arc::new(FallbackArtifactStore::new(primary, fallback)),
            None => primary,
        };
        PipelineContext {
            renderer: self.renderer.unwrap_or_else(|| Arc::new(PdfPageSplitter)),
            extractor: self.extractor,
            classifier: self.classifier,
            artifacts,
            feedback: self
                .feedback
                .unwrap_or_else(|| Arc::new(InMemoryFeedbackStore::new())),
            taxonomy: self
                .taxonomy
                .unwrap_or_else(|| Arc::new(StaticTaxonomy::new())),
            matcher: self.matcher,
            config: self.config,
        }
    }
}
