//! PDF 错误类型

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("PDF 加载失败: {0}")]
    Load(#[source] lopdf::Error),

    #[error("PDF 保存失败: {0}")]
    Save(String),

    #[error("页面 {0} 不存在")]
    PageNotFound(usize),

    #[error("内容流处理失败: {0}")]
    Content(String),
}
