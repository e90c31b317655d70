//! 栅格渲染错误类型

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("图片解码失败: {0}")]
    Decode(#[source] image::ImageError),

    #[error("图片编码失败: {0}")]
    Encode(#[source] image::ImageError),

    #[error("TIFF 解析失败: {0}")]
    Tiff(#[source] tiff::TiffError),
}
