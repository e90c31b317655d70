//! 页面拆分

use lopdf::Document;

use crate::error::PdfError;

/// 读取 PDF 页数
pub fn page_count(bytes: &[u8]) -> Result<usize, PdfError> {
    let doc = Document::load_mem(bytes).map_err(PdfError::Load)?;
    Ok(doc.get_pages().len())
}

/// 将多页 PDF 拆分为按页序排列的单页 PDF
///
/// 每个输出文档只保留一页，未引用的对象会被清理。
pub fn split_pages(bytes: &[u8]) -> Result<Vec<Vec<u8>>, PdfError> {
    let doc = Document::load_mem(bytes).map_err(PdfError::Load)?;
    let total = doc.get_pages().len() as u32;
    log::info!("[Pdf] 拆分文档: {} 页", total);

    let mut outputs = Vec::with_capacity(total as usize);
    for keep in 1..=total {
        let mut single = doc.clone();
        // 从后往前删除，保持页码稳定
        let to_delete: Vec<u32> = (1..=total).rev().filter(|p| *p != keep).collect();
        for page_num in to_delete {
            single.delete_pages(&[page_num]);
        }
        single.prune_objects();

        let mut buffer = Vec::new();
        single
            .save_to(&mut buffer)
            .map_err(|e| PdfError::Save(e.to_string()))?;
        log::debug!("[Pdf] 第 {} 页拆分完成: {} bytes", keep, buffer.len());
        outputs.push(buffer);
    }

    Ok(outputs)
}
