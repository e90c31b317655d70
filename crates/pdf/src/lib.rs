//! PDF 页面拆分与矢量脱敏
//!
//! - [`split_pages`]：将多页 PDF 拆分为单页 PDF
//! - [`PdfTarget`]：读取页面几何信息，在页面内容流上绘制填充块

mod error;
mod overlay;
mod page;
mod split;

pub use error::PdfError;
pub use overlay::LABEL_FONT_NAME;
pub use page::{PageGeometry, PdfTarget};
pub use split::{page_count, split_pages};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// 是否为 PDF 内容（检查文件头）
pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}

#[cfg(test)]
pub(crate) mod test_support {
    use lopdf::content::{Content, Operation};
    use lopdf::{Dictionary, Document, Object, Stream};

    /// 生成测试用多页 PDF，页面尺寸为 600x800，MediaBox 设置在父节点上
    pub fn build_pdf(num_pages: usize, rotate: Option<i64>) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let mut page_ids = Vec::new();
        for i in 0..num_pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
                    Operation::new("Td", vec![Object::Integer(100), Object::Integer(700)]),
                    Operation::new("Tj", vec![Object::string_literal(format!("Page {}", i + 1))]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
            let mut page = Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                ("Contents", Object::Reference(content_id)),
            ]);
            if let Some(degrees) = rotate {
                page.set("Rotate", Object::Integer(degrees));
            }
            page_ids.push(doc.add_object(page));
        }

        let font_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"Type1".to_vec())),
            ("BaseFont", Object::Name(b"Courier".to_vec())),
        ]));
        let resources = Dictionary::from_iter(vec![(
            "Font",
            Object::Dictionary(Dictionary::from_iter(vec![("F1", Object::Reference(font_id))])),
        )]);

        let pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(num_pages as i64)),
            (
                "Kids",
                Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
            ),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(600),
                    Object::Integer(800),
                ]),
            ),
            ("Resources", Object::Dictionary(resources)),
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
}
