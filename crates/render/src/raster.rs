use std::io::Cursor;

use image::{DynamicImage, ImageFormat, ImageReader, Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use tiff::decoder::Decoder;
use veil_geometry::{DeviceRect, FillRegion, Surface};

use crate::error::RenderError;

/// 脱敏后的图片
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RasterOutput {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub width: u32,
    pub height: u32,
}

/// 读取图片尺寸（只解析文件头）
pub fn sniff_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// 图片包含的帧数：TIFF 逐个统计 IFD，其余格式按单帧处理
pub fn frame_count(bytes: &[u8]) -> Result<usize, RenderError> {
    if image::guess_format(bytes).ok() != Some(ImageFormat::Tiff) {
        return Ok(1);
    }
    let mut decoder = Decoder::new(Cursor::new(bytes)).map_err(RenderError::Tiff)?;
    let mut frames = 1;
    while decoder.more_images() {
        decoder.next_image().map_err(RenderError::Tiff)?;
        frames += 1;
    }
    Ok(frames)
}

pub fn content_type_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "image/jpeg",
        _ => "image/png",
    }
}

/// 待脱敏的图片
pub struct RasterTarget {
    image: RgbaImage,
    format: ImageFormat,
}

impl RasterTarget {
    pub fn load(bytes: &[u8]) -> Result<Self, RenderError> {
        let format = image::guess_format(bytes).map_err(RenderError::Decode)?;
        let image = image::load_from_memory_with_format(bytes, format)
            .map_err(RenderError::Decode)?
            .to_rgba8();
        Ok(Self { image, format })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// 图片对应的绘制表面（像素，原点左上）
    pub fn surface(&self) -> Surface {
        let (w, h) = self.dimensions();
        Surface::raster(w as f64, h as f64)
    }

    /// 合成填充块并编码输出
    ///
    /// JPEG 源保持 JPEG 输出，其余格式统一输出 PNG。
    pub fn fill_regions(
        mut self,
        regions: &[FillRegion],
        color: [u8; 4],
    ) -> Result<RasterOutput, RenderError> {
        let (width, height) = self.dimensions();
        // 合成时强制不透明
        let fill = Rgba([color[0], color[1], color[2], 255]);

        let mut drawn = 0usize;
        for region in regions {
            let Some(rect) = pixel_rect(&region.rect, width, height) else {
                log::debug!("[Raster] 跳过空区域: {:?}", region.rect);
                continue;
            };
            draw_filled_rect_mut(&mut self.image, rect, fill);
            drawn += 1;
        }
        log::info!("[Raster] {}x{} 图片绘制 {} 个填充块", width, height, drawn);

        let output_format = match self.format {
            ImageFormat::Jpeg => ImageFormat::Jpeg,
            _ => ImageFormat::Png,
        };

        let mut bytes = Vec::new();
        let mut cursor = Cursor::new(&mut bytes);
        let image = DynamicImage::ImageRgba8(self.image);
        if output_format == ImageFormat::Jpeg {
            DynamicImage::ImageRgb8(image.to_rgb8())
                .write_to(&mut cursor, output_format)
                .map_err(RenderError::Encode)?;
        } else {
            image
                .write_to(&mut cursor, output_format)
                .map_err(RenderError::Encode)?;
        }

        Ok(RasterOutput {
            bytes,
            content_type: content_type_for(output_format).to_string(),
            width,
            height,
        })
    }
}

/// 设备坐标向外取整到像素网格，并裁剪到图片范围
fn pixel_rect(rect: &DeviceRect, width: u32, height: u32) -> Option<Rect> {
    let x0 = rect.x.floor().max(0.0);
    let y0 = rect.y.floor().max(0.0);
    let x1 = rect.right().ceil().min(width as f64);
    let y1 = rect.bottom().ceil().min(height as f64);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(Rect::at(x0 as i32, y0 as i32).of_size((x1 - x0) as u32, (y1 - y0) as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn white_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn rect(x: f64, y: f64, width: f64, height: f64) -> DeviceRect {
        DeviceRect {
            x,
            y,
            width,
            height,
        }
    }

    #[test]
    fn test_sniff_dimensions() {
        assert_eq!(sniff_dimensions(&white_png(40, 30)), Some((40, 30)));
        assert_eq!(sniff_dimensions(b"%PDF-1.7"), None);
    }

    #[test]
    fn test_fill_regions_paints_opaque_rect() {
        let source = white_png(100, 100);
        let target = RasterTarget::load(&source).unwrap();
        assert_eq!(target.surface(), Surface::raster(100.0, 100.0));

        let output = target
            .fill_regions(&[FillRegion::new(rect(10.5, 10.0, 19.0, 20.0))], [0, 0, 0, 255])
            .unwrap();
        assert_eq!(output.content_type, "image/png");
        assert_eq!((output.width, output.height), (100, 100));

        let img = image::load_from_memory(&output.bytes).unwrap().to_rgba8();
        assert_eq!(img.get_pixel(15, 15), &Rgba([0, 0, 0, 255]));
        assert_eq!(img.get_pixel(10, 10), &Rgba([0, 0, 0, 255]));
        assert_eq!(img.get_pixel(29, 29), &Rgba([0, 0, 0, 255]));
        assert_eq!(img.get_pixel(30, 30), &Rgba([255, 255, 255, 255]));
        assert_eq!(img.get_pixel(5, 5), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_fill_regions_custom_color_and_clipping() {
        let target = RasterTarget::load(&white_png(20, 20)).unwrap();
        let output = target
            .fill_regions(
                &[
                    FillRegion::new(rect(15.0, 15.0, 50.0, 50.0)),
                    FillRegion::new(rect(30.0, 30.0, 5.0, 5.0)),
                ],
                [200, 0, 0, 128],
            )
            .unwrap();
        let img = image::load_from_memory(&output.bytes).unwrap().to_rgba8();
        assert_eq!(img.get_pixel(19, 19), &Rgba([200, 0, 0, 255]));
        assert_eq!(img.get_pixel(14, 14), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_pixel_rect_rejects_empty() {
        assert!(pixel_rect(&rect(5.0, 5.0, 0.0, 3.0), 10, 10).is_none());
        assert!(pixel_rect(&rect(12.0, 0.0, 3.0, 3.0), 10, 10).is_none());
        let r = pixel_rect(&rect(-2.0, -2.0, 4.0, 4.0), 10, 10).unwrap();
        assert_eq!((r.left(), r.top(), r.width(), r.height()), (0, 0, 2, 2));
    }

    fn gray_tiff(frames: usize) -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        let mut encoder = tiff::encoder::TiffEncoder::new(&mut bytes).unwrap();
        let pixels = vec![255u8; 8 * 8];
        for _ in 0..frames {
            encoder
                .write_image::<tiff::encoder::colortype::Gray8>(8, 8, &pixels)
                .unwrap();
        }
        bytes.into_inner()
    }

    #[test]
    fn test_frame_count() {
        assert_eq!(frame_count(&gray_tiff(3)).unwrap(), 3);
        assert_eq!(frame_count(&gray_tiff(1)).unwrap(), 1);
        assert_eq!(frame_count(&white_png(4, 4)).unwrap(), 1);
    }

    #[test]
    fn test_load_rejects_garbage() {
        assert!(matches!(
            RasterTarget::load(b"garbage"),
            Err(RenderError::Decode(_))
        ));
    }
}
