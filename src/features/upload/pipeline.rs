//! 图片规范化：解码 → 按 EXIF 方向摆正 → 限框缩小 → JPEG 重新编码。
//!
//! 纯 CPU 计算，无 I/O；调用方负责放到 blocking 线程池执行。

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, GenericImageView, ImageDecoder, ImageError, ImageReader, Limits};
use thiserror::Error;

use crate::config::ImageConfig;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("读取图片数据失败: {0}")]
    Sniff(#[source] std::io::Error),
    #[error("图片解码失败: {0}")]
    Decode(#[source] ImageError),
    #[error("JPEG 编码失败: {0}")]
    Encode(#[source] ImageError),
}

/// 转换参数
#[derive(Debug, Clone, Copy)]
pub struct TransformOptions {
    pub max_width: u32,
    pub max_height: u32,
    pub jpeg_quality: u8,
    pub filter: FilterType,
    pub max_decode_dimension: u32,
}

impl TransformOptions {
    pub fn from_config(cfg: &ImageConfig) -> Self {
        Self {
            max_width: cfg.max_width,
            max_height: cfg.max_height,
            jpeg_quality: cfg.jpeg_quality.clamp(1, 100),
            filter: if cfg.optimize_speed {
                FilterType::Triangle
            } else {
                FilterType::Lanczos3
            },
            max_decode_dimension: cfg.max_decode_dimension,
        }
    }
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self::from_config(&ImageConfig::default())
    }
}

/// 计算“放进限框且不放大”后的尺寸，保持宽高比（四舍五入，最小 1px）。
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }
    let (w, h) = (u64::from(width), u64::from(height));
    let (mw, mh) = (u64::from(max_width), u64::from(max_height));

    // w/h > mw/mh 时宽度先触边
    if w * mh >= h * mw {
        let scaled_h = (h * mw + w / 2) / w;
        (max_width, scaled_h.clamp(1, mh) as u32)
    } else {
        let scaled_w = (w * mh + h / 2) / h;
        (scaled_w.clamp(1, mw) as u32, max_height)
    }
}

/// 摆正方向并缩进限框。
pub(crate) fn orient_and_fit(
    mut img: DynamicImage,
    orientation: Orientation,
    opts: &TransformOptions,
) -> DynamicImage {
    img.apply_orientation(orientation);

    let (w, h) = img.dimensions();
    let (tw, th) = fit_within(w, h, opts.max_width, opts.max_height);
    if (tw, th) == (w, h) {
        img
    } else {
        img.resize_exact(tw, th, opts.filter)
    }
}

/// 完整转换流程，输出 JPEG 字节（不含 EXIF）。
pub fn normalize(input: &[u8], opts: &TransformOptions) -> Result<Vec<u8>, TransformError> {
    let mut reader = ImageReader::new(Cursor::new(input))
        .with_guessed_format()
        .map_err(TransformError::Sniff)?;

    let mut limits = Limits::default();
    limits.max_image_width = Some(opts.max_decode_dimension);
    limits.max_image_height = Some(opts.max_decode_dimension);
    reader.limits(limits);

    let mut decoder = reader.into_decoder().map_err(TransformError::Decode)?;
    // 方向元数据损坏时按原样处理
    let orientation = decoder
        .orientation()
        .unwrap_or(Orientation::NoTransforms);
    let img = DynamicImage::from_decoder(decoder).map_err(TransformError::Decode)?;

    let img = orient_and_fit(img, orientation, opts);
    let rgb = img.to_rgb8();

    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, opts.jpeg_quality);
    rgb.write_with_encoder(encoder)
        .map_err(TransformError::Encode)?;
    Ok(out)
}
