// 该文件是 BomLens 项目的一部分。
// src/output/font.rs - 标签字体
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use tracing::{debug, warn};

use crate::output::OverlayError;

const LABEL_FONT_SIZE: f32 = 20.0;

// 内置字体，系统中找不到粗体字体时使用
const EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans-Bold.ttf");

// 常见系统中的粗体字体位置
const BOLD_FONT_CANDIDATES: &[&str] = &[
  "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
  "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
  "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
  "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
  "/Library/Fonts/Arial Bold.ttf",
  "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
  "C:\\Windows\\Fonts\\arialbd.ttf",
];

/// 标签字体：优先指定或系统中的粗体字体，否则使用内置字体
#[derive(Clone)]
pub struct LabelFont {
  font: FontArc,
  scale: PxScale,
}

impl LabelFont {
  pub fn load(preferred: Option<&Path>) -> Result<Self, OverlayError> {
    let candidates = preferred
      .into_iter()
      .chain(BOLD_FONT_CANDIDATES.iter().map(Path::new));

    for path in candidates {
      let Ok(data) = std::fs::read(path) else {
        continue;
      };
      match FontArc::try_from_vec(data) {
        Ok(font) => {
          debug!("使用字体: {}", path.display());
          return Ok(Self::with_font(font));
        }
        Err(e) => warn!("字体文件无效 {}: {}", path.display(), e),
      }
    }

    debug!("未找到系统粗体字体，使用内置字体");
    Self::embedded()
  }

  pub fn embedded() -> Result<Self, OverlayError> {
    let font = FontArc::try_from_slice(EMBEDDED_FONT).map_err(|_| OverlayError::FontLoadError)?;
    Ok(Self::with_font(font))
  }

  fn with_font(font: FontArc) -> Self {
    Self {
      font,
      scale: PxScale::from(LABEL_FONT_SIZE),
    }
  }

  /// 文本的像素尺寸 (宽, 高)
  pub fn text_size(&self, text: &str) -> (u32, u32) {
    text_size(self.scale, &self.font, text)
  }

  pub fn draw_text(&self, image: &mut RgbImage, color: Rgb<u8>, x: i32, y: i32, text: &str) {
    draw_text_mut(image, color, x, y, self.scale, &self.font, text);
  }
}
