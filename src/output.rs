// 该文件是 BomLens 项目的一部分。
// src/output.rs - 标注图输出
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

use std::path::PathBuf;

use image::RgbImage;
use thiserror::Error;

use crate::model::ColoredObject;

pub mod draw;
pub mod font;
mod save_image_file;

pub use self::draw::Draw;
pub use self::font::LabelFont;
pub use self::save_image_file::{Rotation, overlay_file_name, overlay_url};

pub const DEFAULT_OUTPUT_DIR: &str = "static/overlays";
pub const DEFAULT_URL_PREFIX: &str = "/static/overlays";

#[derive(Error, Debug)]
pub enum OverlayError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("无法加载标签字体")]
  FontLoadError,
}

/// 将检测结果渲染为标注图并保存，返回其相对 URL
pub trait Render {
  fn render_overlay(
    &self,
    image: &RgbImage,
    objects: &[ColoredObject],
    source_name: &str,
  ) -> Result<String, OverlayError>;
}

#[derive(Debug, Clone)]
pub struct OverlayConfig {
  pub output_dir: PathBuf,
  pub url_prefix: String,
  pub rotation: Rotation,
  pub font_path: Option<PathBuf>,
}

impl Default for OverlayConfig {
  fn default() -> Self {
    Self {
      output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
      url_prefix: DEFAULT_URL_PREFIX.to_string(),
      rotation: Rotation::default(),
      font_path: None,
    }
  }
}

impl OverlayConfig {
  pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
    self.output_dir = output_dir.into();
    self
  }

  pub fn with_url_prefix(mut self, url_prefix: impl Into<String>) -> Self {
    self.url_prefix = url_prefix.into();
    self
  }

  pub fn with_rotation(mut self, rotation: Rotation) -> Self {
    self.rotation = rotation;
    self
  }

  pub fn with_font_path(mut self, font_path: Option<PathBuf>) -> Self {
    self.font_path = font_path;
    self
  }
}

/// 保存到本地目录的标注图渲染器
pub struct OverlayRenderer {
  draw: Draw,
  config: OverlayConfig,
}

impl OverlayRenderer {
  pub fn new(config: OverlayConfig) -> Result<Self, OverlayError> {
    let font = LabelFont::load(config.font_path.as_deref())?;
    Ok(Self {
      draw: Draw::new(font),
      config,
    })
  }
}

impl Render for OverlayRenderer {
  fn render_overlay(
    &self,
    image: &RgbImage,
    objects: &[ColoredObject],
    source_name: &str,
  ) -> Result<String, OverlayError> {
    let mut canvas = image.clone();
    self.draw.draw_objects(&mut canvas, objects);

    let file_name = overlay_file_name(source_name);
    save_image_file::save_image(
      canvas,
      &self.config.output_dir.join(&file_name),
      self.config.rotation,
    )?;

    Ok(overlay_url(&self.config.url_prefix, &file_name))
  }
}
