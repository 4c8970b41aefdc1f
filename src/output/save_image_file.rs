// 该文件是 BomLens 项目的一部分。
// src/output/save_image_file.rs - 保存标注图文件
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

use std::{fmt, path::Path, str::FromStr};

use image::{RgbImage, imageops};
use tracing::info;

use crate::output::OverlayError;

const OVERLAY_PREFIX: &str = "overlay_";
const FALLBACK_STEM: &str = "upload";

/// 保存前的逆时针旋转角度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
  Keep,
  #[default]
  Ccw90,
  Ccw180,
  Ccw270,
}

impl Rotation {
  pub fn apply(self, image: RgbImage) -> RgbImage {
    // imageops 的旋转方向为顺时针
    match self {
      Rotation::Keep => image,
      Rotation::Ccw90 => imageops::rotate270(&image),
      Rotation::Ccw180 => imageops::rotate180(&image),
      Rotation::Ccw270 => imageops::rotate90(&image),
    }
  }
}

impl FromStr for Rotation {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "0" | "none" | "keep" => Ok(Rotation::Keep),
      "90" => Ok(Rotation::Ccw90),
      "180" => Ok(Rotation::Ccw180),
      "270" => Ok(Rotation::Ccw270),
      other => Err(format!("不支持的旋转角度: {} (可选 none, 90, 180, 270)", other)),
    }
  }
}

impl fmt::Display for Rotation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Rotation::Keep => "none",
      Rotation::Ccw90 => "90",
      Rotation::Ccw180 => "180",
      Rotation::Ccw270 => "270",
    };
    f.write_str(s)
  }
}

/// 由上传文件名生成标注图文件名：去掉目录，空格等替换为下划线，统一保存为 PNG
pub fn overlay_file_name(source_name: &str) -> String {
  let stem = Path::new(source_name.trim())
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_default();

  let sanitized: String = stem
    .chars()
    .map(|c| {
      if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
        c
      } else {
        '_'
      }
    })
    .collect();

  let sanitized = sanitized.trim_matches('.');
  let stem = if sanitized.is_empty() {
    FALLBACK_STEM
  } else {
    sanitized
  };
  format!("{}{}.png", OVERLAY_PREFIX, stem)
}

pub fn overlay_url(url_prefix: &str, file_name: &str) -> String {
  format!(
    "{}/{}",
    url_prefix.trim_end_matches('/'),
    urlencoding::encode(file_name)
  )
}

pub(crate) fn save_image(image: RgbImage, path: &Path, rotation: Rotation) -> Result<(), OverlayError> {
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }

  rotation.apply(image).save(path)?;

  info!("保存标注图到文件: {}", path.display());

  Ok(())
}
