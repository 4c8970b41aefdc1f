// 该文件是 BomLens 项目的一部分。
// src/palette.rs - 物体配色
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

use crate::model::{Color, ColoredObject, DetectedObject};

const SATURATION: f32 = 0.85;
const BRIGHTNESS: f32 = 0.95;

/// 在色环上均匀分布的 N 个色相（角度）
pub fn hues(n: usize) -> Vec<f32> {
  (0..n).map(|i| (i as f32 / n as f32) * 360.0).collect()
}

/// 生成 N 种色相互不相同的颜色
pub fn distinct_colors(n: usize) -> Vec<Color> {
  hues(n)
    .into_iter()
    .map(|hue| hsv_to_rgb(hue, SATURATION, BRIGHTNESS))
    .collect()
}

/// 按检测顺序为每个物体分配颜色
pub fn assign_colors(objects: Vec<DetectedObject>) -> Vec<ColoredObject> {
  let colors = distinct_colors(objects.len());
  objects
    .into_iter()
    .zip(colors)
    .map(|(object, color)| ColoredObject { object, color })
    .collect()
}

/// HSV 转 RGB
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Color {
  let h = h.rem_euclid(360.0);
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Color([
    ((r + m) * 255.0).round() as u8,
    ((g + m) * 255.0).round() as u8,
    ((b + m) * 255.0).round() as u8,
  ])
}
