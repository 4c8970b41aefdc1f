// 该文件是 BomLens 项目的一部分。
// src/model.rs - 物料清单数据模型
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

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize, Serializer};

/// 归一化边界框，坐标顺序为 [y0, x0, y1, x1]，取值范围 [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoundingBox(pub [f32; 4]);

impl BoundingBox {
  pub fn y0(&self) -> f32 {
    self.0[0]
  }

  pub fn x0(&self) -> f32 {
    self.0[1]
  }

  pub fn y1(&self) -> f32 {
    self.0[2]
  }

  pub fn x1(&self) -> f32 {
    self.0[3]
  }

  /// 换算为像素坐标 (x_min, y_min, x_max, y_max)，并限制在图像范围内
  pub fn to_pixels(&self, width: u32, height: u32) -> (i32, i32, i32, i32) {
    let (w, h) = (width as f32, height as f32);
    let max_x = (width as i32 - 1).max(0);
    let max_y = (height as i32 - 1).max(0);

    let x_min = ((self.x0() * w).floor() as i32).clamp(0, max_x);
    let y_min = ((self.y0() * h).floor() as i32).clamp(0, max_y);
    let x_max = ((self.x1() * w).ceil() as i32).clamp(0, max_x);
    let y_max = ((self.y1() * h).ceil() as i32).clamp(0, max_y);

    (x_min, y_min, x_max, y_max)
  }
}

/// 单个零件的材料与估价（美元）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartSpec {
  pub part: String,
  #[serde(default)]
  pub material: String,
  #[serde(default)]
  pub cost: f64,
}

impl PartSpec {
  pub fn new(part: impl Into<String>, material: impl Into<String>, cost: f64) -> Self {
    Self {
      part: part.into(),
      material: material.into(),
      cost,
    }
  }
}

/// 模型识别出的物体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
  pub label: String,
  #[serde(rename = "box_2d", default, skip_serializing_if = "Option::is_none")]
  pub bounding_box: Option<BoundingBox>,
  #[serde(default)]
  pub parts: Vec<PartSpec>,
}

/// 8 位 RGB 颜色，序列化为 `#rrggbb`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color(pub [u8; 3]);

impl fmt::Display for Color {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let [r, g, b] = self.0;
    write!(f, "#{:02x}{:02x}{:02x}", r, g, b)
  }
}

impl Serialize for Color {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

impl From<Color> for image::Rgb<u8> {
  fn from(color: Color) -> Self {
    image::Rgb(color.0)
  }
}

/// 已分配颜色的物体
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColoredObject {
  #[serde(flatten)]
  pub object: DetectedObject,
  pub color: Color,
}

/// 价格来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
  ModelEstimate,
  MarketResearch,
}

/// 扁平化后的物料清单条目
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricedPart {
  pub object: String,
  pub part: String,
  pub material: String,
  pub cost: f64,
  pub color: Color,
  pub price_source: PriceSource,
}

impl PricedPart {
  /// 价格查询的去重键 `part|material`
  pub fn price_key(&self) -> String {
    price_key(&self.part, &self.material)
  }
}

pub fn price_key(part: &str, material: &str) -> String {
  format!("{}|{}", part, material)
}

/// 单次分析请求的完整结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BomResult {
  pub bom: Vec<PricedPart>,
  pub total_cost: f64,
  pub overlay_url: String,
  pub color_map: BTreeMap<String, Color>,
  pub objects_meta: Vec<ColoredObject>,
}
