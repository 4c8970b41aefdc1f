// 该文件是 BomLens 项目的一部分。
// src/augment.rs - 常见配件补全
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

use std::collections::HashSet;

use tracing::debug;

use crate::model::{DetectedObject, PartSpec};

/// 常见配件模板
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DefaultPart {
  pub part: &'static str,
  pub material: &'static str,
  pub cost: f64,
}

const fn part(part: &'static str, material: &'static str, cost: f64) -> DefaultPart {
  DefaultPart {
    part,
    material,
    cost,
  }
}

const WOOD_SCREWS: DefaultPart = part("wood screws", "steel", 0.08);

// 键为小写标签
const COMMON_PARTS: &[(&str, &[DefaultPart])] = &[
  ("chair", &[WOOD_SCREWS, part("felt floor glides", "felt", 0.20)]),
  ("table", &[WOOD_SCREWS, part("wood glue", "PVA adhesive", 0.15)]),
  ("desk", &[WOOD_SCREWS, part("drawer slides", "steel", 4.50)]),
  ("bed", &[part("bed frame bolts", "steel", 0.50), WOOD_SCREWS]),
  ("bookshelf", &[part("shelf pins", "steel", 0.10), WOOD_SCREWS]),
  ("cabinet", &[part("hinges", "steel", 1.50), WOOD_SCREWS]),
  (
    "sofa",
    &[
      part("upholstery staples", "steel", 0.02),
      part("furniture leg bolts", "steel", 0.40),
    ],
  ),
  (
    "couch",
    &[
      part("upholstery staples", "steel", 0.02),
      part("furniture leg bolts", "steel", 0.40),
    ],
  ),
  (
    "lamp",
    &[
      part("light bulb", "glass", 2.50),
      part("power cord", "copper and PVC", 3.00),
    ],
  ),
  (
    "bicycle",
    &[
      part("chain lube", "oil", 0.50),
      part("inner tube", "butyl rubber", 6.00),
    ],
  ),
];

/// 查询某标签的常见配件
pub fn common_parts_for(label: &str) -> Option<&'static [DefaultPart]> {
  let key = label.trim().to_lowercase();
  COMMON_PARTS
    .iter()
    .find(|(name, _)| *name == key)
    .map(|(_, parts)| *parts)
}

/// 为识别到的常见物体补充默认配件，已存在的同名零件（不区分大小写）不会被覆盖
pub fn augment_common_parts(mut objects: Vec<DetectedObject>) -> Vec<DetectedObject> {
  for object in objects.iter_mut() {
    let Some(defaults) = common_parts_for(&object.label) else {
      continue;
    };

    let mut present: HashSet<String> = object
      .parts
      .iter()
      .map(|p| p.part.trim().to_lowercase())
      .collect();

    for default in defaults {
      if present.insert(default.part.to_lowercase()) {
        debug!("为 {} 补充配件: {}", object.label, default.part);
        object
          .parts
          .push(PartSpec::new(default.part, default.material, default.cost));
      }
    }
  }
  objects
}
