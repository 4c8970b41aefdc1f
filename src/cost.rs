// 该文件是 BomLens 项目的一部分。
// src/cost.rs - 成本汇总
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

use crate::model::{ColoredObject, PriceSource, PricedPart};

/// 四舍五入到分
pub fn round_cents(value: f64) -> f64 {
  (value * 100.0).round() / 100.0
}

/// 按物体、零件顺序展开为扁平清单，价格来源均为模型估算
pub fn aggregate(objects: &[ColoredObject]) -> Vec<PricedPart> {
  objects
    .iter()
    .flat_map(|colored| {
      colored.object.parts.iter().map(move |part| PricedPart {
        object: colored.object.label.clone(),
        part: part.part.clone(),
        material: part.material.clone(),
        cost: round_cents(part.cost.max(0.0)),
        color: colored.color,
        price_source: PriceSource::ModelEstimate,
      })
    })
    .collect()
}

/// 总价总是由清单重新求和
pub fn total_cost(parts: &[PricedPart]) -> f64 {
  round_cents(parts.iter().map(|p| p.cost).sum())
}
