// 该文件是 BomLens 项目的一部分。
// src/pricing.rs - 联网搜索价格修正
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

use std::{
  collections::{HashMap, HashSet},
  time::Duration,
};

use chrono::{Datelike, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
  cost::round_cents,
  model::{PriceSource, PricedPart},
  oracle::Oracle,
  parse::{parse_lenient_json, parse_price},
};

/// 免费额度约每分钟 10 次请求，每批合并查询 5 个零件
pub const PRICE_BATCH_SIZE: usize = 5;

#[derive(Debug, Clone)]
pub struct PricingConfig {
  pub batch_size: usize,
  /// 相邻两批之间的等待时间
  pub batch_interval: Duration,
}

impl Default for PricingConfig {
  fn default() -> Self {
    Self {
      batch_size: PRICE_BATCH_SIZE,
      batch_interval: Duration::ZERO,
    }
  }
}

impl PricingConfig {
  pub fn with_batch_size(mut self, batch_size: usize) -> Self {
    self.batch_size = batch_size.max(1);
    self
  }

  pub fn with_batch_interval(mut self, batch_interval: Duration) -> Self {
    self.batch_interval = batch_interval;
    self
  }
}

/// 去重后的待查询零件，`estimate` 为首次出现时的模型估价
#[derive(Debug, Clone, PartialEq)]
struct PriceItem {
  key: String,
  part: String,
  material: String,
  estimate: f64,
}

/// 单批查询的结果，失败只影响本批
#[derive(Debug)]
enum BatchOutcome {
  Priced(HashMap<String, f64>),
  Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentReport {
  pub unique_items: usize,
  pub batches: usize,
  pub failed_batches: usize,
  pub repriced_items: usize,
}

/// 按 `part|material` 去重，保持首次出现的顺序
fn unique_items(parts: &[PricedPart]) -> Vec<PriceItem> {
  let mut seen = HashSet::new();
  let mut items = Vec::new();
  for part in parts {
    let key = part.price_key();
    if seen.insert(key.clone()) {
      items.push(PriceItem {
        key,
        part: part.part.clone(),
        material: part.material.clone(),
        estimate: part.cost,
      });
    }
  }
  items
}

fn search_prompt(batch: &[PriceItem], year: i32) -> String {
  let items = batch
    .iter()
    .map(|item| format!("{} made of {}", item.part, item.material))
    .collect::<Vec<_>>()
    .join(", ");
  format!(
    "What is the average market price (USD, {}) of: {}? \
     Give one typical unit price for each item.",
    year, items
  )
}

fn format_prompt(batch: &[PriceItem], research: &str) -> String {
  let keys = batch.iter().map(|item| item.key.as_str()).collect::<Vec<_>>();
  let keys = serde_json::to_string(&keys).unwrap_or_default();
  format!(
    "Convert the price research below into a strict JSON object.\n\
     Use only these keys: {}.\n\
     Each value must be a single number: the price in USD.\n\
     Omit any key you have no price for. Respond with JSON only, no prose.\n\n\
     Research:\n{}",
    keys, research
  )
}

/// 解析格式化回复，只保留本批期望的键
fn parse_price_map(text: &str, batch: &[PriceItem]) -> Result<HashMap<String, f64>, String> {
  let Value::Object(map) = parse_lenient_json(text)? else {
    return Err("price response is not a JSON object".to_string());
  };

  let mut lowered: HashMap<String, &Value> = HashMap::with_capacity(map.len());
  for (key, value) in map.iter() {
    lowered.insert(key.trim().to_lowercase(), value);
  }

  let mut prices = HashMap::new();
  for item in batch {
    let value = map
      .get(&item.key)
      .or_else(|| lowered.get(&item.key.to_lowercase()).copied());
    if let Some(price) = value.and_then(parse_price).filter(|p| *p > 0.0) {
      prices.insert(item.key.clone(), round_cents(price));
    }
  }
  Ok(prices)
}

async fn lookup_batch<O: Oracle>(oracle: &O, batch: &[PriceItem], year: i32) -> BatchOutcome {
  let research = match oracle.generate(&search_prompt(batch, year), true).await {
    Ok(text) => text,
    Err(e) => return BatchOutcome::Failed(format!("搜索查询失败: {}", e)),
  };

  let formatted = match oracle.generate(&format_prompt(batch, &research), false).await {
    Ok(text) => text,
    Err(e) => return BatchOutcome::Failed(format!("格式化查询失败: {}", e)),
  };

  match parse_price_map(&formatted, batch) {
    Ok(prices) => BatchOutcome::Priced(prices),
    Err(e) => BatchOutcome::Failed(format!("价格结果解析失败: {}", e)),
  }
}

/// 逐批查询市场价格并回写到清单；失败的批次保留模型估价
pub async fn enrich_prices<O: Oracle>(
  oracle: &O,
  parts: &mut [PricedPart],
  config: &PricingConfig,
) -> EnrichmentReport {
  let items = unique_items(parts);
  let year = Utc::now().year();
  let batch_size = config.batch_size.max(1);

  let mut report = EnrichmentReport {
    unique_items: items.len(),
    ..Default::default()
  };
  let mut resolved: HashMap<String, f64> = HashMap::new();

  for (index, batch) in items.chunks(batch_size).enumerate() {
    if index > 0 && !config.batch_interval.is_zero() {
      tokio::time::sleep(config.batch_interval).await;
    }
    report.batches += 1;

    match lookup_batch(oracle, batch, year).await {
      BatchOutcome::Priced(prices) => {
        debug!("第 {} 批获得 {}/{} 个价格", index + 1, prices.len(), batch.len());
        resolved.extend(prices);
      }
      BatchOutcome::Failed(reason) => {
        report.failed_batches += 1;
        warn!("第 {} 批价格查询失败，保留模型估价: {}", index + 1, reason);
      }
    }
  }
  report.repriced_items = resolved.len();

  // 同一 `part|material` 的所有行取相同的最终价格
  let finals: HashMap<&str, (f64, PriceSource)> = items
    .iter()
    .map(|item| {
      let outcome = match resolved.get(&item.key) {
        Some(price) => (*price, PriceSource::MarketResearch),
        None => (item.estimate, PriceSource::ModelEstimate),
      };
      (item.key.as_str(), outcome)
    })
    .collect();

  for part in parts.iter_mut() {
    if let Some(&(cost, source)) = finals.get(part.price_key().as_str()) {
      part.cost = cost;
      part.price_source = source;
    }
  }

  info!(
    "价格修正完成: {} 个唯一零件, {} 批, 失败 {} 批, 更新 {} 个",
    report.unique_items, report.batches, report.failed_batches, report.repriced_items
  );
  report
}
