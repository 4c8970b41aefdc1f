// 该文件是 BomLens 项目的一部分。
// src/task.rs - 图像分析任务
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

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
  augment::augment_common_parts,
  cost::{aggregate, total_cost},
  model::BomResult,
  oracle::{Oracle, OracleError},
  output::{OverlayError, Render},
  palette::assign_colors,
  parse::{ParseError, parse_detections},
  pricing::{PricingConfig, enrich_prices},
};

pub const DETECTION_PROMPT: &str = "You are a mechanical reasoning and cost estimation assistant. Analyze this image.\n\
Step 1: List all distinct physical objects in the image.\n\
Step 2: For each object, give its bounding box as box_2d = [y0, x0, y1, x1], \
normalized to the range 0-1 (top-left and bottom-right corners).\n\
Step 3: For each object, list its parts.\n\
Step 4: For each part, estimate the likely material and cost in USD.\n\
Respond ONLY with a JSON array like:\n\
[\n\
  {\"label\": \"ObjectName\", \"box_2d\": [0.1, 0.2, 0.8, 0.9], \"parts\": [\n\
    {\"part\": \"PartName\", \"material\": \"Material\", \"cost\": number}\n\
  ]}\n\
]";

const FALLBACK_MIME: &str = "image/jpeg";

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("图像解码错误: {0}")]
  Image(#[from] image::ImageError),
  #[error("模型调用错误: {0}")]
  Oracle(#[from] OracleError),
  #[error(transparent)]
  Parse(#[from] ParseError),
  #[error("标注图渲染错误: {0}")]
  Render(#[from] OverlayError),
}

/// 一次上传的图像
pub struct ImageUpload<'a> {
  pub file_name: &'a str,
  pub bytes: &'a [u8],
}

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
  pub live_pricing: bool,
  pub pricing: PricingConfig,
}

impl PipelineConfig {
  pub fn with_live_pricing(mut self, live_pricing: bool) -> Self {
    self.live_pricing = live_pricing;
    self
  }

  pub fn with_pricing(mut self, pricing: PricingConfig) -> Self {
    self.pricing = pricing;
    self
  }
}

/// 识别、补全、渲染、汇总、（可选）价格修正
#[derive(Debug, Default)]
pub struct AnalyzeTask {
  config: PipelineConfig,
}

impl AnalyzeTask {
  pub fn new(config: PipelineConfig) -> Self {
    Self { config }
  }

  pub async fn run_task<O: Oracle, R: Render>(
    &self,
    upload: &ImageUpload<'_>,
    oracle: &O,
    renderer: &R,
  ) -> Result<BomResult, PipelineError> {
    info!("开始分析: {} ({} 字节)", upload.file_name, upload.bytes.len());
    let image = image::load_from_memory(upload.bytes)?.to_rgb8();
    let mime_type = image::guess_format(upload.bytes)
      .map(|format| format.to_mime_type())
      .unwrap_or(FALLBACK_MIME);

    let now = Instant::now();
    let raw = oracle
      .describe_image(upload.bytes, mime_type, DETECTION_PROMPT)
      .await?;
    info!("识别完成，耗时: {:.2?}", now.elapsed());

    let objects = parse_detections(&raw).inspect_err(|e| warn!("模型输出解析失败: {}", e.reason))?;
    info!("识别到 {} 个物体", objects.len());

    let objects = assign_colors(augment_common_parts(objects));
    let overlay_url = renderer.render_overlay(&image, &objects, upload.file_name)?;

    let mut bom = aggregate(&objects);
    if self.config.live_pricing {
      enrich_prices(oracle, &mut bom, &self.config.pricing).await;
    }

    let mut color_map = BTreeMap::new();
    for colored in &objects {
      color_map
        .entry(colored.object.label.clone())
        .or_insert(colored.color);
    }

    let total_cost = total_cost(&bom);
    info!("分析完成: {} 个零件，总价 ${:.2}", bom.len(), total_cost);

    Ok(BomResult {
      bom,
      total_cost,
      overlay_url,
      color_map,
      objects_meta: objects,
    })
  }
}

/// 分析接口的响应体，失败时也总是可解析的 JSON
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AnalyzeResponse {
  Bom(BomResult),
  ParseFailure { error: String, raw_response: String },
  Failure { error: String },
}

impl From<Result<BomResult, PipelineError>> for AnalyzeResponse {
  fn from(result: Result<BomResult, PipelineError>) -> Self {
    match result {
      Ok(bom) => AnalyzeResponse::Bom(bom),
      Err(PipelineError::Parse(e)) => AnalyzeResponse::ParseFailure {
        error: e.to_string(),
        raw_response: e.raw_response,
      },
      Err(e) => AnalyzeResponse::Failure {
        error: e.to_string(),
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use image::{DynamicImage, ImageFormat, RgbImage};

  use super::*;
  use crate::{
    model::PriceSource,
    oracle::testing::ScriptedOracle,
    output::{OverlayConfig, OverlayRenderer},
  };

  const CHAIR: &str = r#"```json
[{"label":"chair","box_2d":[0.1,0.1,0.9,0.9],"parts":[{"part":"seat","material":"wood","cost":5}]}]
```"#;

  fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::new(width, height))
      .write_to(&mut buf, ImageFormat::Png)
      .unwrap();
    buf.into_inner()
  }

  fn renderer(dir: &std::path::Path) -> OverlayRenderer {
    OverlayRenderer::new(OverlayConfig::default().with_output_dir(dir)).unwrap()
  }

  #[tokio::test]
  async fn chair_scenario_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let oracle = ScriptedOracle::new().reply(CHAIR);
    let bytes = png_bytes(64, 48);
    let upload = ImageUpload {
      file_name: "kitchen chair.png",
      bytes: &bytes,
    };

    let result = AnalyzeTask::default()
      .run_task(&upload, &oracle, &renderer(dir.path()))
      .await
      .unwrap();

    let names: Vec<&str> = result.bom.iter().map(|p| p.part.as_str()).collect();
    assert_eq!(names, vec!["seat", "wood screws", "felt floor glides"]);
    assert_eq!(result.total_cost, 5.28);
    assert_eq!(result.overlay_url, "/static/overlays/overlay_kitchen_chair.png");
    assert!(dir.path().join("overlay_kitchen_chair.png").exists());
    assert_eq!(result.objects_meta.len(), 1);
    assert_eq!(result.color_map["chair"], result.objects_meta[0].color);
    assert!(result.bom.iter().all(|p| p.color == result.objects_meta[0].color));
    assert_eq!(oracle.prompts()[0].0, DETECTION_PROMPT);
  }

  #[tokio::test]
  async fn prose_reply_short_circuits_without_overlay() {
    let dir = tempfile::tempdir().unwrap();
    let raw = "This looks like a cozy room with some furniture.";
    let oracle = ScriptedOracle::new().reply(raw);
    let bytes = png_bytes(8, 8);
    let upload = ImageUpload {
      file_name: "room.png",
      bytes: &bytes,
    };

    let result = AnalyzeTask::default()
      .run_task(&upload, &oracle, &renderer(dir.path()))
      .await;
    let response = AnalyzeResponse::from(result);

    let value = serde_json::to_value(&response).unwrap();
    assert!(value["error"].as_str().unwrap().contains("Failed to parse BOM"));
    assert_eq!(value["raw_response"], raw);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
  }

  #[tokio::test]
  async fn failing_price_lookup_keeps_estimates() {
    let dir = tempfile::tempdir().unwrap();
    let oracle = ScriptedOracle::new().reply(CHAIR).fail(429);
    let bytes = png_bytes(16, 16);
    let upload = ImageUpload {
      file_name: "chair.png",
      bytes: &bytes,
    };

    let result = AnalyzeTask::new(PipelineConfig::default().with_live_pricing(true))
      .run_task(&upload, &oracle, &renderer(dir.path()))
      .await
      .unwrap();

    assert_eq!(result.total_cost, 5.28);
    assert!(result.bom.iter().all(|p| p.price_source == PriceSource::ModelEstimate));
    let costs: Vec<f64> = result.bom.iter().map(|p| p.cost).collect();
    assert_eq!(costs, vec![5.0, 0.08, 0.2]);
  }

  #[tokio::test]
  async fn live_pricing_reprices_and_recomputes_total() {
    let dir = tempfile::tempdir().unwrap();
    let oracle = ScriptedOracle::new()
      .reply(CHAIR)
      .reply("A wooden seat blank sells for around $12.")
      .reply(r#"{"seat|wood": 12}"#);
    let bytes = png_bytes(16, 16);
    let upload = ImageUpload {
      file_name: "chair.png",
      bytes: &bytes,
    };

    let result = AnalyzeTask::new(PipelineConfig::default().with_live_pricing(true))
      .run_task(&upload, &oracle, &renderer(dir.path()))
      .await
      .unwrap();

    assert_eq!(result.bom[0].cost, 12.0);
    assert_eq!(result.bom[0].price_source, PriceSource::MarketResearch);
    assert_eq!(result.total_cost, 12.28);
    let sum: f64 = result.bom.iter().map(|p| p.cost).sum();
    assert!((result.total_cost - sum).abs() < 1e-9);
  }

  #[tokio::test]
  async fn oracle_error_becomes_generic_error_payload() {
    let dir = tempfile::tempdir().unwrap();
    let oracle = ScriptedOracle::new().fail(500);
    let bytes = png_bytes(8, 8);
    let upload = ImageUpload {
      file_name: "x.png",
      bytes: &bytes,
    };

    let result = AnalyzeTask::default()
      .run_task(&upload, &oracle, &renderer(dir.path()))
      .await;
    let value = serde_json::to_value(AnalyzeResponse::from(result)).unwrap();
    assert!(value["error"].as_str().unwrap().contains("500"));
    assert!(value.get("raw_response").is_none());
  }

  #[tokio::test]
  async fn undecodable_upload_is_rejected_before_calling_oracle() {
    let dir = tempfile::tempdir().unwrap();
    let oracle = ScriptedOracle::new().reply(CHAIR);
    let upload = ImageUpload {
      file_name: "notes.txt",
      bytes: b"definitely not an image",
    };

    let result = AnalyzeTask::default()
      .run_task(&upload, &oracle, &renderer(dir.path()))
      .await;
    assert!(matches!(result, Err(PipelineError::Image(_))));
    assert!(oracle.prompts().is_empty());
  }
}
