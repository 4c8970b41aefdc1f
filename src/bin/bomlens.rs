// 该文件是 BomLens 项目的一部分。
// src/bin/bomlens.rs - 命令行入口
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
  io::Read,
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use bomlens::{
  instructions::{InstructionsRequest, generate_instructions},
  model::PartSpec,
  oracle::{GEMINI_API_BASE, GEMINI_DEFAULT_MODEL, GeminiClientBuilder},
  output::{DEFAULT_OUTPUT_DIR, DEFAULT_URL_PREFIX, OverlayConfig, OverlayRenderer, Rotation},
  pricing::PricingConfig,
  task::{AnalyzeResponse, AnalyzeTask, ImageUpload, PipelineConfig},
};

/// BomLens 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型服务 API 密钥
  #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
  pub api_key: String,
  /// 模型名称
  #[arg(long, default_value = GEMINI_DEFAULT_MODEL)]
  pub model: String,
  /// 模型服务地址
  #[arg(long, default_value = GEMINI_API_BASE, value_name = "URL")]
  pub api_base: Url,
  /// 单次请求超时（秒），不设置则不限制
  #[arg(long, value_name = "SECONDS")]
  pub timeout_secs: Option<u64>,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 分析图片，输出物料清单 JSON
  Analyze {
    /// 输入图片路径
    #[arg(long, value_name = "FILE")]
    image: PathBuf,
    /// 使用联网搜索修正价格
    #[arg(long)]
    live_pricing: bool,
    /// 标注图输出目录
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR, value_name = "DIR")]
    output_dir: PathBuf,
    /// 标注图 URL 前缀
    #[arg(long, default_value = DEFAULT_URL_PREFIX, value_name = "PREFIX")]
    url_prefix: String,
    /// 保存前的逆时针旋转角度 (none, 90, 180, 270)
    #[arg(long, default_value_t = Rotation::default())]
    rotate: Rotation,
    /// 标签字体文件（TrueType）
    #[arg(long, value_name = "FILE")]
    font: Option<PathBuf>,
    /// 价格查询批次间隔（毫秒）
    #[arg(long, default_value = "0", value_name = "MILLIS")]
    batch_interval_ms: u64,
  },
  /// 根据零件清单生成制作说明
  Instructions {
    /// 物体名称
    #[arg(long)]
    label: String,
    /// 零件清单 JSON 文件，`-` 表示标准输入
    #[arg(long, value_name = "FILE")]
    parts_json: PathBuf,
  },
}

fn read_parts(path: &Path) -> Result<Vec<PartSpec>> {
  let text = if path.as_os_str() == "-" {
    let mut buf = String::new();
    std::io::stdin()
      .read_to_string(&mut buf)
      .context("无法读取标准输入")?;
    buf
  } else {
    std::fs::read_to_string(path).with_context(|| format!("无法读取零件文件: {}", path.display()))?
  };
  serde_json::from_str(&text).context("零件清单不是有效的 JSON 数组")
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("模型服务地址: {}", args.api_base);

  let oracle = GeminiClientBuilder::new(args.api_key)
    .api_base(args.api_base.as_str())
    .model(args.model)
    .timeout(args.timeout_secs.map(Duration::from_secs))
    .build()
    .context("无法创建模型客户端")?;

  match args.command {
    Command::Analyze {
      image,
      live_pricing,
      output_dir,
      url_prefix,
      rotate,
      font,
      batch_interval_ms,
    } => {
      info!("输入图片: {}", image.display());
      let bytes = tokio::fs::read(&image)
        .await
        .with_context(|| format!("无法读取图片文件: {}", image.display()))?;
      let file_name = image
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

      let renderer = OverlayRenderer::new(
        OverlayConfig::default()
          .with_output_dir(output_dir)
          .with_url_prefix(url_prefix)
          .with_rotation(rotate)
          .with_font_path(font),
      )
      .context("无法创建标注图渲染器")?;
      let task = AnalyzeTask::new(
        PipelineConfig::default()
          .with_live_pricing(live_pricing)
          .with_pricing(
            PricingConfig::default().with_batch_interval(Duration::from_millis(batch_interval_ms)),
          ),
      );

      let upload = ImageUpload {
        file_name: &file_name,
        bytes: &bytes,
      };
      let response = AnalyzeResponse::from(task.run_task(&upload, &oracle, &renderer).await);
      println!("{}", serde_json::to_string_pretty(&response)?);
    }
    Command::Instructions { label, parts_json } => {
      let request = InstructionsRequest {
        label,
        parts: read_parts(&parts_json)?,
      };
      let instructions = generate_instructions(&oracle, &request)
        .await
        .context("生成制作说明失败")?;
      println!("{}", serde_json::to_string_pretty(&instructions)?);
    }
  }

  Ok(())
}
