// 该文件是 BomLens 项目的一部分。
// src/instructions.rs - 制作说明生成
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

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
  model::PartSpec,
  oracle::{Oracle, OracleError},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionsRequest {
  pub label: String,
  #[serde(default)]
  pub parts: Vec<PartSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instructions {
  pub label: String,
  pub instructions: String,
}

fn instructions_prompt(request: &InstructionsRequest) -> String {
  let parts = if request.parts.is_empty() {
    "- (no parts listed)".to_string()
  } else {
    request
      .parts
      .iter()
      .map(|p| format!("- {} ({})", p.part, p.material))
      .collect::<Vec<_>>()
      .join("\n")
  };
  format!(
    "You are an experienced maker and manufacturing engineer.\n\
     Write clear, step-by-step instructions to build a {} from the parts below.\n\
     List the tools needed first, then number each step. Mention safety notes where relevant.\n\n\
     Parts:\n{}",
    request.label, parts
  )
}

/// 单次模型调用，错误直接返回给调用方
pub async fn generate_instructions<O: Oracle>(
  oracle: &O,
  request: &InstructionsRequest,
) -> Result<Instructions, OracleError> {
  info!("生成制作说明: {} ({} 个零件)", request.label, request.parts.len());
  let text = oracle.generate(&instructions_prompt(request), false).await?;
  Ok(Instructions {
    label: request.label.clone(),
    instructions: text.trim().to_string(),
  })
}
