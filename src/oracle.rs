// 该文件是 BomLens 项目的一部分。
// src/oracle.rs - 视觉语言模型接口
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

use std::future::Future;

use thiserror::Error;

mod gemini;
pub use self::gemini::{GEMINI_API_BASE, GEMINI_DEFAULT_MODEL, GeminiClient, GeminiClientBuilder};

#[derive(Error, Debug)]
pub enum OracleError {
  #[error("HTTP 请求错误: {0}")]
  Http(#[from] reqwest::Error),
  #[error("接口地址错误: {0}")]
  Url(#[from] url::ParseError),
  #[error("模型服务返回状态 {status}: {body}")]
  Status { status: u16, body: String },
  #[error("模型没有返回任何文本")]
  EmptyResponse,
  #[error("缺少 API 密钥")]
  MissingApiKey,
}

/// 文本进、文本出的模型接口，输出不可信，调用方必须自行校验
pub trait Oracle {
  /// 图像 + 提示词
  fn describe_image(
    &self,
    image: &[u8],
    mime_type: &str,
    prompt: &str,
  ) -> impl Future<Output = Result<String, OracleError>> + Send;

  /// 纯文本提示词，`grounded` 为真时启用联网搜索
  fn generate(
    &self,
    prompt: &str,
    grounded: bool,
  ) -> impl Future<Output = Result<String, OracleError>> + Send;
}
