// 该文件是 BomLens 项目的一部分。
// src/oracle/gemini.rs - Gemini generateContent 客户端
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

use std::time::{Duration, Instant};

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use super::{Oracle, OracleError};

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-2.5-flash";
const MAX_ERROR_BODY_LEN: usize = 200;

pub struct GeminiClient {
  http: reqwest::Client,
  endpoint: Url,
  api_key: String,
}

pub struct GeminiClientBuilder {
  api_key: String,
  api_base: String,
  model: String,
  timeout: Option<Duration>,
}

impl GeminiClientBuilder {
  pub fn new(api_key: impl Into<String>) -> Self {
    Self {
      api_key: api_key.into(),
      api_base: GEMINI_API_BASE.to_string(),
      model: GEMINI_DEFAULT_MODEL.to_string(),
      timeout: None,
    }
  }

  pub fn api_base(mut self, api_base: impl Into<String>) -> Self {
    self.api_base = api_base.into();
    self
  }

  pub fn model(mut self, model: impl Into<String>) -> Self {
    self.model = model.into();
    self
  }

  pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn build(self) -> Result<GeminiClient, OracleError> {
    let api_key = self.api_key.trim().to_string();
    if api_key.is_empty() {
      return Err(OracleError::MissingApiKey);
    }

    let endpoint = endpoint_for_model(&self.api_base, &self.model)?;
    info!("模型接口: {}", endpoint);

    let mut http = reqwest::Client::builder();
    if let Some(timeout) = self.timeout {
      http = http.timeout(timeout);
    }

    Ok(GeminiClient {
      http: http.build()?,
      endpoint,
      api_key,
    })
  }
}

fn endpoint_for_model(api_base: &str, model: &str) -> Result<Url, url::ParseError> {
  let model = model.trim();
  let model_path = if model.starts_with("models/") {
    model.to_string()
  } else {
    format!("models/{}", model)
  };
  Url::parse(&format!(
    "{}/{}:generateContent",
    api_base.trim().trim_end_matches('/'),
    model_path
  ))
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
  contents: Vec<Content<'a>>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  tools: Vec<Tool>,
}

#[derive(Serialize)]
struct Content<'a> {
  parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
  Text {
    text: &'a str,
  },
  Image {
    #[serde(rename = "inlineData")]
    inline_data: InlineData,
  },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
  mime_type: String,
  data: String,
}

#[derive(Serialize)]
struct Tool {
  google_search: GoogleSearch,
}

#[derive(Serialize)]
struct GoogleSearch {}

#[derive(Deserialize, Default)]
struct GenerateContentResponse {
  #[serde(default)]
  candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
  #[serde(default)]
  content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
  #[serde(default)]
  parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
  #[serde(default)]
  text: Option<String>,
}

impl GenerateContentResponse {
  // 拼接第一个候选的所有文本片段
  fn text(self) -> Option<String> {
    let parts = self.candidates.into_iter().next()?.content?.parts;
    let text: String = parts.into_iter().filter_map(|p| p.text).collect();
    (!text.trim().is_empty()).then_some(text)
  }
}

fn truncate_body(body: &str) -> String {
  match body.char_indices().nth(MAX_ERROR_BODY_LEN) {
    Some((idx, _)) => format!("{}...", &body[..idx]),
    None => body.to_string(),
  }
}

impl GeminiClient {
  async fn send(&self, request: &GenerateContentRequest<'_>) -> Result<String, OracleError> {
    let now = Instant::now();
    let response = self
      .http
      .post(self.endpoint.clone())
      .header("x-goog-api-key", &self.api_key)
      .json(request)
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      warn!("模型服务返回错误状态: {}", status);
      return Err(OracleError::Status {
        status: status.as_u16(),
        body: truncate_body(&body),
      });
    }

    let body: GenerateContentResponse = response.json().await?;
    debug!("模型调用完成，耗时: {:.2?}", now.elapsed());
    body.text().ok_or(OracleError::EmptyResponse)
  }
}

impl Oracle for GeminiClient {
  async fn describe_image(
    &self,
    image: &[u8],
    mime_type: &str,
    prompt: &str,
  ) -> Result<String, OracleError> {
    let request = GenerateContentRequest {
      contents: vec![Content {
        parts: vec![
          Part::Text { text: prompt },
          Part::Image {
            inline_data: InlineData {
              mime_type: mime_type.to_string(),
              data: BASE64.encode(image),
            },
          },
        ],
      }],
      tools: Vec::new(),
    };
    self.send(&request).await
  }

  async fn generate(&self, prompt: &str, grounded: bool) -> Result<String, OracleError> {
    let tools = if grounded {
      vec![Tool {
        google_search: GoogleSearch {},
      }]
    } else {
      Vec::new()
    };
    let request = GenerateContentRequest {
      contents: vec![Content {
        parts: vec![Part::Text { text: prompt }],
      }],
      tools,
    };
    self.send(&request).await
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn endpoint_accepts_bare_and_prefixed_models() {
    let a = endpoint_for_model("https://example.com/v1beta/", "gemini-2.5-flash").unwrap();
    let b = endpoint_for_model("https://example.com/v1beta", "models/gemini-2.5-flash").unwrap();
    assert_eq!(a, b);
    assert_eq!(
      a.as_str(),
      "https://example.com/v1beta/models/gemini-2.5-flash:generateContent"
    );
  }

  #[test]
  fn build_rejects_blank_key() {
    assert!(matches!(
      GeminiClientBuilder::new("  ").build(),
      Err(OracleError::MissingApiKey)
    ));
  }

  #[test]
  fn grounded_request_carries_search_tool() {
    let request = GenerateContentRequest {
      contents: vec![Content {
        parts: vec![Part::Text { text: "hi" }],
      }],
      tools: vec![Tool {
        google_search: GoogleSearch {},
      }],
    };
    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(
      value,
      json!({
        "contents": [{"parts": [{"text": "hi"}]}],
        "tools": [{"google_search": {}}]
      })
    );
  }

  #[test]
  fn image_part_is_inline_base64() {
    let part = Part::Image {
      inline_data: InlineData {
        mime_type: "image/png".into(),
        data: BASE64.encode([1u8, 2, 3]),
      },
    };
    let value = serde_json::to_value(&part).unwrap();
    assert_eq!(value["inlineData"]["mimeType"], "image/png");
    assert_eq!(value["inlineData"]["data"], "AQID");
  }

  #[test]
  fn response_text_joins_first_candidate_parts() {
    let body: GenerateContentResponse = serde_json::from_value(json!({
      "candidates": [
        {"content": {"parts": [{"text": "[{\"label\":"}, {"text": "\"cup\"}]"}]}},
        {"content": {"parts": [{"text": "ignored"}]}}
      ]
    }))
    .unwrap();
    assert_eq!(body.text().as_deref(), Some("[{\"label\":\"cup\"}]"));
  }

  #[test]
  fn blocked_response_has_no_text() {
    let body: GenerateContentResponse =
      serde_json::from_value(json!({"candidates": [{"finishReason": "SAFETY"}]})).unwrap();
    assert_eq!(body.text(), None);
    assert_eq!(GenerateContentResponse::default().text(), None);
  }

  #[test]
  fn long_error_bodies_are_truncated() {
    let body = "x".repeat(500);
    assert_eq!(truncate_body(&body).len(), MAX_ERROR_BODY_LEN + 3);
  }
}
