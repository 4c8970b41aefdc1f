// 该文件是 BomLens 项目的一部分。
// src/parse.rs - 模型输出解析
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

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{BoundingBox, DetectedObject, PartSpec};

const UNKNOWN_PART: &str = "unknown part";
const UNKNOWN_MATERIAL: &str = "unknown";
// 模型常以 0-1000 的整数刻度返回坐标
const PERMILLE_SCALE: f64 = 1000.0;

/// 模型输出无法解析为物体列表，保留原始文本以便排查
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Failed to parse BOM from model response: {reason}")]
pub struct ParseError {
  pub reason: String,
  pub raw_response: String,
}

impl ParseError {
  fn new(reason: impl Into<String>, raw: &str) -> Self {
    Self {
      reason: reason.into(),
      raw_response: raw.to_string(),
    }
  }
}

/// 去掉模型可能包裹的 Markdown 代码块标记
pub fn strip_code_fences(text: &str) -> &str {
  let trimmed = text.trim();
  let Some(without_open) = trimmed.strip_prefix("```") else {
    return trimmed;
  };
  // 跳过语言标记，如 ```json
  let body = match without_open.find('\n') {
    Some(idx) => &without_open[idx + 1..],
    None => without_open.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
  };
  match body.rfind("```") {
    Some(end) => body[..end].trim(),
    None => body.trim(),
  }
}

/// 从文本中截取第一个括号配平的 JSON 片段
pub fn extract_balanced_json(content: &str) -> Option<&str> {
  let start = content.find(['{', '['])?;
  let mut stack: Vec<char> = Vec::new();
  let mut in_string = false;
  let mut escaped = false;

  for (offset, ch) in content[start..].char_indices() {
    if in_string {
      if escaped {
        escaped = false;
      } else if ch == '\\' {
        escaped = true;
      } else if ch == '"' {
        in_string = false;
      }
      continue;
    }

    match ch {
      '"' => in_string = true,
      '{' => stack.push('}'),
      '[' => stack.push(']'),
      '}' | ']' => {
        if stack.pop() != Some(ch) {
          return None;
        }
        if stack.is_empty() {
          let end = start + offset + ch.len_utf8();
          return Some(&content[start..end]);
        }
      }
      _ => {}
    }
  }
  None
}

/// 宽松地把模型文本解析为 JSON 值：先去掉代码块，再尝试截取配平片段
pub fn parse_lenient_json(raw: &str) -> Result<Value, String> {
  let stripped = strip_code_fences(raw);
  match serde_json::from_str::<Value>(stripped) {
    Ok(value) => Ok(value),
    Err(err) => {
      if let Some(fragment) = extract_balanced_json(stripped)
        && let Ok(value) = serde_json::from_str::<Value>(fragment)
      {
        debug!("从模型文本中截取到 JSON 片段");
        return Ok(value);
      }
      Err(format!("invalid JSON: {}", err))
    }
  }
}

/// 将模型输出解析为物体列表
pub fn parse_detections(raw: &str) -> Result<Vec<DetectedObject>, ParseError> {
  let value = parse_lenient_json(raw).map_err(|reason| ParseError::new(reason, raw))?;

  match value {
    Value::Array(items) => {
      let mut objects = Vec::with_capacity(items.len());
      for (index, item) in items.iter().enumerate() {
        let Value::Object(map) = item else {
          return Err(ParseError::new(
            format!("element {} is not an object", index),
            raw,
          ));
        };
        objects.extend(parse_object(map));
      }
      Ok(objects)
    }
    Value::Object(map) if map.contains_key("label") => Ok(parse_object(&map).into_iter().collect()),
    Value::Object(map) => parse_label_map(&map, raw),
    other => Err(ParseError::new(
      format!("expected a JSON array of objects, got {}", json_kind(&other)),
      raw,
    )),
  }
}

// 旧版提示词的输出格式：{"物体名": [零件...]}，没有边界框
fn parse_label_map(map: &Map<String, Value>, raw: &str) -> Result<Vec<DetectedObject>, ParseError> {
  let mut objects = Vec::with_capacity(map.len());
  for (label, parts) in map {
    let Value::Array(parts) = parts else {
      return Err(ParseError::new(
        format!("parts of '{}' are not an array", label),
        raw,
      ));
    };
    let label = label.trim();
    if label.is_empty() {
      warn!("忽略空标签的物体");
      continue;
    }
    objects.push(DetectedObject {
      label: label.to_string(),
      bounding_box: None,
      parts: parse_parts(parts),
    });
  }
  Ok(objects)
}

fn parse_object(map: &Map<String, Value>) -> Option<DetectedObject> {
  let label = map
    .get("label")
    .and_then(Value::as_str)
    .map(str::trim)
    .unwrap_or_default();
  if label.is_empty() {
    warn!("忽略缺少标签的物体: {:?}", map.keys().collect::<Vec<_>>());
    return None;
  }

  let bounding_box = map.get("box_2d").and_then(parse_box);
  let parts = map
    .get("parts")
    .and_then(Value::as_array)
    .map(|parts| parse_parts(parts))
    .unwrap_or_default();

  Some(DetectedObject {
    label: label.to_string(),
    bounding_box,
    parts,
  })
}

fn parse_parts(parts: &[Value]) -> Vec<PartSpec> {
  parts
    .iter()
    .filter_map(|part| {
      let Value::Object(map) = part else {
        warn!("忽略非对象的零件条目: {}", part);
        return None;
      };
      let name = non_blank(map.get("part")).unwrap_or(UNKNOWN_PART);
      let material = non_blank(map.get("material")).unwrap_or(UNKNOWN_MATERIAL);
      Some(PartSpec::new(name, material, coerce_cost(map.get("cost"))))
    })
    .collect()
}

fn non_blank(value: Option<&Value>) -> Option<&str> {
  value
    .and_then(Value::as_str)
    .map(str::trim)
    .filter(|s| !s.is_empty())
}

/// 解析价格数值，接受数字和 "$1,234.50" 形式的字符串
pub fn parse_price(value: &Value) -> Option<f64> {
  let number = match value {
    Value::Number(n) => n.as_f64()?,
    Value::String(s) => s
      .trim()
      .trim_start_matches('$')
      .replace(',', "")
      .trim()
      .parse::<f64>()
      .ok()?,
    _ => return None,
  };
  number.is_finite().then_some(number)
}

/// 零件估价：缺失、非数字或负数一律按 0 处理
pub fn coerce_cost(value: Option<&Value>) -> f64 {
  value.and_then(parse_price).unwrap_or(0.0).max(0.0)
}

// 前四个元素必须都是数字，否则视为未定位
fn parse_box(value: &Value) -> Option<BoundingBox> {
  let coords = value
    .as_array()?
    .iter()
    .take(4)
    .map(Value::as_f64)
    .collect::<Option<Vec<f64>>>();
  let Some(&[y0, x0, y1, x1]) = coords.as_deref() else {
    debug!("box_2d 不是四个数字坐标，视为未定位");
    return None;
  };
  normalize_box([y0, x0, y1, x1])
}

/// 规范化边界框：识别千分刻度、限制到 [0, 1]、纠正反向坐标
pub fn normalize_box(mut coords: [f64; 4]) -> Option<BoundingBox> {
  if coords.iter().any(|c| *c > 1.0) && coords.iter().all(|c| *c <= PERMILLE_SCALE) {
    coords.iter_mut().for_each(|c| *c /= PERMILLE_SCALE);
  }
  coords.iter_mut().for_each(|c| *c = c.clamp(0.0, 1.0));

  let [mut y0, mut x0, mut y1, mut x1] = coords;
  if y0 > y1 {
    std::mem::swap(&mut y0, &mut y1);
  }
  if x0 > x1 {
    std::mem::swap(&mut x0, &mut x1);
  }
  if y0 == y1 || x0 == x1 {
    return None;
  }

  Some(BoundingBox([y0 as f32, x0 as f32, y1 as f32, x1 as f32]))
}

fn json_kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const CHAIR: &str = r#"[{"label":"chair","box_2d":[0.1,0.1,0.9,0.9],"parts":[{"part":"seat","material":"wood","cost":5}]}]"#;

  #[test]
  fn parses_well_formed_array() {
    let objects = parse_detections(CHAIR).unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].label, "chair");
    assert_eq!(objects[0].bounding_box, Some(BoundingBox([0.1, 0.1, 0.9, 0.9])));
    assert_eq!(objects[0].parts, vec![PartSpec::new("seat", "wood", 5.0)]);
  }

  #[test]
  fn fenced_and_unfenced_parse_identically() {
    let fenced = format!("```json\n{}\n```", CHAIR);
    let bare_fence = format!("```\n{}\n```\n", CHAIR);
    let plain = parse_detections(CHAIR).unwrap();
    assert_eq!(parse_detections(&fenced).unwrap(), plain);
    assert_eq!(parse_detections(&bare_fence).unwrap(), plain);
  }

  #[test]
  fn prose_is_a_parse_error_with_raw_text() {
    let raw = "I'm sorry, I can't identify any objects in this picture.";
    let err = parse_detections(raw).unwrap_err();
    assert_eq!(err.raw_response, raw);
    assert!(err.to_string().starts_with("Failed to parse BOM"));
  }

  #[test]
  fn wrong_top_level_shape_is_an_error() {
    assert!(parse_detections("42").is_err());
    assert!(parse_detections("\"chair\"").is_err());
    assert!(parse_detections("[1, 2]").is_err());
  }

  #[test]
  fn empty_array_is_not_an_error() {
    assert_eq!(parse_detections("[]").unwrap(), Vec::new());
  }

  #[test]
  fn short_box_means_no_localization() {
    let raw = r#"[{"label":"mug","box_2d":[0.1,0.2],"parts":[]}]"#;
    let objects = parse_detections(raw).unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].bounding_box, None);
  }

  #[test]
  fn non_numeric_coordinate_invalidates_box() {
    let raw = r#"[{"label":"mug","box_2d":[0.1,null,0.2,0.8,0.9],"parts":[]}]"#;
    let objects = parse_detections(raw).unwrap();
    assert_eq!(objects[0].bounding_box, None);

    let raw = r#"[{"label":"mug","box_2d":[0.1,0.2,0.8,0.9,"extra"],"parts":[]}]"#;
    let objects = parse_detections(raw).unwrap();
    assert_eq!(objects[0].bounding_box, Some(BoundingBox([0.1, 0.2, 0.8, 0.9])));
  }

  #[test]
  fn salvages_json_wrapped_in_prose() {
    let raw = format!("Here is the analysis you asked for:\n{}\nLet me know!", CHAIR);
    assert_eq!(parse_detections(&raw).unwrap(), parse_detections(CHAIR).unwrap());
  }

  #[test]
  fn accepts_legacy_label_map() {
    let raw = r#"{"Desk": [{"part": "top", "material": "oak", "cost": "12.50"}]}"#;
    let objects = parse_detections(raw).unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].label, "Desk");
    assert_eq!(objects[0].bounding_box, None);
    assert_eq!(objects[0].parts[0].cost, 12.5);
  }

  #[test]
  fn drops_objects_without_label() {
    let raw = r#"[{"label":"  ","parts":[]},{"label":"vase","parts":[]}]"#;
    let objects = parse_detections(raw).unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].label, "vase");
  }

  #[test]
  fn coerces_odd_costs() {
    let raw = r#"[{"label":"x","parts":[
      {"part":"a","material":"m","cost":"$1,200.5"},
      {"part":"b","material":"m","cost":"cheap"},
      {"part":"c","material":"m"},
      {"part":"d","material":"m","cost":-3},
      {"material":"m","cost":1}
    ]}]"#;
    let parts = &parse_detections(raw).unwrap()[0].parts;
    let costs: Vec<f64> = parts.iter().map(|p| p.cost).collect();
    assert_eq!(costs, vec![1200.5, 0.0, 0.0, 0.0, 1.0]);
    assert_eq!(parts[4].part, UNKNOWN_PART);
  }

  #[test]
  fn normalizes_permille_and_inverted_boxes() {
    let bbox = normalize_box([500.0, 100.0, 250.0, 900.0]).unwrap();
    assert_eq!(bbox, BoundingBox([0.25, 0.1, 0.5, 0.9]));

    let clamped = normalize_box([-0.2, 0.0, 0.5, 1.0]).unwrap();
    assert_eq!(clamped.y0(), 0.0);

    assert_eq!(normalize_box([0.3, 0.3, 0.3, 0.6]), None);
  }
}
