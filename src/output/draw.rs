// 该文件是 BomLens 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use tracing::debug;

use crate::{
  model::{BoundingBox, ColoredObject},
  output::font::LabelFont,
};

const OUTLINE_PASSES: i32 = 3;
const LABEL_PADDING: u32 = 4;
const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

pub struct Draw {
  font: LabelFont,
  outline_passes: i32,
  label_padding: u32,
}

impl Draw {
  pub fn new(font: LabelFont) -> Self {
    Self {
      font,
      outline_passes: OUTLINE_PASSES,
      label_padding: LABEL_PADDING,
    }
  }

  /// 绘制所有带边界框的物体，没有定位信息的物体跳过
  pub fn draw_objects(&self, image: &mut RgbImage, objects: &[ColoredObject]) {
    for colored in objects {
      let Some(bbox) = colored.object.bounding_box else {
        debug!("{} 没有边界框，跳过绘制", colored.object.label);
        continue;
      };
      self.draw_bbox_with_label(image, &bbox, &colored.object.label, colored.color.into());
    }
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, bbox: &BoundingBox, label: &str, color: Rgb<u8>) {
    let (x_min, y_min, x_max, y_max) = bbox.to_pixels(image.width(), image.height());
    if x_min >= x_max || y_min >= y_max {
      return;
    }

    // 多次绘制内缩的矩形以加粗边框
    for pass in 0..self.outline_passes {
      let width = x_max - x_min + 1 - 2 * pass;
      let height = y_max - y_min + 1 - 2 * pass;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + pass, y_min + pass).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    self.draw_label(image, x_min, y_min, label, color);
  }

  fn draw_label(&self, image: &mut RgbImage, x_min: i32, y_min: i32, label: &str, color: Rgb<u8>) {
    let (text_width, text_height) = self.font.text_size(label);
    let label_width = text_width + 2 * self.label_padding;
    let label_height = text_height + 2 * self.label_padding;

    // 标签背景放在边框正上方，顶部放不下时放进框内
    let label_x = x_min;
    let label_y = if y_min >= label_height as i32 {
      y_min - label_height as i32
    } else {
      y_min
    };

    let max_width = (image.width() as i32 - label_x).max(0) as u32;
    let clipped_width = label_width.min(max_width);
    if clipped_width == 0 || label_height == 0 {
      return;
    }

    let rect = Rect::at(label_x, label_y).of_size(clipped_width, label_height);
    draw_filled_rect_mut(image, rect, color);

    self.font.draw_text(
      image,
      LABEL_TEXT_COLOR,
      label_x + self.label_padding as i32,
      label_y + self.label_padding as i32,
      label,
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{Color, DetectedObject};

  const RED: [u8; 3] = [200, 10, 10];

  fn object(bbox: Option<[f32; 4]>) -> ColoredObject {
    ColoredObject {
      object: DetectedObject {
        label: "box".into(),
        bounding_box: bbox.map(BoundingBox),
        parts: Vec::new(),
      },
      color: Color(RED),
    }
  }

  #[test]
  fn outline_is_drawn_in_object_color_with_several_passes() {
    let mut image = RgbImage::new(200, 200);
    let draw = Draw::new(LabelFont::embedded().unwrap());
    draw.draw_objects(&mut image, &[object(Some([0.5, 0.25, 0.9, 0.75]))]);

    // y0=100, x0=50, y1=180, x1=150
    for inset in 0..OUTLINE_PASSES as u32 {
      assert_eq!(image.get_pixel(100, 180 - inset).0, RED);
      assert_eq!(image.get_pixel(150 - inset, 140).0, RED);
    }
    assert_eq!(image.get_pixel(100, 140).0, [0, 0, 0]);
  }

  #[test]
  fn label_background_sits_above_the_box() {
    let mut image = RgbImage::new(200, 200);
    let draw = Draw::new(LabelFont::embedded().unwrap());
    draw.draw_objects(&mut image, &[object(Some([0.5, 0.25, 0.9, 0.75]))]);

    let (_, text_height) = draw.font.text_size("box");
    let top = 100 - (text_height + 2 * LABEL_PADDING);
    assert_eq!(image.get_pixel(51, top).0, RED);
    assert_eq!(image.get_pixel(51, top - 1).0, [0, 0, 0]);
    // 白色文字落在标签背景内
    let white = (top..100)
      .flat_map(|y| (50..150).map(move |x| (x, y)))
      .filter(|&(x, y)| image.get_pixel(x, y).0.iter().all(|c| *c > 200))
      .count();
    assert!(white > 0);
  }

  #[test]
  fn label_moves_inside_when_box_touches_top() {
    let mut image = RgbImage::new(100, 100);
    let draw = Draw::new(LabelFont::embedded().unwrap());
    draw.draw_objects(&mut image, &[object(Some([0.0, 0.0, 0.5, 0.9]))]);
    assert_eq!(image.get_pixel(1, 1).0, RED);
  }

  #[test]
  fn objects_without_box_leave_image_untouched() {
    let mut image = RgbImage::new(50, 50);
    let draw = Draw::new(LabelFont::embedded().unwrap());
    draw.draw_objects(&mut image, &[object(None)]);
    assert!(image.pixels().all(|p| p.0 == [0, 0, 0]));
  }
}
