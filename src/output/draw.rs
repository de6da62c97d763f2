// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use std::{borrow::Cow, collections::HashMap, io::Cursor};

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
  input::SourceImage,
  model::{DetectItem, DetectResult},
  output::{OutputError, Render},
};

// 文本渲染常量
pub const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_PADDING: u32 = 2;
const LABEL_TEXT_COLOR: [u8; 3] = [255, 255, 255];
const BOX_THICKNESS: u32 = 2;
const PALETTE_SIZE: u32 = 80;

/// 单个类别的显示名称和颜色
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayEntry {
  pub class_id: u32,
  pub name: String,
  pub color: [u8; 3],
}

impl DisplayEntry {
  pub fn new(class_id: u32, name: impl Into<String>, color: [u8; 3]) -> Self {
    Self {
      class_id,
      name: name.into(),
      color,
    }
  }
}

/// 类别 ID 到 (显示名称, 颜色) 的映射，未登记的类别使用调色板颜色
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<DisplayEntry>", into = "Vec<DisplayEntry>")]
pub struct DisplayTable {
  entries: HashMap<u32, DisplayEntry>,
}

impl Default for DisplayTable {
  fn default() -> Self {
    Self::from(vec![
      DisplayEntry::new(0, "sleeves", [0, 200, 0]),
      DisplayEntry::new(1, "cross", [230, 40, 40]),
      DisplayEntry::new(2, "excopper", [255, 140, 0]),
      DisplayEntry::new(3, "exterminal", [30, 90, 255]),
    ])
  }
}

impl From<Vec<DisplayEntry>> for DisplayTable {
  fn from(entries: Vec<DisplayEntry>) -> Self {
    Self {
      entries: entries.into_iter().map(|e| (e.class_id, e)).collect(),
    }
  }
}

impl From<DisplayTable> for Vec<DisplayEntry> {
  fn from(table: DisplayTable) -> Self {
    let mut entries: Vec<DisplayEntry> = table.entries.into_values().collect();
    entries.sort_by_key(|e| e.class_id);
    entries
  }
}

impl DisplayTable {
  pub fn entries(&self) -> impl Iterator<Item = &DisplayEntry> {
    self.entries.values()
  }

  pub fn lookup(&self, class_id: u32) -> (Cow<'_, str>, Rgb<u8>) {
    match self.entries.get(&class_id) {
      Some(entry) => (Cow::Borrowed(entry.name.as_str()), Rgb(entry.color)),
      None => (
        Cow::Owned(format!("class {}", class_id)),
        palette_color(class_id),
      ),
    }
  }
}

/// 按类别 ID 在色相环上均匀取色
fn palette_color(class_id: u32) -> Rgb<u8> {
  let hue = ((class_id % PALETTE_SIZE) as f32 / PALETTE_SIZE as f32) * 360.0;
  hsv_to_rgb(hue, 0.8, 0.9)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

pub struct Draw {
  font: FontArc,
  font_scale: PxScale,
  display: DisplayTable,
}

impl Draw {
  /// 使用内置字体
  pub fn new(display: DisplayTable, font_size: f32) -> Result<Self, OutputError> {
    let font_data: &'static [u8] = include_bytes!("../../assets/DejaVuSans.ttf");
    let font =
      FontArc::try_from_slice(font_data).map_err(|e| OutputError::Font(e.to_string()))?;
    Self::with_font(font, display, font_size)
  }

  pub fn with_font(
    font: FontArc,
    display: DisplayTable,
    font_size: f32,
  ) -> Result<Self, OutputError> {
    if !(font_size.is_finite() && font_size > 0.0) {
      return Err(OutputError::FontSize(font_size));
    }
    Ok(Self {
      font,
      font_scale: PxScale::from(font_size),
      display,
    })
  }

  /// 一行文本的像素高度（ascent - descent），文本按 ascent 对齐绘制
  fn line_height(&self) -> u32 {
    self.font.as_scaled(self.font_scale).height().ceil() as u32
  }

  /// 在图像上绘制检测结果，按结果顺序依次绘制
  pub fn draw_detections(&self, image: &mut RgbImage, result: &DetectResult) {
    for item in result.iter() {
      self.draw_bbox_with_label(image, item);
    }
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, item: &DetectItem) {
    if !item.bbox.iter().all(|v| v.is_finite()) {
      return;
    }
    let (name, color) = self.display.lookup(item.class_id);

    // 坐标本身不裁剪，只把绘制范围限制在图像外一像素以内，越界的边不会画进图像
    let (w, h) = (image.width() as f32, image.height() as f32);
    let clip = |v: f32, max: f32| v.clamp(-1.0, max + 1.0).round() as i32;
    let x_min = clip(item.bbox[0], w);
    let y_min = clip(item.bbox[1], h);
    let x_max = clip(item.bbox[2], w);
    let y_max = clip(item.bbox[3], h);
    let width = (x_max - x_min).max(1) as u32;
    let height = (y_max - y_min).max(1) as u32;

    // 绘制边框（加粗，向内收缩）
    for t in 0..BOX_THICKNESS {
      let (bw, bh) = (
        width.saturating_sub(2 * t),
        height.saturating_sub(2 * t),
      );
      if bw == 0 || bh == 0 {
        break;
      }
      let rect = Rect::at(x_min + t as i32, y_min + t as i32).of_size(bw, bh);
      draw_hollow_rect_mut(image, rect, color);
    }

    // 标签放在边框左上角上方，空间不足时贴住图像顶部
    let label = format!("{} {:.2}", name, item.score);
    let (text_width, _) = text_size(self.font_scale, &self.font, &label);
    let label_width = text_width + 2 * LABEL_PADDING;
    let label_height = self.line_height() + 2 * LABEL_PADDING;
    let label_x = x_min.max(0);
    let label_y = (y_min - label_height as i32).max(0);

    let rect = Rect::at(label_x, label_y).of_size(label_width, label_height);
    draw_filled_rect_mut(image, rect, color);
    draw_text_mut(
      image,
      Rgb(LABEL_TEXT_COLOR),
      label_x + LABEL_PADDING as i32,
      label_y + LABEL_PADDING as i32,
      self.font_scale,
      &self.font,
      &label,
    );
  }
}

/// PNG、JPEG、BMP 保持原格式，其余格式统一输出 PNG
fn output_format(source: &SourceImage) -> ImageFormat {
  match source.format() {
    Some(format @ (ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Bmp)) => format,
    _ => ImageFormat::Png,
  }
}

impl Render for Draw {
  type Error = image::ImageError;

  fn render_result(
    &self,
    source: &SourceImage,
    result: &DetectResult,
  ) -> Result<Vec<u8>, Self::Error> {
    let mut image = source.image().clone();
    self.draw_detections(&mut image, result);

    let format = output_format(source);
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format)?;
    debug!(
      "标注图像编码完成: {} 个检测框, 格式 {:?}, {} 字节",
      result.len(),
      format,
      buf.get_ref().len()
    );
    Ok(buf.into_inner())
  }
}
