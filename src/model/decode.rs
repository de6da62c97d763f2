// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/decode.rs - 模型输出解码
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

use tracing::debug;

use crate::{
  frame::{OutputTensor, ShapeError},
  model::DetectItem,
};

/// 将 [1, 4 + K, N] 的转置输出解码为原图坐标下的候选框
///
/// 不做裁剪，不做去重；类别含义由调用方决定。
#[derive(Debug, Clone, Copy)]
pub struct Decoder {
  input_size: u32,
  num_classes: usize,
  confidence_threshold: f32,
}

impl Decoder {
  pub fn new(input_size: u32, num_classes: usize, confidence_threshold: f32) -> Self {
    Self {
      input_size,
      num_classes,
      confidence_threshold,
    }
  }

  pub fn decode(
    &self,
    output: &OutputTensor,
    original_width: u32,
    original_height: u32,
  ) -> Result<Vec<DetectItem>, ShapeError> {
    if output.num_classes() != self.num_classes {
      return Err(ShapeError::ClassCount {
        expected: self.num_classes,
        actual: output.num_classes(),
      });
    }

    let scale_x = original_width as f32 / self.input_size as f32;
    let scale_y = original_height as f32 / self.input_size as f32;

    let cx = output.geometry(0);
    let cy = output.geometry(1);
    let w = output.geometry(2);
    let h = output.geometry(3);
    let scores: Vec<&[f32]> = (0..self.num_classes)
      .map(|c| output.class_scores(c))
      .collect();

    let mut items = Vec::new();
    for i in 0..output.num_candidates() {
      let (class_id, score) = argmax(&scores, i);
      if score < self.confidence_threshold {
        continue;
      }

      let (x_min, y_min, x_max, y_max) = cxcywh_to_xyxy(cx[i], cy[i], w[i], h[i]);
      items.push(DetectItem {
        class_id: class_id as u32,
        score,
        bbox: [
          x_min * scale_x,
          y_min * scale_y,
          x_max * scale_x,
          y_max * scale_y,
        ],
      });
    }

    debug!(
      "解码完成: {} 个候选中有 {} 个超过置信度阈值 {}",
      output.num_candidates(),
      items.len(),
      self.confidence_threshold
    );

    Ok(items)
  }
}

/// 相同得分时保留先出现的类别
fn argmax(scores: &[&[f32]], idx: usize) -> (usize, f32) {
  let mut max_score = f32::NEG_INFINITY;
  let mut cls_idx = 0usize;
  for (c, plane) in scores.iter().enumerate() {
    let score = plane[idx];
    if score > max_score {
      max_score = score;
      cls_idx = c;
    }
  }
  (cls_idx, max_score)
}

#[inline]
fn cxcywh_to_xyxy(cx: f32, cy: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
  let x1 = cx - w / 2.0;
  let y1 = cy - h / 2.0;
  let x2 = cx + w / 2.0;
  let y2 = cy + h / 2.0;
  (x1, y1, x2, y2)
}
