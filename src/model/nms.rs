// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/nms.rs - 按类别的非极大值抑制
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

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{DetectItem, DetectResult};

/// IoU 恰好等于阈值时是否抑制
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionRule {
  /// IoU > 阈值时抑制，等于阈值的框保留
  #[default]
  Greater,
  /// IoU >= 阈值时抑制
  GreaterOrEqual,
}

impl SuppressionRule {
  pub fn suppresses(self, iou: f32, threshold: f32) -> bool {
    match self {
      SuppressionRule::Greater => iou > threshold,
      SuppressionRule::GreaterOrEqual => iou >= threshold,
    }
  }
}

/// 计算两个 [x_min, y_min, x_max, y_max] 边界框的 IoU
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

#[derive(Debug, Clone, Copy)]
pub struct Suppressor {
  iou_threshold: f32,
  rule: SuppressionRule,
}

impl Suppressor {
  pub fn new(iou_threshold: f32) -> Self {
    Self {
      iou_threshold,
      rule: SuppressionRule::default(),
    }
  }

  pub fn with_rule(mut self, rule: SuppressionRule) -> Self {
    self.rule = rule;
    self
  }

  /// 按类别分组，组内保持解码顺序
  pub fn partition(items: Vec<DetectItem>) -> BTreeMap<u32, Vec<DetectItem>> {
    let mut groups: BTreeMap<u32, Vec<DetectItem>> = BTreeMap::new();
    for item in items {
      groups.entry(item.class_id).or_default().push(item);
    }
    groups
  }

  /// 对单个类别做贪心抑制，返回保留的框（置信度降序）
  pub fn suppress_class(&self, mut pool: Vec<DetectItem>) -> Vec<DetectItem> {
    // 稳定排序，同分时保持解码顺序
    pool.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut suppressed = vec![false; pool.len()];
    let mut kept = Vec::new();
    for i in 0..pool.len() {
      if suppressed[i] {
        continue;
      }
      let best = pool[i];
      kept.push(best);
      for j in (i + 1)..pool.len() {
        if suppressed[j] {
          continue;
        }
        let overlap = iou(&best.bbox, &pool[j].bbox);
        if self.rule.suppresses(overlap, self.iou_threshold) {
          suppressed[j] = true;
        }
      }
    }
    kept
  }

  pub fn suppress(&self, items: Vec<DetectItem>) -> DetectResult {
    let total = items.len();
    let mut result: Vec<DetectItem> = Self::partition(items)
      .into_values()
      .flat_map(|pool| self.suppress_class(pool))
      .collect();
    result.sort_by(|a, b| b.score.total_cmp(&a.score));

    debug!("NMS 完成: {} -> {} 个检测框", total, result.len());
    DetectResult::from(result)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(class_id: u32, score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id,
      score,
      bbox,
    }
  }

  #[test]
  fn iou_of_identical_and_disjoint_boxes() {
    let a = [10.0, 20.0, 110.0, 70.0];
    assert_eq!(iou(&a, &a), 1.0);
    assert_eq!(iou(&a, &[200.0, 200.0, 300.0, 300.0]), 0.0);
    // 仅边相接
    assert_eq!(iou(&a, &[110.0, 20.0, 150.0, 70.0]), 0.0);
  }

  #[test]
  fn iou_of_degenerate_boxes_is_zero() {
    let point = [5.0, 5.0, 5.0, 5.0];
    assert_eq!(iou(&point, &point), 0.0);
  }

  #[test]
  fn iou_of_half_overlap() {
    // B 在 A 内部，面积为 A 的一半
    assert_eq!(iou(&[0.0, 0.0, 10.0, 10.0], &[0.0, 0.0, 10.0, 5.0]), 0.5);
  }

  #[test]
  fn same_class_overlap_keeps_highest_confidence() {
    let items = vec![
      item(0, 0.7, [0.0, 0.0, 10.0, 5.0]),
      item(0, 0.9, [0.0, 0.0, 10.0, 10.0]),
    ];
    let result = Suppressor::new(0.3).suppress(items);
    assert_eq!(result.len(), 1);
    assert_eq!(result.items[0].score, 0.9);
  }

  #[test]
  fn different_classes_never_suppress_each_other() {
    let bbox = [0.0, 0.0, 10.0, 10.0];
    let items = vec![item(1, 0.8, bbox), item(2, 0.6, bbox)];
    let result = Suppressor::new(0.3).suppress(items);
    assert_eq!(result.len(), 2);
    assert_eq!(result.items[0].class_id, 1);
    assert_eq!(result.items[1].class_id, 2);
  }

  #[test]
  fn boundary_iou_depends_on_rule() {
    let items = vec![
      item(0, 0.9, [0.0, 0.0, 10.0, 10.0]),
      item(0, 0.7, [0.0, 0.0, 10.0, 5.0]),
    ];

    let kept = Suppressor::new(0.5).suppress(items.clone());
    assert_eq!(kept.len(), 2);

    let kept = Suppressor::new(0.5)
      .with_rule(SuppressionRule::GreaterOrEqual)
      .suppress(items);
    assert_eq!(kept.len(), 1);
  }

  #[test]
  fn suppressed_box_does_not_suppress_others() {
    // A 抑制 B，B 与 C 重叠但 A 与 C 不重叠，C 应保留
    let items = vec![
      item(0, 0.9, [0.0, 0.0, 10.0, 10.0]),
      item(0, 0.8, [5.0, 0.0, 15.0, 10.0]),
      item(0, 0.7, [11.0, 0.0, 21.0, 10.0]),
    ];
    let result = Suppressor::new(0.3).suppress(items);
    let scores: Vec<f32> = result.iter().map(|d| d.score).collect();
    assert_eq!(scores, vec![0.9, 0.7]);
  }

  #[test]
  fn equal_scores_keep_decode_order() {
    let items = vec![
      item(3, 0.5, [0.0, 0.0, 10.0, 10.0]),
      item(3, 0.5, [1.0, 1.0, 11.0, 11.0]),
    ];
    let result = Suppressor::new(0.3).suppress(items);
    assert_eq!(result.len(), 1);
    assert_eq!(result.items[0].bbox, [0.0, 0.0, 10.0, 10.0]);
  }

  #[test]
  fn survivors_respect_threshold_and_ordering() {
    // 固定种子的线性同余生成器，构造大量随机框
    let mut state: u32 = 0x2545_f491;
    let mut next = || {
      state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
      (state >> 8) as f32 / (1u32 << 24) as f32
    };

    let items: Vec<DetectItem> = (0..300)
      .map(|_| {
        let x = next() * 500.0;
        let y = next() * 500.0;
        let w = 10.0 + next() * 120.0;
        let h = 10.0 + next() * 120.0;
        item((next() * 4.0) as u32, next(), [x, y, x + w, y + h])
      })
      .collect();

    let threshold = 0.3;
    let result = Suppressor::new(threshold).suppress(items);
    assert!(!result.is_empty());

    for pair in result.items.windows(2) {
      assert!(pair[0].score >= pair[1].score);
    }
    for (i, a) in result.iter().enumerate() {
      for b in result.items.iter().skip(i + 1) {
        if a.class_id == b.class_id {
          assert!(iou(&a.bbox, &b.bbox) <= threshold);
        }
      }
    }
  }
}
