// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 检测配置
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

use std::{collections::HashSet, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::{
  category::CategoryTable,
  model::SuppressionRule,
  output::{DisplayTable, draw::LABEL_FONT_SIZE},
};

const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_NUM_CLASSES: usize = 80;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.1;
const DEFAULT_IOU_THRESHOLD: f32 = 0.3;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("配置文件读取错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("配置文件解析错误: {0}")]
  Json(#[from] serde_json::Error),
  #[error("配置无效: {0}")]
  Invalid(String),
}

/// 检测流水线配置，所有字段均可省略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectConfig {
  /// 模型输入边长 S
  pub input_size: u32,
  /// 模型类别数 K
  pub num_classes: usize,
  pub confidence_threshold: f32,
  pub iou_threshold: f32,
  pub suppression: SuppressionRule,
  pub categories: CategoryTable,
  pub display: DisplayTable,
  pub label_font_size: f32,
}

impl Default for DetectConfig {
  fn default() -> Self {
    Self {
      input_size: DEFAULT_INPUT_SIZE,
      num_classes: DEFAULT_NUM_CLASSES,
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      suppression: SuppressionRule::default(),
      categories: CategoryTable::default(),
      display: DisplayTable::default(),
      label_font_size: LABEL_FONT_SIZE,
    }
  }
}

impl DetectConfig {
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("读取配置文件: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    Self::from_json_str(&text)
  }

  pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
    let config: DetectConfig = serde_json::from_str(text)?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.input_size == 0 {
      return Err(ConfigError::Invalid("input_size 必须大于 0".to_string()));
    }
    if self.num_classes == 0 {
      return Err(ConfigError::Invalid("num_classes 必须大于 0".to_string()));
    }
    check_unit_range("confidence_threshold", self.confidence_threshold)?;
    check_unit_range("iou_threshold", self.iou_threshold)?;
    if !(self.label_font_size.is_finite() && self.label_font_size > 0.0) {
      return Err(ConfigError::Invalid(format!(
        "label_font_size 无效: {}",
        self.label_font_size
      )));
    }

    let mut names = HashSet::new();
    for category in self.categories.categories() {
      if !names.insert(category.name.as_str()) {
        return Err(ConfigError::Invalid(format!(
          "类别名称重复: {}",
          category.name
        )));
      }
      if let Some(&id) = category
        .class_ids
        .iter()
        .find(|&&id| id as usize >= self.num_classes)
      {
        return Err(ConfigError::Invalid(format!(
          "类别 '{}' 的 ID {} 超出类别数 {}",
          category.name, id, self.num_classes
        )));
      }
    }

    if let Some(entry) = self
      .display
      .entries()
      .find(|e| e.class_id as usize >= self.num_classes)
    {
      return Err(ConfigError::Invalid(format!(
        "显示表中的 ID {} 超出类别数 {}",
        entry.class_id, self.num_classes
      )));
    }

    Ok(())
  }
}

fn check_unit_range(name: &str, value: f32) -> Result<(), ConfigError> {
  if (0.0..=1.0).contains(&value) {
    Ok(())
  } else {
    Err(ConfigError::Invalid(format!(
      "{} 必须在 [0, 1] 范围内，实际为 {}",
      name, value
    )))
  }
}

/// 单次调用的阈值覆盖，未设置的字段使用配置值
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DetectOptions {
  pub confidence_threshold: Option<f32>,
  pub iou_threshold: Option<f32>,
}

impl DetectOptions {
  pub fn confidence(mut self, threshold: f32) -> Self {
    self.confidence_threshold = Some(threshold);
    self
  }

  pub fn iou(mut self, threshold: f32) -> Self {
    self.iou_threshold = Some(threshold);
    self
  }

  /// 合并配置，返回 (置信度阈值, IoU 阈值)
  pub fn resolve(&self, config: &DetectConfig) -> Result<(f32, f32), ConfigError> {
    let confidence = self
      .confidence_threshold
      .unwrap_or(config.confidence_threshold);
    let iou = self.iou_threshold.unwrap_or(config.iou_threshold);
    check_unit_range("confidence_threshold", confidence)?;
    check_unit_range("iou_threshold", iou)?;
    Ok((confidence, iou))
  }
}
