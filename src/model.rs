// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 模型
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

use serde::Serialize;
use thiserror::Error;

use crate::frame::{InputTensor, OutputTensor, ShapeError};

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型加载错误: {0}")]
  Load(String),
  #[error("模型路径错误: {0}")]
  Path(String),
  #[error("模型推理错误: {0}")]
  Runtime(String),
  #[error("模型输出错误: {0}")]
  Shape(#[from] ShapeError),
}

impl ModelError {
  pub fn load(e: impl std::fmt::Display) -> Self {
    ModelError::Load(e.to_string())
  }

  pub fn runtime(e: impl std::fmt::Display) -> Self {
    ModelError::Runtime(e.to_string())
  }
}

/// 推理运行时，输入 [1, 3, S, S]，输出 [1, 4 + K, N]
pub trait Model: Send + Sync + 'static {
  fn infer(&self, input: &InputTensor) -> Result<OutputTensor, ModelError>;
}

/// 负责加载模型，由 [`ModelHandle`] 在首次使用时调用
pub trait ModelBuilder: Send + Sync + 'static {
  type Model: Model;

  fn build(&self) -> Result<Self::Model, ModelError>;
}

/// 以闭包作为模型加载器
pub struct FnModelBuilder<F>(pub F);

impl<M, F> ModelBuilder for FnModelBuilder<F>
where
  M: Model,
  F: Fn() -> Result<M, ModelError> + Send + Sync + 'static,
{
  type Model = M;

  fn build(&self) -> Result<M, ModelError> {
    (self.0)()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，原图像素坐标，不裁剪
}

/// 经过阈值过滤和抑制后的检测结果，按置信度降序排列
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DetectItem> {
    self.items.iter()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

pub mod decode;
mod handle;
pub mod nms;
#[cfg(feature = "onnx")]
mod onnx;

pub use self::decode::Decoder;
pub use self::handle::ModelHandle;
pub use self::nms::{SuppressionRule, Suppressor, iou};
#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxModel, OnnxModelBuilder};
