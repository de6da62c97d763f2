// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - 模型输入/输出张量定义
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

use thiserror::Error;

const RGB_CHANNELS: usize = 3;
/// 每个候选框的几何参数个数: cx, cy, w, h
pub const BOX_PARAMS: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
  #[error("输入尺寸不能为 0")]
  ZeroEdge,
  #[error("输入张量长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  InputLength { expected: usize, actual: usize },
  #[error("输出张量形状不匹配: 期望 [1, {expected_rows}, N], 实际 {shape:?}")]
  OutputShape {
    expected_rows: usize,
    shape: Vec<usize>,
  },
  #[error("输出张量长度不匹配: 形状 {shape:?} 需要 {expected} 个元素, 实际 {actual}")]
  OutputLength {
    shape: Vec<usize>,
    expected: usize,
    actual: usize,
  },
  #[error("类别数量不匹配: 期望 {expected}, 实际 {actual}")]
  ClassCount { expected: usize, actual: usize },
}

/// 模型输入张量，形状为 [1, 3, S, S]
///
/// 按通道平面存储 (R, G, B)，数值已归一化到 [0, 1]。
#[derive(Debug, Clone)]
pub struct InputTensor {
  edge: usize,
  data: Box<[f32]>,
}

impl InputTensor {
  pub fn from_planes(edge: usize, data: Vec<f32>) -> Result<Self, ShapeError> {
    if edge == 0 {
      return Err(ShapeError::ZeroEdge);
    }
    let expected = RGB_CHANNELS * edge * edge;
    if data.len() != expected {
      return Err(ShapeError::InputLength {
        expected,
        actual: data.len(),
      });
    }
    Ok(Self {
      edge,
      data: data.into_boxed_slice(),
    })
  }

  pub fn edge(&self) -> usize {
    self.edge
  }

  pub fn shape(&self) -> [usize; 4] {
    [1, RGB_CHANNELS, self.edge, self.edge]
  }

  /// 第 `channel` 个通道平面，长度为 S×S
  pub fn plane(&self, channel: usize) -> &[f32] {
    let size = self.edge * self.edge;
    &self.data[channel * size..(channel + 1) * size]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }
}

/// 模型原始输出，逻辑形状为 [1, 4 + K, N]
///
/// 转置布局：先是 N 个 cx，再是 N 个 cy、N 个 w、N 个 h，
/// 随后是 K 个长度为 N 的类别得分平面。
#[derive(Debug, Clone)]
pub struct OutputTensor {
  num_classes: usize,
  num_candidates: usize,
  data: Box<[f32]>,
}

impl OutputTensor {
  /// 按运行时给出的形状构造，形状必须是 [1, 4 + K, N]
  pub fn from_shape(
    shape: &[usize],
    data: Vec<f32>,
    num_classes: usize,
  ) -> Result<Self, ShapeError> {
    let expected_rows = BOX_PARAMS + num_classes;
    match shape {
      [1, rows, n] if *rows == expected_rows => Self::from_planes(num_classes, *n, data),
      _ => Err(ShapeError::OutputShape {
        expected_rows,
        shape: shape.to_vec(),
      }),
    }
  }

  pub fn from_planes(
    num_classes: usize,
    num_candidates: usize,
    data: Vec<f32>,
  ) -> Result<Self, ShapeError> {
    let expected = (BOX_PARAMS + num_classes) * num_candidates;
    if data.len() != expected {
      return Err(ShapeError::OutputLength {
        shape: vec![1, BOX_PARAMS + num_classes, num_candidates],
        expected,
        actual: data.len(),
      });
    }
    Ok(Self {
      num_classes,
      num_candidates,
      data: data.into_boxed_slice(),
    })
  }

  pub fn num_classes(&self) -> usize {
    self.num_classes
  }

  pub fn num_candidates(&self) -> usize {
    self.num_candidates
  }

  pub fn shape(&self) -> [usize; 3] {
    [1, BOX_PARAMS + self.num_classes, self.num_candidates]
  }

  /// 几何参数平面: 0 = cx, 1 = cy, 2 = w, 3 = h
  pub fn geometry(&self, param: usize) -> &[f32] {
    debug_assert!(param < BOX_PARAMS);
    self.row(param)
  }

  pub fn class_scores(&self, class_id: usize) -> &[f32] {
    debug_assert!(class_id < self.num_classes);
    self.row(BOX_PARAMS + class_id)
  }

  fn row(&self, row: usize) -> &[f32] {
    let n = self.num_candidates;
    &self.data[row * n..(row + 1) * n]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }
}
