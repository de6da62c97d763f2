// 该文件是 Shanan （山南西风） 项目的一部分。
// src/error.rs - 检测流程错误定义
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

use crate::{config::ConfigError, frame::ShapeError, model::ModelError, output::OutputError};

/// 单次 `detect` 调用可能返回的错误
///
/// “没有检测到目标”不是错误，而是一个空的检测结果。
#[derive(Error, Debug)]
pub enum DetectError {
  #[error("图像解码错误: {0}")]
  Decode(#[source] image::ImageError),
  #[error("模型执行错误: {0}")]
  Model(#[source] ModelError),
  #[error("张量形状错误: {0}")]
  Shape(#[from] ShapeError),
  #[error("图像编码错误: {0}")]
  Encode(#[source] image::ImageError),
  #[error("配置错误: {0}")]
  Config(#[from] ConfigError),
  #[error("输出初始化错误: {0}")]
  Output(#[from] OutputError),
  #[error("后台任务异常: {0}")]
  Join(#[from] tokio::task::JoinError),
}

/// 模型输出形状不符时归入形状错误，其余归入模型错误
impl From<ModelError> for DetectError {
  fn from(e: ModelError) -> Self {
    match e {
      ModelError::Shape(shape) => DetectError::Shape(shape),
      e => DetectError::Model(e),
    }
  }
}

impl DetectError {
  pub fn is_decode(&self) -> bool {
    matches!(self, DetectError::Decode(_))
  }

  pub fn is_model(&self) -> bool {
    matches!(self, DetectError::Model(_))
  }
}
