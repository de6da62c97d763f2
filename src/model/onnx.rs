// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 推理后端
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

use std::sync::{Mutex, MutexGuard};

use ndarray::ArrayView;
use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::TensorRef,
};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{InputTensor, OutputTensor},
  model::{Model, ModelBuilder, ModelError},
};

const ONNX_DEFAULT_CLASS_NUM: usize = 80;
const ONNX_DEFAULT_INTRA_THREADS: usize = 4;

pub struct OnnxModelBuilder {
  model_path: String,
  num_classes: usize,
  intra_threads: usize,
}

impl FromUrlWithScheme for OnnxModelBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxModelBuilder {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "模型 URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ModelError::Path(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(OnnxModelBuilder {
      model_path: url.path().to_string(),
      num_classes: ONNX_DEFAULT_CLASS_NUM,
      intra_threads: ONNX_DEFAULT_INTRA_THREADS,
    })
  }
}

impl OnnxModelBuilder {
  pub fn num_classes(mut self, num_classes: usize) -> Self {
    self.num_classes = num_classes;
    self
  }

  pub fn intra_threads(mut self, intra_threads: usize) -> Self {
    self.intra_threads = intra_threads;
    self
  }
}

impl ModelBuilder for OnnxModelBuilder {
  type Model = OnnxModel;

  fn build(&self) -> Result<OnnxModel, ModelError> {
    info!("加载模型文件: {}", self.model_path);

    let session = Session::builder()
      .map_err(ModelError::load)?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(ModelError::load)?
      .with_intra_threads(self.intra_threads)
      .map_err(ModelError::load)?
      .commit_from_file(&self.model_path)
      .map_err(ModelError::load)?;

    info!("模型加载完成");
    Ok(OnnxModel {
      session: Mutex::new(session),
      num_classes: self.num_classes,
    })
  }
}

/// 会话在推理时需要可变借用，因此放在互斥锁中
pub struct OnnxModel {
  session: Mutex<Session>,
  num_classes: usize,
}

impl Model for OnnxModel {
  fn infer(&self, input: &InputTensor) -> Result<OutputTensor, ModelError> {
    let view =
      ArrayView::from_shape(input.shape(), input.as_slice()).map_err(ModelError::runtime)?;

    let mut session = lock_session(&self.session);

    debug!("执行模型推理");
    let outputs = session
      .run(ort::inputs![
        TensorRef::from_array_view(view).map_err(ModelError::runtime)?
      ])
      .map_err(ModelError::runtime)?;

    let (shape, data) = outputs[0]
      .try_extract_tensor::<f32>()
      .map_err(ModelError::runtime)?;
    let shape: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
    debug!("模型输出形状: {:?}", shape);

    Ok(OutputTensor::from_shape(&shape, data.to_vec(), self.num_classes)?)
  }
}

/// 之前的推理在持锁时崩溃不影响会话本身，取回锁继续使用
fn lock_session<T>(session: &Mutex<T>) -> MutexGuard<'_, T> {
  session.lock().unwrap_or_else(|poisoned| {
    warn!("推理会话锁在上一次推理中被污染，继续使用该会话");
    session.clear_poison();
    poisoned.into_inner()
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  #[test]
  fn url_scheme_must_be_onnx() {
    let url = Url::parse("http://x/m.onnx").unwrap();
    assert!(matches!(
      OnnxModelBuilder::from_url(&url),
      Err(ModelError::Path(_))
    ));

    let url = Url::parse("onnx:///opt/models/m.onnx").unwrap();
    let builder = OnnxModelBuilder::from_url(&url)
      .unwrap()
      .num_classes(4)
      .intra_threads(2);
    assert_eq!(builder.model_path, "/opt/models/m.onnx");
    assert_eq!(builder.num_classes, 4);
    assert_eq!(builder.intra_threads, 2);
  }

  #[test]
  fn poisoned_session_lock_is_recovered() {
    let session = Arc::new(Mutex::new(7u32));
    let shared = Arc::clone(&session);
    let crashed = std::thread::spawn(move || {
      let _guard = shared.lock().unwrap();
      panic!("推理崩溃");
    })
    .join();
    assert!(crashed.is_err());
    assert!(session.is_poisoned());

    *lock_session(&session) += 1;
    assert_eq!(*lock_session(&session), 8);
    assert!(!session.is_poisoned());
  }
}
