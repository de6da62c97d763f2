// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 检测任务
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

use std::{sync::Arc, time::Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::{
  category::CategoryCounts,
  config::{DetectConfig, DetectOptions},
  error::DetectError,
  input::Preprocessor,
  model::{Decoder, DetectResult, Model, ModelBuilder, ModelHandle, Suppressor},
  output::{Draw, Render},
};

/// 一次检测的结果
#[derive(Debug, Clone, Serialize)]
pub struct DetectOutcome {
  pub counts: CategoryCounts,
  #[serde(skip)]
  pub annotated: Vec<u8>,
  pub detections: DetectResult,
}

/// 检测流水线：预处理、推理、解码、抑制、统计与标注
///
/// 模型句柄由调用方注入，可在多个检测器之间共享。
pub struct Detector<B: ModelBuilder> {
  model: Arc<ModelHandle<B>>,
  config: Arc<DetectConfig>,
  preprocessor: Preprocessor,
  draw: Arc<Draw>,
}

impl<B: ModelBuilder> Clone for Detector<B> {
  fn clone(&self) -> Self {
    Self {
      model: Arc::clone(&self.model),
      config: Arc::clone(&self.config),
      preprocessor: self.preprocessor,
      draw: Arc::clone(&self.draw),
    }
  }
}

impl<B: ModelBuilder> Detector<B> {
  pub fn new(model: Arc<ModelHandle<B>>, config: DetectConfig) -> Result<Self, DetectError> {
    config.validate()?;
    let draw = Draw::new(config.display.clone(), config.label_font_size)?;
    Ok(Self {
      model,
      preprocessor: Preprocessor::new(config.input_size),
      config: Arc::new(config),
      draw: Arc::new(draw),
    })
  }

  pub async fn detect(
    &self,
    image: Vec<u8>,
    options: DetectOptions,
  ) -> Result<DetectOutcome, DetectError> {
    let (confidence, iou) = options.resolve(&self.config)?;
    let start = Instant::now();

    let preprocessor = self.preprocessor;
    let (source, tensor) =
      tokio::task::spawn_blocking(move || preprocessor.preprocess(&image)).await??;
    let source = Arc::new(source);
    debug!(
      "预处理完成: {}x{}，耗时: {:.2?}",
      source.width(),
      source.height(),
      start.elapsed()
    );

    let model = self.model.get().await?;
    let now = Instant::now();
    let output = tokio::task::spawn_blocking(move || model.infer(&tensor)).await??;
    debug!("推理完成，耗时: {:.2?}", now.elapsed());

    let decoder = Decoder::new(self.config.input_size, self.config.num_classes, confidence);
    let candidates = decoder.decode(&output, source.width(), source.height())?;
    let detections = Suppressor::new(iou)
      .with_rule(self.config.suppression)
      .suppress(candidates);

    // 标注与统计并行
    let draw = Arc::clone(&self.draw);
    let render_source = Arc::clone(&source);
    let render_result = detections.clone();
    let annotate = tokio::task::spawn_blocking(move || {
      draw.render_result(&render_source, &render_result)
    });
    let counts = self.config.categories.count(&detections);
    let annotated = annotate.await?.map_err(DetectError::Encode)?;

    info!(
      "检测完成: {} 个目标，统计: {}，总耗时: {:.2?}",
      detections.len(),
      serde_json::to_string(&counts).unwrap_or_default(),
      start.elapsed()
    );

    Ok(DetectOutcome {
      counts,
      annotated,
      detections,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    frame::{InputTensor, OutputTensor},
    model::{FnModelBuilder, ModelError},
  };

  struct Silent;

  impl Model for Silent {
    fn infer(&self, _input: &InputTensor) -> Result<OutputTensor, ModelError> {
      Ok(OutputTensor::from_planes(80, 4, vec![0.0; 84 * 4])?)
    }
  }

  #[test]
  fn invalid_config_is_rejected_up_front() {
    let handle = Arc::new(ModelHandle::new(FnModelBuilder(|| Ok::<_, ModelError>(Silent))));
    let config = DetectConfig {
      iou_threshold: 3.0,
      ..DetectConfig::default()
    };
    assert!(matches!(
      Detector::new(handle, config),
      Err(DetectError::Config(_))
    ));
  }

  #[tokio::test]
  async fn bad_options_fail_before_model_load() {
    let handle = Arc::new(ModelHandle::new(FnModelBuilder(|| Ok::<_, ModelError>(Silent))));
    let detector = Detector::new(Arc::clone(&handle), DetectConfig::default()).unwrap();
    let result = detector
      .detect(Vec::new(), DetectOptions::default().confidence(-1.0))
      .await;
    assert!(matches!(result, Err(DetectError::Config(_))));
    assert!(!handle.is_initialized());
  }
}
