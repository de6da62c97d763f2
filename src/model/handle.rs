// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/handle.rs - 共享模型句柄（延迟初始化）
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

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{error, info};

use super::{ModelBuilder, ModelError};

/// 已加载模型的唯一持有者
///
/// 并发的首次调用只会触发一次加载；加载失败时不缓存失败结果，
/// 下一次调用会重新尝试。
pub struct ModelHandle<B: ModelBuilder> {
  builder: Arc<B>,
  model: OnceCell<Arc<B::Model>>,
}

impl<B: ModelBuilder> ModelHandle<B> {
  pub fn new(builder: B) -> Self {
    Self {
      builder: Arc::new(builder),
      model: OnceCell::new(),
    }
  }

  pub fn is_initialized(&self) -> bool {
    self.model.initialized()
  }

  /// 启动时显式加载模型
  pub async fn initialize(&self) -> Result<(), ModelError> {
    self.get().await.map(|_| ())
  }

  pub async fn get(&self) -> Result<Arc<B::Model>, ModelError> {
    let model = self
      .model
      .get_or_try_init(|| async {
        info!("开始加载模型");
        let builder = Arc::clone(&self.builder);
        let now = std::time::Instant::now();
        let result = tokio::task::spawn_blocking(move || builder.build())
          .await
          .map_err(|e| ModelError::Load(format!("模型加载任务异常: {}", e)))?;
        match result {
          Ok(model) => {
            info!("模型加载完成，耗时: {:.2?}", now.elapsed());
            Ok(Arc::new(model))
          }
          Err(e) => {
            error!("模型加载失败: {}", e);
            Err(e)
          }
        }
      })
      .await?;
    Ok(Arc::clone(model))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    frame::{InputTensor, OutputTensor},
    model::{FnModelBuilder, Model},
  };
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct EmptyModel;

  impl Model for EmptyModel {
    fn infer(&self, _input: &InputTensor) -> Result<OutputTensor, ModelError> {
      Ok(OutputTensor::from_planes(1, 0, Vec::new())?)
    }
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn concurrent_first_calls_build_once() {
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&builds);
    let handle = Arc::new(ModelHandle::new(FnModelBuilder(move || {
      counter.fetch_add(1, Ordering::SeqCst);
      std::thread::sleep(std::time::Duration::from_millis(20));
      Ok::<_, ModelError>(EmptyModel)
    })));

    let tasks: Vec<_> = (0..16)
      .map(|_| {
        let handle = Arc::clone(&handle);
        tokio::spawn(async move { handle.get().await.map(|_| ()) })
      })
      .collect();
    for task in tasks {
      task.await.unwrap().unwrap();
    }

    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert!(handle.is_initialized());
  }

  #[tokio::test]
  async fn failed_initialization_is_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let handle = ModelHandle::new(FnModelBuilder(move || {
      if counter.fetch_add(1, Ordering::SeqCst) == 0 {
        Err(ModelError::Load("设备忙".to_string()))
      } else {
        Ok(EmptyModel)
      }
    }));

    assert!(matches!(handle.initialize().await, Err(ModelError::Load(_))));
    assert!(!handle.is_initialized());

    handle.initialize().await.unwrap();
    assert!(handle.is_initialized());
    handle.get().await.unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
  }
}
