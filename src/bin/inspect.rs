// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/inspect.rs - 单张图片检测工具
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

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use shanan_inspect::{
  DetectConfig, DetectOptions, Detector, FromUrl, ModelHandle, model::OnnxModelBuilder,
};

/// 检测图片中的部件并输出标注图
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型地址，例如 onnx:///opt/models/parts.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入图片
  #[arg(long, value_name = "FILE")]
  pub input: PathBuf,
  /// 标注图输出路径
  #[arg(long, value_name = "FILE")]
  pub output: PathBuf,
  /// JSON 配置文件
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,
  /// 置信度阈值 (0.0 - 1.0)，覆盖配置文件
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,
  /// NMS IOU 阈值 (0.0 - 1.0)，覆盖配置文件
  #[arg(long, value_name = "THRESHOLD")]
  pub iou: Option<f32>,
  /// ONNX Runtime 算子内线程数
  #[arg(long, default_value = "4", value_name = "COUNT")]
  pub intra_threads: usize,
  /// 重复检测次数，用于测量平均耗时
  #[arg(long, default_value = "1", value_name = "COUNT")]
  pub repeat: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  info!("模型地址: {}", args.model);
  info!("输入图片: {}", args.input.display());
  info!("输出路径: {}", args.output.display());

  let config = match &args.config {
    Some(path) => DetectConfig::from_path(path)?,
    None => DetectConfig::default(),
  };
  let options = DetectOptions {
    confidence_threshold: args.confidence,
    iou_threshold: args.iou,
  };

  let builder = OnnxModelBuilder::from_url(&args.model)?
    .num_classes(config.num_classes)
    .intra_threads(args.intra_threads);
  let handle = Arc::new(ModelHandle::new(builder));
  handle.initialize().await?;
  let detector = Detector::new(handle, config)?;

  let image = tokio::fs::read(&args.input)
    .await
    .with_context(|| format!("无法读取输入图片: {}", args.input.display()))?;

  let repeat = args.repeat.max(1);
  let mut times = Vec::with_capacity(repeat);
  let mut outcome = None;
  for i in 0..repeat {
    let now = std::time::Instant::now();
    let result = detector.detect(image.clone(), options).await?;
    let elapsed = now.elapsed();
    info!("({})检测完成，耗时: {:.2?}", i, elapsed);
    times.push(elapsed);
    outcome = Some(result);
  }

  if repeat > 1 {
    let total: Duration = times.iter().sum();
    info!(
      "共 {} 次，平均耗时: {:.2?}",
      repeat,
      total / repeat as u32
    );
  }

  let outcome = outcome.context("没有检测结果")?;
  tokio::fs::write(&args.output, &outcome.annotated)
    .await
    .with_context(|| format!("无法写入标注图: {}", args.output.display()))?;
  info!("标注图已保存: {}", args.output.display());

  println!("{}", serde_json::to_string(&outcome.counts)?);

  Ok(())
}
