// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 图像输入与预处理
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

use image::{ImageFormat, RgbImage, imageops::FilterType};
use tracing::debug;

use crate::{error::DetectError, frame::InputTensor};

/// 已解码的源图像
///
/// 保留原始编码格式，标注结果会尽量以相同格式重新编码。
#[derive(Debug, Clone)]
pub struct SourceImage {
  image: RgbImage,
  format: Option<ImageFormat>,
}

impl SourceImage {
  /// 解码图像字节并丢弃 alpha 通道
  pub fn decode(bytes: &[u8]) -> Result<Self, image::ImageError> {
    let format = image::guess_format(bytes).ok();
    let image = image::load_from_memory(bytes)?.to_rgb8();
    debug!(
      "源图像解码完成: {}x{}, 格式: {:?}",
      image.width(),
      image.height(),
      format
    );
    Ok(Self { image, format })
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn format(&self) -> Option<ImageFormat> {
    self.format
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }
}

impl From<RgbImage> for SourceImage {
  fn from(image: RgbImage) -> Self {
    Self {
      image,
      format: None,
    }
  }
}

/// 预处理器：拉伸缩放到 S×S（不保持宽高比），输出 NCHW 浮点张量
#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
  input_size: u32,
  filter: FilterType,
}

impl Preprocessor {
  pub fn new(input_size: u32) -> Self {
    Self {
      input_size,
      filter: FilterType::Triangle,
    }
  }

  pub fn with_filter(mut self, filter: FilterType) -> Self {
    self.filter = filter;
    self
  }

  pub fn input_size(&self) -> u32 {
    self.input_size
  }

  /// 解码并转换，返回源图像（用于坐标还原和标注）以及模型输入张量
  pub fn preprocess(&self, bytes: &[u8]) -> Result<(SourceImage, InputTensor), DetectError> {
    let source = SourceImage::decode(bytes).map_err(DetectError::Decode)?;
    let tensor = self.to_tensor(&source)?;
    Ok((source, tensor))
  }

  pub fn to_tensor(&self, source: &SourceImage) -> Result<InputTensor, DetectError> {
    let edge = self.input_size as usize;
    let resized = image::imageops::resize(
      source.image(),
      self.input_size,
      self.input_size,
      self.filter,
    );

    let plane = edge * edge;
    let mut data = vec![0f32; plane * 3];
    for (x, y, pixel) in resized.enumerate_pixels() {
      let idx = (y as usize) * edge + (x as usize);
      data[idx] = pixel[0] as f32 / 255.0;
      data[plane + idx] = pixel[1] as f32 / 255.0;
      data[2 * plane + idx] = pixel[2] as f32 / 255.0;
    }

    Ok(InputTensor::from_planes(edge, data)?)
  }
}
