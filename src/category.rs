// 该文件是 Shanan （山南西风） 项目的一部分。
// src/category.rs - 检测类别统计
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

use std::collections::HashMap;

use serde::{Deserialize, Serialize, ser::SerializeMap};
use tracing::warn;

use crate::model::DetectResult;

/// 一个业务类别，可对应多个模型类别 ID
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
  pub name: String,
  pub class_ids: Vec<u32>,
}

impl Category {
  pub fn new(name: impl Into<String>, class_ids: impl Into<Vec<u32>>) -> Self {
    Self {
      name: name.into(),
      class_ids: class_ids.into(),
    }
  }
}

/// 类别 ID 到业务类别的映射表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Category>", into = "Vec<Category>")]
pub struct CategoryTable {
  categories: Vec<Category>,
  index: HashMap<u32, usize>,
}

impl Default for CategoryTable {
  fn default() -> Self {
    Self::new(vec![
      Category::new("sleeves", [0]),
      Category::new("cross", [1]),
      Category::new("excopper", [2]),
      Category::new("exterminal", [3]),
    ])
  }
}

impl From<Vec<Category>> for CategoryTable {
  fn from(categories: Vec<Category>) -> Self {
    Self::new(categories)
  }
}

impl From<CategoryTable> for Vec<Category> {
  fn from(table: CategoryTable) -> Self {
    table.categories
  }
}

impl CategoryTable {
  /// 同一个类别 ID 出现在多个类别中时，以先声明的为准
  pub fn new(categories: Vec<Category>) -> Self {
    let mut index: HashMap<u32, usize> = HashMap::new();
    for (pos, category) in categories.iter().enumerate() {
      for &class_id in &category.class_ids {
        if let Some(&first) = index.get(&class_id) {
          warn!(
            "类别 ID {} 同时属于 '{}' 和 '{}'，忽略后者",
            class_id, categories[first].name, category.name
          );
          continue;
        }
        index.insert(class_id, pos);
      }
    }
    Self { categories, index }
  }

  pub fn categories(&self) -> &[Category] {
    &self.categories
  }

  pub fn category_of(&self, class_id: u32) -> Option<&str> {
    self
      .index
      .get(&class_id)
      .map(|&pos| self.categories[pos].name.as_str())
  }

  /// 统计每个类别的检测数量，未登记的类别 ID 忽略
  pub fn count(&self, result: &DetectResult) -> CategoryCounts {
    let mut counts = vec![0u32; self.categories.len()];
    for item in result.iter() {
      if let Some(&pos) = self.index.get(&item.class_id) {
        counts[pos] += 1;
      }
    }

    CategoryCounts {
      entries: self
        .categories
        .iter()
        .map(|c| c.name.clone())
        .zip(counts)
        .collect(),
    }
  }
}

/// 各类别的检测数量，按映射表中的声明顺序排列
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryCounts {
  entries: Vec<(String, u32)>,
}

impl CategoryCounts {
  pub fn get(&self, name: &str) -> Option<u32> {
    self
      .entries
      .iter()
      .find(|(n, _)| n == name)
      .map(|&(_, count)| count)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
    self.entries.iter().map(|(name, count)| (name.as_str(), *count))
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn total(&self) -> u32 {
    self.entries.iter().map(|(_, count)| count).sum()
  }
}

impl Serialize for CategoryCounts {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(self.entries.len()))?;
    for (name, count) in &self.entries {
      map.serialize_entry(name, count)?;
    }
    map.end()
  }
}
