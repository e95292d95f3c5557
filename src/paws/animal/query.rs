//! 搜索 / 过滤 / 分页辅助
//!
//! 所有搜索页共用同一套逻辑：先按来源谓词过滤，再做关键字细筛，最后分页。
//! 顺序固定，保证同一输入得到同一输出。

use crate::paws::animal::models::{
    Animal, AnimalStatus, AnimalType, Gender, PlaceRecord, PlaceSource,
};
use serde::{Deserialize, Serialize};

/// 一页结果：条目与过滤后（分页前）的总数
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

/// 带失败指示的搜索结果
///
/// 上游拉取失败时 `error` 携带原因，条目为空、总数为零，绝不 panic
#[derive(Debug, Clone)]
pub struct SearchResult<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub error: Option<String>,
}

impl<T> SearchResult<T> {
    pub fn failed(reason: String) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            error: Some(reason),
        }
    }

    pub fn from_page(page: Page<T>) -> Self {
        Self {
            items: page.items,
            total: page.total,
            error: None,
        }
    }
}

/// 动物搜索的过滤规格：未设置的谓词不施加任何约束，设置的谓词按 AND 组合
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    /// 关键字：对名称 / 品种 / 描述 / 所在地做大小写不敏感的子串匹配
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub animal_type: Option<AnimalType>,
    #[serde(default)]
    pub status: Option<AnimalStatus>,
    #[serde(default)]
    pub gender: Option<Gender>,
    /// 品种子串匹配（大小写不敏感）
    #[serde(default)]
    pub breed: Option<String>,
    /// 所在地子串匹配（大小写不敏感）
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            keyword: None,
            animal_type: None,
            status: None,
            gender: None,
            breed: None,
            location: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

fn default_limit() -> usize {
    20
}

/// 场所搜索的过滤规格
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceFilterSpec {
    #[serde(default)]
    pub keyword: Option<String>,
    /// 行政区精确匹配
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub source: Option<PlaceSource>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl Default for PlaceFilterSpec {
    fn default() -> Self {
        Self {
            keyword: None,
            district: None,
            source: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// 对标准化动物集合应用过滤规格，返回一页与过滤后总数
///
/// 集合顺序即输入顺序，不额外排序
pub fn filter_animals(animals: &[Animal], spec: &FilterSpec) -> Page<Animal> {
    // 第一阶段：来源谓词（精确 / 子串字段），AND 组合
    let source_filtered = animals.iter().filter(|a| {
        spec.animal_type.map_or(true, |t| a.animal_type == t)
            && spec.status.map_or(true, |s| a.status == s)
            && spec.gender.map_or(true, |g| a.gender == g)
            && spec
                .breed
                .as_deref()
                .map_or(true, |b| contains_ci(&a.breed, b))
            && spec
                .location
                .as_deref()
                .map_or(true, |l| contains_ci(&a.location, l))
    });

    // 第二阶段：关键字细筛
    let matched: Vec<&Animal> = source_filtered
        .filter(|a| match spec.keyword.as_deref() {
            Some(kw) if !kw.trim().is_empty() => {
                contains_ci(&a.name, kw)
                    || contains_ci(&a.breed, kw)
                    || contains_ci(&a.description, kw)
                    || contains_ci(&a.location, kw)
            }
            _ => true,
        })
        .collect();

    paginate(matched, spec.limit, spec.offset)
}

/// 对标准化场所集合应用过滤规格
pub fn filter_places(places: &[PlaceRecord], spec: &PlaceFilterSpec) -> Page<PlaceRecord> {
    let matched: Vec<&PlaceRecord> = places
        .iter()
        .filter(|p| {
            spec.source.map_or(true, |s| p.source == s)
                && spec.district.as_deref().map_or(true, |d| p.district == d)
        })
        .filter(|p| match spec.keyword.as_deref() {
            Some(kw) if !kw.trim().is_empty() => {
                contains_ci(&p.name, kw) || contains_ci(&p.address, kw)
            }
            _ => true,
        })
        .collect();

    paginate(matched, spec.limit, spec.offset)
}

/// 最后一步分页：跳过 offset 条，最多取 limit 条；总数为分页前数量
fn paginate<T: Clone>(matched: Vec<&T>, limit: usize, offset: usize) -> Page<T> {
    let total = matched.len();
    let items = matched
        .into_iter()
        .skip(offset)
        .take(limit)
        .cloned()
        .collect();
    Page { items, total }
}
