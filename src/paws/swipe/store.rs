//! 滑动会话的行存储访问
//!
//! [`SwipeStore`] 是会话与后端之间的接缝：真实实现 [`LikeStoreApi`] 走
//! 后端 REST 行存储，测试用内存替身注入

use crate::paws::animal::models::Animal;
use crate::paws::animal::normalize::{normalize_animal, RawAnimalRecord};
use crate::paws::swipe::models::LikedAnimalRow;
use crate::paws::types::{handle_store_response, handle_store_status, StoreError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 配对插入结果：唯一键冲突不是错误，等同已配对成功
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeInsertOutcome {
    Inserted,
    AlreadyLiked,
}

/// 滑动会话依赖的行存储操作
#[async_trait]
pub trait SwipeStore: Send + Sync {
    /// 拉取当前身份可见的全部标准化动物
    async fn fetch_animals(&self) -> Result<Vec<Animal>>;

    /// 拉取该身份的全部配对动物（配对关系联表动物记录）
    async fn fetch_liked_animals(&self, user_id: &str) -> Result<Vec<Animal>>;

    /// 幂等插入配对关系
    async fn insert_like(&self, user_id: &str, animal_id: &str) -> Result<LikeInsertOutcome>;

    /// 轻量精确计数（不拉取行数据）
    async fn count_likes(&self, user_id: &str) -> Result<usize>;
}

/// 后端 REST 行存储实现
///
/// `client` 应该已经在外部配置好 apikey / Authorization 认证头
pub struct LikeStoreApi {
    client: reqwest::Client,
    store_base_url: String,
}

impl LikeStoreApi {
    pub fn new(client: reqwest::Client, store_base_url: String) -> Self {
        Self {
            client,
            store_base_url,
        }
    }
}

#[async_trait]
impl SwipeStore for LikeStoreApi {
    async fn fetch_animals(&self) -> Result<Vec<Animal>> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}/rest/v1/animals", self.store_base_url);

        info!("[LikeStore] 📡 请求全量动物列表");
        debug!("[LikeStore]   请求URL: {}, 操作ID: {}", url, operation_id);

        let response = self
            .client
            .get(&url)
            .query(&[("select", "*"), ("order", "created_at.asc")])
            .send()
            .await
            .context("请求动物列表失败")?;

        let raws: Vec<RawAnimalRecord> = handle_store_response(response, "动物列表").await?;
        let animals: Vec<Animal> = raws.into_iter().map(normalize_animal).collect();
        info!("[LikeStore] ✅ 动物列表响应，共 {} 条", animals.len());
        Ok(animals)
    }

    async fn fetch_liked_animals(&self, user_id: &str) -> Result<Vec<Animal>> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}/rest/v1/animal_likes", self.store_base_url);

        info!("[LikeStore] 📡 请求配对动物列表，用户ID: {}", user_id);
        debug!("[LikeStore]   请求URL: {}, 操作ID: {}", url, operation_id);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("user_id", format!("eq.{}", user_id).as_str()),
                ("select", "liked_at,animal:animals(*)"),
                ("order", "liked_at.desc"),
            ])
            .send()
            .await
            .context("请求配对动物列表失败")?;

        let rows: Vec<LikedAnimalRow> = handle_store_response(response, "配对动物列表").await?;
        let animals: Vec<Animal> = rows
            .into_iter()
            .filter_map(|row| row.animal)
            .map(normalize_animal)
            .collect();
        info!("[LikeStore] ✅ 配对动物列表响应，共 {} 条", animals.len());
        Ok(animals)
    }

    async fn insert_like(&self, user_id: &str, animal_id: &str) -> Result<LikeInsertOutcome> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}/rest/v1/animal_likes", self.store_base_url);

        info!(
            "[LikeStore] 📡 插入配对关系，用户ID: {}, 动物ID: {}",
            user_id, animal_id
        );
        debug!("[LikeStore]   请求URL: {}, 操作ID: {}", url, operation_id);

        let response = self
            .client
            .post(&url)
            .header("Prefer", "return=minimal")
            .json(&json!({
                "user_id": user_id,
                "animal_id": animal_id,
            }))
            .send()
            .await
            .context("插入配对关系请求失败")?;

        match handle_store_status(response, "插入配对关系").await {
            Ok(_) => {
                info!("[LikeStore] ✅ 配对关系已插入");
                Ok(LikeInsertOutcome::Inserted)
            }
            Err(e) => {
                // 唯一键冲突（并发重复配对）等同成功
                if e.downcast_ref::<StoreError>()
                    .is_some_and(StoreError::is_unique_violation)
                {
                    warn!(
                        "[LikeStore] 配对关系已存在（唯一键冲突），视为成功: {}",
                        animal_id
                    );
                    return Ok(LikeInsertOutcome::AlreadyLiked);
                }
                Err(e)
            }
        }
    }

    async fn count_likes(&self, user_id: &str) -> Result<usize> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}/rest/v1/animal_likes", self.store_base_url);

        info!("[LikeStore] 📡 请求配对计数，用户ID: {}", user_id);
        debug!("[LikeStore]   请求URL: {}, 操作ID: {}", url, operation_id);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("user_id", format!("eq.{}", user_id).as_str()),
                ("select", "animal_id"),
            ])
            .header("Prefer", "count=exact")
            .header("Range", "0-0")
            .send()
            .await
            .context("请求配对计数失败")?;

        let status = response.status();
        let content_range = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("HTTP 错误 {}: {}", status, body));
        }

        // Content-Range 形如 "0-0/7"，斜杠后是精确总数
        let total = content_range
            .rsplit('/')
            .next()
            .and_then(|t| t.parse::<usize>().ok())
            .ok_or_else(|| anyhow::anyhow!("无法解析 Content-Range: {}", content_range))?;

        info!("[LikeStore] ✅ 配对计数: {}", total);
        Ok(total)
    }
}
