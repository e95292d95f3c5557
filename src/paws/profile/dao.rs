//! 本地持久缓存数据访问层（DAO）
//!
//! 把浏览器时代的三个固定字符串键收敛成一张按类别 + 归属身份建的表，
//! 统一 get / set / invalidate，避免三个条目清理不同步的问题。
//! 解析失败一律按"无缓存"处理。

use crate::paws::profile::models::CacheKind;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, warn};

/// 本地缓存 DAO（基于 sqlx）
pub struct CacheDao {
    db: Pool<Sqlite>,
}

impl CacheDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// 读取缓存条目，返回 (归属身份 ID, 反序列化的负载)
    ///
    /// 条目缺失或 JSON 解析失败都返回 None
    pub async fn get<T: DeserializeOwned>(&self, kind: CacheKind) -> Result<Option<(String, T)>> {
        let row = sqlx::query(
            r#"
            SELECT identity_id, payload FROM local_cache_entries WHERE kind = ?
            "#,
        )
        .bind(kind.as_str())
        .fetch_optional(&self.db)
        .await
        .context("查询本地缓存条目失败")?;

        let Some(row) = row else {
            debug!("[CacheDAO] 缓存未命中: {}", kind.as_str());
            return Ok(None);
        };

        let identity_id: String = row.get("identity_id");
        let payload: String = row.get("payload");
        match serde_json::from_str::<T>(&payload) {
            Ok(value) => Ok(Some((identity_id, value))),
            Err(e) => {
                warn!(
                    "[CacheDAO] 缓存条目 {} 解析失败，按无缓存处理: {:?}",
                    kind.as_str(),
                    e
                );
                Ok(None)
            }
        }
    }

    /// 写入缓存条目（覆盖同类别旧值）
    pub async fn set<T: Serialize>(
        &self,
        kind: CacheKind,
        identity_id: &str,
        value: &T,
    ) -> Result<()> {
        let payload = serde_json::to_string(value).context("序列化缓存条目失败")?;
        sqlx::query(
            r#"
            INSERT INTO local_cache_entries (kind, identity_id, payload, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(kind) DO UPDATE SET
                identity_id = excluded.identity_id,
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(kind.as_str())
        .bind(identity_id)
        .bind(&payload)
        .bind(Utc::now().timestamp())
        .execute(&self.db)
        .await
        .context("写入本地缓存条目失败")?;
        debug!("[CacheDAO] 已写入缓存条目: {}", kind.as_str());
        Ok(())
    }

    /// 删除单个缓存条目
    pub async fn invalidate(&self, kind: CacheKind) -> Result<()> {
        sqlx::query(r#"DELETE FROM local_cache_entries WHERE kind = ?"#)
            .bind(kind.as_str())
            .execute(&self.db)
            .await
            .context("删除本地缓存条目失败")?;
        Ok(())
    }

    /// 无条件清空全部缓存条目（登出 / 切换身份）
    pub async fn invalidate_all(&self) -> Result<()> {
        sqlx::query(r#"DELETE FROM local_cache_entries"#)
            .execute(&self.db)
            .await
            .context("清空本地缓存失败")?;
        debug!("[CacheDAO] 已清空全部缓存条目");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paws::db::create_sqlite_pool_with_migration;
    use crate::paws::profile::models::{CachedIdentity, LocalProfile};

    async fn dao() -> CacheDao {
        let pool = create_sqlite_pool_with_migration("sqlite::memory:")
            .await
            .unwrap();
        CacheDao::new(pool)
    }

    #[tokio::test]
    async fn set_get_roundtrip() {
        let dao = dao().await;
        let identity = CachedIdentity {
            id: "u-1".to_string(),
            email: "mei@example.tw".to_string(),
        };
        dao.set(CacheKind::Identity, "u-1", &identity).await.unwrap();

        let (owner, cached): (String, CachedIdentity) =
            dao.get(CacheKind::Identity).await.unwrap().unwrap();
        assert_eq!(owner, "u-1");
        assert_eq!(cached, identity);
    }

    #[tokio::test]
    async fn corrupt_payload_reads_as_miss() {
        let dao = dao().await;
        sqlx::query(
            "INSERT INTO local_cache_entries (kind, identity_id, payload, updated_at) VALUES ('profile', 'u-1', '{垃圾', 0)",
        )
        .execute(&dao.db)
        .await
        .unwrap();

        let cached: Option<(String, LocalProfile)> = dao.get(CacheKind::Profile).await.unwrap();
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn invalidate_all_clears_every_entry() {
        let dao = dao().await;
        let identity = CachedIdentity {
            id: "u-1".to_string(),
            email: String::new(),
        };
        let profile = LocalProfile {
            id: "u-1".to_string(),
            role: "adopter".to_string(),
            full_name: None,
            avatar_url: None,
            updated_at: None,
        };
        dao.set(CacheKind::Identity, "u-1", &identity).await.unwrap();
        dao.set(CacheKind::Profile, "u-1", &profile).await.unwrap();

        dao.invalidate_all().await.unwrap();
        assert!(dao
            .get::<CachedIdentity>(CacheKind::Identity)
            .await
            .unwrap()
            .is_none());
        assert!(dao
            .get::<LocalProfile>(CacheKind::Profile)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn set_overwrites_previous_identity() {
        let dao = dao().await;
        let first = CachedIdentity {
            id: "u-1".to_string(),
            email: String::new(),
        };
        let second = CachedIdentity {
            id: "u-2".to_string(),
            email: String::new(),
        };
        dao.set(CacheKind::Identity, "u-1", &first).await.unwrap();
        dao.set(CacheKind::Identity, "u-2", &second).await.unwrap();

        let (owner, cached): (String, CachedIdentity) =
            dao.get(CacheKind::Identity).await.unwrap().unwrap();
        assert_eq!(owner, "u-2");
        assert_eq!(cached.id, "u-2");
    }
}
