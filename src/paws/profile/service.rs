//! 个人资料与会话缓存服务层
//!
//! 进程启动时先用本地缓存立即恢复身份与资料（不等网络），再按会话
//! 过期情况决定后台刷新还是全量校验；首次登录时负责默认资料的创建。

use crate::paws::auth::{AuthSession, AuthUser};
use crate::paws::profile::api::{ProfileInsertOutcome, ProfileStore};
use crate::paws::profile::dao::CacheDao;
use crate::paws::profile::models::{CacheKind, CachedIdentity, LocalProfile, DEFAULT_ROLE};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 按显示名生成占位头像 URL
fn placeholder_avatar_url(name: &str) -> String {
    let seed: String = name
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .collect();
    format!("https://api.dicebear.com/7.x/initials/svg?seed={}", seed)
}

/// 个人资料服务
pub struct ProfileService {
    store: Arc<dyn ProfileStore>,
    dao: CacheDao,
}

impl ProfileService {
    pub fn new(store: Arc<dyn ProfileStore>, dao: CacheDao) -> Self {
        Self { store, dao }
    }

    pub fn dao(&self) -> &CacheDao {
        &self.dao
    }

    /// 从本地缓存恢复身份与资料，只读本地、不发任何网络请求
    ///
    /// 缓存条目只有在内嵌身份 ID 与归属 ID 一致时才视为有效
    pub async fn restore_from_cache(
        &self,
    ) -> Result<Option<(CachedIdentity, Option<LocalProfile>)>> {
        let Some((owner, identity)) = self
            .dao
            .get::<CachedIdentity>(CacheKind::Identity)
            .await?
        else {
            return Ok(None);
        };
        if owner != identity.id {
            warn!("[ProfileSvc] 身份缓存归属不一致，忽略缓存");
            return Ok(None);
        }

        let profile = self
            .dao
            .get::<LocalProfile>(CacheKind::Profile)
            .await?
            .and_then(|(profile_owner, p)| (profile_owner == identity.id).then_some(p));

        info!("[ProfileSvc] 已从本地缓存恢复身份: {}", identity.id);
        Ok(Some((identity, profile)))
    }

    /// 恢复会话
    ///
    /// - 缓存会话未过期：立即返回缓存身份，同时发后台校验刷新缓存（不阻塞）
    /// - 已过期 / 无缓存：全量同步校验（refresh token 换新会话）并重写缓存，
    ///   失败则清空缓存返回 None
    pub async fn resume(self: &Arc<Self>) -> Result<Option<CachedIdentity>> {
        let Some((_, session)) = self.dao.get::<AuthSession>(CacheKind::Session).await? else {
            debug!("[ProfileSvc] 无会话缓存");
            return Ok(None);
        };

        if !session.is_expired() {
            let identity = match self.restore_from_cache().await? {
                Some((identity, _)) => identity,
                None => CachedIdentity {
                    id: session.user_id.clone(),
                    email: String::new(),
                },
            };
            // 后台校验，结果失败则静默丢弃
            let svc = Arc::clone(self);
            tokio::spawn(async move {
                svc.background_refresh(session).await;
            });
            return Ok(Some(identity));
        }

        info!("[ProfileSvc] 会话缓存已过期，尝试刷新...");
        match self.store.refresh_session(&session.refresh_token).await {
            Ok((new_session, user)) => {
                let identity = CachedIdentity {
                    id: user.id.clone(),
                    email: user.email.clone(),
                };
                self.dao
                    .set(CacheKind::Session, &identity.id, &new_session)
                    .await?;
                self.dao
                    .set(CacheKind::Identity, &identity.id, &identity)
                    .await?;
                info!("[ProfileSvc] ✅ 会话已刷新，用户ID: {}", identity.id);
                Ok(Some(identity))
            }
            Err(e) => {
                warn!("[ProfileSvc] 会话刷新失败，清空本地缓存: {:?}", e);
                self.dao.invalidate_all().await?;
                Ok(None)
            }
        }
    }

    /// 后台会话校验：成功则回写身份缓存，失败静默丢弃
    async fn background_refresh(&self, session: AuthSession) {
        match self.store.verify_session(&session.access_token).await {
            Ok(user) => {
                let identity = CachedIdentity {
                    id: user.id.clone(),
                    email: user.email.clone(),
                };
                if let Err(e) = self
                    .dao
                    .set(CacheKind::Identity, &identity.id, &identity)
                    .await
                {
                    debug!("[ProfileSvc] 后台刷新写缓存失败: {:?}", e);
                } else {
                    debug!("[ProfileSvc] 后台会话校验完成: {}", identity.id);
                }
            }
            Err(e) => {
                debug!("[ProfileSvc] 后台会话校验失败，丢弃结果: {:?}", e);
            }
        }
    }

    /// 登录成功后写入会话与身份缓存
    ///
    /// 切换身份时先清空上一个身份的全部条目再写入
    pub async fn cache_sign_in(&self, session: &AuthSession, user: &AuthUser) -> Result<()> {
        if let Some((owner, _)) = self.dao.get::<CachedIdentity>(CacheKind::Identity).await? {
            if owner != user.id {
                info!("[ProfileSvc] 身份切换 {} -> {}，清空旧缓存", owner, user.id);
                self.dao.invalidate_all().await?;
            }
        }
        let identity = CachedIdentity {
            id: user.id.clone(),
            email: user.email.clone(),
        };
        self.dao.set(CacheKind::Session, &user.id, session).await?;
        self.dao.set(CacheKind::Identity, &user.id, &identity).await?;
        Ok(())
    }

    /// 取得（或首次创建）个人资料
    ///
    /// 资料缺失时创建默认行；创建竞态（重复行）回退到读取 / 更新既有行；
    /// 连更新都失败时合成一份仅存内存的临时资料返回——故意不写缓存，
    /// 让下次登录重试真实创建
    pub async fn ensure_profile(
        &self,
        identity: &CachedIdentity,
        metadata_name: Option<String>,
    ) -> Result<LocalProfile> {
        if let Some(profile) = self
            .store
            .fetch_profile(&identity.id)
            .await
            .context("查询个人资料失败")?
        {
            self.dao
                .set(CacheKind::Profile, &identity.id, &profile)
                .await?;
            return Ok(profile);
        }

        info!("[ProfileSvc] 个人资料不存在，创建默认资料: {}", identity.id);
        let default = default_profile(identity, metadata_name);
        match self.create_or_adopt(&default).await {
            Ok(profile) => {
                self.dao
                    .set(CacheKind::Profile, &identity.id, &profile)
                    .await?;
                Ok(profile)
            }
            Err(e) => {
                warn!(
                    "[ProfileSvc] 默认资料创建失败，返回临时内存资料（不缓存）: {:?}",
                    e
                );
                Ok(default)
            }
        }
    }

    /// 创建默认资料；重复行错误回退到读取 / 更新既有行
    async fn create_or_adopt(&self, default: &LocalProfile) -> Result<LocalProfile> {
        match self.store.insert_profile(default).await? {
            ProfileInsertOutcome::Inserted => Ok(default.clone()),
            ProfileInsertOutcome::Duplicate => {
                debug!("[ProfileSvc] 创建竞态，改走既有行路径: {}", default.id);
                if let Some(existing) = self.store.fetch_profile(&default.id).await? {
                    return Ok(existing);
                }
                self.store.update_profile(default).await?;
                Ok(default.clone())
            }
        }
    }

    /// 登出：无条件清空全部本地缓存条目
    pub async fn sign_out_cleanup(&self) -> Result<()> {
        self.dao.invalidate_all().await?;
        info!("[ProfileSvc] 登出，本地缓存已清空");
        Ok(())
    }
}

/// 默认资料：角色取默认值，显示名来自注册元数据或邮箱本地部分，头像用占位图
fn default_profile(identity: &CachedIdentity, metadata_name: Option<String>) -> LocalProfile {
    let full_name = metadata_name
        .filter(|n| !n.trim().is_empty())
        .or_else(|| {
            identity
                .email
                .split('@')
                .next()
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| identity.id.clone());
    let avatar_url = placeholder_avatar_url(&full_name);
    LocalProfile {
        id: identity.id.clone(),
        role: DEFAULT_ROLE.to_string(),
        full_name: Some(full_name),
        avatar_url: Some(avatar_url),
        updated_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paws::db::create_sqlite_pool_with_migration;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct MockProfileStore {
        rows: Mutex<HashMap<String, LocalProfile>>,
        calls: Mutex<Vec<String>>,
        fail_insert: AtomicBool,
        duplicate_insert: AtomicBool,
        fail_refresh: AtomicBool,
    }

    impl MockProfileStore {
        fn new() -> Self {
            Self {
                rows: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
                fail_insert: AtomicBool::new(false),
                duplicate_insert: AtomicBool::new(false),
                fail_refresh: AtomicBool::new(false),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProfileStore for MockProfileStore {
        async fn verify_session(&self, _access_token: &str) -> Result<AuthUser> {
            self.calls.lock().unwrap().push("verify".to_string());
            Ok(AuthUser {
                id: "u-1".to_string(),
                email: "mei@example.tw".to_string(),
                user_metadata: serde_json::Value::Null,
            })
        }

        async fn refresh_session(
            &self,
            _refresh_token: &str,
        ) -> Result<(AuthSession, AuthUser)> {
            self.calls.lock().unwrap().push("refresh".to_string());
            if self.fail_refresh.load(Ordering::SeqCst) {
                return Err(anyhow::anyhow!("模拟刷新失败"));
            }
            Ok((
                AuthSession {
                    access_token: "new-at".to_string(),
                    refresh_token: "new-rt".to_string(),
                    user_id: "u-1".to_string(),
                    expires_at: Utc::now().timestamp() + 3600,
                },
                AuthUser {
                    id: "u-1".to_string(),
                    email: "mei@example.tw".to_string(),
                    user_metadata: serde_json::Value::Null,
                },
            ))
        }

        async fn fetch_profile(&self, user_id: &str) -> Result<Option<LocalProfile>> {
            self.calls.lock().unwrap().push("fetch".to_string());
            Ok(self.rows.lock().unwrap().get(user_id).cloned())
        }

        async fn insert_profile(&self, profile: &LocalProfile) -> Result<ProfileInsertOutcome> {
            self.calls.lock().unwrap().push("insert".to_string());
            if self.fail_insert.load(Ordering::SeqCst) {
                return Err(anyhow::anyhow!("模拟插入失败"));
            }
            if self.duplicate_insert.load(Ordering::SeqCst) {
                // 模拟并发写入者抢先创建了行
                self.rows.lock().unwrap().insert(
                    profile.id.clone(),
                    LocalProfile {
                        full_name: Some("并发写入者".to_string()),
                        ..profile.clone()
                    },
                );
                return Ok(ProfileInsertOutcome::Duplicate);
            }
            self.rows
                .lock()
                .unwrap()
                .insert(profile.id.clone(), profile.clone());
            Ok(ProfileInsertOutcome::Inserted)
        }

        async fn update_profile(&self, profile: &LocalProfile) -> Result<()> {
            self.calls.lock().unwrap().push("update".to_string());
            self.rows
                .lock()
                .unwrap()
                .insert(profile.id.clone(), profile.clone());
            Ok(())
        }
    }

    async fn service(store: Arc<MockProfileStore>) -> Arc<ProfileService> {
        let pool = create_sqlite_pool_with_migration("sqlite::memory:")
            .await
            .unwrap();
        Arc::new(ProfileService::new(store, CacheDao::new(pool)))
    }

    fn identity() -> CachedIdentity {
        CachedIdentity {
            id: "u-1".to_string(),
            email: "mei@example.tw".to_string(),
        }
    }

    fn session(expires_at: i64) -> AuthSession {
        AuthSession {
            access_token: "at".to_string(),
            refresh_token: "rt".to_string(),
            user_id: "u-1".to_string(),
            expires_at,
        }
    }

    #[tokio::test]
    async fn existing_profile_is_returned_and_cached() {
        let store = Arc::new(MockProfileStore::new());
        store.rows.lock().unwrap().insert(
            "u-1".to_string(),
            LocalProfile {
                id: "u-1".to_string(),
                role: "admin".to_string(),
                full_name: Some("小美".to_string()),
                avatar_url: None,
                updated_at: None,
            },
        );
        let svc = service(store).await;

        let profile = svc.ensure_profile(&identity(), None).await.unwrap();
        assert_eq!(profile.role, "admin");

        let cached: Option<(String, LocalProfile)> =
            svc.dao().get(CacheKind::Profile).await.unwrap();
        assert_eq!(cached.unwrap().1, profile);
    }

    #[tokio::test]
    async fn missing_profile_creates_default_from_metadata_name() {
        let store = Arc::new(MockProfileStore::new());
        let svc = service(store.clone()).await;

        let profile = svc
            .ensure_profile(&identity(), Some("小美".to_string()))
            .await
            .unwrap();
        assert_eq!(profile.role, DEFAULT_ROLE);
        assert_eq!(profile.full_name.as_deref(), Some("小美"));
        assert!(profile.avatar_url.as_deref().unwrap().contains("小美"));
        assert!(store.rows.lock().unwrap().contains_key("u-1"));
    }

    #[tokio::test]
    async fn default_name_falls_back_to_email_local_part() {
        let store = Arc::new(MockProfileStore::new());
        let svc = service(store).await;

        let profile = svc.ensure_profile(&identity(), None).await.unwrap();
        assert_eq!(profile.full_name.as_deref(), Some("mei"));
    }

    #[tokio::test]
    async fn duplicate_insert_race_adopts_existing_row() {
        let store = Arc::new(MockProfileStore::new());
        store.duplicate_insert.store(true, Ordering::SeqCst);
        let svc = service(store.clone()).await;

        let profile = svc.ensure_profile(&identity(), None).await.unwrap();
        // 竞态胜者的行被采用，而不是再插一行
        assert_eq!(profile.full_name.as_deref(), Some("并发写入者"));
        assert_eq!(store.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_creation_yields_transient_uncached_profile() {
        let store = Arc::new(MockProfileStore::new());
        store.fail_insert.store(true, Ordering::SeqCst);
        let svc = service(store).await;

        let profile = svc.ensure_profile(&identity(), None).await.unwrap();
        assert_eq!(profile.role, DEFAULT_ROLE);
        // 故意不缓存，下次登录重试真实创建
        let cached: Option<(String, LocalProfile)> =
            svc.dao().get(CacheKind::Profile).await.unwrap();
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn unexpired_session_resumes_with_background_verify() {
        let store = Arc::new(MockProfileStore::new());
        let svc = service(store.clone()).await;
        svc.dao()
            .set(
                CacheKind::Session,
                "u-1",
                &session(Utc::now().timestamp() + 3600),
            )
            .await
            .unwrap();
        svc.dao()
            .set(CacheKind::Identity, "u-1", &identity())
            .await
            .unwrap();

        let resumed = svc.resume().await.unwrap().unwrap();
        assert_eq!(resumed.id, "u-1");
        // resume 返回时不等后台校验；稍候它应已执行
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(store.calls().contains(&"verify".to_string()));
        assert!(!store.calls().contains(&"refresh".to_string()));
    }

    #[tokio::test]
    async fn expired_session_refreshes_and_rewrites_cache() {
        let store = Arc::new(MockProfileStore::new());
        let svc = service(store.clone()).await;
        svc.dao()
            .set(
                CacheKind::Session,
                "u-1",
                &session(Utc::now().timestamp() - 10),
            )
            .await
            .unwrap();

        let resumed = svc.resume().await.unwrap().unwrap();
        assert_eq!(resumed.id, "u-1");
        assert!(store.calls().contains(&"refresh".to_string()));

        let (_, cached): (String, AuthSession) =
            svc.dao().get(CacheKind::Session).await.unwrap().unwrap();
        assert_eq!(cached.access_token, "new-at");
    }

    #[tokio::test]
    async fn failed_refresh_clears_cache_and_returns_none() {
        let store = Arc::new(MockProfileStore::new());
        store.fail_refresh.store(true, Ordering::SeqCst);
        let svc = service(store).await;
        svc.dao()
            .set(
                CacheKind::Session,
                "u-1",
                &session(Utc::now().timestamp() - 10),
            )
            .await
            .unwrap();

        assert!(svc.resume().await.unwrap().is_none());
        let cached: Option<(String, AuthSession)> =
            svc.dao().get(CacheKind::Session).await.unwrap();
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn identity_switch_clears_previous_entries() {
        let store = Arc::new(MockProfileStore::new());
        let svc = service(store).await;
        svc.dao()
            .set(CacheKind::Identity, "u-old", &CachedIdentity {
                id: "u-old".to_string(),
                email: String::new(),
            })
            .await
            .unwrap();
        svc.dao()
            .set(
                CacheKind::Profile,
                "u-old",
                &LocalProfile {
                    id: "u-old".to_string(),
                    role: DEFAULT_ROLE.to_string(),
                    full_name: None,
                    avatar_url: None,
                    updated_at: None,
                },
            )
            .await
            .unwrap();

        let user = AuthUser {
            id: "u-1".to_string(),
            email: "mei@example.tw".to_string(),
            user_metadata: serde_json::Value::Null,
        };
        svc.cache_sign_in(&session(Utc::now().timestamp() + 3600), &user)
            .await
            .unwrap();

        // 旧身份的资料条目已随 invalidate_all 清掉
        let profile: Option<(String, LocalProfile)> =
            svc.dao().get(CacheKind::Profile).await.unwrap();
        assert!(profile.is_none());
        let (_, cached): (String, CachedIdentity) =
            svc.dao().get(CacheKind::Identity).await.unwrap().unwrap();
        assert_eq!(cached.id, "u-1");
    }

    #[tokio::test]
    async fn sign_out_clears_everything() {
        let store = Arc::new(MockProfileStore::new());
        let svc = service(store).await;
        svc.dao()
            .set(CacheKind::Identity, "u-1", &identity())
            .await
            .unwrap();
        svc.dao()
            .set(
                CacheKind::Session,
                "u-1",
                &session(Utc::now().timestamp() + 3600),
            )
            .await
            .unwrap();

        svc.sign_out_cleanup().await.unwrap();
        assert!(svc
            .dao()
            .get::<CachedIdentity>(CacheKind::Identity)
            .await
            .unwrap()
            .is_none());
        assert!(svc
            .dao()
            .get::<AuthSession>(CacheKind::Session)
            .await
            .unwrap()
            .is_none());
    }
}
