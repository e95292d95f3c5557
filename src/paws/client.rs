//! PawsConnect 客户端核心实现模块
//!
//! 应用上下文：进程内只构造一次，持有认证、资料服务、动物数据源
//! 与当前身份的滑动会话，身份切换时整体重置。

use crate::paws::animal::api::AnimalApi;
use crate::paws::auth::{AuthApi, AuthSession, SignInData};
use crate::paws::db::create_sqlite_pool_with_migration;
use crate::paws::profile::{
    CacheDao, CacheKind, CachedIdentity, LocalProfile, ProfileApi, ProfileService,
};
use crate::paws::swipe::{EmptySwipeListener, LikeStoreApi, SwipeListener, SwipeSession};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// 客户端配置
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// 后端存储基础地址（认证与行存储共用）
    pub store_base_url: String,
    /// 后端匿名公钥，所有请求的 apikey 头
    pub anon_key: String,
    /// 開放資料代理基础地址
    pub proxy_base_url: String,
    /// 本地缓存 SQLite 数据库 URL
    ///
    /// 例如：`sqlite://paws_cache.db?mode=rwc`
    pub cache_db_url: String,
}

impl ClientConfig {
    /// 创建默认配置
    pub fn new(store_base_url: String, anon_key: String, proxy_base_url: String) -> Self {
        Self {
            store_base_url,
            anon_key,
            proxy_base_url,
            cache_db_url: "sqlite://paws_cache.db?mode=rwc".to_string(),
        }
    }
}

/// 当前登录身份的运行态
struct ActiveIdentity {
    session: AuthSession,
    identity: CachedIdentity,
    profile: Option<LocalProfile>,
}

/// PawsConnect 客户端
///
/// 核心领域逻辑的唯一入口
pub struct PawsClient {
    config: ClientConfig,
    auth: AuthApi,
    animal_api: AnimalApi,
    profile_service: Arc<ProfileService>,
    active: tokio::sync::Mutex<Option<ActiveIdentity>>,
    // 当前滑动会话（每个身份一份，惰性创建；未登录时为匿名会话）
    swipe_session: tokio::sync::Mutex<Option<Arc<SwipeSession>>>,
    swipe_listener: std::sync::Mutex<Arc<dyn SwipeListener>>,
}

impl PawsClient {
    /// 创建新的客户端：建本地缓存库、跑迁移、装配各 API
    pub async fn new(config: ClientConfig) -> Result<Self> {
        info!("[Client] 🔗 初始化本地缓存数据库: {}", config.cache_db_url);
        let pool = create_sqlite_pool_with_migration(&config.cache_db_url).await?;
        let dao = CacheDao::new(pool);

        let auth = AuthApi::new(config.store_base_url.clone(), &config.anon_key)?;
        let profile_api = ProfileApi::new(
            Self::build_store_client(&config.anon_key, None)?,
            config.store_base_url.clone(),
            auth.clone(),
        );
        let profile_service = Arc::new(ProfileService::new(Arc::new(profile_api), dao));

        let animal_api = AnimalApi::new(reqwest::Client::new(), config.proxy_base_url.clone());

        Ok(Self {
            config,
            auth,
            animal_api,
            profile_service,
            active: tokio::sync::Mutex::new(None),
            swipe_session: tokio::sync::Mutex::new(None),
            swipe_listener: std::sync::Mutex::new(Arc::new(EmptySwipeListener)),
        })
    }

    /// 构造行存储 HTTP 客户端，apikey（和可选的 Bearer 令牌）通过
    /// default_headers 自动添加
    fn build_store_client(anon_key: &str, access_token: Option<&str>) -> Result<reqwest::Client> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::HeaderName::from_static("apikey"),
            reqwest::header::HeaderValue::from_str(anon_key).context("无效的 anon key")?,
        );
        if let Some(token) = access_token {
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
                    .context("无效的访问令牌")?,
            );
        }
        reqwest::ClientBuilder::new()
            .default_headers(headers)
            .build()
            .context("创建 HTTP 客户端失败")
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// 认证 API（密码更新、重置邮件等直通操作）
    pub fn auth(&self) -> &AuthApi {
        &self.auth
    }

    /// 開放資料代理 API
    pub fn animal_api(&self) -> &AnimalApi {
        &self.animal_api
    }

    pub fn profile_service(&self) -> &Arc<ProfileService> {
        &self.profile_service
    }

    /// 当前登录身份（未登录为 None）
    pub async fn current_identity(&self) -> Option<CachedIdentity> {
        self.active.lock().await.as_ref().map(|a| a.identity.clone())
    }

    /// 当前身份的个人资料（未登录或未解析为 None）
    pub async fn current_profile(&self) -> Option<LocalProfile> {
        self.active.lock().await.as_ref().and_then(|a| a.profile.clone())
    }

    /// 当前访问令牌（密码更新等需要）
    pub async fn access_token(&self) -> Option<String> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|a| a.session.access_token.clone())
    }

    /// 注册滑动监听器
    ///
    /// 若会话已存在，则用新的监听器重建会话（状态清空，下次使用时惰性重载），
    /// 保持回调一致
    pub async fn set_swipe_listener(&self, listener: Arc<dyn SwipeListener>) {
        *self.swipe_listener.lock().unwrap() = listener.clone();

        let mut slot = self.swipe_session.lock().await;
        if let Some(existing) = slot.as_ref() {
            let user_id = existing.user_id().map(|s| s.to_string());
            let store = self.like_store_for_current().await;
            *slot = Some(Arc::new(SwipeSession::with_listener(
                user_id, store, listener,
            )));
        }
    }

    /// 取当前身份的滑动会话（惰性创建，每个身份一份）
    ///
    /// 未登录时返回匿名会话：可以浏览，配对操作会触发
    /// `on_sign_in_required` 回调
    pub async fn swipe_session(&self) -> Arc<SwipeSession> {
        let user_id = self.current_identity().await.map(|i| i.id);

        let mut slot = self.swipe_session.lock().await;
        if let Some(existing) = slot.as_ref() {
            if existing.user_id() == user_id.as_deref() {
                return existing.clone();
            }
            info!("[Client] 身份已变化，重建滑动会话");
        }

        let listener = self.swipe_listener.lock().unwrap().clone();
        let store = self.like_store_for_current().await;
        let session = Arc::new(SwipeSession::with_listener(user_id, store, listener));
        *slot = Some(session.clone());
        session
    }

    /// 按当前登录状态装配行存储客户端（登录时带 Bearer 令牌）
    async fn like_store_for_current(&self) -> Arc<LikeStoreApi> {
        let token = self
            .active
            .lock()
            .await
            .as_ref()
            .map(|a| a.session.access_token.clone());
        let client = Self::build_store_client(&self.config.anon_key, token.as_deref())
            .unwrap_or_else(|e| {
                // 令牌头非法时退回匿名客户端，配对写入会被后端拒绝并走失败回调
                warn!("[Client] 装配认证客户端失败，使用匿名客户端: {:?}", e);
                reqwest::Client::new()
            });
        Arc::new(LikeStoreApi::new(client, self.config.store_base_url.clone()))
    }

    /// 邮箱密码登录
    ///
    /// 登录成功后写缓存、解析（或首次创建）个人资料并重建滑动会话
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<LocalProfile> {
        let data = self.auth.sign_in_with_password(email, password).await?;
        self.apply_sign_in(data).await
    }

    /// 邮箱密码注册，显示名写入注册元数据
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<LocalProfile> {
        let data = self.auth.sign_up(email, password, full_name).await?;
        self.apply_sign_in(data).await
    }

    async fn apply_sign_in(&self, data: SignInData) -> Result<LocalProfile> {
        self.profile_service
            .cache_sign_in(&data.session, &data.user)
            .await?;

        let identity = CachedIdentity {
            id: data.user.id.clone(),
            email: data.user.email.clone(),
        };
        let profile = self
            .profile_service
            .ensure_profile(&identity, data.user.display_name())
            .await?;

        *self.active.lock().await = Some(ActiveIdentity {
            session: data.session,
            identity: identity.clone(),
            profile: Some(profile.clone()),
        });
        // 旧身份的滑动会话作废，下次取用时按新身份重建
        *self.swipe_session.lock().await = None;

        info!("[Client] ✅ 身份就绪: {}", identity.id);
        Ok(profile)
    }

    /// 冷启动恢复：缓存命中（未过期）立即恢复，过期走同步刷新
    ///
    /// 返回恢复出的身份；无缓存或刷新失败时返回 None，保持未登录状态
    pub async fn resume(&self) -> Result<Option<CachedIdentity>> {
        let Some(identity) = self.profile_service.resume().await? else {
            return Ok(None);
        };

        // resume 已把（可能刷新过的）会话写回缓存，从那里取令牌
        let Some((_, session)) = self
            .profile_service
            .dao()
            .get::<AuthSession>(CacheKind::Session)
            .await?
        else {
            return Ok(None);
        };

        let profile = self
            .profile_service
            .restore_from_cache()
            .await?
            .and_then(|(_, p)| p);

        *self.active.lock().await = Some(ActiveIdentity {
            session,
            identity: identity.clone(),
            profile,
        });
        *self.swipe_session.lock().await = None;

        info!("[Client] ✅ 会话已恢复: {}", identity.id);
        Ok(Some(identity))
    }

    /// 登出：后端令牌作废（尽力而为）、清空本地缓存与滑动会话
    pub async fn sign_out(&self) -> Result<()> {
        if let Some(token) = self.access_token().await {
            if let Err(e) = self.auth.sign_out(&token).await {
                warn!("[Client] 后端登出失败（继续本地清理）: {:?}", e);
            }
        }
        self.reset().await?;
        info!("[Client] ✅ 已登出");
        Ok(())
    }

    /// 整体重置：清滑动会话、清本地缓存、回到未登录状态
    pub async fn reset(&self) -> Result<()> {
        if let Some(session) = self.swipe_session.lock().await.take() {
            session.reset();
        }
        self.profile_service.sign_out_cleanup().await?;
        *self.active.lock().await = None;
        Ok(())
    }

    /// 更新当前身份的密码（20 秒客户端超时在认证层）
    pub async fn update_password(&self, new_password: &str) -> Result<()> {
        let token = self
            .access_token()
            .await
            .ok_or_else(|| anyhow::anyhow!("未登录，无法更新密码"))?;
        self.auth.update_password(&token, new_password).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;
    use tracing::{error, info};

    static INIT_LOGGER: Once = Once::new();

    fn init_test_logger() {
        INIT_LOGGER.call_once(|| {
            use tracing_subscriber::prelude::*;
            use tracing_subscriber::EnvFilter;

            // 测试中默认打开当前 crate 和 sqlx 的 debug，关闭底层 HTTP 客户端的 debug 噪音
            let filter_layer = EnvFilter::new(
                "info,pawsconnect_core_rust=debug,sqlx=debug,hyper_util::client=info,reqwest=info",
            );

            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .with_test_writer();

            tracing_subscriber::registry()
                .with(filter_layer)
                .with(fmt_layer)
                .init();
        });
    }

    #[test]
    fn config_defaults_use_local_cache_file() {
        let cfg = ClientConfig::new(
            "https://store.example.com".to_string(),
            "anon-key".to_string(),
            "https://proxy.example.com".to_string(),
        );
        assert!(cfg.cache_db_url.starts_with("sqlite://"));
    }

    #[tokio::test]
    async fn anonymous_swipe_session_has_no_identity() {
        let mut cfg = ClientConfig::new(
            "https://store.example.com".to_string(),
            "anon-key".to_string(),
            "https://proxy.example.com".to_string(),
        );
        cfg.cache_db_url = "sqlite::memory:".to_string();
        let client = PawsClient::new(cfg).await.unwrap();

        let session = client.swipe_session().await;
        assert!(session.user_id().is_none());
        // 同一匿名身份复用同一份会话
        let again = client.swipe_session().await;
        assert!(Arc::ptr_eq(&session, &again));
    }

    #[tokio::test]
    #[ignore]
    async fn run_paws_client_live() {
        init_test_logger();

        // 真实环境通过环境变量配置
        let store_url =
            std::env::var("PAWS_STORE_URL").unwrap_or_else(|_| "http://localhost:54321".into());
        let anon_key = std::env::var("PAWS_ANON_KEY").unwrap_or_else(|_| "anon-key".into());
        let proxy_url =
            std::env::var("PAWS_PROXY_URL").unwrap_or_else(|_| "http://localhost:3001".into());

        let mut cfg = ClientConfig::new(store_url, anon_key, proxy_url);
        cfg.cache_db_url = "sqlite::memory:".to_string();
        let client = PawsClient::new(cfg).await.unwrap();

        if let (Ok(email), Ok(password)) =
            (std::env::var("PAWS_EMAIL"), std::env::var("PAWS_PASSWORD"))
        {
            match client.sign_in(&email, &password).await {
                Ok(profile) => info!("✅ 登录成功: {:?}", profile.full_name),
                Err(e) => {
                    error!("登录失败: {:?}", e);
                    return;
                }
            }
        }

        let session = client.swipe_session().await;
        if let Err(e) = session.load_if_needed().await {
            error!("会话加载失败: {:?}", e);
            return;
        }
        let queue = session.queue();
        info!("🐾 滑动牌堆 {} 只", queue.len());
        if let Some(first) = queue.first() {
            let _ = session.like(&first.id).await;
        }
        match session.liked_count().await {
            Ok(count) => info!("💚 已配对总数: {}", count),
            Err(e) => error!("取配对总数失败: {:?}", e),
        }

        match client.animal_api().fetch_hospitals("台北", 5, 0).await {
            Ok(places) => info!("🏥 特约兽医院 {} 笔", places.len()),
            Err(e) => error!("兽医院搜索失败: {:?}", e),
        }
    }
}
