//! 个人资料行存储访问
//!
//! [`ProfileStore`] 是服务层与后端之间的接缝：真实实现 [`ProfileApi`]
//! 走 auth 端点与 profiles 表，测试用内存替身注入

use crate::paws::auth::{AuthApi, AuthSession, AuthUser};
use crate::paws::profile::models::LocalProfile;
use crate::paws::types::{handle_store_response, handle_store_status, StoreError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

/// 个人资料插入结果：重复行（创建竞态）单独标示，交由服务层走更新路径
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileInsertOutcome {
    Inserted,
    Duplicate,
}

/// 个人资料服务依赖的后端操作
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// 校验访问令牌，返回认证用户
    async fn verify_session(&self, access_token: &str) -> Result<AuthUser>;

    /// 用 refresh token 换新会话
    async fn refresh_session(&self, refresh_token: &str) -> Result<(AuthSession, AuthUser)>;

    async fn fetch_profile(&self, user_id: &str) -> Result<Option<LocalProfile>>;

    async fn insert_profile(&self, profile: &LocalProfile) -> Result<ProfileInsertOutcome>;

    async fn update_profile(&self, profile: &LocalProfile) -> Result<()>;
}

/// 后端 REST 实现
///
/// `client` 应该已经在外部配置好 apikey / Authorization 认证头
pub struct ProfileApi {
    client: reqwest::Client,
    store_base_url: String,
    auth: AuthApi,
}

impl ProfileApi {
    pub fn new(client: reqwest::Client, store_base_url: String, auth: AuthApi) -> Self {
        Self {
            client,
            store_base_url,
            auth,
        }
    }

    fn profiles_url(&self) -> String {
        format!("{}/rest/v1/profiles", self.store_base_url)
    }
}

#[async_trait]
impl ProfileStore for ProfileApi {
    async fn verify_session(&self, access_token: &str) -> Result<AuthUser> {
        self.auth.fetch_user(access_token).await
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<(AuthSession, AuthUser)> {
        let data = self.auth.refresh_session(refresh_token).await?;
        Ok((data.session, data.user))
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<Option<LocalProfile>> {
        debug!("[ProfileAPI] 查询个人资料，用户ID: {}", user_id);
        let response = self
            .client
            .get(self.profiles_url())
            .query(&[
                ("id", format!("eq.{}", user_id).as_str()),
                ("select", "*"),
                ("limit", "1"),
            ])
            .send()
            .await
            .context("查询个人资料请求失败")?;

        let mut rows: Vec<LocalProfile> = handle_store_response(response, "个人资料查询").await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.remove(0))
        })
    }

    async fn insert_profile(&self, profile: &LocalProfile) -> Result<ProfileInsertOutcome> {
        info!("[ProfileAPI] 📡 创建个人资料，用户ID: {}", profile.id);
        let response = self
            .client
            .post(self.profiles_url())
            .header("Prefer", "return=minimal")
            .json(profile)
            .send()
            .await
            .context("创建个人资料请求失败")?;

        match handle_store_status(response, "个人资料创建").await {
            Ok(_) => Ok(ProfileInsertOutcome::Inserted),
            Err(e) => {
                if e.downcast_ref::<StoreError>()
                    .is_some_and(StoreError::is_unique_violation)
                {
                    warn!(
                        "[ProfileAPI] 个人资料已存在（创建竞态）: {}",
                        profile.id
                    );
                    return Ok(ProfileInsertOutcome::Duplicate);
                }
                Err(e)
            }
        }
    }

    async fn update_profile(&self, profile: &LocalProfile) -> Result<()> {
        info!("[ProfileAPI] 📡 更新个人资料，用户ID: {}", profile.id);
        let response = self
            .client
            .patch(self.profiles_url())
            .query(&[("id", format!("eq.{}", profile.id).as_str())])
            .header("Prefer", "return=minimal")
            .json(&json!({
                "role": profile.role,
                "full_name": profile.full_name,
                "avatar_url": profile.avatar_url,
            }))
            .send()
            .await
            .context("更新个人资料请求失败")?;

        handle_store_status(response, "个人资料更新").await?;
        Ok(())
    }
}
