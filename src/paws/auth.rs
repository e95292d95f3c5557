//! 后端身份认证 API 客户端
//!
//! 登录 / 注册 / 登出 / 会话校验与刷新 / 密码更新 / 重置邮件。
//! 所有请求走后端的 auth REST 端点，`apikey` 通过 default_headers 自动添加。

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info};
use uuid::Uuid;

/// 密码更新的客户端超时：后端调用超过此时限即视为失败
const PASSWORD_UPDATE_TIMEOUT: Duration = Duration::from_secs(20);

/// 认证后的用户信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub user_metadata: Value,
}

impl AuthUser {
    /// 从注册元数据取显示名（full_name 优先于 name）
    pub fn display_name(&self) -> Option<String> {
        self.user_metadata
            .get("full_name")
            .or_else(|| self.user_metadata.get("name"))
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .filter(|s| !s.trim().is_empty())
    }
}

/// 认证会话（令牌与绝对过期时间）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: String,
    /// Unix 秒
    pub expires_at: i64,
}

impl AuthSession {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now().timestamp()
    }
}

/// 登录 / 注册成功后的数据
#[derive(Debug, Clone)]
pub struct SignInData {
    pub session: AuthSession,
    pub user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct TokenResp {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResp {
    fn into_sign_in_data(self) -> SignInData {
        let expires_at = self
            .expires_at
            .unwrap_or_else(|| Utc::now().timestamp() + self.expires_in);
        SignInData {
            session: AuthSession {
                access_token: self.access_token,
                refresh_token: self.refresh_token,
                user_id: self.user.id.clone(),
                expires_at,
            },
            user: self.user,
        }
    }
}

/// 认证 API 客户端
#[derive(Clone)]
pub struct AuthApi {
    client: reqwest::Client,
    store_base_url: String,
}

impl AuthApi {
    /// 创建认证客户端，`apikey` 拦截器在这里配置
    pub fn new(store_base_url: String, anon_key: &str) -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::HeaderName::from_static("apikey"),
                    reqwest::header::HeaderValue::from_str(anon_key)
                        .context("无效的 anon key")?,
                );
                headers
            })
            .build()
            .context("创建 HTTP 客户端失败")?;
        Ok(Self {
            client,
            store_base_url,
        })
    }

    async fn handle_auth_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        operation_name: &str,
    ) -> Result<T> {
        let status = response.status();
        let body_bytes = response
            .bytes()
            .await
            .context(format!("读取{}响应 body 失败", operation_name))?;
        let body_str = String::from_utf8_lossy(&body_bytes);
        debug!("[Auth] {}响应 Body: {}", operation_name, body_str);

        if !status.is_success() {
            // 认证错误体可能是 {error, error_description} 或 {msg, code}
            let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);
            let reason = body
                .get("error_description")
                .or_else(|| body.get("msg"))
                .or_else(|| body.get("error"))
                .and_then(Value::as_str)
                .unwrap_or(&body_str)
                .to_string();
            error!(
                "[Auth] {}失败，HTTP状态: {}, 原因: {}",
                operation_name, status, reason
            );
            return Err(anyhow::anyhow!("{}失败 ({}): {}", operation_name, status, reason));
        }

        serde_json::from_slice(&body_bytes).map_err(|e| {
            error!(
                "[Auth] {}反序列化失败: {:?}\n原始响应: {}",
                operation_name, e, body_str
            );
            anyhow::anyhow!("反序列化{}响应失败: {:?}", operation_name, e)
        })
    }

    /// 邮箱密码登录
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<SignInData> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}/auth/v1/token", self.store_base_url);

        info!("[Auth] 🔐 正在登录...");
        debug!("[Auth]   邮箱: {}, 操作ID: {}", email, operation_id);

        let response = self
            .client
            .post(&url)
            .query(&[("grant_type", "password")])
            .json(&serde_json::json!({
                "email": email,
                "password": password,
            }))
            .send()
            .await
            .context("登录请求失败")?;

        let resp: TokenResp = Self::handle_auth_response(response, "登录").await?;
        info!("[Auth] ✅ 登录成功，用户ID: {}", resp.user.id);
        Ok(resp.into_sign_in_data())
    }

    /// 邮箱密码注册，显示名写入注册元数据
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<SignInData> {
        let url = format!("{}/auth/v1/signup", self.store_base_url);

        info!("[Auth] 📝 正在注册...");

        let mut body = serde_json::json!({
            "email": email,
            "password": password,
        });
        if let Some(name) = full_name {
            body["data"] = serde_json::json!({ "full_name": name });
        }

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("注册请求失败")?;

        let resp: TokenResp = Self::handle_auth_response(response, "注册").await?;
        info!("[Auth] ✅ 注册成功，用户ID: {}", resp.user.id);
        Ok(resp.into_sign_in_data())
    }

    /// 登出（令牌作废）
    pub async fn sign_out(&self, access_token: &str) -> Result<()> {
        let url = format!("{}/auth/v1/logout", self.store_base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .context("登出请求失败")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("登出失败 ({}): {}", status, body));
        }
        info!("[Auth] ✅ 已登出");
        Ok(())
    }

    /// 校验令牌并取当前用户
    pub async fn fetch_user(&self, access_token: &str) -> Result<AuthUser> {
        let url = format!("{}/auth/v1/user", self.store_base_url);

        debug!("[Auth] 校验会话令牌...");
        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .context("会话校验请求失败")?;

        Self::handle_auth_response(response, "会话校验").await
    }

    /// 用 refresh token 换新会话
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<SignInData> {
        let url = format!("{}/auth/v1/token", self.store_base_url);

        debug!("[Auth] 刷新会话...");
        let response = self
            .client
            .post(&url)
            .query(&[("grant_type", "refresh_token")])
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .context("会话刷新请求失败")?;

        let resp: TokenResp = Self::handle_auth_response(response, "会话刷新").await?;
        info!("[Auth] ✅ 会话已刷新，用户ID: {}", resp.user.id);
        Ok(resp.into_sign_in_data())
    }

    /// 更新密码，超过 20 秒未返回即按失败处理
    pub async fn update_password(&self, access_token: &str, new_password: &str) -> Result<()> {
        let url = format!("{}/auth/v1/user", self.store_base_url);

        info!("[Auth] 🔑 更新密码...");
        let request = self
            .client
            .put(&url)
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "password": new_password }))
            .send();

        let response = timeout(PASSWORD_UPDATE_TIMEOUT, request)
            .await
            .map_err(|_| anyhow::anyhow!("密码更新超时（{} 秒）", PASSWORD_UPDATE_TIMEOUT.as_secs()))?
            .context("密码更新请求失败")?;

        let _: AuthUser = Self::handle_auth_response(response, "密码更新").await?;
        info!("[Auth] ✅ 密码已更新");
        Ok(())
    }

    /// 发送密码重置邮件
    pub async fn send_reset_email(&self, email: &str) -> Result<()> {
        let url = format!("{}/auth/v1/recover", self.store_base_url);

        info!("[Auth] 📧 发送密码重置邮件...");
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await
            .context("重置邮件请求失败")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("发送重置邮件失败 ({}): {}", status, body));
        }
        info!("[Auth] ✅ 重置邮件已发送");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn token_resp_computes_absolute_expiry_when_missing() {
        let resp: TokenResp = serde_json::from_value(json!({
            "access_token": "at",
            "refresh_token": "rt",
            "expires_in": 3600,
            "user": {"id": "u-1", "email": "a@b.tw"}
        }))
        .unwrap();
        let data = resp.into_sign_in_data();
        assert!(data.session.expires_at > Utc::now().timestamp() + 3500);
        assert!(!data.session.is_expired());
        assert_eq!(data.session.user_id, "u-1");
    }

    #[test]
    fn display_name_prefers_full_name_and_skips_blank() {
        let user: AuthUser = serde_json::from_value(json!({
            "id": "u-1",
            "email": "mei@example.tw",
            "user_metadata": {"full_name": "小美", "name": "mei"}
        }))
        .unwrap();
        assert_eq!(user.display_name().as_deref(), Some("小美"));

        let user: AuthUser = serde_json::from_value(json!({
            "id": "u-2",
            "user_metadata": {"full_name": "  "}
        }))
        .unwrap();
        assert_eq!(user.display_name(), None);
    }
}
