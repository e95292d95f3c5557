//! 个人资料与本地缓存条目模型

use serde::{Deserialize, Serialize};

/// 默认角色
pub const DEFAULT_ROLE: &str = "adopter";

/// 个人资料行（后端 profiles 表）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalProfile {
    pub id: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

fn default_role() -> String {
    DEFAULT_ROLE.to_string()
}

/// 缓存的身份（本地持久缓存中的最小身份条目）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedIdentity {
    pub id: String,
    #[serde(default)]
    pub email: String,
}

/// 本地持久缓存的条目类别：身份 / 个人资料 / 会话各占一行
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Identity,
    Profile,
    Session,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Identity => "identity",
            CacheKind::Profile => "profile",
            CacheKind::Session => "session",
        }
    }
}
