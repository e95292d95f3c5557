//! 配对关系本地模型定义

use crate::paws::animal::normalize::RawAnimalRecord;
use serde::{Deserialize, Serialize};

/// 配对（喜欢）关系行，每个 (user_id, animal_id) 至多一行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeRelation {
    pub user_id: String,
    pub animal_id: String,
    #[serde(default)]
    pub liked_at: String,
}

/// 配对关系联表查询行：`select=liked_at,animal:animals(*)`
///
/// 内嵌动物可能因行级权限为 null，解析时跳过
#[derive(Debug, Clone, Deserialize)]
pub struct LikedAnimalRow {
    #[serde(default)]
    pub liked_at: String,
    #[serde(default)]
    pub animal: Option<RawAnimalRecord>,
}
