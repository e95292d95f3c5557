//! 个人资料模块
//!
//! 身份资料的远端读写、本地 SQLite 键值缓存与会话恢复服务

pub mod api;
pub mod dao;
pub mod models;
pub mod service;

// 重新导出主要类型和函数
pub use api::{ProfileApi, ProfileInsertOutcome, ProfileStore};
pub use dao::CacheDao;
pub use models::{CacheKind, CachedIdentity, LocalProfile, DEFAULT_ROLE};
pub use service::ProfileService;
