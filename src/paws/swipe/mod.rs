//! 滑动 / 配对模块
//!
//! 产品核心的状态机：每个身份一份工作集，乐观更新配补偿回滚

pub mod listener;
pub mod models;
pub mod session;
pub mod store;

// 重新导出主要类型和函数
pub use listener::{EmptySwipeListener, SwipeListener};
pub use models::{LikeRelation, LikedAnimalRow};
pub use session::{SessionPhase, SwipeSession};
pub use store::{LikeInsertOutcome, LikeStoreApi, SwipeStore};
