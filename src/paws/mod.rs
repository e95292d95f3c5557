pub mod animal;
pub mod auth;
pub mod client;
pub mod db;
pub mod profile;
pub mod serialization;
pub mod swipe;
pub mod types;

// 重新导出客户端入口
pub use client::{ClientConfig, PawsClient};

// 重新导出滑动会话相关类型
pub use swipe::{EmptySwipeListener, SessionPhase, SwipeListener, SwipeSession};
