//! 滑动会话监听器回调接口

use async_trait::async_trait;

/// 滑动会话监听器回调接口：所有面向用户的提示都经由这里送出
#[async_trait]
pub trait SwipeListener: Send + Sync {
    /// 会话加载完成，参数为可滑动动物总数与已配对数
    async fn on_session_loaded(&self, total: usize, liked: usize);

    /// 会话加载失败（会话保持可重试），参数为失败原因
    async fn on_load_failed(&self, reason: String);

    /// 配对成功，参数为动物记录的 JSON 字符串
    async fn on_like_success(&self, animal_json: String);

    /// 配对失败（乐观移除已回滚），参数为动物 ID 与失败原因
    async fn on_like_failed(&self, animal_id: String, reason: String);

    /// 操作需要登录身份
    async fn on_sign_in_required(&self);
}

/// 默认空实现（无操作）
pub struct EmptySwipeListener;

#[async_trait]
impl SwipeListener for EmptySwipeListener {
    async fn on_session_loaded(&self, _total: usize, _liked: usize) {
        // 默认不做任何处理
    }

    async fn on_load_failed(&self, _reason: String) {
        // 默认不做任何处理
    }

    async fn on_like_success(&self, _animal_json: String) {
        // 默认不做任何处理
    }

    async fn on_like_failed(&self, _animal_id: String, _reason: String) {
        // 默认不做任何处理
    }

    async fn on_sign_in_required(&self) {
        // 默认不做任何处理
    }
}
