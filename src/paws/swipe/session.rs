//! 滑动 / 配对会话状态机
//!
//! 每个身份持有一份工作集：全量动物列表、已配对集合、已看过 ID 集合，
//! 以及由此推导的滑动牌堆。不变式：`swipe_queue = master_list − seen_ids`
//! （按 ID 做差，保持 master_list 顺序），且已配对 ID 集合 ⊆ seen_ids。
//!
//! 所有后端失败在这里被捕获、记录并转成监听器提示；乐观修改一律配有
//! 确认失败时的补偿回滚，绝不让三个集合处于违反不变式的状态。

use crate::paws::animal::models::{Animal, AnimalType};
use crate::paws::swipe::listener::{EmptySwipeListener, SwipeListener};
use crate::paws::swipe::store::{LikeInsertOutcome, SwipeStore};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// 会话阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// 初始状态，身份变更（登入 / 登出 / 切换）后立即回到这里
    #[default]
    Uninitialized,
    /// 首个滑动视图触发的两路并发读进行中
    Loading,
    /// 工作集就绪，like / pass 之后仍停留在此
    Ready,
}

#[derive(Default)]
struct SessionState {
    phase: SessionPhase,
    master_list: Vec<Animal>,
    liked: Vec<Animal>,
    seen_ids: HashSet<String>,
    swipe_queue: Vec<Animal>,
}

impl SessionState {
    /// 重新推导滑动牌堆，master_list 或 seen_ids 任一变化后都要调用
    fn recompute_queue(&mut self) {
        self.swipe_queue = self
            .master_list
            .iter()
            .filter(|a| !self.seen_ids.contains(&a.id))
            .cloned()
            .collect();
    }

    fn reset(&mut self) {
        *self = SessionState::default();
    }
}

/// 一个身份的滑动 / 配对会话
///
/// 惰性加载：只在第一个滑动视图请求数据时才发起后端读取，
/// 身份解析时不做任何预取
pub struct SwipeSession {
    user_id: Option<String>,
    store: Arc<dyn SwipeStore>,
    listener: Arc<dyn SwipeListener>,
    state: Mutex<SessionState>,
    /// 正在进行配对写入的动物 ID（同一动物的并发 like 只放行一个）
    likes_in_flight: Mutex<HashSet<String>>,
    /// 轻量计数缓存，配对成功与会话加载时都会覆盖写
    cached_like_count: Mutex<Option<usize>>,
}

impl SwipeSession {
    pub fn new(user_id: Option<String>, store: Arc<dyn SwipeStore>) -> Self {
        Self::with_listener(user_id, store, Arc::new(EmptySwipeListener))
    }

    pub fn with_listener(
        user_id: Option<String>,
        store: Arc<dyn SwipeStore>,
        listener: Arc<dyn SwipeListener>,
    ) -> Self {
        Self {
            user_id,
            store,
            listener,
            state: Mutex::new(SessionState::default()),
            likes_in_flight: Mutex::new(HashSet::new()),
            cached_like_count: Mutex::new(None),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.lock().unwrap().phase
    }

    /// 当前滑动牌堆快照（master_list 顺序）
    pub fn queue(&self) -> Vec<Animal> {
        self.state.lock().unwrap().swipe_queue.clone()
    }

    /// 已配对动物快照
    pub fn liked(&self) -> Vec<Animal> {
        self.state.lock().unwrap().liked.clone()
    }

    pub fn master_list(&self) -> Vec<Animal> {
        self.state.lock().unwrap().master_list.clone()
    }

    /// 惰性加载：未初始化时发起两路并发读（全量动物 + 该身份的配对联表），
    /// 已就绪或加载中则直接返回
    ///
    /// 任一路失败会清空列表、回到可重试的未初始化状态并送出失败提示
    pub async fn load_if_needed(&self) -> Result<()> {
        {
            let mut st = self.state.lock().unwrap();
            match st.phase {
                SessionPhase::Ready | SessionPhase::Loading => return Ok(()),
                SessionPhase::Uninitialized => st.phase = SessionPhase::Loading,
            }
        }

        info!("[SwipeSession] 🔄 开始加载滑动会话数据...");
        match self.load_working_set().await {
            Ok((master_list, liked)) => {
                let (total, liked_len) = {
                    let mut st = self.state.lock().unwrap();
                    let seen_ids: HashSet<String> =
                        liked.iter().map(|a| a.id.clone()).collect();
                    st.master_list = master_list;
                    st.liked = liked;
                    st.seen_ids = seen_ids;
                    st.recompute_queue();
                    st.phase = SessionPhase::Ready;
                    (st.master_list.len(), st.liked.len())
                };
                *self.cached_like_count.lock().unwrap() = Some(liked_len);
                info!(
                    "[SwipeSession] ✅ 会话加载完成，动物总数: {}, 已配对: {}",
                    total, liked_len
                );
                self.listener.on_session_loaded(total, liked_len).await;
                Ok(())
            }
            Err(e) => {
                error!("[SwipeSession] ❌ 会话加载失败: {:?}", e);
                self.state.lock().unwrap().reset();
                self.listener.on_load_failed(format!("{e:#}")).await;
                Err(e)
            }
        }
    }

    async fn load_working_set(&self) -> Result<(Vec<Animal>, Vec<Animal>)> {
        match &self.user_id {
            Some(user_id) => {
                let (animals, liked) = tokio::join!(
                    self.store.fetch_animals(),
                    self.store.fetch_liked_animals(user_id)
                );
                Ok((
                    animals.context("拉取动物列表失败")?,
                    liked.context("拉取配对列表失败")?,
                ))
            }
            // 未登录身份允许浏览，配对列表为空
            None => Ok((self.store.fetch_animals().await?, Vec::new())),
        }
    }

    /// 配对（喜欢）一只动物
    ///
    /// 固定顺序：重入保护 → 登录前置检查 → 乐观移出牌堆 → 幂等插入 →
    /// 确认或回滚。同一动物已有配对写入在途时本次为无操作。
    pub async fn like(&self, animal_id: &str) -> Result<()> {
        {
            let mut in_flight = self.likes_in_flight.lock().unwrap();
            if !in_flight.insert(animal_id.to_string()) {
                debug!("[SwipeSession] 动物 {} 的配对已在途，忽略重入", animal_id);
                return Ok(());
            }
        }

        let result = self.like_inner(animal_id).await;
        self.likes_in_flight.lock().unwrap().remove(animal_id);
        result
    }

    async fn like_inner(&self, animal_id: &str) -> Result<()> {
        let Some(user_id) = self.user_id.clone() else {
            warn!("[SwipeSession] 未登录身份尝试配对，不发起任何后端调用");
            self.listener.on_sign_in_required().await;
            return Ok(());
        };

        // 乐观移除：不论后端延迟，这张卡立即不再出现在牌堆里
        let newly_seen = {
            let mut st = self.state.lock().unwrap();
            let newly_seen = st.seen_ids.insert(animal_id.to_string());
            if newly_seen {
                st.recompute_queue();
            }
            newly_seen
        };

        match self.store.insert_like(&user_id, animal_id).await {
            Ok(outcome) => {
                if outcome == LikeInsertOutcome::AlreadyLiked {
                    debug!("[SwipeSession] 配对关系已存在，按成功处理: {}", animal_id);
                }
                let (animal, liked_len) = {
                    let mut st = self.state.lock().unwrap();
                    let animal = st
                        .master_list
                        .iter()
                        .find(|a| a.id == animal_id)
                        .cloned();
                    if let Some(a) = &animal {
                        if !st.liked.iter().any(|x| x.id == a.id) {
                            st.liked.push(a.clone());
                        }
                    }
                    (animal, st.liked.len())
                };
                // 成功路径覆盖计数缓存，避免三级回退读到旧值
                *self.cached_like_count.lock().unwrap() = Some(liked_len);
                info!("[SwipeSession] ✅ 配对成功: {}", animal_id);
                if let Some(animal) = animal {
                    if let Ok(json) = serde_json::to_string(&animal) {
                        self.listener.on_like_success(json).await;
                    }
                } else {
                    self.listener.on_like_success(String::new()).await;
                }
                Ok(())
            }
            Err(e) => {
                // 确认失败：回滚乐观移除，卡片重新回到牌堆
                if newly_seen {
                    let mut st = self.state.lock().unwrap();
                    st.seen_ids.remove(animal_id);
                    st.recompute_queue();
                }
                error!("[SwipeSession] ❌ 配对失败，已回滚乐观移除: {:?}", e);
                self.listener
                    .on_like_failed(animal_id.to_string(), format!("{e:#}"))
                    .await;
                Err(e)
            }
        }
    }

    /// 跳过一只动物：纯本地修改，不发起任何后端调用，且没有撤销操作
    pub fn pass(&self, animal_id: &str) {
        let mut st = self.state.lock().unwrap();
        if st.seen_ids.insert(animal_id.to_string()) {
            st.recompute_queue();
            debug!("[SwipeSession] 已跳过动物: {}", animal_id);
        }
    }

    /// 按 ID 查找动物：先查 master_list，再查已配对集合
    /// （已配对动物在移出牌堆后仍要可解析）
    pub fn get_by_id(&self, animal_id: &str) -> Option<Animal> {
        let st = self.state.lock().unwrap();
        st.master_list
            .iter()
            .find(|a| a.id == animal_id)
            .or_else(|| st.liked.iter().find(|a| a.id == animal_id))
            .cloned()
    }

    /// 已配对数量（三级回退）
    ///
    /// 1. 会话已就绪：直接用已加载列表长度
    /// 2. 计数缓存命中：用缓存值
    /// 3. 向后端发一次轻量精确计数并写入缓存
    ///
    /// 存在意义：让个人页等非滑动视图显示配对数时不必触发完整的两路加载
    pub async fn liked_count(&self) -> Result<usize> {
        {
            let st = self.state.lock().unwrap();
            if st.phase == SessionPhase::Ready {
                let n = st.liked.len();
                drop(st);
                *self.cached_like_count.lock().unwrap() = Some(n);
                return Ok(n);
            }
        }

        if let Some(n) = *self.cached_like_count.lock().unwrap() {
            debug!("[SwipeSession] 配对计数缓存命中: {}", n);
            return Ok(n);
        }

        let Some(user_id) = &self.user_id else {
            return Ok(0);
        };
        let n = self
            .store
            .count_likes(user_id)
            .await
            .context("配对计数查询失败")?;
        *self.cached_like_count.lock().unwrap() = Some(n);
        Ok(n)
    }

    /// 品种 / 种类过滤：对 master_list 的纯视图，按需重算，
    /// 不影响 swipe_queue / seen_ids 的记账
    pub fn breed_filter(
        &self,
        animal_type: Option<AnimalType>,
        breeds: &[String],
    ) -> Vec<Animal> {
        let st = self.state.lock().unwrap();
        st.master_list
            .iter()
            .filter(|a| {
                animal_type.map_or(true, |t| a.animal_type == t)
                    && (breeds.is_empty() || breeds.iter().any(|b| &a.breed == b))
            })
            .cloned()
            .collect()
    }

    /// 清空会话回到未初始化状态（身份变更时由客户端调用）
    pub fn reset(&self) {
        self.state.lock().unwrap().reset();
        self.likes_in_flight.lock().unwrap().clear();
        *self.cached_like_count.lock().unwrap() = None;
        info!("[SwipeSession] 会话已重置");
    }
}
