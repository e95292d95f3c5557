//! PawsConnect CLI 客户端（测试版）
//!
//! 非交互式 CLI，用于测试和展示核心功能
//! 启动时通过命令行参数指定账号，自动登录后跑一轮滑动 / 搜索流程

use anyhow::Result;
use clap::Parser;
use pawsconnect_core_rust::paws::animal::FilterSpec;
use pawsconnect_core_rust::paws::client::{ClientConfig, PawsClient};
use pawsconnect_core_rust::paws::swipe::SwipeListener;
use std::sync::Arc;
use tracing::{error, info, warn};

/// PawsConnect CLI 客户端
#[derive(Parser, Debug)]
#[command(name = "paws-cli")]
#[command(about = "PawsConnect CLI 客户端 - 用于测试和展示核心功能", long_about = None)]
struct Args {
    /// 后端存储基础地址
    #[arg(long, default_value = "http://localhost:54321")]
    store_url: String,

    /// 后端匿名公钥
    #[arg(long, default_value = "anon-key")]
    anon_key: String,

    /// 開放資料代理基础地址
    #[arg(long, default_value = "http://localhost:3001")]
    proxy_url: String,

    /// 登录邮箱（不提供则以匿名身份浏览）
    #[arg(short, long)]
    email: Option<String>,

    /// 登录密码
    #[arg(short, long)]
    password: Option<String>,

    /// 搜索关键字
    #[arg(short, long, default_value = "台北")]
    keyword: String,

    /// 本地缓存数据库 URL
    #[arg(long, default_value = "sqlite://paws_cache.db?mode=rwc")]
    cache_db: String,

    /// 日志级别（默认: info,pawsconnect_core_rust=debug）
    #[arg(long, default_value = "info,pawsconnect_core_rust=debug")]
    log_level: String,
}

/// 初始化日志（同时输出到 stdout 和文件）
fn init_logger(log_level: &str) {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG（如果设置了），否则使用命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // 创建日志文件（追加模式）
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .expect("无法创建日志文件 debug.log");

    // 输出到 stdout（控制台），保留 ANSI 颜色代码用于终端显示
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    // 输出到文件，禁用 ANSI 颜色代码（文件不需要颜色）
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    info!("[CLI] 📝 日志已同时输出到控制台和文件: debug.log");
}

/// 滑动监听器（输出所有回调）
struct CliSwipeListener;

#[async_trait::async_trait]
impl SwipeListener for CliSwipeListener {
    async fn on_session_loaded(&self, total: usize, liked: usize) {
        info!("[CLI/Swipe] ✅ 会话加载完成: 可滑动 {} 只, 已配对 {} 只", total, liked);
    }

    async fn on_load_failed(&self, reason: String) {
        error!("[CLI/Swipe] ❌ 会话加载失败: {}", reason);
    }

    async fn on_like_success(&self, animal_json: String) {
        info!("[CLI/Swipe] 💚 配对成功: {}", animal_json);
    }

    async fn on_like_failed(&self, animal_id: String, reason: String) {
        error!("[CLI/Swipe] ❌ 配对失败: animalID={}, 原因: {}", animal_id, reason);
    }

    async fn on_sign_in_required(&self) {
        warn!("[CLI/Swipe] 🔐 此操作需要先登录");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    init_logger(&args.log_level);

    info!("[CLI] 🚀 PawsConnect CLI 客户端（测试模式）");

    let mut config = ClientConfig::new(
        args.store_url.clone(),
        args.anon_key.clone(),
        args.proxy_url.clone(),
    );
    config.cache_db_url = args.cache_db.clone();

    let client = PawsClient::new(config).await?;
    client.set_swipe_listener(Arc::new(CliSwipeListener)).await;

    // 身份：优先命令行账号登录，否则尝试恢复缓存会话，再不行就匿名浏览
    if let (Some(email), Some(password)) = (&args.email, &args.password) {
        info!("[CLI] 🔐 正在登录: {}", email);
        let profile = client.sign_in(email, password).await?;
        info!(
            "[CLI] ✅ 登录成功: {} ({})",
            profile.full_name.as_deref().unwrap_or("未命名"),
            profile.role
        );
    } else {
        match client.resume().await? {
            Some(identity) => info!("[CLI] ✅ 已恢复缓存会话: {}", identity.id),
            None => info!("[CLI] 👤 以匿名身份浏览（配对操作将提示登录）"),
        }
    }

    // 滑动会话：加载后展示牌堆并滑动前两张
    let session = client.swipe_session().await;
    if let Err(e) = session.load_if_needed().await {
        error!("[CLI] 会话加载失败（继续搜索流程）: {:?}", e);
    } else {
        let queue = session.queue();
        info!("[CLI] 🐾 滑动牌堆: {} 只", queue.len());
        for animal in queue.iter().take(5) {
            info!("[CLI]   - {} ({}, {})", animal.name, animal.breed, animal.location);
        }

        if let Some(first) = queue.first() {
            info!("[CLI] 👉 右滑: {}", first.name);
            if let Err(e) = session.like(&first.id).await {
                error!("[CLI] 配对写入失败: {:?}", e);
            }
        }
        if let Some(second) = queue.get(1) {
            info!("[CLI] 👈 左滑: {}", second.name);
            session.pass(&second.id);
        }
        match session.liked_count().await {
            Ok(count) => info!("[CLI] 💚 已配对总数: {}", count),
            Err(e) => error!("[CLI] 取配对总数失败: {:?}", e),
        }
    }

    // 開放資料搜索：收容所动物 + 特约兽医院
    info!("[CLI] 🔍 搜索收容所动物: 关键字 \"{}\"", args.keyword);
    let spec = FilterSpec {
        keyword: Some(args.keyword.clone()),
        limit: 5,
        ..FilterSpec::default()
    };
    let result = client.animal_api().search_shelter_animals(&spec).await;
    match result.error {
        None => {
            info!(
                "[CLI] 🔍 命中 {} 笔，展示前 {} 笔",
                result.total,
                result.items.len()
            );
            for animal in &result.items {
                info!("[CLI]   - {} / {} / {}", animal.name, animal.breed, animal.location);
            }
        }
        Some(reason) => error!("[CLI] 收容所动物搜索失败: {}", reason),
    }

    match client
        .animal_api()
        .fetch_hospitals(&args.keyword, 5, 0)
        .await
    {
        Ok(places) => {
            info!("[CLI] 🏥 特约兽医院 {} 笔", places.len());
            for place in &places {
                info!("[CLI]   - {} ({})", place.name, place.address);
            }
        }
        Err(e) => error!("[CLI] 兽医院搜索失败: {:?}", e),
    }

    info!("[CLI] 🏁 流程结束");
    Ok(())
}
