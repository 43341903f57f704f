//! 批量目标处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量目标的处理和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：启动日志、加载资料、连接浏览器、组装各项服务
//! 2. **批量加载**：扫描并加载所有待处理的目标（`Vec<Target>`）
//! 3. **顺序处理**：一次只处理一个目标，目标之间随机停顿
//! 4. **拦截中止**：遇到站点拦截时把剩余目标标记为 PENDING 并结束运行
//! 5. **资源管理**：持有 Browser 和表单驱动，确保生命周期正确
//! 6. **全局统计**：清理过期状态、汇总结果并发送通知
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单个目标的细节
//! - **资源所有者**：唯一持有 Browser 的模块
//! - **向下委托**：委托 target_processor 处理单个目标

use anyhow::{Context, Result};
use chromiumoxide::Browser;
use rand::Rng;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::browser;
use crate::config::Config;
use crate::infrastructure::{ChromeFormDriver, FormDriver, JsExecutor};
use crate::models::{CandidateProfile, Target};
use crate::orchestrator::target_processor::{TargetProcessor, TargetVerdict};
use crate::services::{
    LlmAnswerOracle, LlmService, LlmVariantClassifier, LogNotifier, Notifier, OutcomeEvent,
    RunSummary, StateStore, StoreStats, TelegramNotifier, TrackerWriter, VariantSelector,
};
use crate::utils::logging;
use crate::workflow::{ApplicationFlow, TargetCtx};

/// 一次运行的共享上下文
///
/// 配置和申请人资料只在启动时加载一次
pub struct RunContext {
    pub config: Config,
    pub profile: Arc<CandidateProfile>,
    pub store: Arc<StateStore>,
    pub processor: TargetProcessor,
    pub notifier: Arc<dyn Notifier>,
}

impl RunContext {
    pub fn new(
        config: Config,
        profile: Arc<CandidateProfile>,
        store: Arc<StateStore>,
        processor: TargetProcessor,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            profile,
            store,
            processor,
            notifier,
        }
    }

    /// 按配置组装所有服务
    pub async fn from_config(config: Config) -> Result<Self> {
        let profile = crate::models::load_profile(Path::new(&config.profile_path))
            .await
            .with_context(|| format!("无法加载申请人资料: {}", config.profile_path))?;
        let profile = Arc::new(profile);

        let llm = Arc::new(LlmService::new(&config));
        let oracle = Arc::new(LlmAnswerOracle::new(llm.clone(), profile.clone()));
        let selector = VariantSelector::new(
            Arc::new(LlmVariantClassifier::new(llm)),
            &config.attachments_dir,
        );
        let flow = ApplicationFlow::from_config(&config, selector, oracle);

        let store = Arc::new(StateStore::new(&config.state_file));
        let sink = Arc::new(TrackerWriter::with_path(&config.tracker_file));
        let processor = TargetProcessor::new(flow, store.clone(), sink);

        let notifier: Arc<dyn Notifier> = match config.telegram() {
            Some((token, chat_id)) => Arc::new(TelegramNotifier::new(token, chat_id)?),
            None => {
                info!("未配置 Telegram，汇总只写入日志");
                Arc::new(LogNotifier)
            }
        };

        Ok(Self::new(config, profile, store, processor, notifier))
    }
}

/// 应用主结构
pub struct App {
    ctx: RunContext,
    _browser: Browser,
    driver: ChromeFormDriver,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        config.validate()?;

        // 初始化日志文件
        logging::init_log_file(&config.output_log_file)?;

        log_startup(&config);

        let ctx = RunContext::from_config(config).await?;
        info!("👤 申请人: {}", ctx.profile.name);

        // 连接浏览器
        let (browser, page) = browser::connect_to_browser_and_page(
            ctx.config.browser_debug_port,
            Some(&ctx.config.start_url),
        )
        .await?;

        // 创建表单驱动（持有 page）
        let driver = ChromeFormDriver::new(JsExecutor::new(page));

        Ok(Self {
            ctx,
            _browser: browser,
            driver,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<()> {
        // 加载所有待处理的目标
        let targets = self.load_targets().await?;

        if targets.is_empty() {
            warn!("⚠️ 没有找到待处理的目标，程序结束");
            return Ok(());
        }

        log_targets_loaded(targets.len());

        run_targets(&self.ctx, &self.driver, &targets).await?;
        Ok(())
    }

    /// 加载目标
    async fn load_targets(&self) -> Result<Vec<Target>> {
        info!("\n📁 正在扫描待处理的目标...");
        crate::models::load_all_targets(&self.ctx.config.targets_folder).await
    }
}

/// 顺序处理所有目标，返回本次运行的汇总
///
/// 遇到站点拦截时，尚未得出结果的目标（当前目标和所有未开始的目标）记为 PENDING，然后提前结束
pub async fn run_targets(
    ctx: &RunContext,
    driver: &dyn FormDriver,
    targets: &[Target],
) -> Result<RunSummary> {
    let started = Instant::now();
    let total = targets.len();
    let mut events: Vec<OutcomeEvent> = Vec::with_capacity(total);
    let mut aborted = false;

    for (index, target) in targets.iter().enumerate() {
        let target_ctx = TargetCtx::new(&target.id, index + 1, total);

        match ctx.processor.process(driver, target, &target_ctx).await {
            TargetVerdict::Completed(event) => {
                let skipped = event.status == crate::models::ProcessingStatus::Skipped;
                events.push(event);

                // 跳过的目标没有打开页面，不需要停顿
                if !skipped && index + 1 < total {
                    pace(&ctx.config).await;
                }
            }
            TargetVerdict::Abort { error, event } => {
                error!("🛑 {} 遇到站点拦截，中止运行: {}", target_ctx, error);
                // 已提交的目标保留结果，只把之后的目标挂起
                let first_pending = match event {
                    Some(event) => {
                        events.push(event);
                        index + 1
                    }
                    None => index,
                };
                let remaining = &targets[first_pending..];
                match ctx
                    .store
                    .mark_pending(remaining.iter().map(|t| (t.id.as_str(), t.url.as_str())))
                {
                    Ok(marked) => warn!("⏸️ {} 个目标标记为 PENDING，下次运行继续", marked),
                    Err(e) => error!("❌ 标记 PENDING 失败: {}", e),
                }
                aborted = true;
                break;
            }
        }
    }

    // 清理过期状态
    if let Err(e) = ctx.store.cleanup(ctx.config.state_max_age_days) {
        warn!("⚠️ 状态清理失败: {}", e);
    }

    let summary = RunSummary::from_events(&events, started.elapsed(), aborted);
    print_final_stats(&summary, &ctx.store.stats(), &ctx.config);

    if let Err(e) = ctx.notifier.notify(&summary).await {
        warn!("⚠️ 汇总通知发送失败: {:#}", e);
    }

    Ok(summary)
}

/// 目标之间随机停顿
async fn pace(config: &Config) {
    let (min, max) = (config.pacing_min_ms, config.pacing_max_ms);
    if max == 0 {
        return;
    }
    let millis = rand::thread_rng().gen_range(min.min(max)..=max);
    info!("⏳ 等待 {:.1} 秒后处理下一个目标", millis as f64 / 1000.0);
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

// ========== 日志辅助函数 ==========

fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 自动申请模式");
    info!(
        "📊 置信度阈值: 高 {:.2} / 低 {:.2}",
        config.high_threshold, config.low_threshold
    );
    info!("📋 单个目标最多 {} 步", config.max_steps);
    info!("{}", "=".repeat(60));
}

fn log_targets_loaded(total: usize) {
    info!("✓ 找到 {} 个待处理的目标", total);
    info!("💡 按顺序逐个处理\n");
}

fn print_final_stats(summary: &RunSummary, store: &StoreStats, config: &Config) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 本次处理: {} (跳过 {})", summary.processed, summary.skipped);
    for (status, count) in &summary.by_status {
        info!("   {}: {}", status, count);
    }
    info!("🤖 自动化率: {:.1}%", summary.automation_rate());
    if summary.aborted {
        warn!("🛑 运行因站点拦截提前结束");
    }
    info!("{}", "=".repeat(60));
    info!("🗂️ 状态存储共 {} 条记录", store.total);
    if let (Some(oldest), Some(newest)) = (store.oldest, store.newest) {
        info!(
            "   最早 {} / 最新 {}",
            oldest.format("%Y-%m-%d"),
            newest.format("%Y-%m-%d")
        );
    }
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", config.output_log_file);
}
