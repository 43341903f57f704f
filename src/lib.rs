//! # Auto Apply
//!
//! 一个用于自动填写并提交多步申请表单的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `JsExecutor` - 唯一的 page owner，提供 goto() / eval() 能力
//! - `FormDriver` - 表单操作接口，`ChromeFormDriver` 为浏览器实现
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个问题或单个目标
//! - `AnswerOracle` - 给问题产出答案和置信度
//! - `VariantSelector` - 选择简历变体
//! - `confidence` - 置信度汇总与提交决策
//! - `StateStore` - 处理状态持久化
//! - `reporting` - 记录表与汇总通知
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个目标"的完整申请流程
//! - `TargetCtx` - 上下文封装（target_id + 序号）
//! - `FormStepProcessor` - 单步表单处理
//! - `ApplicationFlow` - 流程编排（打开 → 选简历 → 逐步填写 → 决策）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量目标处理器，管理资源和运行节奏
//! - `orchestrator/target_processor` - 单个目标处理器，幂等检查与状态落盘
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::connect_to_browser_and_page;
pub use config::Config;
pub use error::{AppError, AppResult, FaultKind, FlowError};
pub use infrastructure::{ChromeFormDriver, FormDriver, JsExecutor};
pub use models::{AnswerRecord, ApplicationDecision, DecisionAction, ProcessingStatus, Target};
pub use orchestrator::{run_targets, App, RunContext, TargetProcessor};
pub use workflow::{ApplicationFlow, TargetCtx, TargetOutcome};
