//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量目标处理器
//! - 管理应用生命周期（初始化、运行）
//! - 批量加载目标（Vec<Target>）
//! - 管理浏览器资源（Browser、表单驱动）
//! - 站点拦截时中止运行并保留剩余目标
//! - 输出全局统计并发送汇总通知
//!
//! ### `target_processor` - 单个目标处理器
//! - 幂等检查
//! - 调用 ApplicationFlow
//! - 写入状态存储、发送结果事件
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<Target>)
//!     ↓
//! target_processor (处理单个 Target)
//!     ↓
//! workflow::ApplicationFlow (多步表单状态机)
//!     ↓
//! services (能力层：answer / variant / confidence / state / reporting)
//!     ↓
//! infrastructure (基础设施：FormDriver / JsExecutor)
//! ```

pub mod batch_processor;
pub mod target_processor;

// 重新导出主要类型
pub use batch_processor::{run_targets, App, RunContext};
pub use target_processor::{status_for, TargetProcessor, TargetVerdict};
