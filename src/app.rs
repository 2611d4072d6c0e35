//! 应用程序主模块
//!
//! 负责组装关机后端、调度控制器和终端界面，管理应用程序的生命周期

use anyhow::{anyhow, Result};
use log::{error, info, warn};
use std::sync::Arc;

use crate::core::controller::SchedulerController;
use crate::core::shutdown::{DryRunExecutor, ShutdownBackend, ShutdownExecutor, ShutdownOptions};
use crate::core::system_compat::SystemCompatibility;
use crate::ui::ConsoleShell;
use crate::utils::config::AppConfig;

/// 应用程序主结构体
pub struct App {
    config: AppConfig,
    backend: ShutdownBackend,
}

impl App {
    /// 根据配置创建应用实例
    pub fn new(config: AppConfig) -> Result<Self> {
        info!("初始化应用组件...");

        let system_compatibility = SystemCompatibility::new();
        info!("系统兼容性报告:\n{}", system_compatibility.generate_compatibility_report());

        let backend = if config.shutdown.dry_run {
            warn!("演练模式：不会真正执行关机命令");
            ShutdownBackend::DryRun(DryRunExecutor::new(system_compatibility))
        } else {
            if !system_compatibility.is_shutdown_supported() {
                return Err(anyhow!("当前系统不支持定时关机功能"));
            }
            let executor = ShutdownExecutor::new(
                system_compatibility,
                ShutdownOptions {
                    force: config.shutdown.force,
                    message: config.shutdown.message.clone(),
                },
            );
            info!("关机方式: {}", executor.get_shutdown_info());
            ShutdownBackend::System(executor)
        };

        Ok(Self { config, backend })
    }

    /// 运行应用程序
    ///
    /// `initial_minutes` 不为空时启动后立即设定关机
    pub async fn run(self, initial_minutes: Option<String>) -> Result<()> {
        let (controller, handle) = SchedulerController::new(Arc::new(self.backend));
        let controller_task = tokio::spawn(controller.run());

        if let Some(minutes) = initial_minutes {
            info!("按命令行参数设定关机: {}分钟", minutes);
            handle.schedule(minutes)?;
        }

        let shell = ConsoleShell::new(
            handle,
            self.config.scheduler.default_minutes,
            self.config.app.show_notifications,
        );

        let shell_result = shell.run().await;
        if let Err(e) = &shell_result {
            error!("终端界面异常退出: {}", e);
        }

        controller_task.await?;
        info!("应用程序已退出");
        shell_result
    }
}
