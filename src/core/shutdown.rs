//! 关机执行器模块
//!
//! 负责调用系统 shutdown 命令设定或取消延迟关机

use log::{error, info};
use std::future::Future;
use tokio::process::Command as AsyncCommand;

use crate::core::system_compat::SystemCompatibility;
use crate::core::types::ShutdownError;

/// 外部关机命令
///
/// 调度控制器通过此接口下发命令，测试中可以替换为模拟实现
pub trait ShutdownCommand: Send + Sync + 'static {
    /// 请求系统在 `delay_seconds` 秒后关机
    fn schedule_shutdown(
        &self,
        delay_seconds: u64,
    ) -> impl Future<Output = Result<(), ShutdownError>> + Send;

    /// 请求系统取消待执行的关机
    fn cancel_shutdown(&self) -> impl Future<Output = Result<(), ShutdownError>> + Send;
}

/// 关机执行器选项
#[derive(Debug, Clone, Default)]
pub struct ShutdownOptions {
    /// 强制关闭应用程序
    pub force: bool,
    /// 显示给用户的关机提示
    pub message: String,
}

/// 系统关机执行器
#[derive(Debug, Clone)]
pub struct ShutdownExecutor {
    system_compatibility: SystemCompatibility,
    options: ShutdownOptions,
}

impl ShutdownExecutor {
    /// 创建新的关机执行器
    pub fn new(system_compatibility: SystemCompatibility, options: ShutdownOptions) -> Self {
        info!(
            "关机执行器初始化完成，平台: {}, 强制: {}",
            system_compatibility.platform(),
            options.force
        );

        Self {
            system_compatibility,
            options,
        }
    }

    /// 执行 shutdown 命令并检查退出状态
    async fn run(&self, args: Vec<String>) -> Result<(), ShutdownError> {
        if !self.system_compatibility.is_shutdown_supported() {
            return Err(ShutdownError::Unsupported(
                self.system_compatibility.platform().to_string(),
            ));
        }

        let program = self.system_compatibility.shutdown_program();
        info!("执行命令: {} {}", program, args.join(" "));

        let output = AsyncCommand::new(program)
            .args(&args)
            .output()
            .await
            .map_err(|source| ShutdownError::Spawn {
                program: program.to_string(),
                source,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!("{}命令执行失败: {}", program, stderr);
            Err(ShutdownError::ExitStatus {
                program: program.to_string(),
                status: output.status.to_string(),
                stderr,
            })
        }
    }

    /// 获取关机方式信息
    pub fn get_shutdown_info(&self) -> String {
        format!(
            "平台: {}, 强制关机: {}",
            self.system_compatibility.platform(),
            self.options.force
        )
    }
}

impl ShutdownCommand for ShutdownExecutor {
    fn schedule_shutdown(
        &self,
        delay_seconds: u64,
    ) -> impl Future<Output = Result<(), ShutdownError>> + Send {
        let args = self.system_compatibility.schedule_args(
            delay_seconds,
            self.options.force,
            &self.options.message,
        );
        async move {
            self.run(args).await?;
            info!("已设定系统在{}秒后关机", delay_seconds);
            Ok(())
        }
    }

    fn cancel_shutdown(&self) -> impl Future<Output = Result<(), ShutdownError>> + Send {
        let args = self.system_compatibility.cancel_args();
        async move {
            self.run(args).await?;
            info!("系统关机已取消");
            Ok(())
        }
    }
}

/// 演练执行器，只记录日志不真正关机
#[derive(Debug, Clone, Default)]
pub struct DryRunExecutor {
    system_compatibility: SystemCompatibility,
}

impl DryRunExecutor {
    pub fn new(system_compatibility: SystemCompatibility) -> Self {
        Self {
            system_compatibility,
        }
    }
}

impl ShutdownCommand for DryRunExecutor {
    fn schedule_shutdown(
        &self,
        delay_seconds: u64,
    ) -> impl Future<Output = Result<(), ShutdownError>> + Send {
        let args = self.system_compatibility.schedule_args(delay_seconds, false, "");
        async move {
            info!(
                "[演练] {} {}",
                self.system_compatibility.shutdown_program(),
                args.join(" ")
            );
            Ok(())
        }
    }

    fn cancel_shutdown(&self) -> impl Future<Output = Result<(), ShutdownError>> + Send {
        let args = self.system_compatibility.cancel_args();
        async move {
            info!(
                "[演练] {} {}",
                self.system_compatibility.shutdown_program(),
                args.join(" ")
            );
            Ok(())
        }
    }
}

/// 运行时选择的关机后端
#[derive(Debug, Clone)]
pub enum ShutdownBackend {
    System(ShutdownExecutor),
    DryRun(DryRunExecutor),
}

impl ShutdownCommand for ShutdownBackend {
    async fn schedule_shutdown(&self, delay_seconds: u64) -> Result<(), ShutdownError> {
        match self {
            ShutdownBackend::System(executor) => executor.schedule_shutdown(delay_seconds).await,
            ShutdownBackend::DryRun(executor) => executor.schedule_shutdown(delay_seconds).await,
        }
    }

    async fn cancel_shutdown(&self) -> Result<(), ShutdownError> {
        match self {
            ShutdownBackend::System(executor) => executor.cancel_shutdown().await,
            ShutdownBackend::DryRun(executor) => executor.cancel_shutdown().await,
        }
    }
}
