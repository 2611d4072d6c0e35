//! 命令行参数

use clap::Parser;
use std::path::PathBuf;

use crate::utils::config::AppConfig;

/// 命令行参数，优先于配置文件
#[derive(Parser, Debug)]
#[command(name = "shutdown-timer")]
#[command(about = "定时关机倒计时工具")]
#[command(version)]
pub struct CliArgs {
    /// 启动后立即设定的关机分钟数
    #[arg(short, long)]
    pub minutes: Option<String>,

    /// 只记录关机命令，不真正关机
    #[arg(long)]
    pub dry_run: bool,

    /// 强制关闭正在运行的应用程序
    #[arg(long)]
    pub force: bool,

    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 日志级别 (error, warn, info, debug, trace)
    #[arg(long)]
    pub log_level: Option<String>,

    /// 允许同时运行多个实例
    #[arg(long)]
    pub allow_multiple: bool,
}

impl CliArgs {
    /// 把命令行参数覆盖到配置上
    pub fn apply_to(&self, config: &mut AppConfig) {
        if self.dry_run {
            config.shutdown.dry_run = true;
        }
        if self.force {
            config.shutdown.force = true;
        }
        if let Some(level) = &self.log_level {
            config.advanced.log_level = level.clone();
        }
        if self.allow_multiple {
            config.app.single_instance = false;
        }
    }
}
