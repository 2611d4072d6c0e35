//! ShutdownTimer - 定时关机倒计时工具
//!
//! 输入分钟数即可设定系统延迟关机，倒计时期间可以随时取消。

use clap::Parser;
use log::info;

mod app;
mod cli;
mod core;
mod ui;
mod utils;

use crate::cli::CliArgs;
use crate::utils::config::ConfigManager;
use crate::utils::instance::{InstanceError, InstanceGuard};
use crate::utils::logger::LoggerManager;

/// 单实例锁名称
const INSTANCE_NAME: &str = "ShutdownTimerAppMutex";

/// 应用程序入口点
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let mut config_manager = match &args.config {
        Some(path) => ConfigManager::with_path(path.clone())?,
        None => ConfigManager::new()?,
    };
    let mut config = config_manager.get_config().clone();
    args.apply_to(&mut config);

    // 先取得单实例锁，被拒绝的实例不写配置文件也不创建日志文件
    let _instance_guard = if config.app.single_instance {
        match InstanceGuard::acquire(INSTANCE_NAME) {
            Ok(guard) => Some(guard),
            Err(InstanceError::AlreadyRunning) => {
                eprintln!("应用程序已经在运行。");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    } else {
        None
    };

    config_manager.write_pending()?;

    let logger = LoggerManager::new(
        LoggerManager::parse_level(&config.advanced.log_level),
        config.advanced.file_logging,
    )?;
    logger.init()?;

    info!("ShutdownTimer 启动中...");
    info!("配置文件: {:?}", config_manager.get_config_path());
    if config.app.single_instance {
        info!("已取得单实例锁: {}", INSTANCE_NAME);
    }

    let app = app::App::new(config)?;
    app.run(args.minutes).await?;

    Ok(())
}
