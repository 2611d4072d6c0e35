//! 工具模块
//!
//! 配置、日志、通知和单实例守卫

pub mod config;
pub mod instance;
pub mod logger;
pub mod notification;
