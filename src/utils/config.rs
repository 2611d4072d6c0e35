//! 配置管理模块
//!
//! 负责应用程序配置的加载、保存和校验

use dirs::config_dir;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 应用程序配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 应用程序设置
    pub app: AppSettings,
    /// 倒计时设置
    pub scheduler: SchedulerSettings,
    /// 关机设置
    pub shutdown: ShutdownSettings,
    /// 高级设置
    pub advanced: AdvancedSettings,
}

/// 应用程序基本设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// 只允许运行一个实例
    pub single_instance: bool,
    /// 显示非错误类通知
    pub show_notifications: bool,
}

/// 倒计时设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// 未输入分钟数时使用的默认值
    pub default_minutes: u32,
}

/// 关机相关设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownSettings {
    /// 强制关闭应用程序
    pub force: bool,
    /// 关机提示信息
    pub message: String,
    /// 只记录命令不真正关机
    pub dry_run: bool,
}

/// 高级设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedSettings {
    /// 日志级别
    pub log_level: String,
    /// 写入日志文件
    pub file_logging: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            single_instance: true,
            show_notifications: true,
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self { default_minutes: 10 }
    }
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            force: false,
            message: "定时关机".to_string(),
            dry_run: false,
        }
    }
}

impl Default for AdvancedSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            file_logging: false,
        }
    }
}

/// 加载时推迟到获取单实例锁之后的写入
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingWrite {
    /// 配置文件不存在，写入默认配置
    CreateDefault,
    /// 配置文件无效，备份后写入默认配置
    ReplaceInvalid,
}

/// 配置管理器
///
/// 负责配置文件的加载和保存。加载只读取文件，
/// 需要创建或修复配置文件时由 `write_pending` 完成。
#[derive(Debug)]
pub struct ConfigManager {
    /// 配置文件路径
    config_path: PathBuf,
    /// 当前配置
    config: AppConfig,
    pending: Option<PendingWrite>,
}

impl ConfigManager {
    /// 从默认位置加载配置
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = Self::get_config_file_path()?;
        Self::with_path(config_path)
    }

    /// 从指定路径加载配置，不修改磁盘上的任何文件
    pub fn with_path(config_path: impl Into<PathBuf>) -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = config_path.into();
        let (config, pending) = Self::load_config(&config_path)?;
        Ok(Self {
            config_path,
            config,
            pending,
        })
    }

    /// 获取默认配置文件路径
    fn get_config_file_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_dir = config_dir().ok_or("无法获取配置目录")?;
        Ok(config_dir.join("ShutdownTimer").join("config.json"))
    }

    /// 加载配置文件
    ///
    /// 文件缺失或无效时使用默认配置，并记录需要写回的变更
    fn load_config(path: &Path) -> Result<(AppConfig, Option<PendingWrite>), Box<dyn std::error::Error>> {
        if !path.exists() {
            info!("配置文件不存在，使用默认配置: {:?}", path);
            return Ok((AppConfig::default(), Some(PendingWrite::CreateDefault)));
        }

        info!("加载配置文件: {:?}", path);
        let config_content = fs::read_to_string(path)?;

        match serde_json::from_str::<AppConfig>(&config_content) {
            Ok(config) => {
                let errors = ConfigValidator::validate(&config);
                if errors.is_empty() {
                    info!("配置文件加载成功");
                    return Ok((config, None));
                }
                warn!("配置文件包含无效设置: {}, 使用默认配置", errors.join("; "));
            }
            Err(e) => {
                warn!("配置文件格式错误: {}, 使用默认配置", e);
            }
        }

        Ok((AppConfig::default(), Some(PendingWrite::ReplaceInvalid)))
    }

    /// 写入加载时推迟的变更
    ///
    /// 配置文件不存在时写入默认配置；文件无效时先备份为 `.json.backup` 再重写
    pub fn write_pending(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let pending = match self.pending.take() {
            Some(pending) => pending,
            None => return Ok(()),
        };

        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                info!("创建配置目录: {:?}", parent);
            }
        }

        if pending == PendingWrite::ReplaceInvalid {
            let backup_path = self.config_path.with_extension("json.backup");
            if let Err(backup_err) = fs::copy(&self.config_path, &backup_path) {
                warn!("备份无效的配置文件失败: {}", backup_err);
            }
        }

        Self::save_config_to_file(&self.config, &self.config_path)
    }

    /// 保存配置到文件
    fn save_config_to_file(config: &AppConfig, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let config_json = serde_json::to_string_pretty(config)?;
        fs::write(path, config_json)?;
        info!("配置文件保存成功: {:?}", path);
        Ok(())
    }

    /// 获取当前配置
    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    /// 获取配置文件路径
    pub fn get_config_path(&self) -> &Path {
        &self.config_path
    }
}

/// 配置验证器
pub struct ConfigValidator;

impl ConfigValidator {
    /// 验证整份配置，返回全部错误信息
    pub fn validate(config: &AppConfig) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(Self::validate_scheduler_settings(&config.scheduler));
        errors.extend(Self::validate_advanced_settings(&config.advanced));
        errors
    }

    /// 验证倒计时设置
    pub fn validate_scheduler_settings(settings: &SchedulerSettings) -> Vec<String> {
        let mut errors = Vec::new();

        if settings.default_minutes == 0 {
            errors.push("默认分钟数必须大于0".to_string());
        }

        let max_minutes = crate::core::types::MAX_DELAY_SECONDS / 60;
        if u64::from(settings.default_minutes) > max_minutes {
            errors.push(format!("默认分钟数不能超过{}", max_minutes));
        }

        errors
    }

    /// 验证高级设置
    pub fn validate_advanced_settings(settings: &AdvancedSettings) -> Vec<String> {
        let mut errors = Vec::new();

        let valid_log_levels = ["off", "error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&settings.log_level.to_lowercase().as_str()) {
            errors.push(format!("无效的日志级别: {}", settings.log_level));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert!(config.app.single_instance);
        assert_eq!(config.scheduler.default_minutes, 10);
        assert!(!config.shutdown.force);
        assert!(!config.shutdown.dry_run);
        assert_eq!(config.advanced.log_level, "info");
        assert!(ConfigValidator::validate(&config).is_empty());
    }

    #[test]
    fn test_missing_file_writes_defaults_only_when_asked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut manager = ConfigManager::with_path(&path).unwrap();
        assert_eq!(manager.get_config(), &AppConfig::default());
        assert_eq!(manager.get_config_path(), path.as_path());
        assert!(!path.parent().unwrap().exists());

        manager.write_pending().unwrap();
        assert!(path.exists());
        let written: AppConfig = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, AppConfig::default());
    }

    #[test]
    fn test_saved_file_is_reloaded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.scheduler.default_minutes = 45;
        config.shutdown.dry_run = true;
        ConfigManager::save_config_to_file(&config, &path).unwrap();

        let mut reloaded = ConfigManager::with_path(&path).unwrap();
        assert_eq!(reloaded.get_config(), &config);

        // 有效的配置文件不会被改写
        let before = fs::read_to_string(&path).unwrap();
        reloaded.write_pending().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_partial_file_uses_defaults_for_missing_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "shutdown": { "force": true } }"#).unwrap();

        let manager = ConfigManager::with_path(&path).unwrap();
        assert!(manager.get_config().shutdown.force);
        assert_eq!(manager.get_config().shutdown.message, "定时关机");
        assert_eq!(manager.get_config().scheduler.default_minutes, 10);
    }

    #[test]
    fn test_corrupted_file_is_backed_up() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let mut manager = ConfigManager::with_path(&path).unwrap();
        assert_eq!(manager.get_config(), &AppConfig::default());

        let backup = dir.path().join("config.json.backup");
        assert!(!backup.exists());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");

        manager.write_pending().unwrap();
        assert_eq!(fs::read_to_string(backup).unwrap(), "{ not json");
        let written: AppConfig = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, AppConfig::default());
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "scheduler": { "default_minutes": 0 } }"#).unwrap();

        let manager = ConfigManager::with_path(&path).unwrap();
        assert_eq!(manager.get_config().scheduler.default_minutes, 10);
    }

    #[test]
    fn test_config_validator() {
        let mut config = AppConfig::default();
        config.advanced.log_level = "verbose".to_string();
        config.scheduler.default_minutes = 0;

        let errors = ConfigValidator::validate(&config);
        assert_eq!(errors.len(), 2);
    }
}
