//! 系统兼容性适配模块
//!
//! 根据当前操作系统生成 `shutdown` 命令参数

use log::info;
use std::fmt;

/// 支持的平台类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Windows，使用 shutdown.exe
    Windows,
    /// Linux
    Linux,
    /// macOS
    MacOs,
    /// 其他类Unix系统
    OtherUnix,
    /// 未知平台
    Unknown,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Windows => "Windows",
            Platform::Linux => "Linux",
            Platform::MacOs => "macOS",
            Platform::OtherUnix => "Unix",
            Platform::Unknown => "未知",
        };
        write!(f, "{}", name)
    }
}

/// 系统兼容性检查器
#[derive(Debug, Clone)]
pub struct SystemCompatibility {
    platform: Platform,
}

impl Default for SystemCompatibility {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCompatibility {
    /// 检测当前平台
    pub fn new() -> Self {
        let platform = if cfg!(windows) {
            Platform::Windows
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(unix) {
            Platform::OtherUnix
        } else {
            Platform::Unknown
        };

        info!("检测到平台: {}", platform);
        Self { platform }
    }

    /// 使用指定平台创建
    #[cfg(test)]
    pub fn for_platform(platform: Platform) -> Self {
        Self { platform }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// 检查是否支持定时关机
    pub fn is_shutdown_supported(&self) -> bool {
        self.platform != Platform::Unknown
    }

    /// 关机命令程序名
    pub fn shutdown_program(&self) -> &'static str {
        "shutdown"
    }

    /// 生成"延迟N秒关机"的命令参数
    ///
    /// Unix 的 shutdown 以分钟为单位，秒数向上取整
    pub fn schedule_args(&self, delay_seconds: u64, force: bool, message: &str) -> Vec<String> {
        match self.platform {
            Platform::Windows => {
                let mut args = vec!["/s".to_string()];
                if force {
                    args.push("/f".to_string());
                }
                args.push("/t".to_string());
                args.push(delay_seconds.to_string());
                if !message.is_empty() {
                    args.push("/c".to_string());
                    args.push(message.to_string());
                }
                args
            }
            Platform::Linux | Platform::MacOs | Platform::OtherUnix | Platform::Unknown => {
                let minutes = delay_seconds.div_ceil(60);
                let mut args = vec!["-h".to_string(), format!("+{}", minutes)];
                if !message.is_empty() && self.platform == Platform::Linux {
                    args.push(message.to_string());
                }
                args
            }
        }
    }

    /// 生成"取消关机"的命令参数
    pub fn cancel_args(&self) -> Vec<String> {
        match self.platform {
            Platform::Windows => vec!["/a".to_string()],
            _ => vec!["-c".to_string()],
        }
    }

    /// 生成兼容性报告
    pub fn generate_compatibility_report(&self) -> String {
        let mut report = String::new();
        report.push_str(&format!("平台: {}\n", self.platform));
        report.push_str(&format!(
            "定时关机: {}\n",
            if self.is_shutdown_supported() { "支持" } else { "不支持" }
        ));
        report.push_str(&format!(
            "设定命令: {} {}\n",
            self.shutdown_program(),
            self.schedule_args(600, false, "").join(" ")
        ));
        report.push_str(&format!(
            "取消命令: {} {}",
            self.shutdown_program(),
            self.cancel_args().join(" ")
        ));
        report
    }
}
