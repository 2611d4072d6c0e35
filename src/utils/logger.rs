//! 日志管理模块
//!
//! 负责日志系统的初始化。控制台日志输出到stderr，stdout留给倒计时显示。

use chrono::Local;
use dirs::data_local_dir;
use env_logger::{Builder, Target};
use log::{info, LevelFilter};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Once;

static INIT: Once = Once::new();

/// 同时写入stderr和日志文件
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// 日志管理器
#[derive(Debug)]
pub struct LoggerManager {
    /// 日志文件路径
    log_file_path: Option<PathBuf>,
    /// 当前日志级别
    log_level: LevelFilter,
}

impl LoggerManager {
    /// 创建新的日志管理器
    ///
    /// # 参数
    ///
    /// * `log_level` - 日志级别
    /// * `enable_file_logging` - 是否同时写入日志文件
    pub fn new(log_level: LevelFilter, enable_file_logging: bool) -> Result<Self, Box<dyn std::error::Error>> {
        let log_file_path = if enable_file_logging {
            let data_dir = data_local_dir().ok_or("无法获取本地数据目录")?;
            Some(Self::create_log_file_path(&data_dir.join("ShutdownTimer").join("logs"))?)
        } else {
            None
        };

        Ok(Self {
            log_file_path,
            log_level,
        })
    }

    /// 在指定目录下生成按日期命名的日志文件路径
    fn create_log_file_path(log_dir: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
        if !log_dir.exists() {
            fs::create_dir_all(log_dir)?;
        }

        let log_filename = format!("shutdown-timer_{}.log", Local::now().format("%Y%m%d"));
        Ok(log_dir.join(log_filename))
    }

    /// 解析日志级别字符串，无法识别时返回 `Info`
    pub fn parse_level(level: &str) -> LevelFilter {
        LevelFilter::from_str(level.trim()).unwrap_or(LevelFilter::Info)
    }

    /// 初始化日志系统，只在第一次调用时生效
    pub fn init(&self) -> Result<(), Box<dyn std::error::Error>> {
        let mut result = Ok(());
        INIT.call_once(|| {
            result = self.init_internal();
        });
        result
    }

    fn init_internal(&self) -> Result<(), Box<dyn std::error::Error>> {
        let mut builder = Builder::new();
        builder.filter_level(self.log_level);
        // RUST_LOG 可以覆盖配置中的级别
        builder.parse_default_env();

        builder.format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] [{}:{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        });

        match &self.log_file_path {
            Some(file_path) => {
                let file = OpenOptions::new().create(true).append(true).open(file_path)?;
                builder.target(Target::Pipe(Box::new(TeeWriter { file })));
                builder.try_init()?;
                info!("日志系统初始化完成 - 控制台和文件: {:?}", file_path);
            }
            None => {
                builder.target(Target::Stderr);
                builder.try_init()?;
                info!("日志系统初始化完成 - 仅控制台");
            }
        }

        Ok(())
    }
}
