//! 核心数据类型定义
//!
//! 定义倒计时调度器使用的状态、快照、事件和错误类型

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::utils::notification::NotificationMessage;

/// Windows `shutdown /t` 可接受的最大延迟（十年，秒）
pub const MAX_DELAY_SECONDS: u64 = 315_360_000;

/// 调度器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerState {
    /// 空闲，没有待执行的关机
    Idle,
    /// 已设定关机，倒计时进行中
    Armed,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::Idle => write!(f, "未设置定时关机"),
            SchedulerState::Armed => write!(f, "定时关机已设定"),
        }
    }
}

/// 成功设定后的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Armed {
    /// 本次设定的代次，用于过滤过期的tick和命令回执
    pub generation: u64,
    /// 传给外部关机命令的延迟秒数
    pub delay_seconds: u64,
}

/// 成功取消后的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled {
    pub generation: u64,
    /// 取消时仍剩余的秒数，取消命令失败时据此恢复
    pub remaining_at_cancel: u64,
}

/// 单次tick的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// 剩余时间减少1秒，倒计时继续
    Decremented { remaining: u64 },
    /// 本次tick使剩余时间归零，倒计时结束
    Completed,
    /// 没有活动的倒计时，tick应停止
    Stopped,
}

/// 外部命令种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Schedule,
    Cancel,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Schedule => write!(f, "设定关机"),
            CommandKind::Cancel => write!(f, "取消关机"),
        }
    }
}

/// 对外可观察的倒计时快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountdownSnapshot {
    pub state: SchedulerState,
    pub remaining_seconds: u64,
    /// "HH:MM:SS"
    pub display_text: String,
    pub cancel_enabled: bool,
    pub schedule_enabled: bool,
}

impl Default for CountdownSnapshot {
    fn default() -> Self {
        Self {
            state: SchedulerState::Idle,
            remaining_seconds: 0,
            display_text: "00:00:00".to_string(),
            cancel_enabled: false,
            schedule_enabled: true,
        }
    }
}

/// 界面层发给控制器的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    /// 按用户输入的分钟数设定关机
    Schedule(String),
    /// 取消已设定的关机
    Cancel,
    /// 退出应用
    Exit,
}

/// 控制器广播的更新消息
#[derive(Debug, Clone)]
pub enum SchedulerUpdate {
    /// 倒计时已设定
    Armed { delay_seconds: u64 },
    /// 倒计时自然结束
    Completed,
    /// 倒计时已取消
    Cancelled,
    /// 外部命令失败后状态已回滚
    RolledBack { kind: CommandKind },
    /// 需要提示用户的通知
    Notice(NotificationMessage),
}

/// 调度器错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// 输入不是正整数分钟数
    #[error("无效的分钟数: {input:?}")]
    InvalidInput { input: String },
    /// 已有定时关机，需要先取消
    #[error("已存在定时关机任务")]
    AlreadyArmed,
    /// 当前没有可取消的定时关机
    #[error("没有待取消的定时关机")]
    NotArmed,
}

/// 外部关机命令错误
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// 无法启动命令进程
    #[error("执行{program}命令失败: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// 命令返回非零状态
    #[error("{program}命令执行失败 (状态 {status}): {stderr}")]
    ExitStatus {
        program: String,
        status: String,
        stderr: String,
    },
    /// 当前平台不支持
    #[error("当前平台不支持定时关机: {0}")]
    Unsupported(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_snapshot_is_idle() {
        let snapshot = CountdownSnapshot::default();
        assert_eq!(snapshot.state, SchedulerState::Idle);
        assert_eq!(snapshot.display_text, "00:00:00");
        assert!(snapshot.schedule_enabled);
        assert!(!snapshot.cancel_enabled);
    }

    #[test]
    fn test_error_messages() {
        let err = SchedulerError::InvalidInput { input: "abc".to_string() };
        assert!(err.to_string().contains("abc"));

        let err = ShutdownError::ExitStatus {
            program: "shutdown".to_string(),
            status: "1".to_string(),
            stderr: "拒绝访问".to_string(),
        };
        assert!(err.to_string().contains("拒绝访问"));
    }
}
