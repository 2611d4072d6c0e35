//! 通知管理模块
//!
//! 负责构造用户通知并保留最近的通知历史

use chrono::{DateTime, Local};
use log::info;
use std::collections::VecDeque;

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationType {
    /// 信息通知
    Info,
    /// 警告通知
    Warning,
    /// 错误通知
    Error,
    /// 成功通知
    Success,
}

/// 通知消息
#[derive(Debug, Clone)]
pub struct NotificationMessage {
    /// 通知ID
    pub id: String,
    /// 标题
    pub title: String,
    /// 内容
    pub content: String,
    /// 通知类型
    pub notification_type: NotificationType,
    /// 创建时间
    pub created_at: DateTime<Local>,
}

impl NotificationMessage {
    /// 创建新的通知消息
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        notification_type: NotificationType,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            content: content.into(),
            notification_type,
            created_at: Local::now(),
        }
    }

    /// 是否需要用户确认（错误通知会阻塞显示）
    pub fn requires_acknowledgement(&self) -> bool {
        self.notification_type == NotificationType::Error
    }
}

/// 通知管理器
///
/// 记录已显示的通知，超过上限时丢弃最旧的记录
#[derive(Debug)]
pub struct NotificationManager {
    /// 通知历史
    history: VecDeque<NotificationMessage>,
    /// 最大历史记录数量
    max_history: usize,
    /// 是否启用通知
    enabled: bool,
}

impl NotificationManager {
    /// 创建新的通知管理器
    pub fn new(max_history: usize, enabled: bool) -> Self {
        Self {
            history: VecDeque::with_capacity(max_history),
            max_history,
            enabled,
        }
    }

    /// 记录通知，返回是否应当显示给用户
    ///
    /// 禁用通知时仍然显示错误通知
    pub fn record(&mut self, notification: NotificationMessage) -> bool {
        info!("通知: {} - {}", notification.title, notification.content);

        let should_show = self.enabled || notification.requires_acknowledgement();

        if self.max_history > 0 {
            if self.history.len() >= self.max_history {
                self.history.pop_front();
            }
            self.history.push_back(notification);
        }

        should_show
    }

    /// 获取通知历史
    pub fn history(&self) -> impl Iterator<Item = &NotificationMessage> {
        self.history.iter()
    }
}

/// 预定义的通知创建函数
pub struct NotificationBuilder;

impl NotificationBuilder {
    /// 创建信息通知
    pub fn info(title: impl Into<String>, content: impl Into<String>) -> NotificationMessage {
        NotificationMessage::new(title, content, NotificationType::Info)
    }

    /// 创建警告通知
    pub fn warning(title: impl Into<String>, content: impl Into<String>) -> NotificationMessage {
        NotificationMessage::new(title, content, NotificationType::Warning)
    }

    /// 创建错误通知
    pub fn error(title: impl Into<String>, content: impl Into<String>) -> NotificationMessage {
        NotificationMessage::new(title, content, NotificationType::Error)
    }

    /// 创建成功通知
    pub fn success(title: impl Into<String>, content: impl Into<String>) -> NotificationMessage {
        NotificationMessage::new(title, content, NotificationType::Success)
    }
}
