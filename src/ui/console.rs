//! 终端界面
//!
//! 读取用户命令、渲染倒计时并显示通知

use anyhow::Result;
use log::{debug, error, info, warn};
use std::io::{BufRead, BufReader, Write};
use std::thread;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

use crate::core::controller::ControllerHandle;
use crate::core::countdown::format_clock;
use crate::core::types::{CommandKind, CountdownSnapshot, SchedulerState, SchedulerUpdate};
use crate::ui::commands::{help_text, parse_line, InputCommand};
use crate::utils::notification::{NotificationManager, NotificationMessage, NotificationType};

/// 终端界面
pub struct ConsoleShell {
    handle: ControllerHandle,
    /// 未输入分钟数时使用的默认值
    default_minutes: u32,
    notifications: NotificationManager,
}

impl ConsoleShell {
    pub fn new(handle: ControllerHandle, default_minutes: u32, show_notifications: bool) -> Self {
        Self {
            handle,
            default_minutes,
            notifications: NotificationManager::new(50, show_notifications),
        }
    }

    /// 运行界面循环，直到用户退出、输入结束或收到 Ctrl-C
    pub async fn run(mut self) -> Result<()> {
        let mut lines = spawn_line_reader(BufReader::new(std::io::stdin()));
        let mut snapshots = self.handle.watch();
        let mut updates = self.handle.subscribe();

        println!("{}", help_text());
        self.print_status(&self.handle.snapshot());

        loop {
            tokio::select! {
                line = lines.recv() => {
                    match line {
                        Some(line) => {
                            if !self.handle_line(&line)? {
                                break;
                            }
                        }
                        None => {
                            info!("标准输入已关闭");
                            break;
                        }
                    }
                }
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = snapshots.borrow_and_update().clone();
                    self.print_countdown(&snapshot);
                }
                update = updates.recv() => {
                    match update {
                        Ok(SchedulerUpdate::Notice(notice)) => self.show_notice(notice),
                        Ok(update) => {
                            if let Some(text) = render_update(&update) {
                                println!("\n{}", text);
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => warn!("跳过了{}条更新", skipped),
                        Err(RecvError::Closed) => break,
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("收到 Ctrl-C");
                    break;
                }
            }
        }

        println!();
        self.handle.exit()?;
        Ok(())
    }

    /// 处理一行输入，返回是否继续运行
    fn handle_line(&mut self, line: &str) -> Result<bool> {
        match parse_line(line) {
            Ok(InputCommand::Schedule(minutes)) => {
                let input = minutes.unwrap_or_else(|| self.default_minutes.to_string());
                self.handle.schedule(input)?;
            }
            Ok(InputCommand::Cancel) => {
                if self.handle.snapshot().cancel_enabled {
                    self.handle.cancel()?;
                } else {
                    println!("当前没有可取消的定时关机。");
                }
            }
            Ok(InputCommand::Status) => self.print_status(&self.handle.snapshot()),
            Ok(InputCommand::History) => {
                let mut history = self.notifications.history().peekable();
                if history.peek().is_none() {
                    println!("暂无通知记录。");
                }
                for notice in history {
                    println!("{}", render_history_entry(notice));
                }
            }
            Ok(InputCommand::Help) => println!("{}", help_text()),
            Ok(InputCommand::Quit) => return Ok(false),
            Ok(InputCommand::Empty) => {}
            Err(message) => println!("{}，输入 help 查看可用命令。", message),
        }
        Ok(true)
    }

    fn show_notice(&mut self, notice: NotificationMessage) {
        let rendered = render_notice(&notice);
        if self.notifications.record(notice) {
            println!("\n{}", rendered);
        }
    }

    fn print_countdown(&self, snapshot: &CountdownSnapshot) {
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "\r{}", render_countdown(snapshot));
        let _ = stdout.flush();
    }

    fn print_status(&self, snapshot: &CountdownSnapshot) {
        println!("{}", render_status(snapshot));
    }
}

/// 在独立线程中读取输入行，通过通道转发给界面循环
///
/// 阻塞的读取不占用运行时，Ctrl-C 退出时无需等待读取返回。
/// 输入结束或读取出错时关闭通道。
pub fn spawn_line_reader<R>(reader: R) -> mpsc::UnboundedReceiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let spawned = thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("读取输入失败: {}", e);
                        break;
                    }
                }
            }
        });
    if let Err(e) = spawned {
        error!("无法启动输入线程: {}", e);
    }
    rx
}

/// 调度器状态变化的提示文本，快照已覆盖的变化返回 None
pub fn render_update(update: &SchedulerUpdate) -> Option<String> {
    match update {
        SchedulerUpdate::Armed { delay_seconds } => Some(format!(
            "倒计时开始，{} 后关机。",
            format_clock(*delay_seconds)
        )),
        SchedulerUpdate::RolledBack { kind } => Some(match kind {
            CommandKind::Schedule => format!("{}失败，倒计时已撤销。", kind),
            CommandKind::Cancel => format!("{}失败，倒计时继续。", kind),
        }),
        SchedulerUpdate::Completed | SchedulerUpdate::Cancelled | SchedulerUpdate::Notice(_) => {
            debug!("调度器更新: {:?}", update);
            None
        }
    }
}

/// 单行倒计时显示
pub fn render_countdown(snapshot: &CountdownSnapshot) -> String {
    format!("剩余时间 {}  ", snapshot.display_text)
}

/// 完整状态显示，包括两个按钮的可用状态
pub fn render_status(snapshot: &CountdownSnapshot) -> String {
    let enabled = |flag: bool| if flag { "可用" } else { "不可用" };

    let mut text = format!("状态: {}  剩余时间: {}", snapshot.state, snapshot.display_text);
    if snapshot.state == SchedulerState::Armed {
        let shutdown_at = chrono::Local::now()
            + chrono::Duration::seconds(snapshot.remaining_seconds as i64);
        text.push_str(&format!("  预计关机: {}", shutdown_at.format("%H:%M:%S")));
    }
    text.push_str(&format!(
        "\n设定: {}  取消: {}",
        enabled(snapshot.schedule_enabled),
        enabled(snapshot.cancel_enabled)
    ));
    text
}

/// 通知显示文本
pub fn render_notice(notice: &NotificationMessage) -> String {
    let tag = match notice.notification_type {
        NotificationType::Info => "信息",
        NotificationType::Warning => "警告",
        NotificationType::Error => "错误",
        NotificationType::Success => "成功",
    };
    format!(
        "[{}] [{}] {}: {}",
        notice.created_at.format("%H:%M:%S"),
        tag,
        notice.title,
        notice.content
    )
}

/// 历史记录中的一条通知，带通知编号前缀
pub fn render_history_entry(notice: &NotificationMessage) -> String {
    let short_id: String = notice.id.chars().take(8).collect();
    format!("#{} {}", short_id, render_notice(notice))
}
