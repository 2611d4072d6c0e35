//! 调度控制器模块
//!
//! 在单个任务中串行处理用户命令、定时tick和外部命令回执。
//! 外部关机命令交给唯一的命令任务按下发顺序逐条执行，完成后把结果投递回事件队列，
//! 因此事件循环不会被子进程阻塞，系统也总是按设定、取消的先后顺序收到命令。

use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant};

use crate::core::countdown::{format_clock, CountdownScheduler};
use crate::core::shutdown::ShutdownCommand;
use crate::core::types::{
    CommandKind, CountdownSnapshot, SchedulerError, SchedulerUpdate, ShellCommand, ShutdownError,
    TickOutcome,
};
use crate::utils::notification::{NotificationBuilder, NotificationMessage};

/// tick间隔
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// 控制器内部事件
#[derive(Debug)]
enum ControllerEvent {
    /// 来自界面的命令
    Command(ShellCommand),
    /// 定时器tick，携带定时器编号
    Tick { ticker_id: u64 },
    /// 外部命令执行完成
    CommandFinished {
        kind: CommandKind,
        generation: u64,
        /// 取消命令下发时的剩余秒数
        remaining_at_issue: u64,
        issued_at: Instant,
        result: Result<(), ShutdownError>,
    },
}

/// 等待命令任务执行的外部命令
#[derive(Debug)]
struct CommandRequest {
    kind: CommandKind,
    generation: u64,
    /// 设定命令的延迟秒数
    delay_seconds: u64,
    remaining_at_issue: u64,
    issued_at: Instant,
}

/// 控制器句柄
///
/// 界面层通过句柄发送命令并观察倒计时状态
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    events: mpsc::UnboundedSender<ControllerEvent>,
    snapshot: watch::Receiver<CountdownSnapshot>,
    updates: broadcast::Sender<SchedulerUpdate>,
}

impl ControllerHandle {
    /// 发送界面命令
    pub fn send(&self, command: ShellCommand) -> Result<()> {
        self.events
            .send(ControllerEvent::Command(command))
            .map_err(|_| anyhow!("调度控制器已停止"))
    }

    /// 按输入的分钟数设定关机
    pub fn schedule(&self, input: impl Into<String>) -> Result<()> {
        self.send(ShellCommand::Schedule(input.into()))
    }

    /// 取消定时关机
    pub fn cancel(&self) -> Result<()> {
        self.send(ShellCommand::Cancel)
    }

    /// 停止控制器
    pub fn exit(&self) -> Result<()> {
        self.send(ShellCommand::Exit)
    }

    /// 当前倒计时快照
    pub fn snapshot(&self) -> CountdownSnapshot {
        self.snapshot.borrow().clone()
    }

    /// 订阅快照变化
    pub fn watch(&self) -> watch::Receiver<CountdownSnapshot> {
        self.snapshot.clone()
    }

    /// 订阅更新消息
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerUpdate> {
        self.updates.subscribe()
    }
}

/// 调度控制器
pub struct SchedulerController<S: ShutdownCommand> {
    scheduler: CountdownScheduler,
    shutdown: Arc<S>,
    events_tx: mpsc::UnboundedSender<ControllerEvent>,
    events_rx: mpsc::UnboundedReceiver<ControllerEvent>,
    commands_tx: mpsc::UnboundedSender<CommandRequest>,
    commands_rx: Option<mpsc::UnboundedReceiver<CommandRequest>>,
    snapshot_tx: watch::Sender<CountdownSnapshot>,
    update_tx: broadcast::Sender<SchedulerUpdate>,
    ticker: Option<JoinHandle<()>>,
    ticker_id: u64,
}

impl<S: ShutdownCommand> SchedulerController<S> {
    /// 创建控制器及其句柄
    pub fn new(shutdown: Arc<S>) -> (Self, ControllerHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let scheduler = CountdownScheduler::new();
        let (snapshot_tx, snapshot_rx) = watch::channel(scheduler.snapshot());
        let (update_tx, _) = broadcast::channel(100);

        let handle = ControllerHandle {
            events: events_tx.clone(),
            snapshot: snapshot_rx,
            updates: update_tx.clone(),
        };

        let controller = Self {
            scheduler,
            shutdown,
            events_tx,
            events_rx,
            commands_tx,
            commands_rx: Some(commands_rx),
            snapshot_tx,
            update_tx,
            ticker: None,
            ticker_id: 0,
        };

        (controller, handle)
    }

    /// 运行事件循环，直到收到退出命令
    pub async fn run(mut self) {
        info!("调度控制器启动");

        let worker = self.commands_rx.take().map(|requests| {
            tokio::spawn(run_command_worker(
                Arc::clone(&self.shutdown),
                requests,
                self.events_tx.clone(),
            ))
        });

        while let Some(event) = self.events_rx.recv().await {
            if !self.handle_event(event) {
                break;
            }
        }

        self.stop_ticker();
        if self.scheduler.is_armed() {
            warn!(
                "退出时仍有待执行的系统关机，剩余{}",
                format_clock(self.scheduler.remaining_seconds())
            );
        }

        // 已下发的命令仍要执行完，避免系统停在设定和取消之间
        drop(self.commands_tx);
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!("命令任务异常退出: {}", e);
            }
        }
        info!("调度控制器已停止");
    }

    /// 处理单个事件，返回是否继续运行
    fn handle_event(&mut self, event: ControllerEvent) -> bool {
        match event {
            ControllerEvent::Command(ShellCommand::Schedule(input)) => self.on_schedule(&input),
            ControllerEvent::Command(ShellCommand::Cancel) => self.on_cancel(),
            ControllerEvent::Command(ShellCommand::Exit) => {
                info!("收到退出命令");
                return false;
            }
            ControllerEvent::Tick { ticker_id } => self.on_tick(ticker_id),
            ControllerEvent::CommandFinished {
                kind,
                generation,
                remaining_at_issue,
                issued_at,
                result,
            } => self.on_command_finished(kind, generation, remaining_at_issue, issued_at, result),
        }
        true
    }

    fn on_schedule(&mut self, input: &str) {
        match self.scheduler.schedule(input) {
            Ok(armed) => {
                self.start_ticker();
                self.publish_snapshot();
                self.broadcast(SchedulerUpdate::Armed {
                    delay_seconds: armed.delay_seconds,
                });

                self.dispatch(
                    CommandKind::Schedule,
                    armed.generation,
                    armed.delay_seconds,
                    0,
                );
            }
            Err(err @ SchedulerError::InvalidInput { .. }) => {
                warn!("{}", err);
                self.notify(NotificationBuilder::error(
                    "输入错误",
                    "请输入有效的分钟数（正整数）。",
                ));
            }
            Err(err) => {
                debug!("忽略设定请求: {}", err);
                self.notify(NotificationBuilder::warning(
                    "已有定时关机",
                    "请先取消当前的定时关机。",
                ));
            }
        }
    }

    fn on_cancel(&mut self) {
        match self.scheduler.cancel() {
            Ok(cancelled) => {
                self.stop_ticker();
                self.publish_snapshot();
                self.broadcast(SchedulerUpdate::Cancelled);

                self.dispatch(
                    CommandKind::Cancel,
                    cancelled.generation,
                    0,
                    cancelled.remaining_at_cancel,
                );
            }
            Err(err) => debug!("忽略取消请求: {}", err),
        }
    }

    fn on_tick(&mut self, ticker_id: u64) {
        if ticker_id != self.ticker_id || self.ticker.is_none() {
            debug!("忽略过期的tick: {}", ticker_id);
            return;
        }

        match self.scheduler.tick() {
            TickOutcome::Decremented { .. } => self.publish_snapshot(),
            TickOutcome::Completed => {
                self.stop_ticker();
                self.publish_snapshot();
                self.broadcast(SchedulerUpdate::Completed);
                self.notify(NotificationBuilder::info("倒计时结束", "系统即将关机。"));
            }
            TickOutcome::Stopped => {
                self.stop_ticker();
                self.publish_snapshot();
            }
        }
    }

    fn on_command_finished(
        &mut self,
        kind: CommandKind,
        generation: u64,
        remaining_at_issue: u64,
        issued_at: Instant,
        result: Result<(), ShutdownError>,
    ) {
        let err = match result {
            Ok(()) => {
                info!("{}命令执行成功", kind);
                let notice = match kind {
                    CommandKind::Schedule => NotificationBuilder::success(
                        "定时关机已设定",
                        format!(
                            "系统将在 {} 后关机。",
                            format_clock(self.scheduler.remaining_seconds())
                        ),
                    ),
                    CommandKind::Cancel => {
                        NotificationBuilder::success("定时关机已取消", "系统不会自动关机。")
                    }
                };
                self.notify(notice);
                return;
            }
            Err(err) => err,
        };

        error!("{}命令失败: {}", kind, err);
        self.notify(NotificationBuilder::error(
            format!("{}失败", kind),
            err.to_string(),
        ));

        let rolled_back = match kind {
            CommandKind::Schedule => {
                let rolled_back = self.scheduler.rollback_schedule(generation);
                if rolled_back {
                    self.stop_ticker();
                }
                rolled_back
            }
            CommandKind::Cancel => {
                let elapsed = issued_at.elapsed().as_secs();
                let remaining = remaining_at_issue.saturating_sub(elapsed);
                let restored = self.scheduler.restore_after_failed_cancel(generation, remaining);
                if restored {
                    self.start_ticker();
                }
                restored
            }
        };

        if rolled_back {
            self.publish_snapshot();
            self.broadcast(SchedulerUpdate::RolledBack { kind });
        }
    }

    /// 把外部命令排入命令任务的队列
    fn dispatch(
        &self,
        kind: CommandKind,
        generation: u64,
        delay_seconds: u64,
        remaining_at_issue: u64,
    ) {
        let request = CommandRequest {
            kind,
            generation,
            delay_seconds,
            remaining_at_issue,
            issued_at: Instant::now(),
        };
        if self.commands_tx.send(request).is_err() {
            error!("命令任务已停止，{}命令未下发", kind);
        }
    }

    /// 启动新的一秒定时器，旧定时器的tick会被忽略
    fn start_ticker(&mut self) {
        self.stop_ticker();
        self.ticker_id += 1;

        let ticker_id = self.ticker_id;
        let events = self.events_tx.clone();
        self.ticker = Some(tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
            loop {
                interval.tick().await;
                if events.send(ControllerEvent::Tick { ticker_id }).is_err() {
                    break;
                }
            }
        }));

        debug!("定时器{}已启动", ticker_id);
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
            debug!("定时器{}已停止", self.ticker_id);
        }
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx.send_replace(self.scheduler.snapshot());
    }

    fn broadcast(&self, update: SchedulerUpdate) {
        if self.update_tx.send(update).is_err() {
            debug!("没有订阅者接收更新");
        }
    }

    fn notify(&self, notification: NotificationMessage) {
        self.broadcast(SchedulerUpdate::Notice(notification));
    }
}

/// 按队列顺序逐条执行外部命令，上一条完成后才开始下一条
async fn run_command_worker<S: ShutdownCommand>(
    shutdown: Arc<S>,
    mut requests: mpsc::UnboundedReceiver<CommandRequest>,
    events: mpsc::UnboundedSender<ControllerEvent>,
) {
    while let Some(request) = requests.recv().await {
        debug!("执行{}命令", request.kind);
        let result = match request.kind {
            CommandKind::Schedule => shutdown.schedule_shutdown(request.delay_seconds).await,
            CommandKind::Cancel => shutdown.cancel_shutdown().await,
        };

        let finished = ControllerEvent::CommandFinished {
            kind: request.kind,
            generation: request.generation,
            remaining_at_issue: request.remaining_at_issue,
            issued_at: request.issued_at,
            result,
        };
        if events.send(finished).is_err() {
            warn!("{}命令已完成，但控制器已停止", request.kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SchedulerState;
    use crate::utils::notification::NotificationType;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tokio::time::sleep;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Schedule(u64),
        Cancel,
    }

    #[derive(Debug, Default)]
    struct MockShutdown {
        calls: Mutex<Vec<Call>>,
        fail_schedule: AtomicBool,
        fail_cancel: AtomicBool,
        schedule_delay: Duration,
        cancel_delay: Duration,
    }

    impl MockShutdown {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn failure() -> ShutdownError {
            ShutdownError::ExitStatus {
                program: "shutdown".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "拒绝访问".to_string(),
            }
        }
    }

    impl ShutdownCommand for MockShutdown {
        async fn schedule_shutdown(&self, delay_seconds: u64) -> Result<(), ShutdownError> {
            if !self.schedule_delay.is_zero() {
                sleep(self.schedule_delay).await;
            }
            self.calls.lock().unwrap().push(Call::Schedule(delay_seconds));
            if self.fail_schedule.load(Ordering::SeqCst) {
                Err(Self::failure())
            } else {
                Ok(())
            }
        }

        async fn cancel_shutdown(&self) -> Result<(), ShutdownError> {
            if !self.cancel_delay.is_zero() {
                sleep(self.cancel_delay).await;
            }
            self.calls.lock().unwrap().push(Call::Cancel);
            if self.fail_cancel.load(Ordering::SeqCst) {
                Err(Self::failure())
            } else {
                Ok(())
            }
        }
    }

    fn spawn_controller(mock: Arc<MockShutdown>) -> (ControllerHandle, JoinHandle<()>) {
        let (controller, handle) = SchedulerController::new(mock);
        let task = tokio::spawn(controller.run());
        (handle, task)
    }

    /// 让控制器处理完已排队的事件
    async fn settle() {
        sleep(Duration::from_millis(10)).await;
    }

    fn drain_notices(updates: &mut broadcast::Receiver<SchedulerUpdate>) -> Vec<NotificationMessage> {
        let mut notices = Vec::new();
        while let Ok(update) = updates.try_recv() {
            if let SchedulerUpdate::Notice(notice) = update {
                notices.push(notice);
            }
        }
        notices
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_arms_and_issues_command() {
        let mock = Arc::new(MockShutdown::default());
        let (handle, _task) = spawn_controller(Arc::clone(&mock));

        handle.schedule("10").unwrap();
        settle().await;

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, SchedulerState::Armed);
        assert_eq!(snapshot.remaining_seconds, 600);
        assert_eq!(snapshot.display_text, "00:10:00");
        assert!(snapshot.cancel_enabled);
        assert!(!snapshot.schedule_enabled);
        assert_eq!(mock.calls(), vec![Call::Schedule(600)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_runs_to_completion() {
        let mock = Arc::new(MockShutdown::default());
        let (handle, _task) = spawn_controller(Arc::clone(&mock));
        let mut updates = handle.subscribe();

        handle.schedule("10").unwrap();
        sleep(Duration::from_secs(30) + Duration::from_millis(500)).await;
        assert_eq!(handle.snapshot().remaining_seconds, 570);

        sleep(Duration::from_secs(570)).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.display_text, "00:00:00");
        assert_eq!(snapshot.state, SchedulerState::Idle);

        // 自然结束不会再下发任何命令
        assert_eq!(mock.calls(), vec![Call::Schedule(600)]);

        let mut completed = false;
        while let Ok(update) = updates.try_recv() {
            if matches!(update, SchedulerUpdate::Completed) {
                completed = true;
            }
        }
        assert!(completed);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(handle.snapshot().remaining_seconds, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_input_reports_error() {
        let mock = Arc::new(MockShutdown::default());
        let (handle, _task) = spawn_controller(Arc::clone(&mock));
        let mut updates = handle.subscribe();

        handle.schedule("abc").unwrap();
        settle().await;

        assert_eq!(handle.snapshot(), CountdownSnapshot::default());
        assert!(mock.calls().is_empty());

        let notices = drain_notices(&mut updates);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].notification_type, NotificationType::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_then_cancel() {
        let mock = Arc::new(MockShutdown::default());
        let (handle, _task) = spawn_controller(Arc::clone(&mock));

        handle.schedule("5").unwrap();
        handle.cancel().unwrap();
        settle().await;

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.remaining_seconds, 0);
        assert_eq!(snapshot.state, SchedulerState::Idle);

        assert_eq!(mock.calls(), vec![Call::Schedule(300), Call::Cancel]);

        // 定时器已停止
        sleep(Duration::from_secs(3)).await;
        assert_eq!(handle.snapshot().remaining_seconds, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_schedule_still_reaches_system_before_cancel() {
        let mock = Arc::new(MockShutdown {
            schedule_delay: Duration::from_millis(200),
            cancel_delay: Duration::from_millis(20),
            ..Default::default()
        });
        let (handle, _task) = spawn_controller(Arc::clone(&mock));

        handle.schedule("5").unwrap();
        handle.cancel().unwrap();

        sleep(Duration::from_millis(100)).await;
        assert!(mock.calls().is_empty());

        sleep(Duration::from_millis(500)).await;
        assert_eq!(mock.calls(), vec![Call::Schedule(300), Call::Cancel]);
        assert_eq!(handle.snapshot().state, SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_waits_for_queued_commands() {
        let mock = Arc::new(MockShutdown {
            schedule_delay: Duration::from_millis(200),
            ..Default::default()
        });
        let (handle, task) = spawn_controller(Arc::clone(&mock));

        handle.schedule("5").unwrap();
        handle.cancel().unwrap();
        handle.exit().unwrap();
        task.await.unwrap();

        assert_eq!(mock.calls(), vec![Call::Schedule(300), Call::Cancel]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_idle_is_noop() {
        let mock = Arc::new(MockShutdown::default());
        let (handle, _task) = spawn_controller(Arc::clone(&mock));

        handle.cancel().unwrap();
        settle().await;

        assert_eq!(handle.snapshot(), CountdownSnapshot::default());
        assert!(mock.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_schedule_rolls_back() {
        let mock = Arc::new(MockShutdown::default());
        mock.fail_schedule.store(true, Ordering::SeqCst);
        let (handle, _task) = spawn_controller(Arc::clone(&mock));
        let mut updates = handle.subscribe();

        handle.schedule("5").unwrap();
        settle().await;

        assert_eq!(handle.snapshot().state, SchedulerState::Idle);
        assert_eq!(handle.snapshot().remaining_seconds, 0);

        let mut rolled_back = false;
        let mut error_shown = false;
        while let Ok(update) = updates.try_recv() {
            match update {
                SchedulerUpdate::RolledBack { kind } => {
                    assert_eq!(kind, CommandKind::Schedule);
                    rolled_back = true;
                }
                SchedulerUpdate::Notice(notice) => {
                    if notice.notification_type == NotificationType::Error {
                        error_shown = true;
                    }
                }
                _ => {}
            }
        }
        assert!(rolled_back);
        assert!(error_shown);

        sleep(Duration::from_secs(3)).await;
        assert_eq!(handle.snapshot().remaining_seconds, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cancel_restores_countdown() {
        let mock = Arc::new(MockShutdown::default());
        mock.fail_cancel.store(true, Ordering::SeqCst);
        let (handle, _task) = spawn_controller(Arc::clone(&mock));

        handle.schedule("5").unwrap();
        sleep(Duration::from_millis(10_500)).await;
        assert_eq!(handle.snapshot().remaining_seconds, 290);

        handle.cancel().unwrap();
        settle().await;

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, SchedulerState::Armed);
        assert_eq!(snapshot.remaining_seconds, 290);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(handle.snapshot().remaining_seconds, 288);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_stops_controller() {
        let mock = Arc::new(MockShutdown::default());
        let (handle, task) = spawn_controller(mock);

        handle.schedule("1").unwrap();
        handle.exit().unwrap();
        task.await.unwrap();

        assert!(handle.cancel().is_err());
    }
}
