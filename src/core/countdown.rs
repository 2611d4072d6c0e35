//! 倒计时调度器模块
//!
//! 维护剩余秒数和 空闲/已设定 两态状态机。本模块不做任何IO，
//! 外部关机命令和定时tick由控制器负责驱动。

use log::{debug, info};

use crate::core::types::{
    Armed, Cancelled, CountdownSnapshot, SchedulerError, SchedulerState, TickOutcome,
    MAX_DELAY_SECONDS,
};

/// 倒计时调度器
#[derive(Debug, Clone)]
pub struct CountdownScheduler {
    /// 当前状态
    state: SchedulerState,
    /// 剩余秒数，空闲时恒为0
    remaining_seconds: u64,
    /// 每次设定递增，用于识别过期事件
    generation: u64,
}

impl Default for CountdownScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl CountdownScheduler {
    /// 创建空闲的调度器
    pub fn new() -> Self {
        Self {
            state: SchedulerState::Idle,
            remaining_seconds: 0,
            generation: 0,
        }
    }

    /// 解析用户输入的分钟数
    ///
    /// 只接受正的32位整数，前后空白会被忽略
    pub fn parse_minutes(input: &str) -> Result<u32, SchedulerError> {
        let invalid = || SchedulerError::InvalidInput {
            input: input.to_string(),
        };

        let minutes: i32 = input.trim().parse().map_err(|_| invalid())?;
        if minutes <= 0 {
            return Err(invalid());
        }

        if u64::from(minutes.unsigned_abs()) * 60 > MAX_DELAY_SECONDS {
            return Err(invalid());
        }

        Ok(minutes.unsigned_abs())
    }

    /// 设定关机倒计时
    ///
    /// 成功后状态变为已设定，调用方需启动tick并下发外部关机命令
    pub fn schedule(&mut self, input: &str) -> Result<Armed, SchedulerError> {
        let minutes = Self::parse_minutes(input)?;

        if self.state == SchedulerState::Armed {
            return Err(SchedulerError::AlreadyArmed);
        }

        self.generation += 1;
        self.remaining_seconds = u64::from(minutes) * 60;
        self.state = SchedulerState::Armed;

        info!("倒计时已设定: {}分钟 ({}秒)", minutes, self.remaining_seconds);

        Ok(Armed {
            generation: self.generation,
            delay_seconds: self.remaining_seconds,
        })
    }

    /// 取消倒计时
    ///
    /// 空闲时为空操作，返回 `NotArmed` 且不改变任何状态
    pub fn cancel(&mut self) -> Result<Cancelled, SchedulerError> {
        if self.state != SchedulerState::Armed {
            return Err(SchedulerError::NotArmed);
        }

        let cancelled = Cancelled {
            generation: self.generation,
            remaining_at_cancel: self.remaining_seconds,
        };
        self.reset();

        info!("倒计时已取消，取消时剩余{}秒", cancelled.remaining_at_cancel);
        Ok(cancelled)
    }

    /// 处理一次一秒tick
    pub fn tick(&mut self) -> TickOutcome {
        if self.state != SchedulerState::Armed || self.remaining_seconds == 0 {
            self.reset();
            return TickOutcome::Stopped;
        }

        self.remaining_seconds -= 1;
        if self.remaining_seconds == 0 {
            self.state = SchedulerState::Idle;
            info!("倒计时结束");
            return TickOutcome::Completed;
        }

        debug!("倒计时剩余{}秒", self.remaining_seconds);
        TickOutcome::Decremented {
            remaining: self.remaining_seconds,
        }
    }

    /// 外部设定命令失败后回滚
    ///
    /// 只有失败命令所属的那次设定仍然有效时才回到空闲，返回是否回滚
    pub fn rollback_schedule(&mut self, generation: u64) -> bool {
        if self.state == SchedulerState::Armed && self.generation == generation {
            self.reset();
            info!("设定命令失败，倒计时已回滚为空闲");
            true
        } else {
            false
        }
    }

    /// 外部取消命令失败后恢复倒计时
    ///
    /// 取消之后若未重新设定，则以 `remaining_seconds` 重新进入已设定状态。
    /// 剩余时间为0时说明系统关机应已触发，不再恢复。
    pub fn restore_after_failed_cancel(&mut self, generation: u64, remaining_seconds: u64) -> bool {
        if self.state != SchedulerState::Idle
            || self.generation != generation
            || remaining_seconds == 0
        {
            return false;
        }

        self.remaining_seconds = remaining_seconds;
        self.state = SchedulerState::Armed;
        info!("取消命令失败，倒计时已恢复，剩余{}秒", remaining_seconds);
        true
    }

    fn reset(&mut self) {
        self.state = SchedulerState::Idle;
        self.remaining_seconds = 0;
    }

    #[cfg(test)]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.remaining_seconds
    }

    #[cfg(test)]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_armed(&self) -> bool {
        self.state == SchedulerState::Armed
    }

    /// 生成当前状态的快照
    pub fn snapshot(&self) -> CountdownSnapshot {
        let armed = self.is_armed();
        CountdownSnapshot {
            state: self.state,
            remaining_seconds: self.remaining_seconds,
            display_text: format_clock(self.remaining_seconds),
            cancel_enabled: armed,
            schedule_enabled: !armed,
        }
    }
}

/// 将秒数格式化为 "HH:MM:SS"
///
/// 小时数按总小时计算，超过24小时不会回绕
pub fn format_clock(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}
