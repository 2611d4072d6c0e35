//! 核心业务逻辑模块
//!
//! 倒计时状态机、调度控制器和外部关机命令

pub mod controller;
pub mod countdown;
pub mod shutdown;
pub mod system_compat;
pub mod types;
