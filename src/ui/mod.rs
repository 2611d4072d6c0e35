//! 用户界面模块
//!
//! 终端界面：命令解析和倒计时显示

pub mod commands;
pub mod console;

pub use console::ConsoleShell;
