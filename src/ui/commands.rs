//! 终端命令解析

/// 用户在终端输入的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    /// 设定关机，未给出分钟数时使用默认值
    Schedule(Option<String>),
    /// 取消关机
    Cancel,
    /// 显示当前状态
    Status,
    /// 显示通知历史
    History,
    /// 显示帮助
    Help,
    /// 退出
    Quit,
    /// 空行
    Empty,
}

/// 解析一行输入
///
/// 纯数字视为设定命令的分钟数，分钟参数原样交给调度器校验
pub fn parse_line(line: &str) -> Result<InputCommand, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(InputCommand::Empty);
    }

    let (keyword, rest) = match line.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (line, ""),
    };

    let command = match keyword.to_lowercase().as_str() {
        "s" | "schedule" | "设定" => {
            if rest.is_empty() {
                InputCommand::Schedule(None)
            } else {
                InputCommand::Schedule(Some(rest.to_string()))
            }
        }
        "c" | "cancel" | "取消" => InputCommand::Cancel,
        "st" | "status" | "状态" => InputCommand::Status,
        "history" | "历史" => InputCommand::History,
        "h" | "help" | "?" | "帮助" => InputCommand::Help,
        "q" | "quit" | "exit" | "退出" => InputCommand::Quit,
        _ if keyword.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+') => {
            InputCommand::Schedule(Some(line.to_string()))
        }
        _ => return Err(format!("未知命令: {}", keyword)),
    };

    Ok(command)
}

/// 帮助文本
pub fn help_text() -> &'static str {
    "可用命令:\n  \
     schedule [分钟]  设定定时关机（省略分钟数时使用默认值）\n  \
     <分钟>           同 schedule\n  \
     cancel           取消定时关机\n  \
     status           显示当前状态\n  \
     history          显示通知历史\n  \
     help             显示本帮助\n  \
     quit             退出（已设定的系统关机不会被取消）"
}
