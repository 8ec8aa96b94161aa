//! 子进程执行与进程存活检测

use super::types::CommandOutput;
use crate::error::{Result, UpdateError};
use std::fs;
use std::path::Path;

/// 执行命令并捕获 stdout / stderr / 退出码；非零退出不视为错误
pub fn run(argv: &[&str]) -> Result<CommandOutput> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| UpdateError::InvalidParameter("empty command line".to_string()))?;

    let output = duct::cmd(*program, args)
        .stdout_capture()
        .stderr_capture()
        .unchecked()
        .run()?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        // 被信号终止时没有退出码
        code: output.status.code().unwrap_or(-1),
    })
}

/// PID 是否存在于进程表中（EPERM 说明进程存在但属于其他用户）
pub fn pid_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// 读取 PID 文件，文件缺失或内容无效都按 "未运行" 处理
pub fn read_pidfile(path: &Path) -> Option<i32> {
    fs::read_to_string(path)
        .ok()
        .and_then(|content| content.trim().parse().ok())
}

pub fn pidfile_alive(path: &Path) -> bool {
    read_pidfile(path).map(pid_alive).unwrap_or(false)
}

/// 进程表中是否有名称包含 `pattern` 的进程
pub fn process_named(pattern: &str) -> bool {
    duct::cmd!("pgrep", pattern)
        .stdout_null()
        .stderr_null()
        .unchecked()
        .run()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
