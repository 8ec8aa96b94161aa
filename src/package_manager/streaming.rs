//! 流式更新执行与进度接管
//!
//! 状态：STARTING → DRIVING（本进程启动的子进程）或 TAILING（接管外部启动的更新）
//! → TERMINAL(success | failure)。
//!
//! 进度回调每次都收到到目前为止的完整累计文本，而不是增量；相邻两次回调中
//! 前一次的文本总是后一次的前缀。最后一次回调带有 `Some(succeeded)`。

use super::Backend;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::process::{Command, Stdio};
use std::time::Duration;

/// 进度回调：`(累计文本, 终态)`，终态为 `None` 表示仍在进行
pub type ProgressFn<'a> = &'a (dyn Fn(&str, Option<bool>) + Send + Sync);

/// 存活检查 / 日志读取的固定间隔
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// 没有日志输出时用来表示 "仍在运行" 的占位字符
pub const HEARTBEAT: char = '*';

const READ_CHUNK: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailerState {
    Starting,
    Driving,
    Tailing,
    Terminal { succeeded: bool },
}

/// 把字节流增量解码为 UTF-8，跨块截断的多字节字符留到下一块
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    out.push_str(s);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    fn flush(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).to_string();
        self.pending.clear();
        rest
    }
}

/// 一次进行中或已结束的更新
#[derive(Debug)]
pub struct UpdateOperation {
    target: Option<Vec<String>>,
    output: String,
    state: TailerState,
    decoder: Utf8Decoder,
}

impl UpdateOperation {
    fn new(target: Option<Vec<String>>) -> Self {
        Self {
            target,
            output: String::new(),
            state: TailerState::Starting,
            decoder: Utf8Decoder::default(),
        }
    }

    /// 升级目标；`None` 表示全部
    pub fn target(&self) -> Option<&[String]> {
        self.target.as_deref()
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn state(&self) -> TailerState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, TailerState::Terminal { .. })
    }

    pub fn succeeded(&self) -> Option<bool> {
        match self.state {
            TailerState::Terminal { succeeded } => Some(succeeded),
            _ => None,
        }
    }

    fn append_bytes(&mut self, bytes: &[u8], progress: ProgressFn<'_>) {
        let text = self.decoder.decode(bytes);
        self.append(&text, progress);
    }

    fn append(&mut self, text: &str, progress: ProgressFn<'_>) {
        if text.is_empty() {
            return;
        }
        self.output.push_str(text);
        progress(&self.output, None);
    }

    fn finish(&mut self, succeeded: bool, progress: ProgressFn<'_>) {
        if self.is_terminal() {
            return;
        }
        let rest = self.decoder.flush();
        self.output.push_str(&rest);
        self.state = TailerState::Terminal { succeeded };
        progress(&self.output, Some(succeeded));
    }
}

/// 驱动或接管更新进程，把输出流式地交给进度回调
#[derive(Debug, Clone)]
pub struct ProgressTailer {
    interval: Duration,
}

impl Default for ProgressTailer {
    fn default() -> Self {
        Self {
            interval: POLL_INTERVAL,
        }
    }
}

impl ProgressTailer {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn with_interval(interval: Duration) -> Self {
        Self { interval }
    }

    /// DRIVING：启动升级命令并读取其标准输出直到退出
    ///
    /// 退出码 0 为成功；否则把子进程的 stderr 追加到累计输出后以失败结束。
    /// 子进程运行在独立会话中并忽略 SIGTERM，停止本进程不会中断正在写入的事务。
    pub fn drive(
        &self,
        target: Option<Vec<String>>,
        argv: &[String],
        progress: ProgressFn<'_>,
    ) -> UpdateOperation {
        use std::os::unix::process::CommandExt;

        let mut op = UpdateOperation::new(target);
        // 重置调用方已有的消息
        progress("", None);

        let Some((program, args)) = argv.split_first() else {
            op.append("empty update command\n", progress);
            op.finish(false, progress);
            return op;
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        unsafe {
            cmd.pre_exec(|| {
                // 新会话：脱离父进程的进程组，并忽略其终止信号
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                libc::signal(libc::SIGTERM, libc::SIG_IGN);
                Ok(())
            });
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                log::error!("failed to start {}: {}", program, e);
                op.append(&format!("failed to start {}: {}\n", program, e), progress);
                op.finish(false, progress);
                return op;
            }
        };
        op.state = TailerState::Driving;
        log::info!("driving update (pid {}): {}", child.id(), argv.join(" "));

        // stderr 在独立线程中收集，避免管道写满阻塞子进程
        let stderr = child.stderr.take();
        let stderr_handle = std::thread::spawn(move || {
            let mut collected = Vec::new();
            if let Some(mut stream) = stderr {
                let _ = stream.read_to_end(&mut collected);
            }
            String::from_utf8_lossy(&collected).to_string()
        });

        if let Some(mut stdout) = child.stdout.take() {
            let mut buffer = [0u8; READ_CHUNK];
            loop {
                match stdout.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => op.append_bytes(&buffer[..n], progress),
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        log::warn!("reading update output failed: {}", e);
                        break;
                    }
                }
            }
        }

        let status = child.wait();
        let errors = stderr_handle.join().unwrap_or_default();

        match status {
            Ok(status) if status.success() => {
                log::info!("update finished successfully");
                op.finish(true, progress);
            }
            Ok(status) => {
                log::warn!("update exited with {}", status);
                op.append(&errors, progress);
                op.finish(false, progress);
            }
            Err(e) => {
                log::error!("waiting for update failed: {}", e);
                op.append(&errors, progress);
                op.append(&format!("{}\n", e), progress);
                op.finish(false, progress);
            }
        }
        op
    }

    /// TAILING：接管一个不是本进程启动的更新
    ///
    /// 从日志末尾开始读取新追加的内容；还没有任何日志输出时每个间隔追加一个
    /// [`HEARTBEAT`]。日志无法打开时退化为只依据 `is_running()` 的心跳循环。
    /// 结束完全由进程存活推断：正常完成与崩溃都以成功结束。
    pub fn tail(&self, backend: &dyn Backend, progress: ProgressFn<'_>) -> UpdateOperation {
        let mut op = UpdateOperation::new(None);

        if !backend.is_running() {
            log::debug!("no update in progress, nothing to tail");
            op.finish(true, progress);
            return op;
        }
        op.state = TailerState::Tailing;

        let opened = backend
            .logfile_path()
            .map(|path| File::open(&path).map(|f| (path, f)));
        let mut file = match opened {
            Some(Ok((path, mut file))) => match file.seek(SeekFrom::End(0)) {
                Ok(_) => {
                    log::info!("tailing {}", path.display());
                    file
                }
                Err(e) => {
                    log::warn!("cannot seek {}: {}", path.display(), e);
                    self.heartbeat_until_idle(backend, &mut op, progress);
                    return op;
                }
            },
            Some(Err(e)) => {
                log::warn!("cannot open package manager log: {}", e);
                self.heartbeat_until_idle(backend, &mut op, progress);
                return op;
            }
            None => {
                log::info!("package manager has no log file, tracking liveness only");
                self.heartbeat_until_idle(backend, &mut op, progress);
                return op;
            }
        };

        let mut buffer = [0u8; READ_CHUNK];
        let mut seen_log = false;
        loop {
            let n = match file.read(&mut buffer) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("reading package manager log failed: {}", e);
                    0
                }
            };
            if n == 0 {
                if !backend.is_running() {
                    break;
                }
                if !seen_log {
                    op.append(&HEARTBEAT.to_string(), progress);
                }
                std::thread::sleep(self.interval);
                continue;
            }
            seen_log = true;
            op.append_bytes(&buffer[..n], progress);
        }

        op.finish(true, progress);
        op
    }

    fn heartbeat_until_idle(
        &self,
        backend: &dyn Backend,
        op: &mut UpdateOperation,
        progress: ProgressFn<'_>,
    ) {
        while backend.is_running() {
            op.append(&HEARTBEAT.to_string(), progress);
            std::thread::sleep(self.interval);
        }
        op.append("\n", progress);
        op.finish(true, progress);
    }
}
