//! yum / dnf 驱动；两者共用 check-update 与 dry-run 的文本格式

use super::parser::{
    parse_check_update, parse_dry_run, parse_yum_conf_logfile, DNF_DEPS_MARKER,
    DNF_HEADER_LINES, YUM_DEPS_MARKER, YUM_HEADER_LINES,
};
use super::process::{pidfile_alive, process_named, run};
use super::types::{BackendKind, PackageRecord};
use super::{command_line, ensure_idle, Backend};
use crate::config::HostPaths;
use crate::error::{Result, UpdateError};
use std::fs;
use std::path::{Path, PathBuf};

/// `<mgr> check-update -d0`：退出码 1 表示没有可更新的包（按空列表处理），
/// 0 与 100 正常解析，其余视为失败。
fn check_update(program: &str) -> Result<Vec<String>> {
    let output = run(&[program, "check-update", "-d0"])?;
    match output.code {
        1 => Ok(Vec::new()),
        0 | 100 => Ok(parse_check_update(&output.stdout)),
        code => Err(UpdateError::OperationFailed(format!(
            "{} check-update exited with {}: {}",
            program,
            code,
            output.stderr.trim()
        ))),
    }
}

/// `<mgr> -v --assumeno update <name>`：只有退出码 1（用户拒绝事务）时输出中才有完整依赖表
fn dry_run(program: &str, name: &str, marker: &str, header_lines: usize) -> Result<PackageRecord> {
    let output = run(&[program, "-v", "--assumeno", "update", name])?;
    if output.code != 1 {
        return Err(UpdateError::not_found(
            name,
            format!("{} exited with {}", program, output.code),
        ));
    }
    parse_dry_run(name, &output.stdout, marker, header_lines)
}

fn yum_logfile(yum_conf: &Path) -> Option<PathBuf> {
    let content = fs::read_to_string(yum_conf).ok()?;
    parse_yum_conf_logfile(&content).map(PathBuf::from)
}

pub struct Yum {
    pid_file: PathBuf,
    logfile: Option<PathBuf>,
}

impl Yum {
    pub fn new(paths: &HostPaths) -> Self {
        Self {
            pid_file: paths.yum_pid.clone(),
            logfile: yum_logfile(&paths.yum_conf),
        }
    }
}

impl Backend for Yum {
    fn kind(&self) -> BackendKind {
        BackendKind::Yum
    }

    fn list_updatable(&self) -> Result<Vec<String>> {
        ensure_idle(self)?;
        check_update("yum")
    }

    fn describe(&self, name: &str) -> Result<PackageRecord> {
        ensure_idle(self)?;
        dry_run("yum", name, YUM_DEPS_MARKER, YUM_HEADER_LINES)
    }

    /// `/var/run/yum.pid` 存在且进程存活
    fn is_running(&self) -> bool {
        pidfile_alive(&self.pid_file)
    }

    fn update_command(&self, packages: Option<&[String]>) -> Vec<String> {
        command_line(&["yum", "-y", "update"], packages)
    }

    fn logfile_path(&self) -> Option<PathBuf> {
        self.logfile.clone()
    }
}

pub struct Dnf {
    logfile: PathBuf,
}

impl Dnf {
    pub fn new(paths: &HostPaths) -> Self {
        Self {
            logfile: paths.dnf_log.clone(),
        }
    }
}

impl Backend for Dnf {
    fn kind(&self) -> BackendKind {
        BackendKind::Dnf
    }

    fn list_updatable(&self) -> Result<Vec<String>> {
        ensure_idle(self)?;
        check_update("dnf")
    }

    fn describe(&self, name: &str) -> Result<PackageRecord> {
        ensure_idle(self)?;
        dry_run("dnf", name, DNF_DEPS_MARKER, DNF_HEADER_LINES)
    }

    /// dnf 不写 PID 文件，只能扫描进程表
    fn is_running(&self) -> bool {
        process_named("dnf")
    }

    fn update_command(&self, packages: Option<&[String]>) -> Vec<String> {
        command_line(&["dnf", "-y", "update"], packages)
    }

    fn logfile_path(&self) -> Option<PathBuf> {
        Some(self.logfile.clone())
    }
}
