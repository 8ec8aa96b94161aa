//! zypper 驱动

use super::parser::{parse_zypper_info, parse_zypper_list_updates};
use super::process::{pidfile_alive, run};
use super::types::{BackendKind, PackageRecord};
use super::{command_line, ensure_idle, Backend};
use crate::config::HostPaths;
use crate::error::{Result, UpdateError};
use std::path::PathBuf;

pub struct Zypper {
    pid_file: PathBuf,
    logfile: PathBuf,
}

impl Zypper {
    pub fn new(paths: &HostPaths) -> Self {
        Self {
            pid_file: paths.zypp_pid.clone(),
            logfile: paths.zypper_log.clone(),
        }
    }
}

impl Backend for Zypper {
    fn kind(&self) -> BackendKind {
        BackendKind::Zypper
    }

    /// zypper 出错时退出码不可靠，以 stderr 是否为空判断
    fn list_updatable(&self) -> Result<Vec<String>> {
        ensure_idle(self)?;
        let output = run(&["zypper", "list-updates"])?;
        if !output.stderr.is_empty() {
            return Err(UpdateError::OperationFailed(output.stderr));
        }
        Ok(parse_zypper_list_updates(&output.stdout))
    }

    fn describe(&self, name: &str) -> Result<PackageRecord> {
        ensure_idle(self)?;
        let output = run(&["zypper", "info", "--requires", name])?;
        if !output.stderr.is_empty() {
            return Err(UpdateError::OperationFailed(output.stderr));
        }
        parse_zypper_info(name, &output.stdout)
    }

    fn is_running(&self) -> bool {
        pidfile_alive(&self.pid_file)
    }

    /// zypper update 总会升级全部可升级的包，包列表仅作参考
    fn update_command(&self, packages: Option<&[String]>) -> Vec<String> {
        command_line(
            &["zypper", "--non-interactive", "update", "--auto-agree-with-licenses"],
            packages,
        )
    }

    fn logfile_path(&self) -> Option<PathBuf> {
        Some(self.logfile.clone())
    }
}
