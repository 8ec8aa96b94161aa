//! apt 驱动：以模拟升级（`apt-get -s upgrade`）得到的变更集作为可更新集合

use super::parser::{parse_apt_depends, parse_apt_simulation};
use super::process::run;
use super::types::{BackendKind, PackageRecord};
use super::{command_line, ensure_idle, Backend};
use crate::config::HostPaths;
use crate::error::{Result, UpdateError};
use std::fs::OpenOptions;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

pub struct Apt {
    lock_file: PathBuf,
    logfile: PathBuf,
}

impl Apt {
    pub fn new(paths: &HostPaths) -> Self {
        Self {
            lock_file: paths.dpkg_lock.clone(),
            logfile: paths.apt_log.clone(),
        }
    }

    fn simulate_upgrade(&self) -> Result<Vec<PackageRecord>> {
        let output = run(&["apt-get", "-s", "upgrade"])?;
        if !output.success() {
            return Err(UpdateError::OperationFailed(output.stderr));
        }
        Ok(parse_apt_simulation(&output.stdout))
    }
}

/// 非阻塞地尝试对 dpkg 锁文件加排他锁；打不开或加锁被拒都视为 apt 正在运行。
/// 锁随文件关闭释放。
fn dpkg_locked(path: &Path) -> bool {
    let file = match OpenOptions::new().write(true).create(true).open(path) {
        Ok(f) => f,
        Err(e) => {
            log::debug!("cannot open {} for locking: {}", path.display(), e);
            return true;
        }
    };
    unsafe { libc::lockf(file.as_raw_fd(), libc::F_TLOCK, 0) != 0 }
}

impl Backend for Apt {
    fn kind(&self) -> BackendKind {
        BackendKind::Apt
    }

    fn list_updatable(&self) -> Result<Vec<String>> {
        ensure_idle(self)?;
        Ok(self
            .simulate_upgrade()?
            .into_iter()
            .map(|pkg| pkg.package_name)
            .collect())
    }

    /// 只能描述变更集中的包，依赖取自 `apt-cache depends`
    fn describe(&self, name: &str) -> Result<PackageRecord> {
        ensure_idle(self)?;
        let mut package = self
            .simulate_upgrade()?
            .into_iter()
            .find(|pkg| pkg.package_name == name)
            .ok_or_else(|| UpdateError::not_found(name, "No package found"))?;

        let output = run(&["apt-cache", "depends", "--important", name])?;
        if !output.success() {
            return Err(UpdateError::OperationFailed(output.stderr));
        }
        package.depends = parse_apt_depends(&output.stdout);
        Ok(package)
    }

    fn is_running(&self) -> bool {
        dpkg_locked(&self.lock_file)
    }

    fn update_command(&self, packages: Option<&[String]>) -> Vec<String> {
        match packages {
            None => command_line(&["apt-get", "upgrade", "-y"], None),
            Some(_) => command_line(&["apt-get", "-y", "--only-upgrade", "install"], packages),
        }
    }

    fn logfile_path(&self) -> Option<PathBuf> {
        Some(self.logfile.clone())
    }
}
