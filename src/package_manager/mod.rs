//! 包管理器模块 — 对 dnf / yum / apt / zypper 的封装

pub mod apt;
pub mod parser;
pub mod process;
pub mod streaming;
pub mod types;
pub mod yum;
pub mod zypper;

// 重新导出常用类型
pub use apt::Apt;
pub use streaming::ProgressTailer;
pub use types::{BackendKind, CommandOutput, PackageRecord};
pub use yum::{Dnf, Yum};
pub use zypper::Zypper;

use crate::config::HostPaths;
use crate::error::{Result, UpdateError};
use std::path::PathBuf;
use std::sync::Arc;

/// 单个包管理器的查询 / 升级原语
///
/// `list_updatable` 与 `describe` 在包管理器已运行时直接失败，不返回部分数据。
/// 调用方负责在调用期间持有 [`crate::guard::BackendLock`]。
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// 可更新的包名（不含元数据）
    fn list_updatable(&self) -> Result<Vec<String>>;

    /// 包详情；包管理器索引中没有该包时返回 `NotFound`
    fn describe(&self, name: &str) -> Result<PackageRecord>;

    /// 是否已有更新在进行（本进程或外部启动）
    fn is_running(&self) -> bool;

    /// 升级命令行；`packages` 为 `None` 时升级全部
    fn update_command(&self, packages: Option<&[String]>) -> Vec<String>;

    /// 包管理器自身写入进度的日志，仅用于重新接管外部启动的更新
    fn logfile_path(&self) -> Option<PathBuf>;
}

/// 查询前检查：包管理器运行中则立即失败
pub fn ensure_idle(backend: &dyn Backend) -> Result<()> {
    if backend.is_running() {
        return Err(UpdateError::already_running());
    }
    Ok(())
}

/// 拼接 "基础命令 + 包列表"
pub(crate) fn command_line(base: &[&str], packages: Option<&[String]>) -> Vec<String> {
    let mut argv: Vec<String> = base.iter().map(|s| s.to_string()).collect();
    if let Some(pkgs) = packages {
        argv.extend(pkgs.iter().cloned());
    }
    argv
}

/// 检测某个包管理器是否可用；不得改变主机状态（不刷新包列表）
pub fn is_available(kind: BackendKind) -> bool {
    match kind {
        BackendKind::Dnf => which::which("dnf").is_ok(),
        BackendKind::Yum => which::which("yum").is_ok(),
        BackendKind::Apt => which::which("apt-get").is_ok() && which::which("apt-cache").is_ok(),
        BackendKind::Zypper => process::run(&["zypper", "--help"])
            .map(|o| o.success())
            .unwrap_or(false),
    }
}

/// 按固定优先级 dnf → yum → apt → zypper 检测，第一个可用者胜出
pub fn detect(paths: &HostPaths) -> Result<Arc<dyn Backend>> {
    detect_with(paths, is_available)
}

pub fn detect_with<F>(paths: &HostPaths, available: F) -> Result<Arc<dyn Backend>>
where
    F: Fn(BackendKind) -> bool,
{
    let kind = BackendKind::DETECTION_ORDER
        .into_iter()
        .find(|kind| available(*kind))
        .ok_or(UpdateError::NoCompatibleManager)?;

    log::info!("Loading {} update features.", kind);
    Ok(instantiate(kind, paths))
}

pub fn instantiate(kind: BackendKind, paths: &HostPaths) -> Arc<dyn Backend> {
    match kind {
        BackendKind::Dnf => Arc::new(Dnf::new(paths)),
        BackendKind::Yum => Arc::new(Yum::new(paths)),
        BackendKind::Apt => Arc::new(Apt::new(paths)),
        BackendKind::Zypper => Arc::new(Zypper::new(paths)),
    }
}
