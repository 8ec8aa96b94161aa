//! 包管理器相关数据类型定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 命令执行结果
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// 单个可更新包的详细信息，`depends` 只含直接依赖
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub package_name: String,
    pub version: String,
    pub arch: String,
    pub repository: String,
    pub depends: Vec<String>,
}

/// 支持的包管理器；声明顺序即检测优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Dnf,
    Yum,
    Apt,
    Zypper,
}

impl BackendKind {
    pub const DETECTION_ORDER: [BackendKind; 4] = [
        BackendKind::Dnf,
        BackendKind::Yum,
        BackendKind::Apt,
        BackendKind::Zypper,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Dnf => "dnf",
            BackendKind::Yum => "yum",
            BackendKind::Apt => "apt",
            BackendKind::Zypper => "zypper",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
