use crate::error::{Result, UpdateError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_PATH: &str = "/etc/host-swupdate/config.toml";
const CONFIG_ENV: &str = "HOST_SWUPDATE_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: HostPaths,
}

/// 各包管理器在主机上的状态文件位置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostPaths {
    pub yum_conf: PathBuf,
    pub yum_pid: PathBuf,
    pub zypp_pid: PathBuf,
    pub dpkg_lock: PathBuf,
    pub dnf_log: PathBuf,
    pub apt_log: PathBuf,
    pub zypper_log: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self {
            yum_conf: PathBuf::from("/etc/yum.conf"),
            yum_pid: PathBuf::from("/var/run/yum.pid"),
            zypp_pid: PathBuf::from("/var/run/zypp.pid"),
            dpkg_lock: PathBuf::from("/var/lib/dpkg/lock"),
            dnf_log: PathBuf::from("/var/log/dnf.log"),
            apt_log: PathBuf::from("/var/log/apt/term.log"),
            zypper_log: PathBuf::from("/var/log/zypp/history"),
        }
    }
}

impl Config {
    /// 配置文件路径：环境变量 > 默认路径；文件不存在时使用默认配置
    pub fn load_or_default() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| UpdateError::Config(format!("{}: {}", path.display(), e)))
    }
}
