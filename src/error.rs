//! 软件更新错误类型

use thiserror::Error;

const ALREADY_RUNNING: &str = "package manager is already running";

#[derive(Debug, Error)]
pub enum UpdateError {
    /// 主机上没有可用的包管理器，本进程生命周期内不再重试检测
    #[error("There is no compatible package manager for this system.")]
    NoCompatibleManager,

    #[error("package '{name}' not found: {detail}")]
    NotFound { name: String, detail: String },

    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("task {0} not found")]
    TaskNotFound(u64),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl UpdateError {
    pub fn not_found(name: &str, detail: impl Into<String>) -> Self {
        UpdateError::NotFound {
            name: name.to_string(),
            detail: detail.into(),
        }
    }

    /// 包管理器已在运行（由本进程或外部启动）
    pub fn already_running() -> Self {
        UpdateError::OperationFailed(ALREADY_RUNNING.to_string())
    }

    pub fn is_already_running(&self) -> bool {
        matches!(self, UpdateError::OperationFailed(msg) if msg.ends_with(ALREADY_RUNNING))
    }

    /// 为错误附加目标包名，NotFound 原样返回
    pub fn with_target(self, target: &str) -> Self {
        match self {
            UpdateError::OperationFailed(msg) => {
                UpdateError::OperationFailed(format!("{}: {}", target, msg))
            }
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, UpdateError>;
