//! 主机软件更新编排：在 dnf / yum / apt / zypper 之上提供统一的
//! 列出、描述、升级与进度接管操作。

pub mod config;
pub mod error;
pub mod guard;
pub mod package_manager;
pub mod swupdate;
pub mod tasks;

pub use config::Config;
pub use error::{Result, UpdateError};
pub use guard::BackendLock;
pub use package_manager::{Backend, BackendKind, PackageRecord};
pub use swupdate::{resolve_dependency_closure, SoftwareUpdate};
pub use tasks::{TaskId, TaskInfo, TaskRegistry, TaskStatus};
