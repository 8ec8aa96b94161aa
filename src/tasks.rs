//! 进程内异步任务表
//!
//! 每个任务在独立线程中运行 worker，worker 通过进度回调更新任务消息；
//! 回调带 `Some(true)` 时任务完成，`Some(false)` 时任务失败。
//! 调用方可以随时 `lookup`，也可以通过 `watch` 订阅每一次更新。

use crate::error::{Result, UpdateError};
use crate::package_manager::streaming::ProgressFn;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

pub type TaskId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Finished,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub target_uri: String,
    pub status: TaskStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskInfo {
    fn new(id: TaskId, target_uri: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            target_uri,
            status: TaskStatus::Running,
            message: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn report(&mut self, message: &str, done: Option<bool>) {
        self.message = message.to_string();
        self.status = match done {
            None => TaskStatus::Running,
            Some(true) => TaskStatus::Finished,
            Some(false) => TaskStatus::Failed,
        };
        self.updated_at = Utc::now();
    }

    pub fn is_done(&self) -> bool {
        self.status != TaskStatus::Running
    }
}

#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<TaskId, Arc<watch::Sender<TaskInfo>>>>,
    next_id: AtomicU64,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 启动任务并立即返回任务 ID
    pub fn start<F>(&self, target_uri: impl Into<String>, worker: F) -> TaskId
    where
        F: FnOnce(ProgressFn<'_>) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let target_uri = target_uri.into();
        log::debug!("starting task {} for {}", id, target_uri);

        let (sender, _) = watch::channel(TaskInfo::new(id, target_uri));
        let sender = Arc::new(sender);
        self.tasks_mut().insert(id, sender.clone());

        std::thread::spawn(move || {
            let report = |message: &str, done: Option<bool>| {
                sender.send_modify(|info| info.report(message, done));
            };
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker(&report)));
            if outcome.is_err() {
                log::error!("task {} worker panicked", id);
            }

            // worker 没有报告终态就返回时按完成处理；panic 则按失败处理，保留已累计的消息
            sender.send_if_modified(|info| {
                if info.is_done() {
                    return false;
                }
                info.status = if outcome.is_ok() {
                    TaskStatus::Finished
                } else {
                    TaskStatus::Failed
                };
                info.updated_at = Utc::now();
                true
            });
        });

        id
    }

    pub fn lookup(&self, id: TaskId) -> Result<TaskInfo> {
        let tasks = self.tasks_mut();
        let sender = tasks.get(&id).ok_or(UpdateError::TaskNotFound(id))?;
        let info = sender.borrow().clone();
        Ok(info)
    }

    /// 订阅任务的每一次更新
    pub fn watch(&self, id: TaskId) -> Result<watch::Receiver<TaskInfo>> {
        let tasks = self.tasks_mut();
        let sender = tasks.get(&id).ok_or(UpdateError::TaskNotFound(id))?;
        Ok(sender.subscribe())
    }

    /// 等待任务进入终态
    pub async fn wait(&self, id: TaskId) -> Result<TaskInfo> {
        let mut rx = self.watch(id)?;
        let info = rx
            .wait_for(TaskInfo::is_done)
            .await
            .map_err(|e| UpdateError::OperationFailed(format!("task {}: {}", id, e)))?;
        Ok(info.clone())
    }

    /// 从任务表中移除任务并返回其最后状态；已订阅的接收端不受影响
    pub fn remove(&self, id: TaskId) -> Result<TaskInfo> {
        let sender = self
            .tasks_mut()
            .remove(&id)
            .ok_or(UpdateError::TaskNotFound(id))?;
        let info = sender.borrow().clone();
        Ok(info)
    }

    /// 清除所有已进入终态的任务，返回清除数量
    pub fn prune_finished(&self) -> usize {
        let mut tasks = self.tasks_mut();
        let before = tasks.len();
        tasks.retain(|_, sender| !sender.borrow().is_done());
        before - tasks.len()
    }

    fn tasks_mut(&self) -> std::sync::MutexGuard<'_, HashMap<TaskId, Arc<watch::Sender<TaskInfo>>>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
