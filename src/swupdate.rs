//! 软件更新协调：列出 / 描述 / 升级，依赖闭包解析，任务启动

use crate::config::Config;
use crate::error::{Result, UpdateError};
use crate::guard::BackendLock;
use crate::package_manager::{self, Backend, PackageRecord, ProgressTailer};
use crate::tasks::{TaskId, TaskRegistry};
use std::sync::Arc;

/// 包名会原样拼到包管理器命令行上，不能为空也不能像选项
fn validate_package_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(UpdateError::InvalidParameter("empty package name".to_string()));
    }
    if name.starts_with('-') || name.chars().any(char::is_whitespace) {
        return Err(UpdateError::InvalidParameter(format!(
            "invalid package name '{}'",
            name
        )));
    }
    Ok(())
}

/// 依赖闭包：目标包在前，然后按依赖列表原顺序深度优先展开，
/// 只纳入本身也在可更新集合中的依赖。已在闭包中的包不再展开（环在此处静默截断）。
pub fn resolve_dependency_closure<F>(
    name: &str,
    updatable: &[String],
    mut depends_of: F,
) -> Result<Vec<String>>
where
    F: FnMut(&str) -> Result<Vec<String>>,
{
    fn visit<F>(
        name: &str,
        updatable: &[String],
        depends_of: &mut F,
        closure: &mut Vec<String>,
    ) -> Result<()>
    where
        F: FnMut(&str) -> Result<Vec<String>>,
    {
        closure.push(name.to_string());
        for dep in depends_of(name)? {
            if !updatable.contains(&dep) || closure.contains(&dep) {
                continue;
            }
            visit(&dep, updatable, depends_of, closure)?;
        }
        Ok(())
    }

    let mut closure = Vec::new();
    visit(name, updatable, &mut depends_of, &mut closure)?;
    Ok(closure)
}

/// 对外暴露的更新操作集合
///
/// 选中的包管理器在构造时注入，整个进程生命周期共享；没有可用包管理器时
/// 所有操作都返回 `NoCompatibleManager`。
pub struct SoftwareUpdate {
    backend: Option<Arc<dyn Backend>>,
    guard: Arc<BackendLock>,
    tasks: Arc<TaskRegistry>,
    tailer: ProgressTailer,
}

impl SoftwareUpdate {
    pub fn new(
        backend: Option<Arc<dyn Backend>>,
        guard: Arc<BackendLock>,
        tasks: Arc<TaskRegistry>,
    ) -> Self {
        Self {
            backend,
            guard,
            tasks,
            tailer: ProgressTailer::new(),
        }
    }

    /// 检测主机上的包管理器；检测失败不是构造错误，而是之后每个操作的错误
    pub fn from_host(config: &Config, guard: Arc<BackendLock>, tasks: Arc<TaskRegistry>) -> Self {
        let backend = match package_manager::detect(&config.paths) {
            Ok(backend) => Some(backend),
            Err(e) => {
                log::warn!("{}", e);
                None
            }
        };
        Self::new(backend, guard, tasks)
    }

    #[cfg(test)]
    fn with_tailer(mut self, tailer: ProgressTailer) -> Self {
        self.tailer = tailer;
        self
    }

    pub fn backend(&self) -> Result<&Arc<dyn Backend>> {
        self.backend.as_ref().ok_or(UpdateError::NoCompatibleManager)
    }

    pub fn tasks(&self) -> &Arc<TaskRegistry> {
        &self.tasks
    }

    /// 可更新的包名
    pub fn list_updates(&self) -> Result<Vec<String>> {
        let backend = self.backend()?;
        self.guard.with(|| backend.list_updatable())
    }

    pub fn num_updates(&self) -> Result<usize> {
        Ok(self.list_updates()?.len())
    }

    pub fn describe(&self, name: &str) -> Result<PackageRecord> {
        validate_package_name(name)?;
        let backend = self.backend()?;
        self.guard
            .with(|| backend.describe(name))
            .map_err(|e| e.with_target(name))
    }

    /// 基于当前可更新集合计算 `name` 的依赖闭包；每次调用都重新查询
    pub fn dependency_closure(&self, name: &str) -> Result<Vec<String>> {
        validate_package_name(name)?;
        let updatable = self.list_updates()?;
        resolve_dependency_closure(name, &updatable, |pkg| {
            self.describe(pkg).map(|record| record.depends)
        })
    }

    /// 升级 `name` 及其依赖闭包；立即返回任务 ID，升级在任务线程中进行
    pub fn upgrade(&self, name: &str) -> Result<TaskId> {
        let backend = self.idle_backend()?;
        let packages = self
            .dependency_closure(name)
            .map_err(|e| e.with_target(name))?;
        log::debug!(
            "The following packages will be updated: {}",
            packages.join(", ")
        );

        let argv = backend.update_command(Some(&packages));
        let tailer = self.tailer.clone();
        Ok(self.tasks.start(
            format!("/host/packagesupdate/{}/upgrade", name),
            move |progress| {
                tailer.drive(Some(packages), &argv, progress);
            },
        ))
    }

    /// 升级全部可更新的包
    pub fn swupdate(&self) -> Result<TaskId> {
        let backend = self.idle_backend()?;
        let argv = backend.update_command(None);
        let tailer = self.tailer.clone();
        Ok(self.tasks.start("/host/swupdate", move |progress| {
            tailer.drive(None, &argv, progress);
        }))
    }

    /// 接管一个不是本进程启动的更新的进度
    pub fn tail_progress(&self) -> Result<TaskId> {
        let backend = self.backend()?.clone();
        let tailer = self.tailer.clone();
        Ok(self.tasks.start("/host/swupdateprogress", move |progress| {
            tailer.tail(backend.as_ref(), progress);
        }))
    }

    fn idle_backend(&self) -> Result<Arc<dyn Backend>> {
        let backend = self.backend()?;
        package_manager::ensure_idle(backend.as_ref())?;
        Ok(backend.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package_manager::BackendKind;
    use crate::tasks::TaskStatus;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn record(name: &str, depends: &[&str]) -> PackageRecord {
        PackageRecord {
            package_name: name.to_string(),
            version: "1.0".to_string(),
            arch: "noarch".to_string(),
            repository: "updates".to_string(),
            depends: depends.iter().map(|d| d.to_string()).collect(),
        }
    }

    /// 内存中的包管理器；升级命令只是回显包名
    struct MemoryBackend {
        packages: BTreeMap<String, PackageRecord>,
        updatable: Vec<String>,
        running: AtomicBool,
        unreachable: AtomicBool,
    }

    impl MemoryBackend {
        fn new(records: Vec<PackageRecord>) -> Self {
            let updatable = records.iter().map(|r| r.package_name.clone()).collect();
            Self {
                packages: records
                    .into_iter()
                    .map(|r| (r.package_name.clone(), r))
                    .collect(),
                updatable,
                running: AtomicBool::new(false),
                unreachable: AtomicBool::new(false),
            }
        }
    }

    impl Backend for MemoryBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Zypper
        }

        fn list_updatable(&self) -> Result<Vec<String>> {
            package_manager::ensure_idle(self)?;
            if self.unreachable.load(Ordering::SeqCst) {
                return Err(UpdateError::OperationFailed(
                    "repository 'updates' is unreachable".to_string(),
                ));
            }
            Ok(self.updatable.clone())
        }

        fn describe(&self, name: &str) -> Result<PackageRecord> {
            package_manager::ensure_idle(self)?;
            self.packages
                .get(name)
                .cloned()
                .ok_or_else(|| UpdateError::not_found(name, "No package found"))
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }

        fn update_command(&self, packages: Option<&[String]>) -> Vec<String> {
            let mut argv = vec!["echo".to_string(), "updating".to_string()];
            argv.extend(packages.unwrap_or_default().iter().cloned());
            argv
        }

        fn logfile_path(&self) -> Option<PathBuf> {
            None
        }
    }

    fn service(backend: MemoryBackend) -> SoftwareUpdate {
        SoftwareUpdate::new(
            Some(Arc::new(backend)),
            Arc::new(BackendLock::new()),
            Arc::new(TaskRegistry::new()),
        )
        .with_tailer(ProgressTailer::with_interval(Duration::from_millis(1)))
    }

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn closure_is_order_preserving_dfs() {
        let svc = service(MemoryBackend::new(vec![
            record("A", &[]),
            record("B", &[]),
            record("C", &["A", "B"]),
        ]));
        assert_eq!(svc.dependency_closure("C").unwrap(), strings(&["C", "A", "B"]));
    }

    #[test]
    fn closure_without_in_set_dependencies_is_just_the_target() {
        let svc = service(MemoryBackend::new(vec![
            record("udevmountd", &["glibc", "systemd"]),
            record("libzypp", &[]),
        ]));
        assert_eq!(svc.dependency_closure("udevmountd").unwrap(), strings(&["udevmountd"]));
    }

    #[test]
    fn closure_goes_deep_before_wide_and_never_duplicates() {
        let svc = service(MemoryBackend::new(vec![
            record("app", &["lib", "tool"]),
            record("lib", &["core"]),
            record("tool", &["core", "lib"]),
            record("core", &[]),
        ]));
        assert_eq!(
            svc.dependency_closure("app").unwrap(),
            strings(&["app", "lib", "core", "tool"])
        );
    }

    #[test]
    fn closure_cycle_is_silently_truncated() {
        let svc = service(MemoryBackend::new(vec![
            record("a", &["b"]),
            record("b", &["a"]),
        ]));
        assert_eq!(svc.dependency_closure("a").unwrap(), strings(&["a", "b"]));
    }

    #[test]
    fn closure_of_unknown_package_is_not_found() {
        let svc = service(MemoryBackend::new(vec![record("wok", &[])]));
        assert!(matches!(
            svc.dependency_closure("kimchi"),
            Err(UpdateError::NotFound { .. })
        ));
    }

    #[test]
    fn option_like_names_are_invalid() {
        let svc = service(MemoryBackend::new(vec![record("wok", &[])]));
        assert!(matches!(svc.describe("-y"), Err(UpdateError::InvalidParameter(_))));
        assert!(matches!(svc.upgrade(""), Err(UpdateError::InvalidParameter(_))));
    }

    #[test]
    fn every_operation_fails_without_backend() {
        let svc = SoftwareUpdate::new(
            None,
            Arc::new(BackendLock::new()),
            Arc::new(TaskRegistry::new()),
        );
        assert!(matches!(svc.list_updates(), Err(UpdateError::NoCompatibleManager)));
        assert!(matches!(svc.describe("wok"), Err(UpdateError::NoCompatibleManager)));
        assert!(matches!(svc.upgrade("wok"), Err(UpdateError::NoCompatibleManager)));
        assert!(matches!(svc.swupdate(), Err(UpdateError::NoCompatibleManager)));
        assert!(matches!(svc.tail_progress(), Err(UpdateError::NoCompatibleManager)));
    }

    #[test]
    fn queries_and_upgrades_refused_while_running() {
        let backend = MemoryBackend::new(vec![record("wok", &[])]);
        backend.running.store(true, Ordering::SeqCst);
        let svc = service(backend);

        assert!(svc.list_updates().unwrap_err().is_already_running());
        let err = svc.describe("wok").unwrap_err();
        assert!(err.is_already_running());
        assert!(err.to_string().contains("wok"));
        assert!(svc.upgrade("wok").unwrap_err().is_already_running());
        assert!(svc.swupdate().unwrap_err().is_already_running());
    }

    #[test]
    fn upgrade_errors_name_the_target() {
        let backend = MemoryBackend::new(vec![record("wok", &[]), record("ginger", &["wok"])]);
        backend.unreachable.store(true, Ordering::SeqCst);
        let svc = service(backend);

        let err = svc.upgrade("ginger").unwrap_err();
        assert!(matches!(err, UpdateError::OperationFailed(_)));
        assert!(err.to_string().contains("ginger: repository"), "{}", err);
    }

    #[tokio::test]
    async fn upgrade_drives_the_closure_in_a_task() {
        let svc = service(MemoryBackend::new(vec![
            record("wok", &[]),
            record("ginger", &["wok"]),
        ]));
        let id = svc.upgrade("ginger").unwrap();
        let info = svc.tasks().wait(id).await.unwrap();

        assert_eq!(info.status, TaskStatus::Finished);
        assert_eq!(info.message, "updating ginger wok\n");
        assert_eq!(info.target_uri, "/host/packagesupdate/ginger/upgrade");
    }

    #[tokio::test]
    async fn tail_progress_without_update_finishes() {
        let svc = service(MemoryBackend::new(vec![]));
        let id = svc.tail_progress().unwrap();
        let info = svc.tasks().wait(id).await.unwrap();
        assert_eq!(info.status, TaskStatus::Finished);
        assert_eq!(info.message, "");
    }

    #[test]
    fn num_updates_counts_list() {
        let svc = service(MemoryBackend::new(vec![record("a", &[]), record("b", &[])]));
        assert_eq!(svc.num_updates().unwrap(), 2);
    }
}
