use anyhow::{bail, Context, Result};
use host_swupdate::{BackendLock, Config, SoftwareUpdate, TaskId, TaskRegistry, TaskStatus};
use std::io::Write;
use std::sync::Arc;

const USAGE: &str = "\
用法: host-swupdate <命令>

  list            列出可更新的包
  count           可更新的包数量
  describe NAME   包详情（JSON）
  deps NAME       升级 NAME 时会一起升级的包
  upgrade NAME    升级 NAME 及其依赖
  update-all      升级全部
  progress        接管正在进行的更新并输出进度";

/// 输出任务消息中尚未打印的部分，直到任务结束
async fn follow(tasks: &TaskRegistry, id: TaskId) -> Result<TaskStatus> {
    let mut rx = tasks.watch(id)?;
    let mut printed = 0;
    let mut stdout = std::io::stdout();
    loop {
        let info = rx.borrow_and_update().clone();
        // 消息只会增长；万一被重置则从头输出
        let delta = info.message.get(printed..).unwrap_or(info.message.as_str());
        stdout.write_all(delta.as_bytes())?;
        stdout.flush()?;
        printed = info.message.len();

        if info.is_done() {
            return Ok(info.status);
        }
        if rx.changed().await.is_err() {
            return Ok(tasks.lookup(id)?.status);
        }
    }
}

fn required<'a>(arg: Option<&'a String>, cmd: &str) -> Result<&'a str> {
    match arg {
        Some(name) => Ok(name.as_str()),
        None => bail!("{} 需要包名参数\n\n{}", cmd, USAGE),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    // 加载配置
    let config = Config::load_or_default().context("加载配置失败")?;
    let tasks = Arc::new(TaskRegistry::new());
    let swupdate = SoftwareUpdate::from_host(&config, Arc::new(BackendLock::new()), tasks.clone());

    let task = match command.as_str() {
        "list" => {
            for name in swupdate.list_updates()? {
                println!("{}", name);
            }
            None
        }
        "count" => {
            println!("{}", swupdate.num_updates()?);
            None
        }
        "describe" => {
            let record = swupdate.describe(required(args.get(1), command)?)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            None
        }
        "deps" => {
            let closure = swupdate.dependency_closure(required(args.get(1), command)?)?;
            println!("{}", closure.join(" "));
            None
        }
        "upgrade" => Some(swupdate.upgrade(required(args.get(1), command)?)?),
        "update-all" => Some(swupdate.swupdate()?),
        "progress" => Some(swupdate.tail_progress()?),
        other => bail!("未知命令: {}\n\n{}", other, USAGE),
    };

    if let Some(id) = task {
        let status = follow(&tasks, id).await?;
        tasks.remove(id)?;
        println!();
        if status == TaskStatus::Failed {
            bail!("更新失败");
        }
    }

    Ok(())
}
