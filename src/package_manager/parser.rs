//! 输出解析函数
//!
//! 这些解析依赖包管理器的文本格式（标记行、列位置），包管理器输出格式变化
//! 会直接导致解析失败；标记字符串必须保持原样。

use super::types::PackageRecord;
use crate::error::{Result, UpdateError};

/// yum 详细模式 dry-run 输出中依赖表开始的标记行
pub const YUM_DEPS_MARKER: &str = "Dependencies Resolved";
/// dnf 的同一标记（大小写与句号均不同）
pub const DNF_DEPS_MARKER: &str = "Dependencies resolved.";
pub const TRANSACTION_SUMMARY: &str = "Transaction Summary";
/// 标记行之后的表头行数
pub const YUM_HEADER_LINES: usize = 5;
pub const DNF_HEADER_LINES: usize = 3;

/// 保留首次出现顺序去重
fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = Vec::with_capacity(items.len());
    for item in items {
        if !seen.contains(&item) {
            seen.push(item);
        }
    }
    seen
}

// ========== yum / dnf ==========

/// 解析 `yum check-update -d0` 输出为可更新包名列表
///
/// 遇到 "Obsoleting " 段即停止；只保留恰好三列且首列含 `.` 的行
/// （`name.arch  version  repo`）。
pub fn parse_check_update(output: &str) -> Vec<String> {
    let mut packages = Vec::new();

    for line in output.lines() {
        if line.contains("Obsoleting ") {
            break;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != 3 {
            continue;
        }
        if let Some((name, _arch)) = tokens[0].rsplit_once('.') {
            packages.push(name.to_string());
        }
    }

    dedup(packages)
}

/// 解析 `yum|dnf -v --assumeno update <name>` 的依赖表
///
/// 在 `marker` 与 "Transaction Summary" 之间、跳过 `header_lines` 行表头后，
/// 每个至少五列的数据行：首列等于 `name` 的行是目标包
/// `{name, arch, version, repository}`，其余行的首列都是依赖。
pub fn parse_dry_run(
    name: &str,
    output: &str,
    marker: &str,
    header_lines: usize,
) -> Result<PackageRecord> {
    let lines: Vec<&str> = output.lines().collect();

    let start = lines
        .iter()
        .position(|l| l.trim_end() == marker)
        .ok_or_else(|| UpdateError::not_found(name, format!("'{}' not in output", marker)))?;
    let rest = &lines[start + 1..];
    let end = rest
        .iter()
        .position(|l| l.trim_end() == TRANSACTION_SUMMARY)
        .ok_or_else(|| {
            UpdateError::not_found(name, format!("'{}' not in output", TRANSACTION_SUMMARY))
        })?;
    let table = rest.get(header_lines..end).unwrap_or(&[]);

    let mut record: Option<PackageRecord> = None;
    let mut depends = Vec::new();
    for line in table {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < 5 {
            continue;
        }
        if cols[0] == name {
            record = Some(PackageRecord {
                package_name: cols[0].to_string(),
                arch: cols[1].to_string(),
                version: cols[2].to_string(),
                repository: cols[3].to_string(),
                depends: Vec::new(),
            });
        } else {
            depends.push(cols[0].to_string());
        }
    }

    let mut record =
        record.ok_or_else(|| UpdateError::not_found(name, "not in transaction"))?;
    record.depends = dedup(depends);
    Ok(record)
}

/// 从 yum.conf 的 `[main]` 段读取 `logfile`
pub fn parse_yum_conf_logfile(content: &str) -> Option<String> {
    let mut in_main = false;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') {
            in_main = line.trim_matches(|c| c == '[' || c == ']').trim() == "main";
            continue;
        }
        if !in_main {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == "logfile" {
                let value = value.trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

// ========== zypper ==========

/// 解析 `zypper list-updates`：`v | 仓库 | 包名 | 当前版本 | 可用版本 | 架构`
pub fn parse_zypper_list_updates(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.starts_with("v |"))
        .filter_map(|line| line.split(" | ").nth(2))
        .map(|name| name.trim().to_string())
        .collect()
}

/// 解析 `zypper info --requires <name>`
///
/// zypper 找不到包时仍返回 0 且 stderr 为空，只能从输出中识别。
pub fn parse_zypper_info(name: &str, output: &str) -> Result<PackageRecord> {
    let lines: Vec<&str> = output.split('\n').collect();

    let missing = format!("package '{}' not found.", name);
    if lines.iter().any(|l| *l == missing) {
        return Err(UpdateError::not_found(name, missing));
    }

    let field = |token: &str| -> String {
        lines
            .iter()
            .find(|l| l.starts_with(token))
            .and_then(|l| l.split(": ").nth(1))
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    };

    let mut package_name = field("Name:");
    if package_name.is_empty() {
        package_name = name.to_string();
    }

    // `Requires:` 之后直到倒数第二行
    let mut depends = Vec::new();
    if let Some(idx) = lines.iter().position(|l| *l == "Requires:") {
        let end = lines.len().saturating_sub(1).max(idx + 1);
        for line in &lines[idx + 1..end] {
            let line = line.trim();
            if line.is_empty() || line.contains(".so") || line.starts_with('/') {
                continue;
            }
            let dep = if line.contains("python(abi)") {
                "python-base"
            } else {
                line.split_whitespace().next().unwrap_or_default()
            };
            depends.push(dep.to_string());
        }
    }

    Ok(PackageRecord {
        package_name,
        version: field("Version:"),
        arch: field("Arch:"),
        repository: field("Repository:"),
        depends: dedup(depends),
    })
}

// ========== apt ==========

/// 解析 `apt-get -s upgrade` 中的 `Inst` 行
///
/// `Inst name [旧版本] (新版本 来源[, 来源...] [架构])`，依赖留空由调用方补齐。
pub fn parse_apt_simulation(output: &str) -> Vec<PackageRecord> {
    output
        .lines()
        .filter_map(|line| line.strip_prefix("Inst "))
        .filter_map(parse_apt_inst)
        .collect()
}

fn parse_apt_inst(rest: &str) -> Option<PackageRecord> {
    let name = rest.split_whitespace().next()?;
    let open = rest.find('(')?;
    let close = open + rest[open..].find(')')?;
    let inner = rest[open + 1..close].trim();

    let (body, arch) = match inner.rfind('[') {
        Some(pos) => (
            inner[..pos].trim(),
            inner[pos + 1..].trim_end_matches(']').trim(),
        ),
        None => (inner, ""),
    };
    let (version, origins) = body.split_once(' ').unwrap_or((body, ""));
    let repository = origins.split(',').next().unwrap_or_default().trim();

    Some(PackageRecord {
        package_name: name.to_string(),
        version: version.to_string(),
        arch: arch.to_string(),
        repository: repository.to_string(),
        depends: Vec::new(),
    })
}

/// 解析 `apt-cache depends --important <name>` 的 Depends / PreDepends 行
///
/// 虚包 `<...>` 会被丢弃。
pub fn parse_apt_depends(output: &str) -> Vec<String> {
    let mut depends = Vec::new();
    for line in output.lines() {
        let line = line.trim().trim_start_matches('|');
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if key != "Depends" && key != "PreDepends" {
            continue;
        }
        let value = value.trim();
        if value.is_empty() || value.starts_with('<') {
            continue;
        }
        depends.push(value.to_string());
    }
    dedup(depends)
}
