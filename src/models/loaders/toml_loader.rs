use crate::models::profile::CandidateProfile;
use crate::models::target::{Target, TargetList};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 从单个 TOML 文件加载目标列表
pub async fn load_targets_file(toml_file_path: &Path) -> Result<TargetList> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let mut list: TargetList = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    list.file_path = Some(toml_file_path.to_string_lossy().to_string());

    Ok(list)
}

/// 从文件夹中加载所有 TOML 文件中的目标
///
/// 文件按文件名排序后依次读取；同一 id 只保留第一次出现的目标
pub async fn load_all_targets(folder_path: &str) -> Result<Vec<Target>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut toml_files = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml_files.push(path);
        }
    }
    toml_files.sort();

    let mut seen = HashSet::new();
    let mut targets = Vec::new();

    for path in toml_files {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_targets_file(&path).await {
            Ok(list) => {
                let before = targets.len();
                for target in list.targets {
                    if seen.insert(target.id.clone()) {
                        targets.push(target);
                    } else {
                        tracing::warn!("重复的目标 ID，已忽略: {}", target.id);
                    }
                }
                tracing::info!("成功加载 {} 个目标", targets.len() - before);
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {}", path.display(), e);
            }
        }
    }

    Ok(targets)
}

/// 加载申请人资料
pub async fn load_profile(profile_path: &Path) -> Result<CandidateProfile> {
    let content = fs::read_to_string(profile_path)
        .await
        .with_context(|| format!("无法读取资料文件: {}", profile_path.display()))?;

    let profile: CandidateProfile = toml::from_str(&content)
        .with_context(|| format!("无法解析资料文件: {}", profile_path.display()))?;

    Ok(profile)
}
