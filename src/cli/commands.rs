//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{
    diff_documents, ConfigManager, Document, DocumentIndex, DocumentLoader, DocumentWatcher,
    FileDocumentLoader,
};
use crate::error::{PolarisError, Result};
use crate::events::ChangeEvent;
use async_trait::async_trait;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// 命令处理器trait
///
/// `watch` 在等待期间持有单线程的引擎，因此 future 不要求 `Send`
#[async_trait(?Send)]
pub trait Command {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 版本命令
pub struct VersionCommand;

#[async_trait(?Send)]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Version { format } = &args.command {
            match format {
                OutputFormat::Json => {
                    let version_info = json!({
                        "name": crate::APP_NAME,
                        "version": crate::VERSION,
                        "description": crate::APP_DESCRIPTION
                    });
                    println!("{}", serde_json::to_string_pretty(&version_info)?);
                }
                OutputFormat::Text => {
                    println!("{} v{}", crate::APP_NAME, crate::VERSION);
                    println!("{}", crate::APP_DESCRIPTION);
                }
            }
        }
        Ok(())
    }
}

/// 校验命令
pub struct ValidateCommand;

#[async_trait(?Send)]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate { file, verbose } = &args.command {
            let path = args.get_document_path(file.as_ref());
            self.validate_document_file(&path, *verbose || args.is_verbose())
                .await
        } else {
            Ok(())
        }
    }
}

impl ValidateCommand {
    /// 校验文档文件
    async fn validate_document_file(&self, path: &Path, verbose: bool) -> Result<()> {
        println!("校验文档: {}", path.display());

        let loader = FileDocumentLoader::new(true);
        let document = loader.load_from_file(path).await?;

        println!("✓ 文档校验通过（版本 {}）", document.version);
        println!(
            "✓ {} 个 layer，{} 个 stage，{} 个 scene，{} 个 dataStub",
            document.layers.len(),
            document.stages.len(),
            document.scenes.len(),
            document.data_stubs.len()
        );

        if verbose {
            println!("全局配置键: {}", keys_of(&document.app));
            for layer in &document.layers {
                println!("  layer {} ({}) [{}]", layer.id, layer.name, layer.class);
            }
            for stage in &document.stages {
                println!("  stage {} ({}) layers={}", stage.id, stage.name, stage.layers);
            }
            for scene in &document.scenes {
                println!(
                    "  scene {} ({}) stage={} layers={}",
                    scene.id, scene.name, scene.stage, scene.layers
                );
            }
        }

        Ok(())
    }
}

fn keys_of(map: &serde_json::Map<String, serde_json::Value>) -> String {
    map.keys().cloned().collect::<Vec<_>>().join(", ")
}

/// 差异命令
pub struct DiffCommand;

#[async_trait(?Send)]
impl Command for DiffCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Diff { old, new, format } = &args.command {
            let loader = FileDocumentLoader::new(true);
            let old_document = loader.load_from_file(old).await?;
            let new_document = loader.load_from_file(new).await?;

            let events = diff_documents(&old_document, &new_document)
                .map_err(crate::error::LoadError::from)?;
            println!("{}", render_events(&events, *format)?);
        }
        Ok(())
    }
}

/// 将事件列表渲染为文本或 JSON
pub fn render_events(events: &[ChangeEvent], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(events)?),
        OutputFormat::Text if events.is_empty() => Ok("无变更".to_string()),
        OutputFormat::Text => Ok(events
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

/// 查看命令
pub struct InspectCommand;

#[async_trait(?Send)]
impl Command for InspectCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Inspect { file, format } = &args.command {
            let path = args.get_document_path(file.as_ref());
            let document = FileDocumentLoader::new(true).load_from_file(&path).await?;
            println!("{}", render_membership(&document, *format)?);
        }
        Ok(())
    }
}

/// 渲染每个 stage 与 scene 解析后的 layer 列表，以及每个 layer 所属的 stage
pub fn render_membership(document: &Document, format: OutputFormat) -> Result<String> {
    let index = DocumentIndex::build(document).map_err(crate::error::LoadError::from)?;

    let stages: Vec<(&str, Vec<&str>)> = document
        .stages
        .iter()
        .map(|stage| {
            let layers = index.stage_layers(&stage.id).unwrap_or_default();
            (stage.id.as_str(), layers)
        })
        .collect();
    let scenes: Vec<(&str, Vec<&str>)> = document
        .scenes
        .iter()
        .map(|scene| {
            let layers = index.scene_layers(&scene.id).unwrap_or_default();
            (scene.id.as_str(), layers)
        })
        .collect();
    let owners: Vec<(&str, Option<&str>)> = document
        .layers
        .iter()
        .map(|layer| (layer.id.as_str(), index.owning_stage(&layer.id)))
        .collect();

    match format {
        OutputFormat::Json => {
            let value = json!({
                "stages": stages.iter().map(|(id, layers)| json!({"id": id, "layers": layers})).collect::<Vec<_>>(),
                "scenes": scenes.iter().map(|(id, layers)| json!({"id": id, "layers": layers})).collect::<Vec<_>>(),
                "layers": owners.iter().map(|(id, stage)| json!({"id": id, "stage": stage})).collect::<Vec<_>>(),
            });
            Ok(serde_json::to_string_pretty(&value)?)
        }
        OutputFormat::Text => {
            let mut lines = Vec::with_capacity(stages.len() + scenes.len() + owners.len());
            for (id, layers) in &stages {
                lines.push(format!("stage {id}: {}", layers.join(", ")));
            }
            for (id, layers) in &scenes {
                lines.push(format!("scene {id}: {}", layers.join(", ")));
            }
            for (id, stage) in &owners {
                lines.push(format!("layer {id} -> {}", stage.unwrap_or("-")));
            }
            Ok(lines.join("\n"))
        }
    }
}

/// 转换命令
pub struct ConvertCommand;

#[async_trait(?Send)]
impl Command for ConvertCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Convert {
            input,
            output,
            force,
        } = &args.command
        {
            self.convert_document(input, output, *force).await
        } else {
            Ok(())
        }
    }
}

impl ConvertCommand {
    /// 读取 JSON/TOML 文档并写出格式化的 JSON
    async fn convert_document(&self, input: &Path, output: &Path, force: bool) -> Result<()> {
        if output.exists() && !force {
            return Err(PolarisError::Other(anyhow::anyhow!(
                "输出文件已存在: {}，使用 --force 参数覆盖现有文件",
                output.display()
            )));
        }

        let document = FileDocumentLoader::new(true).load_from_file(input).await?;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(&document)?;
        tokio::fs::write(output, content + "\n").await?;

        println!("已写出: {}", output.display());
        Ok(())
    }
}

/// 监控命令
pub struct WatchCommand;

#[async_trait(?Send)]
impl Command for WatchCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Watch { file, debounce_ms } = &args.command {
            let path = args.get_document_path(file.as_ref());
            self.watch_document(&path, Duration::from_millis(*debounce_ms))
                .await
        } else {
            Ok(())
        }
    }
}

impl WatchCommand {
    /// 以文件初始化引擎，之后每次重载都交给 `set_config`
    async fn watch_document(&self, path: &Path, debounce_delay: Duration) -> Result<()> {
        let document = FileDocumentLoader::new(true).load_from_file(path).await?;

        let manager = ConfigManager::new();
        manager.subscribe_all(|event| println!("{event}"));
        manager.init(&document)?;

        let (mut watcher, mut receiver) =
            DocumentWatcher::new(path, debounce_delay).map_err(PolarisError::Other)?;
        watcher.start().map_err(PolarisError::Other)?;

        info!("正在监控 {}，按 Ctrl+C 退出", path.display());

        loop {
            tokio::select! {
                received = receiver.recv() => match received {
                    Ok(reload) => match manager.set_config(&reload.document) {
                        Ok(revision) => info!("已应用第 {} 次重载，修订号: {}", reload.sequence, revision),
                        Err(e) => warn!("拒绝第 {} 次重载，保留当前基线: {}", reload.sequence, e),
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("跳过了 {} 个过期的重载事件", skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("收到中断信号，停止监控");
                    break;
                }
            }
        }

        watcher.stop();
        Ok(())
    }
}
