//! 文档文件监控模块
//!
//! 监控文档文件变化，防抖后重新加载并广播新文档

use crate::config::loader::{DocumentLoader, FileDocumentLoader};
use crate::config::types::Document;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 文档重新加载事件
#[derive(Debug, Clone)]
pub struct DocumentReloadEvent {
    /// 文档文件路径
    pub path: PathBuf,
    /// 重新加载并校验通过的文档
    pub document: Document,
    /// 加载时间
    pub loaded_at: DateTime<Utc>,
    /// 重载序号，从 1 开始
    pub sequence: u64,
}

/// 文档文件监控器
pub struct DocumentWatcher {
    /// 文档文件路径（规范化后）
    path: PathBuf,
    /// 文件系统监控器
    watcher: Option<RecommendedWatcher>,
    /// 事件处理任务
    task: Option<JoinHandle<()>>,
    /// 文档加载器
    loader: FileDocumentLoader,
    /// 事件发送器
    event_sender: broadcast::Sender<DocumentReloadEvent>,
    /// 防抖动延迟
    debounce_delay: Duration,
}

impl DocumentWatcher {
    /// 创建新的文档监控器
    ///
    /// # 参数
    /// * `path` - 文档文件路径
    /// * `debounce_delay` - 防抖动延迟，在此时间内的连续变更只触发一次重载
    ///
    /// # 返回
    /// * `Result<(Self, broadcast::Receiver<DocumentReloadEvent>)>` - 监控器和事件接收器
    pub fn new<P: AsRef<Path>>(
        path: P,
        debounce_delay: Duration,
    ) -> Result<(Self, broadcast::Receiver<DocumentReloadEvent>)> {
        let path = Self::validate_path(path.as_ref())?;
        let (event_sender, event_receiver) = broadcast::channel(32);

        let watcher = Self {
            path,
            watcher: None,
            task: None,
            loader: FileDocumentLoader::new(true),
            event_sender,
            debounce_delay,
        };

        Ok((watcher, event_receiver))
    }

    /// 检查路径并返回规范化后的绝对路径
    fn validate_path(path: &Path) -> Result<PathBuf> {
        if !path.exists() {
            return Err(anyhow::anyhow!("文档文件不存在: {}", path.display()));
        }

        if !path.is_file() {
            return Err(anyhow::anyhow!("路径不是文件: {}", path.display()));
        }

        let canonical = path
            .canonicalize()
            .with_context(|| format!("无法解析文档路径: {}", path.display()))?;
        debug!("文档路径: {}", canonical.display());
        Ok(canonical)
    }

    /// 启动文档文件监控
    ///
    /// 必须在 tokio 运行时内调用
    pub fn start(&mut self) -> Result<()> {
        info!("启动文档文件监控: {}", self.path.display());

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                // 接收端关闭说明监控已停止
                let _ = tx.send(res);
            },
            notify::Config::default().with_poll_interval(Duration::from_secs(1)),
        )
        .context("创建文件监控器失败")?;

        // 监控所在目录，编辑器常以替换文件的方式保存
        let watch_path = self.path.parent().unwrap_or(&self.path);
        watcher
            .watch(watch_path, RecursiveMode::NonRecursive)
            .with_context(|| format!("监控目录失败: {}", watch_path.display()))?;

        self.watcher = Some(watcher);

        let path = self.path.clone();
        let event_sender = self.event_sender.clone();
        let loader = self.loader.clone();
        let debounce_delay = self.debounce_delay;

        self.task = Some(tokio::spawn(async move {
            Self::handle_file_events(rx, path, event_sender, loader, debounce_delay).await;
        }));

        info!("文档文件监控已启动");
        Ok(())
    }

    /// 处理文件系统事件
    async fn handle_file_events(
        mut rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
        path: PathBuf,
        event_sender: broadcast::Sender<DocumentReloadEvent>,
        loader: FileDocumentLoader,
        debounce_delay: Duration,
    ) {
        let mut sequence = 1u64;

        while let Some(res) = rx.recv().await {
            match res {
                Ok(event) if Self::is_target_file_event(&event, &path) => {
                    debug!("检测到文档变更事件: {:?}", event.kind);
                }
                Ok(_) => continue,
                Err(e) => {
                    error!("文件监控事件错误: {}", e);
                    continue;
                }
            }

            // 吸收防抖窗口内的后续事件，确保文件写入完成
            loop {
                match tokio::time::timeout(debounce_delay, rx.recv()).await {
                    Ok(Some(_)) => debug!("跳过重复事件（防抖动）"),
                    Ok(None) => return,
                    Err(_) => break,
                }
            }

            match Self::reload(&loader, &path, sequence).await {
                Ok(reload_event) => {
                    info!("文档重载成功，序号: {}", sequence);
                    sequence += 1;

                    if event_sender.send(reload_event).is_err() {
                        warn!("没有文档重载事件的接收者");
                    }
                }
                Err(e) => {
                    error!("文档重载失败，保留上一版本: {:#}", e);
                }
            }
        }
    }

    /// 检查是否是目标文件的事件
    fn is_target_file_event(event: &Event, target: &Path) -> bool {
        match &event.kind {
            EventKind::Modify(_) | EventKind::Create(_) => event
                .paths
                .iter()
                .any(|path| path == target || path.file_name() == target.file_name()),
            _ => false,
        }
    }

    /// 重新加载文档
    async fn reload(
        loader: &FileDocumentLoader,
        path: &Path,
        sequence: u64,
    ) -> Result<DocumentReloadEvent> {
        debug!("重新加载文档: {}", path.display());

        let document = loader
            .load_from_file(path)
            .await
            .context("重新加载文档失败")?;

        Ok(DocumentReloadEvent {
            path: path.to_path_buf(),
            document,
            loaded_at: Utc::now(),
            sequence,
        })
    }

    /// 被监控的文档路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 是否正在监控
    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    /// 订阅文档重载事件
    pub fn subscribe(&self) -> broadcast::Receiver<DocumentReloadEvent> {
        self.event_sender.subscribe()
    }

    /// 停止监控
    pub fn stop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            drop(watcher);
            info!("文档文件监控已停止");
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for DocumentWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
