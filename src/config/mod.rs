//! 文档模型与配置引擎模块
//!
//! 提供文档解析、校验、差异计算、基线管理和文件热重载功能

pub mod diff;
pub mod index;
pub mod loader;
pub mod manager;
pub mod types;
pub mod validator;
pub mod watcher;

// 重新导出主要类型
pub use diff::{diff_documents, diff_indexed};
pub use index::DocumentIndex;
pub use loader::{get_default_document_path, DocumentFormat, DocumentLoader, FileDocumentLoader};
pub use manager::ConfigManager;
pub use types::{Collection, DataStub, Document, Entity, Layer, LayerSelection, Scene, Stage};
pub use validator::validate_document;
pub use watcher::{DocumentReloadEvent, DocumentWatcher};
