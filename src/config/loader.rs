//! 文档加载器实现
//!
//! 提供 JSON/TOML 文档解析、环境变量替换和加载时校验

use crate::config::types::Document;
use crate::config::validator::validate_document;
use crate::error::{LoadError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};

/// 文档文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Toml,
}

impl DocumentFormat {
    /// 根据扩展名判断格式（不区分大小写）
    pub fn from_path(path: &Path) -> std::result::Result<Self, LoadError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("json") => Ok(DocumentFormat::Json),
            Some("toml") => Ok(DocumentFormat::Toml),
            _ => Err(LoadError::UnsupportedFormat {
                path: path.to_string_lossy().to_string(),
            }),
        }
    }
}

/// 文档加载器trait，定义文档加载接口
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// 从文件加载文档，格式由扩展名决定
    ///
    /// # 参数
    /// * `path` - 文档文件路径
    ///
    /// # 返回
    /// * `Result<Document>` - 加载并校验通过的文档
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Document>;

    /// 从字符串加载文档
    ///
    /// # 参数
    /// * `content` - 文档内容
    /// * `format` - 文档格式
    ///
    /// # 返回
    /// * `Result<Document>` - 加载并校验通过的文档
    async fn load_from_string(&self, content: &str, format: DocumentFormat) -> Result<Document>;

    /// 校验文档
    fn validate(&self, document: &Document) -> Result<()>;
}

/// 基于文件的文档加载器
#[derive(Debug, Clone)]
pub struct FileDocumentLoader {
    /// 是否启用环境变量替换
    enable_env_substitution: bool,
}

impl Default for FileDocumentLoader {
    fn default() -> Self {
        Self::new(true)
    }
}

impl FileDocumentLoader {
    /// 创建新的文档加载器
    ///
    /// # 参数
    /// * `enable_env_substitution` - 是否启用 `${VAR}` 环境变量替换
    pub fn new(enable_env_substitution: bool) -> Self {
        Self {
            enable_env_substitution,
        }
    }

    /// 替换字符串中的 `${VAR}` 环境变量
    ///
    /// 变量未定义时返回 [`LoadError::EnvVar`]
    fn substitute_env_vars(&self, content: &str) -> std::result::Result<String, LoadError> {
        if !self.enable_env_substitution {
            return Ok(content.to_string());
        }

        let env_var_regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| LoadError::Parse(format!("正则表达式错误: {}", e)))?;

        let mut result = String::with_capacity(content.len());
        let mut last_end = 0;

        for captures in env_var_regex.captures_iter(content) {
            let Some(full_match) = captures.get(0) else {
                continue;
            };
            let var_name = &captures[1];

            let value = std::env::var(var_name).map_err(|_| LoadError::EnvVar {
                var: var_name.to_string(),
            })?;

            result.push_str(&content[last_end..full_match.start()]);
            result.push_str(&value);
            last_end = full_match.end();
        }

        result.push_str(&content[last_end..]);
        Ok(result)
    }

    /// 解析文档内容
    fn parse(
        &self,
        content: &str,
        format: DocumentFormat,
    ) -> std::result::Result<Document, LoadError> {
        let processed_content = self.substitute_env_vars(content)?;

        match format {
            DocumentFormat::Json => serde_json::from_str(&processed_content)
                .map_err(|e| LoadError::Parse(format!("JSON解析失败: {}", e))),
            DocumentFormat::Toml => toml::from_str(&processed_content)
                .map_err(|e| LoadError::Parse(format!("TOML解析失败: {}", e))),
        }
    }
}

#[async_trait]
impl DocumentLoader for FileDocumentLoader {
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Document> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(LoadError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            }
            .into());
        }

        let format = DocumentFormat::from_path(path)?;

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LoadError::Parse(format!("读取文件失败: {}", e)))?;

        let document = self.parse(&content, format)?;
        self.validate(&document)?;

        tracing::info!("成功加载文档: {}", path.display());
        tracing::debug!(
            "文档版本 {}，{} layers，{} stages，{} scenes",
            document.version,
            document.layers.len(),
            document.stages.len(),
            document.scenes.len()
        );

        Ok(document)
    }

    async fn load_from_string(&self, content: &str, format: DocumentFormat) -> Result<Document> {
        let document = self.parse(content, format)?;
        self.validate(&document)?;

        tracing::debug!("成功解析文档字符串");

        Ok(document)
    }

    fn validate(&self, document: &Document) -> Result<()> {
        validate_document(document).map_err(|e| LoadError::Validation(e).into())
    }
}

/// 获取默认文档路径
///
/// 当前目录存在 `polaris.json` 时使用它，否则使用用户配置目录下的
/// `polaris/polaris.json`
pub fn get_default_document_path() -> PathBuf {
    let local = PathBuf::from("polaris.json");
    if local.exists() {
        return local;
    }

    dirs::config_dir()
        .map(|config_dir| config_dir.join("polaris").join("polaris.json"))
        .unwrap_or(local)
}
