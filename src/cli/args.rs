//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use crate::logging::{get_default_log_path, LogConfig};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Polaris Config - 分层地图/场景文档的配置协调工具
#[derive(Parser, Debug, Clone)]
#[command(
    name = "polaris-config",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 默认文档路径
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "默认文档路径",
        env = "POLARIS_DOCUMENT",
        global = true
    )]
    pub document: Option<PathBuf>,

    /// 日志级别
    #[arg(
        short,
        long,
        value_enum,
        default_value = "info",
        help = "日志级别",
        env = "POLARIS_LOG_LEVEL",
        global = true
    )]
    pub log_level: LogLevel,

    /// 是否以JSON格式输出日志
    #[arg(long, help = "以JSON格式输出日志", global = true)]
    pub json_logs: bool,

    /// 日志文件路径，设置后日志只写入文件
    #[arg(
        long,
        value_name = "PATH",
        help = "把日志写入指定文件",
        env = "POLARIS_LOG_FILE",
        global = true
    )]
    pub log_file: Option<PathBuf>,

    /// 把日志写入默认日志文件
    #[arg(long, help = "把日志写入默认日志文件", global = true)]
    pub log_to_file: bool,

    /// 模块级别日志，例如 `polaris_config::compare=warn`
    #[arg(
        long = "log-module",
        value_name = "MODULE=LEVEL",
        value_parser = parse_module_level,
        help = "按模块设置日志级别，可重复",
        global = true
    )]
    pub log_modules: Vec<(String, log::LevelFilter)>,

    /// 子命令
    #[command(subcommand)]
    pub command: Commands,
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum LogLevel {
    /// 跟踪级别
    Trace,
    /// 调试级别
    Debug,
    /// 信息级别
    Info,
    /// 警告级别
    Warn,
    /// 错误级别
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// 子命令定义
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// 校验文档
    Validate {
        /// 文档路径
        #[arg(value_name = "FILE", help = "文档路径")]
        file: Option<PathBuf>,

        /// 是否显示详细信息
        #[arg(short, long, help = "显示详细信息")]
        verbose: bool,
    },

    /// 比较两个文档并输出变更事件
    Diff {
        /// 基线文档
        #[arg(value_name = "OLD", help = "基线文档")]
        old: PathBuf,

        /// 新文档
        #[arg(value_name = "NEW", help = "新文档")]
        new: PathBuf,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 输出每个 stage 与 scene 实际包含的 layer
    Inspect {
        /// 文档路径
        #[arg(value_name = "FILE", help = "文档路径")]
        file: Option<PathBuf>,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 将 JSON/TOML 文档规范化为格式化的 JSON
    Convert {
        /// 输入文档
        #[arg(value_name = "INPUT", help = "输入文档")]
        input: PathBuf,

        /// 输出文件
        #[arg(value_name = "OUTPUT", help = "输出文件")]
        output: PathBuf,

        /// 是否覆盖现有文件
        #[arg(short, long, help = "覆盖现有文件")]
        force: bool,
    },

    /// 监控文档文件并持续输出变更事件
    Watch {
        /// 文档路径
        #[arg(value_name = "FILE", help = "文档路径")]
        file: Option<PathBuf>,

        /// 防抖动延迟（毫秒）
        #[arg(
            long,
            value_name = "MILLIS",
            default_value = "300",
            help = "防抖动延迟（毫秒）",
            env = "POLARIS_DEBOUNCE_MS"
        )]
        debounce_ms: u64,
    },

    /// 显示版本信息
    Version {
        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },
}

/// 输出格式枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum OutputFormat {
    /// 文本格式
    Text,
    /// JSON格式
    Json,
}

impl Args {
    /// 解析命令行参数
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// 获取文档路径
    ///
    /// 优先使用子命令参数，其次是 `--document`，最后是默认路径
    pub fn get_document_path(&self, explicit: Option<&PathBuf>) -> PathBuf {
        explicit
            .or(self.document.as_ref())
            .cloned()
            .unwrap_or_else(crate::config::loader::get_default_document_path)
    }

    /// 是否启用详细输出
    pub fn is_verbose(&self) -> bool {
        matches!(self.log_level, LogLevel::Debug | LogLevel::Trace)
    }

    /// 日志文件路径
    ///
    /// `--log-file` 优先，`--log-to-file` 时使用默认路径
    pub fn log_file_path(&self) -> Option<PathBuf> {
        match &self.log_file {
            Some(path) => Some(path.clone()),
            None if self.log_to_file => Some(get_default_log_path()),
            None => None,
        }
    }

    /// 由全局参数构建日志配置
    pub fn log_config(&self) -> LogConfig {
        let file_path = self.log_file_path();
        LogConfig {
            level: self.log_level.clone().into(),
            console: file_path.is_none(),
            file_path,
            json_format: self.json_logs,
            module_levels: self.log_modules.iter().cloned().collect(),
        }
    }
}

/// 解析 `MODULE=LEVEL` 形式的模块日志级别
fn parse_module_level(value: &str) -> Result<(String, log::LevelFilter), String> {
    let (module, level) = value
        .split_once('=')
        .ok_or_else(|| format!("缺少 '=': {value}"))?;
    if module.is_empty() {
        return Err(format!("模块名为空: {value}"));
    }
    let level = level
        .parse::<log::LevelFilter>()
        .map_err(|e| format!("无效的日志级别 {level}: {e}"))?;
    Ok((module.to_string(), level))
}
