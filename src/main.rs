//! Polaris Config 主程序入口
//!
//! 分层地图/场景文档的配置协调工具

use anyhow::{Context, Result};
use clap::Parser;
use polaris_config::cli::args::{Args, Commands};
use polaris_config::cli::commands::{
    Command, ConvertCommand, DiffCommand, InspectCommand, ValidateCommand, VersionCommand,
    WatchCommand,
};
use polaris_config::logging::LoggingSystem;
use tracing::{debug, error};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    // 初始化日志系统
    let _logging_system =
        LoggingSystem::setup_logging(args.log_config()).context("初始化日志系统失败")?;

    debug!("Polaris Config v{} 启动", polaris_config::VERSION);

    // 执行命令
    if let Err(e) = execute_command(&args).await {
        error!("命令执行失败: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// 执行CLI命令
async fn execute_command(args: &Args) -> Result<()> {
    let command: Box<dyn Command> = match &args.command {
        Commands::Validate { .. } => Box::new(ValidateCommand),
        Commands::Diff { .. } => Box::new(DiffCommand),
        Commands::Inspect { .. } => Box::new(InspectCommand),
        Commands::Convert { .. } => Box::new(ConvertCommand),
        Commands::Watch { .. } => Box::new(WatchCommand),
        Commands::Version { .. } => Box::new(VersionCommand),
    };

    command.execute(args).await.map_err(|e| anyhow::anyhow!(e))
}
