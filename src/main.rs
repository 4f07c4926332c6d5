//! Commit Notifier CLI
//!
//! 从版本控制钩子调用：commit / propchange / lock / unlock

use clap::{Parser, Subcommand};
use commit_notifier::cli::{
    describe_summary, format_output, handle_event, read_stdin, CommitArgs, EventRequest,
    LockArgs, PropchangeArgs,
};
use commit_notifier::NotifyError;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "cnotify")]
#[command(about = "Commit Notifier - 把版本控制事件渲染为通知并投递")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 提交后通知（post-commit 钩子）
    Commit(CommitArgs),
    /// 修订属性变更通知，旧值从标准输入读取（post-revprop-change 钩子）
    Propchange(PropchangeArgs),
    /// 加锁通知，路径列表从标准输入读取（post-lock 钩子）
    Lock(LockArgs),
    /// 解锁通知，路径列表从标准输入读取（post-unlock 钩子）
    Unlock(LockArgs),
}

fn run(command: Commands) -> Result<(), NotifyError> {
    let request = match command {
        Commands::Commit(args) => EventRequest::commit(args),
        Commands::Propchange(args) => EventRequest::propchange(args)?,
        Commands::Lock(args) => EventRequest::lock(args, true),
        Commands::Unlock(args) => EventRequest::lock(args, false),
    };
    let json = request.common.json;

    let stdin = read_stdin(&request)?;
    let summary = handle_event(request, stdin)?;

    match format_output(&summary, json) {
        Some(text) => println!("{}", text),
        None => info!("{}", describe_summary(&summary)),
    }
    Ok(())
}

fn main() {
    // 日志写到 stderr，stdout 留给标准输出渠道
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("commit_notifier=info,cnotify=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli.command) {
        error!(exit_code = e.exit_code(), "Notification run failed");
        eprintln!("{}", e);
        std::process::exit(e.exit_code());
    }
}
