use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::task::JoinHandle;
use tracing::{Level, warn};

use agent_chain::config::Workflow;
use agent_chain::engine::{
    RunOutcome, StatusLabel, StepDetail, WorkflowOrchestrator, WorkflowSnapshot, detail, project,
};
use agent_chain::invoker::HttpInvoker;
use agent_chain::telemetry::{self, LogFormat, LogOptions};
use agent_chain::transfer::{TransferClient, UploadStatus};

#[derive(Parser)]
#[command(name = "agent-chain")]
#[command(version, about = "リモートエージェントを順番に呼び出すワークフローランナー")]
struct Cli {
    /// ログの出力形式
    #[arg(long, value_enum, default_value_t = LogFormatArg::Text, global = true)]
    log_format: LogFormatArg,

    /// ログをファイルに出力するディレクトリ
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// ログの詳細度（-v: info, -vv: debug）
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// ワークフローを実行する
    Run {
        /// ワークフロー定義（TOML）
        workflow: PathBuf,

        /// コンテキスト変数を上書きする（key=value）
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, String)>,

        /// 結果を JSON で出力する
        #[arg(long)]
        json: bool,
    },
    /// ワークフロー定義を検証する
    Validate {
        /// ワークフロー定義（TOML）
        workflow: PathBuf,
    },
    /// ドキュメントをアップロードする
    Upload {
        /// 署名付き URL を返すエンドポイント
        #[arg(long)]
        endpoint: String,

        /// アップロードするファイル
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// 生成済みドキュメントをダウンロードする
    Download {
        /// 署名付き URL を返すエンドポイント
        #[arg(long)]
        endpoint: String,

        /// 保存先
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("key=value 形式で指定してください: {}", raw)),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let options = LogOptions {
        format: match cli.log_format {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        },
        level: match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        },
        directory: cli.log_dir.clone(),
    };
    let _guard = match telemetry::init(&options) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("エラー: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Run {
            workflow,
            vars,
            json,
        } => run(workflow, vars, json).await,
        Command::Validate { workflow } => validate(workflow),
        Command::Upload { endpoint, files } => upload(&endpoint, &files).await,
        Command::Download { endpoint, output } => download(&endpoint, output).await,
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("エラー: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(
    path: PathBuf,
    vars: Vec<(String, String)>,
    json: bool,
) -> Result<ExitCode, Box<dyn Error>> {
    let workflow = Workflow::from_file(&path)?.with_context_overrides(vars);
    let invoker = Arc::new(HttpInvoker::from_settings(workflow.client()));
    let orchestrator = WorkflowOrchestrator::new(&workflow, invoker);

    let handle = orchestrator.start();
    let watchers = if json {
        Vec::new()
    } else {
        println!("▶ {}", workflow.name());
        spawn_watchers(&orchestrator)
    };

    let outcome = handle.wait().await;
    let snapshot = orchestrator.snapshot();

    // オーケストレーターを破棄するとチャネルが閉じ、監視タスクが終了する
    drop(orchestrator);
    for watcher in watchers {
        if let Err(err) = watcher.await {
            warn!(error = %err, "ステップ監視タスクが異常終了しました");
        }
    }

    if json {
        println!("{}", snapshot.to_json()?);
    } else {
        print_summary(&snapshot, outcome);
    }

    Ok(match outcome {
        RunOutcome::Completed => ExitCode::SUCCESS,
        RunOutcome::Halted { .. } | RunOutcome::Superseded => ExitCode::FAILURE,
    })
}

/// 各ステップのラベル変化を表示するタスクを起動する
fn spawn_watchers(orchestrator: &WorkflowOrchestrator) -> Vec<JoinHandle<()>> {
    let total = orchestrator.step_count();
    orchestrator
        .step_names()
        .into_iter()
        .enumerate()
        .filter_map(|(index, name)| {
            let mut rx = orchestrator.subscribe(index)?;
            Some(tokio::spawn(async move {
                let mut last = StatusLabel::Waiting;
                loop {
                    let (label, terminal) = {
                        let state = rx.borrow_and_update();
                        (project(&state), state.is_terminal())
                    };
                    if label != last {
                        println!("  [{}/{}] {}: {}", index + 1, total, name, label);
                        last = label;
                    }
                    // CLI では再開始しないため、終了状態に達したら監視をやめる
                    if terminal || rx.changed().await.is_err() {
                        break;
                    }
                }
            }))
        })
        .collect()
}

fn print_summary(snapshot: &WorkflowSnapshot, outcome: RunOutcome) {
    println!();
    for step in &snapshot.steps {
        println!(
            "{:>3}. {:<28} {}",
            step.index + 1,
            step.name,
            project(&step.state)
        );
        if let StepDetail::Error(message) = detail(&step.state) {
            println!("       {}", message);
        }
    }
    println!();

    match outcome {
        RunOutcome::Completed => println!(
            "完了: {}/{} ステップ成功",
            snapshot.completed_steps(),
            snapshot.steps.len()
        ),
        RunOutcome::Halted { index } => println!(
            "停止: ステップ {} ({}) が失敗しました",
            index + 1,
            snapshot
                .steps
                .get(index)
                .map(|step| step.name.as_str())
                .unwrap_or("?")
        ),
        RunOutcome::Superseded => println!("中断: 実行が置き換えられました"),
    }
}

fn validate(path: PathBuf) -> Result<ExitCode, Box<dyn Error>> {
    let workflow = Workflow::from_file(&path)?;

    println!("ワークフロー: {}", workflow.name());
    if let Some(description) = workflow.description() {
        println!("説明: {}", description);
    }
    for (index, step) in workflow.steps().iter().enumerate() {
        println!(
            "{:>3}. {:<28} {} {}",
            index + 1,
            step.name(),
            step.method(),
            step.url()
        );
    }
    println!("OK");

    Ok(ExitCode::SUCCESS)
}

async fn upload(endpoint: &str, files: &[PathBuf]) -> Result<ExitCode, Box<dyn Error>> {
    let client = TransferClient::new();
    let records = client
        .upload_all(endpoint, files, |record| {
            let status = match record.status {
                UploadStatus::Processing => "processing",
                UploadStatus::Processed => "processed",
                UploadStatus::Failed => "failed",
            };
            match &record.error {
                Some(error) => println!("{} ({}): {} - {}", record.name, record.size, status, error),
                None => println!("{} ({}): {}", record.name, record.size, status),
            }
        })
        .await;

    let failed = records
        .iter()
        .filter(|record| record.status == UploadStatus::Failed)
        .count();
    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn download(endpoint: &str, output: PathBuf) -> Result<ExitCode, Box<dyn Error>> {
    let client = TransferClient::new();
    let bytes = client.download(endpoint, &output).await?;
    println!("{} に保存しました ({} bytes)", output.display(), bytes);
    Ok(ExitCode::SUCCESS)
}
