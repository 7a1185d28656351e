//! JobPilot 命令行入口
//!
//! 逐行读取标准输入，每行作为一轮对话；每个帧以一行 JSON 输出到标准输出，日志写到标准错误。
//! 用法：jobpilot [config.toml]；输入 /clear 清空会话，/quit 退出。

use std::path::PathBuf;

use anyhow::Context;
use jobpilot::core::{create_agent_builder, TurnRequest};
use jobpilot::observability;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let orchestrator = create_agent_builder(config_path)
        .build()
        .context("Failed to build agent")?;

    let user_id = std::env::var("JOBPILOT_USER").unwrap_or_else(|_| "local-user".to_string());
    let conversation_id = format!("cli_{}", uuid::Uuid::new_v4());
    tracing::info!(%user_id, %conversation_id, "session started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let message = line.trim();
        match message {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                if let Err(e) = orchestrator.conversations().clear(&conversation_id).await {
                    tracing::warn!(error = %e, "failed to clear conversation");
                }
                continue;
            }
            _ => {}
        }

        let mut handle = orchestrator.start_turn(TurnRequest::new(
            user_id.clone(),
            conversation_id.clone(),
            message,
        ));
        for frame in handle.collect_frames().await {
            let mut json = serde_json::to_string(&frame).context("Failed to encode frame")?;
            json.push('\n');
            stdout
                .write_all(json.as_bytes())
                .await
                .context("Failed to write frame")?;
        }
        stdout.flush().await.context("Failed to flush stdout")?;
    }

    // 退出前等待后台任务（落库、抽取、摘要）完成
    orchestrator.scheduler().drain().await;
    Ok(())
}
