//! Headless Agent 运行时
//!
//! 供非 REPL 前端（如 HTTP/SSE 接口）调用：
//! process_message 跑完一轮并返回拼接后的回复文本，
//! process_message_stream 把每个帧原样转发给调用方提供的通道。

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::core::{Orchestrator, TurnOutcome, TurnRequest};
use crate::planning::Frame;

/// 跑完一轮，返回所有 text 帧拼接的文本（不含工具结果摘要）
pub async fn process_message(orchestrator: &Arc<Orchestrator>, request: TurnRequest) -> String {
    let mut handle = orchestrator.start_turn(request);
    let mut reply = String::new();
    for frame in handle.collect_frames().await {
        if let Frame::Text { content } = frame {
            reply.push_str(&content);
        }
    }
    reply
}

/// 逐帧转发到 event_tx；event_tx 被关闭视为传输层断开，回合照常收尾
pub async fn process_message_stream(
    orchestrator: &Arc<Orchestrator>,
    request: TurnRequest,
    event_tx: mpsc::UnboundedSender<Frame>,
) -> Option<TurnOutcome> {
    let mut handle = orchestrator.start_turn(request);
    while let Some(frame) = handle.next_frame().await {
        let done = frame.is_done();
        if event_tx.send(frame).is_err() {
            tracing::debug!("stream consumer went away, disconnecting turn");
            handle.disconnect();
            break;
        }
        if done {
            break;
        }
    }
    handle.join().await
}
