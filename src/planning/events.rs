//! 流式输出协议：每回合 thinking -> text* -> action* -> error* -> done
//!
//! 帧可序列化为 JSON（type 为封闭集合），供 HTTP/SSE 等调用方原样转发。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 单个事件帧
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// 回合开始，立即发送
    Thinking,
    /// 回复文本的一个词级片段
    Text { content: String },
    /// 一次完成的工具调用
    Action { name: String, payload: Value },
    /// 可恢复的错误（工具失败等）
    Error { message: String },
    /// 终止帧，总是最后一个
    Done,
}

impl Frame {
    pub fn is_done(&self) -> bool {
        matches!(self, Frame::Done)
    }
}

/// 词级切分：每段为一个词加其后的空白，拼接后与原文完全一致
pub fn word_chunks(text: &str) -> impl Iterator<Item = &str> {
    text.split_inclusive(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_word_chunks_reassemble() {
        let text = "Here are  three\njobs in Austin.";
        let chunks: Vec<&str> = word_chunks(text).collect();
        assert_eq!(chunks[0], "Here ");
        assert_eq!(chunks.concat(), text);
        assert_eq!(word_chunks("").count(), 0);
    }

    #[test]
    fn test_frame_json_shape() {
        assert_eq!(
            serde_json::to_value(Frame::Thinking).unwrap(),
            json!({"type": "thinking"})
        );
        assert_eq!(
            serde_json::to_value(Frame::Text {
                content: "hi ".into()
            })
            .unwrap(),
            json!({"type": "text", "content": "hi "})
        );
        assert_eq!(
            serde_json::to_value(Frame::Action {
                name: "search_jobs".into(),
                payload: json!({"count": 0})
            })
            .unwrap(),
            json!({"type": "action", "name": "search_jobs", "payload": {"count": 0}})
        );
        assert_eq!(
            serde_json::to_value(Frame::Done).unwrap(),
            json!({"type": "done"})
        );
    }
}
