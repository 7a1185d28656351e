//! 回合编排器
//!
//! 每轮：thinking 帧 -> 并发（追加用户消息、读画像、读历史）-> 规划 -> 按组执行 -> done 帧 -> 派发后台任务。
//! 连续的 tool 动作为一个并行组（结果按完成顺序推送），message / UNKNOWN 为同步单元组；
//! 组 N 的帧总在组 N+1 之前。单独执行的 search_jobs 返回空结果时，每轮至多重规划一次。
//! 调用方断开后：当前组跑完但结果丢弃，不再启动后续组，落库与后台任务照常进行。

use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::background::{BackgroundWorker, PostTurn};
use crate::core::{AgentError, TaskScheduler};
use crate::memory::{ConversationStore, Message, Profile, ProfileStore};
use crate::planning::{
    group_actions, is_trivial_message, word_chunks, Action, ActionGroup, Frame, PlanRequest, Planner,
    ToolCall,
};
use crate::tools::{is_empty_search_result, ToolContext, ToolExecutor, UnknownResolution, SEARCH_JOBS};

/// 一轮输入
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub user_id: String,
    pub conversation_id: String,
    pub message: String,
    pub fast_mode: bool,
}

impl TurnRequest {
    pub fn new(
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            message: message.into(),
            fast_mode: false,
        }
    }

    pub fn fast(mut self) -> Self {
        self.fast_mode = true;
        self
    }
}

/// 一轮结束后的统计
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    pub assistant_text: String,
    pub tool_calls: usize,
    pub errors: usize,
    pub feedback_attempted: bool,
    pub disconnected: bool,
    /// 用户消息追加后的会话消息数
    pub message_count: Option<usize>,
}

/// 帧发送端；接收端被丢弃或显式断开后 emit 返回 false 且不再发送
#[derive(Clone)]
pub struct FrameSink {
    tx: mpsc::UnboundedSender<Frame>,
    cancel: CancellationToken,
}

impl FrameSink {
    pub fn new(tx: mpsc::UnboundedSender<Frame>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    pub fn is_connected(&self) -> bool {
        !self.cancel.is_cancelled() && !self.tx.is_closed()
    }

    pub fn emit(&self, frame: Frame) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if self.tx.send(frame).is_err() {
            self.cancel.cancel();
            return false;
        }
        true
    }
}

/// 调用方持有的回合句柄
pub struct TurnHandle {
    pub frames: mpsc::UnboundedReceiver<Frame>,
    cancel: CancellationToken,
    task: JoinHandle<TurnOutcome>,
}

impl TurnHandle {
    pub async fn next_frame(&mut self) -> Option<Frame> {
        self.frames.recv().await
    }

    /// 模拟传输层断开
    pub fn disconnect(&self) {
        self.cancel.cancel();
    }

    /// 读到 done 帧（或通道关闭）为止
    pub async fn collect_frames(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = self.frames.recv().await {
            let done = frame.is_done();
            frames.push(frame);
            if done {
                break;
            }
        }
        frames
    }

    /// 等待回合任务结束
    pub async fn join(self) -> Option<TurnOutcome> {
        match self.task.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::warn!(error = %e, "turn task failed");
                None
            }
        }
    }
}

/// 单轮内部状态；feedback_attempted 只在本轮有效
#[derive(Default)]
struct TurnState {
    texts: Vec<String>,
    tool_summaries: Vec<String>,
    tool_calls: usize,
    errors: usize,
    feedback_attempted: bool,
}

impl TurnState {
    fn accumulated_text(&self) -> String {
        let mut text = self.texts.join("\n\n");
        if !self.tool_summaries.is_empty() {
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str(&self.tool_summaries.join("\n"));
        }
        text
    }
}

fn summarize_result(name: &str, result: &Value) -> String {
    match result.get("count").and_then(Value::as_u64) {
        Some(1) => format!("{name}: 1 result"),
        Some(n) => format!("{name}: {n} results"),
        None => format!("{name}: completed"),
    }
}

pub struct Orchestrator {
    planner: Arc<Planner>,
    executor: Arc<ToolExecutor>,
    conversations: Arc<dyn ConversationStore>,
    profiles: Arc<ProfileStore>,
    scheduler: Arc<TaskScheduler>,
    background: BackgroundWorker,
    history_window: usize,
}

impl Orchestrator {
    pub fn new(
        planner: Arc<Planner>,
        executor: Arc<ToolExecutor>,
        conversations: Arc<dyn ConversationStore>,
        profiles: Arc<ProfileStore>,
        scheduler: Arc<TaskScheduler>,
        background: BackgroundWorker,
    ) -> Self {
        let history_window = planner.config().history_window;
        Self {
            planner,
            executor,
            conversations,
            profiles,
            scheduler,
            background,
            history_window,
        }
    }

    pub fn conversations(&self) -> &Arc<dyn ConversationStore> {
        &self.conversations
    }

    pub fn profiles(&self) -> &Arc<ProfileStore> {
        &self.profiles
    }

    pub fn scheduler(&self) -> &Arc<TaskScheduler> {
        &self.scheduler
    }

    /// 在独立任务中运行一轮，返回可边读边断开的句柄
    pub fn start_turn(self: &Arc<Self>, req: TurnRequest) -> TurnHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let sink = FrameSink::new(tx, cancel.clone());
        let this = Arc::clone(self);
        let task = tokio::spawn(async move { this.run_turn(&req, &sink).await });
        TurnHandle {
            frames: rx,
            cancel,
            task,
        }
    }

    /// 运行一轮；所有失败都降级为帧，不会中断流
    pub async fn run_turn(&self, req: &TurnRequest, sink: &FrameSink) -> TurnOutcome {
        sink.emit(Frame::Thinking);
        let fast_mode = req.fast_mode || is_trivial_message(&req.message);

        let user_message = Message::user(req.message.clone());
        let (appended, profile, history) = tokio::join!(
            self.conversations
                .append(&req.conversation_id, user_message.clone()),
            self.profiles.get_user_profile(&req.user_id),
            self.conversations
                .messages(&req.conversation_id, Some(self.history_window + 1)),
        );
        let message_count = match appended {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!(conversation_id = %req.conversation_id, error = %e, "failed to append user message");
                None
            }
        };
        let profile = profile.unwrap_or_else(|e| {
            tracing::warn!(user_id = %req.user_id, error = %e, "failed to load profile, using defaults");
            Profile::default()
        });
        let mut history = history.unwrap_or_else(|e| {
            tracing::warn!(conversation_id = %req.conversation_id, error = %e, "failed to load history");
            Vec::new()
        });
        // 并发追加可能先于读取完成：只去掉本条消息本身（含时间戳），同文的旧消息保留
        if history.last() == Some(&user_message) {
            history.pop();
        }

        let profile_context = ProfileStore::get_profile_context(&profile);
        let plan_req = PlanRequest {
            user_id: &req.user_id,
            message: &req.message,
            history: &history,
            profile_context: &profile_context,
            fast_mode,
        };
        let plan = self.planner.plan(plan_req).await;
        tracing::info!(
            user_id = %req.user_id,
            conversation_id = %req.conversation_id,
            actions = plan.actions.len(),
            fast_mode,
            "executing plan"
        );

        let ctx = ToolContext::new(req.user_id.clone(), req.conversation_id.clone());
        let mut state = TurnState::default();
        self.execute_plan(plan.actions, plan_req, &profile, &ctx, &mut state, sink)
            .await;

        let disconnected = !sink.emit(Frame::Done);
        if disconnected {
            tracing::debug!(conversation_id = %req.conversation_id, "client disconnected before done");
        }

        let assistant_text = state.accumulated_text();
        self.background.dispatch(PostTurn {
            user_id: req.user_id.clone(),
            conversation_id: req.conversation_id.clone(),
            user_message: req.message.clone(),
            assistant_text: assistant_text.clone(),
            message_count,
        });

        TurnOutcome {
            assistant_text,
            tool_calls: state.tool_calls,
            errors: state.errors,
            feedback_attempted: state.feedback_attempted,
            disconnected,
            message_count,
        }
    }

    /// 按组顺序执行；重规划产生的组插到当前组之后
    async fn execute_plan(
        &self,
        actions: Vec<Action>,
        plan_req: PlanRequest<'_>,
        profile: &Profile,
        ctx: &ToolContext,
        state: &mut TurnState,
        sink: &FrameSink,
    ) {
        let mut pending: VecDeque<ActionGroup> = group_actions(actions).into();
        while let Some(group) = pending.pop_front() {
            if !sink.is_connected() {
                tracing::debug!(skipped = pending.len() + 1, "client disconnected, skipping remaining groups");
                break;
            }
            let empty_search = match group {
                ActionGroup::Single(Action::Message { content }) => {
                    self.stream_text(content, state, sink);
                    None
                }
                ActionGroup::Single(Action::Unknown { original_message }) => {
                    match self.executor.handle_unknown_action(&original_message, profile) {
                        UnknownResolution::Tool(call) => {
                            tracing::debug!(tool = %call.name, "unknown intent resolved to tool call");
                            self.run_single_tool(call, ctx, state, sink).await
                        }
                        UnknownResolution::Clarify(question) => {
                            self.stream_text(question, state, sink);
                            None
                        }
                    }
                }
                ActionGroup::Single(Action::Tool(call)) => self.run_single_tool(call, ctx, state, sink).await,
                ActionGroup::Tools(mut calls) if calls.len() == 1 => match calls.pop() {
                    Some(call) => self.run_single_tool(call, ctx, state, sink).await,
                    None => None,
                },
                ActionGroup::Tools(calls) => {
                    self.run_parallel_tools(&calls, ctx, state, sink).await;
                    None
                }
            };

            let Some(call) = empty_search else {
                continue;
            };
            if state.feedback_attempted {
                tracing::info!(tool = %call.name, input = %call.input, "empty result after feedback, not retrying");
                continue;
            }
            if !sink.is_connected() {
                continue;
            }
            state.feedback_attempted = true;
            tracing::info!(tool = %call.name, input = %call.input, "empty search result, re-planning once");
            let replan = self.planner.replan_after_empty_result(plan_req, &call).await;
            for follow_up in group_actions(replan.actions).into_iter().rev() {
                pending.push_front(follow_up);
            }
        }
    }

    fn stream_text(&self, content: String, state: &mut TurnState, sink: &FrameSink) {
        for chunk in word_chunks(&content) {
            if !sink.emit(Frame::Text {
                content: chunk.to_string(),
            }) {
                break;
            }
        }
        if !content.trim().is_empty() {
            state.texts.push(content);
        }
    }

    async fn call_tool(&self, call: &ToolCall, ctx: &ToolContext) -> Result<Value, AgentError> {
        self.executor.execute(&call.name, call.input.clone(), ctx).await
    }

    /// 推送一次工具结果；断开后丢弃
    fn report(&self, call: &ToolCall, result: &Result<Value, AgentError>, state: &mut TurnState, sink: &FrameSink) {
        state.tool_calls += 1;
        match result {
            Ok(payload) => {
                state.tool_summaries.push(summarize_result(&call.name, payload));
                sink.emit(Frame::Action {
                    name: call.name.clone(),
                    payload: payload.clone(),
                });
            }
            Err(e) => {
                state.errors += 1;
                tracing::warn!(tool = %call.name, error = %e, "tool call failed");
                sink.emit(Frame::Error {
                    message: e.to_string(),
                });
            }
        }
    }

    /// 单独执行一个工具；若为空的 search_jobs 结果则返回该调用供反馈判断
    async fn run_single_tool(
        &self,
        call: ToolCall,
        ctx: &ToolContext,
        state: &mut TurnState,
        sink: &FrameSink,
    ) -> Option<ToolCall> {
        let result = {
            let _permit = self.scheduler.acquire_tool().await;
            self.call_tool(&call, ctx).await
        };
        self.report(&call, &result, state, sink);
        match result {
            Ok(payload) if call.name == SEARCH_JOBS && is_empty_search_result(&payload) => Some(call),
            _ => None,
        }
    }

    /// 组内全部同时发起，结果按完成顺序推送；整组完成后才返回。
    /// 许可按组获取，组的大小不受并发上限影响
    async fn run_parallel_tools(
        &self,
        calls: &[ToolCall],
        ctx: &ToolContext,
        state: &mut TurnState,
        sink: &FrameSink,
    ) {
        let _permit = self.scheduler.acquire_tool().await;
        let mut in_flight: FuturesUnordered<_> = calls
            .iter()
            .map(|call| async move { (call, self.call_tool(call, ctx).await) })
            .collect();
        while let Some((call, result)) = in_flight.next().await {
            self.report(call, &result, state, sink);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accumulated_text_includes_tool_summaries() {
        let mut state = TurnState::default();
        assert_eq!(state.accumulated_text(), "");

        state.texts.push("Here you go.".into());
        state.tool_summaries.push(summarize_result("search_jobs", &json!({"count": 3})));
        state.tool_summaries.push(summarize_result("set_goal", &json!({"id": "g1"})));
        assert_eq!(
            state.accumulated_text(),
            "Here you go.\n\nsearch_jobs: 3 results\nset_goal: completed"
        );
    }

    #[test]
    fn test_sink_stops_after_receiver_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = FrameSink::new(tx, CancellationToken::new());
        assert!(sink.emit(Frame::Thinking));
        drop(rx);
        assert!(!sink.emit(Frame::Done));
        assert!(!sink.is_connected());
    }
}
