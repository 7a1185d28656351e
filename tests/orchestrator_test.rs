//! 回合编排集成测试：帧顺序、反馈重规划、会话增长、记忆过滤与断开

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use jobpilot::agent::{process_message, process_message_stream};
    use jobpilot::config::AppConfig;
    use jobpilot::core::{AgentBuilder, AgentError, Orchestrator, TurnRequest};
    use jobpilot::integrations::{JobBoard, JobListing, JobQuery, LocalBackend};
    use jobpilot::llm::{EmbeddingProvider, MockLlmClient};
    use jobpilot::memory::{
        ConversationStore, InMemoryConversationStore, InMemoryVectorStore, Message, MemorySummary,
        Role, VectorStore,
    };
    use jobpilot::tools::Collaborators;
    use jobpilot::Frame;
    use serde_json::json;
    use tokio::sync::{mpsc, Barrier};

    const DIM: usize = 3;

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, String> {
            Ok(vec![1.0, 0.0, 0.0])
        }
    }

    /// 记录 nearest 调用次数的向量存储
    #[derive(Default)]
    struct CountingVectors {
        inner: InMemoryVectorStore,
        searches: AtomicUsize,
    }

    #[async_trait]
    impl VectorStore for CountingVectors {
        async fn upsert(&self, summary: MemorySummary) -> Result<(), AgentError> {
            self.inner.upsert(summary).await
        }

        async fn nearest(
            &self,
            user_id: &str,
            embedding: &[f32],
            limit: usize,
        ) -> Result<Vec<MemorySummary>, AgentError> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            self.inner.nearest(user_id, embedding, limit).await
        }
    }

    fn config(memory: bool) -> AppConfig {
        let mut config = AppConfig::default();
        config.memory.enabled = memory;
        config.memory.dimension = DIM;
        config
    }

    fn build(llm: Arc<MockLlmClient>, backend: LocalBackend) -> Arc<Orchestrator> {
        AgentBuilder::new(config(false))
            .with_llm(llm)
            .with_collaborators(Collaborators::from_backend(Arc::new(backend)))
            .build()
            .unwrap()
    }

    fn build_with_memory(llm: Arc<MockLlmClient>, vectors: Arc<dyn VectorStore>) -> Arc<Orchestrator> {
        AgentBuilder::new(config(true))
            .with_llm(llm)
            .with_embedder(Arc::new(FixedEmbedder))
            .with_vector_store(vectors)
            .with_collaborators(Collaborators::from_backend(Arc::new(
                LocalBackend::with_sample_listings(),
            )))
            .build()
            .unwrap()
    }

    fn message_plan(text: &str) -> String {
        json!({"plan": "reply", "actions": [{"type": "message", "content": text}]}).to_string()
    }

    fn text_of(frames: &[Frame]) -> String {
        frames
            .iter()
            .filter_map(|f| match f {
                Frame::Text { content } => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    fn summary(id: &str, text: &str, embedding: Vec<f32>) -> MemorySummary {
        MemorySummary {
            id: id.to_string(),
            conversation_id: "old".to_string(),
            user_id: "u1".to_string(),
            summary: text.to_string(),
            embedding,
            importance: 0.2,
            created_at: Utc::now(),
            distance: None,
        }
    }

    #[tokio::test]
    async fn test_trivial_greeting_streams_text_without_memory_lookup() {
        let llm = Arc::new(MockLlmClient::with_responses([message_plan(
            "Hello! How can I help with your job search today?",
        )]));
        let vectors = Arc::new(CountingVectors::default());
        let orchestrator = build_with_memory(llm.clone(), vectors.clone());

        let mut handle = orchestrator.start_turn(TurnRequest::new("u1", "c1", "hi"));
        let frames = handle.collect_frames().await;
        let outcome = handle.join().await.unwrap();

        assert_eq!(frames.first(), Some(&Frame::Thinking));
        assert_eq!(frames.last(), Some(&Frame::Done));
        assert!(!frames.iter().any(|f| matches!(f, Frame::Action { .. })));
        assert_eq!(
            text_of(&frames),
            "Hello! How can I help with your job search today?"
        );
        assert_eq!(outcome.tool_calls, 0);
        assert_eq!(llm.call_count(), 1);

        orchestrator.scheduler().drain().await;
        assert_eq!(vectors.searches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_search_replans_exactly_once() {
        let search = json!({
            "plan": "search",
            "actions": [{"type": "tool", "name": "search_jobs",
                         "input": {"role": "Product Manager", "location": "Austin"}}]
        })
        .to_string();
        let llm = Arc::new(MockLlmClient::with_responses([search.clone(), search]));
        let orchestrator = build(llm.clone(), LocalBackend::new(Vec::new()));

        let mut handle = orchestrator.start_turn(TurnRequest::new(
            "u1",
            "c1",
            "find product manager jobs in Austin",
        ));
        let frames = handle.collect_frames().await;
        let outcome = handle.join().await.unwrap();

        let actions: Vec<_> = frames
            .iter()
            .filter_map(|f| match f {
                Frame::Action { name, payload } => Some((name.as_str(), payload["count"].clone())),
                _ => None,
            })
            .collect();
        assert_eq!(actions, vec![("search_jobs", json!(0)), ("search_jobs", json!(0))]);
        assert!(outcome.feedback_attempted);
        assert_eq!(llm.call_count(), 2);
        assert_eq!(frames.last(), Some(&Frame::Done));
    }

    #[tokio::test]
    async fn test_replan_can_broaden_the_search() {
        let llm = Arc::new(MockLlmClient::with_responses([
            json!({"plan": "search", "actions": [
                {"type": "tool", "name": "search_jobs", "input": {"role": "Product Manager", "location": "Boise"}}
            ]})
            .to_string(),
            json!({"plan": "broaden", "actions": [
                {"type": "message", "content": "Nothing in Boise, here is Austin instead."},
                {"type": "tool", "name": "search_jobs", "input": {"role": "Product Manager", "location": "Austin"}}
            ]})
            .to_string(),
        ]));
        let orchestrator = build(llm.clone(), LocalBackend::with_sample_listings());

        let mut handle = orchestrator.start_turn(TurnRequest::new("u1", "c1", "find PM jobs in Boise"));
        let frames = handle.collect_frames().await;
        let outcome = handle.join().await.unwrap();

        assert!(text_of(&frames).contains("Austin instead"));
        let last_action = frames
            .iter()
            .rev()
            .find_map(|f| match f {
                Frame::Action { payload, .. } => Some(payload.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(last_action["count"], 1);
        assert_eq!(outcome.tool_calls, 2);
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn test_parallel_group_completes_before_following_message() {
        let llm = Arc::new(MockLlmClient::with_responses([json!({
            "plan": "search and goals",
            "actions": [
                {"type": "tool", "name": "search_jobs", "input": {"role": "Product Manager"}},
                {"type": "tool", "name": "list_goals", "input": {}},
                {"type": "message", "content": "Here is what I found."}
            ]
        })
        .to_string()]));
        let orchestrator = build(llm, LocalBackend::with_sample_listings());

        let mut handle = orchestrator.start_turn(TurnRequest::new("u1", "c1", "show jobs and my goals"));
        let frames = handle.collect_frames().await;

        let action_positions: Vec<usize> = frames
            .iter()
            .enumerate()
            .filter(|(_, f)| matches!(f, Frame::Action { .. }))
            .map(|(i, _)| i)
            .collect();
        let first_text = frames
            .iter()
            .position(|f| matches!(f, Frame::Text { .. }))
            .unwrap();
        assert_eq!(action_positions.len(), 2);
        assert!(action_positions.iter().all(|&i| i < first_text));
        assert_eq!(text_of(&frames), "Here is what I found.");
    }

    #[tokio::test]
    async fn test_tool_failures_become_error_frames() {
        let llm = Arc::new(MockLlmClient::with_responses([json!({
            "plan": "apply",
            "actions": [
                {"type": "tool", "name": "apply_to_job", "input": {"jobId": "missing"}},
                {"type": "message", "content": "Let me know what else you need."}
            ]
        })
        .to_string()]));
        let orchestrator = build(llm, LocalBackend::with_sample_listings());

        let mut handle = orchestrator.start_turn(TurnRequest::new("u1", "c1", "apply to job missing"));
        let frames = handle.collect_frames().await;
        let outcome = handle.join().await.unwrap();

        let error = frames
            .iter()
            .find_map(|f| match f {
                Frame::Error { message } => Some(message.clone()),
                _ => None,
            })
            .unwrap();
        assert!(error.contains("apply_to_job"));
        assert!(text_of(&frames).contains("what else"));
        assert_eq!(frames.last(), Some(&Frame::Done));
        assert_eq!(outcome.errors, 1);
    }

    #[tokio::test]
    async fn test_invalid_input_and_unknown_tool_are_reported() {
        let llm = Arc::new(MockLlmClient::with_responses([json!({
            "plan": "bad calls",
            "actions": [
                {"type": "tool", "name": "search_jobs", "input": {"location": "Austin"}},
                {"type": "tool", "name": "book_flight", "input": {}}
            ]
        })
        .to_string()]));
        let orchestrator = build(llm, LocalBackend::with_sample_listings());

        let mut handle = orchestrator.start_turn(TurnRequest::new("u1", "c1", "do things"));
        let frames = handle.collect_frames().await;

        let errors: Vec<String> = frames
            .iter()
            .filter_map(|f| match f {
                Frame::Error { message } => Some(message.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.contains("role")));
        assert!(errors.iter().any(|e| e.contains("book_flight")));
    }

    #[tokio::test]
    async fn test_conversation_grows_by_one_exchange_per_turn() {
        let llm = Arc::new(MockLlmClient::with_responses([
            message_plan("Hi there!"),
            json!({"plan": "goals", "actions": [{"type": "tool", "name": "list_goals", "input": {}}]})
                .to_string(),
        ]));
        let orchestrator = build(llm, LocalBackend::with_sample_listings());

        orchestrator
            .start_turn(TurnRequest::new("u1", "c1", "hello"))
            .join()
            .await
            .unwrap();
        orchestrator.scheduler().drain().await;
        let messages = orchestrator.conversations().messages("c1", None).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "Hi there!");

        orchestrator
            .start_turn(TurnRequest::new("u1", "c1", "what are my goals"))
            .join()
            .await
            .unwrap();
        orchestrator.scheduler().drain().await;
        let messages = orchestrator.conversations().messages("c1", None).await.unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[3].content, "list_goals: 0 results");
    }

    #[tokio::test]
    async fn test_only_close_summaries_reach_the_planner() {
        let vectors = Arc::new(InMemoryVectorStore::new());
        vectors
            .upsert(summary("near", "User wanted PM roles in Austin", vec![1.0, 0.0, 0.0]))
            .await
            .unwrap();
        vectors
            .upsert(summary("far", "User asked about sourdough recipes", vec![0.0, 1.0, 0.0]))
            .await
            .unwrap();
        let llm = Arc::new(MockLlmClient::with_responses([message_plan("Searching now.")]));
        let orchestrator = build_with_memory(llm.clone(), vectors);

        orchestrator
            .start_turn(TurnRequest::new("u1", "c1", "find product manager jobs in Austin"))
            .join()
            .await
            .unwrap();

        let prompts = llm.recorded_prompts();
        let system = &prompts[0][0];
        assert_eq!(system.role, Role::System);
        assert!(system.content.contains("PM roles in Austin"));
        assert!(!system.content.contains("sourdough"));
        orchestrator.scheduler().drain().await;
    }

    #[tokio::test]
    async fn test_disconnect_still_records_turn() {
        let llm = Arc::new(
            MockLlmClient::with_responses([message_plan("Here are some roles.")])
                .with_delay(Duration::from_millis(50)),
        );
        let orchestrator = build(llm, LocalBackend::with_sample_listings());

        let mut handle = orchestrator.start_turn(TurnRequest::new(
            "u1",
            "c1",
            "find product manager jobs in Austin",
        ));
        assert_eq!(handle.next_frame().await, Some(Frame::Thinking));
        handle.disconnect();
        let outcome = handle.join().await.unwrap();
        assert!(outcome.disconnected);

        orchestrator.scheduler().drain().await;
        let messages = orchestrator.conversations().messages("c1", None).await.unwrap();
        assert_eq!(messages[0].content, "find product manager jobs in Austin");
        assert!(messages.iter().all(|m| m.role != Role::Assistant));

        let profile = orchestrator.profiles().get_user_profile("u1").await.unwrap();
        assert_eq!(profile.target_roles(), vec!["Product Manager".to_string()]);
    }

    fn action_names(frames: &[Frame]) -> Vec<String> {
        frames
            .iter()
            .filter_map(|f| match f {
                Frame::Action { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_full_extraction_follows_message_count_across_turns() {
        let llm = Arc::new(MockLlmClient::new());
        let orchestrator = build(llm.clone(), LocalBackend::with_sample_listings());

        for turn in 1..=6 {
            orchestrator
                .start_turn(TurnRequest::new("u1", "c1", format!("tell me about option {turn}")))
                .join()
                .await
                .unwrap();
            orchestrator.scheduler().drain().await;
        }

        let messages = orchestrator.conversations().messages("c1", None).await.unwrap();
        assert_eq!(messages.len(), 12);
        // 6 次规划 + 第 3、6、9、12 条消息各一次抽取
        assert_eq!(llm.call_count(), 10);
    }

    #[tokio::test]
    async fn test_fast_request_skips_memory_search() {
        let llm = Arc::new(MockLlmClient::with_responses([message_plan("On it.")]));
        let vectors = Arc::new(CountingVectors::default());
        let orchestrator = build_with_memory(llm, vectors.clone());

        orchestrator
            .start_turn(TurnRequest::new("u1", "c1", "find product manager jobs in Austin").fast())
            .join()
            .await
            .unwrap();
        orchestrator.scheduler().drain().await;

        assert_eq!(vectors.searches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_intent_uses_profile_defaults() {
        let llm = Arc::new(MockLlmClient::with_responses([json!({
            "plan": "unsure",
            "actions": [
                {"type": "message", "content": "Let me think."},
                {"type": "UNKNOWN", "originalMessage": "do the usual"}
            ]
        })
        .to_string()]));
        let orchestrator = build(llm.clone(), LocalBackend::with_sample_listings());
        orchestrator
            .profiles()
            .update_user_profile(
                "u1",
                &json!({"preferences": {"targetRoles": ["Product Manager"], "locations": ["Austin"]}}),
            )
            .await
            .unwrap();

        let mut handle = orchestrator.start_turn(TurnRequest::new("u1", "c1", "do the usual"));
        let frames = handle.collect_frames().await;

        assert_eq!(action_names(&frames), vec!["search_jobs"]);
        let payload = frames
            .iter()
            .find_map(|f| match f {
                Frame::Action { payload, .. } => Some(payload.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(payload["count"], 1);
        // UNKNOWN 独占计划，前面的 message 不会输出
        assert_eq!(text_of(&frames), "");
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_intent_without_profile_asks_for_clarification() {
        let llm = Arc::new(MockLlmClient::with_responses([json!({
            "plan": "unsure",
            "actions": [{"type": "UNKNOWN", "originalMessage": "what should I do with my career"}]
        })
        .to_string()]));
        let orchestrator = build(llm, LocalBackend::with_sample_listings());

        let mut handle = orchestrator.start_turn(TurnRequest::new(
            "u1",
            "c1",
            "what should I do with my career",
        ));
        let frames = handle.collect_frames().await;

        assert!(action_names(&frames).is_empty());
        assert!(text_of(&frames).contains("What kind of role"));
        assert_eq!(frames.last(), Some(&Frame::Done));
    }

    #[tokio::test]
    async fn test_unknown_intent_empty_search_replans_once() {
        let unknown = json!({
            "plan": "unsure",
            "actions": [{"type": "UNKNOWN", "originalMessage": "surprise me"}]
        })
        .to_string();
        let llm = Arc::new(MockLlmClient::with_responses([unknown]));
        let orchestrator = build(llm.clone(), LocalBackend::with_sample_listings());
        orchestrator
            .profiles()
            .update_user_profile(
                "u1",
                &json!({"preferences": {"targetRoles": ["Astronaut"], "locations": ["Mars"]}}),
            )
            .await
            .unwrap();

        let mut handle = orchestrator.start_turn(TurnRequest::new("u1", "c1", "surprise me"));
        let frames = handle.collect_frames().await;
        let outcome = handle.join().await.unwrap();

        assert_eq!(action_names(&frames), vec!["search_jobs"]);
        assert!(outcome.feedback_attempted);
        assert_eq!(llm.call_count(), 2);
        assert!(text_of(&frames).starts_with("Echo from Mock"));
    }

    /// 追加前先让出一次，使并发的历史读取先完成
    #[derive(Default)]
    struct LaggingConversations {
        inner: InMemoryConversationStore,
    }

    #[async_trait]
    impl ConversationStore for LaggingConversations {
        async fn append(&self, conversation_id: &str, message: Message) -> Result<usize, AgentError> {
            tokio::task::yield_now().await;
            self.inner.append(conversation_id, message).await
        }

        async fn messages(
            &self,
            conversation_id: &str,
            limit: Option<usize>,
        ) -> Result<Vec<Message>, AgentError> {
            self.inner.messages(conversation_id, limit).await
        }

        async fn clear(&self, conversation_id: &str) -> Result<(), AgentError> {
            self.inner.clear(conversation_id).await
        }
    }

    #[tokio::test]
    async fn test_repeated_text_keeps_earlier_user_message_in_history() {
        let conversations = Arc::new(LaggingConversations::default());
        conversations.append("c1", Message::user("yes")).await.unwrap();
        let llm = Arc::new(MockLlmClient::with_responses([message_plan("Great.")]));
        let orchestrator = AgentBuilder::new(config(false))
            .with_llm(llm.clone())
            .with_conversation_store(conversations)
            .with_collaborators(Collaborators::from_backend(Arc::new(
                LocalBackend::with_sample_listings(),
            )))
            .build()
            .unwrap();

        orchestrator
            .start_turn(TurnRequest::new("u1", "c1", "yes"))
            .join()
            .await
            .unwrap();

        let prompt = &llm.recorded_prompts()[0];
        let yes_count = prompt
            .iter()
            .filter(|m| m.role == Role::User && m.content == "yes")
            .count();
        assert_eq!(yes_count, 2);
        orchestrator.scheduler().drain().await;
    }

    /// 三个调用全部到达后才一起返回；未同时发起则会卡住
    struct RendezvousBoard {
        barrier: Barrier,
    }

    #[async_trait]
    impl JobBoard for RendezvousBoard {
        async fn search(&self, _query: &JobQuery) -> Result<Vec<JobListing>, String> {
            self.barrier.wait().await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_parallel_group_is_not_limited_by_tool_permits() {
        let mut config = config(false);
        config.tools.max_concurrent = 1;
        let local = Arc::new(LocalBackend::with_sample_listings());
        let collaborators = Collaborators {
            jobs: Arc::new(RendezvousBoard {
                barrier: Barrier::new(3),
            }),
            resumes: local.clone(),
            applications: local.clone(),
            goals: local,
        };
        let search = |role: &str| json!({"type": "tool", "name": "search_jobs", "input": {"role": role}});
        let llm = Arc::new(MockLlmClient::with_responses([json!({
            "plan": "fan out",
            "actions": [search("Designer"), search("Engineer"), search("Analyst")]
        })
        .to_string()]));
        let orchestrator = AgentBuilder::new(config)
            .with_llm(llm)
            .with_collaborators(collaborators)
            .build()
            .unwrap();

        let mut handle = orchestrator.start_turn(TurnRequest::new("u1", "c1", "search three roles"));
        let frames = tokio::time::timeout(Duration::from_secs(5), handle.collect_frames())
            .await
            .expect("parallel group should not wait on permits");

        assert_eq!(action_names(&frames).len(), 3);
        assert_eq!(frames.last(), Some(&Frame::Done));
    }

    #[tokio::test]
    async fn test_process_message_returns_reply_text() {
        let llm = Arc::new(MockLlmClient::with_responses([message_plan("Hello there, friend.")]));
        let orchestrator = build(llm, LocalBackend::with_sample_listings());

        let reply = process_message(&orchestrator, TurnRequest::new("u1", "c1", "hello")).await;
        assert_eq!(reply, "Hello there, friend.");
    }

    #[tokio::test]
    async fn test_process_message_stream_forwards_frames() {
        let llm = Arc::new(MockLlmClient::with_responses([message_plan("Two words.")]));
        let orchestrator = build(llm, LocalBackend::with_sample_listings());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = process_message_stream(&orchestrator, TurnRequest::new("u1", "c1", "hello"), tx)
            .await
            .unwrap();

        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        assert_eq!(frames.first(), Some(&Frame::Thinking));
        assert_eq!(frames.last(), Some(&Frame::Done));
        assert_eq!(text_of(&frames), "Two words.");
        assert!(!outcome.disconnected);
    }

    #[tokio::test]
    async fn test_process_message_stream_with_closed_consumer_disconnects() {
        let llm = Arc::new(
            MockLlmClient::with_responses([message_plan("Nobody is listening.")])
                .with_delay(Duration::from_millis(50)),
        );
        let orchestrator = build(llm, LocalBackend::with_sample_listings());
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        let outcome = process_message_stream(&orchestrator, TurnRequest::new("u1", "c1", "hello"), tx)
            .await
            .unwrap();
        assert!(outcome.disconnected);

        orchestrator.scheduler().drain().await;
        let messages = orchestrator.conversations().messages("c1", None).await.unwrap();
        assert_eq!(messages[0].content, "hello");
    }
}
