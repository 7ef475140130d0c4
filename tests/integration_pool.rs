//! Pool, bus and execution loop integration tests
//!
//! Drives real agents against a scripted `MockLlmClient`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use agentmesh::agent::{Agent, ExecutionResult, FailureKind, Worker};
use agentmesh::bus::{AgentBus, ChannelSubscriber, SendOptions, subscriber_fn};
use agentmesh::config::PoolConfig;
use agentmesh::error::{MeshError, Result};
use agentmesh::llm::{CompletionResponse, MockLlmClient, Role, ToolCall};
use agentmesh::pool::{AgentPool, WorkStatus};
use agentmesh::tools::{ToolOutput, ToolRegistry, ToolSpec};
use async_trait::async_trait;
use rand::Rng;
use serde_json::{Map, Value, json};

fn args(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn echo_registry() -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools
        .register(
            ToolSpec::from_fn("echo", "Return the x argument", |args| async move {
                Ok(ToolOutput::from(args.get("x").cloned().unwrap_or(Value::Null)))
            })
            .with_parameters(json!({
                "type": "object",
                "properties": {"x": {"type": "string"}},
                "required": ["x"]
            })),
        )
        .unwrap();
    tools
}

fn agent(id: &str, client: Arc<MockLlmClient>) -> Arc<Agent> {
    Arc::new(Agent::builder(id).with_id(id).with_client(client).build().unwrap())
}

/// Records start/finish order and peak concurrency of the wrapped worker
struct Tracked {
    inner: Arc<dyn Worker>,
    log: Arc<Mutex<Vec<String>>>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    delay: Duration,
}

impl Tracked {
    fn wrap(inner: Arc<dyn Worker>, tracker: &Tracker, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner,
            log: Arc::clone(&tracker.log),
            running: Arc::clone(&tracker.running),
            peak: Arc::clone(&tracker.peak),
            delay,
        })
    }
}

#[derive(Default)]
struct Tracker {
    log: Arc<Mutex<Vec<String>>>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Tracker {
    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Worker for Tracked {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn kind(&self) -> &str {
        self.inner.kind()
    }

    async fn run(&self, task: &str, context: Option<&str>) -> ExecutionResult {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.log.lock().unwrap().push(format!("start:{}", self.id()));

        tokio::time::sleep(self.delay).await;
        let result = self.inner.run(task, context).await;

        self.log.lock().unwrap().push(format!("end:{}", self.id()));
        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[tokio::test]
async fn test_echo_tool_loop() {
    let client = Arc::new(MockLlmClient::new(vec![
        CompletionResponse::tool_use(vec![ToolCall::new("call-1", "echo", args(json!({"x": "hi"})))]),
        CompletionResponse::end_turn("done"),
    ]));
    let agent = Agent::builder("echoer")
        .with_client(client.clone())
        .with_tools(echo_registry())
        .build()
        .unwrap();

    let result = agent.run("say hi", None).await;

    assert!(result.success);
    assert_eq!(result.content, "done");
    assert_eq!(result.tool_calls.len(), 1);
    assert!(result.tool_calls[0].success);
    assert_eq!(client.call_count(), 2);

    // The observation reaches the second decision call
    let second = &client.requests()[1];
    let observation = second.messages.last().unwrap();
    assert_eq!(observation.role, Role::Tool);
    assert_eq!(observation.content, "hi");
    assert_eq!(observation.tool_call_id.as_deref(), Some("call-1"));
}

#[tokio::test]
async fn test_dependents_wait_and_never_overlap() {
    let tracker = Tracker::default();
    let config = PoolConfig {
        max_concurrent: 1,
        ..Default::default()
    };
    let mut pool = AgentPool::with_config(&config);

    for id in ["a", "b", "c"] {
        let client = Arc::new(MockLlmClient::always(CompletionResponse::end_turn(format!("{} output", id))));
        let worker = Tracked::wrap(agent(id, client), &tracker, Duration::from_millis(5));
        let deps = if id == "a" { vec![] } else { vec!["a".to_string()] };
        pool.add(worker, format!("task {}", id), None, deps).unwrap();
    }

    let result = pool.run(None).await.unwrap();
    assert!(result.all_success);
    assert_eq!(tracker.peak(), 1);

    let log = tracker.log();
    assert_eq!(&log[..2], &["start:a".to_string(), "end:a".to_string()]);
    // Strict alternation after A: one item finishes before the next starts
    for pair in log[2..].chunks(2) {
        let started = pair[0].strip_prefix("start:").unwrap();
        assert_eq!(pair[1], format!("end:{}", started));
    }
}

#[tokio::test]
async fn test_dependency_result_reaches_dependent() {
    let writer_client = Arc::new(MockLlmClient::always(CompletionResponse::end_turn("report")));
    let mut pool = AgentPool::new();
    pool.add(
        agent("research", Arc::new(MockLlmClient::always(CompletionResponse::end_turn("findings")))),
        "research",
        None,
        vec![],
    )
    .unwrap();
    pool.add(agent("write", writer_client.clone()), "write", None, vec!["research".to_string()])
        .unwrap();

    pool.run(None).await.unwrap();

    let request = &writer_client.requests()[0];
    assert!(request.system_prompt.contains("## Previous Agent Results"));
    assert!(request.system_prompt.contains("## Result from research:\nfindings"));
}

#[tokio::test]
async fn test_failed_dependency_skips_dependent() {
    let a_client = Arc::new(MockLlmClient::always(CompletionResponse::error("provider down")));
    let b_client = Arc::new(MockLlmClient::always(CompletionResponse::end_turn("never")));

    let mut pool = AgentPool::new();
    pool.add(agent("a", a_client.clone()), "fail", None, vec![]).unwrap();
    pool.add(agent("b", b_client.clone()), "depends", None, vec!["a".to_string()])
        .unwrap();

    let result = pool.run(None).await.unwrap();

    assert!(!result.all_success);
    assert_eq!(result.failed_agents, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(result.get("a").unwrap().failure, Some(FailureKind::StopError));
    assert!(result.get("b").unwrap().is_dependency_skip());
    assert_eq!(a_client.call_count(), 1);
    assert_eq!(b_client.call_count(), 0);
    assert_eq!(pool.status("b"), Some(WorkStatus::Failed));
}

#[tokio::test]
async fn test_concurrency_bound_random_graphs() {
    for round in 0..5 {
        let tracker = Tracker::default();
        let max_concurrent = 1 + round % 3;
        let config = PoolConfig {
            max_concurrent,
            ..Default::default()
        };
        let mut pool = AgentPool::with_config(&config);

        // Dependencies only point backwards, so the graph stays acyclic
        let plan: Vec<(u64, Vec<usize>)> = {
            let mut rng = rand::rng();
            (0..12)
                .map(|i| {
                    let deps = (0..i).filter(|_| rng.random_bool(0.2)).collect();
                    (rng.random_range(1..10), deps)
                })
                .collect()
        };

        for (i, (delay_ms, deps)) in plan.into_iter().enumerate() {
            let id = format!("item{}", i);
            let client = Arc::new(MockLlmClient::always(CompletionResponse::end_turn("ok")));
            let worker = Tracked::wrap(agent(&id, client), &tracker, Duration::from_millis(delay_ms));
            let deps = deps.into_iter().map(|d| format!("item{}", d)).collect();
            pool.add(worker, "task", None, deps).unwrap();
        }

        let result = pool.run(None).await.unwrap();
        assert!(result.all_success);
        assert!(tracker.peak() <= max_concurrent, "peak {} > {}", tracker.peak(), max_concurrent);
        assert_eq!(pool.completed_count(), 12);
    }
}

#[tokio::test]
async fn test_cycle_rejected_before_running() {
    let client = Arc::new(MockLlmClient::always(CompletionResponse::end_turn("x")));
    let mut pool = AgentPool::new();
    pool.add(agent("a", client.clone()), "t", None, vec!["c".to_string()]).unwrap();
    pool.add(agent("b", client.clone()), "t", None, vec!["a".to_string()]).unwrap();
    pool.add(agent("c", client.clone()), "t", None, vec!["b".to_string()]).unwrap();

    let err = pool.run(None).await.unwrap_err();
    match err {
        MeshError::CyclicDependency(cycle) => {
            assert_eq!(cycle.first(), cycle.last());
            assert_eq!(cycle.len(), 4);
        }
        other => panic!("Expected cyclic dependency, got {:?}", other),
    }
    assert_eq!(client.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_pool_timeout_cancels_remaining() {
    let slow = Arc::new(
        MockLlmClient::always(CompletionResponse::end_turn("late")).with_delay(Duration::from_secs(30)),
    );
    let fast = Arc::new(MockLlmClient::always(CompletionResponse::end_turn("quick")));

    let mut pool = AgentPool::new();
    pool.add(agent("fast", fast), "t", None, vec![]).unwrap();
    pool.add(agent("slow", slow), "t", None, vec![]).unwrap();

    let result = pool.run(Some(Duration::from_secs(5))).await.unwrap();

    assert_eq!(result.failed_agents, vec!["slow".to_string()]);
    assert_eq!(result.get("fast").unwrap().content, "quick");
    assert_eq!(result.get("slow").unwrap().failure, Some(FailureKind::Cancelled));
    assert_eq!(pool.status("slow"), Some(WorkStatus::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn test_pool_timeout_with_stalled_gateway() {
    let bus = Arc::new(AgentBus::new());
    let (gateway, _unread) = ChannelSubscriber::new(1);
    bus.subscribe_global(gateway);

    let mut pool = AgentPool::new().with_bus(Arc::clone(&bus));
    for id in ["a", "b", "c"] {
        let client = Arc::new(MockLlmClient::always(CompletionResponse::end_turn("ok")));
        pool.add(agent(id, client), "t", None, vec![]).unwrap();
    }

    let result = tokio::time::timeout(Duration::from_secs(10), pool.run(Some(Duration::from_secs(1))))
        .await
        .expect("pool deadline must hold while the gateway is stalled")
        .unwrap();

    assert_eq!(result.results.len(), 3);
    assert!(!result.all_success);
    assert_eq!(pool.running_count(), 0);
    assert!(
        result
            .failed_agents
            .iter()
            .all(|id| result.get(id).unwrap().failure == Some(FailureKind::Cancelled))
    );
}

#[tokio::test]
async fn test_request_without_responder_times_out() {
    let bus = AgentBus::new();
    let started = Instant::now();

    let err = bus
        .request("x", "y", "q", Duration::from_millis(10))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(bus.pending_requests(), 0);
}

#[tokio::test]
async fn test_request_answered_by_subscriber() -> Result<()> {
    let bus = Arc::new(AgentBus::new());
    let responder = Arc::clone(&bus);
    bus.subscribe(
        "reviewer",
        subscriber_fn(move |message| {
            let bus = Arc::clone(&responder);
            async move {
                bus.respond("reviewer", &message.id, format!("re: {}", message.content))
                    .await;
                Ok(())
            }
        }),
    );

    let answer = bus
        .request("author", "reviewer", "looks ok?", Duration::from_secs(1))
        .await?;
    assert_eq!(answer, "re: looks ok?");
    Ok(())
}

#[tokio::test]
async fn test_broadcast_skips_sender() {
    let bus = AgentBus::new();
    let (a, mut a_rx) = ChannelSubscriber::new(8);
    let (b, mut b_rx) = ChannelSubscriber::new(8);
    bus.subscribe("a", a);
    bus.subscribe("b", b);

    bus.broadcast("a", "hello all", SendOptions::default()).await;

    assert!(a_rx.try_recv().is_err());
    let received = b_rx.try_recv().unwrap();
    assert_eq!(received.from, "a");
    assert_eq!(received.content, "hello all");
    assert!(received.is_broadcast());
}

#[tokio::test]
async fn test_agents_share_artifacts_through_bus() {
    let bus = Arc::new(AgentBus::new());
    let client = Arc::new(MockLlmClient::new(vec![
        CompletionResponse::tool_use(vec![ToolCall::new(
            "call-1",
            "share_artifact",
            args(json!({"key": "spec", "content": "v1", "artifact_type": "document"})),
        )]),
        CompletionResponse::end_turn("shared"),
    ]));
    let writer = Agent::builder("writer")
        .with_id("writer")
        .with_client(client)
        .with_bus(Arc::clone(&bus))
        .build()
        .unwrap();

    let result = writer.run("publish the spec", None).await;

    assert!(result.success);
    assert_eq!(bus.get_artifact("spec"), Some(json!("v1")));
    assert_eq!(bus.get_artifact("spec"), bus.get_artifact("spec"));
    let summary = bus.list_artifacts(Some("document"));
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].owner, "writer");
}
