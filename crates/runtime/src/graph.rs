//! Built-in graph executor.
//!
//! Compiles authored nodes/edges into a walkable graph of LLM agent nodes
//! and drives one node at a time: stream the model, dispatch requested
//! tools, follow normal / conditional / loop-back edges, and checkpoint
//! after every node. Nodes marked `interruptBefore` suspend the run with a
//! pending task; resume continues from the recorded target.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use strand_domain::llm::RunMessage;
use strand_domain::stream::LlmDelta;
use strand_domain::{Error, Result};
use strand_graphs::model::{EdgeKind, GraphEdge, GraphNode};

use crate::checkpoint::{CheckpointStore, PendingTask, StateSnapshot};
use crate::command::ResumeCommand;
use crate::event::{RuntimeEvent, RuntimeEventKind};
use crate::llm::{ChatRequest, LlmClient};
use crate::runtime::{EventStream, GraphRuntime, RunConfig, RunInput};
use crate::tool::ToolRegistry;

/// Tool-call round trips allowed within one node before it is cut off.
const MAX_TOOL_LOOPS: usize = 25;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Compiled shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub name: String,
    pub label: String,
    pub node_type: String,
    pub prompt: String,
    pub interrupt_before: bool,
    /// Qualified tool names enabled on this node.
    pub tools: Vec<String>,
}

#[derive(Debug, Clone)]
struct EdgeSpec {
    source: String,
    target: String,
    kind: EdgeKind,
    /// State key inspected by conditional and loop-back edges.
    condition: Option<String>,
    /// Expected value under `condition`; a missing route key means
    /// "truthy".
    route_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompiledGraph {
    nodes: HashMap<String, NodeSpec>,
    edges: Vec<EdgeSpec>,
    entry: String,
}

impl CompiledGraph {
    /// Compile stored nodes and edges. Node names derive from the editor
    /// label when present, otherwise `{type}_{n}`.
    pub fn compile(nodes: &[GraphNode], edges: &[GraphEdge]) -> Result<Self> {
        if nodes.is_empty() {
            return Err(Error::Validation("graph has no nodes".into()));
        }

        let mut by_id: HashMap<Uuid, String> = HashMap::new();
        let mut specs: HashMap<String, NodeSpec> = HashMap::new();
        let mut ordered_names = Vec::new();

        for (index, node) in nodes.iter().enumerate() {
            let label = node
                .data
                .get("label")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}_{}", node.node_type, index + 1));
            let mut name = slugify(&label);
            if name.is_empty() || specs.contains_key(&name) {
                name = format!("{}_{}", node.node_type, index + 1);
            }

            let config = node.config();
            let interrupt_before = config
                .get("interruptBefore")
                .and_then(Value::as_bool)
                .unwrap_or(false)
                || node.node_type == "human_review";
            let tools = node
                .tools
                .as_object()
                .map(|map| {
                    map.iter()
                        .filter(|(_, enabled)| !matches!(enabled, Value::Bool(false) | Value::Null))
                        .map(|(tool, _)| tool.clone())
                        .collect()
                })
                .unwrap_or_default();

            by_id.insert(node.id, name.clone());
            ordered_names.push(name.clone());
            specs.insert(
                name.clone(),
                NodeSpec {
                    name,
                    label,
                    node_type: node.node_type.clone(),
                    prompt: node.prompt.clone(),
                    interrupt_before,
                    tools,
                },
            );
        }

        let mut edge_specs = Vec::with_capacity(edges.len());
        for edge in edges {
            let (Some(source), Some(target)) =
                (by_id.get(&edge.source_node_id), by_id.get(&edge.target_node_id))
            else {
                tracing::warn!(edge_id = %edge.id, "skipping edge with dangling endpoint");
                continue;
            };
            edge_specs.push(EdgeSpec {
                source: source.clone(),
                target: target.clone(),
                kind: edge.kind(),
                condition: edge
                    .data
                    .get("condition")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                route_key: edge.route_key().map(str::to_string),
            });
        }

        // Entry: the first node with no incoming forward edge.
        let entry = ordered_names
            .iter()
            .find(|name| {
                !edge_specs
                    .iter()
                    .any(|e| e.kind != EdgeKind::LoopBack && e.target == **name)
            })
            .unwrap_or(&ordered_names[0])
            .clone();

        Ok(Self {
            nodes: specs,
            edges: edge_specs,
            entry,
        })
    }

    /// Single default agent used when a turn names no graph.
    pub fn default_agent() -> Self {
        let spec = NodeSpec {
            name: "agent".into(),
            label: "Agent".into(),
            node_type: "agent".into(),
            prompt: String::new(),
            interrupt_before: false,
            tools: Vec::new(),
        };
        Self {
            nodes: HashMap::from([(spec.name.clone(), spec)]),
            edges: Vec::new(),
            entry: "agent".into(),
        }
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn node(&self, name: &str) -> Option<&NodeSpec> {
        self.nodes.get(name)
    }

    /// Pick the next node after `current`: conditional and loop-back edges
    /// route on the state values; the first normal edge is the fallthrough.
    fn next_node(&self, current: &str, values: &Map<String, Value>) -> Option<&str> {
        let outgoing = || self.edges.iter().filter(|e| e.source == current);
        for edge in outgoing().filter(|e| e.kind != EdgeKind::Normal) {
            if edge_matches(edge, values) {
                return Some(&edge.target);
            }
        }
        outgoing()
            .find(|e| e.kind == EdgeKind::Normal)
            .map(|e| e.target.as_str())
    }
}

fn edge_matches(edge: &EdgeSpec, values: &Map<String, Value>) -> bool {
    let Some(key) = edge.condition.as_deref().or(edge.route_key.as_deref()) else {
        return false;
    };
    let Some(value) = values.get(key) else {
        return false;
    };
    match edge.route_key.as_deref() {
        // With an explicit route key the state value must match it.
        Some(expected) if edge.condition.is_some() => match value {
            Value::String(s) => s == expected,
            other => other.to_string() == expected,
        },
        // Route-key-only or condition-only edges fire on truthiness.
        _ => match value {
            Value::Bool(b) => *b,
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            Value::Number(n) => n.as_f64() != Some(0.0),
            _ => true,
        },
    }
}

fn slugify(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Runtime
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
pub struct AgentGraphRuntime {
    graph: Arc<CompiledGraph>,
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    checkpoints: Arc<dyn CheckpointStore>,
}

impl AgentGraphRuntime {
    pub fn new(
        graph: CompiledGraph,
        llm: Arc<dyn LlmClient>,
        tools: Arc<ToolRegistry>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            graph: Arc::new(graph),
            llm,
            tools,
            checkpoints,
        }
    }

    /// Drive the graph from `start`, yielding runtime events. `skip_first_interrupt`
    /// lets a resume run through the node it was suspended before.
    fn run_from(
        &self,
        start: String,
        mut snapshot: StateSnapshot,
        skip_first_interrupt: bool,
        config: &RunConfig,
    ) -> EventStream {
        let graph = self.graph.clone();
        let llm = self.llm.clone();
        let tools = self.tools.clone();
        let checkpoints = self.checkpoints.clone();
        let thread_id = config.thread_id.clone();
        let run_id = config.run_id.to_string();
        let recursion_limit = config.recursion_limit;

        let stream = async_stream::stream! {
            let mut messages = snapshot.messages();
            let mut skip_interrupt = skip_first_interrupt;
            let mut visits: u32 = 0;
            let mut current = Some(start);

            while let Some(node_name) = current.take() {
                visits += 1;
                if visits > recursion_limit {
                    yield Err(Error::Runtime(format!(
                        "recursion limit of {recursion_limit} node visits exceeded"
                    )));
                    return;
                }

                let Some(node) = graph.node(&node_name).cloned() else {
                    yield Err(Error::Runtime(format!("unknown node \"{node_name}\"")));
                    return;
                };

                if node.interrupt_before && !skip_interrupt {
                    snapshot.set_messages(&messages);
                    snapshot.tasks = vec![PendingTask {
                        target_node: node.name.clone(),
                        label: Some(node.label.clone()),
                    }];
                    if let Err(e) = checkpoints.save(&thread_id, &snapshot).await {
                        yield Err(Error::Runtime(format!("failed to checkpoint interrupt: {e}")));
                        return;
                    }
                    tracing::debug!(thread_id = %thread_id, node = %node.name, "run suspended at interrupt");
                    // The stream simply ends; callers discover the
                    // suspension through get_state.
                    return;
                }
                skip_interrupt = false;

                yield Ok(RuntimeEvent::new(RuntimeEventKind::ChainStart)
                    .named(format!("{}_node", node.name))
                    .on_node(node.name.clone())
                    .with_run_id(run_id.clone()));

                // Tool loop: call the model, dispatch any requested tools,
                // feed results back, repeat until a plain completion.
                let mut final_text = String::new();
                let mut rounds = 0usize;
                loop {
                    rounds += 1;
                    if rounds > MAX_TOOL_LOOPS {
                        yield Err(Error::Runtime(format!(
                            "tool loop limit reached ({MAX_TOOL_LOOPS} iterations) in node \"{}\"",
                            node.name
                        )));
                        return;
                    }

                    yield Ok(RuntimeEvent::new(RuntimeEventKind::ChatModelStart)
                        .on_node(node.name.clone())
                        .with_run_id(run_id.clone()));

                    let mut request_messages = Vec::with_capacity(messages.len() + 1);
                    if !node.prompt.is_empty() {
                        request_messages.push(RunMessage::system(node.prompt.clone()));
                    }
                    request_messages.extend(messages.iter().cloned());

                    let mut llm_stream = match llm
                        .chat_stream(ChatRequest {
                            messages: request_messages,
                            model: None,
                            max_tokens: None,
                        })
                        .await
                    {
                        Ok(stream) => stream,
                        Err(e) => {
                            yield Err(Error::Runtime(format!("node \"{}\": {e}", node.name)));
                            return;
                        }
                    };

                    let mut text = String::new();
                    let mut calls = Vec::new();
                    while let Some(delta) = llm_stream.next().await {
                        match delta {
                            Ok(LlmDelta::Token { text: chunk }) => {
                                text.push_str(&chunk);
                                yield Ok(RuntimeEvent::new(RuntimeEventKind::ChatModelStream)
                                    .on_node(node.name.clone())
                                    .with_run_id(run_id.clone())
                                    .with_chunk(chunk));
                            }
                            Ok(LlmDelta::ToolCall { call }) => calls.push(call),
                            Ok(LlmDelta::Done { .. }) => break,
                            Err(e) => {
                                yield Err(Error::Runtime(format!("node \"{}\": {e}", node.name)));
                                return;
                            }
                        }
                    }

                    yield Ok(RuntimeEvent::new(RuntimeEventKind::ChatModelEnd)
                        .on_node(node.name.clone())
                        .with_run_id(run_id.clone())
                        .with_output(Value::String(text.clone())));

                    if calls.is_empty() {
                        final_text = text;
                        break;
                    }

                    messages.push(RunMessage::assistant(text).with_tool_calls(calls.clone()));
                    for call in calls.drain(..) {
                        yield Ok(RuntimeEvent::new(RuntimeEventKind::ToolStart)
                            .named(call.name.clone())
                            .on_node(node.name.clone())
                            .with_run_id(run_id.clone())
                            .with_input(call.arguments.clone()));

                        let output = match tools.resolve_qualified(&call.name) {
                            Some(tool) => match tool.invoke(call.arguments.clone()).await {
                                Ok(output) => output,
                                Err(e) => json!({"error": e.to_string()}),
                            },
                            None => json!({"error": format!("tool \"{}\" not available", call.name)}),
                        };

                        yield Ok(RuntimeEvent::new(RuntimeEventKind::ToolEnd)
                            .named(call.name.clone())
                            .on_node(node.name.clone())
                            .with_run_id(run_id.clone())
                            .with_output(output.clone()));

                        messages.push(RunMessage::tool(output.to_string()));
                    }
                }

                messages.push(RunMessage::assistant(final_text));
                snapshot.set_messages(&messages);
                snapshot.tasks.clear();
                if let Err(e) = checkpoints.save(&thread_id, &snapshot).await {
                    tracing::warn!(thread_id = %thread_id, error = %e, "checkpoint save failed after node");
                }

                yield Ok(RuntimeEvent::new(RuntimeEventKind::ChainEnd)
                    .named(format!("{}_node", node.name))
                    .on_node(node.name.clone())
                    .with_run_id(run_id.clone())
                    .with_messages(messages.clone()));

                current = graph
                    .next_node(&node.name, &snapshot.values)
                    .map(str::to_string);
            }
        };
        Box::pin(stream)
    }
}

#[async_trait::async_trait]
impl GraphRuntime for AgentGraphRuntime {
    async fn stream_events(&self, input: RunInput, config: &RunConfig) -> Result<EventStream> {
        let mut snapshot = StateSnapshot {
            values: input.context,
            tasks: Vec::new(),
        };
        // A fresh turn continues the thread's message history when one is
        // checkpointed.
        let mut messages = match self.checkpoints.load(&config.thread_id).await {
            Ok(Some(previous)) => previous.messages(),
            _ => Vec::new(),
        };
        messages.extend(input.messages);
        snapshot.set_messages(&messages);

        Ok(self.run_from(self.graph.entry().to_string(), snapshot, false, config))
    }

    async fn resume(&self, command: ResumeCommand, config: &RunConfig) -> Result<EventStream> {
        let mut snapshot = self
            .checkpoints
            .load(&config.thread_id)
            .await?
            .ok_or_else(|| Error::NotFound("no checkpoint for thread; execution may have expired".into()))?;
        if !snapshot.is_suspended() {
            return Err(Error::NotFound(
                "no pending interrupt for thread; execution may have expired".into(),
            ));
        }

        if let Some(update) = command.update {
            for (key, value) in update {
                snapshot.values.insert(key, value);
            }
        }
        // `is_suspended` above guarantees at least one pending task.
        let target = command
            .goto
            .unwrap_or_else(|| snapshot.tasks[0].target_node.clone());
        snapshot.tasks.clear();

        Ok(self.run_from(target, snapshot, true, config))
    }

    async fn get_state(&self, config: &RunConfig) -> Result<StateSnapshot> {
        Ok(self
            .checkpoints
            .load(&config.thread_id)
            .await?
            .unwrap_or_default())
    }

    async fn cleanup(&self) {
        // In-process tool backends hold no per-run resources today; the
        // hook stays so containerized backends can release here.
        tracing::debug!("runtime cleanup");
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::FileCheckpointStore;
    use crate::tool::{Tool, BUILTIN_SERVER};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use strand_domain::stream::BoxStream;

    /// LLM client that replays scripted delta sequences, one per call.
    struct ScriptedLlm {
        scripts: Mutex<VecDeque<Vec<LlmDelta>>>,
    }

    impl ScriptedLlm {
        fn new(scripts: Vec<Vec<LlmDelta>>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
            })
        }

        fn tokens(parts: &[&str]) -> Vec<LlmDelta> {
            let mut deltas: Vec<LlmDelta> = parts
                .iter()
                .map(|t| LlmDelta::Token { text: t.to_string() })
                .collect();
            deltas.push(LlmDelta::Done { usage: None });
            deltas
        }
    }

    #[async_trait::async_trait]
    impl LlmClient for ScriptedLlm {
        async fn chat_stream(
            &self,
            _req: ChatRequest,
        ) -> Result<BoxStream<'static, Result<LlmDelta>>> {
            let script = self
                .scripts
                .lock()
                .pop_front()
                .unwrap_or_else(|| ScriptedLlm::tokens(&["(empty)"]));
            Ok(Box::pin(futures_util::stream::iter(
                script.into_iter().map(Ok),
            )))
        }
    }

    struct Upper;

    #[async_trait::async_trait]
    impl Tool for Upper {
        fn name(&self) -> &str {
            "upper"
        }
        async fn invoke(&self, arguments: Value) -> Result<Value> {
            let text = arguments["text"].as_str().unwrap_or_default();
            Ok(json!({"result": text.to_uppercase()}))
        }
    }

    fn test_node(name: &str, node_type: &str, interrupt: bool) -> GraphNode {
        GraphNode {
            id: Uuid::new_v4(),
            graph_id: Uuid::new_v4(),
            node_type: node_type.into(),
            position: Default::default(),
            position_absolute: None,
            width: 0.0,
            height: 0.0,
            prompt: format!("you are {name}"),
            tools: json!({}),
            memory: json!({}),
            data: json!({"label": name, "config": {"interruptBefore": interrupt}}),
        }
    }

    fn edge(source: &GraphNode, target: &GraphNode, data: Value) -> GraphEdge {
        GraphEdge {
            id: Uuid::new_v4(),
            graph_id: source.graph_id,
            source_node_id: source.id,
            target_node_id: target.id,
            data,
        }
    }

    fn config(thread: &str) -> RunConfig {
        RunConfig {
            thread_id: thread.into(),
            run_id: Uuid::new_v4(),
            recursion_limit: 100,
        }
    }

    async fn collect(stream: EventStream) -> Vec<RuntimeEvent> {
        let results: Vec<Result<RuntimeEvent>> = stream.collect().await;
        results.into_iter().map(|r| r.unwrap()).collect()
    }

    fn runtime_with(
        nodes: &[GraphNode],
        edges: &[GraphEdge],
        llm: Arc<dyn LlmClient>,
        dir: &std::path::Path,
    ) -> AgentGraphRuntime {
        let graph = CompiledGraph::compile(nodes, edges).unwrap();
        let tools = Arc::new(ToolRegistry::new());
        tools.register(BUILTIN_SERVER, Arc::new(Upper));
        AgentGraphRuntime::new(
            graph,
            llm,
            tools,
            Arc::new(FileCheckpointStore::new(dir).unwrap()),
        )
    }

    #[test]
    fn compile_rejects_empty_graph() {
        assert!(matches!(
            CompiledGraph::compile(&[], &[]),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn compile_picks_entry_without_incoming_edges() {
        let a = test_node("start", "agent", false);
        let b = test_node("next", "agent", false);
        let edges = vec![edge(&a, &b, json!({}))];
        let graph = CompiledGraph::compile(&[b.clone(), a.clone()], &edges).unwrap();
        assert_eq!(graph.entry(), "start");
    }

    #[tokio::test]
    async fn single_node_run_emits_causal_events() {
        let dir = tempfile::tempdir().unwrap();
        let node = test_node("solo", "agent", false);
        let llm = ScriptedLlm::new(vec![ScriptedLlm::tokens(&["hel", "lo"])]);
        let runtime = runtime_with(&[node], &[], llm, dir.path());

        let stream = runtime
            .stream_events(
                RunInput {
                    messages: vec![RunMessage::user("hi")],
                    context: Default::default(),
                },
                &config("t1"),
            )
            .await
            .unwrap();
        let events = collect(stream).await;

        let kinds: Vec<RuntimeEventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RuntimeEventKind::ChainStart,
                RuntimeEventKind::ChatModelStart,
                RuntimeEventKind::ChatModelStream,
                RuntimeEventKind::ChatModelStream,
                RuntimeEventKind::ChatModelEnd,
                RuntimeEventKind::ChainEnd,
            ]
        );
        // Deltas concatenate to the final assistant text carried on chain_end.
        let deltas: String = events
            .iter()
            .filter_map(|e| e.data.chunk.clone())
            .collect();
        assert_eq!(deltas, "hello");
        let messages = events.last().unwrap().data.messages.clone().unwrap();
        assert_eq!(messages.last().unwrap().content, "hello");
    }

    #[tokio::test]
    async fn tool_calls_dispatch_and_feed_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut node = test_node("worker", "agent", false);
        node.tools = json!({"upper": true});

        let llm = ScriptedLlm::new(vec![
            vec![
                LlmDelta::ToolCall {
                    call: strand_domain::llm::ToolCallRecord {
                        name: "upper".into(),
                        arguments: json!({"text": "abc"}),
                        id: "call_1".into(),
                    },
                },
                LlmDelta::Done { usage: None },
            ],
            ScriptedLlm::tokens(&["ABC it is"]),
        ]);
        let runtime = runtime_with(&[node], &[], llm, dir.path());

        let stream = runtime
            .stream_events(
                RunInput {
                    messages: vec![RunMessage::user("upper abc")],
                    context: Default::default(),
                },
                &config("t2"),
            )
            .await
            .unwrap();
        let events = collect(stream).await;

        let tool_start = events
            .iter()
            .find(|e| e.kind == RuntimeEventKind::ToolStart)
            .unwrap();
        assert_eq!(tool_start.data.input, Some(json!({"text": "abc"})));
        let tool_end = events
            .iter()
            .find(|e| e.kind == RuntimeEventKind::ToolEnd)
            .unwrap();
        assert_eq!(tool_end.data.output, Some(json!({"result": "ABC"})));

        // Two model rounds: one requesting the tool, one concluding.
        let model_starts = events
            .iter()
            .filter(|e| e.kind == RuntimeEventKind::ChatModelStart)
            .count();
        assert_eq!(model_starts, 2);
    }

    #[tokio::test]
    async fn interrupt_node_suspends_and_resume_continues() {
        let dir = tempfile::tempdir().unwrap();
        let first = test_node("draft", "agent", false);
        let review = test_node("review", "agent", true);
        let edges = vec![edge(&first, &review, json!({}))];

        let llm = ScriptedLlm::new(vec![
            ScriptedLlm::tokens(&["draft done"]),
            ScriptedLlm::tokens(&["approved and finished"]),
        ]);
        let runtime = runtime_with(&[first, review], &edges, llm, dir.path());
        let cfg = config("t3");

        let stream = runtime
            .stream_events(
                RunInput {
                    messages: vec![RunMessage::user("go")],
                    context: Default::default(),
                },
                &cfg,
            )
            .await
            .unwrap();
        let events = collect(stream).await;
        // Only the first node ran.
        assert!(events
            .iter()
            .all(|e| e.node() != Some("review")));

        let state = runtime.get_state(&cfg).await.unwrap();
        assert!(state.is_suspended());
        assert_eq!(state.tasks[0].target_node, "review");

        // Resume with an update; the review node now executes.
        let mut update = Map::new();
        update.insert("approved".into(), json!(true));
        let stream = runtime
            .resume(ResumeCommand::default().with_update(update), &cfg)
            .await
            .unwrap();
        let events = collect(stream).await;
        assert!(events.iter().any(|e| e.node() == Some("review")));

        let state = runtime.get_state(&cfg).await.unwrap();
        assert!(!state.is_suspended());
        assert_eq!(state.values["approved"], json!(true));
    }

    #[tokio::test]
    async fn resume_without_checkpoint_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let node = test_node("solo", "agent", false);
        let llm = ScriptedLlm::new(vec![]);
        let runtime = runtime_with(&[node], &[], llm, dir.path());

        let err = runtime
            .resume(ResumeCommand::default(), &config("missing"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn conditional_edge_routes_on_state() {
        let dir = tempfile::tempdir().unwrap();
        let router = test_node("router", "agent", false);
        let yes = test_node("yes", "agent", false);
        let no = test_node("no", "agent", false);
        let edges = vec![
            edge(
                &router,
                &yes,
                json!({"edge_type": "conditional", "condition": "verdict", "route_key": "yes"}),
            ),
            edge(&router, &no, json!({})),
        ];

        let llm = ScriptedLlm::new(vec![
            ScriptedLlm::tokens(&["routing"]),
            ScriptedLlm::tokens(&["took yes branch"]),
        ]);
        let runtime = runtime_with(&[router, yes, no], &edges, llm, dir.path());
        let cfg = config("t4");

        let mut context = Map::new();
        context.insert("verdict".into(), json!("yes"));
        let stream = runtime
            .stream_events(
                RunInput {
                    messages: vec![RunMessage::user("route me")],
                    context,
                },
                &cfg,
            )
            .await
            .unwrap();
        let events = collect(stream).await;
        assert!(events.iter().any(|e| e.node() == Some("yes")));
        assert!(!events.iter().any(|e| e.node() == Some("no")));
    }

    #[tokio::test]
    async fn recursion_limit_stops_runaway_loops() {
        let dir = tempfile::tempdir().unwrap();
        let a = test_node("a", "agent", false);
        let b = test_node("b", "agent", false);
        let edges = vec![
            edge(&a, &b, json!({})),
            // Unconditional-looking loop back: fires while "again" is truthy.
            edge(&b, &a, json!({"edge_type": "loop_back", "condition": "again"})),
        ];

        let scripts: Vec<Vec<LlmDelta>> =
            (0..50).map(|_| ScriptedLlm::tokens(&["step"])).collect();
        let llm = ScriptedLlm::new(scripts);
        let runtime = runtime_with(&[a, b], &edges, llm, dir.path());

        let mut cfg = config("t5");
        cfg.recursion_limit = 7;
        let mut context = Map::new();
        context.insert("again".into(), json!(true));

        let stream = runtime
            .stream_events(
                RunInput {
                    messages: vec![RunMessage::user("loop")],
                    context,
                },
                &cfg,
            )
            .await
            .unwrap();
        let results: Vec<Result<RuntimeEvent>> = stream.collect().await;
        let last = results.last().unwrap();
        assert!(matches!(last, Err(Error::Runtime(msg)) if msg.contains("recursion limit")));
    }

    #[tokio::test]
    async fn second_turn_sees_prior_messages() {
        let dir = tempfile::tempdir().unwrap();
        let node = test_node("solo", "agent", false);
        let llm = ScriptedLlm::new(vec![
            ScriptedLlm::tokens(&["first reply"]),
            ScriptedLlm::tokens(&["second reply"]),
        ]);
        let runtime = runtime_with(&[node], &[], llm, dir.path());
        let cfg = config("t6");

        let stream = runtime
            .stream_events(
                RunInput {
                    messages: vec![RunMessage::user("one")],
                    context: Default::default(),
                },
                &cfg,
            )
            .await
            .unwrap();
        collect(stream).await;

        let stream = runtime
            .stream_events(
                RunInput {
                    messages: vec![RunMessage::user("two")],
                    context: Default::default(),
                },
                &cfg,
            )
            .await
            .unwrap();
        let events = collect(stream).await;
        let messages = events.last().unwrap().data.messages.clone().unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["one", "first reply", "two", "second reply"]
        );
    }
}
