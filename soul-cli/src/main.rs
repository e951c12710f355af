//! Soul CLI: run an agent from the terminal.
//!
//! Thin driver over `soul`: argument parsing, tracing setup, a minimal REPL
//! loop, and (absent `--openai`) a canned demo provider so the whole step
//! loop — checkpoints, tool dispatch, approval gate — is exercisable without
//! a network connection.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use soul::agent_spec::{self, ResolvedAgentSpec};
use soul::dmail::SendDmailTool;
use soul::labor_market::{CreateSubagentTool, TaskTool};
use soul::llm::{ChatProvider, MockChatProvider};
use soul::{Config, Context, Runtime, Soul, ToolRegistry, UserInput, Wire, WireEvent};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// How many turns the built-in demo provider can answer before it runs out
/// of canned responses (each un-tooled turn consumes exactly one). Plenty
/// for an interactive session; the real provider has no such limit.
const DEMO_PROVIDER_TURNS: usize = 2000;

const DEMO_REPLY: &str =
    "(demo mode: no model is configured — pass --openai-model to use a real one. \
     The step loop, context checkpoints, and tool dispatch above are real.)";

#[derive(Parser, Debug)]
#[command(name = "soul")]
#[command(about = "Soul — run an agent execution core from the terminal")]
struct Args {
    /// User message. With no message and no --interactive, reads one line from stdin.
    message: Option<String>,

    /// Path to a YAML agent spec (see `soul::agent_spec`). Without one, a
    /// minimal built-in assistant spec with no tools is used.
    #[arg(long, value_name = "PATH")]
    agent_spec: Option<PathBuf>,

    /// Working directory for file-relative tools and `${KIMI_WORK_DIR}`.
    #[arg(long, value_name = "DIR")]
    work_dir: Option<PathBuf>,

    /// Directory session state (context files, metadata.json) is kept in.
    #[arg(long, value_name = "DIR")]
    state_dir: Option<PathBuf>,

    /// Keep reading turns from stdin after the first reply.
    #[arg(short, long)]
    interactive: bool,

    /// Auto-approve every tool approval request.
    #[arg(long)]
    yolo: bool,

    /// Use the real OpenAI-backed provider instead of the built-in demo
    /// provider. Requires the `openai` feature and a model name.
    #[arg(long, value_name = "MODEL")]
    openai_model: Option<String>,
}

fn default_agent_spec() -> Arc<ResolvedAgentSpec> {
    Arc::new(ResolvedAgentSpec {
        name: "assistant".to_string(),
        system_prompt_template: "You are a helpful assistant running in a terminal.".to_string(),
        system_prompt_args: HashMap::new(),
        tool_keys: Vec::new(),
        subagent_paths: Vec::new(),
    })
}

fn build_registry() -> ToolRegistry {
    let registry = ToolRegistry::new();
    registry.register(Arc::new(SendDmailTool));
    registry.register(Arc::new(TaskTool));
    registry.register(Arc::new(CreateSubagentTool));
    registry
}

fn demo_provider() -> MockChatProvider {
    let responses = (0..DEMO_PROVIDER_TURNS)
        .map(|_| soul::llm::ChatResponse {
            message: soul::Message::assistant(vec![soul::ContentPart::text(DEMO_REPLY)]),
            usage: Default::default(),
        })
        .collect();
    MockChatProvider::new(responses)
}

#[cfg(feature = "openai")]
fn build_provider(model: Option<&str>) -> Arc<dyn ChatProvider> {
    match model {
        Some(model) => Arc::new(soul::llm::ChatOpenAiProvider::new(model.to_string())),
        None => Arc::new(demo_provider()),
    }
}

#[cfg(not(feature = "openai"))]
fn build_provider(model: Option<&str>) -> Arc<dyn ChatProvider> {
    if model.is_some() {
        eprintln!("soul: --openai-model requires building with --features openai; ignoring");
    }
    Arc::new(demo_provider())
}

/// Prints one wire event as a short line, recursing into `SubagentEvent`
/// with an indent so nested sub-agent runs are visually distinguishable.
fn print_event(event: &WireEvent, depth: usize) {
    let pad = "  ".repeat(depth);
    match event {
        WireEvent::TurnBegin { user_input } => {
            println!("{pad}» {user_input}");
        }
        WireEvent::StepBegin { n } => {
            println!("{pad}[step {n}]");
        }
        WireEvent::Content(part) => {
            if let Some(text) = part.as_text() {
                print!("{text}");
                let _ = std::io::stdout().flush();
            }
        }
        WireEvent::ToolCall(call) => {
            println!("{pad}-> {} {}", call.name, call.arguments);
        }
        WireEvent::ToolResult(result) => {
            println!("{pad}<- {:?}", result.return_value);
        }
        WireEvent::CompactionBegin => println!("{pad}(compacting context...)"),
        WireEvent::CompactionEnd => println!("{pad}(compaction done)"),
        WireEvent::ApprovalRequest(req) => {
            println!("{pad}[approval requested] {}: {}", req.action, req.description);
        }
        WireEvent::SubagentEvent { task_tool_call_id, inner } => {
            println!("{pad}[subagent {task_tool_call_id}]");
            print_event(inner, depth + 1);
        }
        _ => {}
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let work_dir = args
        .work_dir
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let state_dir = args
        .state_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("soul-cli-sessions"));

    let registry = build_registry();
    let agent = match &args.agent_spec {
        Some(path) => Arc::new(agent_spec::load_and_resolve(path, &registry).await?),
        None => default_agent_spec(),
    };

    let mut config = Config::default();
    config.yolo = args.yolo;
    let config = Arc::new(config);

    let mut table = soul::context::SessionTable::open(&state_dir).await?;
    let session = table.create_session(&work_dir, "soul-cli session").await?;
    table.set_last_session(&session).await?;
    let context = Context::open(&session.context_file).await?;

    let (wire, mut ui) = Wire::split();
    let printer = tokio::spawn(async move {
        while let Some(event) = ui.receive(true).await {
            print_event(&event, 0);
        }
    });

    let llm_binding = build_provider(args.openai_model.as_deref());
    let runtime = Runtime::new(
        config,
        llm_binding,
        Arc::new(session),
        HashMap::new(),
        wire.clone(),
        std::env::vars().collect(),
    );

    let mut soul = Soul::new(agent, runtime, context, wire, Arc::new(registry)).await?;
    let cancel_root = CancellationToken::new();
    {
        let cancel_root = cancel_root.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel_root.cancel();
            }
        });
    }

    let first_message = args.message.clone();
    if args.interactive {
        if let Some(msg) = first_message.filter(|m| !m.trim().is_empty()) {
            run_turn(&mut soul, msg, cancel_root.clone()).await;
        }
        let stdin = std::io::stdin();
        loop {
            print!("> ");
            std::io::stdout().flush().ok();
            let mut line = String::new();
            if stdin.read_line(&mut line)? == 0 || line.trim().is_empty() {
                break;
            }
            run_turn(&mut soul, line.trim().to_string(), cancel_root.clone()).await;
        }
    } else {
        let msg = match first_message {
            Some(m) => m,
            None => {
                let mut line = String::new();
                std::io::stdin().read_line(&mut line)?;
                line.trim().to_string()
            }
        };
        if !msg.is_empty() {
            run_turn(&mut soul, msg, cancel_root.clone()).await;
        }
    }

    drop(soul);
    printer.await.ok();
    Ok(())
}

async fn run_turn(soul: &mut Soul, message: String, cancel_root: CancellationToken) {
    let cancel = cancel_root.child_token();
    match soul.run(UserInput::Text(message), cancel).await {
        Ok(()) => println!(),
        Err(e) => eprintln!("\nsoul: turn failed: {e}"),
    }
}
