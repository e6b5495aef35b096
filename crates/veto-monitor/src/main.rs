mod console;
mod logging;

use chrono::Utc;
use clap::{ArgAction, Parser};
use console::{CommandError, OperatorCommand};
use std::error::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use url::Url;
use veto_controller::{ControllerConfig, SessionController};
use veto_core::{LifecyclePhase, LlmModel, Resolution, SessionConfig, SessionState};

const RECENT_DECISIONS: usize = 5;

#[derive(Parser, Debug)]
#[command(
    name = "veto-monitor",
    about = "Operator console for a live Veto-guarded browser agent session"
)]
struct Args {
    #[arg(long, env = "VETO_BACKEND_URL", default_value = "http://127.0.0.1:8000")]
    backend_url: Url,
    #[arg(long, env = "VETO_API_KEY", default_value = "", hide_env_values = true)]
    api_key: String,
    #[arg(long, env = "VETO_BASE_URL", default_value = "https://api.runveto.com")]
    veto_base_url: String,
    #[arg(long, env = "VETO_LLM_MODEL", default_value = "claude-sonnet-4.5")]
    model: LlmModel,
    #[arg(long, env = "VETO_TASK", default_value = "")]
    task: String,
    #[arg(
        long,
        env = "VETO_DEMO_POLICIES",
        default_value = "true",
        value_parser = parse_bool_flag,
        action = ArgAction::Set
    )]
    demo_policies: bool,
    #[arg(long, env = "MODEL_PROVIDER_TOKEN", hide_env_values = true)]
    provider_token: Option<String>,
    #[arg(long, env = "VETO_LOG_DIR", default_value = logging::DEFAULT_LOG_DIR)]
    log_dir: String,
    /// Exit once the backend reports the session done.
    #[arg(long)]
    exit_on_done: bool,
}

impl Args {
    fn session_config(&self) -> Result<SessionConfig, String> {
        let task = self.task.trim();
        if task.is_empty() {
            return Err("a task is required (--task or VETO_TASK)".to_string());
        }
        let api_key = self.api_key.trim();
        if api_key.is_empty() {
            return Err("a Veto API key is required (--api-key or VETO_API_KEY)".to_string());
        }
        Ok(SessionConfig {
            veto_api_key: api_key.to_string(),
            veto_base_url: self.veto_base_url.trim().to_string(),
            llm_model: self.model,
            task: task.to_string(),
            use_demo_policies: self.demo_policies,
            model_provider_token: self
                .provider_token
                .as_deref()
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string),
        })
    }
}

fn parse_bool_flag(value: &str) -> Result<bool, String> {
    logging::parse_bool(value).ok_or_else(|| format!("expected a boolean, got {value:?}"))
}

enum Flow {
    Continue,
    Quit,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let log_guard = logging::init_logging(&args.log_dir, logging::env_true("VETO_LOG_STDOUT"));
    if let Some(path) = log_guard.as_ref().and_then(|guard| guard.path()) {
        info!(event = "monitor_start", log_file = %path.display());
    }

    let session_config = match args.session_config() {
        Ok(config) => config,
        Err(message) => {
            eprintln!("veto-monitor: {message}");
            std::process::exit(2);
        }
    };

    let (mut controller, mut events) = SessionController::new(ControllerConfig {
        backend_url: args.backend_url.clone(),
    })?;
    info!(event = "controller_ready", backend = %controller.endpoints().base());
    if let Err(err) = controller.health().await {
        warn!(event = "health_check_failed", error = %err);
        println!("warning: backend health check failed: {err}");
    }

    match controller.start(session_config.clone()).await {
        Ok(session_id) => println!("session {session_id} created"),
        Err(err) => {
            eprintln!("error: {}", err.operator_message());
            std::process::exit(1);
        }
    }
    println!("{}", console::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            Some(message) = events.recv() => {
                let was_terminal = controller.state().phase.is_terminal();
                let Some(event) = controller.apply(message) else {
                    continue;
                };
                if let Some(line) = console::event_line(&event, controller.state(), Utc::now()) {
                    println!("{line}");
                }
                if !was_terminal && controller.state().phase.is_terminal() {
                    println!("{}", console::stats_line(&controller.state().stats));
                }
                if args.exit_on_done && matches!(controller.state().phase, LifecyclePhase::Done { .. }) {
                    info!(event = "monitor_exit", reason = "session_done");
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if let Flow::Quit = handle_line(&mut controller, &session_config, &line).await {
                        info!(event = "monitor_exit", reason = "operator_quit");
                        break;
                    }
                }
                Ok(None) => stdin_open = false,
                Err(err) => {
                    warn!(event = "stdin_error", error = %err);
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!(event = "monitor_exit", reason = "interrupted");
                break;
            }
        }
    }

    controller.reset();
    Ok(())
}

async fn handle_line(
    controller: &mut SessionController,
    config: &SessionConfig,
    line: &str,
) -> Flow {
    let command = match console::parse_command(line) {
        Ok(command) => command,
        Err(CommandError::Empty) => return Flow::Continue,
        Err(err) => {
            println!("{err}");
            return Flow::Continue;
        }
    };
    match command {
        OperatorCommand::Approve(id) => resolve(controller, id, Resolution::Approve),
        OperatorCommand::Deny(id) => resolve(controller, id, Resolution::Deny),
        OperatorCommand::Stop => {
            if controller.stop() {
                println!("stop requested");
            } else {
                report_unsent(controller);
            }
        }
        OperatorCommand::Reset => {
            controller.reset();
            println!("{}", console::status_line(controller.state(), Utc::now()));
        }
        OperatorCommand::Restart => match controller.start(config.clone()).await {
            Ok(session_id) => println!("session {session_id} created"),
            Err(err) => println!("error: {}", err.operator_message()),
        },
        OperatorCommand::Status => print_status(controller.state()),
        OperatorCommand::Help => println!("{}", console::HELP),
        OperatorCommand::Quit => return Flow::Quit,
    }
    Flow::Continue
}

fn resolve(controller: &mut SessionController, id: Option<String>, resolution: Resolution) {
    let Some(target) = console::approval_target(controller.state(), id) else {
        println!("no pending approval");
        return;
    };
    let sent = match resolution {
        Resolution::Approve => controller.approve(&target),
        Resolution::Deny => controller.deny(&target),
    };
    if sent {
        println!("{resolution} sent for {target}");
    } else {
        report_unsent(controller);
    }
}

fn report_unsent(controller: &SessionController) {
    if controller.session_id().is_none() {
        println!("no active session");
    } else if let Some(warning) = &controller.state().warning {
        println!("warning: {warning}");
    }
}

fn print_status(state: &SessionState) {
    println!("{}", console::status_line(state, Utc::now()));
    println!("{}", console::stats_line(&state.stats));
    if let Some(error) = &state.error {
        println!("error: {error}");
    }
    if let Some(warning) = &state.warning {
        println!("warning: {warning}");
    }
    for approval in state.approvals.partitioned() {
        println!("{}", console::approval_line(approval));
    }
    for decision in state.decisions.iter().take(RECENT_DECISIONS) {
        println!("{}", console::decision_line(decision));
    }
}
