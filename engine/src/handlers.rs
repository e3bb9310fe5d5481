//! Command handlers for CLI operations
//!
//! - run: the console kiosk, staff commands on stdin
//! - replay: an event log through the orchestrator, no I/O performed
//! - memory: list and review stored items
//! - housekeeping: one expiry sweep
//! - doctor: validate configuration and check dependencies

use anyhow::{Context, Result};
use kiosk_sdk::errors::EngineError;
use kiosk_sdk::types::{ConsentAnswer, Effect, Event};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};

use crate::cli::MemoryAction;
use crate::config::Config;
use crate::db::{sweep, Database, MemoryItem, RetentionPolicy};
use crate::executor::ConsoleDevice;
use crate::host::{Clock, KioskHost, SystemClock};
use crate::orchestrator::{transition, OrchestratorState};
use crate::providers::Providers;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

const STAFF_HELP: &str = "commands: ptt <text> | yes | no | room | stop | resume | \
                          confirm <id> | reject <id> | quit";

/// One line typed on the staff console
#[derive(Debug, Clone, PartialEq)]
pub enum StaffInput {
    /// Push-to-talk with the given words as the recording
    Utterance(String),
    Event(Event),
    Quit,
}

/// Parse a staff console line. Unknown commands yield `None`.
pub fn parse_staff_command(line: &str) -> Option<StaffInput> {
    let line = line.trim();
    let (command, arg) = match line.split_once(char::is_whitespace) {
        Some((command, arg)) => (command, arg.trim()),
        None => (line, ""),
    };

    let input = match (command, arg) {
        ("ptt", text) if !text.is_empty() => StaffInput::Utterance(text.to_string()),
        ("yes", "") => StaffInput::Event(Event::UiConsentButton {
            answer: ConsentAnswer::Yes,
        }),
        ("no", "") => StaffInput::Event(Event::UiConsentButton {
            answer: ConsentAnswer::No,
        }),
        ("room", "") => StaffInput::Event(Event::StaffForceRoom),
        ("stop", "") => StaffInput::Event(Event::StaffEmergencyStop),
        ("resume", "") => StaffInput::Event(Event::StaffResume),
        ("confirm", id) if !id.is_empty() => StaffInput::Event(Event::StaffMemoryConfirm {
            memory_id: id.to_string(),
        }),
        ("reject", id) if !id.is_empty() => StaffInput::Event(Event::StaffMemoryReject {
            memory_id: id.to_string(),
        }),
        ("quit", "") | ("exit", "") => StaffInput::Quit,
        _ => return None,
    };
    Some(input)
}

/// Run the kiosk on the console until `quit`, end of input or Ctrl-C
pub async fn handle_run(stub: bool, config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;

    let providers = if stub {
        Providers::stub()
    } else {
        Providers::from_config(&config.providers)?
    };
    tracing::info!(
        "Providers: stt={}, chat={}, inner_task={}",
        providers.stt.name(),
        providers.chat.name(),
        providers.inner_task.name()
    );

    let device = Arc::new(ConsoleDevice::new());
    let host = KioskHost::new(
        device.clone(),
        providers,
        database.memories(RetentionPolicy::from(&config.store)),
        Arc::new(SystemClock),
        config.host.event_buffer,
    )
    .with_tick_interval(config.host.tick_interval())
    .with_housekeeping(config.store.housekeeping_interval());

    println!("{}", STAFF_HELP);

    let (quit_tx, quit_rx) = oneshot::channel();
    let reader = tokio::spawn(read_staff_commands(device, host.sender(), quit_tx));

    let shutdown = async {
        tokio::select! {
            _ = quit_rx => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    };
    let final_state = host.run(shutdown).await;

    reader.abort();
    database.close().await?;

    match format {
        OutputFormat::Text => println!(
            "Stopped in {} mode ({})",
            final_state.mode,
            final_state.phase.as_str()
        ),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&final_state)?),
    }

    Ok(())
}

async fn read_staff_commands(
    device: Arc<ConsoleDevice>,
    events: mpsc::Sender<Event>,
    quit: oneshot::Sender<()>,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Failed to read staff input: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let sent = match parse_staff_command(&line) {
            Some(StaffInput::Utterance(text)) => {
                if let Err(e) = device.stage_utterance(text) {
                    tracing::error!("{}", e);
                    continue;
                }
                events.send(Event::StaffPttDown).await.is_ok()
                    && events.send(Event::StaffPttUp).await.is_ok()
            }
            Some(StaffInput::Event(event)) => events.send(event).await.is_ok(),
            Some(StaffInput::Quit) => break,
            None => {
                println!("{}", STAFF_HELP);
                true
            }
        };
        if !sent {
            tracing::warn!("{}", EngineError::ChannelClosed);
            break;
        }
    }

    let _ = quit.send(());
}

/// One line of an event log
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayLine {
    pub now_ms: i64,
    pub event: Event,
}

/// What one replayed event did
#[derive(Debug, Clone, Serialize)]
pub struct ReplayStep {
    pub now_ms: i64,
    pub event: Event,
    pub effects: Vec<Effect>,
    pub state: OrchestratorState,
}

/// Run an event log through the orchestrator, starting from a fresh state
/// at the first timestamp. Blank lines and `#` comments are skipped.
pub fn replay_events(log: &str) -> std::result::Result<Vec<ReplayStep>, EngineError> {
    let mut state: Option<OrchestratorState> = None;
    let mut steps = Vec::new();

    for (index, raw) in log.lines().enumerate() {
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with('#') {
            continue;
        }

        let line: ReplayLine =
            serde_json::from_str(raw).map_err(|e| EngineError::InvalidEvent {
                line: index + 1,
                reason: e.to_string(),
            })?;

        let current = state.unwrap_or_else(|| OrchestratorState::new(line.now_ms));
        let (next, effects) = transition(&current, &line.event, line.now_ms);

        steps.push(ReplayStep {
            now_ms: line.now_ms,
            event: line.event,
            effects,
            state: next.clone(),
        });
        state = Some(next);
    }

    Ok(steps)
}

pub async fn handle_replay(file: &Path, format: OutputFormat) -> Result<()> {
    let log = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read event log {}", file.display()))?;

    let steps = replay_events(&log)?;

    match format {
        OutputFormat::Text => {
            for step in &steps {
                println!(
                    "[{}] {} -> {} ({})",
                    step.now_ms,
                    step.event.name(),
                    step.state.phase.as_str(),
                    step.state.mode
                );
                for effect in &step.effects {
                    println!("    {}", serde_json::to_string(effect)?);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "steps": steps,
                "count": steps.len(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

pub async fn handle_memory(action: MemoryAction, config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;
    let repo = database.memories(RetentionPolicy::from(&config.store));
    let now_ms = SystemClock.now_ms();

    let result = match action {
        MemoryAction::List { name, status } => {
            let items = repo
                .list(name.as_deref(), status)
                .await
                .context("Failed to list memories")?;
            print_items(&items, format)
        }
        MemoryAction::Confirm { id } => repo
            .confirm(&id, now_ms)
            .await
            .and_then(|item| print_item("Confirmed", &item, format)),
        MemoryAction::Reject { id } => repo
            .reject(&id, now_ms)
            .await
            .and_then(|item| print_item("Rejected", &item, format)),
        MemoryAction::Delete { id } => repo
            .soft_delete(&id, now_ms)
            .await
            .and_then(|item| print_item("Deleted", &item, format)),
    };

    database.close().await?;
    result
}

fn format_ms(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

fn print_items(items: &[MemoryItem], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            if items.is_empty() {
                println!("No memory items");
                return Ok(());
            }
            for item in items {
                println!("{}", item.id);
                println!("  {} / {}: {}", item.personal_name, item.kind, item.value);
                println!("  Status: {}", item.status);
                if let Some(quote) = &item.source_quote {
                    println!("  Said: {}", quote);
                }
                println!("  Created: {}", format_ms(item.created_at_ms));
                if let Some(expires) = item.expires_at_ms {
                    println!("  Expires: {}", format_ms(expires));
                }
                println!();
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "items": items,
                "count": items.len(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn print_item(verb: &str, item: &MemoryItem, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => println!(
            "{} {} ({} / {}: {})",
            verb, item.id, item.personal_name, item.kind, item.value
        ),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(item)?),
    }
    Ok(())
}

pub async fn handle_housekeeping(config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;
    let repo = database.memories(RetentionPolicy::from(&config.store));

    let deleted = sweep(&repo, SystemClock.now_ms()).await?;
    database.close().await?;

    match format {
        OutputFormat::Text => println!("Removed {} expired memory items", deleted),
        OutputFormat::Json => println!("{}", json!({ "deleted": deleted })),
    }
    Ok(())
}

/// Validate configuration and check the database and providers
pub async fn handle_doctor(config: &Config, format: OutputFormat) -> Result<()> {
    let mut issues = Vec::new();
    let mut checks: Vec<(String, String)> = Vec::new();

    // Config is validated when loaded
    checks.push(("Configuration".to_string(), "Valid".to_string()));

    if config.core.data_dir.exists() {
        checks.push(("Data directory".to_string(), "Exists".to_string()));
    } else {
        checks.push(("Data directory".to_string(), "Missing".to_string()));
        issues.push(format!(
            "Data directory does not exist: {:?}",
            config.core.data_dir
        ));
    }

    match Database::new(&config.database_path()).await {
        Ok(database) => {
            checks.push(("Database".to_string(), "OK".to_string()));
            let repo = database.memories(RetentionPolicy::from(&config.store));
            match repo
                .list(None, Some(kiosk_sdk::types::MemoryStatus::Pending))
                .await
            {
                Ok(pending) => checks.push((
                    "Pending memories".to_string(),
                    pending.len().to_string(),
                )),
                Err(e) => issues.push(format!("Cannot read memory items: {:#}", e)),
            }
            database.close().await?;
        }
        Err(e) => {
            checks.push(("Database".to_string(), "Failed".to_string()));
            issues.push(format!("Cannot open database: {:#}", e));
        }
    }

    match Providers::from_config(&config.providers) {
        Ok(providers) => {
            let health = [
                ("STT", providers.stt.name().to_string(), providers.stt.check_health().await),
                ("Chat", providers.chat.name().to_string(), providers.chat.check_health().await),
                (
                    "Inner task",
                    providers.inner_task.name().to_string(),
                    providers.inner_task.check_health().await,
                ),
            ];
            for (label, name, healthy) in health {
                let status = if healthy { "Available" } else { "Not available" };
                checks.push((format!("{} ({})", label, name), status.to_string()));
                if !healthy {
                    issues.push(format!(
                        "{} provider '{}' is not reachable. The kiosk will answer with fallback phrases.",
                        label, name
                    ));
                }
            }
        }
        Err(e) => {
            checks.push(("Providers".to_string(), "Invalid".to_string()));
            issues.push(e.to_string());
        }
    }

    match format {
        OutputFormat::Text => {
            println!("Kiosk System Diagnostics");
            println!("========================");
            println!();

            println!("System Checks:");
            for (check, status) in &checks {
                println!("  {:<25} {}", format!("{}:", check), status);
            }

            println!();

            if issues.is_empty() {
                println!("✓ All checks passed!");
            } else {
                println!("⚠ Issues found:");
                println!();
                for (i, issue) in issues.iter().enumerate() {
                    println!("  {}. {}", i + 1, issue);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "checks": checks.iter().map(|(name, status)| {
                    json!({
                        "name": name,
                        "status": status
                    })
                }).collect::<Vec<_>>(),
                "issues": issues,
                "healthy": issues.is_empty()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::Phase;
    use kiosk_sdk::types::Mode;

    #[test]
    fn test_parse_staff_commands() {
        assert_eq!(
            parse_staff_command("ptt パーソナル、ゆうた"),
            Some(StaffInput::Utterance("パーソナル、ゆうた".to_string()))
        );
        assert_eq!(
            parse_staff_command(" yes "),
            Some(StaffInput::Event(Event::UiConsentButton {
                answer: ConsentAnswer::Yes
            }))
        );
        assert_eq!(
            parse_staff_command("confirm abc-123"),
            Some(StaffInput::Event(Event::StaffMemoryConfirm {
                memory_id: "abc-123".to_string()
            }))
        );
        assert_eq!(parse_staff_command("quit"), Some(StaffInput::Quit));
    }

    #[test]
    fn test_parse_staff_command_rejects_malformed() {
        assert_eq!(parse_staff_command("ptt"), None);
        assert_eq!(parse_staff_command("confirm"), None);
        assert_eq!(parse_staff_command("room now"), None);
        assert_eq!(parse_staff_command("dance"), None);
    }

    #[test]
    fn test_replay_switches_to_personal() {
        let log = r#"
# a child asks for personal mode
{"now_ms": 1000, "event": {"type": "STAFF_PTT_DOWN"}}
{"now_ms": 2000, "event": {"type": "STAFF_PTT_UP"}}
{"now_ms": 2500, "event": {"type": "STT_RESULT", "request_id": "stt-1", "text": "パーソナル、ゆうた"}}
"#;
        let steps = replay_events(log).unwrap();
        assert_eq!(steps.len(), 3);

        let last = steps.last().unwrap();
        assert_eq!(last.state.mode, Mode::personal("ゆうた"));
        assert_eq!(last.state.phase, Phase::Idle);
        assert!(last.effects.contains(&Effect::SetMode {
            mode: Mode::personal("ゆうた")
        }));
    }

    #[test]
    fn test_replay_reports_bad_line() {
        let log = "{\"now_ms\": 1, \"event\": {\"type\": \"TICK\"}}\n{\"now_ms\": 2, \"event\": {\"type\": \"DANCE\"}}\n";
        match replay_events(log) {
            Err(EngineError::InvalidEvent { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected: {:?}", other.map(|s| s.len())),
        }
    }
}
