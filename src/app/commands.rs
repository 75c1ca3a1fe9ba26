use crate::adapters::{InMemoryServiceRegistry, JsonFileQueueStore, JsonlHistoryLog, NotificationCenter};
use crate::config::{Command, QueueConfig};
use crate::core::engine::SchedulingEngine;
use crate::core::{
    Direction, HistoryRecord, JoinOutcome, PriorityTier, QueueStore, RankedEntry, ServiceRegistry,
};
use crate::utils::error::Result;
use std::fmt::Write;
use std::path::Path;
use std::sync::Arc;

pub type FileEngine = SchedulingEngine<JsonFileQueueStore, InMemoryServiceRegistry>;

/// Wires the JSON adapters under `data_dir` into an engine.
pub async fn build_file_engine(
    config: &QueueConfig,
    data_dir: &Path,
) -> Result<(FileEngine, Arc<NotificationCenter>)> {
    let inbox = Arc::new(NotificationCenter::open(data_dir.join("notifications.json")).await?);
    let engine = SchedulingEngine::new(
        JsonFileQueueStore::new(data_dir),
        InMemoryServiceRegistry::new(config.services()?),
        Arc::new(JsonlHistoryLog::new(data_dir.join("history.jsonl"))),
        inbox.clone(),
    )
    .with_policy(config.scoring_policy())
    .with_settings(config.engine_settings());

    Ok((engine, inbox))
}

/// Runs one command and returns the text to print.
pub async fn execute<S: QueueStore, R: ServiceRegistry>(
    engine: &SchedulingEngine<S, R>,
    inbox: &NotificationCenter,
    command: Command,
) -> Result<String> {
    let mut out = String::new();

    match command {
        Command::Services => {
            for service in engine.registry().list_services().await? {
                let waiting = engine.queue_snapshot(&service.id).await?.len();
                let _ = writeln!(
                    out,
                    "{:<16} {:<20} {:>3} min  default={:<6} {}  waiting={}",
                    service.id,
                    service.name,
                    service.expected_duration_minutes,
                    service.default_priority,
                    if service.open { "open  " } else { "closed" },
                    waiting
                );
            }
        }
        Command::Join {
            service,
            entrant,
            name,
            priority,
        } => {
            let tier = priority.as_deref().map(str::parse::<PriorityTier>).transpose()?;
            match engine.join(&service, &entrant, name.as_deref(), tier).await? {
                JoinOutcome::Joined(entry) => {
                    let _ = writeln!(
                        out,
                        "✅ {} joined {} ({} priority)",
                        entry.display_name, service, entry.priority_tier
                    );
                }
                JoinOutcome::AlreadyQueued(entry) => {
                    let _ = writeln!(out, "ℹ️  {} is already waiting for {}", entry.display_name, service);
                }
            }
        }
        Command::WalkIn {
            service,
            name,
            priority,
            contact,
            notes,
        } => {
            let tier = priority.parse::<PriorityTier>()?;
            let entry = engine.admin_add(&service, &name, tier, contact, notes).await?;
            let _ = writeln!(out, "✅ Added walk-in {} as {}", entry.display_name, entry.entrant_id);
        }
        Command::Leave { service, entrant } => match engine.leave(&service, &entrant).await? {
            Some(entry) => {
                let _ = writeln!(out, "👋 {} left {}", entry.display_name, service);
            }
            None => {
                let _ = writeln!(out, "{} was not waiting for {}", entrant, service);
            }
        },
        Command::Serve { service } => match engine.serve_next(&service).await? {
            Some(entry) => {
                let _ = writeln!(out, "🛎️  Now serving {} ({})", entry.display_name, entry.entrant_id);
            }
            None => {
                let _ = writeln!(out, "Nobody is waiting for {}", service);
            }
        },
        Command::Remove { service, entrant } => match engine.remove(&service, &entrant).await? {
            Some(entry) => {
                let _ = writeln!(out, "Removed {} from {}", entry.display_name, service);
            }
            None => {
                let _ = writeln!(out, "{} was not waiting for {}", entrant, service);
            }
        },
        Command::Boost {
            service,
            entrant,
            direction,
        } => {
            let direction = direction.parse::<Direction>()?;
            let moved = engine.boost(&service, &entrant, direction).await?;
            report_move(&mut out, moved, &entrant);
            write_ranking(&mut out, &engine.rank(&service).await?);
        }
        Command::Top { service, entrant } => {
            let moved = engine.move_to_top(&service, &entrant).await?;
            report_move(&mut out, moved, &entrant);
            write_ranking(&mut out, &engine.rank(&service).await?);
        }
        Command::Priority {
            service,
            entrant,
            tier,
        } => {
            let tier = tier.parse::<PriorityTier>()?;
            if engine.change_priority(&service, &entrant, tier).await? {
                let _ = writeln!(out, "{} is now {} priority", entrant, tier);
            } else {
                let _ = writeln!(out, "{} was not waiting for {}", entrant, service);
            }
        }
        Command::Rank { service } => {
            write_ranking(&mut out, &engine.rank(&service).await?);
        }
        Command::Status { entrant } => match engine.status_for(&entrant).await? {
            Some(status) => {
                let _ = writeln!(
                    out,
                    "{} is #{} of {} for {} ({} priority, score {:.1}, about {} min)",
                    entrant,
                    status.position,
                    status.total_in_queue,
                    status.service_name,
                    status.priority_tier,
                    status.score,
                    status.estimated_wait_minutes
                );
            }
            None => {
                let _ = writeln!(out, "{} is not waiting", entrant);
            }
        },
        Command::History { entrant } => {
            let records = match entrant {
                Some(id) => engine.history_for(&id).await?,
                None => engine.history().await?,
            };
            write_history(&mut out, &records);
        }
        Command::Notifications { mark_read } => {
            for n in inbox.list().await {
                let _ = writeln!(out, "{} {}", if n.read { " " } else { "•" }, n.message);
            }
            if mark_read {
                inbox.mark_all_read().await?;
            }
        }
    }

    Ok(out)
}

fn report_move(out: &mut String, moved: bool, entrant: &str) {
    if moved {
        let _ = writeln!(out, "↕️  Moved {}", entrant);
    } else {
        let _ = writeln!(out, "{} stays where they are", entrant);
    }
}

fn write_ranking(out: &mut String, ranked: &[RankedEntry]) {
    if ranked.is_empty() {
        let _ = writeln!(out, "(queue is empty)");
        return;
    }
    for r in ranked {
        let _ = writeln!(
            out,
            "{:>3}. {:<24} {:<6} score {:>7.1}{}",
            r.position,
            r.entry.display_name,
            r.entry.priority_tier,
            r.score,
            if r.entry.is_walk_in { "  (walk-in)" } else { "" }
        );
    }
}

fn write_history(out: &mut String, records: &[HistoryRecord]) {
    if records.is_empty() {
        let _ = writeln!(out, "(no history)");
        return;
    }
    for h in records {
        let _ = writeln!(
            out,
            "{}  {:<20} {:<16} {:?}",
            h.resolved_at.format("%Y-%m-%d %H:%M"),
            h.display_name,
            h.service_name,
            h.outcome
        );
    }
}
