// Follow the live activity feed

use anyhow::{bail, Result};
use docflow_feed_client::{ConnectionState, ConnectionStatus, Event, FeedClient, FeedConfig};
use tokio::sync::broadcast::error::RecvError;

use crate::output::OutputFormat;

pub async fn run(
    config: FeedConfig,
    output: OutputFormat,
    quiet: bool,
    types: &[String],
    limit: Option<usize>,
) -> Result<()> {
    if limit == Some(0) {
        return Ok(());
    }

    if !quiet {
        eprintln!(
            "Following {} (tenant: {})",
            config.endpoint,
            config.tenant()
        );
    }

    let client = FeedClient::start(config);
    let mut events = client.subscribe_events();
    let mut states = client.subscribe_state();
    let mut printed = 0usize;

    let outcome = loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let state = states.borrow_and_update().clone();
                if !quiet {
                    report_state(&state);
                }
                if state.status == ConnectionStatus::Error {
                    break Err(state.last_error.unwrap_or_else(|| "connection failed".to_string()));
                }
            }
            received = events.recv() => match received {
                Ok(event) => {
                    if !matches_filter(&event, types) {
                        continue;
                    }
                    print_event(&event, output)?;
                    printed += 1;
                    if limit.is_some_and(|limit| printed >= limit) {
                        break Ok(());
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Output fell behind the feed, events were dropped");
                }
                Err(RecvError::Closed) => break Ok(()),
            },
            _ = tokio::signal::ctrl_c() => break Ok(()),
        }
    };

    if let Err(e) = client.shutdown().await {
        tracing::debug!(error = %e, "Feed client already stopped");
    }

    match outcome {
        Ok(()) => Ok(()),
        Err(message) => bail!("Feed unavailable: {}", message),
    }
}

fn matches_filter(event: &Event, types: &[String]) -> bool {
    types.is_empty() || types.iter().any(|t| *t == event.event_type)
}

fn report_state(state: &ConnectionState) {
    match &state.last_error {
        Some(error) if state.status != ConnectionStatus::Connected => {
            eprintln!("[{}] {} (attempt {})", state.status, error, state.attempts)
        }
        _ => eprintln!("[{}]", state.status),
    }
}

fn print_event(event: &Event, output: OutputFormat) -> Result<()> {
    if !output.is_text() {
        return output.print_record(event);
    }

    let details = if event.details.is_empty() {
        String::new()
    } else {
        serde_json::to_string(&event.details)?
    };
    println!(
        "{}  {:<24} {:<12} {}",
        event.ts.format("%Y-%m-%d %H:%M:%S"),
        event.event_type,
        event.tenant_id,
        details
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_filter() {
        let event = Event::new("1", "document_processed", "acme");
        assert!(matches_filter(&event, &[]));
        assert!(matches_filter(
            &event,
            &["user_login".to_string(), "document_processed".to_string()]
        ));
        assert!(!matches_filter(&event, &["user_login".to_string()]));
    }
}
