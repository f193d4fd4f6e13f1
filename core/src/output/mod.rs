//! Output formatting module
//!
//! Handles display of published signatures, recovered history, and the
//! effective configuration using colored output.

use crate::config::PactConfig;
use crate::ledger::Signature;
use crate::protocol::PactEvent;
use crate::publisher::explorer_link;
use crate::scanner::{HistoryPage, RecordedEvent, ScanReport};
use crate::util::mask_secret;
use chrono::{DateTime, Utc};
use console::Style;
use serde_json::{json, Value};

/// Output formatter for CLI results
pub struct OutputFormatter {
    // Styles
    blue: Style,
    green: Style,
    yellow: Style,
    bold: Style,
    dim: Style,
}

impl Default for OutputFormatter {
    fn default() -> Self {
        Self {
            blue: Style::new().blue(),
            green: Style::new().green(),
            yellow: Style::new().yellow(),
            bold: Style::new().bold(),
            dim: Style::new().dim(),
        }
    }
}

impl OutputFormatter {
    /// Create a new formatter
    pub fn new() -> Self {
        Self::default()
    }

    /// Print the result of a publish
    pub fn print_published(&self, event: &PactEvent, signature: &Signature, rpc_url: &str) {
        println!(
            "{} {} event recorded",
            self.green.apply_to("✓"),
            self.bold.apply_to(event.kind())
        );
        println!("Signature: {}", self.blue.apply_to(signature));
        println!("Explorer:  {}", self.dim.apply_to(explorer_link(signature, rpc_url)));
    }

    /// Print an encoded payload without publishing it
    pub fn print_payload(&self, payload: &str, wire_size: usize) {
        println!("{}", payload);
        println!(
            "{}",
            self.dim.apply_to(format!("{} bytes payload, {} bytes on the wire", payload.len(), wire_size))
        );
    }

    /// Print a page of history, newest first
    pub fn print_history(&self, identity: &str, page: &HistoryPage) {
        println!();
        println!("{} {}", self.bold.apply_to("History for"), self.blue.apply_to(identity));

        if page.events.is_empty() {
            println!("{}", self.yellow.apply_to("No AgentPact events found."));
        }
        for recorded in &page.events {
            println!("{}", self.format_event_line(recorded));
        }

        println!();
        println!("{}", self.dim.apply_to(format_report(&page.report)));
        if let Some(cursor) = &page.next_cursor {
            println!("{} --before {}", self.dim.apply_to("More available:"), cursor);
        }
    }

    /// One line per event: time, kind, description, signature
    pub fn format_event_line(&self, recorded: &RecordedEvent) -> String {
        let description = match &recorded.event {
            PactEvent::Handoff(h) => format!("{} → {}: {}", h.from, h.to, h.task),
            PactEvent::Completion(c) => format!("{} finished {}: {}", c.agent, c.task, c.result),
        };
        format!(
            "{}  {:<10}  {}  {}",
            self.dim.apply_to(format_block_time(recorded.block_time)),
            self.green.apply_to(recorded.event.kind()),
            description,
            self.dim.apply_to(short_signature(&recorded.signature))
        )
    }

    /// Print the effective configuration as TOML. Secrets are masked.
    pub fn print_config(&self, config: &PactConfig, source: Option<&std::path::Path>) {
        println!();
        println!("{}", self.bold.apply_to("Current Configuration:"));
        match source {
            Some(path) => println!("- Source: {}", self.green.apply_to(path.display())),
            None => println!("- Source: {}", self.yellow.apply_to("defaults + environment")),
        }

        let mut shown = config.clone();
        if let Some(wallet) = shown.remote_wallet.as_mut() {
            wallet.token = wallet.token.as_deref().map(mask_secret);
        }
        match toml::to_string_pretty(&shown) {
            Ok(text) => println!("{}", text),
            Err(e) => println!("{}", self.yellow.apply_to(format!("(unrenderable: {})", e))),
        }
        if config.local.as_ref().is_some_and(|l| l.private_key.is_some()) {
            println!("{}", self.dim.apply_to("# inline private key set (not shown)"));
        }
    }
}

/// JSON form of a recorded event for machine consumers
pub fn event_json(recorded: &RecordedEvent) -> Value {
    let event = recorded
        .event
        .encode()
        .ok()
        .and_then(|text| serde_json::from_str::<Value>(&text).ok())
        .unwrap_or(Value::Null);
    json!({
        "signature": recorded.signature.to_string(),
        "slot": recorded.slot,
        "blockTime": recorded.block_time,
        "event": event,
    })
}

/// JSON form of a whole page
pub fn page_json(page: &HistoryPage) -> Value {
    json!({
        "events": page.events.iter().map(event_json).collect::<Vec<_>>(),
        "nextCursor": page.next_cursor.map(|s| s.to_string()),
        "report": page.report,
    })
}

/// Render a block time in seconds; `0` means the ledger gave none
pub fn format_block_time(seconds: i64) -> String {
    if seconds == 0 {
        return "unknown time       ".to_string();
    }
    DateTime::<Utc>::from_timestamp(seconds, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| seconds.to_string())
}

fn short_signature(signature: &Signature) -> String {
    let text = signature.to_string();
    if text.len() <= 16 {
        return text;
    }
    format!("{}…{}", &text[..8], &text[text.len() - 8..])
}

fn format_report(report: &ScanReport) -> String {
    format!(
        "{} signatures scanned, {} events, {} skipped (fetch failed {}, failed on ledger {}, no metadata {}, no memo {}, other memo {})",
        report.signatures,
        report.accepted,
        report.skipped(),
        report.fetch_failed,
        report.failed,
        report.missing_meta,
        report.no_annotation,
        report.not_protocol
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::HandoffEvent;

    fn recorded() -> RecordedEvent {
        RecordedEvent {
            signature: Signature([4u8; 64]),
            slot: 42,
            block_time: 1_738_000_000,
            event: PactEvent::Handoff(HandoffEvent {
                from: "Kevin".to_string(),
                to: "Clawd".to_string(),
                task: "Investigate pricing page".to_string(),
                timestamp: 1_738_000_000_000,
            }),
        }
    }

    #[test]
    fn test_event_json_shape() {
        let value = event_json(&recorded());
        assert_eq!(value["slot"], 42);
        assert_eq!(value["blockTime"], 1_738_000_000i64);
        assert_eq!(value["event"]["protocol"], "AgentPact");
        assert_eq!(value["event"]["action"], "handoff");
        assert_eq!(value["event"]["from"], "Kevin");
    }

    #[test]
    fn test_format_event_line() {
        console::set_colors_enabled(false);
        let line = OutputFormatter::new().format_event_line(&recorded());
        assert!(line.contains("2025-01-27"));
        assert!(line.contains("Kevin → Clawd: Investigate pricing page"));
        assert!(line.contains('…'));
    }

    #[test]
    fn test_format_block_time_unknown() {
        assert!(format_block_time(0).starts_with("unknown"));
        assert_eq!(format_block_time(86_400), "1970-01-02 00:00:00");
    }

    #[test]
    fn test_page_json_cursor() {
        let page = HistoryPage {
            events: vec![recorded()],
            next_cursor: Some(Signature([4u8; 64])),
            report: ScanReport {
                signatures: 1,
                accepted: 1,
                ..ScanReport::default()
            },
        };
        let value = page_json(&page);
        assert_eq!(value["events"].as_array().unwrap().len(), 1);
        assert!(value["nextCursor"].is_string());
        assert_eq!(value["report"]["accepted"], 1);
    }
}
