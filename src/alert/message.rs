//! Block-structured chat message rendering.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use super::AlertPayload;
use crate::config::AlertConfig;
use crate::summary::truncate_chars;

/// Suffix appended to the run URL to reach its uploaded artifacts.
pub const ARTIFACTS_ANCHOR: &str = "#artifacts";

/// Webhook body: an ordered list of layout blocks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlackMessage {
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header {
        text: TextObject,
    },
    Section {
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<TextObject>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        fields: Vec<TextObject>,
    },
    Divider,
    Context {
        elements: Vec<TextObject>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    PlainText { text: String, emoji: bool },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn text(&self) -> &str {
        match self {
            TextObject::PlainText { text, .. } | TextObject::Mrkdwn { text } => text,
        }
    }

    fn mrkdwn(text: impl Into<String>) -> Self {
        TextObject::Mrkdwn { text: text.into() }
    }
}

impl Block {
    fn text_section(text: impl Into<String>) -> Self {
        Block::Section {
            text: Some(TextObject::mrkdwn(text)),
            fields: Vec::new(),
        }
    }
}

/// Renders one [`SlackMessage`] per severity bucket.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    max_listed: usize,
    snippet_chars: usize,
    label: Option<String>,
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new(&AlertConfig::default())
    }
}

impl MessageBuilder {
    pub fn new(config: &AlertConfig) -> Self {
        Self {
            max_listed: config.max_listed.max(1),
            snippet_chars: config.error_snippet_chars,
            label: config.label.clone().filter(|l| !l.trim().is_empty()),
        }
    }

    /// Render `payload`. Callers only build for non-empty buckets.
    pub fn build(&self, payload: &AlertPayload, generated_at: DateTime<Utc>) -> SlackMessage {
        let shown = &payload.failures[..payload.failures.len().min(self.max_listed)];
        let remaining = payload.failures.len() - shown.len();

        let mut blocks = vec![
            Block::Header {
                text: TextObject::PlainText {
                    text: self.header(payload),
                    emoji: true,
                },
            },
            Block::Section {
                text: None,
                fields: vec![
                    TextObject::mrkdwn(format!("*Severity:*\n{}", payload.severity)),
                    TextObject::mrkdwn(format!("*Failed Tests:*\n{}", payload.failures.len())),
                ],
            },
        ];

        let mut list: Vec<String> = shown
            .iter()
            .map(|f| format!("• {} ({}x consecutive)", f.record.title, f.consecutive_failures))
            .collect();
        if remaining > 0 {
            list.push(format!("...and {} more", remaining));
        }
        blocks.push(Block::text_section(format!("*Test Failures:*\n{}", list.join("\n"))));

        let snippets: Vec<String> = shown
            .iter()
            .filter(|f| !f.record.error.is_empty())
            .map(|f| format!("• {}: {}", f.record.title, self.snippet(&f.record.error)))
            .collect();
        if !snippets.is_empty() {
            blocks.push(Block::text_section(format!("*Error Snippets:*\n{}", snippets.join("\n"))));
        }

        if let Some(run_url) = &payload.run_url {
            blocks.push(Block::text_section(format!(
                "<{}|View CI Run> | <{}{}|View Reports & Traces>",
                run_url, run_url, ARTIFACTS_ANCHOR
            )));
        }

        blocks.push(Block::Divider);
        blocks.push(Block::Context {
            elements: vec![TextObject::mrkdwn(format!(
                "Commit: `{}` | Branch: `{}` | {}",
                payload.commit,
                payload.branch,
                generated_at.to_rfc3339_opts(SecondsFormat::Millis, true)
            ))],
        });

        SlackMessage { blocks }
    }

    fn header(&self, payload: &AlertPayload) -> String {
        let base = format!("{} {} Test Failures", payload.severity.icon(), payload.severity);
        match &self.label {
            Some(label) => format!("{}: {}", base, label),
            None => base,
        }
    }

    fn snippet(&self, error: &str) -> String {
        let head = truncate_chars(error, self.snippet_chars);
        if head.len() < error.len() {
            format!("{}...", head)
        } else {
            head.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertableFailure, Severity};
    use crate::report::{TestRecord, TestStatus};

    fn failure(title: &str, error: &str, n: u32) -> AlertableFailure {
        AlertableFailure {
            record: TestRecord {
                title: title.to_string(),
                file: "spec.ts".to_string(),
                tags: Default::default(),
                status: TestStatus::Failed,
                duration: 10,
                error: error.to_string(),
            },
            consecutive_failures: n,
        }
    }

    fn payload(
        severity: Severity,
        failures: Vec<AlertableFailure>,
        run_url: Option<&str>,
    ) -> AlertPayload {
        AlertPayload {
            severity,
            failures,
            run_url: run_url.map(str::to_string),
            commit: "abc1234".to_string(),
            branch: "main".to_string(),
        }
    }

    fn section_texts(msg: &SlackMessage) -> Vec<String> {
        msg.blocks
            .iter()
            .filter_map(|b| match b {
                Block::Section { text: Some(t), .. } => Some(t.text().to_string()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_list_truncates_after_ten() {
        let failures = (1..=15).map(|i| failure(&format!("test {}", i), "", 3)).collect();
        let alert = payload(Severity::Warning, failures, None);
        let msg = MessageBuilder::default().build(&alert, Utc::now());

        let list = section_texts(&msg)
            .into_iter()
            .find(|t| t.starts_with("*Test Failures:*"))
            .unwrap();
        let lines: Vec<&str> = list.lines().skip(1).collect();
        assert_eq!(lines.len(), 11);
        assert_eq!(lines[0], "• test 1 (3x consecutive)");
        assert_eq!(lines[9], "• test 10 (3x consecutive)");
        assert_eq!(lines[10], "...and 5 more");
    }

    #[test]
    fn test_exactly_ten_has_no_trailer() {
        let failures = (1..=10).map(|i| failure(&format!("t{}", i), "", 2)).collect();
        let alert = payload(Severity::Warning, failures, None);
        let msg = MessageBuilder::default().build(&alert, Utc::now());
        assert!(section_texts(&msg).iter().all(|t| !t.contains("more")));
    }

    #[test]
    fn test_error_snippets() {
        let long = "e".repeat(150);
        let failures = vec![
            failure("short", "boom", 2),
            failure("long", &long, 2),
            failure("silent", "", 2),
        ];
        let alert = payload(Severity::Critical, failures, None);
        let msg = MessageBuilder::default().build(&alert, Utc::now());
        let snippets = section_texts(&msg)
            .into_iter()
            .find(|t| t.starts_with("*Error Snippets:*"))
            .unwrap();
        let lines: Vec<&str> = snippets.lines().skip(1).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "• short: boom");
        assert_eq!(lines[1], format!("• long: {}...", "e".repeat(100)));
    }

    #[test]
    fn test_no_snippet_section_without_errors() {
        let msg = MessageBuilder::default().build(
            &payload(Severity::Warning, vec![failure("a", "", 2)], None),
            Utc::now(),
        );
        assert!(section_texts(&msg).iter().all(|t| !t.starts_with("*Error Snippets:*")));
    }

    #[test]
    fn test_links_only_with_run_url() {
        let url = "https://github.com/acme/web/actions/runs/7";
        let with = MessageBuilder::default().build(
            &payload(Severity::Warning, vec![failure("a", "", 2)], Some(url)),
            Utc::now(),
        );
        let links = section_texts(&with).into_iter().find(|t| t.contains("View CI Run")).unwrap();
        assert!(links.contains(&format!("<{}#artifacts|View Reports & Traces>", url)));

        let without = MessageBuilder::default().build(
            &payload(Severity::Warning, vec![failure("a", "", 2)], None),
            Utc::now(),
        );
        assert!(section_texts(&without).iter().all(|t| !t.contains("View CI Run")));
    }

    #[test]
    fn test_header_footer_and_wire_shape() {
        let generated_at: DateTime<Utc> = "2026-02-16T14:30:00Z".parse().unwrap();
        let builder = MessageBuilder::new(&AlertConfig {
            label: Some("cooked.com".to_string()),
            ..AlertConfig::default()
        });
        let alert = payload(Severity::Critical, vec![failure("a", "", 4)], None);
        let msg = builder.build(&alert, generated_at);

        let json = serde_json::to_value(&msg).unwrap();
        let blocks = json["blocks"].as_array().unwrap();
        assert_eq!(blocks[0]["type"], "header");
        assert_eq!(blocks[0]["text"]["type"], "plain_text");
        assert_eq!(blocks[0]["text"]["text"], "\u{1F6A8} CRITICAL Test Failures: cooked.com");
        assert_eq!(blocks[1]["fields"][0]["text"], "*Severity:*\nCRITICAL");
        assert_eq!(blocks[1]["fields"][1]["text"], "*Failed Tests:*\n1");
        assert!(blocks[1].get("text").is_none());

        let n = blocks.len();
        assert_eq!(blocks[n - 2]["type"], "divider");
        assert_eq!(blocks[n - 1]["type"], "context");
        assert_eq!(
            blocks[n - 1]["elements"][0]["text"],
            "Commit: `abc1234` | Branch: `main` | 2026-02-16T14:30:00.000Z"
        );
    }

    #[test]
    fn test_warning_marker_differs() {
        let msg = MessageBuilder::default().build(
            &payload(Severity::Warning, vec![failure("a", "", 2)], None),
            Utc::now(),
        );
        match &msg.blocks[0] {
            Block::Header { text } => assert!(text.text().starts_with("\u{26A0}\u{FE0F} WARNING")),
            other => panic!("expected header, got {:?}", other),
        }
    }
}
