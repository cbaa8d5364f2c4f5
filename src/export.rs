//! Result formatting and clipboard output

use std::io::Write;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::recognition::OcrRegionResult;

/// Export format for recognized text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `<region>: <text>` per line
    #[default]
    Text,
    /// `region,text,confidence` with a header row
    Csv,
    /// Pretty-printed JSON array
    Json,
}

/// Render results in the given format
pub fn format_results(results: &[OcrRegionResult], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format_text(results),
        OutputFormat::Csv => format_csv(results),
        OutputFormat::Json => {
            // Serializing plain strings and numbers cannot fail
            serde_json::to_string_pretty(results).unwrap_or_else(|_| "[]".to_string())
        }
    }
}

/// `"<regionName>: <text>"` lines, the clipboard format
pub fn format_text(results: &[OcrRegionResult]) -> String {
    results
        .iter()
        .map(|r| format!("{}: {}", r.region_name, r.text))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_csv(results: &[OcrRegionResult]) -> String {
    let mut out = String::from("region,text,confidence\n");
    for r in results {
        out.push_str(&csv_field(&r.region_name));
        out.push(',');
        out.push_str(&csv_field(&r.text));
        out.push(',');
        out.push_str(&format!("{:.1}", r.confidence));
        out.push('\n');
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("Clipboard access denied")]
    Denied,
    #[error("Clipboard unavailable: {0}")]
    Unavailable(String),
    #[error("Clipboard command failed: {0}")]
    CommandFailed(String),
}

/// Somewhere text can be copied to
pub trait Clipboard {
    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError>;
}

/// Pipes text into an external command (`pbcopy`, `xclip`, `clip`)
#[derive(Debug, Clone)]
pub struct CommandClipboard {
    command: Vec<String>,
}

impl CommandClipboard {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl Clipboard for CommandClipboard {
    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| ClipboardError::Unavailable("no clipboard command configured".to_string()))?;

        debug!("Copying {} bytes via {}", text.len(), program);
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::PermissionDenied => ClipboardError::Denied,
                _ => ClipboardError::Unavailable(format!("{program}: {e}")),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .map_err(|e| ClipboardError::CommandFailed(e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| ClipboardError::CommandFailed(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClipboardError::CommandFailed(stderr.trim().to_string()));
        }
        Ok(())
    }
}

/// Keeps the last copied text; can be told to refuse
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    pub contents: Option<String>,
    pub deny: bool,
}

impl Clipboard for MemoryClipboard {
    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        if self.deny {
            return Err(ClipboardError::Denied);
        }
        self.contents = Some(text.to_string());
        Ok(())
    }
}

/// Copy results in the text format
pub fn copy_results<C: Clipboard + ?Sized>(
    clipboard: &mut C,
    results: &[OcrRegionResult],
) -> Result<(), ClipboardError> {
    clipboard.write_text(&format_text(results))?;
    info!("Copied {} results to clipboard", results.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results() -> Vec<OcrRegionResult> {
        vec![
            OcrRegionResult {
                region_id: "1".to_string(),
                region_name: "Name".to_string(),
                text: "山田太郎".to_string(),
                confidence: 91.5,
                processing_time_ms: 10,
            },
            OcrRegionResult {
                region_id: "2".to_string(),
                region_name: "Comment".to_string(),
                text: "Good, \"very\"\nthanks".to_string(),
                confidence: 70.0,
                processing_time_ms: 12,
            },
        ]
    }

    #[test]
    fn test_text_format() {
        assert_eq!(
            format_results(&results()[..1], OutputFormat::Text),
            "Name: 山田太郎"
        );
        assert_eq!(format_text(&[]), "");
    }

    #[test]
    fn test_csv_quoting() {
        let csv = format_results(&results(), OutputFormat::Csv);
        assert_eq!(
            csv,
            "region,text,confidence\nName,山田太郎,91.5\nComment,\"Good, \"\"very\"\"\nthanks\",70.0\n"
        );
    }

    #[test]
    fn test_json_format() {
        let json = format_results(&results(), OutputFormat::Json);
        let parsed: Vec<OcrRegionResult> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, results());
    }

    #[test]
    fn test_copy_results() {
        let mut clipboard = MemoryClipboard::default();
        copy_results(&mut clipboard, &results()).unwrap();
        assert_eq!(
            clipboard.contents.as_deref(),
            Some("Name: 山田太郎\nComment: Good, \"very\"\nthanks")
        );

        let mut denied = MemoryClipboard {
            deny: true,
            ..Default::default()
        };
        assert!(matches!(
            copy_results(&mut denied, &results()),
            Err(ClipboardError::Denied)
        ));
    }

    #[test]
    fn test_command_clipboard_missing_program() {
        let mut clipboard = CommandClipboard::new(vec!["/nonexistent/clipboard-tool".to_string()]);
        assert!(matches!(
            clipboard.write_text("x"),
            Err(ClipboardError::Unavailable(_))
        ));

        let mut empty = CommandClipboard::new(Vec::new());
        assert!(matches!(empty.write_text("x"), Err(ClipboardError::Unavailable(_))));
    }
}
