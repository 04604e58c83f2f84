use std::io::Write;
use std::sync::Arc;

use alert_channel::{AlertNotice, ChannelEvent, IntegrationStatus, Observer, ObserverResult, Severity};
#[cfg(feature = "colored-output")]
use colored::*;

use crate::{cli::OutputFormat, error::Result};

#[derive(Debug, Clone, Copy)]
pub struct OutputManager {
    colored: bool,
    format: OutputFormat,
}

impl OutputManager {
    pub fn new(colored: bool, format: OutputFormat) -> Self {
        Self { colored, format }
    }

    pub fn format_event(&self, event: &ChannelEvent) -> Result<String> {
        match self.format {
            OutputFormat::Pretty => Ok(match event {
                ChannelEvent::Alert(alert) => self.format_alert(alert),
                ChannelEvent::IntegrationStatus(status) => self.format_status(status),
            }),
            OutputFormat::Json => Ok(serde_json::to_string(event)?),
        }
    }

    fn format_alert(&self, alert: &AlertNotice) -> String {
        let severity = alert.severity.unwrap_or(Severity::Unknown);
        let time = alert
            .timestamp
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "--:--:--".to_string());

        let mut output = format!(
            "{} {} {} {}\n",
            self.colorize(&time, &Color::Blue, false),
            self.colorize(
                &format!("[{}]", severity.as_str().to_uppercase()),
                &severity_color(severity),
                true
            ),
            self.colorize(&alert.title, &Color::Green, true),
            self.colorize(&format!("({})", alert.alert_id), &Color::Blue, false),
        );
        output.push_str(&format!(
            "  {}: {}  {}: {:.1}",
            self.colorize("Client", &Color::Yellow, false),
            self.colorize(&alert.client, &Color::Cyan, false),
            self.colorize("Risk", &Color::Yellow, false),
            alert.risk_score,
        ));
        if let Some(kind) = &alert.alert_type {
            output.push_str(&format!(
                "  {}: {}",
                self.colorize("Type", &Color::Yellow, false),
                self.colorize(kind, &Color::Cyan, false)
            ));
        }
        if alert.source_ip().is_some() || alert.destination_ip().is_some() {
            output.push_str(&format!(
                "  {}: {} -> {}",
                self.colorize("Flow", &Color::Yellow, false),
                alert.source_ip().unwrap_or("?"),
                alert.destination_ip().unwrap_or("?"),
            ));
        }
        output
    }

    fn format_status(&self, status: &IntegrationStatus) -> String {
        let name = status.integration_name.as_deref().unwrap_or("integration");
        let state = status.status.as_deref().unwrap_or("unknown");
        let color = if state == "error" { Color::Red } else { Color::Cyan };

        let mut output = format!(
            "{} {} {}",
            self.colorize("Integration", &Color::Yellow, false),
            self.colorize(name, &Color::Green, true),
            self.colorize(state, &color, true),
        );
        if let Some(client) = &status.client {
            output.push_str(&format!(" ({client})"));
        }
        if let Some(message) = status.message.as_deref().filter(|m| !m.is_empty()) {
            output.push_str(&format!(": {message}"));
        }
        output
    }

    /// An observer printing every event to stdout.
    pub fn observer(self) -> Arc<dyn Observer> {
        Arc::new(move |event: &ChannelEvent| -> ObserverResult {
            let line = self.format_event(event)?;
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{line}")?;
            stdout.flush()?;
            Ok(())
        })
    }

    fn colorize(&self, text: &str, color: &Color, bold: bool) -> String {
        #[cfg(feature = "colored-output")]
        {
            if self.colored {
                let colored_text = match color {
                    Color::Green => text.green(),
                    Color::Yellow => text.yellow(),
                    Color::Blue => text.blue(),
                    Color::Cyan => text.cyan(),
                    Color::Red => text.red(),
                    Color::Magenta => text.magenta(),
                };
                if bold {
                    colored_text.bold().to_string()
                } else {
                    colored_text.to_string()
                }
            } else {
                text.to_string()
            }
        }

        #[cfg(not(feature = "colored-output"))]
        {
            let _ = (color, bold);
            text.to_string()
        }
    }
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Critical => Color::Red,
        Severity::High => Color::Magenta,
        Severity::Medium => Color::Yellow,
        Severity::Low => Color::Cyan,
        Severity::Unknown => Color::Blue,
    }
}

enum Color {
    Green,
    Yellow,
    Blue,
    Cyan,
    Red,
    Magenta,
}
