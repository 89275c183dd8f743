use console::style;
use parcel_core::ErrorReport;
use serde::Serialize;
use std::fmt::Display;
use tabled::{settings::Style, Table, Tabled};

/// Output format mode
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    Human,
    Json,
}

pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Human
            },
        }
    }

    pub fn success(&self, message: impl Display) {
        if let OutputFormat::Human = self.format {
            println!("{} {}", style("✓").green().bold(), message);
        }
    }

    pub fn info(&self, message: impl Display) {
        if let OutputFormat::Human = self.format {
            println!("{} {}", style("ℹ").blue().bold(), message);
        }
    }

    /// Warnings go to stderr in both modes so JSON stdout stays parseable
    pub fn warning(&self, message: impl Display) {
        match self.format {
            OutputFormat::Human => {
                eprintln!("{} {}", style("⚠").yellow().bold(), message);
            }
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "status": "warning",
                    "message": message.to_string(),
                });
                eprintln!("{}", output);
            }
        }
    }

    pub fn error(&self, report: &ErrorReport) {
        match self.format {
            OutputFormat::Human => {
                eprintln!(
                    "{} {} {}",
                    style("✗").red().bold(),
                    style(&report.code).red().bold(),
                    report.message
                );
                if !report.details.is_null() {
                    eprintln!("  {}", style(&report.details).dim());
                }
            }
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "status": "error",
                    "error": report,
                });
                println!("{}", output);
            }
        }
    }

    /// Print a table; silent in JSON mode, where callers emit [`Self::result`]
    pub fn table<T: Tabled>(&self, data: Vec<T>) {
        if let OutputFormat::Human = self.format {
            if data.is_empty() {
                println!("{}", style("(no data)").dim());
            } else {
                let mut table = Table::new(data);
                table.with(Style::rounded());
                println!("{}", table);
            }
        }
    }

    /// Emit the command result; JSON mode only
    pub fn result<T: Serialize>(&self, data: T) -> anyhow::Result<()> {
        if let OutputFormat::Json = self.format {
            let output = serde_json::json!({
                "status": "success",
                "data": data,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Ok(())
    }

    pub fn kv(&self, key: impl Display, value: impl Display) {
        if let OutputFormat::Human = self.format {
            println!("{}: {}", style(key).bold(), value);
        }
    }

    pub fn section(&self, title: impl Display) {
        if let OutputFormat::Human = self.format {
            println!("\n{}", style(title).bold().underlined());
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }
}
