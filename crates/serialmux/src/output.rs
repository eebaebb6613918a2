use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serialmux_frame::{ParseStop, Register, RegisterReply, RegisterResult};
use serialmux_link::LinkStats;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct RegisterRow {
    pub register: Register,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub register_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<u32>,
}

impl RegisterRow {
    fn from_result(register: Register, result: &RegisterResult) -> Self {
        match result {
            RegisterResult::Value(value) => Self {
                register,
                register_type: Some(value.register_type().name()),
                value: Some(value.as_f64()),
                error: None,
            },
            RegisterResult::Error(code) => Self {
                register,
                register_type: None,
                value: None,
                error: Some(*code),
            },
        }
    }

    fn value_text(&self) -> String {
        match (self.value, self.error) {
            (Some(value), _) => value.to_string(),
            (None, Some(code)) => format!("error {code}"),
            (None, None) => String::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ReplyOutput {
    target: u8,
    complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stopped: Option<String>,
    registers: Vec<RegisterRow>,
}

pub fn reply_rows(reply: &RegisterReply) -> Vec<RegisterRow> {
    reply
        .iter()
        .map(|(register, result)| RegisterRow::from_result(register, result))
        .collect()
}

fn describe_stop(stop: ParseStop) -> String {
    match stop {
        ParseStop::UnknownSubframe(id) => format!("unknown sub-frame 0x{id:02x}"),
        ParseStop::Truncated => "truncated".to_string(),
        ParseStop::RegisterOverflow => "register number overflow".to_string(),
    }
}

pub fn print_reply(target: u8, reply: &RegisterReply, format: OutputFormat) {
    let rows = reply_rows(reply);
    match format {
        OutputFormat::Json => {
            let out = ReplyOutput {
                target,
                complete: reply.is_complete(),
                stopped: reply.stop().map(describe_stop),
                registers: rows,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["REGISTER", "TYPE", "VALUE"]);
            for row in &rows {
                table.add_row(vec![
                    format!("0x{:03x}", row.register),
                    row.register_type.unwrap_or("-").to_string(),
                    row.value_text(),
                ]);
            }
            println!("{table}");
            if rows.is_empty() {
                println!("no reply from device {target}");
            }
        }
        OutputFormat::Pretty => {
            if rows.is_empty() {
                println!("no reply from device {target}");
            }
            for row in &rows {
                println!(
                    "{}: 0x{:03x} {} {}",
                    target,
                    row.register,
                    row.register_type.unwrap_or("-"),
                    row.value_text()
                );
            }
        }
    }
    if let Some(stop) = reply.stop() {
        tracing::debug!(
            device = target,
            stop = %describe_stop(stop),
            "reply parsing stopped early"
        );
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ConfLine {
    pub command: String,
    pub reply: String,
}

#[derive(Debug, Serialize)]
struct ConfOutput<'a> {
    target: u8,
    channel: u32,
    lines: &'a [ConfLine],
}

/// Per-line progress for interactive runs.
pub fn print_conf_progress(line: &ConfLine, format: OutputFormat) {
    if format == OutputFormat::Pretty {
        println!("{}", line.command);
        println!("> {}", line.reply);
    }
}

pub fn print_conf_summary(target: u8, channel: u32, lines: &[ConfLine], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ConfOutput {
                target,
                channel,
                lines,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "REPLY"]);
            for line in lines {
                table.add_row(vec![line.command.clone(), line.reply.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{} lines applied to device {target}", lines.len());
        }
    }
}

pub fn log_stats(stats: &LinkStats) {
    tracing::debug!(
        frames_sent = stats.frames_sent,
        frames_received = stats.frames_received,
        resyncs = stats.resyncs,
        crc_mismatches = stats.crc_mismatches,
        stray_frames = stats.stray_frames,
        "link statistics"
    );
}

pub fn text(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
