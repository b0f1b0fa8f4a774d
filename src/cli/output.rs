//! Output formatting for one-shot commands: tables by default, JSON with
//! `--json`.

use serde::Serialize;
use tabled::{Table, Tabled};

use crate::monitor::MatchSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Table,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Table
        }
    }
}

#[derive(Debug, Clone, Tabled, Serialize)]
pub struct MatchRow {
    pub priority: usize,
    pub favorite: String,
    pub club: String,
    pub page: String,
}

impl From<&MatchSummary> for MatchRow {
    fn from(m: &MatchSummary) -> Self {
        Self {
            priority: m.priority,
            favorite: m.favorite.clone(),
            club: m.name.clone(),
            page: m.page_url.clone(),
        }
    }
}

pub fn print_items<T: Tabled + Serialize>(items: &[T], mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table => {
            if items.is_empty() {
                println!("(no results)");
            } else {
                println!("{}", Table::new(items));
            }
        }
        OutputMode::Json => println!("{}", serde_json::to_string_pretty(items)?),
    }
    Ok(())
}

pub fn print_kv(key: &str, value: &str) {
    println!("{key}: {value}");
}

pub fn print_success(msg: &str) {
    println!("\x1b[32m{msg}\x1b[0m");
}

pub fn print_warn(msg: &str) {
    println!("\x1b[33m{msg}\x1b[0m");
}

pub fn print_error(msg: &str) {
    eprintln!("\x1b[31m{msg}\x1b[0m");
}
