//! Execution context for a single job
//!
//! Contains the state a job accumulates while its steps run:
//! - Log buffer collecting the job's output
//! - Environment variables visible to later steps
//!
//! A context belongs to exactly one job and is written by its steps one at
//! a time; jobs never share a context.

use sluice_core::domain::log::{LogEntry, LogLevel};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Execution context of a running job
pub struct JobContext {
    job_name: String,

    /// Log buffer with entries
    log_buffer: Mutex<Vec<LogEntry>>,

    /// Variables passed to every process the job starts
    env: Mutex<BTreeMap<String, String>>,
}

impl JobContext {
    pub fn new(job_name: &str, env: BTreeMap<String, String>) -> Self {
        Self {
            job_name: job_name.to_string(),
            log_buffer: Mutex::new(Vec::new()),
            env: Mutex::new(env),
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Adds a log entry to the buffer
    pub fn add_log(&self, entry: LogEntry) {
        let mut buffer = self.log_buffer.lock().unwrap();
        buffer.push(entry);
    }

    pub fn log_debug(&self, message: String) {
        self.add_log(LogEntry::now(LogLevel::Debug, message));
    }

    pub fn log_info(&self, message: String) {
        self.add_log(LogEntry::now(LogLevel::Info, message));
    }

    pub fn log_warning(&self, message: String) {
        self.add_log(LogEntry::now(LogLevel::Warning, message));
    }

    pub fn log_error(&self, message: String) {
        self.add_log(LogEntry::now(LogLevel::Error, message));
    }

    /// Logs every non-empty line of a process stream at the given level
    pub fn log_lines(&self, level: LogLevel, text: &str) {
        let mut buffer = self.log_buffer.lock().unwrap();
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            buffer.push(LogEntry::now(level, line.to_string()));
        }
    }

    /// Drains all log entries from the buffer
    pub fn drain_logs(&self) -> Vec<LogEntry> {
        let mut buffer = self.log_buffer.lock().unwrap();
        buffer.drain(..).collect()
    }

    /// Snapshot of the job environment
    pub fn env(&self) -> BTreeMap<String, String> {
        self.env.lock().unwrap().clone()
    }

    /// Job environment overlaid with step-specific variables
    pub fn env_with(&self, overrides: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut env = self.env();
        env.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }

    /// Makes a variable visible to every later step of the job
    pub fn export(&self, key: &str, value: &str) {
        self.env
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_logs_empties_buffer() {
        let context = JobContext::new("tinytodo", BTreeMap::new());
        context.log_info("first".to_string());
        context.log_error("second".to_string());

        let logs = context.drain_logs();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].level, LogLevel::Info);
        assert_eq!(logs[1].message, "second");
        assert!(context.drain_logs().is_empty());
    }

    #[test]
    fn test_log_lines_skips_blank_lines() {
        let context = JobContext::new("tinytodo", BTreeMap::new());
        context.log_lines(LogLevel::Warning, "   Compiling tinytodo\n\n error: aborting\n");

        let logs = context.drain_logs();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|entry| entry.level == LogLevel::Warning));
    }

    #[test]
    fn test_exported_variables_reach_later_steps() {
        let mut initial = BTreeMap::new();
        initial.insert("CI".to_string(), "true".to_string());
        let context = JobContext::new("rust-hello-world", initial);

        context.export("RUSTUP_TOOLCHAIN", "stable");

        let mut step_env = BTreeMap::new();
        step_env.insert("CI".to_string(), "false".to_string());
        let env = context.env_with(&step_env);

        assert_eq!(env["RUSTUP_TOOLCHAIN"], "stable");
        assert_eq!(env["CI"], "false");
        assert_eq!(context.env()["CI"], "true");
    }
}
