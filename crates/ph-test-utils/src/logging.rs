// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Per-test log files
//!
//! Every suite case writes its diagnostics to its own file under
//! `target/test-logs/<date>/`. Passing cases print one line; failing cases
//! print the log path and size so the file can be opened directly.

use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum TestLogError {
    #[error("failed to prepare test log: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to write to test log file: {path}")]
    WriteError { path: PathBuf },

    #[error("invalid test name: {name}")]
    InvalidTestName { name: String },
}

/// Log file owned by one test case
pub struct TestLogger {
    log_path: PathBuf,
    writer: BufWriter<File>,
    test_name: String,
    start_time: DateTime<Utc>,
}

impl TestLogger {
    /// Create a logger writing under the workspace's `target/test-logs`
    ///
    /// ```rust
    /// use ph_test_utils::TestLogger;
    ///
    /// let mut logger = TestLogger::new("create_bucket_revision").unwrap();
    /// logger.log("registering repository 'git'").unwrap();
    /// logger.finish_success().unwrap();
    /// ```
    pub fn new(test_name: &str) -> Result<Self, TestLogError> {
        let root = find_workspace_root()?.join("target").join("test-logs");
        Self::in_dir(test_name, &root)
    }

    /// Create a logger writing under `root`
    pub fn in_dir(test_name: &str, root: &Path) -> Result<Self, TestLogError> {
        validate_test_name(test_name)?;

        let log_path = unique_log_path(root, test_name)?;
        let file = OpenOptions::new().create(true).write(true).truncate(true).open(&log_path)?;

        let mut logger = Self {
            log_path,
            writer: BufWriter::new(file),
            test_name: test_name.to_string(),
            start_time: Utc::now(),
        };
        logger.write_header()?;
        Ok(logger)
    }

    pub fn log(&mut self, message: &str) -> Result<(), TestLogError> {
        let timestamp = Utc::now().format("%H:%M:%S%.3f");
        writeln!(self.writer, "[{}] {}", timestamp, message)
            .and_then(|_| self.writer.flush())
            .map_err(|_| TestLogError::WriteError {
                path: self.log_path.clone(),
            })
    }

    /// Log a serializable value as pretty JSON under `label`
    pub fn log_json<T: serde::Serialize>(
        &mut self,
        label: &str,
        data: &T,
    ) -> Result<(), TestLogError> {
        let json = serde_json::to_string_pretty(data).map_err(|_| TestLogError::WriteError {
            path: self.log_path.clone(),
        })?;
        self.log(&format!("{}: {}", label, json))
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn finish_success(mut self) -> Result<PathBuf, TestLogError> {
        let elapsed = self.elapsed_secs();
        self.log(&format!("passed in {:.3}s", elapsed))?;
        println!("✅ {} passed", self.test_name);
        Ok(self.log_path)
    }

    pub fn finish_failure(mut self, error_message: &str) -> Result<PathBuf, TestLogError> {
        let elapsed = self.elapsed_secs();
        self.log(&format!("failed after {:.3}s: {}", elapsed, error_message))?;

        match fs::metadata(&self.log_path) {
            Ok(metadata) => println!(
                "❌ {} failed - Log: {} ({} bytes)",
                self.test_name,
                self.log_path.display(),
                metadata.len()
            ),
            Err(_) => println!("❌ {} failed - Log: {}", self.test_name, self.log_path.display()),
        }
        Ok(self.log_path)
    }

    fn elapsed_secs(&self) -> f64 {
        Utc::now().signed_duration_since(self.start_time).num_milliseconds() as f64 / 1000.0
    }

    fn write_header(&mut self) -> Result<(), TestLogError> {
        writeln!(self.writer, "=== Package Harbor Test Log ===")?;
        writeln!(self.writer, "Test: {}", self.test_name)?;
        writeln!(self.writer, "Started: {}", self.start_time.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(self.writer, "Process: {}", std::process::id())?;
        writeln!(self.writer, "=== Log Output ===")?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// `<root>/<YYYY-MM-DD>/<test>-<HH-MM-SS>-<uuid>.log`, creating the date directory
pub fn unique_log_path(root: &Path, test_name: &str) -> Result<PathBuf, TestLogError> {
    let now = Utc::now();
    let log_dir = root.join(now.format("%Y-%m-%d").to_string());
    fs::create_dir_all(&log_dir)?;

    Ok(log_dir.join(format!(
        "{}-{}-{}.log",
        sanitize_filename(test_name),
        now.format("%H-%M-%S"),
        Uuid::new_v4()
    )))
}

fn find_workspace_root() -> Result<PathBuf, TestLogError> {
    let current_dir = env::current_dir()?;
    let mut dir = current_dir.as_path();

    loop {
        let cargo_toml = dir.join("Cargo.toml");
        if let Ok(content) = fs::read_to_string(&cargo_toml) {
            if content.contains("[workspace]") {
                return Ok(dir.to_path_buf());
            }
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => return Ok(current_dir),
        }
    }
}

fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-' => c,
            _ => '_',
        })
        .collect()
}

fn validate_test_name(name: &str) -> Result<(), TestLogError> {
    if name.is_empty() || name.len() > 200 {
        return Err(TestLogError::InvalidTestName {
            name: name.chars().take(40).collect(),
        });
    }
    Ok(())
}
