use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Instant;

use camino::Utf8Path;
use chrono::Local;

use crate::error::YamasError;

/// One external program call: program name plus an explicit argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Value following `flag`, if present.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|index| self.args.get(index + 1))
            .map(String::as_str)
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolStatus {
    pub code: Option<i32>,
}

impl ToolStatus {
    pub fn success() -> Self {
        Self { code: Some(0) }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => f.write_str("termination by signal"),
        }
    }
}

/// Runs external collaborators. Calls block until the program exits; there is no timeout.
pub trait ToolRunner: Send + Sync {
    fn run(&self, invocation: &ToolInvocation, log: &Utf8Path) -> Result<ToolStatus, YamasError>;

    fn is_available(&self, program: &str) -> bool;

    /// Runs and turns a non-zero exit into [`YamasError::ToolFailed`].
    fn run_checked(&self, invocation: &ToolInvocation, log: &Utf8Path) -> Result<(), YamasError> {
        let status = self.run(invocation, log)?;
        if status.is_success() {
            return Ok(());
        }
        Err(YamasError::ToolFailed {
            program: invocation.program.clone(),
            status: status.to_string(),
            log: log.as_std_path().to_path_buf(),
        })
    }
}

/// Spawns programs found on `PATH`, appending their stdout and stderr to the stage log.
#[derive(Debug, Clone, Default)]
pub struct SystemToolRunner;

impl SystemToolRunner {
    pub fn new() -> Self {
        Self
    }

    fn open_log(log: &Utf8Path) -> Result<fs::File, YamasError> {
        if let Some(parent) = log.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| YamasError::Storage(format!("create {parent}: {err}")))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(log.as_std_path())
            .map_err(|err| YamasError::Storage(format!("open log {log}: {err}")))
    }
}

impl ToolRunner for SystemToolRunner {
    fn run(&self, invocation: &ToolInvocation, log: &Utf8Path) -> Result<ToolStatus, YamasError> {
        let mut log_file = Self::open_log(log)?;
        writeln!(
            log_file,
            "[{}] $ {invocation}",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        )
        .map_err(|err| YamasError::Storage(err.to_string()))?;
        let stderr = log_file
            .try_clone()
            .map_err(|err| YamasError::Storage(err.to_string()))?;

        let start = Instant::now();
        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(stderr))
            .status()
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => YamasError::MissingTool(invocation.program.clone()),
                _ => YamasError::Storage(format!("spawn {}: {err}", invocation.program)),
            })?;

        let status = ToolStatus {
            code: status.code(),
        };
        tracing::info!(
            program = %invocation.program,
            elapsed_ms = start.elapsed().as_millis() as u64,
            %status,
            log = %log,
            "tool finished"
        );
        Ok(status)
    }

    fn is_available(&self, program: &str) -> bool {
        find_in_path(program).is_some()
    }
}

pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.is_file() {
            return Some(plain);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_display_and_flag_lookup() {
        let invocation = ToolInvocation::new("qiime")
            .args(["demux", "summarize"])
            .arg("--i-data")
            .arg("/w/artifacts/demux.qza");
        assert_eq!(
            invocation.to_string(),
            "qiime demux summarize --i-data /w/artifacts/demux.qza"
        );
        assert_eq!(
            invocation.flag_value("--i-data"),
            Some("/w/artifacts/demux.qza")
        );
        assert_eq!(invocation.flag_value("--o-visualization"), None);
    }
}
