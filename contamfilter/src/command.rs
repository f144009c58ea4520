use std::ffi::{OsStr, OsString};
use std::fmt::Display;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use itertools::Itertools;
use log::debug;

use crate::error::PipelineError;
use crate::manifest::Stage;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One external-tool call: a program and its argument vector, with standard
/// output optionally redirected into a file. Arguments are passed to the
/// child as-is, no shell is involved.
#[derive(Debug, Clone)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<OsString>,
    stdout: Option<PathBuf>,
}

impl Invocation {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdout: None,
        }
    }

    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|x| x.as_ref().to_os_string()));
        self
    }

    /// Send the child's standard output to `path`, truncating it.
    pub fn stdout_to<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.stdout = Some(path.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    pub fn stdout_path(&self) -> Option<&Path> {
        self.stdout.as_deref()
    }

    /// Run to completion and check the exit status.
    ///
    /// Standard error is always captured; it is logged at debug level on
    /// success and carried by the error otherwise. With a `timeout`, a child
    /// still running after that long is killed.
    pub fn run(
        &self,
        sample: &str,
        stage: Stage,
        timeout: Option<Duration>,
    ) -> Result<(), PipelineError> {
        let command_line = self.to_string();
        debug!("[{}] {}", sample, command_line);

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stderr(Stdio::piped());
        match &self.stdout {
            Some(path) => {
                let file = File::create(path).map_err(|source| PipelineError::Io {
                    sample: sample.to_string(),
                    stage,
                    path: path.clone(),
                    source,
                })?;
                command.stdout(file);
            }
            None => {
                command.stdout(Stdio::null());
            }
        }

        let launch_error = |source: std::io::Error| PipelineError::Launch {
            sample: sample.to_string(),
            stage,
            command: command_line.clone(),
            source,
        };

        let mut child = command.spawn().map_err(launch_error)?;
        let stderr = child.stderr.take();
        let stderr_reader = thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                // A read error only truncates the diagnostics.
                let _ = stderr.read_to_end(&mut buf);
            }
            buf
        });

        let status = match timeout {
            None => child.wait().map(Some),
            Some(limit) => wait_timeout(&mut child, limit),
        }
        .map_err(launch_error)?;
        let stderr = stderr_reader.join().unwrap_or_default();
        let stderr = String::from_utf8_lossy(&stderr).trim_end().to_string();

        match status {
            None => Err(PipelineError::Timeout {
                sample: sample.to_string(),
                stage,
                command: command_line,
                timeout: timeout.unwrap_or_default(),
            }),
            Some(status) if !status.success() => Err(PipelineError::Invocation {
                sample: sample.to_string(),
                stage,
                command: command_line,
                status,
                stderr,
            }),
            Some(_) => {
                if !stderr.is_empty() {
                    debug!("[{}] {} stderr:\n{}", sample, stage, stderr);
                }
                Ok(())
            }
        }
    }
}

/// Wait for the child for at most `limit`. Returns `None` if it had to be
/// killed.
fn wait_timeout(child: &mut Child, limit: Duration) -> std::io::Result<Option<ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= limit {
            child.kill()?;
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

impl Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        if !self.args.is_empty() {
            write!(f, " {}", self.args.iter().map(|x| x.to_string_lossy()).join(" "))?;
        }
        if let Some(path) = &self.stdout {
            write!(f, " > {}", path.display())?;
        }
        Ok(())
    }
}
