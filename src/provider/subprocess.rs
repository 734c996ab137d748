/*!
Subprocess provider family.

A provider is described by a [`SubprocessTemplate`]; the adapter turns the
template plus `(model, prompt, options)` into an argv, spawns the tool and
collects stdout under a bounded timeout.

Argument order (mirrors how the CLIs expect them):
  program prefix_args [model_flag MODEL] [json_args] (yolo_args | safe_args)
          extra_args [MODEL (positional)] [PROMPT (argument mode)]
*/

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{CallOptions, ProviderAdapter, ProviderFamily};
use crate::error::{AiError, Result};

/// Default time budget for a subprocess call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

const LIST_TIMEOUT: Duration = Duration::from_secs(10);

/// How the prompt reaches the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptVia {
    Stdin,
    Argument,
}

/// Declarative description of a CLI tool.
#[derive(Debug, Clone)]
pub struct SubprocessTemplate {
    pub id: &'static str,
    pub program: &'static str,
    pub prefix_args: &'static [&'static str],
    /// Flag preceding the model value (`--model`).
    pub model_flag: Option<&'static str>,
    pub json_args: &'static [&'static str],
    /// Auto-approve flags, used when `yolo` is requested.
    pub yolo_args: &'static [&'static str],
    /// Sandboxing flags, used when `yolo` is not requested.
    pub safe_args: &'static [&'static str],
    pub extra_args: &'static [&'static str],
    /// Model goes after all flags as a bare argument.
    pub model_positional: bool,
    pub prompt_via: PromptVia,
    /// Overrides the adapter's default timeout.
    pub timeout: Option<Duration>,
    pub known_models: &'static [&'static str],
    /// Arguments that print an installed-model table (`ollama list`).
    pub list_args: Option<&'static [&'static str]>,
}

impl SubprocessTemplate {
    pub const fn new(id: &'static str, program: &'static str) -> Self {
        Self {
            id,
            program,
            prefix_args: &[],
            model_flag: None,
            json_args: &[],
            yolo_args: &[],
            safe_args: &[],
            extra_args: &[],
            model_positional: false,
            prompt_via: PromptVia::Argument,
            timeout: None,
            known_models: &[],
            list_args: None,
        }
    }

    /// Arguments passed to `program` (program itself excluded).
    pub fn build_args(&self, model: &str, prompt: &str, opts: CallOptions) -> Vec<String> {
        let mut args: Vec<String> = self.prefix_args.iter().map(|s| s.to_string()).collect();

        if let Some(flag) = self.model_flag {
            args.push(flag.to_string());
            args.push(model.to_string());
        }
        if opts.json {
            args.extend(self.json_args.iter().map(|s| s.to_string()));
        }
        if opts.yolo && !self.yolo_args.is_empty() {
            args.extend(self.yolo_args.iter().map(|s| s.to_string()));
        } else {
            args.extend(self.safe_args.iter().map(|s| s.to_string()));
        }
        args.extend(self.extra_args.iter().map(|s| s.to_string()));
        if self.model_positional {
            args.push(model.to_string());
        }
        if self.prompt_via == PromptVia::Argument {
            args.push(prompt.to_string());
        }
        args
    }
}

/// First column of a whitespace table, header row skipped.
pub fn parse_model_table(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Locate an executable on `PATH` (or check an explicit path).
pub fn find_on_path(program: &str) -> Option<PathBuf> {
    if program.contains(std::path::MAIN_SEPARATOR) {
        let p = PathBuf::from(program);
        return is_executable(&p).then_some(p);
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &std::path::Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &std::path::Path) -> bool {
    path.is_file()
}

/* ---- Adapter ---- */

pub struct SubprocessAdapter {
    template: SubprocessTemplate,
    default_timeout: Duration,
}

impl SubprocessAdapter {
    pub fn new(template: SubprocessTemplate, default_timeout: Duration) -> Self {
        Self {
            template,
            default_timeout,
        }
    }

    fn timeout(&self) -> Duration {
        self.template.timeout.unwrap_or(self.default_timeout)
    }

    async fn run(&self, args: Vec<String>, prompt: &str) -> Result<std::process::Output> {
        let t = &self.template;
        let mut cmd = Command::new(t.program);
        cmd.args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        match t.prompt_via {
            PromptVia::Stdin => cmd.stdin(Stdio::piped()),
            PromptVia::Argument => cmd.stdin(Stdio::null()),
        };

        let mut child = cmd
            .spawn()
            .map_err(|e| AiError::execution(t.id, format!("failed to start '{}': {e}", t.program)))?;

        // stdin is written concurrently with draining stdout/stderr
        let stdin = match t.prompt_via {
            PromptVia::Stdin => child.stdin.take(),
            PromptVia::Argument => None,
        };
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(prompt.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());

        let output = output
            .map_err(|e| AiError::execution(t.id, format!("failed to wait for process: {e}")))?;
        match fed {
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                tracing::debug!(provider = t.id, "tool closed stdin before reading the whole prompt");
            }
            Err(e) => {
                return Err(AiError::execution(t.id, format!("failed to write prompt: {e}")));
            }
            Ok(()) => {}
        }
        Ok(output)
    }
}

#[async_trait]
impl ProviderAdapter for SubprocessAdapter {
    fn id(&self) -> &str {
        self.template.id
    }

    fn family(&self) -> ProviderFamily {
        ProviderFamily::Subprocess
    }

    fn is_available(&self) -> bool {
        find_on_path(self.template.program).is_some()
    }

    fn unavailable_reason(&self) -> String {
        format!("CLI tool '{}' not found on PATH", self.template.program)
    }

    fn known_models(&self) -> Vec<String> {
        self.template.known_models.iter().map(|s| s.to_string()).collect()
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let t = &self.template;
        let Some(list_args) = t.list_args else {
            return Ok(self.known_models());
        };
        let output = Command::new(t.program)
            .args(list_args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();
        match tokio::time::timeout(LIST_TIMEOUT, output).await {
            Ok(Ok(out)) if out.status.success() => {
                Ok(parse_model_table(&String::from_utf8_lossy(&out.stdout)))
            }
            Ok(Ok(out)) => Err(AiError::execution(
                t.id,
                String::from_utf8_lossy(&out.stderr).trim().to_string(),
            )),
            Ok(Err(e)) => Err(AiError::execution(t.id, format!("failed to list models: {e}"))),
            Err(_) => Err(AiError::Timeout {
                provider: t.id.to_string(),
                after: LIST_TIMEOUT,
            }),
        }
    }

    async fn call(&self, model: &str, prompt: &str, opts: CallOptions) -> Result<String> {
        let t = &self.template;
        if !self.is_available() {
            return Err(AiError::ProviderUnavailable {
                provider: t.id.to_string(),
                reason: self.unavailable_reason(),
            });
        }

        let args = t.build_args(model, prompt, opts);
        let timeout = self.timeout();
        tracing::debug!(provider = t.id, model, program = t.program, ?args, "spawning provider");

        let started = Instant::now();
        let output = match tokio::time::timeout(timeout, self.run(args, prompt)).await {
            Ok(res) => res?,
            Err(_) => {
                tracing::warn!(provider = t.id, model, secs = timeout.as_secs(), "provider timed out");
                return Err(AiError::Timeout {
                    provider: t.id.to_string(),
                    after: timeout,
                });
            }
        };
        tracing::debug!(
            provider = t.id,
            model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            status = ?output.status.code(),
            "provider finished"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                match output.status.code() {
                    Some(code) => format!("exited with status {code}"),
                    None => "terminated by signal".to_string(),
                }
            } else {
                stderr
            };
            return Err(AiError::execution(t.id, message));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
