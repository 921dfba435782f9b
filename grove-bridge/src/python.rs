//! Long-lived Python interpreter session
//!
//! The interpreter runs as a child process executing a small shim that
//! imports the driver module once and then answers one call per line. A call
//! holds the session lock for its whole request/reply exchange, so calls
//! from concurrent handlers are serialized.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::{Bridge, Scalar};

const SHIM: &str = include_str!("shim.py");

fn default_program() -> String {
    "python3".to_string()
}

fn default_module_path() -> PathBuf {
    PathBuf::from("../../../../../../extlibs/GrovePi/Software/Python")
}

fn default_module() -> String {
    "grovepilib".to_string()
}

fn default_call_timeout_ms() -> u64 {
    5000
}

/// Where to find the interpreter and the driver module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Interpreter executable
    #[serde(default = "default_program")]
    pub program: String,
    /// Directory holding the driver module, passed as PYTHONPATH
    #[serde(default = "default_module_path")]
    pub module_path: PathBuf,
    /// Driver module name
    #[serde(default = "default_module")]
    pub module: String,
    /// Upper bound for one call, including interpreter start-up
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            module_path: default_module_path(),
            module: default_module(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl BridgeConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

#[derive(Debug, thiserror::Error)]
enum SessionError {
    #[error("failed to start interpreter: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("interpreter i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("interpreter closed its output")]
    Closed,
    #[error("malformed reply: {0}")]
    Reply(#[from] serde_json::Error),
    #[error("reply id {got:?} does not match request {expected}")]
    OutOfSync { expected: u64, got: Option<u64> },
}

#[derive(Serialize)]
struct CallRequest<'a> {
    id: u64,
    func: &'a str,
    args: Vec<Scalar>,
}

#[derive(Deserialize)]
struct CallReply {
    id: Option<u64>,
    ok: bool,
    #[serde(default)]
    result: Scalar,
    #[serde(default)]
    error: Option<String>,
}

struct Session {
    // Held for kill_on_drop
    _child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

impl Session {
    fn start(config: &BridgeConfig) -> Result<Self, SessionError> {
        let mut child = Command::new(&config.program)
            .arg("-u")
            .arg("-c")
            .arg(SHIM)
            .arg(&config.module)
            .env("PYTHONPATH", &config.module_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(SessionError::Spawn)?;

        let stdin = child.stdin.take().ok_or(SessionError::Closed)?;
        let stdout = child.stdout.take().ok_or(SessionError::Closed)?;

        // Forward driver chatter to the log
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: "grove_bridge::driver", "{line}");
                }
            });
        }

        tracing::info!(
            program = %config.program,
            module = %config.module,
            path = %config.module_path.display(),
            "started interpreter session"
        );

        Ok(Self {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 0,
        })
    }

    async fn call(
        &mut self,
        function: &str,
        arg: Option<Scalar>,
    ) -> Result<CallReply, SessionError> {
        self.next_id += 1;
        let request = CallRequest {
            id: self.next_id,
            func: function,
            args: arg.into_iter().collect(),
        };

        let mut line = serde_json::to_vec(&request)?;
        line.push(b'\n');
        self.stdin.write_all(&line).await?;
        self.stdin.flush().await?;

        let reply_line = self.stdout.next_line().await?.ok_or(SessionError::Closed)?;
        let reply: CallReply = serde_json::from_str(&reply_line)?;

        if reply.id != Some(self.next_id) {
            return Err(SessionError::OutOfSync {
                expected: self.next_id,
                got: reply.id,
            });
        }

        Ok(reply)
    }
}

/// Bridge to the Python driver module through one interpreter session.
///
/// The session starts on the first call and is restarted on the call after
/// any session failure or timeout.
pub struct PythonBridge {
    config: BridgeConfig,
    session: Mutex<Option<Session>>,
}

impl PythonBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Stop the interpreter; the next call starts a new one
    pub async fn shutdown(&self) {
        if self.session.lock().await.take().is_some() {
            tracing::info!("stopped interpreter session");
        }
    }
}

impl Bridge for PythonBridge {
    async fn call(&self, function: &str, arg: Option<Scalar>) -> Option<Scalar> {
        let mut guard = self.session.lock().await;

        if guard.is_none() {
            match Session::start(&self.config) {
                Ok(session) => *guard = Some(session),
                Err(e) => {
                    tracing::warn!(func = function, error = %e, "can not access driver");
                    return None;
                }
            }
        }
        let session = (*guard).as_mut()?;

        let outcome =
            tokio::time::timeout(self.config.call_timeout(), session.call(function, arg)).await;

        match outcome {
            Ok(Ok(reply)) if reply.ok => {
                tracing::debug!(func = function, result = ?reply.result, "driver call");
                Some(reply.result)
            }
            Ok(Ok(reply)) => {
                let error = reply.error.unwrap_or_else(|| "unknown error".to_string());
                tracing::warn!(func = function, %error, "driver call failed");
                None
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    func = function,
                    error = %e,
                    "driver session failed, restarting on next call"
                );
                *guard = None;
                None
            }
            Err(_) => {
                tracing::warn!(
                    func = function,
                    timeout_ms = self.config.call_timeout_ms,
                    "driver call timed out"
                );
                *guard = None;
                None
            }
        }
    }
}
