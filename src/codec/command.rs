//! Codec that shells out to external tools.
//!
//! Commands come from `[codec]` in the config as argument vectors. Before
//! spawning, each argument has `{input}`, `{output}` and `{quality}`
//! replaced. No shell is involved, so paths with spaces need no quoting.
//!
//! Every invocation is bounded by a timeout. A child still running when the
//! timeout elapses is killed and reaped, and the asset fails with
//! [`CodecError::Timeout`].
//!
//! The probe command's stdout is searched for dimensions in any of these
//! shapes:
//!
//! ```text
//! pixelWidth: 8000          8000 6000          8000x6000
//! pixelHeight: 6000
//! ```

use super::backend::{Codec, CodecError, Dimensions};
use super::params::ConvertParams;
use crate::config::CodecConfig;
use regex::Regex;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::LazyLock;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

static PIXEL_WIDTH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pixelWidth:\s*(\d+)").expect("Invalid pixelWidth regex"));

static PIXEL_HEIGHT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pixelHeight:\s*(\d+)").expect("Invalid pixelHeight regex"));

static PAIR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)(?:x| +)(\d+)").expect("Invalid dimension pair regex"));

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Codec driven by configured command lines.
#[derive(Debug, Clone)]
pub struct CommandCodec {
    convert: Vec<String>,
    probe: Vec<String>,
    timeout: Duration,
}

impl CommandCodec {
    pub fn new(convert: Vec<String>, probe: Vec<String>, timeout: Duration) -> Self {
        Self {
            convert,
            probe,
            timeout,
        }
    }

    pub fn from_config(config: &CodecConfig) -> Self {
        Self::new(
            config.convert.clone(),
            config.probe.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

/// Substitute placeholders in every argument.
pub fn expand_args(template: &[String], input: &Path, output: &Path, quality: u32) -> Vec<String> {
    let input = input.to_string_lossy();
    let output = output.to_string_lossy();
    let quality = quality.to_string();
    template
        .iter()
        .map(|arg| {
            arg.replace("{input}", &input)
                .replace("{output}", &output)
                .replace("{quality}", &quality)
        })
        .collect()
}

/// Pull dimensions out of probe output.
pub fn parse_dimensions(stdout: &str) -> Option<Dimensions> {
    let keyed = |re: &Regex| {
        re.captures(stdout)
            .and_then(|c| c[1].parse::<u32>().ok())
    };
    if let (Some(width), Some(height)) = (keyed(&*PIXEL_WIDTH_REGEX), keyed(&*PIXEL_HEIGHT_REGEX)) {
        return Some(Dimensions { width, height });
    }
    let caps = PAIR_REGEX.captures(stdout)?;
    Some(Dimensions {
        width: caps[1].parse().ok()?,
        height: caps[2].parse().ok()?,
    })
}

struct Finished {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf).ok();
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            child.kill().ok();
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Run `args` to completion, killing it after `timeout`.
fn run(args: &[String], timeout: Duration) -> Result<Finished, CodecError> {
    let (program, rest) = args.split_first().ok_or(CodecError::EmptyCommand)?;
    debug!(command = ?args, "running codec command");

    let mut child = Command::new(program)
        .args(rest)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| CodecError::Spawn {
            program: program.clone(),
            source,
        })?;

    // Pipes are drained on their own threads so a chatty child cannot block.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let Some(status) = wait_with_timeout(&mut child, timeout)? else {
        // Grandchildren may still hold the pipes; leave the readers detached.
        return Err(CodecError::Timeout {
            program: program.clone(),
            timeout,
        });
    };
    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();

    match status {
        status if !status.success() => Err(CodecError::CommandFailed {
            program: program.clone(),
            status: status.to_string(),
            stderr: stderr.trim().to_string(),
        }),
        status => Ok(Finished {
            status,
            stdout,
            stderr,
        }),
    }
}

impl Codec for CommandCodec {
    fn probe(&self, path: &Path) -> Result<Dimensions, CodecError> {
        let args = expand_args(&self.probe, path, Path::new(""), 0);
        let finished = run(&args, self.timeout)?;
        parse_dimensions(&finished.stdout)
            .ok_or_else(|| CodecError::ProbeOutput(finished.stdout.trim().to_string()))
    }

    fn convert(&self, params: &ConvertParams) -> Result<(), CodecError> {
        let args = expand_args(
            &self.convert,
            &params.input,
            &params.output,
            params.quality.value(),
        );
        // A leftover file from an earlier run must not pass for fresh output.
        match fs::remove_file(&params.output) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
        let finished = run(&args, self.timeout)?;
        if !params.output.is_file() {
            return Err(CodecError::CommandFailed {
                program: args[0].clone(),
                status: finished.status.to_string(),
                stderr: format!(
                    "no output written to {}. {}",
                    params.output.display(),
                    finished.stderr.trim()
                ),
            });
        }
        Ok(())
    }
}
