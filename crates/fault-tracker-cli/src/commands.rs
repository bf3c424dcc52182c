//! Subcommand implementations.

use crate::error::CliError;
use crate::paths::Paths;
use fault_outbox::{QueueStore, ReqwestClient};
use fault_tracker::{
    CaptureContext, FaultKind, Host, ManualFault, OutboxResult, SqliteStore, StaticContext,
    Tracker, TrackerOptions,
};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

const USER_AGENT: &str = concat!("fault-tracker-cli/", env!("CARGO_PKG_VERSION"));

/// Options from the config file, then the environment, then `--report-url`.
///
/// An explicit `--config` must exist; the default config file is optional.
pub fn load_options(
    paths: &Paths,
    config: Option<&Path>,
    report_url: Option<String>,
) -> anyhow::Result<TrackerOptions> {
    let options = match config {
        Some(path) => TrackerOptions::load_from_file(path)?,
        None => {
            let default_path = paths.config_file();
            if default_path.exists() {
                TrackerOptions::load_from_file(&default_path)?
            } else {
                debug!(path = %default_path.display(), "No config file; using defaults");
                TrackerOptions::default()
            }
        }
    };

    let mut options = options.apply_env();
    if report_url.is_some() {
        options.report_url = report_url;
    }
    Ok(options)
}

/// Build a host backed by the on-disk queue and a reqwest client.
fn cli_host(paths: &Paths) -> anyhow::Result<Host> {
    paths.ensure_dirs()?;
    debug!(base_dir = %paths.base_dir().display(), "Opening durable queue");
    let store = SqliteStore::open(&paths.store_file())?;
    let http = ReqwestClient::new(ReqwestClient::DEFAULT_TIMEOUT)?;
    let cwd = std::env::current_dir()?;

    Ok(Host::current()
        .with_http(Arc::new(http))
        .with_store(Arc::new(store))
        .with_context(Arc::new(StaticContext::new(
            format!("file://{}", cwd.display()),
            USER_AGENT,
        ))))
}

fn start(paths: &Paths, options: TrackerOptions) -> anyhow::Result<Tracker> {
    let tracker = Tracker::new();
    tracker.init(options, cli_host(paths)?)?;
    Ok(tracker)
}

/// Print the outcome of a flush. Returns whether the queue was delivered.
fn report(outcome: Option<OutboxResult<u16>>, tracker: &Tracker) -> bool {
    match outcome {
        Some(Ok(status)) => {
            println!("delivered (HTTP {status})");
            true
        }
        Some(Err(e)) => {
            let pending = tracker.queue_snapshot().len();
            println!("delivery failed: {e}; {pending} record(s) kept for the next run");
            false
        }
        None => {
            println!("nothing to deliver");
            true
        }
    }
}

pub struct CaptureArgs {
    pub message: String,
    pub stack: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub kind: Option<String>,
    pub extra: Option<String>,
}

impl CaptureArgs {
    fn into_parts(self) -> Result<(ManualFault, CaptureContext), CliError> {
        let kind = self
            .kind
            .map(|k| {
                k.parse::<FaultKind>()
                    .map_err(|_| CliError::InvalidArgument(format!("unknown kind '{k}'")))
            })
            .transpose()?;
        let extra = self
            .extra
            .map(|raw| {
                serde_json::from_str(&raw)
                    .map_err(|e| CliError::InvalidArgument(format!("--extra is not JSON: {e}")))
            })
            .transpose()?;

        let mut fault = ManualFault::new(self.message);
        if let Some(stack) = self.stack {
            fault = fault.with_stack(stack);
        }
        let context = CaptureContext {
            kind,
            source_file: self.file,
            line: self.line,
            column: self.column,
            extra,
        };
        Ok((fault, context))
    }
}

/// Record one fault and deliver it with anything already pending.
pub async fn capture(paths: &Paths, options: TrackerOptions, args: CaptureArgs) -> anyhow::Result<bool> {
    let (fault, context) = args.into_parts()?;
    let tracker = start(paths, options)?;
    tracker.capture_error(fault, context);
    let outcome = tracker.flush().await;
    Ok(report(outcome, &tracker))
}

/// Deliver whatever the durable queue holds.
pub async fn flush(paths: &Paths, options: TrackerOptions) -> anyhow::Result<bool> {
    let tracker = start(paths, options)?;
    let pending = tracker.queue_snapshot().len();
    info!(pending, "Flushing persisted queue");
    let outcome = tracker.flush().await;
    Ok(report(outcome, &tracker))
}

/// Print the durable queue as JSON without starting delivery.
pub fn queue(paths: &Paths) -> anyhow::Result<()> {
    let store_file = paths.store_file();
    let records = if store_file.exists() {
        let store = SqliteStore::open(&store_file)?;
        QueueStore::new(Some(Arc::new(store))).load()
    } else {
        Vec::new()
    };
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

/// Capture each stdin line as a manual fault until EOF or Ctrl-C, then flush.
pub async fn watch(paths: &Paths, options: TrackerOptions) -> anyhow::Result<bool> {
    let tracker = start(paths, options)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut captured = 0usize;

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    tracker.capture_error(line, CaptureContext::default());
                    captured += 1;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted; flushing before exit");
                break;
            }
        }
    }

    info!(captured, "Input closed");
    let outcome = tracker.flush().await;
    Ok(report(outcome, &tracker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(message: &str) -> CaptureArgs {
        CaptureArgs {
            message: message.into(),
            stack: None,
            file: None,
            line: None,
            column: None,
            kind: None,
            extra: None,
        }
    }

    #[test]
    fn capture_args_build_context() {
        let (fault, context) = CaptureArgs {
            stack: Some("at job.rs:4".into()),
            line: Some(4),
            kind: Some("Runtime".into()),
            extra: Some(r#"{"job":"nightly"}"#.into()),
            ..args("job failed")
        }
        .into_parts()
        .unwrap();

        assert_eq!(fault.message, "job failed");
        assert_eq!(fault.stack.as_deref(), Some("at job.rs:4"));
        assert_eq!(context.kind, Some(FaultKind::Runtime));
        assert_eq!(context.line, Some(4));
        assert_eq!(context.extra, Some(serde_json::json!({"job": "nightly"})));
    }

    #[test]
    fn capture_args_reject_bad_input() {
        let bad_kind = CaptureArgs {
            kind: Some("fatal".into()),
            ..args("x")
        };
        assert!(matches!(bad_kind.into_parts(), Err(CliError::InvalidArgument(_))));

        let bad_extra = CaptureArgs {
            extra: Some("{not json".into()),
            ..args("x")
        };
        assert!(matches!(bad_extra.into_parts(), Err(CliError::InvalidArgument(_))));
    }

    #[test]
    fn load_options_layers_sources() {
        let tmp = TempDir::new().unwrap();
        let paths = Paths::with_base_dir(tmp.path().to_path_buf());
        std::fs::write(
            paths.config_file(),
            r#"{"reportUrl":"https://file.test/e","project":"batch"}"#,
        )
        .unwrap();

        let options = load_options(&paths, None, Some("https://flag.test/e".into())).unwrap();
        assert_eq!(options.report_url.as_deref(), Some("https://flag.test/e"));
        assert_eq!(options.project.as_deref(), Some("batch"));
    }

    #[test]
    fn missing_default_config_is_fine() {
        let tmp = TempDir::new().unwrap();
        let paths = Paths::with_base_dir(tmp.path().to_path_buf());
        let options = load_options(&paths, None, Some("https://flag.test/e".into())).unwrap();
        assert!(options.project.is_none());
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let paths = Paths::with_base_dir(tmp.path().to_path_buf());
        let missing = tmp.path().join("nope.json");
        assert!(load_options(&paths, Some(&missing), None).is_err());
    }

    #[test]
    fn queue_on_fresh_dir_prints_empty_list() {
        let tmp = TempDir::new().unwrap();
        let paths = Paths::with_base_dir(tmp.path().to_path_buf());
        queue(&paths).unwrap();
    }
}
