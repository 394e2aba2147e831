//! `/x <command>`: run a shell command on the host and reply with its output.
//!
//! This is a deliberately dangerous escape hatch. It hands arbitrary input to
//! `sh -c` with the bot's privileges, so it only answers the single operator
//! identity named in `operator_id`. Everyone else gets a denial and nothing runs.
//! There is no timeout: a hung command only holds back its own reply.

use std::{process::Output, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use bot_core::{Plugin, PluginContext, PluginSpec, Session, address, reply, send_text_to, truncate};

pub const ACCESS_DENIED: &str = "*_ACCESS DENIED_*";
const MAX_BLOCK_CHARS: usize = 3500;

#[derive(Debug, Default, Deserialize)]
struct ExecConfig {
    #[serde(default)]
    operator_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Exec {
    tracker: TaskTracker,
}

impl Exec {
    /// Commands run on tasks of `tracker`, so shutdown can wait for them.
    #[must_use]
    pub const fn new(tracker: TaskTracker) -> Self {
        Self { tracker }
    }
}

fn authorized(spec: &PluginSpec, sender: &str) -> bool {
    let cfg = serde_yaml::from_value::<ExecConfig>(spec.config.clone()).unwrap_or_default();
    cfg.operator_id
        .as_deref()
        .map(str::trim)
        .is_some_and(|id| !id.is_empty() && id == address::user_part(sender))
}

/// Combined stdout/error/stderr report.
#[must_use]
pub fn report(outcome: &std::io::Result<Output>) -> String {
    let mut blocks = Vec::new();
    match outcome {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stdout.trim().is_empty() {
                blocks.push(format!("*OUTPUT:*\n{}", truncate(stdout.trim_end(), MAX_BLOCK_CHARS)));
            }
            if !output.status.success() {
                blocks.push(format!("*ERROR:*\ncommand failed: {}", output.status));
            }
            if !stderr.trim().is_empty() {
                blocks.push(format!("*STDERR:*\n{}", truncate(stderr.trim_end(), MAX_BLOCK_CHARS)));
            }
        }
        Err(e) => blocks.push(format!("*ERROR:*\n{e}")),
    }
    if blocks.is_empty() {
        "(no output)".to_owned()
    } else {
        blocks.join("\n\n")
    }
}

async fn execute(session: Arc<dyn Session>, origin: String, command: String) {
    info!(command = %command, "Running shell command");
    let outcome = Command::new("sh").arg("-c").arg(&command).output().await;
    if let Err(e) = send_text_to(session.as_ref(), &origin, report(&outcome)).await {
        warn!(error = %e, to = %origin, "Failed to send command report");
    }
}

#[async_trait]
impl Plugin for Exec {
    fn id(&self) -> &'static str {
        "exec"
    }

    fn help(&self) -> &'static str {
        "/x <command>: run a shell command (operator only)"
    }

    fn spec(&self) -> PluginSpec {
        PluginSpec::new("exec", &["/x"])
    }

    async fn run(&self, ctx: &PluginContext, args: &str, spec: &PluginSpec) -> Result<()> {
        if !authorized(spec, &ctx.message.sender) {
            warn!(sender = %ctx.message.sender, "Denied shell command");
            return reply(ctx, ACCESS_DENIED).await;
        }
        let command = args.trim().to_owned();
        self.tracker.spawn(execute(
            Arc::clone(&ctx.session),
            ctx.message.origin.clone(),
            command,
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    use bot_core::{
        InboundMessage, PluginRegistry,
        testing::{RecordingSession, context},
    };

    const OPERATOR: &str = "5493510000000@s.whatsapp.net";

    fn spec() -> PluginSpec {
        let mut spec = Exec::new(TaskTracker::new()).spec();
        spec.config = serde_yaml::from_str("operator_id: '5493510000000'").unwrap();
        spec
    }

    fn ctx(session: &Arc<RecordingSession>, sender: &str, cmd: &str) -> PluginContext {
        let message = InboundMessage::text("m1", sender, format!("/x {cmd}"));
        context(session, message, Arc::new(PluginRegistry::new()))
    }

    #[tokio::test]
    async fn stranger_is_denied_and_nothing_runs() {
        let tracker = TaskTracker::new();
        let plugin = Exec::new(tracker.clone());
        let session = Arc::new(RecordingSession::new());
        plugin
            .run(&ctx(&session, "111@s.whatsapp.net", "echo hi"), "echo hi", &spec())
            .await
            .unwrap();

        assert!(tracker.is_empty());
        assert_eq!(
            session.sent_texts(),
            vec![("111@s.whatsapp.net".to_owned(), ACCESS_DENIED.to_owned())]
        );
    }

    #[tokio::test]
    async fn missing_operator_denies_everyone() {
        let plugin = Exec::new(TaskTracker::new());
        let session = Arc::new(RecordingSession::new());
        let mut unset = spec();
        unset.config = serde_yaml::Value::default();
        plugin
            .run(&ctx(&session, OPERATOR, "echo hi"), "echo hi", &unset)
            .await
            .unwrap();

        assert_eq!(session.sent_texts()[0].1, ACCESS_DENIED);
    }

    #[tokio::test]
    async fn operator_gets_the_output() {
        let tracker = TaskTracker::new();
        let plugin = Exec::new(tracker.clone());
        let session = Arc::new(RecordingSession::new());
        plugin
            .run(&ctx(&session, OPERATOR, "echo hi"), "echo hi", &spec())
            .await
            .unwrap();

        tracker.close();
        tracker.wait().await;
        assert!(session.wait_for_sends(1, Duration::from_secs(1)).await);
        assert_eq!(
            session.sent_texts(),
            vec![(OPERATOR.to_owned(), "*OUTPUT:*\nhi".to_owned())]
        );
    }

    #[tokio::test]
    async fn failing_command_reports_error_and_stderr() {
        let outcome = Command::new("sh")
            .arg("-c")
            .arg("echo oops >&2; exit 3")
            .output()
            .await;
        let text = report(&outcome);
        assert!(text.starts_with("*ERROR:*\ncommand failed"));
        assert!(text.ends_with("*STDERR:*\noops"));
    }

    #[test]
    fn spawn_failure_is_an_error_block() {
        let outcome = Err(std::io::Error::other("no shell"));
        assert_eq!(report(&outcome), "*ERROR:*\nno shell");
    }

    #[tokio::test]
    async fn silent_command_says_no_output() {
        let outcome = Command::new("sh").arg("-c").arg("true").output().await;
        assert_eq!(report(&outcome), "(no output)");
    }
}
