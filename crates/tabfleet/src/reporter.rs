// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fire-and-forget status reporting.
//!
//! Reports are queued on an unbounded channel and delivered in order by a
//! single background task, so callers never wait on the network. Delivery
//! failures are logged and dropped.

use std::sync::Arc;

use tabfleet_protocol::{CommandStatus, ControlPlane, QueueOutcome};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

enum Report {
    Status {
        command_id: String,
        status: CommandStatus,
        detail: String,
    },
    QuestionsLeft {
        instance_id: String,
        count: i64,
    },
    QueueCompletion {
        queue_id: String,
        outcome: QueueOutcome,
        result: String,
    },
    Flush(oneshot::Sender<()>),
}

/// Handle for queueing reports. Cheap to clone.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    tx: mpsc::UnboundedSender<Report>,
}

impl std::fmt::Debug for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Report::Status { command_id, status, .. } => {
                write!(f, "Status({command_id}, {status})")
            }
            Report::QuestionsLeft { count, .. } => write!(f, "QuestionsLeft({count})"),
            Report::QueueCompletion { queue_id, outcome, .. } => {
                write!(f, "QueueCompletion({queue_id}, {})", outcome.as_str())
            }
            Report::Flush(_) => f.write_str("Flush"),
        }
    }
}

impl StatusReporter {
    /// Spawn the delivery task. It ends once every handle is dropped.
    pub fn spawn(control_plane: Arc<dyn ControlPlane>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(deliver(control_plane, rx));
        (Self { tx }, handle)
    }

    fn enqueue(&self, report: Report) {
        if self.tx.send(report).is_err() {
            warn!("Status reporter stopped, report dropped");
        }
    }

    /// Queue a command status update.
    pub fn report(&self, command_id: &str, status: CommandStatus, detail: &str) {
        self.enqueue(Report::Status {
            command_id: command_id.to_string(),
            status,
            detail: detail.to_string(),
        });
    }

    /// Queue a remaining-question count update.
    pub fn questions_left(&self, instance_id: &str, count: i64) {
        self.enqueue(Report::QuestionsLeft {
            instance_id: instance_id.to_string(),
            count,
        });
    }

    /// Queue a secondary queue notification.
    pub fn queue_completion(&self, queue_id: &str, outcome: QueueOutcome, result: &str) {
        self.enqueue(Report::QueueCompletion {
            queue_id: queue_id.to_string(),
            outcome,
            result: result.to_string(),
        });
    }

    /// Wait until everything queued so far has been attempted.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.enqueue(Report::Flush(tx));
        let _ = rx.await;
    }
}

async fn deliver(control_plane: Arc<dyn ControlPlane>, mut rx: mpsc::UnboundedReceiver<Report>) {
    debug!("Status reporter started");
    while let Some(report) = rx.recv().await {
        let result = match &report {
            Report::Status {
                command_id,
                status,
                detail,
            } => {
                info!(command_id = %command_id, status = %status, "Reporting command status");
                control_plane
                    .update_command_status(command_id, *status, detail)
                    .await
            }
            Report::QuestionsLeft { instance_id, count } => {
                control_plane.update_questions_left(instance_id, *count).await
            }
            Report::QueueCompletion {
                queue_id,
                outcome,
                result,
            } => {
                info!(queue_id = %queue_id, outcome = outcome.as_str(), "Notifying queue");
                control_plane
                    .complete_queue_item(queue_id, *outcome, result)
                    .await
            }
            Report::Flush(_) => Ok(()),
        };

        match report {
            Report::Flush(done) => {
                let _ = done.send(());
            }
            other => {
                if let Err(e) = result {
                    warn!(report = ?other, error = %e, "Status report failed");
                }
            }
        }
    }
    debug!("Status reporter stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tabfleet_protocol::{ClientError, PollIdentity, RawCommand, RegisterResponse};

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl Recorder {
        fn record(&self, call: String) -> tabfleet_protocol::error::Result<()> {
            self.calls.lock().unwrap().push(call);
            if self.fail {
                Err(ClientError::Status { status: 500 })
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl ControlPlane for Recorder {
        async fn pending_commands(
            &self,
            _identity: &PollIdentity,
        ) -> tabfleet_protocol::error::Result<Vec<RawCommand>> {
            Ok(Vec::new())
        }

        async fn update_command_status(
            &self,
            command_id: &str,
            status: CommandStatus,
            detail: &str,
        ) -> tabfleet_protocol::error::Result<()> {
            self.record(format!("{command_id}:{status}:{detail}"))
        }

        async fn update_questions_left(
            &self,
            instance_id: &str,
            questions_left: i64,
        ) -> tabfleet_protocol::error::Result<()> {
            self.record(format!("left:{instance_id}:{questions_left}"))
        }

        async fn heartbeat(
            &self,
            _instance_id: &str,
            _is_running: bool,
        ) -> tabfleet_protocol::error::Result<()> {
            Ok(())
        }

        async fn auto_register(
            &self,
            _instance_id: &str,
            _profile_name: &str,
        ) -> tabfleet_protocol::error::Result<RegisterResponse> {
            Err(ClientError::Status { status: 404 })
        }

        async fn complete_queue_item(
            &self,
            queue_id: &str,
            outcome: QueueOutcome,
            _result: &str,
        ) -> tabfleet_protocol::error::Result<()> {
            self.record(format!("queue:{queue_id}:{}", outcome.as_str()))
        }
    }

    #[tokio::test]
    async fn test_reports_delivered_in_order() {
        let recorder = Arc::new(Recorder::default());
        let (reporter, _handle) = StatusReporter::spawn(recorder.clone());

        reporter.report("7", CommandStatus::Processing, "Started");
        reporter.questions_left("inst", 3);
        reporter.queue_completion("q1", QueueOutcome::Completed, "{}");
        reporter.report("7", CommandStatus::Success, "Done");
        reporter.flush().await;

        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec![
                "7:processing:Started",
                "left:inst:3",
                "queue:q1:completed",
                "7:success:Done",
            ]
        );
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_delivery() {
        let recorder = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let (reporter, _handle) = StatusReporter::spawn(recorder.clone());

        reporter.report("1", CommandStatus::Failed, "x");
        reporter.report("2", CommandStatus::Success, "y");
        reporter.flush().await;

        assert_eq!(recorder.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_task_ends_when_handles_dropped() {
        let (reporter, handle) = StatusReporter::spawn(Arc::new(Recorder::default()));
        drop(reporter);
        handle.await.unwrap();
    }
}
