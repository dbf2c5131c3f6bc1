//! Handle for talking back to the connected BSP client.
//!
//! Notifications are fire-and-forget: a disconnected client must never wedge
//! a build in progress, so send failures are dropped after a log line.

use crossbeam_channel::Sender;
use girder_bsp::{self as bsp, Message, Notification};
use serde::Serialize;

#[derive(Clone)]
pub struct BuildClient {
    sender: Sender<Message>,
}

impl BuildClient {
    pub fn new(sender: Sender<Message>) -> Self {
        Self { sender }
    }

    pub fn send(&self, message: Message) {
        if self.sender.send(message).is_err() {
            tracing::debug!("client channel closed, dropping outbound message");
        }
    }

    pub fn notify(&self, method: &str, params: impl Serialize) {
        let params = match serde_json::to_value(params) {
            Ok(params) => params,
            Err(err) => {
                tracing::error!(method, error = %err, "failed to serialize notification");
                return;
            }
        };
        self.send(Message::Notification(Notification {
            method: method.to_string(),
            params,
        }));
    }

    pub fn log_message(&self, message_type: i32, message: impl Into<String>) {
        self.notify(
            bsp::methods::LOG_MESSAGE,
            bsp::LogMessageParams {
                message_type,
                origin_id: None,
                message: message.into(),
            },
        );
    }

    pub fn task_start(&self, params: bsp::TaskStartParams) {
        self.notify(bsp::methods::TASK_START, params);
    }

    pub fn task_progress(&self, params: bsp::TaskProgressParams) {
        self.notify(bsp::methods::TASK_PROGRESS, params);
    }

    pub fn task_finish(&self, params: bsp::TaskFinishParams) {
        self.notify(bsp::methods::TASK_FINISH, params);
    }

    pub fn publish_diagnostics(&self, params: bsp::PublishDiagnosticsParams) {
        self.notify(bsp::methods::PUBLISH_DIAGNOSTICS, params);
    }

    pub fn did_change_build_target(&self, params: bsp::DidChangeBuildTarget) {
        self.notify(bsp::methods::DID_CHANGE_BUILD_TARGET, params);
    }
}
