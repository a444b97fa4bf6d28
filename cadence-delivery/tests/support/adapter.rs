//! A send adapter that does what it is told
#![allow(dead_code)] // Test utility module - not all methods used in every test
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{collections::VecDeque, time::Duration};

use async_trait::async_trait;
use cadence_common::model::OutboxMessage;
use cadence_delivery::{SendAdapter, SendError, SendReceipt, run_state};
use cadence_store::Repositories;
use parking_lot::Mutex;

/// What the adapter does for one send. Sends beyond the script succeed.
#[derive(Debug, Clone)]
pub enum Script {
    Accept,
    Fail(SendError),
    /// Never answer, so the scheduler's send timeout fires
    Hang,
    /// Pause the message's run, as an operator would mid-send, then accept
    PauseRunThenAccept,
    /// Stop the message's run mid-send, then accept
    StopRunThenAccept,
}

#[derive(Debug, Default)]
pub struct ScriptedAdapter {
    script: Mutex<VecDeque<Script>>,
    sent: Mutex<Vec<OutboxMessage>>,
    repos: Mutex<Option<Repositories>>,
}

impl ScriptedAdapter {
    /// Queue the behaviour of upcoming sends
    pub fn push(&self, step: Script) {
        self.script.lock().push_back(step);
    }

    /// Give the adapter access to runs for the operator scripts
    pub fn attach(&self, repos: Repositories) {
        *self.repos.lock() = Some(repos);
    }

    /// Every message the adapter accepted
    pub fn sent(&self) -> Vec<OutboxMessage> {
        self.sent.lock().clone()
    }

    /// Recipients of accepted messages, in send order
    pub fn recipients(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .flat_map(|message| message.to.clone())
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    async fn operator(&self, message: &OutboxMessage, stop: bool) {
        let repos = self.repos.lock().clone().expect("adapter not attached");
        let run = repos.runs.get_run(&message.run_id).await.unwrap();
        let next = if stop {
            run_state::stop(&run).unwrap()
        } else {
            run_state::pause(&run).unwrap()
        };
        repos.runs.update_run(&next).await.unwrap();
    }

    fn accept(&self, message: &OutboxMessage) -> SendReceipt {
        let mut sent = self.sent.lock();
        sent.push(message.clone());

        SendReceipt {
            provider_id: format!("provider-{}", sent.len()),
            thread_id: Some(format!("thread-{}", message.run_id)),
            simulated: false,
        }
    }
}

#[async_trait]
impl SendAdapter for ScriptedAdapter {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn send(&self, message: &OutboxMessage) -> Result<SendReceipt, SendError> {
        let step = self.script.lock().pop_front().unwrap_or(Script::Accept);

        match step {
            Script::Accept => Ok(self.accept(message)),
            Script::Fail(e) => Err(e),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
                Ok(self.accept(message))
            }
            Script::PauseRunThenAccept => {
                self.operator(message, false).await;
                Ok(self.accept(message))
            }
            Script::StopRunThenAccept => {
                self.operator(message, true).await;
                Ok(self.accept(message))
            }
        }
    }
}
