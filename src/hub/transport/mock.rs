//! Scripted in-process transport for state machine and hub tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use uuid::Uuid;

use super::output::CommandOutput;
use super::traits::{FileTransfer, Transport, TransportConfig, TransportEvent, TransportFactory};
use crate::hub::error::HubError;
use crate::hub::lock;

#[derive(Clone)]
pub(crate) enum ConnectBehavior {
    Succeed,
    Fail(HubError),
    /// Never resolves; only the caller's timeout ends the attempt
    Hang,
}

#[derive(Clone)]
pub(crate) enum CloseBehavior {
    Acknowledge,
    /// Remote never acknowledges; the grace period lapses
    Stall,
    Fail(HubError),
}

pub(crate) struct MockTransport {
    connect: ConnectBehavior,
    close: CloseBehavior,
    grace: Duration,
    exec_delay: Duration,
    responses: HashMap<String, (Option<u32>, String, String)>,
    active: AtomicBool,
    events: watch::Sender<TransportEvent>,
    sftp: tokio::sync::Mutex<Option<Arc<dyn FileTransfer>>>,
    pub(crate) connect_calls: AtomicUsize,
    pub(crate) disconnect_calls: AtomicUsize,
    pub(crate) exec_calls: AtomicUsize,
    pub(crate) sftp_opens: AtomicUsize,
    pub(crate) last_config: Mutex<Option<TransportConfig>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        let (events, _) = watch::channel(TransportEvent::Pending);
        Self {
            connect: ConnectBehavior::Succeed,
            close: CloseBehavior::Acknowledge,
            grace: Duration::from_millis(50),
            exec_delay: Duration::ZERO,
            responses: HashMap::new(),
            active: AtomicBool::new(false),
            events,
            sftp: tokio::sync::Mutex::new(None),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            exec_calls: AtomicUsize::new(0),
            sftp_opens: AtomicUsize::new(0),
            last_config: Mutex::new(None),
        }
    }

    pub(crate) fn failing(mut self, error: HubError) -> Self {
        self.connect = ConnectBehavior::Fail(error);
        self
    }

    pub(crate) fn hanging(mut self) -> Self {
        self.connect = ConnectBehavior::Hang;
        self
    }

    pub(crate) fn stalling_close(mut self, grace: Duration) -> Self {
        self.close = CloseBehavior::Stall;
        self.grace = grace;
        self
    }

    pub(crate) fn failing_close(mut self, error: HubError) -> Self {
        self.close = CloseBehavior::Fail(error);
        self
    }

    pub(crate) fn with_exec_delay(mut self, delay: Duration) -> Self {
        self.exec_delay = delay;
        self
    }

    pub(crate) fn with_response(
        mut self,
        command: &str,
        exit_status: Option<u32>,
        stdout: &str,
        stderr: &str,
    ) -> Self {
        self.responses.insert(
            command.to_string(),
            (exit_status, stdout.to_string(), stderr.to_string()),
        );
        self
    }

    /// Simulates a remote-initiated lifecycle event.
    pub(crate) fn emit(&self, event: TransportEvent) {
        if matches!(event, TransportEvent::Ended | TransportEvent::Error(_)) {
            self.active.store(false, Ordering::SeqCst);
        }
        self.events.send_replace(event);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, config: &TransportConfig) -> Result<(), HubError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_config) = Some(config.clone());

        match &self.connect {
            ConnectBehavior::Succeed => {
                self.active.store(true, Ordering::SeqCst);
                self.events.send_replace(TransportEvent::Ready);
                Ok(())
            }
            ConnectBehavior::Fail(error) => {
                self.events.send_replace(TransportEvent::Error(error.to_string()));
                Err(error.clone())
            }
            ConnectBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    async fn disconnect(&self) -> Result<(), HubError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.active.store(false, Ordering::SeqCst);
        *self.sftp.lock().await = None;

        match &self.close {
            CloseBehavior::Acknowledge => {}
            CloseBehavior::Stall => tokio::time::sleep(self.grace).await,
            CloseBehavior::Fail(error) => return Err(error.clone()),
        }

        self.events.send_replace(TransportEvent::Closed);
        self.events.send_replace(TransportEvent::Ended);
        Ok(())
    }

    async fn execute(&self, command: &str) -> Result<String, HubError> {
        if !self.active.load(Ordering::SeqCst) {
            return Err(HubError::NotConnected);
        }
        self.exec_calls.fetch_add(1, Ordering::SeqCst);
        if !self.exec_delay.is_zero() {
            tokio::time::sleep(self.exec_delay).await;
        }

        let (exit_status, stdout, stderr) = self
            .responses
            .get(command)
            .cloned()
            .unwrap_or((Some(0), String::new(), String::new()));
        CommandOutput::new(exit_status, stdout, stderr).into_result()
    }

    async fn file_transfer(&self) -> Result<Arc<dyn FileTransfer>, HubError> {
        let mut cached = self.sftp.lock().await;
        if let Some(existing) = cached.as_ref() {
            return Ok(Arc::clone(existing));
        }
        if !self.active.load(Ordering::SeqCst) {
            return Err(HubError::NotConnected);
        }
        self.sftp_opens.fetch_add(1, Ordering::SeqCst);
        let handle: Arc<dyn FileTransfer> = Arc::new(MockFileTransfer {
            id: Uuid::new_v4().to_string(),
        });
        *cached = Some(Arc::clone(&handle));
        Ok(handle)
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn events(&self) -> watch::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

struct MockFileTransfer {
    id: String,
}

#[async_trait]
impl FileTransfer for MockFileTransfer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, _data: &[u8]) -> Result<(), HubError> {
        Ok(())
    }

    async fn close(&self) {}
}

type Template = dyn Fn() -> MockTransport + Send + Sync;

/// Builds transports from a template and keeps every one it hands out.
pub(crate) struct MockFactory {
    template: Box<Template>,
    pub(crate) created: Mutex<Vec<Arc<MockTransport>>>,
}

impl MockFactory {
    pub(crate) fn new(template: impl Fn() -> MockTransport + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            template: Box::new(template),
            created: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn succeeding() -> Arc<Self> {
        Self::new(MockTransport::new)
    }

    pub(crate) fn last(&self) -> Option<Arc<MockTransport>> {
        lock(&self.created).last().cloned()
    }

    pub(crate) fn created_count(&self) -> usize {
        lock(&self.created).len()
    }
}

impl TransportFactory for MockFactory {
    fn create(&self, _connection_id: &str) -> Arc<dyn Transport> {
        let transport = Arc::new((self.template)());
        lock(&self.created).push(Arc::clone(&transport));
        transport
    }
}
