use std::time::Duration;

use async_trait::async_trait;
use link_service::{LinkServiceError, LinkServiceHandle, ServiceLifecycle};
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone)]
pub struct SimOptions {
    pub connect_delay: Duration,
    pub reject_start: bool,
    /// Fail every Nth `status` call with a network error, if set.
    pub status_outage_every: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimPhase {
    Stopped,
    Starting,
    Running,
}

/// In-process stand-in for the background tunnel service. Starting holds
/// the call for `connect_delay` while status reports Pending; stopping is
/// immediate. Starting an already active link is a no-op success.
pub struct SimLinkService {
    options: SimOptions,
    phase: Mutex<SimPhase>,
    status_calls: Mutex<u32>,
}

impl SimLinkService {
    pub fn new(options: SimOptions) -> Self {
        Self {
            options,
            phase: Mutex::new(SimPhase::Stopped),
            status_calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl LinkServiceHandle for SimLinkService {
    async fn status(&self) -> Result<ServiceLifecycle, LinkServiceError> {
        if let Some(every) = self.options.status_outage_every {
            let mut calls = self.status_calls.lock().await;
            *calls += 1;
            if every > 0 && *calls % every == 0 {
                return Err(LinkServiceError::Network("simulated outage".into()));
            }
        }
        let lifecycle = match *self.phase.lock().await {
            SimPhase::Stopped => ServiceLifecycle::Stopped,
            SimPhase::Starting => ServiceLifecycle::Pending,
            SimPhase::Running => ServiceLifecycle::Running,
        };
        Ok(lifecycle)
    }

    async fn start(&self) -> Result<(), LinkServiceError> {
        if self.options.reject_start {
            return Err(LinkServiceError::Unauthorized);
        }
        {
            let mut phase = self.phase.lock().await;
            match *phase {
                SimPhase::Stopped => {
                    info!("sim: link starting");
                    *phase = SimPhase::Starting;
                }
                SimPhase::Starting | SimPhase::Running => return Ok(()),
            }
        }
        tokio::time::sleep(self.options.connect_delay).await;

        let mut phase = self.phase.lock().await;
        // A stop issued during the delay wins; the link stays down.
        if *phase == SimPhase::Starting {
            info!("sim: link established");
            *phase = SimPhase::Running;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), LinkServiceError> {
        let mut phase = self.phase.lock().await;
        if *phase != SimPhase::Stopped {
            info!("sim: link stopped");
        }
        *phase = SimPhase::Stopped;
        Ok(())
    }
}
