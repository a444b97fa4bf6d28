use std::sync::{Arc, LazyLock};

use cadence_common::{Signal, SystemClock, internal, model::CampaignStatus};
use cadence_delivery::{
    AdapterRegistry, CampaignManager, EngagementRecorder, LogAdapter, Scheduler, TickReport,
};
use cadence_store::Repositories;
use tokio::sync::broadcast;

use crate::config::{Cadence, Seed};

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

#[tracing::instrument(level = tracing::Level::TRACE)]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

/// A configured engine: store, scheduler and operator entry points
#[derive(Debug)]
pub struct Engine {
    repos: Repositories,
    scheduler: Scheduler,
    campaigns: CampaignManager,
    engagement: EngagementRecorder,
}

impl Engine {
    /// Open the store, load the seed data and wire the scheduler.
    ///
    /// Messages for live accounts are written to the log by [`LogAdapter`].
    ///
    /// # Errors
    ///
    /// This function will return an error if the store cannot be opened, or a
    /// seeded campaign fails to activate.
    #[tracing::instrument(level = tracing::Level::TRACE, skip_all, err)]
    pub async fn build(config: Cadence) -> anyhow::Result<Self> {
        let store = Arc::new(config.store.open().await?);
        let repos = Repositories::from_store(&store);
        let clock = Arc::new(SystemClock);

        let adapters = config
            .accounts
            .into_iter()
            .fold(AdapterRegistry::new(Arc::new(LogAdapter)), AdapterRegistry::with_account);

        let campaigns = CampaignManager::new(
            repos.clone(),
            clock.clone(),
            config.scheduler.retry.clone(),
        );
        let engagement = EngagementRecorder::new(repos.clone(), clock.clone());
        let scheduler = Scheduler::new(config.scheduler, repos.clone(), adapters, clock);

        let engine = Self {
            repos,
            scheduler,
            campaigns,
            engagement,
        };
        engine.seed(config.seed).await?;

        Ok(engine)
    }

    async fn seed(&self, seed: Seed) -> anyhow::Result<()> {
        let Seed {
            templates,
            sequences,
            contacts,
            campaigns,
            suppressions,
        } = seed;

        for template in &templates {
            self.repos.templates.put_template(template).await?;
        }
        for sequence in &sequences {
            self.repos.sequences.put_sequence(sequence).await?;
        }
        for contact in &contacts {
            self.repos.contacts.put_contact(contact).await?;
        }
        for entry in &suppressions {
            self.repos
                .suppression
                .suppress(&entry.email, entry.reason, entry.at)
                .await?;
        }

        for campaign in campaigns {
            let running = match self.repos.campaigns.get_campaign(&campaign.id).await {
                Ok(stored) => stored.is_running(),
                Err(e) if e.is_not_found() => {
                    self.repos.campaigns.put_campaign(&campaign).await?;
                    campaign.status == CampaignStatus::Running
                }
                Err(e) => return Err(e.into()),
            };

            if running {
                self.campaigns.activate(&campaign.id).await?;
            }
        }

        internal!(
            level = INFO,
            "Seeded {} templates, {} sequences, {} contacts",
            templates.len(),
            sequences.len(),
            contacts.len()
        );

        Ok(())
    }

    #[must_use]
    pub const fn repos(&self) -> &Repositories {
        &self.repos
    }

    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    #[must_use]
    pub const fn campaigns(&self) -> &CampaignManager {
        &self.campaigns
    }

    #[must_use]
    pub const fn engagement(&self) -> &EngagementRecorder {
        &self.engagement
    }

    /// Run a single tick and return
    pub async fn tick_once(&self) -> TickReport {
        self.scheduler.tick().await
    }

    /// Tick on the configured interval until interrupted
    ///
    /// # Errors
    ///
    /// This function will return an error if the signal handlers cannot be
    /// installed.
    #[tracing::instrument(level = tracing::Level::TRACE, skip_all, err)]
    pub async fn run(self) -> anyhow::Result<()> {
        internal!("Controller running");

        let ret = tokio::select! {
            r = self.scheduler.serve(SHUTDOWN_BROADCAST.subscribe()) => {
                r.map_err(anyhow::Error::from)
            }
            r = shutdown() => {
                r
            }
        };

        internal!("Shutting down...");

        ret
    }
}
