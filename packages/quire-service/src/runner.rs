use std::{sync::Arc, time::Duration};

use tokio::{
	sync::{Notify, watch},
	task::JoinHandle,
	time::{self, MissedTickBehavior},
};

use crate::QuireService;

/// Background sync: drains the outbox and pulls server notes on their own intervals, and does
/// both at once whenever [`SyncLoop::trigger`] is called (for example when the network returns).
pub struct SyncLoop {
	trigger: Arc<Notify>,
	shutdown: watch::Sender<bool>,
	task: JoinHandle<()>,
}
impl SyncLoop {
	pub fn spawn(service: Arc<QuireService>) -> Self {
		let trigger = Arc::new(Notify::new());
		let (shutdown, shutdown_rx) = watch::channel(false);
		let task = tokio::spawn(run(service, trigger.clone(), shutdown_rx));

		Self { trigger, shutdown, task }
	}

	pub fn trigger(&self) {
		self.trigger.notify_one();
	}

	/// Stops the loop after the pass in progress and waits for it to exit.
	pub async fn shutdown(self) {
		let _ = self.shutdown.send(true);

		if let Err(err) = self.task.await {
			tracing::error!(error = %err, "Sync loop task ended abnormally.");
		}
	}
}

async fn run(
	service: Arc<QuireService>,
	trigger: Arc<Notify>,
	mut shutdown: watch::Receiver<bool>,
) {
	let mut drain_tick = time::interval(Duration::from_millis(service.cfg.sync.drain_interval_ms));
	let mut pull_tick = time::interval(Duration::from_millis(service.cfg.sync.pull_interval_ms));

	drain_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
	pull_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

	tracing::info!(
		drain_interval_ms = service.cfg.sync.drain_interval_ms,
		pull_interval_ms = service.cfg.sync.pull_interval_ms,
		"Sync loop started."
	);

	loop {
		tokio::select! {
			changed = shutdown.changed() => {
				if changed.is_err() || *shutdown.borrow() {
					break;
				}
			},
			_ = trigger.notified() => {
				drain_once(&service).await;
				pull_once(&service).await;
			},
			_ = drain_tick.tick() => drain_once(&service).await,
			_ = pull_tick.tick() => pull_once(&service).await,
		}
	}

	tracing::info!("Sync loop stopped.");
}

async fn drain_once(service: &QuireService) {
	if let Err(err) = service.drain_outbox().await {
		tracing::error!(error = %err, "Outbox drain failed.");
	}
}

async fn pull_once(service: &QuireService) {
	if let Err(err) = service.pull_notes().await {
		tracing::error!(error = %err, "Note pull failed.");
	}
}
