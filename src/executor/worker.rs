//! The Executor's run loop. Plays the role the teacher's `job_worker` thread pool played -- one
//! OS thread per unit of work, so a slow or panicking model can't stall the others -- adapted
//! from pulling jobs off a poll loop to consuming pushed broker deliveries.
//!
//! Acknowledging a delivery requires the `lapin::Channel` that received it, and that channel is
//! not `Sync`; it has to stay on the task that owns the consumer. Dispatch itself runs on a
//! plain thread (model calls block and may be CPU-heavy), so each worker thread hands its
//! delivery's `Acker` back over a channel to an async task that does nothing but drain it and
//! ack.

use config::ExecutorConfig;
use errors::*;
use http_requester::HttpRequesterFactory;
use mediators::broker;
use model_runtime::ModelRegistry;
use sentinel;

use futures::StreamExt;
use lapin::acker::Acker;
use lapin::options::BasicAckOptions;
use serde_json::{json, Value};
use slog::Logger;
use std::collections::HashMap;
use std::fs;
use tokio::sync::mpsc;

const MODELS_VERSIONS_PATH: &str = "/tmp/runid_models.pkl";

pub struct Executor {
    pub log: Logger,
    pub config: ExecutorConfig,
    pub models: ModelRegistry,
    pub http_requester_factory: Box<dyn HttpRequesterFactory>,
}

impl Executor {
    pub async fn run(self) -> Result<()> {
        self.persist_models_versions()?;

        if let Err(e) = self.announce().await {
            sentinel::fatal_silent(&self.log, &format!("failed to announce to the gateway: {}", e));
        }

        let amqp_addr = self.config.amqp_addr();
        let amqp_conn = broker::connect(&amqp_addr).await?;
        let mut consumer =
            broker::declare_worker_queue_and_consume(&amqp_conn, &self.config.worker_id).await?;

        info!(self.log, "Executor ready"; "worker_id" => self.config.worker_id.as_str(),
            "models" => format!("{:?}", self.models.model_names()));

        let (ack_tx, mut ack_rx) = mpsc::unbounded_channel::<Acker>();
        let ack_log = self.log.clone();
        actix_rt::spawn(async move {
            while let Some(acker) = ack_rx.recv().await {
                if let Err(e) = acker.ack(BasicAckOptions::default()).await {
                    error!(ack_log, "Failed to ack delivery"; "error" => e.to_string());
                }
            }
        });

        while let Some(delivery) = consumer.next().await {
            let delivery = match delivery {
                Ok(delivery) => delivery,
                Err(e) => {
                    error!(self.log, "Error reading delivery from the broker"; "error" => e.to_string());
                    continue;
                }
            };

            let log = self.log.clone();
            let config_clone = self.config.clone();
            let models = self.models.clone();
            let mut requester = self.http_requester_factory.create();
            let ack_tx = ack_tx.clone();
            let acker = delivery.acker.clone();
            let data = delivery.data.clone();

            std::thread::spawn(move || {
                super::dispatch::handle(&log, &config_clone, &models, &mut *requester, &data);
                let _ = ack_tx.send(acker);
            });
        }

        Ok(())
    }

    /// Persists `{model_name -> version}` so an external health check (or a restart) can see
    /// what this worker last claimed to serve without asking it directly.
    fn persist_models_versions(&self) -> Result<()> {
        let mut versions: HashMap<String, String> = HashMap::new();
        for model_name in self.models.model_names() {
            if let Some(model) = self.models.get(&model_name) {
                versions.insert(model_name, model.get_model_version());
            }
        }
        let body = serde_json::to_vec(&versions)?;
        fs::write(MODELS_VERSIONS_PATH, body)
            .chain_err(|| format!("failed to write {}", MODELS_VERSIONS_PATH))
    }

    /// Announces this worker's identity and served models to the Gateway's `/advworkid`
    /// endpoint. A non-`Done` response (or a network failure) is fatal: a worker that can't
    /// register itself has no way to ever receive a job.
    async fn announce(&self) -> Result<()> {
        let url = format!("{}/advworkid", self.config.api_url);
        let worker_id = self.config.worker_id.clone();
        let credential = self.config.advworkid_credential.clone();
        let model_names = self.models.model_names();
        let token = self.config.api_token_workers.clone();
        let log = self.log.clone();
        let mut requester = self.http_requester_factory.create();

        let body = json!({
            "advworkid_cred": credential,
            "worker_id": worker_id,
            "models": model_names,
        });

        let resp = actix_web::web::block(move || requester.post_json(&log, &url, &token, &body))
            .await
            .chain_err(|| "announce task panicked")??;

        match resp.get("status").and_then(Value::as_str) {
            Some("Done") => Ok(()),
            _ => bail!(format!("gateway rejected announcement: {}", resp)),
        }
    }
}
