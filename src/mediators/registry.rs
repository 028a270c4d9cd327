//! The queue registry: the `model_name -> worker_id` map the Gateway consults on every admission
//! and mutates only through `/advworkid`. Represented in memory as a mutex-guarded `HashMap`,
//! refreshed from the store at most once per `refresh_interval_seconds` so that multiple Gateway
//! instances eventually converge (source: module-level dictionary reloaded every 300s).

use errors::*;
use mediators::job_store;
use model::insertable;
use time_helpers;

use diesel::pg::PgConnection;
use slog::Logger;
use std::collections::HashMap;
use std::sync::Mutex;

pub struct RegistryCache {
    map: Mutex<HashMap<String, String>>,
    next_reload: Mutex<f64>,
    refresh_interval_seconds: i64,
}

impl RegistryCache {
    pub fn load(conn: &PgConnection, refresh_interval_seconds: i64) -> Result<RegistryCache> {
        let entries = job_store::load_registry(conn)?;
        let map = entries
            .into_iter()
            .map(|e| (e.model_name, e.worker_id))
            .collect();
        Ok(RegistryCache {
            map: Mutex::new(map),
            next_reload: Mutex::new(0.0),
            refresh_interval_seconds,
        })
    }

    pub fn worker_for(&self, model_name: &str) -> Option<String> {
        self.map.lock().unwrap().get(model_name).cloned()
    }

    /// At most once per `refresh_interval_seconds`, advances the reload deadline and replaces the
    /// in-memory map with a fresh read from the store. A failed read is logged and the existing
    /// map is retained, matching the source's `reload_queue_registry` behavior.
    pub fn refresh_if_needed(&self, log: &Logger, conn: &PgConnection) {
        let now = time_helpers::epoch_now();
        {
            let mut next_reload = self.next_reload.lock().unwrap();
            if *next_reload >= now {
                return;
            }
            *next_reload = now + self.refresh_interval_seconds as f64;
        }

        match job_store::load_registry(conn) {
            Ok(entries) => {
                let mut map = self.map.lock().unwrap();
                *map = entries.into_iter().map(|e| (e.model_name, e.worker_id)).collect();
                info!(log, "Reloaded queue registry"; "num_models" => map.len());
            }
            Err(e) => {
                error!(log, "Failed to reload queue registry"; "error" => e.to_string());
            }
        }
    }

    /// Applies a worker's `/advworkid` announcement: adds any model that isn't registered yet,
    /// and overrides (logging the change) any model that is currently owned by a different
    /// worker. Persists after each change, same as the source.
    pub fn apply_announcement(
        &self,
        log: &Logger,
        conn: &PgConnection,
        worker_id: &str,
        models: &[String],
    ) -> Result<()> {
        for model_name in models {
            let previous = self.map.lock().unwrap().get(model_name).cloned();

            match previous {
                None => {
                    job_store::save_registry_entry(
                        conn,
                        &insertable::QueueRegistryEntry {
                            model_name: model_name.clone(),
                            worker_id: worker_id.to_owned(),
                        },
                    )?;
                    self.map
                        .lock()
                        .unwrap()
                        .insert(model_name.clone(), worker_id.to_owned());
                    info!(log, "Registered new model"; "model_name" => model_name.as_str(), "worker_id" => worker_id);
                }
                Some(ref owner) if owner != worker_id => {
                    job_store::save_registry_entry(
                        conn,
                        &insertable::QueueRegistryEntry {
                            model_name: model_name.clone(),
                            worker_id: worker_id.to_owned(),
                        },
                    )?;
                    self.map
                        .lock()
                        .unwrap()
                        .insert(model_name.clone(), worker_id.to_owned());
                    info!(log, "Worker responsible for model changed";
                        "model_name" => model_name.as_str(), "old_worker_id" => owner.as_str(), "new_worker_id" => worker_id);
                }
                Some(_) => {
                    // Already owned by this worker -- a no-op re-announcement.
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mediators::registry::*;
    use test_helpers;

    #[test]
    fn test_apply_announcement_registers_new_model() {
        let conn = test_helpers::connection();
        let log = test_helpers::log();
        let cache = RegistryCache::load(&conn, 300).unwrap();

        cache
            .apply_announcement(&log, &conn, "worker-1", &["model-a".to_owned()])
            .unwrap();
        assert_eq!(Some("worker-1".to_owned()), cache.worker_for("model-a"));
    }

    #[test]
    fn test_apply_announcement_overrides_owner() {
        let conn = test_helpers::connection();
        let log = test_helpers::log();
        let cache = RegistryCache::load(&conn, 300).unwrap();

        cache
            .apply_announcement(&log, &conn, "worker-1", &["model-a".to_owned()])
            .unwrap();
        cache
            .apply_announcement(&log, &conn, "worker-2", &["model-a".to_owned()])
            .unwrap();
        assert_eq!(Some("worker-2".to_owned()), cache.worker_for("model-a"));
    }

    #[test]
    fn test_worker_for_missing_model() {
        let conn = test_helpers::connection();
        let cache = RegistryCache::load(&conn, 300).unwrap();
        assert_eq!(None, cache.worker_for("nonexistent"));
    }
}
