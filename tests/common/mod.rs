//! Shared fixture: a loader whose instances record their own lifecycle.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tts_slot::{BoxError, ManagerConfig, NoDevice, Resource, ResourceLoader, ResourceManager, TeardownError};

#[derive(Default)]
pub struct Journal {
    events: Mutex<Vec<String>>,
    loads: AtomicUsize,
    teardowns: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
}

impl Journal {
    pub fn record(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn teardowns(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

pub struct Model {
    pub key: String,
    journal: Arc<Journal>,
}

impl Resource for Model {
    fn teardown(&mut self) -> Result<(), TeardownError> {
        self.journal.teardowns.fetch_add(1, Ordering::SeqCst);
        self.journal.live.fetch_sub(1, Ordering::SeqCst);
        self.journal.record(format!("teardown:{}", self.key));
        Ok(())
    }
}

/// Keys starting with `bad` fail to load.
pub struct JournalLoader {
    pub journal: Arc<Journal>,
    pub delay: Duration,
}

impl ResourceLoader for JournalLoader {
    type Resource = Model;

    fn load(&self, key: &str) -> Result<Model, BoxError> {
        self.journal.record(format!("load-start:{key}"));
        std::thread::sleep(self.delay);
        if key.starts_with("bad") {
            self.journal.record(format!("load-failed:{key}"));
            return Err(format!("no model files under {key}").into());
        }

        self.journal.loads.fetch_add(1, Ordering::SeqCst);
        let live = self.journal.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.journal.max_live.fetch_max(live, Ordering::SeqCst);
        self.journal.record(format!("load:{key}"));
        Ok(Model {
            key: key.to_string(),
            journal: Arc::clone(&self.journal),
        })
    }
}

pub fn manager_with_delay(delay: Duration) -> (ResourceManager<JournalLoader>, Arc<Journal>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let journal = Arc::new(Journal::default());
    let loader = JournalLoader {
        journal: Arc::clone(&journal),
        delay,
    };
    let config = ManagerConfig {
        default_key: "default".to_string(),
        ..Default::default()
    };
    (ResourceManager::with_probe(loader, config, NoDevice), journal)
}

pub fn manager() -> (ResourceManager<JournalLoader>, Arc<Journal>) {
    manager_with_delay(Duration::ZERO)
}
