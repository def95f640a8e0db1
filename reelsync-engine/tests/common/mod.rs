//! In-memory mock provider and recording observer shared by the
//! integration suites.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use reelsync_core::{aliases, any_key_overlap, Feature, MediaItem, MediaKind, ProviderName};
use reelsync_engine::{
    Capabilities, EngineError, IndexSemantics, Observer, ProviderAdapter, SyncEvent, WriteOutcome,
};

pub fn movie(imdb: &str) -> MediaItem {
    MediaItem::new(MediaKind::Movie).with_id("imdb", imdb)
}

/// Mutable in-memory provider. Tests mutate its shelves directly to play
/// the user; the engine only sees the [`ProviderAdapter`] surface.
pub struct MockProvider {
    name: ProviderName,
    caps: Capabilities,
    shelves: Mutex<BTreeMap<Feature, Vec<MediaItem>>>,
    /// Returned verbatim by `build_index` when semantics are `Delta`.
    delta: Mutex<Vec<MediaItem>>,
    fail_next_index: AtomicBool,
    pub add_calls: AtomicUsize,
    pub remove_calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: ProviderName::new(name),
            caps: Capabilities::default(),
            shelves: Mutex::new(BTreeMap::new()),
            delta: Mutex::new(Vec::new()),
            fail_next_index: AtomicBool::new(false),
            add_calls: AtomicUsize::new(0),
            remove_calls: AtomicUsize::new(0),
        })
    }

    pub fn with_caps(name: &str, caps: Capabilities) -> Arc<Self> {
        let mut p = Arc::into_inner(Self::new(name)).unwrap();
        p.caps = caps;
        Arc::new(p)
    }

    /// Simulate the user adding an item out of band.
    pub fn seed(&self, feature: Feature, item: MediaItem) {
        self.shelves.lock().unwrap().entry(feature).or_default().push(item);
    }

    /// Simulate the user deleting an item out of band.
    pub fn unseed(&self, feature: Feature, ns: &str, id: &str) {
        let needle = MediaItem::new(MediaKind::Movie).with_id(ns, id);
        let needle_aliases = aliases(&needle);
        if let Some(shelf) = self.shelves.lock().unwrap().get_mut(&feature) {
            shelf.retain(|item| !any_key_overlap(&aliases(item), &needle_aliases));
        }
    }

    pub fn items(&self, feature: Feature) -> Vec<MediaItem> {
        self.shelves.lock().unwrap().get(&feature).cloned().unwrap_or_default()
    }

    pub fn has(&self, feature: Feature, ns: &str, id: &str) -> bool {
        let needle = MediaItem::new(MediaKind::Movie).with_id(ns, id);
        let needle_aliases = aliases(&needle);
        self.items(feature)
            .iter()
            .any(|item| any_key_overlap(&aliases(item), &needle_aliases))
    }

    pub fn set_delta(&self, items: Vec<MediaItem>) {
        *self.delta.lock().unwrap() = items;
    }

    pub fn fail_next_index(&self) {
        self.fail_next_index.store(true, Ordering::SeqCst);
    }
}

/// Registrable handle over a shared mock, so tests keep an `Arc` for
/// inspection while the registry owns its own adapter box.
pub struct Handle(pub Arc<MockProvider>);

impl ProviderAdapter for Handle {
    fn identity(&self) -> ProviderName {
        self.0.name.clone()
    }

    fn supports(&self, _feature: Feature) -> bool {
        true
    }

    fn capabilities(&self) -> Capabilities {
        self.0.caps
    }

    fn build_index(
        &self,
        feature: Feature,
        _checkpoint: Option<&str>,
    ) -> Result<Vec<MediaItem>, EngineError> {
        if self.0.fail_next_index.swap(false, Ordering::SeqCst) {
            return Err(EngineError::Provider {
                provider: self.0.name.clone(),
                message: "simulated outage".into(),
            });
        }
        match self.0.caps.index_semantics {
            IndexSemantics::Full => Ok(self.0.items(feature)),
            IndexSemantics::Delta => Ok(self.0.delta.lock().unwrap().clone()),
        }
    }

    fn add(
        &self,
        feature: Feature,
        items: &[MediaItem],
        dry_run: bool,
    ) -> Result<WriteOutcome, EngineError> {
        self.0.add_calls.fetch_add(1, Ordering::SeqCst);
        if !dry_run {
            let mut shelves = self.0.shelves.lock().unwrap();
            let shelf = shelves.entry(feature).or_default();
            for item in items {
                // Upsert: an alias-matching entry is replaced, not duplicated.
                let incoming = aliases(item);
                shelf.retain(|existing| !any_key_overlap(&aliases(existing), &incoming));
                shelf.push(item.clone());
            }
        }
        Ok(WriteOutcome::applied(items.len() as u64))
    }

    fn remove(
        &self,
        feature: Feature,
        items: &[MediaItem],
        dry_run: bool,
    ) -> Result<WriteOutcome, EngineError> {
        self.0.remove_calls.fetch_add(1, Ordering::SeqCst);
        if !dry_run {
            let mut shelves = self.0.shelves.lock().unwrap();
            let shelf = shelves.entry(feature).or_default();
            for item in items {
                let doomed = aliases(item);
                shelf.retain(|existing| !any_key_overlap(&aliases(existing), &doomed));
            }
        }
        Ok(WriteOutcome::applied(items.len() as u64))
    }
}

/// Route `log` output through the test harness when `RUST_LOG` is set.
pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Collects every event for later assertions.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn any<F>(&self, pred: F) -> bool
    where
        F: Fn(&SyncEvent) -> bool,
    {
        self.events.lock().unwrap().iter().any(pred)
    }
}

impl Observer for RecordingObserver {
    fn event(&self, event: &SyncEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
