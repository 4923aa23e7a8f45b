//! The subscription lifecycle controller.
//!
//! One `Binder` per bound consumer. It resolves the consumer's query map,
//! opens the right kind of listener or fetch for every entry, keeps the
//! result cache synchronized, and guarantees every opened subscription is
//! disposed exactly once.
//!
//! # Concurrency model
//!
//! All remote operations are non-blocking and complete via callbacks or
//! futures interleaved on the caller's task. Every attach/refresh bumps a
//! generation counter; each bound slot is stamped with the generation that
//! bound it, and every write re-checks that stamp, so a slower resolution
//! completing after a newer one can never overwrite newer state. Cache
//! mutation is copy-on-write and happens only under the state lock; consumer
//! callbacks always fire after the lock is released.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::descriptor::{Descriptor, MapEntry, QueryMap};
use crate::detect::{diff_entry, SlotPlan};
use crate::error::{
    default_error_handler, report, BindError, ErrorContext, ErrorHandler,
};
use crate::normalize::{normalize_doc, normalize_query};
use crate::output::UpdateEmitter;
use crate::registry::{SlotKey, SubscriptionRegistry};
use crate::resolve::{resolve_entry, ResolvedEntry};
use crate::store::{
    DocCallback, ListenErrorCallback, QueryCallback, RemoteStore, Unsubscribe,
};

// ============================================================================
// Public configuration
// ============================================================================

/// Whether bound entries install persistent listeners or perform single
/// fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindMode {
    #[default]
    Live,
    Once,
}

/// The consumer's props, merged under the result cache on delivery.
pub type Props = Map<String, Value>;

/// Consumer-supplied descriptor function. Must be pure with respect to its
/// arguments so change detection over successive query maps is meaningful.
pub type QueryMapFn = dyn Fn(&dyn RemoteStore, &Props, Option<&str>) -> QueryMap + Send + Sync;

/// Configuration for [`Binder`].
#[derive(Default)]
pub struct BinderOptions {
    pub mode: BindMode,
    /// Error sink; defaults to structured logging.
    pub on_error: Option<Arc<ErrorHandler>>,
}

// ============================================================================
// Internal state
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unattached,
    Attached,
    Detached,
}

struct BinderState {
    phase: Phase,
    /// Bumped on every attach/refresh; guards against stale resolutions.
    generation: u64,
    /// The generation that last bound each slot. Writes for a slot are only
    /// applied while the writer's generation matches this stamp.
    slot_gen: HashMap<SlotKey, u64>,
    props: Props,
    results: HashMap<String, Value>,
    /// Last fully committed resolved entry per property; the change detector
    /// diffs against it.
    committed: HashMap<String, ResolvedEntry>,
    registry: SubscriptionRegistry,
}

impl BinderState {
    fn new() -> Self {
        Self {
            phase: Phase::Unattached,
            generation: 0,
            slot_gen: HashMap::new(),
            props: Props::new(),
            results: HashMap::new(),
            committed: HashMap::new(),
            registry: SubscriptionRegistry::new(),
        }
    }

    /// Copy-on-write write of one slot's value into the result cache.
    fn write(&mut self, slot: &SlotKey, value: Value) {
        match slot.index {
            None => {
                self.results.insert(slot.property.clone(), value);
            }
            Some(index) => {
                let mut array = match self.results.get(&slot.property) {
                    Some(Value::Array(existing)) => existing.clone(),
                    _ => Vec::new(),
                };
                if array.len() <= index {
                    array.resize(index + 1, Value::Null);
                }
                array[index] = value;
                self.results
                    .insert(slot.property.clone(), Value::Array(array));
            }
        }
    }

    /// The merged `props ∪ results` delivered to consumers. Results shadow
    /// props of the same name.
    fn merged(&self) -> Map<String, Value> {
        let mut merged = self.props.clone();
        for (property, value) in &self.results {
            merged.insert(property.clone(), value.clone());
        }
        merged
    }

    fn clear_property_gens(&mut self, property: &str) {
        self.slot_gen.retain(|slot, _| slot.property != property);
    }
}

/// Apply one slot write under the generation guard, then deliver the merged
/// update. Shared by listener callbacks and one-shot fetch completions.
fn commit_write(
    state: &Mutex<BinderState>,
    output: &UpdateEmitter,
    slot: &SlotKey,
    value: Value,
    generation: u64,
) {
    let merged = {
        let mut st = state.lock();
        if st.phase != Phase::Attached {
            // Notification raced with detach; dropped, not applied.
            return;
        }
        if st.slot_gen.get(slot) != Some(&generation) {
            // Slot superseded by a newer bind.
            return;
        }
        st.write(slot, value);
        st.merged()
    };
    output.emit(&merged);
}

fn listen_error_callback(
    handler: Arc<ErrorHandler>,
    property: String,
    path: String,
) -> ListenErrorCallback {
    Arc::new(move |store_error| {
        let error = BindError::Store(store_error);
        let context = ErrorContext::for_property(property.clone()).with_path(path.clone());
        report(&*handler, &error, Some(&context));
    })
}

// ============================================================================
// Binder
// ============================================================================

/// Lifecycle controller for one bound consumer.
///
/// States: `Unattached → Attached → Detached` (terminal). Dropping an
/// attached binder detaches it, so listeners never outlive their consumer.
pub struct Binder {
    store: Arc<dyn RemoteStore>,
    query_map_fn: Arc<QueryMapFn>,
    mode: BindMode,
    on_error: Arc<ErrorHandler>,
    state: Arc<Mutex<BinderState>>,
    output: Arc<UpdateEmitter>,
}

impl Binder {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        query_map_fn: impl Fn(&dyn RemoteStore, &Props, Option<&str>) -> QueryMap
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self::with_options(store, query_map_fn, BinderOptions::default())
    }

    pub fn with_options(
        store: Arc<dyn RemoteStore>,
        query_map_fn: impl Fn(&dyn RemoteStore, &Props, Option<&str>) -> QueryMap
            + Send
            + Sync
            + 'static,
        options: BinderOptions,
    ) -> Self {
        Self {
            store,
            query_map_fn: Arc::new(query_map_fn),
            mode: options.mode,
            on_error: options.on_error.unwrap_or_else(default_error_handler),
            state: Arc::new(Mutex::new(BinderState::new())),
            output: Arc::new(UpdateEmitter::new()),
        }
    }

    pub fn mode(&self) -> BindMode {
        self.mode
    }

    /// A clone of the current result cache.
    pub fn results(&self) -> HashMap<String, Value> {
        self.state.lock().results.clone()
    }

    /// The merged `props ∪ results` map, on demand.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.state.lock().merged()
    }

    /// Subscribe to merged updates; fired after every committed cache
    /// mutation.
    pub fn on_update(
        &self,
        callback: impl Fn(&Map<String, Value>) + Send + Sync + 'static,
    ) -> Unsubscribe {
        self.output.subscribe(callback)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Initial mount: resolve the query map and bind every entry.
    pub async fn attach(&self, props: Props) {
        let generation = {
            let mut st = self.state.lock();
            match st.phase {
                Phase::Unattached => {}
                Phase::Attached => {
                    drop(st);
                    report(&*self.on_error, &BindError::AlreadyAttached, None);
                    return;
                }
                Phase::Detached => {
                    drop(st);
                    report(&*self.on_error, &BindError::Detached, None);
                    return;
                }
            }
            st.phase = Phase::Attached;
            st.props = props;
            st.generation += 1;
            st.generation
        };
        tracing::debug!(generation, "binder attach");
        self.run_cycle(generation).await;
    }

    /// Dependency/prop change while attached: diff against the committed
    /// descriptors, resubscribe only what changed.
    pub async fn notify_props_changed(&self, next_props: Props) {
        let generation = {
            let mut st = self.state.lock();
            if st.phase != Phase::Attached {
                drop(st);
                report(&*self.on_error, &BindError::Detached, None);
                return;
            }
            st.props = next_props;
            st.generation += 1;
            st.generation
        };
        tracing::debug!(generation, "binder refresh");
        self.run_cycle(generation).await;
    }

    /// Unmount: dispose every registry entry and stop applying notifications.
    /// Idempotent; the `Detached` state is terminal.
    pub fn detach(&self) {
        let disposers = {
            let mut st = self.state.lock();
            if st.phase == Phase::Detached {
                return;
            }
            st.phase = Phase::Detached;
            st.slot_gen.clear();
            st.registry.drain_all()
        };
        tracing::debug!(disposed = disposers.len(), "binder detach");
        for dispose in disposers {
            dispose();
        }
    }

    // -----------------------------------------------------------------------
    // Binding
    // -----------------------------------------------------------------------

    async fn run_cycle(&self, generation: u64) {
        let identity = match self.store.current_identity().await {
            Ok(identity) => identity,
            Err(error) => {
                // Binding proceeds anonymously so sibling data still loads.
                report(
                    &*self.on_error,
                    &BindError::Identity(error.to_string()),
                    None,
                );
                None
            }
        };

        let props = {
            let st = self.state.lock();
            if st.generation != generation || st.phase != Phase::Attached {
                return;
            }
            st.props.clone()
        };

        let query_map = (self.query_map_fn)(&*self.store, &props, identity.as_deref());
        let properties = query_map
            .into_iter()
            .map(|(property, entry)| self.bind_property(property, entry, generation));
        // Properties resolve and bind independently; none waits on a sibling.
        join_all(properties).await;
    }

    async fn bind_property(&self, property: String, entry: MapEntry, generation: u64) {
        let resolved = resolve_entry(&property, entry, &*self.on_error).await;

        let (disposers, tasks, merged) = {
            let mut st = self.state.lock();
            if st.generation != generation || st.phase != Phase::Attached {
                // A newer cycle superseded this resolution mid-flight.
                return;
            }

            let plan = diff_entry(st.committed.get(&property), &resolved);
            let mut disposers: Vec<Unsubscribe> = Vec::new();
            let mut tasks: Vec<(SlotKey, Descriptor)> = Vec::new();
            let mut mutated = false;
            let mut commit = None;

            match plan {
                SlotPlan::Unchanged => return,
                SlotPlan::Replace => {
                    disposers = st.registry.drain_property(&property);
                    st.clear_property_gens(&property);
                    match &resolved {
                        ResolvedEntry::Single(descriptor) => {
                            if let Some(descriptor) = descriptor {
                                let slot = SlotKey::scalar(property.clone());
                                st.slot_gen.insert(slot.clone(), generation);
                                tasks.push((slot, descriptor.clone()));
                            }
                        }
                        ResolvedEntry::List(elements) => {
                            // Cleared dense up front so stale trailing entries
                            // are never visible between teardown and
                            // re-population.
                            st.results.insert(
                                property.clone(),
                                Value::Array(vec![Value::Null; elements.len()]),
                            );
                            mutated = true;
                            for (index, descriptor) in elements.iter().enumerate() {
                                if let Some(descriptor) = descriptor {
                                    let slot = SlotKey::indexed(property.clone(), index);
                                    st.slot_gen.insert(slot.clone(), generation);
                                    tasks.push((slot, descriptor.clone()));
                                }
                            }
                        }
                    }
                }
                SlotPlan::Positions {
                    dispose,
                    bind,
                    rebuild,
                } => {
                    let ResolvedEntry::List(elements) = &resolved else {
                        return;
                    };
                    // A failed element whose live slot was kept commits under
                    // its previous descriptor, so the next diff still sees a
                    // known identifier instead of rebinding a healthy slot.
                    let mut merged_elements = elements.clone();
                    if let Some(ResolvedEntry::List(previous)) = st.committed.get(&property) {
                        for (index, element) in merged_elements.iter_mut().enumerate() {
                            if element.is_none() && !dispose.contains(&index) {
                                if let Some(Some(prev_descriptor)) = previous.get(index) {
                                    *element = Some(prev_descriptor.clone());
                                }
                            }
                        }
                    }
                    commit = Some(ResolvedEntry::List(merged_elements));
                    for index in &dispose {
                        let slot = SlotKey::indexed(property.clone(), *index);
                        if let Some(handle) = st.registry.remove(&slot) {
                            disposers.push(handle);
                        }
                        st.slot_gen.remove(&slot);
                    }
                    if let Some(new_len) = rebuild {
                        let old = match st.results.get(&property) {
                            Some(Value::Array(existing)) => existing.clone(),
                            _ => Vec::new(),
                        };
                        let mut rebuilt = vec![Value::Null; new_len];
                        for (index, entry) in rebuilt.iter_mut().enumerate() {
                            if !bind.contains(&index) {
                                if let Some(value) = old.get(index) {
                                    *entry = value.clone();
                                }
                            }
                        }
                        st.results.insert(property.clone(), Value::Array(rebuilt));
                        mutated = true;
                    }
                    for index in bind {
                        if let Some(Some(descriptor)) = elements.get(index) {
                            let slot = SlotKey::indexed(property.clone(), index);
                            st.slot_gen.insert(slot.clone(), generation);
                            tasks.push((slot, descriptor.clone()));
                        }
                    }
                }
            }

            st.committed.insert(property.clone(), commit.unwrap_or(resolved));
            let merged = if mutated { Some(st.merged()) } else { None };
            (disposers, tasks, merged)
        };

        for dispose in disposers {
            dispose();
        }
        if let Some(merged) = merged {
            self.output.emit(&merged);
        }

        let binds = tasks
            .into_iter()
            .map(|(slot, descriptor)| self.bind_slot(slot, descriptor, generation));
        join_all(binds).await;
    }

    async fn bind_slot(&self, slot: SlotKey, descriptor: Descriptor, generation: u64) {
        match descriptor {
            Descriptor::Raw(value) => {
                commit_write(&self.state, &self.output, &slot, value, generation);
            }
            Descriptor::Doc(doc) => match self.mode {
                BindMode::Once => match self.store.fetch_doc(&doc).await {
                    Ok(snapshot) => {
                        commit_write(
                            &self.state,
                            &self.output,
                            &slot,
                            normalize_doc(&snapshot),
                            generation,
                        );
                    }
                    Err(error) => {
                        let context =
                            ErrorContext::for_property(slot.property.clone()).with_path(doc.path());
                        report(&*self.on_error, &BindError::Store(error), Some(&context));
                    }
                },
                BindMode::Live => {
                    let state = Arc::clone(&self.state);
                    let output = Arc::clone(&self.output);
                    let callback_slot = slot.clone();
                    let on_snapshot: DocCallback = Arc::new(move |snapshot| {
                        commit_write(
                            &state,
                            &output,
                            &callback_slot,
                            normalize_doc(&snapshot),
                            generation,
                        );
                    });
                    let on_error = listen_error_callback(
                        Arc::clone(&self.on_error),
                        slot.property.clone(),
                        doc.path(),
                    );
                    let handle = self.store.listen_doc(&doc, on_snapshot, on_error);
                    self.install_handle(slot, handle, generation);
                }
            },
            Descriptor::Query(query) => match self.mode {
                BindMode::Once => match self.store.fetch_query(&query).await {
                    Ok(snapshot) => {
                        commit_write(
                            &self.state,
                            &self.output,
                            &slot,
                            normalize_query(&snapshot),
                            generation,
                        );
                    }
                    Err(error) => {
                        let context = ErrorContext::for_property(slot.property.clone())
                            .with_path(query.collection.clone());
                        report(&*self.on_error, &BindError::Store(error), Some(&context));
                    }
                },
                BindMode::Live => {
                    let state = Arc::clone(&self.state);
                    let output = Arc::clone(&self.output);
                    let callback_slot = slot.clone();
                    let on_snapshot: QueryCallback = Arc::new(move |snapshot| {
                        commit_write(
                            &state,
                            &output,
                            &callback_slot,
                            normalize_query(&snapshot),
                            generation,
                        );
                    });
                    let on_error = listen_error_callback(
                        Arc::clone(&self.on_error),
                        slot.property.clone(),
                        query.collection.clone(),
                    );
                    let handle = self.store.listen_query(&query, on_snapshot, on_error);
                    self.install_handle(slot, handle, generation);
                }
            },
        }
    }

    /// Register a freshly installed handle. If the slot was superseded or the
    /// binder detached while the listener was being installed, the handle is
    /// disposed immediately instead.
    fn install_handle(&self, slot: SlotKey, handle: Unsubscribe, generation: u64) {
        let stale = {
            let mut st = self.state.lock();
            if st.phase != Phase::Attached || st.slot_gen.get(&slot) != Some(&generation) {
                Some(handle)
            } else {
                st.registry.install(slot, handle)
            }
        };
        if let Some(dispose) = stale {
            dispose();
        }
    }
}

impl Drop for Binder {
    fn drop(&mut self) {
        self.detach();
    }
}

// ============================================================================
// Tests
// ============================================================================
