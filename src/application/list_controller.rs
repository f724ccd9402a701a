//! Owns the query of one list view (pagination, sorting, filters and
//! search), drives the page fetcher and mirrors the query into a
//! [`QueryStore`].
//!
//! Mutations apply to local state immediately and schedule a fetch that
//! fires after [`DEBOUNCE`] of quiet. Each issued fetch takes the next
//! generation number and its own [`CancellationToken`]; a result is applied
//! only while its generation is still the latest one issued ("last issued
//! wins"). Any mutation, a forced refetch, or teardown supersedes the fetch
//! in flight.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::GatewayError;
use crate::domain::list_query::{
    is_reserved, FetchParams, ListDefaults, ListQueryState, Page, SortType, SEARCH_KEY,
};
use crate::domain::ports::{PageFetcher, QueryStore};

pub const DEBOUNCE: Duration = Duration::from_millis(300);

/// Shown for any list failure other than cancellation.
pub const LOAD_ERROR_MESSAGE: &str = "There was a problem loading the data.";

/// Query state plus the rows of the last successful fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct ListView<T> {
    pub state: ListQueryState,
    pub data: Vec<T>,
}

struct Issued {
    generation: u64,
    in_flight: Option<CancellationToken>,
    closed: bool,
}

struct Shared<F: PageFetcher, S> {
    fetcher: F,
    store: S,
    view: Mutex<ListView<F::Item>>,
    // Lock order: `issued` before `view`.
    issued: Mutex<Issued>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<F: PageFetcher, S: QueryStore> Shared<F, S> {
    /// Invalidate whatever is in flight.
    fn supersede(&self) {
        let mut issued = lock(&self.issued);
        issued.generation += 1;
        if let Some(token) = issued.in_flight.take() {
            token.cancel();
        }
    }

    fn close(&self) {
        let mut issued = lock(&self.issued);
        issued.closed = true;
        issued.generation += 1;
        if let Some(token) = issued.in_flight.take() {
            token.cancel();
        }
    }

    fn begin(&self) -> Option<(u64, CancellationToken, FetchParams)> {
        let mut issued = lock(&self.issued);
        if issued.closed {
            return None;
        }
        issued.generation += 1;
        if let Some(previous) = issued.in_flight.take() {
            previous.cancel();
        }
        let token = CancellationToken::new();
        issued.in_flight = Some(token.clone());

        let mut view = lock(&self.view);
        view.state.loading = true;
        Some((issued.generation, token, view.state.params()))
    }

    fn settle(
        &self,
        generation: u64,
        params: &FetchParams,
        result: Result<Page<F::Item>, GatewayError>,
    ) {
        let mut issued = lock(&self.issued);
        if issued.closed || issued.generation != generation {
            debug!("discarding superseded list fetch (generation {})", generation);
            return;
        }
        issued.in_flight = None;

        let mut view = lock(&self.view);
        view.state.loading = false;
        match result {
            Ok(page) => {
                debug!(
                    "list fetch {} applied: {} rows of {}",
                    generation,
                    page.data.len(),
                    page.total
                );
                view.data = page.data;
                view.state.pagination.total = page.total;
                view.state.error = None;
                drop(view);
                self.persist(params);
            }
            Err(GatewayError::Cancelled) => {
                debug!("list fetch {} cancelled by the fetcher", generation);
            }
            Err(err) => {
                warn!("list fetch {} failed: {}", generation, err);
                view.state.error = Some(LOAD_ERROR_MESSAGE.to_string());
            }
        }
    }

    fn persist(&self, params: &FetchParams) {
        let query = params.to_query();
        if self.store.read() != query {
            self.store.write(&query);
        }
    }
}

async fn run_fetch<F: PageFetcher, S: QueryStore>(shared: Arc<Shared<F, S>>) {
    let Some((generation, token, params)) = shared.begin() else {
        return;
    };
    debug!(
        "list fetch {} issued: page {} x {}, sort {} {}",
        generation, params.page, params.per_page, params.sort_by, params.sort_type
    );

    let result = tokio::select! {
        biased;
        _ = token.cancelled() => Err(GatewayError::Cancelled),
        result = shared.fetcher.fetch_page(&params, token.clone()) => result,
    };
    shared.settle(generation, &params, result);
}

pub struct ListQueryController<F: PageFetcher, S: QueryStore> {
    shared: Arc<Shared<F, S>>,
    timer: Option<JoinHandle<()>>,
    debounce: Duration,
}

impl<F: PageFetcher, S: QueryStore> ListQueryController<F, S> {
    /// Read the persisted query once and schedule the first fetch. Must be
    /// called from within a Tokio runtime.
    pub fn mount(fetcher: F, store: S, defaults: &ListDefaults) -> Self {
        Self::mount_with_debounce(fetcher, store, defaults, DEBOUNCE)
    }

    pub fn mount_with_debounce(
        fetcher: F,
        store: S,
        defaults: &ListDefaults,
        debounce: Duration,
    ) -> Self {
        let state = ListQueryState::initialize(&store.read(), defaults);
        let shared = Arc::new(Shared {
            fetcher,
            store,
            view: Mutex::new(ListView {
                state,
                data: Vec::new(),
            }),
            issued: Mutex::new(Issued {
                generation: 0,
                in_flight: None,
                closed: false,
            }),
        });

        let mut controller = Self {
            shared,
            timer: None,
            debounce,
        };
        controller.schedule_fetch();
        controller
    }

    pub fn snapshot(&self) -> ListView<F::Item> {
        lock(&self.shared.view).clone()
    }

    pub fn state(&self) -> ListQueryState {
        lock(&self.shared.view).state.clone()
    }

    pub fn set_page(&mut self, page: u32) {
        self.mutate(|state| state.pagination.page = page.max(1));
    }

    /// Changing the page size returns to the first page.
    pub fn set_per_page(&mut self, per_page: u32) {
        self.mutate(|state| {
            state.pagination.per_page = per_page.max(1);
            state.pagination.page = 1;
        });
    }

    pub fn set_sort(&mut self, by: impl Into<String>, direction: SortType) {
        let by = by.into();
        self.mutate(|state| {
            state.sorting.by = by;
            state.sorting.direction = direction;
        });
    }

    /// Reserved keys (`page`, `perPage`, `sortBy`, `sortType`) are not
    /// filters and are ignored here.
    pub fn set_filter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if is_reserved(&key) {
            warn!("ignoring filter with reserved key '{}'", key);
            return;
        }
        let value = value.into();
        self.mutate(|state| {
            state.filters.insert(key, value);
        });
    }

    pub fn remove_filter(&mut self, key: &str) {
        self.mutate(|state| {
            state.filters.remove(key);
        });
    }

    /// Free-text search lives in the `search` filter and returns to the
    /// first page.
    pub fn set_search(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.mutate(|state| {
            state.filters.insert(SEARCH_KEY.to_string(), text);
            state.pagination.page = 1;
        });
    }

    /// Restart the debounce window. Whatever is in flight is superseded now.
    pub fn schedule_fetch(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.shared.supersede();

        let shared = Arc::clone(&self.shared);
        let debounce = self.debounce;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            run_fetch(shared).await;
        }));
    }

    /// Fetch immediately with the current state, dropping any pending
    /// debounced fetch.
    pub async fn refetch(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        run_fetch(Arc::clone(&self.shared)).await;
    }

    /// Stop the pending timer and cancel the fetch in flight. No result can
    /// change the view afterwards.
    pub fn teardown(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.shared.close();
    }

    fn mutate(&mut self, apply: impl FnOnce(&mut ListQueryState)) {
        {
            let mut view = lock(&self.shared.view);
            apply(&mut view.state);
        }
        self.schedule_fetch();
    }
}

impl<F: PageFetcher, S: QueryStore> Drop for ListQueryController<F, S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::infrastructure::query_store::MemoryQueryStore;

    #[derive(Default)]
    struct Script {
        calls: Mutex<Vec<(FetchParams, CancellationToken)>>,
        slow_pages: Mutex<BTreeMap<u32, Duration>>,
        fail: AtomicBool,
    }

    /// Answers `"<page>:<search>"` rows after a per-page delay. It never
    /// looks at its cancellation token.
    #[derive(Clone, Default)]
    struct FakeFetcher(Arc<Script>);

    impl FakeFetcher {
        fn calls(&self) -> Vec<FetchParams> {
            lock(&self.0.calls).iter().map(|(p, _)| p.clone()).collect()
        }

        fn tokens(&self) -> Vec<CancellationToken> {
            lock(&self.0.calls).iter().map(|(_, t)| t.clone()).collect()
        }

        fn slow_page(&self, page: u32, delay: Duration) {
            lock(&self.0.slow_pages).insert(page, delay);
        }

        fn fail(&self, fail: bool) {
            self.0.fail.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        type Item = String;

        async fn fetch_page(
            &self,
            params: &FetchParams,
            cancel: CancellationToken,
        ) -> Result<Page<String>, GatewayError> {
            lock(&self.0.calls).push((params.clone(), cancel));
            let delay = lock(&self.0.slow_pages)
                .get(&params.page)
                .copied()
                .unwrap_or(Duration::from_millis(10));
            tokio::time::sleep(delay).await;

            if self.0.fail.load(Ordering::SeqCst) {
                return Err(GatewayError::Failed("boom".to_string()));
            }
            let search = params.filters.get("search").cloned().unwrap_or_default();
            Ok(Page {
                data: vec![format!("{}:{}", params.page, search)],
                total: 42,
            })
        }
    }

    fn query(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_secs(2)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn mount_reads_persisted_query_and_fetches_after_debounce() {
        let fetcher = FakeFetcher::default();
        let store = MemoryQueryStore::from_query(query(&[
            ("page", "3"),
            ("perPage", "25"),
            ("sortBy", "date"),
            ("sortType", "desc"),
            ("status", "pending"),
        ]));
        let controller =
            ListQueryController::mount(fetcher.clone(), store.clone(), &ListDefaults::default());

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(fetcher.calls().is_empty());

        settle().await;
        let calls = fetcher.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].page, 3);
        assert_eq!(calls[0].per_page, 25);
        assert_eq!(calls[0].sort_type, SortType::Desc);
        assert_eq!(calls[0].filters, query(&[("status", "pending")]));

        let view = controller.snapshot();
        assert_eq!(view.data, vec!["3:".to_string()]);
        assert_eq!(view.state.pagination.total, 42);
        assert!(!view.state.loading);
        assert!(view.state.error.is_none());
        assert_eq!(store.writes(), 0, "persisted query already matched");
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_searches_coalesce_into_one_fetch() {
        let fetcher = FakeFetcher::default();
        let mut controller = ListQueryController::mount(
            fetcher.clone(),
            MemoryQueryStore::new(),
            &ListDefaults::default(),
        );
        controller.set_page(4);

        for text in ["l", "la", "lap", "lapt", "laptop"] {
            controller.set_search(text);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        settle().await;

        let calls = fetcher.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].filters.get("search").map(String::as_str), Some("laptop"));
        assert_eq!(calls[0].page, 1);
        assert_eq!(controller.snapshot().data, vec!["1:laptop".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_response_never_overwrites_newer_state() {
        let fetcher = FakeFetcher::default();
        fetcher.slow_page(1, Duration::from_millis(1000));
        fetcher.slow_page(2, Duration::from_millis(100));
        let mut controller = ListQueryController::mount(
            fetcher.clone(),
            MemoryQueryStore::new(),
            &ListDefaults::default(),
        );

        // Fetch A (page 1) is in flight when B (page 2) is requested.
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(fetcher.calls().len(), 1);
        assert!(controller.snapshot().state.loading);
        controller.set_page(2);

        settle().await;
        assert_eq!(fetcher.calls().len(), 2);
        let view = controller.snapshot();
        assert_eq!(view.data, vec!["2:".to_string()]);
        assert_eq!(view.state.pagination.page, 2);
        assert!(!view.state.loading);

        let tokens = fetcher.tokens();
        assert!(tokens[0].is_cancelled());
        assert!(!tokens[1].is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_keeps_previous_data_and_reports_generic_error() {
        let fetcher = FakeFetcher::default();
        let mut controller = ListQueryController::mount(
            fetcher.clone(),
            MemoryQueryStore::new(),
            &ListDefaults::default(),
        );
        settle().await;
        assert_eq!(controller.snapshot().data, vec!["1:".to_string()]);

        fetcher.fail(true);
        controller.set_page(2);
        settle().await;

        let view = controller.snapshot();
        assert_eq!(view.data, vec!["1:".to_string()]);
        assert_eq!(view.state.error.as_deref(), Some(LOAD_ERROR_MESSAGE));
        assert!(!view.state.loading);

        fetcher.fail(false);
        controller.refetch().await;
        let view = controller.snapshot();
        assert_eq!(view.data, vec!["2:".to_string()]);
        assert!(view.state.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn success_writes_persisted_query_only_when_it_changes() {
        let fetcher = FakeFetcher::default();
        let store = MemoryQueryStore::new();
        let mut controller =
            ListQueryController::mount(fetcher.clone(), store.clone(), &ListDefaults::default());
        settle().await;
        assert_eq!(store.writes(), 1);

        controller.set_filter("status", "pending");
        controller.set_search("");
        settle().await;
        assert_eq!(store.writes(), 2);
        assert_eq!(
            store.read(),
            query(&[
                ("page", "1"),
                ("perPage", "10"),
                ("sortBy", "name"),
                ("sortType", "asc"),
                ("status", "pending"),
            ])
        );

        controller.refetch().await;
        assert_eq!(store.writes(), 2);

        controller.remove_filter("status");
        controller.set_sort("date", SortType::Desc);
        settle().await;
        assert_eq!(store.writes(), 3);
        assert_eq!(store.read().get("sortBy").map(String::as_str), Some("date"));
        assert!(!store.read().contains_key("status"));
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_discards_the_fetch_in_flight() {
        let fetcher = FakeFetcher::default();
        fetcher.slow_page(1, Duration::from_millis(500));
        let store = MemoryQueryStore::new();
        let mut controller =
            ListQueryController::mount(fetcher.clone(), store.clone(), &ListDefaults::default());

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(fetcher.calls().len(), 1);
        let before = controller.snapshot();

        controller.teardown();
        settle().await;

        assert_eq!(controller.snapshot(), before);
        assert!(fetcher.tokens()[0].is_cancelled());
        assert_eq!(store.writes(), 0);

        controller.refetch().await;
        assert_eq!(fetcher.calls().len(), 1, "a torn down view never fetches");
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_controller_cancels_the_pending_timer() {
        let fetcher = FakeFetcher::default();
        let controller = ListQueryController::mount(
            fetcher.clone(),
            MemoryQueryStore::new(),
            &ListDefaults::default(),
        );
        drop(controller);
        settle().await;
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn refetch_bypasses_the_debounce() {
        let fetcher = FakeFetcher::default();
        let mut controller = ListQueryController::mount(
            fetcher.clone(),
            MemoryQueryStore::new(),
            &ListDefaults::default(),
        );

        controller.refetch().await;
        assert_eq!(fetcher.calls().len(), 1);
        assert_eq!(controller.snapshot().data, vec!["1:".to_string()]);

        settle().await;
        assert_eq!(fetcher.calls().len(), 1, "pending debounced fetch was dropped");
    }

    #[tokio::test(start_paused = true)]
    async fn mutations_apply_to_local_state_immediately() {
        let fetcher = FakeFetcher::default();
        let mut controller = ListQueryController::mount(
            fetcher.clone(),
            MemoryQueryStore::new(),
            &ListDefaults::default(),
        );

        controller.set_page(4);
        controller.set_per_page(50);
        let state = controller.state();
        assert_eq!(state.pagination.page, 1);
        assert_eq!(state.pagination.per_page, 50);

        controller.set_page(0);
        assert_eq!(controller.state().pagination.page, 1);

        controller.set_filter("page", "9");
        assert!(controller.state().filters.is_empty());
        assert!(fetcher.calls().is_empty());
    }
}
