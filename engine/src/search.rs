//! Country-scoped place search feeding route endpoints.

use std::time::Duration;

use shared::{RoutePoint, SearchResult};

use crate::error::{EngineError, ServiceError};
use crate::routing::{Applied, RequestId};
use crate::services::{with_deadline, GeocodingService};

pub const MIN_QUERY_CHARS: usize = 3;
pub const RESULT_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub id: RequestId,
    pub text: String,
    pub country_code: String,
}

#[derive(Debug)]
pub struct PlaceSearch {
    country_code: String,
    results: Vec<SearchResult>,
    pending: Option<RequestId>,
    next_id: RequestId,
    last_error: Option<ServiceError>,
}

impl PlaceSearch {
    pub fn new(country_code: impl Into<String>) -> Self {
        Self {
            country_code: country_code.into(),
            results: Vec::new(),
            pending: None,
            next_id: 0,
            last_error: None,
        }
    }

    pub fn results(&self) -> &[SearchResult] {
        &self.results
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn last_error(&self) -> Option<&ServiceError> {
        self.last_error.as_ref()
    }

    /// Start a search. Text shorter than three characters clears the results
    /// and cancels whatever is in flight.
    pub fn begin_search(&mut self, text: &str) -> Option<SearchQuery> {
        let text = text.trim();
        self.last_error = None;
        if text.chars().count() < MIN_QUERY_CHARS {
            self.results.clear();
            self.pending = None;
            return None;
        }
        self.next_id += 1;
        self.pending = Some(self.next_id);
        tracing::debug!("search: query #{} {text:?}", self.next_id);
        Some(SearchQuery {
            id: self.next_id,
            text: text.to_string(),
            country_code: self.country_code.clone(),
        })
    }

    /// # Errors
    /// Returns the failure of the latest query; earlier results are kept.
    pub fn apply_search(
        &mut self,
        id: RequestId,
        result: Result<Vec<SearchResult>, ServiceError>,
    ) -> Result<Applied, EngineError> {
        if self.pending != Some(id) {
            tracing::debug!("search: discarding stale results #{id}");
            return Ok(Applied::Stale);
        }
        self.pending = None;
        match result {
            Ok(mut results) => {
                results.truncate(RESULT_LIMIT);
                self.results = results;
                Ok(Applied::Accepted)
            }
            Err(err) => {
                tracing::warn!("search: query #{id} failed: {err}");
                self.last_error = Some(err.clone());
                Err(err.into())
            }
        }
    }

    /// The chosen result as a labelled route endpoint.
    pub fn choose(&self, index: usize) -> Option<RoutePoint> {
        self.results.get(index).map(SearchResult::to_route_point)
    }

    pub fn clear(&mut self) {
        self.results.clear();
        self.pending = None;
        self.last_error = None;
    }
}

pub async fn run_search(
    service: &dyn GeocodingService,
    query: &SearchQuery,
    timeout: Duration,
) -> Result<Vec<SearchResult>, ServiceError> {
    with_deadline(
        timeout,
        service.search(&query.text, &query.country_code, RESULT_LIMIT),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{search_hit, StubGeocoder};

    #[test]
    fn test_short_queries_are_not_sent() {
        let mut search = PlaceSearch::new("pk");
        assert!(search.begin_search("  la ").is_none());
        assert!(!search.is_loading());
        let query = search.begin_search("Lahore").unwrap();
        assert_eq!(query.country_code, "pk");
        assert_eq!(query.text, "Lahore");
    }

    #[test]
    fn test_latest_query_wins() {
        let mut search = PlaceSearch::new("pk");
        let older = search.begin_search("Lah").unwrap();
        let newer = search.begin_search("Lahore").unwrap();

        let applied = search
            .apply_search(older.id, Ok(vec![search_hit(1, "Lahore Cantt")]))
            .unwrap();
        assert_eq!(applied, Applied::Stale);
        assert!(search.results().is_empty());

        search
            .apply_search(newer.id, Ok(vec![search_hit(2, "Lahore, Punjab")]))
            .unwrap();
        assert_eq!(search.results()[0].id, 2);
        let point = search.choose(0).unwrap();
        assert_eq!(point.label.as_deref(), Some("Lahore, Punjab"));
        assert!(search.choose(1).is_none());
    }

    #[test]
    fn test_results_are_capped() {
        let mut search = PlaceSearch::new("pk");
        let query = search.begin_search("School").unwrap();
        let hits = (0..8).map(|i| search_hit(i, "School")).collect();
        search.apply_search(query.id, Ok(hits)).unwrap();
        assert_eq!(search.results().len(), RESULT_LIMIT);
    }

    #[test]
    fn test_failure_keeps_previous_results() {
        let mut search = PlaceSearch::new("pk");
        let first = search.begin_search("Quetta").unwrap();
        search.apply_search(first.id, Ok(vec![search_hit(9, "Quetta")])).unwrap();

        let second = search.begin_search("Quetta Cantt").unwrap();
        let err = search
            .apply_search(second.id, Err(ServiceError::Timeout { timeout_secs: 30 }))
            .unwrap_err();
        assert!(matches!(err, EngineError::Service(ServiceError::Timeout { .. })));
        assert!(!search.is_loading());
        assert_eq!(search.results().len(), 1);
    }

    #[tokio::test]
    async fn test_run_search_passes_scope_and_limit() {
        let geocoder = StubGeocoder::named("Gilgit");
        let mut search = PlaceSearch::new("pk");
        let query = search.begin_search("Gilgit").unwrap();
        let hits = run_search(&geocoder, &query, Duration::from_secs(5)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(
            geocoder.searches(),
            vec![("Gilgit".to_string(), "pk".to_string(), RESULT_LIMIT)]
        );
    }
}
