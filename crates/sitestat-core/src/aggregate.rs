//! Single-pass aggregation over the stored event stream.
//!
//! The engine pulls events page by page in ascending `(timestamp, id)` order
//! and feeds each one through a set of accumulators owned by the call. All
//! first-touch semantics (visitor country, UTM source) are defined by that
//! order. Nothing is returned until every stage has succeeded.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::IpAddr;

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use crate::attribution::AttributionResolver;
use crate::config::DEFAULT_PAGE_SIZE;
use crate::error::QueryError;
use crate::event::{normalize_domain, Event, PAGEVIEW, QUICKSYNC};
use crate::stats::{RequestsPerIp, Statistic, TimeWindow};
use crate::store::{EventStore, PageCursor};
use crate::visitor::{is_self_referral, referrer_host};

/// Trailing window, anchored at wall-clock now, for `current_visitors`.
pub const ACTIVE_WINDOW_MINUTES: i64 = 5;

/// Number of primary addresses reported in `requests_per_ip`.
pub const TOP_REQUESTERS: usize = 10;

pub struct AggregationEngine<'a, S: EventStore + ?Sized> {
    store: &'a S,
    page_size: usize,
}

impl<'a, S: EventStore + ?Sized> AggregationEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Build the full [`Statistic`] for `domain` in `window`.
    ///
    /// An inverted window is rejected before the store is touched. Any store
    /// failure aborts the call; malformed per-event fields only disable the
    /// accumulators that read them.
    pub async fn aggregate(
        &self,
        domain: &str,
        window: TimeWindow,
    ) -> Result<Statistic, QueryError> {
        window.validate()?;
        let domain = normalize_domain(domain);

        let total_page_views = self.store.count_pageviews(&domain, &window).await?;
        let total_visitors = self.store.count_visitors(&domain, &window).await?;
        let since = Utc::now() - Duration::minutes(ACTIVE_WINDOW_MINUTES);
        let current_visitors = self.store.count_active_visitors(&domain, since).await?;

        let mut acc = StreamAccumulators::new(&domain);
        let mut resolver = AttributionResolver::new(self.store, &domain);
        let mut cursor: Option<PageCursor> = None;
        let mut last_seen: Option<DateTime<Utc>> = None;
        let mut scanned = 0usize;

        loop {
            let page = self
                .store
                .events_page(&domain, &window, cursor.as_ref(), self.page_size)
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(PageCursor::after_event(last));

            for event in &page {
                if last_seen.is_some_and(|seen| event.timestamp < seen) {
                    return Err(QueryError::OutOfOrder(event.timestamp));
                }
                last_seen = Some(event.timestamp);
                acc.observe(event, &mut resolver).await?;
            }
            scanned += page.len();

            if page.len() < self.page_size {
                break;
            }
        }

        let requests_per_ip = self.top_requesters(&domain, &window).await?;

        debug!(
            domain = %domain,
            events = scanned,
            skipped_fields = acc.skipped_fields,
            "Aggregation pass finished"
        );

        Ok(Statistic {
            domain,
            start_time: window.start,
            end_time: window.end,
            current_visitors,
            total_page_views,
            total_visitors,
            page_views_per_hour: acc.page_views_per_hour,
            quick_syncs_per_hour: acc.quick_syncs_per_hour,
            visitors_per_country: acc.visitors_per_country,
            requests_per_ip,
            referrers: acc.referrers,
            visitors_per_utm_source: acc.visitors_per_utm_source,
            revenue_per_utm_source: acc.revenue_per_utm_source,
            revenue_per_referrer: acc.revenue_per_referrer,
        })
    }

    /// Group request records by primary address, keeping the first-seen
    /// forwarded chain and country, and rank them by hit count.
    async fn top_requesters(
        &self,
        domain: &str,
        window: &TimeWindow,
    ) -> Result<Vec<RequestsPerIp>, QueryError> {
        let mut grouped: HashMap<String, RequestsPerIp> = HashMap::new();
        let mut cursor: Option<PageCursor> = None;

        loop {
            let page = self
                .store
                .requests_page(domain, window, cursor.as_ref(), self.page_size)
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(PageCursor::after_request(last));
            let full = page.len() == self.page_size;

            for request in page {
                grouped
                    .entry(request.primary_ip.clone())
                    .and_modify(|g| g.count += 1)
                    .or_insert_with(|| RequestsPerIp {
                        ip: request.primary_ip,
                        ips: request.secondary_ips,
                        country: request.country,
                        count: 1,
                    });
            }

            if !full {
                break;
            }
        }

        Ok(rank_requesters(grouped.into_values().collect()))
    }
}

/// Sort by count descending, then by numeric address, and keep the top N.
pub fn rank_requesters(mut rows: Vec<RequestsPerIp>) -> Vec<RequestsPerIp> {
    rows.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| address_key(&a.ip).cmp(&address_key(&b.ip)))
    });
    rows.truncate(TOP_REQUESTERS);
    rows
}

fn address_key(ip: &str) -> (bool, Option<IpAddr>, &str) {
    let parsed = ip.parse::<IpAddr>().ok();
    (parsed.is_none(), parsed, ip)
}

/// Hour bucket key, e.g. `2024-01-01T13:00:00Z`.
pub fn hour_bucket(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:00:00Z").to_string()
}

fn increment(counts: &mut BTreeMap<String, i64>, key: &str) {
    *counts.entry(key.to_string()).or_insert(0) += 1;
}

fn add_revenue(totals: &mut BTreeMap<String, f64>, key: &str, amount: f64) {
    *totals.entry(key.to_string()).or_insert(0.0) += amount;
}

/// Sale amounts arrive as query-string text; numbers are accepted too.
fn sale_amount(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    amount.is_finite().then_some(amount)
}

/// Per-call accumulator state. Never shared across calls or threads.
struct StreamAccumulators {
    domain: String,
    page_views_per_hour: BTreeMap<String, i64>,
    quick_syncs_per_hour: BTreeMap<String, i64>,
    visitors_per_country: BTreeMap<String, i64>,
    referrers: BTreeMap<String, i64>,
    visitors_per_utm_source: BTreeMap<String, i64>,
    revenue_per_utm_source: BTreeMap<String, f64>,
    revenue_per_referrer: BTreeMap<String, f64>,
    counted_visitors: HashSet<String>,
    utm_visitors: HashSet<String>,
    skipped_fields: usize,
}

impl StreamAccumulators {
    fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            page_views_per_hour: BTreeMap::new(),
            quick_syncs_per_hour: BTreeMap::new(),
            visitors_per_country: BTreeMap::new(),
            referrers: BTreeMap::new(),
            visitors_per_utm_source: BTreeMap::new(),
            revenue_per_utm_source: BTreeMap::new(),
            revenue_per_referrer: BTreeMap::new(),
            counted_visitors: HashSet::new(),
            utm_visitors: HashSet::new(),
            skipped_fields: 0,
        }
    }

    async fn observe<S: EventStore + ?Sized>(
        &mut self,
        event: &Event,
        resolver: &mut AttributionResolver<'_, S>,
    ) -> Result<(), QueryError> {
        match event.event_name.as_str() {
            PAGEVIEW => increment(&mut self.page_views_per_hour, &hour_bucket(event.timestamp)),
            QUICKSYNC => increment(&mut self.quick_syncs_per_hour, &hour_bucket(event.timestamp)),
            _ => {}
        }

        // Visitor-level accumulators cover the same page-view population as
        // the scalar visitor count.
        if !event.is_pageview() {
            return Ok(());
        }

        if !self.counted_visitors.contains(&event.visitor_id) {
            self.counted_visitors.insert(event.visitor_id.clone());
            increment(&mut self.visitors_per_country, &event.country);
        }

        self.observe_referrer(event);

        let Some(params) = self.query_params(event) else {
            return Ok(());
        };

        let utm_source = params
            .get("utm_source")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty());

        if let Some(source) = utm_source {
            if !self.utm_visitors.contains(&event.visitor_id) {
                self.utm_visitors.insert(event.visitor_id.clone());
                increment(&mut self.visitors_per_utm_source, source);
            }
        }

        let Some(raw_amount) = params.get("sale_total") else {
            return Ok(());
        };
        let Some(amount) = sale_amount(raw_amount) else {
            self.skip(event, "sale_total");
            return Ok(());
        };

        if let Some(source) = utm_source {
            add_revenue(&mut self.revenue_per_utm_source, source, amount);
        }
        if let Some(host) = resolver.original_referrer(&event.visitor_id).await? {
            add_revenue(&mut self.revenue_per_referrer, &host, amount);
        }
        Ok(())
    }

    fn observe_referrer(&mut self, event: &Event) {
        let Some(raw) = event.referrer.as_deref().filter(|r| !r.trim().is_empty()) else {
            return;
        };
        match referrer_host(raw) {
            Some(host) if !is_self_referral(&host, &self.domain) => {
                increment(&mut self.referrers, &host);
            }
            Some(_) => {}
            None => self.skip(event, "referrer"),
        }
    }

    fn query_params(&mut self, event: &Event) -> Option<Map<String, Value>> {
        let raw = event.query_params.as_deref()?;
        match serde_json::from_str::<Map<String, Value>>(raw) {
            Ok(params) => Some(params),
            Err(_) => {
                self.skip(event, "query_params");
                None
            }
        }
    }

    fn skip(&mut self, event: &Event, field: &str) {
        self.skipped_fields += 1;
        debug!(event_id = %event.id, field, "Skipping malformed field");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use chrono::{NaiveDate, TimeZone};

    use super::*;
    use crate::event::RequestRecord;
    use crate::store::memory::MemoryStore;

    const DOMAIN: &str = "example.com";

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, hour, minute, 0)
            .single()
            .expect("ts")
    }

    fn pageview(id: &str, visitor: &str, ts: DateTime<Utc>) -> Event {
        Event {
            id: id.to_string(),
            domain: DOMAIN.to_string(),
            event_name: PAGEVIEW.to_string(),
            timestamp: ts,
            visitor_id: visitor.to_string(),
            session_id: None,
            path: "/".to_string(),
            user_agent: None,
            referrer: None,
            referrer_domain: None,
            country: "DE".to_string(),
            query_params: None,
            event_data: None,
            status_code: 200,
            duration_ms: None,
        }
    }

    fn with_referrer(mut event: Event, referrer: &str) -> Event {
        event.referrer_domain = referrer_host(referrer);
        event.referrer = Some(referrer.to_string());
        event
    }

    fn with_query(mut event: Event, query: &str) -> Event {
        event.query_params = Some(query.to_string());
        event
    }

    fn request(id: &str, ip: &str, chain: &[&str], minute: u32) -> RequestRecord {
        RequestRecord {
            id: id.to_string(),
            domain: DOMAIN.to_string(),
            timestamp: at(9, minute),
            path: "/".to_string(),
            user_agent: None,
            primary_ip: ip.to_string(),
            secondary_ips: chain.iter().map(|s| s.to_string()).collect(),
            country: "DE".to_string(),
            status_code: 200,
            duration_ms: None,
        }
    }

    async fn run(store: &MemoryStore) -> Statistic {
        AggregationEngine::new(store)
            .aggregate(DOMAIN, TimeWindow::unbounded())
            .await
            .expect("aggregate")
    }

    #[tokio::test]
    async fn visitors_per_country_counts_first_touch_only() {
        let mut us = pageview("e3", "v2", at(10, 20));
        us.country = "US".to_string();
        let store = MemoryStore::new(
            vec![
                pageview("e1", "v1", at(10, 0)),
                pageview("e2", "v1", at(10, 10)),
                us,
            ],
            vec![],
        );

        let stats = run(&store).await;
        assert_eq!(stats.visitors_per_country.get("DE"), Some(&1));
        assert_eq!(stats.visitors_per_country.get("US"), Some(&1));
        assert_eq!(stats.visitors_per_country.values().sum::<i64>(), 2);
        assert_eq!(stats.total_page_views, 3);
        assert_eq!(stats.total_visitors, 2);
    }

    #[tokio::test]
    async fn non_pageview_events_do_not_count_as_visitors() {
        let mut sync = with_query(
            pageview("e2", "v2", at(10, 5)),
            r#"{"utm_source":"ads","sale_total":"10"}"#,
        );
        sync.event_name = QUICKSYNC.to_string();
        sync.country = "US".to_string();
        let store = MemoryStore::new(vec![pageview("e1", "v1", at(10, 0)), sync], vec![]);

        let stats = run(&store).await;
        assert_eq!(stats.total_visitors, 1);
        assert_eq!(stats.visitors_per_country.get("DE"), Some(&1));
        assert!(!stats.visitors_per_country.contains_key("US"));
        assert_eq!(stats.visitors_per_country.values().sum::<i64>(), stats.total_visitors);
        assert!(stats.visitors_per_utm_source.is_empty());
        assert!(stats.revenue_per_utm_source.is_empty());
        assert_eq!(stats.quick_syncs_per_hour.get("2024-01-15T10:00:00Z"), Some(&1));
    }

    #[tokio::test]
    async fn hourly_buckets_split_pageviews_and_quicksyncs() {
        let mut sync = pageview("e4", "v1", at(10, 30));
        sync.event_name = QUICKSYNC.to_string();
        let mut other = pageview("e5", "v1", at(10, 40));
        other.event_name = "signup".to_string();
        let store = MemoryStore::new(
            vec![
                pageview("e1", "v1", at(10, 5)),
                pageview("e2", "v1", at(10, 55)),
                pageview("e3", "v1", at(11, 0)),
                sync,
                other,
            ],
            vec![],
        );

        let stats = run(&store).await;
        assert_eq!(stats.page_views_per_hour.get("2024-01-15T10:00:00Z"), Some(&2));
        assert_eq!(stats.page_views_per_hour.get("2024-01-15T11:00:00Z"), Some(&1));
        assert_eq!(stats.quick_syncs_per_hour.get("2024-01-15T10:00:00Z"), Some(&1));
        assert_eq!(stats.quick_syncs_per_hour.len(), 1);
    }

    #[tokio::test]
    async fn self_referrals_are_excluded() {
        let mut sync = with_referrer(pageview("e5", "v4", at(10, 4)), "https://bing.com/");
        sync.event_name = QUICKSYNC.to_string();
        let store = MemoryStore::new(
            vec![
                with_referrer(pageview("e1", "v1", at(10, 0)), "https://example.com/pricing"),
                with_referrer(pageview("e2", "v2", at(10, 1)), "https://www.example.com/"),
                with_referrer(pageview("e3", "v3", at(10, 2)), "https://www.google.com/search?q=x"),
                with_referrer(pageview("e4", "v3", at(10, 3)), "https://www.google.com/"),
                sync,
            ],
            vec![],
        );

        let stats = run(&store).await;
        assert!(!stats.referrers.contains_key("example.com"));
        assert!(!stats.referrers.contains_key("www.example.com"));
        assert!(!stats.referrers.contains_key("bing.com"));
        assert_eq!(stats.referrers.get("www.google.com"), Some(&2));
    }

    #[tokio::test]
    async fn utm_source_is_first_touch_per_visitor() {
        let store = MemoryStore::new(
            vec![
                with_query(pageview("e1", "v1", at(10, 0)), r#"{"utm_source":"ads"}"#),
                with_query(pageview("e2", "v1", at(10, 5)), r#"{"utm_source":"mail"}"#),
                with_query(pageview("e3", "v2", at(10, 6)), r#"{"utm_source":"mail"}"#),
                pageview("e4", "v3", at(10, 7)),
            ],
            vec![],
        );

        let stats = run(&store).await;
        assert_eq!(stats.visitors_per_utm_source.get("ads"), Some(&1));
        assert_eq!(stats.visitors_per_utm_source.get("mail"), Some(&1));
    }

    #[tokio::test]
    async fn revenue_is_credited_to_utm_source() {
        let store = MemoryStore::new(
            vec![with_query(
                pageview("e1", "v1", at(10, 0)),
                r#"{"utm_source":"ads","sale_total":"19.99"}"#,
            )],
            vec![],
        );

        let stats = run(&store).await;
        assert_eq!(stats.revenue_per_utm_source.get("ads"), Some(&19.99));
        assert!(stats.revenue_per_referrer.is_empty());
    }

    #[tokio::test]
    async fn revenue_is_credited_to_original_referrer() {
        let store = MemoryStore::new(
            vec![
                with_referrer(pageview("e1", "v1", at(8, 0)), "https://www.example.com/"),
                with_referrer(pageview("e2", "v1", at(9, 0)), "https://news.ycombinator.com/item"),
                with_query(
                    with_referrer(pageview("e3", "v1", at(10, 0)), "https://example.com/cart"),
                    r#"{"sale_total":"10"}"#,
                ),
                with_query(pageview("e4", "v1", at(11, 0)), r#"{"sale_total":5.5}"#),
            ],
            vec![],
        );

        let stats = run(&store).await;
        assert_eq!(stats.revenue_per_referrer.get("news.ycombinator.com"), Some(&15.5));
        assert_eq!(stats.revenue_per_referrer.len(), 1);
        assert!(stats.revenue_per_utm_source.is_empty());
        assert_eq!(store.referrer_lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_fields_do_not_abort_the_pass() {
        let store = MemoryStore::new(
            vec![
                with_query(pageview("e1", "v1", at(10, 0)), "utm_source=ads"),
                with_referrer(pageview("e2", "v2", at(10, 1)), "::not a url::"),
                with_query(
                    pageview("e3", "v3", at(10, 2)),
                    r#"{"utm_source":"ads","sale_total":"lots"}"#,
                ),
                with_referrer(pageview("e4", "v4", at(10, 3)), "https://duckduckgo.com/"),
            ],
            vec![],
        );

        let stats = run(&store).await;
        assert_eq!(stats.page_views_per_hour.get("2024-01-15T10:00:00Z"), Some(&4));
        assert_eq!(stats.visitors_per_country.get("DE"), Some(&4));
        assert_eq!(stats.visitors_per_utm_source.get("ads"), Some(&1));
        assert!(stats.revenue_per_utm_source.is_empty());
        assert_eq!(stats.referrers.get("duckduckgo.com"), Some(&1));
        assert_eq!(stats.referrers.len(), 1);
    }

    #[tokio::test]
    async fn inverted_window_fails_before_store_access() {
        let store = MemoryStore::new(vec![pageview("e1", "v1", at(10, 0))], vec![]);
        let window = TimeWindow::new(
            NaiveDate::from_ymd_opt(2024, 2, 1),
            NaiveDate::from_ymd_opt(2024, 1, 1),
        );

        let err = AggregationEngine::new(&store)
            .aggregate(DOMAIN, window)
            .await
            .expect_err("must reject");
        assert!(matches!(err, QueryError::InvalidWindow { .. }));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn shared_timestamps_across_pages_are_counted_once() {
        let ts = at(10, 0);
        let events: Vec<Event> = (0..5)
            .map(|i| pageview(&format!("e{i}"), &format!("v{i}"), ts))
            .collect();
        let store = MemoryStore::new(events, vec![]);

        let stats = AggregationEngine::new(&store)
            .with_page_size(2)
            .aggregate(DOMAIN, TimeWindow::unbounded())
            .await
            .expect("aggregate");

        assert_eq!(stats.page_views_per_hour.get("2024-01-15T10:00:00Z"), Some(&5));
        assert_eq!(stats.visitors_per_country.get("DE"), Some(&5));
        let served = store.served_pages.lock().expect("lock").clone();
        assert_eq!(served, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn window_limits_the_stream() {
        let mut late = pageview("e2", "v2", at(10, 0) + Duration::days(3));
        late.country = "US".to_string();
        let store = MemoryStore::new(vec![pageview("e1", "v1", at(10, 0)), late], vec![]);
        let window = TimeWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 15),
            NaiveDate::from_ymd_opt(2024, 1, 15),
        );

        let stats = AggregationEngine::new(&store)
            .aggregate(DOMAIN, window)
            .await
            .expect("aggregate");
        assert_eq!(stats.total_page_views, 1);
        assert!(!stats.visitors_per_country.contains_key("US"));
        assert_eq!(stats.start_time, NaiveDate::from_ymd_opt(2024, 1, 15));
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_query_error() {
        let mut store = MemoryStore::new(vec![pageview("e1", "v1", at(10, 0))], vec![]);
        store.fail_pages = true;

        let err = run_err(&store).await;
        assert!(matches!(err, QueryError::Store(_)));
    }

    async fn run_err(store: &MemoryStore) -> QueryError {
        AggregationEngine::new(store)
            .aggregate(DOMAIN, TimeWindow::unbounded())
            .await
            .expect_err("must fail")
    }

    #[tokio::test]
    async fn requests_grouped_by_primary_ip() {
        let mut requests = vec![
            request("r1", "10.0.0.1", &["192.168.0.1"], 0),
            request("r2", "10.0.0.1", &["192.168.0.9"], 1),
            request("r3", "10.0.0.2", &[], 2),
        ];
        // Twelve single-hit addresses to force truncation and tie-breaking.
        for i in 0..12u32 {
            requests.push(request(&format!("s{i}"), &format!("10.0.1.{}", 12 - i), &[], 3 + i));
        }
        let store = MemoryStore::new(vec![], requests);

        let stats = AggregationEngine::new(&store)
            .with_page_size(4)
            .aggregate(DOMAIN, TimeWindow::unbounded())
            .await
            .expect("aggregate");

        let top = &stats.requests_per_ip;
        assert_eq!(top.len(), TOP_REQUESTERS);
        assert_eq!(top[0].ip, "10.0.0.1");
        assert_eq!(top[0].count, 2);
        assert_eq!(top[0].ips, vec!["192.168.0.1".to_string()]);
        assert_eq!(top[1].ip, "10.0.0.2");
        assert_eq!(top[2].ip, "10.0.1.1");
        assert_eq!(top[3].ip, "10.0.1.2");
        assert_eq!(top[9].ip, "10.0.1.8");
    }

    #[test]
    fn tie_break_is_numeric() {
        let row = |ip: &str| RequestsPerIp {
            ip: ip.to_string(),
            ips: vec![],
            country: "ZZ".to_string(),
            count: 1,
        };
        let ranked = rank_requesters(vec![row("10.0.0.10"), row("garbage"), row("10.0.0.9")]);
        let order: Vec<&str> = ranked.iter().map(|r| r.ip.as_str()).collect();
        assert_eq!(order, vec!["10.0.0.9", "10.0.0.10", "garbage"]);
    }
}
