use std::collections::HashMap;

use crate::error::QueryError;
use crate::store::EventStore;
use crate::visitor::self_hosts;

/// Resolves the original external referrer of a visitor for revenue credit.
///
/// Answers are cached for the lifetime of one aggregation call; the earliest
/// referrer of a visitor cannot change while the pass runs because new rows
/// are always newer.
pub struct AttributionResolver<'a, S: EventStore + ?Sized> {
    store: &'a S,
    excluded: [String; 2],
    cache: HashMap<String, Option<String>>,
}

impl<'a, S: EventStore + ?Sized> AttributionResolver<'a, S> {
    pub fn new(store: &'a S, domain: &str) -> Self {
        Self {
            store,
            excluded: self_hosts(domain),
            cache: HashMap::new(),
        }
    }

    /// Earliest referrer host on record for `visitor_id` that is not the
    /// site itself. `None` when the visitor never arrived from elsewhere.
    pub async fn original_referrer(
        &mut self,
        visitor_id: &str,
    ) -> Result<Option<String>, QueryError> {
        if let Some(cached) = self.cache.get(visitor_id) {
            return Ok(cached.clone());
        }
        let host = self
            .store
            .earliest_external_referrer(visitor_id, &self.excluded)
            .await?;
        self.cache.insert(visitor_id.to_string(), host.clone());
        Ok(host)
    }
}
