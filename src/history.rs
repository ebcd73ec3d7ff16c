//! Append-only, per-ONU bounded event history.
//!
//! Each serial keeps at most the most recent 100 events; the 101st append
//! evicts the single oldest entry. Metrics are computed by scanning the
//! logs at call time, so they are always consistent with what `query`
//! returns.

use chrono::{Duration, Utc};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

use crate::models::{GlobalMetrics, HistoryEvent, HistoryFilter, RecentActivity, SerialMetrics};

pub const MAX_EVENTS_PER_SERIAL: usize = 100;

#[derive(Default)]
pub struct HistoryService {
    events: RwLock<HashMap<String, VecDeque<HistoryEvent>>>,
}

impl HistoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event to a serial's log, evicting the oldest entry past
    /// the cap. Always succeeds.
    pub async fn append(&self, serial: &str, event: HistoryEvent) {
        let mut events = self.events.write().await;
        let log = events.entry(serial.to_string()).or_default();

        tracing::debug!(
            "history event for {}: {} ({})",
            serial,
            event.event_type,
            event.status.as_deref().unwrap_or("-")
        );

        log.push_back(event);
        if log.len() > MAX_EVENTS_PER_SERIAL {
            log.pop_front();
        }
    }

    /// Matching events for a serial, newest first. The limit truncates after
    /// filtering and sorting.
    pub async fn query(&self, serial: &str, filter: &HistoryFilter) -> Vec<HistoryEvent> {
        let events = self.events.read().await;
        let Some(log) = events.get(serial) else {
            return Vec::new();
        };

        let mut matched: Vec<HistoryEvent> = log
            .iter()
            .filter(|e| {
                filter.event_type.as_ref().map_or(true, |t| &e.event_type == t)
                    && filter.start_date.map_or(true, |d| e.timestamp >= d)
                    && filter.end_date.map_or(true, |d| e.timestamp <= d)
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        matched
    }

    /// Aggregate metrics for one serial.
    pub async fn metrics(&self, serial: &str) -> SerialMetrics {
        let events = self.events.read().await;
        let log = events.get(serial);
        let now = Utc::now();
        let day_ago = now - Duration::hours(24);
        let week_ago = now - Duration::days(7);

        let mut metrics = SerialMetrics {
            total: 0,
            last_24h: 0,
            last_week: 0,
            by_type: HashMap::new(),
            last_event: None,
        };

        if let Some(log) = log {
            metrics.total = log.len();
            for event in log {
                if event.timestamp >= day_ago {
                    metrics.last_24h += 1;
                }
                if event.timestamp >= week_ago {
                    metrics.last_week += 1;
                }
                *metrics.by_type.entry(event.event_type.clone()).or_insert(0) += 1;
            }
            metrics.last_event = log.back().cloned();
        }

        metrics
    }

    /// Aggregate metrics across every serial's log.
    pub async fn metrics_all(&self) -> GlobalMetrics {
        let events = self.events.read().await;
        let now = Utc::now();
        let day_ago = now - Duration::hours(24);
        let week_ago = now - Duration::days(7);

        let mut metrics = GlobalMetrics {
            total_events: 0,
            active_serials: events.len(),
            events_by_type: HashMap::new(),
            recent_activity: RecentActivity { last_24h: 0, last_week: 0 },
        };

        for log in events.values() {
            metrics.total_events += log.len();
            for event in log {
                *metrics.events_by_type.entry(event.event_type.clone()).or_insert(0) += 1;
                if event.timestamp >= day_ago {
                    metrics.recent_activity.last_24h += 1;
                }
                if event.timestamp >= week_ago {
                    metrics.recent_activity.last_week += 1;
                }
            }
        }

        metrics
    }

    /// Drop a serial's whole log.
    pub async fn clear(&self, serial: &str) {
        self.events.write().await.remove(serial);
        tracing::info!("history cleared for {}", serial);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event_type;

    fn event_at(event_type: &str, offset_secs: i64) -> HistoryEvent {
        let mut event = HistoryEvent::new(event_type);
        event.timestamp = Utc::now() + Duration::seconds(offset_secs);
        event
    }

    #[tokio::test]
    async fn test_cap_evicts_exactly_the_oldest() {
        let history = HistoryService::new();
        let base = Utc::now();
        for i in 0..101 {
            let mut event = HistoryEvent::new(event_type::START);
            event.timestamp = base + Duration::seconds(i);
            history.append("HWTC1", event).await;
        }

        let events = history.query("HWTC1", &HistoryFilter::default()).await;
        assert_eq!(events.len(), 100);
        // Newest first; event 0 (the oldest) was evicted
        assert_eq!(events[0].timestamp, base + Duration::seconds(100));
        assert_eq!(events[99].timestamp, base + Duration::seconds(1));
    }

    #[tokio::test]
    async fn test_query_filters_and_orders_newest_first() {
        let history = HistoryService::new();
        history.append("HWTC1", event_at(event_type::START, -30)).await;
        history.append("HWTC1", event_at(event_type::STOP, -20)).await;
        history.append("HWTC1", event_at(event_type::START, -10)).await;

        let all = history.query("HWTC1", &HistoryFilter::default()).await;
        assert_eq!(all.len(), 3);
        assert!(all[0].timestamp > all[1].timestamp);
        assert!(all[1].timestamp > all[2].timestamp);

        let starts = history
            .query("HWTC1", &HistoryFilter { event_type: Some(event_type::START.into()), ..Default::default() })
            .await;
        assert_eq!(starts.len(), 2);

        let limited = history
            .query("HWTC1", &HistoryFilter { limit: Some(1), ..Default::default() })
            .await;
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].event_type, event_type::START);
    }

    #[tokio::test]
    async fn test_query_date_window() {
        let history = HistoryService::new();
        history.append("HWTC1", event_at(event_type::START, -3600)).await;
        history.append("HWTC1", event_at(event_type::STOP, -60)).await;

        let recent = history
            .query(
                "HWTC1",
                &HistoryFilter {
                    start_date: Some(Utc::now() - Duration::minutes(10)),
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].event_type, event_type::STOP);
    }

    #[tokio::test]
    async fn test_unknown_serial_is_empty() {
        let history = HistoryService::new();
        assert!(history.query("NOPE", &HistoryFilter::default()).await.is_empty());
        assert_eq!(history.metrics("NOPE").await.total, 0);
    }

    #[tokio::test]
    async fn test_serial_metrics() {
        let history = HistoryService::new();
        // Two recent, one old (8 days ago)
        history.append("HWTC1", event_at(event_type::START, -8 * 24 * 3600)).await;
        history.append("HWTC1", event_at(event_type::STOP, -60)).await;
        history.append("HWTC1", event_at(event_type::START, -30)).await;

        let metrics = history.metrics("HWTC1").await;
        assert_eq!(metrics.total, 3);
        assert_eq!(metrics.last_24h, 2);
        assert_eq!(metrics.last_week, 2);
        assert_eq!(metrics.by_type[event_type::START], 2);
        assert_eq!(metrics.by_type[event_type::STOP], 1);
        assert_eq!(metrics.last_event.unwrap().event_type, event_type::START);
    }

    #[tokio::test]
    async fn test_global_metrics() {
        let history = HistoryService::new();
        history.append("HWTC1", event_at(event_type::START, -10)).await;
        history.append("HWTC2", event_at(event_type::ERROR, -10)).await;
        history.append("HWTC2", event_at(event_type::REBOOT, -8 * 24 * 3600)).await;

        let metrics = history.metrics_all().await;
        assert_eq!(metrics.total_events, 3);
        assert_eq!(metrics.active_serials, 2);
        assert_eq!(metrics.events_by_type[event_type::ERROR], 1);
        assert_eq!(metrics.recent_activity.last_24h, 2);
        assert_eq!(metrics.recent_activity.last_week, 2);

        history.clear("HWTC2").await;
        assert_eq!(history.metrics_all().await.active_serials, 1);
    }
}
