//! Custom assertions and event helpers

use picsync::{Event, Record};
use std::time::Duration;
use tokio::sync::broadcast;

/// Assert the store holds exactly `count` records, all resolved to `url`
pub fn assert_all_resolved_to(records: &[Record], count: usize, url: &str) {
    assert_eq!(records.len(), count, "unexpected record count");
    for record in records {
        assert_eq!(
            record.url.as_deref(),
            Some(url),
            "record {} not resolved to {}",
            record.id,
            url
        );
    }
}

/// Drain every event currently buffered in `events`
pub fn drain_events(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// Wait for the first event matching `predicate`, failing after `timeout`
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    mut predicate: F,
) -> Event
where
    F: FnMut(&Event) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event channel closed: {e}"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no matching event within {timeout:?}"))
}
