//! Best-effort chronological ordering of timeline events.
//!
//! Events with a known time are sorted among themselves. Approximate events
//! keep the position the narrative gave them, so "the week before" stays
//! next to whatever it was said relative to.

use crate::domain::analysis::TimelineEvent;

/// Order events by timestamp where known, narrative order otherwise.
///
/// The sort is stable: events at the same instant keep their relative order.
pub fn order_timeline(mut events: Vec<TimelineEvent>) -> Vec<TimelineEvent> {
    let slots: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| !e.timestamp.is_approximate())
        .map(|(i, _)| i)
        .collect();

    let mut known: Vec<TimelineEvent> = slots.iter().map(|&i| events[i].clone()).collect();
    known.sort_by_key(|e| e.timestamp.sort_key());

    for (slot, event) in slots.into_iter().zip(known) {
        events[slot] = event;
    }
    events
}
