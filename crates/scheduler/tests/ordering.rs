//! Property tests for the dequeue order of report requests.
//!
//! For any set of enqueued requests the head of the queue has either a
//! higher priority than the next one, or the same priority and an earlier
//! (or equal) request timestamp.

use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use uuid::Uuid;

use reportd_core::SchedulerConfig;
use reportd_scheduler::scheduler::PendingQueue;
use reportd_scheduler::{
    DefinitionRef, MemoryDesignStore, MemoryHistory, ModeRef, Priority, RendererRegistry, ReportHistory,
    ReportRequest, ReportScheduler, StaticEvaluator,
};

fn arb_priority() -> impl Strategy<Value = Priority> {
    prop::sample::select(vec![Priority::Low, Priority::Normal, Priority::High, Priority::Highest])
}

/// (priority, seconds after the epoch below)
fn arb_entries(max: usize) -> impl Strategy<Value = Vec<(Priority, i64)>> {
    prop::collection::vec((arb_priority(), 0i64..50), 1..max)
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
}

fn request(priority: Priority, offset: i64) -> ReportRequest {
    ReportRequest::new(
        DefinitionRef::new(Uuid::new_v4(), "ordering"),
        ModeRef::new("web", ""),
        priority,
        "proptest",
    )
    .requested_on(base_time() + Duration::seconds(offset))
}

fn assert_dequeue_order(order: &[ReportRequest]) -> Result<(), TestCaseError> {
    for pair in order.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        prop_assert!(
            a.priority > b.priority || (a.priority == b.priority && a.requested_at <= b.requested_at),
            "{} @ {} dequeued before {} @ {}",
            a.priority,
            a.requested_at,
            b.priority,
            b.requested_at
        );
    }
    Ok(())
}

proptest! {
    #[test]
    fn pending_queue_pops_in_priority_then_time_order(entries in arb_entries(64)) {
        let mut queue = PendingQueue::new();
        for (priority, offset) in &entries {
            let mut r = request(*priority, *offset);
            r.ensure_uuid();
            prop_assert!(queue.push(r));
        }
        let snapshot = queue.snapshot();
        let popped: Vec<ReportRequest> = std::iter::from_fn(|| queue.pop()).collect();

        prop_assert_eq!(popped.len(), entries.len());
        prop_assert_eq!(&popped, &snapshot, "repeated scans must agree");
        assert_dequeue_order(&popped)?;
    }

    #[test]
    fn history_reports_queued_requests_in_dequeue_order(entries in arb_entries(32)) {
        let history = MemoryHistory::new();
        for (priority, offset) in &entries {
            let mut r = request(*priority, *offset);
            r.ensure_uuid();
            r.advance_to(reportd_scheduler::ReportStatus::Queued).unwrap();
            history.save_request(&r).unwrap();
        }
        let first = history.queued_requests().unwrap();
        let second = history.queued_requests().unwrap();
        prop_assert_eq!(&first, &second);
        assert_dequeue_order(&first)?;
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn concurrent_enqueue_keeps_total_order(entries in arb_entries(48)) {
        let scheduler = ReportScheduler::new(
            SchedulerConfig::default(),
            Arc::new(RendererRegistry::with_builtin()),
            Arc::new(StaticEvaluator::new()),
            Arc::new(MemoryHistory::new()),
            Arc::new(MemoryDesignStore::new()),
        )
        .unwrap();

        let chunks: Vec<Vec<(Priority, i64)>> = entries.chunks(8).map(|c| c.to_vec()).collect();
        let producers: Vec<_> = chunks
            .into_iter()
            .map(|chunk| {
                let scheduler = Arc::clone(&scheduler);
                thread::spawn(move || {
                    for (priority, offset) in chunk {
                        scheduler.queue_report(request(priority, offset)).unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let pending = scheduler.get_pending();
        prop_assert_eq!(pending.len(), entries.len());
        assert_dequeue_order(&pending)?;
    }
}
