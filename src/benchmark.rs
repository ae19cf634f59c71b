//! Lock-free-per-thread benchmark timeline (§4.8), grounded on the
//! original's `fixed_timeline_t<2048>` + thread-local pointer cache.
//!
//! Each thread gets its own fixed-capacity, append-only timeline of
//! `(timestamp, name)` entries; a `Tracer` handle (rather than an
//! implicit global singleton, per the REDESIGN FLAGS) owns the
//! process-wide map from thread id to timeline, guarded by one mutex
//! that is only ever touched once per thread (to register it), after
//! which each thread appends through its own thread-local `Arc` without
//! contending the global lock.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::Instant;

const TIMELINE_CAPACITY: usize = 2048;

#[derive(Clone, Copy, Debug)]
pub struct TimelineEntry {
    pub elapsed_nanos: u128,
    pub name: [u8; 16],
}

impl TimelineEntry {
    pub fn name_str(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

struct Timeline {
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    fn new() -> Self {
        Self { entries: Vec::with_capacity(TIMELINE_CAPACITY) }
    }

    /// Appends an entry; silently drops it once the timeline is full —
    /// exactly the original's behavior, so a busy thread never pays for
    /// reallocation or blocks the caller.
    fn append(&mut self, elapsed_nanos: u128, name: [u8; 16]) -> bool {
        if self.entries.len() >= TIMELINE_CAPACITY {
            return false;
        }
        self.entries.push(TimelineEntry { elapsed_nanos, name });
        true
    }
}

fn encode_name(name: &str) -> [u8; 16] {
    let mut buf = [0u8; 16];
    for (slot, byte) in buf.iter_mut().zip(name.as_bytes().iter()) {
        *slot = *byte;
    }
    buf
}

/// Owns the process-wide thread-id -> timeline map. Construct one and
/// share it (typically via `Arc`) across every thread that should record
/// into the same benchmark run.
pub struct Tracer {
    epoch: Instant,
    timelines: Mutex<HashMap<ThreadId, Arc<Mutex<Timeline>>>>,
}

thread_local! {
    static CACHED_TIMELINE: RefCell<Option<(*const Tracer, Arc<Mutex<Timeline>>)>> = const { RefCell::new(None) };
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracer {
    pub fn new() -> Self {
        Self { epoch: Instant::now(), timelines: Mutex::new(HashMap::new()) }
    }

    fn timeline_for_current_thread(&self) -> Arc<Mutex<Timeline>> {
        let self_ptr = self as *const Tracer;
        if let Some(cached) = CACHED_TIMELINE.with(|cell| {
            cell.borrow().as_ref().and_then(|(ptr, timeline)| (*ptr == self_ptr).then(|| timeline.clone()))
        }) {
            return cached;
        }

        let timeline = self
            .timelines
            .lock()
            .expect("tracer mutex poisoned")
            .entry(std::thread::current().id())
            .or_insert_with(|| Arc::new(Mutex::new(Timeline::new())))
            .clone();

        CACHED_TIMELINE.with(|cell| *cell.borrow_mut() = Some((self_ptr, timeline.clone())));
        timeline
    }

    /// Records `name` at the current instant on the calling thread's
    /// timeline. Returns `false` if that timeline is already full (the
    /// entry is dropped, never blocking or reallocating).
    pub fn record(&self, name: &str) -> bool {
        let elapsed = self.epoch.elapsed().as_nanos();
        let timeline = self.timeline_for_current_thread();
        timeline.lock().expect("timeline mutex poisoned").append(elapsed, encode_name(name))
    }

    /// Snapshots every thread's recorded entries, in no particular
    /// cross-thread order (timelines are independent).
    pub fn snapshot(&self) -> Vec<(ThreadId, Vec<TimelineEntry>)> {
        self.timelines
            .lock()
            .expect("tracer mutex poisoned")
            .iter()
            .map(|(id, timeline)| (*id, timeline.lock().expect("timeline mutex poisoned").entries.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_entries_on_current_thread() {
        let tracer = Tracer::new();
        assert!(tracer.record("start"));
        assert!(tracer.record("end"));

        let snapshot = tracer.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].1.len(), 2);
        assert_eq!(snapshot[0].1[0].name_str(), "start");
    }

    #[test]
    fn drops_entries_once_full() {
        let tracer = Tracer::new();
        for _ in 0..TIMELINE_CAPACITY {
            assert!(tracer.record("x"));
        }
        assert!(!tracer.record("overflow"));

        let snapshot = tracer.snapshot();
        assert_eq!(snapshot[0].1.len(), TIMELINE_CAPACITY);
    }

    #[test]
    fn separate_threads_get_separate_timelines() {
        let tracer = Arc::new(Tracer::new());
        let t1 = tracer.clone();
        let handle = std::thread::spawn(move || {
            t1.record("from-other-thread");
        });
        tracer.record("from-main-thread");
        handle.join().unwrap();

        assert_eq!(tracer.snapshot().len(), 2);
    }
}
