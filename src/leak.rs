//! Memory sampling for leak detection across connect/disconnect cycles.
//!
//! A [`LeakMonitor`] combines two signals: bytes held by the allocator
//! ([`AllocationSource`]) and resident set size as reported by the OS
//! ([`ProcessInspector`]). Each sample is compared with the previous one
//! only; no longer history is kept.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::alloc::{GlobalAlloc, Layout, System};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Source of a live-allocated-bytes counter.
pub trait AllocationSource {
    /// Bring allocator accounting to a stable point before reading it.
    fn quiesce(&self) {}

    /// Bytes currently allocated.
    fn allocated_bytes(&self) -> u64;
}

impl<T: AllocationSource + ?Sized> AllocationSource for &T {
    fn quiesce(&self) {
        (**self).quiesce()
    }

    fn allocated_bytes(&self) -> u64 {
        (**self).allocated_bytes()
    }
}

/// Used when no counting allocator is installed; always reports zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct Untracked;

impl AllocationSource for Untracked {
    fn allocated_bytes(&self) -> u64 {
        0
    }
}

/// Global allocator wrapper that tracks live bytes.
///
/// ```no_run
/// use oracle_session_rs::CountingAllocator;
///
/// #[global_allocator]
/// static ALLOC: CountingAllocator = CountingAllocator::system();
/// ```
#[derive(Debug)]
pub struct CountingAllocator<A = System> {
    inner: A,
    allocated: AtomicUsize,
}

impl CountingAllocator<System> {
    pub const fn system() -> Self {
        Self::new(System)
    }
}

impl<A> CountingAllocator<A> {
    pub const fn new(inner: A) -> Self {
        Self {
            inner,
            allocated: AtomicUsize::new(0),
        }
    }
}

unsafe impl<A: GlobalAlloc> GlobalAlloc for CountingAllocator<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc(layout);
        if !ptr.is_null() {
            self.allocated.fetch_add(layout.size(), Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc_zeroed(layout);
        if !ptr.is_null() {
            self.allocated.fetch_add(layout.size(), Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.inner.dealloc(ptr, layout);
        self.allocated.fetch_sub(layout.size(), Ordering::Relaxed);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = self.inner.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            if new_size >= layout.size() {
                self.allocated
                    .fetch_add(new_size - layout.size(), Ordering::Relaxed);
            } else {
                self.allocated
                    .fetch_sub(layout.size() - new_size, Ordering::Relaxed);
            }
        }
        new_ptr
    }
}

impl<A> AllocationSource for CountingAllocator<A> {
    fn allocated_bytes(&self) -> u64 {
        self.allocated.load(Ordering::SeqCst) as u64
    }
}

/// Reads a process's resident set size.
pub trait ProcessInspector {
    fn rss_kb(&self, pid: u32) -> Result<u64>;
}

/// Runs `ps -o rss= <pid>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PsInspector;

impl ProcessInspector for PsInspector {
    fn rss_kb(&self, pid: u32) -> Result<u64> {
        let pid = pid.to_string();
        let output = Command::new("ps")
            .args(["-o", "rss=", pid.as_str()])
            .output()
            .map_err(|e| Error::measurement(format!("error running ps: {e}")))?;
        if !output.status.success() {
            return Err(Error::measurement(format!(
                "ps exited with {}",
                output.status
            )));
        }
        parse_rss(&output.stdout)
    }
}

fn parse_rss(out: &[u8]) -> Result<u64> {
    let text = String::from_utf8_lossy(out);
    let text = text.trim();
    text.parse::<u64>()
        .map_err(|e| Error::measurement(format!("not a number: {text:?} ({e})")))
}

/// One memory measurement with deltas against the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySample {
    pub allocated_bytes: u64,
    pub alloc_delta: i64,
    /// Last successfully read RSS; 0 until the first successful read.
    pub rss_kb: u64,
    pub rss_delta_kb: i64,
    pub captured_at: DateTime<Utc>,
}

fn delta(current: u64, previous: u64) -> i64 {
    current as i64 - previous as i64
}

/// Samples allocator and OS memory figures, logging the change each time.
pub struct LeakMonitor<A, P = PsInspector> {
    allocations: A,
    inspector: P,
    pid: u32,
    previous: Option<MemorySample>,
}

impl<A: AllocationSource> LeakMonitor<A, PsInspector> {
    /// Monitor the current process with `ps`.
    pub fn new(allocations: A) -> Self {
        Self::with_inspector(allocations, PsInspector)
    }
}

impl<A: AllocationSource, P: ProcessInspector> LeakMonitor<A, P> {
    pub fn with_inspector(allocations: A, inspector: P) -> Self {
        Self {
            allocations,
            inspector,
            pid: std::process::id(),
            previous: None,
        }
    }

    /// Inspect a different process.
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    /// Take a sample. Never fails: an unreadable RSS keeps the previous value.
    ///
    /// The first sample is the baseline and reports zero deltas.
    pub fn sample(&mut self) -> MemorySample {
        self.allocations.quiesce();
        let allocated_bytes = self.allocations.allocated_bytes();

        let previous_rss = self.previous.map(|p| p.rss_kb).unwrap_or(0);
        let rss_kb = match self.inspector.rss_kb(self.pid) {
            Ok(kb) => kb,
            Err(e) => {
                tracing::warn!(
                    pid = self.pid,
                    error = %e,
                    "reading RSS failed; keeping previous value"
                );
                previous_rss
            }
        };

        let (alloc_delta, rss_delta_kb) = match self.previous {
            None => (0, 0),
            Some(prev) => (
                delta(allocated_bytes, prev.allocated_bytes),
                delta(rss_kb, prev.rss_kb),
            ),
        };

        let sample = MemorySample {
            allocated_bytes,
            alloc_delta,
            rss_kb,
            rss_delta_kb,
            captured_at: Utc::now(),
        };
        tracing::info!(
            alloc_delta,
            allocated_bytes,
            rss_delta_kb,
            rss_kb,
            "memory sample"
        );
        self.previous = Some(sample);
        sample
    }

    /// The most recent sample, if any.
    pub fn last(&self) -> Option<&MemorySample> {
        self.previous.as_ref()
    }
}
