//! Instrumented facade: tracking, accounting, limits and tracing

mod common;

use std::ptr::NonNull;

use common::{stat_context, Capture, FakeAllocator};
use memtally::{ConfigWarning, MemoryContext, MemoryError, RawAllocator};

fn addr(ptr: NonNull<u8>) -> usize {
    ptr.as_ptr() as usize
}

#[test]
fn double_release_is_untracked_address() {
    let mut ctx = stat_context();
    let p = ctx.allocate(4, 8, "twice").unwrap();
    unsafe { ctx.release(p).unwrap() };
    let err = unsafe { ctx.release(p) }.unwrap_err();
    assert!(matches!(err, MemoryError::UntrackedAddress { address } if address == addr(p)));
    assert!(!err.is_internal());
    // The second release never reached the raw allocator.
    assert_eq!(ctx.raw_mut().releases, 1);
}

#[test]
fn zero_byte_resize_releases() {
    let mut ctx = stat_context();
    let p = ctx.allocate(16, 4, "shrink to nothing").unwrap();
    let out = unsafe { ctx.resize(Some(p), 0, 4, "shrink to nothing") }.unwrap();
    assert!(out.is_none());
    assert!(ctx.lookup(addr(p)).is_none());
    assert_eq!(ctx.stats().total_bytes, 0);
    assert_eq!(ctx.raw_mut().live(), 0);

    // Nothing to release.
    assert!(unsafe { ctx.resize(None, 0, 4, "noop") }.unwrap().is_none());
}

#[test]
fn limit_breach_happens_before_lookup_sees_block() {
    let mut ctx = MemoryContext::new(FakeAllocator::default());
    ctx.set_byte_limit(100).unwrap();
    ctx.start_tracking();

    let ok = ctx.allocate(10, 8, "fits").unwrap();
    let err = ctx.allocate(3, 8, "too much").unwrap_err();
    assert!(matches!(
        err,
        MemoryError::MemoryLimitExceeded { total: 104, limit: 100 }
    ));
    assert_eq!(ctx.directory().len(), 1);
    assert!(ctx.lookup(addr(ok)).is_some());
    assert!(ctx.directory().iter().all(|r| r.tag != "too much"));
    // No rollback: the bytes stay counted.
    assert_eq!(ctx.stats().total_bytes, 104);
}

#[test]
fn null_from_raw_allocator_is_out_of_memory() {
    let mut ctx = stat_context();
    ctx.raw_mut().fail_next();
    let err = ctx.allocate(1, 1, "doomed").unwrap_err();
    assert_eq!(err.to_string(), "Out of memory allocating \"doomed\"");
    assert!(ctx.directory().is_empty());

    let p = ctx.allocate(1, 8, "victim").unwrap();
    ctx.raw_mut().fail_next();
    let err = unsafe { ctx.resize(Some(p), 1000, 8, "victim") }.unwrap_err();
    assert!(matches!(err, MemoryError::OutOfMemory { ref tag } if tag == "victim"));
    assert_eq!(ctx.lookup(addr(p)).unwrap().bytes(), 8);
}

#[test]
fn resize_of_untracked_address_fails() {
    let mut ctx = stat_context();
    let stray = NonNull::new(ctx.raw_mut().allocate(32)).unwrap();
    let err = unsafe { ctx.resize(Some(stray), 8, 8, "stray") }.unwrap_err();
    assert!(matches!(
        err,
        MemoryError::UntrackedResize { ref tag, address } if tag == "stray" && address == addr(stray)
    ));
}

#[test]
fn exempt_address_may_be_resized_untracked() {
    let mut ctx = stat_context();
    let glom = NonNull::new(ctx.raw_mut().allocate(16)).unwrap();
    ctx.exempt().insert(addr(glom));

    let moved = unsafe { ctx.resize(Some(glom), 64, 1, "string buffer") }
        .unwrap()
        .unwrap();
    assert_ne!(addr(moved), addr(glom));
    assert!(ctx.directory().is_empty());
    assert_eq!(ctx.stats().total_bytes, 0);
    assert!(ctx.exempt().contains(addr(moved)));
    assert!(!ctx.exempt().contains(addr(glom)));

    // Release gets no exemption.
    assert!(matches!(
        unsafe { ctx.release(moved) },
        Err(MemoryError::UntrackedAddress { .. })
    ));
}

#[test]
fn resize_from_null_installs() {
    let mut ctx = stat_context();
    let p = unsafe { ctx.resize(None, 5, 8, "fresh") }.unwrap().unwrap();
    let rec = ctx.lookup(addr(p)).unwrap();
    assert_eq!((rec.count, rec.size, rec.tag.as_str()), (5, 8, "fresh"));
    assert_eq!(ctx.stats().total_bytes, 40);
}

#[test]
fn in_place_resize_updates_footprint() {
    let mut ctx = stat_context();
    let p = ctx.allocate(100, 1, "buf").unwrap();
    let q = unsafe { ctx.resize(Some(p), 10, 1, "buf") }.unwrap().unwrap();
    assert_eq!(p, q);
    assert_eq!(ctx.lookup(addr(q)).unwrap().count, 10);
    assert_eq!(ctx.stats().total_bytes, 10);
    assert_eq!(ctx.stats().peak_bytes, 100);
}

#[test]
fn tracking_without_stats_keeps_counters_at_zero() {
    let mut ctx = MemoryContext::new(FakeAllocator::default());
    ctx.set_track().unwrap();
    ctx.start_tracking();
    ctx.allocate(8, 8, "a").unwrap();
    assert_eq!(ctx.directory().len(), 1);
    assert_eq!(ctx.stats().total_bytes, 0);
    assert!(matches!(ctx.memory_used(), Err(MemoryError::StatisticsDisabled)));
}

#[test]
fn untracked_mode_touches_nothing() {
    let mut ctx = MemoryContext::new(FakeAllocator::default());
    ctx.start_tracking();
    let p = ctx.allocate(8, 8, "plain").unwrap();
    let q = unsafe { ctx.resize(Some(p), 64, 8, "plain") }.unwrap().unwrap();
    unsafe { ctx.release(q).unwrap() };
    assert!(ctx.directory().is_empty());
    assert_eq!(ctx.raw_mut().live(), 0);
}

#[test]
fn trace_lines_follow_threshold() {
    let capture = Capture::default();
    let mut ctx = MemoryContext::new(FakeAllocator::default());
    ctx.set_trace_writer(Box::new(capture.clone())).unwrap();
    ctx.set_trace_threshold(16).unwrap();
    ctx.start_tracking();

    let a = ctx.allocate(10, 8, "vector").unwrap();
    ctx.allocate_zeroed(1, 8, "tiny").unwrap();
    let b = ctx.allocate_zeroed(4, 4, "edge").unwrap();
    let a2 = unsafe { ctx.resize(Some(a), 20, 8, "vector") }.unwrap().unwrap();
    unsafe { ctx.resize(Some(b), 2, 8, "edge") }.unwrap();
    unsafe { ctx.release(a2).unwrap() };

    assert_eq!(
        capture.text(),
        "malloc called for 10 items of size 8 for vector:  0x1000\n\
         calloc called for 4 items of size 4 for edge:  0x1200\n\
         realloc called for 20 items of size 8 for vector:  0x1000 -> 0x1300\n\
         realloc called for 2 items of size 8 for edge:  0x1200\n"
    );
}

#[test]
fn trace_file_is_written() {
    let path = std::env::temp_dir().join(format!("memtally-trace-{}.log", std::process::id()));
    {
        let mut ctx = MemoryContext::new(FakeAllocator::default());
        ctx.set_trace(&path).unwrap();
        ctx.start_tracking();
        ctx.allocate(3, 4, "logged").unwrap();
        ctx.flush_trace().unwrap();
    }
    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(text, "malloc called for 3 items of size 4 for logged:  0x1000\n");
}

#[test]
fn unopenable_trace_log_is_a_warning() {
    let mut ctx = MemoryContext::new(FakeAllocator::default());
    let path = std::env::temp_dir()
        .join("memtally-no-such-dir")
        .join("nested")
        .join("trace.log");
    let warning = ctx.set_trace(&path).unwrap_err();
    assert!(matches!(warning, ConfigWarning::TraceLogOpen { .. }));
    assert!(warning.to_string().starts_with("Unable to open"));
    ctx.start_tracking();
    assert!(!ctx.flags().trace);
    ctx.allocate(1, 1, "fine").unwrap();
}
