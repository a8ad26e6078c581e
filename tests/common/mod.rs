#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use memtally::{MemoryContext, RawAllocator};

fn snapshot_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("snapshots")
}

pub fn assert_snapshot(name: &str, actual: &str) {
    let path = snapshot_root().join(name);
    if std::env::var("MEMTALLY_UPDATE_SNAPSHOTS").is_ok() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create snapshot directory");
        }
        fs::write(&path, actual).expect("write snapshot");
        return;
    }

    let expected =
        fs::read_to_string(&path).unwrap_or_else(|_| panic!("snapshot {:?} not found", path));
    if normalize(&expected) != normalize(actual) {
        panic!(
            "Snapshot mismatch for {:?}. Set MEMTALLY_UPDATE_SNAPSHOTS=1 to regenerate.\nExpected:\n{}\nActual:\n{}",
            path,
            expected,
            actual
        );
    }
}

fn normalize(input: &str) -> String {
    input.replace("\r\n", "\n")
}

/// Hands out fake, never-reused addresses from 0x1000 upwards in 0x100
/// steps. Nothing is ever dereferenced, so the facade can be driven with
/// predictable addresses.
#[derive(Debug)]
pub struct FakeAllocator {
    next: usize,
    live: HashMap<usize, usize>,
    fail_next: bool,
    pub releases: usize,
}

impl Default for FakeAllocator {
    fn default() -> Self {
        Self {
            next: 0x1000,
            live: HashMap::new(),
            fail_next: false,
            releases: 0,
        }
    }
}

impl FakeAllocator {
    /// Make the next request return null.
    pub fn fail_next(&mut self) {
        self.fail_next = true;
    }

    /// Blocks handed out and not yet released.
    pub fn live(&self) -> usize {
        self.live.len()
    }

    fn bump(&mut self, bytes: usize) -> *mut u8 {
        if std::mem::take(&mut self.fail_next) {
            return std::ptr::null_mut();
        }
        let address = self.next;
        self.next += bytes.div_ceil(0x100).max(1) * 0x100;
        self.live.insert(address, bytes);
        address as *mut u8
    }
}

impl RawAllocator for FakeAllocator {
    fn allocate(&mut self, bytes: usize) -> *mut u8 {
        self.bump(bytes)
    }

    fn allocate_zeroed(&mut self, count: usize, size: usize) -> *mut u8 {
        self.bump(count * size)
    }

    /// Shrinking stays in place; growing always moves.
    unsafe fn resize(&mut self, ptr: *mut u8, bytes: usize) -> *mut u8 {
        let address = ptr as usize;
        match self.live.get(&address).copied() {
            Some(current) if bytes <= current && !self.fail_next => {
                self.live.insert(address, bytes);
                ptr
            }
            _ => {
                let moved = self.bump(bytes);
                if !moved.is_null() {
                    self.live.remove(&address);
                }
                moved
            }
        }
    }

    unsafe fn release(&mut self, ptr: *mut u8) {
        assert!(
            self.live.remove(&(ptr as usize)).is_some(),
            "fake allocator: release of unknown block {:#x}",
            ptr as usize
        );
        self.releases += 1;
    }
}

/// Writer that keeps everything written to it, shareable with a context.
#[derive(Clone, Default)]
pub struct Capture(Rc<RefCell<Vec<u8>>>);

impl Capture {
    pub fn text(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).expect("utf-8 output")
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Fake-backed context with statistics (and tracking) on.
pub fn stat_context() -> MemoryContext<FakeAllocator> {
    let mut ctx = MemoryContext::new(FakeAllocator::default());
    ctx.set_stat().expect("stat before start");
    ctx.start_tracking();
    ctx
}
