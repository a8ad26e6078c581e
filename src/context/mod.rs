//! Allocator context and the instrumented facade
//!
//! A [`MemoryContext`] is created once per run. The argument parser fills in
//! its [`Settings`], [`MemoryContext::start_tracking`] latches them, and from
//! then on every dynamic allocation goes through [`MemoryContext::allocate`],
//! [`MemoryContext::allocate_zeroed`], [`MemoryContext::resize`] and
//! [`MemoryContext::release`]. Each call performs the raw operation, checks
//! for null, then traces, accounts and tracks according to the active
//! [`Flags`].
//!
//! The context has no internal locking. Runtimes with several threads must
//! serialize all facade calls behind one exclusive section.

mod exempt;
mod raw;
mod settings;

pub use exempt::ExemptList;
pub use raw::{RawAllocator, SystemAllocator};
pub use settings::{Flags, Settings};

use std::cell::RefCell;
use std::io::Write;
use std::path::Path;
use std::ptr::{self, NonNull};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::directory::{Directory, Record};
use crate::error::{ConfigWarning, MemoryError};
use crate::space::{Accounting, MemStats};
use crate::trace::{CallKind, TraceLog};

/// Context shared by array descriptors that release their storage on drop.
pub type SharedContext<A = SystemAllocator> = Rc<RefCell<MemoryContext<A>>>;

/// Process-wide allocation state: settings, flags, directory, counters and
/// trace log, over a raw allocator `A`.
#[derive(Debug)]
pub struct MemoryContext<A: RawAllocator = SystemAllocator> {
    raw: A,
    settings: Settings,
    flags: Flags,
    started: bool,
    directory: Directory,
    accounting: Accounting,
    trace: Option<TraceLog>,
    exempt: ExemptList,
    pub(crate) summary_printed: bool,
}

impl MemoryContext<SystemAllocator> {
    /// Context over the C library allocator.
    pub fn system() -> Self {
        Self::new(SystemAllocator)
    }
}

impl<A: RawAllocator> MemoryContext<A> {
    /// Context over `raw`, with every feature off and tracking not started.
    pub fn new(raw: A) -> Self {
        Self {
            raw,
            settings: Settings::default(),
            flags: Flags::default(),
            started: false,
            directory: Directory::new(),
            accounting: Accounting::default(),
            trace: None,
            exempt: ExemptList::default(),
            summary_printed: false,
        }
    }

    /// Wrap in a [`SharedContext`].
    pub fn into_shared(self) -> SharedContext<A> {
        Rc::new(RefCell::new(self))
    }

    // ---- setup ----------------------------------------------------------

    /// Enable statistics (implies tracking).
    pub fn set_stat(&mut self) -> Result<(), ConfigWarning> {
        self.configure(|settings| {
            settings.set_stat();
            Ok(())
        })
    }

    /// Enable tracking.
    pub fn set_track(&mut self) -> Result<(), ConfigWarning> {
        self.configure(|settings| {
            settings.set_track();
            Ok(())
        })
    }

    /// Enable tracing into the file at `path`. If the file cannot be
    /// created, tracing stays off and the failure is returned.
    pub fn set_trace(&mut self, path: &Path) -> Result<(), ConfigWarning> {
        self.configure(|settings| match TraceLog::create(path) {
            Ok(log) => settings.set_trace(log),
            Err(source) => {
                settings.request_trace()?;
                Err(ConfigWarning::TraceLogOpen {
                    path: path.to_path_buf(),
                    source,
                })
            }
        })
    }

    /// Enable tracing into an arbitrary writer.
    pub fn set_trace_writer(&mut self, sink: Box<dyn Write>) -> Result<(), ConfigWarning> {
        self.configure(|settings| settings.set_trace(TraceLog::new(sink)))
    }

    /// Only trace calls of at least `bytes`.
    pub fn set_trace_threshold(&mut self, bytes: usize) -> Result<(), ConfigWarning> {
        self.configure(|settings| settings.set_trace_threshold(bytes))
    }

    /// Fail once more than `bytes` are live. 0 means unlimited. Enables
    /// statistics.
    pub fn set_byte_limit(&mut self, bytes: usize) -> Result<(), ConfigWarning> {
        self.configure(|settings| settings.set_byte_limit(bytes))
    }

    fn configure<F>(&mut self, apply: F) -> Result<(), ConfigWarning>
    where
        F: FnOnce(&mut Settings) -> Result<(), ConfigWarning>,
    {
        if self.started {
            warn!("memory setting changed after tracking started; ignored");
            return Err(ConfigWarning::TrackingStarted);
        }
        apply(&mut self.settings).inspect_err(|warning| warn!(%warning, "memory setting"))
    }

    /// Latch the settings into active flags. Only the first call has an
    /// effect.
    pub fn start_tracking(&mut self) {
        if self.started {
            debug!("start_tracking called twice; ignored");
            return;
        }
        let (flags, trace) = self.settings.latch();
        self.flags = flags;
        self.trace = trace;
        self.accounting = Accounting::new(flags.byte_limit);
        self.init_table();
        self.started = true;
        debug!(?flags, "memory tracking started");
    }

    /// Has [`Self::start_tracking`] run?
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Active flags (all off before tracking starts).
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Empty the directory.
    pub fn init_table(&mut self) {
        self.directory.clear();
    }

    /// Zero the live and peak counters.
    pub fn reset_stats(&mut self) {
        self.accounting.reset();
    }

    // ---- facade ---------------------------------------------------------

    /// Allocate `count * size` uninitialized bytes.
    pub fn allocate(
        &mut self,
        count: usize,
        size: usize,
        tag: &str,
    ) -> Result<NonNull<u8>, MemoryError> {
        let bytes = checked_bytes(count, size, tag)?;
        let ptr = confirm(self.raw.allocate(bytes), tag)?;
        self.record_new(CallKind::Malloc, ptr, count, size, tag)?;
        Ok(ptr)
    }

    /// Allocate `count * size` zeroed bytes.
    pub fn allocate_zeroed(
        &mut self,
        count: usize,
        size: usize,
        tag: &str,
    ) -> Result<NonNull<u8>, MemoryError> {
        checked_bytes(count, size, tag)?;
        let ptr = confirm(self.raw.allocate_zeroed(count, size), tag)?;
        self.record_new(CallKind::Calloc, ptr, count, size, tag)?;
        Ok(ptr)
    }

    fn record_new(
        &mut self,
        kind: CallKind,
        ptr: NonNull<u8>,
        count: usize,
        size: usize,
        tag: &str,
    ) -> Result<(), MemoryError> {
        let address = ptr.as_ptr() as usize;
        self.trace_call(kind, count, size, tag, address, None);
        if self.flags.track {
            // Account first: a breached ceiling leaves the block unlisted.
            if self.flags.stat {
                self.accounting.increase(count * size)?;
            }
            self.directory.install(address, count, size, tag);
        }
        Ok(())
    }

    /// Resize `ptr` to `count * size` bytes.
    ///
    /// A zero-byte request releases `ptr` and returns `None`. A `None` input
    /// allocates. With tracking on, a non-null `ptr` must be tracked or on the
    /// [`ExemptList`].
    ///
    /// # Safety
    ///
    /// `ptr` must be `None` or a live block obtained from this context (or
    /// from the same raw allocator, if exempt). On success the old block must
    /// no longer be used.
    pub unsafe fn resize(
        &mut self,
        ptr: Option<NonNull<u8>>,
        count: usize,
        size: usize,
        tag: &str,
    ) -> Result<Option<NonNull<u8>>, MemoryError> {
        let bytes = checked_bytes(count, size, tag)?;
        if bytes == 0 {
            if let Some(ptr) = ptr {
                // SAFETY: forwarded from the caller.
                unsafe { self.release(ptr)? };
            }
            return Ok(None);
        }

        let old_address = ptr.map(|p| p.as_ptr() as usize);
        let mut entry = None;
        if self.flags.track {
            if let Some(address) = old_address {
                entry = self.directory.lookup_id(address);
                if entry.is_none() && !self.exempt.contains(address) {
                    return Err(MemoryError::UntrackedResize {
                        tag: tag.to_owned(),
                        address,
                    });
                }
            }
        }

        let raw_in = ptr.map_or(ptr::null_mut(), NonNull::as_ptr);
        // SAFETY: forwarded from the caller.
        let moved = confirm(unsafe { self.raw.resize(raw_in, bytes) }, tag)?;
        let new_address = moved.as_ptr() as usize;

        if let Some(address) = old_address {
            self.exempt.follow(address, new_address);
        }
        self.trace_call(
            CallKind::Realloc,
            count,
            size,
            tag,
            old_address.unwrap_or(0),
            Some(new_address),
        );

        if self.flags.track {
            match (old_address, entry) {
                (Some(address), Some(id)) => {
                    if self.flags.stat {
                        let old_bytes = self.directory.get(id).map_or(0, Record::bytes);
                        self.accounting.decrease(old_bytes);
                    }
                    self.directory
                        .relocate(id, address, new_address, count, size)?;
                    if self.flags.stat {
                        self.accounting.increase(bytes)?;
                    }
                }
                (None, _) => {
                    if self.flags.stat {
                        self.accounting.increase(bytes)?;
                    }
                    self.directory.install(new_address, count, size, tag);
                }
                // Exempt block: stays untracked.
                (Some(_), None) => {}
            }
        }
        Ok(Some(moved))
    }

    /// Release `ptr`.
    ///
    /// With tracking on, an untracked address fails with
    /// [`MemoryError::UntrackedAddress`] and the block is not freed.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live block obtained from this context.
    pub unsafe fn release(&mut self, ptr: NonNull<u8>) -> Result<(), MemoryError> {
        let address = ptr.as_ptr() as usize;
        if self.flags.track {
            let record = self.directory.remove(address)?;
            if self.flags.stat {
                self.accounting.decrease(record.bytes());
            }
        }
        // SAFETY: forwarded from the caller.
        unsafe { self.raw.release(ptr.as_ptr()) };
        Ok(())
    }

    fn trace_call(
        &mut self,
        kind: CallKind,
        count: usize,
        size: usize,
        tag: &str,
        address: usize,
        new_address: Option<usize>,
    ) {
        if !self.flags.trace {
            return;
        }
        if let Some(log) = self.trace.as_mut() {
            if let Err(err) = log.log_call(kind, count, size, tag, address, new_address) {
                warn!(%err, "failed to write memory trace line");
            }
        }
    }

    // ---- queries --------------------------------------------------------

    /// Record for a tracked address.
    pub fn lookup(&self, address: usize) -> Option<&Record> {
        self.directory.lookup(address)
    }

    /// The allocation directory.
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Live/peak counters.
    pub fn accounting(&self) -> &Accounting {
        &self.accounting
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> MemStats {
        MemStats {
            total_bytes: self.accounting.total(),
            peak_bytes: self.accounting.peak(),
            live_allocations: self.directory.len(),
            limit: self.accounting.limit(),
        }
    }

    /// Addresses `resize` accepts while untracked.
    pub fn exempt(&mut self) -> &mut ExemptList {
        &mut self.exempt
    }

    /// The raw allocator, for collaborators that allocate outside the facade.
    pub fn raw_mut(&mut self) -> &mut A {
        &mut self.raw
    }

    /// Flush the trace log.
    pub fn flush_trace(&mut self) -> std::io::Result<()> {
        match self.trace.as_mut() {
            Some(log) => log.flush(),
            None => Ok(()),
        }
    }
}

fn checked_bytes(count: usize, size: usize, tag: &str) -> Result<usize, MemoryError> {
    count
        .checked_mul(size)
        .ok_or_else(|| MemoryError::SizeOverflow {
            tag: tag.to_owned(),
            count,
            size,
        })
}

fn confirm(ptr: *mut u8, tag: &str) -> Result<NonNull<u8>, MemoryError> {
    NonNull::new(ptr).ok_or_else(|| MemoryError::OutOfMemory {
        tag: tag.to_owned(),
    })
}
