//! The scan driver.
//!
//! A scan reads every referenced group in parallel, dispatches a region
//! scanner per candidate region over the worker pool, and assembles the
//! survivors into the next snapshot.

use crate::{
    compare::{self, BytesComparer, CompareFn},
    progress_reporter::ProgressReporter,
    read_group::ByteReader,
    region::SnapshotRegion,
    scanner,
    snapshot::Snapshot,
    token::Token,
    ty::{Endianness, Type},
    vector::VECTOR_WIDTH,
    Alignment, Constraint, Error,
};
use rayon::prelude::*;
use std::sync::{
    atomic::{AtomicU8, Ordering},
    mpsc, Arc,
};
use tracing::debug;

/// A sink for scan progress updates.
///
/// `current` and `total` count processed regions; `can_finalize` is set on
/// the final update. Updates arrive from the collector while workers run.
pub trait ScanProgress {
    fn update(&mut self, current: u64, total: u64, can_finalize: bool);
}

impl<F> ScanProgress for F
where
    F: FnMut(u64, u64, bool),
{
    fn update(&mut self, current: u64, total: u64, can_finalize: bool) {
        self(current, total, can_finalize)
    }
}

/// Everything one filter step needs: the element shape and the constraint
/// tree to filter with.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub value_type: Type,
    pub endianness: Endianness,
    pub alignment: Alignment,
    pub constraints: Constraint,
    /// Diagnostic name given to the output snapshot.
    pub name: String,
}

impl ScanRequest {
    pub fn new(value_type: Type, constraints: Constraint) -> Self {
        Self {
            value_type,
            endianness: Endianness::Little,
            alignment: Alignment::Auto,
            constraints,
            name: "Manual Scan".to_string(),
        }
    }

    pub fn with_alignment(self, alignment: Alignment) -> Self {
        Self { alignment, ..self }
    }

    pub fn with_endianness(self, endianness: Endianness) -> Self {
        Self { endianness, ..self }
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self
        }
    }
}

/// Scanner lifecycle states.
///
/// Transitions are linear; `Cancelled` and `Failed` terminate the scan that
/// hit them. A new `scan` call starts a fresh lifecycle from any terminal
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ScanState {
    Idle = 0,
    Reading = 1,
    Scanning = 2,
    Assembling = 3,
    Done = 4,
    Cancelled = 5,
    Failed = 6,
}

impl ScanState {
    fn from_u8(value: u8) -> ScanState {
        match value {
            1 => ScanState::Reading,
            2 => ScanState::Scanning,
            3 => ScanState::Assembling,
            4 => ScanState::Done,
            5 => ScanState::Cancelled,
            6 => ScanState::Failed,
            _ => ScanState::Idle,
        }
    }

    fn in_progress(self) -> bool {
        matches!(
            self,
            ScanState::Reading | ScanState::Scanning | ScanState::Assembling
        )
    }
}

enum Compiled {
    Vector(CompareFn),
    Bytes(BytesComparer),
}

/// Runs filter steps against snapshots. One scan at a time per instance.
pub struct Scanner {
    /// Thread pool this scanner uses.
    thread_pool: Arc<rayon::ThreadPool>,
    state: AtomicU8,
}

impl Scanner {
    /// Construct a new scanner associated with a thread pool.
    pub fn new(thread_pool: &Arc<rayon::ThreadPool>) -> Self {
        Self {
            thread_pool: Arc::clone(thread_pool),
            state: AtomicU8::new(ScanState::Idle as u8),
        }
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ScanState {
        ScanState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Filter the input snapshot by the requested constraints, producing the
    /// survivor snapshot.
    ///
    /// Every read group referenced by the input is re-sampled through
    /// `reader` first; the old current generation becomes the previous one.
    /// Groups that short-read are excluded from relative comparisons but
    /// still scanned by absolute ones. A reader error aborts the whole scan.
    pub fn scan(
        &self,
        input: &Snapshot,
        reader: &dyn ByteReader,
        request: &ScanRequest,
        cancel: &Token,
        progress: impl ScanProgress + Send,
    ) -> Result<Snapshot, Error> {
        self.begin()?;

        match self.run(input, reader, request, cancel, progress) {
            Ok(snapshot) => {
                self.state.store(ScanState::Done as u8, Ordering::SeqCst);
                Ok(snapshot)
            }
            Err(Error::Cancelled) => {
                self.state
                    .store(ScanState::Cancelled as u8, Ordering::SeqCst);
                Err(Error::Cancelled)
            }
            Err(error @ Error::ReadFailed(..)) => {
                self.state.store(ScanState::Failed as u8, Ordering::SeqCst);
                Err(error)
            }
            Err(error) => {
                // validation failed before anything was read
                self.state.store(ScanState::Idle as u8, Ordering::SeqCst);
                Err(error)
            }
        }
    }

    fn begin(&self) -> Result<(), Error> {
        loop {
            let observed = self.state.load(Ordering::SeqCst);

            if ScanState::from_u8(observed).in_progress() {
                return Err(Error::ScanInProgress);
            }

            if self
                .state
                .compare_exchange(
                    observed,
                    ScanState::Reading as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok()
            {
                return Ok(());
            }
        }
    }

    fn run(
        &self,
        input: &Snapshot,
        reader: &dyn ByteReader,
        request: &ScanRequest,
        cancel: &Token,
        progress: impl ScanProgress + Send,
    ) -> Result<Snapshot, Error> {
        let ty = request.value_type;

        if input.is_empty() {
            return Err(Error::InvalidArguments("empty input snapshot".to_string()));
        }

        request.constraints.validate(ty)?;

        let relative = request.constraints.is_relative();

        if relative && !input.read_groups().iter().any(|group| group.has_current()) {
            return Err(Error::InvalidArguments(
                "relative constraints need a previous generation".to_string(),
            ));
        }

        let element_size = ty.size();
        let stride = request.alignment.resolve(ty);

        // Compile the compare action before anything is read; unsupported
        // combinations must fail without touching the target.
        let compiled = match ty {
            Type::Bytes(len) => Compiled::Bytes(compare::compile_bytes(&request.constraints, len)?),
            _ => Compiled::Vector(compare::compile(&request.constraints, ty, request.endianness)?),
        };

        if cancel.is_set() {
            return Err(Error::Cancelled);
        }

        debug!(
            name = %request.name,
            regions = input.region_count(),
            bytes = input.byte_count(),
            "starting scan"
        );

        self.thread_pool.install(|| {
            input.read_groups().par_iter().try_for_each(|group| {
                if cancel.is_set() {
                    return Err(Error::Cancelled);
                }

                group.read_all(reader)?;
                group.resize_for_safe_reading(VECTOR_WIDTH);
                Ok(())
            })
        })?;

        if cancel.is_set() {
            return Err(Error::Cancelled);
        }

        self.state
            .store(ScanState::Scanning as u8, Ordering::SeqCst);

        // Largest regions first so stragglers don't serialize the pool.
        let mut order: Vec<&SnapshotRegion> = input.regions().iter().collect();
        order.sort_by(|a, b| b.region_size().cmp(&a.region_size()));

        let total = order.len();
        let compiled = &compiled;
        let mut survivors: Vec<SnapshotRegion> = Vec::new();

        self.thread_pool.install(|| {
            rayon::scope(|s| {
                let (tx, rx) = mpsc::sync_channel(1024);

                for region in order {
                    let tx = tx.clone();

                    s.spawn(move |_| {
                        let result = if cancel.is_set() {
                            Vec::new()
                        } else {
                            match compiled {
                                Compiled::Vector(compare) => scanner::scan_region(
                                    region,
                                    compare,
                                    element_size,
                                    stride,
                                    relative,
                                    cancel,
                                ),
                                Compiled::Bytes(comparer) => scanner::scan_region_bytes(
                                    region,
                                    comparer,
                                    element_size,
                                    stride,
                                    relative,
                                    cancel,
                                ),
                            }
                        };

                        tx.send(result).expect("channel closed");
                    });
                }

                drop(tx);

                let mut reporter = ProgressReporter::new(progress, total);

                while !reporter.is_done() {
                    let mut result = rx.recv().expect("channel closed");
                    survivors.append(&mut result);
                    reporter.tick();
                }
            })
        });

        if cancel.is_set() {
            return Err(Error::Cancelled);
        }

        self.state
            .store(ScanState::Assembling as u8, Ordering::SeqCst);

        // Every scanner emits in ascending address order, so a stable sort
        // restores the global order regardless of worker interleaving.
        survivors.sort_by_key(|region| region.base_address());

        let mut output = Snapshot::from_regions(request.name.clone(), request.alignment, survivors);
        output.rebuild(ty);

        debug!(
            regions = output.region_count(),
            elements = output.element_count(),
            "scan complete"
        );

        Ok(output)
    }
}
