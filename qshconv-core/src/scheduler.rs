//! Capture discovery and per-instrument file scheduling.
//!
//! Files are handed out in capture-date order, and never more than one file
//! per instrument code at a time, so every instrument's events reach the sink
//! in chronological order no matter how many workers run.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use walkdir::WalkDir;

use crate::domain::capture::CAPTURE_EXTENSION;
use crate::domain::{CaptureFile, DiscoveryError};

// ── Instrument filter ───────────────────────────────────────────────

/// Instrument code filter: an exact code, or a prefix when written `PREFIX*`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum InstrumentFilter {
    #[default]
    Any,
    Exact(String),
    Prefix(String),
}

impl InstrumentFilter {
    pub fn matches(&self, code: &str) -> bool {
        match self {
            InstrumentFilter::Any => true,
            InstrumentFilter::Exact(c) => code == c,
            InstrumentFilter::Prefix(p) => code.starts_with(p.as_str()),
        }
    }
}

impl FromStr for InstrumentFilter {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s.strip_suffix('*') {
            _ if s.is_empty() || s == "*" => InstrumentFilter::Any,
            Some(prefix) => InstrumentFilter::Prefix(prefix.to_string()),
            None => InstrumentFilter::Exact(s.to_string()),
        })
    }
}

impl fmt::Display for InstrumentFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentFilter::Any => f.write_str("*"),
            InstrumentFilter::Exact(c) => f.write_str(c),
            InstrumentFilter::Prefix(p) => write!(f, "{p}*"),
        }
    }
}

// ── Discovery ───────────────────────────────────────────────────────

/// Result of scanning a capture root.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Accepted files, sorted by capture date then path.
    pub files: Vec<CaptureFile>,
    /// Capture files whose names could not be parsed.
    pub rejected: Vec<(PathBuf, DiscoveryError)>,
    /// Valid files dropped by the instrument filter.
    pub filtered_out: usize,
}

/// Recursively find `*.qsh` files under `root`.
///
/// Unparseable names are collected in [`Discovery::rejected`]; only an
/// unreadable root fails the whole scan.
pub fn discover(root: &Path, filter: &InstrumentFilter) -> Result<Discovery, DiscoveryError> {
    fs::read_dir(root).map_err(|source| DiscoveryError::Root {
        root: root.to_path_buf(),
        source,
    })?;

    let mut discovery = Discovery::default();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) if e.depth() == 0 => {
                return Err(DiscoveryError::Walk {
                    root: root.to_path_buf(),
                    source: e,
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_capture(entry.path()) {
            continue;
        }
        match CaptureFile::from_path(entry.path()) {
            Ok(file) if filter.matches(file.instrument_code()) => discovery.files.push(file),
            Ok(_) => discovery.filtered_out += 1,
            Err(e) => discovery.rejected.push((entry.into_path(), e)),
        }
    }

    discovery
        .files
        .sort_by(|a, b| (a.capture_date(), a.path()).cmp(&(b.capture_date(), b.path())));
    tracing::info!(
        root = %root.display(),
        files = discovery.files.len(),
        rejected = discovery.rejected.len(),
        filtered_out = discovery.filtered_out,
        "discovered capture files"
    );
    Ok(discovery)
}

fn is_capture(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(CAPTURE_EXTENSION))
}

// ── Scheduler ───────────────────────────────────────────────────────

/// Result of [`FileScheduler::claim_next`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// Convert this file, then [`release`](FileScheduler::release) it.
    File(CaptureFile),
    /// Every pending file belongs to an instrument in flight; retry shortly.
    Wait,
    /// Nothing left to claim.
    Stop,
}

struct SchedulerState {
    files: Vec<CaptureFile>,
    /// Indices into `files` not yet claimed, in date order.
    pending: Vec<usize>,
    in_flight: HashSet<String>,
}

pub struct FileScheduler {
    state: Mutex<SchedulerState>,
}

impl FileScheduler {
    /// `files` must already be in the order they should be handed out.
    pub fn new(files: Vec<CaptureFile>) -> Self {
        let pending = (0..files.len()).collect();
        Self {
            state: Mutex::new(SchedulerState {
                files,
                pending,
                in_flight: HashSet::new(),
            }),
        }
    }

    pub fn from_discovery(discovery: &Discovery) -> Self {
        Self::new(discovery.files.clone())
    }

    /// Claim the earliest pending file whose instrument is not in flight.
    pub fn claim_next(&self) -> Claim {
        let mut state = self.state.lock();
        if state.pending.is_empty() {
            return Claim::Stop;
        }
        let SchedulerState {
            files,
            pending,
            in_flight,
        } = &mut *state;

        let Some(pos) = pending
            .iter()
            .position(|&i| !in_flight.contains(files[i].instrument_code()))
        else {
            return Claim::Wait;
        };
        let file = files[pending.remove(pos)].clone();
        in_flight.insert(file.instrument_code().to_string());
        Claim::File(file)
    }

    /// Mark `file`'s instrument as no longer in flight.
    pub fn release(&self, file: &CaptureFile) {
        let released = self.state.lock().in_flight.remove(file.instrument_code());
        if !released {
            tracing::warn!(
                code = file.instrument_code(),
                path = %file.path().display(),
                "released a file that was not in flight"
            );
        }
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    pub fn total(&self) -> usize {
        self.state.lock().files.len()
    }
}
