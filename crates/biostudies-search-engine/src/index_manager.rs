//! Multi-index manager
//!
//! Owns the four coordinated indices (SUBMISSION, FILES, PAGE_TAB, EFO):
//! per-index directory, writer, manually-reloaded reader, and a background
//! reopen worker that keeps searchers within a bounded staleness window.
//! Searchers are handed out as RAII leases so every acquire has a matching
//! release on every exit path.

use std::ops::Deref;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, Searcher};
use tracing::{debug, info, warn};

use crate::analyzers::{AnalyzerDispatch, register_analyzers};
use crate::error::{SearchError, SearchResult};
use crate::registry::CollectionRegistry;
use crate::schema::{EfoSchema, FilesSchema, PageTabSchema, SubmissionSchema};

/// Reopen workers will not reload more often than this.
pub const MIN_STALENESS: Duration = Duration::from_millis(100);

/// Reopen workers reload at least this often.
pub const MAX_STALENESS: Duration = Duration::from_secs(5);

/// Per-writer heap budget.
const WRITER_HEAP_BYTES: usize = 50_000_000;

// ── Index identifiers ────────────────────────────────────────────────────────

/// The four logical indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexName {
    Submission,
    Files,
    PageTab,
    Efo,
}

impl IndexName {
    pub const ALL: [Self; 4] = [Self::Submission, Self::Files, Self::PageTab, Self::Efo];

    /// The three indices committed together on submission writes.
    pub const SUBMISSION_RELATED: [Self; 3] = [Self::Submission, Self::Files, Self::PageTab];

    /// Directory name under the index base dir.
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Submission => "submission",
            Self::Files => "files",
            Self::PageTab => "page_tab",
            Self::Efo => "efo",
        }
    }

    const fn slot(self) -> usize {
        match self {
            Self::Submission => 0,
            Self::Files => 1,
            Self::PageTab => 2,
            Self::Efo => 3,
        }
    }
}

// ── Field handles for all four indices ───────────────────────────────────────

/// Schemas and field handles, built once at open.
#[derive(Debug, Clone)]
pub struct IndexSchemas {
    pub submission: SubmissionSchema,
    pub files: FilesSchema,
    pub page_tab: PageTabSchema,
    pub efo: EfoSchema,
}

// ── Searcher lease ───────────────────────────────────────────────────────────

/// Ref-counted searcher handle. Dropping the lease is the release; a
/// dropped lease must not be used again (the borrow checker enforces it).
pub struct SearcherLease {
    searcher: Searcher,
    outstanding: Arc<AtomicI64>,
}

impl Deref for SearcherLease {
    type Target = Searcher;

    fn deref(&self) -> &Searcher {
        &self.searcher
    }
}

impl Drop for SearcherLease {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
    }
}

// ── Managed index ────────────────────────────────────────────────────────────

struct ReopenWorker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ReopenWorker {
    fn spawn(name: IndexName, reader: IndexReader, staleness: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let target = staleness.clamp(MIN_STALENESS, MAX_STALENESS);
        let handle = std::thread::Builder::new()
            .name(format!("reopen-{}", name.dir_name()))
            .spawn(move || {
                let mut last_reload = Instant::now();
                while !stop_flag.load(Ordering::Relaxed) {
                    std::thread::sleep(MIN_STALENESS);
                    if last_reload.elapsed() < target {
                        continue;
                    }
                    if let Err(e) = reader.reload() {
                        warn!(index = name.dir_name(), error = %e, "reader reload failed");
                    }
                    last_reload = Instant::now();
                }
            })
            .expect("spawn reopen worker");
        Self {
            stop,
            handle: Some(handle),
        }
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ReopenWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ManagedIndex {
    name: IndexName,
    index: Index,
    writer: RwLock<IndexWriter>,
    reader: IndexReader,
    outstanding: Arc<AtomicI64>,
    reopen: Option<ReopenWorker>,
}

impl ManagedIndex {
    fn open(
        name: IndexName,
        base_dir: &Path,
        schema: tantivy::schema::Schema,
        stopwords: &[String],
        spawn_reopen: bool,
    ) -> SearchResult<Self> {
        let path = base_dir.join(name.dir_name());
        let open_err = |source: tantivy::TantivyError| SearchError::FailedToOpenIndex {
            index: name,
            path: path.display().to_string(),
            source,
        };

        let index = if path.join("meta.json").exists() {
            Index::open_in_dir(&path).map_err(open_err)?
        } else {
            std::fs::create_dir_all(&path)?;
            Index::create_in_dir(&path, schema).map_err(open_err)?
        };
        register_analyzers(&index, stopwords);

        let writer: IndexWriter = index.writer(WRITER_HEAP_BYTES).map_err(open_err)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(open_err)?;

        let reopen =
            spawn_reopen.then(|| ReopenWorker::spawn(name, reader.clone(), MAX_STALENESS));

        info!(index = name.dir_name(), path = %path.display(), "index opened");
        Ok(Self {
            name,
            index,
            writer: RwLock::new(writer),
            reader,
            outstanding: Arc::new(AtomicI64::new(0)),
            reopen,
        })
    }
}

// ── Index manager ────────────────────────────────────────────────────────────

/// Owner of all four indices and their workers.
pub struct IndexManager {
    indices: [ManagedIndex; 4],
    schemas: IndexSchemas,
}

impl IndexManager {
    /// Open (or create) all four indices under a base directory.
    ///
    /// # Errors
    ///
    /// Directory or index-open failures are fatal for the named index and
    /// abort the whole open.
    pub fn open(
        base_dir: &Path,
        registry: &CollectionRegistry,
        dispatch: &AnalyzerDispatch,
        stopwords: &[String],
    ) -> SearchResult<Self> {
        Self::open_inner(base_dir, registry, dispatch, stopwords, true)
    }

    /// Open without reopen workers; commits become visible only through
    /// [`IndexManager::refresh_all`]. Used by tests for determinism.
    pub fn open_without_reopen(
        base_dir: &Path,
        registry: &CollectionRegistry,
        dispatch: &AnalyzerDispatch,
        stopwords: &[String],
    ) -> SearchResult<Self> {
        Self::open_inner(base_dir, registry, dispatch, stopwords, false)
    }

    fn open_inner(
        base_dir: &Path,
        registry: &CollectionRegistry,
        dispatch: &AnalyzerDispatch,
        stopwords: &[String],
        spawn_reopen: bool,
    ) -> SearchResult<Self> {
        let submission = SubmissionSchema::build(registry, dispatch);
        let (files_schema, files) = FilesSchema::build();
        let (page_tab_schema, page_tab) = PageTabSchema::build();
        let (efo_schema, efo) = EfoSchema::build();

        let indices = [
            ManagedIndex::open(
                IndexName::Submission,
                base_dir,
                submission.schema.clone(),
                stopwords,
                spawn_reopen,
            )?,
            ManagedIndex::open(IndexName::Files, base_dir, files_schema, stopwords, spawn_reopen)?,
            ManagedIndex::open(
                IndexName::PageTab,
                base_dir,
                page_tab_schema,
                stopwords,
                spawn_reopen,
            )?,
            ManagedIndex::open(IndexName::Efo, base_dir, efo_schema, stopwords, spawn_reopen)?,
        ];

        Ok(Self {
            indices,
            schemas: IndexSchemas {
                submission,
                files,
                page_tab,
                efo,
            },
        })
    }

    fn managed(&self, name: IndexName) -> &ManagedIndex {
        &self.indices[name.slot()]
    }

    /// Schemas and field handles.
    #[must_use]
    pub const fn schemas(&self) -> &IndexSchemas {
        &self.schemas
    }

    /// The underlying index, for query parsing and analyzer access.
    #[must_use]
    pub fn index(&self, name: IndexName) -> &Index {
        &self.managed(name).index
    }

    /// Acquire a ref-counted searcher lease. The release happens on drop.
    #[must_use]
    pub fn acquire_searcher(&self, name: IndexName) -> SearcherLease {
        let managed = self.managed(name);
        managed.outstanding.fetch_add(1, Ordering::Relaxed);
        SearcherLease {
            searcher: managed.reader.searcher(),
            outstanding: Arc::clone(&managed.outstanding),
        }
    }

    /// Number of currently outstanding searcher leases (test hook).
    #[must_use]
    pub fn outstanding_leases(&self, name: IndexName) -> i64 {
        self.managed(name).outstanding.load(Ordering::Relaxed)
    }

    /// Shared read access to a writer for document adds and deletes.
    /// Concurrent writes are serialized by the writer itself; commits take
    /// the write half through [`IndexManager::commit`].
    pub fn writer(&self, name: IndexName) -> RwLockReadGuard<'_, IndexWriter> {
        self.managed(name)
            .writer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Commit a single writer.
    pub fn commit(&self, name: IndexName) -> SearchResult<()> {
        let managed = self.managed(name);
        let mut writer = managed
            .writer
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        writer
            .commit()
            .map_err(|source| SearchError::CommitFailed {
                index: name,
                source,
            })?;
        debug!(index = name.dir_name(), "commit");
        Ok(())
    }

    /// Advisory rollback of uncommitted changes on a single writer.
    pub fn rollback(&self, name: IndexName) -> SearchResult<()> {
        let managed = self.managed(name);
        let mut writer = managed
            .writer
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        writer.rollback()?;
        warn!(index = name.dir_name(), "rollback");
        Ok(())
    }

    /// Reload one reader now. Failures are logged and swallowed.
    pub fn refresh(&self, name: IndexName) {
        if let Err(e) = self.managed(name).reader.reload() {
            warn!(index = name.dir_name(), error = %e, "refresh failed");
        }
    }

    /// Best-effort reload of every reader.
    pub fn refresh_all(&self) {
        for name in IndexName::ALL {
            self.refresh(name);
        }
    }

    /// Stop reopen workers, flush writers, release everything.
    /// Reopen workers stop first so no reload races the final commits.
    pub fn close(mut self) -> SearchResult<()> {
        for managed in &mut self.indices {
            if let Some(reopen) = managed.reopen.as_mut() {
                reopen.stop();
            }
        }
        for managed in &self.indices {
            let mut writer = managed
                .writer
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            writer
                .commit()
                .map_err(|source| SearchError::CommitFailed {
                    index: managed.name,
                    source,
                })?;
        }
        info!("all indices closed");
        Ok(())
    }
}
