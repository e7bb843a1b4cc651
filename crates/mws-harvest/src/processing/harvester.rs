//! Recursive directory harvester
//!
//! Every directory is walked in its own task. Accepted files of a directory
//! become one batch of jobs whose fragments are merged into a single harvest
//! and handed to the sink, while subdirectories are walked concurrently.
//! A walk completes only once all of its subdirectories have completed.

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::filter::{display_path, ExtensionFilter, UriMapper};
use super::fs::HarvestFs;
use super::job::{Job, JobRunner};
use crate::output::HarvestSink;

type AcceptFn = Arc<dyn Fn(&Path) -> bool + Send + Sync>;
type UriFn = Arc<dyn Fn(&Path) -> String + Send + Sync>;

/// Counters accumulated during a harvest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    /// Directories listed successfully
    pub directories: usize,
    /// Directories whose listing failed; their subtree is skipped
    pub listing_failures: usize,
    /// Harvests accepted by the sink
    pub harvests_written: usize,
    /// Harvests the sink rejected
    pub sink_failures: usize,
    /// Fragments across written harvests
    pub fragments: usize,
    /// Formulae across written harvests
    pub formulae: usize,
    /// Documents whose job failed
    pub failed_documents: usize,
}

impl HarvestSummary {
    /// True when nothing failed along the way
    pub fn is_clean(&self) -> bool {
        self.listing_failures == 0 && self.sink_failures == 0 && self.failed_documents == 0
    }
}

impl fmt::Display for HarvestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} director(ies), {} harvest(s), {} fragment(s), {} formula(e); \
             failures: {} listing, {} document, {} sink",
            self.directories,
            self.harvests_written,
            self.fragments,
            self.formulae,
            self.listing_failures,
            self.failed_documents,
            self.sink_failures,
        )
    }
}

#[derive(Debug, Default)]
struct HarvestStats {
    directories: AtomicUsize,
    listing_failures: AtomicUsize,
    harvests_written: AtomicUsize,
    sink_failures: AtomicUsize,
    fragments: AtomicUsize,
    formulae: AtomicUsize,
    failed_documents: AtomicUsize,
}

impl HarvestStats {
    fn add(counter: &AtomicUsize, n: usize) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    fn snapshot(&self) -> HarvestSummary {
        HarvestSummary {
            directories: self.directories.load(Ordering::Relaxed),
            listing_failures: self.listing_failures.load(Ordering::Relaxed),
            harvests_written: self.harvests_written.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            fragments: self.fragments.load(Ordering::Relaxed),
            formulae: self.formulae.load(Ordering::Relaxed),
            failed_documents: self.failed_documents.load(Ordering::Relaxed),
        }
    }
}

/// Walks a [`HarvestFs`] and emits one harvest per directory with accepted files
#[derive(Clone)]
pub struct DirectoryHarvester {
    fs: Arc<dyn HarvestFs>,
    sink: Arc<dyn HarvestSink>,
    accept: AcceptFn,
    uri: UriFn,
    runner: JobRunner,
}

impl fmt::Debug for DirectoryHarvester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryHarvester")
            .field("runner", &self.runner)
            .finish_non_exhaustive()
    }
}

impl DirectoryHarvester {
    /// Harvester accepting the default extensions and using relative paths as URIs
    pub fn new(fs: Arc<dyn HarvestFs>, sink: Arc<dyn HarvestSink>) -> Self {
        let filter = ExtensionFilter::default();
        let mapper = UriMapper::relative();
        Self {
            fs,
            sink,
            accept: Arc::new(move |path| filter.accepts(path)),
            uri: Arc::new(move |path| mapper.map(path)),
            runner: JobRunner::unbounded(),
        }
    }

    /// Only harvest files for which `accept` returns true
    #[must_use]
    pub fn with_filter<F>(mut self, accept: F) -> Self
    where
        F: Fn(&Path) -> bool + Send + Sync + 'static,
    {
        self.accept = Arc::new(accept);
        self
    }

    /// Derive fragment URIs from relative file paths with `uri`
    #[must_use]
    pub fn with_uri_mapper<F>(mut self, uri: F) -> Self
    where
        F: Fn(&Path) -> String + Send + Sync + 'static,
    {
        self.uri = Arc::new(uri);
        self
    }

    /// Run jobs with `runner`; a bounded runner is shared by all directories
    #[must_use]
    pub fn with_runner(mut self, runner: JobRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Harvest the whole filesystem
    pub async fn harvest(&self) -> HarvestSummary {
        self.harvest_from(PathBuf::new()).await
    }

    /// Harvest the subtree at `path`
    pub async fn harvest_from(&self, path: impl Into<PathBuf>) -> HarvestSummary {
        let stats = Arc::new(HarvestStats::default());
        self.clone().walk(path.into(), Arc::clone(&stats)).await;

        let summary = stats.snapshot();
        tracing::info!("Harvest finished: {}", summary);
        summary
    }

    fn walk(self, path: PathBuf, stats: Arc<HarvestStats>) -> BoxFuture<'static, ()> {
        async move {
            let shown = display_path(&path);
            tracing::debug!("[scan    ] [start] {}", shown);

            let entries = match self.fs.read_dir(&path).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::error!("[scan    ] [failed: {}] {}", e, shown);
                    HarvestStats::add(&stats.listing_failures, 1);
                    return;
                }
            };
            HarvestStats::add(&stats.directories, 1);

            let mut branches = Vec::new();
            let mut jobs = Vec::new();
            for entry in entries {
                let child = path.join(&entry.name);
                if entry.is_dir {
                    branches.push(tokio::spawn(
                        self.clone().walk(child, Arc::clone(&stats)),
                    ));
                } else if (self.accept)(&child) {
                    let uri = (self.uri)(&child);
                    jobs.push(Job::from_file(Arc::clone(&self.fs), child, uri));
                }
            }

            tracing::info!("[scan    ] [ok] [{} fragment(s)] {}", jobs.len(), shown);

            if !jobs.is_empty() {
                self.harvest_directory(&path, &shown, jobs, &stats).await;
            }

            for result in join_all(branches).await {
                if let Err(e) = result {
                    tracing::error!("[scan    ] [failed: {}] subdirectory of {}", e, shown);
                }
            }
        }
        .boxed()
    }

    async fn harvest_directory(
        &self,
        path: &Path,
        shown: &str,
        jobs: Vec<Job>,
        stats: &HarvestStats,
    ) {
        tracing::debug!("[harvest ] [start] {}", shown);

        let batch = self.runner.run_all(jobs).await;
        HarvestStats::add(&stats.failed_documents, batch.failed);

        let fragments = batch.harvest.len();
        let formulae = batch.harvest.formula_count();
        tracing::info!("[harvest ] [ok] [{} fragment(s)] {}", fragments, shown);

        // the sink still sees directories whose documents all failed
        match self.sink.write(path, batch.harvest).await {
            Ok(()) => {
                tracing::info!("[writer  ] [ok] {}", shown);
                HarvestStats::add(&stats.harvests_written, 1);
                HarvestStats::add(&stats.fragments, fragments);
                HarvestStats::add(&stats.formulae, formulae);
            }
            Err(e) => {
                tracing::error!("[writer  ] [failed: {}] {}", e, shown);
                HarvestStats::add(&stats.sink_failures, 1);
            }
        }
    }
}
