//! Extraction jobs and the concurrent job runner

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

use super::fs::HarvestFs;
use crate::error::{Error, Result};
use crate::ingestion::DocumentExtractor;
use crate::types::{Fragment, Harvest};

/// Where a job reads its document from
#[derive(Clone)]
enum JobSource {
    File { fs: Arc<dyn HarvestFs>, path: PathBuf },
    Bytes(Arc<[u8]>),
}

/// A single document to harvest
#[derive(Clone)]
pub struct Job {
    /// URI stamped onto the resulting fragment
    pub uri: String,
    source: JobSource,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match &self.source {
            JobSource::File { path, .. } => path.display().to_string(),
            JobSource::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
        };
        f.debug_struct("Job")
            .field("uri", &self.uri)
            .field("source", &source)
            .finish()
    }
}

/// Outcome of a single job, delivered to the collection point
#[derive(Debug)]
pub struct JobOutcome {
    pub index: usize,
    pub uri: String,
    pub result: Result<Fragment>,
}

impl Job {
    /// Job reading `path` from `fs` when it runs
    pub fn from_file(
        fs: Arc<dyn HarvestFs>,
        path: impl Into<PathBuf>,
        uri: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            source: JobSource::File {
                fs,
                path: path.into(),
            },
        }
    }

    /// Job over an in-memory document
    pub fn from_bytes(bytes: impl Into<Vec<u8>>, uri: impl Into<String>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        Self {
            uri: uri.into(),
            source: JobSource::Bytes(bytes.into()),
        }
    }

    async fn read(&self) -> Result<Arc<[u8]>> {
        match &self.source {
            JobSource::File { fs, path } => Ok(fs.read(path).await?.into()),
            JobSource::Bytes(bytes) => Ok(Arc::clone(bytes)),
        }
    }

    /// Read and extract the document, stamping `index` as the fragment id
    pub async fn run(&self, index: usize) -> Result<Fragment> {
        let content = self.read().await?;

        // parsing and tree rewriting are CPU bound
        let extraction =
            tokio::task::spawn_blocking(move || DocumentExtractor::extract(&content)).await??;

        if extraction.skipped > 0 {
            tracing::debug!(
                "{}: skipped {} malformed formula(e)",
                self.uri,
                extraction.skipped
            );
        }

        Ok(extraction.fragment.with_identity(index.to_string(), self.uri.clone()))
    }

    /// Run the job and deliver its outcome to `outcomes`
    pub async fn dispatch(self, index: usize, outcomes: mpsc::UnboundedSender<JobOutcome>) {
        tracing::debug!("[fragment] [start] {}", self.uri);

        let result = self.run(index).await;
        match &result {
            Ok(fragment) => tracing::info!(
                "[fragment] [ok] [{} formula(e)] {}",
                fragment.formulae.len(),
                self.uri
            ),
            Err(e) => tracing::warn!("[fragment] [failed: {}] {}", e, self.uri),
        }

        // the receiver only goes away once every sender is dropped
        let _ = outcomes.send(JobOutcome {
            index,
            uri: self.uri,
            result,
        });
    }
}

/// Result of running a batch of jobs
#[derive(Debug, Default)]
pub struct BatchResult {
    /// Successful fragments, sorted by URI
    pub harvest: Harvest,
    /// Number of jobs that failed
    pub failed: usize,
}

/// Runs jobs concurrently and merges their fragments into a harvest
#[derive(Debug, Clone, Default)]
pub struct JobRunner {
    limiter: Option<Arc<Semaphore>>,
}

impl JobRunner {
    /// Runner with no bound on concurrently running jobs
    pub fn unbounded() -> Self {
        Self { limiter: None }
    }

    /// Runner allowing at most `max_jobs` jobs to run at once
    pub fn bounded(max_jobs: usize) -> Self {
        Self {
            limiter: Some(Arc::new(Semaphore::new(max_jobs.max(1)))),
        }
    }

    /// Runner from an optional bound
    pub fn with_limit(max_jobs: Option<usize>) -> Self {
        max_jobs.map_or_else(Self::unbounded, Self::bounded)
    }

    /// Run every job in its own task, each stamped with its position in `jobs`
    pub async fn run_all(&self, jobs: Vec<Job>) -> BatchResult {
        let total = jobs.len();
        let (sender, mut receiver) = mpsc::unbounded_channel();

        for (index, job) in jobs.into_iter().enumerate() {
            let sender = sender.clone();
            let limiter = self.limiter.clone();

            tokio::spawn(async move {
                let _permit = match limiter {
                    Some(sem) => match sem.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(e) => {
                            let _ = sender.send(JobOutcome {
                                index,
                                uri: job.uri,
                                result: Err(Error::internal(format!("job limiter closed: {}", e))),
                            });
                            return;
                        }
                    },
                    None => None,
                };
                job.dispatch(index, sender).await;
            });
        }
        drop(sender);

        let mut fragments = Vec::with_capacity(total);
        let mut failed = 0;
        while let Some(outcome) = receiver.recv().await {
            match outcome.result {
                Ok(fragment) => fragments.push(fragment),
                Err(e) => {
                    tracing::debug!("Dropping job {} ({}): {}", outcome.index, outcome.uri, e);
                    failed += 1;
                }
            }
        }

        // a panicked job never reports back
        failed += total - fragments.len() - failed;

        BatchResult {
            harvest: Harvest::new(fragments),
            failed,
        }
    }
}

/// Harvest a single in-memory document; the fragment gets id `"1"`
pub async fn harvest_document(
    bytes: impl Into<Vec<u8>>,
    uri: impl Into<String>,
) -> Result<Harvest> {
    let fragment = Job::from_bytes(bytes, uri).run(1).await?;
    Ok(Harvest::from(fragment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::fs::MemoryFs;

    const DOC_A: &str = r#"<html><body>A <math xmlns="http://www.w3.org/1998/Math/MathML" id="a1"><semantics><mi>a</mi><annotation-xml encoding="MathML-Content"><ci>a</ci></annotation-xml></semantics></math></body></html>"#;
    const DOC_B: &str = r#"<html><body>B text</body></html>"#;

    #[tokio::test]
    async fn test_job_stamps_index_and_uri() {
        let job = Job::from_bytes(DOC_A, "http://example.org/a.xhtml");
        let fragment = job.run(7).await.unwrap();

        assert_eq!(fragment.id, "7");
        assert_eq!(fragment.uri, "http://example.org/a.xhtml");
        assert_eq!(fragment.xhtml_content, "A matha1");
        assert_eq!(fragment.formulae.len(), 1);
    }

    #[tokio::test]
    async fn test_job_from_file() {
        let fs: Arc<dyn HarvestFs> = Arc::new(MemoryFs::new().with_file("dir/a.xhtml", DOC_A));
        let fragment = Job::from_file(fs, "dir/a.xhtml", "a").run(0).await.unwrap();

        assert_eq!(fragment.formulae[0].id, "a1");
    }

    #[tokio::test]
    async fn test_unreadable_job_fails() {
        let fs: Arc<dyn HarvestFs> =
            Arc::new(MemoryFs::new().with_unreadable_file("locked.xhtml"));
        let result = Job::from_file(fs, "locked.xhtml", "locked").run(0).await;

        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_all_sorts_and_drops_failures() {
        let jobs = vec![
            Job::from_bytes(DOC_B, "b.xhtml"),
            Job::from_bytes("<html><unclosed></html>", "broken.xhtml"),
            Job::from_bytes(DOC_A, "a.xhtml"),
        ];

        let batch = JobRunner::unbounded().run_all(jobs).await;

        assert_eq!(batch.failed, 1);
        let uris: Vec<_> = batch.harvest.iter().map(|f| f.uri.as_str()).collect();
        assert_eq!(uris, vec!["a.xhtml", "b.xhtml"]);
        // ids follow job positions, not completion order
        assert_eq!(batch.harvest[0].id, "2");
        assert_eq!(batch.harvest[1].id, "0");
    }

    #[tokio::test]
    async fn test_bounded_runner() {
        let jobs: Vec<_> = (0..10)
            .map(|n| Job::from_bytes(DOC_B, format!("doc{:02}.xhtml", n)))
            .collect();

        let batch = JobRunner::bounded(2).run_all(jobs).await;

        assert_eq!(batch.failed, 0);
        assert_eq!(batch.harvest.len(), 10);
        assert_eq!(batch.harvest[0].uri, "doc00.xhtml");
        assert_eq!(batch.harvest[9].uri, "doc09.xhtml");
    }

    #[tokio::test]
    async fn test_run_all_empty() {
        let batch = JobRunner::unbounded().run_all(Vec::new()).await;
        assert!(batch.harvest.is_empty());
        assert_eq!(batch.failed, 0);
    }

    #[tokio::test]
    async fn test_harvest_document() {
        let harvest = harvest_document(DOC_A, "single.xhtml").await.unwrap();

        assert_eq!(harvest.len(), 1);
        assert_eq!(harvest[0].id, "1");
        assert_eq!(harvest[0].uri, "single.xhtml");
        assert!(harvest_document("<broken", "x").await.is_err());
    }
}
