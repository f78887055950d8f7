use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::feed::FeedRecord;
use crate::report::RunStatistics;

use super::fetcher::CrlFetcher;
use super::types::{FetchOutcome, FetchTask};

/// Counts for one update phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub scheduled: usize,
    pub downloaded: usize,
    pub not_modified: usize,
    pub failed: usize,
    pub bytes: u64,
}

/// Refreshes the cache for a batch of feed records with a bounded number of
/// concurrent downloads
#[derive(Debug, Clone)]
pub struct CrlUpdater {
    fetcher: Arc<CrlFetcher>,
    concurrency: usize,
    stats: Arc<RunStatistics>,
}

impl CrlUpdater {
    pub fn new(fetcher: CrlFetcher, concurrency: usize, stats: Arc<RunStatistics>) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            concurrency: concurrency.max(1),
            stats,
        }
    }

    /// Expand records into fetch tasks. Later tasks writing to a destination
    /// already claimed are dropped.
    pub fn plan<'a>(&self, records: impl IntoIterator<Item = &'a FeedRecord>) -> Vec<FetchTask> {
        let layout = self.fetcher.layout();
        let mut seen = HashSet::new();
        let mut tasks = Vec::new();

        for record in records {
            for url in record.crl_urls() {
                let dest = layout.destination(record, url);
                if seen.insert(dest.clone()) {
                    tasks.push(FetchTask {
                        url: url.to_string(),
                        dest,
                    });
                } else {
                    debug!("Skipping {}: {} already scheduled", url, dest.display());
                }
            }
        }
        tasks
    }

    pub async fn run(&self, records: &[FeedRecord]) -> FetchSummary {
        let tasks = self.plan(records);
        self.run_tasks(tasks).await
    }

    pub async fn run_tasks(&self, tasks: Vec<FetchTask>) -> FetchSummary {
        let mut summary = FetchSummary {
            scheduled: tasks.len(),
            ..Default::default()
        };
        info!(
            "Fetching {} CRLs with up to {} concurrent downloads",
            tasks.len(),
            self.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set = JoinSet::new();

        for task in tasks {
            let fetcher = Arc::clone(&self.fetcher);
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                // the semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                let result = fetcher.fetch(&task.url, &task.dest).await;
                (task, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            let (task, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    error!("Fetch task failed to complete: {}", e);
                    summary.failed += 1;
                    self.stats.record_fetch_failure();
                    continue;
                }
            };

            match result {
                Ok(FetchOutcome::Downloaded { bytes }) => {
                    summary.downloaded += 1;
                    summary.bytes += bytes;
                    self.stats.record_download(bytes);
                }
                Ok(FetchOutcome::NotModified) => {
                    summary.not_modified += 1;
                    self.stats.record_not_modified();
                }
                Err(e) => {
                    warn!("Failed to fetch {}: {}", task.url, e);
                    summary.failed += 1;
                    self.stats.record_fetch_failure();
                }
            }
        }

        info!(
            "Fetch finished: {} downloaded, {} not modified, {} failed",
            summary.downloaded, summary.not_modified, summary.failed
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pki::crl::store::CacheLayout;
    use std::time::Duration;

    fn record(org: &str, cn: &str, urls: &[&str]) -> FeedRecord {
        FeedRecord {
            issuer: format!("CN=Root, O={org}"),
            subject: format!("CN={cn}, O={org}"),
            organization: org.to_string(),
            common_name: cn.to_string(),
            full_crl_url: urls.first().map(|u| u.to_string()),
            partitioned_crl_urls: urls.iter().skip(1).map(|u| u.to_string()).collect(),
        }
    }

    fn updater(root: &std::path::Path) -> CrlUpdater {
        let fetcher =
            CrlFetcher::new(CacheLayout::new(root), Duration::from_secs(1), 1024).unwrap();
        CrlUpdater::new(fetcher, 4, Arc::new(RunStatistics::new()))
    }

    #[test]
    fn test_plan_drops_duplicate_destinations() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            record(
                "Org",
                "CA",
                &["http://a.example.com/ca.crl", "http://b.example.com/1.crl"],
            ),
            // same file name from another host lands on the same path
            record("Org", "CA", &["http://mirror.example.com/ca.crl"]),
            record("Other", "CA", &["http://a.example.com/ca.crl"]),
        ];

        let tasks = updater(dir.path()).plan(&records);
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].url, "http://a.example.com/ca.crl");
        assert_eq!(tasks[1].url, "http://b.example.com/1.crl");
        assert_eq!(tasks[2].dest, dir.path().join("Other").join("CA").join("ca.crl"));
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let updater = updater(dir.path());
        let tasks = vec![
            FetchTask {
                url: "ldap://ldap.example.com/cn=CA".to_string(),
                dest: dir.path().join("a.crl"),
            },
            FetchTask {
                url: "not a url".to_string(),
                dest: dir.path().join("b.crl"),
            },
        ];

        let summary = updater.run_tasks(tasks).await;
        assert_eq!(summary.scheduled, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(updater.stats.summary().fetch_failures, 2);
    }
}
