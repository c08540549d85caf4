use crate::config::{ExtractorConfig, ARTICLE_EXTENSIONS, PROGRESS_INTERVAL};
use crate::extractor::ExtractorState;
use crate::stats::{ArticleStatistics, BatchStats, BatchSummary};
use crate::storage::StoragePlan;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub title: String,
    pub wikitext: String,
}

#[derive(Debug)]
pub struct ArticleResult {
    pub title: String,
    pub statistics: ArticleStatistics,
    pub storage: StoragePlan,
}

#[derive(Debug)]
pub struct BatchOutcome {
    /// Successful articles in input order
    pub articles: Vec<ArticleResult>,
    pub failed: Vec<(String, String)>,
    pub summary: BatchSummary,
}

impl BatchOutcome {
    /// Storage entries of every article, deduplicated by hash.
    pub fn storage_plan(&self) -> StoragePlan {
        let mut plan = StoragePlan::default();
        for article in &self.articles {
            plan.merge(article.storage.clone());
        }
        plan
    }
}

fn is_article_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| ARTICLE_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(e)))
}

/// One article per `.wiki`/`.wikitext`/`.txt` file, titled by file stem, sorted by path.
pub fn load_articles(dir: impl AsRef<Path>, limit: Option<usize>) -> Result<Vec<Article>> {
    let dir = dir.as_ref();
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read article directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| is_article_file(p))
        .collect();
    paths.sort();
    if let Some(limit) = limit {
        paths.truncate(limit);
    }

    paths
        .into_iter()
        .map(|path| {
            let wikitext = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read article: {}", path.display()))?;
            let title = path
                .file_stem()
                .map(|s| s.to_string_lossy().replace('_', " "))
                .unwrap_or_default();
            Ok(Article { title, wikitext })
        })
        .collect()
}

fn make_progress_bar(total: u64, show: bool) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("    {spinner:.cyan} extracting [{bar:30.cyan/blue}] {pos}/{len} articles")
    {
        pb.set_style(style);
    }
    pb
}

/// Extracts every article in parallel. An article whose extraction fails is
/// logged and counted; the rest of the batch carries on.
pub fn run_batch(articles: &[Article], config: &ExtractorConfig, show_progress: bool) -> BatchOutcome {
    let stats = BatchStats::new();
    let pb = make_progress_bar(articles.len() as u64, show_progress);

    let results: Vec<std::result::Result<ArticleResult, (String, String)>> = articles
        .par_iter()
        .map(|article| {
            let result = match ExtractorState::extract(&article.wikitext, config) {
                Ok(state) => {
                    let statistics = state.statistics().with_title(&article.title);
                    stats.record(&statistics);
                    Ok(ArticleResult {
                        title: article.title.clone(),
                        storage: StoragePlan::from_references(state.references()),
                        statistics,
                    })
                }
                Err(e) => {
                    warn!(title = %article.title, error = %e, "Article extraction failed");
                    stats.inc_failed();
                    Err((article.title.clone(), e.to_string()))
                }
            };
            pb.inc(1);
            if stats.articles() % PROGRESS_INTERVAL == 0 {
                pb.tick();
            }
            result
        })
        .collect();

    pb.finish_and_clear();

    let mut outcome = BatchOutcome {
        articles: Vec::with_capacity(results.len()),
        failed: Vec::new(),
        summary: stats.summary(),
    };
    for result in results {
        match result {
            Ok(article) => outcome.articles.push(article),
            Err(failure) => outcome.failed.push(failure),
        }
    }

    info!(
        articles = outcome.summary.articles_processed,
        failed = outcome.summary.articles_failed,
        references = outcome.summary.references_found,
        "Batch extraction complete"
    );
    outcome
}
