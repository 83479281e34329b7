//! Document harvester.
//!
//! Walks every configured repository path through the GitHub contents API,
//! downloads the files matching `harvest.include_globs` (markdown and MDX by
//! default) and appends one [`DocumentRecord`] per file to a dated JSONL file:
//!
//! ```text
//! <output_dir>/documentation_<lang>_<YYYY_MM_DD>.jsonl
//! ```
//!
//! A run replaces any file already written for the same date, so re-running
//! on one day never leaves duplicate or stale records behind. Any failed
//! listing or download aborts the run.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::config::{Config, RepoDescriptor};
use crate::github::{ContentEntry, EntryKind, GitHubClient};
use crate::models::{DocumentRecord, RecordSource};
use crate::preprocess;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::records::RecordWriter;

/// Counts produced by one harvest run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    pub repositories: u64,
    pub directories: u64,
    pub files: u64,
    pub output: PathBuf,
    pub archive: Option<PathBuf>,
}

/// Counts for a single repository walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub directories: u64,
    pub files: u64,
}

/// File name of the harvest output for `language` on `date`.
pub fn output_file_name(language: &str, date: NaiveDate) -> String {
    format!("documentation_{}_{}.jsonl", language, date.format("%Y_%m_%d"))
}

/// Newest harvest output for `language` in `dir`, by the date in its name.
pub fn find_latest_output(dir: &Path, language: &str) -> Result<Option<PathBuf>> {
    if !dir.exists() {
        return Ok(None);
    }
    let prefix = format!("documentation_{}_", language);
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix(&prefix))
                .and_then(|rest| rest.strip_suffix(".jsonl"))
                .map(|stamp| NaiveDate::parse_from_str(stamp, "%Y_%m_%d").is_ok())
                .unwrap_or(false)
        })
        .collect();
    // YYYY_MM_DD sorts chronologically as text.
    candidates.sort();
    Ok(candidates.pop())
}

pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

fn remove_existing_file(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove stale output: {}", path.display()))?;
    }
    Ok(())
}

/// Run a complete harvest for `date`.
///
/// Reads the access token from the environment variable named by
/// `github.token_env` before touching the output directory.
pub async fn run_harvest(
    config: &Config,
    date: NaiveDate,
    progress: &dyn ProgressReporter,
) -> Result<HarvestSummary> {
    if config.github.repos.is_empty() {
        bail!("No repositories configured. Add [[github.repos]] entries to the config.");
    }

    let token = std::env::var(&config.github.token_env).map_err(|_| {
        anyhow::anyhow!(
            "{} is not set in the environment variables.",
            config.github.token_env
        )
    })?;

    let client = GitHubClient::new(&config.github, token)?;
    harvest_with_client(config, &client, date, progress).await
}

/// Harvest using an already constructed client.
pub async fn harvest_with_client(
    config: &Config,
    client: &GitHubClient,
    date: NaiveDate,
    progress: &dyn ProgressReporter,
) -> Result<HarvestSummary> {
    let output_dir = &config.harvest.output_dir;
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    let output = output_dir.join(output_file_name(&config.harvest.language, date));
    remove_existing_file(&output)?;

    let matcher = build_globset(&config.harvest.include_globs)?;
    let mut writer = RecordWriter::append(&output)?;
    let mut summary = HarvestSummary {
        output: output.clone(),
        ..HarvestSummary::default()
    };

    let walked = walk_all(config, client, &matcher, &mut writer, &mut summary, progress).await;
    if let Err(err) = walked {
        drop(writer);
        // A truncated file must not be picked up as the latest dataset.
        if let Err(remove_err) = std::fs::remove_file(&output) {
            tracing::warn!(
                path = %output.display(),
                error = %remove_err,
                "failed to remove partial output"
            );
        }
        return Err(err);
    }
    let written = writer.finish()?;
    tracing::info!(records = written, output = %output.display(), "harvest output written");

    if config.harvest.archive {
        summary.archive = Some(archive_output(&output)?);
    }

    Ok(summary)
}

async fn walk_all(
    config: &Config,
    client: &GitHubClient,
    matcher: &GlobSet,
    writer: &mut RecordWriter,
    summary: &mut HarvestSummary,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    for repo in &config.github.repos {
        let stats = walk_repository(
            client,
            repo,
            matcher,
            config.harvest.clean_text,
            writer,
            progress,
        )
        .await
        .with_context(|| format!("Harvest of {}/{} failed", repo.owner, repo.repo))?;
        tracing::info!(
            owner = %repo.owner,
            repo = %repo.repo,
            files = stats.files,
            "repository harvested"
        );
        summary.repositories += 1;
        summary.directories += stats.directories;
        summary.files += stats.files;
    }
    Ok(())
}

/// Depth-first walk of one descriptor's path.
///
/// Entries are visited in listing order and a subdirectory is fully walked
/// before the entries that follow it.
pub async fn walk_repository(
    client: &GitHubClient,
    repo: &RepoDescriptor,
    matcher: &GlobSet,
    clean_text: bool,
    writer: &mut RecordWriter,
    progress: &dyn ProgressReporter,
) -> Result<WalkStats> {
    let mut stats = WalkStats::default();
    let source = RecordSource::from(repo);

    progress.report(ProgressEvent::Listing {
        repo: repo.repo.clone(),
        path: repo.path.clone(),
    });
    let root = client.list_dir(repo, &repo.path).await?;
    stats.directories += 1;
    let mut stack: Vec<std::vec::IntoIter<ContentEntry>> = vec![root.into_iter()];

    while let Some(level) = stack.last_mut() {
        let Some(entry) = level.next() else {
            stack.pop();
            continue;
        };

        match entry.kind {
            EntryKind::File if matcher.is_match(&entry.path) => {
                progress.report(ProgressEvent::Downloading {
                    repo: repo.repo.clone(),
                    path: entry.path.clone(),
                });
                let text = client.fetch_text(&entry).await?;
                let body = if clean_text {
                    preprocess::clean_text(&text)
                } else {
                    preprocess::collapse_whitespace(&text)
                };
                writer.write(&DocumentRecord {
                    title: entry.name.clone(),
                    body,
                    source: source.clone(),
                })?;
                stats.files += 1;
            }
            EntryKind::Dir => {
                progress.report(ProgressEvent::Listing {
                    repo: repo.repo.clone(),
                    path: entry.path.clone(),
                });
                let children = client.list_dir(repo, &entry.path).await?;
                stats.directories += 1;
                stack.push(children.into_iter());
            }
            _ => {}
        }
    }

    Ok(stats)
}

/// Pack the JSONL output into a sibling `.tar` archive.
fn archive_output(jsonl: &Path) -> Result<PathBuf> {
    let tar_path = jsonl.with_extension("tar");
    let file = File::create(&tar_path)
        .with_context(|| format!("Failed to create archive: {}", tar_path.display()))?;
    let mut builder = tar::Builder::new(file);
    let name = jsonl
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("output path has no file name"))?;
    builder
        .append_path_with_name(jsonl, name)
        .with_context(|| format!("Failed to archive {}", jsonl.display()))?;
    builder.finish()?;
    Ok(tar_path)
}

/// CLI entry point: harvest and print a summary.
pub async fn run_harvest_cmd(
    config: &Config,
    date: Option<String>,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let date = match date {
        Some(ref s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("Invalid --date '{}', expected YYYY-MM-DD", s))?,
        None => chrono::Local::now().date_naive(),
    };

    let summary = run_harvest(config, date, progress).await?;

    println!("harvest");
    println!("  repositories: {}", summary.repositories);
    println!("  directories: {}", summary.directories);
    println!("  files written: {}", summary.files);
    println!("  output: {}", summary.output.display());
    if let Some(ref archive) = summary.archive {
        println!("  archive: {}", archive.display());
    }
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_name_uses_underscored_date() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(
            output_file_name("en", date),
            "documentation_en_2024_01_05.jsonl"
        );
    }

    #[test]
    fn default_globs_match_md_and_mdx_only() {
        let set = build_globset(&["**/*.md".to_string(), "**/*.mdx".to_string()]).unwrap();
        assert!(set.is_match("intro.md"));
        assert!(set.is_match("guides/deep/setup.mdx"));
        assert!(!set.is_match("guides/image.png"));
        assert!(!set.is_match("guides/notes.markdown"));
        assert!(!set.is_match("README.MD"));
    }

    #[test]
    fn latest_output_picks_newest_date() {
        let tmp = tempfile::TempDir::new().unwrap();
        for name in [
            "documentation_en_2024_01_05.jsonl",
            "documentation_en_2024_02_01.jsonl",
            "documentation_es_2024_03_01.jsonl",
            "documentation_en_2024_01_31.tar",
            "documentation_en_US_2024_06_01.jsonl",
            "documentation_en_2024_07_01.jsonl.bak",
            "documentation_en_latest.jsonl",
        ] {
            std::fs::write(tmp.path().join(name), "").unwrap();
        }
        let latest = find_latest_output(tmp.path(), "en").unwrap().unwrap();
        assert_eq!(
            latest.file_name().unwrap().to_str().unwrap(),
            "documentation_en_2024_02_01.jsonl"
        );
    }

    #[test]
    fn latest_output_missing_dir_is_none() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(find_latest_output(&tmp.path().join("nope"), "en")
            .unwrap()
            .is_none());
    }

    #[test]
    fn archive_contains_jsonl() {
        let tmp = tempfile::TempDir::new().unwrap();
        let jsonl = tmp.path().join("documentation_en_2024_01_05.jsonl");
        std::fs::write(&jsonl, "{}\n").unwrap();

        let tar_path = archive_output(&jsonl).unwrap();
        assert_eq!(tar_path, tmp.path().join("documentation_en_2024_01_05.tar"));

        let mut archive = tar::Archive::new(File::open(&tar_path).unwrap());
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["documentation_en_2024_01_05.jsonl"]);
    }
}
