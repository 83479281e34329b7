use anyhow::Result;

use crate::config::Config;

/// One row of `docchat sources` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStatus {
    pub repository: String,
    pub path: String,
    pub branch: String,
}

pub fn source_statuses(config: &Config) -> Vec<SourceStatus> {
    config
        .github
        .repos
        .iter()
        .map(|r| SourceStatus {
            repository: format!("{}/{}", r.owner, r.repo),
            path: if r.path.is_empty() {
                "/".to_string()
            } else {
                r.path.clone()
            },
            branch: r.branch.clone().unwrap_or_else(|| "(default)".to_string()),
        })
        .collect()
}

pub fn list_sources(config: &Config) -> Result<()> {
    let rows = source_statuses(config);
    if rows.is_empty() {
        println!("No repositories configured.");
    } else {
        println!("{:<32} {:<28} BRANCH", "REPOSITORY", "PATH");
        for row in &rows {
            println!("{:<32} {:<28} {}", row.repository, row.path, row.branch);
        }
    }

    let token_set = std::env::var(&config.github.token_env)
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false);
    println!();
    println!(
        "{:<16} {}",
        config.github.token_env,
        if token_set { "set" } else { "NOT SET" }
    );
    println!(
        "{:<16} {}",
        "embedding",
        match (&config.embedding.model, config.embedding.is_enabled()) {
            (Some(model), true) => format!("{} ({})", config.embedding.provider, model),
            _ => config.embedding.provider.clone(),
        }
    );
    println!("{:<16} {} ({})", "llm", config.llm.provider, config.llm.model);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepoDescriptor;

    #[test]
    fn statuses_fill_defaults() {
        let mut config = Config::minimal();
        config.github.repos = vec![
            RepoDescriptor {
                owner: "octo".to_string(),
                repo: "docs".to_string(),
                path: "guides".to_string(),
                branch: Some("v2".to_string()),
            },
            RepoDescriptor {
                owner: "octo".to_string(),
                repo: "site".to_string(),
                path: String::new(),
                branch: None,
            },
        ];
        let rows = source_statuses(&config);
        assert_eq!(rows[0].repository, "octo/docs");
        assert_eq!(rows[0].branch, "v2");
        assert_eq!(rows[1].path, "/");
        assert_eq!(rows[1].branch, "(default)");
    }
}
