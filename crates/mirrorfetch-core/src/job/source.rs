//! Plan sources: where a job's grouped links come from.

use std::path::PathBuf;
use thiserror::Error;

use crate::planner::{plan_links, GroupedLinks};

/// Why a plan could not be produced. Always fatal for the job.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("page unreachable: {0}")]
    Unreachable(String),
    #[error("no mirror link found")]
    NoMirrorLink,
}

/// Produces the grouped links a job downloads.
pub trait PlanSource: Send {
    /// Short label for logs.
    fn describe(&self) -> String;

    fn resolve_plan(&self) -> Result<GroupedLinks, PlanError>;
}

impl PlanSource for GroupedLinks {
    fn describe(&self) -> String {
        let files: Vec<&str> = self.files().map(|(base, _)| base).collect();
        if files.is_empty() {
            "empty plan".to_string()
        } else {
            files.join(", ")
        }
    }

    fn resolve_plan(&self) -> Result<GroupedLinks, PlanError> {
        Ok(self.clone())
    }
}

/// Raw mirror URLs, planned when the job starts.
#[derive(Debug, Clone)]
pub struct UrlList(pub Vec<String>);

impl PlanSource for UrlList {
    fn describe(&self) -> String {
        format!("{} link(s)", self.0.len())
    }

    fn resolve_plan(&self) -> Result<GroupedLinks, PlanError> {
        if self.0.iter().all(|u| u.trim().is_empty()) {
            return Err(PlanError::NoMirrorLink);
        }
        Ok(plan_links(&self.0))
    }
}

/// A text file with one mirror URL per line; `#` starts a comment line.
#[derive(Debug, Clone)]
pub struct UrlListFile(pub PathBuf);

impl UrlListFile {
    fn read_links(&self) -> Result<Vec<String>, PlanError> {
        let text = std::fs::read_to_string(&self.0)
            .map_err(|e| PlanError::Unreachable(format!("{}: {}", self.0.display(), e)))?;
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect())
    }
}

impl PlanSource for UrlListFile {
    fn describe(&self) -> String {
        self.0.display().to_string()
    }

    fn resolve_plan(&self) -> Result<GroupedLinks, PlanError> {
        UrlList(self.read_links()?).resolve_plan()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_list_is_planned() {
        let src = UrlList(vec![
            "https://a.com/Album.part1.rar".into(),
            "https://a.com/Album.part2.rar".into(),
        ]);
        let plan = src.resolve_plan().unwrap();
        assert_eq!(plan.max_part("Album"), Some(2));
    }

    #[test]
    fn blank_list_has_no_mirror_link() {
        let src = UrlList(vec!["  ".into()]);
        assert!(matches!(src.resolve_plan(), Err(PlanError::NoMirrorLink)));
        assert!(matches!(
            UrlList(Vec::new()).resolve_plan(),
            Err(PlanError::NoMirrorLink)
        ));
    }

    #[test]
    fn list_file_skips_comments_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.txt");
        std::fs::write(
            &path,
            "# album mirrors\n\nhttps://a.com/Album.part1.rar\n  https://b.com/Album.part1.rar  \n",
        )
        .unwrap();
        let plan = UrlListFile(path).resolve_plan().unwrap();
        let hosts: Vec<&str> = plan.hosts().into_iter().collect();
        assert_eq!(hosts, vec!["a.com", "b.com"]);
    }

    #[test]
    fn missing_list_file_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let src = UrlListFile(dir.path().join("absent.txt"));
        assert!(matches!(src.resolve_plan(), Err(PlanError::Unreachable(_))));
    }

    #[test]
    fn grouped_links_describe_their_files() {
        let plan = plan_links(["https://a.com/Album.part1.rar", "https://a.com/Bonus.zip"]);
        assert_eq!(plan.describe(), "Album, Bonus.zip");
        assert_eq!(plan.resolve_plan().unwrap(), plan);
    }
}
