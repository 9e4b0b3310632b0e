//! `mirrorfetch plan <LIST>...` – print grouped links and host order as JSON.

use anyhow::{Context, Result};
use mirrorfetch_core::host_policy::host_order;
use mirrorfetch_core::job::{PlanSource, UrlListFile};
use std::path::PathBuf;

pub fn run_plan(lists: &[PathBuf], hosts: &[String]) -> Result<()> {
    let mut out = Vec::with_capacity(lists.len());
    for list in lists {
        let plan = UrlListFile(list.clone())
            .resolve_plan()
            .with_context(|| format!("plan {}", list.display()))?;
        out.push(serde_json::json!({
            "list": list.display().to_string(),
            "total_parts": plan.total_parts(),
            "host_order": host_order(&plan, Some(hosts)),
            "files": plan,
        }));
    }
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
