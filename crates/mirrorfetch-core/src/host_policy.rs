//! Host failover order.
//!
//! Every part is tried against hosts in one fixed order per job. Without a caller
//! preference that order is the sorted set of hosts in the plan, which keeps runs
//! reproducible regardless of how the plan was assembled.

use crate::planner::GroupedLinks;

/// Lowercase host of a URL, as used for plan keys and host order entries.
pub fn host_of(url: &url::Url) -> Option<String> {
    url.host_str().map(str::to_ascii_lowercase)
}

/// Computes the try-order for a job.
///
/// With `preferred = None` (or an empty list) every host in `plan` is returned in
/// ascending order. Otherwise the preferred list is used as given, lowercased and
/// de-duplicated; plan hosts missing from it are not tried for this job.
pub fn host_order(plan: &GroupedLinks, preferred: Option<&[String]>) -> Vec<String> {
    match preferred {
        Some(list) if !list.is_empty() => {
            let mut order: Vec<String> = Vec::with_capacity(list.len());
            for host in list {
                let host = host.trim().to_ascii_lowercase();
                if !host.is_empty() && !order.contains(&host) {
                    order.push(host);
                }
            }
            let excluded: Vec<&str> = plan
                .hosts()
                .into_iter()
                .filter(|h| !order.iter().any(|o| o == h))
                .collect();
            if !excluded.is_empty() {
                tracing::debug!(?excluded, "hosts not in preferred order are skipped");
            }
            order
        }
        _ => plan.hosts().into_iter().map(str::to_string).collect(),
    }
}
