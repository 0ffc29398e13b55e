use crate::state::FrontierEntry;

/// Prints a table of history entries to stdout
///
/// Each row shows the latest request outcome for a URL. URLs that were
/// discovered but never fetched show `-`.
pub fn print_history(entries: &[&FrontierEntry]) {
    println!("=== Crawl History ===\n");

    if entries.is_empty() {
        println!("  (no pages recorded)");
        return;
    }

    println!(
        "  {:>6} {:>8} {:>8} {:>5} {:>4}  URL",
        "STATUS", "TIME", "BYTES", "REFS", "REQS"
    );
    for entry in entries {
        let (status, time, size) = match entry.requests.last() {
            Some(request) => (
                request.status.to_string(),
                format!("{}ms", request.time_ms),
                request.size.to_string(),
            ),
            None => ("-".to_string(), "-".to_string(), "-".to_string()),
        };

        println!(
            "  {:>6} {:>8} {:>8} {:>5} {:>4}  {}",
            status,
            time,
            size,
            entry.referrers.len(),
            entry.requests.len(),
            entry.url.fullpath
        );
    }
    println!();
}
