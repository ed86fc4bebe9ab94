//! Session log writer.
//!
//! One text file per session, named from the session start time, grouped by
//! node:
//!
//! ```text
//! ------
//! Drone: 1
//! id=0, command=battery?, response=87, start_time=..., end_time=..., duration=0.041
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::info;

use crate::error::Result;
use crate::ledger::NodeHistory;

/// File path for a session that started at `started`.
pub fn log_path(dir: &Path, started: DateTime<Local>) -> PathBuf {
    dir.join(format!("{}.txt", started.format("%Y-%m-%d_%H-%M-%S")))
}

/// Render every node's history in registration order.
pub fn render(histories: &[NodeHistory]) -> String {
    let mut out = String::new();
    for (cnt, history) in histories.iter().enumerate() {
        out.push_str(&format!("------\nDrone: {}\n", cnt + 1));
        let lines: Vec<String> = history.records.iter().map(|r| r.delimited()).collect();
        out.push_str(&lines.join("\n"));
        out.push('\n');
    }
    out
}

/// Write the session log, creating `dir` if needed.
pub fn save(dir: &Path, started: DateTime<Local>, histories: &[NodeHistory]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = log_path(dir, started);
    std::fs::write(&path, render(histories))?;
    info!("[LOG] Saved log files to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use chrono::TimeZone;
    use std::net::SocketAddr;

    #[test]
    fn file_name_comes_from_start_time() {
        let started = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let path = log_path(Path::new("./log"), started);
        assert_eq!(path, Path::new("./log/2024-03-09_14-05-07.txt"));
    }

    #[tokio::test]
    async fn groups_records_by_node() {
        let ledger = Ledger::new();
        let a = SocketAddr::from(([10, 0, 0, 1], 8889));
        let b = SocketAddr::from(([10, 0, 0, 2], 8889));
        let slots = ledger.register(&[a, b]).await;
        for cmd in ["takeoff", "land"] {
            let seq = ledger.begin(slots[0], cmd).await;
            ledger.complete(slots[0], seq, "ok".into()).await;
        }
        ledger.begin(slots[1], "battery?").await;

        let dir = tempfile::tempdir().unwrap();
        let started = Local::now();
        let path = save(&dir.path().join("log"), started, &ledger.histories().await).unwrap();

        let text = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "------");
        assert_eq!(lines[1], "Drone: 1");
        assert!(lines[2].starts_with("id=0, command=takeoff, response=ok"));
        assert!(lines[3].starts_with("id=1, command=land, response=ok"));
        assert_eq!(lines[4], "------");
        assert_eq!(lines[5], "Drone: 2");
        assert!(lines[6].starts_with("id=0, command=battery?, response=none"));
        assert_eq!(lines.len(), 7);
    }
}
