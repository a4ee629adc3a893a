use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// store 运行时统计
#[derive(Clone, Debug, Default, Serialize)]
pub struct StoreStats {
    pub path: PathBuf,
    /// 各集合条目数
    pub collections: CollectionCounts,
    /// 下一个待分配的 part_id
    pub next_id: u64,
    pub dirty: bool,
    pub flush: FlushStats,
    /// 进程级 RSS（从 /proc/self/statm 读取，非 Linux 为 0）
    pub process_rss_bytes: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CollectionCounts {
    pub parts: usize,
    pub part_types: usize,
    pub projects: usize,
    pub stored_files: usize,
    pub pcbs: usize,
    pub part_suppliers: usize,
    pub project_part_assignments: usize,
    pub project_pcb_assignments: usize,
    pub pcb_stored_file_assignments: usize,
    pub oauth_credentials: usize,
    pub oauth_requests: usize,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct FlushStats {
    /// 最近一次成功落盘的时间（unix ms）
    pub last_persist_ms: Option<i64>,
    /// 最近一次落盘的文件大小
    pub last_persist_bytes: u64,
    pub persist_count: u64,
    pub persist_failures: u64,
}

impl StoreStats {
    pub fn read_process_rss() -> u64 {
        std::fs::read_to_string("/proc/self/statm")
            .ok()
            .and_then(|s| {
                // statm: size resident shared ...（单位: 页）
                let parts: Vec<&str> = s.split_whitespace().collect();
                parts.get(1)?.parse::<u64>().ok()
            })
            .map(|pages| pages * 4096)
            .unwrap_or(0)
    }
}

pub fn human_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;
    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.collections;
        writeln!(f, "╔══════════════════════════════════════════════════╗")?;
        writeln!(f, "║           partsdb Store Report                   ║")?;
        writeln!(f, "╠══════════════════════════════════════════════════╣")?;
        writeln!(f, "║ File: {}", self.path.display())?;
        writeln!(
            f,
            "║ Process RSS: {:>35} ║",
            human_bytes(self.process_rss_bytes)
        )?;
        writeln!(f, "╠──────────────────────────────────────────────────╣")?;
        writeln!(f, "║ Collections:                                     ║")?;
        writeln!(f, "║   parts:        {:>10}                       ║", c.parts)?;
        writeln!(f, "║   part types:   {:>10}                       ║", c.part_types)?;
        writeln!(f, "║   projects:     {:>10}                       ║", c.projects)?;
        writeln!(f, "║   stored files: {:>10}                       ║", c.stored_files)?;
        writeln!(f, "║   pcbs:         {:>10}                       ║", c.pcbs)?;
        writeln!(f, "║   suppliers:    {:>10}                       ║", c.part_suppliers)?;
        writeln!(
            f,
            "║   assignments:  {:>10}                       ║",
            c.project_part_assignments
        )?;
        writeln!(
            f,
            "║   pcb links:    {:>10}                       ║",
            c.project_pcb_assignments
        )?;
        writeln!(
            f,
            "║   pcb files:    {:>10}                       ║",
            c.pcb_stored_file_assignments
        )?;
        writeln!(
            f,
            "║   oauth:        {:>10}  ({:>3} requests)       ║",
            c.oauth_credentials, c.oauth_requests
        )?;
        writeln!(f, "╠──────────────────────────────────────────────────╣")?;
        writeln!(f, "║ Flush:                                           ║")?;
        writeln!(f, "║   next id:      {:>10}                       ║", self.next_id)?;
        writeln!(f, "║   dirty:        {:>10}                       ║", self.dirty)?;
        writeln!(
            f,
            "║   persisted:    {:>10}  ({:>10})          ║",
            self.flush.persist_count,
            human_bytes(self.flush.last_persist_bytes)
        )?;
        writeln!(
            f,
            "║   failures:     {:>10}                       ║",
            self.flush.persist_failures
        )?;
        match self.flush.last_persist_ms {
            Some(ms) => writeln!(f, "║   last persist: {:>10}                       ║", ms)?,
            None => writeln!(f, "║   last persist:      never                       ║")?,
        }
        writeln!(f, "╚══════════════════════════════════════════════════╝")?;
        Ok(())
    }
}
