pub mod flush;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use crate::config::{Config, StorageProvider};
use crate::core::{now_ms, Part, PartType, Project};
use crate::error::{Result, StoreError};
use crate::query::{self, normalize, SearchResult};
use crate::schema::{SnapshotV7, CURRENT_VERSION};
use crate::stats::{CollectionCounts, FlushStats, StoreStats};
use crate::storage::{codec, SnapshotFile};

/// 锁内状态：快照与 dirty 标志必须一起变更
pub(crate) struct StoreState {
    pub(crate) snapshot: SnapshotV7,
    pub(crate) next_id: u64,
    pub(crate) dirty: bool,
    pub(crate) closed: bool,
    pub(crate) flush: FlushStats,
}

pub(crate) struct Inner {
    pub(crate) state: Mutex<StoreState>,
    file: SnapshotFile,
    shutdown: Arc<Notify>,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
    flush_interval: Duration,
    shutdown_timeout: Duration,
}

impl Inner {
    /// 落盘（调用方持锁）：重算元数据 → seal → 原子写
    ///
    /// 失败时快照留在内存且保持 dirty。
    pub(crate) async fn persist_locked(&self, state: &mut StoreState) -> Result<()> {
        let snap = &mut state.snapshot;
        snap.version = CURRENT_VERSION;
        snap.refresh_metadata();
        snap.date_modified = now_ms();
        codec::seal(snap)?;

        match self.file.write_atomic(snap).await {
            Ok(bytes) => {
                state.dirty = false;
                state.flush.persist_count += 1;
                state.flush.last_persist_bytes = bytes;
                state.flush.last_persist_ms = Some(state.snapshot.date_modified);
                tracing::debug!(
                    "Snapshot persisted: {} parts, {} bytes -> {}",
                    state.snapshot.count,
                    bytes,
                    self.file.path().display()
                );
                Ok(())
            }
            Err(e) => {
                state.flush.persist_failures += 1;
                Err(e)
            }
        }
    }
}

/// id 空间耗尽（文件里已有 u64::MAX）时拒绝继续分配
fn id_after(id: u64, entity: &str) -> Result<u64> {
    id.checked_add(1)
        .ok_or_else(|| StoreError::Format(format!("{} id space exhausted at {}", entity, id)))
}

/// 零件库存 store（单文件快照 + 内存全量）
///
/// 句柄可廉价 clone；所有操作都持有同一把异步锁直到结束，
/// 后台 flush 与之竞争同一把锁。
#[derive(Clone)]
pub struct PartStore {
    inner: Arc<Inner>,
}

impl PartStore {
    /// 加载（或新建）快照并启动后台 flush
    pub async fn open(config: &Config) -> Result<Self> {
        if config.storage.provider != StorageProvider::Binary {
            return Err(StoreError::Config(format!(
                "PartStore serves the binary provider, got {}",
                config.storage.provider.as_str()
            )));
        }
        config.validate()?;

        let file = SnapshotFile::new(config.storage.path.clone());
        let (snapshot, dirty) = match file.load().await? {
            Some((snap, source_version)) => {
                let legacy = source_version != CURRENT_VERSION;
                tracing::info!(
                    "Loaded snapshot {} (v{}, {} parts{})",
                    file.path().display(),
                    source_version,
                    snap.parts.len(),
                    if legacy { ", will rewrite as current" } else { "" }
                );
                (snap, legacy)
            }
            None => {
                tracing::info!(
                    "No snapshot at {}, starting empty",
                    file.path().display()
                );
                (SnapshotV7::empty(), false)
            }
        };

        let max_id = snapshot.parts.iter().map(|p| p.part_id).max().unwrap_or(0);
        let next_id = id_after(snapshot.last_record_id.max(max_id), "part")?;

        let shutdown = Arc::new(Notify::new());
        let inner = Arc::new(Inner {
            state: Mutex::new(StoreState {
                snapshot,
                next_id,
                dirty,
                closed: false,
                flush: FlushStats::default(),
            }),
            file,
            shutdown: shutdown.clone(),
            worker: parking_lot::Mutex::new(None),
            flush_interval: config.flush_interval(),
            shutdown_timeout: config.shutdown_timeout(),
        });

        let handle = tokio::spawn(flush::flush_loop(
            Arc::downgrade(&inner),
            shutdown,
            inner.flush_interval,
        ));
        *inner.worker.lock() = Some(handle);

        Ok(Self { inner })
    }

    pub fn path(&self) -> &Path {
        self.inner.file.path()
    }

    /// 分配 part_id 并追加
    pub async fn add_part(&self, mut part: Part) -> Result<Part> {
        let mut st = self.inner.state.lock().await;
        let following = id_after(st.next_id, "part")?;
        part.part_id = st.next_id;
        st.next_id = following;
        if part.date_created == 0 {
            part.date_created = now_ms();
        }
        st.snapshot.parts.push(part.clone());
        st.dirty = true;
        Ok(part)
    }

    /// 按 id 原位替换；不存在返回 None
    pub async fn update_part(&self, part: Part) -> Option<Part> {
        let mut st = self.inner.state.lock().await;
        let slot = st
            .snapshot
            .parts
            .iter_mut()
            .find(|p| p.part_id == part.part_id)?;
        *slot = part.clone();
        st.dirty = true;
        Some(part)
    }

    /// 按 id 删除；成功后 next_id 回落到 max(id)+1
    pub async fn delete_part(&self, part_id: u64) -> bool {
        let mut st = self.inner.state.lock().await;
        let before = st.snapshot.parts.len();
        st.snapshot.parts.retain(|p| p.part_id != part_id);
        if st.snapshot.parts.len() == before {
            return false;
        }
        // 剩余 id 都小于 next_id，不会溢出
        st.next_id = st
            .snapshot
            .parts
            .iter()
            .map(|p| p.part_id)
            .max()
            .map_or(1, |max| max.saturating_add(1));
        st.dirty = true;
        true
    }

    pub async fn get_part_by_id(&self, part_id: u64) -> Option<Part> {
        let st = self.inner.state.lock().await;
        st.snapshot
            .parts
            .iter()
            .find(|p| p.part_id == part_id)
            .cloned()
    }

    /// 零件号精确匹配（大小写不敏感）
    pub async fn get_part_by_number(&self, part_number: &str) -> Option<Part> {
        let wanted = normalize(part_number);
        let st = self.inner.state.lock().await;
        st.snapshot
            .parts
            .iter()
            .find(|p| normalize(&p.part_number) == wanted)
            .cloned()
    }

    pub async fn find_parts(&self, keywords: &str) -> Result<Vec<SearchResult>> {
        let st = self.inner.state.lock().await;
        query::find_parts(&st.snapshot.parts, keywords)
    }

    /// 按 id 升序分页
    pub async fn get_parts(&self, offset: usize, limit: usize) -> Vec<Part> {
        let st = self.inner.state.lock().await;
        let mut parts: Vec<&Part> = st.snapshot.parts.iter().collect();
        parts.sort_by_key(|p| p.part_id);
        parts.into_iter().skip(offset).take(limit).cloned().collect()
    }

    pub async fn get_low_stock_parts(&self) -> Vec<Part> {
        let st = self.inner.state.lock().await;
        st.snapshot
            .parts
            .iter()
            .filter(|p| p.is_low_stock())
            .cloned()
            .collect()
    }

    pub async fn add_project(&self, mut project: Project) -> Result<Project> {
        let mut st = self.inner.state.lock().await;
        let max_id = st
            .snapshot
            .projects
            .iter()
            .map(|p| p.project_id)
            .max()
            .unwrap_or(0);
        project.project_id = id_after(max_id, "project")?;
        if project.date_created == 0 {
            project.date_created = now_ms();
        }
        st.snapshot.projects.push(project.clone());
        st.dirty = true;
        Ok(project)
    }

    pub async fn get_projects(&self) -> Vec<Project> {
        self.inner.state.lock().await.snapshot.projects.clone()
    }

    /// 不级联：引用该项目的零件保留原 project_id
    pub async fn delete_project(&self, project_id: u64) -> bool {
        let mut st = self.inner.state.lock().await;
        let before = st.snapshot.projects.len();
        st.snapshot.projects.retain(|p| p.project_id != project_id);
        let removed = st.snapshot.projects.len() != before;
        if removed {
            st.dirty = true;
        }
        removed
    }

    pub async fn add_part_type(&self, mut part_type: PartType) -> Result<PartType> {
        let mut st = self.inner.state.lock().await;
        let max_id = st
            .snapshot
            .part_types
            .iter()
            .map(|t| t.part_type_id)
            .max()
            .unwrap_or(0);
        part_type.part_type_id = id_after(max_id, "part type")?;
        if part_type.date_created == 0 {
            part_type.date_created = now_ms();
        }
        st.snapshot.part_types.push(part_type.clone());
        st.dirty = true;
        Ok(part_type)
    }

    pub async fn get_part_types(&self) -> Vec<PartType> {
        self.inner.state.lock().await.snapshot.part_types.clone()
    }

    /// 立即落盘（不论 dirty）
    pub async fn save_now(&self) -> Result<()> {
        let mut st = self.inner.state.lock().await;
        self.inner.persist_locked(&mut st).await
    }

    pub async fn stats(&self) -> StoreStats {
        let st = self.inner.state.lock().await;
        let s = &st.snapshot;
        StoreStats {
            path: self.inner.file.path().to_path_buf(),
            collections: CollectionCounts {
                parts: s.parts.len(),
                part_types: s.part_types.len(),
                projects: s.projects.len(),
                stored_files: s.stored_files.len(),
                pcbs: s.pcbs.len(),
                part_suppliers: s.part_suppliers.len(),
                project_part_assignments: s.project_part_assignments.len(),
                project_pcb_assignments: s.project_pcb_assignments.len(),
                pcb_stored_file_assignments: s.pcb_stored_file_assignments.len(),
                oauth_credentials: s.oauth_credentials.len(),
                oauth_requests: s.oauth_requests.len(),
            },
            next_id: st.next_id,
            dirty: st.dirty,
            flush: st.flush.clone(),
            process_rss_bytes: StoreStats::read_process_rss(),
        }
    }

    /// 停止后台 flush（有界等待），然后做最后一次落盘
    ///
    /// 幂等；关闭后的操作仍作用于内存，但不再落盘。
    pub async fn close(&self) -> Result<()> {
        let handle = self.inner.worker.lock().take();
        if let Some(mut handle) = handle {
            self.inner.shutdown.notify_one();
            match tokio::time::timeout(self.inner.shutdown_timeout, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Flush worker ended abnormally: {}", e),
                Err(_) => {
                    tracing::warn!(
                        "Flush worker did not stop within {:?}, aborting",
                        self.inner.shutdown_timeout
                    );
                    handle.abort();
                }
            }
        }

        let mut st = self.inner.state.lock().await;
        if st.closed {
            return Ok(());
        }
        if st.dirty {
            self.inner.persist_locked(&mut st).await?;
        }
        st.closed = true;
        tracing::info!("Store closed: {}", self.inner.file.path().display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PartV1, PcbStoredFileAssignment, ProjectPcbAssignment};
    use crate::schema::{LegacySnapshot, SnapshotV1};
    use crate::storage::format;
    use std::path::PathBuf;

    fn unique_tmp_dir(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("partsdb-store-{}-{}", tag, nanos))
    }

    async fn open_at(path: PathBuf) -> PartStore {
        PartStore::open(&Config::with_path(path)).await.unwrap()
    }

    async fn file_parts(path: &Path) -> Vec<Part> {
        match SnapshotFile::new(path.to_path_buf()).load().await {
            Ok(Some((snap, _))) => snap.parts,
            _ => Vec::new(),
        }
    }

    #[tokio::test]
    async fn ids_are_unique_and_monotonic() {
        let dir = unique_tmp_dir("ids");
        let store = open_at(dir.join("parts.bin")).await;

        let mut ids = Vec::new();
        for n in ["R1", "R2", "C1", "U1"] {
            ids.push(store.add_part(Part::new(n)).await.unwrap().part_id);
        }
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(store.stats().await.next_id, 5);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn deleting_highest_id_lets_next_add_reuse_it() {
        let dir = unique_tmp_dir("reuse");
        let store = open_at(dir.join("parts.bin")).await;
        store.add_part(Part::new("A")).await.unwrap();
        let b = store.add_part(Part::new("B")).await.unwrap();
        assert_eq!(b.part_id, 2);

        assert!(store.delete_part(2).await);
        assert!(!store.delete_part(2).await);
        let c = store.add_part(Part::new("C")).await.unwrap();
        assert_eq!(c.part_id, 2);

        assert!(store.delete_part(1).await);
        assert!(store.delete_part(2).await);
        assert_eq!(store.add_part(Part::new("D")).await.unwrap().part_id, 1);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn update_replaces_in_place_or_reports_missing() {
        let dir = unique_tmp_dir("update");
        let store = open_at(dir.join("parts.bin")).await;
        let mut p = store.add_part(Part::new("LM358")).await.unwrap();
        p.quantity = 25;
        assert_eq!(store.update_part(p.clone()).await, Some(p.clone()));
        assert_eq!(store.get_part_by_id(p.part_id).await.unwrap().quantity, 25);

        let mut ghost = Part::new("GHOST");
        ghost.part_id = 99;
        assert!(store.update_part(ghost).await.is_none());
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn lookup_by_number_ignores_case() {
        let dir = unique_tmp_dir("number");
        let store = open_at(dir.join("parts.bin")).await;
        store.add_part(Part::new("LM358N")).await.unwrap();
        let found = store.get_part_by_number("lm358n").await.unwrap();
        assert_eq!(found.part_number, "LM358N");
        assert!(store.get_part_by_number("LM358").await.is_none());
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn search_ranks_exact_before_partial() {
        let dir = unique_tmp_dir("search");
        let store = open_at(dir.join("parts.bin")).await;
        store
            .add_part(Part::new("LM358N").with_description("dual op amp"))
            .await
            .unwrap();
        store
            .add_part(Part::new("LM358").with_description("Op Amp"))
            .await
            .unwrap();

        let r = store.find_parts("LM358").await.unwrap();
        assert_eq!(r.len(), 2);
        assert_eq!((r[0].part.part_number.as_str(), r[0].rank), ("LM358", 10));
        assert_eq!((r[1].part.part_number.as_str(), r[1].rank), ("LM358N", 100));

        assert!(matches!(
            store.find_parts("   ").await,
            Err(StoreError::InvalidQuery(_))
        ));
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn listing_and_low_stock() {
        let dir = unique_tmp_dir("listing");
        let store = open_at(dir.join("parts.bin")).await;
        for (n, qty) in [("A", 10), ("B", 0), ("C", 3)] {
            let mut p = Part::new(n).with_quantity(qty);
            p.low_stock_threshold = 3;
            store.add_part(p).await.unwrap();
        }

        let page: Vec<u64> = store.get_parts(1, 5).await.iter().map(|p| p.part_id).collect();
        assert_eq!(page, vec![2, 3]);

        let low: Vec<String> = store
            .get_low_stock_parts()
            .await
            .into_iter()
            .map(|p| p.part_number)
            .collect();
        assert_eq!(low, vec!["B".to_string(), "C".to_string()]);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn projects_and_part_types_get_their_own_ids() {
        let dir = unique_tmp_dir("secondary");
        let store = open_at(dir.join("parts.bin")).await;

        let synth = store
            .add_project(Project {
                name: "Synth".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let amp = store
            .add_project(Project {
                name: "Amp".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!((synth.project_id, amp.project_id), (1, 2));
        assert!(store.delete_project(1).await);
        assert!(!store.delete_project(1).await);
        assert_eq!(store.get_projects().await.len(), 1);

        let ic = store
            .add_part_type(PartType {
                name: "IC".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(ic.part_type_id, 1);
        assert_eq!(store.get_part_types().await[0].name, "IC");
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn background_flush_persists_new_part() {
        let dir = unique_tmp_dir("durability");
        let path = dir.join("parts.bin");
        let store = open_at(path.clone()).await;
        store.add_part(Part::new("2N2222")).await.unwrap();

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            if file_parts(&path).await.iter().any(|p| p.part_number == "2N2222") {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("background flush did not persist the part in time");
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }

        assert!(!store.stats().await.dirty);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_flushes_and_reopen_restores() {
        let dir = unique_tmp_dir("reopen");
        let path = dir.join("parts.bin");
        let mut cfg = Config::with_path(path.clone());
        // 只靠 close 落盘
        cfg.storage.flush_interval_ms = 60_000;

        let store = PartStore::open(&cfg).await.unwrap();
        store.add_part(Part::new("A")).await.unwrap();
        store.add_part(Part::new("B")).await.unwrap();
        store.close().await.unwrap();
        store.close().await.unwrap();

        let reopened = PartStore::open(&cfg).await.unwrap();
        assert_eq!(reopened.get_parts(0, 10).await.len(), 2);
        assert_eq!(reopened.add_part(Part::new("C")).await.unwrap().part_id, 3);
        reopened.close().await.unwrap();
    }

    #[tokio::test]
    async fn persistence_error_is_surfaced_and_store_stays_usable() {
        let dir = unique_tmp_dir("persist-err");
        let data_dir = dir.join("data");
        let mut cfg = Config::with_path(data_dir.join("parts.bin"));
        cfg.storage.flush_interval_ms = 60_000;

        let store = PartStore::open(&cfg).await.unwrap();
        store.add_part(Part::new("A")).await.unwrap();

        // 父目录的位置被普通文件占住：落盘必然失败
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(&data_dir, b"x").unwrap();
        assert!(matches!(
            store.save_now().await,
            Err(StoreError::Persistence { .. })
        ));

        let stats = store.stats().await;
        assert!(stats.dirty);
        assert_eq!(stats.flush.persist_failures, 1);
        assert!(store.get_part_by_number("A").await.is_some());
        store.add_part(Part::new("B")).await.unwrap();

        // 障碍移除后下一次落盘成功
        std::fs::remove_file(&data_dir).unwrap();
        store.save_now().await.unwrap();
        let stats = store.stats().await;
        assert!(!stats.dirty);
        assert_eq!(stats.flush.persist_count, 1);
        let names: Vec<String> = file_parts(&cfg.storage.path)
            .await
            .into_iter()
            .map(|p| p.part_number)
            .collect();
        assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
        store.close().await.unwrap();
    }

    fn write_v7(path: &Path, mut snap: SnapshotV7) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        snap.refresh_metadata();
        codec::seal(&mut snap).unwrap();
        let bytes = format::encode_file(&LegacySnapshot::V7(snap)).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    #[tokio::test]
    async fn exhausted_id_space_is_rejected() {
        let dir = unique_tmp_dir("id-max");
        let path = dir.join("parts.bin");
        let mut snap = SnapshotV7::empty();
        let mut p = Part::new("LAST");
        p.part_id = u64::MAX;
        snap.parts.push(p);
        write_v7(&path, snap);

        assert!(matches!(
            PartStore::open(&Config::with_path(path)).await,
            Err(StoreError::Format(_))
        ));
    }

    #[tokio::test]
    async fn add_fails_once_the_last_id_is_taken() {
        let dir = unique_tmp_dir("id-near-max");
        let path = dir.join("parts.bin");
        let mut snap = SnapshotV7::empty();
        let mut p = Part::new("ALMOST");
        p.part_id = u64::MAX - 1;
        snap.parts.push(p);
        write_v7(&path, snap);

        let mut cfg = Config::with_path(path);
        cfg.storage.flush_interval_ms = 60_000;
        let store = PartStore::open(&cfg).await.unwrap();
        assert_eq!(store.stats().await.next_id, u64::MAX);
        assert!(matches!(
            store.add_part(Part::new("OVER")).await,
            Err(StoreError::Format(_))
        ));
        assert_eq!(store.get_parts(0, 10).await.len(), 1);
        assert!(!store.stats().await.dirty);
    }

    #[tokio::test]
    async fn stats_count_every_collection() {
        let dir = unique_tmp_dir("stats");
        let path = dir.join("parts.bin");
        let mut snap = SnapshotV7::empty();
        snap.project_pcb_assignments.push(ProjectPcbAssignment {
            project_pcb_assignment_id: 1,
            project_id: 1,
            pcb_id: 1,
            ..Default::default()
        });
        snap.pcb_stored_file_assignments.push(PcbStoredFileAssignment {
            pcb_stored_file_assignment_id: 1,
            pcb_id: 1,
            stored_file_id: 1,
            ..Default::default()
        });
        write_v7(&path, snap);

        let store = open_at(path).await;
        let stats = store.stats().await;
        assert_eq!(stats.collections.project_pcb_assignments, 1);
        assert_eq!(stats.collections.pcb_stored_file_assignments, 1);
        assert!(stats.to_string().contains("pcb files"));
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn tampered_file_fails_to_open() {
        let dir = unique_tmp_dir("tamper");
        let path = dir.join("parts.bin");
        let store = open_at(path.clone()).await;
        store
            .add_part(Part::new("BC547").with_description("small signal transistor"))
            .await
            .unwrap();
        store.close().await.unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let needle = b"small signal";
        let pos = bytes
            .windows(needle.len())
            .position(|w| w == needle)
            .unwrap();
        bytes[pos] ^= 0x01;
        std::fs::write(&path, &bytes).unwrap();

        match PartStore::open(&Config::with_path(path)).await {
            Err(StoreError::Integrity { .. }) => {}
            Err(e) => panic!("expected integrity error, got {}", e),
            Ok(_) => panic!("expected integrity error, store opened"),
        }
    }

    #[tokio::test]
    async fn relational_file_is_refused() {
        let dir = unique_tmp_dir("sqlite-sig");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("parts.bin");
        let mut bytes = b"SQLite format 3\0".to_vec();
        bytes.resize(100, 0);
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            PartStore::open(&Config::with_path(path)).await,
            Err(StoreError::Format(_))
        ));
    }

    #[tokio::test]
    async fn v1_file_is_upgraded_and_rewritten_as_current() {
        let dir = unique_tmp_dir("v1");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("parts.bin");

        let mut v1 = SnapshotV1 {
            version: 1,
            count: 2,
            first_record_id: 1,
            last_record_id: 5,
            date_created: 1_500_000_000_000,
            date_modified: 1_500_000_000_000,
            parts: vec![
                PartV1 {
                    part_id: 1,
                    part_number: "7805".into(),
                    description: "5V regulator".into(),
                    ..Default::default()
                },
                PartV1 {
                    part_id: 5,
                    part_number: "LM317".into(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        codec::seal(&mut v1).unwrap();
        let bytes = format::encode_file(&LegacySnapshot::V1(v1)).unwrap();
        std::fs::write(&path, &bytes).unwrap();

        let mut cfg = Config::with_path(path.clone());
        cfg.storage.flush_interval_ms = 60_000;
        let store = PartStore::open(&cfg).await.unwrap();
        assert!(store.stats().await.dirty);
        let reg = store.get_part_by_number("7805").await.unwrap();
        assert!(reg.manufacturer.is_empty());
        assert_eq!(store.add_part(Part::new("new")).await.unwrap().part_id, 6);
        store.close().await.unwrap();

        let on_disk = std::fs::read(&path).unwrap();
        assert_eq!(on_disk[0], CURRENT_VERSION);
        let (snap, source) = SnapshotFile::new(path).load().await.unwrap().unwrap();
        assert_eq!(source, CURRENT_VERSION);
        assert_eq!(snap.count, 3);
        assert_eq!((snap.first_record_id, snap.last_record_id), (1, 6));
        assert_eq!(snap.date_created, 1_500_000_000_000);
    }

    #[tokio::test]
    async fn concurrent_adds_never_share_an_id() {
        let dir = unique_tmp_dir("concurrent");
        let store = open_at(dir.join("parts.bin")).await;

        let mut handles = Vec::new();
        for i in 0..8 {
            let s = store.clone();
            handles.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                for j in 0..25 {
                    let part = s.add_part(Part::new(format!("P{}-{}", i, j))).await;
                    ids.push(part.unwrap().part_id);
                }
                ids
            }));
        }
        let mut all = Vec::new();
        for h in handles {
            all.extend(h.await.unwrap());
        }
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 200);
        assert_eq!(*all.last().unwrap(), 200);
        store.close().await.unwrap();
    }
}
