//! SQLite persistence for the alarm list and the history log.
//!
//! The engine itself never touches storage; the embedder applies the
//! engine's `AlarmChanged` / `HistoryRecorded` events here. All access goes
//! through a dedicated worker thread owning the single connection, with
//! async callers parked on a oneshot reply.

use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use log::{error, info};
use rusqlite::{params, Connection, Row};
use tokio::sync::oneshot;

mod migrations;

use migrations::run_migrations;

use crate::{
    engine::AlarmDiff,
    models::{Alarm, DismissMethod, DismissType, HistoryEntry},
};

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct StoreInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("failed to send shutdown to store thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("failed to join store thread: {join_err:?}");
            }
        }
    }
}

// Datetimes are stored in `NaiveDateTime`'s Display form (space-separated),
// which also keeps the textual `ORDER BY ring_time` chronological.
fn parse_datetime(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .map_err(|err| anyhow!("invalid datetime '{value}': {err}"))
}

fn to_u8(value: i64, field: &str) -> Result<u8> {
    u8::try_from(value).map_err(|_| anyhow!("{field} out of range: {value}"))
}

fn to_u32(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("{field} out of range: {value}"))
}

fn dismiss_type_from_str(value: &str) -> Result<DismissType> {
    match value {
        "steps" => Ok(DismissType::Steps),
        "photo" => Ok(DismissType::Photo),
        "both" => Ok(DismissType::Both),
        "snooze" => Ok(DismissType::Snooze),
        "forceStop" => Ok(DismissType::ForceStop),
        "unknown" => Ok(DismissType::Unknown),
        _ => Err(anyhow!("unknown dismiss type '{value}'")),
    }
}

fn alarm_from_row(row: &Row<'_>) -> Result<Alarm> {
    let repeat_days: [bool; 7] = serde_json::from_str(&row.get::<_, String>(4)?)
        .context("invalid repeat_days payload")?;
    let dismiss_method: DismissMethod = serde_json::from_str(&row.get::<_, String>(6)?)
        .context("invalid dismiss_method payload")?;

    Ok(Alarm {
        id: row.get(0)?,
        title: row.get(1)?,
        hour: to_u8(row.get(2)?, "hour")?,
        minute: to_u8(row.get(3)?, "minute")?,
        repeat_days,
        is_enabled: row.get::<_, i64>(5)? != 0,
        dismiss_method,
        volume: row.get(7)?,
        vibrate: row.get::<_, i64>(8)? != 0,
        snooze_limit: to_u32(row.get(9)?, "snooze_limit")?,
        snooze_minutes: to_u32(row.get(10)?, "snooze_minutes")?,
        created_at: parse_datetime(&row.get::<_, String>(11)?)?,
        last_ring_time: row
            .get::<_, Option<String>>(12)?
            .map(|value| parse_datetime(&value))
            .transpose()?,
    })
}

fn history_from_row(row: &Row<'_>) -> Result<HistoryEntry> {
    Ok(HistoryEntry {
        id: row.get(0)?,
        alarm_id: row.get(1)?,
        alarm_title: row.get(2)?,
        ring_time: parse_datetime(&row.get::<_, String>(3)?)?,
        dismiss_time: row
            .get::<_, Option<String>>(4)?
            .map(|value| parse_datetime(&value))
            .transpose()?,
        dismiss_type: dismiss_type_from_str(&row.get::<_, String>(5)?)?,
        steps_taken: row
            .get::<_, Option<i64>>(6)?
            .map(|value| to_u32(value, "steps_taken"))
            .transpose()?,
        photo_similarity: row.get(7)?,
        photo_path: row.get(8)?,
        was_snoozed: row.get::<_, i64>(9)? != 0,
        snooze_count: to_u32(row.get(10)?, "snooze_count")?,
        notes: row.get(11)?,
    })
}

const ALARM_COLUMNS: &str = "id, title, hour, minute, repeat_days, is_enabled, dismiss_method, \
     volume, vibrate, snooze_limit, snooze_minutes, created_at, last_ring_time";

const HISTORY_COLUMNS: &str = "id, alarm_id, alarm_title, ring_time, dismiss_time, dismiss_type, \
     steps_taken, photo_similarity, photo_path, was_snoozed, snooze_count, notes";

#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
    db_path: Arc<PathBuf>,
}

impl Store {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create store directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("wakeproof-store".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite database")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("failed to enable WAL mode: {err}");
                }
                if let Err(err) = conn.pragma_update(None, "foreign_keys", "ON") {
                    error!("failed to enable foreign keys: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run store migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("store initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => task(&mut conn),
                        DbCommand::Shutdown => break,
                    }
                }

                info!("store thread shutting down");
            })
            .context("failed to spawn store worker thread")?;

        ready_rx
            .recv()
            .context("store worker exited before signaling readiness")??;

        info!("store initialized at {}", db_path.display());

        Ok(Self {
            inner: Arc::new(StoreInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("store caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to store thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("store thread terminated unexpectedly"))?
    }

    /// Apply one engine diff. This is the whole persistence contract: the
    /// engine decides, the store writes.
    pub async fn apply_alarm_diff(&self, diff: &AlarmDiff) -> Result<()> {
        match diff {
            AlarmDiff::Added { alarm } | AlarmDiff::Updated { alarm } => {
                self.upsert_alarm(alarm).await
            }
            AlarmDiff::Removed { alarm_id } => self.delete_alarm(alarm_id).await,
        }
    }

    pub async fn upsert_alarm(&self, alarm: &Alarm) -> Result<()> {
        let record = alarm.clone();
        self.execute(move |conn| {
            let repeat_days = serde_json::to_string(&record.repeat_days)
                .context("failed to encode repeat_days")?;
            let dismiss_method = serde_json::to_string(&record.dismiss_method)
                .context("failed to encode dismiss_method")?;
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO alarms ({ALARM_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                ),
                params![
                    record.id,
                    record.title,
                    i64::from(record.hour),
                    i64::from(record.minute),
                    repeat_days,
                    record.is_enabled as i64,
                    dismiss_method,
                    record.volume,
                    record.vibrate as i64,
                    i64::from(record.snooze_limit),
                    i64::from(record.snooze_minutes),
                    record.created_at.to_string(),
                    record.last_ring_time.map(|value| value.to_string()),
                ],
            )
            .context("failed to upsert alarm")?;
            Ok(())
        })
        .await
    }

    pub async fn delete_alarm(&self, alarm_id: &str) -> Result<()> {
        let alarm_id = alarm_id.to_string();
        self.execute(move |conn| {
            conn.execute("DELETE FROM alarms WHERE id = ?1", params![alarm_id])
                .context("failed to delete alarm")?;
            Ok(())
        })
        .await
    }

    /// Wall-clock order, matching how the engine keeps its in-memory list.
    pub async fn list_alarms(&self) -> Result<Vec<Alarm>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ALARM_COLUMNS} FROM alarms ORDER BY hour, minute, created_at"
            ))?;

            let mut rows = stmt.query([])?;
            let mut alarms = Vec::new();
            while let Some(row) = rows.next()? {
                alarms.push(alarm_from_row(row)?);
            }
            Ok(alarms)
        })
        .await
    }

    /// Insert-or-update by id: the engine emits the same entry twice, once
    /// unresolved at ring time and once resolved.
    pub async fn upsert_history(&self, entry: &HistoryEntry) -> Result<()> {
        let record = entry.clone();
        self.execute(move |conn| {
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO history ({HISTORY_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    record.id,
                    record.alarm_id,
                    record.alarm_title,
                    record.ring_time.to_string(),
                    record.dismiss_time.map(|value| value.to_string()),
                    record.dismiss_type.as_str(),
                    record.steps_taken.map(i64::from),
                    record.photo_similarity,
                    record.photo_path,
                    record.was_snoozed as i64,
                    i64::from(record.snooze_count),
                    record.notes,
                ],
            )
            .context("failed to upsert history entry")?;
            Ok(())
        })
        .await
    }

    /// Most recent first, for display.
    pub async fn list_history(&self, limit: Option<u32>) -> Result<Vec<HistoryEntry>> {
        self.execute(move |conn| {
            let mut sql = format!(
                "SELECT {HISTORY_COLUMNS} FROM history ORDER BY ring_time DESC"
            );
            if let Some(limit) = limit {
                sql.push_str(&format!(" LIMIT {limit}"));
            }

            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(history_from_row(row)?);
            }
            Ok(entries)
        })
        .await
    }

    /// User-initiated administrative deletion; the engine itself only appends.
    pub async fn delete_history_entry(&self, entry_id: &str) -> Result<()> {
        let entry_id = entry_id.to_string();
        self.execute(move |conn| {
            conn.execute("DELETE FROM history WHERE id = ?1", params![entry_id])
                .context("failed to delete history entry")?;
            Ok(())
        })
        .await
    }

    pub async fn clear_history(&self) -> Result<()> {
        self.execute(|conn| {
            conn.execute("DELETE FROM history", [])
                .context("failed to clear history")?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn photo_alarm() -> Alarm {
        let mut alarm = Alarm::new(
            "early shift",
            5,
            45,
            DismissMethod::Photo {
                reference_photo: Some("/photos/bathroom-sink.jpg".into()),
                similarity_threshold: 0.85,
            },
            at(0, 0),
        );
        alarm.repeat_days = [false, true, true, true, true, true, false];
        alarm.volume = 0.8;
        alarm
    }

    async fn open_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("wakeproof.sqlite3")).unwrap();
        (dir, store)
    }

    #[test]
    fn stored_datetime_text_round_trips() {
        // Display form, with and without fractional seconds.
        let whole = at(7, 0);
        assert_eq!(parse_datetime(&whole.to_string()).unwrap(), whole);

        let fractional = NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_milli_opt(7, 0, 15, 250)
            .unwrap();
        assert_eq!(parse_datetime(&fractional.to_string()).unwrap(), fractional);
    }

    #[test]
    fn out_of_range_columns_are_rejected() {
        assert!(to_u8(999, "hour").is_err());
        assert!(to_u32(-1, "snooze_count").is_err());
        assert_eq!(to_u8(23, "hour").unwrap(), 23);
    }

    #[tokio::test]
    async fn alarm_roundtrip_preserves_the_dismiss_method() {
        let (_dir, store) = open_store().await;
        let alarm = photo_alarm();

        store.upsert_alarm(&alarm).await.unwrap();
        let loaded = store.list_alarms().await.unwrap();
        assert_eq!(loaded, vec![alarm.clone()]);

        let mut renamed = alarm.clone();
        renamed.title = "earlier shift".into();
        renamed.last_ring_time = Some(at(5, 45));
        store.upsert_alarm(&renamed).await.unwrap();

        let loaded = store.list_alarms().await.unwrap();
        assert_eq!(loaded, vec![renamed]);

        store.delete_alarm(&alarm.id).await.unwrap();
        assert!(store.list_alarms().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn alarms_list_in_wall_clock_order() {
        let (_dir, store) = open_store().await;
        let late = Alarm::new(
            "nap",
            22,
            30,
            DismissMethod::Steps { required_steps: 10 },
            at(0, 0),
        );
        let early = Alarm::new(
            "run",
            6,
            0,
            DismissMethod::Steps { required_steps: 30 },
            at(0, 1),
        );

        store.upsert_alarm(&late).await.unwrap();
        store.upsert_alarm(&early).await.unwrap();

        let titles: Vec<String> = store
            .list_alarms()
            .await
            .unwrap()
            .into_iter()
            .map(|alarm| alarm.title)
            .collect();
        assert_eq!(titles, vec!["run", "nap"]);
    }

    #[tokio::test]
    async fn history_upsert_resolves_in_place() {
        let (_dir, store) = open_store().await;
        let alarm = photo_alarm();
        let mut entry = HistoryEntry::ring(&alarm, at(5, 45), 0);

        store.upsert_history(&entry).await.unwrap();

        entry.dismiss_time = Some(at(5, 47));
        entry.dismiss_type = DismissType::Photo;
        entry.photo_similarity = Some(0.91);
        entry.photo_path = Some("/photos/attempt.jpg".into());
        store.upsert_history(&entry).await.unwrap();

        let loaded = store.list_history(None).await.unwrap();
        assert_eq!(loaded, vec![entry.clone()]);

        store.delete_history_entry(&entry.id).await.unwrap();
        assert!(store.list_history(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_lists_most_recent_first_and_clears() {
        let (_dir, store) = open_store().await;
        let alarm = photo_alarm();

        for minute in [0, 10, 20] {
            let entry = HistoryEntry::ring(&alarm, at(6, minute), 0);
            store.upsert_history(&entry).await.unwrap();
        }

        let times: Vec<NaiveDateTime> = store
            .list_history(Some(2))
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.ring_time)
            .collect();
        assert_eq!(times, vec![at(6, 20), at(6, 10)]);

        store.clear_history().await.unwrap();
        assert!(store.list_history(None).await.unwrap().is_empty());
    }
}
