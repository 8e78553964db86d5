//! SQLite event store
//!
//! One table for sensor readings, one for device status events. Writes run
//! on the blocking pool so the async runtime never waits on disk.

use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::{EventStore, PersistenceError, PersistenceResult};
use crate::events::{DeviceKind, DeviceStatus, EventRecord, SensorKind};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sensor_readings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    value REAL NOT NULL,
    severity TEXT,
    captured_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sensor_readings_kind_time
    ON sensor_readings (kind, captured_at);

CREATE TABLE IF NOT EXISTS device_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    device TEXT NOT NULL,
    status TEXT,
    method TEXT,
    mode TEXT,
    position INTEGER,
    captured_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_device_events_device_time
    ON device_events (device, captured_at);
"#;

/// SQLite-backed [`EventStore`]
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a database file and ensure the schema exists
    pub fn open(path: impl AsRef<Path>) -> PersistenceResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;
        tracing::info!(path = ?path, "Opened event store");
        Self::from_connection(conn)
    }

    /// In-memory database, mostly useful for tests
    pub fn open_in_memory() -> PersistenceResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> PersistenceResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Number of stored sensor readings, optionally for one kind
    pub fn count_sensor_readings(&self, kind: Option<SensorKind>) -> PersistenceResult<i64> {
        let conn = lock(&self.conn)?;
        let count = match kind {
            Some(kind) => conn.query_row(
                "SELECT COUNT(*) FROM sensor_readings WHERE kind = ?1",
                params![kind.as_str()],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM sensor_readings", [], |row| row.get(0))?,
        };
        Ok(count)
    }

    /// Number of stored device events, optionally for one device
    pub fn count_device_events(&self, device: Option<DeviceKind>) -> PersistenceResult<i64> {
        let conn = lock(&self.conn)?;
        let count = match device {
            Some(device) => conn.query_row(
                "SELECT COUNT(*) FROM device_events WHERE device = ?1",
                params![device.as_str()],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM device_events", [], |row| row.get(0))?,
        };
        Ok(count)
    }
}

fn lock(conn: &Mutex<Connection>) -> PersistenceResult<std::sync::MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| PersistenceError::Unavailable("connection lock poisoned".to_string()))
}

fn insert(conn: &Connection, record: &EventRecord) -> PersistenceResult<()> {
    match record {
        EventRecord::Telemetry { sample, severity } => {
            conn.execute(
                "INSERT INTO sensor_readings (kind, value, severity, captured_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    sample.kind().as_str(),
                    sample.value(),
                    severity.map(|s| s.as_str()),
                    sample.captured_at().to_rfc3339(),
                ],
            )?;
        }
        EventRecord::Device(event) => {
            let (status, method, mode, position) = match event.status() {
                DeviceStatus::Door { status, method } => {
                    (Some(status.as_str()), Some(method.as_str()), None, None)
                }
                DeviceStatus::Lamp { status, mode } => {
                    (Some(status.as_str()), None, Some(mode.as_str()), None)
                }
                DeviceStatus::Curtain { position, mode } => {
                    (None, None, Some(mode.as_str()), Some(*position))
                }
            };
            conn.execute(
                "INSERT INTO device_events (device, status, method, mode, position, captured_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    event.kind().as_str(),
                    status,
                    method,
                    mode,
                    position,
                    event.captured_at().to_rfc3339(),
                ],
            )?;
        }
    }
    Ok(())
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn save(&self, record: &EventRecord) -> Result<(), PersistenceError> {
        let conn = Arc::clone(&self.conn);
        let record = record.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            insert(&conn, &record)
        })
        .await
        .map_err(|e| PersistenceError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::Severity;
    use crate::events::{DeviceStatusEvent, TelemetrySample};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_save_sensor_reading() {
        let store = SqliteStore::open_in_memory().unwrap();
        let record = EventRecord::Telemetry {
            sample: TelemetrySample::new(SensorKind::Gas, 650.0),
            severity: Some(Severity::Danger),
        };

        store.save(&record).await.unwrap();

        assert_eq!(store.count_sensor_readings(Some(SensorKind::Gas)).unwrap(), 1);
        assert_eq!(
            store.count_sensor_readings(Some(SensorKind::Temperature)).unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_save_device_events() {
        let store = SqliteStore::open_in_memory().unwrap();

        let door = EventRecord::Device(DeviceStatusEvent::new(DeviceStatus::Door {
            status: "locked".to_string(),
            method: "pin".to_string(),
        }));
        let curtain = EventRecord::Device(DeviceStatusEvent::new(DeviceStatus::Curtain {
            position: 40,
            mode: "auto".to_string(),
        }));

        store.save(&door).await.unwrap();
        store.save(&curtain).await.unwrap();

        assert_eq!(store.count_device_events(None).unwrap(), 2);
        assert_eq!(store.count_device_events(Some(DeviceKind::Door)).unwrap(), 1);
        assert_eq!(store.count_device_events(Some(DeviceKind::Lamp)).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_open_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("events.db");

        let store = SqliteStore::open(&path).unwrap();
        store
            .save(&EventRecord::Telemetry {
                sample: TelemetrySample::new(SensorKind::Light, 320.0),
                severity: None,
            })
            .await
            .unwrap();

        assert!(path.exists());
        assert_eq!(store.count_sensor_readings(None).unwrap(), 1);
    }
}
