//! SQLite entity store.
//!
//! Drone location is kept in the `current_base_id`/`current_pole_id` column
//! pair; a CHECK constraint forbids both being set. Each trait call runs on a
//! single connection behind a mutex, so individual updates are serialized.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use luminafly_core::{
    Base, Coordinate, Drone, DroneLocation, DroneStatus, EntityId, LampStatus, Mission,
    MissionStatus, MissionType, Pole,
};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};
use tracing::{debug, info};

use crate::filter::{BaseFilter, DroneFilter, MissionFilter, PoleFilter};
use crate::seed::{NewBase, NewDrone, NewPole, SeedableStore};
use crate::update::{DroneUpdate, MissionUpdate, NewMission, PoleUpdate};
use crate::{EntityStore, StoreError, StoreResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS bases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    lat REAL NOT NULL,
    lon REAL NOT NULL,
    capacity INTEGER NOT NULL DEFAULT 20,
    current_drones INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS poles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    lat REAL NOT NULL,
    lon REAL NOT NULL,
    drone_id INTEGER,
    lamp_status TEXT NOT NULL DEFAULT 'working'
        CHECK (lamp_status IN ('working', 'burned_out', 'offline'))
);

CREATE TABLE IF NOT EXISTS drones (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    serial_number TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL DEFAULT 'active',
    lamp_status TEXT NOT NULL DEFAULT 'working',
    battery_level INTEGER NOT NULL DEFAULT 100,
    current_lat REAL NOT NULL,
    current_lon REAL NOT NULL,
    current_base_id INTEGER,
    current_pole_id INTEGER,
    total_missions INTEGER NOT NULL DEFAULT 0,
    CHECK (current_base_id IS NULL OR current_pole_id IS NULL)
);

CREATE TABLE IF NOT EXISTS missions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    drone_id INTEGER NOT NULL,
    pole_id INTEGER,
    from_base_id INTEGER,
    to_base_id INTEGER,
    from_pole_id INTEGER,
    to_pole_id INTEGER,
    type TEXT NOT NULL DEFAULT 'replacement',
    status TEXT NOT NULL DEFAULT 'pending',
    created_at INTEGER NOT NULL,
    started_at INTEGER,
    completed_at INTEGER,
    failure_reason TEXT
);

CREATE INDEX IF NOT EXISTS idx_missions_status ON missions(status);
CREATE INDEX IF NOT EXISTS idx_poles_lamp_status ON poles(lamp_status);
"#;

const DRONE_COLUMNS: &str = "id, name, serial_number, status, lamp_status, battery_level, \
     current_lat, current_lon, current_base_id, current_pole_id, total_missions";
const POLE_COLUMNS: &str = "id, name, lat, lon, lamp_status, drone_id";
const BASE_COLUMNS: &str = "id, name, lat, lon, capacity, current_drones";
const MISSION_COLUMNS: &str = "id, drone_id, pole_id, from_base_id, to_base_id, from_pole_id, \
     to_pole_id, type, status, created_at, started_at, completed_at, failure_reason";

macro_rules! text_codec {
    ($to:ident, $from:ident, $ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        fn $to(value: $ty) -> &'static str {
            match value {
                $($ty::$variant => $text,)+
            }
        }

        fn $from(text: &str) -> Option<$ty> {
            match text {
                $($text => Some($ty::$variant),)+
                _ => None,
            }
        }
    };
}

text_codec!(drone_status_text, parse_drone_status, DroneStatus {
    Active => "active",
    Flying => "flying",
    Maintenance => "maintenance",
    Inactive => "inactive",
    Charging => "charging",
});

text_codec!(lamp_status_text, parse_lamp_status, LampStatus {
    Working => "working",
    BurnedOut => "burned_out",
    Offline => "offline",
});

text_codec!(mission_type_text, parse_mission_type, MissionType {
    Replacement => "replacement",
    Return => "return",
    Inspection => "inspection",
    Emergency => "emergency",
});

text_codec!(mission_status_text, parse_mission_status, MissionStatus {
    Pending => "pending",
    InProgress => "in_progress",
    Completed => "completed",
    Failed => "failed",
});

fn corrupt(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn text_column<T>(row: &Row<'_>, idx: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    parse(&text).ok_or_else(|| corrupt(idx, format!("unknown value '{}'", text)))
}

fn opt_id(value: Option<EntityId>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

fn opt_ts(value: Option<u64>) -> Value {
    value.map_or(Value::Null, |v| Value::Integer(v as i64))
}

fn drone_from_row(row: &Row<'_>) -> rusqlite::Result<Drone> {
    let base_id: Option<EntityId> = row.get(8)?;
    let pole_id: Option<EntityId> = row.get(9)?;
    let location = match (base_id, pole_id) {
        (Some(base), None) => DroneLocation::Base(base),
        (None, Some(pole)) => DroneLocation::Pole(pole),
        (None, None) => DroneLocation::InFlight,
        (Some(_), Some(_)) => return Err(corrupt(8, "drone docked at base and pole".to_string())),
    };
    let battery: i64 = row.get(5)?;
    let total_missions: i64 = row.get(10)?;

    Ok(Drone {
        id: row.get(0)?,
        name: row.get(1)?,
        serial_number: row.get(2)?,
        status: text_column(row, 3, parse_drone_status)?,
        lamp_status: text_column(row, 4, parse_lamp_status)?,
        battery_level: battery.clamp(0, 100) as u8,
        position: Coordinate::new(row.get(6)?, row.get(7)?),
        location,
        total_missions: u32::try_from(total_missions).unwrap_or(0),
    })
}

fn pole_from_row(row: &Row<'_>) -> rusqlite::Result<Pole> {
    Ok(Pole {
        id: row.get(0)?,
        name: row.get(1)?,
        position: Coordinate::new(row.get(2)?, row.get(3)?),
        lamp_status: text_column(row, 4, parse_lamp_status)?,
        drone_id: row.get(5)?,
    })
}

fn base_from_row(row: &Row<'_>) -> rusqlite::Result<Base> {
    let capacity: i64 = row.get(4)?;
    let current: i64 = row.get(5)?;
    Ok(Base {
        id: row.get(0)?,
        name: row.get(1)?,
        position: Coordinate::new(row.get(2)?, row.get(3)?),
        capacity: u32::try_from(capacity).unwrap_or(0),
        current_drones: u32::try_from(current).unwrap_or(0),
    })
}

fn mission_from_row(row: &Row<'_>) -> rusqlite::Result<Mission> {
    let ts = |idx: usize| -> rusqlite::Result<Option<u64>> {
        Ok(row.get::<_, Option<i64>>(idx)?.map(|v| v.max(0) as u64))
    };
    let created_at: i64 = row.get(9)?;

    Ok(Mission {
        id: row.get(0)?,
        drone_id: row.get(1)?,
        pole_id: row.get(2)?,
        from_base_id: row.get(3)?,
        to_base_id: row.get(4)?,
        from_pole_id: row.get(5)?,
        to_pole_id: row.get(6)?,
        mission_type: text_column(row, 7, parse_mission_type)?,
        status: text_column(row, 8, parse_mission_status)?,
        created_at: created_at.max(0) as u64,
        started_at: ts(10)?,
        completed_at: ts(11)?,
        failure_reason: row.get(12)?,
    })
}

/// WHERE clause builder with positional parameters
#[derive(Default)]
struct Conditions {
    clauses: Vec<&'static str>,
    values: Vec<Value>,
}

impl Conditions {
    fn bind(&mut self, clause: &'static str, value: Value) {
        self.clauses.push(clause);
        self.values.push(value);
    }

    fn raw(&mut self, clause: &'static str) {
        self.clauses.push(clause);
    }

    fn select(mut self, columns: &str, table: &str, limit: Option<usize>) -> (String, Vec<Value>) {
        let mut sql = format!("SELECT {} FROM {}", columns, table);
        if !self.clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY id");
        if let Some(limit) = limit {
            sql.push_str(" LIMIT ?");
            self.values.push(Value::Integer(limit as i64));
        }
        (sql, self.values)
    }
}

fn query_rows<T>(
    conn: &Connection,
    sql: &str,
    values: Vec<Value>,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> StoreResult<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params_from_iter(values.iter()), map)?
        .collect::<rusqlite::Result<Vec<T>>>()?;
    Ok(rows)
}

fn query_drones(conn: &Connection, filter: &DroneFilter) -> StoreResult<Vec<Drone>> {
    let mut cond = Conditions::default();
    if let Some(id) = filter.id {
        cond.bind("id = ?", Value::Integer(id));
    }
    if let Some(status) = filter.status {
        cond.bind("status = ?", Value::Text(drone_status_text(status).to_string()));
    }
    match filter.docked {
        Some(true) => cond.raw("current_base_id IS NOT NULL"),
        Some(false) => cond.raw("current_base_id IS NULL"),
        None => {}
    }
    if let Some(battery) = filter.battery_above {
        cond.bind("battery_level > ?", Value::Integer(i64::from(battery)));
    }
    let (sql, values) = cond.select(DRONE_COLUMNS, "drones", filter.limit);
    query_rows(conn, &sql, values, drone_from_row)
}

fn query_poles(conn: &Connection, filter: &PoleFilter) -> StoreResult<Vec<Pole>> {
    let mut cond = Conditions::default();
    if let Some(id) = filter.id {
        cond.bind("id = ?", Value::Integer(id));
    }
    if let Some(status) = filter.lamp_status {
        cond.bind("lamp_status = ?", Value::Text(lamp_status_text(status).to_string()));
    }
    match filter.has_drone {
        Some(true) => cond.raw("drone_id IS NOT NULL"),
        Some(false) => cond.raw("drone_id IS NULL"),
        None => {}
    }
    let (sql, values) = cond.select(POLE_COLUMNS, "poles", filter.limit);
    query_rows(conn, &sql, values, pole_from_row)
}

fn query_missions(conn: &Connection, filter: &MissionFilter) -> StoreResult<Vec<Mission>> {
    let mut cond = Conditions::default();
    if let Some(id) = filter.id {
        cond.bind("id = ?", Value::Integer(id));
    }
    if let Some(drone_id) = filter.drone_id {
        cond.bind("drone_id = ?", Value::Integer(drone_id));
    }
    if let Some(pole_id) = filter.pole_id {
        cond.bind("pole_id = ?", Value::Integer(pole_id));
    }
    if let Some(status) = filter.status {
        cond.bind("status = ?", Value::Text(mission_status_text(status).to_string()));
    }
    if let Some(kind) = filter.mission_type {
        cond.bind("type = ?", Value::Text(mission_type_text(kind).to_string()));
    }
    let (sql, values) = cond.select(MISSION_COLUMNS, "missions", None);
    query_rows(conn, &sql, values, mission_from_row)
}

fn single<T>(rows: Vec<T>, entity: &'static str, id: EntityId) -> StoreResult<T> {
    rows.into_iter().next().ok_or(StoreError::NotFound { entity, id })
}

/// Entity store persisted in a SQLite database
pub struct SqliteEntityStore {
    conn: Mutex<Connection>,
}

impl SqliteEntityStore {
    /// Create or open a store at `path`
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening entity store");

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Self::with_connection(conn)
    }

    /// Private database that lives as long as the store
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EntityStore for SqliteEntityStore {
    fn drones(&self, filter: &DroneFilter) -> StoreResult<Vec<Drone>> {
        query_drones(&self.conn(), filter)
    }

    fn poles(&self, filter: &PoleFilter) -> StoreResult<Vec<Pole>> {
        query_poles(&self.conn(), filter)
    }

    fn bases(&self, filter: &BaseFilter) -> StoreResult<Vec<Base>> {
        let mut cond = Conditions::default();
        if let Some(id) = filter.id {
            cond.bind("id = ?", Value::Integer(id));
        }
        let (sql, values) = cond.select(BASE_COLUMNS, "bases", None);
        query_rows(&self.conn(), &sql, values, base_from_row)
    }

    fn missions(&self, filter: &MissionFilter) -> StoreResult<Vec<Mission>> {
        query_missions(&self.conn(), filter)
    }

    fn update_drone(&self, id: EntityId, update: &DroneUpdate) -> StoreResult<Drone> {
        let conn = self.conn();

        let mut sets: Vec<&'static str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(status) = update.status {
            sets.push("status = ?");
            values.push(Value::Text(drone_status_text(status).to_string()));
        }
        if let Some(lamp_status) = update.lamp_status {
            sets.push("lamp_status = ?");
            values.push(Value::Text(lamp_status_text(lamp_status).to_string()));
        }
        if let Some(battery) = update.battery_level {
            sets.push("battery_level = ?");
            values.push(Value::Integer(i64::from(battery)));
        }
        if let Some(position) = update.position {
            sets.push("current_lat = ?");
            values.push(Value::Real(position.lat));
            sets.push("current_lon = ?");
            values.push(Value::Real(position.lon));
        }
        if let Some(location) = update.location {
            let (base, pole) = match location {
                DroneLocation::Base(base) => (Some(base), None),
                DroneLocation::Pole(pole) => (None, Some(pole)),
                DroneLocation::InFlight => (None, None),
            };
            sets.push("current_base_id = ?");
            values.push(opt_id(base));
            sets.push("current_pole_id = ?");
            values.push(opt_id(pole));
        }
        if update.missions_completed > 0 {
            sets.push("total_missions = total_missions + ?");
            values.push(Value::Integer(i64::from(update.missions_completed)));
        }

        if !sets.is_empty() {
            let sql = format!("UPDATE drones SET {} WHERE id = ?", sets.join(", "));
            values.push(Value::Integer(id));
            let changed = conn.execute(&sql, params_from_iter(values.iter()))?;
            if changed == 0 {
                return Err(StoreError::NotFound { entity: "drone", id });
            }
            debug!(drone_id = id, fields = sets.len(), "Drone updated");
        }

        single(query_drones(&conn, &DroneFilter::by_id(id))?, "drone", id)
    }

    fn update_pole(&self, id: EntityId, update: &PoleUpdate) -> StoreResult<Pole> {
        let conn = self.conn();

        if let Some(Some(drone_id)) = update.drone_id {
            let exists = conn
                .query_row("SELECT 1 FROM drones WHERE id = ?1", params![drone_id], |_| Ok(()))
                .optional()?
                .is_some();
            if !exists {
                return Err(StoreError::Rejected(format!(
                    "pole {id} cannot hold unknown drone {drone_id}"
                )));
            }
        }

        let mut sets: Vec<&'static str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(lamp_status) = update.lamp_status {
            sets.push("lamp_status = ?");
            values.push(Value::Text(lamp_status_text(lamp_status).to_string()));
        }
        if let Some(drone_id) = update.drone_id {
            sets.push("drone_id = ?");
            values.push(opt_id(drone_id));
        }

        if !sets.is_empty() {
            let sql = format!("UPDATE poles SET {} WHERE id = ?", sets.join(", "));
            values.push(Value::Integer(id));
            if conn.execute(&sql, params_from_iter(values.iter()))? == 0 {
                return Err(StoreError::NotFound { entity: "pole", id });
            }
        }

        single(query_poles(&conn, &PoleFilter::by_id(id))?, "pole", id)
    }

    fn create_mission(&self, mission: &NewMission) -> StoreResult<Mission> {
        let conn = self.conn();

        let drone_exists = conn
            .query_row("SELECT 1 FROM drones WHERE id = ?1", params![mission.drone_id], |_| Ok(()))
            .optional()?
            .is_some();
        if !drone_exists {
            return Err(StoreError::NotFound {
                entity: "drone",
                id: mission.drone_id,
            });
        }

        let mut created = mission.clone().into_mission(0);
        conn.execute(
            "INSERT INTO missions (drone_id, pole_id, from_base_id, to_base_id, from_pole_id, \
             to_pole_id, type, status, created_at, started_at, completed_at, failure_reason) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL, NULL)",
            params![
                created.drone_id,
                opt_id(created.pole_id),
                opt_id(created.from_base_id),
                opt_id(created.to_base_id),
                opt_id(created.from_pole_id),
                opt_id(created.to_pole_id),
                mission_type_text(created.mission_type),
                mission_status_text(created.status),
                created.created_at as i64,
                opt_ts(created.started_at),
            ],
        )?;
        created.id = conn.last_insert_rowid();
        Ok(created)
    }

    fn update_mission(&self, id: EntityId, update: &MissionUpdate) -> StoreResult<Mission> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let mut mission = single(query_missions(&tx, &MissionFilter::by_id(id))?, "mission", id)?;
        update.apply(&mut mission)?;

        tx.execute(
            "UPDATE missions SET status = ?1, started_at = ?2, completed_at = ?3, failure_reason = ?4 \
             WHERE id = ?5",
            params![
                mission_status_text(mission.status),
                opt_ts(mission.started_at),
                opt_ts(mission.completed_at),
                mission.failure_reason,
                id,
            ],
        )?;
        tx.commit()?;
        Ok(mission)
    }
}

impl SeedableStore for SqliteEntityStore {
    fn insert_base(&self, base: &NewBase) -> StoreResult<Base> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO bases (name, lat, lon, capacity) VALUES (?1, ?2, ?3, ?4)",
            params![base.name, base.position.lat, base.position.lon, i64::from(base.capacity)],
        )?;
        Ok(base.clone().into_base(conn.last_insert_rowid()))
    }

    fn insert_pole(&self, pole: &NewPole) -> StoreResult<Pole> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO poles (name, lat, lon) VALUES (?1, ?2, ?3)",
            params![pole.name, pole.position.lat, pole.position.lon],
        )?;
        Ok(pole.clone().into_pole(conn.last_insert_rowid()))
    }

    fn insert_drone(&self, drone: &NewDrone) -> StoreResult<Drone> {
        let conn = self.conn();
        let (base, pole) = match drone.location {
            DroneLocation::Base(base) => (Some(base), None),
            DroneLocation::Pole(pole) => (None, Some(pole)),
            DroneLocation::InFlight => (None, None),
        };
        conn.execute(
            "INSERT INTO drones (name, serial_number, status, battery_level, current_lat, \
             current_lon, current_base_id, current_pole_id) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                drone.name,
                drone.serial_number,
                drone_status_text(drone.status),
                i64::from(drone.battery_level),
                drone.position.lat,
                drone.position.lon,
                opt_id(base),
                opt_id(pole),
            ],
        )?;
        Ok(drone.clone().into_drone(conn.last_insert_rowid()))
    }
}
