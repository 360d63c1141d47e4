//! Database module for the concierge backend
//!
//! Provides persistence for the user -> thread session mapping, the order
//! record store, and the append-only contact log. All three live in one
//! SQLite database behind a single connection; the mutex serializes writes.

mod schema;

pub use schema::*;

use chrono::Utc;
use rand::seq::SliceRandom;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Session Operations ====================

    /// Look up the thread handle for a user, if one exists
    pub fn thread_for_user(&self, user_id: &str) -> DbResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let thread_id = conn
            .query_row(
                "SELECT thread_id FROM threads WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(thread_id)
    }

    /// Store a user -> thread mapping, keeping the existing one if a
    /// concurrent turn got there first. Returns the handle that ended up
    /// stored, which callers must use in place of their own candidate.
    pub fn insert_thread(&self, user_id: &str, thread_id: &str) -> DbResult<String> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO threads (user_id, thread_id, created_at) VALUES (?1, ?2, ?3)",
            params![user_id, thread_id, Utc::now().to_rfc3339()],
        )?;
        let stored = conn.query_row(
            "SELECT thread_id FROM threads WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(stored)
    }

    /// Delete every session mapping. Returns the number of rows removed.
    pub fn reset_threads(&self) -> DbResult<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM threads", [])?;
        Ok(deleted)
    }

    // ==================== Order Operations ====================

    /// Status for an order id. Ids outside the supported range and absent
    /// rows both read as `None`; absence is a normal outcome here.
    pub fn order_status(&self, order_id: u32) -> DbResult<Option<OrderStatus>> {
        if !SUPPORTED_ORDER_IDS.contains(&order_id) {
            return Ok(None);
        }
        let conn = self.conn.lock().unwrap();
        let label: Option<String> = conn
            .query_row(
                "SELECT status FROM orders WHERE id = ?1",
                params![order_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(label.as_deref().and_then(OrderStatus::parse))
    }

    /// Insert or replace a single order record
    pub fn put_order(&self, order_id: u32, status: OrderStatus) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO orders (id, status) VALUES (?1, ?2)",
            params![order_id, status.as_str()],
        )?;
        Ok(())
    }

    /// Populate the order store with the full supported id range, each with
    /// a random status. No-op when any orders already exist. Returns the
    /// number of rows inserted.
    pub fn seed_orders_if_empty(&self) -> DbResult<usize> {
        {
            let conn = self.conn.lock().unwrap();
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))?;
            if count > 0 {
                return Ok(0);
            }
        }
        let mut rng = rand::thread_rng();
        let mut inserted = 0;
        for order_id in SUPPORTED_ORDER_IDS {
            let status = *OrderStatus::ALL.choose(&mut rng).unwrap_or(&OrderStatus::Pending);
            self.put_order(order_id, status)?;
            inserted += 1;
        }
        Ok(inserted)
    }

    /// All order records in id order, for the reset-time diagnostic dump
    pub fn list_orders(&self) -> DbResult<Vec<(u32, OrderStatus)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, status FROM orders ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            let id: u32 = row.get(0)?;
            let label: String = row.get(1)?;
            Ok((id, label))
        })?;

        let mut orders = Vec::new();
        for row in rows {
            let (id, label) = row?;
            if let Some(status) = OrderStatus::parse(&label) {
                orders.push((id, status));
            }
        }
        Ok(orders)
    }

    // ==================== Contact Operations ====================

    /// Append one contact record. No uniqueness constraint and no format
    /// validation; field formats are hinted to users upstream by the
    /// assistant's own argument schema.
    pub fn append_contact(&self, contact: &ContactRecord) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO contacts (full_name, email, phone, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                contact.full_name,
                contact.email,
                contact.phone,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// All contact records in insertion order
    #[allow(dead_code)] // Used in tests
    pub fn list_contacts(&self) -> DbResult<Vec<ContactRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT full_name, email, phone FROM contacts ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(ContactRecord {
                full_name: row.get(0)?,
                email: row.get(1)?,
                phone: row.get(2)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }
}
