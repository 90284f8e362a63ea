mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use uuid::Uuid;

use crate::calc::StepId;
use crate::models::*;

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "carbon-ledger")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let db_path = dirs.data_dir().join("carbon-ledger.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Project operations
    // ============================================================

    pub fn get_all_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, name, description, created_at, updated_at
             FROM projects ORDER BY name",
        )?;

        let projects = stmt
            .query_map([], project_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(projects)
    }

    pub fn get_project(&self, id: Uuid) -> Result<Option<Project>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let project = conn
            .query_row(
                "SELECT id, name, description, created_at, updated_at
                 FROM projects WHERE id = ?",
                [id.to_string()],
                project_from_row,
            )
            .optional()?;
        Ok(project)
    }

    pub fn create_project(&self, input: CreateProjectInput) -> Result<Project> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO projects (id, name, description, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
            (
                id.to_string(),
                &input.name,
                &input.description,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;

        Ok(Project {
            id,
            name: input.name,
            description: input.description,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn update_project(&self, id: Uuid, input: UpdateProjectInput) -> Result<Option<Project>> {
        let Some(existing) = self.get_project(id)? else {
            return Ok(None);
        };

        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();
        let name = input.name.unwrap_or(existing.name);
        let description = input.description.or(existing.description);

        conn.execute(
            "UPDATE projects SET name = ?, description = ?, updated_at = ? WHERE id = ?",
            (&name, &description, now.to_rfc3339(), id.to_string()),
        )?;

        Ok(Some(Project {
            id,
            name,
            description,
            created_at: existing.created_at,
            updated_at: now,
        }))
    }

    /// Delete a project. Its step records go with it.
    pub fn delete_project(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM projects WHERE id = ?", [id.to_string()])?;
        Ok(rows > 0)
    }

    pub fn get_project_with_steps(&self, id: Uuid) -> Result<Option<ProjectWithSteps>> {
        let Some(project) = self.get_project(id)? else {
            return Ok(None);
        };

        let completed_steps = self
            .get_step_records(id)?
            .into_iter()
            .map(|record| record.step)
            .collect();

        Ok(Some(ProjectWithSteps {
            project,
            completed_steps,
        }))
    }

    // ============================================================
    // Step record operations
    // ============================================================

    /// All saved steps of a project, in form order.
    pub fn get_step_records(&self, project_id: Uuid) -> Result<Vec<StepRecord>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        query_step_records(&conn, project_id)
    }

    pub fn get_step_record(&self, project_id: Uuid, step: StepId) -> Result<Option<StepRecord>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        query_step_record(&conn, project_id, step)
    }

    /// Insert or replace the record of one step.
    pub fn save_step_record(
        &self,
        project_id: Uuid,
        step: StepId,
        values: &StepValues,
    ) -> Result<StepRecord> {
        self.get_project(project_id)?
            .ok_or_else(|| anyhow::anyhow!("Project not found"))?;

        let conn = self.conn.lock().expect("database lock poisoned");
        upsert_step_record(&conn, project_id, step, values)?;
        touch_project(&conn, project_id)?;
        query_step_record(&conn, project_id, step)?
            .ok_or_else(|| anyhow::anyhow!("Step record vanished after save"))
    }

    /// Insert or replace several step records in one transaction.
    pub fn bulk_save_step_records(
        &self,
        project_id: Uuid,
        entries: &[(StepId, StepValues)],
    ) -> Result<Vec<StepRecord>> {
        self.get_project(project_id)?
            .ok_or_else(|| anyhow::anyhow!("Project not found"))?;

        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        for (step, values) in entries {
            upsert_step_record(&tx, project_id, *step, values)?;
        }
        touch_project(&tx, project_id)?;

        let mut records = Vec::with_capacity(entries.len());
        for (step, _) in entries {
            if let Some(record) = query_step_record(&tx, project_id, *step)? {
                records.push(record);
            }
        }
        tx.commit()?;

        tracing::info!(
            project_id = %project_id,
            steps = records.len(),
            "Saved step records in bulk"
        );
        Ok(records)
    }

    /// Read, edit and write a project's step records as one unit.
    ///
    /// Runs under a single lock in an immediate transaction, so no other save
    /// can land between the read and the write. `remove` is deleted first;
    /// `rewrite` then sees the remaining records in form order and returns
    /// the entries to upsert. Fails with "Step record not found" when
    /// `remove` names a step that has no record.
    pub fn rewrite_step_records<F>(
        &self,
        project_id: Uuid,
        remove: Option<StepId>,
        rewrite: F,
    ) -> Result<Vec<StepRecord>>
    where
        F: FnOnce(&[StepRecord]) -> Vec<(StepId, StepValues)>,
    {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.query_row(
            "SELECT id FROM projects WHERE id = ?",
            [project_id.to_string()],
            |row| row.get::<_, String>(0),
        )
        .optional()?
        .ok_or_else(|| anyhow::anyhow!("Project not found"))?;

        if let Some(step) = remove {
            let rows = tx.execute(
                "DELETE FROM step_records WHERE project_id = ? AND step = ?",
                (project_id.to_string(), step.number()),
            )?;
            if rows == 0 {
                anyhow::bail!("Step record not found");
            }
        }

        let current = query_step_records(&tx, project_id)?;
        let entries = rewrite(&current);

        for (step, values) in &entries {
            upsert_step_record(&tx, project_id, *step, values)?;
        }
        touch_project(&tx, project_id)?;

        let mut records = Vec::with_capacity(entries.len());
        for (step, _) in &entries {
            if let Some(record) = query_step_record(&tx, project_id, *step)? {
                records.push(record);
            }
        }
        tx.commit()?;

        tracing::debug!(
            project_id = %project_id,
            removed = ?remove,
            written = records.len(),
            "Rewrote step records"
        );
        Ok(records)
    }

    /// Reset a step by removing its record.
    pub fn delete_step_record(&self, project_id: Uuid, step: StepId) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "DELETE FROM step_records WHERE project_id = ? AND step = ?",
            (project_id.to_string(), step.number()),
        )?;
        Ok(rows > 0)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

fn project_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: parse_uuid(row.get::<_, String>(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: parse_datetime(row.get::<_, String>(3)?),
        updated_at: parse_datetime(row.get::<_, String>(4)?),
    })
}

/// `None` for rows whose step number is no longer known.
fn step_record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Option<StepRecord>> {
    let Some(step) = StepId::from_number(row.get::<_, u8>(1)?) else {
        return Ok(None);
    };
    let values_json: String = row.get(2)?;
    let values: StepValues = serde_json::from_str(&values_json).unwrap_or_else(|e| {
        tracing::warn!(step = %step, "Unreadable step values, treating as empty: {}", e);
        StepValues::new()
    });

    Ok(Some(StepRecord {
        project_id: parse_uuid(row.get::<_, String>(0)?),
        step,
        values,
        created_at: parse_datetime(row.get::<_, String>(3)?),
        updated_at: parse_datetime(row.get::<_, String>(4)?),
    }))
}

fn query_step_records(conn: &Connection, project_id: Uuid) -> Result<Vec<StepRecord>> {
    let mut stmt = conn.prepare(
        "SELECT project_id, step, field_values, created_at, updated_at
         FROM step_records WHERE project_id = ? ORDER BY step",
    )?;

    let records = stmt
        .query_map([project_id.to_string()], step_record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records.into_iter().flatten().collect())
}

fn query_step_record(
    conn: &Connection,
    project_id: Uuid,
    step: StepId,
) -> Result<Option<StepRecord>> {
    let record = conn
        .query_row(
            "SELECT project_id, step, field_values, created_at, updated_at
             FROM step_records WHERE project_id = ? AND step = ?",
            (project_id.to_string(), step.number()),
            step_record_from_row,
        )
        .optional()?;
    Ok(record.flatten())
}

fn upsert_step_record(
    conn: &Connection,
    project_id: Uuid,
    step: StepId,
    values: &StepValues,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO step_records (project_id, step, field_values, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(project_id, step) DO UPDATE SET
            field_values = excluded.field_values,
            updated_at = excluded.updated_at",
        (
            project_id.to_string(),
            step.number(),
            serde_json::to_string(values)?,
            &now,
            &now,
        ),
    )?;
    Ok(())
}

fn touch_project(conn: &Connection, project_id: Uuid) -> Result<()> {
    conn.execute(
        "UPDATE projects SET updated_at = ? WHERE id = ?",
        (Utc::now().to_rfc3339(), project_id.to_string()),
    )?;
    Ok(())
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
