use rusqlite::{params, Connection, OptionalExtension};

use crate::analysis::AnalysisKey;

/// Stored analysis payload. `recommendations` is a JSON array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRow {
    pub summary: String,
    pub recommendations: String,
    pub generated_at: String,
}

fn analysis_row(row: &rusqlite::Row<'_>) -> Result<AnalysisRow, rusqlite::Error> {
    Ok(AnalysisRow {
        summary: row.get(0)?,
        recommendations: row.get(1)?,
        generated_at: row.get(2)?,
    })
}

// ── Primary analysis cache ─────────────────────────────────────────

pub fn get_primary_analysis(
    conn: &Connection,
    key: &AnalysisKey,
    prompt_version: &str,
) -> Result<Option<AnalysisRow>, rusqlite::Error> {
    conn.query_row(
        "SELECT summary, recommendations, generated_at FROM analysis_cache
         WHERE user_id = ?1 AND site_id = ?2 AND page_type = ?3
           AND start_date = ?4 AND end_date = ?5 AND prompt_version = ?6",
        params![
            key.user_id,
            key.site_id,
            key.page_type.as_str(),
            key.range.start_key(),
            key.range.end_key(),
            prompt_version
        ],
        analysis_row,
    )
    .optional()
}

pub fn put_primary_analysis(
    conn: &Connection,
    key: &AnalysisKey,
    row: &AnalysisRow,
    prompt_version: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO analysis_cache
         (user_id, site_id, page_type, start_date, end_date, summary, recommendations, generated_at, prompt_version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            key.user_id,
            key.site_id,
            key.page_type.as_str(),
            key.range.start_key(),
            key.range.end_key(),
            row.summary,
            row.recommendations,
            row.generated_at,
            prompt_version
        ],
    )?;
    Ok(())
}

// ── Legacy analysis cache ──────────────────────────────────────────

/// Most recent legacy entry for this user matching the four key fields,
/// written under `prompt_version`.
pub fn get_legacy_analysis(
    conn: &Connection,
    key: &AnalysisKey,
    prompt_version: &str,
) -> Result<Option<AnalysisRow>, rusqlite::Error> {
    conn.query_row(
        "SELECT summary, recommendations, generated_at FROM legacy_analysis_cache
         WHERE user_id = ?1 AND site_id = ?2 AND page_type = ?3
           AND start_date = ?4 AND end_date = ?5 AND prompt_version = ?6
         ORDER BY created_at DESC, id DESC LIMIT 1",
        params![
            key.user_id,
            key.site_id,
            key.page_type.as_str(),
            key.range.start_key(),
            key.range.end_key(),
            prompt_version
        ],
        analysis_row,
    )
    .optional()
}

pub fn insert_legacy_analysis(
    conn: &Connection,
    key: &AnalysisKey,
    row: &AnalysisRow,
    prompt_version: &str,
    created_at: &str,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO legacy_analysis_cache
         (user_id, site_id, page_type, start_date, end_date, summary, recommendations, generated_at, prompt_version, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            key.user_id,
            key.site_id,
            key.page_type.as_str(),
            key.range.start_key(),
            key.range.end_key(),
            row.summary,
            row.recommendations,
            row.generated_at,
            prompt_version,
            created_at
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Delete this user's legacy entries created before `cutoff`. Returns rows removed.
pub fn delete_legacy_before(
    conn: &Connection,
    user_id: &str,
    cutoff: &str,
) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "DELETE FROM legacy_analysis_cache WHERE user_id = ?1 AND created_at < ?2",
        params![user_id, cutoff],
    )
}

pub fn count_legacy_analyses(conn: &Connection, user_id: &str) -> Result<i64, rusqlite::Error> {
    conn.query_row(
        "SELECT COUNT(*) FROM legacy_analysis_cache WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )
}

// ── Usage ──────────────────────────────────────────────────────────

pub fn get_usage_count(
    conn: &Connection,
    user_id: &str,
    category: &str,
    period_key: &str,
) -> Result<i64, rusqlite::Error> {
    let count: Option<i64> = conn
        .query_row(
            "SELECT count FROM usage_counters
             WHERE user_id = ?1 AND category = ?2 AND period_key = ?3",
            params![user_id, category, period_key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(count.unwrap_or(0))
}

pub fn increment_usage(
    conn: &Connection,
    user_id: &str,
    category: &str,
    period_key: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO usage_counters (user_id, category, period_key, count, updated_at)
         VALUES (?1, ?2, ?3, 1, datetime('now'))
         ON CONFLICT(user_id, category, period_key) DO UPDATE SET
           count = usage_counters.count + 1,
           updated_at = excluded.updated_at",
        params![user_id, category, period_key],
    )?;
    Ok(())
}

pub fn get_usage_limit(
    conn: &Connection,
    user_id: &str,
    category: &str,
) -> Result<Option<i64>, rusqlite::Error> {
    conn.query_row(
        "SELECT monthly_limit FROM usage_limits WHERE user_id = ?1 AND category = ?2",
        params![user_id, category],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_usage_limit(
    conn: &Connection,
    user_id: &str,
    category: &str,
    monthly_limit: i64,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO usage_limits (user_id, category, monthly_limit, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))",
        params![user_id, category, monthly_limit],
    )?;
    Ok(())
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}
