use crate::record::{
    CampaignState, DeliveryMethod, MessageIdentity, MessageType, Payload, SeenStatus, StoredRecord,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Row, Transaction, params, params_from_iter};
use std::collections::HashSet;
use tracing::debug;

/// One scoped transaction over the message store.
///
/// Obtained through `MessageStore::with_session`; every operation in the
/// closure sees and produces a single atomic unit.
pub struct StoreSession<'tx> {
    tx: &'tx Transaction<'tx>,
}

impl<'tx> StoreSession<'tx> {
    pub(crate) fn new(tx: &'tx Transaction<'tx>) -> Self {
        Self { tx }
    }

    /// Identity set of every stored record, fetched in one query.
    pub fn identities(&self) -> Result<HashSet<MessageIdentity>> {
        let mut stmt = self
            .tx
            .prepare("SELECT message_id, is_silent FROM messages")?;
        let rows = stmt.query_map([], |row| {
            Ok(MessageIdentity {
                message_id: row.get(0)?,
                is_silent: row.get::<_, i64>(1)? != 0,
            })
        })?;
        let mut out = HashSet::new();
        for row in rows {
            out.insert(row?);
        }
        Ok(out)
    }

    /// Insert a batch of new records. A duplicate `message_id` fails the
    /// whole session: the ingestion diff guarantees ids are new, and a
    /// losing racer must abort rather than re-announce an existing message.
    pub fn create_records(&self, records: &[StoredRecord]) -> Result<()> {
        let mut stmt = self.tx.prepare(
            "INSERT INTO messages (
                message_id, payload, created_at, is_silent, delivery_method,
                seen_status, report_sent, message_type, campaign_id, campaign_state
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        for record in records {
            let payload = serde_json::to_string(&record.payload)
                .with_context(|| format!("failed to encode payload for {}", record.message_id))?;
            stmt.execute(params![
                record.message_id,
                payload,
                record.created_at.to_rfc3339(),
                record.is_silent as i64,
                record.delivery_method.as_str(),
                record.seen_status.as_i64(),
                record.report_sent as i64,
                record.message_type.as_str(),
                record.campaign_id,
                record.campaign_state.map(CampaignState::as_str),
            ])
            .with_context(|| format!("failed to insert record {}", record.message_id))?;
        }
        debug!("created {} message records", records.len());
        Ok(())
    }

    /// Flip `report_sent` for exactly the named batch. Returns the number
    /// of rows updated.
    pub fn mark_reported(&self, message_ids: &[String]) -> Result<usize> {
        if message_ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE messages SET report_sent = 1 WHERE message_id IN ({})",
            placeholders(message_ids.len())
        );
        let updated = self
            .tx
            .execute(&sql, params_from_iter(message_ids.iter()))
            .context("failed to mark records reported")?;
        debug!("marked {} records as reported", updated);
        Ok(updated)
    }

    pub fn unreported(&self) -> Result<Vec<StoredRecord>> {
        let mut stmt = self.tx.prepare(&format!(
            "SELECT {} FROM messages WHERE report_sent = 0 ORDER BY created_at",
            RECORD_COLUMNS
        ))?;
        collect_records(stmt.query_map([], row_to_record)?)
    }

    pub fn records_by_ids(&self, message_ids: &[String]) -> Result<Vec<StoredRecord>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM messages WHERE message_id IN ({}) ORDER BY created_at",
            RECORD_COLUMNS,
            placeholders(message_ids.len())
        );
        let mut stmt = self.tx.prepare(&sql)?;
        collect_records(stmt.query_map(params_from_iter(message_ids.iter()), row_to_record)?)
    }

    /// Advance seen status on the named records, returning the ids that
    /// actually changed. Records already past `NotSeen` are left alone.
    pub fn set_seen_status(
        &self,
        message_ids: &[String],
        status: SeenStatus,
    ) -> Result<Vec<String>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT message_id FROM messages
             WHERE message_id IN ({}) AND seen_status = 0",
            placeholders(message_ids.len())
        );
        let mut stmt = self.tx.prepare(&sql)?;
        let changed: Vec<String> = stmt
            .query_map(params_from_iter(message_ids.iter()), |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;

        if !changed.is_empty() {
            let sql = format!(
                "UPDATE messages SET seen_status = ?1 WHERE message_id IN ({})",
                placeholders_from(2, changed.len())
            );
            let mut args: Vec<rusqlite::types::Value> = vec![status.as_i64().into()];
            args.extend(changed.iter().map(|id| id.clone().into()));
            self.tx
                .execute(&sql, params_from_iter(args))
                .context("failed to update seen status")?;
        }
        Ok(changed)
    }

    pub fn meta_get(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .tx
            .prepare("SELECT value FROM store_meta WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    pub fn meta_set(&self, key: &str, value: &str) -> Result<()> {
        self.tx.execute(
            "INSERT INTO store_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

const RECORD_COLUMNS: &str = "message_id, payload, created_at, is_silent, delivery_method, \
     seen_status, report_sent, message_type, campaign_id, campaign_state";

fn placeholders(n: usize) -> String {
    placeholders_from(1, n)
}

fn placeholders_from(start: usize, n: usize) -> String {
    (start..start + n)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        message_id: row.get(0)?,
        payload: row.get(1)?,
        created_at: row.get(2)?,
        is_silent: row.get::<_, i64>(3)? != 0,
        delivery_method: row.get(4)?,
        seen_status: row.get(5)?,
        report_sent: row.get::<_, i64>(6)? != 0,
        message_type: row.get(7)?,
        campaign_id: row.get(8)?,
        campaign_state: row.get(9)?,
    })
}

/// Row image before the TEXT columns are parsed into their domain types.
struct RawRecord {
    message_id: String,
    payload: String,
    created_at: String,
    is_silent: bool,
    delivery_method: String,
    seen_status: i64,
    report_sent: bool,
    message_type: String,
    campaign_id: Option<String>,
    campaign_state: Option<String>,
}

impl RawRecord {
    fn into_record(self) -> Result<StoredRecord> {
        let payload: Payload = serde_json::from_str(&self.payload)
            .with_context(|| format!("bad stored payload for {}", self.message_id))?;
        let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&self.created_at)
            .with_context(|| format!("bad stored timestamp for {}", self.message_id))?
            .with_timezone(&Utc);
        Ok(StoredRecord {
            message_id: self.message_id,
            payload,
            created_at,
            is_silent: self.is_silent,
            delivery_method: DeliveryMethod::parse(&self.delivery_method)?,
            seen_status: SeenStatus::from_i64(self.seen_status)?,
            report_sent: self.report_sent,
            message_type: MessageType::parse(&self.message_type)?,
            campaign_id: self.campaign_id,
            campaign_state: self
                .campaign_state
                .as_deref()
                .map(CampaignState::parse)
                .transpose()?,
        })
    }
}

fn collect_records(
    rows: impl Iterator<Item = rusqlite::Result<RawRecord>>,
) -> Result<Vec<StoredRecord>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?.into_record()?);
    }
    Ok(out)
}
