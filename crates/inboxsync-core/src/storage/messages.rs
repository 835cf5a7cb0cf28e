//! Message Storage - per-inbox message sets
//!
//! Keys are `"{inbox_public_key}/{message_id}"`, so one inbox's messages are
//! a contiguous key range.

use crate::error::InboxError;
use crate::message::MessagePayload;
use redb::{ReadableTable, Table, TableDefinition};

use super::{MergeOutcome, Storage};

/// Table for messages (key: "{inbox}/{id}", value: serialized MessagePayload)
pub(crate) const MESSAGES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("messages");

fn message_key(public_key: &str, id: &str) -> String {
    format!("{}/{}", public_key, id)
}

fn inbox_prefix(public_key: &str) -> String {
    format!("{}/", public_key)
}

/// Remove every message stored under `public_key`, returning how many went.
pub(crate) fn remove_inbox_messages(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    public_key: &str,
) -> Result<usize, InboxError> {
    let prefix = inbox_prefix(public_key);
    let mut keys = Vec::new();
    for entry in table.range(prefix.as_str()..)? {
        let (key, _) = entry?;
        let key = key.value();
        if !key.starts_with(&prefix) {
            break;
        }
        keys.push(key.to_string());
    }
    for key in &keys {
        table.remove(key.as_str())?;
    }
    Ok(keys.len())
}

impl Storage {
    /// Insert or replace messages for an inbox, keyed by message id
    pub fn upsert_messages(
        &self,
        public_key: &str,
        payloads: &[MessagePayload],
    ) -> Result<MergeOutcome, InboxError> {
        let mut outcome = MergeOutcome::default();

        let db = self.db_handle();
        let db_guard = db.read();
        let write_txn = db_guard.begin_write()?;
        {
            let mut table = write_txn.open_table(MESSAGES_TABLE)?;
            for payload in payloads {
                let key = message_key(public_key, &payload.id);
                let serialized = postcard::to_allocvec(payload)
                    .map_err(|e| InboxError::Serialization(e.to_string()))?;

                let existed = table.get(key.as_str())?.is_some();
                table.insert(key.as_str(), serialized.as_slice())?;

                if existed {
                    outcome.updated += 1;
                } else {
                    outcome.inserted += 1;
                }
            }
        }
        write_txn.commit()?;
        Ok(outcome)
    }

    /// Remove all messages of an inbox, keeping the inbox itself
    pub fn purge_messages(&self, public_key: &str) -> Result<usize, InboxError> {
        let db = self.db_handle();
        let db_guard = db.read();
        let write_txn = db_guard.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(MESSAGES_TABLE)?;
            remove_inbox_messages(&mut table, public_key)?
        };
        write_txn.commit()?;
        Ok(removed)
    }

    /// Load one message
    pub fn load_message(
        &self,
        public_key: &str,
        id: &str,
    ) -> Result<Option<MessagePayload>, InboxError> {
        let db = self.db_handle();
        let db_guard = db.read();
        let read_txn = db_guard.begin_read()?;
        let table = read_txn.open_table(MESSAGES_TABLE)?;

        match table.get(message_key(public_key, id).as_str())? {
            Some(data) => {
                let payload: MessagePayload = postcard::from_bytes(data.value())
                    .map_err(|e| InboxError::Serialization(e.to_string()))?;
                Ok(Some(payload))
            }
            None => Ok(None),
        }
    }

    /// List an inbox's messages ordered by time
    pub fn list_messages(&self, public_key: &str) -> Result<Vec<MessagePayload>, InboxError> {
        let db = self.db_handle();
        let db_guard = db.read();
        let read_txn = db_guard.begin_read()?;
        let table = read_txn.open_table(MESSAGES_TABLE)?;

        let prefix = inbox_prefix(public_key);
        let mut messages = Vec::new();
        for entry in table.range(prefix.as_str()..)? {
            let (key, value) = entry?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            let payload: MessagePayload = postcard::from_bytes(value.value())
                .map_err(|e| InboxError::Serialization(e.to_string()))?;
            messages.push(payload);
        }

        messages.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.id.cmp(&b.id)));
        Ok(messages)
    }
}
