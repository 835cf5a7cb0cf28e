//! Inbox Storage - CRUD operations for inbox records

use crate::error::InboxError;
use crate::types::Inbox;
use redb::{ReadableTable, TableDefinition};

use super::messages::MESSAGES_TABLE;
use super::Storage;

/// Table for inboxes (key: inbox public key, value: serialized Inbox)
pub(crate) const INBOXES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("inboxes");

impl Storage {
    /// Save an inbox
    ///
    /// If an inbox with the same public key exists, it will be overwritten.
    pub fn save_inbox(&self, inbox: &Inbox) -> Result<(), InboxError> {
        let db = self.db_handle();
        let db_guard = db.read();
        let write_txn = db_guard.begin_write()?;
        {
            let mut table = write_txn.open_table(INBOXES_TABLE)?;
            let serialized = postcard::to_allocvec(inbox)
                .map_err(|e| InboxError::Serialization(e.to_string()))?;
            table.insert(inbox.public_key.as_str(), serialized.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Load an inbox by public key
    ///
    /// Returns `None` if no inbox exists for the given key.
    pub fn load_inbox(&self, public_key: &str) -> Result<Option<Inbox>, InboxError> {
        let db = self.db_handle();
        let db_guard = db.read();
        let read_txn = db_guard.begin_read()?;
        let table = read_txn.open_table(INBOXES_TABLE)?;

        if let Some(data) = table.get(public_key)? {
            let inbox: Inbox = postcard::from_bytes(data.value())
                .map_err(|e| InboxError::Serialization(e.to_string()))?;
            Ok(Some(inbox))
        } else {
            Ok(None)
        }
    }

    /// List all inboxes
    pub fn list_inboxes(&self) -> Result<Vec<Inbox>, InboxError> {
        let db = self.db_handle();
        let db_guard = db.read();
        let read_txn = db_guard.begin_read()?;
        let table = read_txn.open_table(INBOXES_TABLE)?;

        let mut inboxes = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let inbox: Inbox = postcard::from_bytes(value.value())
                .map_err(|e| InboxError::Serialization(e.to_string()))?;
            inboxes.push(inbox);
        }
        Ok(inboxes)
    }

    /// Delete an inbox together with all of its messages
    ///
    /// Returns `Ok(())` even if the inbox doesn't exist.
    pub fn delete_inbox(&self, public_key: &str) -> Result<(), InboxError> {
        let db = self.db_handle();
        let db_guard = db.read();
        let write_txn = db_guard.begin_write()?;
        {
            let mut inboxes = write_txn.open_table(INBOXES_TABLE)?;
            inboxes.remove(public_key)?;

            let mut messages = write_txn.open_table(MESSAGES_TABLE)?;
            super::messages::remove_inbox_messages(&mut messages, public_key)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Set or clear the pending server-registration marker
    ///
    /// Returns `false` if the inbox doesn't exist.
    pub fn set_awaiting_registration(
        &self,
        public_key: &str,
        awaiting: bool,
    ) -> Result<bool, InboxError> {
        let Some(mut inbox) = self.load_inbox(public_key)? else {
            return Ok(false);
        };
        inbox.awaiting_registration = awaiting;
        self.save_inbox(&inbox)?;
        Ok(true)
    }
}
