use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::core::todo::{FieldValue, NewTodo, Priority, TodoField, TodoId, TodoItem};

use super::client::RemoteClient;
use super::error::{FieldSyncError, Result, SyncError};

/// Where the most recent field edit of an item stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    /// No edit since the item was attached.
    Idle,
    /// Applied locally, waiting for the server.
    PendingRemoteUpdate,
    /// The server accepted the edit.
    Committed,
    /// The server refused the edit and the old value is back.
    RolledBack,
}

/// Ties one mirrored item to the server so its field edits are pushed as they happen.
#[derive(Debug)]
struct FieldSyncBinding {
    state: BindingState,
    last_field: Option<TodoField>,
}

impl FieldSyncBinding {
    fn attach() -> Self {
        Self {
            state: BindingState::Idle,
            last_field: None,
        }
    }

    fn begin(&mut self, field: TodoField) {
        self.state = BindingState::PendingRemoteUpdate;
        self.last_field = Some(field);
    }

    fn commit(&mut self) {
        self.state = BindingState::Committed;
    }

    fn roll_back(&mut self) {
        self.state = BindingState::RolledBack;
    }
}

/// A field edit applied locally and not yet settled by the server.
///
/// Dropped unsettled, it restores the previous value.
struct PendingEdit<'a> {
    item: &'a mut TodoItem,
    binding: Option<&'a mut FieldSyncBinding>,
    old: Option<FieldValue>,
}

impl<'a> PendingEdit<'a> {
    fn begin(
        item: &'a mut TodoItem,
        mut binding: Option<&'a mut FieldSyncBinding>,
        old: FieldValue,
    ) -> Self {
        if let Some(binding) = binding.as_deref_mut() {
            binding.begin(old.field());
        }
        Self {
            item,
            binding,
            old: Some(old),
        }
    }

    fn commit(mut self) {
        self.old = None;
        if let Some(binding) = self.binding.as_deref_mut() {
            binding.commit();
        }
    }

    fn roll_back(mut self) -> Option<FieldValue> {
        let old = self.old.take()?;
        self.item.apply(old.clone());
        if let Some(binding) = self.binding.as_deref_mut() {
            binding.roll_back();
        }
        Some(old)
    }
}

impl Drop for PendingEdit<'_> {
    fn drop(&mut self) {
        if let Some(old) = self.old.take() {
            log::warn!("Edit of todo {} abandoned, restoring {}", self.item.id, old);
            self.item.apply(old);
            if let Some(binding) = self.binding.as_deref_mut() {
                binding.roll_back();
            }
        }
    }
}

/// Local copy of the server's todo collection.
///
/// Contents only change after the server confirmed the matching call, so the mirror
/// always reflects the last known server state. The one exception is a field edit in
/// flight, which is applied first and rolled back if the server refuses it.
pub struct ItemMirror {
    client: Arc<RemoteClient>,
    items: Vec<TodoItem>,
    bindings: HashMap<TodoId, FieldSyncBinding>,
}

impl ItemMirror {
    pub fn new(client: Arc<RemoteClient>) -> Self {
        Self {
            client,
            items: Vec::new(),
            bindings: HashMap::new(),
        }
    }

    pub fn items(&self) -> &[TodoItem] {
        &self.items
    }

    pub fn get(&self, id: TodoId) -> Option<&TodoItem> {
        self.items.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn binding_state(&self, id: TodoId) -> Option<BindingState> {
        self.bindings.get(&id).map(|b| b.state)
    }

    /// Field touched by the most recent edit of `id`.
    pub fn last_edited_field(&self, id: TodoId) -> Option<TodoField> {
        self.bindings.get(&id).and_then(|b| b.last_field)
    }

    fn attach(&mut self, item: TodoItem) {
        self.bindings.insert(item.id, FieldSyncBinding::attach());
        self.items.push(item);
    }

    fn detach_all(&mut self) {
        self.bindings.clear();
        self.items.clear();
    }

    /// Create a todo on the server, then add the server's copy to the mirror.
    pub async fn create(&mut self, new: NewTodo) -> Result<&TodoItem> {
        let item = self.client.create_item(&new).await?;
        if self.bindings.contains_key(&item.id) {
            log::error!("Server returned id {} which is already mirrored", item.id);
            return Err(SyncError::InternalServerError(format!(
                "duplicate todo id {}",
                item.id
            )));
        }
        self.attach(item);
        Ok(&self.items[self.items.len() - 1])
    }

    /// Delete `id` on the server; drop it locally only once that succeeded.
    pub async fn remove(&mut self, id: TodoId) -> Result<()> {
        self.client.delete_item(id).await?;
        self.items.retain(|t| t.id != id);
        self.bindings.remove(&id);
        log::info!("Removed todo {}", id);
        Ok(())
    }

    /// Delete every todo on the server, then empty the mirror.
    pub async fn clear(&mut self) -> Result<()> {
        self.client.delete_all().await?;
        let dropped = self.items.len();
        self.detach_all();
        log::info!("Cleared {} todos", dropped);
        Ok(())
    }

    /// First load after startup.
    pub async fn load_initial_data(&mut self) -> Result<()> {
        self.reload().await
    }

    /// Replace the mirror with the server's collection.
    ///
    /// Existing items and bindings are dropped before the fetch, so a failed reload leaves
    /// the mirror empty rather than stale.
    pub async fn reload(&mut self) -> Result<()> {
        self.detach_all();
        let todos = self.client.fetch_all().await?;

        let mut seen = HashSet::new();
        if let Some(dup) = todos.iter().find(|t| !seen.insert(t.id)) {
            log::error!("Server listed todo id {} more than once", dup.id);
            return Err(SyncError::InternalServerError(format!(
                "duplicate todo id {}",
                dup.id
            )));
        }

        for item in todos {
            self.attach(item);
        }
        log::info!("Loaded {} todos", self.items.len());
        Ok(())
    }

    /// Apply one field edit locally and push it to the server.
    ///
    /// If the server refuses, the field is put back to its previous value and the error is
    /// returned. Dropping the future before the server answers also puts it back. Writing
    /// a field's current value is a no-op.
    pub async fn update_field(
        &mut self,
        id: TodoId,
        value: FieldValue,
    ) -> std::result::Result<(), FieldSyncError> {
        let field = value.field();
        let Some(pos) = self.items.iter().position(|t| t.id == id) else {
            return Err(FieldSyncError {
                field,
                restored: None,
                source: SyncError::NotFound(id),
            });
        };
        if self.items[pos].field(field) == value {
            return Ok(());
        }

        let old = self.items[pos].apply(value.clone());
        let edit = PendingEdit::begin(&mut self.items[pos], self.bindings.get_mut(&id), old);

        match self.client.update_field(id, &value).await {
            Ok(()) => {
                edit.commit();
                log::debug!("Todo {} {} set to {}", id, field, value);
                Ok(())
            }
            Err(source) => {
                let restored = edit.roll_back();
                if let Some(old) = &restored {
                    log::warn!("Rolled back {} of todo {} to {}: {}", field, id, old, source);
                }
                Err(FieldSyncError {
                    field,
                    restored,
                    source,
                })
            }
        }
    }

    pub async fn set_title(
        &mut self,
        id: TodoId,
        title: impl Into<String>,
    ) -> std::result::Result<(), FieldSyncError> {
        self.update_field(id, FieldValue::Title(title.into())).await
    }

    pub async fn set_date(
        &mut self,
        id: TodoId,
        date: NaiveDate,
    ) -> std::result::Result<(), FieldSyncError> {
        self.update_field(id, FieldValue::Date(date)).await
    }

    pub async fn set_priority(
        &mut self,
        id: TodoId,
        priority: Priority,
    ) -> std::result::Result<(), FieldSyncError> {
        self.update_field(id, FieldValue::Priority(priority)).await
    }

    pub async fn set_completed(
        &mut self,
        id: TodoId,
        completed: bool,
    ) -> std::result::Result<(), FieldSyncError> {
        self.update_field(id, FieldValue::Completed(completed)).await
    }
}
