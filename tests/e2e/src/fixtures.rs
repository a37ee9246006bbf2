//! Demo actors and data fixtures

use actor_runtime::{ActionRegistry, Actor, ActorContext, ActorError, BoxFuture, Manager, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use types::{now_ms, Timestamp};

/// Register every demo actor on `manager`
pub fn register_fixtures(manager: Manager) -> Manager {
    manager.register("counter", Counter).register("contacts", Contacts)
}

// ---------------------------------------------------------------------------
// Counter
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CounterState {
    pub count: i64,
}

pub struct Counter;

fn increment<'a>(ctx: &'a mut ActorContext<Counter>, args: Vec<Value>) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
        let by = args.first().and_then(Value::as_i64).unwrap_or(1);
        ctx.state_mut().count += by;
        let count = ctx.state().count;
        ctx.broadcast("newCount", vec![json!(count)]);
        Ok(json!(count))
    })
}

fn get_count<'a>(ctx: &'a mut ActorContext<Counter>, _args: Vec<Value>) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move { Ok(json!(ctx.state().count)) })
}

impl Actor for Counter {
    type State = CounterState;
    type Vars = ();

    fn actions(&self) -> ActionRegistry<Self> {
        ActionRegistry::new()
            .action("increment", increment)
            .action("getCount", get_count)
    }

    fn create_state(&self, _input: Option<&Value>) -> Result<Self::State> {
        Ok(CounterState::default())
    }

    fn create_vars(&self) -> Self::Vars {}
}

// ---------------------------------------------------------------------------
// Contacts sync
// ---------------------------------------------------------------------------

/// One synced contact; an empty name marks a deletion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub updated_at: Timestamp,
}

impl Contact {
    pub fn is_deleted(&self) -> bool {
        self.name.is_empty()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ContactsState {
    pub contacts: BTreeMap<String, Contact>,
    pub last_sync_time: Timestamp,
}

impl ContactsState {
    fn visible(&self) -> Vec<&Contact> {
        self.contacts.values().filter(|c| !c.is_deleted()).collect()
    }

    /// Last-writer-wins merge; returns whether anything was accepted
    pub fn merge(&mut self, incoming: Vec<Contact>) -> bool {
        let mut changed = false;
        for contact in incoming {
            let newer = self
                .contacts
                .get(&contact.id)
                .map_or(true, |existing| existing.updated_at < contact.updated_at);
            if newer {
                self.contacts.insert(contact.id.clone(), contact);
                changed = true;
            }
        }
        changed
    }
}

pub struct Contacts;

fn get_changes<'a>(ctx: &'a mut ActorContext<Contacts>, args: Vec<Value>) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
        let after = args.first().and_then(Value::as_i64).unwrap_or(0);
        let changes: Vec<&Contact> = ctx
            .state()
            .contacts
            .values()
            .filter(|c| c.updated_at > after)
            .collect();
        Ok(json!({ "changes": changes, "timestamp": now_ms() }))
    })
}

fn push_changes<'a>(ctx: &'a mut ActorContext<Contacts>, args: Vec<Value>) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
        let list = args.into_iter().next().unwrap_or(Value::Array(Vec::new()));
        let incoming: Vec<Contact> = serde_json::from_value(list).map_err(|e| {
            ActorError::user_with("invalid_argument", format!("pushChanges expects a contact list: {e}"), None)
        })?;

        let changed = ctx.state_mut().merge(incoming);
        ctx.state_mut().last_sync_time = now_ms();
        if changed {
            let contacts = json!({ "contacts": ctx.state().visible() });
            ctx.broadcast("contactsChanged", vec![contacts]);
        }
        Ok(json!({ "timestamp": ctx.state().last_sync_time }))
    })
}

fn get_all_contacts<'a>(ctx: &'a mut ActorContext<Contacts>, _args: Vec<Value>) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move { Ok(json!(ctx.state().visible())) })
}

fn get_sync_stats<'a>(ctx: &'a mut ActorContext<Contacts>, _args: Vec<Value>) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
        let state = ctx.state();
        let deleted = state.contacts.values().filter(|c| c.is_deleted()).count();
        Ok(json!({
            "totalContacts": state.contacts.len() - deleted,
            "deletedContacts": deleted,
            "lastSyncTime": state.last_sync_time,
        }))
    })
}

fn reset<'a>(ctx: &'a mut ActorContext<Contacts>, _args: Vec<Value>) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
        let state = ctx.state_mut();
        state.contacts.clear();
        state.last_sync_time = now_ms();
        let timestamp = state.last_sync_time;
        ctx.broadcast("contactsChanged", vec![json!({ "contacts": [] })]);
        Ok(json!({ "timestamp": timestamp }))
    })
}

impl Actor for Contacts {
    type State = ContactsState;
    type Vars = ();

    fn actions(&self) -> ActionRegistry<Self> {
        ActionRegistry::new()
            .action("getChanges", get_changes)
            .action("pushChanges", push_changes)
            .action("getAllContacts", get_all_contacts)
            .action("getSyncStats", get_sync_stats)
            .action("reset", reset)
    }

    fn create_state(&self, _input: Option<&Value>) -> Result<Self::State> {
        Ok(ContactsState {
            contacts: BTreeMap::new(),
            last_sync_time: now_ms(),
        })
    }

    fn create_vars(&self) -> Self::Vars {}
}

/// Builder for contacts pushed by test clients
pub struct ContactFixture {
    contact: Contact,
}

impl ContactFixture {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            contact: Contact {
                id: id.to_string(),
                name: name.to_string(),
                email: format!("{}@example.com", name.to_lowercase()),
                phone: String::new(),
                updated_at: now_ms(),
            },
        }
    }

    /// Tombstone for `id`
    pub fn deleted(id: &str) -> Self {
        Self::new(id, "")
    }

    pub fn updated_at(mut self, timestamp: Timestamp) -> Self {
        self.contact.updated_at = timestamp;
        self
    }

    pub fn with_phone(mut self, phone: &str) -> Self {
        self.contact.phone = phone.to_string();
        self
    }

    pub fn build(self) -> Contact {
        self.contact
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_is_last_writer_wins() {
        let mut state = ContactsState::default();
        assert!(state.merge(vec![ContactFixture::new("1", "Ada").updated_at(10).build()]));

        // Older and equal timestamps lose
        assert!(!state.merge(vec![ContactFixture::new("1", "Bob").updated_at(5).build()]));
        assert!(!state.merge(vec![ContactFixture::new("1", "Eve").updated_at(10).build()]));
        assert_eq!(state.contacts["1"].name, "Ada");

        assert!(state.merge(vec![ContactFixture::deleted("1").updated_at(11).build()]));
        assert!(state.visible().is_empty());
    }

    #[test]
    fn test_contact_wire_shape() {
        let contact = ContactFixture::new("7", "Grace").updated_at(42).build();
        let value = serde_json::to_value(&contact).unwrap();
        assert_eq!(value["updatedAt"], json!(42));
        assert_eq!(value["email"], json!("grace@example.com"));
    }
}
