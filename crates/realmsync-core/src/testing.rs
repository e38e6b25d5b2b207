//! In-memory admin API used by unit tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use crate::api::{AdminApi, CreateOutcome, DeleteOutcome};
use crate::model::{CollectionKind, Component, LiveRealm};
use crate::{Error, Result};

#[derive(Default)]
pub struct FakeState {
    pub realms: BTreeMap<String, Value>,
    /// (realm, component)
    pub components: Vec<(String, Component)>,
    /// (realm, username) -> user id
    pub users: BTreeMap<(String, String), String>,
    /// (realm, user id, password) in call order
    pub password_resets: Vec<(String, String, String)>,
    /// Mutating calls in order
    pub mutations: Vec<String>,
    /// Calls whose label starts with this prefix fail with the status.
    pub fail: Option<(String, u16)>,
    /// Simulates another actor creating the user between lookup and create.
    pub user_created_concurrently: bool,
    next_id: u32,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn check(&self, label: &str) -> Result<()> {
        match &self.fail {
            Some((prefix, status)) if label.starts_with(prefix.as_str()) => Err(Error::Remote {
                call: label.to_string(),
                status: *status,
                body: "injected".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct FakeAdmin {
    pub state: Mutex<FakeState>,
}

impl FakeAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_realm(self, name: &str, representation: Value) -> Self {
        self.state
            .lock()
            .unwrap()
            .realms
            .insert(name.to_string(), representation);
        self
    }

    pub fn with_component(self, realm: &str, component: Value) -> Self {
        let component: Component = serde_json::from_value(component).unwrap();
        self.state
            .lock()
            .unwrap()
            .components
            .push((realm.to_string(), component));
        self
    }

    pub fn with_user(self, realm: &str, username: &str, id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .users
            .insert((realm.to_string(), username.to_string()), id.to_string());
        self
    }

    pub fn mutations(&self) -> Vec<String> {
        self.state.lock().unwrap().mutations.clone()
    }

    pub fn realm(&self, name: &str) -> Option<Value> {
        self.state.lock().unwrap().realms.get(name).cloned()
    }

    pub fn component(&self, realm: &str, id: &str) -> Option<Component> {
        self.state
            .lock()
            .unwrap()
            .components
            .iter()
            .find(|(r, c)| r == realm && c.id.as_deref() == Some(id))
            .map(|(_, c)| c.clone())
    }
}

#[async_trait]
impl AdminApi for FakeAdmin {
    async fn list_realms(&self) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        state.check("list realms")?;
        Ok(state.realms.keys().cloned().collect())
    }

    async fn create_realm(&self, representation: &Value) -> Result<CreateOutcome> {
        let mut state = self.state.lock().unwrap();
        let name = representation["realm"].as_str().unwrap_or_default().to_string();
        let label = format!("POST realm {name}");
        state.check(&label)?;
        state.mutations.push(label);
        if state.realms.contains_key(&name) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        let mut stored = representation.clone();
        stored["id"] = json!(state.next_id("realm"));
        state.realms.insert(name, stored);
        Ok(CreateOutcome::Created { id: None })
    }

    async fn fetch_realm(&self, realm: &str) -> Result<Option<LiveRealm>> {
        let state = self.state.lock().unwrap();
        state.check(&format!("GET realm {realm}"))?;
        Ok(state
            .realms
            .get(realm)
            .map(|value| LiveRealm::from_value(realm, value.clone()).unwrap()))
    }

    async fn replace_realm(&self, realm: &str, representation: &Value) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let label = format!("PUT realm {realm}");
        state.check(&label)?;
        state.mutations.push(label);
        let mut stored = representation.clone();
        // The server assigns ids to members created by the replace.
        for kind in CollectionKind::ALL {
            if let Some(members) = stored.get_mut(kind.field()).and_then(Value::as_array_mut) {
                for member in members {
                    if member.get("id").is_none() {
                        member["id"] = json!(state.next_id(kind.field()));
                    }
                }
            }
        }
        state.realms.insert(realm.to_string(), stored);
        Ok(())
    }

    async fn delete_realm(&self, realm: &str) -> Result<DeleteOutcome> {
        let mut state = self.state.lock().unwrap();
        let label = format!("DELETE realm {realm}");
        state.check(&label)?;
        state.mutations.push(label);
        Ok(match state.realms.remove(realm) {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::NotFound,
        })
    }

    async fn list_components(
        &self,
        realm: &str,
        parent_id: &str,
        provider_type: &str,
    ) -> Result<Vec<Component>> {
        let state = self.state.lock().unwrap();
        state.check(&format!("GET components {realm}"))?;
        Ok(state
            .components
            .iter()
            .filter(|(r, c)| {
                r == realm
                    && c.parent_id.as_deref().is_none_or(|p| p == parent_id)
                    && c.provider_type.as_deref() == Some(provider_type)
            })
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn replace_component(&self, realm: &str, component: &Component) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let id = component.id.clone().unwrap_or_default();
        let label = format!("PUT component {id}");
        state.check(&label)?;
        state.mutations.push(label);
        for (r, stored) in state.components.iter_mut() {
            if r == realm && stored.id.as_deref() == Some(id.as_str()) {
                *stored = component.clone();
            }
        }
        Ok(())
    }

    async fn find_user(&self, realm: &str, username: &str) -> Result<Option<String>> {
        let state = self.state.lock().unwrap();
        state.check(&format!("GET user {username}"))?;
        Ok(state
            .users
            .get(&(realm.to_string(), username.to_string()))
            .cloned())
    }

    async fn create_user(&self, realm: &str, username: &str) -> Result<CreateOutcome> {
        let mut state = self.state.lock().unwrap();
        let label = format!("POST user {username}");
        state.check(&label)?;
        state.mutations.push(label);
        let key = (realm.to_string(), username.to_string());
        if state.user_created_concurrently {
            let id = state.next_id("user");
            state.users.insert(key, id);
            return Ok(CreateOutcome::AlreadyExists);
        }
        if state.users.contains_key(&key) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        let id = state.next_id("user");
        state.users.insert(key, id.clone());
        Ok(CreateOutcome::Created { id: Some(id) })
    }

    async fn reset_password(&self, realm: &str, user_id: &str, password: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let label = format!("PUT reset-password {user_id}");
        state.check(&label)?;
        state.mutations.push(label);
        state
            .password_resets
            .push((realm.to_string(), user_id.to_string(), password.to_string()));
        Ok(())
    }
}

/// Counts `WARN` events seen on the current thread.
struct WarnCounter(Arc<AtomicUsize>);

impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Installs a thread-local subscriber that counts warnings until the guard drops.
pub fn count_warnings() -> (Arc<AtomicUsize>, DefaultGuard) {
    let count = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(WarnCounter(Arc::clone(&count)));
    (count, tracing::subscriber::set_default(subscriber))
}
