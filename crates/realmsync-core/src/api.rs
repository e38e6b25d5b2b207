//! The admin API surface consumed by the reconciler.
//!
//! [`crate::client::AdminClient`] implements it over HTTP. Every phase takes
//! `&dyn AdminApi`, so flows can be exercised against an in-memory fake.

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;
use crate::model::{Component, LiveRealm};

/// Result of a create call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The entity was created. `id` is taken from the `Location` header when
    /// the server sends one.
    Created { id: Option<String> },
    /// The server answered 409: the entity already exists.
    AlreadyExists,
}

/// Result of a delete call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Authenticated admin API calls.
#[async_trait]
pub trait AdminApi: Send + Sync {
    /// Names of every realm on the server.
    async fn list_realms(&self) -> Result<Vec<String>>;

    /// POST a realm representation. 409 is [`CreateOutcome::AlreadyExists`].
    async fn create_realm(&self, representation: &Value) -> Result<CreateOutcome>;

    /// GET a realm. 404 is `Ok(None)`.
    async fn fetch_realm(&self, realm: &str) -> Result<Option<LiveRealm>>;

    /// PUT a full realm representation.
    async fn replace_realm(&self, realm: &str, representation: &Value) -> Result<()>;

    async fn delete_realm(&self, realm: &str) -> Result<DeleteOutcome>;

    /// Components of `provider_type` whose parent is `parent_id`.
    async fn list_components(
        &self,
        realm: &str,
        parent_id: &str,
        provider_type: &str,
    ) -> Result<Vec<Component>>;

    /// PUT a full component representation. The component must carry an id.
    async fn replace_component(&self, realm: &str, component: &Component) -> Result<()>;

    /// Id of the user with exactly this username.
    async fn find_user(&self, realm: &str, username: &str) -> Result<Option<String>>;

    /// POST a minimal enabled user. 409 is [`CreateOutcome::AlreadyExists`].
    async fn create_user(&self, realm: &str, username: &str) -> Result<CreateOutcome>;

    /// PUT a non-temporary password credential.
    async fn reset_password(&self, realm: &str, user_id: &str, password: &str) -> Result<()>;
}
