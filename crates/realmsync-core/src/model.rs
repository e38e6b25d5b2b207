//! Typed realm documents.
//!
//! Realm representations are open-ended JSON objects, but the reconciler only
//! owns a small part of them: an allow-list of top-level scalar fields and a
//! fixed set of named collections. Those parts are lifted into typed records
//! here; everything else travels verbatim inside a [`Document`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A JSON object as returned or accepted by the admin API.
pub type Document = Map<String, Value>;

/// Field carrying the server-assigned identifier on realms and sub-entities.
pub const ID_FIELD: &str = "id";

/// Field carrying the realm name.
pub const REALM_FIELD: &str = "realm";

/// Top-level realm fields a desired document is allowed to override.
pub const REALM_SCALAR_FIELDS: &[&str] = &[
    "realm",
    "enabled",
    "registrationAllowed",
    "loginWithEmailAllowed",
    "duplicateEmailsAllowed",
    "ssoSessionIdleTimeout",
    "ssoSessionMaxLifespan",
    "accessCodeLifespan",
    "accessCodeLifespanUserAction",
    "accessCodeLifespanLogin",
    "groups",
];

/// Named collections inside a realm that are owned wholesale by the desired
/// document when it declares them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectionKind {
    Clients,
    AuthenticationFlows,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 2] = [CollectionKind::Clients, CollectionKind::AuthenticationFlows];

    /// Name of the array field holding the collection in a realm document.
    pub fn field(self) -> &'static str {
        match self {
            Self::Clients => "clients",
            Self::AuthenticationFlows => "authenticationFlows",
        }
    }

    /// Member field used as the natural key.
    pub fn natural_key_field(self) -> &'static str {
        match self {
            Self::Clients => "clientId",
            Self::AuthenticationFlows => "alias",
        }
    }

    /// Extracts the natural key of a raw collection member.
    pub fn natural_key(self, member: &Value) -> Option<&str> {
        member
            .get(self.natural_key_field())
            .and_then(Value::as_str)
            .filter(|key| !key.is_empty())
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field())
    }
}

/// A member of a realm collection.
///
/// `fields` holds the whole member document except the identifier, which is
/// kept apart in `remote_id` so it can be stamped or stripped explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct SubEntity {
    pub natural_key: String,
    pub remote_id: Option<String>,
    pub fields: Document,
}

impl SubEntity {
    /// Lifts a raw collection member. Returns `None` for members that are not
    /// objects or carry no natural key.
    pub fn from_value(kind: CollectionKind, value: &Value) -> Option<Self> {
        let natural_key = kind.natural_key(value)?.to_string();
        let mut fields = value.as_object()?.clone();
        let remote_id = fields
            .remove(ID_FIELD)
            .and_then(|id| id.as_str().map(str::to_string));
        Some(Self {
            natural_key,
            remote_id,
            fields,
        })
    }

    /// Copy of this member carrying `remote_id` instead of its own.
    pub fn with_remote_id(&self, remote_id: Option<String>) -> Self {
        Self {
            natural_key: self.natural_key.clone(),
            remote_id,
            fields: self.fields.clone(),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut fields = self.fields.clone();
        if let Some(id) = &self.remote_id {
            fields.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        }
        Value::Object(fields)
    }
}

/// Lifts every keyed member of a collection array. Members without a natural
/// key are skipped.
pub fn collection_members(kind: CollectionKind, members: &[Value]) -> Vec<SubEntity> {
    members
        .iter()
        .filter_map(|member| {
            let entity = SubEntity::from_value(kind, member);
            if entity.is_none() {
                tracing::debug!(collection = %kind, "skipping collection member without natural key");
            }
            entity
        })
        .collect()
}

/// Desired state of one realm, parsed from its document.
#[derive(Debug, Clone)]
pub struct DesiredRealm {
    name: String,
    id: Option<String>,
    scalars: Document,
    collections: BTreeMap<CollectionKind, Vec<SubEntity>>,
    ignored_fields: Vec<String>,
    source: Document,
}

impl DesiredRealm {
    /// Parses a realm document declared for `name`.
    ///
    /// The document's own `realm` field, when present, must match `name`:
    /// replacing a realm with a differently named document would rename it.
    pub fn from_value(name: &str, value: Value) -> Result<Self, String> {
        let Value::Object(source) = value else {
            return Err("top-level value must be a JSON object".to_string());
        };

        if let Some(declared) = source.get(REALM_FIELD) {
            match declared.as_str() {
                Some(declared) if declared == name => {}
                Some(declared) => {
                    return Err(format!("declares realm \"{declared}\" but is managed as \"{name}\""));
                }
                None => return Err("field \"realm\" must be a string".to_string()),
            }
        }

        let id = source
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut scalars = Document::new();
        let mut ignored_fields = Vec::new();
        for (key, value) in &source {
            if REALM_SCALAR_FIELDS.contains(&key.as_str()) {
                scalars.insert(key.clone(), value.clone());
            } else if key != ID_FIELD && !CollectionKind::ALL.iter().any(|k| k.field() == key) {
                ignored_fields.push(key.clone());
            }
        }

        let mut collections = BTreeMap::new();
        for kind in CollectionKind::ALL {
            match source.get(kind.field()) {
                None | Some(Value::Null) => {}
                Some(Value::Array(members)) => {
                    collections.insert(kind, collection_members(kind, members));
                }
                Some(_) => return Err(format!("field \"{kind}\" must be an array")),
            }
        }

        Ok(Self {
            name: name.to_string(),
            id,
            scalars,
            collections,
            ignored_fields,
            source,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Allow-listed scalar fields declared by the document.
    pub fn scalars(&self) -> &Document {
        &self.scalars
    }

    /// Members of `kind`, or `None` when the document does not declare the
    /// collection at all.
    pub fn collection(&self, kind: CollectionKind) -> Option<&[SubEntity]> {
        self.collections.get(&kind).map(Vec::as_slice)
    }

    /// Top-level fields outside the reconciler's authority.
    pub fn ignored_fields(&self) -> &[String] {
        &self.ignored_fields
    }

    /// The document exactly as declared, for create-only flows.
    pub fn source(&self) -> &Document {
        &self.source
    }
}

/// Current remote representation of a realm.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveRealm {
    name: String,
    id: Option<String>,
    document: Document,
}

impl LiveRealm {
    pub fn from_value(name: &str, value: Value) -> Result<Self, String> {
        let Value::Object(document) = value else {
            return Err("realm representation is not a JSON object".to_string());
        };
        let id = document
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self {
            name: name.to_string(),
            id,
            document,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Identifier used as the parent of realm-level components. Falls back to
    /// the realm name when the representation carries no id.
    pub fn parent_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Keyed members of `kind` currently present remotely.
    pub fn members(&self, kind: CollectionKind) -> Vec<SubEntity> {
        match self.document.get(kind.field()) {
            Some(Value::Array(members)) => collection_members(kind, members),
            _ => Vec::new(),
        }
    }

    /// Number of live members of `kind` that carry no natural key.
    pub fn unkeyed_members(&self, kind: CollectionKind) -> usize {
        match self.document.get(kind.field()) {
            Some(Value::Array(members)) => members
                .iter()
                .filter(|member| SubEntity::from_value(kind, member).is_none())
                .count(),
            _ => 0,
        }
    }
}

/// A realm component (for example a client registration policy).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Settings are string-keyed and list-valued.
    #[serde(default)]
    pub config: BTreeMap<String, Vec<String>>,
    /// Fields not modelled above, preserved on replace.
    #[serde(flatten)]
    pub extra: Document,
}

impl Component {
    pub fn setting(&self, key: &str) -> Option<&[String]> {
        self.config.get(key).map(Vec::as_slice)
    }
}
