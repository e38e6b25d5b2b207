//! Merging a desired realm document into the live representation.
//!
//! Ownership rules:
//! 1. Current - every field starts as the live value and survives unless a
//!    rule below claims it
//! 2. Scalars - allow-listed top-level fields declared by the desired
//!    document overwrite the live value
//! 3. Collections - a collection declared by the desired document replaces
//!    the live one wholesale; members matched by natural key keep their
//!    server-assigned id, live members not declared are dropped
//!
//! Matched members are taken verbatim from the desired document apart from
//! the stamped id. There is no deep merge inside a member.
//!
//! The merge is a pure function of its two inputs.

use indexmap::IndexMap;
use serde_json::Value;

use crate::model::{CollectionKind, DesiredRealm, Document, ID_FIELD, LiveRealm, SubEntity};

/// Label for a dropped live member that has no natural key.
pub const UNKEYED_MEMBER: &str = "<unkeyed>";

/// Outcome of merging one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSummary {
    pub kind: CollectionKind,
    /// Natural keys that matched a live member (its id is kept).
    pub matched: Vec<String>,
    /// Natural keys that are new and will be created without an id.
    pub added: Vec<String>,
    /// Natural keys present live but not declared, removed by the replace.
    /// Live members without a natural key are listed as [`UNKEYED_MEMBER`].
    pub dropped: Vec<String>,
}

impl CollectionSummary {
    fn new(kind: CollectionKind) -> Self {
        Self {
            kind,
            matched: Vec::new(),
            added: Vec::new(),
            dropped: Vec::new(),
        }
    }
}

/// What a merge changed, for operator output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Allow-listed scalar fields taken from the desired document.
    pub scalars: Vec<String>,
    pub collections: Vec<CollectionSummary>,
    /// Whether the merged document differs from the live one.
    pub changed: bool,
}

impl MergeSummary {
    pub fn collection(&self, kind: CollectionKind) -> Option<&CollectionSummary> {
        self.collections.iter().find(|c| c.kind == kind)
    }
}

/// A realm document ready to be sent with a full replace.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRealm {
    name: String,
    document: Document,
    summary: MergeSummary,
}

impl MergedRealm {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn summary(&self) -> &MergeSummary {
        &self.summary
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.document.clone())
    }

    /// Remote id of the member of `kind` with the given natural key.
    pub fn member_id(&self, kind: CollectionKind, natural_key: &str) -> Option<&str> {
        self.document
            .get(kind.field())?
            .as_array()?
            .iter()
            .find(|member| kind.natural_key(member) == Some(natural_key))?
            .get(ID_FIELD)?
            .as_str()
    }
}

/// Merges `desired` into `current`.
pub fn merge_realm(current: &LiveRealm, desired: &DesiredRealm) -> MergedRealm {
    let mut document = current.document().clone();
    let mut summary = MergeSummary::default();

    let id = current
        .id()
        .or(desired.id())
        .unwrap_or(current.name())
        .to_string();
    document.insert(ID_FIELD.to_string(), Value::String(id));

    for (key, value) in desired.scalars() {
        document.insert(key.clone(), value.clone());
        summary.scalars.push(key.clone());
    }

    for kind in CollectionKind::ALL {
        let Some(declared) = desired.collection(kind) else {
            continue;
        };
        let (members, mut collection_summary) = merge_collection(kind, &current.members(kind), declared);
        // The replace also removes live members the key index could not see.
        collection_summary
            .dropped
            .extend(std::iter::repeat_n(UNKEYED_MEMBER.to_string(), current.unkeyed_members(kind)));
        document.insert(
            kind.field().to_string(),
            Value::Array(members.iter().map(SubEntity::to_value).collect()),
        );
        summary.collections.push(collection_summary);
    }

    summary.changed = &document != current.document();
    MergedRealm {
        name: current.name().to_string(),
        document,
        summary,
    }
}

fn merge_collection(
    kind: CollectionKind,
    current: &[SubEntity],
    declared: &[SubEntity],
) -> (Vec<SubEntity>, CollectionSummary) {
    // The first live member with an id wins when the server reports a natural
    // key twice.
    let mut live_ids: IndexMap<&str, Option<&str>> = IndexMap::new();
    for member in current {
        let slot = live_ids.entry(member.natural_key.as_str()).or_insert(None);
        if slot.is_none() {
            *slot = member.remote_id.as_deref();
        }
    }

    // Last declaration wins, first position is kept.
    let mut wanted: IndexMap<&str, &SubEntity> = IndexMap::new();
    for member in declared {
        wanted.insert(member.natural_key.as_str(), member);
    }

    let mut summary = CollectionSummary::new(kind);
    let merged = wanted
        .iter()
        .map(|(key, member)| match live_ids.get(key) {
            Some(live_id) => {
                summary.matched.push(key.to_string());
                member.with_remote_id(live_id.map(str::to_string))
            }
            None => {
                summary.added.push(key.to_string());
                member.with_remote_id(None)
            }
        })
        .collect();

    summary.dropped = live_ids
        .keys()
        .filter(|key| !wanted.contains_key(*key))
        .map(|key| key.to_string())
        .collect();

    (merged, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    fn live(value: Value) -> LiveRealm {
        LiveRealm::from_value("kairos-dev", value).unwrap()
    }

    fn desired(value: Value) -> DesiredRealm {
        DesiredRealm::from_value("kairos-dev", value).unwrap()
    }

    #[test]
    fn test_identity_preserved_for_matched_member() {
        let current = live(json!({
            "id": "realm-1",
            "realm": "kairos-dev",
            "clients": [{"id": "1", "clientId": "web", "enabled": false}]
        }));
        let wanted = desired(json!({
            "clients": [{"clientId": "web", "enabled": true, "redirectUris": ["/*"]}]
        }));

        let merged = merge_realm(&current, &wanted);

        assert_eq!(merged.member_id(CollectionKind::Clients, "web"), Some("1"));
        assert_json_eq!(
            merged.document()["clients"],
            json!([{"id": "1", "clientId": "web", "enabled": true, "redirectUris": ["/*"]}])
        );
    }

    #[test]
    fn test_collection_is_replaced_wholesale() {
        let current = live(json!({
            "clients": [
                {"id": "a-id", "clientId": "A", "secret": "old"},
                {"id": "b-id", "clientId": "B"}
            ]
        }));
        let wanted = desired(json!({
            "clients": [{"clientId": "A", "secret": "new"}, {"clientId": "C"}]
        }));

        let merged = merge_realm(&current, &wanted);

        assert_json_eq!(
            merged.document()["clients"],
            json!([
                {"id": "a-id", "clientId": "A", "secret": "new"},
                {"clientId": "C"}
            ])
        );
        let summary = merged.summary().collection(CollectionKind::Clients).unwrap();
        assert_eq!(summary.matched, ["A"]);
        assert_eq!(summary.added, ["C"]);
        assert_eq!(summary.dropped, ["B"]);
    }

    #[test]
    fn test_unkeyed_live_member_counts_as_dropped() {
        let current = live(json!({
            "realm": "kairos-dev",
            "clients": [{"id": "1", "clientId": "web"}, {"id": "2"}]
        }));
        let wanted = desired(json!({
            "realm": "kairos-dev",
            "clients": [{"clientId": "web"}]
        }));

        let merged = merge_realm(&current, &wanted);

        assert_json_eq!(merged.document()["clients"], json!([{"id": "1", "clientId": "web"}]));
        let summary = merged.summary().collection(CollectionKind::Clients).unwrap();
        assert_eq!(summary.matched, ["web"]);
        assert_eq!(summary.dropped, [UNKEYED_MEMBER]);
        assert!(merged.summary().changed);
    }

    #[test]
    fn test_scalar_outside_allow_list_keeps_live_value() {
        let current = live(json!({
            "realm": "kairos-dev",
            "enabled": false,
            "smtpServer": {"host": "live-mail"},
            "bruteForceProtected": true
        }));
        let wanted = desired(json!({
            "enabled": true,
            "smtpServer": {"host": "desired-mail"},
            "bruteForceProtected": false
        }));

        let merged = merge_realm(&current, &wanted);

        assert_eq!(merged.document()["enabled"], json!(true));
        assert_eq!(merged.document()["smtpServer"], json!({"host": "live-mail"}));
        assert_eq!(merged.document()["bruteForceProtected"], json!(true));
        assert_eq!(merged.summary().scalars, ["enabled"]);
    }

    #[test]
    fn test_undeclared_collection_untouched() {
        let current = live(json!({
            "clients": [{"id": "1", "clientId": "web"}],
            "authenticationFlows": [{"id": "f1", "alias": "browser", "builtIn": true}]
        }));
        let wanted = desired(json!({"clients": [{"clientId": "web"}]}));

        let merged = merge_realm(&current, &wanted);

        assert_eq!(
            merged.document()["authenticationFlows"],
            json!([{"id": "f1", "alias": "browser", "builtIn": true}])
        );
        assert!(merged.summary().collection(CollectionKind::AuthenticationFlows).is_none());
    }

    #[test]
    fn test_flows_matched_by_alias() {
        let current = live(json!({
            "authenticationFlows": [
                {"id": "f1", "alias": "browser", "topLevel": true},
                {"id": "f2", "alias": "direct grant"}
            ]
        }));
        let wanted = desired(json!({
            "authenticationFlows": [{"alias": "browser", "topLevel": true, "description": "custom"}]
        }));

        let merged = merge_realm(&current, &wanted);

        assert_eq!(merged.member_id(CollectionKind::AuthenticationFlows, "browser"), Some("f1"));
        assert_eq!(merged.document()["authenticationFlows"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_desired_ids_never_leak_into_new_members() {
        let current = live(json!({"clients": []}));
        let wanted = desired(json!({"clients": [{"id": "from-other-env", "clientId": "web"}]}));

        let merged = merge_realm(&current, &wanted);

        assert_eq!(merged.member_id(CollectionKind::Clients, "web"), None);
        assert_eq!(merged.document()["clients"], json!([{"clientId": "web"}]));
    }

    #[test]
    fn test_duplicate_desired_keys_last_wins() {
        let current = live(json!({"clients": [{"id": "1", "clientId": "web"}]}));
        let wanted = desired(json!({
            "clients": [
                {"clientId": "web", "enabled": false},
                {"clientId": "api"},
                {"clientId": "web", "enabled": true}
            ]
        }));

        let merged = merge_realm(&current, &wanted);

        assert_json_eq!(
            merged.document()["clients"],
            json!([
                {"id": "1", "clientId": "web", "enabled": true},
                {"clientId": "api"}
            ])
        );
    }

    #[test]
    fn test_realm_id_resolution() {
        let wanted = desired(json!({"id": "declared"}));

        let merged = merge_realm(&live(json!({"id": "live"})), &wanted);
        assert_eq!(merged.document()["id"], json!("live"));

        let merged = merge_realm(&live(json!({})), &wanted);
        assert_eq!(merged.document()["id"], json!("declared"));

        let merged = merge_realm(&live(json!({})), &desired(json!({})));
        assert_eq!(merged.document()["id"], json!("kairos-dev"));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let current = live(json!({
            "id": "realm-1",
            "realm": "kairos-dev",
            "eventsEnabled": true,
            "clients": [
                {"id": "1", "clientId": "web"},
                {"id": "2", "clientId": "legacy"}
            ]
        }));
        let wanted = desired(json!({
            "realm": "kairos-dev",
            "enabled": true,
            "clients": [{"clientId": "web", "publicClient": true}, {"clientId": "api"}]
        }));

        let first = merge_realm(&current, &wanted);
        assert!(first.summary().changed);

        // The server stores the replace and assigns an id to the new member.
        let mut applied = first.to_value();
        applied["clients"][1]["id"] = json!("3");
        let after_first_run = live(applied.clone());

        let second = merge_realm(&after_first_run, &wanted);
        assert_json_eq!(second.to_value(), applied);
        assert!(!second.summary().changed);
        assert_eq!(second.member_id(CollectionKind::Clients, "api"), Some("3"));
    }
}
