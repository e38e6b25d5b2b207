//! Test-user provisioning for non-production realms.

use crate::api::{AdminApi, CreateOutcome};
use crate::settings::FixtureCredentials;
use crate::{Error, Result};

/// How the fixture user was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixtureOutcome {
    Created { user_id: String },
    Existing { user_id: String },
}

impl FixtureOutcome {
    pub fn user_id(&self) -> &str {
        match self {
            FixtureOutcome::Created { user_id } | FixtureOutcome::Existing { user_id } => user_id,
        }
    }
}

/// Makes sure the fixture user exists in `realm` and that its password is
/// the configured one. The password is reset on every call.
pub async fn ensure_fixture_user(
    api: &dyn AdminApi,
    realm: &str,
    credentials: &FixtureCredentials,
) -> Result<FixtureOutcome> {
    let username = credentials.username.as_str();

    let outcome = match api.find_user(realm, username).await? {
        Some(user_id) => FixtureOutcome::Existing { user_id },
        None => match api.create_user(realm, username).await? {
            CreateOutcome::Created { id: Some(user_id) } => FixtureOutcome::Created { user_id },
            CreateOutcome::Created { id: None } => FixtureOutcome::Created {
                user_id: lookup_after_create(api, realm, username).await?,
            },
            CreateOutcome::AlreadyExists => {
                tracing::debug!(realm, username, "user created concurrently (409)");
                FixtureOutcome::Existing {
                    user_id: lookup_after_create(api, realm, username).await?,
                }
            }
        },
    };

    api.reset_password(realm, outcome.user_id(), &credentials.password)
        .await?;
    match &outcome {
        FixtureOutcome::Created { .. } => tracing::info!(realm, username, "created test user"),
        FixtureOutcome::Existing { .. } => tracing::info!(realm, username, "test user password reset"),
    }
    Ok(outcome)
}

async fn lookup_after_create(api: &dyn AdminApi, realm: &str, username: &str) -> Result<String> {
    api.find_user(realm, username)
        .await?
        .ok_or_else(|| Error::Remote {
            call: format!("GET user {username} in {realm}"),
            status: 404,
            body: "user not found after create".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeAdmin;

    fn credentials() -> FixtureCredentials {
        FixtureCredentials {
            username: "kairos-tester".to_string(),
            password: "s3cret".to_string(),
        }
    }

    #[tokio::test]
    async fn test_fixture_is_idempotent() {
        let api = FakeAdmin::new();

        let first = ensure_fixture_user(&api, "kairos-dev", &credentials()).await.unwrap();
        let second = ensure_fixture_user(&api, "kairos-dev", &credentials()).await.unwrap();

        assert!(matches!(first, FixtureOutcome::Created { .. }));
        assert_eq!(second, FixtureOutcome::Existing { user_id: first.user_id().to_string() });

        let state = api.state.lock().unwrap();
        assert_eq!(state.users.len(), 1);
        assert_eq!(state.password_resets.len(), 2);
        assert!(state.password_resets.iter().all(|(_, _, pw)| pw == "s3cret"));
    }

    #[tokio::test]
    async fn test_existing_user_only_gets_password_reset() {
        let api = FakeAdmin::new().with_user("kairos-qa", "kairos-tester", "u-42");

        let outcome = ensure_fixture_user(&api, "kairos-qa", &credentials()).await.unwrap();

        assert_eq!(outcome, FixtureOutcome::Existing { user_id: "u-42".to_string() });
        assert_eq!(api.mutations(), ["PUT reset-password u-42"]);
    }

    #[tokio::test]
    async fn test_concurrent_create_resolves_existing_user() {
        let api = FakeAdmin::new();
        api.state.lock().unwrap().user_created_concurrently = true;

        let outcome = ensure_fixture_user(&api, "kairos-dev", &credentials()).await.unwrap();

        assert!(matches!(outcome, FixtureOutcome::Existing { .. }));
        let state = api.state.lock().unwrap();
        assert_eq!(state.password_resets.len(), 1);
        assert_eq!(state.password_resets[0].1, outcome.user_id());
    }

    #[tokio::test]
    async fn test_reset_failure_is_fatal() {
        let api = FakeAdmin::new().with_user("kairos-dev", "kairos-tester", "u-1");
        api.state.lock().unwrap().fail = Some(("PUT reset-password".to_string(), 500));

        let err = ensure_fixture_user(&api, "kairos-dev", &credentials()).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
    }
}
