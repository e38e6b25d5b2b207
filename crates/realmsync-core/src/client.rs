//! HTTP implementation of [`AdminApi`].

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use url::Url;

use crate::api::{AdminApi, CreateOutcome, DeleteOutcome};
use crate::model::{Component, LiveRealm};
use crate::settings::ConnectionSettings;
use crate::{Error, Result};

/// Realm hosting the administrative account.
pub const ADMIN_REALM: &str = "master";

/// Public client used for the admin password grant.
pub const ADMIN_CLIENT_ID: &str = "admin-cli";

/// Bearer token for admin calls. Never printed.
#[derive(Clone)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RealmEntry {
    realm: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserEntry {
    id: Option<String>,
    username: Option<String>,
}

/// Admin API client holding a bearer token obtained at construction.
pub struct AdminClient {
    http: reqwest::Client,
    base_url: Url,
    token: AccessToken,
}

impl AdminClient {
    /// Obtains an admin token with the password grant and returns a client
    /// carrying it.
    pub async fn authenticate(settings: &ConnectionSettings) -> Result<Self> {
        let base_url = parse_base_url(&settings.base_url)?;
        let http = build_http(settings.timeout)?;
        let token = request_token(&http, &base_url, &settings.admin_user, &settings.admin_password).await?;
        tracing::info!(base_url = %base_url, user = %settings.admin_user, "obtained admin token");
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    /// Client for an already issued token.
    pub fn with_token(base_url: &str, token: AccessToken, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: build_http(timeout)?,
            base_url: parse_base_url(base_url)?,
            token,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn admin_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("admin").push("realms").extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        tracing::debug!(%method, %url, "admin request");
        self.http
            .request(method, url)
            .bearer_auth(self.token.secret())
            .header("Accept", "application/json")
    }

    async fn send(&self, call: &str, request: RequestBuilder) -> Result<Response> {
        request.send().await.map_err(|source| Error::Transport {
            call: call.to_string(),
            source,
        })
    }
}

#[async_trait]
impl AdminApi for AdminClient {
    async fn list_realms(&self) -> Result<Vec<String>> {
        let call = "list realms";
        let resp = self.send(call, self.request(Method::GET, self.admin_url(&[]))).await?;
        let realms: Vec<RealmEntry> = read_json(call, resp).await?;
        Ok(realms.into_iter().filter_map(|r| r.realm).collect())
    }

    async fn create_realm(&self, representation: &Value) -> Result<CreateOutcome> {
        let name = representation
            .get("realm")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let call = format!("create realm {name}");
        let request = self.request(Method::POST, self.admin_url(&[])).json(representation);
        let resp = self.send(&call, request).await?;
        read_created(&call, resp).await
    }

    async fn fetch_realm(&self, realm: &str) -> Result<Option<LiveRealm>> {
        let call = format!("GET realm {realm}");
        let resp = self.send(&call, self.request(Method::GET, self.admin_url(&[realm]))).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let value: Value = read_json(&call, resp).await?;
        LiveRealm::from_value(realm, value)
            .map(Some)
            .map_err(|reason| Error::invalid_response(&call, reason))
    }

    async fn replace_realm(&self, realm: &str, representation: &Value) -> Result<()> {
        let call = format!("update realm {realm}");
        let request = self
            .request(Method::PUT, self.admin_url(&[realm]))
            .json(representation);
        let resp = self.send(&call, request).await?;
        expect_success(&call, resp).await
    }

    async fn delete_realm(&self, realm: &str) -> Result<DeleteOutcome> {
        let call = format!("delete realm {realm}");
        let resp = self
            .send(&call, self.request(Method::DELETE, self.admin_url(&[realm])))
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(DeleteOutcome::NotFound);
        }
        expect_success(&call, resp).await?;
        Ok(DeleteOutcome::Deleted)
    }

    async fn list_components(
        &self,
        realm: &str,
        parent_id: &str,
        provider_type: &str,
    ) -> Result<Vec<Component>> {
        let call = format!("GET components of {realm}");
        let request = self
            .request(Method::GET, self.admin_url(&[realm, "components"]))
            .query(&[("parent", parent_id), ("type", provider_type)]);
        let resp = self.send(&call, request).await?;
        read_json(&call, resp).await
    }

    async fn replace_component(&self, realm: &str, component: &Component) -> Result<()> {
        let id = component
            .id
            .as_deref()
            .ok_or_else(|| Error::config(format!("component in realm {realm} has no id")))?;
        let call = format!("update component {id} in {realm}");
        let request = self
            .request(Method::PUT, self.admin_url(&[realm, "components", id]))
            .json(component);
        let resp = self.send(&call, request).await?;
        expect_success(&call, resp).await
    }

    async fn find_user(&self, realm: &str, username: &str) -> Result<Option<String>> {
        let call = format!("GET user {username} in {realm}");
        let request = self
            .request(Method::GET, self.admin_url(&[realm, "users"]))
            .query(&[("username", username), ("exact", "true")]);
        let resp = self.send(&call, request).await?;
        let users: Vec<UserEntry> = read_json(&call, resp).await?;
        // Usernames are stored lower-cased.
        Ok(users
            .into_iter()
            .filter(|u| {
                u.username
                    .as_deref()
                    .is_none_or(|name| name.eq_ignore_ascii_case(username))
            })
            .find_map(|u| u.id))
    }

    async fn create_user(&self, realm: &str, username: &str) -> Result<CreateOutcome> {
        let call = format!("create user {username} in {realm}");
        let request = self
            .request(Method::POST, self.admin_url(&[realm, "users"]))
            .json(&json!({"username": username, "enabled": true}));
        let resp = self.send(&call, request).await?;
        read_created(&call, resp).await
    }

    async fn reset_password(&self, realm: &str, user_id: &str, password: &str) -> Result<()> {
        let call = format!("reset password of user {user_id} in {realm}");
        let request = self
            .request(
                Method::PUT,
                self.admin_url(&[realm, "users", user_id, "reset-password"]),
            )
            .json(&json!({"type": "password", "value": password, "temporary": false}));
        let resp = self.send(&call, request).await?;
        expect_success(&call, resp).await
    }
}

fn parse_base_url(base_url: &str) -> Result<Url> {
    let url = Url::parse(base_url).map_err(|e| Error::config(format!("invalid base URL \"{base_url}\": {e}")))?;
    if url.cannot_be_a_base() {
        return Err(Error::config(format!("invalid base URL \"{base_url}\"")));
    }
    Ok(url)
}

fn build_http(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|source| Error::Transport {
            call: "build HTTP client".to_string(),
            source,
        })
}

async fn request_token(
    http: &reqwest::Client,
    base_url: &Url,
    username: &str,
    password: &str,
) -> Result<AccessToken> {
    let call = "admin token request";
    let mut url = base_url.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty()
            .extend(["realms", ADMIN_REALM, "protocol", "openid-connect", "token"]);
    }

    let body = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("grant_type", "password")
        .append_pair("client_id", ADMIN_CLIENT_ID)
        .append_pair("username", username)
        .append_pair("password", password)
        .finish();

    let resp = http
        .post(url)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(body)
        .send()
        .await
        .map_err(|source| Error::Transport {
            call: call.to_string(),
            source,
        })?;

    let status = resp.status();
    if !status.is_success() {
        return Err(Error::Authentication {
            status: status.as_u16(),
            body: resp.text().await.unwrap_or_default(),
        });
    }

    let body = resp.text().await.map_err(|source| Error::Transport {
        call: call.to_string(),
        source,
    })?;
    let token: TokenResponse =
        serde_json::from_str(&body).map_err(|e| Error::invalid_response(call, e.to_string()))?;
    match token.access_token.filter(|t| !t.is_empty()) {
        Some(token) => Ok(AccessToken(token)),
        // A grant that succeeds without a token still leaves us unauthenticated.
        None => Err(Error::Authentication {
            status: status.as_u16(),
            body,
        }),
    }
}

/// Decodes a read response. Any non-success status is a discovery failure.
async fn read_json<T: DeserializeOwned>(call: &str, resp: Response) -> Result<T> {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(Error::Discovery {
            call: call.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    serde_json::from_str(&body).map_err(|e| Error::invalid_response(call, e.to_string()))
}

async fn expect_success(call: &str, resp: Response) -> Result<()> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    Err(Error::Remote {
        call: call.to_string(),
        status: status.as_u16(),
        body: resp.text().await.unwrap_or_default(),
    })
}

async fn read_created(call: &str, resp: Response) -> Result<CreateOutcome> {
    if resp.status() == StatusCode::CONFLICT {
        return Ok(CreateOutcome::AlreadyExists);
    }
    let id = resp
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .and_then(id_from_location);
    expect_success(call, resp).await?;
    Ok(CreateOutcome::Created { id })
}

/// Last path segment of a `Location` header.
fn id_from_location(location: &str) -> Option<String> {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> AdminClient {
        AdminClient::with_token(base, AccessToken::new("t"), Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_admin_url() {
        let c = client("http://localhost:8080");
        assert_eq!(
            c.admin_url(&["kairos-dev", "components"]).as_str(),
            "http://localhost:8080/admin/realms/kairos-dev/components"
        );

        // Trailing slash and a context path
        let c = client("https://sso.example.com/auth/");
        assert_eq!(
            c.admin_url(&[]).as_str(),
            "https://sso.example.com/auth/admin/realms"
        );
    }

    #[test]
    fn test_admin_url_escapes_segments() {
        let c = client("http://localhost:8080");
        assert_eq!(
            c.admin_url(&["my realm"]).as_str(),
            "http://localhost:8080/admin/realms/my%20realm"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let err = AdminClient::with_token("not a url", AccessToken::new("t"), Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_id_from_location() {
        assert_eq!(
            id_from_location("http://kc/admin/realms/r/users/abc-123").as_deref(),
            Some("abc-123")
        );
        assert_eq!(id_from_location("http://kc/users/abc/").as_deref(), Some("abc"));
        assert_eq!(id_from_location(""), None);
    }

    #[test]
    fn test_token_is_redacted() {
        let token = AccessToken::new("eyJhbGciOi");
        assert_eq!(format!("{token:?}"), "AccessToken(***)");
    }
}
