//! Backend client.
//!
//! [`Backend`] is the seam every other component talks through: identity
//! verification, password sign-in, token refresh, sign-out, and a generic
//! table read addressed by table name with equality/range filters.
//! [`RestBackend`] implements it against a Supabase-style REST API
//! (`/auth/v1/*` and `/rest/v1/{table}`).

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use jsonwebtoken::{DecodingKey, Validation};
use keyward_core::types::{Role, Timestamp, UserId};
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// Result of verifying a bearer credential with the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// Subject (user id) the credential was issued to.
    pub subject: UserId,
    pub email: Option<String>,
    /// Expiry claim of the credential, when it could be read.
    pub expires_at: Option<Timestamp>,
}

/// Access + refresh token pair issued by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds, if the backend reports one.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

// ---------------------------------------------------------------------------
// Table queries
// ---------------------------------------------------------------------------

/// Comparison operator for a [`TableQuery`] filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FilterOp {
    fn as_str(self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: String,
}

/// A read against one backend table.
///
/// ```ignore
/// let q = TableQuery::new("users").select("id,email").eq("email", "a@b.c").limit(1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
    pub table: String,
    pub columns: String,
    pub filters: Vec<Filter>,
    pub limit: Option<u32>,
}

impl TableQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: "*".to_string(),
            filters: Vec::new(),
            limit: None,
        }
    }

    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    pub fn filter(mut self, column: impl Into<String>, op: FilterOp, value: impl ToString) -> Self {
        self.filters.push(Filter {
            column: column.into(),
            op,
            value: value.to_string(),
        });
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl ToString) -> Self {
        self.filter(column, FilterOp::Eq, value)
    }

    pub fn gt(self, column: impl Into<String>, value: impl ToString) -> Self {
        self.filter(column, FilterOp::Gt, value)
    }

    pub fn gte(self, column: impl Into<String>, value: impl ToString) -> Self {
        self.filter(column, FilterOp::Gte, value)
    }

    pub fn lt(self, column: impl Into<String>, value: impl ToString) -> Self {
        self.filter(column, FilterOp::Lt, value)
    }

    pub fn lte(self, column: impl Into<String>, value: impl ToString) -> Self {
        self.filter(column, FilterOp::Lte, value)
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Query-string pairs in PostgREST syntax (`col=op.value`).
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("select".to_string(), self.columns.clone())];
        for f in &self.filters {
            pairs.push((f.column.clone(), format!("{}.{}", f.op.as_str(), f.value)));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }
}

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Backend: Send + Sync {
    /// Verify a user's bearer credential and return its subject and expiry.
    async fn verify_identity(&self, bearer: &str) -> Result<VerifiedIdentity, BackendError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<TokenPair, BackendError>;

    /// Exchange a refresh token for a new token pair.
    async fn refresh_credential(&self, refresh_token: &str) -> Result<TokenPair, BackendError>;

    async fn sign_out(&self, bearer: &str) -> Result<(), BackendError>;

    async fn select(&self, query: &TableQuery) -> Result<Vec<serde_json::Value>, BackendError>;
}

// ---------------------------------------------------------------------------
// REST implementation
// ---------------------------------------------------------------------------

/// [`Backend`] over HTTP, authenticated with one role's API key.
pub struct RestBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    role: Role,
    request_timeout: Duration,
}

impl fmt::Debug for RestBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestBackend")
            .field("base_url", &self.base_url)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct AuthUser {
    id: UserId,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct ExpiryClaim {
    exp: i64,
}

impl RestBackend {
    /// Build a client for `base_url` (e.g. `https://project.example.co`).
    ///
    /// `request_timeout` bounds every individual HTTP call.
    pub fn new(
        base_url: &str,
        api_key: &str,
        role: Role,
        request_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            role,
            request_timeout,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Request builder carrying the role key plus a bearer (the role key
    /// itself unless a user credential is given).
    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        bearer: Option<&str>,
    ) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header("apikey", &self.api_key)
            .bearer_auth(bearer.unwrap_or(&self.api_key))
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, BackendError> {
        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout(self.request_timeout)
            } else {
                BackendError::Request(e)
            }
        })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn token_grant(
        &self,
        grant_type: &str,
        payload: serde_json::Value,
    ) -> Result<TokenPair, BackendError> {
        let req = self
            .request(
                reqwest::Method::POST,
                &format!("/auth/v1/token?grant_type={grant_type}"),
                None,
            )
            .json(&payload);
        self.send(req)
            .await?
            .json::<TokenPair>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}

/// Read the `exp` claim of a credential the backend has already accepted.
///
/// The signature is not checked here; the backend did that.
pub fn bearer_expiry(token: &str) -> Option<Timestamp> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data =
        jsonwebtoken::decode::<ExpiryClaim>(token, &DecodingKey::from_secret(&[]), &validation)
            .ok()?;
    DateTime::from_timestamp(data.claims.exp, 0)
}

#[async_trait]
impl Backend for RestBackend {
    async fn verify_identity(&self, bearer: &str) -> Result<VerifiedIdentity, BackendError> {
        let req = self.request(reqwest::Method::GET, "/auth/v1/user", Some(bearer));
        let user: AuthUser = self.send(req)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        Ok(VerifiedIdentity {
            subject: user.id,
            email: user.email,
            expires_at: bearer_expiry(bearer),
        })
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<TokenPair, BackendError> {
        self.token_grant(
            "password",
            serde_json::json!({ "email": email, "password": password }),
        )
        .await
    }

    async fn refresh_credential(&self, refresh_token: &str) -> Result<TokenPair, BackendError> {
        self.token_grant(
            "refresh_token",
            serde_json::json!({ "refresh_token": refresh_token }),
        )
        .await
    }

    async fn sign_out(&self, bearer: &str) -> Result<(), BackendError> {
        let req = self.request(reqwest::Method::POST, "/auth/v1/logout", Some(bearer));
        self.send(req).await?;
        Ok(())
    }

    async fn select(&self, query: &TableQuery) -> Result<Vec<serde_json::Value>, BackendError> {
        let req = self
            .request(
                reqwest::Method::GET,
                &format!("/rest/v1/{}", query.table),
                None,
            )
            .query(&query.to_query_pairs());
        self.send(req)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use jsonwebtoken::{encode, EncodingKey, Header};

    use super::*;

    #[test]
    fn query_pairs_use_postgrest_syntax() {
        let q = TableQuery::new("users")
            .select("id,email")
            .eq("email", "a@example.com")
            .gte("created_at", "2024-01-01")
            .limit(1);
        assert_eq!(
            q.to_query_pairs(),
            vec![
                ("select".to_string(), "id,email".to_string()),
                ("email".to_string(), "eq.a@example.com".to_string()),
                ("created_at".to_string(), "gte.2024-01-01".to_string()),
                ("limit".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn default_projection_is_all_columns() {
        let q = TableQuery::new("users");
        assert_eq!(q.to_query_pairs(), vec![("select".into(), "*".into())]);
    }

    #[test]
    fn bearer_expiry_reads_exp_without_verifying() {
        #[derive(Serialize)]
        struct Claims {
            sub: String,
            aud: String,
            exp: i64,
        }
        let exp = 1_900_000_000;
        let token = encode(
            &Header::default(),
            &Claims {
                sub: "u".into(),
                aud: "authenticated".into(),
                exp,
            },
            &EncodingKey::from_secret(b"some-other-secret"),
        )
        .unwrap();

        let expiry = bearer_expiry(&token).expect("exp should be readable");
        assert_eq!(expiry.timestamp(), exp);
    }

    #[test]
    fn bearer_expiry_of_garbage_is_none() {
        assert!(bearer_expiry("not-a-jwt").is_none());
    }

    #[test]
    fn rest_backend_trims_trailing_slash() {
        let backend = RestBackend::new(
            "https://example.test/",
            "key",
            Role::Standard,
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(backend.url("/auth/v1/user"), "https://example.test/auth/v1/user");
        assert_eq!(backend.role(), Role::Standard);
    }

    #[tokio::test]
    async fn slow_backend_reports_configured_timeout() {
        // Accepts connections but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let timeout = Duration::from_millis(100);
        let backend =
            RestBackend::new(&format!("http://{addr}"), "key", Role::Standard, timeout).unwrap();

        let err = backend.sign_out("bearer").await.unwrap_err();
        assert_matches!(err, BackendError::Timeout(d) if d == timeout);

        server.abort();
    }
}
