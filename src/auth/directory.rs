//! External identity provider for admin accounts
//!
//! Admins do not live in the local database. Their credentials are checked
//! against the PulsePoint project sign-in endpoint and their account id,
//! which doubles as the tenant id, comes from the provider's user listing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::IdentityConfig;
use crate::error::Result;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("identity provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected identity provider response: {0}")]
    UnexpectedResponse(String),
}

/// Result of a sign-in attempt at the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInOutcome {
    Accepted,
    WrongPassword,
    UnknownAccount,
    /// Any other status code the provider returns
    Rejected(i64),
}

impl SignInOutcome {
    fn from_status(status: i64) -> Self {
        match status {
            1 => SignInOutcome::Accepted,
            0 => SignInOutcome::WrongPassword,
            -1 => SignInOutcome::UnknownAccount,
            other => SignInOutcome::Rejected(other),
        }
    }
}

/// Admin account as listed by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub status: i64,
}

impl DirectoryUser {
    pub fn is_active(&self) -> bool {
        self.status == 1
    }

    fn matches_email(&self, email: &str) -> bool {
        self.email
            .as_deref()
            .is_some_and(|own| own.eq_ignore_ascii_case(email.trim()))
    }
}

#[async_trait]
pub trait AdminDirectory: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> std::result::Result<SignInOutcome, DirectoryError>;

    /// Look up an admin account by email, case-insensitively
    async fn find_user(&self, email: &str) -> std::result::Result<Option<DirectoryUser>, DirectoryError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    username: &'a str,
    password: &'a str,
    project_id: i64,
}

#[derive(Deserialize)]
struct SignInResponse {
    status: i64,
}

/// The listing endpoint answers either a bare array or `{ "data": [...] }`
#[derive(Deserialize)]
#[serde(untagged)]
enum UserListing {
    Wrapped { data: Vec<DirectoryUser> },
    Bare(Vec<DirectoryUser>),
}

impl UserListing {
    fn into_users(self) -> Vec<DirectoryUser> {
        match self {
            UserListing::Wrapped { data } => data,
            UserListing::Bare(users) => users,
        }
    }
}

/// PulsePoint HTTP client
pub struct PulsePointDirectory {
    client: reqwest::Client,
    base_url: String,
    project_id: i64,
    directory_username: String,
    directory_password: String,
}

impl PulsePointDirectory {
    pub fn new(config: &IdentityConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            project_id: config.project_id,
            directory_username: config.directory_username.clone(),
            directory_password: config.directory_password.clone(),
        })
    }
}

#[async_trait]
impl AdminDirectory for PulsePointDirectory {
    async fn sign_in(&self, email: &str, password: &str) -> std::result::Result<SignInOutcome, DirectoryError> {
        let url = format!("{}/api/user/project/signin", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&SignInRequest {
                username: email,
                password,
                project_id: self.project_id,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            warn!("Identity provider sign-in returned HTTP {}", response.status());
            return Err(DirectoryError::UnexpectedResponse(format!(
                "sign-in returned HTTP {}",
                response.status()
            )));
        }

        let body: SignInResponse = response.json().await?;
        debug!("Identity provider sign-in status: {}", body.status);
        Ok(SignInOutcome::from_status(body.status))
    }

    async fn find_user(&self, email: &str) -> std::result::Result<Option<DirectoryUser>, DirectoryError> {
        let url = format!("{}/api/user/allusers", self.base_url);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.directory_username, Some(&self.directory_password))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DirectoryError::UnexpectedResponse(format!(
                "user listing returned HTTP {}",
                response.status()
            )));
        }

        let listing: UserListing = response.json().await?;
        Ok(listing
            .into_users()
            .into_iter()
            .find(|user| user.matches_email(email)))
    }
}

/// Fixed in-memory directory for tests
#[cfg(test)]
pub(crate) struct StaticDirectory {
    pub users: Vec<(DirectoryUser, String)>,
    pub unavailable: bool,
}

#[cfg(test)]
#[async_trait]
impl AdminDirectory for StaticDirectory {
    async fn sign_in(&self, email: &str, password: &str) -> std::result::Result<SignInOutcome, DirectoryError> {
        if self.unavailable {
            return Err(DirectoryError::UnexpectedResponse("offline".to_string()));
        }
        Ok(match self.users.iter().find(|(user, _)| user.matches_email(email)) {
            Some((_, expected)) if expected == password => SignInOutcome::Accepted,
            Some(_) => SignInOutcome::WrongPassword,
            None => SignInOutcome::UnknownAccount,
        })
    }

    async fn find_user(&self, email: &str) -> std::result::Result<Option<DirectoryUser>, DirectoryError> {
        if self.unavailable {
            return Err(DirectoryError::UnexpectedResponse("offline".to_string()));
        }
        Ok(self
            .users
            .iter()
            .map(|(user, _)| user)
            .find(|user| user.matches_email(email))
            .cloned())
    }
}
