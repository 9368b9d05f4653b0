//! Service account credentials
//!
//! The backfill connects with a JSON credential file:
//!
//! ```json
//! { "connectionUri": "mongodb+srv://cluster0.example.net", "username": "backfill", "password": "...", "authSource": "admin" }
//! ```
//!
//! Only `connectionUri` is required.

use std::path::{Path, PathBuf};

use mongodb::options::{ClientOptions, Credential};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Failed to read credential file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed credential file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Credential file {path} has no connectionUri")]
    MissingUri { path: PathBuf },

    #[error("Invalid connection settings: {0}")]
    Connection(#[from] mongodb::error::Error),
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccount {
    #[serde(default)]
    pub connection_uri: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub auth_source: Option<String>,
}

impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("connection_uri", &self.connection_uri)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("auth_source", &self.auth_source)
            .finish()
    }
}

impl ServiceAccount {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CredentialError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| CredentialError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let account: ServiceAccount =
            serde_json::from_str(&content).map_err(|source| CredentialError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        if account.connection_uri.trim().is_empty() {
            return Err(CredentialError::MissingUri { path: path.to_path_buf() });
        }
        Ok(account)
    }

    /// Driver options for this account; explicit credentials override any in the URI.
    pub async fn client_options(&self, app_name: &str) -> Result<ClientOptions, CredentialError> {
        let mut options = ClientOptions::parse(&self.connection_uri).await?;
        options.app_name = Some(app_name.to_string());

        if let Some(username) = self.username.as_ref().filter(|u| !u.is_empty()) {
            options.credential = Some(
                Credential::builder()
                    .username(username.clone())
                    .password(self.password.clone())
                    .source(self.auth_source.clone())
                    .build(),
            );
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_full_credential_file() {
        let file = write_file(
            r#"{"connectionUri":"mongodb://db.internal:27017","username":"backfill","password":"s3cret","authSource":"admin"}"#,
        );
        let account = ServiceAccount::from_file(file.path()).unwrap();
        assert_eq!(account.connection_uri, "mongodb://db.internal:27017");
        assert_eq!(account.username.as_deref(), Some("backfill"));
        assert_eq!(account.auth_source.as_deref(), Some("admin"));
    }

    #[test]
    fn test_uri_only_credential_file() {
        let file = write_file(r#"{"connectionUri":"mongodb://localhost:27017"}"#);
        let account = ServiceAccount::from_file(file.path()).unwrap();
        assert!(account.username.is_none());
        assert!(account.password.is_none());
    }

    #[test]
    fn test_missing_file() {
        let err = ServiceAccount::from_file("/nonexistent/service-account.json").unwrap_err();
        assert!(matches!(err, CredentialError::Read { .. }));
    }

    #[test]
    fn test_malformed_file() {
        let file = write_file("not json");
        let err = ServiceAccount::from_file(file.path()).unwrap_err();
        assert!(matches!(err, CredentialError::Parse { .. }));
    }

    #[test]
    fn test_missing_connection_uri() {
        let file = write_file(r#"{"username":"backfill"}"#);
        let err = ServiceAccount::from_file(file.path()).unwrap_err();
        assert!(matches!(err, CredentialError::MissingUri { .. }));
    }

    #[test]
    fn test_debug_redacts_password() {
        let file = write_file(r#"{"connectionUri":"mongodb://localhost","username":"u","password":"s3cret"}"#);
        let account = ServiceAccount::from_file(file.path()).unwrap();
        let rendered = format!("{:?}", account);
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("***"));
    }

    #[tokio::test]
    async fn test_client_options_apply_credentials() {
        let file = write_file(
            r#"{"connectionUri":"mongodb://localhost:27017","username":"backfill","password":"pw","authSource":"admin"}"#,
        );
        let account = ServiceAccount::from_file(file.path()).unwrap();
        let options = account.client_options("fa-backfill").await.unwrap();

        assert_eq!(options.app_name.as_deref(), Some("fa-backfill"));
        let credential = options.credential.unwrap();
        assert_eq!(credential.username.as_deref(), Some("backfill"));
        assert_eq!(credential.source.as_deref(), Some("admin"));
    }
}
