//! OAuth2 authentication for read-only Gmail access

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use std::env;
use std::path::Path;
use tracing::{debug, info};
use yup_oauth2::ApplicationSecret;

use crate::error::{ExportError, Result};

/// Read-only mailbox scope; the exporter never modifies anything
pub const READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

pub const READONLY_SCOPES: &[&str] = &[READONLY_SCOPE];

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub = Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Authenticate and initialize the Gmail API hub
///
/// The client secret comes from `credentials_path`, or from the
/// `GMAIL_CLIENT_ID` / `GMAIL_CLIENT_SECRET` / `GMAIL_REDIRECT_URI`
/// environment variables when that file does not exist. The first run opens
/// the browser consent flow; later runs refresh the cached token silently.
///
/// # Arguments
/// * `credentials_path` - Path to the OAuth2 client secret JSON file
/// * `token_cache_path` - Path where access tokens will be cached
pub async fn authenticate(credentials_path: &Path, token_cache_path: &Path) -> Result<GmailHub> {
    let secret = load_application_secret(credentials_path).await?;

    // HTTPRedirect opens a browser for user authorization
    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(token_cache_path)
    .build()
    .await
    .map_err(|e| ExportError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    // Acquire up front so the consent flow happens before any extraction starts
    auth.token(READONLY_SCOPES)
        .await
        .map_err(|e| ExportError::AuthError(format!("Failed to obtain token: {}", e)))?;

    if tokio::fs::try_exists(token_cache_path).await.unwrap_or(false) {
        secure_token_file(token_cache_path).await?;
    }
    debug!("Token cached at {}", token_cache_path.display());

    // HTTP/1 only; google-gmail1 behaves better with it
    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| ExportError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, auth))
}

/// Look up the address of the authenticated account
pub async fn account_address(hub: &GmailHub) -> Result<String> {
    let (_, profile) = hub
        .users()
        .get_profile("me")
        .add_scope(READONLY_SCOPE)
        .doit()
        .await?;

    profile
        .email_address
        .ok_or_else(|| ExportError::InvalidMessageFormat("Profile has no email address".to_string()))
}

/// Remove a cached token so the next authentication runs the consent flow again
pub async fn clear_token_cache(token_cache_path: &Path) -> Result<()> {
    match tokio::fs::remove_file(token_cache_path).await {
        Ok(()) => {
            info!("Removed cached token {}", token_cache_path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Client secret from file, falling back to the environment when the file is absent
async fn load_application_secret(credentials_path: &Path) -> Result<ApplicationSecret> {
    if tokio::fs::try_exists(credentials_path).await.unwrap_or(false) {
        return yup_oauth2::read_application_secret(credentials_path)
            .await
            .map_err(|e| {
                ExportError::AuthError(format!(
                    "Failed to read credentials {}: {}",
                    credentials_path.display(),
                    e
                ))
            });
    }

    debug!(
        "{} not found, reading client secret from environment",
        credentials_path.display()
    );
    load_credentials_from_env().map_err(|e| {
        ExportError::AuthError(format!(
            "No credentials file at {} and {}",
            credentials_path.display(),
            e
        ))
    })
}

/// Load OAuth2 credentials from environment variables
///
/// # Environment Variables
/// - `GMAIL_CLIENT_ID`: OAuth2 client ID
/// - `GMAIL_CLIENT_SECRET`: OAuth2 client secret
/// - `GMAIL_REDIRECT_URI`: Redirect URI (optional, defaults to http://localhost:8080)
pub fn load_credentials_from_env() -> Result<ApplicationSecret> {
    let client_id = env::var("GMAIL_CLIENT_ID")
        .map_err(|_| ExportError::ConfigError("GMAIL_CLIENT_ID not set".to_string()))?;
    let client_secret = env::var("GMAIL_CLIENT_SECRET")
        .map_err(|_| ExportError::ConfigError("GMAIL_CLIENT_SECRET not set".to_string()))?;
    let redirect_uri = env::var("GMAIL_REDIRECT_URI")
        .unwrap_or_else(|_| "http://localhost:8080".to_string());

    Ok(ApplicationSecret {
        client_id,
        client_secret,
        auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
        token_uri: "https://oauth2.googleapis.com/token".to_string(),
        redirect_uris: vec![redirect_uri],
        ..Default::default()
    })
}

/// Restrict the token file to owner read/write (0600)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Windows relies on the profile directory ACLs
#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}
