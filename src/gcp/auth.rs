//! GCP Authentication
//!
//! Access tokens come from Application Default Credentials (ADC) through
//! gcp_auth. The same ADC are inspected to find out which principal a child
//! tool would run as.

use anyhow::{Context, Result};
use async_trait::async_trait;
use gcp_auth::TokenProvider;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OnceCell, RwLock};

/// Default scopes for GCP API access
pub const DEFAULT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/cloud-platform",
    "https://www.googleapis.com/auth/userinfo.email",
];

/// Refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Token TTL used when expiry is unknown (conservative: 30 minutes)
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

const ADC_FILENAME: &str = "application_default_credentials.json";

const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// Anything that can hand out a bearer token for the workspace service
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// A fixed token, e.g. from `WSCTL_ACCESS_TOKEN`
#[derive(Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// GCP credentials holder with token caching
#[derive(Clone)]
pub struct GcpCredentials {
    provider: Arc<dyn TokenProvider>,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl GcpCredentials {
    /// Create new GCP credentials using Application Default Credentials
    pub async fn new() -> Result<Self> {
        let provider = gcp_auth::provider().await.context(
            "Failed to initialize GCP authentication. Run 'gcloud auth application-default login'",
        )?;

        Ok(Self {
            provider,
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Get an access token, reusing the cached one while it is still valid
    pub async fn get_token(&self) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let token = self
            .provider
            .token(DEFAULT_SCOPES)
            .await
            .context("Failed to get access token")?;

        let token_str = token.as_str().to_string();
        let expires_at = Instant::now() + DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER;

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token_str.clone(),
                expires_at,
            });
        }

        tracing::debug!(
            "New token cached, expires in ~{} minutes",
            (DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(token_str)
    }
}

#[async_trait]
impl AccessTokenSource for GcpCredentials {
    async fn access_token(&self) -> Result<String> {
        self.get_token().await
    }
}

/// ADC initialized on first use and shared between callers.
///
/// Commands that never reach the service or check identity never touch
/// the credential chain.
#[derive(Clone, Default)]
pub struct SharedCredentials(Arc<OnceCell<GcpCredentials>>);

impl SharedCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> Result<&GcpCredentials> {
        self.0.get_or_try_init(GcpCredentials::new).await
    }
}

#[async_trait]
impl AccessTokenSource for SharedCredentials {
    async fn access_token(&self) -> Result<String> {
        self.get().await?.get_token().await
    }
}

/// Get the gcloud configuration directory
pub fn get_gcloud_config_dir() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CLOUDSDK_CONFIG") {
        return Some(PathBuf::from(path));
    }

    // Default to ~/.config/gcloud on Linux/macOS
    dirs::config_dir().map(|p| p.join("gcloud"))
}

/// Where `gcloud auth application-default login` writes its credentials
pub fn default_adc_file() -> Option<PathBuf> {
    get_gcloud_config_dir().map(|dir| dir.join(ADC_FILENAME))
}

/// Validate a GCP project ID format
/// Project IDs must be 6-30 characters, lowercase letters, digits, and hyphens
/// Must start with a letter and cannot end with a hyphen
pub fn validate_project_id(project: &str) -> bool {
    if project.len() < 6 || project.len() > 30 {
        return false;
    }

    let mut chars = project.chars();

    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {},
        _ => return false,
    }

    if project.ends_with('-') {
        return false;
    }

    project
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Identity behind the locally discoverable default credentials
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Email of the principal the credentials belong to
    async fn current_principal(&self) -> Result<String>;

    /// File backing the credentials, if any (none means a metadata server)
    fn backing_file(&self) -> Option<PathBuf>;

    /// Location gcloud writes ADC to by default
    fn default_backing_file(&self) -> Option<PathBuf>;
}

#[derive(Deserialize)]
struct AdcFile {
    #[serde(default)]
    client_email: Option<String>,
}

#[derive(Deserialize)]
struct TokenInfo {
    #[serde(default)]
    email: Option<String>,
}

/// [`CredentialProvider`] over Application Default Credentials
pub struct AdcCredentialProvider {
    credentials: SharedCredentials,
    http: reqwest::Client,
}

impl AdcCredentialProvider {
    pub fn new(credentials: SharedCredentials) -> Self {
        Self {
            credentials,
            http: reqwest::Client::new(),
        }
    }

    fn client_email_from_file(&self) -> Option<String> {
        let path = self.backing_file()?;
        let content = std::fs::read_to_string(&path).ok()?;
        let parsed: AdcFile = serde_json::from_str(&content).ok()?;
        parsed.client_email
    }
}

#[async_trait]
impl CredentialProvider for AdcCredentialProvider {
    async fn current_principal(&self) -> Result<String> {
        // Service account key files name their principal directly
        if let Some(email) = self.client_email_from_file() {
            return Ok(email);
        }

        let token = self.credentials.access_token().await?;
        let info: TokenInfo = self
            .http
            .get(TOKENINFO_URL)
            .query(&[("access_token", token.as_str())])
            .send()
            .await
            .context("Failed to query tokeninfo")?
            .error_for_status()
            .context("tokeninfo rejected the application default credentials")?
            .json()
            .await
            .context("Failed to parse tokeninfo response")?;

        info.email
            .context("Application default credentials carry no email scope")
    }

    fn backing_file(&self) -> Option<PathBuf> {
        if let Ok(path) = std::env::var("GOOGLE_APPLICATION_CREDENTIALS") {
            return Some(PathBuf::from(path));
        }
        default_adc_file().filter(|path| path.is_file())
    }

    fn default_backing_file(&self) -> Option<PathBuf> {
        default_adc_file()
    }
}
