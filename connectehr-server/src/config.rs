use connectehr_core::Vendor;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Minimum accepted length of the local JWT signing secret
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Server configuration loaded from YAML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub vendors: VendorsSettings,
    pub oauth: OAuthSettings,
    pub storage: StorageSettings,
    pub audit: AuditSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Browser origins allowed by CORS. Empty allows any origin without credentials.
    pub cors_origins: Vec<String>,
    /// Timeout for every upstream EHR call
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// When false the role gate is skipped and the vendor token is read
    /// from `Authorization` directly. Development only.
    pub enabled: bool,
    pub jwt_secret: String,
    pub token_ttl_minutes: i64,
    pub users: Vec<UserAccount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Argon2 PHC string, see `connectehr-server hash-password`
    pub password_hash: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorsSettings {
    pub epic: Option<VendorSettings>,
    pub cerner: Option<VendorSettings>,
}

/// OAuth client registration and endpoints of one EHR vendor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorSettings {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub authorize_url: String,
    pub token_url: String,
    /// FHIR R4 base, also sent as the SMART `aud`
    pub fhir_base_url: String,
    pub scopes: String,
    /// Frontend page receiving the token after the callback. Without it the
    /// callback answers with the token response as JSON.
    #[serde(default)]
    pub frontend_redirect: Option<String>,
    #[serde(default)]
    pub backend_services: Option<BackendServicesSettings>,
}

/// SMART Backend Services (client_credentials with a signed assertion)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendServicesSettings {
    pub private_key_file: PathBuf,
    #[serde(default)]
    pub key_id: Option<String>,
    pub scopes: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateStoreKind {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    pub state_store: StateStoreKind,
    pub state_ttl_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub data_dir: PathBuf,
    pub audit_db: String,
    pub state_db: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: Vec::new(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            jwt_secret: String::new(),
            token_ttl_minutes: 60,
            users: Vec::new(),
        }
    }
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            state_store: StateStoreKind::Memory,
            state_ttl_secs: 600,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            audit_db: "audit.sqlite".to_string(),
            state_db: "oauth_state.sqlite".to_string(),
        }
    }
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl VendorsSettings {
    pub fn get(&self, vendor: Vendor) -> Option<&VendorSettings> {
        match vendor {
            Vendor::Epic => self.epic.as_ref(),
            Vendor::Cerner => self.cerner.as_ref(),
        }
    }

    fn get_mut(&mut self, vendor: Vendor) -> Option<&mut VendorSettings> {
        match vendor {
            Vendor::Epic => self.epic.as_mut(),
            Vendor::Cerner => self.cerner.as_mut(),
        }
    }

    /// Vendors with a configuration section, in a stable order
    pub fn configured(&self) -> Vec<Vendor> {
        Vendor::ALL
            .into_iter()
            .filter(|v| self.get(*v).is_some())
            .collect()
    }
}

impl UserAccount {
    /// Match on the short username or the e-mail address
    pub fn matches_login(&self, login: &str) -> bool {
        self.username == login || self.email.as_deref() == Some(login)
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: ServerConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = if let Some(path) = config_path {
            Self::load_from_file(path)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `CONNECTEHR_*` overrides from the given lookup
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("CONNECTEHR_PORT")
            && let Ok(port_num) = port.parse()
        {
            self.server.port = port_num;
        }

        if let Some(host) = lookup("CONNECTEHR_HOST") {
            self.server.host = host;
        }

        if let Some(data_dir) = lookup("CONNECTEHR_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(data_dir);
        }

        if let Some(secret) = lookup("CONNECTEHR_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }

        for vendor in Vendor::ALL {
            let prefix = format!("CONNECTEHR_{}", vendor.as_str().to_ascii_uppercase());
            let Some(settings) = self.vendors.get_mut(vendor) else {
                continue;
            };
            if let Some(client_id) = lookup(&format!("{prefix}_CLIENT_ID")) {
                settings.client_id = client_id;
            }
            if let Some(secret) = lookup(&format!("{prefix}_CLIENT_SECRET")) {
                settings.client_secret = Some(secret);
            }
        }
    }

    /// Reject configurations the server must not start with
    pub fn validate(&self) -> Result<(), String> {
        if self.auth.enabled && self.auth.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(format!(
                "auth.jwt_secret must be at least {} characters when auth is enabled",
                MIN_JWT_SECRET_LEN
            ));
        }

        if self.auth.token_ttl_minutes <= 0 {
            return Err("auth.token_ttl_minutes must be positive".to_string());
        }

        let origins = &self.server.cors_origins;
        if origins.len() > 1 && origins.iter().any(|o| o.trim() == "*") {
            return Err(
                "server.cors_origins: \"*\" allows any origin and cannot be combined with explicit origins"
                    .to_string(),
            );
        }

        if self.oauth.state_ttl_secs <= 0 {
            return Err("oauth.state_ttl_secs must be positive".to_string());
        }

        for vendor in self.vendors.configured() {
            if let Some(settings) = self.vendors.get(vendor)
                && settings.client_id.trim().is_empty()
            {
                return Err(format!("vendors.{}.client_id is empty", vendor));
            }
        }

        Ok(())
    }

    pub fn audit_db_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.audit_db)
    }

    pub fn state_db_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.state_db)
    }
}
