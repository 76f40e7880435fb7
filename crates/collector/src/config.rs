use serde::Deserialize;

pub const ENV_PREFIX: &str = "SAPWATCH_COLLECTOR";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub tls: TlsConfig,
    pub projectors: ProjectorConfig,
    pub limits: LimitsConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Listener TLS. When enabled, clients must present a certificate signed by `ca_path`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsConfig {
    pub enabled: bool,
    #[serde(default)]
    pub cert_path: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
    #[serde(default)]
    pub ca_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectorConfig {
    /// Worker tasks draining the projection queue.
    pub workers: usize,
    /// Events buffered before ingress blocks.
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    pub collect_body_bytes: u64,
    pub list_page_max: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            collect_body_bytes: 4 * 1024 * 1024,
            list_page_max: 500,
        }
    }
}

impl TlsConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        for (key, value) in [
            ("tls.cert_path", &self.cert_path),
            ("tls.key_path", &self.key_path),
            ("tls.ca_path", &self.ca_path),
        ] {
            match value.as_deref().map(str::trim) {
                Some(path) if !path.is_empty() => {}
                _ => anyhow::bail!("{key} is required when tls.enabled=true"),
            }
        }
        Ok(())
    }
}

impl ProjectorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers == 0 {
            anyhow::bail!("projectors.workers must be > 0");
        }
        if self.queue_capacity == 0 {
            anyhow::bail!("projectors.queue_capacity must be > 0");
        }
        Ok(())
    }
}

impl LimitsConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.collect_body_bytes == 0 {
            anyhow::bail!("limits.collect_body_bytes must be > 0");
        }
        if self.list_page_max == 0 {
            anyhow::bail!("limits.list_page_max must be > 0");
        }
        Ok(())
    }
}

pub fn load() -> anyhow::Result<AppConfig> {
    let env = config::Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        // Keep try_parsing disabled so paths and ids are not coerced.
        .try_parsing(false);

    let projectors = ProjectorConfig::default();
    let limits = LimitsConfig::default();

    let builder = config::Config::builder()
        .add_source(config::File::with_name("config").required(false))
        .add_source(env)
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8081)?
        .set_default("database.url", "sqlite://data/collector.db")?
        .set_default("tls.enabled", false)?
        .set_default("tls.cert_path", Option::<String>::None)?
        .set_default("tls.key_path", Option::<String>::None)?
        .set_default("tls.ca_path", Option::<String>::None)?
        .set_default("projectors.workers", projectors.workers as u64)?
        .set_default("projectors.queue_capacity", projectors.queue_capacity as u64)?
        .set_default("limits.collect_body_bytes", limits.collect_body_bytes)?
        .set_default("limits.list_page_max", limits.list_page_max)?
        .set_default("metrics.host", "127.0.0.1")?
        .set_default("metrics.port", 9093)?;

    let cfg = builder.build()?;
    let mut app: AppConfig = cfg.try_deserialize()?;
    app.server.host = app.server.host.trim().to_string();
    if app.database.url.trim().is_empty() {
        anyhow::bail!("database.url cannot be empty");
    }
    app.tls.validate()?;
    app.projectors.validate()?;
    app.limits.validate()?;
    Ok(app)
}
