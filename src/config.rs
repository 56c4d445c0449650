use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// How to reach the external MCP mail tool server.
#[derive(Debug, Clone, Deserialize)]
pub struct MailToolConfig {
    pub server_name: String,
    pub command: String,
    pub args: Vec<String>,
    /// Extra variables of this process the tool may see, on top of the
    /// basic ones (`PATH`, `HOME`, locale).
    pub passthrough_env: Vec<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    /// Hex or base64 encoded 32-byte key. `None` means an ephemeral key.
    pub credentials_key: Option<String>,
    pub mail_tool: MailToolConfig,
    /// Return internal error details to clients (development only).
    pub expose_error_details: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "mailmind".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "mailmind-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
            refresh_ttl_minutes: std::env::var("JWT_REFRESH_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 14),
        };
        let credentials_key = std::env::var("EMAIL_CREDENTIALS_KEY")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let mail_tool = MailToolConfig {
            server_name: std::env::var("MAIL_TOOL_SERVER_NAME").unwrap_or_else(|_| "imap-mcp".into()),
            command: std::env::var("MAIL_TOOL_COMMAND").unwrap_or_else(|_| "python".into()),
            args: std::env::var("MAIL_TOOL_ARGS")
                .map(|v| split_args(&v))
                .unwrap_or_else(|_| vec!["-m".into(), "imap_mcp.server".into()]),
            passthrough_env: std::env::var("MAIL_TOOL_PASSTHROUGH_ENV")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            timeout_secs: std::env::var("MAIL_TOOL_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60),
        };
        let expose_error_details = std::env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("development"))
            .unwrap_or(false);

        Ok(Self {
            database_url,
            jwt,
            credentials_key,
            mail_tool,
            expose_error_details,
        })
    }
}

fn split_args(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
