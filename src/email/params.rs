//! Validation and coercion of request bodies, done once at the HTTP boundary.

use secrecy::SecretString;
use serde::Serialize;
use serde_json::{json, Value};

use crate::email::dto::{CredentialsRequest, MailboxRequest};
use crate::error::EmailError;
use crate::mcp::ImapCredentials;

pub const DEFAULT_FOLDER: &str = "INBOX";
pub const DEFAULT_DAYS: u32 = 7;
pub const DEFAULT_LIMIT: u32 = 50;
const MAX_DAYS: u32 = 30;
const MAX_LIMIT: u32 = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SummaryType {
    #[default]
    Brief,
    Detailed,
    ActionFocused,
}

impl SummaryType {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "brief" => Some(Self::Brief),
            "detailed" => Some(Self::Detailed),
            "action-focused" | "action_focused" => Some(Self::ActionFocused),
            _ => None,
        }
    }
}

/// Mailbox selection shared by the fetch, summarize and categorize tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxQuery {
    pub folder: String,
    pub days: u32,
    pub limit: u32,
    pub unread_only: bool,
    pub summary_type: SummaryType,
}

impl Default for MailboxQuery {
    fn default() -> Self {
        Self {
            folder: DEFAULT_FOLDER.to_string(),
            days: DEFAULT_DAYS,
            limit: DEFAULT_LIMIT,
            unread_only: false,
            summary_type: SummaryType::Brief,
        }
    }
}

impl MailboxQuery {
    pub fn from_request(req: MailboxRequest) -> Result<Self, EmailError> {
        let folder = match req.folder {
            None | Some(Value::Null) => DEFAULT_FOLDER.to_string(),
            Some(Value::String(s)) if s.trim().is_empty() => DEFAULT_FOLDER.to_string(),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(_) => return Err(EmailError::invalid("folder", "folder must be a string")),
        };
        let days = integer("days", req.days.as_ref())?
            .map(|d| clamp(d, MAX_DAYS))
            .unwrap_or(DEFAULT_DAYS);
        let limit = integer("limit", req.limit.as_ref())?
            .map(|l| clamp(l, MAX_LIMIT))
            .unwrap_or(DEFAULT_LIMIT);
        let unread_only = boolean("unread_only", req.unread_only.as_ref())?.unwrap_or(false);
        let summary_type = match req.summary_type {
            None | Some(Value::Null) => SummaryType::default(),
            Some(Value::String(s)) => SummaryType::parse(&s).ok_or_else(|| {
                EmailError::invalid(
                    "summary_type",
                    "summary_type must be one of brief, detailed, action-focused",
                )
            })?,
            Some(_) => {
                return Err(EmailError::invalid("summary_type", "summary_type must be a string"))
            }
        };

        Ok(Self {
            folder,
            days,
            limit,
            unread_only,
            summary_type,
        })
    }

    pub fn fetch_arguments(&self) -> Value {
        json!({
            "folder": self.folder,
            "days": self.days,
            "limit": self.limit,
            "unread_only": self.unread_only,
        })
    }

    pub fn summarize_arguments(&self) -> Value {
        json!({
            "folder": self.folder,
            "days": self.days,
            "limit": self.limit,
            "summary_type": self.summary_type,
            "unread_only": self.unread_only,
        })
    }

    pub fn categorize_arguments(&self) -> Value {
        json!({
            "folder": self.folder,
            "days": self.days,
            "limit": self.limit,
        })
    }
}

/// Checks every field of a credentials body and builds the call payload.
pub fn validate_credentials(req: CredentialsRequest) -> Result<ImapCredentials, EmailError> {
    let host = required_string("host", req.host)?;
    let host = host.trim().to_string();
    if host.is_empty() {
        return Err(EmailError::invalid("host", "host must not be empty"));
    }

    let port = integer("port", req.port.as_ref())?
        .ok_or_else(|| EmailError::invalid("port", "port is required"))?;
    let port = u16::try_from(port)
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| EmailError::invalid("port", "port must be between 1 and 65535"))?;

    let username = required_string("username", req.username)?;
    let username = username.trim().to_string();
    if username.is_empty() {
        return Err(EmailError::invalid("username", "username must not be empty"));
    }

    let password = required_string("password", req.password)?;
    if password.is_empty() {
        return Err(EmailError::invalid("password", "password must not be empty"));
    }

    let use_ssl = boolean("use_ssl", req.use_ssl.as_ref())?.unwrap_or(true);

    Ok(ImapCredentials {
        host,
        port,
        username,
        password: SecretString::new(password.into()),
        use_ssl,
    })
}

fn required_string(field: &'static str, value: Option<Value>) -> Result<String, EmailError> {
    match value {
        None | Some(Value::Null) => Err(EmailError::invalid(field, format!("{} is required", field))),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(EmailError::invalid(field, format!("{} must be a string", field))),
    }
}

fn integer(field: &'static str, value: Option<&Value>) -> Result<Option<i64>, EmailError> {
    let invalid = || EmailError::invalid(field, format!("{} must be an integer", field));
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => Ok(Some(i)),
            None => n
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| Some(f as i64))
                .ok_or_else(invalid),
        },
        Some(Value::String(s)) => s.trim().parse::<i64>().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

fn boolean(field: &'static str, value: Option<&Value>) -> Result<Option<bool>, EmailError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Ok(Some(true)),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Ok(Some(false)),
        Some(_) => Err(EmailError::invalid(field, format!("{} must be a boolean", field))),
    }
}

fn clamp(value: i64, max: u32) -> u32 {
    value.clamp(1, i64::from(max)) as u32
}

#[cfg(test)]
mod params_tests {
    use secrecy::ExposeSecret;

    use super::*;

    fn creds(body: Value) -> Result<ImapCredentials, EmailError> {
        validate_credentials(serde_json::from_value(body).unwrap())
    }

    fn field_of(err: EmailError) -> &'static str {
        match err {
            EmailError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    fn valid_body() -> Value {
        json!({
            "host": "imap.example.com",
            "port": 993,
            "username": "a@example.com",
            "password": "secret123",
            "use_ssl": true
        })
    }

    fn with(key: &str, value: Value) -> Value {
        let mut body = valid_body();
        body[key] = value;
        body
    }

    #[test]
    fn accepts_valid_credentials() {
        let c = creds(valid_body()).unwrap();
        assert_eq!(c.host, "imap.example.com");
        assert_eq!(c.port, 993);
        assert_eq!(c.username, "a@example.com");
        assert_eq!(c.password.expose_secret(), "secret123");
        assert!(c.use_ssl);
    }

    #[test]
    fn use_ssl_defaults_to_true_and_port_accepts_strings() {
        let mut body = valid_body();
        body.as_object_mut().unwrap().remove("use_ssl");
        body["port"] = json!("143");
        let c = creds(body).unwrap();
        assert!(c.use_ssl);
        assert_eq!(c.port, 143);

        let c = creds(with("use_ssl", json!(false))).unwrap();
        assert!(!c.use_ssl);
    }

    #[test]
    fn rejects_each_bad_field_by_name() {
        let cases = [
            (with("port", json!(0)), "port"),
            (with("port", json!(65536)), "port"),
            (with("port", json!(-1)), "port"),
            (with("port", json!("abc")), "port"),
            (with("port", Value::Null), "port"),
            (with("host", json!("")), "host"),
            (with("host", json!("   ")), "host"),
            (with("host", json!(42)), "host"),
            (with("username", json!("")), "username"),
            (with("password", json!("")), "password"),
            (with("password", Value::Null), "password"),
            (with("use_ssl", json!("yes")), "use_ssl"),
        ];
        for (body, field) in cases {
            let err = creds(body.clone()).unwrap_err();
            assert_eq!(field_of(err), field, "body: {}", body);
        }
    }

    #[test]
    fn port_bounds_are_inclusive() {
        assert_eq!(creds(with("port", json!(1))).unwrap().port, 1);
        assert_eq!(creds(with("port", json!(65535))).unwrap().port, 65535);
    }

    #[test]
    fn mailbox_defaults() {
        let q = MailboxQuery::from_request(MailboxRequest::default()).unwrap();
        assert_eq!(q, MailboxQuery::default());
        assert_eq!(q.folder, "INBOX");
        assert_eq!(q.days, 7);
        assert_eq!(q.limit, 50);
        assert!(!q.unread_only);
        assert_eq!(q.summary_type, SummaryType::Brief);
    }

    #[test]
    fn mailbox_coerces_strings_and_clamps() {
        let req: MailboxRequest = serde_json::from_value(json!({
            "folder": " Work ",
            "days": "90",
            "limit": 0,
            "unread_only": "true",
            "summary_type": "action-focused"
        }))
        .unwrap();
        let q = MailboxQuery::from_request(req).unwrap();
        assert_eq!(q.folder, "Work");
        assert_eq!(q.days, 30);
        assert_eq!(q.limit, 1);
        assert!(q.unread_only);
        assert_eq!(q.summary_type, SummaryType::ActionFocused);
        assert_eq!(q.summarize_arguments()["summary_type"], json!("action-focused"));
    }

    #[test]
    fn mailbox_rejects_bad_types() {
        let bad = [
            (json!({ "days": "soon" }), "days"),
            (json!({ "limit": 2.5 }), "limit"),
            (json!({ "unread_only": 1 }), "unread_only"),
            (json!({ "summary_type": "haiku" }), "summary_type"),
            (json!({ "folder": ["INBOX"] }), "folder"),
        ];
        for (body, field) in bad {
            let req: MailboxRequest = serde_json::from_value(body).unwrap();
            assert_eq!(field_of(MailboxQuery::from_request(req).unwrap_err()), field);
        }
    }

    #[test]
    fn tool_arguments_shapes() {
        let q = MailboxQuery::default();
        assert_eq!(
            q.fetch_arguments(),
            json!({ "folder": "INBOX", "days": 7, "limit": 50, "unread_only": false })
        );
        assert_eq!(
            q.categorize_arguments(),
            json!({ "folder": "INBOX", "days": 7, "limit": 50 })
        );
        assert_eq!(q.summarize_arguments()["summary_type"], json!("brief"));
    }
}
