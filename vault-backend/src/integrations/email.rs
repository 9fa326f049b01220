//! SMTP settings handle. Mail transport is handled by the notification
//! worker; this side only hands it validated settings.

use std::time::Duration;

use tokio::net::TcpStream;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
    pub from_name: Option<String>,
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .field("from_address", &self.from_address)
            .field("from_name", &self.from_name)
            .finish()
    }
}

impl SmtpSettings {
    pub fn parse_port(raw: &str) -> Result<u16, String> {
        raw.trim()
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| format!("Invalid SMTP port '{}'", raw))
    }

    /// `"Name <address>"` or the bare address
    pub fn from_header(&self) -> String {
        match &self.from_name {
            Some(name) if !name.trim().is_empty() => format!("{} <{}>", name.trim(), self.from_address),
            _ => self.from_address.clone(),
        }
    }

    /// Check the SMTP server accepts TCP connections
    pub async fn test_connection(&self) -> Result<String, String> {
        let addr = format!("{}:{}", self.host, self.port);
        match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr)).await {
            Ok(Ok(_)) => Ok(addr),
            Ok(Err(e)) => Err(format!("Could not connect to {}: {}", addr, e)),
            Err(_) => Err(format!("Timed out connecting to {}", addr)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(from_name: Option<&str>) -> SmtpSettings {
        SmtpSettings {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: "mailer".to_string(),
            password: "hunter2".to_string(),
            from_address: "studio@example.com".to_string(),
            from_name: from_name.map(str::to_string),
        }
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(SmtpSettings::parse_port(" 587 ").unwrap(), 587);
        assert!(SmtpSettings::parse_port("0").is_err());
        assert!(SmtpSettings::parse_port("70000").is_err());
        assert!(SmtpSettings::parse_port("smtp").is_err());
    }

    #[test]
    fn test_from_header() {
        assert_eq!(settings(Some("Studio")).from_header(), "Studio <studio@example.com>");
        assert_eq!(settings(None).from_header(), "studio@example.com");
    }

    #[test]
    fn test_debug_redacts_password() {
        assert!(!format!("{:?}", settings(None)).contains("hunter2"));
    }
}
