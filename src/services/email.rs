use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use std::time::Duration;

use super::ServiceError;

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_verification_email(
        &self,
        to_email: &str,
        verification_token: &str,
        base_url: &str,
    ) -> Result<(), ServiceError>;

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_token: &str,
        base_url: &str,
    ) -> Result<(), ServiceError>;
}

#[derive(Clone)]
pub struct SmtpEmailService {
    mailer: SmtpTransport,
    from_email: String,
}

impl SmtpEmailService {
    pub fn new(config: &crate::config::SmtpConfig) -> Result<Self, ServiceError> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());

        let mailer = SmtpTransport::relay(&config.host)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!(e.to_string())))?
            .credentials(creds)
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, "Email service initialized");

        Ok(Self {
            mailer,
            from_email: config.from_address.clone(),
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        plain_body: &str,
    ) -> Result<(), ServiceError> {
        let email = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|e: lettre::address::AddressError| {
                        ServiceError::Internal(e.into())
                    })?,
            )
            .to(to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| ServiceError::Internal(e.into()))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(plain_body.to_string())
            .map_err(|e| ServiceError::Internal(e.into()))?;

        // Send on the blocking pool so the SMTP round trip does not stall
        // the async runtime.
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| ServiceError::Internal(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, subject = %subject, "Email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, to = %to_email, "Failed to send email");
                Err(ServiceError::Email(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl EmailProvider for SmtpEmailService {
    async fn send_verification_email(
        &self,
        to_email: &str,
        verification_token: &str,
        base_url: &str,
    ) -> Result<(), ServiceError> {
        let link = format!(
            "{}/auth/verify-email?email={}&token={}",
            base_url,
            urlencode(to_email),
            verification_token
        );

        let body = format!(
            "Welcome to FleetGate.\n\n\
             Please confirm your email address by visiting the link below:\n\n\
             {}\n\n\
             The link expires in 24 hours. If you did not create an account, \
             you can ignore this message.",
            link
        );

        self.send_email(to_email, "Confirm your email address", &body)
            .await
    }

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_token: &str,
        base_url: &str,
    ) -> Result<(), ServiceError> {
        let link = format!(
            "{}/auth/password-reset/confirm?email={}&token={}",
            base_url,
            urlencode(to_email),
            reset_token
        );

        let body = format!(
            "We received a request to reset your password.\n\n\
             Visit the link below to choose a new one:\n\n\
             {}\n\n\
             The link expires in 1 hour. If you did not request a reset, you \
             can ignore this message; your password is unchanged.",
            link
        );

        self.send_email(to_email, "Reset your password", &body).await
    }
}

/// Minimal query-component encoding for the address in mail links.
fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => out.push(c),
            '@' => out.push_str("%40"),
            '+' => out.push_str("%2B"),
            _ => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).as_bytes() {
                    out.push_str(&format!("%{:02X}", byte));
                }
            }
        }
    }
    out
}

/// No-op provider for tests and local runs without SMTP access.
#[derive(Clone, Default)]
pub struct MockEmailService;

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_verification_email(
        &self,
        _to_email: &str,
        _verification_token: &str,
        _base_url: &str,
    ) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn send_password_reset_email(
        &self,
        _to_email: &str,
        _reset_token: &str,
        _base_url: &str,
    ) -> Result<(), ServiceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urlencode_email() {
        assert_eq!(urlencode("a.user@example.com"), "a.user%40example.com");
        assert_eq!(urlencode("a+b@example.com"), "a%2Bb%40example.com");
    }
}
