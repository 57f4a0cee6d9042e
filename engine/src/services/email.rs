use crate::config::SmtpConfig;
use chrono::{DateTime, Utc};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    from_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub subject: String,
    pub html_body: String,
    pub text_body: Option<String>,
}

/// Data for the tenant failure alert sent after a dead-lettered execution
#[derive(Debug, Clone)]
pub struct WorkflowFailureNotice {
    pub tenant_name: String,
    pub workflow_name: String,
    pub execution_id: Uuid,
    pub failed_at: DateTime<Utc>,
    pub retry_count: i32,
    pub last_error: String,
    /// Deep link to the failed-executions view
    pub dashboard_url: String,
}

impl EmailService {
    pub async fn new(smtp_config: &SmtpConfig) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let creds = Credentials::new(
            smtp_config.username.clone(),
            smtp_config.password.clone(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp_config.host)
            .port(smtp_config.port)
            .credentials(creds)
            .pool_config(PoolConfig::new().max_size(10))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        Ok(EmailService {
            transport,
            from_email: smtp_config.from_email.clone(),
            from_name: smtp_config.from_name.clone(),
        })
    }

    pub async fn send_email(
        &self,
        to_email: &str,
        to_name: Option<&str>,
        subject: &str,
        html_body: &str,
        text_body: Option<&str>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let from = format!("{} <{}>", self.from_name, self.from_email).parse::<Mailbox>()?;

        let to = if let Some(name) = to_name {
            format!("{} <{}>", name, to_email).parse::<Mailbox>()?
        } else {
            to_email.parse::<Mailbox>()?
        };

        let message_builder = Message::builder().from(from).to(to).subject(subject);

        let message = if let Some(text) = text_body {
            message_builder.multipart(
                lettre::message::MultiPart::alternative()
                    .singlepart(
                        lettre::message::SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text.to_string()),
                    )
                    .singlepart(
                        lettre::message::SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?
        } else {
            message_builder
                .header(ContentType::TEXT_HTML)
                .body(html_body.to_string())?
        };

        match self.transport.send(message).await {
            Ok(_) => {
                info!("Email sent successfully to {}", to_email);
                Ok(())
            }
            Err(e) => {
                error!("Failed to send email to {}: {}", to_email, e);
                Err(Box::new(e))
            }
        }
    }

    // Template for workflow failure alerts
    pub fn workflow_failed_template(&self, notice: &WorkflowFailureNotice) -> EmailTemplate {
        let subject = format!("[Workflow Execution Failed: {}]", notice.workflow_name);

        let html_body = format!(
            r#"
            <html>
            <head>
                <style>
                    body {{ font-family: Arial, sans-serif; margin: 0; padding: 20px; background-color: #f5f5f5; }}
                    .container {{ max-width: 600px; margin: 0 auto; background: white; border-radius: 8px; overflow: hidden; box-shadow: 0 2px 10px rgba(0,0,0,0.1); }}
                    .header {{ background: #dc2626; color: white; padding: 20px; text-align: center; }}
                    .content {{ padding: 30px; }}
                    .failure-info {{ background: #fef2f2; border-left: 4px solid #dc2626; padding: 15px; margin: 20px 0; }}
                    .footer {{ background: #f8fafc; padding: 20px; text-align: center; color: #666; }}
                    .btn {{ display: inline-block; background: #dc2626; color: white; padding: 12px 24px; text-decoration: none; border-radius: 6px; margin: 10px 0; }}
                </style>
            </head>
            <body>
                <div class="container">
                    <div class="header">
                        <h1>Workflow Execution Failed</h1>
                    </div>
                    <div class="content">
                        <p>Hello {tenant},</p>
                        <p>An automation run in your account stopped after exhausting its retry attempts.</p>

                        <div class="failure-info">
                            <h3>Failure Details</h3>
                            <p><strong>Workflow:</strong> {workflow}</p>
                            <p><strong>Execution ID:</strong> {execution}</p>
                            <p><strong>Failed at:</strong> {failed_at}</p>
                            <p><strong>Retry attempts:</strong> {retries}</p>
                            <p><strong>Last error:</strong> {last_error}</p>
                        </div>

                        <p>The record was not re-enrolled automatically. Review the failed execution and re-enroll it once the cause is resolved:</p>

                        <a href="{url}" class="btn">View Failed Executions</a>
                    </div>
                    <div class="footer">
                        <p>Kennelflow automation alerts for {tenant}</p>
                    </div>
                </div>
            </body>
            </html>
            "#,
            tenant = notice.tenant_name,
            workflow = notice.workflow_name,
            execution = notice.execution_id,
            failed_at = notice.failed_at.to_rfc3339(),
            retries = notice.retry_count,
            last_error = notice.last_error,
            url = notice.dashboard_url,
        );

        let text_body = format!(
            "Workflow '{}' failed for tenant {}.\nExecution: {}\nFailed at: {}\nRetry attempts: {}\nLast error: {}\nReview: {}\n",
            notice.workflow_name,
            notice.tenant_name,
            notice.execution_id,
            notice.failed_at.to_rfc3339(),
            notice.retry_count,
            notice.last_error,
            notice.dashboard_url,
        );

        EmailTemplate {
            subject,
            html_body,
            text_body: Some(text_body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_notice() -> WorkflowFailureNotice {
        WorkflowFailureNotice {
            tenant_name: "Sunny Paws Boarding".to_string(),
            workflow_name: "Booking follow-up".to_string(),
            execution_id: Uuid::new_v4(),
            failed_at: Utc::now(),
            retry_count: 3,
            last_error: "webhook returned status 502".to_string(),
            dashboard_url: "https://app.kennelflow.com/workflows/executions?status=failed"
                .to_string(),
        }
    }

    #[tokio::test]
    async fn test_failure_subject_format() {
        let service = EmailService::new(&crate::config::SmtpConfig {
            host: "localhost".to_string(),
            port: 2525,
            username: "u".to_string(),
            password: "p".to_string(),
            from_email: "alerts@kennelflow.com".to_string(),
            from_name: "Kennelflow Alerts".to_string(),
            use_tls: false,
        })
        .await
        .unwrap();

        let notice = sample_notice();
        let template = service.workflow_failed_template(&notice);

        assert_eq!(
            template.subject,
            "[Workflow Execution Failed: Booking follow-up]"
        );
        assert!(template.html_body.contains("Sunny Paws Boarding"));
        assert!(template.html_body.contains(&notice.execution_id.to_string()));
        assert!(template.html_body.contains("webhook returned status 502"));
        assert!(template.html_body.contains("status=failed"));
        assert!(template.text_body.unwrap().contains("Retry attempts: 3"));
    }
}
