use kennelflow_shared::Tenant;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::StoreResult;

/// Engine-relevant slice of a tenant's settings JSON. Unknown keys are
/// ignored; missing keys fall back to defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TenantSettings {
    pub notify_on_workflow_failure: bool,
    pub admin_emails: Vec<String>,
    pub log_retention_days: Option<i64>,
    pub execution_retention_days: Option<i64>,
    pub sms_gateway: Option<SmsGatewayConfig>,
}

/// HTTP SMS gateway credentials, configured per tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsGatewayConfig {
    pub api_url: String,
    pub api_key: String,
    pub from_number: String,
}

#[derive(Clone)]
pub struct TenantStore {
    pool: PgPool,
}

impl TenantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, tenant_id: Uuid) -> StoreResult<Option<Tenant>> {
        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(tenant)
    }

    pub async fn list(&self) -> StoreResult<Vec<Tenant>> {
        let tenants = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;

        Ok(tenants)
    }

    pub async fn settings(&self, tenant_id: Uuid) -> StoreResult<TenantSettings> {
        let tenant = self.get(tenant_id).await?;

        Ok(tenant
            .map(|t| parse_settings(&t.settings))
            .unwrap_or_default())
    }
}

pub fn parse_settings(settings: &serde_json::Value) -> TenantSettings {
    serde_json::from_value(settings.clone()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_settings_defaults() {
        let settings = parse_settings(&json!({}));
        assert!(!settings.notify_on_workflow_failure);
        assert!(settings.admin_emails.is_empty());
        assert!(settings.log_retention_days.is_none());
        assert!(settings.sms_gateway.is_none());
    }

    #[test]
    fn test_settings_parse() {
        let settings = parse_settings(&json!({
            "notifyOnWorkflowFailure": true,
            "adminEmails": ["ops@sunnypaws.example"],
            "logRetentionDays": 30,
            "smsGateway": {
                "apiUrl": "https://sms.example/v1/messages",
                "apiKey": "key",
                "fromNumber": "+15550100"
            }
        }));

        assert!(settings.notify_on_workflow_failure);
        assert_eq!(settings.admin_emails.len(), 1);
        assert_eq!(settings.log_retention_days, Some(30));
        assert_eq!(
            settings.sms_gateway.unwrap().from_number,
            "+15550100"
        );
    }

    #[test]
    fn test_malformed_settings_fall_back_to_defaults() {
        let settings = parse_settings(&json!("not an object"));
        assert!(!settings.notify_on_workflow_failure);
    }
}
