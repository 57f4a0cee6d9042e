// Outbound webhook executor
//
// The full request/response exchange is persisted to webhook_logs whether
// the call succeeds or not; only the HTTP outcome decides step success.

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::time::{Duration, Instant};
use tracing::warn;
use url::Url;

use super::{
    config_str, ActionError, ActionExecutor, ActionKind, ActionOutcome, ActionResult,
    ValidationOutcome,
};
use crate::workflows::context::ExecutionContext;
use crate::workflows::interpolate::{interpolate, interpolate_json};

const ALLOWED_METHODS: [&str; 5] = ["GET", "POST", "PUT", "PATCH", "DELETE"];

pub struct WebhookExecutor;

#[async_trait]
impl ActionExecutor for WebhookExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::Webhook
    }

    fn validate(&self, config: &JsonValue) -> ValidationOutcome {
        let mut errors = Vec::new();

        match config_str(config, "url") {
            None => errors.push("'url' is required".to_string()),
            // Template tokens are tolerated pre-substitution; only a
            // token-free URL can be checked for shape at authoring time.
            Some(url) if !url.contains("{{") => {
                if Url::parse(url).is_err() {
                    errors.push(format!("'{}' is not a valid URL", url));
                }
            }
            Some(_) => {}
        }

        if let Some(method) = config_str(config, "method") {
            if !ALLOWED_METHODS.contains(&method.to_uppercase().as_str()) {
                errors.push(format!("unsupported HTTP method '{}'", method));
            }
        }

        ValidationOutcome::from_errors(errors)
    }

    async fn execute(&self, config: &JsonValue, ctx: &ExecutionContext<'_>) -> ActionResult {
        let url_template = config_str(config, "url")
            .ok_or_else(|| ActionError::InvalidConfig("'url' is required".to_string()))?;
        let url_text = interpolate(url_template, &ctx.record);
        let url =
            Url::parse(&url_text).map_err(|_| ActionError::MalformedUrl(url_text.clone()))?;

        let method = config_str(config, "method")
            .unwrap_or("POST")
            .to_uppercase();

        let headers = config
            .get("headers")
            .map(|h| interpolate_json(h, &ctx.record))
            .unwrap_or_else(|| json!({}));
        let body = config.get("body").map(|b| interpolate_json(b, &ctx.record));

        let timeout = Duration::from_millis(ctx.deps.webhook_timeout_ms);
        let client = &ctx.deps.http;
        let mut request = match method.as_str() {
            "GET" => client.get(url.clone()),
            "POST" => client.post(url.clone()),
            "PUT" => client.put(url.clone()),
            "PATCH" => client.patch(url.clone()),
            "DELETE" => client.delete(url.clone()),
            other => {
                return Err(ActionError::InvalidConfig(format!(
                    "unsupported HTTP method '{}'",
                    other
                )))
            }
        }
        .timeout(timeout);

        if let Some(header_map) = headers.as_object() {
            for (key, value) in header_map {
                if let Some(v) = value.as_str() {
                    request = request.header(key, v);
                }
            }
        }

        let request_body_text = body.as_ref().map(|b| b.to_string());
        if let Some(body) = &body {
            request = request.json(body);
        }

        let started = Instant::now();
        let outcome = request.send().await;
        let duration_ms = started.elapsed().as_millis() as i64;

        match outcome {
            Ok(response) => {
                let status = response.status().as_u16();
                let response_body = response.text().await.unwrap_or_default();

                self.log_exchange(
                    ctx,
                    &url_text,
                    &method,
                    &headers,
                    request_body_text.as_deref(),
                    Some(status as i32),
                    Some(&response_body),
                    duration_ms,
                    None,
                )
                .await;

                if !(200..300).contains(&status) {
                    return Err(ActionError::WebhookStatus(status));
                }

                Ok(ActionOutcome::success(json!({
                    "statusCode": status,
                    "durationMs": duration_ms,
                })))
            }
            Err(e) => {
                let error_text = e.to_string();
                self.log_exchange(
                    ctx,
                    &url_text,
                    &method,
                    &headers,
                    request_body_text.as_deref(),
                    None,
                    None,
                    duration_ms,
                    Some(&error_text),
                )
                .await;

                if e.is_timeout() {
                    Err(ActionError::WebhookTimeout(ctx.deps.webhook_timeout_ms))
                } else {
                    Err(ActionError::WebhookRequest(error_text))
                }
            }
        }
    }
}

impl WebhookExecutor {
    #[allow(clippy::too_many_arguments)]
    async fn log_exchange(
        &self,
        ctx: &ExecutionContext<'_>,
        url: &str,
        method: &str,
        headers: &JsonValue,
        request_body: Option<&str>,
        status_code: Option<i32>,
        response_body: Option<&str>,
        duration_ms: i64,
        error: Option<&str>,
    ) {
        if let Err(e) = ctx
            .deps
            .webhook_logs
            .append(
                ctx.tenant_id,
                ctx.execution_id,
                ctx.step_id,
                url,
                method,
                headers.clone(),
                request_body,
                status_code,
                response_body,
                duration_ms,
                error,
            )
            .await
        {
            warn!("Failed to persist webhook log for {}: {}", url, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_requires_url() {
        let executor = WebhookExecutor;
        assert!(!executor.validate(&json!({})).valid);
    }

    #[test]
    fn test_validate_checks_token_free_urls() {
        let executor = WebhookExecutor;
        assert!(
            executor
                .validate(&json!({"url": "https://hooks.example/pets"}))
                .valid
        );
        assert!(!executor.validate(&json!({"url": "not a url"})).valid);
    }

    #[test]
    fn test_validate_tolerates_templated_urls() {
        let executor = WebhookExecutor;
        assert!(
            executor
                .validate(&json!({"url": "https://hooks.example/{{id}}"}))
                .valid
        );
    }

    #[test]
    fn test_validate_rejects_unknown_method() {
        let executor = WebhookExecutor;
        assert!(
            !executor
                .validate(&json!({"url": "https://hooks.example", "method": "TRACE"}))
                .valid
        );
        assert!(
            executor
                .validate(&json!({"url": "https://hooks.example", "method": "post"}))
                .valid
        );
    }
}
