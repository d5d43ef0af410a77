use dust_common::error::DustResult;
use dust_config::{AppConfig, RetryPolicy};
use dust_data_sources::DataSourceClientConfig;
use dust_post_upsert_hooks::WebhookHookConfig;

use crate::nango::NangoClientConfig;
use crate::notion::client::NotionClientConfig;

/// Everything the sync and hook workflows need, resolved once at startup.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub nango: NangoClientConfig,
    pub notion: NotionClientConfig,
    pub data_sources: DataSourceClientConfig,
    /// `None` when no webhook is configured.
    pub webhook: Option<WebhookHookConfig>,
    pub retry: RetryPolicy,
}

impl SyncConfig {
    pub fn from_env(app: &AppConfig) -> DustResult<Self> {
        Ok(Self {
            nango: NangoClientConfig::from_env()?,
            notion: NotionClientConfig::from_env()?,
            data_sources: DataSourceClientConfig::from_env()?,
            webhook: WebhookHookConfig::from_env()?,
            retry: app.retry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const VARS: [&str; 9] = [
        "NANGO_BASE_URL",
        "NANGO_SECRET_KEY",
        "NANGO_NOTION_CONNECTOR_ID",
        "NOTION_BASE_URL",
        "NOTION_VERSION",
        "NOTION_PAGE_SIZE",
        "DUST_FRONT_API",
        "POST_UPSERT_WEBHOOK_URL",
        "POST_UPSERT_WEBHOOK_DATA_SOURCES",
    ];

    fn app() -> AppConfig {
        AppConfig {
            database_url: "postgres://localhost/dust_test".to_string(),
            log_level: "info".to_string(),
            sync_interval_secs: 300,
            max_concurrent_workflows: 8,
            retry: RetryPolicy::default(),
        }
    }

    fn set_required() {
        for key in VARS {
            env::remove_var(key);
        }
        env::set_var("NANGO_SECRET_KEY", "nango-secret");
        env::set_var("NANGO_NOTION_CONNECTOR_ID", "notion-prod");
        env::set_var("DUST_FRONT_API", "http://front:3000");
    }

    #[test]
    fn defaults_apply_when_only_required_vars_are_set() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");
        set_required();

        let cfg = SyncConfig::from_env(&app()).expect("should parse");
        assert_eq!(cfg.nango.base_url, "https://api.nango.dev");
        assert_eq!(cfg.nango.notion_connector_id, "notion-prod");
        assert_eq!(cfg.notion.base_url, "https://api.notion.com");
        assert_eq!(cfg.notion.notion_version, "2022-06-28");
        assert_eq!(cfg.notion.page_size, 100);
        assert_eq!(cfg.data_sources.base_url, "http://front:3000");
        assert!(cfg.webhook.is_none());
        assert_eq!(cfg.retry, RetryPolicy::default());
    }

    #[test]
    fn missing_connector_id_is_a_config_error() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");
        set_required();
        env::remove_var("NANGO_NOTION_CONNECTOR_ID");

        assert!(SyncConfig::from_env(&app()).is_err());
    }

    #[test]
    fn webhook_filter_is_parsed_from_csv() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");
        set_required();
        env::set_var("POST_UPSERT_WEBHOOK_URL", "http://hooks/upsert");
        env::set_var("POST_UPSERT_WEBHOOK_DATA_SOURCES", "ds1, ds2,");

        let cfg = SyncConfig::from_env(&app()).expect("should parse");
        let webhook = cfg.webhook.expect("webhook configured");
        assert_eq!(webhook.url, "http://hooks/upsert");
        assert_eq!(
            webhook.data_sources,
            Some(vec!["ds1".to_string(), "ds2".to_string()])
        );

        env::remove_var("POST_UPSERT_WEBHOOK_URL");
        env::remove_var("POST_UPSERT_WEBHOOK_DATA_SOURCES");
    }

    #[test]
    fn malformed_page_size_is_rejected() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");
        set_required();
        env::set_var("NOTION_PAGE_SIZE", "lots");

        assert!(SyncConfig::from_env(&app()).is_err());
        env::remove_var("NOTION_PAGE_SIZE");
    }
}
