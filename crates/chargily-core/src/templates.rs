//! Built-in application templates and the first-run seed registry.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::config::SeedCredentials;
use crate::mode::Mode;
use crate::model::{Application, SafetyLimits, Settings, WebhookSettings};
use crate::registry::Registry;

/// Id of the application created on first run.
pub const SEED_APPLICATION_ID: &str = "main";

/// A named preset for [`Settings`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub settings: Settings,
}

impl Template {
    /// Metadata recorded on applications created from this template.
    #[must_use]
    pub fn metadata(&self) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("description".to_owned(), Value::from(self.description));
        metadata.insert("template".to_owned(), Value::from(self.id));
        metadata.insert("tags".to_owned(), json!(["template", self.id]));
        metadata
    }
}

/// All built-in templates, in display order.
#[must_use]
pub fn builtin_templates() -> Vec<Template> {
    vec![
        Template {
            id: "basic",
            name: "Basic Application",
            description: "Simple application template with standard settings",
            settings: Settings::default(),
        },
        Template {
            id: "ecommerce",
            name: "E-commerce Template",
            description: "Template optimized for online stores",
            settings: Settings {
                auto_expire_minutes: 60,
                require_confirmation: false,
                safety_limits: SafetyLimits {
                    max_single_payment: 50_000,
                    max_daily_payments: 200,
                    max_daily_volume: 2_000_000,
                },
                ..Settings::default()
            },
        },
        Template {
            id: "subscription",
            name: "Subscription Template",
            description: "Template for subscription-based services",
            settings: Settings {
                auto_expire_minutes: 120,
                require_confirmation: false,
                safety_limits: SafetyLimits {
                    max_single_payment: 20_000,
                    max_daily_payments: 50,
                    max_daily_volume: 500_000,
                },
                ..Settings::default()
            },
        },
        Template {
            id: "enterprise",
            name: "Enterprise Template",
            description: "Template for large-scale enterprise applications",
            settings: Settings {
                auto_expire_minutes: 45,
                safety_limits: SafetyLimits {
                    max_single_payment: 500_000,
                    max_daily_payments: 1_000,
                    max_daily_volume: 10_000_000,
                },
                webhook_settings: Some(WebhookSettings {
                    max_retries: 5,
                    ..WebhookSettings::default()
                }),
                ..Settings::default()
            },
        },
    ]
}

/// Look up a built-in template by id.
#[must_use]
pub fn find_template(id: &str) -> Option<Template> {
    builtin_templates().into_iter().find(|t| t.id == id)
}

/// The registry written when no store exists yet: one `main` application.
#[must_use]
pub fn seed_registry(seed: &SeedCredentials, now: DateTime<Utc>) -> Registry {
    let mut metadata = Map::new();
    metadata.insert(
        "description".to_owned(),
        Value::from("Default application for main business operations"),
    );
    metadata.insert("tags".to_owned(), json!(["main", "primary"]));

    let app = Application {
        name: "Main Business".to_owned(),
        test: seed.test.clone().into_profile(),
        live: seed.live.clone().into_profile(),
        current_mode: Mode::Test,
        settings: Settings {
            webhook_settings: Some(WebhookSettings::default()),
            ..Settings::default()
        },
        created_at: now,
        last_used: Some(now),
        metadata,
    };

    let mut registry = Registry::new();
    registry.insert(SEED_APPLICATION_ID, app);
    registry
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::ProfileInput;

    #[test]
    fn builtin_ids_in_order() {
        let ids: Vec<_> = builtin_templates().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["basic", "ecommerce", "subscription", "enterprise"]);
    }

    #[test]
    fn basic_template_gets_default_limits() {
        let basic = find_template("basic").unwrap();
        assert_eq!(basic.settings.safety_limits, SafetyLimits::default());
        assert!(basic.settings.webhook_settings.is_none());
    }

    #[test]
    fn enterprise_template_retries_more() {
        let enterprise = find_template("enterprise").unwrap();
        assert_eq!(enterprise.settings.webhook_settings.unwrap().max_retries, 5);
        assert_eq!(enterprise.settings.safety_limits.max_single_payment, 500_000);
        assert!(enterprise.settings.require_confirmation);
    }

    #[test]
    fn unknown_template_is_none() {
        assert!(find_template("premium").is_none());
    }

    #[test]
    fn template_metadata_records_id() {
        let metadata = find_template("ecommerce").unwrap().metadata();
        assert_eq!(metadata["template"], "ecommerce");
        assert_eq!(metadata["tags"], json!(["template", "ecommerce"]));
        assert_eq!(metadata["description"], "Template optimized for online stores");
    }

    #[test]
    fn seed_without_credentials_has_no_keys() {
        let now = Utc::now();
        let registry = seed_registry(&SeedCredentials::default(), now);
        let main = registry.get(SEED_APPLICATION_ID).unwrap();
        assert_eq!(main.name, "Main Business");
        assert!(main.test.api_key.is_none());
        assert!(main.live.api_key.is_none());
        assert_eq!(main.current_mode, Mode::Test);
        assert_eq!(main.created_at, now);
        assert_eq!(main.metadata["tags"], json!(["main", "primary"]));
    }

    #[test]
    fn seed_uses_supplied_credentials() {
        let seed = SeedCredentials {
            test: ProfileInput::with_api_key("test_sk_seed"),
            live: ProfileInput::default(),
        };
        let registry = seed_registry(&seed, Utc::now());
        let main = registry.get(SEED_APPLICATION_ID).unwrap();
        assert_eq!(main.test.api_key.as_deref(), Some("test_sk_seed"));
        assert!(main.live.api_key.is_none());
    }
}
