use std::net::SocketAddr;

use env_helpers::{get_env, get_env_default};
use secrecy::SecretString;
use url::Url;

use crate::application::use_cases::checkout_session::CheckoutSettings;

pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Public origin of the web app; checkout redirects are built from it.
    pub app_origin: Url,
    pub stripe_secret_key: SecretString,
    pub stripe_webhook_secret: SecretString,
    /// Portal configuration to prefer over discovery/creation.
    pub stripe_portal_configuration_id: Option<String>,
    /// Tenant domain, e.g. "acme.eu.auth0.com".
    pub auth0_domain: String,
    pub auth0_client_id: String,
    pub auth0_client_secret: SecretString,
    /// Bearer token the embedding backend presents on `/api/users` routes.
    pub internal_api_key: SecretString,
    /// Trial length for new checkouts. 0 disables the trial.
    pub checkout_trial_days: i32,
    pub checkout_success_path: String,
    pub checkout_error_path: String,
    pub checkout_cancel_path: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let bind_addr: SocketAddr =
            get_env_default("BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3001)));
        let app_origin: Url = get_env("APP_ORIGIN");

        let stripe_secret_key = SecretString::from(get_env::<String>("STRIPE_SECRET_KEY"));
        let stripe_webhook_secret = SecretString::from(get_env::<String>("STRIPE_WEBHOOK_SECRET"));
        let stripe_portal_configuration_id = std::env::var("STRIPE_PORTAL_CONFIGURATION_ID")
            .ok()
            .filter(|id| !id.trim().is_empty());

        let auth0_domain: String = get_env("AUTH0_DOMAIN");
        let auth0_client_id: String = get_env("AUTH0_CLIENT_ID");
        let auth0_client_secret = SecretString::from(get_env::<String>("AUTH0_CLIENT_SECRET"));

        let internal_api_key = SecretString::from(get_env::<String>("INTERNAL_API_KEY"));

        let checkout_trial_days: i32 = get_env_default("CHECKOUT_TRIAL_DAYS", 14);
        let checkout_success_path: String =
            get_env_default("CHECKOUT_SUCCESS_PATH", "/dashboard".to_string());
        let checkout_error_path: String =
            get_env_default("CHECKOUT_ERROR_PATH", "/error".to_string());
        let checkout_cancel_path: String =
            get_env_default("CHECKOUT_CANCEL_PATH", "/pricing".to_string());

        Self {
            bind_addr,
            app_origin,
            stripe_secret_key,
            stripe_webhook_secret,
            stripe_portal_configuration_id,
            auth0_domain,
            auth0_client_id,
            auth0_client_secret,
            internal_api_key,
            checkout_trial_days,
            checkout_success_path,
            checkout_error_path,
            checkout_cancel_path,
        }
    }

    fn origin(&self) -> &str {
        self.app_origin.as_str().trim_end_matches('/')
    }

    pub fn success_redirect(&self) -> String {
        format!("{}{}", self.origin(), self.checkout_success_path)
    }

    pub fn error_redirect(&self) -> String {
        format!("{}{}", self.origin(), self.checkout_error_path)
    }

    pub fn checkout_settings(&self) -> CheckoutSettings {
        CheckoutSettings {
            app_origin: self.origin().to_string(),
            cancel_path: self.checkout_cancel_path.clone(),
            trial_days: Some(self.checkout_trial_days),
        }
    }
}
