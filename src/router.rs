// src/router.rs
// Completion routing: pick the provider for a model id and credential,
// resolve provider-specific aliasing, and enforce the free-tier policy
// before any network call happens.

use std::sync::Arc;

use crate::catalog::ModelCatalog;
use crate::error::RouteError;
use crate::provider::{Llm7Client, OpenRouterClient, Provider};

/// A bearer key together with where it came from. The origin decides
/// which models the request may touch.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Brought by the caller; any model goes to the primary provider.
    UserSupplied(String),
    /// Operator fallback held by the system provider; free-tier only.
    SystemDefault,
}

/// A routed completion target: the client to call and the model name that
/// client expects.
pub struct Resolution {
    pub provider: Arc<dyn Provider>,
    pub provider_model: String,
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolution")
            .field("provider", &self.provider.name())
            .field("provider_model", &self.provider_model)
            .finish()
    }
}

/// Settings used to mint a primary-provider client per caller credential.
#[derive(Debug, Clone)]
pub struct PrimarySettings {
    pub base_url: String,
    pub referer: Option<String>,
    pub app_title: String,
}

pub struct CompletionRouter {
    catalog: ModelCatalog,
    primary: PrimarySettings,
    system_provider: Option<Arc<Llm7Client>>,
}

impl CompletionRouter {
    pub fn new(
        catalog: ModelCatalog,
        primary: PrimarySettings,
        system_provider: Option<Arc<Llm7Client>>,
    ) -> Self {
        Self {
            catalog,
            primary,
            system_provider,
        }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn has_system_provider(&self) -> bool {
        self.system_provider.is_some()
    }

    /// Mint a primary-provider client for an arbitrary key. Used for
    /// routing user-supplied credentials and for key validation.
    pub fn primary_client(&self, api_key: &str) -> OpenRouterClient {
        OpenRouterClient::new(
            api_key.to_string(),
            self.primary.base_url.clone(),
            self.primary.referer.clone(),
            self.primary.app_title.clone(),
        )
    }

    /// Pick the provider and provider-side model name for one request.
    pub fn resolve(
        &self,
        model_id: &str,
        credential: Option<&Credential>,
    ) -> Result<Resolution, RouteError> {
        if model_id.trim().is_empty() {
            return Err(RouteError::ModelRequired);
        }

        match credential {
            None => Err(RouteError::CredentialRequired),
            Some(Credential::UserSupplied(key)) => Ok(Resolution {
                provider: Arc::new(self.primary_client(key)),
                provider_model: model_id.to_string(),
            }),
            Some(Credential::SystemDefault) => {
                if !self.catalog.is_served_without_credential(model_id) {
                    return Err(RouteError::UnsupportedModel {
                        model: model_id.to_string(),
                    });
                }
                let Some(provider) = self.system_provider.clone() else {
                    return Err(RouteError::CredentialRequired);
                };
                Ok(Resolution {
                    provider,
                    provider_model: self.catalog.resolve_system_alias(model_id).to_string(),
                })
            }
        }
    }

    /// Consensus-mode upfront check: with the system credential, every
    /// requested model must be free-tier. Reports all offenders at once.
    pub fn ensure_models_allowed(
        &self,
        models: &[String],
        credential: Option<&Credential>,
    ) -> Result<(), RouteError> {
        match credential {
            None => Err(RouteError::CredentialRequired),
            Some(Credential::UserSupplied(_)) => Ok(()),
            Some(Credential::SystemDefault) => {
                let unsupported: Vec<String> = models
                    .iter()
                    .filter(|m| !self.catalog.is_served_without_credential(m))
                    .cloned()
                    .collect();

                if unsupported.is_empty() {
                    Ok(())
                } else {
                    Err(RouteError::UnsupportedModels {
                        models: unsupported,
                    })
                }
            }
        }
    }

    /// Single-model variant of the upfront check, with the singular
    /// error wording.
    pub fn ensure_model_allowed(
        &self,
        model: &str,
        credential: Option<&Credential>,
    ) -> Result<(), RouteError> {
        match credential {
            None => Err(RouteError::CredentialRequired),
            Some(Credential::UserSupplied(_)) => Ok(()),
            Some(Credential::SystemDefault) => {
                if self.catalog.is_served_without_credential(model) {
                    Ok(())
                } else {
                    Err(RouteError::UnsupportedModel {
                        model: model.to_string(),
                    })
                }
            }
        }
    }
}
