use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Connector settings a relying party is provisioned with. Read-only to the
/// core; edited through the administration layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpaConnectorConfiguration {
    /// Key of the terminal permission record backing this provider.
    pub cvc_ref_id: String,
    /// Where the eCard-API PAOS messages for this provider are received.
    pub paos_receiver_url: String,
    /// ISO 3166-1 alpha-2 country code used in certificate requests.
    pub country_code: String,
    /// Certificate holder mnemonic used in certificate requests.
    pub chr_mnemonic: String,
}

/// A relying party, identified by the entity id taken from its client
/// certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceProvider {
    pub entity_id: String,
    pub connector: EpaConnectorConfiguration,
}

/// All configured relying parties, keyed by entity id. Built once at process
/// start from configuration and passed by reference to whoever needs it.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, ServiceProvider>,
}

impl ProviderRegistry {
    pub fn new(providers: impl IntoIterator<Item = ServiceProvider>) -> Self {
        ProviderRegistry {
            providers: providers
                .into_iter()
                .map(|p| (p.entity_id.clone(), p))
                .collect(),
        }
    }

    pub fn get(&self, entity_id: &str) -> Option<&ServiceProvider> {
        self.providers.get(entity_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceProvider> {
        self.providers.values()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
