use chrono::{offset::Utc, DateTime};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaRoot {
    pub id: String,
    pub name: String,
    pub root_cert: String,
    #[serde(default)]
    pub intermediate_certs: Vec<String>,
    #[serde(default)]
    pub active: bool,
}

/// The set of trusted CA roots.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedCaRoots {
    pub active_root_id: String,
    pub trust_domain: String,
    pub roots: Vec<CaRoot>,
}

/// A leaf certificate issued to the proxy's destination service.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCert {
    pub serial_number: String,
    pub cert_pem: String,
    pub private_key_pem: String,
    pub service: String,
    pub service_uri: String,
    pub valid_after: DateTime<Utc>,
    pub valid_before: DateTime<Utc>,
}

// === impl IndexedCaRoots ===

impl IndexedCaRoots {
    pub fn active(&self) -> Option<&CaRoot> {
        self.roots.iter().find(|r| r.id == self.active_root_id)
    }
}

// === impl IssuedCert ===

// Keeps the private key out of logs.
impl std::fmt::Debug for IssuedCert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCert")
            .field("serial_number", &self.serial_number)
            .field("service", &self.service)
            .field("service_uri", &self.service_uri)
            .field("valid_after", &self.valid_after)
            .field("valid_before", &self.valid_before)
            .finish_non_exhaustive()
    }
}
