//! API shared state

use std::sync::Arc;

use crate::api::middleware::admission::AdmissionFilter;
use crate::service::MetricService;
use crate::storage::MetricStore;
use crate::transport::{Decryptor, Signer};

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Validation and aggregation in front of the store
    pub service: MetricService,

    /// Verifies request hashes and signs responses when a key is configured
    pub signer: Option<Signer>,

    /// Decrypts request bodies when a private key is configured
    pub decryptor: Option<Arc<Decryptor>>,

    /// Trusted subnet check
    pub admission: AdmissionFilter,
}

impl ApiState {
    /// State with no key, no decryption and no subnet restriction
    pub fn new(store: Arc<dyn MetricStore>) -> Self {
        Self {
            service: MetricService::new(store),
            signer: None,
            decryptor: None,
            admission: AdmissionFilter::default(),
        }
    }

    pub fn with_signer(mut self, signer: Signer) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_decryptor(mut self, decryptor: Decryptor) -> Self {
        self.decryptor = Some(Arc::new(decryptor));
        self
    }

    pub fn with_admission(mut self, admission: AdmissionFilter) -> Self {
        self.admission = admission;
        self
    }
}
