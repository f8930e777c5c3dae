#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use eidcore::backend::{self, EcardBackend};
use eidcore::config::CoreConfig;
use eidcore::definitions::{
    Chat, ChatRight, EpaConnectorConfiguration, ProviderRegistry, ServiceProvider, SessionInput,
    TerminalData,
};
use eidcore::pki::ca_client::{BlacklistDelta, CaClient, CvcIssuance, FullBlacklist};
use eidcore::pki::store::{MemoryTerminalStore, TerminalStore};
use eidcore::protocol::response::{EidResult, ResultMajor};
use eidcore::protocol::EidService;
use time::{Duration, OffsetDateTime};

pub const ENTITY_ID: &str = "https://sp.example.org";
pub const REF_ID: &str = "terminal-1";

/// Backend double that records every session it is asked to start and can
/// be switched to refuse them.
pub struct RecordingBackend {
    pub accept: bool,
    pub started: Mutex<Vec<StartedSession>>,
}

pub struct StartedSession {
    pub session_id: String,
    pub refresh_url: String,
    pub required_fields: Vec<eidcore::definitions::EidAttribute>,
}

impl RecordingBackend {
    pub fn accepting() -> Self {
        RecordingBackend {
            accept: true,
            started: Mutex::new(Vec::new()),
        }
    }

    pub fn refusing() -> Self {
        RecordingBackend {
            accept: false,
            started: Mutex::new(Vec::new()),
        }
    }

    pub fn started_count(&self) -> usize {
        self.started.lock().unwrap().len()
    }
}

impl EcardBackend for RecordingBackend {
    fn start_session(&self, input: &SessionInput) -> Result<(), backend::Error> {
        if !self.accept {
            return Err(backend::Error("eCard stack refused the session".to_string()));
        }
        self.started.lock().unwrap().push(StartedSession {
            session_id: input.session_id().to_string(),
            refresh_url: input.refresh_url().to_string(),
            required_fields: input.required_fields().iter().copied().collect(),
        });
        Ok(())
    }
}

/// CA double answering certificate requests synchronously and counting them.
pub struct CountingCa {
    pub requests: Mutex<Vec<Vec<u8>>>,
}

impl CountingCa {
    pub fn new() -> Self {
        CountingCa {
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl CaClient for CountingCa {
    fn send_certificate_request(
        &self,
        request: &[u8],
    ) -> Result<Option<CvcIssuance>, eidcore::pki::ca_client::Error> {
        self.requests.lock().unwrap().push(request.to_vec());
        let holder = String::from_utf8_lossy(&request[..14]).to_string();
        Ok(Some(CvcIssuance {
            cvc: terminal_cvc(&holder, Duration::days(90)),
            chain: vec![vec![0xCA]],
        }))
    }

    fn fetch_blacklist_full(
        &self,
        _sector_id: Option<&[u8]>,
    ) -> Result<FullBlacklist, eidcore::pki::ca_client::Error> {
        Ok(FullBlacklist {
            sector_id: vec![0xAA],
            version: 1,
            entries: vec![],
        })
    }

    fn fetch_blacklist_delta(
        &self,
        _sector_id: &[u8],
        version: u64,
    ) -> Result<BlacklistDelta, eidcore::pki::ca_client::Error> {
        Ok(BlacklistDelta {
            version: version + 1,
            added: vec![],
            removed: vec![],
        })
    }

    fn fetch_master_defect_lists(
        &self,
    ) -> Result<(Vec<u8>, Vec<u8>), eidcore::pki::ca_client::Error> {
        Ok((vec![0x30, 0x01], vec![0x30, 0x02]))
    }
}

pub fn provider() -> ServiceProvider {
    ServiceProvider {
        entity_id: ENTITY_ID.to_string(),
        connector: EpaConnectorConfiguration {
            cvc_ref_id: REF_ID.to_string(),
            paos_receiver_url: "https://sp.example.org/paos".to_string(),
            country_code: "DE".to_string(),
            chr_mnemonic: "TESTeID".to_string(),
        },
    }
}

pub fn terminal_cvc(holder: &str, validity: Duration) -> TerminalData {
    TerminalData {
        raw: holder.as_bytes().to_vec(),
        holder_reference: holder.to_string(),
        chat: Chat::from_rights(&[
            ChatRight::ReadGivenNames,
            ChatRight::ReadFamilyNames,
            ChatRight::ReadDateOfBirth,
            ChatRight::AuthenticateAgeVerification,
        ]),
        not_before: OffsetDateTime::now_utc() - Duration::days(1),
        not_after: OffsetDateTime::now_utc() + validity,
    }
}

/// A terminal store provisioned with everything a session needs: CVC,
/// chain, master list, defect list and an empty blacklist.
pub fn provisioned_store() -> Arc<MemoryTerminalStore> {
    let store = Arc::new(MemoryTerminalStore::new());
    store.create(REF_ID).unwrap();
    store
        .store_cvc(REF_ID, terminal_cvc("DETESTeID00001", Duration::days(90)), vec![vec![0x7f]])
        .unwrap();
    store
        .store_master_defect_lists(REF_ID, vec![0x30, 0x01, 0x00], vec![0x30, 0x02, 0x00])
        .unwrap();
    store
        .store_blacklist(REF_ID, vec![0xAA], vec![], 1)
        .unwrap();
    store
}

pub fn service(store: Arc<MemoryTerminalStore>, backend: Arc<RecordingBackend>) -> EidService {
    EidService::new(
        CoreConfig::default(),
        ProviderRegistry::new([provider()]),
        store,
        backend,
    )
}

pub fn authentication_result() -> EidResult {
    EidResult {
        status: ResultMajor::Ok,
        status_detail: None,
        personal_data: serde_json::json!({
            "GivenNames": "ERIKA",
            "FamilyNames": "MUSTERMANN",
        }),
        info: BTreeMap::new(),
    }
}
