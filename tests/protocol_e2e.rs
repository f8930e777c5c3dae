use std::sync::Arc;

use eidcore::config::{CoreConfig, SessionConfig};
use eidcore::definitions::{EidAttribute, ProviderRegistry};
use eidcore::protocol::request::EidRequestInput;
use eidcore::protocol::response::ResultMinor;
use eidcore::protocol::EidService;

mod common;
use common::{provisioned_store, service, RecordingBackend, ENTITY_ID, REF_ID};

fn request() -> EidRequestInput {
    EidRequestInput {
        required_fields: vec![EidAttribute::GivenNames, EidAttribute::FamilyNames],
        ..Default::default()
    }
}

#[test]
fn full_authentication_round_trip() -> anyhow::Result<()> {
    let backend = Arc::new(RecordingBackend::accepting());
    let service = service(provisioned_store(), Arc::clone(&backend));

    let opened = service.use_id(&request(), Some(ENTITY_ID));
    assert!(opened.major.is_ok(), "useID failed: {:?}", opened.message);
    assert_eq!(opened.session_id, opened.request_id);
    // PSK is 32 random bytes, hex encoded
    assert_eq!(opened.psk.as_ref().unwrap().len(), 64);
    assert_eq!(
        opened.paos_receiver_url.as_deref(),
        Some("https://sp.example.org/paos")
    );

    let started = backend.started.lock().unwrap();
    assert_eq!(started.len(), 1);
    assert!(started[0]
        .refresh_url
        .contains(&format!("/gov_autent/async?refID={}", opened.request_id)));
    assert_eq!(
        started[0].required_fields,
        vec![EidAttribute::GivenNames, EidAttribute::FamilyNames]
    );
    drop(started);

    // nothing to collect yet
    let polled = service.get_result(&opened.request_id, 1);
    assert_eq!(polled.minor, Some(ResultMinor::NoResultYet));

    service.complete_session(&opened.request_id, common::authentication_result())?;

    let collected = service.get_result(&opened.request_id, 2);
    assert!(collected.major.is_ok());
    let result = collected.result.unwrap();
    assert_eq!(result.personal_data["GivenNames"], "ERIKA");

    // the result can be collected exactly once
    let again = service.get_result(&opened.request_id, 3);
    assert_eq!(again.minor, Some(ResultMinor::InvalidSession));
    Ok(())
}

#[test]
fn concurrent_polls_collect_the_result_once() {
    use std::sync::Barrier;
    use std::thread;

    let service = Arc::new(service(
        provisioned_store(),
        Arc::new(RecordingBackend::accepting()),
    ));
    let opened = service.use_id(&request(), Some(ENTITY_ID));
    assert!(opened.major.is_ok());
    assert_eq!(
        service.get_result(&opened.request_id, 1).minor,
        Some(ResultMinor::NoResultYet)
    );
    service
        .complete_session(&opened.request_id, common::authentication_result())
        .unwrap();

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            let request_id = opened.request_id.clone();
            thread::spawn(move || {
                barrier.wait();
                service.get_result(&request_id, 2)
            })
        })
        .collect();
    let responses: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let collected = responses.iter().filter(|r| r.result.is_some()).count();
    assert_eq!(collected, 1);
    for loser in responses.iter().filter(|r| r.result.is_none()) {
        assert_eq!(loser.minor, Some(ResultMinor::InvalidSession));
    }
    assert_eq!(service.open_sessions(), 0);
}

#[test]
fn first_poll_may_carry_any_counter() {
    let service = service(provisioned_store(), Arc::new(RecordingBackend::accepting()));
    let opened = service.use_id(&request(), Some(ENTITY_ID));
    assert!(opened.major.is_ok());

    assert_eq!(
        service.get_result(&opened.request_id, 5).minor,
        Some(ResultMinor::NoResultYet)
    );
    assert_eq!(
        service.get_result(&opened.request_id, 6).minor,
        Some(ResultMinor::NoResultYet)
    );

    service
        .complete_session(&opened.request_id, common::authentication_result())
        .unwrap();
    assert!(service.get_result(&opened.request_id, 7).major.is_ok());
}

#[test]
fn wrong_counter_burns_the_session() {
    let service = service(provisioned_store(), Arc::new(RecordingBackend::accepting()));
    let opened = service.use_id(&request(), Some(ENTITY_ID));
    assert!(opened.major.is_ok());

    assert_eq!(
        service.get_result(&opened.request_id, 1).minor,
        Some(ResultMinor::NoResultYet)
    );
    // replaying the same counter is a violation
    let burned = service.get_result(&opened.request_id, 1);
    assert_eq!(burned.minor, Some(ResultMinor::InvalidCounter));
    // the session is gone, even with the counter that would have been right
    assert_eq!(
        service.get_result(&opened.request_id, 2).minor,
        Some(ResultMinor::InvalidSession)
    );
    assert_eq!(service.open_sessions(), 0);
}

#[test]
fn unauthorized_attribute_is_refused_up_front() {
    let backend = Arc::new(RecordingBackend::accepting());
    let service = service(provisioned_store(), Arc::clone(&backend));

    // the provisioned CHAT does not cover the residence permit
    let refused = service.use_id(
        &EidRequestInput {
            required_fields: vec![EidAttribute::ResidencePermitI],
            ..Default::default()
        },
        Some(ENTITY_ID),
    );
    assert_eq!(refused.minor, Some(ResultMinor::MissingTerminalRights));
    assert_eq!(backend.started_count(), 0);
    assert_eq!(service.open_sessions(), 0);
}

#[test]
fn age_verification_without_age_is_a_missing_argument() {
    let service = service(provisioned_store(), Arc::new(RecordingBackend::accepting()));
    let refused = service.use_id(
        &EidRequestInput {
            required_fields: vec![EidAttribute::AgeVerification],
            ..Default::default()
        },
        Some(ENTITY_ID),
    );
    assert_eq!(refused.minor, Some(ResultMinor::MissingArgument));
}

#[test]
fn backend_refusal_surfaces_as_internal_error_without_detail() {
    let service = service(provisioned_store(), Arc::new(RecordingBackend::refusing()));
    let failed = service.use_id(&request(), Some(ENTITY_ID));
    assert_eq!(failed.minor, Some(ResultMinor::InternalError));
    // the backend's cause stays in the log
    assert_eq!(failed.message.as_deref(), Some("internal error"));
    assert_eq!(service.open_sessions(), 0);
}

#[test]
fn unprovisioned_terminal_is_an_internal_error() {
    use eidcore::pki::store::TerminalStore;
    let store = Arc::new(eidcore::pki::store::MemoryTerminalStore::new());
    store.create(REF_ID).unwrap();
    let service = service(store, Arc::new(RecordingBackend::accepting()));

    let failed = service.use_id(&request(), Some(ENTITY_ID));
    assert_eq!(failed.minor, Some(ResultMinor::InternalError));
    assert_eq!(failed.message.as_deref(), Some("internal error"));
}

#[test]
fn session_capacity_is_enforced() {
    let config = CoreConfig {
        session: SessionConfig {
            max_sessions: 2,
            ..Default::default()
        },
        ..Default::default()
    };
    let service = EidService::new(
        config,
        ProviderRegistry::new([common::provider()]),
        provisioned_store(),
        Arc::new(RecordingBackend::accepting()),
    );

    assert!(service.use_id(&request(), Some(ENTITY_ID)).major.is_ok());
    assert!(service.use_id(&request(), Some(ENTITY_ID)).major.is_ok());
    let rejected = service.use_id(&request(), Some(ENTITY_ID));
    assert_eq!(rejected.minor, Some(ResultMinor::TooManyOpenSessions));
}

#[test]
fn unknown_request_id_is_an_invalid_session() {
    let service = service(provisioned_store(), Arc::new(RecordingBackend::accepting()));
    let polled = service.get_result("never-opened-here", 1);
    assert_eq!(polled.minor, Some(ResultMinor::InvalidSession));
    assert_eq!(polled.log_prefix, "<unknown>: never-opened-here: ");
}
