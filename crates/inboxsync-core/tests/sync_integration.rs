//! Integration tests for the sync orchestrator and per-inbox pipeline
//!
//! The remote and crypto ports are scripted so each test controls exactly
//! what the service returns, how long it takes and what fails.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{body, envelope, fixture, RemoteCall};
use inboxsync_core::{
    Inbox, LocalCrypto, MemoryRemote, MessagePayload, MessageType, OfferId, Storage, SyncConfig,
    SyncEvent, SyncOrchestrator, SyncStage,
};
use tokio::sync::broadcast;

fn drain(events: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn finished_count(events: &[SyncEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, SyncEvent::SyncFinished(_)))
        .count()
}

// ============================================================================
// Pipeline Scenarios
// ============================================================================

#[tokio::test]
async fn test_empty_pull_scenario() {
    let f = fixture();
    let inbox = Inbox::for_offer(OfferId::new());
    f.storage.save_inbox(&inbox).unwrap();
    let mut events = f.orchestrator.subscribe();

    assert!(f.orchestrator.request_sync().await);

    assert_eq!(*f.crypto.signed.lock(), vec!["abc".to_string()]);
    assert_eq!(
        f.remote.calls(),
        vec![
            RemoteCall::Challenge(inbox.public_key.clone()),
            RemoteCall::Pull {
                public_key: inbox.public_key.clone(),
                signature: "sig1".to_string(),
            },
        ]
    );
    assert!(f.storage.list_messages(&inbox.public_key).unwrap().is_empty());

    let events = drain(&mut events);
    assert_eq!(finished_count(&events), 1);
    assert!(matches!(events.last(), Some(SyncEvent::SyncFinished(_))));
}

#[tokio::test]
async fn test_delete_chat_scenario() {
    let f = fixture();
    let inbox = Inbox::for_offer(OfferId::new());
    f.storage.save_inbox(&inbox).unwrap();

    let earlier = MessagePayload::outgoing(
        &inbox.public_key,
        "contact",
        MessageType::Message,
        Some("earlier".to_string()),
    );
    f.storage
        .upsert_messages(&inbox.public_key, &[earlier])
        .unwrap();

    f.crypto.learn("c-m1", &body("m1", 10));
    f.crypto.learn("c-d1", &body("d1", 11));
    f.remote
        .queue(&inbox.public_key, envelope("c-m1", "MESSAGE"));
    f.remote
        .queue(&inbox.public_key, envelope("c-d1", "DELETE_CHAT"));

    let mut events = f.orchestrator.subscribe();
    let report = f.orchestrator.sync_all().await;

    assert_eq!(report.synced, 1);
    assert!(f.storage.list_messages(&inbox.public_key).unwrap().is_empty());
    assert_eq!(f.remote.delete_count(), 1);

    let events = drain(&mut events);
    assert!(events.contains(&SyncEvent::ChatDeleted {
        public_key: inbox.public_key.clone()
    }));
    assert!(matches!(events.last(), Some(SyncEvent::SyncFinished(_))));
}

#[tokio::test]
async fn test_rejected_request_ends_chat() {
    let f = fixture();
    let inbox = Inbox::for_offer(OfferId::new());
    f.storage.save_inbox(&inbox).unwrap();

    let request = MessagePayload::outgoing(
        &inbox.public_key,
        "contact",
        MessageType::MessagingRequest,
        Some("hi".to_string()),
    );
    f.storage
        .upsert_messages(&inbox.public_key, &[request])
        .unwrap();

    f.crypto.learn("c-no", &body("no", 20));
    f.remote
        .queue(&inbox.public_key, envelope("c-no", "DISAPPROVE_MESSAGING"));

    let mut events = f.orchestrator.subscribe();
    let synced = f.orchestrator.sync_one(&inbox.public_key).await.unwrap();

    assert!(synced.did_delete_chat());
    assert!(f.storage.list_messages(&inbox.public_key).unwrap().is_empty());
    assert_eq!(
        events.try_recv().unwrap(),
        SyncEvent::ChatDeleted {
            public_key: inbox.public_key.clone()
        }
    );
}

#[tokio::test]
async fn test_partial_batch_keeps_decodable_payloads() {
    let f = fixture();
    let inbox = Inbox::for_offer(OfferId::new());
    f.storage.save_inbox(&inbox).unwrap();

    f.crypto.learn("c-1", &body("m1", 1));
    f.crypto.learn("c-3", &body("m3", 3));
    f.crypto.learn("c-4", "not json at all");
    for ciphertext in ["c-1", "c-2", "c-3", "c-4"] {
        f.remote
            .queue(&inbox.public_key, envelope(ciphertext, "MESSAGE"));
    }

    let synced = f.orchestrator.sync_one(&inbox.public_key).await.unwrap();

    let ids: Vec<_> = synced.payloads.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m3"]);
    assert_eq!(f.storage.list_messages(&inbox.public_key).unwrap().len(), 2);
    assert_eq!(f.remote.delete_count(), 1);
}

#[tokio::test]
async fn test_undecryptable_batch_still_acknowledged() {
    let f = fixture();
    let inbox = Inbox::for_offer(OfferId::new());
    f.storage.save_inbox(&inbox).unwrap();
    f.remote
        .queue(&inbox.public_key, envelope("garbage", "MESSAGE"));

    let synced = f.orchestrator.sync_one(&inbox.public_key).await.unwrap();

    assert!(synced.payloads.is_empty());
    assert_eq!(f.remote.delete_count(), 1);
}

#[tokio::test]
async fn test_missing_key_short_circuits() {
    let f = fixture();
    let mut inbox = Inbox::for_offer(OfferId::new());
    inbox.keys = None;
    f.storage.save_inbox(&inbox).unwrap();
    let mut events = f.orchestrator.subscribe();

    let report = f.orchestrator.sync_all().await;

    assert_eq!(report.failed, 1);
    assert!(f.remote.calls().is_empty());
    assert!(f.crypto.signed.lock().is_empty());

    let events = drain(&mut events);
    assert_eq!(
        events,
        vec![
            SyncEvent::InboxFailed {
                public_key: inbox.public_key.clone(),
                stage: None,
                message: format!("Inbox {} has no key material", inbox.public_key),
            },
            SyncEvent::SyncFinished(report),
        ]
    );
}

#[tokio::test]
async fn test_failed_acknowledgement_is_retried_safely() {
    let f = fixture();
    let inbox = Inbox::for_offer(OfferId::new());
    f.storage.save_inbox(&inbox).unwrap();
    f.crypto.learn("c-1", &body("m1", 1));
    f.remote
        .queue(&inbox.public_key, envelope("c-1", "MESSAGE"));
    f.remote.fail_delete(&inbox.public_key);

    let first = f.orchestrator.sync_one(&inbox.public_key).await.unwrap();
    assert_eq!(first.merge.inserted, 1);

    // The envelope is still queued, so it is pulled again
    let second = f.orchestrator.sync_one(&inbox.public_key).await.unwrap();
    assert_eq!(second.merge.inserted, 0);
    assert_eq!(second.merge.updated, 1);
    assert_eq!(f.storage.list_messages(&inbox.public_key).unwrap().len(), 1);
    assert_eq!(f.orchestrator.failure_count(&inbox.public_key), 0);
}

// ============================================================================
// Orchestration
// ============================================================================

#[tokio::test]
async fn test_single_inbox_failure_does_not_block_others() {
    let f = fixture();
    let failing = Inbox::for_offer(OfferId::new());
    let healthy = Inbox::for_offer(OfferId::new());
    f.storage.save_inbox(&failing).unwrap();
    f.storage.save_inbox(&healthy).unwrap();

    f.remote.fail_pull(&failing.public_key);
    f.crypto.learn("c-1", &body("m1", 1));
    f.remote
        .queue(&healthy.public_key, envelope("c-1", "MESSAGE"));

    let mut events = f.orchestrator.subscribe();
    let report = f.orchestrator.sync_all().await;

    assert_eq!(report.synced, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.merged, 1);
    assert_eq!(f.storage.list_messages(&healthy.public_key).unwrap().len(), 1);
    assert_eq!(f.orchestrator.failure_count(&failing.public_key), 1);

    let failure = drain(&mut events)
        .into_iter()
        .find(|e| matches!(e, SyncEvent::InboxFailed { .. }))
        .unwrap();
    match failure {
        SyncEvent::InboxFailed {
            public_key, stage, ..
        } => {
            assert_eq!(public_key, failing.public_key);
            assert_eq!(stage, Some(SyncStage::Pull));
        }
        _ => unreachable!(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_no_overlap_between_requests() {
    let f = fixture();
    for _ in 0..2 {
        let inbox = Inbox::for_offer(OfferId::new());
        f.remote.delay(&inbox.public_key, Duration::from_millis(100));
        f.storage.save_inbox(&inbox).unwrap();
    }

    let (first, second) = tokio::join!(
        f.orchestrator.request_sync(),
        f.orchestrator.request_sync()
    );

    assert!(first);
    assert!(!second);
    assert_eq!(f.remote.challenge_count(), 2);
    assert!(!f.orchestrator.is_syncing());

    // Guard is released once the pass settles
    assert!(f.orchestrator.request_sync().await);
    assert_eq!(f.remote.challenge_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_guard_held_while_pipelines_in_flight() {
    let f = fixture();
    for _ in 0..2 {
        let inbox = Inbox::for_offer(OfferId::new());
        f.remote.delay(&inbox.public_key, Duration::from_millis(50));
        f.storage.save_inbox(&inbox).unwrap();
    }

    let orchestrator = f.orchestrator.clone();
    let pass = tokio::spawn(async move { orchestrator.request_sync().await });
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert!(f.orchestrator.is_syncing());
    assert_eq!(f.orchestrator.in_flight(), 2);
    assert!(!f.orchestrator.request_sync().await);

    assert!(pass.await.unwrap());
    assert!(!f.orchestrator.is_syncing());
    assert_eq!(f.orchestrator.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_single_inbox_sync_does_not_hold_guard() {
    let f = fixture();
    let slow = Inbox::for_offer(OfferId::new());
    let other = Inbox::for_offer(OfferId::new());
    f.remote.delay(&slow.public_key, Duration::from_secs(60));
    f.storage.save_inbox(&slow).unwrap();
    f.storage.save_inbox(&other).unwrap();

    let orchestrator = f.orchestrator.clone();
    let slow_key = slow.public_key.clone();
    let single = tokio::spawn(async move { orchestrator.sync_one(&slow_key).await });
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(f.orchestrator.in_flight(), 1);

    // Passes run back to back while the single-inbox sync is still pulling
    assert!(f.orchestrator.request_sync().await);
    assert!(!f.orchestrator.is_syncing());
    assert!(f.orchestrator.request_sync().await);
    assert_eq!(f.orchestrator.in_flight(), 1);

    assert!(single.await.unwrap().is_ok());
    assert_eq!(f.orchestrator.in_flight(), 0);
    // slow: one challenge; other: one per pass
    assert_eq!(f.remote.challenge_count(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_guard_outlives_finished_signal() {
    let f = fixture();
    let inbox = Inbox::for_offer(OfferId::new());
    f.storage.save_inbox(&inbox).unwrap();

    let mut events = f.orchestrator.subscribe();
    let pass = {
        let orchestrator = f.orchestrator.clone();
        tokio::spawn(async move { orchestrator.request_sync().await })
    };

    loop {
        if let SyncEvent::SyncFinished(report) = events.recv().await.unwrap() {
            assert_eq!(report.synced, 1);
            break;
        }
    }
    // every pipeline has settled by the time the signal is out
    assert_eq!(f.orchestrator.in_flight(), 0);

    assert!(pass.await.unwrap());
    assert!(!f.orchestrator.is_syncing());
    assert!(f.orchestrator.request_sync().await);
    assert_eq!(f.remote.challenge_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_finished_signal_follows_every_pipeline() {
    let f = fixture();
    let mut keys = Vec::new();
    for delay in [30, 10, 20] {
        let inbox = Inbox::for_offer(OfferId::new());
        f.remote
            .delay(&inbox.public_key, Duration::from_millis(delay));
        f.storage.save_inbox(&inbox).unwrap();
        keys.push(inbox.public_key);
    }

    let mut events = f.orchestrator.subscribe();
    f.orchestrator.request_sync().await;
    let events = drain(&mut events);

    let synced_order: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            SyncEvent::InboxSynced { public_key, .. } => Some(public_key.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        synced_order,
        vec![keys[1].clone(), keys[2].clone(), keys[0].clone()]
    );
    assert_eq!(events.len(), 4);
    assert_eq!(finished_count(&events), 1);
    assert!(matches!(events.last(), Some(SyncEvent::SyncFinished(_))));
}

#[tokio::test(start_paused = true)]
async fn test_sync_all_skips_inbox_already_in_flight() {
    let f = fixture();
    let busy = Inbox::for_offer(OfferId::new());
    let idle = Inbox::for_offer(OfferId::new());
    f.remote.delay(&busy.public_key, Duration::from_millis(100));
    f.storage.save_inbox(&busy).unwrap();
    f.storage.save_inbox(&idle).unwrap();

    let (single, report) = tokio::join!(
        f.orchestrator.sync_one(&busy.public_key),
        f.orchestrator.sync_all()
    );

    assert!(single.is_ok());
    assert_eq!(report.skipped, 1);
    assert_eq!(report.synced, 1);
    assert_eq!(f.remote.challenge_count(), 2);
}

#[tokio::test]
async fn test_awaiting_registration_excluded() {
    let f = fixture();
    let pending = Inbox::for_offer(OfferId::new());
    f.storage.save_inbox(&pending).unwrap();
    f.storage
        .set_awaiting_registration(&pending.public_key, true)
        .unwrap();

    let report = f.orchestrator.sync_all().await;
    assert_eq!(report.skipped, 1);
    assert!(f.remote.calls().is_empty());

    f.storage
        .set_awaiting_registration(&pending.public_key, false)
        .unwrap();
    let report = f.orchestrator.sync_all().await;
    assert_eq!(report.synced, 1);
}

// ============================================================================
// End to end with real crypto
// ============================================================================

#[tokio::test]
async fn test_sealed_messages_reach_every_inbox() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(Storage::open_dir(dir.path()).unwrap());
    let remote = Arc::new(MemoryRemote::new());
    let orchestrator = SyncOrchestrator::new(
        Arc::new(LocalCrypto::new()),
        remote.clone(),
        storage.clone(),
        &SyncConfig::default(),
    );

    let offer = Inbox::for_offer(OfferId::new());
    let personal = Inbox::personal();
    storage.save_inbox(&offer).unwrap();
    storage.save_inbox(&personal).unwrap();

    for (recipient, text) in [(&offer, "about your offer"), (&personal, "hi there")] {
        let msg = MessagePayload::outgoing(
            "counterparty",
            &recipient.public_key,
            MessageType::MessagingRequest,
            Some(text.to_string()),
        );
        remote.send(&recipient.public_key, &msg).unwrap();
    }

    let report = orchestrator.sync_all().await;
    assert_eq!(report.synced, 2);
    assert_eq!(report.merged, 2);

    let stored = storage.list_messages(&offer.public_key).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].text.as_deref(), Some("about your offer"));
    assert_eq!(stored[0].message_type, MessageType::MessagingRequest);
    assert_eq!(stored[0].contact_inbox_key, "counterparty");
    assert!(stored[0].is_contact);
    assert_eq!(remote.pending(&offer.public_key), 0);
    assert_eq!(remote.pending(&personal.public_key), 0);
}
