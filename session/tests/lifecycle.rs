//! End-to-end lifecycle tests: manager, guard, issuer and scorer wired
//! together over both the in-memory and the LMDB store.

use std::sync::{Arc, Barrier};
use std::thread;

use proptest::prelude::*;

use kyc_nullables::{NullClock, NullIdGenerator, NullScorer, NullStore};
use kyc_session::{HandoffIssuer, Locator, SessionError, SessionManager, VerificationSubmission};
use kyc_store::SessionStore;
use kyc_store_lmdb::LmdbEnvironment;
use kyc_types::{
    ArtifactKind, CaptureArtifact, SessionParams, SessionStatus, SubjectRef, Timestamp,
    VerificationResult,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn manager_with(store: Arc<dyn SessionStore>, clock: Arc<NullClock>) -> SessionManager {
    SessionManager::new(store, SessionParams::new(900, 3_600))
        .with_clock(clock)
        .with_id_generator(Arc::new(NullIdGenerator::sequential()))
}

fn null_manager() -> (Arc<NullClock>, SessionManager) {
    let clock = Arc::new(NullClock::new(Timestamp::new(1_700_000_000)));
    let manager = manager_with(Arc::new(NullStore::new()), clock.clone());
    (clock, manager)
}

fn subject() -> SubjectRef {
    SubjectRef::new("APP-2024-0042").unwrap()
}

fn document() -> CaptureArtifact {
    CaptureArtifact::new(ArtifactKind::DocumentScan, b"document-jpeg".to_vec())
}

fn face() -> CaptureArtifact {
    CaptureArtifact::new(ArtifactKind::FaceCapture, b"face-jpeg".to_vec())
}

fn complete_submission() -> VerificationSubmission {
    VerificationSubmission::new(document(), face(), true)
}

/// Rasterise the locator's module matrix and decode it with a QR reader.
fn decode_qr(locator: &Locator) -> String {
    const SCALE: usize = 4;
    const QUIET: usize = 4;
    let (width, modules) = locator.qr_modules();
    let size = (width + 2 * QUIET) * SCALE;

    let mut image = rqrr::PreparedImage::prepare_from_greyscale(size, size, |x, y| {
        let mx = (x / SCALE) as isize - QUIET as isize;
        let my = (y / SCALE) as isize - QUIET as isize;
        let inside = mx >= 0 && my >= 0 && (mx as usize) < width && (my as usize) < width;
        if inside && modules[my as usize * width + mx as usize] {
            0
        } else {
            255
        }
    });
    let grids = image.detect_grids();
    assert_eq!(grids.len(), 1, "expected exactly one QR code");
    let (_meta, content) = grids[0].decode().expect("decodable QR code");
    content
}

// ---------------------------------------------------------------------------
// 1. Scenarios
// ---------------------------------------------------------------------------

#[test]
fn scenario_a_new_session_is_pending_for_the_ttl() {
    let (_clock, manager) = null_manager();
    let session = manager.create_session(subject()).unwrap();
    assert_eq!(session.status, SessionStatus::Pending);
    assert_eq!(
        session.expires_at.as_secs() - session.created_at.as_secs(),
        900
    );
    assert!(session.result.is_none());
}

#[tokio::test]
async fn scenario_b_start_and_verify_completes() {
    let (_clock, manager) = null_manager();
    let session = manager.create_session(subject()).unwrap();
    manager.start(&session.session_id).unwrap();

    let scorer = NullScorer::returning(VerificationResult::new(true, 90.0));
    let done = manager
        .verify(&session.session_id, complete_submission(), &scorer)
        .await
        .unwrap();
    assert_eq!(done.status, SessionStatus::Completed);
    assert_eq!(done.result, Some(VerificationResult::new(true, 90.0)));

    let read = manager.get_status(&session.session_id).unwrap();
    assert_eq!(read, done);
}

#[test]
fn scenario_c_expired_session_cannot_start() {
    let (clock, manager) = null_manager();
    let session = manager.create_session(subject()).unwrap();
    clock.advance(901);

    assert_eq!(
        manager.get_status(&session.session_id).unwrap().status,
        SessionStatus::Expired
    );
    let err = manager.start(&session.session_id).unwrap_err();
    assert!(matches!(err, SessionError::SessionExpired(_)));
}

#[tokio::test]
async fn scenario_c_expired_session_cannot_verify() {
    let (clock, manager) = null_manager();
    let session = manager.create_session(subject()).unwrap();
    manager.start(&session.session_id).unwrap();
    clock.advance(901);

    let scorer = NullScorer::returning(VerificationResult::new(true, 90.0));
    let err = manager
        .verify(&session.session_id, complete_submission(), &scorer)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::SessionExpired(_)));
    assert_eq!(scorer.calls(), 0);
}

#[tokio::test]
async fn scenario_d_missing_document_is_incomplete() {
    let (_clock, manager) = null_manager();
    let session = manager.create_session(subject()).unwrap();
    manager.start(&session.session_id).unwrap();

    let scorer = NullScorer::returning(VerificationResult::new(true, 90.0));
    let submission = VerificationSubmission {
        document_scan: None,
        face_capture: Some(face()),
        liveness_detected: true,
    };
    let err = manager
        .verify(&session.session_id, submission, &scorer)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::IncompleteCapture(_)));
    assert_eq!(scorer.calls(), 0);
    assert_eq!(
        manager.get_status(&session.session_id).unwrap().status,
        SessionStatus::InProgress
    );
}

#[tokio::test]
async fn liveness_false_fails_and_stays_in_progress() {
    let (_clock, manager) = null_manager();
    let session = manager.create_session(subject()).unwrap();
    manager.start(&session.session_id).unwrap();

    let scorer = NullScorer::returning(VerificationResult::new(true, 90.0));
    let err = manager
        .verify(
            &session.session_id,
            VerificationSubmission::new(document(), face(), false),
            &scorer,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::LivenessNotConfirmed));
    assert_eq!(
        manager.get_status(&session.session_id).unwrap().status,
        SessionStatus::InProgress
    );
}

fn race_two_starts(manager: SessionManager) {
    let session = manager.create_session(subject()).unwrap();
    let manager = Arc::new(manager);
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let manager = manager.clone();
            let barrier = barrier.clone();
            let id = session.session_id.clone();
            thread::spawn(move || {
                barrier.wait();
                manager.start(&id)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1, "exactly one start must win: {results:?}");
    let loser = results.into_iter().find_map(Result::err).unwrap();
    assert!(matches!(
        loser,
        SessionError::InvalidTransition {
            current: SessionStatus::InProgress,
            ..
        }
    ));
}

#[test]
fn scenario_e_concurrent_starts_null_store() {
    for _ in 0..20 {
        let (_clock, manager) = null_manager();
        race_two_starts(manager);
    }
}

#[test]
fn scenario_e_concurrent_starts_lmdb() {
    let dir = tempfile::tempdir().expect("temp dir");
    let env = LmdbEnvironment::open(dir.path(), 4, 16 * 1024 * 1024).expect("open env");
    let clock = Arc::new(NullClock::new(Timestamp::new(1_700_000_000)));
    let manager = manager_with(Arc::new(env.session_store()), clock);
    for _ in 0..10 {
        race_two_starts(manager.clone());
    }
}

// ---------------------------------------------------------------------------
// 2. Persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn outcome_survives_reopen() {
    let dir = tempfile::tempdir().expect("temp dir");
    let clock = Arc::new(NullClock::new(Timestamp::new(1_700_000_000)));
    let id = {
        let env = LmdbEnvironment::open(dir.path(), 4, 16 * 1024 * 1024).unwrap();
        let manager = manager_with(Arc::new(env.session_store()), clock.clone());
        let session = manager.create_session(subject()).unwrap();
        manager.start(&session.session_id).unwrap();
        let scorer = NullScorer::returning(VerificationResult::new(false, 30.0));
        manager
            .verify(&session.session_id, complete_submission(), &scorer)
            .await
            .unwrap();
        session.session_id
    };

    let env = LmdbEnvironment::open(dir.path(), 4, 16 * 1024 * 1024).unwrap();
    let manager = manager_with(Arc::new(env.session_store()), clock);
    let session = manager.get_status(&id).unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.result.map(|r| r.verified), Some(false));
}

// ---------------------------------------------------------------------------
// 3. Handoff locator
// ---------------------------------------------------------------------------

#[test]
fn qr_code_decodes_to_the_locator_url() {
    let (_clock, manager) = null_manager();
    let session = manager.create_session(subject()).unwrap();
    let issuer = HandoffIssuer::new("https://onboarding.example.co.ke/").unwrap();
    let locator = issuer.issue(&session).unwrap();

    let decoded = decode_qr(&locator);
    assert_eq!(decoded, locator.url);
    assert!(decoded.ends_with(session.session_id.as_str()));
    assert_eq!(issuer.session_id_from_url(&decoded).unwrap(), session.session_id);
}

#[test]
fn real_ids_fit_in_a_decodable_code() {
    let clock = Arc::new(NullClock::new(Timestamp::new(1_700_000_000)));
    let manager = SessionManager::new(Arc::new(NullStore::new()), SessionParams::default())
        .with_clock(clock);
    let session = manager.create_session(subject()).unwrap();
    let issuer = HandoffIssuer::new("http://192.168.1.20:5173").unwrap();
    let locator = issuer.issue(&session).unwrap();
    assert_eq!(decode_qr(&locator), locator.url);
}

// ---------------------------------------------------------------------------
// 4. Transition graph property
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
enum Op {
    Start,
    VerifyAccepted,
    VerifyRejected,
    VerifyWithoutLiveness,
    VerifyScorerDown,
    Abort,
    Read,
    Advance(u64),
    Sweep,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Start),
        Just(Op::VerifyAccepted),
        Just(Op::VerifyRejected),
        Just(Op::VerifyWithoutLiveness),
        Just(Op::VerifyScorerDown),
        Just(Op::Abort),
        Just(Op::Read),
        (0u64..600).prop_map(Op::Advance),
        Just(Op::Sweep),
    ]
}

fn legal(from: SessionStatus, to: SessionStatus) -> bool {
    from == to || from.can_transition_to(to)
}

proptest! {
    #[test]
    fn status_only_follows_graph_edges(ops in proptest::collection::vec(op(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (clock, manager) = null_manager();
        let session = manager.create_session(subject()).unwrap();
        let id = session.session_id.clone();
        let mut last = session.status;

        for op in ops {
            let _ = match op {
                Op::Start => manager.start(&id).map(|_| ()),
                Op::VerifyAccepted => runtime
                    .block_on(manager.verify(
                        &id,
                        complete_submission(),
                        &NullScorer::returning(VerificationResult::new(true, 88.0)),
                    ))
                    .map(|_| ()),
                Op::VerifyRejected => runtime
                    .block_on(manager.verify(
                        &id,
                        complete_submission(),
                        &NullScorer::returning(VerificationResult::new(false, 10.0)),
                    ))
                    .map(|_| ()),
                Op::VerifyWithoutLiveness => runtime
                    .block_on(manager.verify(
                        &id,
                        VerificationSubmission::new(document(), face(), false),
                        &NullScorer::returning(VerificationResult::new(true, 88.0)),
                    ))
                    .map(|_| ()),
                Op::VerifyScorerDown => runtime
                    .block_on(manager.verify(&id, complete_submission(), &NullScorer::unavailable()))
                    .map(|_| ()),
                Op::Abort => manager.abort(&id, "walked away").map(|_| ()),
                Op::Read => manager.get_status(&id).map(|_| ()),
                Op::Advance(secs) => {
                    clock.advance(secs);
                    Ok(())
                }
                Op::Sweep => manager.sweep().map(|_| ()),
            };

            let current = match manager.get_status(&id) {
                Ok(session) => session.status,
                // Collected by the sweep; only terminal sessions are removed.
                Err(SessionError::NotFound(_)) => {
                    prop_assert!(last.is_terminal());
                    break;
                }
                Err(e) => return Err(TestCaseError::fail(e.to_string())),
            };
            prop_assert!(legal(last, current), "{} -> {}", last, current);
            if last.is_terminal() {
                prop_assert_eq!(last, current);
            }
            last = current;
        }
    }
}
