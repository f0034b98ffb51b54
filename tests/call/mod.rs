use futures::{channel::mpsc, executor::block_on};
use huddle::{
    call::{AnswerOutcome, CallSession, CandidateQueue},
    platform::{EngineEvents, NegotiationError},
    proto::{CallKind, ClientMsg, SdpType, SessionDescription, UserId},
    CallError, CallId, CallStatus, Role,
};

use crate::utils::{candidate, FakeMedia, Op};

fn session(
    role: Role,
    candidates: CandidateQueue,
) -> (CallSession<FakeMedia>, FakeMedia) {
    let media = FakeMedia::default();
    let session = CallSession::new(
        CallId(1),
        role,
        UserId::from("bob"),
        CallKind::Audio,
        candidates,
    );
    let (tx, _rx) = mpsc::unbounded();
    let events = EngineEvents::new(CallId(1), tx);
    block_on(session.acquire_media(&media, &[], events)).unwrap();
    (session, media)
}

fn negotiation_error(err: CallError) -> NegotiationError {
    match err {
        CallError::Negotiation(e) => e,
        e => panic!("unexpected error: {}", e),
    }
}

#[test]
fn caller_buffers_candidates_until_answer() {
    let (session, media) = session(Role::Caller, CandidateQueue::new());
    let local = UserId::from("alice");
    block_on(session.make_offer(&local)).unwrap();

    block_on(session.handle_remote_candidate(candidate(1))).unwrap();
    block_on(session.handle_remote_candidate(candidate(2))).unwrap();
    assert_eq!(session.queued_candidates(), 2);
    assert!(!session.is_remote_description_applied());

    let outcome = block_on(
        session.handle_answer(true, Some(SessionDescription::answer("v=0"))),
    )
    .unwrap();

    assert_eq!(outcome, AnswerOutcome::Connected);
    assert_eq!(session.status(), CallStatus::Connected);
    assert_eq!(session.queued_candidates(), 0);
    assert_eq!(
        media.0.ops(),
        vec![
            Op::SetLocal(SdpType::Offer),
            Op::SetRemote(SdpType::Answer),
            Op::AddCandidate(candidate(1).candidate),
            Op::AddCandidate(candidate(2).candidate),
        ],
    );
}

#[test]
fn callee_never_offers() {
    let (session, media) = session(Role::Callee, CandidateQueue::new());

    let err = block_on(session.make_offer(&"alice".into())).unwrap_err();

    assert_eq!(
        negotiation_error(err.into_inner()),
        NegotiationError::OfferByCallee,
    );
    assert!(media.0.ops().is_empty());
}

#[test]
fn caller_never_answers() {
    let (session, _) = session(Role::Caller, CandidateQueue::new());

    let err = block_on(
        session.answer_offer(&"alice".into(), SessionDescription::offer("v=0")),
    )
    .unwrap_err();

    assert_eq!(
        negotiation_error(err.into_inner()),
        NegotiationError::AnswerByCaller,
    );
}

#[test]
fn callee_answers_with_accepting_message() {
    let queue = CandidateQueue::new();
    queue.enqueue(candidate(5));
    let (session, media) = session(Role::Callee, queue);

    let msg = block_on(
        session.answer_offer(&"alice".into(), SessionDescription::offer("v=0")),
    )
    .unwrap();

    assert!(matches!(
        msg,
        ClientMsg::CallAnswer {
            accepted: true,
            sdp: Some(SessionDescription {
                kind: SdpType::Answer,
                ..
            }),
            ..
        }
    ));
    assert_eq!(session.status(), CallStatus::AnswerSent);
    session.answer_delivered();
    assert_eq!(session.status(), CallStatus::Connected);
    assert_eq!(
        media.0.ops()[..2],
        [
            Op::SetRemote(SdpType::Offer),
            Op::AddCandidate(candidate(5).candidate),
        ],
    );
}

#[test]
fn answer_is_ignored_unless_offer_sent() {
    let (session, _) = session(Role::Caller, CandidateQueue::new());

    let outcome = block_on(
        session.handle_answer(true, Some(SessionDescription::answer("v=0"))),
    )
    .unwrap();

    assert_eq!(outcome, AnswerOutcome::Ignored);
    assert_eq!(session.status(), CallStatus::AwaitingMedia);
    assert!(session.remote_description().is_none());
}

#[test]
fn answer_must_be_an_answer() {
    let (session, _) = session(Role::Caller, CandidateQueue::new());
    block_on(session.make_offer(&"alice".into())).unwrap();

    let err = block_on(
        session.handle_answer(true, Some(SessionDescription::offer("v=0"))),
    )
    .unwrap_err();
    assert_eq!(
        negotiation_error(err.into_inner()),
        NegotiationError::UnexpectedSdpType {
            expected: SdpType::Answer,
            actual: SdpType::Offer,
        },
    );

    let err = block_on(session.handle_answer(true, None)).unwrap_err();
    assert_eq!(
        negotiation_error(err.into_inner()),
        NegotiationError::MissingAnswer,
    );
}

#[test]
fn remote_description_is_set_once() {
    let (session, _) = session(Role::Caller, CandidateQueue::new());
    block_on(session.make_offer(&"alice".into())).unwrap();
    block_on(
        session.handle_answer(true, Some(SessionDescription::answer("v=0"))),
    )
    .unwrap();

    let outcome = block_on(
        session.handle_answer(true, Some(SessionDescription::answer("v=1"))),
    )
    .unwrap();

    assert_eq!(outcome, AnswerOutcome::Ignored);
    assert_eq!(
        session.remote_description(),
        Some(SessionDescription::answer("v=0")),
    );
}

#[test]
fn teardown_releases_once() {
    let (session, media) = session(Role::Caller, CandidateQueue::new());

    assert!(session.teardown());
    assert!(!session.teardown());
    drop(session);

    assert_eq!(media.0.stopped.get(), 1);
    assert_eq!(media.0.engines_closed.get(), 1);
}

#[test]
fn hangup_message_depends_on_what_peer_knows() {
    let local = UserId::from("alice");

    let (caller, _) = session(Role::Caller, CandidateQueue::new());
    assert_eq!(caller.hangup_message(&local), None);
    block_on(caller.make_offer(&local)).unwrap();
    assert_eq!(
        caller.hangup_message(&local),
        Some(ClientMsg::reject_call("alice".into(), "bob".into())),
    );

    let (callee, _) = session(Role::Callee, CandidateQueue::new());
    assert_eq!(
        callee.hangup_message(&local),
        Some(ClientMsg::reject_call("alice".into(), "bob".into())),
    );
    callee.teardown();
    assert_eq!(callee.hangup_message(&local), None);
}

#[test]
fn declining_answer_is_hangup_unless_offer_is_pending() {
    let local = UserId::from("alice");

    let (caller, _) = session(Role::Caller, CandidateQueue::new());
    block_on(caller.make_offer(&local)).unwrap();
    assert_eq!(
        block_on(caller.handle_answer(false, None)).unwrap(),
        AnswerOutcome::Rejected,
    );

    let (callee, _) = session(Role::Callee, CandidateQueue::new());
    block_on(callee.answer_offer(&local, SessionDescription::offer("v=0")))
        .unwrap();
    callee.answer_delivered();
    assert_eq!(
        block_on(
            callee.handle_answer(true, Some(SessionDescription::answer("v=1")))
        )
        .unwrap(),
        AnswerOutcome::Ignored,
    );
    assert_eq!(
        block_on(callee.handle_answer(false, None)).unwrap(),
        AnswerOutcome::HungUp,
    );
}
