use std::{cell::RefCell, rc::Rc};

use futures::task::LocalSpawnExt as _;
use huddle::{
    platform::MediaError,
    proto::{
        CallKind, ClientMsg, MediaKind, SdpType, ServerMsg, SessionDescription,
    },
    room::{EndReason, RoomEvent},
    CallError, CallStatus,
};

use crate::utils::{candidate, Harness, Op};

fn offer_from(from: &str, to: &str, kind: CallKind) -> ServerMsg {
    ServerMsg::CallOffer {
        from_user: from.into(),
        to_user: to.into(),
        call_type: kind,
        sdp: Some(SessionDescription::offer("v=0 remote offer")),
    }
}

fn answer_from(from: &str, to: &str, accepted: bool) -> ServerMsg {
    ServerMsg::CallAnswer {
        from_user: from.into(),
        to_user: to.into(),
        accepted,
        sdp: if accepted {
            Some(SessionDescription::answer("v=0 remote answer"))
        } else {
            None
        },
    }
}

fn candidate_from(from: &str, to: &str, n: u16) -> ServerMsg {
    ServerMsg::IceCandidate {
        from_user: from.into(),
        to_user: to.into(),
        candidate: candidate(n),
    }
}

fn call_ended(events: &[RoomEvent<String>]) -> Option<EndReason> {
    events.iter().find_map(|e| match e {
        RoomEvent::CallEnded { reason, .. } => Some(reason.clone()),
        _ => None,
    })
}

/// Makes `alice` call `bob` and `bob` accept it.
fn connected_caller() -> Harness {
    let mut h = Harness::with_online("alice", &["alice", "bob"]);
    let handle = h.room.new_handle();
    h.pool
        .run_until(handle.start_call("bob".into(), CallKind::Video))
        .unwrap();
    h.deliver(answer_from("bob", "alice", true));
    assert_eq!(handle.call_status().unwrap(), CallStatus::Connected);
    h.channel.take_sent();
    h.events();
    h
}

#[test]
fn video_call_is_offered_and_connected() {
    let mut h = Harness::with_online("alice", &["alice", "bob"]);
    let handle = h.room.new_handle();

    h.pool
        .run_until(handle.start_call("bob".into(), CallKind::Video))
        .unwrap();

    let sent = h.channel.sent();
    assert_eq!(sent.len(), 1);
    assert!(matches!(
        &sent[0],
        ClientMsg::CallOffer {
            to_user,
            call_type: CallKind::Video,
            sdp,
            ..
        } if to_user.0 == "bob" && sdp.kind == SdpType::Offer,
    ));
    assert_eq!(handle.call_status().unwrap(), CallStatus::OfferSent);

    h.deliver(answer_from("bob", "alice", true));

    assert_eq!(handle.call_status().unwrap(), CallStatus::Connected);
    assert_eq!(
        h.media.ops(),
        vec![Op::SetLocal(SdpType::Offer), Op::SetRemote(SdpType::Answer)],
    );
    assert!(h.events().iter().any(|e| matches!(
        e,
        RoomEvent::CallStatusChanged {
            status: CallStatus::Connected,
            ..
        }
    )));
    assert!(!h
        .channel
        .sent()
        .iter()
        .any(|m| matches!(m, ClientMsg::CallAnswer { .. })));
}

#[test]
fn candidates_without_call_are_dropped() {
    let mut h = Harness::with_online("bob", &["alice", "bob"]);
    let handle = h.room.new_handle();

    for n in 1..=3 {
        h.deliver(candidate_from("alice", "bob", n));
    }

    assert_eq!(handle.call_status().unwrap(), CallStatus::Idle);
    assert!(h.media.ops().is_empty());
    assert!(h.channel.sent().is_empty());
    assert!(h.events().is_empty());
}

#[test]
fn callee_applies_early_candidates_after_offer() {
    let mut h = Harness::with_online("bob", &["alice", "bob"]);
    let handle = h.room.new_handle();

    h.deliver(offer_from("alice", "bob", CallKind::Audio));
    h.deliver(candidate_from("alice", "bob", 1));
    h.deliver(candidate_from("alice", "bob", 2));
    assert!(h.events().iter().any(|e| matches!(
        e,
        RoomEvent::IncomingCall {
            kind: CallKind::Audio,
            ..
        }
    )));
    assert_eq!(
        handle.incoming_call().unwrap(),
        Some(("alice".into(), CallKind::Audio)),
    );

    h.pool.run_until(handle.accept_call()).unwrap();

    assert_eq!(
        h.media.ops(),
        vec![
            Op::SetRemote(SdpType::Offer),
            Op::AddCandidate(candidate(1).candidate),
            Op::AddCandidate(candidate(2).candidate),
            Op::SetLocal(SdpType::Answer),
        ],
    );
    assert_eq!(handle.call_status().unwrap(), CallStatus::Connected);
    let sent = h.channel.sent();
    assert_eq!(sent.len(), 1);
    assert!(matches!(
        &sent[0],
        ClientMsg::CallAnswer {
            accepted: true,
            sdp: Some(_),
            ..
        }
    ));
    assert!(!sent.iter().any(|m| matches!(m, ClientMsg::CallOffer { .. })));

    h.deliver(candidate_from("alice", "bob", 3));

    assert_eq!(
        h.media.ops().last(),
        Some(&Op::AddCandidate(candidate(3).candidate)),
    );
}

#[test]
fn rejected_call_releases_media() {
    let mut h = Harness::with_online("alice", &["alice", "bob"]);
    let handle = h.room.new_handle();
    h.pool
        .run_until(handle.start_call("bob".into(), CallKind::Video))
        .unwrap();
    h.events();

    h.deliver(answer_from("bob", "alice", false));

    assert_eq!(call_ended(&h.events()), Some(EndReason::Rejected));
    assert_eq!(handle.call_status().unwrap(), CallStatus::Idle);
    assert_eq!(handle.call_peer().unwrap(), None);
    assert_eq!(h.media.stopped.get(), 1);
    assert_eq!(h.media.engines_closed.get(), 1);
    assert_eq!(h.channel.sent().len(), 1);
}

#[test]
fn end_call_is_idempotent() {
    let mut h = connected_caller();
    let handle = h.room.new_handle();

    handle.end_call().unwrap();
    handle.end_call().unwrap();

    assert_eq!(h.media.stopped.get(), 1);
    assert_eq!(h.media.engines_closed.get(), 1);
    assert_eq!(
        h.channel.sent(),
        vec![ClientMsg::reject_call("alice".into(), "bob".into())],
    );
    assert_eq!(call_ended(&h.events()), Some(EndReason::Local));
    assert_eq!(handle.call_status().unwrap(), CallStatus::Idle);
}

#[test]
fn second_call_is_rejected() {
    let mut h = connected_caller();
    let handle = h.room.new_handle();
    h.deliver(ServerMsg::Join {
        user: Some("carol".into()),
        online: vec!["alice".into(), "bob".into(), "carol".into()],
    });

    let err = h
        .pool
        .run_until(handle.start_call("carol".into(), CallKind::Audio))
        .unwrap_err();

    assert_eq!(err.into_inner(), CallError::Busy);
    assert_eq!(handle.call_status().unwrap(), CallStatus::Connected);
    assert_eq!(handle.call_peer().unwrap(), Some("bob".into()));
    assert_eq!(h.media.acquired.get(), 1);
    assert!(h.channel.sent().is_empty());
}

#[test]
fn offer_while_busy_is_ignored() {
    let mut h = connected_caller();
    let handle = h.room.new_handle();

    h.deliver(offer_from("carol", "alice", CallKind::Audio));

    assert_eq!(handle.incoming_call().unwrap(), None);
    assert!(h.events().is_empty());
    assert!(h.channel.sent().is_empty());
}

#[test]
fn rejects_self_and_offline_calls() {
    let h = Harness::with_online("alice", &["alice", "bob"]);
    let handle = h.room.new_handle();
    let mut pool = h.pool;

    let err = pool
        .run_until(handle.start_call("alice".into(), CallKind::Audio))
        .unwrap_err();
    assert_eq!(err.into_inner(), CallError::SelfCall);

    let err = pool
        .run_until(handle.start_call("dave".into(), CallKind::Audio))
        .unwrap_err();
    assert_eq!(err.into_inner(), CallError::PeerOffline("dave".into()));
    assert_eq!(h.media.acquired.get(), 0);
}

#[test]
fn local_candidates_are_forwarded_to_peer() {
    let mut h = connected_caller();

    h.media.last_events().ice_candidate_discovered(candidate(9));
    h.events();

    assert_eq!(
        h.channel.sent(),
        vec![ClientMsg::IceCandidate {
            from_user: "alice".into(),
            to_user: "bob".into(),
            candidate: candidate(9),
        }],
    );
}

#[test]
fn events_of_ended_call_are_dropped() {
    let mut h = connected_caller();
    let stale = h.media.last_events();
    h.room.new_handle().end_call().unwrap();
    h.channel.take_sent();
    h.events();

    stale.ice_candidate_discovered(candidate(4));
    stale.remote_track_added("video".into());

    assert!(h.events().is_empty());
    assert!(h.channel.sent().is_empty());
}

#[test]
fn remote_tracks_are_reported() {
    let mut h = connected_caller();

    h.media.last_events().remote_track_added("camera".into());

    assert!(h.events().iter().any(|e| matches!(
        e,
        RoomEvent::RemoteTrackAdded { peer, track }
            if peer.0 == "bob" && track == "camera"
    )));
}

#[test]
fn peer_leaving_ends_call() {
    let mut h = connected_caller();
    let handle = h.room.new_handle();

    h.deliver(ServerMsg::Leave {
        user: Some("bob".into()),
        online: vec!["alice".into()],
    });

    assert_eq!(call_ended(&h.events()), Some(EndReason::PeerLeft));
    assert_eq!(handle.call_status().unwrap(), CallStatus::Idle);
    assert_eq!(h.media.stopped.get(), 1);
    assert!(h.channel.sent().is_empty());
}

#[test]
fn departed_offerer_withdraws_offer() {
    let mut h = Harness::with_online("bob", &["alice", "bob"]);
    let handle = h.room.new_handle();
    h.deliver(offer_from("alice", "bob", CallKind::Video));
    h.events();

    h.deliver(ServerMsg::Leave {
        user: Some("alice".into()),
        online: vec!["bob".into()],
    });

    assert!(h.events().iter().any(|e| matches!(
        e,
        RoomEvent::IncomingCallWithdrawn { from } if from.0 == "alice"
    )));
    assert_eq!(handle.incoming_call().unwrap(), None);
    let err = h.pool.run_until(handle.accept_call()).unwrap_err();
    assert_eq!(err.into_inner(), CallError::NoPendingOffer);
}

#[test]
fn remote_hangup_ends_call() {
    let mut h = connected_caller();

    h.deliver(ServerMsg::CallEnd {
        from_user: "bob".into(),
        to_user: "alice".into(),
    });

    assert_eq!(call_ended(&h.events()), Some(EndReason::RemoteHangup));
    assert_eq!(h.media.engines_closed.get(), 1);
    assert!(h.channel.sent().is_empty());
}

#[test]
fn declining_answer_hangs_up_connected_caller() {
    let mut h = connected_caller();

    h.deliver(answer_from("bob", "alice", false));

    assert_eq!(call_ended(&h.events()), Some(EndReason::RemoteHangup));
    assert_eq!(h.media.engines_closed.get(), 1);
    assert!(h.channel.sent().is_empty());
}

#[test]
fn callee_is_hung_up_by_caller() {
    let mut h = Harness::with_online("bob", &["alice", "bob"]);
    let handle = h.room.new_handle();
    h.deliver(offer_from("alice", "bob", CallKind::Audio));
    h.pool.run_until(handle.accept_call()).unwrap();
    h.channel.take_sent();
    h.events();

    h.deliver(answer_from("alice", "bob", false));

    assert_eq!(call_ended(&h.events()), Some(EndReason::RemoteHangup));
    assert_eq!(handle.call_status().unwrap(), CallStatus::Idle);
    assert_eq!(handle.call_peer().unwrap(), None);
    assert_eq!(h.media.stopped.get(), 1);
    assert_eq!(h.media.engines_closed.get(), 1);
    assert!(h.channel.sent().is_empty());
}

#[test]
fn declining_answer_withdraws_offer() {
    let mut h = Harness::with_online("bob", &["alice", "bob"]);
    let handle = h.room.new_handle();
    h.deliver(offer_from("alice", "bob", CallKind::Video));
    h.events();

    h.deliver(answer_from("alice", "bob", false));

    assert!(h.events().iter().any(|e| matches!(
        e,
        RoomEvent::IncomingCallWithdrawn { from } if from.0 == "alice"
    )));
    assert_eq!(handle.incoming_call().unwrap(), None);
    assert_eq!(h.media.acquired.get(), 0);
}

#[test]
fn closed_channel_ends_call() {
    let mut h = connected_caller();

    h.channel.close(1006);
    let events = h.events();

    assert_eq!(call_ended(&events), Some(EndReason::ChannelClosed));
    assert!(events
        .iter()
        .any(|e| matches!(e, RoomEvent::ConnectionClosed(_))));
    assert_eq!(h.media.stopped.get(), 1);
}

#[test]
fn callee_media_failure_rejects_call() {
    let mut h = Harness::with_online("bob", &["alice", "bob"]);
    let handle = h.room.new_handle();
    h.media.fail_acquire.replace(Some(MediaError::PermissionDenied(
        huddle::platform::Error::new("NotAllowedError", "denied"),
    )));
    h.deliver(offer_from("alice", "bob", CallKind::Video));

    let err = h.pool.run_until(handle.accept_call()).unwrap_err();

    assert!(matches!(
        err.into_inner(),
        CallError::MediaAcquisition(MediaError::PermissionDenied(_)),
    ));
    assert_eq!(
        h.channel.sent(),
        vec![ClientMsg::reject_call("bob".into(), "alice".into())],
    );
    assert_eq!(handle.call_status().unwrap(), CallStatus::Idle);
    assert!(matches!(
        call_ended(&h.events()),
        Some(EndReason::Failed(CallError::MediaAcquisition(_))),
    ));
}

#[test]
fn caller_media_failure_sends_nothing() {
    let mut h = Harness::with_online("alice", &["alice", "bob"]);
    let handle = h.room.new_handle();
    h.media.fail_acquire.replace(Some(MediaError::NoDevice(
        huddle::platform::Error::new("NotFoundError", "no camera"),
    )));

    let err = h
        .pool
        .run_until(handle.start_call("bob".into(), CallKind::Video))
        .unwrap_err();

    assert!(matches!(
        err.into_inner(),
        CallError::MediaAcquisition(MediaError::NoDevice(_)),
    ));
    assert!(h.channel.sent().is_empty());
    assert_eq!(handle.call_status().unwrap(), CallStatus::Idle);
}

#[test]
fn failed_answer_ends_call() {
    let mut h = Harness::with_online("alice", &["alice", "bob"]);
    let handle = h.room.new_handle();
    h.pool
        .run_until(handle.start_call("bob".into(), CallKind::Audio))
        .unwrap();
    h.channel.take_sent();
    h.media.fail_remote_description.set(true);

    h.deliver(answer_from("bob", "alice", true));

    assert!(matches!(
        call_ended(&h.events()),
        Some(EndReason::Failed(CallError::Negotiation(_))),
    ));
    assert_eq!(
        h.channel.sent(),
        vec![ClientMsg::reject_call("alice".into(), "bob".into())],
    );
    assert_eq!(h.media.stopped.get(), 1);
}

#[test]
fn end_call_cancels_media_acquisition() {
    let mut h = Harness::with_online("alice", &["alice", "bob"]);
    let handle = h.room.new_handle();
    let gate = h.media.hold_acquisition();
    let result = Rc::new(RefCell::new(None));

    let (task_handle, task_result) = (handle.clone(), Rc::clone(&result));
    h.pool
        .spawner()
        .spawn_local(async move {
            let res =
                task_handle.start_call("bob".into(), CallKind::Video).await;
            task_result.replace(Some(res));
        })
        .unwrap();
    h.pool.run_until_stalled();
    assert_eq!(handle.call_status().unwrap(), CallStatus::AwaitingMedia);

    handle.end_call().unwrap();
    gate.send(()).unwrap();
    h.pool.run_until_stalled();

    let res = result.borrow_mut().take().unwrap();
    assert_eq!(res.unwrap_err().into_inner(), CallError::Cancelled);
    assert_eq!(h.media.acquired.get(), 1);
    assert_eq!(h.media.stopped.get(), 1);
    assert_eq!(h.media.engines.get(), 0);
    assert!(h.channel.sent().is_empty());
    assert_eq!(call_ended(&h.events()), Some(EndReason::Local));
}

#[test]
fn end_call_cancels_negotiation() {
    let mut h = Harness::with_online("alice", &["alice", "bob"]);
    let handle = h.room.new_handle();
    let gate = h.media.hold_offer();
    let result = Rc::new(RefCell::new(None));

    let (task_handle, task_result) = (handle.clone(), Rc::clone(&result));
    h.pool
        .spawner()
        .spawn_local(async move {
            let res =
                task_handle.start_call("bob".into(), CallKind::Audio).await;
            task_result.replace(Some(res));
        })
        .unwrap();
    h.pool.run_until_stalled();
    assert_eq!(h.media.engines.get(), 1);

    handle.end_call().unwrap();
    gate.send(()).unwrap();
    h.pool.run_until_stalled();

    let res = result.borrow_mut().take().unwrap();
    assert_eq!(res.unwrap_err().into_inner(), CallError::Cancelled);
    assert_eq!(h.media.stopped.get(), 1);
    assert_eq!(h.media.engines_closed.get(), 1);
    assert!(h.media.ops().is_empty());
    assert!(h.channel.sent().is_empty());
    assert_eq!(call_ended(&h.events()), Some(EndReason::Local));
    assert_eq!(handle.call_status().unwrap(), CallStatus::Idle);
}

#[test]
fn rejecting_incoming_call() {
    let mut h = Harness::with_online("bob", &["alice", "bob"]);
    let handle = h.room.new_handle();
    h.deliver(offer_from("alice", "bob", CallKind::Audio));

    handle.reject_call().unwrap();

    assert_eq!(
        h.channel.sent(),
        vec![ClientMsg::reject_call("bob".into(), "alice".into())],
    );
    assert_eq!(
        handle.reject_call().unwrap_err().into_inner(),
        CallError::NoPendingOffer,
    );
    assert_eq!(h.media.acquired.get(), 0);
}

#[test]
fn muting_tracks() {
    let mut h = Harness::with_online("alice", &["alice", "bob"]);
    let handle = h.room.new_handle();
    assert_eq!(
        handle.set_muted(MediaKind::Audio, true).unwrap_err().into_inner(),
        CallError::NoActiveCall,
    );
    h.pool
        .run_until(handle.start_call("bob".into(), CallKind::Audio))
        .unwrap();

    handle.set_muted(MediaKind::Audio, true).unwrap();

    assert_eq!(
        handle.set_muted(MediaKind::Video, true).unwrap_err().into_inner(),
        CallError::NoTrack(MediaKind::Video),
    );
    assert_eq!(*h.media.enabled.borrow(), vec![(MediaKind::Audio, false)]);
}

#[test]
fn chat_and_reactions() {
    let mut h = Harness::with_online("alice", &["alice", "bob"]);
    let handle = h.room.new_handle();

    handle.send_message("hello".into()).unwrap();
    handle.add_reaction("m1".into(), "👍".into()).unwrap();
    h.deliver(ServerMsg::Message {
        user: "bob".into(),
        content: "hi".into(),
        message_id: Some("m2".into()),
        timestamp: None,
        reactions: Default::default(),
    });

    assert_eq!(
        h.channel.sent(),
        vec![
            ClientMsg::Message {
                content: "hello".into(),
            },
            ClientMsg::AddReaction {
                message_id: "m1".into(),
                emoji: "👍".into(),
            },
        ],
    );
    assert!(h.events().iter().any(|e| matches!(
        e,
        RoomEvent::ChatMessage(msg) if msg.content == "hi"
    )));
}

#[test]
fn handle_detaches_when_room_is_dropped() {
    let h = connected_caller();
    let handle = h.room.new_handle();
    let Harness {
        room,
        channel,
        media,
        ..
    } = h;

    drop(room);

    assert_eq!(
        handle.call_status().unwrap_err().into_inner(),
        CallError::RoomClosed,
    );
    assert_eq!(media.stopped.get(), 1);
    assert_eq!(
        channel.sent(),
        vec![ClientMsg::reject_call("alice".into(), "bob".into())],
    );
}
