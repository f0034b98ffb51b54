//! In-memory fakes of the signalling channel and the media capability.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use async_trait::async_trait;
use futures::{
    channel::{mpsc, oneshot},
    executor::LocalPool,
    stream::LocalBoxStream,
    FutureExt as _, StreamExt as _,
};
use huddle::{
    platform::{
        EngineEvents, LocalTracks, MediaCapability, MediaError,
        NegotiationEngine, NegotiationError, SignalingChannel, TransportError,
        TransportState,
    },
    proto::{
        CallKind, ClientMsg, IceCandidate, IceServer, MediaKind, SdpType,
        ServerMsg, SessionDescription, UserId,
    },
    room::{Room, RoomEvent},
    CallSettings,
};
use tracerr::Traced;

/// [`SignalingChannel`] recording everything sent through it.
#[derive(Default)]
pub struct FakeChannel {
    sent: RefCell<Vec<ClientMsg>>,
    msg_subs: RefCell<Vec<mpsc::UnboundedSender<ServerMsg>>>,
    state_subs: RefCell<Vec<mpsc::UnboundedSender<TransportState>>>,
    closed: Cell<bool>,
}

impl FakeChannel {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Relays the provided message from the server.
    pub fn deliver(&self, msg: ServerMsg) {
        for sub in self.msg_subs.borrow().iter() {
            sub.unbounded_send(msg.clone()).unwrap();
        }
    }

    /// Closes the channel abnormally.
    pub fn close(&self, code: u16) {
        self.closed.set(true);
        for sub in self.state_subs.borrow().iter() {
            sub.unbounded_send(TransportState::Closed(
                huddle::rpc::CloseMsg::new(code, String::new()),
            ))
            .unwrap();
        }
    }

    /// Returns all the messages sent so far.
    pub fn sent(&self) -> Vec<ClientMsg> {
        self.sent.borrow().clone()
    }

    /// Returns and forgets all the messages sent so far.
    pub fn take_sent(&self) -> Vec<ClientMsg> {
        self.sent.borrow_mut().drain(..).collect()
    }
}

impl SignalingChannel for FakeChannel {
    fn on_message(&self) -> LocalBoxStream<'static, ServerMsg> {
        let (tx, rx) = mpsc::unbounded();
        self.msg_subs.borrow_mut().push(tx);
        Box::pin(rx)
    }

    fn send(&self, msg: &ClientMsg) -> Result<(), Traced<TransportError>> {
        if self.closed.get() {
            return Err(tracerr::new!(TransportError::ClosedSocket));
        }
        self.sent.borrow_mut().push(msg.clone());
        Ok(())
    }

    fn on_state_change(&self) -> LocalBoxStream<'static, TransportState> {
        let (tx, rx) = mpsc::unbounded();
        self.state_subs.borrow_mut().push(tx);
        Box::pin(rx)
    }
}

/// Operation performed on a [`FakeEngine`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Op {
    SetLocal(SdpType),
    SetRemote(SdpType),
    AddCandidate(String),
}

/// Everything done with the media of a [`FakeMedia`].
#[derive(Default)]
pub struct MediaLog {
    pub acquired: Cell<u32>,
    pub stopped: Cell<u32>,
    pub engines: Cell<u32>,
    pub engines_closed: Cell<u32>,
    pub ops: RefCell<Vec<Op>>,
    pub enabled: RefCell<Vec<(MediaKind, bool)>>,
    pub events: RefCell<Vec<EngineEvents<String>>>,
    pub fail_acquire: RefCell<Option<MediaError>>,
    pub fail_remote_description: Cell<bool>,
    pub acquire_gate: RefCell<Option<oneshot::Receiver<()>>>,
    pub offer_gate: RefCell<Option<oneshot::Receiver<()>>>,
}

impl MediaLog {
    /// Returns the operations done with the engines so far.
    pub fn ops(&self) -> Vec<Op> {
        self.ops.borrow().clone()
    }

    /// Returns the events sender of the latest engine.
    pub fn last_events(&self) -> EngineEvents<String> {
        self.events.borrow().last().cloned().unwrap()
    }

    /// Makes the next acquisition wait until the returned sender fires.
    pub fn hold_acquisition(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.acquire_gate.replace(Some(rx));
        tx
    }

    /// Makes the next offer creation wait until the returned sender fires.
    pub fn hold_offer(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.offer_gate.replace(Some(rx));
        tx
    }
}

/// [`MediaCapability`] handing out [`FakeTracks`] and [`FakeEngine`]s.
#[derive(Clone, Default)]
pub struct FakeMedia(pub Rc<MediaLog>);

pub struct FakeTracks {
    kind: CallKind,
    log: Rc<MediaLog>,
}

impl LocalTracks for FakeTracks {
    fn set_enabled(&self, kind: MediaKind, enabled: bool) -> bool {
        if self.kind.includes(kind) {
            self.log.enabled.borrow_mut().push((kind, enabled));
            true
        } else {
            false
        }
    }

    fn stop(&self) {
        self.log.stopped.set(self.log.stopped.get() + 1);
    }
}

/// Engine failing every operation once closed, as browsers do.
pub struct FakeEngine {
    log: Rc<MediaLog>,
    closed: Cell<bool>,
}

impl FakeEngine {
    fn ensure_open(&self) -> Result<(), huddle::platform::Error> {
        if self.closed.get() {
            Err(huddle::platform::Error::new(
                "InvalidStateError",
                "connection is closed",
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait(?Send)]
impl NegotiationEngine for FakeEngine {
    type Tracks = FakeTracks;

    fn add_local_tracks(
        &self,
        _: &FakeTracks,
    ) -> Result<(), Traced<NegotiationError>> {
        Ok(())
    }

    async fn create_offer(
        &self,
    ) -> Result<SessionDescription, Traced<NegotiationError>> {
        let gate = self.log.offer_gate.borrow_mut().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.ensure_open()
            .map_err(NegotiationError::CreateOffer)
            .map_err(tracerr::wrap!())?;
        Ok(SessionDescription::offer("v=0 offer"))
    }

    async fn create_answer(
        &self,
    ) -> Result<SessionDescription, Traced<NegotiationError>> {
        self.ensure_open()
            .map_err(NegotiationError::CreateAnswer)
            .map_err(tracerr::wrap!())?;
        Ok(SessionDescription::answer("v=0 answer"))
    }

    async fn set_local_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), Traced<NegotiationError>> {
        self.ensure_open()
            .map_err(NegotiationError::SetLocalDescription)
            .map_err(tracerr::wrap!())?;
        self.log.ops.borrow_mut().push(Op::SetLocal(desc.kind));
        Ok(())
    }

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), Traced<NegotiationError>> {
        if self.log.fail_remote_description.get() {
            return Err(tracerr::new!(
                NegotiationError::SetRemoteDescription(
                    huddle::platform::Error::new("InvalidStateError", "nope")
                )
            ));
        }
        self.log.ops.borrow_mut().push(Op::SetRemote(desc.kind));
        Ok(())
    }

    async fn add_ice_candidate(
        &self,
        candidate: IceCandidate,
    ) -> Result<(), Traced<NegotiationError>> {
        self.log
            .ops
            .borrow_mut()
            .push(Op::AddCandidate(candidate.candidate));
        Ok(())
    }

    fn close(&self) {
        self.closed.set(true);
        self.log.engines_closed.set(self.log.engines_closed.get() + 1);
    }
}

#[async_trait(?Send)]
impl MediaCapability for FakeMedia {
    type Tracks = FakeTracks;
    type RemoteTrack = String;
    type Engine = FakeEngine;

    async fn acquire_local_media(
        &self,
        kind: CallKind,
    ) -> Result<FakeTracks, Traced<MediaError>> {
        let gate = self.0.acquire_gate.borrow_mut().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if let Some(err) = self.0.fail_acquire.borrow_mut().take() {
            return Err(tracerr::new!(err));
        }
        self.0.acquired.set(self.0.acquired.get() + 1);
        Ok(FakeTracks {
            kind,
            log: Rc::clone(&self.0),
        })
    }

    fn create_negotiation_engine(
        &self,
        _: &[IceServer],
        events: EngineEvents<String>,
    ) -> Result<FakeEngine, Traced<NegotiationError>> {
        self.0.engines.set(self.0.engines.get() + 1);
        self.0.events.borrow_mut().push(events);
        Ok(FakeEngine {
            log: Rc::clone(&self.0),
            closed: Cell::new(false),
        })
    }
}

pub fn candidate(n: u16) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{} 1 udp 2122260223 10.0.0.{}", n, n),
        sdp_m_line_index: Some(0),
        sdp_mid: Some("0".into()),
    }
}

/// [`Room`] of the `local` participant wired to fakes and driven by a
/// [`LocalPool`].
pub struct Harness {
    pub pool: LocalPool,
    pub channel: Rc<FakeChannel>,
    pub media: Rc<MediaLog>,
    pub room: Room<FakeMedia>,
    events: LocalBoxStream<'static, RoomEvent<String>>,
}

impl Harness {
    pub fn new(local: &str) -> Self {
        use futures::task::LocalSpawnExt as _;

        let pool = LocalPool::new();
        let channel = FakeChannel::new();
        let media = FakeMedia::default();
        let room = Room::new(
            UserId::from(local),
            Rc::clone(&channel) as Rc<dyn SignalingChannel>,
            media.clone(),
            CallSettings::default(),
        );
        let events = room.on_event();
        pool.spawner().spawn_local(room.run()).unwrap();

        Self {
            pool,
            channel,
            media: media.0,
            room,
            events,
        }
    }

    /// Same as [`Harness::new()`] with everybody provided in the room.
    pub fn with_online(local: &str, online: &[&str]) -> Self {
        let mut this = Self::new(local);
        this.deliver(ServerMsg::Join {
            user: Some(local.into()),
            online: online.iter().map(|u| UserId::from(*u)).collect(),
        });
        this.events();
        this
    }

    /// Relays the provided message and lets the room handle it.
    pub fn deliver(&mut self, msg: ServerMsg) {
        self.channel.deliver(msg);
        self.pool.run_until_stalled();
    }

    /// Returns the events emitted since the previous call.
    pub fn events(&mut self) -> Vec<RoomEvent<String>> {
        self.pool.run_until_stalled();
        let mut events = Vec::new();
        while let Some(Some(event)) = self.events.next().now_or_never() {
            events.push(event);
        }
        events
    }
}
