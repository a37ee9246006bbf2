//! Shared fixtures for actor runtime integration tests
//!
//! Demo actors plus an in-process client that speaks the wire protocol over
//! a [`ChannelDriver`].

#![allow(dead_code)]

use actor_runtime::{
    ActionRegistry, Actor, ActorContext, ActorError, ActorHandle, BoxFuture, ChannelDriver,
    ConnectRequest, Connection, DriverEvent, Manager, MemoryPersistence, Result,
};
use codec::{Encoding, ErrorFrame, Event, Frame, ToClient, ToClientBody, ToServer};
use config::RuntimeConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use types::{ActorQuery, NodeId};

// ---------------------------------------------------------------------------
// Counter
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CounterState {
    pub count: i64,
}

pub struct Counter;

fn increment<'a>(ctx: &'a mut ActorContext<Counter>, args: Vec<Value>) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
        let by = args
            .first()
            .and_then(Value::as_i64)
            .ok_or_else(|| ActorError::user_with("invalid_argument", "increment expects an integer", None))?;
        ctx.state_mut().count += by;
        let count = ctx.state().count;
        ctx.broadcast("countChanged", vec![json!(count)]);
        Ok(json!(count))
    })
}

fn get_count<'a>(ctx: &'a mut ActorContext<Counter>, _args: Vec<Value>) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move { Ok(json!(ctx.state().count)) })
}

/// Announced to everyone, subscribed or not
fn reset<'a>(ctx: &'a mut ActorContext<Counter>, _args: Vec<Value>) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
        ctx.state_mut().count = 0;
        ctx.broadcast_all("countReset", vec![json!(0)]);
        Ok(json!(0))
    })
}

impl Actor for Counter {
    type State = CounterState;
    type Vars = ();

    fn actions(&self) -> ActionRegistry<Self> {
        ActionRegistry::new()
            .action("increment", increment)
            .action("getCount", get_count)
            .action("reset", reset)
    }

    fn create_state(&self, input: Option<&Value>) -> Result<Self::State> {
        let count = input
            .and_then(|input| input.get("start"))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        Ok(CounterState { count })
    }

    fn create_vars(&self) -> Self::Vars {}
}

// ---------------------------------------------------------------------------
// Slow actor
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SlowState {
    pub completed: u32,
}

pub struct Slow;

fn sleep<'a>(ctx: &'a mut ActorContext<Slow>, args: Vec<Value>) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
        let ms = args.first().and_then(Value::as_u64).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        ctx.state_mut().completed += 1;
        Ok(json!(ctx.state().completed))
    })
}

fn completed<'a>(ctx: &'a mut ActorContext<Slow>, _args: Vec<Value>) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move { Ok(json!(ctx.state().completed)) })
}

fn fail<'a>(_ctx: &'a mut ActorContext<Slow>, args: Vec<Value>) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
        match args.first().and_then(Value::as_str) {
            Some("internal") => Err(ActorError::internal("database password is hunter2")),
            _ => Err(ActorError::user_with(
                "not_allowed",
                "You cannot do that",
                Some(json!({"hint": "ask nicely"})),
            )),
        }
    })
}

impl Actor for Slow {
    type State = SlowState;
    type Vars = ();

    fn actions(&self) -> ActionRegistry<Self> {
        ActionRegistry::new()
            .action("sleep", sleep)
            .action("completed", completed)
            .action("fail", fail)
    }

    fn create_state(&self, _input: Option<&Value>) -> Result<Self::State> {
        Ok(SlowState::default())
    }

    fn create_vars(&self) -> Self::Vars {}
}

// ---------------------------------------------------------------------------
// Tracker: hooks, auth, alarms, per-caller sends
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TrackerState {
    pub rings: u32,
    pub created_with: Option<Value>,
}

/// Observes hook invocations from outside the actor
#[derive(Debug, Default)]
pub struct HookCounts {
    pub creates: AtomicU32,
    pub starts: AtomicU32,
    pub stops: AtomicU32,
    pub connects: AtomicU32,
    pub disconnects: AtomicU32,
}

impl HookCounts {
    pub fn get(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

pub struct Tracker {
    pub hooks: Arc<HookCounts>,
}

pub struct TrackerVars {
    pub greeting: String,
}

fn remind<'a>(ctx: &'a mut ActorContext<Tracker>, args: Vec<Value>) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
        let delay = args.first().and_then(Value::as_u64).unwrap_or(10);
        let event_id = ctx
            .schedule_after(Duration::from_millis(delay), "ring", vec![json!("alarm")])
            .await?;
        Ok(json!(event_id))
    })
}

fn ring<'a>(ctx: &'a mut ActorContext<Tracker>, _args: Vec<Value>) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
        ctx.state_mut().rings += 1;
        let rings = ctx.state().rings;
        ctx.broadcast("ring", vec![json!(rings)]);
        Ok(json!(rings))
    })
}

fn rings<'a>(ctx: &'a mut ActorContext<Tracker>, _args: Vec<Value>) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move { Ok(json!(ctx.state().rings)) })
}

fn whoami<'a>(ctx: &'a mut ActorContext<Tracker>, _args: Vec<Value>) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
        let auth = ctx
            .caller()
            .map(|conn| conn.auth_data().clone())
            .unwrap_or(Value::Null);
        Ok(json!({"auth": auth, "greeting": ctx.vars().greeting}))
    })
}

fn notify_me<'a>(ctx: &'a mut ActorContext<Tracker>, args: Vec<Value>) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move { Ok(json!(ctx.send_to_caller("private", args))) })
}

#[async_trait::async_trait]
impl Actor for Tracker {
    type State = TrackerState;
    type Vars = TrackerVars;

    fn actions(&self) -> ActionRegistry<Self> {
        ActionRegistry::new()
            .action("remind", remind)
            .action("ring", ring)
            .action("rings", rings)
            .action("whoami", whoami)
            .action("notifyMe", notify_me)
    }

    fn create_state(&self, input: Option<&Value>) -> Result<Self::State> {
        Ok(TrackerState {
            rings: 0,
            created_with: input.cloned(),
        })
    }

    fn create_vars(&self) -> Self::Vars {
        TrackerVars {
            greeting: "hello".to_string(),
        }
    }

    async fn on_create(&self, _ctx: &mut ActorContext<Self>, _input: Option<&Value>) -> Result<()> {
        self.hooks.creates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_start(&self, _ctx: &mut ActorContext<Self>) -> Result<()> {
        self.hooks.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_stop(&self, _ctx: &mut ActorContext<Self>) -> Result<()> {
        self.hooks.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_auth(&self, params: &Value) -> Result<Value> {
        match params.get("token").and_then(Value::as_str) {
            Some("bad") => Err(ActorError::unauthorized("bad token")),
            Some(token) => Ok(json!({"user": token})),
            None => Ok(json!({"user": "anonymous"})),
        }
    }

    async fn on_connect(&self, _ctx: &mut ActorContext<Self>, conn: &Arc<Connection>) -> Result<()> {
        if conn.params().get("reject").and_then(Value::as_bool) == Some(true) {
            return Err(ActorError::user("room is full"));
        }
        self.hooks.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_disconnect(&self, _ctx: &mut ActorContext<Self>, _conn: &Arc<Connection>) {
        self.hooks.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Config with liveness and timeouts far away unless a test overrides them
pub fn test_config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.lifecycle.connection_liveness_interval_ms = 60_000;
    config.lifecycle.connection_liveness_timeout_ms = 60_000;
    config.action.timeout_ms = 5_000;
    config
}

pub fn manager_with(config: RuntimeConfig, persistence: Arc<MemoryPersistence>, hooks: Arc<HookCounts>) -> Manager {
    Manager::new(NodeId::generate(), persistence, config)
        .register("counter", Counter)
        .register("slow", Slow)
        .register("tracker", Tracker { hooks })
}

/// In-process client speaking the wire protocol
pub struct TestClient {
    pub handle: Arc<dyn ActorHandle>,
    pub conn: Arc<Connection>,
    pub encoding: Encoding,
    rx: UnboundedReceiver<DriverEvent>,
    events: Vec<Event>,
    next_id: u64,
}

impl TestClient {
    pub async fn connect(manager: &Manager, query: &ActorQuery, params: Value) -> Result<Self> {
        Self::connect_with(manager, query, params, Encoding::Json).await
    }

    pub async fn connect_with(
        manager: &Manager,
        query: &ActorQuery,
        params: Value,
        encoding: Encoding,
    ) -> Result<Self> {
        let actor_id = manager.resolve(query, None).await?;
        let handle = manager.instance(&actor_id).await?;
        let (driver, rx) = ChannelDriver::new();
        let conn = handle
            .connect(ConnectRequest::new(params, encoding, driver))
            .await?;
        let mut client = Self {
            handle,
            conn,
            encoding,
            rx,
            events: Vec::new(),
            next_id: 1,
        };
        match client.next_message().await {
            Some(ToClient {
                body: ToClientBody::Init(init),
            }) => {
                assert_eq!(init.connection_id, client.conn.id().as_str());
            }
            other => panic!("expected init frame, got {other:?}"),
        }
        Ok(client)
    }

    /// Next decoded message, `None` once the transport was closed
    pub async fn next_message(&mut self) -> Option<ToClient> {
        match tokio::time::timeout(Duration::from_secs(2), self.rx.recv()).await {
            Ok(Some(DriverEvent::Frame(frame))) => {
                Some(self.encoding.decode(&frame, usize::MAX).expect("server sent undecodable frame"))
            }
            Ok(Some(DriverEvent::Closed { .. })) | Ok(None) => None,
            Err(_) => panic!("timed out waiting for a server frame"),
        }
    }

    /// Drain frames already delivered without waiting
    pub fn drain(&mut self) -> Vec<DriverEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            drained.push(event);
        }
        drained
    }

    pub async fn send_raw(&mut self, frame: Frame) -> Result<()> {
        self.handle.process_message(self.conn.id(), frame).await
    }

    pub async fn send(&mut self, message: &ToServer) -> Result<()> {
        let frame = self.encoding.encode(message)?;
        self.send_raw(frame).await
    }

    pub async fn subscribe(&mut self, event_name: &str) {
        self.send(&ToServer::subscription(event_name, true))
            .await
            .expect("subscription failed");
    }

    /// Call an action and wait for its response, buffering events seen on the way
    pub async fn call(&mut self, name: &str, args: Vec<Value>) -> std::result::Result<Value, ErrorFrame> {
        let id = self.next_id;
        self.next_id += 1;
        self.send(&ToServer::action(id, name, args))
            .await
            .expect("action dispatch failed");

        loop {
            let message = self.next_message().await.expect("connection closed mid-call");
            match message.body {
                ToClientBody::ActionResponse(response) if response.id == id => return Ok(response.output),
                ToClientBody::Error(error) if error.related_action_id == Some(id) => return Err(error),
                ToClientBody::Event(event) => self.events.push(event),
                other => panic!("unexpected frame while waiting for action {id}: {other:?}"),
            }
        }
    }

    /// Events received so far, including ones still queued on the transport
    pub fn take_events(&mut self) -> Vec<Event> {
        for event in self.drain() {
            if let DriverEvent::Frame(frame) = event {
                if let Ok(ToClient {
                    body: ToClientBody::Event(event),
                }) = self.encoding.decode::<ToClient>(&frame, usize::MAX)
                {
                    self.events.push(event);
                }
            }
        }
        std::mem::take(&mut self.events)
    }
}
