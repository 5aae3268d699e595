// Integration tests for the manager and the local dispatch loop.

use troupe_actor::{
    define_message, kind, Actor, ActorContext, ActorRef, DispatchTable,
    Error, Manager, Placement, Shutdown, Start,
};

use serde::{Deserialize, Serialize};
use tracing_test::traced_test;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// Application messages for the ping pong pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingMsg {
    pub n: u64,
}
define_message!(PingMsg, 150);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PongMsg {
    pub n: u64,
}
define_message!(PongMsg, 151);

// Ping drives the exchange: on Start it sends PingMsg(1) to pong, and it
// resends until five rounds are done, then shuts the manager down.
pub struct Ping {
    rounds: Arc<AtomicU64>,
}

impl Ping {
    fn on_start(
        &mut self,
        _msg: Start,
        ctx: &mut ActorContext<'_>,
    ) -> Result<(), Error> {
        let pong = ctx.manager().get_actor_by_name("pong")?;
        pong.send(PingMsg { n: 1 }, ctx.self_ref());
        Ok(())
    }

    fn on_pong(
        &mut self,
        msg: PongMsg,
        ctx: &mut ActorContext<'_>,
    ) -> Result<(), Error> {
        self.rounds.store(msg.n, Ordering::SeqCst);
        if msg.n >= 5 {
            ctx.manager().manager_ref().send(Shutdown, ctx.self_ref());
            ctx.terminate();
        } else {
            ctx.sender().send(PingMsg { n: msg.n + 1 }, ctx.self_ref());
        }
        Ok(())
    }
}

impl Actor for Ping {
    fn name(&self) -> &str {
        "ping"
    }

    fn register_handlers(&self, table: &mut DispatchTable<Self>) {
        table.on::<Start>(kind::START, Self::on_start);
        table.on::<PongMsg>(151, Self::on_pong);
    }
}

// Pong echoes every ping back to its sender.
pub struct Pong;

impl Pong {
    fn on_start(
        &mut self,
        _msg: Start,
        _ctx: &mut ActorContext<'_>,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn on_ping(
        &mut self,
        msg: PingMsg,
        ctx: &mut ActorContext<'_>,
    ) -> Result<(), Error> {
        ctx.reply(PongMsg { n: msg.n });
        Ok(())
    }
}

impl Actor for Pong {
    fn name(&self) -> &str {
        "pong"
    }

    fn register_handlers(&self, table: &mut DispatchTable<Self>) {
        table.on::<Start>(kind::START, Self::on_start);
        table.on::<PingMsg>(150, Self::on_ping);
    }
}

#[test]
fn test_local_ping_pong() {
    let rounds = Arc::new(AtomicU64::new(0));
    let manager = Manager::new("ping-pong-manager");
    manager
        .manage(Ping {
            rounds: rounds.clone(),
        })
        .unwrap();
    manager.manage(Pong).unwrap();

    manager.init();
    // Blocks until ping delivers Shutdown after the fifth round.
    manager.run();
    manager.end();

    assert_eq!(rounds.load(Ordering::SeqCst), 5);

    // Both actors dispatched Start plus five application messages.
    let counts = manager.message_counts();
    let (_, ping_count) = counts["ping"];
    let (_, pong_count) = counts["pong"];
    assert!(ping_count >= 5, "ping dispatched {ping_count} messages");
    assert!(pong_count >= 5, "pong dispatched {pong_count} messages");
}

#[test]
fn test_duplicate_name_is_rejected() {
    let manager = Manager::new("dup-manager");
    manager.manage(Pong).unwrap();
    let result = manager.manage(Pong);
    assert!(matches!(result, Err(Error::Precondition(_))));
    // The first registration is untouched.
    assert_eq!(manager.managed_names(), vec!["pong".to_owned()]);
}

#[test]
fn test_bad_affinity_is_a_precondition_violation() {
    let manager = Manager::new("affinity-manager");
    let result = manager.manage_with(Pong, Placement::pinned([9999]));
    assert!(matches!(result, Err(Error::Precondition(_))));
    // No actor was stored, so init spawns no thread for it.
    assert!(manager.managed_names().is_empty());
    manager.init();
    manager.terminate_all();
    manager.end();
}

#[test]
fn test_unknown_name_without_registry() {
    let manager = Manager::new("lookup-manager");
    manager.manage(Pong).unwrap();
    assert!(manager.get_local_actor("pong").is_local());
    assert!(manager.get_local_actor("nobody").is_null());
    let result = manager.get_actor_by_name("nobody");
    assert_eq!(result.unwrap_err(), Error::NotFound("nobody".to_owned()));
    manager.terminate_all();
    manager.end();
}

// Collector records the payloads it receives, in dispatch order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumMsg {
    pub n: u64,
}
define_message!(NumMsg, 152);

pub struct Collector {
    seen: Arc<Mutex<Vec<u64>>>,
}

impl Collector {
    fn on_num(
        &mut self,
        msg: NumMsg,
        _ctx: &mut ActorContext<'_>,
    ) -> Result<(), Error> {
        self.seen.lock().unwrap().push(msg.n);
        Ok(())
    }
}

impl Actor for Collector {
    fn name(&self) -> &str {
        "collector"
    }

    fn register_handlers(&self, table: &mut DispatchTable<Self>) {
        table.on::<NumMsg>(152, Self::on_num);
    }
}

#[test]
fn test_fifo_per_actor() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let manager = Manager::new("fifo-manager");
    manager.manage(Collector { seen: seen.clone() }).unwrap();
    manager.init();

    let target = manager.get_local_actor("collector");
    for n in 0..100u64 {
        target.send(NumMsg { n }, ActorRef::Null);
    }

    // Wait for the dispatch loop to drain the mailbox.
    let deadline = Instant::now() + Duration::from_secs(5);
    while seen.lock().unwrap().len() < 100 {
        assert!(Instant::now() < deadline, "collector did not drain in time");
        std::thread::sleep(Duration::from_millis(10));
    }

    manager.terminate_all();
    manager.end();

    let seen = seen.lock().unwrap();
    let expected: Vec<u64> = (0..100).collect();
    assert_eq!(*seen, expected);
}

// Echo replies to every request through the fast send reply slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoMsg {
    pub n: u64,
}
define_message!(EchoMsg, 153);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoedMsg {
    pub n: u64,
}
define_message!(EchoedMsg, 154);

pub struct Echo;

impl Echo {
    fn on_echo(
        &mut self,
        msg: EchoMsg,
        ctx: &mut ActorContext<'_>,
    ) -> Result<(), Error> {
        ctx.reply(EchoedMsg { n: msg.n });
        Ok(())
    }
}

impl Actor for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn register_handlers(&self, table: &mut DispatchTable<Self>) {
        table.on::<EchoMsg>(153, Self::on_echo);
    }
}

#[test]
fn test_fast_send_replies_are_not_crossed() {
    let manager = Manager::new("echo-manager");
    manager.manage(Echo).unwrap();
    manager.init();

    let target = manager.get_local_actor("echo");
    let mut workers = Vec::new();
    for base in [1000u64, 2000u64] {
        let target = target.clone();
        workers.push(std::thread::spawn(move || {
            for j in 0..20 {
                let n = base + j;
                let reply = target
                    .fast_send(EchoMsg { n }, ActorRef::Null)
                    .unwrap()
                    .expect("echo reply missing");
                let echoed = reply.downcast::<EchoedMsg>().unwrap();
                // Every caller receives its own reply.
                assert_eq!(echoed.n, n);
            }
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }

    manager.terminate_all();
    manager.end();
}

#[test]
fn test_fast_send_to_null_fails() {
    let result = ActorRef::Null.fast_send(EchoMsg { n: 1 }, ActorRef::Null);
    let error = match result {
        Err(e) => e,
        Ok(_) => panic!("expected fast_send to Null to fail"),
    };
    assert_eq!(error, Error::NoTarget);
}

// Finisher records that its end hook ran during shutdown.
pub struct Finisher {
    ended: Arc<AtomicBool>,
}

impl Actor for Finisher {
    fn name(&self) -> &str {
        "finisher"
    }

    fn end(&mut self) {
        self.ended.store(true, Ordering::SeqCst);
    }
}

#[test]
#[traced_test]
fn test_shutdown_stops_every_loop() {
    let ended = Arc::new(AtomicBool::new(false));
    let manager = Manager::new("shutdown-manager");
    manager
        .manage(Finisher {
            ended: ended.clone(),
        })
        .unwrap();
    manager.init();

    manager.manager_ref().send(Shutdown, ActorRef::Null);
    manager.run();
    manager.end();

    // After Shutdown every loop has exited and the end hook has run.
    assert!(ended.load(Ordering::SeqCst));
    assert!(logs_contain("Manager shutdown-manager shutting down."));
}

#[test]
fn test_queue_length_observability() {
    let manager = Manager::new("metrics-manager");
    manager.manage(Collector { seen: Arc::new(Mutex::new(Vec::new())) }).unwrap();

    // Before init nothing consumes, so pushes accumulate.
    let target = manager.get_local_actor("collector");
    for n in 0..4u64 {
        target.send(NumMsg { n }, ActorRef::Null);
    }
    assert_eq!(manager.total_queue_length(), 4);
    assert_eq!(manager.queue_lengths()["collector"], 4);

    manager.init();
    manager.terminate_all();
    manager.end();
}
