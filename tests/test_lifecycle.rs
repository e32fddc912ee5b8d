//! End-to-end lifecycle: a multi-phase connect sequence driven entirely by
//! delayed completion messages, plus configuration failure modes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_hsm::{HsmError, Machine, Message, State, StateMachine, StateRef, Status};

const ACTIVATE: u32 = 1;
const CONN1_DONE: u32 = 10;
const CONN2_DONE: u32 = 11;

const STEP_DELAY: Duration = Duration::from_millis(30);

struct Ctx {
    events: Arc<Mutex<Vec<String>>>,
    connected: mpsc::UnboundedSender<()>,
}

impl Ctx {
    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

struct Root;

impl State<Ctx> for Root {
    fn name(&self) -> &'static str {
        "Root"
    }
}

struct Inactive {
    connecting1: StateRef<Ctx>,
}

impl State<Ctx> for Inactive {
    fn name(&self) -> &'static str {
        "Inactive"
    }

    fn enter(&self, machine: &mut Machine<Ctx>) {
        machine.context.record("enter:Inactive".into());
    }

    fn exit(&self, machine: &mut Machine<Ctx>) {
        machine.context.record("exit:Inactive".into());
    }

    fn handle(&self, machine: &mut Machine<Ctx>, msg: &Message) -> Status {
        match msg.what {
            ACTIVATE => {
                machine.transition_to(&self.connecting1);
                Status::Handled
            }
            _ => Status::Unhandled,
        }
    }
}

struct Active;

impl State<Ctx> for Active {
    fn name(&self) -> &'static str {
        "Active"
    }

    fn enter(&self, machine: &mut Machine<Ctx>) {
        machine.context.record("enter:Active".into());
    }
}

/// Shared parent of the connect steps: advances to the next step whenever a
/// step posts its completion message.
struct Connecting {
    connecting2: StateRef<Ctx>,
    connecting3: StateRef<Ctx>,
}

impl State<Ctx> for Connecting {
    fn name(&self) -> &'static str {
        "Connecting"
    }

    fn enter(&self, machine: &mut Machine<Ctx>) {
        machine.context.record("enter:Connecting".into());
    }

    fn handle(&self, machine: &mut Machine<Ctx>, msg: &Message) -> Status {
        match msg.what {
            CONN1_DONE => {
                machine.transition_to(&self.connecting2);
                Status::Handled
            }
            CONN2_DONE => {
                machine.transition_to(&self.connecting3);
                Status::Handled
            }
            _ => Status::Unhandled,
        }
    }
}

/// A timed connect step: arms its completion timer on enter and disarms it
/// on exit so a stale completion can never fire after the step was left.
struct ConnectStep {
    name: &'static str,
    done: u32,
}

impl State<Ctx> for ConnectStep {
    fn name(&self) -> &'static str {
        self.name
    }

    fn enter(&self, machine: &mut Machine<Ctx>) {
        machine.context.record(format!("enter:{}", self.name));
        machine.send_delayed(Message::new(self.done), STEP_DELAY);
    }

    fn exit(&self, machine: &mut Machine<Ctx>) {
        machine.context.record(format!("exit:{}", self.name));
        machine.remove_pending(self.done);
    }
}

struct Connected3;

impl State<Ctx> for Connected3 {
    fn name(&self) -> &'static str {
        "Connecting3"
    }

    fn enter(&self, machine: &mut Machine<Ctx>) {
        machine.context.record("enter:Connecting3".into());
        let _ = machine.context.connected.send(());
    }
}

#[tokio::test]
async fn connect_sequence_advances_through_timed_steps_without_external_input() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let (connected_tx, mut connected_rx) = mpsc::unbounded_channel();
    let mut sm = StateMachine::new(Ctx {
        events: events.clone(),
        connected: connected_tx,
    });

    let root: StateRef<Ctx> = Arc::new(Root);
    let active: StateRef<Ctx> = Arc::new(Active);
    let connecting1: StateRef<Ctx> = Arc::new(ConnectStep {
        name: "Connecting1",
        done: CONN1_DONE,
    });
    let connecting2: StateRef<Ctx> = Arc::new(ConnectStep {
        name: "Connecting2",
        done: CONN2_DONE,
    });
    let connecting3: StateRef<Ctx> = Arc::new(Connected3);
    let connecting: StateRef<Ctx> = Arc::new(Connecting {
        connecting2: connecting2.clone(),
        connecting3: connecting3.clone(),
    });
    let inactive: StateRef<Ctx> = Arc::new(Inactive {
        connecting1: connecting1.clone(),
    });

    sm.register(root.clone(), None).unwrap();
    sm.register(inactive.clone(), Some(&root)).unwrap();
    sm.register(active.clone(), Some(&root)).unwrap();
    sm.register(connecting.clone(), Some(&active)).unwrap();
    sm.register(connecting1.clone(), Some(&connecting)).unwrap();
    sm.register(connecting2.clone(), Some(&connecting)).unwrap();
    sm.register(connecting3.clone(), Some(&connecting)).unwrap();
    sm.set_initial_state(&inactive);

    let handle = sm.start_on(&tokio::runtime::Handle::current()).unwrap();
    assert_eq!(handle.current_state().await.unwrap().name(), "Inactive");

    handle.send(Message::new(ACTIVATE)).unwrap();
    tokio::time::timeout(Duration::from_secs(2), connected_rx.recv())
        .await
        .expect("connect sequence stalled")
        .expect("machine dropped the connected signal");

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "enter:Inactive",
            "exit:Inactive",
            "enter:Active",
            "enter:Connecting",
            "enter:Connecting1",
            "exit:Connecting1",
            "enter:Connecting2",
            "exit:Connecting2",
            "enter:Connecting3",
        ]
    );

    assert_eq!(handle.current_state().await.unwrap().name(), "Connecting3");
    for state in [&connecting3, &connecting, &active, &root] {
        assert!(handle.is_active(state).await.unwrap());
    }
    assert!(!handle.is_active(&inactive).await.unwrap());
    assert!(
        !handle.has_pending(CONN1_DONE).await.unwrap(),
        "step timers are disarmed on exit"
    );
    assert!(!handle.has_pending(CONN2_DONE).await.unwrap());
}

struct Named(&'static str);

impl State<()> for Named {
    fn name(&self) -> &'static str {
        self.0
    }
}

#[test]
fn duplicate_registration_fails_before_start() {
    let root: StateRef<()> = Arc::new(Named("Root"));
    let other: StateRef<()> = Arc::new(Named("Other"));
    let mut sm = StateMachine::new(());
    sm.register(root.clone(), None).unwrap();
    sm.register(other.clone(), None).unwrap();

    let err = sm.register(root.clone(), Some(&other)).unwrap_err();
    assert!(matches!(err, HsmError::DuplicateState("Root")));
}

#[test]
fn starting_without_an_initial_state_fails() {
    let root: StateRef<()> = Arc::new(Named("Root"));
    let mut sm = StateMachine::new(());
    sm.register(root, None).unwrap();

    assert!(matches!(
        sm.start().unwrap_err(),
        HsmError::MissingInitialState
    ));
}

#[test]
fn starting_with_an_unregistered_initial_state_fails() {
    let root: StateRef<()> = Arc::new(Named("Root"));
    let stray: StateRef<()> = Arc::new(Named("Stray"));
    let mut sm = StateMachine::new(());
    sm.register(root, None).unwrap();
    sm.set_initial_state(&stray);

    assert!(matches!(
        sm.start().unwrap_err(),
        HsmError::UnknownState("Stray")
    ));
}

#[test]
fn operations_fail_with_closed_once_the_worker_is_gone() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let root: StateRef<()> = Arc::new(Named("Root"));
    let mut sm = StateMachine::new(());
    sm.register(root.clone(), None).unwrap();
    sm.set_initial_state(&root);
    let handle = sm.start_on(rt.handle()).unwrap();
    assert_eq!(format!("{handle:?}"), "MachineHandle { .. }");

    assert_eq!(handle.blocking_current_state().unwrap().name(), "Root");

    // Dropping the runtime kills the worker task.
    drop(rt);

    assert!(matches!(
        handle.send(Message::new(1)),
        Err(HsmError::Closed)
    ));
    assert!(matches!(
        handle.blocking_current_state(),
        Err(HsmError::Closed)
    ));
    assert!(matches!(handle.blocking_has_pending(1), Err(HsmError::Closed)));
}
