//! Port: one physical layer shared by many protocol stacks
//!
//! A [`Port`] owns a physical layer, the scheduler that serializes all work
//! around it and a [`Router`] that multiplexes the associated stacks over
//! it. Stacks are associated under a name and a local address; the router
//! runs exactly while at least one association exists.
//!
//! # Release
//!
//! ```text
//! Active --release, router idle--> Destroyed
//! Active --release, router active--> ReleasePending
//! ReleasePending --Stopped--> Destroyed
//! ```
//!
//! Destroying a port drops its router, physical layer and scheduler. Any
//! completion still in flight then lands on a dead poster and is discarded.
//! Calling into a destroyed port is a contract breach and panics.

use crate::task::{PortCommand, PortTask, ReleaseStatus};
use dnp_core::{
    DnpError, DnpResult, Logger, PhysMonitor, PhysicalState, PortConfig, TaskPoster,
    TaskScheduler, TimerSource,
};
use dnp_link::{Router, RouterStatistics};
use dnp_stack::ProtocolStack;
use dnp_transport::PhysicalLayer;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Lifecycle of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Active,
    /// Release was requested while the router was still active
    ReleasePending,
    Destroyed,
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PortState::Active => "Active",
            PortState::ReleasePending => "ReleasePending",
            PortState::Destroyed => "Destroyed",
        };
        write!(f, "{}", s)
    }
}

// Field order is drop order: the router goes before the physical layer it
// drives, the scheduler last.
struct PortResources {
    router: Router<ProtocolStack>,
    phys: Box<dyn PhysicalLayer>,
    scheduler: TaskScheduler<PortTask>,
}

fn live<'a>(resources: &'a mut Option<PortResources>, name: &str) -> &'a mut PortResources {
    match resources.as_mut() {
        Some(resources) => resources,
        None => panic!("port {} used after it was destroyed", name),
    }
}

/// Physical layer, router and associated stacks
pub struct Port {
    name: String,
    logger: Logger,
    state: PortState,
    observer: Option<Box<dyn PhysMonitor>>,
    associations: HashMap<String, u16>,
    resources: Option<PortResources>,
}

impl Port {
    /// Create a port over `phys`
    ///
    /// The physical layer is not opened until the first association.
    pub fn new(
        config: PortConfig,
        logger: &Logger,
        mut phys: Box<dyn PhysicalLayer>,
        timers: Arc<dyn TimerSource>,
        observer: Option<Box<dyn PhysMonitor>>,
    ) -> Self {
        let mut logger = logger.sub_logger(&config.name);
        logger.set_level(config.filter);

        let scheduler = TaskScheduler::new(config.name.clone());
        let poster = scheduler.poster();
        let mut router = Router::new(
            logger.sub_logger("router"),
            timers,
            config.open_retry,
            poster.map(PortTask::Router),
        );
        let monitor = poster.clone();
        router.set_monitor(Box::new(move |state: PhysicalState| {
            monitor.post(PortTask::StateChange(state));
        }));
        phys.bind(router.event_sink());

        logger.info(format_args!("created over {}", phys.describe()));
        Self {
            name: config.name,
            logger,
            state: PortState::Active,
            observer,
            associations: HashMap::new(),
            resources: Some(PortResources {
                router,
                phys,
                scheduler,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> PortState {
        self.state
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn is_destroyed(&self) -> bool {
        self.state == PortState::Destroyed
    }

    /// Producer handle for this port's scheduler
    pub fn poster(&mut self) -> TaskPoster<PortTask> {
        live(&mut self.resources, &self.name).scheduler.poster()
    }

    pub fn num_associations(&self) -> usize {
        self.associations.len()
    }

    /// Local address of the association called `name`
    pub fn address_of(&self, name: &str) -> Option<u16> {
        self.associations.get(name).copied()
    }

    pub fn is_router_running(&mut self) -> bool {
        live(&mut self.resources, &self.name).router.is_running()
    }

    pub fn router_state(&mut self) -> PhysicalState {
        live(&mut self.resources, &self.name).router.state()
    }

    pub fn statistics(&mut self) -> RouterStatistics {
        live(&mut self.resources, &self.name).router.statistics()
    }

    /// Mutable access to an associated stack
    pub fn stack_mut(&mut self, name: &str) -> Option<&mut ProtocolStack> {
        let address = self.associations.get(name).copied()?;
        live(&mut self.resources, &self.name)
            .router
            .context_mut(address)
    }

    /// Attach `stack` to the router under `address` and record it as `name`
    ///
    /// Starts the router if it is not running.
    pub fn associate(&mut self, name: &str, address: u16, stack: ProtocolStack) -> DnpResult<()> {
        let res = live(&mut self.resources, &self.name);
        if self.state == PortState::ReleasePending {
            return Err(DnpError::InvalidState(format!(
                "port {} is being released",
                self.name
            )));
        }
        if self.associations.contains_key(name) {
            return Err(DnpError::Conflict(format!(
                "stack {} already associated",
                name
            )));
        }
        if stack.local_address() != address {
            return Err(DnpError::InvalidData(format!(
                "stack {} is configured for address {}, not {}",
                name,
                stack.local_address(),
                address
            )));
        }

        self.logger.debug(format_args!(
            "linking stack {} to address {}",
            name, address
        ));
        res.router.add_context(address, stack)?;
        self.associations.insert(name.to_string(), address);

        if !res.router.is_running() {
            self.logger.debug(format_args!("starting router"));
            res.router.start(res.phys.as_mut())?;
        }
        Ok(())
    }

    /// Detach and destroy the stack called `name`
    ///
    /// Stops the router when no association remains.
    pub fn disassociate(&mut self, name: &str) -> DnpResult<()> {
        let res = live(&mut self.resources, &self.name);
        let address = self
            .associations
            .get(name)
            .copied()
            .ok_or_else(|| DnpError::NotFound(format!("no stack named {}", name)))?;

        self.logger.debug(format_args!(
            "unlinking stack {} from address {}",
            name, address
        ));
        // Decoupled from the router before it is dropped.
        let stack = res.router.remove_context(address)?;
        drop(stack);
        self.associations.remove(name);

        if res.router.is_running() && res.router.num_context() == 0 {
            self.logger.debug(format_args!("stopping router"));
            res.router.stop(res.phys.as_mut());
        }
        Ok(())
    }

    /// Send an application fragment through the stack called `name`
    pub fn send(&mut self, name: &str, apdu: &[u8]) -> DnpResult<()> {
        let address = self
            .associations
            .get(name)
            .copied()
            .ok_or_else(|| DnpError::NotFound(format!("no stack named {}", name)))?;
        match live(&mut self.resources, &self.name)
            .router
            .context_mut(address)
        {
            Some(stack) => stack.send(apdu),
            None => Err(DnpError::NotFound(format!("no context at address {}", address))),
        }
    }

    /// Request destruction of the port
    ///
    /// Remaining associations are removed first. If the router still has
    /// the physical layer in use, destruction waits for it to report
    /// [`PhysicalState::Stopped`]; otherwise it happens now.
    pub fn release(&mut self) -> ReleaseStatus {
        live(&mut self.resources, &self.name);
        if self.state == PortState::ReleasePending {
            return ReleaseStatus::Deferred;
        }

        let names: Vec<String> = self.associations.keys().cloned().collect();
        for name in names {
            if let Err(e) = self.disassociate(&name) {
                self.logger
                    .error(format_args!("release could not remove {}: {}", name, e));
            }
        }

        if live(&mut self.resources, &self.name).router.is_active() {
            self.logger
                .info(format_args!("release deferred until router stops"));
            self.state = PortState::ReleasePending;
            ReleaseStatus::Deferred
        } else {
            self.destroy();
            ReleaseStatus::Destroyed
        }
    }

    /// Monitor notification from the router
    pub fn on_state_change(&mut self, state: PhysicalState) {
        let res = live(&mut self.resources, &self.name);
        if let Some(observer) = self.observer.as_mut() {
            observer.on_state_change(state);
        }
        // A Stopped queued before a restart must not destroy an active router.
        if state == PhysicalState::Stopped
            && self.state == PortState::ReleasePending
            && !res.router.is_active()
        {
            self.destroy();
        }
    }

    /// Run every queued task without waiting
    ///
    /// Returns the number of tasks run. Stops early if the port is
    /// destroyed on the way.
    pub fn process_pending(&mut self) -> usize {
        live(&mut self.resources, &self.name);
        let mut count = 0;
        while let Some(task) = self
            .resources
            .as_mut()
            .and_then(|res| res.scheduler.try_next())
        {
            self.handle_task(task);
            count += 1;
        }
        count
    }

    /// Wait for the next task and run it
    ///
    /// Returns `false` once the port has been destroyed.
    pub async fn run_next(&mut self) -> bool {
        let task = match self.resources.as_mut() {
            Some(res) => res.scheduler.next().await,
            None => return false,
        };
        self.handle_task(task);
        !self.is_destroyed()
    }

    fn handle_task(&mut self, task: PortTask) {
        match task {
            PortTask::Router(task) => {
                let res = live(&mut self.resources, &self.name);
                res.router.handle_task(task, res.phys.as_mut());
            }
            PortTask::StateChange(state) => self.on_state_change(state),
            PortTask::Command(command) => self.on_command(command),
        }
    }

    fn on_command(&mut self, command: PortCommand) {
        self.logger
            .debug(format_args!("{} command", command.as_str()));
        // A caller that stopped waiting is not an error.
        match command {
            PortCommand::Associate {
                name,
                address,
                stack,
                reply,
            } => {
                let _ = reply.send(self.associate(&name, address, stack));
            }
            PortCommand::Disassociate { name, reply } => {
                let _ = reply.send(self.disassociate(&name));
            }
            PortCommand::Send { name, apdu, reply } => {
                let _ = reply.send(self.send(&name, &apdu));
            }
            PortCommand::Statistics { reply } => {
                let _ = reply.send(self.statistics());
            }
            PortCommand::Release { reply } => {
                let _ = reply.send(self.release());
            }
        }
    }

    fn destroy(&mut self) {
        let Some(mut res) = self.resources.take() else {
            return;
        };
        // Notifications already queued still reach the observer; commands
        // are dropped and their callers see the port as closed.
        while let Some(task) = res.scheduler.try_next() {
            if let PortTask::StateChange(state) = task {
                if let Some(observer) = self.observer.as_mut() {
                    observer.on_state_change(state);
                }
            }
        }
        drop(res);
        self.associations.clear();
        self.state = PortState::Destroyed;
        self.logger.info(format_args!("destroyed"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use dnp_core::{MockTimerSource, StateRecorder};
    use dnp_link::LinkFrame;
    use dnp_stack::{AppProbe, LinkConfig, MockAppLayer, StackConfig};
    use dnp_transport::{MockPhysicalHandle, MockPhysicalLayer};
    use std::time::Duration;

    const MASTER: u16 = 100;

    struct Fixture {
        port: Port,
        line: MockPhysicalHandle,
        timers: MockTimerSource,
        observer: StateRecorder,
    }

    fn fixture(auto_complete: bool) -> Fixture {
        let (phys, line) = if auto_complete {
            MockPhysicalLayer::auto_complete()
        } else {
            MockPhysicalLayer::new()
        };
        let timers = MockTimerSource::new();
        let observer = StateRecorder::new();
        let port = Port::new(
            PortConfig::new("test").with_open_retry(Duration::from_secs(2)),
            &Logger::default(),
            Box::new(phys),
            Arc::new(timers.clone()),
            Some(Box::new(observer.clone())),
        );
        Fixture {
            port,
            line,
            timers,
            observer,
        }
    }

    fn stack(address: u16) -> (ProtocolStack, AppProbe) {
        let (app, probe) = MockAppLayer::new();
        let config = StackConfig::new(LinkConfig::outstation(address, MASTER));
        (
            ProtocolStack::new(config, Box::new(app), Logger::default()),
            probe,
        )
    }

    fn from_master(dest: u16) -> Bytes {
        // Single segment fragment: FIR | FIN, then a two byte APDU
        LinkFrame::unconfirmed(true, dest, MASTER, vec![0xC0, 0xC0, 0x01])
            .encode()
            .unwrap()
    }

    #[test]
    fn test_scenario_feeders_share_one_router() {
        let mut f = fixture(true);
        let (west, west_app) = stack(4);
        let (east, east_app) = stack(7);

        f.port.associate("west-feeder", 4, west).unwrap();
        assert!(f.port.is_router_running());
        f.port.process_pending();
        assert_eq!(
            f.observer.states(),
            vec![PhysicalState::Opening, PhysicalState::Open]
        );
        assert!(west_app.is_online());

        f.port.associate("east-feeder", 7, east).unwrap();
        f.port.process_pending();
        assert!(f.port.is_router_running());
        assert_eq!(f.line.num_opens(), 1);
        assert!(east_app.is_online());

        f.port.disassociate("west-feeder").unwrap();
        f.port.process_pending();
        assert!(f.port.is_router_running());
        assert!(west_app.is_dropped());
        assert!(!east_app.is_dropped());

        f.port.disassociate("east-feeder").unwrap();
        assert!(!f.port.is_router_running());
        f.port.process_pending();
        assert_eq!(
            f.observer.states(),
            vec![
                PhysicalState::Opening,
                PhysicalState::Open,
                PhysicalState::Closing,
                PhysicalState::Stopped,
            ]
        );
        assert_eq!(f.port.state(), PortState::Active);
    }

    #[test]
    fn test_scenario_release_waits_for_stopped() {
        let mut f = fixture(false);
        let (s, app) = stack(4);
        f.port.associate("feeder", 4, s).unwrap();
        f.line.complete_open();
        f.port.process_pending();

        assert_eq!(f.port.release(), ReleaseStatus::Deferred);
        assert_eq!(f.port.state(), PortState::ReleasePending);
        assert!(app.is_dropped());
        f.port.process_pending();
        assert!(!f.line.is_dropped());
        assert!(f.line.is_closing());

        f.line.complete_close();
        f.port.process_pending();
        assert!(f.port.is_destroyed());
        assert!(f.line.is_dropped());
        assert_eq!(f.observer.count(PhysicalState::Stopped), 1);
        assert_eq!(f.observer.last(), Some(PhysicalState::Stopped));

        // Late completions have nowhere to go.
        assert!(!f.line.complete_close());
        assert_eq!(f.observer.count(PhysicalState::Stopped), 1);
    }

    #[test]
    fn test_scenario_duplicate_address_conflicts() {
        let mut f = fixture(true);
        let (first, first_app) = stack(4);
        let (second, second_app) = stack(4);

        f.port.associate("first", 4, first).unwrap();
        let err = f.port.associate("second", 4, second).unwrap_err();
        assert!(err.is_conflict());
        assert!(second_app.is_dropped());
        assert_eq!(f.port.num_associations(), 1);
        assert_eq!(f.port.address_of("second"), None);

        f.port.process_pending();
        f.line.receive(from_master(4));
        f.port.process_pending();
        assert_eq!(first_app.received(), vec![Bytes::from_static(&[0xC0, 0x01])]);
    }

    #[test]
    fn test_scenario_unknown_address_dropped() {
        let mut f = fixture(true);
        let (s, app) = stack(4);
        f.port.associate("feeder", 4, s).unwrap();
        f.port.process_pending();

        f.line.receive(from_master(42));
        f.port.process_pending();
        assert!(app.received().is_empty());
        assert_eq!(f.port.statistics().frames_dropped, 1);
        assert!(f.port.is_router_running());
    }

    #[test]
    fn test_duplicate_name_conflicts() {
        let mut f = fixture(true);
        let (a, _) = stack(4);
        let (b, _) = stack(5);
        f.port.associate("feeder", 4, a).unwrap();
        assert!(f.port.associate("feeder", 5, b).unwrap_err().is_conflict());
        assert_eq!(f.port.address_of("feeder"), Some(4));
        assert_eq!(f.port.num_associations(), 1);
    }

    #[test]
    fn test_unknown_name_not_found() {
        let mut f = fixture(true);
        let (a, _) = stack(4);
        f.port.associate("feeder", 4, a).unwrap();
        assert!(f.port.disassociate("missing").unwrap_err().is_not_found());
        assert_eq!(f.port.num_associations(), 1);
        assert!(f.port.is_router_running());
    }

    #[test]
    fn test_running_iff_associations() {
        let mut f = fixture(true);
        let steps: &[(&str, bool)] = &[
            ("a", true),
            ("b", true),
            ("a", false),
            ("c", true),
            ("b", false),
            ("c", false),
            ("a", true),
            ("a", false),
        ];
        let mut next_address = 10;
        for &(name, add) in steps {
            if add {
                let (s, _) = stack(next_address);
                f.port.associate(name, next_address, s).unwrap();
                next_address += 1;
            } else {
                f.port.disassociate(name).unwrap();
            }
            assert_eq!(f.port.is_router_running(), f.port.num_associations() > 0);
            f.port.process_pending();
            assert_eq!(f.port.is_router_running(), f.port.num_associations() > 0);
        }
    }

    #[test]
    fn test_reassociate_while_closing_restarts() {
        let mut f = fixture(false);
        let (a, _) = stack(4);
        f.port.associate("a", 4, a).unwrap();
        f.line.complete_open();
        f.port.process_pending();

        f.port.disassociate("a").unwrap();
        let (b, b_app) = stack(5);
        f.port.associate("b", 5, b).unwrap();
        assert!(f.port.is_router_running());

        f.line.complete_close();
        f.port.process_pending();
        assert_eq!(f.port.router_state(), PhysicalState::Opening);
        f.line.complete_open();
        f.port.process_pending();
        assert!(b_app.is_online());
        assert_eq!(f.line.num_opens(), 2);
    }

    #[test]
    fn test_release_without_associations_is_synchronous() {
        let mut f = fixture(true);
        assert_eq!(f.port.release(), ReleaseStatus::Destroyed);
        assert!(f.port.is_destroyed());
        assert!(f.line.is_dropped());
        assert!(f.observer.states().is_empty());
    }

    #[test]
    fn test_release_while_waiting_is_synchronous() {
        let mut f = fixture(false);
        let (s, _) = stack(4);
        f.port.associate("feeder", 4, s).unwrap();
        f.line.fail_open("no carrier");
        f.port.process_pending();
        assert_eq!(f.port.router_state(), PhysicalState::Waiting);

        assert_eq!(f.port.release(), ReleaseStatus::Destroyed);
        assert!(f.line.is_dropped());
        assert_eq!(f.timers.pending(), 0);
        // The Stopped queued during release is still observed.
        assert_eq!(f.observer.last(), Some(PhysicalState::Stopped));
    }

    #[test]
    fn test_no_delivery_after_disassociate() {
        let mut f = fixture(true);
        let (a, a_app) = stack(4);
        let (b, _) = stack(7);
        f.port.associate("a", 4, a).unwrap();
        f.port.associate("b", 7, b).unwrap();
        f.port.process_pending();

        // Already queued when the stack is removed
        f.line.receive(from_master(4));
        f.port.disassociate("a").unwrap();
        f.port.process_pending();
        assert!(a_app.received().is_empty());
        assert_eq!(f.port.statistics().frames_dropped, 1);
    }

    #[test]
    fn test_send_through_named_stack() {
        let mut f = fixture(true);
        let (s, app) = stack(4);
        f.port.associate("feeder", 4, s).unwrap();
        f.port.process_pending();

        f.port.send("feeder", &[0xC0, 0x81, 0x00, 0x00]).unwrap();
        f.port.process_pending();
        assert_eq!(app.send_results(), vec![true]);
        let written = LinkFrame::decode(&f.line.writes()[0]).unwrap();
        assert_eq!(written.destination(), MASTER);
        assert!(f.port.send("missing", &[0xC0]).unwrap_err().is_not_found());
    }

    #[test]
    fn test_associate_during_release_rejected() {
        let mut f = fixture(false);
        let (a, _) = stack(4);
        f.port.associate("a", 4, a).unwrap();
        f.line.complete_open();
        f.port.process_pending();
        assert_eq!(f.port.release(), ReleaseStatus::Deferred);

        let (b, _) = stack(5);
        assert!(f.port.associate("b", 5, b).is_err());
    }

    #[test]
    #[should_panic(expected = "destroyed")]
    fn test_use_after_destroy_panics() {
        let mut f = fixture(true);
        f.port.release();
        let (s, _) = stack(4);
        let _ = f.port.associate("late", 4, s);
    }

    #[test]
    fn test_address_must_match_stack() {
        let mut f = fixture(true);
        let (s, app) = stack(5);
        let err = f.port.associate("feeder", 4, s).unwrap_err();
        assert!(matches!(err, DnpError::InvalidData(_)));
        assert!(app.is_dropped());
        assert_eq!(f.port.num_associations(), 0);
        assert!(!f.port.is_router_running());
        assert_eq!(f.line.num_opens(), 0);
    }

    #[test]
    fn test_removed_stack_frames_never_reach_the_line() {
        let mut f = fixture(true);
        let (keeper, _) = stack(9);
        let (old, old_app) = stack(4);
        f.port.associate("keeper", 9, keeper).unwrap();
        f.port.associate("old", 4, old).unwrap();
        f.port.process_pending();

        f.port.send("old", &[0xC0, 0x81, 0x00, 0x00]).unwrap();
        f.port.disassociate("old").unwrap();
        let (new, new_app) = stack(4);
        f.port.associate("new", 4, new).unwrap();
        f.port.process_pending();

        assert!(f.line.writes().is_empty());
        assert!(new_app.send_results().is_empty());
        assert!(old_app.is_dropped());

        f.port.send("new", &[0xC0, 0x81, 0x00, 0x00]).unwrap();
        f.port.process_pending();
        assert_eq!(f.line.writes().len(), 1);
        assert_eq!(new_app.send_results(), vec![true]);
    }
}
