//! Shared router
//!
//! One [`Router`] drives one physical layer on behalf of every context
//! registered with it. Inbound bytes are decoded into frames and handed to
//! the context registered under the frame's destination address; outbound
//! frames from all contexts are queued and written one at a time.
//!
//! The router never calls back into itself. Physical completions, transmit
//! requests and timer expiries all arrive as [`RouterTask`]s that the owner
//! pulls from its scheduler and passes to [`Router::handle_task`] together
//! with the physical layer it owns.
//!
//! # Lifecycle
//!
//! ```text
//! Closed/Stopped --start--> Opening --Opened--> Open
//! Opening --OpenFailed--> Waiting --retry timer--> Opening
//! Open --line lost--> Waiting
//! Opening/Open --stop--> Closing --Closed/OpenFailed--> Stopped
//! Waiting --stop--> Stopped
//! ```

use crate::context::{LinkContext, RouterHandle};
use crate::decoder::FrameDecoder;
use crate::error::{DnpError, DnpResult};
use crate::frame::LinkFrame;
use crate::statistics::RouterStatistics;
use bytes::Bytes;
use dnp_core::{Logger, PhysMonitor, PhysicalState, TaskPoster, TimerId, TimerSource};
use dnp_transport::{PhysicalEvent, PhysicalEventSink, PhysicalLayer};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Work item processed by [`Router::handle_task`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterTask {
    /// Completion or notification from the physical layer
    Physical(PhysicalEvent),
    /// Encoded frame submitted by the context at `address`
    ///
    /// `generation` identifies the registration that submitted it; frames
    /// from a context that has since been removed are discarded.
    Transmit {
        address: u16,
        generation: u64,
        frame: Bytes,
    },
    /// The reopen delay elapsed
    ReopenTimer(TimerId),
    /// A timer started by the context at `address` expired
    ContextTimer {
        address: u16,
        generation: u64,
        id: TimerId,
    },
}

/// Router multiplexing contexts over one physical layer
pub struct Router<C> {
    logger: Logger,
    timers: Arc<dyn TimerSource>,
    open_retry: Duration,
    tasks: TaskPoster<RouterTask>,
    monitor: Option<Box<dyn PhysMonitor>>,
    contexts: HashMap<u16, C>,
    generations: HashMap<u16, u64>,
    next_generation: u64,
    state: PhysicalState,
    restart_requested: bool,
    reopen_timer: Option<TimerId>,
    decoder: FrameDecoder,
    tx_queue: VecDeque<(u16, u64, Bytes)>,
    transmitting: Option<(u16, u64)>,
    statistics: RouterStatistics,
}

impl<C: LinkContext> Router<C> {
    /// Create a stopped router
    ///
    /// `tasks` must feed the scheduler whose items are passed back to
    /// [`handle_task`](Self::handle_task).
    pub fn new(
        logger: Logger,
        timers: Arc<dyn TimerSource>,
        open_retry: Duration,
        tasks: TaskPoster<RouterTask>,
    ) -> Self {
        Self {
            logger,
            timers,
            open_retry,
            tasks,
            monitor: None,
            contexts: HashMap::new(),
            generations: HashMap::new(),
            next_generation: 0,
            state: PhysicalState::Closed,
            restart_requested: false,
            reopen_timer: None,
            decoder: FrameDecoder::new(),
            tx_queue: VecDeque::new(),
            transmitting: None,
            statistics: RouterStatistics::new(),
        }
    }

    /// Sink to bind to the physical layer this router drives
    pub fn event_sink(&self) -> PhysicalEventSink {
        let tasks = self.tasks.clone();
        PhysicalEventSink::new(move |event| tasks.post(RouterTask::Physical(event)))
    }

    /// Register the sole lifecycle monitor
    pub fn set_monitor(&mut self, monitor: Box<dyn PhysMonitor>) {
        self.monitor = Some(monitor);
    }

    pub fn state(&self) -> PhysicalState {
        self.state
    }

    pub fn statistics(&self) -> RouterStatistics {
        self.statistics
    }

    /// Whether the router has been started and no stop is pending
    pub fn is_running(&self) -> bool {
        match self.state {
            PhysicalState::Closed | PhysicalState::Stopped => false,
            PhysicalState::Closing => self.restart_requested,
            _ => true,
        }
    }

    /// Whether the physical layer may still have operations in flight
    ///
    /// Stays true after [`stop`](Self::stop) until the router reports
    /// [`PhysicalState::Stopped`].
    pub fn is_active(&self) -> bool {
        !self.state.is_idle()
    }

    pub fn num_context(&self) -> usize {
        self.contexts.len()
    }

    pub fn has_context(&self, address: u16) -> bool {
        self.contexts.contains_key(&address)
    }

    pub fn context_mut(&mut self, address: u16) -> Option<&mut C> {
        self.contexts.get_mut(&address)
    }

    /// Register `context` under `address`
    ///
    /// The context is bound to the router before it becomes reachable. If
    /// the line is already open it is told so immediately.
    pub fn add_context(&mut self, address: u16, mut context: C) -> DnpResult<()> {
        if self.contexts.contains_key(&address) {
            return Err(DnpError::Conflict(format!(
                "address {} already has a context",
                address
            )));
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        context.set_router(RouterHandle::new(
            address,
            generation,
            self.tasks.clone(),
            self.timers.clone(),
        ));
        if self.state.is_open() {
            context.on_lower_layer_up();
        }
        self.contexts.insert(address, context);
        self.generations.insert(address, generation);
        self.logger
            .debug(format_args!("context added at address {}", address));
        Ok(())
    }

    /// Unregister the context at `address` and hand it back
    ///
    /// Once this returns no frame is delivered to the context again and it
    /// has been taken offline.
    pub fn remove_context(&mut self, address: u16) -> DnpResult<C> {
        let mut context = self.contexts.remove(&address).ok_or_else(|| {
            DnpError::NotFound(format!("no context at address {}", address))
        })?;
        self.generations.remove(&address);
        self.tx_queue.retain(|(owner, _, _)| *owner != address);
        if self.state.is_open() {
            context.on_lower_layer_down();
        }
        self.logger
            .debug(format_args!("context removed from address {}", address));
        Ok(context)
    }

    /// Start opening the physical layer
    pub fn start(&mut self, phys: &mut dyn PhysicalLayer) -> DnpResult<()> {
        if self.contexts.is_empty() {
            return Err(DnpError::InvalidState(
                "router started without contexts".to_string(),
            ));
        }
        match self.state {
            PhysicalState::Closed | PhysicalState::Stopped => {
                self.logger
                    .info(format_args!("starting on {}", phys.describe()));
                self.open(phys);
            }
            PhysicalState::Closing => {
                // Reopen once the close in progress has completed.
                self.restart_requested = true;
            }
            _ => {}
        }
        Ok(())
    }

    /// Close the physical layer
    ///
    /// The monitor is told [`PhysicalState::Stopped`] once the close has
    /// completed.
    pub fn stop(&mut self, phys: &mut dyn PhysicalLayer) {
        self.restart_requested = false;
        match self.state {
            PhysicalState::Opening => {
                self.change_state(PhysicalState::Closing);
                phys.async_close();
            }
            PhysicalState::Open => {
                self.go_offline();
                self.change_state(PhysicalState::Closing);
                phys.async_close();
            }
            PhysicalState::Waiting => {
                self.cancel_reopen();
                self.finish_stop(phys);
            }
            _ => {}
        }
    }

    /// Process one work item
    pub fn handle_task(&mut self, task: RouterTask, phys: &mut dyn PhysicalLayer) {
        match task {
            RouterTask::Physical(event) => self.on_physical_event(event, phys),
            RouterTask::Transmit {
                address,
                generation,
                frame,
            } => {
                if self.is_current(address, generation) {
                    self.on_transmit(address, generation, frame, phys);
                } else {
                    self.logger.debug(format_args!(
                        "discarding frame from removed context at {}",
                        address
                    ));
                }
            }
            RouterTask::ReopenTimer(id) => self.on_reopen_timer(id, phys),
            RouterTask::ContextTimer {
                address,
                generation,
                id,
            } => {
                if !self.is_current(address, generation) {
                    return;
                }
                if let Some(context) = self.contexts.get_mut(&address) {
                    context.on_timer(id);
                }
            }
        }
    }

    fn on_physical_event(&mut self, event: PhysicalEvent, phys: &mut dyn PhysicalLayer) {
        match event {
            PhysicalEvent::Opened => {
                if self.state != PhysicalState::Opening {
                    self.logger
                        .debug(format_args!("ignoring open completion in {}", self.state));
                    return;
                }
                self.change_state(PhysicalState::Open);
                for context in self.contexts.values_mut() {
                    context.on_lower_layer_up();
                }
            }
            PhysicalEvent::OpenFailed(reason) => match self.state {
                PhysicalState::Opening => {
                    self.statistics.open_failures += 1;
                    self.logger.warn(format_args!(
                        "open of {} failed: {}",
                        phys.describe(),
                        reason
                    ));
                    self.wait_for_reopen();
                }
                PhysicalState::Closing => self.finish_stop(phys),
                _ => {}
            },
            PhysicalEvent::Closed => match self.state {
                PhysicalState::Closing => self.finish_stop(phys),
                PhysicalState::Open => {
                    self.logger
                        .warn(format_args!("lost {}", phys.describe()));
                    self.go_offline();
                    self.wait_for_reopen();
                }
                PhysicalState::Opening => {
                    self.statistics.open_failures += 1;
                    self.wait_for_reopen();
                }
                _ => {}
            },
            PhysicalEvent::Received(data) => {
                if self.state.is_open() {
                    self.on_receive(&data);
                } else {
                    self.logger.debug(format_args!(
                        "discarding {} bytes received in {}",
                        data.len(),
                        self.state
                    ));
                }
            }
            PhysicalEvent::WriteComplete => self.on_write_result(true, phys),
            PhysicalEvent::WriteFailed(reason) => {
                self.logger
                    .warn(format_args!("write failed: {}", reason));
                self.on_write_result(false, phys);
            }
        }
    }

    fn on_receive(&mut self, data: &[u8]) {
        self.decoder.feed(data);
        while let Some(result) = self.decoder.poll() {
            match result {
                Ok(frame) => self.dispatch(frame),
                Err(e) => {
                    self.statistics.crc_errors += 1;
                    self.logger.warn(format_args!("{}", e));
                }
            }
        }
    }

    fn dispatch(&mut self, frame: LinkFrame) {
        self.statistics.frames_received += 1;
        self.logger.comm(format_args!("<- {}", frame));

        if frame.is_broadcast() {
            if self.contexts.is_empty() {
                self.statistics.frames_dropped += 1;
            }
            for context in self.contexts.values_mut() {
                context.on_frame(frame.clone());
            }
            return;
        }

        match self.contexts.get_mut(&frame.destination()) {
            Some(context) => context.on_frame(frame),
            None => {
                self.statistics.frames_dropped += 1;
                self.logger.warn(format_args!(
                    "frame for unknown address {} dropped",
                    frame.destination()
                ));
            }
        }
    }

    fn is_current(&self, address: u16, generation: u64) -> bool {
        self.generations.get(&address) == Some(&generation)
    }

    /// Deliver a transmit result unless the owner has been removed since
    fn report_transmit(&mut self, address: u16, generation: u64, success: bool) {
        if !self.is_current(address, generation) {
            return;
        }
        if let Some(context) = self.contexts.get_mut(&address) {
            context.on_transmit_result(success);
        }
    }

    fn on_transmit(
        &mut self,
        address: u16,
        generation: u64,
        frame: Bytes,
        phys: &mut dyn PhysicalLayer,
    ) {
        if !self.state.is_open() {
            if let Some(context) = self.contexts.get_mut(&address) {
                context.on_transmit_result(false);
            }
            return;
        }
        self.tx_queue.push_back((address, generation, frame));
        self.try_write(phys);
    }

    fn on_write_result(&mut self, success: bool, phys: &mut dyn PhysicalLayer) {
        if let Some((address, generation)) = self.transmitting.take() {
            self.report_transmit(address, generation, success);
        }
        self.try_write(phys);
    }

    fn try_write(&mut self, phys: &mut dyn PhysicalLayer) {
        if self.transmitting.is_some() || !self.state.is_open() {
            return;
        }
        if let Some((address, generation, frame)) = self.tx_queue.pop_front() {
            self.statistics.frames_sent += 1;
            self.logger
                .comm(format_args!("-> {} bytes from {}", frame.len(), address));
            self.transmitting = Some((address, generation));
            phys.async_write(frame);
        }
    }

    fn on_reopen_timer(&mut self, id: TimerId, phys: &mut dyn PhysicalLayer) {
        if self.reopen_timer != Some(id) || self.state != PhysicalState::Waiting {
            return;
        }
        self.reopen_timer = None;
        self.statistics.reopen_attempts += 1;
        self.open(phys);
    }

    fn open(&mut self, phys: &mut dyn PhysicalLayer) {
        self.decoder.reset();
        self.change_state(PhysicalState::Opening);
        phys.async_open();
    }

    /// Tell every context the line is gone and fail pending transmissions
    fn go_offline(&mut self) {
        // Oldest first, so each context sees its results in submission order.
        let mut failed: Vec<(u16, u64)> = self.transmitting.take().into_iter().collect();
        failed.extend(self.tx_queue.drain(..).map(|(a, g, _)| (a, g)));
        for (address, generation) in failed {
            self.report_transmit(address, generation, false);
        }
        for context in self.contexts.values_mut() {
            context.on_lower_layer_down();
        }
        self.decoder.reset();
    }

    fn wait_for_reopen(&mut self) {
        self.change_state(PhysicalState::Waiting);
        let tasks = self.tasks.clone();
        let id = self.timers.start(
            self.open_retry,
            Box::new(move |id: TimerId| {
                tasks.post(RouterTask::ReopenTimer(id));
            }),
        );
        self.reopen_timer = Some(id);
        self.logger.info(format_args!(
            "reopening in {} ms",
            self.open_retry.as_millis()
        ));
    }

    fn cancel_reopen(&mut self) {
        if let Some(id) = self.reopen_timer.take() {
            self.timers.cancel(id);
        }
    }

    fn finish_stop(&mut self, phys: &mut dyn PhysicalLayer) {
        self.transmitting = None;
        self.tx_queue.clear();
        self.change_state(PhysicalState::Stopped);
        if std::mem::take(&mut self.restart_requested) && !self.contexts.is_empty() {
            self.logger
                .info(format_args!("restarting on {}", phys.describe()));
            self.open(phys);
        }
    }

    fn change_state(&mut self, state: PhysicalState) {
        if let Err(e) = self.state.validate_transition(state) {
            self.logger.error(format_args!("{}", e));
        }
        self.logger
            .debug(format_args!("{} -> {}", self.state, state));
        self.state = state;
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.on_state_change(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::LinkFunction;
    use dnp_core::{MockTimerSource, StateRecorder, TaskScheduler};
    use dnp_transport::{MockPhysicalHandle, MockPhysicalLayer};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct ProbeState {
        router: Option<RouterHandle>,
        online: bool,
        ups: usize,
        downs: usize,
        frames: Vec<LinkFrame>,
        tx_results: Vec<bool>,
        timers: Vec<TimerId>,
    }

    #[derive(Debug, Clone, Default)]
    struct Probe(Arc<Mutex<ProbeState>>);

    impl Probe {
        fn state(&self) -> std::sync::MutexGuard<'_, ProbeState> {
            self.0.lock().unwrap()
        }
    }

    impl LinkContext for Probe {
        fn set_router(&mut self, router: RouterHandle) {
            self.state().router = Some(router);
        }
        fn on_lower_layer_up(&mut self) {
            let mut s = self.state();
            s.online = true;
            s.ups += 1;
        }
        fn on_lower_layer_down(&mut self) {
            let mut s = self.state();
            s.online = false;
            s.downs += 1;
        }
        fn on_frame(&mut self, frame: LinkFrame) {
            self.state().frames.push(frame);
        }
        fn on_transmit_result(&mut self, success: bool) {
            self.state().tx_results.push(success);
        }
        fn on_timer(&mut self, id: TimerId) {
            self.state().timers.push(id);
        }
    }

    struct Harness {
        router: Router<Probe>,
        phys: MockPhysicalLayer,
        line: MockPhysicalHandle,
        scheduler: TaskScheduler<RouterTask>,
        timers: MockTimerSource,
        states: StateRecorder,
    }

    impl Harness {
        fn new() -> Self {
            let scheduler = TaskScheduler::new("router-test");
            let timers = MockTimerSource::new();
            let mut router = Router::new(
                Logger::default(),
                Arc::new(timers.clone()),
                Duration::from_secs(5),
                scheduler.poster(),
            );
            let states = StateRecorder::new();
            router.set_monitor(Box::new(states.clone()));
            let (mut phys, line) = MockPhysicalLayer::new();
            phys.bind(router.event_sink());
            Self {
                router,
                phys,
                line,
                scheduler,
                timers,
                states,
            }
        }

        fn pump(&mut self) {
            while let Some(task) = self.scheduler.try_next() {
                self.router.handle_task(task, &mut self.phys);
            }
        }

        fn add(&mut self, address: u16) -> Probe {
            let probe = Probe::default();
            self.router.add_context(address, probe.clone()).unwrap();
            probe
        }

        fn start_open(&mut self) {
            self.router.start(&mut self.phys).unwrap();
            self.line.complete_open();
            self.pump();
        }
    }

    fn data_frame(dest: u16) -> Bytes {
        LinkFrame::unconfirmed(true, dest, 1, vec![0xC0, 0x01])
            .encode()
            .unwrap()
    }

    #[test]
    fn test_start_requires_contexts() {
        let mut h = Harness::new();
        assert!(h.router.start(&mut h.phys).is_err());
        assert!(!h.router.is_running());
        assert_eq!(h.line.num_opens(), 0);
    }

    #[test]
    fn test_add_conflict_and_remove_not_found() {
        let mut h = Harness::new();
        h.add(4);
        let err = h.router.add_context(4, Probe::default()).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(h.router.num_context(), 1);

        let err = h.router.remove_context(9).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(h.router.num_context(), 1);
    }

    #[test]
    fn test_open_notifies_contexts_and_monitor() {
        let mut h = Harness::new();
        let probe = h.add(4);
        h.start_open();

        assert!(h.router.is_running());
        assert!(probe.state().online);
        assert!(probe.state().router.is_some());
        assert_eq!(
            h.states.states(),
            vec![PhysicalState::Opening, PhysicalState::Open]
        );

        // A context added while open comes up immediately.
        let late = h.add(7);
        assert!(late.state().online);
    }

    #[test]
    fn test_inbound_dispatch_by_address() {
        let mut h = Harness::new();
        let a = h.add(4);
        let b = h.add(7);
        h.start_open();

        let mut chunk = data_frame(7).to_vec();
        chunk.extend_from_slice(&data_frame(4));
        h.line.receive(chunk);
        h.pump();

        assert_eq!(a.state().frames.len(), 1);
        assert_eq!(b.state().frames.len(), 1);
        assert_eq!(b.state().frames[0].destination(), 7);
        assert_eq!(h.router.statistics().frames_received, 2);
    }

    #[test]
    fn test_unknown_address_is_dropped_and_counted() {
        let mut h = Harness::new();
        let probe = h.add(4);
        h.start_open();

        h.line.receive(data_frame(99));
        h.pump();

        assert!(probe.state().frames.is_empty());
        assert_eq!(h.router.statistics().frames_dropped, 1);
        assert!(h.router.is_running());
    }

    #[test]
    fn test_broadcast_reaches_every_context() {
        let mut h = Harness::new();
        let a = h.add(4);
        let b = h.add(7);
        h.start_open();

        h.line.receive(data_frame(0xFFFF));
        h.pump();
        assert_eq!(a.state().frames.len(), 1);
        assert_eq!(b.state().frames.len(), 1);
    }

    #[test]
    fn test_corrupt_bytes_are_counted() {
        let mut h = Harness::new();
        h.add(4);
        h.start_open();

        let mut bytes = data_frame(4).to_vec();
        bytes[9] ^= 0xFF;
        h.line.receive(bytes);
        h.pump();
        assert!(h.router.statistics().crc_errors >= 1);
        assert_eq!(h.router.statistics().frames_received, 0);
    }

    #[test]
    fn test_removed_context_receives_nothing() {
        let mut h = Harness::new();
        let probe = h.add(4);
        h.add(7);
        h.start_open();

        h.line.receive(data_frame(4));
        let removed = h.router.remove_context(4).unwrap();
        h.pump();

        assert!(!removed.state().online);
        assert_eq!(removed.state().downs, 1);
        assert!(probe.state().frames.is_empty());
        assert_eq!(h.router.statistics().frames_dropped, 1);
    }

    #[test]
    fn test_outbound_frames_are_serialized() {
        let mut h = Harness::new();
        let a = h.add(4);
        let b = h.add(7);
        h.start_open();

        let frame = LinkFrame::new(LinkFunction::RequestLinkStatus, true, 1, 4);
        a.state().router.clone().unwrap().transmit(&frame).unwrap();
        b.state().router.clone().unwrap().transmit(&frame).unwrap();
        h.pump();

        // Only the first write is on the line until it completes.
        assert_eq!(h.line.writes().len(), 1);
        h.line.complete_write();
        h.pump();
        assert_eq!(h.line.writes().len(), 2);
        assert_eq!(a.state().tx_results, vec![true]);

        h.line.fail_write("broken pipe");
        h.pump();
        assert_eq!(b.state().tx_results, vec![false]);
        assert_eq!(h.router.statistics().frames_sent, 2);
    }

    #[test]
    fn test_transmit_while_closed_fails() {
        let mut h = Harness::new();
        let probe = h.add(4);
        let frame = LinkFrame::new(LinkFunction::TestLinkStates, true, 1, 4);
        probe.state().router.clone().unwrap().transmit(&frame).unwrap();
        h.pump();
        assert_eq!(probe.state().tx_results, vec![false]);
        assert!(h.line.writes().is_empty());
    }

    #[test]
    fn test_open_failure_retries_after_delay() {
        let mut h = Harness::new();
        h.add(4);
        h.router.start(&mut h.phys).unwrap();
        h.line.fail_open("refused");
        h.pump();

        assert_eq!(h.router.state(), PhysicalState::Waiting);
        assert!(h.router.is_running());
        assert_eq!(h.timers.advance(Duration::from_secs(4)), 0);
        assert_eq!(h.timers.advance(Duration::from_secs(1)), 1);
        h.pump();

        assert_eq!(h.router.state(), PhysicalState::Opening);
        assert_eq!(h.line.num_opens(), 2);
        let stats = h.router.statistics();
        assert_eq!(stats.open_failures, 1);
        assert_eq!(stats.reopen_attempts, 1);
    }

    #[test]
    fn test_line_loss_takes_contexts_offline_and_reopens() {
        let mut h = Harness::new();
        let probe = h.add(4);
        h.start_open();

        h.line.remote_close();
        h.pump();
        assert!(!probe.state().online);
        assert_eq!(h.router.state(), PhysicalState::Waiting);

        h.timers.fire_next();
        h.pump();
        h.line.complete_open();
        h.pump();
        assert!(probe.state().online);
        assert_eq!(probe.state().ups, 2);
    }

    #[test]
    fn test_stop_reports_stopped_once() {
        let mut h = Harness::new();
        h.add(4);
        h.start_open();
        h.router.remove_context(4).unwrap();

        h.router.stop(&mut h.phys);
        assert_eq!(h.router.state(), PhysicalState::Closing);
        assert!(!h.router.is_running());
        assert!(h.router.is_active());
        h.line.complete_close();
        h.pump();

        assert!(!h.router.is_active());
        assert_eq!(h.states.count(PhysicalState::Stopped), 1);
        assert_eq!(h.states.last(), Some(PhysicalState::Stopped));
    }

    #[test]
    fn test_stop_while_waiting_cancels_retry() {
        let mut h = Harness::new();
        h.add(4);
        h.router.start(&mut h.phys).unwrap();
        h.line.fail_open("refused");
        h.pump();

        h.router.stop(&mut h.phys);
        assert_eq!(h.router.state(), PhysicalState::Stopped);
        assert_eq!(h.timers.pending(), 0);
        assert_eq!(h.line.num_closes(), 0);
    }

    #[test]
    fn test_start_during_close_restarts_after_stopped() {
        let mut h = Harness::new();
        h.add(4);
        h.start_open();
        h.router.stop(&mut h.phys);
        assert!(!h.router.is_running());
        h.router.start(&mut h.phys).unwrap();
        assert!(h.router.is_running());
        assert_eq!(h.line.num_opens(), 1);

        h.line.complete_close();
        h.pump();
        assert_eq!(h.line.num_opens(), 2);
        assert_eq!(h.router.state(), PhysicalState::Opening);
        assert_eq!(h.states.count(PhysicalState::Stopped), 1);
    }

    #[test]
    fn test_context_timer_routed_to_owner() {
        let mut h = Harness::new();
        let probe = h.add(4);
        let handle = probe.state().router.clone().unwrap();
        let id = handle.start_timer(Duration::from_millis(100));
        h.timers.advance(Duration::from_millis(100));
        h.pump();
        assert_eq!(probe.state().timers, vec![id]);
    }

    #[test]
    fn test_work_from_removed_context_is_discarded() {
        let mut h = Harness::new();
        h.add(9);
        let removed = h.add(4);
        h.start_open();

        let handle = removed.state().router.clone().unwrap();
        let frame = LinkFrame::new(LinkFunction::TestLinkStates, true, 1, 4);
        handle.transmit(&frame).unwrap();
        handle.start_timer(Duration::from_millis(10));
        h.router.remove_context(4).unwrap();
        let replacement = h.add(4);

        h.timers.advance(Duration::from_millis(10));
        h.pump();
        assert!(h.line.writes().is_empty());
        assert!(replacement.state().tx_results.is_empty());
        assert!(replacement.state().timers.is_empty());
        assert!(removed.state().tx_results.is_empty());
    }

    #[test]
    fn test_write_result_not_credited_to_replacement() {
        let mut h = Harness::new();
        h.add(9);
        let removed = h.add(4);
        h.start_open();

        let frame = LinkFrame::new(LinkFunction::TestLinkStates, true, 1, 4);
        let handle = removed.state().router.clone().unwrap();
        handle.transmit(&frame).unwrap();
        h.pump();
        assert_eq!(h.line.writes().len(), 1);

        h.router.remove_context(4).unwrap();
        let replacement = h.add(4);
        h.line.complete_write();
        h.pump();
        assert!(replacement.state().tx_results.is_empty());
        assert!(removed.state().tx_results.is_empty());

        // The replacement's own frames still flow.
        let handle = replacement.state().router.clone().unwrap();
        handle.transmit(&frame).unwrap();
        h.pump();
        h.line.complete_write();
        h.pump();
        assert_eq!(replacement.state().tx_results, vec![true]);
    }
}
