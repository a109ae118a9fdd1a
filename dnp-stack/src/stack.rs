//! Protocol stack bound to one local address

use crate::app::AppLayer;
use crate::config::StackConfig;
use crate::link::{LinkLayer, TxKind};
use crate::transport::TransportLayer;
use dnp_core::{DnpResult, Logger, TimerId};
use dnp_link::{LinkContext, LinkFrame, RouterHandle};

/// Link, transport and application layers of one association
///
/// The stack is the router's context for its local address. Inbound frames
/// travel link -> transport -> application; [`send`](Self::send) travels
/// the other way.
pub struct ProtocolStack {
    config: StackConfig,
    logger: Logger,
    link: LinkLayer,
    transport: TransportLayer,
    app: Box<dyn AppLayer>,
    fragment_ok: bool,
}

impl ProtocolStack {
    pub fn new(config: StackConfig, app: Box<dyn AppLayer>, logger: Logger) -> Self {
        let link = LinkLayer::new(config.link.clone(), logger.sub_logger("link"));
        let transport = TransportLayer::new(config.max_fragment_size, logger.sub_logger("transport"));
        Self {
            config,
            logger,
            link,
            transport,
            app,
            fragment_ok: true,
        }
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn local_address(&self) -> u16 {
        self.config.link.local_address
    }

    pub fn is_online(&self) -> bool {
        self.link.is_online()
    }

    pub fn link(&self) -> &LinkLayer {
        &self.link
    }

    /// Send an application fragment to the remote station
    ///
    /// The outcome is reported to the application layer once the last
    /// segment has been written.
    pub fn send(&mut self, apdu: &[u8]) -> DnpResult<()> {
        let segments = self.transport.segment(apdu)?;
        let count = segments.len();
        for (i, segment) in segments.into_iter().enumerate() {
            self.link.send(segment, i + 1 == count)?;
        }
        self.logger.debug(format_args!(
            "fragment of {} bytes queued in {} segments",
            apdu.len(),
            count
        ));
        Ok(())
    }
}

impl LinkContext for ProtocolStack {
    fn set_router(&mut self, router: RouterHandle) {
        self.link.set_router(router);
    }

    fn on_lower_layer_up(&mut self) {
        self.transport.reset();
        self.fragment_ok = true;
        self.link.on_lower_layer_up();
        self.app.on_lower_layer_up();
    }

    fn on_lower_layer_down(&mut self) {
        let in_flight = self.link.on_lower_layer_down();
        self.transport.reset();
        if in_flight {
            self.app.on_send_result(false);
        }
        self.fragment_ok = true;
        self.app.on_lower_layer_down();
    }

    fn on_frame(&mut self, frame: LinkFrame) {
        let Some(tpdu) = self.link.on_frame(frame) else {
            return;
        };
        if let Some(apdu) = self.transport.on_segment(&tpdu) {
            self.app.on_receive(apdu);
        }
    }

    fn on_transmit_result(&mut self, success: bool) {
        match self.link.on_transmit_result() {
            Some(TxKind::Segment { last }) => {
                self.fragment_ok &= success;
                if last {
                    let ok = std::mem::replace(&mut self.fragment_ok, true);
                    self.app.on_send_result(ok);
                }
            }
            Some(TxKind::Control) => {}
            None => self
                .logger
                .debug(format_args!("unmatched transmit result")),
        }
    }

    fn on_timer(&mut self, id: TimerId) {
        self.link.on_timer(id);
    }
}
