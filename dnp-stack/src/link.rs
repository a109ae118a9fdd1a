//! Link layer of a protocol stack
//!
//! Answers the link services addressed to it, filters frames by source
//! address, extracts user data for the transport layer and optionally keeps
//! an idle link alive with periodic link status requests.

use crate::config::LinkConfig;
use bytes::Bytes;
use dnp_core::{DnpError, DnpResult, Logger, TimerId};
use dnp_link::{LinkFrame, LinkFunction, RouterHandle};
use std::collections::VecDeque;

/// What a transmitted frame carried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    /// Link service frame, not reported upward
    Control,
    /// Transport segment; `last` marks the final segment of a fragment
    Segment { last: bool },
}

/// Link layer state for one stack
pub struct LinkLayer {
    config: LinkConfig,
    logger: Logger,
    router: Option<RouterHandle>,
    online: bool,
    expected_fcb: bool,
    keep_alive: Option<TimerId>,
    outstanding: VecDeque<TxKind>,
}

impl LinkLayer {
    pub fn new(config: LinkConfig, logger: Logger) -> Self {
        Self {
            config,
            logger,
            router: None,
            online: false,
            expected_fcb: true,
            keep_alive: None,
            outstanding: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Whether a keep-alive timer is currently held
    pub fn has_keep_alive(&self) -> bool {
        self.keep_alive.is_some()
    }

    pub fn set_router(&mut self, router: RouterHandle) {
        self.router = Some(router);
    }

    pub fn on_lower_layer_up(&mut self) {
        self.online = true;
        self.expected_fcb = true;
        self.restart_keep_alive();
        self.logger.info(format_args!("link online"));
    }

    /// Go offline and release the keep-alive timer
    ///
    /// Returns whether a fragment was still in flight.
    pub fn on_lower_layer_down(&mut self) -> bool {
        self.online = false;
        self.cancel_keep_alive();
        let in_flight = self
            .outstanding
            .drain(..)
            .any(|kind| matches!(kind, TxKind::Segment { .. }));
        self.logger.info(format_args!("link offline"));
        in_flight
    }

    /// Handle an inbound frame, returning any user data for the transport layer
    pub fn on_frame(&mut self, frame: LinkFrame) -> Option<Bytes> {
        if !self.online {
            return None;
        }
        if frame.source() != self.config.remote_address {
            self.logger.warn(format_args!(
                "frame from unexpected source {} ignored",
                frame.source()
            ));
            return None;
        }
        if frame.is_from_master() == self.config.is_master {
            self.logger
                .warn(format_args!("frame with wrong direction bit ignored"));
            return None;
        }
        self.restart_keep_alive();

        match frame.function() {
            LinkFunction::RequestLinkStatus => {
                self.reply(LinkFunction::LinkStatus);
                None
            }
            LinkFunction::ResetLinkStates => {
                self.expected_fcb = true;
                self.reply(LinkFunction::Ack);
                None
            }
            LinkFunction::TestLinkStates => {
                self.reply(LinkFunction::Ack);
                None
            }
            LinkFunction::ConfirmedUserData => {
                self.reply(LinkFunction::Ack);
                if frame.fcb() != self.expected_fcb {
                    self.logger
                        .debug(format_args!("duplicate confirmed frame discarded"));
                    return None;
                }
                self.expected_fcb = !self.expected_fcb;
                Some(frame.user_data().clone())
            }
            LinkFunction::UnconfirmedUserData => Some(frame.user_data().clone()),
            function => {
                self.logger
                    .debug(format_args!("secondary {:?} received", function));
                None
            }
        }
    }

    /// Send one transport segment as unconfirmed user data
    pub fn send(&mut self, segment: Bytes, last: bool) -> DnpResult<()> {
        if !self.online {
            return Err(DnpError::InvalidState("link is offline".to_string()));
        }
        let frame = LinkFrame::unconfirmed(
            self.config.is_master,
            self.config.remote_address,
            self.config.local_address,
            segment,
        );
        self.transmit(&frame, TxKind::Segment { last })
    }

    /// Match a transmit result with the frame it belongs to
    pub fn on_transmit_result(&mut self) -> Option<TxKind> {
        self.outstanding.pop_front()
    }

    /// Handle an expired timer; stale ids are ignored
    pub fn on_timer(&mut self, id: TimerId) {
        if self.keep_alive != Some(id) {
            return;
        }
        self.keep_alive = None;
        if !self.online {
            return;
        }
        let frame = LinkFrame::new(
            LinkFunction::RequestLinkStatus,
            self.config.is_master,
            self.config.remote_address,
            self.config.local_address,
        );
        if let Err(e) = self.transmit(&frame, TxKind::Control) {
            self.logger.warn(format_args!("keep-alive failed: {}", e));
        }
        self.restart_keep_alive();
    }

    fn reply(&mut self, function: LinkFunction) {
        let frame = LinkFrame::new(
            function,
            self.config.is_master,
            self.config.remote_address,
            self.config.local_address,
        );
        if let Err(e) = self.transmit(&frame, TxKind::Control) {
            self.logger
                .warn(format_args!("{:?} reply failed: {}", function, e));
        }
    }

    fn transmit(&mut self, frame: &LinkFrame, kind: TxKind) -> DnpResult<()> {
        let router = self
            .router
            .as_ref()
            .ok_or_else(|| DnpError::InvalidState("link has no router".to_string()))?;
        router.transmit(frame)?;
        self.outstanding.push_back(kind);
        Ok(())
    }

    fn restart_keep_alive(&mut self) {
        self.cancel_keep_alive();
        if let (Some(period), Some(router)) = (self.config.keep_alive, &self.router) {
            self.keep_alive = Some(router.start_timer(period));
        }
    }

    fn cancel_keep_alive(&mut self) {
        if let Some(id) = self.keep_alive.take() {
            if let Some(router) = &self.router {
                router.cancel_timer(id);
            }
        }
    }
}
