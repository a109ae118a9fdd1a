//! Application layer attachment contract

use bytes::Bytes;

/// Upper layer of a protocol stack
///
/// Called from the port's serialized context; implementations must not
/// block.
pub trait AppLayer: Send {
    /// The link came online
    fn on_lower_layer_up(&mut self);

    /// The link went offline
    fn on_lower_layer_down(&mut self);

    /// A complete fragment arrived
    fn on_receive(&mut self, apdu: Bytes);

    /// Outcome of the last fragment sent
    fn on_send_result(&mut self, success: bool);
}
