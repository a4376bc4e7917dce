//! Client side of the bridge: Debug Adapter Protocol messages and framing.

pub mod protocol;
pub mod tracer;
pub mod transport;

use protocol::{Event, Response};

/// Outbound half of the client session, injected into the session controller.
pub trait ClientSink {
    fn respond(&mut self, response: Response) -> anyhow::Result<()>;

    fn send_event(&mut self, event: Event) -> anyhow::Result<()>;
}
