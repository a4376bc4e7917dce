//! Remote notifications → client events.

use crate::dap::protocol::{Event, StoppedReason};
use crate::remote::{RemoteEvent, ScriptId};

/// The only thread ever reported to the client.
pub const THREAD_ID: i64 = 1;

/// What the controller has to do for a single remote notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Bridged {
    Emit(Event),
    SyncSource { id: ScriptId, name: Option<String> },
    Terminate,
}

pub fn translate(event: RemoteEvent) -> Bridged {
    match event {
        RemoteEvent::BreakpointHit => {
            Bridged::Emit(Event::stopped(StoppedReason::Breakpoint, THREAD_ID, None))
        }
        RemoteEvent::ExceptionHit { message } => Bridged::Emit(Event::stopped(
            StoppedReason::Exception,
            THREAD_ID,
            Some(message),
        )),
        RemoteEvent::Resumed => Bridged::Emit(Event::continued(THREAD_ID)),
        RemoteEvent::ScriptParsed { id, name } => Bridged::SyncSource { id, name },
        RemoteEvent::Closed => Bridged::Terminate,
    }
}
