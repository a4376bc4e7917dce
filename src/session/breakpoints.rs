//! Breakpoint synchronization between client lines and remote breakpoint locations.
//!
//! The client always sends the complete list of lines it wants for a source, the remote side
//! knows which locations of the script are enabled. Only the difference is sent to the engine.

use crate::remote::{Completion, Pending, RemoteDebugClient, RemoteError, ScriptId};

/// Partition of desired and active lines, in the order of the list each line comes from.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    /// Desired but not active.
    pub to_add: Vec<u32>,
    /// Active but not desired.
    pub to_remove: Vec<u32>,
    /// Desired and already active.
    pub to_keep: Vec<u32>,
}

impl SyncPlan {
    pub fn diff(desired: &[u32], active: &[u32]) -> Self {
        let to_add = desired
            .iter()
            .filter(|line| !active.contains(line))
            .copied()
            .collect::<Vec<_>>();
        let to_remove = active
            .iter()
            .filter(|line| !desired.contains(line))
            .copied()
            .collect();
        let to_keep = desired
            .iter()
            .filter(|line| !to_add.contains(line))
            .copied()
            .collect();

        Self {
            to_add,
            to_remove,
            to_keep,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

struct Activation {
    line: u32,
    ack: Pending<()>,
    confirmed: bool,
}

/// Breakpoint synchronization waiting for the engine to confirm new breakpoints.
pub struct Reconciliation {
    script_id: ScriptId,
    kept: Vec<u32>,
    activations: Vec<Activation>,
}

impl Reconciliation {
    pub fn script_id(&self) -> ScriptId {
        self.script_id
    }

    /// Verified lines, kept ones first, once every activation is acknowledged.
    ///
    /// The first rejected activation fails the whole synchronization.
    pub fn poll(&mut self) -> Completion<Vec<u32>> {
        let mut waiting = false;
        for activation in self.activations.iter_mut().filter(|a| !a.confirmed) {
            match activation.ack.poll() {
                Completion::Done(Ok(())) => activation.confirmed = true,
                Completion::Done(Err(err)) => return Completion::Done(Err(err)),
                Completion::Waiting => waiting = true,
                Completion::Abandoned => return Completion::Abandoned,
            }
        }
        if waiting {
            return Completion::Waiting;
        }

        let lines = self
            .kept
            .iter()
            .copied()
            .chain(self.activations.iter().map(|a| a.line))
            .collect();
        Completion::Done(Ok(lines))
    }
}

/// Bring the enabled breakpoints of `script_id` in line with `desired`.
///
/// Activations are awaited through the returned [`Reconciliation`], deactivations are not.
pub fn reconcile(
    remote: &mut dyn RemoteDebugClient,
    script_id: ScriptId,
    desired: &[u32],
) -> Result<Reconciliation, RemoteError> {
    let active = remote.active_breakpoint_lines(script_id);
    let plan = SyncPlan::diff(desired, &active);
    log::debug!(target: "dap", "breakpoints of script #{script_id}: {plan:?}");

    let mut activations = Vec::with_capacity(plan.to_add.len());
    for &line in &plan.to_add {
        let breakpoint = remote.find_breakpoint(script_id, line)?;
        activations.push(Activation {
            line,
            ack: remote.update_breakpoint(&breakpoint, true),
            confirmed: false,
        });
    }

    for &line in &plan.to_remove {
        let breakpoint = match remote.find_breakpoint(script_id, line) {
            Ok(breakpoint) => breakpoint,
            Err(err) => {
                log::warn!(target: "dap", "breakpoint at line {line} not removed: {err}");
                continue;
            }
        };
        let mut ack = remote.update_breakpoint(&breakpoint, false);
        if let Completion::Done(Err(err)) = ack.poll() {
            log::warn!(target: "dap", "breakpoint at line {line} not removed: {err}");
        }
    }

    Ok(Reconciliation {
        script_id,
        kept: plan.to_keep,
        activations,
    })
}
