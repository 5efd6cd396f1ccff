//! Escalating stop protocol
//!
//! Phases run in a fixed order, each retried `attempts` times with
//! `wait_interval` between tries. After every try the target is asked
//! whether it has exited, and the protocol returns the moment it has.
//! When the last phase also fails the whole cycle starts over, up to
//! `max_cycles` times.

use std::time::Duration;

use tracing::{debug, error, info};

use crate::error::{ProcessError, Result, SignalError};
use crate::signals::SignalStrategy;

/// Outer retry bound for the five-phase cycle
pub const DEFAULT_MAX_STOP_CYCLES: u32 = 20;

/// One escalation stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopPhase {
    Interrupt,
    Terminate,
    Kill,
    AggressiveKill,
    ForceKill,
}

impl StopPhase {
    /// Escalation order
    pub const ALL: [StopPhase; 5] = [
        StopPhase::Interrupt,
        StopPhase::Terminate,
        StopPhase::Kill,
        StopPhase::AggressiveKill,
        StopPhase::ForceKill,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StopPhase::Interrupt => "interrupt",
            StopPhase::Terminate => "terminate",
            StopPhase::Kill => "kill",
            StopPhase::AggressiveKill => "aggressive-kill",
            StopPhase::ForceKill => "force-kill",
        }
    }
}

/// Something the protocol can stop
pub trait StopTarget: Send {
    fn pid(&self) -> u32;

    /// Last-resort kill through the process reference itself
    fn force_kill(&mut self) -> std::result::Result<(), SignalError>;

    /// Live check, re-evaluated after every try
    fn has_exited(&mut self) -> bool;
}

/// Where the protocol succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopOutcome {
    pub phase: StopPhase,
    pub cycle: u32,
    pub attempt: u32,
}

/// Attempts, pacing and retry bound for one stop
#[derive(Debug, Clone, Copy)]
pub struct StopProtocol {
    attempts: u32,
    wait_interval: Duration,
    max_cycles: u32,
}

impl StopProtocol {
    /// `attempts` below 1 is raised to 1
    pub fn new(attempts: u32, wait_interval: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            wait_interval,
            max_cycles: DEFAULT_MAX_STOP_CYCLES,
        }
    }

    pub fn max_cycles(mut self, cycles: u32) -> Self {
        self.max_cycles = cycles.max(1);
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn wait_interval(&self) -> Duration {
        self.wait_interval
    }

    /// Escalate until `target` exits or every cycle is spent
    pub async fn run<T>(
        &self,
        tag: &str,
        target: &mut T,
        signals: &dyn SignalStrategy,
    ) -> Result<StopOutcome>
    where
        T: StopTarget + ?Sized,
    {
        let pid = target.pid();
        let mut last_error: Option<SignalError> = None;

        for cycle in 1..=self.max_cycles {
            for phase in StopPhase::ALL {
                for attempt in 1..=self.attempts {
                    debug!(
                        tag = %tag,
                        pid,
                        phase = phase.name(),
                        attempt,
                        cycle,
                        "Stop attempt"
                    );

                    if let Err(e) = deliver(phase, pid, target, signals) {
                        debug!(tag = %tag, pid, phase = phase.name(), error = %e, "Signal delivery failed");
                        last_error = Some(e);
                    }

                    self.pause().await;

                    if target.has_exited() {
                        info!(tag = %tag, pid, phase = phase.name(), attempt, cycle, "Process stopped");
                        return Ok(StopOutcome {
                            phase,
                            cycle,
                            attempt,
                        });
                    }
                }
            }
        }

        error!(
            tag = %tag,
            pid,
            cycles = self.max_cycles,
            "Process survived every stop phase"
        );
        Err(ProcessError::StopFailed {
            pid,
            cycles: self.max_cycles,
            last_error,
        })
    }

    async fn pause(&self) {
        if self.wait_interval.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.wait_interval).await;
        }
    }
}

fn deliver<T>(
    phase: StopPhase,
    pid: u32,
    target: &mut T,
    signals: &dyn SignalStrategy,
) -> std::result::Result<(), SignalError>
where
    T: StopTarget + ?Sized,
{
    match phase {
        StopPhase::Interrupt => {
            let posix = signals.interrupt(pid);
            let equivalent = signals.interrupt_equivalent(pid);
            posix.and(equivalent)
        }
        StopPhase::Terminate => signals.terminate(pid),
        StopPhase::Kill => signals.kill(pid),
        StopPhase::AggressiveKill => signals.aggressive_kill(pid),
        StopPhase::ForceKill => target.force_kill(),
    }
}
