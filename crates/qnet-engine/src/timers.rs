//! Photon emission timers
//!
//! Each channel slot owns one re-armable emission timer. The engine never
//! touches the scheduler directly: arming and cancelling produce
//! [`TimerCommand`]s that the caller applies after the cycle. Cancelling an
//! idle timer is a no-op.

use std::collections::BTreeMap;

use qnet_core::{ChannelSlot, EmitPhotonRequest, Envelope, MessageBody, SimTime};

/// Instruction for the external scheduler
#[derive(Clone, Debug, PartialEq)]
pub enum TimerCommand {
    /// Deliver `envelope` back to this node at `at`
    ScheduleAt { at: SimTime, envelope: Envelope },
    /// Drop the pending emission timer of `slot`
    Cancel { slot: ChannelSlot },
}

#[derive(Debug)]
struct EmitTimer {
    request: EmitPhotonRequest,
    armed_at: Option<SimTime>,
}

/// Emission timers for every slot of a node
#[derive(Debug, Default)]
pub struct EmitTimers {
    timers: BTreeMap<ChannelSlot, EmitTimer>,
    commands: Vec<TimerCommand>,
}

impl EmitTimers {
    pub fn new<I>(slots: I) -> Self
    where
        I: IntoIterator<Item = ChannelSlot>,
    {
        EmitTimers {
            timers: slots
                .into_iter()
                .map(|slot| {
                    (
                        slot,
                        EmitTimer {
                            request: EmitPhotonRequest::new(slot),
                            armed_at: None,
                        },
                    )
                })
                .collect(),
            commands: Vec::new(),
        }
    }

    pub fn has_timer(&self, slot: ChannelSlot) -> bool {
        self.timers.contains_key(&slot)
    }

    /// Start a new emission round at `at`. False when the slot has no timer.
    pub fn schedule_emission(&mut self, slot: ChannelSlot, at: SimTime, interval: SimTime, msm: bool) -> bool {
        let Some(timer) = self.timers.get_mut(&slot) else {
            return false;
        };
        timer.request.first = true;
        timer.request.interval = interval;
        timer.request.msm = msm;
        timer.armed_at = Some(at);
        self.commands.push(TimerCommand::ScheduleAt {
            at,
            envelope: timer_envelope(&timer.request),
        });
        true
    }

    /// The timer for `slot` was delivered; returns its current request
    pub fn fired(&mut self, slot: ChannelSlot) -> Option<EmitPhotonRequest> {
        let timer = self.timers.get_mut(&slot)?;
        timer.armed_at = None;
        Some(timer.request.clone())
    }

    /// Mark the first photon of the round as sent
    pub fn clear_first(&mut self, slot: ChannelSlot) {
        if let Some(timer) = self.timers.get_mut(&slot) {
            timer.request.first = false;
        }
    }

    /// Re-arm with the current request
    pub fn rearm(&mut self, slot: ChannelSlot, at: SimTime) -> bool {
        let Some(timer) = self.timers.get_mut(&slot) else {
            return false;
        };
        timer.armed_at = Some(at);
        self.commands.push(TimerCommand::ScheduleAt {
            at,
            envelope: timer_envelope(&timer.request),
        });
        true
    }

    /// Cancel a pending timer. True if one was pending.
    pub fn cancel(&mut self, slot: ChannelSlot) -> bool {
        let Some(timer) = self.timers.get_mut(&slot) else {
            return false;
        };
        if timer.armed_at.take().is_none() {
            return false;
        }
        self.commands.push(TimerCommand::Cancel { slot });
        true
    }

    pub fn is_armed(&self, slot: ChannelSlot) -> bool {
        self.timers.get(&slot).is_some_and(|t| t.armed_at.is_some())
    }

    pub fn request(&self, slot: ChannelSlot) -> Option<&EmitPhotonRequest> {
        self.timers.get(&slot).map(|t| &t.request)
    }

    pub fn take_commands(&mut self) -> Vec<TimerCommand> {
        std::mem::take(&mut self.commands)
    }
}

fn timer_envelope(request: &EmitPhotonRequest) -> Envelope {
    Envelope::timer("EmitPhotonRequest", MessageBody::EmitPhotonRequest(request.clone()))
}
