//! The worker loop - runs on a dedicated thread.
//!
//! Exactly one instance of the engine state exists, owned by this loop, and
//! jobs execute against it strictly one at a time. The suspend gate defers
//! compute jobs while the suspend level is above zero; control messages are
//! processed immediately regardless of the level.

use std::collections::VecDeque;

use flume::Receiver;
use log::{debug, trace};

use crate::envelope::{Envelope, Job, TaskId};

pub(crate) fn worker_loop<S>(mut state: S, inbound: Receiver<Envelope<S>>) {
    let mut suspend_level: u32 = 0;
    let mut deferred: VecDeque<Job<S>> = VecDeque::new();

    debug!("worker loop started");

    for envelope in inbound.iter() {
        match envelope {
            Envelope::Compute {
                id,
                job,
                bypass_gate,
            } => {
                if suspend_level > 0 && !bypass_gate {
                    trace!("{id} deferred (suspend level {suspend_level})");
                    deferred.push_back(job);
                } else {
                    trace!("{id} executing");
                    job(&mut state);
                }
            }

            Envelope::Suspend { ack } => {
                suspend_level += 1;
                trace!("suspended (level {suspend_level})");
                // Acknowledge only after the level is raised, so the caller
                // can rely on "no further compute starts" once this returns.
                let _ = ack.send(());
            }

            Envelope::Resume { ack } => {
                suspend_level = suspend_level.saturating_sub(1);
                trace!("resumed (level {suspend_level})");
                if suspend_level == 0 && !deferred.is_empty() {
                    debug!("draining {} deferred task(s)", deferred.len());
                    while let Some(job) = deferred.pop_front() {
                        job(&mut state);
                    }
                }
                let _ = ack.send(());
            }

            Envelope::Stop => {
                if !deferred.is_empty() {
                    debug!("stopping with {} deferred task(s) dropped", deferred.len());
                }
                break;
            }
        }
    }

    debug!("worker loop stopped");
}
