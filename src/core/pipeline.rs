//! Transaction id assignment and in-order reply matching.
//!
//! Requests move `outbound` -> `in_flight` -> completed. The ensemble answers
//! in submission order, so a reply must always match the oldest in-flight
//! entry; anything else is a protocol violation.

use std::collections::VecDeque;

use tokio::time::Instant;
use tracing::debug;

use super::WatchIntent;
use crate::proto::Request;
use crate::Completion;
use crate::ProtocolError;
use crate::Result;

/// One caller operation travelling through the pipeline.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    /// Assigned on enqueue, kept across resends
    pub(crate) xid: i32,
    pub(crate) request: Request,
    pub(crate) watch: Option<WatchIntent>,
    pub(crate) completion: Completion,
    pub(crate) submit_time: Instant,
    /// Re-send after connection loss instead of failing
    pub(crate) resend: bool,
}

impl PendingRequest {
    pub(crate) fn new(
        request: Request,
        watch: Option<WatchIntent>,
        completion: Completion,
        resend: bool,
    ) -> Self {
        Self {
            xid: 0,
            request,
            watch,
            completion,
            submit_time: Instant::now(),
            resend,
        }
    }

    pub(crate) fn op_name(&self) -> &'static str {
        self.request.op_name()
    }
}

#[derive(Debug)]
pub(crate) struct RequestPipeline {
    next_xid: i32,
    outbound: VecDeque<PendingRequest>,
    in_flight: VecDeque<PendingRequest>,
}

impl Default for RequestPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestPipeline {
    pub(crate) fn new() -> Self {
        Self::starting_at(1)
    }

    pub(crate) fn starting_at(first_xid: i32) -> Self {
        Self {
            next_xid: first_xid.max(1),
            outbound: VecDeque::new(),
            in_flight: VecDeque::new(),
        }
    }

    /// Next caller xid. Positive, strictly increasing, wraps back to 1.
    pub(crate) fn allocate_xid(&mut self) -> i32 {
        let xid = self.next_xid;
        self.next_xid = if xid == i32::MAX { 1 } else { xid + 1 };
        xid
    }

    /// Assigns an xid and queues the request for writing.
    pub(crate) fn enqueue(
        &mut self,
        mut request: PendingRequest,
    ) -> i32 {
        request.xid = self.allocate_xid();
        let xid = request.xid;
        self.outbound.push_back(request);
        xid
    }

    pub(crate) fn pop_outbound(&mut self) -> Option<PendingRequest> {
        self.outbound.pop_front()
    }

    /// Returns a request that could not be written to the head of the queue.
    pub(crate) fn requeue_front(
        &mut self,
        request: PendingRequest,
    ) {
        self.outbound.push_front(request);
    }

    pub(crate) fn mark_sent(
        &mut self,
        request: PendingRequest,
    ) {
        self.in_flight.push_back(request);
    }

    /// Removes the oldest in-flight request if `xid` matches it.
    pub(crate) fn match_reply(
        &mut self,
        xid: i32,
    ) -> Result<PendingRequest> {
        let expected = self.in_flight.front().map(|r| r.xid);
        if expected == Some(xid) {
            if let Some(request) = self.in_flight.pop_front() {
                return Ok(request);
            }
        }
        Err(ProtocolError::UnexpectedXid {
            expected,
            received: xid,
        }
        .into())
    }

    /// Moves in-flight requests back in front of the outbound queue, keeping
    /// their relative order. Requests that opted out of resending are
    /// returned so the caller can fail them.
    pub(crate) fn on_connection_loss(&mut self) -> Vec<PendingRequest> {
        let mut failed = Vec::new();
        let mut resend = VecDeque::with_capacity(self.in_flight.len());
        for request in self.in_flight.drain(..) {
            if request.resend {
                resend.push_back(request);
            } else {
                failed.push(request);
            }
        }
        debug!(
            resend = resend.len(),
            failed = failed.len(),
            queued = self.outbound.len(),
            "pipeline reset after connection loss"
        );
        resend.append(&mut self.outbound);
        self.outbound = resend;
        failed
    }

    /// Takes every pending request, oldest first.
    pub(crate) fn drain_all(&mut self) -> Vec<PendingRequest> {
        self.in_flight.drain(..).chain(self.outbound.drain(..)).collect()
    }

    pub(crate) fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub(crate) fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.in_flight.is_empty() && self.outbound.is_empty()
    }
}
