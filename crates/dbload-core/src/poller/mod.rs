//! Client side of the load protocol: submit a job, then poll its status
//! until it reaches a terminal state.
//!
//! [`Poller`] is a pure state machine; it never performs I/O. Feeding it a
//! [`PollerEvent`] returns the [`Effect`]s the caller must carry out.
//! [`drive`] is the async loop that executes those effects against a
//! [`LoadApi`] on a fixed interval.

mod http;

pub use http::CurlLoadApi;

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::MissedTickBehavior;

use crate::job::JobStatus;

/// Why a load ended in the `Failed` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The server refused the submission outright.
    Rejected(String),
    /// The job was accepted but its download or install failed.
    JobFailed(String),
    /// The server could not be reached or answered nonsense.
    Transport(String),
}

impl FailureReason {
    pub fn message(&self) -> &str {
        match self {
            FailureReason::Rejected(m) | FailureReason::JobFailed(m) | FailureReason::Transport(m) => m,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Submitting,
    Polling {
        status_url: String,
        last: JobStatus,
    },
    Done {
        status: JobStatus,
    },
    Failed {
        reason: FailureReason,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollerEvent {
    Submit,
    /// Server reply to the submission: the initial job, or its error message.
    SubmitResponse(Result<JobStatus, String>),
    Tick,
    StatusReceived(JobStatus),
    TransportError(String),
    Reset,
}

/// Work requested by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    SendSubmission,
    StartTimer,
    StopTimer,
    FetchStatus(String),
    Render,
}

/// How progress should be displayed for a job snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressView {
    /// Size known: fraction in [0, 1].
    Determinate { done: u64, todo: u64, fraction: f64 },
    /// Size unknown: only a byte count.
    Indeterminate { done: u64 },
}

impl ProgressView {
    pub fn of(status: &JobStatus) -> Self {
        match status.fraction() {
            Some(fraction) => ProgressView::Determinate {
                done: status.done_bytes,
                todo: status.todo_bytes,
                fraction,
            },
            None => ProgressView::Indeterminate {
                done: status.done_bytes,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Poller {
    state: PollerState,
}

impl Default for Poller {
    fn default() -> Self {
        Self::new()
    }
}

impl Poller {
    pub fn new() -> Self {
        Self {
            state: PollerState::Idle,
        }
    }

    pub fn state(&self) -> &PollerState {
        &self.state
    }

    pub fn into_state(self) -> PollerState {
        self.state
    }

    /// A submission is in flight or being polled; the form stays disabled.
    pub fn is_busy(&self) -> bool {
        matches!(self.state, PollerState::Submitting | PollerState::Polling { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, PollerState::Done { .. } | PollerState::Failed { .. })
    }

    /// Progress of the job being polled, if any.
    pub fn progress(&self) -> Option<ProgressView> {
        match &self.state {
            PollerState::Polling { last, .. } => Some(ProgressView::of(last)),
            PollerState::Done { status } => Some(ProgressView::of(status)),
            _ => None,
        }
    }

    /// Applies `event` and returns the effects to perform, in order.
    /// Events that do not apply to the current state are ignored.
    pub fn handle(&mut self, event: PollerEvent) -> Vec<Effect> {
        let state = std::mem::replace(&mut self.state, PollerState::Idle);
        let (next, effects) = transition(state, event);
        self.state = next;
        effects
    }
}

fn transition(state: PollerState, event: PollerEvent) -> (PollerState, Vec<Effect>) {
    use PollerEvent as E;
    use PollerState as S;

    match (state, event) {
        (S::Idle | S::Done { .. } | S::Failed { .. }, E::Submit) => {
            (S::Submitting, vec![Effect::SendSubmission, Effect::Render])
        }

        (S::Submitting, E::SubmitResponse(Ok(status))) => match status.error.clone() {
            Some(msg) => (
                S::Failed {
                    reason: FailureReason::Rejected(msg),
                },
                vec![Effect::Render],
            ),
            None => (
                S::Polling {
                    status_url: status.status_url.clone(),
                    last: status,
                },
                vec![Effect::StartTimer, Effect::Render],
            ),
        },
        (S::Submitting, E::SubmitResponse(Err(msg))) => (
            S::Failed {
                reason: FailureReason::Rejected(msg),
            },
            vec![Effect::Render],
        ),
        (S::Submitting, E::TransportError(msg)) => (
            S::Failed {
                reason: FailureReason::Transport(msg),
            },
            vec![Effect::Render],
        ),

        (S::Polling { status_url, last }, E::Tick) => {
            let fetch = Effect::FetchStatus(status_url.clone());
            (S::Polling { status_url, last }, vec![fetch])
        }
        (S::Polling { status_url, last }, E::StatusReceived(status)) => {
            if !status.done {
                // Never show progress going backwards.
                let status = if status.done_bytes < last.done_bytes { last } else { status };
                return (
                    S::Polling {
                        status_url,
                        last: status,
                    },
                    vec![Effect::Render],
                );
            }
            let next = match status.error.clone() {
                None => S::Done { status },
                Some(msg) => S::Failed {
                    reason: FailureReason::JobFailed(msg),
                },
            };
            (next, vec![Effect::StopTimer, Effect::Render])
        }
        (S::Polling { .. }, E::TransportError(msg)) => (
            S::Failed {
                reason: FailureReason::Transport(msg),
            },
            vec![Effect::StopTimer, Effect::Render],
        ),

        (S::Done { .. } | S::Failed { .. }, E::Reset) => (S::Idle, vec![Effect::Render]),

        (state, _) => (state, Vec::new()),
    }
}

/// Errors from a [`LoadApi`] call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiCallError {
    /// The server answered with an error payload.
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    Transport(String),
}

/// The two calls of the load protocol.
#[async_trait]
pub trait LoadApi: Send + Sync {
    async fn submit(&self, url: &str, name: &str) -> Result<JobStatus, ApiCallError>;
    async fn status(&self, status_url: &str) -> Result<JobStatus, ApiCallError>;
}

/// Runs one submit-and-poll cycle to a terminal state.
///
/// `observe` is called on every `Render` effect with the current state.
pub async fn drive<A, F>(
    api: &A,
    url: &str,
    name: &str,
    interval: Duration,
    mut observe: F,
) -> PollerState
where
    A: LoadApi + ?Sized,
    F: FnMut(&Poller),
{
    let mut poller = Poller::new();
    let mut pending: VecDeque<Effect> = poller.handle(PollerEvent::Submit).into();
    let mut ticker = None;

    loop {
        while let Some(effect) = pending.pop_front() {
            let event = match effect {
                Effect::SendSubmission => Some(match api.submit(url, name).await {
                    Ok(status) => PollerEvent::SubmitResponse(Ok(status)),
                    Err(ApiCallError::Rejected(msg)) => PollerEvent::SubmitResponse(Err(msg)),
                    Err(ApiCallError::Transport(msg)) => PollerEvent::TransportError(msg),
                }),
                Effect::FetchStatus(status_url) => Some(match api.status(&status_url).await {
                    Ok(status) => PollerEvent::StatusReceived(status),
                    Err(e) => PollerEvent::TransportError(e.to_string()),
                }),
                Effect::StartTimer => {
                    let mut t = tokio::time::interval(interval);
                    t.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    t.tick().await; // first tick is immediate
                    ticker = Some(t);
                    None
                }
                Effect::StopTimer => {
                    ticker = None;
                    None
                }
                Effect::Render => {
                    observe(&poller);
                    None
                }
            };
            if let Some(event) = event {
                pending.extend(poller.handle(event));
            }
        }

        if poller.is_terminal() {
            return poller.into_state();
        }
        match ticker.as_mut() {
            Some(t) => {
                t.tick().await;
                pending.extend(poller.handle(PollerEvent::Tick));
            }
            None => return poller.into_state(),
        }
    }
}
