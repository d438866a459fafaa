//! Scripted fakes shared by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use enphase_client::{EnphaseError, Production};
use parking_lot::Mutex;

use crate::credentials::TokenSource;
use crate::reading::{Reading, ReadingSink};
use crate::scheduler::ProductionSource;

fn status_error(status: u16, url: &str) -> EnphaseError {
    EnphaseError::UnexpectedStatus {
        status,
        url: url.to_string(),
        body: String::new(),
    }
}

/// One scripted refresh cycle.
pub enum TokenStep {
    Ok(String),
    SessionError(u16),
    TokenError(u16),
    /// Never completes.
    Hang,
}

impl TokenStep {
    pub fn ok(token: &str) -> Self {
        Self::Ok(token.to_string())
    }

    pub fn session_error(status: u16) -> Self {
        Self::SessionError(status)
    }

    pub fn token_error(status: u16) -> Self {
        Self::TokenError(status)
    }
}

/// [`TokenSource`] that replays one [`TokenStep`] per refresh cycle.
///
/// Once the script runs out every cycle fails at the session step.
pub struct FakeTokenSource {
    steps: Mutex<VecDeque<TokenStep>>,
    pending_token: Mutex<Option<TokenStep>>,
    calls: AtomicUsize,
    session_ids: Mutex<Vec<String>>,
}

impl FakeTokenSource {
    pub fn new(steps: Vec<TokenStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            pending_token: Mutex::new(None),
            calls: AtomicUsize::new(0),
            session_ids: Mutex::new(Vec::new()),
        }
    }

    /// Number of refresh cycles started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn session_ids_seen(&self) -> Vec<String> {
        self.session_ids.lock().clone()
    }
}

#[async_trait]
impl TokenSource for FakeTokenSource {
    async fn fetch_session_id(&self) -> Result<String, EnphaseError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let step = self.steps.lock().pop_front();
        match step {
            Some(TokenStep::SessionError(status)) => Err(status_error(status, "fake://login")),
            None => Err(status_error(500, "fake://login")),
            Some(TokenStep::Hang) => std::future::pending().await,
            Some(step) => {
                *self.pending_token.lock() = Some(step);
                Ok(format!("session-{call}"))
            }
        }
    }

    async fn fetch_token(&self, session_id: &str) -> Result<String, EnphaseError> {
        self.session_ids.lock().push(session_id.to_string());
        let step = self.pending_token.lock().take();
        match step {
            Some(TokenStep::Ok(token)) => Ok(token),
            Some(TokenStep::TokenError(status)) => Err(status_error(status, "fake://tokens")),
            _ => Err(status_error(500, "fake://tokens")),
        }
    }
}

/// One scripted gateway poll.
pub enum PollStep {
    Ok(Production),
    Error(u16),
    Hang,
}

impl PollStep {
    pub fn ok(today: f64, seven_days: f64, lifetime: f64, now: f64) -> Self {
        Self::Ok(Production {
            watt_hours_today: today,
            watt_hours_seven_days: seven_days,
            watt_hours_lifetime: lifetime,
            watts_now: now,
        })
    }
}

/// [`ProductionSource`] that replays one [`PollStep`] per poll.
///
/// Once the script runs out every poll fails with a 500.
pub struct FakeProductionSource {
    steps: Mutex<VecDeque<PollStep>>,
    tokens: Mutex<Vec<String>>,
}

impl FakeProductionSource {
    pub fn new(steps: Vec<PollStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            tokens: Mutex::new(Vec::new()),
        }
    }

    /// Tokens presented, one per poll.
    pub fn tokens_seen(&self) -> Vec<String> {
        self.tokens.lock().clone()
    }

    pub fn polls(&self) -> usize {
        self.tokens.lock().len()
    }
}

#[async_trait]
impl ProductionSource for FakeProductionSource {
    async fn fetch_production(&self, token: &str) -> Result<Production, EnphaseError> {
        self.tokens.lock().push(token.to_string());
        let step = self.steps.lock().pop_front();
        match step {
            Some(PollStep::Ok(production)) => Ok(production),
            Some(PollStep::Error(status)) => Err(status_error(status, "fake://production")),
            Some(PollStep::Hang) => std::future::pending().await,
            None => Err(status_error(500, "fake://production")),
        }
    }
}

/// Sink that keeps every reading it receives.
#[derive(Default)]
pub struct RecordingSink {
    readings: Mutex<Vec<Reading>>,
}

impl RecordingSink {
    pub fn readings(&self) -> Vec<Reading> {
        self.readings.lock().clone()
    }
}

impl ReadingSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn record(&self, reading: &Reading) {
        self.readings.lock().push(*reading);
    }
}
