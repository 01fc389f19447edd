//! Collaborators shared by the state machine and the reconciler

use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{ChallengeView, Session, SessionId, SETTLEMENT_GRACE_MS};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::catalog::ContentCatalog;
use crate::clock::Clock;
use crate::error::GameResult;
use crate::fanout::{NotificationFanout, SessionEvent};
use crate::locks::SessionLocks;
use crate::scheduler::RoundScheduler;
use crate::store::SessionStore;

pub struct GameContext {
    pub(crate) store: Arc<dyn SessionStore>,
    pub(crate) catalog: Arc<dyn ContentCatalog>,
    pub(crate) fanout: Arc<dyn NotificationFanout>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) locks: SessionLocks,
    pub(crate) scheduler: Mutex<RoundScheduler>,
    /// Grace stamped on new sessions
    pub(crate) grace_ms: u64,
    pub(crate) rng: Mutex<StdRng>,
}

impl GameContext {
    /// Builds a context with an entropy-seeded RNG and the default grace period
    pub fn new(
        store: Arc<dyn SessionStore>,
        catalog: Arc<dyn ContentCatalog>,
        fanout: Arc<dyn NotificationFanout>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            catalog,
            fanout,
            clock,
            locks: SessionLocks::new(),
            scheduler: Mutex::new(RoundScheduler::new()),
            grace_ms: SETTLEMENT_GRACE_MS,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Makes challenge selection and join codes reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        info!("Using deterministic RNG seed {}", seed);
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Grace period for sessions created from now on
    pub fn with_grace_ms(mut self, grace_ms: u64) -> Self {
        self.grace_ms = grace_ms;
        self
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn catalog(&self) -> &Arc<dyn ContentCatalog> {
        &self.catalog
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Active challenge of the session with its answer withheld
    pub(crate) async fn challenge_view(&self, session: &Session) -> GameResult<Option<ChallengeView>> {
        match session.current_challenge {
            Some(id) => Ok(self.catalog.get_challenge(id).await?.map(|c| c.view())),
            None => Ok(None),
        }
    }

    pub(crate) async fn publish_session(&self, session: &Session) -> GameResult<()> {
        let challenge = self.challenge_view(session).await?;
        self.fanout.publish(
            session.id,
            SessionEvent::SessionUpdated {
                session: session.clone(),
                challenge,
            },
        );
        Ok(())
    }

    pub(crate) async fn publish_participants(&self, session_id: SessionId) -> GameResult<()> {
        let participants = self.store.list_participants(session_id).await?;
        self.fanout
            .publish(session_id, SessionEvent::ParticipantsChanged { participants });
        Ok(())
    }
}
