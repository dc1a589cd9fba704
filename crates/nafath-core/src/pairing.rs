//! Visual pairing flow
//!
//! Issues a random colour sequence per flow and marks the session verified
//! once a scanner submits a matching sequence.

use crate::config::PairingConfig;
use crate::error::{HandshakeError, HandshakeResult};
use crate::locks::FlowLocks;
use crate::sequence;
use crate::store::{self, SlotStore};
use crate::types::{Color, FlowId, SessionStatus, SessionTicket, Slot, VerifyOutcome, VisualSession};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;

/// Pairing state machine over a slot store
pub struct PairingFlow {
    store: Arc<dyn SlotStore>,
    locks: Arc<FlowLocks>,
    config: PairingConfig,
}

impl PairingFlow {
    /// Create flow with the given settings
    #[must_use]
    pub fn new(store: Arc<dyn SlotStore>, config: PairingConfig) -> Self {
        Self {
            store,
            locks: Arc::new(FlowLocks::new()),
            config,
        }
    }

    /// Share a lock table with other flows over the same store
    #[inline]
    #[must_use]
    pub fn with_locks(mut self, locks: Arc<FlowLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Active settings
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PairingConfig {
        &self.config
    }

    /// Issue a new sequence, replacing any existing session
    ///
    /// `None` uses the configured default length.
    ///
    /// # Errors
    /// - `HandshakeError::InvalidSequenceLength` above the configured maximum
    /// - `HandshakeError::Store` on persistence failure
    pub async fn create_session(
        &self,
        flow: &FlowId,
        length: Option<usize>,
    ) -> HandshakeResult<SessionTicket> {
        let length = length.unwrap_or(self.config.sequence_length);
        if length > self.config.max_sequence_length {
            return Err(HandshakeError::InvalidSequenceLength {
                requested: length,
                max: self.config.max_sequence_length,
            });
        }
        let sequence = sequence::generate(length, &mut rand::rng());

        let _guard = self.locks.lock(flow).await;
        let session = self.store_session(flow, sequence).await?;
        Ok(session.ticket())
    }

    /// Issue a session for a caller-chosen sequence
    ///
    /// # Errors
    /// - `HandshakeError::Store` on persistence failure
    pub async fn create_session_with(
        &self,
        flow: &FlowId,
        sequence: Vec<Color>,
    ) -> HandshakeResult<SessionTicket> {
        let _guard = self.locks.lock(flow).await;
        let session = self.store_session(flow, sequence).await?;
        Ok(session.ticket())
    }

    async fn store_session(
        &self,
        flow: &FlowId,
        sequence: Vec<Color>,
    ) -> HandshakeResult<VisualSession> {
        let session = VisualSession::new(sequence);
        store::save(self.store.as_ref(), flow, Slot::VisualSession, &session).await?;
        tracing::info!(
            flow = %flow,
            length = session.sequence.len(),
            "visual session created"
        );
        Ok(session)
    }

    /// Current session, issuing one with the default length if none is live
    ///
    /// # Errors
    /// - `HandshakeError::Store` on persistence failure
    pub async fn get_or_create_session(&self, flow: &FlowId) -> HandshakeResult<VisualSession> {
        let _guard = self.locks.lock(flow).await;
        if let Some(session) = self.live_session(flow).await? {
            return Ok(session);
        }
        let sequence = sequence::generate(self.config.sequence_length, &mut rand::rng());
        self.store_session(flow, sequence).await
    }

    /// Compare a candidate against the session's sequence
    ///
    /// Separators, whitespace and case are ignored. A mismatch is an `Ok`
    /// outcome with `success: false`.
    ///
    /// # Errors
    /// - `HandshakeError::NoActiveSession` if no live session exists
    /// - `HandshakeError::Store` on persistence failure
    pub async fn verify(&self, flow: &FlowId, candidate: &str) -> HandshakeResult<VerifyOutcome> {
        let _guard = self.locks.lock(flow).await;
        let mut session = self
            .live_session(flow)
            .await?
            .ok_or(HandshakeError::NoActiveSession)?;

        let expected = session.expected();
        let received = sequence::normalize(candidate);

        if !sequence::matches(&expected, &received, self.config.accept_rotations) {
            tracing::info!(flow = %flow, received = %received, "pairing sequence mismatch");
            return Ok(VerifyOutcome {
                success: false,
                verified: false,
                message: "Sequence does not match".to_string(),
                expected: self.config.disclose_expected.then_some(expected),
                received,
                verified_at: None,
            });
        }

        if !session.verified {
            session.verified = true;
            session.verified_at = Some(Utc::now());
        }
        store::save(self.store.as_ref(), flow, Slot::VisualSession, &session).await?;
        tracing::info!(flow = %flow, "visual session verified");

        Ok(VerifyOutcome {
            success: true,
            verified: true,
            message: "Sequence verified".to_string(),
            expected: None,
            received,
            verified_at: session.verified_at,
        })
    }

    /// Verification state of the live session
    ///
    /// # Errors
    /// - `HandshakeError::NoActiveSession` if no live session exists
    pub async fn status(&self, flow: &FlowId) -> HandshakeResult<SessionStatus> {
        self.live_session(flow)
            .await?
            .map(|s| s.status())
            .ok_or(HandshakeError::NoActiveSession)
    }

    /// Stored session unless it outlived the configured TTL
    async fn live_session(&self, flow: &FlowId) -> HandshakeResult<Option<VisualSession>> {
        let Some(session) =
            store::load::<VisualSession>(self.store.as_ref(), flow, Slot::VisualSession).await?
        else {
            return Ok(None);
        };

        if let Some(ttl) = self.config.session_ttl() {
            let age = (Utc::now() - session.created_at)
                .to_std()
                .unwrap_or_default();
            if age > ttl {
                tracing::debug!(flow = %flow, age_secs = age.as_secs(), "visual session expired");
                return Ok(None);
            }
        }
        Ok(Some(session))
    }
}

impl fmt::Debug for PairingFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairingFlow")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySlotStore;
    use chrono::Duration as ChronoDuration;

    fn pairing(config: PairingConfig) -> (PairingFlow, Arc<MemorySlotStore>) {
        let store = Arc::new(MemorySlotStore::new());
        (PairingFlow::new(store.clone(), config), store)
    }

    #[tokio::test]
    async fn create_uses_default_length() {
        let (flow, _) = pairing(PairingConfig::default());
        let ticket = flow.create_session(&FlowId::default(), None).await.unwrap();
        assert_eq!(ticket.sequence.len(), 4);
        assert_eq!(ticket.sequence_string.len(), 7);
        assert!(sequence::has_no_adjacent_repeats(&ticket.sequence));
    }

    #[tokio::test]
    async fn create_rejects_oversized_length() {
        let (flow, store) = pairing(PairingConfig::default());
        let err = flow
            .create_session(&FlowId::default(), Some(17))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HandshakeError::InvalidSequenceLength { requested: 17, max: 16 }
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn verified_at_is_set_once() {
        let (flow, _) = pairing(PairingConfig::default());
        let id = FlowId::default();
        flow.create_session_with(&id, vec![Color::Red, Color::Green])
            .await
            .unwrap();

        let first = flow.verify(&id, "rg").await.unwrap();
        let second = flow.verify(&id, "R-G").await.unwrap();
        assert!(first.success && second.success);
        assert_eq!(first.verified_at, second.verified_at);

        // A later miss fails the attempt but leaves the stored session verified.
        let miss = flow.verify(&id, "GR").await.unwrap();
        assert!(!miss.success);
        assert!(!miss.verified);
        let status = flow.status(&id).await.unwrap();
        assert!(status.verified);
        assert_eq!(status.verified_at, first.verified_at);
    }

    #[tokio::test]
    async fn mismatch_keeps_session_unverified() {
        let (flow, _) = pairing(PairingConfig::default());
        let id = FlowId::default();
        flow.create_session_with(&id, vec![Color::Red, Color::Green])
            .await
            .unwrap();

        let outcome = flow.verify(&id, "GR").await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.expected.as_deref(), Some("RG"));
        assert!(!flow.status(&id).await.unwrap().verified);
    }

    #[tokio::test]
    async fn disclosure_can_be_disabled() {
        let (flow, _) = pairing(PairingConfig {
            disclose_expected: false,
            ..PairingConfig::default()
        });
        let id = FlowId::default();
        flow.create_session_with(&id, vec![Color::Blue]).await.unwrap();

        let outcome = flow.verify(&id, "Y").await.unwrap();
        assert!(outcome.expected.is_none());
        assert_eq!(outcome.received, "Y");
    }

    #[tokio::test]
    async fn rotations_accepted_when_enabled() {
        let (flow, _) = pairing(PairingConfig {
            accept_rotations: true,
            ..PairingConfig::default()
        });
        let id = FlowId::default();
        flow.create_session_with(
            &id,
            vec![Color::Red, Color::Green, Color::Blue, Color::Yellow],
        )
        .await
        .unwrap();

        assert!(flow.verify(&id, "B-Y-R-G").await.unwrap().success);
    }

    #[tokio::test]
    async fn expired_session_is_absent() {
        let (flow, store) = pairing(PairingConfig {
            session_ttl_secs: Some(60),
            ..PairingConfig::default()
        });
        let id = FlowId::default();

        let mut stale = VisualSession::new(vec![Color::Cyan, Color::Magenta]);
        stale.created_at = Utc::now() - ChronoDuration::seconds(120);
        store::save(store.as_ref(), &id, Slot::VisualSession, &stale)
            .await
            .unwrap();

        assert!(matches!(
            flow.verify(&id, "CM").await,
            Err(HandshakeError::NoActiveSession)
        ));
        assert!(matches!(
            flow.status(&id).await,
            Err(HandshakeError::NoActiveSession)
        ));

        let fresh = flow.get_or_create_session(&id).await.unwrap();
        assert!(fresh.created_at > stale.created_at);
    }
}
