//! Admission controller.
//!
//! Decides who may enter a room. Each room admits at most `ROOM_CAPACITY`
//! distinct participant tokens for its whole lifetime; a token that is
//! already a member re-enters without using a slot.
//!
//! The membership check and the slot assignment are one store operation, so
//! concurrent first-time visitors can never push a room past capacity.

use crate::errors::RoomError;
use crate::models::{RoomMeta, ROOM_CAPACITY};
use crate::observability::metrics;
use crate::store::{AdmitOutcome, RoomStore};
use common::types::{ParticipantToken, RoomId};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Length of a participant token secret in bytes (256 bits).
const PARTICIPANT_TOKEN_BYTES: usize = 32;

/// Outcome of a successful admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The caller presented a token that was already a member.
    Existing(ParticipantToken),

    /// The caller took a free slot with a freshly minted token, which must be
    /// handed back to them.
    Issued(ParticipantToken),
}

impl Admission {
    pub fn token(&self) -> &ParticipantToken {
        match self {
            Admission::Existing(token) | Admission::Issued(token) => token,
        }
    }

    pub fn is_issued(&self) -> bool {
        matches!(self, Admission::Issued(_))
    }
}

/// Gatekeeper for room entry.
#[derive(Clone)]
pub struct AdmissionController {
    store: Arc<dyn RoomStore>,
}

impl AdmissionController {
    pub fn new(store: Arc<dyn RoomStore>) -> Self {
        Self { store }
    }

    /// Admit the caller to a room, minting a token if they need a slot.
    ///
    /// # Errors
    ///
    /// - `RoomNotFound` if the room does not exist
    /// - `RoomFull` if every slot is held by another token
    #[instrument(skip_all, fields(room_id = %room_id, presented = presented.is_some()))]
    pub async fn admit(
        &self,
        room_id: &RoomId,
        presented: Option<&ParticipantToken>,
    ) -> Result<Admission, RoomError> {
        // Minted up front; only recorded if the store grants a slot.
        let candidate = generate_participant_token()?;

        let outcome = self
            .store
            .admit(room_id, presented, &candidate, ROOM_CAPACITY)
            .await?;
        metrics::record_admission(outcome.as_str());

        match outcome {
            AdmitOutcome::Reentered => {
                debug!(target: "room.admission", room_id = %room_id, "Participant re-entered");
                presented.cloned().map(Admission::Existing).ok_or_else(|| {
                    RoomError::Internal("store reported re-entry without a token".to_string())
                })
            }
            AdmitOutcome::Admitted => {
                info!(target: "room.admission", room_id = %room_id, "Participant admitted");
                Ok(Admission::Issued(candidate))
            }
            AdmitOutcome::Full => {
                info!(target: "room.admission", room_id = %room_id, "Admission denied, room full");
                Err(RoomError::RoomFull)
            }
            AdmitOutcome::NotFound => {
                debug!(target: "room.admission", room_id = %room_id, "Admission denied, no such room");
                Err(RoomError::RoomNotFound)
            }
        }
    }

    /// Check that the caller already holds a member token. Never takes a slot.
    ///
    /// # Errors
    ///
    /// - `RoomNotFound` if the room does not exist
    /// - `NotParticipant` if no token was presented or it is not a member
    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn verify(
        &self,
        room_id: &RoomId,
        presented: Option<&ParticipantToken>,
    ) -> Result<RoomMeta, RoomError> {
        let meta = self
            .store
            .room_meta(room_id)
            .await?
            .ok_or(RoomError::RoomNotFound)?;

        match presented {
            Some(token) if meta.is_member(token) => Ok(meta),
            _ => Err(RoomError::NotParticipant),
        }
    }
}

/// Generate a participant token.
///
/// 32 bytes from the system CSPRNG, hex encoded to 64 characters.
fn generate_participant_token() -> Result<ParticipantToken, RoomError> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; PARTICIPANT_TOKEN_BYTES];

    rng.fill(&mut bytes).map_err(|e| {
        tracing::error!(target: "room.admission", error = %e, "Failed to generate random bytes for participant token");
        RoomError::Internal("RNG failure".to_string())
    })?;

    ParticipantToken::parse(&hex::encode(bytes))
        .map_err(|e| RoomError::Internal(format!("Generated token rejected: {e}")))
}
