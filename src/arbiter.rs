//! Role arbitration: which seat, if any, a session occupies.

use crate::games::chess::{Role, Side};
use crate::record::{GameRecord, SessionId};
use tracing::{debug, info, instrument};

/// A seat the session should claim in the shared record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotClaim {
    /// Seat being claimed.
    pub side: Side,
    /// The record as it should look once the claim lands.
    pub record: GameRecord,
}

/// Outcome of reconciling a session against the shared record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Role the session holds once any claim succeeds.
    pub role: Role,
    /// Write to issue, if the session is taking a seat.
    pub claim: Option<SlotClaim>,
}

impl Reconciliation {
    fn settled(role: Role) -> Self {
        Self { role, claim: None }
    }

    fn claiming(side: Side, record: GameRecord) -> Self {
        Self {
            role: Role::from(side),
            claim: Some(SlotClaim { side, record }),
        }
    }
}

/// Assigns `session_id` a role in `record`.
///
/// Identity checks come first, so observing one's own earlier claim is a
/// no-op and never claims a second seat. A claim is only a proposal: two
/// sessions reconciling the same snapshot will both propose the same open
/// seat, and the store decides which one lands.
#[instrument(skip(record), fields(session_id = %session_id, status = %record.status()))]
pub fn reconcile(record: &GameRecord, session_id: &SessionId) -> Reconciliation {
    let players = record.players();

    if players.white.as_ref() == Some(session_id) {
        debug!("Already seated as White");
        return Reconciliation::settled(Role::White);
    }
    if players.black.as_ref() == Some(session_id) {
        debug!("Already seated as Black");
        return Reconciliation::settled(Role::Black);
    }

    if players.white.is_none() {
        let mut claimed = record.clone();
        claimed.seat(Side::White, session_id.clone());
        info!("Claiming White");
        return Reconciliation::claiming(Side::White, claimed);
    }

    if players.black.is_none() && players.white.as_ref() != Some(session_id) {
        let mut claimed = record.clone();
        claimed.seat(Side::Black, session_id.clone());
        info!(status = %claimed.status(), "Claiming Black");
        return Reconciliation::claiming(Side::Black, claimed);
    }

    debug!("Both seats taken; observing");
    Reconciliation::settled(Role::Observer)
}
