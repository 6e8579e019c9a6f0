//! Round reconciliation.
//!
//! Pure transitions over a [`BattleSession`]. Nothing here publishes or
//! spawns; the manager turns the returned outcomes into fan-out and timers.
//!
//! # Session State
//!
//! ```text
//!            battle start                   disconnect / reset
//! ┌──────┐ ───────────────▶ ┌──────────────┐ ─────────────────▶ ┌──────┐
//! │ Idle │                  │ BattleActive │                    │ Idle │
//! └──────┘                  └──────────────┘                    └──────┘
//!                             │  ▲
//!                             └──┘ score / round end / punish finished
//! ```

use std::time::Duration;

use tokio::time::Instant;

use crate::config::BattleConfig;
use crate::engine::filter::{self, KnownAnchors, Rejection};
use crate::engine::timer;
use crate::event::{BattleStatus, ScoreBoard};
use crate::state::participant::{BattleParticipant, ParticipantInfo, Side};
use crate::state::round::{RoundContext, SettleBlocked};
use crate::state::session::BattleSession;

/// Result of accepting a battle start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BattleStart {
    pub battle_id: String,
    /// Same two anchors as the previous battle; hearts were carried over.
    pub same_opponents: bool,
    /// The carried-over participants switched sides.
    pub swapped: bool,
    pub hearts: (u8, u8),
}

/// A round outcome that was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// `None` on a tie.
    pub winner: Option<Side>,
    /// Label written to `round_winner`.
    pub label: String,
    pub points: (u64, u64),
    pub hearts: (u8, u8),
}

/// Result of a score update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoreOutcome {
    /// No battle with two participants is active.
    NoBattle,
    /// Dropped by the stale-event filter.
    Stale(Rejection),
    /// Points were applied. `round_end` is set for terminal statuses.
    Applied {
        status: BattleStatus,
        round_end: Option<Result<Settlement, SettleBlocked>>,
    },
}

/// Result of a win announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WinOutcome {
    NoBattle,
    Stale(Rejection),
    /// The announcement did not declare a win.
    NotAWin,
    RoundEnd(Result<Settlement, SettleBlocked>),
}

/// Accept a battle start.
///
/// Hearts carry over when the new pair of anchors equals the previous pair in
/// either order; otherwise both sides get the session's battle mode.
pub fn start_battle(
    session: &mut BattleSession,
    battle_id: impl Into<String>,
    participants: [ParticipantInfo; 2],
    now: Instant,
) -> BattleStart {
    let [info_a, info_b] = participants;
    let mode = session.battle_mode;

    let (same_opponents, swapped, hearts) = match (&session.participant_a, &session.participant_b) {
        (Some(prev_a), Some(prev_b)) => {
            let (new_a, new_b) = (info_a.identity(), info_b.identity());
            let (old_a, old_b) = (prev_a.identity(), prev_b.identity());
            let complete = ![new_a, new_b, old_a, old_b].iter().any(|id| id.is_empty());

            if complete && new_a == old_a && new_b == old_b {
                (true, false, (prev_a.hearts, prev_b.hearts))
            } else if complete && new_a == old_b && new_b == old_a {
                (true, true, (prev_b.hearts, prev_a.hearts))
            } else {
                (false, false, (mode, mode))
            }
        }
        _ => (false, false, (mode, mode)),
    };

    let battle_id = battle_id.into();
    timer::cancel(session);
    session.participant_a = Some(BattleParticipant::from_info(info_a, Side::A, hearts.0));
    session.participant_b = Some(BattleParticipant::from_info(info_b, Side::B, hearts.1));
    session.round = Some(RoundContext::new(battle_id.clone(), mode, now));
    session.round_winner = None;
    session.battle_active = true;

    BattleStart {
        battle_id,
        same_opponents,
        swapped,
        hearts,
    }
}

/// Apply a score update.
pub fn apply_score(
    session: &mut BattleSession,
    board: &ScoreBoard,
    status: BattleStatus,
    now: Instant,
    config: &BattleConfig,
) -> ScoreOutcome {
    if session.round.is_none() {
        return ScoreOutcome::NoBattle;
    }

    let (anchor_a, anchor_b) = session.anchors();
    let attribution = match filter::attribute_scores(board, KnownAnchors::new(anchor_a, anchor_b)) {
        Ok(attribution) => attribution,
        Err(rejection) => return ScoreOutcome::Stale(rejection),
    };

    let Some((a, b)) = session.pair_mut() else {
        return ScoreOutcome::NoBattle;
    };
    for (participant, entry) in [(a, attribution.a), (b, attribution.b)] {
        participant.points = entry.points;
        if participant.avatar_url.is_empty() {
            if let Some(url) = &entry.avatar_url {
                participant.avatar_url = url.clone();
            }
        }
    }

    if let Some(round) = session.round.as_mut() {
        round.observe_score(status);
    }

    let round_end = status
        .is_terminal()
        .then(|| settle_round(session, now, config.settle_debounce(), &config.tie_label));

    ScoreOutcome::Applied { status, round_end }
}

/// Apply a win announcement.
pub fn apply_win_announcement(
    session: &mut BattleSession,
    win: bool,
    winner_id: &str,
    rival_id: &str,
    now: Instant,
    config: &BattleConfig,
) -> WinOutcome {
    if !session.battle_active || session.pair_mut().is_none() {
        return WinOutcome::NoBattle;
    }

    let (anchor_a, anchor_b) = session.anchors();
    if let Err(rejection) =
        filter::check_win_announcement(winner_id, rival_id, KnownAnchors::new(anchor_a, anchor_b))
    {
        return WinOutcome::Stale(rejection);
    }
    if !win {
        return WinOutcome::NotAWin;
    }

    WinOutcome::RoundEnd(settle_round(
        session,
        now,
        config.settle_debounce(),
        &config.tie_label,
    ))
}

/// Apply a round-end signal if every guard passes.
///
/// The side with fewer points loses one heart; on equal points nobody does.
/// `round_winner` is set to the winner's nickname or `tie_label`.
pub fn settle_round(
    session: &mut BattleSession,
    now: Instant,
    debounce: Duration,
    tie_label: &str,
) -> Result<Settlement, SettleBlocked> {
    let round = session.round.as_ref().ok_or(SettleBlocked::NoBattle)?;
    round.check_settle(now, debounce)?;

    let (a, b) = session.pair_mut().ok_or(SettleBlocked::NoBattle)?;
    let points = (a.points, b.points);
    let (winner, label) = if a.points > b.points {
        b.lose_heart();
        (Some(Side::A), a.nickname.clone())
    } else if b.points > a.points {
        a.lose_heart();
        (Some(Side::B), b.nickname.clone())
    } else {
        (None, tie_label.to_string())
    };
    let hearts = (a.hearts, b.hearts);

    if let Some(round) = session.round.as_mut() {
        round.settle();
    }
    session.round_winner = Some(label.clone());

    Ok(Settlement {
        winner,
        label,
        points,
        hearts,
    })
}

/// Reopen the round after a punish phase. Ignored while the battle is too new.
pub fn reopen_round(session: &mut BattleSession, now: Instant, debounce: Duration) -> bool {
    match session.round.as_mut() {
        Some(round) => round.reopen(now, debounce),
        None => false,
    }
}

/// Operator override on one side's hearts. Returns the new count, or `None`
/// if that side is absent.
pub fn adjust_hearts(session: &mut BattleSession, side: Side, delta: i64) -> Option<u8> {
    session
        .participant_mut(side)
        .map(|p| p.adjust_hearts(delta))
}

/// Overwrite both sides' hearts. Returns whether any participant was present.
pub fn reset_hearts(session: &mut BattleSession, hearts: u8) -> bool {
    let mut touched = false;
    for side in [Side::A, Side::B] {
        if let Some(p) = session.participant_mut(side) {
            p.set_hearts(hearts as i64);
            touched = true;
        }
    }
    touched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ArmyEntry;
    use crate::state::round::RoundPhase;
    use pretty_assertions::assert_eq;

    const SECOND: Duration = Duration::from_secs(1);

    fn alice() -> ParticipantInfo {
        ParticipantInfo::new("A1", "alice", "Alice")
    }

    fn bob() -> ParticipantInfo {
        ParticipantInfo::new("B1", "bob", "Bob")
    }

    fn board(a: u64, b: u64) -> ScoreBoard {
        ScoreBoard::Keyed(vec![
            ("A1".to_string(), ArmyEntry::new("A1", a)),
            ("B1".to_string(), ArmyEntry::new("B1", b)),
        ])
    }

    fn started(mode: u8) -> (BattleSession, Instant) {
        let mut session = BattleSession::new("host", mode);
        let now = Instant::now();
        start_battle(&mut session, "b-1", [alice(), bob()], now);
        (session, now)
    }

    fn hearts(session: &BattleSession) -> (u8, u8) {
        (
            session.participant_a.as_ref().unwrap().hearts,
            session.participant_b.as_ref().unwrap().hearts,
        )
    }

    #[test]
    fn test_start_assigns_battle_mode() {
        let (session, _) = started(3);
        assert!(session.battle_active);
        assert_eq!(hearts(&session), (3, 3));
        assert_eq!(session.round.as_ref().unwrap().hearts_per_battle, 3);
        assert_eq!(session.round.as_ref().unwrap().phase(), RoundPhase::AwaitingFirstScore);
    }

    #[test]
    fn test_same_opponents_keep_hearts() {
        let (mut session, now) = started(5);
        session.participant_a.as_mut().unwrap().hearts = 2;
        session.participant_b.as_mut().unwrap().points = 99;

        let start = start_battle(&mut session, "b-2", [alice(), bob()], now);
        assert!(start.same_opponents);
        assert!(!start.swapped);
        assert_eq!(hearts(&session), (2, 5));
        assert_eq!(session.participant_b.as_ref().unwrap().points, 0);
    }

    #[test]
    fn test_swapped_opponents_swap_hearts() {
        let (mut session, now) = started(5);
        session.participant_a.as_mut().unwrap().hearts = 2;

        let start = start_battle(&mut session, "b-2", [bob(), alice()], now);
        assert!(start.same_opponents);
        assert!(start.swapped);
        assert_eq!(hearts(&session), (5, 2));
        assert_eq!(session.participant_a.as_ref().unwrap().nickname, "Bob");
    }

    #[test]
    fn test_new_opponent_resets_hearts() {
        let (mut session, now) = started(5);
        session.participant_a.as_mut().unwrap().hearts = 1;
        session.battle_mode = 4;

        let carol = ParticipantInfo::new("C1", "carol", "Carol");
        let start = start_battle(&mut session, "b-2", [alice(), carol], now);
        assert!(!start.same_opponents);
        assert_eq!(hearts(&session), (4, 4));
    }

    #[test]
    fn test_score_then_terminal_settles_once() {
        let config = BattleConfig::default();
        let (mut session, start) = started(5);

        let outcome = apply_score(&mut session, &board(120, 80), BattleStatus::InProgress(1), start + SECOND, &config);
        assert_eq!(
            outcome,
            ScoreOutcome::Applied {
                status: BattleStatus::InProgress(1),
                round_end: None
            }
        );
        assert_eq!(hearts(&session), (5, 5));

        let later = start + 9 * SECOND;
        let outcome = apply_score(&mut session, &board(120, 80), BattleStatus::Terminal(5), later, &config);
        let ScoreOutcome::Applied { round_end: Some(Ok(settlement)), .. } = outcome else {
            panic!("expected a settlement, got {:?}", outcome);
        };
        assert_eq!(settlement.winner, Some(Side::A));
        assert_eq!(settlement.label, "Alice");
        assert_eq!(hearts(&session), (5, 4));
        assert_eq!(session.round_winner.as_deref(), Some("Alice"));

        // Duplicate terminal signal.
        let outcome = apply_score(&mut session, &board(120, 80), BattleStatus::Terminal(5), later + SECOND, &config);
        assert_eq!(
            outcome,
            ScoreOutcome::Applied {
                status: BattleStatus::Terminal(5),
                round_end: Some(Err(SettleBlocked::AlreadySettled))
            }
        );
        assert_eq!(hearts(&session), (5, 4));
    }

    #[test]
    fn test_early_round_end_ignored_then_accepted() {
        let config = BattleConfig::default();
        let (mut session, start) = started(5);
        apply_score(&mut session, &board(10, 30), BattleStatus::InProgress(1), start + SECOND, &config);

        let early = settle_round(&mut session, start + 2 * SECOND, config.settle_debounce(), "Empate");
        assert!(matches!(early, Err(SettleBlocked::TooEarly { .. })));
        assert_eq!(hearts(&session), (5, 5));

        let settled = settle_round(&mut session, start + 8 * SECOND, config.settle_debounce(), "Empate").unwrap();
        assert_eq!(settled.winner, Some(Side::B));
        assert_eq!(hearts(&session), (4, 5));
    }

    #[test]
    fn test_round_end_without_in_progress_ignored() {
        let config = BattleConfig::default();
        let (mut session, start) = started(5);

        let outcome = apply_win_announcement(&mut session, true, "A1", "B1", start + 20 * SECOND, &config);
        assert_eq!(outcome, WinOutcome::RoundEnd(Err(SettleBlocked::NoInProgressScore)));

        // Terminal-only score updates are no evidence either.
        apply_score(&mut session, &board(50, 10), BattleStatus::Terminal(4), start + 21 * SECOND, &config);
        assert_eq!(hearts(&session), (5, 5));
        assert!(session.round_winner.is_none());
    }

    #[test]
    fn test_tie_uses_label() {
        let config = BattleConfig::default().with_tie_label("Tie");
        let (mut session, start) = started(5);
        apply_score(&mut session, &board(40, 40), BattleStatus::InProgress(2), start + SECOND, &config);

        let outcome = apply_win_announcement(&mut session, true, "A1", "0", start + 10 * SECOND, &config);
        let WinOutcome::RoundEnd(Ok(settlement)) = outcome else {
            panic!("expected a settlement");
        };
        assert_eq!(settlement.winner, None);
        assert_eq!(session.round_winner.as_deref(), Some("Tie"));
        assert_eq!(hearts(&session), (5, 5));
    }

    #[test]
    fn test_stale_score_is_dropped() {
        let config = BattleConfig::default();
        let (mut session, start) = started(5);
        let stale = ScoreBoard::Keyed(vec![
            ("OLD1".to_string(), ArmyEntry::new("OLD1", 500)),
            ("OLD2".to_string(), ArmyEntry::new("OLD2", 1)),
        ]);

        let outcome = apply_score(&mut session, &stale, BattleStatus::InProgress(1), start + SECOND, &config);
        assert!(matches!(outcome, ScoreOutcome::Stale(Rejection::Unrelated { .. })));
        assert_eq!(session.participant_a.as_ref().unwrap().points, 0);
        assert_eq!(session.round.as_ref().unwrap().phase(), RoundPhase::AwaitingFirstScore);
    }

    #[test]
    fn test_win_announcement_filters() {
        let config = BattleConfig::default();
        let (mut session, start) = started(5);
        apply_score(&mut session, &board(1, 2), BattleStatus::InProgress(1), start, &config);

        let later = start + 10 * SECOND;
        assert!(matches!(
            apply_win_announcement(&mut session, true, "OLD", "B1", later, &config),
            WinOutcome::Stale(_)
        ));
        assert_eq!(
            apply_win_announcement(&mut session, false, "A1", "B1", later, &config),
            WinOutcome::NotAWin
        );
        assert_eq!(hearts(&session), (5, 5));
    }

    #[test]
    fn test_punish_finish_reopens_round() {
        let config = BattleConfig::default();
        let (mut session, start) = started(5);
        apply_score(&mut session, &board(9, 3), BattleStatus::InProgress(1), start, &config);
        settle_round(&mut session, start + 9 * SECOND, config.settle_debounce(), "Empate").unwrap();

        assert!(reopen_round(&mut session, start + 12 * SECOND, config.settle_debounce()));

        // Next round needs its own in-progress evidence.
        apply_score(&mut session, &board(9, 30), BattleStatus::InProgress(1), start + 13 * SECOND, &config);
        let outcome = apply_score(&mut session, &board(9, 30), BattleStatus::Terminal(5), start + 14 * SECOND, &config);
        assert!(matches!(outcome, ScoreOutcome::Applied { round_end: Some(Ok(_)), .. }));
        assert_eq!(hearts(&session), (4, 4));
    }

    #[test]
    fn test_punish_finish_too_early() {
        let (mut session, start) = started(5);
        session.round.as_mut().unwrap().settle();
        assert!(!reopen_round(&mut session, start + SECOND, Duration::from_secs(8)));
        assert!(session.round.as_ref().unwrap().settled);
    }

    #[test]
    fn test_hearts_never_negative() {
        let (mut session, _) = started(3);
        assert_eq!(adjust_hearts(&mut session, Side::A, -5), Some(0));
        assert_eq!(adjust_hearts(&mut session, Side::B, 50), Some(10));

        assert!(reset_hearts(&mut session, 7));
        assert_eq!(hearts(&session), (7, 7));

        let mut empty = BattleSession::new("x", 5);
        assert_eq!(adjust_hearts(&mut empty, Side::A, 1), None);
        assert!(!reset_hearts(&mut empty, 3));
    }

    #[test]
    fn test_no_battle() {
        let config = BattleConfig::default();
        let mut session = BattleSession::new("x", 5);
        let now = Instant::now();
        assert_eq!(
            apply_score(&mut session, &board(1, 2), BattleStatus::InProgress(1), now, &config),
            ScoreOutcome::NoBattle
        );
        assert_eq!(
            apply_win_announcement(&mut session, true, "A1", "B1", now, &config),
            WinOutcome::NoBattle
        );
        assert_eq!(
            settle_round(&mut session, now, Duration::ZERO, "Empate"),
            Err(SettleBlocked::NoBattle)
        );
    }
}
