//! Stale-event filter.
//!
//! The upstream may deliver a trailing score or win notification from a
//! battle that already ended, racing with the start of the next one. Events
//! are matched against the anchor identities of the current participants
//! before they may touch session state.

use std::fmt;

use crate::event::{ArmyEntry, ScoreBoard};
use crate::state::participant::Side;

/// Anchor ids of the current participants. `None` means unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KnownAnchors<'a> {
    pub a: Option<&'a str>,
    pub b: Option<&'a str>,
}

impl<'a> KnownAnchors<'a> {
    pub fn new(a: Option<&'a str>, b: Option<&'a str>) -> Self {
        let known = |id: Option<&'a str>| id.filter(|id| !id.is_empty());
        Self {
            a: known(a),
            b: known(b),
        }
    }

    fn get(&self, side: Side) -> Option<&'a str> {
        match side {
            Side::A => self.a,
            Side::B => self.b,
        }
    }
}

/// Why an event was dropped as stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Only one current participant is referenced.
    Partial { matched: Side },
    /// None of the referenced identities belong to the current battle.
    Unrelated { ids: Vec<String> },
    /// Not exactly two distinct entries to attribute.
    Ambiguous { entries: usize },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Partial { matched } => {
                write!(f, "only participant {} referenced", matched)
            }
            Self::Unrelated { ids } => {
                write!(f, "anchors [{}] do not match the current battle", ids.join(","))
            }
            Self::Ambiguous { entries } => {
                write!(f, "cannot attribute {} entries to two sides", entries)
            }
        }
    }
}

/// Score entries attributed to each side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribution<'a> {
    pub a: &'a ArmyEntry,
    pub b: &'a ArmyEntry,
    /// The event listed B before A.
    pub swapped: bool,
}

struct Candidate<'a> {
    key: Option<&'a str>,
    entry: &'a ArmyEntry,
}

impl<'a> Candidate<'a> {
    fn anchor(&self) -> Option<&'a str> {
        self.entry.anchor_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Identity of the entry: its own anchor, then the map key.
    fn identity(&self) -> Option<&'a str> {
        self.anchor().or(self.key.filter(|k| !k.is_empty()))
    }

    fn matches(&self, anchor: &str) -> bool {
        self.anchor() == Some(anchor) || self.key == Some(anchor)
    }
}

fn candidates(board: &ScoreBoard) -> Vec<Candidate<'_>> {
    match board {
        ScoreBoard::Keyed(entries) => entries
            .iter()
            .map(|(key, entry)| Candidate {
                key: Some(key.as_str()),
                entry,
            })
            .collect(),
        ScoreBoard::Positional(entries) => entries
            .iter()
            .map(|entry| Candidate { key: None, entry })
            .collect(),
    }
}

fn positional<'a>(list: &[Candidate<'a>]) -> Option<Attribution<'a>> {
    match list {
        [a, b] => Some(Attribution {
            a: a.entry,
            b: b.entry,
            swapped: false,
        }),
        _ => None,
    }
}

/// Decide which score entry belongs to which side, or reject the event.
pub fn attribute_scores<'a>(
    board: &'a ScoreBoard,
    known: KnownAnchors<'_>,
) -> Result<Attribution<'a>, Rejection> {
    let list = candidates(board);
    let anonymous = list.iter().all(|c| c.identity().is_none());
    let ids = || -> Vec<String> {
        list.iter()
            .filter_map(|c| c.identity())
            .map(str::to_string)
            .collect()
    };

    // Entries without any identity can only be taken positionally.
    if anonymous {
        return positional(&list).ok_or(Rejection::Ambiguous {
            entries: list.len(),
        });
    }

    match (known.a, known.b) {
        (Some(anchor_a), Some(anchor_b)) => {
            let idx_a = list.iter().position(|c| c.matches(anchor_a));
            let idx_b = list
                .iter()
                .enumerate()
                .position(|(i, c)| Some(i) != idx_a && c.matches(anchor_b));

            match (idx_a, idx_b) {
                (Some(ia), Some(ib)) => Ok(Attribution {
                    a: list[ia].entry,
                    b: list[ib].entry,
                    swapped: ia > ib,
                }),
                (Some(_), None) => Err(Rejection::Partial { matched: Side::A }),
                (None, Some(_)) => Err(Rejection::Partial { matched: Side::B }),
                (None, None) => Err(Rejection::Unrelated { ids: ids() }),
            }
        }
        (Some(_), None) | (None, Some(_)) => {
            let side = if known.a.is_some() { Side::A } else { Side::B };
            let anchor = known.get(side).unwrap_or_default();
            let Some(idx) = list.iter().position(|c| c.matches(anchor)) else {
                return Err(Rejection::Unrelated { ids: ids() });
            };
            if list.len() != 2 {
                return Err(Rejection::Partial { matched: side });
            }

            let (mine, theirs) = (list[idx].entry, list[1 - idx].entry);
            let (a, b) = match side {
                Side::A => (mine, theirs),
                Side::B => (theirs, mine),
            };
            Ok(Attribution {
                a,
                b,
                swapped: (side == Side::A) != (idx == 0),
            })
        }
        (None, None) => {
            // Bootstrap: take event order as provisional A/B.
            let distinct = match list.as_slice() {
                [x, y] => x.identity() != y.identity(),
                _ => false,
            };
            if !distinct {
                return Err(Rejection::Ambiguous {
                    entries: list.len(),
                });
            }
            positional(&list).ok_or(Rejection::Ambiguous {
                entries: list.len(),
            })
        }
    }
}

/// Check that a win announcement belongs to the current battle.
///
/// Only enforced when both anchors are known. Ids that are empty or `"0"`
/// carry no information.
pub fn check_win_announcement(
    winner_id: &str,
    rival_id: &str,
    known: KnownAnchors<'_>,
) -> Result<(), Rejection> {
    let (Some(anchor_a), Some(anchor_b)) = (known.a, known.b) else {
        return Ok(());
    };

    let ids: Vec<&str> = [winner_id, rival_id]
        .into_iter()
        .filter(|id| !id.is_empty() && *id != "0")
        .collect();

    let matches_a = ids.contains(&anchor_a);
    let matches_b = ids.contains(&anchor_b);

    match ids.len() {
        0 => Ok(()),
        1 if matches_a || matches_b => Ok(()),
        2 if matches_a && matches_b => Ok(()),
        2 if matches_a => Err(Rejection::Partial { matched: Side::A }),
        2 if matches_b => Err(Rejection::Partial { matched: Side::B }),
        _ => Err(Rejection::Unrelated {
            ids: ids.into_iter().map(str::to_string).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn keyed(entries: &[(&str, u64)]) -> ScoreBoard {
        ScoreBoard::Keyed(
            entries
                .iter()
                .map(|(id, pts)| (id.to_string(), ArmyEntry::new(*id, *pts)))
                .collect(),
        )
    }

    fn both() -> KnownAnchors<'static> {
        KnownAnchors::new(Some("A1"), Some("B1"))
    }

    #[test]
    fn test_accepts_matching_order() {
        let board = keyed(&[("A1", 120), ("B1", 80)]);
        let attr = attribute_scores(&board, both()).unwrap();
        assert_eq!(attr.a.points, 120);
        assert_eq!(attr.b.points, 80);
        assert!(!attr.swapped);
    }

    #[test]
    fn test_swapped_order_is_unswapped() {
        let board = keyed(&[("B1", 80), ("A1", 120)]);
        let attr = attribute_scores(&board, both()).unwrap();
        assert_eq!(attr.a.points, 120);
        assert_eq!(attr.b.points, 80);
        assert!(attr.swapped);
    }

    #[test]
    fn test_key_match_without_anchor_field() {
        let board = ScoreBoard::Keyed(vec![
            ("A1".to_string(), ArmyEntry::anonymous(3)),
            ("B1".to_string(), ArmyEntry::anonymous(4)),
        ]);
        let attr = attribute_scores(&board, both()).unwrap();
        assert_eq!((attr.a.points, attr.b.points), (3, 4));
    }

    #[test]
    fn test_rejects_partial() {
        let board = keyed(&[("A1", 120), ("ZZ", 80)]);
        assert_eq!(
            attribute_scores(&board, both()),
            Err(Rejection::Partial { matched: Side::A })
        );

        let board = keyed(&[("B1", 80)]);
        assert_eq!(
            attribute_scores(&board, both()),
            Err(Rejection::Partial { matched: Side::B })
        );
    }

    #[test]
    fn test_rejects_unrelated() {
        let board = keyed(&[("X", 1), ("Y", 2)]);
        assert_eq!(
            attribute_scores(&board, both()),
            Err(Rejection::Unrelated {
                ids: vec!["X".to_string(), "Y".to_string()]
            })
        );
    }

    #[test]
    fn test_bootstrap_takes_event_order() {
        let board = keyed(&[("X", 1), ("Y", 2)]);
        let attr = attribute_scores(&board, KnownAnchors::default()).unwrap();
        assert_eq!((attr.a.points, attr.b.points), (1, 2));

        let board = keyed(&[("X", 1), ("Y", 2), ("Z", 3)]);
        assert_eq!(
            attribute_scores(&board, KnownAnchors::default()),
            Err(Rejection::Ambiguous { entries: 3 })
        );
    }

    #[test]
    fn test_bootstrap_requires_distinct_entries() {
        let board = ScoreBoard::Positional(vec![ArmyEntry::new("X", 1), ArmyEntry::new("X", 2)]);
        assert_eq!(
            attribute_scores(&board, KnownAnchors::default()),
            Err(Rejection::Ambiguous { entries: 2 })
        );
    }

    #[test]
    fn test_one_known_anchor() {
        let known = KnownAnchors::new(None, Some("B1"));
        let board = keyed(&[("B1", 9), ("new", 4)]);
        let attr = attribute_scores(&board, known).unwrap();
        assert_eq!((attr.a.points, attr.b.points), (4, 9));
        assert!(attr.swapped);

        let board = keyed(&[("X", 9), ("Y", 4)]);
        assert!(matches!(
            attribute_scores(&board, known),
            Err(Rejection::Unrelated { .. })
        ));
    }

    #[test]
    fn test_anonymous_array_is_positional() {
        let board = ScoreBoard::Positional(vec![ArmyEntry::anonymous(5), ArmyEntry::anonymous(6)]);
        let attr = attribute_scores(&board, both()).unwrap();
        assert_eq!((attr.a.points, attr.b.points), (5, 6));

        let board = ScoreBoard::Positional(vec![ArmyEntry::anonymous(5)]);
        assert_eq!(
            attribute_scores(&board, both()),
            Err(Rejection::Ambiguous { entries: 1 })
        );
    }

    #[test]
    fn test_win_announcement() {
        assert_eq!(check_win_announcement("A1", "B1", both()), Ok(()));
        assert_eq!(check_win_announcement("B1", "0", both()), Ok(()));
        assert_eq!(check_win_announcement("0", "", both()), Ok(()));
        assert_eq!(
            check_win_announcement("A1", "OLD", both()),
            Err(Rejection::Partial { matched: Side::A })
        );
        assert!(matches!(
            check_win_announcement("OLD", "0", both()),
            Err(Rejection::Unrelated { .. })
        ));
        // Not enforced until both anchors are known.
        assert_eq!(
            check_win_announcement("OLD", "X", KnownAnchors::new(Some("A1"), None)),
            Ok(())
        );
    }

    #[test]
    fn test_rejection_display() {
        assert_eq!(
            Rejection::Partial { matched: Side::B }.to_string(),
            "only participant b referenced"
        );
    }
}
