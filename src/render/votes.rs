//! Vote tallying and the rendered vote table.
//!
//! Ballots arrive as raw JSON and are messy in practice: bare indices for
//! single-select votes, index arrays for multi-select, and occasional
//! strings or floats some client wrote into the map. Malformed ballots are
//! dropped silently; a ballot is never worth failing a story over.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::api::model::ChoiceChunk;
use crate::api::urls;

/// How the winner rows of a closed vote are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum WinnerPolicy {
    /// Every option with at least half the leading vote count.
    #[default]
    HalfBand,
    /// Only options tied for the leading vote count.
    StrictMax,
}

/// One choice with its tallied counts.
#[derive(Debug, Clone, PartialEq)]
pub struct TalliedOption {
    /// Choice text, wrapped in a route link when the choice opens a route.
    pub text: String,
    pub verified: u32,
    pub total: u32,
    /// Reader write-ins are marked with a leading `+`.
    pub write_in: bool,
    pub crossed_out: bool,
}

/// Tallies every ballot in the chunk against its choice list.
#[must_use]
pub fn tally_votes(chunk: &ChoiceChunk) -> Vec<TalliedOption> {
    let totals = count_ballots(&chunk.votes, chunk.multiple, chunk.choices.len());
    let verified = count_ballots(&chunk.verified_votes, chunk.multiple, chunk.choices.len());
    let crossed = chunk.crossed_out_indices();

    chunk
        .choices
        .iter()
        .enumerate()
        .map(|(index, choice)| {
            let text = match chunk.routes.get(&index.to_string()) {
                Some(route_id) => {
                    let route_url = urls::route_chapters_url(urls::SITE, route_id);
                    format!("<a data-orighref=\"{route_url}\">{choice}</a>")
                }
                None => choice.clone(),
            };
            TalliedOption {
                text,
                verified: verified[index],
                total: totals[index],
                write_in: choice.starts_with('+'),
                crossed_out: crossed.contains(&index),
            }
        })
        .collect()
}

fn count_ballots(ballots: &BTreeMap<String, Value>, multiple: Option<bool>, len: usize) -> Vec<u32> {
    let mut counts = vec![0u32; len];
    for ballot in ballots.values() {
        match (multiple, ballot) {
            // single-select ballots are bare indices, multi-select ones are
            // arrays; a ballot of the wrong shape is dropped
            (Some(false), Value::Array(_)) => {}
            (_, Value::Array(picks)) => {
                for pick in picks {
                    bump(&mut counts, pick);
                }
            }
            (Some(true), _) => {}
            (_, single) => bump(&mut counts, single),
        }
    }
    counts
}

/// Counts one pick. Non-integer or out-of-range picks are dropped.
fn bump(counts: &mut [u32], pick: &Value) {
    let Some(index) = pick.as_i64() else {
        return;
    };
    if let Ok(index) = usize::try_from(index) {
        if let Some(slot) = counts.get_mut(index) {
            *slot += 1;
        }
    }
}

/// Winner rows for the vote table.
///
/// Crossed-out choices never win and are not shown. The leading count is
/// taken over authored options only, but a write-in that clears the
/// half-band bar is still listed, after the authored winners. Half-band
/// winners sort most votes first; strict-max winners hold equal totals and
/// keep source order.
fn select_winners(options: &[TalliedOption], policy: WinnerPolicy) -> Vec<&TalliedOption> {
    let max = options
        .iter()
        .filter(|o| !o.write_in && !o.crossed_out)
        .map(|o| o.total)
        .max()
        .unwrap_or(0);

    let mut winners: Vec<&TalliedOption> = options
        .iter()
        .filter(|o| !o.crossed_out)
        .filter(|o| match policy {
            WinnerPolicy::HalfBand => 2 * o.total >= max,
            WinnerPolicy::StrictMax => !o.write_in && o.total == max,
        })
        .collect();
    if policy == WinnerPolicy::HalfBand && winners.len() > 1 {
        winners.sort_by(|a, b| sort_key(b).cmp(&sort_key(a)));
    }
    winners
}

fn sort_key(option: &TalliedOption) -> (bool, u32, u32) {
    (!option.write_in, option.total, option.verified)
}

/// Renders a choice chunk as a header plus vote table.
#[must_use]
pub fn render_choice(chunk: &ChoiceChunk, policy: WinnerPolicy) -> String {
    if !chunk.crossed_out_reasons.is_empty() {
        debug!(reasons = ?chunk.crossed_out_reasons, "crossed-out choices");
    }

    let options = tally_votes(chunk);
    let winners = select_winners(&options, policy);

    let closed = if chunk.closed.is_some() { "closed" } else { "open" };
    let num_voters = chunk.votes.len();
    let title = chunk.question.as_deref().unwrap_or("Choices");

    let mut output = format!(
        "<h4><span>{title} — <small>Voting {closed} — {num_voters} voters</small></span></h4>\n"
    );
    output.push_str("<table class=\"voteblock\">\n");
    for option in winners {
        output.push_str("<tr class=\"choiceitem\"><td>");
        output.push_str(&option.text);
        output.push_str("</td><td class=\"votecount\">");
        if option.verified > 0 {
            output.push_str(&format!("★{}/", option.verified));
        }
        output.push_str(&format!("{} </td></tr>\n", option.total));
    }
    output.push_str("</table>\n");
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn chunk(value: Value) -> ChoiceChunk {
        serde_json::from_value(value).unwrap()
    }

    fn totals(chunk: &ChoiceChunk) -> Vec<u32> {
        tally_votes(chunk).iter().map(|o| o.total).collect()
    }

    #[test]
    fn test_single_select_tally() {
        let chunk = chunk(json!({
            "choices": ["a", "b", "c"],
            "votes": {"u1": 2, "u2": 1, "u3": 2},
            "multiple": false
        }));
        assert_eq!(totals(&chunk), vec![0, 1, 2]);
    }

    #[test]
    fn test_multi_select_tally() {
        let chunk = chunk(json!({
            "choices": ["a", "b", "c"],
            "votes": {"u1": [0, 2], "u2": [2]}
        }));
        assert_eq!(totals(&chunk), vec![1, 0, 2]);
    }

    #[test]
    fn test_malformed_ballots_are_dropped() {
        let chunk = chunk(json!({
            "choices": ["a", "b"],
            "votes": {
                "u1": [0, "x", 1.5, true, null],
                "u2": [7, -1, 2],
                "u3": "unrelated string",
                "u4": [1]
            }
        }));
        // only u1's 0 and u4's 1 survive; index 2 is one past the end
        assert_eq!(totals(&chunk), vec![1, 1]);
    }

    #[test]
    fn test_array_ballot_under_single_select_is_dropped() {
        let chunk = chunk(json!({
            "choices": ["a", "b"],
            "votes": {"u1": [0, 1], "u2": 1},
            "multiple": false
        }));
        assert_eq!(totals(&chunk), vec![0, 1]);
    }

    #[test]
    fn test_scalar_ballot_under_multi_select_is_dropped() {
        let chunk = chunk(json!({
            "choices": ["a", "b"],
            "votes": {"u1": 1, "u2": [0]},
            "multiple": true
        }));
        assert_eq!(totals(&chunk), vec![1, 0]);
    }

    #[test]
    fn test_route_choice_becomes_link() {
        let chunk = chunk(json!({
            "choices": ["Go north", "Stay"],
            "votes": {},
            "routes": {"0": "Rxyzw"}
        }));
        let options = tally_votes(&chunk);
        assert_eq!(
            options[0].text,
            "<a data-orighref=\"https://fiction.live/api/anonkun/route/Rxyzw/chapters\">Go north</a>"
        );
        assert_eq!(options[1].text, "Stay");
    }

    #[test]
    fn test_half_band_winners() {
        let chunk = chunk(json!({
            "choices": ["A", "B", "C"],
            "votes": {
                "u1": [0], "u2": [0], "u3": [0], "u4": [0], "u5": [0],
                "u6": [1], "u7": [1], "u8": [1],
                "u9": [2], "u10": [2]
            }
        }));
        let options = tally_votes(&chunk);
        let winners = select_winners(&options, WinnerPolicy::HalfBand);
        let texts: Vec<&str> = winners.iter().map(|o| o.text.as_str()).collect();
        assert_eq!(texts, vec!["A", "B"]);
    }

    #[test]
    fn test_strict_max_winners() {
        let chunk = chunk(json!({
            "choices": ["A", "B", "C"],
            "votes": {"u1": [0], "u2": [0], "u3": [1], "u4": [2]}
        }));
        let options = tally_votes(&chunk);
        let winners = select_winners(&options, WinnerPolicy::StrictMax);
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].text, "A");
    }

    #[test]
    fn test_strict_max_tie_keeps_source_order() {
        let chunk = chunk(json!({
            "choices": ["A", "B"],
            "votes": {"u1": [0], "u2": [0], "u3": [1], "u4": [1]},
            "userVotes": {"u3": [1], "u4": [1]}
        }));
        let options = tally_votes(&chunk);
        let winners = select_winners(&options, WinnerPolicy::StrictMax);
        let texts: Vec<&str> = winners.iter().map(|o| o.text.as_str()).collect();
        // B leads on verified count; source order still holds
        assert_eq!(texts, vec!["A", "B"]);
    }

    #[test]
    fn test_write_in_can_win_but_sorts_last() {
        let chunk = chunk(json!({
            "choices": ["+Dig a tunnel", "Knock"],
            "votes": {
                "u1": [0], "u2": [0], "u3": [0], "u4": [0],
                "u5": [1], "u6": [1], "u7": [1]
            }
        }));
        let options = tally_votes(&chunk);
        let winners = select_winners(&options, WinnerPolicy::HalfBand);
        let texts: Vec<&str> = winners.iter().map(|o| o.text.as_str()).collect();
        // the leading count comes from authored options, so 3 is the bar
        assert_eq!(texts, vec!["Knock", "+Dig a tunnel"]);
    }

    #[test]
    fn test_crossed_out_choices_never_win() {
        let chunk = chunk(json!({
            "choices": ["A", "B"],
            "votes": {"u1": [0], "u2": [0], "u3": [1]},
            "xOut": [0],
            "xOutReasons": {"0": "duplicate"}
        }));
        let options = tally_votes(&chunk);
        let winners = select_winners(&options, WinnerPolicy::HalfBand);
        let texts: Vec<&str> = winners.iter().map(|o| o.text.as_str()).collect();
        assert_eq!(texts, vec!["B"]);
    }

    #[test]
    fn test_no_votes_lists_every_choice() {
        let chunk = chunk(json!({"choices": ["A", "B", "C"], "votes": {}}));
        let options = tally_votes(&chunk);
        assert_eq!(select_winners(&options, WinnerPolicy::HalfBand).len(), 3);
    }

    #[test]
    fn test_rendered_table() {
        let chunk = chunk(json!({
            "b": "Which way?",
            "choices": ["North", "South"],
            "votes": {"u1": [0], "u2": [0], "u3": [1]},
            "userVotes": {"u1": [0]},
            "closed": true
        }));
        let html = render_choice(&chunk, WinnerPolicy::default());
        assert!(html.starts_with(
            "<h4><span>Which way? — <small>Voting closed — 3 voters</small></span></h4>\n"
        ));
        assert!(html.contains("<table class=\"voteblock\">\n"));
        assert!(html.contains(
            "<tr class=\"choiceitem\"><td>North</td><td class=\"votecount\">★1/2 </td></tr>\n"
        ));
        assert!(html.contains(
            "<tr class=\"choiceitem\"><td>South</td><td class=\"votecount\">1 </td></tr>\n"
        ));
        assert!(html.ends_with("</table>\n"));
    }

    #[test]
    fn test_open_vote_header() {
        let chunk = chunk(json!({"choices": ["A"], "votes": {}}));
        let html = render_choice(&chunk, WinnerPolicy::default());
        assert!(html.contains("Voting open — 0 voters"));
    }

    #[test]
    fn test_null_closed_flag_renders_closed() {
        let chunk = chunk(json!({"choices": ["A"], "votes": {}, "closed": null}));
        let html = render_choice(&chunk, WinnerPolicy::default());
        assert!(html.contains("Voting closed — 0 voters"));
    }

    proptest! {
        /// Tallies depend only on ballot contents, not on voter ids.
        #[test]
        fn prop_tally_ignores_voter_order(picks in prop::collection::vec(0usize..4, 0..24)) {
            let make = |prefix: &str, reversed: bool| -> ChoiceChunk {
                let mut votes = serde_json::Map::new();
                let indexed: Vec<(usize, usize)> = picks.iter().copied().enumerate().collect();
                let iter: Box<dyn Iterator<Item = &(usize, usize)>> = if reversed {
                    Box::new(indexed.iter().rev())
                } else {
                    Box::new(indexed.iter())
                };
                for (i, pick) in iter {
                    votes.insert(format!("{prefix}{i}"), json!([pick]));
                }
                chunk(json!({"choices": ["a", "b", "c", "d"], "votes": votes}))
            };
            prop_assert_eq!(totals(&make("a", false)), totals(&make("z", true)));
        }
    }
}
