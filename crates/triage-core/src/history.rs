//! Conversation history trimming.
//!
//! Bounds the context sent to any model call by turn count and total
//! character budget, keeping the most recent turns.

use triage_types::chat::ConversationTurn;

/// Return the longest suffix of `turns` with at most `max_turns` entries
/// whose summed content length is at most `max_chars`.
///
/// Turns are dropped whole from the oldest end. Length is counted in
/// Unicode scalar values. If the newest turn alone exceeds `max_chars`,
/// the result is empty.
pub fn trim_history(
    turns: &[ConversationTurn],
    max_turns: usize,
    max_chars: usize,
) -> Vec<ConversationTurn> {
    let mut budget = max_chars;
    let mut keep = 0usize;

    for turn in turns.iter().rev().take(max_turns) {
        let len = turn.char_len();
        if len > budget {
            break;
        }
        budget -= len;
        keep += 1;
    }

    turns[turns.len() - keep..].to_vec()
}
