use crate::models::PollSnapshot;
use crate::voting::{PollResults, VoteCount};

pub fn calculate_results(poll: &PollSnapshot) -> PollResults {
    let total_votes: u64 = poll.vote_counts.iter().sum();

    // Pair every option with its tally, keeping option order for equal counts
    let mut sorted_votes: Vec<(usize, &str, u64)> = poll
        .options
        .iter()
        .zip(&poll.vote_counts)
        .enumerate()
        .map(|(index, (text, votes))| (index, text.as_str(), *votes))
        .collect();
    sorted_votes.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));

    // Competition ranking: tied options share a rank, the next rank skips ahead
    let mut raw_results: Vec<VoteCount> = Vec::with_capacity(sorted_votes.len());
    for (position, (index, text, votes)) in sorted_votes.iter().enumerate() {
        let rank = match raw_results.last() {
            Some(VoteCount { votes: prev, rank, .. }) if prev == votes => *rank,
            _ => position + 1,
        };
        raw_results.push(VoteCount {
            option_index: *index,
            option_text: text.to_string(),
            votes: *votes,
            rank,
        });
    }

    if total_votes == 0 {
        return PollResults {
            poll_id: poll.id,
            winners: Vec::new(),
            summary: "No votes were cast in this poll.".to_string(),
            total_votes,
            raw_results,
        };
    }

    let winners: Vec<String> = raw_results
        .iter()
        .filter(|count| count.rank == 1)
        .map(|count| count.option_text.clone())
        .collect();

    let mut summary = String::new();
    for count in &raw_results {
        let percent = count.votes as f64 * 100.0 / total_votes as f64;
        // Bold the winning line(s)
        let line = if count.rank == 1 {
            format!("**{}**: {} votes ({:.1}%)", count.option_text, count.votes, percent)
        } else {
            format!("{}: {} votes ({:.1}%)", count.option_text, count.votes, percent)
        };
        summary.push_str(&line);
        summary.push('\n');
    }
    summary.push_str(&format!("\n{} voters participated.", total_votes));

    PollResults {
        poll_id: poll.id,
        winners,
        summary,
        total_votes,
        raw_results,
    }
}
