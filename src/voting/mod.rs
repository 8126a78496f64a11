pub mod plurality;

use serde::{Deserialize, Serialize};

// Generic structure for poll results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollResults {
    pub poll_id: u64,
    pub winners: Vec<String>, // Labels of every option sharing the top count; empty with no votes
    pub summary: String,      // Detailed results as formatted text
    pub total_votes: u64,
    pub raw_results: Vec<VoteCount>, // Ranked vote counts for all options
}

// Structure to hold vote counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCount {
    pub option_index: usize,
    pub option_text: String,
    pub votes: u64,
    pub rank: usize,
}
