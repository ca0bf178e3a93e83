//! Scoreboard snapshots, display rows and refresh cadence

use crate::relay::ParticipantId;

/// One participant's standing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreEntry {
    pub id: ParticipantId,
    pub name: String,
    pub score: u32,
    pub kills: u32,
    pub deaths: u32,
    pub is_local: bool,
}

/// Ordered standings: score descending, then deaths ascending, then encounter order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreboardSnapshot {
    entries: Vec<ScoreEntry>,
}

impl ScoreboardSnapshot {
    pub fn build(entries: impl IntoIterator<Item = ScoreEntry>) -> Self {
        let mut entries: Vec<ScoreEntry> = entries.into_iter().collect();
        // sort_by is stable, so equal keys keep encounter order
        entries.sort_by(|a, b| b.score.cmp(&a.score).then(a.deaths.cmp(&b.deaths)));
        Self { entries }
    }

    pub fn entries(&self) -> &[ScoreEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn winner(&self) -> Option<&ScoreEntry> {
        self.entries.first()
    }

    pub fn local_entry(&self) -> Option<&ScoreEntry> {
        self.entries.iter().find(|e| e.is_local)
    }

    /// 1-based rank
    pub fn rank_of(&self, id: ParticipantId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id).map(|i| i + 1)
    }

    /// Rows for a display with `slots` lines; the rest are left off
    pub fn rows(&self, slots: usize) -> Vec<LeaderboardRow> {
        self.entries
            .iter()
            .take(slots)
            .enumerate()
            .map(|(i, e)| LeaderboardRow {
                rank: i + 1,
                name: e.name.clone(),
                score: e.score,
                kd: format!("{}/{}", e.kills, e.deaths),
                is_local: e.is_local,
            })
            .collect()
    }

    /// Small HUD line for the local player
    pub fn local_hud(&self) -> Option<String> {
        self.local_entry()
            .map(|e| format!("K/D {}/{}", e.kills, e.deaths))
    }

    /// End-of-match summary
    pub fn game_over(&self) -> GameOverSummary {
        let local = self.local_entry();
        GameOverSummary {
            winner: self.winner().map(|e| e.name.clone()),
            top3: self.rows(3),
            local_rank: local.and_then(|e| self.rank_of(e.id)),
            local_kills: local.map(|e| e.kills).unwrap_or(0),
            local_deaths: local.map(|e| e.deaths).unwrap_or(0),
        }
    }
}

/// A rendered leaderboard line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardRow {
    pub rank: usize,
    pub name: String,
    pub score: u32,
    /// "kills/deaths"
    pub kd: String,
    pub is_local: bool,
}

/// Game-over view data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameOverSummary {
    pub winner: Option<String>,
    pub top3: Vec<LeaderboardRow>,
    pub local_rank: Option<usize>,
    pub local_kills: u32,
    pub local_deaths: u32,
}

impl GameOverSummary {
    pub fn winner_banner(&self) -> Option<String> {
        self.winner.as_ref().map(|name| format!("WINNER\n{name}"))
    }

    pub fn local_line(&self) -> String {
        let rank = self
            .local_rank
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!("RANK: #{} | KILLS: {}", rank, self.local_kills)
    }

    /// The local human finished first
    pub fn local_won(&self) -> bool {
        self.local_rank == Some(1)
    }
}

/// Fixed-interval refresh gate driven by the room clock
pub struct RefreshTimer {
    interval: f64,
    next_due: Option<f64>,
}

impl RefreshTimer {
    pub fn new(interval_secs: f64) -> Self {
        Self {
            interval: interval_secs,
            next_due: None,
        }
    }

    /// Check if a refresh is due at `now`
    pub fn should_refresh(&mut self, now: f64) -> bool {
        match self.next_due {
            Some(due) if now < due => false,
            _ => {
                self.next_due = Some(now + self.interval);
                true
            }
        }
    }

    /// Force a refresh on the next check (used for phase changes)
    pub fn force_next(&mut self) {
        self.next_due = None;
    }
}
