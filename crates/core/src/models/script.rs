//! Script and role catalog models
//!
//! A script is the immutable role catalog a room plays with: the roles, their
//! teams, their attachment slots, and the team-count distribution per player
//! count. Scripts are loaded once by the registry and never mutated.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Team alignment of a role. Declaration order is display order (good to
/// evil); ordered maps keyed by team rely on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    Townsfolk,
    Outsider,
    Minion,
    Demon,
}

impl Team {
    pub fn label(&self) -> &'static str {
        match self {
            Team::Townsfolk => "Townsfolk",
            Team::Outsider => "Outsider",
            Team::Minion => "Minion",
            Team::Demon => "Demon",
        }
    }
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl std::str::FromStr for Team {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "townsfolk" => Ok(Team::Townsfolk),
            "outsider" => Ok(Team::Outsider),
            "minion" => Ok(Team::Minion),
            "demon" => Ok(Team::Demon),
            other => Err(format!("unknown team {other:?}")),
        }
    }
}

/// How a filled attachment slot is shown to the seat's own player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerView {
    /// Shown as a separate row below the primary role
    #[default]
    Separate,
    /// Replaces the primary role in the owner's view; the real primary stays
    /// host-only (drunk-style misinformation)
    ReplacePrimary,
}

/// A named sub-assignment a role requires (e.g. demon bluffs)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentSlot {
    pub id: String,
    pub label: String,
    #[serde(default = "default_slot_count")]
    pub count: usize,
    /// Teams the attached role must belong to; `None` allows any team
    #[serde(default)]
    pub team_filter: Option<Vec<Team>>,
    #[serde(default)]
    pub allow_duplicates: bool,
    #[serde(default)]
    pub owner_view: OwnerView,
}

fn default_slot_count() -> usize {
    1
}

impl AttachmentSlot {
    pub fn admits(&self, team: Team) -> bool {
        match &self.team_filter {
            Some(teams) => teams.contains(&team),
            None => true,
        }
    }
}

/// One playable role in a script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptRole {
    pub id: String,
    pub name: String,
    pub team: Team,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Localized display names keyed by language code, e.g. `zh_CN`
    #[serde(default)]
    pub name_localized: BTreeMap<String, String>,
    #[serde(default)]
    pub attachment_slots: Vec<AttachmentSlot>,
}

impl ScriptRole {
    pub fn slot(&self, slot_id: &str) -> Option<&AttachmentSlot> {
        self.attachment_slots.iter().find(|slot| slot.id == slot_id)
    }
}

/// Per-team role counts, ordered for stable serialization
pub type TeamCounts = BTreeMap<Team, usize>;

/// Script-level rule switches
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptRules {
    /// Whether "storyteller" is an admissible game result
    #[serde(default)]
    pub storyteller_win_available: bool,
}

/// A complete role catalog for one script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub id: String,
    pub name: String,
    pub version: String,
    pub roles: Vec<ScriptRole>,
    /// Team counts keyed by player count
    #[serde(default)]
    pub team_distribution: BTreeMap<usize, TeamCounts>,
    #[serde(default)]
    pub rules: ScriptRules,
}

impl Script {
    pub fn role(&self, role_id: &str) -> Option<&ScriptRole> {
        self.roles.iter().find(|role| role.id == role_id)
    }

    /// Tally of roles per team across the whole catalog
    pub fn role_census(&self) -> TeamCounts {
        let mut counts = TeamCounts::new();
        for role in &self.roles {
            *counts.entry(role.team).or_insert(0) += 1;
        }
        counts
    }

    /// Resolve the team counts to deal for `player_count` players.
    ///
    /// Exact key wins; otherwise the largest key at or below the player
    /// count, then the smallest key, then the catalog census.
    pub fn team_counts_for(&self, player_count: usize) -> TeamCounts {
        if self.team_distribution.is_empty() {
            return self.role_census();
        }
        if let Some(counts) = self.team_distribution.get(&player_count) {
            return counts.clone();
        }
        let fallback = self
            .team_distribution
            .range(..=player_count)
            .next_back()
            .or_else(|| self.team_distribution.iter().next());
        match fallback {
            Some((_, counts)) => counts.clone(),
            None => self.role_census(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script_with_distribution() -> Script {
        let mut distribution = BTreeMap::new();
        for (players, townsfolk, outsider) in [(5usize, 3usize, 0usize), (7, 5, 0), (9, 5, 2)] {
            let mut counts = TeamCounts::new();
            counts.insert(Team::Townsfolk, townsfolk);
            counts.insert(Team::Outsider, outsider);
            counts.insert(Team::Minion, 1);
            counts.insert(Team::Demon, 1);
            distribution.insert(players, counts);
        }
        Script {
            id: "test".into(),
            name: "Test".into(),
            version: "1.0.0".into(),
            roles: Vec::new(),
            team_distribution: distribution,
            rules: ScriptRules::default(),
        }
    }

    #[test]
    fn test_exact_player_count_wins() {
        let script = script_with_distribution();
        assert_eq!(script.team_counts_for(7)[&Team::Townsfolk], 5);
        assert_eq!(script.team_counts_for(7)[&Team::Outsider], 0);
    }

    #[test]
    fn test_falls_back_to_largest_key_at_or_below() {
        let script = script_with_distribution();
        // 8 players: no exact entry, use the 7-player row.
        assert_eq!(script.team_counts_for(8)[&Team::Townsfolk], 5);
        // 20 players: use the 9-player row.
        assert_eq!(script.team_counts_for(20)[&Team::Outsider], 2);
    }

    #[test]
    fn test_falls_back_to_smallest_key_below_range() {
        let script = script_with_distribution();
        assert_eq!(script.team_counts_for(3)[&Team::Townsfolk], 3);
    }

    #[test]
    fn test_census_when_no_distribution() {
        let mut script = script_with_distribution();
        script.team_distribution.clear();
        script.roles = vec![
            ScriptRole {
                id: "a".into(),
                name: "A".into(),
                team: Team::Townsfolk,
                tags: Vec::new(),
                description: None,
                name_localized: BTreeMap::new(),
                attachment_slots: Vec::new(),
            },
            ScriptRole {
                id: "b".into(),
                name: "B".into(),
                team: Team::Demon,
                tags: Vec::new(),
                description: None,
                name_localized: BTreeMap::new(),
                attachment_slots: Vec::new(),
            },
        ];
        let counts = script.team_counts_for(2);
        assert_eq!(counts[&Team::Townsfolk], 1);
        assert_eq!(counts[&Team::Demon], 1);
    }

    #[test]
    fn test_slot_admits_respects_team_filter() {
        let slot = AttachmentSlot {
            id: "bluff".into(),
            label: "Bluff".into(),
            count: 3,
            team_filter: Some(vec![Team::Townsfolk, Team::Outsider]),
            allow_duplicates: false,
            owner_view: OwnerView::Separate,
        };
        assert!(slot.admits(Team::Townsfolk));
        assert!(!slot.admits(Team::Demon));

        let open = AttachmentSlot {
            id: "open".into(),
            label: "Open".into(),
            count: 1,
            team_filter: None,
            allow_duplicates: true,
            owner_view: OwnerView::Separate,
        };
        assert!(open.admits(Team::Minion));
    }

    #[test]
    fn test_team_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Team::Townsfolk).unwrap(), "\"townsfolk\"");
        assert_eq!(serde_json::to_string(&Team::Demon).unwrap(), "\"demon\"");
    }
}
