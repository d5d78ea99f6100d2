//! Server status parsing
//!
//! The `status` console command prints a line-oriented report. Only two
//! lines matter here: `map: <name>` and `players: <count>`. Both are
//! optional; a field without a matching line keeps its previous value.

use serde::{Deserialize, Serialize};

/// Last-known server state, refreshed by the status poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    /// Current map name, empty until the first successful poll
    pub map: String,
    /// Connected player count
    pub players: u32,
}

impl ServerStatus {
    /// Fold a raw status response into the current state. Matches the
    /// first `map:` and `players:` lines; unmatched fields are left
    /// unchanged.
    pub fn apply(&mut self, raw: &str) {
        let mut map = None;
        let mut players = None;

        for line in raw.lines() {
            if map.is_none() {
                if let Some(rest) = line.strip_prefix("map:") {
                    map = rest.split_whitespace().next().map(str::to_string);
                }
            }
            if players.is_none() {
                if let Some(rest) = line.strip_prefix("players:") {
                    players = parse_leading_u32(rest.trim_start());
                }
            }
        }

        if let Some(map) = map {
            self.map = map;
        }
        if let Some(players) = players {
            self.players = players;
        }
    }
}

fn parse_leading_u32(s: &str) -> Option<u32> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    s[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_status_response() {
        let mut status = ServerStatus::default();
        status.apply("hostname: local\nversion: FTE\nmap: e1m1\nplayers: 3 (16 max)\n");

        assert_eq!(status.map, "e1m1");
        assert_eq!(status.players, 3);
    }

    #[test]
    fn test_absent_fields_keep_prior_values() {
        let mut status = ServerStatus {
            map: "e1m2".into(),
            players: 4,
        };
        status.apply("hostname: local\nuptime: 5 min\n");

        assert_eq!(status.map, "e1m2");
        assert_eq!(status.players, 4);
    }

    #[test]
    fn test_partial_update() {
        let mut status = ServerStatus {
            map: "start".into(),
            players: 2,
        };
        status.apply("players: 0\n");

        assert_eq!(status.map, "start");
        assert_eq!(status.players, 0);
    }

    #[test]
    fn test_first_matching_line_wins() {
        let mut status = ServerStatus::default();
        status.apply("map: dm4\nmap: dm6\n");

        assert_eq!(status.map, "dm4");
    }

    #[test]
    fn test_prefix_must_anchor_line_start() {
        let mut status = ServerStatus::default();
        status.apply("current map: dm4\n");

        assert_eq!(status.map, "");
    }

    #[test]
    fn test_non_numeric_player_line_ignored() {
        let mut status = ServerStatus {
            map: String::new(),
            players: 7,
        };
        status.apply("players: none\n");

        assert_eq!(status.players, 7);
    }
}
