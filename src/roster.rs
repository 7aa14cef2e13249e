use log::{debug, info};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

use crate::error::ApiError;
use crate::helix::{HelixClient, Page};
use crate::models::ChannelRef;

/// Helix accepts at most this many `broadcaster_id` params per call.
const CHANNEL_BATCH: usize = 100;

#[derive(Debug, Deserialize)]
struct Team {
    #[serde(default)]
    users: Option<Vec<TeamUser>>,
}

#[derive(Debug, Deserialize)]
struct TeamUser {
    user_id: String,
    user_login: String,
    user_name: String,
}

#[derive(Debug, Deserialize)]
struct ChannelInfo {
    broadcaster_id: String,
    #[serde(default)]
    broadcaster_language: String,
}

/// Looks up the members of a team.
pub struct TeamRoster<'a> {
    helix: &'a HelixClient,
}

impl<'a> TeamRoster<'a> {
    pub fn new(helix: &'a HelixClient) -> Self {
        Self { helix }
    }

    /// Members in team order, unique by id, each with its broadcaster language.
    pub async fn fetch(&self, team: &str) -> Result<Vec<ChannelRef>, ApiError> {
        info!("Getting members of team {}", team);
        let page: Page<Team> = self
            .helix
            .get_json("teams", &[("name", team.to_string())])
            .await?;
        let users = page
            .data
            .into_iter()
            .next()
            .and_then(|t| t.users)
            .ok_or_else(|| ApiError::TeamNotFound(team.to_string()))?;

        let mut seen = HashSet::new();
        let users: Vec<TeamUser> = users
            .into_iter()
            .filter(|u| seen.insert(u.user_id.clone()))
            .collect();

        let mut languages = HashMap::new();
        for batch in users.chunks(CHANNEL_BATCH) {
            let query: Vec<(&str, String)> = batch
                .iter()
                .map(|u| ("broadcaster_id", u.user_id.clone()))
                .collect();
            let channels: Page<ChannelInfo> = self.helix.get_json("channels", &query).await?;
            for channel in channels.data {
                languages.insert(channel.broadcaster_id, channel.broadcaster_language);
            }
        }

        let roster: Vec<ChannelRef> = users
            .into_iter()
            .map(|u| ChannelRef {
                language: languages.remove(&u.user_id).unwrap_or_default(),
                id: u.user_id,
                login: u.user_login,
                display_name: u.user_name,
            })
            .collect();
        debug!("Team {} roster: {:?}", team, roster);
        info!("Team {} has {} member(s)", team, roster.len());
        Ok(roster)
    }
}
